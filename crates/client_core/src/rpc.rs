use async_trait::async_trait;
use shared::{
    error::ApiError,
    protocol::{AccountRequest, AccountResponse, AuthorizationsList},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("server rejected request: {0}")]
    Server(ApiError),
    #[error("server replied with http status {0} and no error payload")]
    Status(u16),
    #[error("unexpected response to {request}")]
    UnexpectedResponse { request: &'static str },
    #[error("the current session cannot be terminated by hash")]
    InvalidHash,
    #[error("rpc sender is unavailable")]
    Unavailable,
}

impl RpcError {
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            RpcError::Server(error) => Some(error),
            _ => None,
        }
    }
}

/// Implementations map [`AccountResponse::Error`] to [`RpcError::Server`].
#[async_trait]
pub trait RpcSender: Send + Sync {
    async fn invoke(&self, request: AccountRequest) -> Result<AccountResponse, RpcError>;
}

pub struct MissingRpcSender;

#[async_trait]
impl RpcSender for MissingRpcSender {
    async fn invoke(&self, _request: AccountRequest) -> Result<AccountResponse, RpcError> {
        Err(RpcError::Unavailable)
    }
}

pub(crate) fn expect_bool(
    request: &'static str,
    response: AccountResponse,
) -> Result<bool, RpcError> {
    match response {
        AccountResponse::Bool(value) => Ok(value),
        AccountResponse::Error(error) => Err(RpcError::Server(error)),
        AccountResponse::Authorizations(_) => Err(RpcError::UnexpectedResponse { request }),
    }
}

pub(crate) fn expect_authorizations(
    request: &'static str,
    response: AccountResponse,
) -> Result<AuthorizationsList, RpcError> {
    match response {
        AccountResponse::Authorizations(list) => Ok(list),
        AccountResponse::Error(error) => Err(RpcError::Server(error)),
        AccountResponse::Bool(_) => Err(RpcError::UnexpectedResponse { request }),
    }
}

#[cfg(test)]
mod tests {
    use shared::error::{ErrorCode, HASH_INVALID};

    use super::*;

    #[tokio::test]
    async fn missing_sender_always_fails() {
        let err = MissingRpcSender
            .invoke(AccountRequest::GetAuthorizations)
            .await
            .expect_err("should fail");
        assert!(matches!(err, RpcError::Unavailable));
    }

    #[test]
    fn error_payload_becomes_server_error() {
        let err = expect_bool(
            "reset_authorization",
            AccountResponse::Error(ApiError::validation(HASH_INVALID)),
        )
        .expect_err("should fail");
        let api = err.api_error().expect("api error");
        assert_eq!(api.code, ErrorCode::Validation);
        assert_eq!(api.message, HASH_INVALID);
    }

    #[test]
    fn mismatched_payload_is_unexpected() {
        let err = expect_authorizations("get_authorizations", AccountResponse::Bool(true))
            .expect_err("should fail");
        assert!(matches!(
            err,
            RpcError::UnexpectedResponse {
                request: "get_authorizations"
            }
        ));
    }
}
