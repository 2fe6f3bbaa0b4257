use async_trait::async_trait;
use reqwest::Client;
use shared::protocol::{AccountRequest, AccountResponse, SignInRequest, SignInResponse};
use tracing::debug;
use url::Url;

use crate::rpc::{RpcError, RpcSender};

const RPC_PATH: &str = "rpc";
const SIGN_IN_PATH: &str = "auth/sign_in";

/// Parses a server base url so that relative joins append instead of
/// replacing the last path segment.
fn base_url(server_url: &str) -> Result<Url, RpcError> {
    let mut url = Url::parse(server_url.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn read_response<T>(response: reqwest::Response) -> Result<T, RpcError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    match response.json::<AccountResponse>().await {
        Ok(AccountResponse::Error(error)) => Err(RpcError::Server(error)),
        _ => Err(RpcError::Status(status.as_u16())),
    }
}

pub struct HttpRpcSender {
    http: Client,
    endpoint: Url,
    auth_key: String,
}

impl HttpRpcSender {
    pub fn new(server_url: &str, auth_key: impl Into<String>) -> Result<Self, RpcError> {
        Ok(Self {
            http: Client::new(),
            endpoint: base_url(server_url)?.join(RPC_PATH)?,
            auth_key: auth_key.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Creates a new session on the server and returns its auth key.
    pub async fn sign_in(
        server_url: &str,
        request: &SignInRequest,
    ) -> Result<SignInResponse, RpcError> {
        let url = base_url(server_url)?.join(SIGN_IN_PATH)?;
        let response = Client::new().post(url).json(request).send().await?;
        read_response(response).await
    }
}

#[async_trait]
impl RpcSender for HttpRpcSender {
    async fn invoke(&self, request: AccountRequest) -> Result<AccountResponse, RpcError> {
        debug!(request = request.name(), endpoint = %self.endpoint, "sending account request");
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.auth_key)
            .json(&request)
            .send()
            .await?;
        match read_response::<AccountResponse>(response).await? {
            AccountResponse::Error(error) => Err(RpcError::Server(error)),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_to_base_path() {
        let sender = HttpRpcSender::new("http://127.0.0.1:8443", "key").expect("sender");
        assert_eq!(sender.endpoint().as_str(), "http://127.0.0.1:8443/rpc");

        let sender = HttpRpcSender::new("https://example.org/api", "key").expect("sender");
        assert_eq!(sender.endpoint().as_str(), "https://example.org/api/rpc");
    }

    #[test]
    fn rejects_garbage_urls() {
        let err = HttpRpcSender::new("not a url", "key")
            .err()
            .expect("should fail");
        assert!(matches!(err, RpcError::InvalidUrl(_)));
    }
}
