use serde::{Deserialize, Serialize};

use crate::{
    domain::{ApiId, SessionHash, UserId},
    error::ApiError,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub hash: SessionHash,
    #[serde(default)]
    pub current: bool,
    #[serde(default)]
    pub password_pending: bool,
    #[serde(default)]
    pub call_requests_disabled: bool,
    #[serde(default)]
    pub api_id: ApiId,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub device_model: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub system_version: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub date_created: i64,
    #[serde(default)]
    pub date_active: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationsList {
    pub authorization_ttl_days: i32,
    pub authorizations: Vec<AuthorizationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AccountRequest {
    GetAuthorizations,
    ResetAuthorization {
        hash: SessionHash,
    },
    ResetAuthorizations,
    SetAuthorizationTtl {
        days: i32,
    },
    ChangeAuthorizationSettings {
        hash: SessionHash,
        call_requests_disabled: bool,
    },
}

impl AccountRequest {
    pub fn name(&self) -> &'static str {
        match self {
            AccountRequest::GetAuthorizations => "get_authorizations",
            AccountRequest::ResetAuthorization { .. } => "reset_authorization",
            AccountRequest::ResetAuthorizations => "reset_authorizations",
            AccountRequest::SetAuthorizationTtl { .. } => "set_authorization_ttl",
            AccountRequest::ChangeAuthorizationSettings { .. } => "change_authorization_settings",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AccountResponse {
    Authorizations(AuthorizationsList),
    Bool(bool),
    Error(ApiError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignInRequest {
    pub username: String,
    pub api_id: ApiId,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub device_model: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub system_version: String,
    /// Location as resolved by whatever fronts the server, if anything.
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub password_pending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInResponse {
    pub user_id: UserId,
    pub hash: SessionHash,
    pub auth_key: String,
}
