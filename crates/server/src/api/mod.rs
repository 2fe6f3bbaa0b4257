use shared::{
    domain::{authorization_ttl_days_valid, SessionHash},
    error::{ApiError, ErrorCode, HASH_INVALID, TTL_DAYS_INVALID},
    protocol::{
        AccountRequest, AccountResponse, AuthorizationRecord, AuthorizationsList, SignInRequest,
        SignInResponse,
    },
};
use storage::{NewAuthorization, Storage, StoredAuthorization};
use tracing::{debug, info};

const MAX_USERNAME_BYTES: usize = 64;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

/// Resolves a bearer auth key to the session it belongs to.
pub async fn authenticate(
    ctx: &ApiContext,
    auth_key: Option<&str>,
) -> Result<StoredAuthorization, ApiError> {
    let Some(auth_key) = auth_key.map(str::trim).filter(|key| !key.is_empty()) else {
        return Err(ApiError::unauthorized());
    };
    ctx.storage
        .authorization_by_key(auth_key)
        .await
        .map_err(internal)?
        .ok_or_else(ApiError::unauthorized)
}

pub async fn sign_in(
    ctx: &ApiContext,
    req: SignInRequest,
    ip: &str,
    now: i64,
) -> Result<SignInResponse, ApiError> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::validation("username cannot be empty"));
    }
    if username.len() > MAX_USERNAME_BYTES {
        return Err(ApiError::validation("username is too long"));
    }

    let user_id = ctx.storage.create_user(username).await.map_err(internal)?;
    let new = NewAuthorization {
        api_id: req.api_id,
        app_name: req.app_name,
        app_version: req.app_version,
        device_model: req.device_model,
        platform: req.platform,
        system_version: req.system_version,
        ip: ip.to_string(),
        country: req.country,
        region: req.region,
        password_pending: req.password_pending,
    };
    let stored = ctx
        .storage
        .create_authorization(user_id, &new, now)
        .await
        .map_err(internal)?;
    info!(user_id = user_id.0, hash = %stored.hash, "session created");

    Ok(SignInResponse {
        user_id,
        hash: stored.hash,
        auth_key: stored.auth_key,
    })
}

pub async fn handle_account_request(
    ctx: &ApiContext,
    caller: &StoredAuthorization,
    request: AccountRequest,
    ip: &str,
    now: i64,
) -> Result<AccountResponse, ApiError> {
    debug!(request = request.name(), hash = %caller.hash, "account request");
    match request {
        AccountRequest::GetAuthorizations => get_authorizations(ctx, caller, ip, now).await,
        AccountRequest::ResetAuthorization { hash } => {
            reset_authorization(ctx, caller, hash).await
        }
        AccountRequest::ResetAuthorizations => reset_authorizations(ctx, caller).await,
        AccountRequest::SetAuthorizationTtl { days } => {
            set_authorization_ttl(ctx, caller, days).await
        }
        AccountRequest::ChangeAuthorizationSettings {
            hash,
            call_requests_disabled,
        } => change_authorization_settings(ctx, caller, hash, call_requests_disabled).await,
    }
}

async fn get_authorizations(
    ctx: &ApiContext,
    caller: &StoredAuthorization,
    ip: &str,
    now: i64,
) -> Result<AccountResponse, ApiError> {
    ctx.storage
        .touch_authorization(caller.hash, ip, now)
        .await
        .map_err(internal)?;
    let authorizations = ctx
        .storage
        .list_authorizations(caller.user_id)
        .await
        .map_err(internal)?;
    let authorization_ttl_days = ctx
        .storage
        .ttl_days(caller.user_id)
        .await
        .map_err(internal)?;

    Ok(AccountResponse::Authorizations(AuthorizationsList {
        authorization_ttl_days,
        authorizations: authorizations
            .iter()
            .map(|stored| to_record(stored, caller.hash))
            .collect(),
    }))
}

async fn reset_authorization(
    ctx: &ApiContext,
    caller: &StoredAuthorization,
    hash: SessionHash,
) -> Result<AccountResponse, ApiError> {
    if hash.is_current() || hash == caller.hash {
        return Err(ApiError::validation(HASH_INVALID));
    }
    let removed = ctx
        .storage
        .delete_authorization(caller.user_id, hash)
        .await
        .map_err(internal)?;
    if removed {
        info!(user_id = caller.user_id.0, %hash, "session reset");
    }
    Ok(AccountResponse::Bool(removed))
}

async fn reset_authorizations(
    ctx: &ApiContext,
    caller: &StoredAuthorization,
) -> Result<AccountResponse, ApiError> {
    let removed = ctx
        .storage
        .delete_other_authorizations(caller.user_id, caller.hash)
        .await
        .map_err(internal)?;
    info!(user_id = caller.user_id.0, removed, "other sessions reset");
    Ok(AccountResponse::Bool(true))
}

async fn set_authorization_ttl(
    ctx: &ApiContext,
    caller: &StoredAuthorization,
    days: i32,
) -> Result<AccountResponse, ApiError> {
    if !authorization_ttl_days_valid(days) {
        return Err(ApiError::validation(TTL_DAYS_INVALID));
    }
    ctx.storage
        .set_ttl_days(caller.user_id, days)
        .await
        .map_err(internal)?;
    Ok(AccountResponse::Bool(true))
}

async fn change_authorization_settings(
    ctx: &ApiContext,
    caller: &StoredAuthorization,
    hash: SessionHash,
    call_requests_disabled: bool,
) -> Result<AccountResponse, ApiError> {
    let hash = if hash.is_current() { caller.hash } else { hash };
    let updated = ctx
        .storage
        .set_call_requests_disabled(caller.user_id, hash, call_requests_disabled)
        .await
        .map_err(internal)?;
    if !updated {
        return Err(ApiError::new(ErrorCode::NotFound, HASH_INVALID));
    }
    Ok(AccountResponse::Bool(true))
}

fn to_record(stored: &StoredAuthorization, caller: SessionHash) -> AuthorizationRecord {
    AuthorizationRecord {
        hash: stored.hash,
        current: stored.hash == caller,
        password_pending: stored.password_pending,
        call_requests_disabled: stored.call_requests_disabled,
        api_id: stored.api_id,
        app_name: stored.app_name.clone(),
        app_version: stored.app_version.clone(),
        device_model: stored.device_model.clone(),
        platform: stored.platform.clone(),
        system_version: stored.system_version.clone(),
        ip: stored.ip.clone(),
        country: stored.country.clone(),
        region: stored.region.clone(),
        date_created: stored.date_created,
        date_active: stored.date_active,
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::internal(err.to_string())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
