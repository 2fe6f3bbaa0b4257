use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{AccountRequest, AccountResponse, SignInRequest, SignInResponse},
};
use storage::Storage;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use api::ApiContext;
use app_state::AppState;
use config::{load_settings, prepare_database_url};

type ErrorReply = (StatusCode, Json<AccountResponse>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let _sweep = spawn_expiry_sweep(storage.clone(), settings.expiry_sweep_interval);

    let state = AppState {
        api: ApiContext { storage },
    };
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/sign_in", post(http_sign_in))
        .route("/rpc", post(http_rpc))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Periodically drops sessions that stayed idle past their account's ttl.
fn spawn_expiry_sweep(storage: Storage, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            match storage.delete_expired_authorizations(now()).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "expired sessions removed"),
                Err(error) => warn!(%error, "expired session sweep failed"),
            }
        }
    })
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(error: ApiError) -> ErrorReply {
    (status_for(error.code), Json(AccountResponse::Error(error)))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ErrorReply> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "rejected request body");
        error_reply(ApiError::validation(format!("invalid request body: {e}")))
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// First hop of `X-Forwarded-For`; empty when the header is absent.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, ErrorReply> {
    state.api.storage.health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(AccountResponse::Error(ApiError::internal(e.to_string()))),
        )
    })?;
    Ok("ok")
}

async fn http_sign_in(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SignInResponse>, ErrorReply> {
    let req: SignInRequest = parse_body(&body)?;
    let response = api::sign_in(&state.api, req, &client_ip(&headers), now())
        .await
        .map_err(error_reply)?;
    Ok(Json(response))
}

async fn http_rpc(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AccountResponse>, ErrorReply> {
    let caller = api::authenticate(&state.api, bearer_token(&headers))
        .await
        .map_err(error_reply)?;
    let request: AccountRequest = parse_body(&body)?;
    let response =
        api::handle_account_request(&state.api, &caller, request, &client_ip(&headers), now())
            .await
            .map_err(error_reply)?;
    Ok(Json(response))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
