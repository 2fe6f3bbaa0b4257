//! Scripted [`RpcSender`] and helpers shared by the registry tests.

use std::{
    collections::VecDeque,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use shared::{
    domain::{ApiId, SessionHash},
    protocol::{AccountRequest, AccountResponse, AuthorizationRecord, AuthorizationsList},
};
use tokio::sync::Semaphore;

use crate::rpc::{RpcError, RpcSender};

pub(crate) const WAIT: Duration = Duration::from_secs(2);

/// Replies with queued results in order. When gated, every call waits for a
/// permit from the returned semaphore before answering.
pub(crate) struct ScriptedSender {
    calls: Mutex<Vec<AccountRequest>>,
    replies: Mutex<VecDeque<Result<AccountResponse, RpcError>>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedSender {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            gate: None,
        })
    }

    pub(crate) fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let sender = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            gate: Some(Arc::clone(&gate)),
        });
        (sender, gate)
    }

    pub(crate) fn reply(&self, response: AccountResponse) {
        self.replies.lock().expect("replies").push_back(Ok(response));
    }

    pub(crate) fn fail(&self, error: RpcError) {
        self.replies.lock().expect("replies").push_back(Err(error));
    }

    pub(crate) fn calls(&self) -> Vec<AccountRequest> {
        self.calls.lock().expect("calls").clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().expect("calls").len()
    }
}

#[async_trait]
impl RpcSender for ScriptedSender {
    async fn invoke(&self, request: AccountRequest) -> Result<AccountResponse, RpcError> {
        self.calls.lock().expect("calls").push(request);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        self.replies
            .lock()
            .expect("replies")
            .pop_front()
            .unwrap_or(Err(RpcError::Unavailable))
    }
}

pub(crate) fn record(hash: u64, active: i64) -> AuthorizationRecord {
    AuthorizationRecord {
        hash: SessionHash(hash),
        api_id: ApiId(6),
        app_name: "Telegram Android".into(),
        app_version: "10.12.0".into(),
        device_model: format!("device-{hash}"),
        platform: "Android".into(),
        date_created: active - 100,
        date_active: active,
        ..AuthorizationRecord::default()
    }
}

pub(crate) fn current_record(hash: u64) -> AuthorizationRecord {
    AuthorizationRecord {
        current: true,
        ..record(hash, 1_700_000_000)
    }
}

pub(crate) fn incomplete_record(hash: u64) -> AuthorizationRecord {
    AuthorizationRecord {
        password_pending: true,
        ..record(hash, 1_700_000_000)
    }
}

pub(crate) fn authorizations(records: Vec<AuthorizationRecord>) -> AccountResponse {
    AccountResponse::Authorizations(AuthorizationsList {
        authorization_ttl_days: 180,
        authorizations: records,
    })
}

pub(crate) async fn next_item<S>(stream: &mut S) -> S::Item
where
    S: Stream + Unpin,
{
    tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("stream item in time")
        .expect("stream still open")
}

pub(crate) async fn assert_no_item<S>(stream: &mut S)
where
    S: Stream + Unpin,
    S::Item: std::fmt::Debug,
{
    let item = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
    assert!(item.is_err(), "unexpected stream item: {item:?}");
}

pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Lets spawned tasks run without advancing any timers.
pub(crate) async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub(crate) async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("future completed in time")
}
