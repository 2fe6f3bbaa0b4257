use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use futures::{Stream, StreamExt};
use shared::{
    domain::{SessionHash, DEFAULT_AUTHORIZATION_TTL_DAYS},
    protocol::{AccountRequest, AuthorizationRecord, AuthorizationsList},
};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::{
    config::RegistryConfig,
    entry::Entry,
    producer::ReplayValue,
    rpc::{expect_authorizations, expect_bool, RpcError, RpcSender},
};

pub type EntryList = Vec<Entry>;

fn count_total(list: &[Entry]) -> usize {
    list.iter().filter(|entry| entry.counts_towards_total()).count()
}

struct InFlightReload {
    id: u64,
    task: AbortHandle,
}

#[derive(Default)]
struct RegistryState {
    next_request_id: u64,
    reload: Option<InFlightReload>,
    last_received: Option<Instant>,
    toggling_calls: HashSet<SessionHash>,
}

pub struct Authorizations {
    sender: Arc<dyn RpcSender>,
    config: RegistryConfig,
    state: Mutex<RegistryState>,
    list: ReplayValue<EntryList>,
    ttl_days: ReplayValue<i32>,
    calls_disabled_here: ReplayValue<bool>,
}

struct ToggleGuard<'a> {
    registry: &'a Authorizations,
    hash: SessionHash,
}

impl Drop for ToggleGuard<'_> {
    fn drop(&mut self) {
        self.registry.state().toggling_calls.remove(&self.hash);
    }
}

impl Authorizations {
    pub fn new(sender: Arc<dyn RpcSender>, config: RegistryConfig) -> Arc<Self> {
        let capacity = config.changes_capacity;
        Arc::new(Self {
            sender,
            config,
            state: Mutex::new(RegistryState::default()),
            list: ReplayValue::with_capacity(Vec::new(), capacity),
            ttl_days: ReplayValue::with_capacity(DEFAULT_AUTHORIZATION_TTL_DAYS, capacity),
            calls_disabled_here: ReplayValue::with_capacity(false, capacity),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns whether a request was issued.
    pub fn reload(self: &Arc<Self>) -> bool {
        let mut state = self.state();
        if let Some(in_flight) = &state.reload {
            debug!(request_id = in_flight.id, "authorizations reload already in flight");
            return false;
        }
        state.next_request_id += 1;
        let request_id = state.next_request_id;

        let registry = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = registry
                .sender
                .invoke(AccountRequest::GetAuthorizations)
                .await
                .and_then(|response| expect_authorizations("get_authorizations", response));
            registry.finish_reload(request_id, result);
        });
        // The task cannot observe the marker before this guard is released.
        state.reload = Some(InFlightReload {
            id: request_id,
            task: task.abort_handle(),
        });
        debug!(request_id, "authorizations reload sent");
        true
    }

    fn finish_reload(&self, request_id: u64, result: Result<AuthorizationsList, RpcError>) {
        let mut state = self.state();
        match &state.reload {
            Some(in_flight) if in_flight.id == request_id => {}
            _ => {
                debug!(request_id, "dropping result of a cancelled reload");
                return;
            }
        }
        state.reload = None;

        let received = match result {
            Ok(received) => received,
            Err(error) => {
                warn!(request_id, %error, "authorizations reload failed");
                return;
            }
        };

        state.last_received = Some(Instant::now());
        let now = self.config.now();
        let device_model = self.config.device_model.as_deref();
        let mut seen_current = false;
        let entries: EntryList = received
            .authorizations
            .iter()
            .map(|record| {
                if record.current && std::mem::replace(&mut seen_current, true) {
                    warn!(request_id, hash = %record.hash, "second current session in reply");
                    let record = AuthorizationRecord {
                        current: false,
                        ..record.clone()
                    };
                    return Entry::parse(&record, device_model, now);
                }
                Entry::parse(record, device_model, now)
            })
            .collect();
        if let Some(current) = entries.iter().find(|entry| entry.is_current()) {
            self.calls_disabled_here.set_if_changed(current.calls_disabled);
        }
        self.ttl_days.set_if_changed(received.authorization_ttl_days);
        info!(
            request_id,
            count = entries.len(),
            ttl_days = received.authorization_ttl_days,
            "authorizations reloaded"
        );
        // Still under the state lock so a concurrent cancel cannot interleave.
        self.list.set(entries);
    }

    pub fn cancel_current_request(&self) {
        let mut state = self.state();
        if let Some(in_flight) = state.reload.take() {
            in_flight.task.abort();
            debug!(request_id = in_flight.id, "authorizations reload cancelled");
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state().reload.is_some()
    }

    /// `None` terminates every other session.
    pub async fn request_terminate(&self, hash: Option<SessionHash>) -> Result<bool, RpcError> {
        let request = match hash {
            Some(hash) if hash.is_current() => return Err(RpcError::InvalidHash),
            Some(hash) => AccountRequest::ResetAuthorization { hash },
            None => AccountRequest::ResetAuthorizations,
        };
        let name = request.name();
        let confirmed = match self.sender.invoke(request).await {
            Ok(response) => expect_bool(name, response)?,
            Err(error) => {
                warn!(request = name, %error, "session termination failed");
                return Err(error);
            }
        };
        if !confirmed {
            debug!(request = name, "server declined session termination");
            return Ok(false);
        }

        let _state = self.state();
        match hash {
            Some(hash) => {
                self.list.update(|list| list.retain(|entry| entry.hash != hash));
                info!(%hash, "session terminated");
            }
            None => {
                self.list.set(Vec::new());
                info!("all other sessions terminated");
            }
        }
        Ok(true)
    }

    pub fn list(&self) -> EntryList {
        self.list.get()
    }

    pub fn list_changes(&self) -> impl Stream<Item = EntryList> + Send + 'static {
        self.list.values()
    }

    /// Completed sessions other than the current one.
    pub fn total(&self) -> usize {
        self.list.with(|list| count_total(list))
    }

    pub fn total_value(&self) -> impl Stream<Item = usize> + Send + 'static {
        self.list.values().map(|list| count_total(&list))
    }

    pub fn last_received_time(&self) -> Option<Instant> {
        self.state().last_received
    }

    pub fn time_until_stale(&self, period: Duration) -> Duration {
        match self.last_received_time() {
            Some(at) => period.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub fn ttl_days(&self) -> i32 {
        self.ttl_days.get()
    }

    pub fn ttl_days_value(&self) -> impl Stream<Item = i32> + Send + 'static {
        self.ttl_days.values()
    }

    pub async fn update_ttl(&self, days: i32) -> Result<bool, RpcError> {
        let request = AccountRequest::SetAuthorizationTtl { days };
        let name = request.name();
        let confirmed = expect_bool(name, self.sender.invoke(request).await?)?;
        if confirmed {
            self.ttl_days.set_if_changed(days);
            info!(days, "authorization ttl updated");
        }
        Ok(confirmed)
    }

    pub fn calls_disabled_here(&self) -> bool {
        self.calls_disabled_here.get()
    }

    pub fn calls_disabled_here_value(&self) -> impl Stream<Item = bool> + Send + 'static {
        self.calls_disabled_here.values()
    }

    pub async fn toggle_calls_disabled_here(&self, disabled: bool) -> Result<bool, RpcError> {
        self.toggle_calls_disabled(SessionHash::CURRENT, disabled).await
    }

    // A toggle already pending for the same hash is ignored.
    pub async fn toggle_calls_disabled(
        &self,
        hash: SessionHash,
        disabled: bool,
    ) -> Result<bool, RpcError> {
        if !self.state().toggling_calls.insert(hash) {
            debug!(%hash, "calls toggle already pending");
            return Ok(false);
        }
        let _guard = ToggleGuard {
            registry: self,
            hash,
        };

        let request = AccountRequest::ChangeAuthorizationSettings {
            hash,
            call_requests_disabled: disabled,
        };
        let name = request.name();
        let confirmed = expect_bool(name, self.sender.invoke(request).await?)?;
        if !confirmed {
            return Ok(false);
        }

        if hash.is_current() {
            self.calls_disabled_here.set_if_changed(disabled);
        }
        let _state = self.state();
        let known = self.list.with(|list| list.iter().any(|entry| entry.hash == hash));
        if known {
            self.list.update(|list| {
                for entry in list.iter_mut().filter(|entry| entry.hash == hash) {
                    entry.calls_disabled = disabled;
                }
            });
        }
        Ok(true)
    }
}

#[cfg(test)]
#[path = "tests/authorizations_tests.rs"]
mod tests;
