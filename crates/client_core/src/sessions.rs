use std::{sync::Arc, time::Duration};

use shared::domain::SessionHash;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{authorizations::Authorizations, entry::Entry, rpc::RpcError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionsView {
    pub current: Option<Entry>,
    pub incomplete: Vec<Entry>,
    pub list: Vec<Entry>,
}

impl SessionsView {
    /// `None` while nothing has been loaded yet.
    pub fn from_list(entries: &[Entry]) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        let mut view = Self::default();
        for entry in entries {
            if entry.is_current() {
                view.current = Some(entry.clone());
            } else if entry.incomplete {
                view.incomplete.push(entry.clone());
            } else {
                view.list.push(entry.clone());
            }
        }
        view.list.sort_by(|a, b| b.active_time.cmp(&a.active_time));
        view.incomplete.sort_by(|a, b| b.active_time.cmp(&a.active_time));
        Some(view)
    }

    pub fn remove(&mut self, hash: SessionHash) {
        self.incomplete.retain(|entry| entry.hash != hash);
        self.list.retain(|entry| entry.hash != hash);
    }

    pub fn others_count(&self) -> usize {
        self.list.len()
    }
}

pub struct ShortPoller {
    task: JoinHandle<()>,
}

impl ShortPoller {
    pub fn start(registry: Arc<Authorizations>, period: Duration) -> Self {
        let task = tokio::spawn(async move {
            loop {
                let left = registry.time_until_stale(period);
                if left.is_zero() {
                    registry.reload();
                    tokio::time::sleep(period).await;
                } else {
                    debug!(left_ms = left.as_millis() as u64, "sessions still fresh");
                    tokio::time::sleep(left).await;
                }
            }
        });
        Self { task }
    }

    pub fn with_registry_period(registry: Arc<Authorizations>) -> Self {
        let period = registry.config().short_poll_period;
        Self::start(registry, period)
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for ShortPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Reloads whether or not the termination went through.
pub async fn terminate_all_and_reload(registry: &Arc<Authorizations>) -> Result<bool, RpcError> {
    let result = registry.request_terminate(None).await;
    registry.cancel_current_request();
    registry.reload();
    result
}

#[cfg(test)]
#[path = "tests/sessions_tests.rs"]
mod tests;
