use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::{stream, Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;

pub const DEFAULT_CHANGES_CAPACITY: usize = 64;

pub struct ReplayValue<T> {
    current: Mutex<T>,
    changes: broadcast::Sender<T>,
}

impl<T> ReplayValue<T>
where
    T: Clone + Send + 'static,
{
    #[cfg(test)]
    pub(crate) fn new(initial: T) -> Self {
        Self::with_capacity(initial, DEFAULT_CHANGES_CAPACITY)
    }

    pub fn with_capacity(initial: T, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            current: Mutex::new(initial),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> T {
        self.lock().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock())
    }

    pub fn set(&self, value: T) {
        self.update(|current| *current = value);
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut current = self.lock();
        let result = f(&mut current);
        // Sending under the lock keeps the order of emissions equal to the
        // order of mutations.
        let _ = self.changes.send(current.clone());
        result
    }

    /// The current value followed by every subsequent change.
    pub fn values(&self) -> impl Stream<Item = T> + Send + 'static {
        let (snapshot, receiver) = {
            let current = self.lock();
            (current.clone(), self.changes.subscribe())
        };
        stream::once(async move { snapshot }).chain(Self::changes_of(receiver))
    }

    #[cfg(test)]
    pub(crate) fn changes(&self) -> impl Stream<Item = T> + Send + 'static {
        Self::changes_of(self.changes.subscribe())
    }

    fn changes_of(receiver: broadcast::Receiver<T>) -> impl Stream<Item = T> + Send + 'static {
        BroadcastStream::new(receiver).filter_map(|item| async move {
            match item {
                Ok(value) => Some(value),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "value subscriber lagged behind; skipping stale changes");
                    None
                }
            }
        })
    }
}

impl<T> ReplayValue<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn set_if_changed(&self, value: T) -> bool {
        let mut current = self.lock();
        if *current == value {
            return false;
        }
        *current = value.clone();
        let _ = self.changes.send(value);
        true
    }
}
