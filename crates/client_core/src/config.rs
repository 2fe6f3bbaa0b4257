use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::producer::DEFAULT_CHANGES_CAPACITY;

/// Sessions panel refresh period.
pub const SHORT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Name shown for the session this client runs in. Falls back to the
    /// model the server reports when unset.
    pub device_model: Option<String>,
    pub utc_offset: FixedOffset,
    pub short_poll_period: Duration,
    pub changes_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            device_model: None,
            utc_offset: Utc.fix(),
            short_poll_period: SHORT_POLL_TIMEOUT,
            changes_capacity: DEFAULT_CHANGES_CAPACITY,
        }
    }
}

impl RegistryConfig {
    pub fn with_device_model(mut self, device_model: impl Into<String>) -> Self {
        self.device_model = Some(device_model.into());
        self
    }

    // Out-of-range offsets are ignored.
    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        if let Some(offset) = FixedOffset::east_opt(minutes.saturating_mul(60)) {
            self.utc_offset = offset;
        }
        self
    }

    pub fn with_short_poll_period(mut self, period: Duration) -> Self {
        self.short_poll_period = period;
        self
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.utc_offset)
    }
}
