use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);

/// `0` denotes the session the client talks through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHash(pub u64);

impl SessionHash {
    pub const CURRENT: SessionHash = SessionHash(0);

    pub fn is_current(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SessionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiId(pub i32);

/// Bounds accepted for the inactive-session auto-termination period.
pub const MIN_AUTHORIZATION_TTL_DAYS: i32 = 1;
pub const MAX_AUTHORIZATION_TTL_DAYS: i32 = 366;
pub const DEFAULT_AUTHORIZATION_TTL_DAYS: i32 = 180;

pub fn authorization_ttl_days_valid(days: i32) -> bool {
    (MIN_AUTHORIZATION_TTL_DAYS..=MAX_AUTHORIZATION_TTL_DAYS).contains(&days)
}
