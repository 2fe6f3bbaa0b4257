pub mod authorizations;
pub mod config;
pub mod entry;
pub mod http;
pub mod producer;
pub mod rpc;
pub mod sessions;

pub use authorizations::{Authorizations, EntryList};
pub use config::{RegistryConfig, SHORT_POLL_TIMEOUT};
pub use entry::{DeviceType, Entry};
pub use http::HttpRpcSender;
pub use producer::ReplayValue;
pub use rpc::{MissingRpcSender, RpcError, RpcSender};
pub use sessions::{terminate_all_and_reload, SessionsView, ShortPoller};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
