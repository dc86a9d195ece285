//! mailhook: relays inbound email to HTTP webhooks.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod mime;
pub mod relay;
pub mod routing;
pub mod transform;
pub mod validate;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use relay::Relay;
