//! Error types for mailhook.

use std::time::Duration;

/// Message-level failures of the relay.
///
/// Validation and dispatch failures are per route and end up in the
/// aggregate result instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Malformed inbound message. Fatal for that message.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("No blank line separating headers from body")]
    MissingHeaderSeparator,
}

/// Routing-table errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No route found for recipient {recipient} and no default route configured")]
    NoRoute { recipient: String },

    #[error("Invalid route {email_address}: {reason}")]
    InvalidRoute {
        email_address: String,
        reason: String,
    },

    #[error("Failed to parse routing table: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A route refused to carry a message. Affects only that route.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Message size {size} exceeds route limit of {max}")]
    TooLarge { size: usize, max: usize },

    #[error("Sender {sender} is not allowed for this route")]
    SenderNotAllowed { sender: String },
}

/// Errors while building or sending a single outbound request.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to build request: {0}")]
    InvalidRequest(String),

    #[error("Failed to encode body: {0}")]
    Encode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encode(e.to_string())
    }
}

impl From<serde_urlencoded::ser::Error> for DispatchError {
    fn from(e: serde_urlencoded::ser::Error) -> Self {
        Self::Encode(e.to_string())
    }
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
