//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Header carrying the per-destination correlation id.
pub const DEFAULT_CORRELATION_HEADER: &str = "X-Correlation-Id";

/// Relay configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Path of the JSON routing table.
    pub routes_path: PathBuf,
    /// How long a loaded routing table is served before it is re-read.
    pub routes_ttl: Duration,
    /// Client-wide HTTP timeout; routes may override per request.
    pub http_timeout: Duration,
    /// Correlation header name, read from the inbound message and written outbound.
    pub correlation_header: String,
    /// User-Agent sent with every webhook call.
    pub user_agent: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            routes_path: PathBuf::from("./routes.json"),
            routes_ttl: Duration::from_secs(300), // 5 minutes
            http_timeout: Duration::from_secs(30),
            correlation_header: DEFAULT_CORRELATION_HEADER.to_string(),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RelayConfig {
    /// Build config from `MAILHOOK_*` environment variables.
    ///
    /// Unset or unparsable values fall back to [`RelayConfig::default`].
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let routes_path = std::env::var("MAILHOOK_ROUTES_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.routes_path);

        let routes_ttl = std::env::var("MAILHOOK_ROUTES_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.routes_ttl);

        let http_timeout = std::env::var("MAILHOOK_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);

        let correlation_header = std::env::var("MAILHOOK_CORRELATION_HEADER")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.correlation_header);

        let user_agent = std::env::var("MAILHOOK_USER_AGENT").unwrap_or(defaults.user_agent);

        Self {
            routes_path,
            routes_ttl,
            http_timeout,
            correlation_header,
            user_agent,
        }
    }
}
