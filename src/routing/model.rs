//! Route types: the raw configuration shape, the explicit defaults merge,
//! and the validated [`Route`] value the core works with.

use std::time::Duration;

use indexmap::IndexMap;
use reqwest::Url;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ── Closed option sets ──────────────────────────────────────────────

/// Body serialization for a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Form,
    #[default]
    Raw,
}

impl Format {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Form => "application/x-www-form-urlencoded",
            Self::Raw => "text/plain",
        }
    }
}

/// How the destination authenticates us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    None,
    Basic,
    Bearer,
    ApiKey,
}

/// Which body variant is delivered when `contentSelection` is `body`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HtmlMode {
    #[default]
    Text,
    Html,
    Both,
}

/// Which subset of the message is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSelection {
    #[default]
    Full,
    Subject,
    Body,
}

// ── Validated route ─────────────────────────────────────────────────

/// Transformation and validation options of a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformationOptions {
    pub html_mode: HtmlMode,
    pub content_selection: ContentSelection,
    /// Upper bound for the message size check, in bytes.
    pub max_size: Option<usize>,
    /// Exact addresses or `@domain` entries. Empty means unrestricted.
    pub allowed_senders: Vec<String>,
}

/// Presentation options used when the endpoint is a Slack incoming webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackOptions {
    pub channel: Option<String>,
    pub username: Option<String>,
    #[serde(alias = "icon_emoji")]
    pub icon_emoji: Option<String>,
}

/// A configured destination, immutable within one dispatch cycle.
#[derive(Debug, Clone)]
pub struct Route {
    /// Literal address, `*@domain`, or bare `*`.
    pub email_address: String,
    pub post_endpoint: Url,
    pub format: Format,
    /// Static headers, in configuration order. Keys are unique (case-insensitive).
    pub headers: IndexMap<String, String>,
    pub auth_type: AuthType,
    pub auth_token: Option<SecretString>,
    pub retry_count: u32,
    /// Base delay; attempt `n` waits `retry_delay * (n + 1)`.
    pub retry_delay: Duration,
    pub is_default: bool,
    /// Per-attempt HTTP timeout. `None` uses the client-wide timeout.
    pub timeout: Option<Duration>,
    pub transformation: TransformationOptions,
    pub slack: SlackOptions,
}

impl Route {
    /// A route with every option at its default.
    pub fn new(email_address: &str, post_endpoint: &str) -> Result<Self, ConfigError> {
        Self::try_from(RouteConfig {
            email_address: Some(email_address.to_string()),
            post_endpoint: Some(post_endpoint.to_string()),
            ..RouteConfig::default()
        })
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        format!("{} -> {}", self.email_address, self.post_endpoint)
    }
}

// ── Configuration shape ─────────────────────────────────────────────

/// Transformation options as they appear in configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationConfig {
    pub html_mode: Option<HtmlMode>,
    pub content_selection: Option<ContentSelection>,
    pub max_size: Option<usize>,
    pub allowed_senders: Option<Vec<String>>,
}

impl TransformationConfig {
    /// Field-by-field merge: values set here win over `base`.
    pub fn merged_over(self, base: &TransformationConfig) -> Self {
        Self {
            html_mode: self.html_mode.or(base.html_mode),
            content_selection: self.content_selection.or(base.content_selection),
            max_size: self.max_size.or(base.max_size),
            allowed_senders: self.allowed_senders.or_else(|| base.allowed_senders.clone()),
        }
    }
}

/// A route entry as loaded from a routing document, every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    pub email_address: Option<String>,
    pub post_endpoint: Option<String>,
    pub format: Option<Format>,
    pub headers: Option<IndexMap<String, String>>,
    pub auth_type: Option<AuthType>,
    pub auth_token: Option<SecretString>,
    pub retry_count: Option<u32>,
    /// Milliseconds.
    pub retry_delay: Option<u64>,
    pub is_default: Option<bool>,
    /// Milliseconds.
    pub timeout: Option<u64>,
    pub transformation_options: Option<TransformationConfig>,
    pub slack: Option<SlackOptions>,
}

impl RouteConfig {
    /// Field-by-field merge over `defaults`, including the nested
    /// transformation options.
    ///
    /// `emailAddress` and `isDefault` identify a route and are never inherited.
    pub fn merged_over(self, defaults: &RouteConfig) -> Self {
        let transformation_options = match (self.transformation_options, &defaults.transformation_options) {
            (Some(own), Some(base)) => Some(own.merged_over(base)),
            (Some(own), None) => Some(own),
            (None, base) => base.clone(),
        };

        Self {
            email_address: self.email_address,
            post_endpoint: self.post_endpoint.or_else(|| defaults.post_endpoint.clone()),
            format: self.format.or(defaults.format),
            headers: self.headers.or_else(|| defaults.headers.clone()),
            auth_type: self.auth_type.or(defaults.auth_type),
            auth_token: self.auth_token.or_else(|| defaults.auth_token.clone()),
            retry_count: self.retry_count.or(defaults.retry_count),
            retry_delay: self.retry_delay.or(defaults.retry_delay),
            is_default: self.is_default,
            timeout: self.timeout.or(defaults.timeout),
            transformation_options,
            slack: self.slack.or_else(|| defaults.slack.clone()),
        }
    }
}

impl TryFrom<RouteConfig> for Route {
    type Error = ConfigError;

    fn try_from(config: RouteConfig) -> Result<Self, Self::Error> {
        let email_address = config
            .email_address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ConfigError::InvalidRoute {
                email_address: "<missing>".into(),
                reason: "emailAddress is required".into(),
            })?;

        let invalid = |reason: String| ConfigError::InvalidRoute {
            email_address: email_address.clone(),
            reason,
        };

        let endpoint = config
            .post_endpoint
            .ok_or_else(|| invalid("postEndpoint is required".into()))?;
        let post_endpoint = Url::parse(endpoint.trim())
            .map_err(|e| invalid(format!("postEndpoint {endpoint:?} is not a URL: {e}")))?;
        if !matches!(post_endpoint.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "postEndpoint scheme {} is not http(s)",
                post_endpoint.scheme()
            )));
        }

        let headers = config.headers.unwrap_or_default();
        for (i, key) in headers.keys().enumerate() {
            if headers
                .keys()
                .skip(i + 1)
                .any(|other| other.eq_ignore_ascii_case(key))
            {
                return Err(invalid(format!("duplicate header {key}")));
            }
        }

        let transformation = config.transformation_options.unwrap_or_default();

        Ok(Self {
            post_endpoint,
            format: config.format.unwrap_or_default(),
            headers,
            auth_type: config.auth_type.unwrap_or_default(),
            auth_token: config.auth_token,
            retry_count: config.retry_count.unwrap_or(0),
            retry_delay: Duration::from_millis(config.retry_delay.unwrap_or(1000)),
            is_default: config.is_default.unwrap_or(false),
            timeout: config.timeout.map(Duration::from_millis),
            transformation: TransformationOptions {
                html_mode: transformation.html_mode.unwrap_or_default(),
                content_selection: transformation.content_selection.unwrap_or_default(),
                max_size: transformation.max_size,
                allowed_senders: transformation.allowed_senders.unwrap_or_default(),
            },
            slack: config.slack.unwrap_or_default(),
            email_address,
        })
    }
}

// ── Routing table ───────────────────────────────────────────────────

/// The on-disk routing document: `{ "routes": [...], "defaults": {...} }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingDocument {
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub defaults: RouteConfig,
}

/// A resolved routing table: defaults merged, every route validated.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    pub routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Merge defaults into every entry and validate it.
    pub fn from_document(document: RoutingDocument) -> Result<Self, ConfigError> {
        let RoutingDocument { routes, defaults } = document;
        let routes = routes
            .into_iter()
            .map(|entry| Route::try_from(entry.merged_over(&defaults)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    /// Parse a JSON routing document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::from_document(serde_json::from_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
