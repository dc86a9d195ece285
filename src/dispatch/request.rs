//! Outbound request assembly for one route.

use std::time::Duration;

use base64::Engine;
use indexmap::IndexMap;
use reqwest::{Method, Url};
use secrecy::ExposeSecret;
use tracing::warn;

use crate::routing::{AuthType, Route};
use crate::transform::Payload;

const AUTHORIZATION: &str = "Authorization";
const API_KEY: &str = "x-api-key";
const CONTENT_TYPE: &str = "Content-Type";

/// A fully prepared webhook call.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub url: Url,
    pub method: Method,
    /// Final header set, in send order. Names are unique (case-insensitive).
    pub headers: IndexMap<String, String>,
    pub body: String,
    /// Media type of `body`, also present in `headers`.
    pub content_type: &'static str,
    /// Per-attempt timeout; `None` uses the transport's default.
    pub timeout: Option<Duration>,
}

impl DispatchRequest {
    /// First header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Assemble the request a route receives.
///
/// Static route headers come first. The auth header, the correlation header
/// and `Content-Type` replace any static header of the same name, so each
/// appears exactly once.
pub fn build_request(
    route: &Route,
    payload: Payload,
    correlation_header: &str,
    correlation_id: &str,
) -> DispatchRequest {
    let mut headers = route.headers.clone();

    if let Some((name, value)) = auth_header(route) {
        set_header(&mut headers, name, value);
    }
    set_header(&mut headers, correlation_header, correlation_id.to_string());
    set_header(&mut headers, CONTENT_TYPE, payload.content_type.to_string());

    DispatchRequest {
        url: route.post_endpoint.clone(),
        method: Method::POST,
        headers,
        body: payload.content,
        content_type: payload.content_type,
        timeout: route.timeout,
    }
}

fn auth_header(route: &Route) -> Option<(&'static str, String)> {
    if route.auth_type == AuthType::None {
        return None;
    }
    let Some(token) = route.auth_token.as_ref() else {
        warn!(route = %route.label(), auth = ?route.auth_type, "Auth type set without a token, sending unauthenticated");
        return None;
    };
    let token = token.expose_secret();

    match route.auth_type {
        AuthType::None => None,
        AuthType::Basic => Some((AUTHORIZATION, format!("Basic {}", basic_credentials(token)))),
        AuthType::Bearer => Some((AUTHORIZATION, format!("Bearer {token}"))),
        AuthType::ApiKey => Some((API_KEY, token.to_string())),
    }
}

/// `user:password` is encoded; anything else is taken as already encoded.
fn basic_credentials(token: &str) -> String {
    if token.contains(':') {
        base64::engine::general_purpose::STANDARD.encode(token)
    } else {
        token.to_string()
    }
}

fn set_header(headers: &mut IndexMap<String, String>, name: &str, value: String) {
    headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value);
}
