//! The relay: one inbound message in, one aggregate outcome out.
//!
//! Flow per message:
//! 1. parse the raw bytes
//! 2. resolve the recipient's fan-out set
//! 3. per route, concurrently: validate, build body, build request, send
//! 4. aggregate

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::dispatch::{self, AggregateResult, DispatchResult, Dispatcher, correlation};
use crate::error::{ConfigError, Result};
use crate::mime::{self, ParsedEmail};
use crate::routing::{Route, RouteRepository};
use crate::transform;
use crate::validate;

/// Status reported for a route that refused the message before sending.
const REJECTED_STATUS: u16 = 400;

pub struct Relay {
    repository: Arc<dyn RouteRepository>,
    dispatcher: Dispatcher,
    correlation_header: String,
}

impl Relay {
    pub fn new(
        repository: Arc<dyn RouteRepository>,
        dispatcher: Dispatcher,
        config: &RelayConfig,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            correlation_header: config.correlation_header.clone(),
        }
    }

    /// Parse and deliver one message addressed to `recipient`.
    ///
    /// Errors are message-level (unparsable message, no route, routing
    /// table unavailable). Per-route failures are inside the aggregate.
    pub async fn process(&self, raw: &[u8], recipient: &str) -> Result<AggregateResult> {
        let email = mime::parse(raw)?.with_fallback_recipient(recipient);
        debug!(recipient = %recipient, from = %email.from, "Message received");

        let routes = self.repository.resolve(recipient).await?;
        if routes.is_empty() {
            warn!(recipient = %recipient, "No route found");
            return Err(ConfigError::NoRoute {
                recipient: recipient.to_string(),
            }
            .into());
        }

        let base_id = correlation::base_id(&email, &self.correlation_header);
        let ids = correlation::assign(&base_id, routes.len());
        info!(
            recipient = %recipient,
            routes = routes.len(),
            correlation_id = %base_id,
            "Dispatching message"
        );

        let deliveries = routes
            .iter()
            .zip(&ids)
            .map(|(route, id)| self.deliver(&email, route, recipient, id));
        let results = join_all(deliveries).await;

        for (route, result) in routes.iter().zip(&results) {
            if !result.success {
                warn!(route = %route.label(), status = ?result.status_code, error = %result.message, "Route failed");
            }
        }

        let outcome = dispatch::aggregate(results);
        if outcome.success {
            info!(recipient = %recipient, status = ?outcome.status_code, "{}", outcome.message);
        } else {
            error!(recipient = %recipient, status = ?outcome.status_code, "{}", outcome.message);
        }
        Ok(outcome)
    }

    async fn deliver(
        &self,
        email: &ParsedEmail,
        route: &Route,
        recipient: &str,
        correlation_id: &str,
    ) -> DispatchResult {
        if let Err(e) = validate::validate(email, route) {
            return DispatchResult::rejected(REJECTED_STATUS, e.to_string());
        }

        let payload = match transform::build_body(email, route, recipient) {
            Ok(payload) => payload,
            Err(e) => {
                error!(route = %route.label(), error = %e, "Failed to build request body");
                return DispatchResult::rejected(REJECTED_STATUS, e.to_string());
            }
        };

        let request = dispatch::build_request(route, payload, &self.correlation_header, correlation_id);
        debug!(route = %route.label(), correlation_id = %correlation_id, "Request prepared");
        self.dispatcher
            .send(&request, route.retry_count, route.retry_delay)
            .await
    }
}
