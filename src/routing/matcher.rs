//! Recipient → route resolution.
//!
//! Every exact or `*@domain` match is returned (the fan-out set). Only when
//! nothing matches does the default route apply. There is no ranking between
//! literal and wildcard matches.

use tracing::debug;

use crate::mime::{bare_address, domain_of};
use crate::routing::model::{Route, RoutingTable};

/// Resolve the routes a recipient is delivered to, in table order.
///
/// An empty result means "no route found".
pub fn resolve(table: &RoutingTable, recipient: &str) -> Vec<Route> {
    let recipient = bare_address(recipient);

    let matched: Vec<Route> = table
        .routes
        .iter()
        .filter(|route| matches_recipient(&route.email_address, recipient))
        .cloned()
        .collect();

    if !matched.is_empty() {
        debug!(recipient = %recipient, count = matched.len(), "Recipient matched routes");
        return matched;
    }

    match default_route(table) {
        Some(route) => {
            debug!(recipient = %recipient, route = %route.label(), "Falling back to default route");
            vec![route.clone()]
        }
        None => Vec::new(),
    }
}

/// The route flagged `isDefault`, else a bare `*` route.
pub fn default_route(table: &RoutingTable) -> Option<&Route> {
    table
        .routes
        .iter()
        .find(|r| r.is_default)
        .or_else(|| table.routes.iter().find(|r| r.email_address == "*"))
}

/// Exact address (ASCII case-insensitive) or `*@domain` with an equal domain.
pub fn matches_recipient(pattern: &str, recipient: &str) -> bool {
    if let Some(domain) = pattern.strip_prefix("*@") {
        return domain_of(recipient).is_some_and(|d| d.eq_ignore_ascii_case(domain));
    }
    pattern != "*" && pattern.eq_ignore_ascii_case(recipient)
}
