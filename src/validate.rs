//! Per-route request validation: size limit and sender allow-list.

use tracing::debug;

use crate::error::ValidationError;
use crate::mime::{ParsedEmail, bare_address, domain_of};
use crate::routing::Route;

/// Check a message against one route's limits.
///
/// A failure only disqualifies this route; other routes in the fan-out set
/// are unaffected.
pub fn validate(email: &ParsedEmail, route: &Route) -> Result<(), ValidationError> {
    let options = &route.transformation;

    if let Some(max) = options.max_size {
        let size = message_size(email);
        if size > max {
            debug!(route = %route.label(), size, max, "Message exceeds size limit");
            return Err(ValidationError::TooLarge { size, max });
        }
    }

    if !is_sender_allowed(&email.from, &options.allowed_senders) {
        debug!(route = %route.label(), sender = %email.from, "Sender not in allow-list");
        return Err(ValidationError::SenderNotAllowed {
            sender: bare_address(&email.from).to_string(),
        });
    }

    Ok(())
}

/// Byte size of the textual fields plus every attachment.
pub fn message_size(email: &ParsedEmail) -> usize {
    let text = email.text.as_deref().map_or(0, str::len);
    let html = email.html.as_deref().map_or(0, str::len);
    let attachments: usize = email.attachments.iter().map(|a| a.size).sum();
    email.subject.len() + text + html + email.from.len() + email.to.join(",").len() + attachments
}

/// Whether `from` passes the allow-list.
///
/// Entries are exact addresses (case-insensitive) or `@domain`. An empty
/// list allows everyone.
pub fn is_sender_allowed(from: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let sender = bare_address(from);
    let sender_domain = domain_of(sender);

    allowed.iter().any(|entry| {
        let entry = entry.trim();
        match entry.strip_prefix('@') {
            Some(domain) => sender_domain.is_some_and(|d| d.eq_ignore_ascii_case(domain)),
            None => entry.eq_ignore_ascii_case(sender),
        }
    })
}
