//! Slack incoming-webhook payloads.

use reqwest::Url;
use serde::Serialize;

use crate::error::DispatchError;
use crate::mime::ParsedEmail;
use crate::routing::SlackOptions;

const DEFAULT_USERNAME: &str = "Email Relay";
const DEFAULT_ICON: &str = ":email:";
const MAX_BODY_CHARS: usize = 1000;

#[derive(Debug, Serialize)]
struct SlackMessage<'a> {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    username: &'a str,
    icon_emoji: &'a str,
}

/// Whether an endpoint is a Slack incoming webhook.
pub fn is_slack_webhook(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|h| h.eq_ignore_ascii_case("hooks.slack.com"))
        && url.path().starts_with("/services/")
}

/// Render the Slack JSON body for a message.
pub fn render(
    email: &ParsedEmail,
    options: &SlackOptions,
    recipient: &str,
) -> Result<String, DispatchError> {
    let body = truncate(&super::plain_text(email), MAX_BODY_CHARS);
    let text = format!(
        "*New email received*\n*From:* {}\n*To:* {}\n*Subject:* {}\n\n{}",
        email.from, recipient, email.subject, body
    );

    let message = SlackMessage {
        text,
        channel: options.channel.as_deref(),
        username: options.username.as_deref().unwrap_or(DEFAULT_USERNAME),
        icon_emoji: options.icon_emoji.as_deref().unwrap_or(DEFAULT_ICON),
    };
    Ok(serde_json::to_string(&message)?)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
