//! Content transformer. Turns a parsed message into the body one route
//! receives.
//!
//! Slack incoming webhooks get a fixed presentation payload. Every other
//! endpoint gets the subset picked by `contentSelection`, serialized per
//! the route's `format`.

pub mod form;
pub mod slack;

use std::fmt::Write as _;

use serde_json::{Value, json};

use crate::error::DispatchError;
use crate::mime::ParsedEmail;
use crate::routing::{ContentSelection, Format, HtmlMode, Route};

/// A serialized request body and its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub content: String,
    pub content_type: &'static str,
}

/// Build the body for one (message, route) pair.
pub fn build_body(
    email: &ParsedEmail,
    route: &Route,
    recipient: &str,
) -> Result<Payload, DispatchError> {
    if slack::is_slack_webhook(&route.post_endpoint) {
        return Ok(Payload {
            content: slack::render(email, &route.slack, recipient)?,
            content_type: Format::Json.content_type(),
        });
    }

    let options = &route.transformation;
    let content = match route.format {
        Format::Json => serde_json::to_string(&select(email, options.content_selection, options.html_mode)?)?,
        Format::Form => form::encode(&select(email, options.content_selection, options.html_mode)?)?,
        Format::Raw => render_raw(email, options.content_selection, options.html_mode),
    };

    Ok(Payload {
        content,
        content_type: route.format.content_type(),
    })
}

/// The structured subset of a message picked by `selection`.
pub fn select(
    email: &ParsedEmail,
    selection: ContentSelection,
    html_mode: HtmlMode,
) -> Result<Value, DispatchError> {
    Ok(match selection {
        ContentSelection::Subject => json!({ "subject": email.subject }),
        ContentSelection::Body => json!({ "body": body_value(email, html_mode) }),
        ContentSelection::Full => serde_json::to_value(email)?,
    })
}

fn body_value(email: &ParsedEmail, html_mode: HtmlMode) -> Value {
    match html_mode {
        HtmlMode::Text => Value::String(plain_text(email)),
        HtmlMode::Html => Value::String(
            email
                .html
                .clone()
                .unwrap_or_else(|| email.text.clone().unwrap_or_default()),
        ),
        HtmlMode::Both => json!({ "text": email.text, "html": email.html }),
    }
}

// ── Raw rendering ───────────────────────────────────────────────────

fn render_raw(email: &ParsedEmail, selection: ContentSelection, html_mode: HtmlMode) -> String {
    match selection {
        ContentSelection::Subject => email.subject.clone(),
        ContentSelection::Body => match html_mode {
            HtmlMode::Html => email
                .html
                .clone()
                .unwrap_or_else(|| plain_text(email)),
            HtmlMode::Text | HtmlMode::Both => plain_text(email),
        },
        ContentSelection::Full => render_full(email),
    }
}

/// A readable plain-text rendering: headers, body, attachment listing.
fn render_full(email: &ParsedEmail) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "From: {}", email.from);
    let _ = writeln!(out, "To: {}", email.to.join(", "));
    if !email.cc.is_empty() {
        let _ = writeln!(out, "Cc: {}", email.cc.join(", "));
    }
    let _ = writeln!(out, "Subject: {}", email.subject);
    if let Some(date) = email.date {
        let _ = writeln!(out, "Date: {}", date.to_rfc2822());
    }
    if let Some(id) = &email.message_id {
        let _ = writeln!(out, "Message-ID: {id}");
    }

    out.push('\n');
    out.push_str(&plain_text(email));

    if !email.attachments.is_empty() {
        out.push_str("\n\nAttachments:\n");
        for attachment in &email.attachments {
            let _ = writeln!(
                out,
                "- {} ({}, {} bytes)",
                attachment.filename.as_deref().unwrap_or("(unnamed)"),
                attachment
                    .content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream"),
                attachment.size
            );
        }
    }
    out
}

// ── Text helpers ────────────────────────────────────────────────────

/// The text body, else the HTML body with tags stripped, else empty.
pub fn plain_text(email: &ParsedEmail) -> String {
    match (&email.text, &email.html) {
        (Some(text), _) => text.clone(),
        (None, Some(html)) => strip_html(html),
        (None, None) => String::new(),
    }
}

/// Drop tags and collapse whitespace. Block-level tags separate words;
/// entities are left as-is.
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut tag = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                if is_block_tag(&tag) {
                    result.push(' ');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => result.push(ch),
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_block_tag(tag: &str) -> bool {
    let name = tag
        .trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    matches!(
        name.as_str(),
        "p" | "div" | "br" | "li" | "tr" | "td" | "th" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
            | "table" | "ul" | "ol" | "blockquote" | "hr"
    )
}
