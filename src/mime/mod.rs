//! RFC 5322 / MIME parsing: raw message bytes into a [`ParsedEmail`].
//!
//! Parsing is a pure function of the input bytes:
//! 1. Split the header block from the body at the first empty line
//! 2. Unfold and decode headers (RFC 2047 encoded words)
//! 3. Walk the body: multipart sections recursively, single parts decoded
//!    per `Content-Transfer-Encoding` and converted to UTF-8
//! 4. Assemble the record
//!
//! The first `text/plain` part becomes `text`, the first `text/html` part
//! becomes `html`; everything else is an [`Attachment`].

pub mod encoding;
pub mod header;
mod multipart;

pub use header::{ContentType, HeaderMap, bare_address, decode_encoded_words, domain_of};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::ParseError;

/// Nested multiparts deeper than this are not descended into.
const MAX_MULTIPART_DEPTH: usize = 16;

// ── Parsed message ──────────────────────────────────────────────────

/// Structured content of one inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEmail {
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub message_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
    /// All decoded headers, for lookups the record does not surface.
    #[serde(skip)]
    pub headers: HeaderMap,
}

impl ParsedEmail {
    /// Use `recipient` as the only `to` address when the message had none.
    pub fn with_fallback_recipient(mut self, recipient: &str) -> Self {
        if self.to.is_empty() && !recipient.trim().is_empty() {
            self.to.push(recipient.trim().to_string());
        }
        self
    }

    /// First value of an arbitrary header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// A non-body MIME part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    /// Transfer-decoded bytes; serialized as base64.
    #[serde(serialize_with = "serialize_base64")]
    pub content: Vec<u8>,
    /// Decoded size in bytes.
    pub size: usize,
}

fn serialize_base64<S: Serializer>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    use base64::Engine;
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(content))
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Parse raw RFC 5322 bytes.
///
/// Fails only when there is no empty line separating headers from body;
/// every other irregularity degrades gracefully.
pub fn parse(raw: &[u8]) -> Result<ParsedEmail, ParseError> {
    let (head, body) = header::split_message(raw).ok_or(ParseError::MissingHeaderSeparator)?;
    let headers = header::parse_headers(head);

    let mut content = BodyContent::default();
    collect_message_body(&headers, body, &mut content, 0);

    let email = ParsedEmail {
        subject: headers.get("subject").unwrap_or_default().to_string(),
        from: headers.get("from").unwrap_or_default().to_string(),
        to: header::split_addresses(headers.get("to")),
        cc: header::split_addresses(headers.get("cc")),
        bcc: header::split_addresses(headers.get("bcc")),
        message_id: headers
            .get("message-id")
            .map(str::to_string)
            .filter(|id| !id.is_empty()),
        date: headers.get("date").and_then(parse_date),
        text: content.text,
        html: content.html,
        attachments: content.attachments,
        headers,
    };

    debug!(
        subject = %email.subject,
        has_text = email.text.is_some(),
        has_html = email.html.is_some(),
        attachments = email.attachments.len(),
        "Parsed inbound message"
    );

    Ok(email)
}

#[derive(Default)]
struct BodyContent {
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
}

/// Top-level body: multipart is walked, anything else becomes `text` or `html`.
fn collect_message_body(headers: &HeaderMap, body: &[u8], content: &mut BodyContent, depth: usize) {
    let content_type = headers.content_type();
    if collect_multipart(&content_type, body, content, depth) {
        return;
    }

    let decoded = decode_text(headers, &content_type, body);
    if content_type.mime_type.contains("text/html") {
        content.html = Some(decoded);
    } else {
        content.text = Some(decoded);
    }
}

/// Returns `false` when the body is not a usable multipart (no boundary),
/// so the caller falls back to single-part decoding.
fn collect_multipart(
    content_type: &ContentType,
    body: &[u8],
    content: &mut BodyContent,
    depth: usize,
) -> bool {
    if !content_type.is_multipart() {
        return false;
    }
    let Some(boundary) = content_type.param("boundary") else {
        debug!(mime_type = %content_type.mime_type, "Multipart without boundary, decoding as single part");
        return false;
    };
    if depth >= MAX_MULTIPART_DEPTH {
        debug!(depth, "Multipart nesting too deep, skipping");
        return true;
    }

    for section in multipart::split_sections(body, boundary) {
        let (part_headers, part_body) = match header::split_message(section) {
            Some((head, rest)) => (header::parse_headers(head), rest),
            // A section without an empty line is all headers.
            None => (header::parse_headers(section), &section[section.len()..]),
        };
        collect_part(&part_headers, part_body, content, depth + 1);
    }
    true
}

fn collect_part(headers: &HeaderMap, body: &[u8], content: &mut BodyContent, depth: usize) {
    let content_type = headers.content_type();
    if collect_multipart(&content_type, body, content, depth) {
        return;
    }

    let (disposition, disposition_params) = headers
        .get("content-disposition")
        .map(header::parse_parameterized)
        .unwrap_or_default();
    let is_attachment = disposition == "attachment";

    if !is_attachment {
        if content_type.mime_type == "text/plain" && content.text.is_none() {
            content.text = Some(decode_text(headers, &content_type, body));
            return;
        }
        if content_type.mime_type == "text/html" && content.html.is_none() {
            content.html = Some(decode_text(headers, &content_type, body));
            return;
        }
    }

    let bytes = encoding::decode_transfer(body, headers.get("content-transfer-encoding"));
    let filename = disposition_params
        .get("filename")
        .or_else(|| content_type.params.get("name"))
        .filter(|name| !name.is_empty())
        .cloned();

    content.attachments.push(Attachment {
        filename,
        content_type: headers
            .get("content-type")
            .map(|_| content_type.mime_type.clone()),
        size: bytes.len(),
        content: bytes,
    });
}

fn decode_text(headers: &HeaderMap, content_type: &ContentType, body: &[u8]) -> String {
    let bytes = encoding::decode_transfer(body, headers.get("content-transfer-encoding"));
    encoding::to_utf8(&bytes, content_type.charset())
}

/// RFC 2822 date, tolerating a trailing `(comment)`.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let without_comment = match value.rfind('(') {
        Some(open) if value.ends_with(')') => value[..open].trim_end(),
        _ => value,
    };

    DateTime::parse_from_rfc2822(without_comment)
        .or_else(|_| DateTime::parse_from_rfc3339(without_comment))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| debug!(date = %value, error = %e, "Unparsable Date header"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SIMPLE: &[u8] = b"From: Alice <alice@example.com>\r\n\
To: bob@example.com, \"Smith, Carol\" <carol@example.com>\r\n\
Cc: dave@example.com\r\n\
Subject: Hello\r\n\
Message-ID: <abc123@example.com>\r\n\
Date: Tue, 14 Jan 2025 10:30:00 +0100\r\n\
\r\n\
Plain body.\r\n";

    #[test]
    fn parses_simple_message() {
        let email = parse(SIMPLE).unwrap();
        assert_eq!(email.subject, "Hello");
        assert_eq!(email.from, "Alice <alice@example.com>");
        assert_eq!(
            email.to,
            vec!["bob@example.com", "\"Smith, Carol\" <carol@example.com>"]
        );
        assert_eq!(email.cc, vec!["dave@example.com"]);
        assert!(email.bcc.is_empty());
        assert_eq!(email.message_id.as_deref(), Some("<abc123@example.com>"));
        assert_eq!(
            email.date,
            Some(Utc.with_ymd_and_hms(2025, 1, 14, 9, 30, 0).unwrap())
        );
        assert_eq!(email.text.as_deref(), Some("Plain body.\r\n"));
        assert!(email.html.is_none());
        assert!(email.attachments.is_empty());
    }

    #[test]
    fn parsing_is_deterministic() {
        assert_eq!(parse(SIMPLE).unwrap(), parse(SIMPLE).unwrap());
    }

    #[test]
    fn missing_separator_is_an_error() {
        let err = parse(b"Subject: no body\r\nFrom: a@b.c\r\n").unwrap_err();
        assert!(matches!(err, ParseError::MissingHeaderSeparator));
    }

    #[test]
    fn decodes_encoded_subject() {
        let email = parse(b"Subject: =?UTF-8?B?44OG44K544OI?=\r\n\r\nx").unwrap();
        assert_eq!(email.subject, "テスト");
    }

    #[test]
    fn single_part_html() {
        let raw = b"Content-Type: text/html; charset=utf-8\r\n\r\n<p>Hi</p>";
        let email = parse(raw).unwrap();
        assert_eq!(email.html.as_deref(), Some("<p>Hi</p>"));
        assert!(email.text.is_none());
    }

    #[test]
    fn single_part_quoted_printable() {
        let raw = b"Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\r\n\
Caf=C3=A9 =\r\nlong line";
        let email = parse(raw).unwrap();
        assert_eq!(email.text.as_deref(), Some("Café long line"));
    }

    #[test]
    fn single_part_base64_iso2022jp() {
        // "テスト" in ISO-2022-JP, base64-encoded.
        let raw = b"Content-Type: text/plain; charset=ISO-2022-JP\r\n\
Content-Transfer-Encoding: base64\r\n\r\n\
GyRCJUYlOSVIGyhC\r\n";
        let email = parse(raw).unwrap();
        assert_eq!(email.text.as_deref(), Some("テスト"));
    }

    #[test]
    fn multipart_alternative_with_attachment() {
        let raw = b"Subject: report\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
This is a preamble.\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=inner\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
first text\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<b>first html</b>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: text/plain\r\n\
\r\n\
second text\r\n\
--outer\r\n\
Content-Type: application/pdf; name=\"fallback.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQ=\r\n\
--outer--\r\n\
epilogue\r\n";

        let email = parse(raw).unwrap();
        assert_eq!(email.text.as_deref(), Some("first text"));
        assert_eq!(email.html.as_deref(), Some("<b>first html</b>"));
        assert_eq!(email.attachments.len(), 2);

        let duplicate = &email.attachments[0];
        assert_eq!(duplicate.content_type.as_deref(), Some("text/plain"));
        assert_eq!(duplicate.content, b"second text");

        let pdf = &email.attachments[1];
        assert_eq!(pdf.filename.as_deref(), Some("report.pdf"));
        assert_eq!(pdf.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(pdf.content, b"%PDF-1.4");
        assert_eq!(pdf.size, 8);
    }

    #[test]
    fn text_part_marked_attachment_stays_attachment() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
Content-Disposition: attachment; filename=notes.txt\r\n\
\r\n\
attached notes\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
the body\r\n\
--b--\r\n";
        let email = parse(raw).unwrap();
        assert_eq!(email.text.as_deref(), Some("the body"));
        assert_eq!(email.attachments[0].filename.as_deref(), Some("notes.txt"));
    }

    #[test]
    fn multipart_without_boundary_falls_back_to_single_part() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nraw body";
        let email = parse(raw).unwrap();
        assert_eq!(email.text.as_deref(), Some("raw body"));
    }

    #[test]
    fn part_without_headers_defaults_to_text_plain() {
        let raw = b"Content-Type: multipart/alternative; boundary=z\r\n\r\n--z\r\n\r\nbare part\r\n--z--";
        let email = parse(raw).unwrap();
        assert_eq!(email.text.as_deref(), Some("bare part"));
    }

    #[test]
    fn fallback_recipient_only_when_to_missing() {
        let email = parse(b"Subject: x\r\n\r\n").unwrap();
        let email = email.with_fallback_recipient("hook@relay.dev");
        assert_eq!(email.to, vec!["hook@relay.dev"]);

        let email = parse(SIMPLE).unwrap().with_fallback_recipient("hook@relay.dev");
        assert_eq!(email.to.len(), 2);
    }

    #[test]
    fn date_with_comment_and_garbage() {
        let parsed = parse_date("Mon, 6 Jan 2025 08:00:00 +0000 (UTC)");
        assert_eq!(parsed, Some(Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap()));
        assert!(parse_date("yesterday-ish").is_none());
    }

    #[test]
    fn exposes_raw_headers() {
        let email = parse(b"X-Correlation-Id: abc-1\r\n\r\n").unwrap();
        assert_eq!(email.header("x-correlation-id"), Some("abc-1"));
    }

    #[test]
    fn attachment_serializes_as_base64() {
        let attachment = Attachment {
            filename: Some("a.bin".into()),
            content_type: None,
            content: vec![0, 1, 2],
            size: 3,
        };
        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["content"], "AAEC");
        assert_eq!(json["contentType"], serde_json::Value::Null);
    }
}
