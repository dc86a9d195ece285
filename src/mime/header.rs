//! Header block handling: line unfolding, RFC 2047 encoded words,
//! parameterized values (`Content-Type`, `Content-Disposition`), addresses.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::mime::encoding::{self, BASE64_LENIENT};

static ENCODED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"=\?([^?\s]+)\?([QqBb])\?([^?\s]*)\?=").expect("encoded-word pattern is valid")
});

// ── Header map ──────────────────────────────────────────────────────

/// Decoded message headers in arrival order.
///
/// Names are lower-cased; values are unfolded and have encoded words decoded.
/// Lookups return the first occurrence of a name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// First value for `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All `(name, value)` pairs in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The parsed `Content-Type`, defaulting to `text/plain`.
    pub fn content_type(&self) -> ContentType {
        ContentType::parse(self.get("content-type"))
    }

    fn push(&mut self, name: String, value: String) {
        self.entries.push((name, value));
    }
}

/// Split a message (or MIME part) at the first empty line.
///
/// Returns `(header_block, body)`, or `None` when no empty line exists.
/// Both CRLF and bare LF line endings are accepted.
pub(crate) fn split_message(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    let mut start = 0;
    loop {
        let newline = raw[start..].iter().position(|&b| b == b'\n').map(|i| start + i);
        let line = &raw[start..newline.unwrap_or(raw.len())];
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        match newline {
            Some(nl) if line.is_empty() => return Some((&raw[..start], &raw[nl + 1..])),
            Some(nl) => start = nl + 1,
            None => return None,
        }
    }
}

/// Parse a raw header block into a [`HeaderMap`].
pub(crate) fn parse_headers(block: &[u8]) -> HeaderMap {
    let text = String::from_utf8_lossy(block);
    let mut unfolded: Vec<(String, String)> = Vec::new();

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = unfolded.last_mut() {
                let continuation = line.trim();
                if !continuation.is_empty() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(continuation);
                }
            }
            continue;
        }

        match line.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                unfolded.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
            _ => debug!(line = %line, "Skipping header line without a name"),
        }
    }

    let mut headers = HeaderMap::default();
    for (name, value) in unfolded {
        headers.push(name, decode_encoded_words(&value));
    }
    headers
}

// ── RFC 2047 ────────────────────────────────────────────────────────

/// Decode every `=?charset?Q|B?payload?=` sequence in a header value.
///
/// Whitespace between two adjacent decoded words is dropped. A word that
/// fails to decode is kept verbatim, along with the whitespace around it.
pub fn decode_encoded_words(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_end = 0;
    let mut previous_decoded = false;

    for caps in ENCODED_WORD.captures_iter(value) {
        let Some(whole) = caps.get(0) else { continue };
        let gap = &value[last_end..whole.start()];
        let decoded = decode_word(&caps);
        // Only a gap between two decoded words is dropped.
        if !(previous_decoded && decoded.is_some() && gap.trim().is_empty()) {
            out.push_str(gap);
        }

        match decoded {
            Some(decoded) => {
                out.push_str(&decoded);
                previous_decoded = true;
            }
            None => {
                debug!(word = whole.as_str(), "Leaving undecodable encoded word as-is");
                out.push_str(whole.as_str());
                previous_decoded = false;
            }
        }
        last_end = whole.end();
    }

    out.push_str(&value[last_end..]);
    out
}

fn decode_word(caps: &Captures<'_>) -> Option<String> {
    // RFC 2231 allows a language suffix: `UTF-8*en`.
    let charset = caps[1].split('*').next().unwrap_or_default();
    let payload = caps[3].as_bytes();

    let bytes = match &caps[2] {
        "B" | "b" => {
            use base64::Engine;
            BASE64_LENIENT.decode(payload).ok()?
        }
        _ => encoding::decode_q_word(payload),
    };

    encoding::decode_charset_strict(&bytes, charset)
}

// ── Parameterized values ────────────────────────────────────────────

/// A parsed `Content-Type` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Lower-cased `type/subtype`.
    pub mime_type: String,
    /// Parameters with lower-cased names and unquoted values.
    pub params: HashMap<String, String>,
}

impl ContentType {
    /// Parse a header value; `None` yields `text/plain`.
    pub fn parse(value: Option<&str>) -> Self {
        let (mime_type, params) = value.map(parse_parameterized).unwrap_or_default();
        let mime_type = if mime_type.is_empty() {
            "text/plain".to_string()
        } else {
            mime_type
        };
        Self { mime_type, params }
    }

    pub fn is_multipart(&self) -> bool {
        self.mime_type.starts_with("multipart/")
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Declared charset, `utf-8` when absent.
    pub fn charset(&self) -> &str {
        self.param("charset").unwrap_or("utf-8")
    }
}

/// Split `value; key=val; key2="quoted val"` into a lower-cased main value
/// and a parameter map.
///
/// RFC 2231 extended parameters (`filename*=utf-8''na%C3%AFve.txt`) are
/// decoded and stored under their plain name, taking precedence.
pub(crate) fn parse_parameterized(value: &str) -> (String, HashMap<String, String>) {
    let mut pieces = split_unquoted(value, ';').into_iter();
    let main = pieces.next().unwrap_or_default().trim().to_ascii_lowercase();

    let mut params = HashMap::new();
    let mut extended = HashMap::new();
    for piece in pieces {
        let Some((key, val)) = piece.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let val = unquote(val.trim());

        if let Some(plain) = key.strip_suffix('*') {
            if let Some(decoded) = decode_extended_param(&val) {
                extended.insert(plain.to_string(), decoded);
            }
        } else {
            params.insert(key, val);
        }
    }
    params.extend(extended);

    (main, params)
}

fn decode_extended_param(value: &str) -> Option<String> {
    let mut parts = value.splitn(3, '\'');
    let (charset, _lang, encoded) = (parts.next()?, parts.next()?, parts.next()?);
    let bytes = encoding::percent_decode(encoded.as_bytes());
    let charset = if charset.is_empty() { "us-ascii" } else { charset };
    encoding::decode_charset_strict(&bytes, charset)
}

fn unquote(value: &str) -> String {
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => value.to_string(),
    }
}

/// Split on `sep`, ignoring separators inside double quotes.
pub(crate) fn split_unquoted(value: &str, sep: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, ch) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                pieces.push(&value[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&value[start..]);
    pieces
}

// ── Addresses ───────────────────────────────────────────────────────

/// Split an address-list header on commas outside quotes.
pub(crate) fn split_addresses(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            split_unquoted(v, ',')
                .into_iter()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Extract the bare address from `"Name" <addr>` or a plain `addr`.
pub fn bare_address(value: &str) -> &str {
    let value = value.trim();
    if let Some(open) = value.rfind('<')
        && let Some(close) = value[open..].find('>')
    {
        return value[open + 1..open + close].trim();
    }
    value
}

/// Domain part of an address (after the last `@`), if any.
pub fn domain_of(address: &str) -> Option<&str> {
    bare_address(address)
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|d| !d.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_crlf_message() {
        let raw = b"Subject: hi\r\nFrom: a@b.c\r\n\r\nbody\r\n";
        let (head, body) = split_message(raw).unwrap();
        assert_eq!(head, b"Subject: hi\r\nFrom: a@b.c\r\n");
        assert_eq!(body, b"body\r\n");
    }

    #[test]
    fn split_lf_message() {
        let (head, body) = split_message(b"Subject: hi\n\nbody").unwrap();
        assert_eq!(head, b"Subject: hi\n");
        assert_eq!(body, b"body");
    }

    #[test]
    fn split_without_blank_line_fails() {
        assert!(split_message(b"Subject: hi\r\nFrom: a@b.c\r\n").is_none());
        assert!(split_message(b"").is_none());
    }

    #[test]
    fn split_leading_blank_line_means_no_headers() {
        let (head, body) = split_message(b"\r\nonly body").unwrap();
        assert!(head.is_empty());
        assert_eq!(body, b"only body");
    }

    #[test]
    fn unfolds_continuation_lines() {
        let headers = parse_headers(b"Subject: first\r\n  second\r\n\tthird\r\nTo: x@y.z\r\n");
        assert_eq!(headers.get("subject"), Some("first second third"));
        assert_eq!(headers.get("TO"), Some("x@y.z"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn first_occurrence_wins() {
        let headers = parse_headers(b"Received: one\r\nReceived: two\r\n");
        assert_eq!(headers.get("received"), Some("one"));
        assert_eq!(headers.iter().count(), 2);
    }

    #[test]
    fn decodes_base64_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?44OG44K544OI?="), "テスト");
    }

    #[test]
    fn decodes_q_word() {
        assert_eq!(
            decode_encoded_words("=?iso-8859-1?Q?Caf=E9_au_lait?="),
            "Café au lait"
        );
    }

    #[test]
    fn joins_adjacent_encoded_words() {
        assert_eq!(
            decode_encoded_words("=?UTF-8?Q?Hello?= =?UTF-8?Q?_World?="),
            "Hello World"
        );
    }

    #[test]
    fn keeps_text_around_encoded_words() {
        assert_eq!(
            decode_encoded_words("Re: =?UTF-8?B?44OG44K544OI?= (fwd)"),
            "Re: テスト (fwd)"
        );
    }

    #[test]
    fn leaves_bad_words_untouched() {
        let value = "=?UTF-8?B?!!!not-base64?=";
        assert_eq!(decode_encoded_words(value), value);
        let unknown = "=?x-no-such-charset?Q?abc?=";
        assert_eq!(decode_encoded_words(unknown), unknown);
    }

    #[test]
    fn bad_word_after_good_word_keeps_its_space() {
        assert_eq!(
            decode_encoded_words("=?UTF-8?Q?ok?= =?UTF-8?B?!!!?="),
            "ok =?UTF-8?B?!!!?="
        );
        assert_eq!(
            decode_encoded_words("=?UTF-8?B?!!!?= =?UTF-8?Q?ok?="),
            "=?UTF-8?B?!!!?= ok"
        );
    }

    #[test]
    fn parses_content_type_params() {
        let ct = ContentType::parse(Some(
            "Multipart/Alternative; boundary=\"b1; with semi\"; CHARSET=ISO-2022-JP",
        ));
        assert_eq!(ct.mime_type, "multipart/alternative");
        assert!(ct.is_multipart());
        assert_eq!(ct.param("boundary"), Some("b1; with semi"));
        assert_eq!(ct.charset(), "ISO-2022-JP");
    }

    #[test]
    fn content_type_defaults() {
        let ct = ContentType::parse(None);
        assert_eq!(ct.mime_type, "text/plain");
        assert_eq!(ct.charset(), "utf-8");
    }

    #[test]
    fn extended_filename_parameter() {
        let (main, params) =
            parse_parameterized("attachment; filename=plain.txt; filename*=UTF-8''na%C3%AFve.txt");
        assert_eq!(main, "attachment");
        assert_eq!(params.get("filename").map(String::as_str), Some("naïve.txt"));
    }

    #[test]
    fn splits_addresses_outside_quotes() {
        let list = split_addresses(Some("\"Doe, Jane\" <jane@x.com>, bob@y.com ,, "));
        assert_eq!(list, vec!["\"Doe, Jane\" <jane@x.com>", "bob@y.com"]);
        assert!(split_addresses(None).is_empty());
    }

    #[test]
    fn bare_address_forms() {
        assert_eq!(bare_address("Alice <alice@example.com>"), "alice@example.com");
        assert_eq!(bare_address("  bob@example.com "), "bob@example.com");
        assert_eq!(domain_of("Carol <carol@Example.org>"), Some("Example.org"));
        assert_eq!(domain_of("no-domain"), None);
    }
}
