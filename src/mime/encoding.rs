//! Transfer-encoding and charset decoding.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use encoding_rs::Encoding;
use tracing::warn;

/// Standard alphabet, padding optional.
pub(crate) const BASE64_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a body according to its `Content-Transfer-Encoding`.
///
/// `7bit`, `8bit`, `binary`, unknown, or absent encodings pass through.
/// A base64 body that fails to decode is passed through unchanged.
pub fn decode_transfer(body: &[u8], transfer_encoding: Option<&str>) -> Vec<u8> {
    let encoding = transfer_encoding
        .map(|e| e.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match encoding.as_str() {
        "quoted-printable" => decode_quoted_printable(body),
        "base64" => decode_base64(body).unwrap_or_else(|| {
            warn!("Invalid base64 body, keeping raw content");
            body.to_vec()
        }),
        _ => body.to_vec(),
    }
}

/// Reverse `=XX` escapes and remove soft line breaks (`=` at end of line).
///
/// Malformed escapes are kept literally.
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];
        if byte != b'=' {
            out.push(byte);
            i += 1;
            continue;
        }

        // Soft break, allowing transport padding between `=` and the newline.
        let rest = &input[i + 1..];
        let padding = rest.iter().take_while(|b| matches!(b, b' ' | b'\t')).count();
        let after_padding = &rest[padding..];
        if after_padding.starts_with(b"\r\n") {
            i += 1 + padding + 2;
            continue;
        }
        if after_padding.starts_with(b"\n") {
            i += 1 + padding + 1;
            continue;
        }

        match (rest.first().and_then(hex_value), rest.get(1).and_then(hex_value)) {
            (Some(high), Some(low)) => {
                out.push((high << 4) | low);
                i += 3;
            }
            _ => {
                out.push(byte);
                i += 1;
            }
        }
    }

    out
}

/// Decode a base64 body, ignoring embedded line breaks and whitespace.
pub fn decode_base64(input: &[u8]) -> Option<Vec<u8>> {
    let compact: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    BASE64_LENIENT.decode(compact).ok()
}

/// RFC 2047 `Q` encoding: quoted-printable plus `_` for space.
pub(crate) fn decode_q_word(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' => match (
                input.get(i + 1).and_then(hex_value),
                input.get(i + 2).and_then(hex_value),
            ) {
                (Some(high), Some(low)) => {
                    out.push((high << 4) | low);
                    i += 3;
                }
                _ => {
                    out.push(b'=');
                    i += 1;
                }
            },
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    out
}

/// `%XX` decoding for RFC 2231 parameter values.
pub(crate) fn percent_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'%'
            && let (Some(high), Some(low)) = (
                input.get(i + 1).and_then(hex_value),
                input.get(i + 2).and_then(hex_value),
            )
        {
            out.push((high << 4) | low);
            i += 3;
            continue;
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

fn hex_value(byte: &u8) -> Option<u8> {
    (*byte as char).to_digit(16).map(|d| d as u8)
}

fn is_utf8_family(charset: &str) -> bool {
    matches!(
        charset.to_ascii_lowercase().as_str(),
        "" | "utf-8" | "utf8" | "us-ascii" | "ascii"
    )
}

/// Decode `bytes` from `charset`, failing on unknown labels or malformed input.
pub(crate) fn decode_charset_strict(bytes: &[u8], charset: &str) -> Option<String> {
    let charset = charset.trim().trim_matches('"');
    if is_utf8_family(charset) {
        return String::from_utf8(bytes.to_vec()).ok();
    }

    let encoding = Encoding::for_label(charset.as_bytes())?;
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        None
    } else {
        Some(text.into_owned())
    }
}

/// Convert decoded body bytes to UTF-8 text.
///
/// UTF-8 and US-ASCII are taken as-is (lossily). Other charsets go through
/// `encoding_rs`; on failure the original bytes are kept as lossy UTF-8.
pub fn to_utf8(bytes: &[u8], charset: &str) -> String {
    if is_utf8_family(charset.trim().trim_matches('"')) {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    match decode_charset_strict(bytes, charset) {
        Some(text) => text,
        None => {
            warn!(charset = %charset, "Charset conversion failed, keeping original text");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
