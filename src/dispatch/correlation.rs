//! Correlation ids for outbound requests.
//!
//! One base id per message: the inbound correlation header's value when the
//! message carried one, else a fresh UUID v4. With more than one destination,
//! each request gets `<base>-<ordinal>` where the ordinal is the 1-based
//! position in the fan-out set.

use uuid::Uuid;

use crate::mime::ParsedEmail;

/// The message-wide base id.
pub fn base_id(email: &ParsedEmail, header: &str) -> String {
    email
        .header(header)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Id for the destination at `ordinal` (1-based) out of `fan_out`.
pub fn for_destination(base: &str, ordinal: usize, fan_out: usize) -> String {
    if fan_out > 1 {
        format!("{base}-{ordinal}")
    } else {
        base.to_string()
    }
}

/// Ids for a whole fan-out set, in route order.
pub fn assign(base: &str, fan_out: usize) -> Vec<String> {
    (1..=fan_out)
        .map(|ordinal| for_destination(base, ordinal, fan_out))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime;

    #[test]
    fn reuses_inbound_header() {
        let email = mime::parse(b"X-Correlation-Id:  abc-123 \r\nSubject: s\r\n\r\nbody").unwrap();
        assert_eq!(base_id(&email, "x-correlation-id"), "abc-123");
    }

    #[test]
    fn generates_uuid_without_header() {
        let email = mime::parse(b"Subject: s\r\n\r\nbody").unwrap();
        let id = base_id(&email, "X-Correlation-Id");
        assert!(Uuid::parse_str(&id).is_ok());
        assert_ne!(id, base_id(&email, "X-Correlation-Id"));
    }

    #[test]
    fn single_destination_has_no_suffix() {
        assert_eq!(assign("abc", 1), vec!["abc"]);
    }

    #[test]
    fn fan_out_gets_ordinal_suffixes() {
        assert_eq!(assign("abc", 3), vec!["abc-1", "abc-2", "abc-3"]);
    }
}
