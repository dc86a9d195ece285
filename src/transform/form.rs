//! Flattening a selected payload into `application/x-www-form-urlencoded` pairs.

use serde_json::Value;

use crate::error::DispatchError;

/// Flatten a JSON object into string pairs.
///
/// - scalars are stringified, nulls omitted
/// - arrays are joined with `,` (non-string items JSON-stringified)
/// - a `body` object shaped `{text, html}` becomes `body_text` / `body_html`
/// - any other nested object is JSON-stringified as one value
pub fn flatten(value: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = value else {
        return scalar(value)
            .map(|v| vec![("value".to_string(), v)])
            .unwrap_or_default();
    };

    let mut pairs = Vec::with_capacity(map.len());
    for (key, field) in map {
        match field {
            Value::Null => {}
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(|item| scalar(item).unwrap_or_else(|| item.to_string()))
                    .collect::<Vec<_>>()
                    .join(",");
                pairs.push((key.clone(), joined));
            }
            Value::Object(inner) if key == "body" && is_text_html_pair(inner) => {
                for part in ["text", "html"] {
                    if let Some(v) = inner.get(part).and_then(scalar) {
                        pairs.push((format!("body_{part}"), v));
                    }
                }
            }
            Value::Object(_) => pairs.push((key.clone(), field.to_string())),
            other => {
                if let Some(v) = scalar(other) {
                    pairs.push((key.clone(), v));
                }
            }
        }
    }
    pairs
}

/// Flatten and URL-encode.
pub fn encode(value: &Value) -> Result<String, DispatchError> {
    Ok(serde_urlencoded::to_string(flatten(value))?)
}

fn is_text_html_pair(object: &serde_json::Map<String, Value>) -> bool {
    object.contains_key("text")
        && object.contains_key("html")
        && object.keys().all(|k| k == "text" || k == "html")
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
