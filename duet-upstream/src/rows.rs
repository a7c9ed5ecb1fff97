//! Row extraction from upstream response bodies.
//!
//! The generator answers with either a bare JSON array of row objects or an
//! envelope object holding that array under `data`, `rows` or `records`.

use duet_core::{ReportRow, SourceReport, UpstreamError};
use serde_json::Value;

const ENVELOPE_KEYS: [&str; 3] = ["data", "rows", "records"];

/// Pull the ordered row objects out of a response body.
pub fn extract_rows(report: SourceReport, body: Value) -> Result<Vec<ReportRow>, UpstreamError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut envelope) => {
            let key = ENVELOPE_KEYS
                .iter()
                .find(|key| matches!(envelope.get(**key), Some(Value::Array(_))))
                .ok_or_else(|| UpstreamError::InvalidResponse {
                    report,
                    reason: "object body has no data, rows or records array".to_string(),
                })?;
            match envelope.remove(*key) {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(UpstreamError::InvalidResponse {
                        report,
                        reason: format!("envelope field '{}' is not an array", key),
                    })
                }
            }
        }
        other => {
            return Err(UpstreamError::InvalidResponse {
                report,
                reason: format!("expected array or object body, got {}", json_kind(&other)),
            })
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(row) => Ok(row),
            other => Err(UpstreamError::InvalidResponse {
                report,
                reason: format!("row {} is {}, expected object", index, json_kind(&other)),
            }),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
