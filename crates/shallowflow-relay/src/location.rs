//! Location payload parsing.

use serde_json::{Map, Value};

use shallowflow_core::{Result, ShallowFlowError};

/// Parse a JSON-encoded location and keep only keys present in `schema`.
pub fn filter_location(raw: &str, schema: &[String]) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(fields) = value else {
        return Err(ShallowFlowError::Protocol(
            "location payload must be a JSON object".into(),
        ));
    };

    Ok(fields
        .into_iter()
        .filter(|(key, _)| schema.iter().any(|s| s == key))
        .collect())
}
