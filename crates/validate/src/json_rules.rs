//! JSON structural validation: recursive walk with depth/node/array caps.

use intake_core::IntakeError;
use serde_json::Value;

pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const DEFAULT_MAX_NODES: usize = 5_000;
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 1_000;

/// Structural limits applied to a JSON document.
#[derive(Debug, Clone, Copy)]
pub struct JsonLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
    pub max_array_length: usize,
}

impl Default for JsonLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
        }
    }
}

/// Parse and walk a JSON payload, enforcing the limits. Returns structured
/// details (total node count) on success.
pub fn validate(payload: &[u8], limits: JsonLimits) -> Result<serde_json::Value, IntakeError> {
    let text = String::from_utf8_lossy(payload);
    let data: Value = serde_json::from_str(&text)
        .map_err(|e| IntakeError::Validation(format!("JSON parse error: {e}")))?;

    let mut nodes = 0usize;
    walk(&data, 0, limits, &mut nodes)?;
    Ok(serde_json::json!({ "nodes": nodes }))
}

fn walk(value: &Value, depth: usize, limits: JsonLimits, nodes: &mut usize) -> Result<(), IntakeError> {
    if depth > limits.max_depth {
        return Err(IntakeError::Validation("JSON exceeds max depth".to_string()));
    }
    *nodes += 1;
    if *nodes > limits.max_nodes {
        return Err(IntakeError::Validation("JSON exceeds max nodes".to_string()));
    }
    match value {
        Value::Object(map) => {
            for v in map.values() {
                walk(v, depth + 1, limits, nodes)?;
            }
        }
        Value::Array(items) => {
            if items.len() > limits.max_array_length {
                return Err(IntakeError::Validation("JSON array too long".to_string()));
            }
            for v in items {
                walk(v, depth + 1, limits, nodes)?;
            }
        }
        _ => {}
    }
    Ok(())
}
