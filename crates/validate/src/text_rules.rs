//! Plain-text validation: byte/line caps with the encoding fallback probe.

use intake_core::IntakeError;

use crate::encoding;

pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_MAX_LINES: usize = 50_000;
pub const DEFAULT_MAX_LINE_LENGTH: usize = 2_000;

/// Limits applied to text payloads.
#[derive(Debug, Clone, Copy)]
pub struct TextLimits {
    pub max_bytes: usize,
    pub max_lines: usize,
    pub max_line_length: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_lines: DEFAULT_MAX_LINES,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Validate a text payload. Returns the detected encoding and line count as
/// structured details.
pub fn validate(payload: &[u8], limits: TextLimits) -> Result<serde_json::Value, IntakeError> {
    if payload.len() > limits.max_bytes {
        return Err(IntakeError::Validation("Text exceeds max bytes".to_string()));
    }
    let (text, detected) = encoding::decode(payload);
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() > limits.max_lines {
        return Err(IntakeError::Validation("Text exceeds max lines".to_string()));
    }
    for line in &lines {
        if line.chars().count() > limits.max_line_length {
            return Err(IntakeError::Validation("Text line too long".to_string()));
        }
    }
    Ok(serde_json::json!({ "encoding": detected, "lines": lines.len() }))
}
