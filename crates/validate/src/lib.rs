//! Payload classification and structural validation.
//!
//! [`detector::detect`] classifies raw bytes as JSON/CSV/TEXT/UNKNOWN;
//! [`validate_payload`] applies the global size/emptiness gate followed by
//! format-specific rules, always returning a [`ValidationResult`] — a
//! failing payload is recorded, not dropped.

pub mod csv_rules;
pub mod detector;
pub mod encoding;
pub mod json_rules;
pub mod text_rules;


use intake_core::{PayloadFormat, ValidationStatus};

pub use detector::Detection;
pub use json_rules::JsonLimits;
pub use text_rules::TextLimits;

// Validation codes persisted on records.
pub const CODE_SIZE_OR_EMPTY: &str = "SIZE_OR_EMPTY";
pub const CODE_JSON_OK: &str = "JSON_OK";
pub const CODE_JSON_INVALID: &str = "JSON_INVALID";
pub const CODE_CSV_OK: &str = "CSV_OK";
pub const CODE_CSV_INVALID: &str = "CSV_INVALID";
pub const CODE_TEXT_OK: &str = "TEXT_OK";
pub const CODE_TEXT_INVALID: &str = "TEXT_INVALID";

/// Outcome of validating one payload, persisted alongside its record.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub message: String,
    pub code: String,
    pub details: serde_json::Value,
}

impl ValidationResult {
    fn passed(code: &str, details: serde_json::Value) -> Self {
        Self {
            status: ValidationStatus::Passed,
            message: "OK".to_string(),
            code: code.to_string(),
            details,
        }
    }

    fn failed(code: &str, message: String) -> Self {
        Self {
            status: ValidationStatus::Failed,
            message,
            code: code.to_string(),
            details: serde_json::Value::Null,
        }
    }
}

/// Caps applied across all validators.
#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    /// Global payload size bound, checked before any format rule.
    pub max_payload_size_bytes: usize,
    pub json: JsonLimits,
    pub text: TextLimits,
    pub csv_max_rows: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_payload_size_bytes: 5 * 1024 * 1024,
            json: JsonLimits::default(),
            text: TextLimits::default(),
            csv_max_rows: csv_rules::DEFAULT_MAX_ROWS,
        }
    }
}

/// Validate payload bytes against the rules for the detected format.
pub fn validate_payload(
    content: &[u8],
    format: PayloadFormat,
    config: &ValidatorConfig,
) -> ValidationResult {
    if content.is_empty() {
        return ValidationResult::failed(CODE_SIZE_OR_EMPTY, "Content is empty".to_string());
    }
    if content.len() > config.max_payload_size_bytes {
        return ValidationResult::failed(
            CODE_SIZE_OR_EMPTY,
            "Content exceeds size limit".to_string(),
        );
    }

    match format {
        PayloadFormat::Json => match json_rules::validate(content, config.json) {
            Ok(details) => ValidationResult::passed(CODE_JSON_OK, details),
            Err(e) => ValidationResult::failed(CODE_JSON_INVALID, e.to_string()),
        },
        PayloadFormat::Csv => match csv_rules::validate(content, config.csv_max_rows) {
            Ok(details) => ValidationResult::passed(CODE_CSV_OK, details),
            Err(e) => ValidationResult::failed(CODE_CSV_INVALID, e.to_string()),
        },
        // UNKNOWN payloads fall through to the text rules.
        PayloadFormat::Text | PayloadFormat::Unknown => {
            match text_rules::validate(content, config.text) {
                Ok(details) => ValidationResult::passed(CODE_TEXT_OK, details),
                Err(e) => ValidationResult::failed(CODE_TEXT_INVALID, e.to_string()),
            }
        }
    }
}
