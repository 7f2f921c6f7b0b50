//! Heuristic payload classification: JSON, then CSV, then TEXT, else UNKNOWN.

use intake_core::PayloadFormat;

use crate::csv_rules;

/// Outcome of format detection for one payload.
#[derive(Debug, Clone)]
pub struct Detection {
    pub format: PayloadFormat,
    pub raw_size: usize,
    pub encoding: Option<&'static str>,
}

/// Classify payload bytes. The probes are ordered: a valid JSON document is
/// always JSON even if it would also parse as CSV.
pub fn detect(data: &[u8]) -> Detection {
    let raw_size = data.len();
    let text = String::from_utf8_lossy(data);

    if serde_json::from_str::<serde_json::Value>(&text).is_ok() {
        return Detection {
            format: PayloadFormat::Json,
            raw_size,
            encoding: Some("utf-8"),
        };
    }
    if is_csv(&text) {
        return Detection {
            format: PayloadFormat::Csv,
            raw_size,
            encoding: Some("utf-8"),
        };
    }
    if !text.trim().is_empty() {
        return Detection {
            format: PayloadFormat::Text,
            raw_size,
            encoding: Some("utf-8"),
        };
    }
    Detection {
        format: PayloadFormat::Unknown,
        raw_size,
        encoding: None,
    }
}

/// Structural CSV probe: at least one row with at least two comma-separated
/// columns. Column-count consistency is left to validation.
fn is_csv(text: &str) -> bool {
    match csv_rules::row_shape(text, b',') {
        Some((rows, first_cols)) => rows > 0 && first_cols > 1,
        None => false,
    }
}
