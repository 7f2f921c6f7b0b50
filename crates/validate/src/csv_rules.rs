//! CSV structural validation: delimiter probing and row shape constraints.

use intake_core::IntakeError;

/// Delimiters probed, in preference order on ties.
const DELIMITERS: [u8; 3] = [b',', b'\t', b';'];

/// Default cap on total rows.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

fn reader(text: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
}

/// Number of rows and first-row column count, or `None` on a parse error.
pub fn row_shape(text: &str, delimiter: u8) -> Option<(usize, usize)> {
    let mut rows = 0usize;
    let mut first_cols = 0usize;
    for record in reader(text, delimiter).records() {
        let record = record.ok()?;
        if rows == 0 {
            first_cols = record.len();
        }
        rows += 1;
    }
    Some((rows, first_cols))
}

/// Pick the delimiter yielding the most columns in the first row.
pub fn probe_delimiter(text: &str) -> u8 {
    let mut best = b',';
    let mut max_cols = 0usize;
    for delim in DELIMITERS {
        if let Some((rows, cols)) = row_shape(text, delim) {
            if rows > 0 && cols > max_cols {
                max_cols = cols;
                best = delim;
            }
        }
    }
    best
}

/// Validate CSV structure: every row must have the header row's column
/// count, the data-row count is capped, and empty input fails. Reported
/// rows exclude the header. Returns structured details for the record.
pub fn validate(payload: &[u8], max_rows: usize) -> Result<serde_json::Value, IntakeError> {
    let text = String::from_utf8_lossy(payload);
    let delim = probe_delimiter(&text);

    let mut total_rows = 0usize;
    let mut column_count: Option<usize> = None;
    for record in reader(&text, delim).records() {
        let record =
            record.map_err(|e| IntakeError::Validation(format!("CSV parse error: {e}")))?;
        total_rows += 1;
        match column_count {
            None => column_count = Some(record.len()),
            Some(cols) if record.len() != cols => {
                return Err(IntakeError::Validation(
                    "CSV column count mismatch".to_string(),
                ));
            }
            Some(_) => {}
        }
        if total_rows > max_rows {
            return Err(IntakeError::Validation("CSV exceeds max rows".to_string()));
        }
    }
    if total_rows == 0 {
        return Err(IntakeError::Validation("CSV has no rows".to_string()));
    }

    Ok(serde_json::json!({
        "delimiter": (delim as char).to_string(),
        "rows": total_rows - 1,
        "columns": column_count.unwrap_or(0),
    }))
}
