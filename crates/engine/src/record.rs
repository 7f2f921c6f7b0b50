//! Record builder: classify and validate a raw payload, then shape it
//! for persistence. A failing validation still produces a record; runs
//! never drop payloads on validation grounds.

use intake_core::model::{NewRecord, RawPayload};
use intake_core::sha256_hex;
use intake_validate::{detector, validate_payload, ValidatorConfig};

const PREVIEW_CHARS: usize = 200;

pub struct RecordBuilder {
    config: ValidatorConfig,
}

impl RecordBuilder {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, run_id: &str, source_id: i64, payload: &RawPayload) -> NewRecord {
        let detection = detector::detect(&payload.body);
        let validation = validate_payload(&payload.body, detection.format, &self.config);

        let checksum = payload
            .checksum
            .clone()
            .unwrap_or_else(|| sha256_hex(&payload.body));
        let encoding = payload
            .encoding
            .clone()
            .or_else(|| detection.encoding.map(str::to_string));

        let metadata = serde_json::json!({
            "preview": preview(&payload.body),
            "encoding": encoding,
        })
        .to_string();

        NewRecord {
            run_id: run_id.to_string(),
            source_id,
            format: detection.format,
            raw_size: detection.raw_size as i64,
            payload: payload.body.clone(),
            payload_path: None,
            checksum,
            validation_status: validation.status,
            validation_message: validation.message,
            validation_code: validation.code,
            validation_details: validation.details,
            content_type: payload.content_type.clone(),
            source_uri: payload.uri.clone(),
            status_code: payload.status_code,
            row_count: payload.row_count,
            columns: payload.columns.as_ref().map(|c| c.join(",")),
            metadata: Some(metadata),
        }
    }
}

fn preview(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(PREVIEW_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::{PayloadFormat, ValidationStatus};

    fn builder() -> RecordBuilder {
        RecordBuilder::new(ValidatorConfig::default())
    }

    #[test]
    fn csv_payload_classified_and_passed() {
        let payload = RawPayload {
            body: b"a,b\n1,2".to_vec(),
            ..Default::default()
        };
        let record = builder().build("r1", 3, &payload);
        assert_eq!(record.format, PayloadFormat::Csv);
        assert_eq!(record.raw_size, 7);
        assert_eq!(record.validation_status, ValidationStatus::Passed);
        assert_eq!(record.checksum, sha256_hex(b"a,b\n1,2"));
    }

    #[test]
    fn invalid_json_is_recorded_as_failed_not_dropped() {
        // Deep nesting past the limit: still classified JSON, fails rules.
        let deep = format!("{}1{}", "[".repeat(12), "]".repeat(12));
        let payload = RawPayload {
            body: deep.into_bytes(),
            ..Default::default()
        };
        let record = builder().build("r1", 3, &payload);
        assert_eq!(record.format, PayloadFormat::Json);
        assert_eq!(record.validation_status, ValidationStatus::Failed);
        assert_eq!(record.validation_code, "JSON_INVALID");
    }

    #[test]
    fn adapter_checksum_and_columns_are_carried_through() {
        let payload = RawPayload {
            body: b"[{\"a\":1}]".to_vec(),
            checksum: Some("precomputed".to_string()),
            columns: Some(vec!["a".to_string(), "b".to_string()]),
            row_count: Some(1),
            ..Default::default()
        };
        let record = builder().build("r1", 3, &payload);
        assert_eq!(record.checksum, "precomputed");
        assert_eq!(record.columns.as_deref(), Some("a,b"));
        assert_eq!(record.row_count, Some(1));
    }

    #[test]
    fn metadata_carries_a_bounded_preview() {
        let payload = RawPayload {
            body: "x".repeat(1000).into_bytes(),
            ..Default::default()
        };
        let record = builder().build("r1", 3, &payload);
        let meta: serde_json::Value =
            serde_json::from_str(record.metadata.as_deref().unwrap()).unwrap();
        assert_eq!(meta["preview"].as_str().unwrap().len(), PREVIEW_CHARS);
    }
}
