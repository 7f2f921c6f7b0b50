use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of the given bytes; the checksum used for payload
/// identity throughout the pipeline.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
