//! SHA-256 chunk checksums

use sha2::{Digest, Sha256};
use streamvault_core::{Error, Result};

/// Hex-encoded SHA-256 of `data`
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Check `data` against the recorded checksum of `chunk_id`
pub fn verify_checksum(chunk_id: &str, data: &[u8], expected: &str) -> Result<()> {
    let actual = compute_checksum(data);
    if actual != expected {
        return Err(Error::ChecksumMismatch {
            chunk_id: chunk_id.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            compute_checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_verify() {
        let sum = compute_checksum(b"segment");
        assert!(verify_checksum("c1", b"segment", &sum).is_ok());
        let err = verify_checksum("c1", b"segmenT", &sum).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }
}
