//! Content digests for the polish pipeline.
//!
//! Every artifact the pipeline tracks is addressed by the SHA-256 of its raw
//! UTF-8 bytes: daily-log contents before modification (backup records),
//! extracted section bodies (topic-file dedup), and the pre-modification
//! hashes recorded in the transaction log for rollback.
//!
//! The serialized form is 64 lowercase hex digits with no prefix; backup
//! files are named `<digest>.md`.

use sha2::{Digest, Sha256};

/// Width of a serialized digest (64 hex chars).
pub const SHA256_HEX_LEN: usize = 64;

/// Compute the SHA-256 of arbitrary bytes as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Returns true when `s` has the shape of a `sha256_hex` output.
///
/// Rollback uses this to reject transaction entries whose `hash` field was
/// corrupted or hand-edited rather than trying to open a nonsense backup
/// path.
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == SHA256_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_of_empty_input_is_well_known() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_is_lowercase_hex_of_expected_width() {
        let d = sha256_hex(b"## Morning Routine\n#health\n");
        assert_eq!(d.len(), SHA256_HEX_LEN);
        assert!(is_sha256_hex(&d));
    }

    #[test]
    fn is_sha256_hex_rejects_uppercase_and_short_inputs() {
        assert!(!is_sha256_hex("ABC"));
        assert!(!is_sha256_hex(&"A".repeat(64)));
        assert!(!is_sha256_hex(&"g".repeat(64)));
        assert!(is_sha256_hex(&"0".repeat(64)));
    }
}
