//! Content checksum helpers.
//!
//! All checksums in GeoVault are SHA-256, lowercase hex, 64 characters —
//! for whole files and for individual upload parts alike.

use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::result::AppResult;

/// Length of a SHA-256 hex digest.
pub const CHECKSUM_HEX_LEN: usize = 64;

/// Compute the SHA-256 digest of `data` as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Validate a declared checksum string.
///
/// Must be exactly 64 hex characters. Rejected pre-I/O.
pub fn validate_checksum(checksum: &str) -> AppResult<()> {
    if checksum.len() != CHECKSUM_HEX_LEN {
        return Err(AppError::validation(format!(
            "checksum must be {CHECKSUM_HEX_LEN} hex characters, got {}",
            checksum.len()
        )));
    }
    if !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::validation(
            "checksum contains non-hex characters",
        ));
    }
    Ok(())
}

/// Compare two checksums, ignoring hex case.
pub fn checksums_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_validate_checksum() {
        assert!(validate_checksum(&sha256_hex(b"x")).is_ok());
        assert!(validate_checksum("abc").is_err());
        assert!(validate_checksum(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_checksums_match_ignores_case() {
        assert!(checksums_match("ABCDEF", "abcdef"));
        assert!(!checksums_match("abcdef", "abcde0"));
    }
}
