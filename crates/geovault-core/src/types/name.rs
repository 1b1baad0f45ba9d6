//! Asset and file name validation.

use crate::error::AppError;
use crate::result::AppResult;

const ASSET_NAME_MIN_LEN: usize = 3;
const ASSET_NAME_MAX_LEN: usize = 45;
const MAX_FILE_NAME_LEN: usize = 1024;

/// Validate a catalog asset name.
///
/// Must start with an ASCII letter, contain only letters, digits, and
/// hyphens, and be 3–45 characters long.
pub fn validate_asset_name(name: &str) -> AppResult<()> {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => {
            return Err(AppError::validation(
                "asset name must start with a letter",
            ));
        }
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(AppError::validation(
            "asset name may only contain letters, digits, and hyphens",
        ));
    }
    if name.len() < ASSET_NAME_MIN_LEN || name.len() > ASSET_NAME_MAX_LEN {
        return Err(AppError::validation(format!(
            "asset name must be between {ASSET_NAME_MIN_LEN} and {ASSET_NAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate a file name within an asset.
///
/// File names may contain `/` separators for nested paths but must not
/// begin with one, must not contain `..`, and must be free of control
/// characters. This keeps blob keys predictable and rules out trivial
/// path traversal vectors.
pub fn validate_file_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::validation("file name cannot be empty"));
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(AppError::validation(format!(
            "file name exceeds {MAX_FILE_NAME_LEN} bytes"
        )));
    }
    if name.starts_with('/') || name.contains("..") {
        return Err(AppError::validation("file name contains invalid path components"));
    }
    if name
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(AppError::validation("file name contains invalid characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_names() {
        assert!(validate_asset_name("sentinel2-crops").is_ok());
        assert!(validate_asset_name("Ab3").is_ok());
        assert!(validate_asset_name("2cool").is_err());
        assert!(validate_asset_name("ab").is_err());
        assert!(validate_asset_name("has space").is_err());
        assert!(validate_asset_name(&"a".repeat(46)).is_err());
    }

    #[test]
    fn test_file_names() {
        assert!(validate_file_name("scenes/a.tif").is_ok());
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("/abs.tif").is_err());
        assert!(validate_file_name("a/../b").is_err());
        assert!(validate_file_name("a\\b").is_err());
    }
}
