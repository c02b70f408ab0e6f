//! Constant-time comparisons
//!
//! Token signatures MUST be compared with these helpers. A plain `==`
//! returns as soon as the first byte differs.

use subtle::ConstantTimeEq;

/// Constant-time comparison of byte slices
///
/// Returns true if slices are equal, false otherwise.
/// Execution time is independent of the slice contents.
///
/// # Example
///
/// ```rust
/// use crypto::constant_time::ct_eq;
///
/// assert!(ct_eq(b"tag", b"tag"));
/// assert!(!ct_eq(b"tag", b"tah"));
/// ```
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    // Early length check is safe - length is not secret
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// Constant-time MAC/HMAC verification
pub fn verify_mac(expected_tag: &[u8], computed_tag: &[u8]) -> bool {
    ct_eq(expected_tag, computed_tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ct_eq_equal() {
        assert!(ct_eq(b"secret_value", b"secret_value"));
    }

    #[test]
    fn test_ct_eq_not_equal() {
        assert!(!ct_eq(b"secret_value_1", b"secret_value_2"));
    }

    #[test]
    fn test_ct_eq_different_lengths() {
        assert!(!ct_eq(b"short", b"longer_value"));
    }

    #[test]
    fn test_verify_mac() {
        let tag = [0x12, 0x34, 0x56, 0x78];
        assert!(verify_mac(&tag, &tag));
        assert!(!verify_mac(&tag, &[0x00, 0x00, 0x00, 0x00]));
    }
}
