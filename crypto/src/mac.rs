//! HMAC-SHA256 message authentication

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::constant_time::verify_mac;
use crate::error::{CryptoError, CryptoResult};

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of an HMAC-SHA256 tag
pub const HMAC_SHA256_LEN: usize = 32;

/// Compute the HMAC-SHA256 tag of `message` under `key`
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] if the key is empty.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> CryptoResult<Vec<u8>> {
    if key.is_empty() {
        return Err(CryptoError::InvalidKey("HMAC key must not be empty".to_string()));
    }

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Recompute the tag of `message` and compare it with `tag` in constant time
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] if the key is empty.
pub fn verify_hmac_sha256(key: &[u8], message: &[u8], tag: &[u8]) -> CryptoResult<bool> {
    if tag.len() != HMAC_SHA256_LEN {
        return Ok(false);
    }
    let expected = hmac_sha256(key, message)?;
    Ok(verify_mac(&expected, tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // RFC 4231, test case 2
    #[test]
    fn test_known_answer() {
        let tag = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            hmac_sha256(b"", b"payload"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let tag = hmac_sha256(b"key-a", b"payload").unwrap();
        assert!(!verify_hmac_sha256(b"key-b", b"payload", &tag).unwrap());
    }

    #[test]
    fn test_truncated_tag_fails_verification() {
        let tag = hmac_sha256(b"key", b"payload").unwrap();
        assert!(!verify_hmac_sha256(b"key", b"payload", &tag[..16]).unwrap());
    }

    proptest! {
        #[test]
        fn prop_any_flipped_bit_is_rejected(
            message in proptest::collection::vec(any::<u8>(), 0..64),
            byte in 0usize..HMAC_SHA256_LEN,
            bit in 0u8..8,
        ) {
            let mut tag = hmac_sha256(b"secret", &message).unwrap();
            prop_assert!(verify_hmac_sha256(b"secret", &message, &tag).unwrap());
            tag[byte] ^= 1 << bit;
            prop_assert!(!verify_hmac_sha256(b"secret", &message, &tag).unwrap());
        }
    }
}
