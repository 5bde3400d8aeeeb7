//! The `HashSHA256` signing contract.
//!
//! Signatures are `hex(HMAC-SHA256(key, wire_bytes))` where the wire bytes
//! are exactly what travels on the network after encryption and gzip. An
//! empty key or the literal `"none"` disables signing and verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Name of the HTTP header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// Reports whether the configured key actually enables signing.
#[must_use]
pub fn key_enabled(key: &str) -> bool {
    !key.is_empty() && key != "none"
}

/// Computes the hex signature of `data` under `key`.
#[must_use]
pub fn sign(key: &str, data: &[u8]) -> String {
    // HMAC accepts keys of any length; new_from_slice cannot fail here.
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a received hex signature against `data` in constant time.
#[must_use]
pub fn verify(key: &str, data: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return false;
    };
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let sig = sign("secret", b"payload");
        assert!(verify("secret", b"payload", &sig));
    }

    #[test]
    fn signature_is_hex_of_32_bytes() {
        let sig = sign("k", b"data");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_is_deterministic() {
        assert_eq!(sign("k", b"data"), sign("k", b"data"));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let sig = sign("secret", b"payload");
        assert!(!verify("other", b"payload", &sig));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let sig = sign("secret", b"payload");
        assert!(!verify("secret", b"payloae", &sig));
    }

    #[test]
    fn malformed_hex_fails_verification() {
        assert!(!verify("secret", b"payload", "not-hex"));
        assert!(!verify("secret", b"payload", ""));
    }

    #[test]
    fn known_vector() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let sig = sign("key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            sig,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn key_gate() {
        assert!(key_enabled("secret"));
        assert!(!key_enabled(""));
        assert!(!key_enabled("none"));
    }
}
