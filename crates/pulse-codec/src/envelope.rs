//! Hybrid payload encryption.
//!
//! Each payload is sealed under a fresh 32-byte AES-256-GCM session key and
//! a fresh 12-byte nonce; the session key travels RSA-OAEP-wrapped under
//! the receiver's public key. The wire shape is a small JSON object:
//!
//! ```json
//! { "ek": "<base64 wrapped key>", "n": "<base64 nonce>", "ct": "<base64 ciphertext>" }
//! ```
//!
//! Bodies that do not parse as this shape pass through untouched, so an
//! unencrypted agent can keep talking to a key-configured server.

use std::fs;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::CodecError;

/// OAEP label binding ciphertexts to this pipeline.
pub const ENVELOPE_LABEL: &str = "pulsegrid";

const SESSION_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(default)]
    ek: String,
    #[serde(default)]
    n: String,
    #[serde(default)]
    ct: String,
}

fn envelope_err(reason: impl Into<String>) -> CodecError {
    CodecError::Envelope {
        reason: reason.into(),
    }
}

/// Seals `plain` for the holder of the matching private key.
///
/// # Errors
///
/// Returns `CodecError::Envelope` when encryption fails.
pub fn seal(public: &RsaPublicKey, plain: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut session_key = [0u8; SESSION_KEY_LEN];
    OsRng.fill_bytes(&mut session_key);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(&session_key)
        .map_err(|e| envelope_err(format!("session cipher: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plain)
        .map_err(|e| envelope_err(format!("encrypt: {e}")))?;

    let padding = Oaep::new_with_label::<Sha256, _>(ENVELOPE_LABEL);
    let wrapped_key = public
        .encrypt(&mut OsRng, padding, &session_key)
        .map_err(|e| envelope_err(format!("wrap session key: {e}")))?;

    let envelope = Envelope {
        ek: BASE64.encode(wrapped_key),
        n: BASE64.encode(nonce),
        ct: BASE64.encode(ciphertext),
    };
    serde_json::to_vec(&envelope).map_err(|e| envelope_err(format!("serialize: {e}")))
}

/// Opens `body` when it carries an envelope; passes other bodies through.
///
/// Returns `Ok(Some(plaintext))` for a valid envelope and `Ok(None)` when
/// the body is not envelope-shaped at all.
///
/// # Errors
///
/// Returns `CodecError::Envelope` when the body *is* an envelope but any
/// of its fields fails to decode or decrypt.
pub fn open_if_sealed(
    private: &RsaPrivateKey,
    body: &[u8],
) -> Result<Option<Vec<u8>>, CodecError> {
    let Ok(envelope) = serde_json::from_slice::<Envelope>(body) else {
        return Ok(None);
    };
    if envelope.ek.is_empty() || envelope.n.is_empty() || envelope.ct.is_empty() {
        return Ok(None);
    }

    let wrapped_key = BASE64
        .decode(&envelope.ek)
        .map_err(|_| envelope_err("ek is not valid base64"))?;
    let nonce = BASE64
        .decode(&envelope.n)
        .map_err(|_| envelope_err("n is not valid base64"))?;
    let ciphertext = BASE64
        .decode(&envelope.ct)
        .map_err(|_| envelope_err("ct is not valid base64"))?;

    if nonce.len() != NONCE_LEN {
        return Err(envelope_err("nonce has wrong length"));
    }

    let padding = Oaep::new_with_label::<Sha256, _>(ENVELOPE_LABEL);
    let session_key = private
        .decrypt(padding, &wrapped_key)
        .map_err(|_| envelope_err("session key does not unwrap"))?;
    if session_key.len() != SESSION_KEY_LEN {
        return Err(envelope_err("session key has wrong length"));
    }

    let cipher = Aes256Gcm::new_from_slice(&session_key)
        .map_err(|e| envelope_err(format!("session cipher: {e}")))?;
    let plain = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| envelope_err("ciphertext does not authenticate"))?;

    Ok(Some(plain))
}

/// Loads an RSA public key from a PEM file (SPKI or PKCS#1).
///
/// # Errors
///
/// Returns `CodecError::KeyFile` when the file cannot be read and
/// `CodecError::Key` when it holds no usable RSA public key.
pub fn load_public_key(path: &str) -> Result<RsaPublicKey, CodecError> {
    let pem = fs::read_to_string(path).map_err(|source| CodecError::KeyFile {
        path: path.to_string(),
        source,
    })?;
    if let Ok(key) = RsaPublicKey::from_public_key_pem(&pem) {
        return Ok(key);
    }
    RsaPublicKey::from_pkcs1_pem(&pem).map_err(|e| CodecError::Key {
        reason: e.to_string(),
    })
}

/// Loads an RSA private key from a PEM file (PKCS#1 or PKCS#8).
///
/// # Errors
///
/// Returns `CodecError::KeyFile` when the file cannot be read and
/// `CodecError::Key` when it holds no usable RSA private key.
pub fn load_private_key(path: &str) -> Result<RsaPrivateKey, CodecError> {
    let pem = fs::read_to_string(path).map_err(|source| CodecError::KeyFile {
        path: path.to_string(),
        source,
    })?;
    if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(&pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| CodecError::Key {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::OnceLock;

    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    static TEST_KEY: OnceLock<RsaPrivateKey> = OnceLock::new();

    fn private_key() -> &'static RsaPrivateKey {
        TEST_KEY.get_or_init(|| {
            RsaPrivateKey::new(&mut OsRng, 2048).expect("generate test key")
        })
    }

    fn public_key() -> RsaPublicKey {
        private_key().to_public_key()
    }

    #[test]
    fn seal_open_roundtrip() {
        let plain = br#"[{"id":"Alloc","type":"gauge","value":1.5}]"#;
        let sealed = seal(&public_key(), plain).unwrap();
        let opened = open_if_sealed(private_key(), &sealed).unwrap();
        assert_eq!(opened.unwrap(), plain);
    }

    #[test]
    fn sealed_output_is_envelope_shaped() {
        let sealed = seal(&public_key(), b"x").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&sealed).unwrap();
        assert!(value["ek"].is_string());
        assert!(value["n"].is_string());
        assert!(value["ct"].is_string());
    }

    #[test]
    fn sealing_twice_differs() {
        let first = seal(&public_key(), b"same plaintext").unwrap();
        let second = seal(&public_key(), b"same plaintext").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn plain_json_passes_through() {
        let body = br#"{"id":"x","type":"gauge","value":1}"#;
        assert!(open_if_sealed(private_key(), body).unwrap().is_none());

        let batch = br#"[{"id":"x","type":"counter","delta":1}]"#;
        assert!(open_if_sealed(private_key(), batch).unwrap().is_none());
    }

    #[test]
    fn non_json_passes_through() {
        assert!(open_if_sealed(private_key(), b"not json at all")
            .unwrap()
            .is_none());
    }

    fn tamper_field(sealed: &[u8], field: &str) -> Vec<u8> {
        let mut value: serde_json::Value = serde_json::from_slice(sealed).unwrap();
        let original = value[field].as_str().unwrap().to_string();
        // Replace with valid base64 of different bytes.
        value[field] = serde_json::Value::String(BASE64.encode(
            BASE64
                .decode(&original)
                .unwrap()
                .iter()
                .map(|b| b ^ 0x55)
                .collect::<Vec<u8>>(),
        ));
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn tampered_key_fails() {
        let sealed = seal(&public_key(), b"secret").unwrap();
        let bad = tamper_field(&sealed, "ek");
        assert!(open_if_sealed(private_key(), &bad).is_err());
    }

    #[test]
    fn tampered_nonce_fails() {
        let sealed = seal(&public_key(), b"secret").unwrap();
        let bad = tamper_field(&sealed, "n");
        assert!(open_if_sealed(private_key(), &bad).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let sealed = seal(&public_key(), b"secret").unwrap();
        let bad = tamper_field(&sealed, "ct");
        assert!(open_if_sealed(private_key(), &bad).is_err());
    }

    #[test]
    fn invalid_base64_fails() {
        let sealed = seal(&public_key(), b"secret").unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&sealed).unwrap();
        value["n"] = serde_json::Value::String("!!!not base64!!!".to_string());
        let bad = serde_json::to_vec(&value).unwrap();
        assert!(open_if_sealed(private_key(), &bad).is_err());
    }

    #[test]
    fn wrong_private_key_fails() {
        let sealed = seal(&public_key(), b"secret").unwrap();
        let other = RsaPrivateKey::new(&mut OsRng, 2048).expect("generate second key");
        assert!(open_if_sealed(&other, &sealed).is_err());
    }

    #[test]
    fn load_keys_from_pem_files() {
        let dir = tempfile::tempdir().unwrap();

        let pkcs8_path = dir.path().join("private_pkcs8.pem");
        let mut f = std::fs::File::create(&pkcs8_path).unwrap();
        f.write_all(
            private_key()
                .to_pkcs8_pem(LineEnding::LF)
                .unwrap()
                .as_bytes(),
        )
        .unwrap();

        let pkcs1_path = dir.path().join("private_pkcs1.pem");
        let mut f = std::fs::File::create(&pkcs1_path).unwrap();
        f.write_all(
            private_key()
                .to_pkcs1_pem(LineEnding::LF)
                .unwrap()
                .as_bytes(),
        )
        .unwrap();

        let public_path = dir.path().join("public.pem");
        let mut f = std::fs::File::create(&public_path).unwrap();
        f.write_all(
            public_key()
                .to_public_key_pem(LineEnding::LF)
                .unwrap()
                .as_bytes(),
        )
        .unwrap();

        let loaded_pkcs8 = load_private_key(pkcs8_path.to_str().unwrap()).unwrap();
        let loaded_pkcs1 = load_private_key(pkcs1_path.to_str().unwrap()).unwrap();
        let loaded_public = load_public_key(public_path.to_str().unwrap()).unwrap();

        let sealed = seal(&loaded_public, b"via files").unwrap();
        assert_eq!(
            open_if_sealed(&loaded_pkcs8, &sealed).unwrap().unwrap(),
            b"via files"
        );
        assert_eq!(
            open_if_sealed(&loaded_pkcs1, &sealed).unwrap().unwrap(),
            b"via files"
        );
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(matches!(
            load_private_key("/definitely/not/here.pem"),
            Err(CodecError::KeyFile { .. })
        ));
    }

    #[test]
    fn load_garbage_pem_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pem");
        std::fs::write(&path, "-----BEGIN GARBAGE-----\nAAAA\n-----END GARBAGE-----\n").unwrap();
        assert!(matches!(
            load_private_key(path.to_str().unwrap()),
            Err(CodecError::Key { .. })
        ));
    }
}
