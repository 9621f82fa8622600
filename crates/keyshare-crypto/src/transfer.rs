//! Ephemeral-key transfer envelope for cross-device share delivery.
//!
//! Both sides of a transfer contribute a fresh X25519 keypair: the requester
//! holds one for the life of its polling session, the approver generates a
//! single-use one per approval. The ECDH output is expanded with HKDF-SHA256
//! (empty salt; freshness comes from the ephemeral keys, not the salt) into
//! an AES-256-GCM key. The relay between the two devices only ever sees
//! public keys and ciphertext; no static identity key is exposed.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::constants::{AES_GCM_IV_LEN, TRANSFER_KDF_INFO};
use crate::errors::{CryptoError, Result};
use crate::utils::{base64_decode, base64_encode, generate_random_bytes};

/// Requester-side X25519 keypair, held in memory for the life of one
/// polling session and never serialized.
pub struct TransferKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl TransferKeypair {
    /// Generate a fresh keypair from the system CSPRNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Base64 public key, as registered with the relay and embedded in the
    /// QR payload.
    pub fn public_key_base64(&self) -> String {
        base64_encode(self.public.as_bytes())
    }
}

/// Wire form of an encrypted transfer payload. Carries the sender's own
/// ephemeral public key so the recipient can derive the shared secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPayload {
    /// Sender's single-use X25519 public key, base64.
    pub ephemeral_public_key: String,
    /// 12-byte AES-GCM nonce, base64.
    pub iv: String,
    /// AES-256-GCM ciphertext, base64.
    pub ciphertext: String,
}

fn parse_public_key(public_b64: &str) -> Result<PublicKey> {
    let bytes = base64_decode(public_b64)?;
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            got: bytes.len(),
        })?;
    Ok(PublicKey::from(arr))
}

fn expand_transfer_key(shared_secret: &[u8]) -> Result<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = [0u8; 32];
    hkdf.expand(TRANSFER_KDF_INFO, &mut key)
        .map_err(|_| CryptoError::Encryption)?;
    Ok(key)
}

/// Encrypt a plaintext for the holder of `recipient_public_b64`.
///
/// Generates a single-use ephemeral keypair and a fresh nonce per call, so
/// two encryptions of the same plaintext differ in ciphertext, nonce, and
/// ephemeral public key.
pub fn encrypt_for_transfer(plaintext: &str, recipient_public_b64: &str) -> Result<TransferPayload> {
    let recipient = parse_public_key(recipient_public_b64)?;

    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(&recipient);
    let key = expand_transfer_key(shared.as_bytes())?;

    let iv: [u8; AES_GCM_IV_LEN] = generate_random_bytes();
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
        .map_err(|_| CryptoError::Encryption)?;

    Ok(TransferPayload {
        ephemeral_public_key: base64_encode(ephemeral_public.as_bytes()),
        iv: base64_encode(&iv),
        ciphertext: base64_encode(&ciphertext),
    })
}

/// Decrypt a transfer payload with the recipient's keypair.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] when the payload was encrypted for a
/// different keypair or has been tampered with (AEAD tag mismatch).
pub fn decrypt_from_transfer(payload: &TransferPayload, keypair: &TransferKeypair) -> Result<String> {
    let sender = parse_public_key(&payload.ephemeral_public_key)?;

    let shared = keypair.secret.diffie_hellman(&sender);
    let key = expand_transfer_key(shared.as_bytes())?;

    let iv = base64_decode(&payload.iv)?;
    if iv.len() != AES_GCM_IV_LEN {
        return Err(CryptoError::InvalidEncoding(format!(
            "expected {AES_GCM_IV_LEN}-byte iv, got {}",
            iv.len()
        )));
    }

    let ciphertext = base64_decode(&payload.ciphertext)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|_| CryptoError::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let requester = TransferKeypair::generate();

        let payload =
            encrypt_for_transfer("share material", &requester.public_key_base64()).unwrap();
        let plaintext = decrypt_from_transfer(&payload, &requester).unwrap();

        assert_eq!(plaintext, "share material");
    }

    #[test]
    fn test_unrelated_keypair_cannot_decrypt() {
        let requester = TransferKeypair::generate();
        let eavesdropper = TransferKeypair::generate();

        let payload =
            encrypt_for_transfer("share material", &requester.public_key_base64()).unwrap();

        let result = decrypt_from_transfer(&payload, &eavesdropper);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn test_each_encryption_is_fresh() {
        let requester = TransferKeypair::generate();

        let a = encrypt_for_transfer("same share", &requester.public_key_base64()).unwrap();
        let b = encrypt_for_transfer("same share", &requester.public_key_base64()).unwrap();

        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ephemeral_public_key, b.ephemeral_public_key);

        // Both still decrypt.
        assert_eq!(decrypt_from_transfer(&a, &requester).unwrap(), "same share");
        assert_eq!(decrypt_from_transfer(&b, &requester).unwrap(), "same share");
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let requester = TransferKeypair::generate();
        let mut payload =
            encrypt_for_transfer("share material", &requester.public_key_base64()).unwrap();

        let mut bytes = base64_decode(&payload.ciphertext).unwrap();
        bytes[0] ^= 0x01;
        payload.ciphertext = base64_encode(&bytes);

        assert!(matches!(
            decrypt_from_transfer(&payload, &requester),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn test_bad_public_key_rejected() {
        assert!(encrypt_for_transfer("x", "not-base64!").is_err());
        assert!(matches!(
            encrypt_for_transfer("x", &base64_encode(&[0u8; 16])),
            Err(CryptoError::InvalidKeyLength { expected: 32, got: 16 })
        ));
    }

    #[test]
    fn test_payload_serde_roundtrip() {
        let requester = TransferKeypair::generate();
        let payload = encrypt_for_transfer("share", &requester.public_key_base64()).unwrap();

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("ephemeralPublicKey"));

        let parsed: TransferPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(decrypt_from_transfer(&parsed, &requester).unwrap(), "share");
    }
}
