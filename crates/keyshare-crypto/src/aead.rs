//! Keyed AES-256-GCM helpers.
//!
//! Used where the caller already holds a 32-byte key: the device-local
//! share store (master key, with the record identifier as associated data)
//! and passkey-wrapped shares (PRF output as the key). Associated data
//! binds a ciphertext to its context: a record encrypted under one
//! identifier will not decrypt under another.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use serde::{Deserialize, Serialize};

use crate::constants::AES_GCM_IV_LEN;
use crate::errors::{CryptoError, Result};
use crate::utils::{base64_decode, base64_encode, generate_random_bytes};

/// An AES-256-GCM ciphertext with its nonce, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AeadCiphertext {
    /// 12-byte nonce.
    pub iv: String,
    /// Ciphertext including the 16-byte tag.
    pub ciphertext: String,
}

/// Encrypt under a caller-held key with a fresh random nonce.
pub fn encrypt_with_key(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<AeadCiphertext> {
    let iv: [u8; AES_GCM_IV_LEN] = generate_random_bytes();

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    Ok(AeadCiphertext {
        iv: base64_encode(&iv),
        ciphertext: base64_encode(&ciphertext),
    })
}

/// Decrypt under a caller-held key.
///
/// Fails with [`CryptoError::Decryption`] on a wrong key, tampered
/// ciphertext, or mismatched associated data.
pub fn decrypt_with_key(key: &[u8; 32], record: &AeadCiphertext, aad: &[u8]) -> Result<Vec<u8>> {
    let iv = base64_decode(&record.iv)?;
    if iv.len() != AES_GCM_IV_LEN {
        return Err(CryptoError::InvalidEncoding(format!(
            "expected {AES_GCM_IV_LEN}-byte iv, got {}",
            iv.len()
        )));
    }

    let ciphertext = base64_decode(&record.ciphertext)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: ciphertext.as_slice(),
                aad,
            },
        )
        .map_err(|_| CryptoError::Decryption)
}
