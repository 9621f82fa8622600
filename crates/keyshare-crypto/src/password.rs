//! Password-based encryption for recovery shares.
//!
//! Argon2id derives a 32-byte AES-256-GCM key from the user's password.
//! Every encryption draws a fresh random salt and nonce, so encrypting the
//! same plaintext under the same password never yields the same ciphertext.
//! A wrong password surfaces as an AEAD tag mismatch; garbage plaintext is
//! never returned.
//!
//! The Argon2id cost parameters are a deliberate latency/security tradeoff.
//! They are configurable upward only: anything below the floor in
//! [`crate::constants`] is rejected.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::constants::{
    AES_GCM_IV_LEN, ARGON2_M_COST, ARGON2_OUTPUT_LEN, ARGON2_P_COST, ARGON2_T_COST,
    PASSWORD_SALT_LEN,
};
use crate::errors::{CryptoError, Result};
use crate::utils::{base64_decode, base64_encode, generate_random_bytes};

/// Argon2id cost parameters carried alongside a ciphertext so that old
/// payloads keep decrypting after defaults change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// KDF algorithm identifier. Only `"argon2id"` is supported.
    pub algorithm: String,
    /// Iteration count.
    pub time_cost: u32,
    /// Memory cost in KiB.
    pub memory_cost: u32,
    /// Lane count.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            algorithm: "argon2id".to_string(),
            time_cost: ARGON2_T_COST,
            memory_cost: ARGON2_M_COST,
            parallelism: ARGON2_P_COST,
        }
    }
}

/// Output of password-based encryption. All binary fields are base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    /// AES-256-GCM ciphertext (includes the 16-byte tag).
    pub ciphertext: String,
    /// 12-byte AES-GCM nonce.
    pub iv: String,
    /// 16-byte KDF salt. Absent on payloads whose key was derived elsewhere
    /// (e.g. passkey-wrapped shares).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    /// KDF parameters used to derive the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kdf_params: Option<KdfParams>,
}

/// Derive a 32-byte symmetric key from a password with Argon2id.
///
/// # Errors
///
/// Returns [`CryptoError::KdfParams`] if the algorithm is not Argon2id or
/// any cost parameter is below the security floor.
pub fn derive_key_from_password(
    password: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<[u8; ARGON2_OUTPUT_LEN]> {
    if !params.algorithm.eq_ignore_ascii_case("argon2id") {
        return Err(CryptoError::KdfParams(format!(
            "unsupported algorithm: {}",
            params.algorithm
        )));
    }

    if params.time_cost < ARGON2_T_COST
        || params.memory_cost < ARGON2_M_COST
        || params.parallelism < ARGON2_P_COST
    {
        return Err(CryptoError::KdfParams(format!(
            "costs below floor (t>={ARGON2_T_COST}, m>={ARGON2_M_COST}, p>={ARGON2_P_COST})"
        )));
    }

    let argon_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(ARGON2_OUTPUT_LEN),
    )
    .map_err(|e| CryptoError::KdfParams(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = [0u8; ARGON2_OUTPUT_LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::KdfParams(e.to_string()))?;

    Ok(key)
}

/// Encrypt a plaintext under a password.
///
/// Generates a fresh 16-byte salt and 12-byte nonce per call. Repeating the
/// same `(plaintext, password)` pair therefore produces different
/// ciphertexts. This is a required property, not an implementation detail.
pub fn encrypt_with_password(plaintext: &str, password: &str) -> Result<EncryptedPayload> {
    let salt: [u8; PASSWORD_SALT_LEN] = generate_random_bytes();
    let iv: [u8; AES_GCM_IV_LEN] = generate_random_bytes();
    let kdf_params = KdfParams::default();

    let mut key = derive_key_from_password(password, &salt, &kdf_params)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
        .map_err(|_| CryptoError::Encryption)?;

    key.zeroize();

    Ok(EncryptedPayload {
        ciphertext: base64_encode(&ciphertext),
        iv: base64_encode(&iv),
        salt: Some(base64_encode(&salt)),
        kdf_params: Some(kdf_params),
    })
}

/// Decrypt a password-encrypted payload.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] on a wrong password or corrupted
/// ciphertext (AEAD tag mismatch). Never returns partial plaintext.
pub fn decrypt_with_password(payload: &EncryptedPayload, password: &str) -> Result<String> {
    let salt_b64 = payload
        .salt
        .as_deref()
        .ok_or_else(|| CryptoError::KdfParams("payload carries no salt".to_string()))?;

    let salt = base64_decode(salt_b64)?;
    let iv = base64_decode(&payload.iv)?;
    let ciphertext = base64_decode(&payload.ciphertext)?;

    if iv.len() != AES_GCM_IV_LEN {
        return Err(CryptoError::InvalidEncoding(format!(
            "expected {AES_GCM_IV_LEN}-byte iv, got {}",
            iv.len()
        )));
    }

    let kdf_params = payload.kdf_params.clone().unwrap_or_default();
    let mut key = derive_key_from_password(password, &salt, &kdf_params)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|_| CryptoError::Decryption)?;

    key.zeroize();

    String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let payload = encrypt_with_password("secret share material", "hunter2").unwrap();
        let plaintext = decrypt_with_password(&payload, "hunter2").unwrap();
        assert_eq!(plaintext, "secret share material");
    }

    #[test]
    fn test_wrong_password_fails() {
        let payload = encrypt_with_password("secret share material", "hunter2").unwrap();
        let result = decrypt_with_password(&payload, "hunter3");
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn test_corrupted_ciphertext_fails() {
        let mut payload = encrypt_with_password("secret share material", "hunter2").unwrap();
        let mut bytes = base64_decode(&payload.ciphertext).unwrap();
        bytes[0] ^= 0xff;
        payload.ciphertext = base64_encode(&bytes);

        let result = decrypt_with_password(&payload, "hunter2");
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn test_same_inputs_produce_fresh_ciphertexts() {
        let a = encrypt_with_password("same plaintext", "same password").unwrap();
        let b = encrypt_with_password("same plaintext", "same password").unwrap();

        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.salt, b.salt);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let payload = encrypt_with_password("", "password").unwrap();
        assert_eq!(decrypt_with_password(&payload, "password").unwrap(), "");
    }

    #[test]
    fn test_below_floor_params_rejected() {
        let weak = KdfParams {
            time_cost: 1,
            ..KdfParams::default()
        };
        let result = derive_key_from_password("pw", &[0u8; 16], &weak);
        assert!(matches!(result, Err(CryptoError::KdfParams(_))));
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let params = KdfParams {
            algorithm: "scrypt".to_string(),
            ..KdfParams::default()
        };
        let result = derive_key_from_password("pw", &[0u8; 16], &params);
        assert!(matches!(result, Err(CryptoError::KdfParams(_))));
    }

    #[test]
    fn test_payload_serde_roundtrip() {
        let payload = encrypt_with_password("share", "pw").unwrap();
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("kdfParams"));

        let parsed: EncryptedPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
        assert_eq!(decrypt_with_password(&parsed, "pw").unwrap(), "share");
    }
}
