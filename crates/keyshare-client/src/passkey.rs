//! Passkey (WebAuthn PRF) share protection.
//!
//! The platform credential layer is a port: the engine never talks to
//! WebAuthn directly. A provider creates a credential and evaluates its PRF
//! extension under a fixed context; the 32-byte output keys AES-256-GCM
//! around the recovery share. Providers must report PRF unavailability as
//! [`ClientError::PasskeyUnsupported`] and a dismissed platform prompt as
//! [`ClientError::PasskeyCancelled`]; setup fails loudly rather than
//! registering a credential that can never decrypt anything.

use async_trait::async_trait;
use keyshare_crypto::aead::{decrypt_with_key, encrypt_with_key, AeadCiphertext};
use keyshare_crypto::EncryptedPayload;

use crate::error::{ClientError, Result};

/// Domain separation for PRF-derived share encryption.
pub const PASSKEY_SHARE_DOMAIN: &[u8] = b"keyshare:passkey-share-encryption:v1";

/// A platform credential usable for share protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasskeyCredential {
    /// WebAuthn credential id, base64url.
    pub credential_id: String,
}

/// Platform credential operations.
#[async_trait]
pub trait PasskeyProvider: Send + Sync {
    /// Whether the platform supports WebAuthn with the PRF extension.
    /// Checked before any setup side effects.
    fn is_supported(&self) -> bool;

    /// Create a credential for the user and verify PRF availability.
    ///
    /// Must fail with [`ClientError::PasskeyUnsupported`] when the created
    /// credential lacks PRF, and [`ClientError::PasskeyCancelled`] when the
    /// user dismisses the platform prompt.
    async fn create_credential(&self, user_id: &str, user_name: &str)
        -> Result<PasskeyCredential>;

    /// Evaluate the credential's PRF under the fixed context, yielding the
    /// 32-byte share-encryption key. Involves a platform assertion prompt;
    /// user dismissal surfaces as [`ClientError::PasskeyCancelled`].
    async fn prf_output(&self, credential_id: &str) -> Result<[u8; 32]>;
}

/// Encrypt a share under the credential's PRF output.
pub async fn encrypt_share_with_passkey(
    provider: &dyn PasskeyProvider,
    credential_id: &str,
    share_hex: &str,
) -> Result<EncryptedPayload> {
    let key = provider.prf_output(credential_id).await?;

    let record: AeadCiphertext = encrypt_with_key(&key, share_hex.as_bytes(), PASSKEY_SHARE_DOMAIN)?;

    Ok(EncryptedPayload {
        ciphertext: record.ciphertext,
        iv: record.iv,
        salt: None,
        kdf_params: None,
    })
}

/// Decrypt a passkey-protected share.
pub async fn decrypt_share_with_passkey(
    provider: &dyn PasskeyProvider,
    credential_id: &str,
    payload: &EncryptedPayload,
) -> Result<String> {
    let key = provider.prf_output(credential_id).await?;

    let record = AeadCiphertext {
        iv: payload.iv.clone(),
        ciphertext: payload.ciphertext.clone(),
    };

    let plaintext = decrypt_with_key(&key, &record, PASSKEY_SHARE_DOMAIN)?;

    String::from_utf8(plaintext).map_err(|_| ClientError::Crypto(keyshare_crypto::CryptoError::Decryption))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyshare_crypto::generate_random_bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakePasskeys {
        supported: bool,
        secrets: Mutex<HashMap<String, [u8; 32]>>,
    }

    impl FakePasskeys {
        fn new(supported: bool) -> Self {
            Self {
                supported,
                secrets: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl PasskeyProvider for FakePasskeys {
        fn is_supported(&self) -> bool {
            self.supported
        }

        async fn create_credential(
            &self,
            user_id: &str,
            _user_name: &str,
        ) -> Result<PasskeyCredential> {
            if !self.supported {
                return Err(ClientError::PasskeyUnsupported);
            }

            let credential_id = format!("cred-{user_id}");
            self.secrets
                .lock()
                .unwrap()
                .insert(credential_id.clone(), generate_random_bytes());

            Ok(PasskeyCredential { credential_id })
        }

        async fn prf_output(&self, credential_id: &str) -> Result<[u8; 32]> {
            self.secrets
                .lock()
                .unwrap()
                .get(credential_id)
                .copied()
                .ok_or(ClientError::PasskeyUnsupported)
        }
    }

    #[tokio::test]
    async fn test_share_roundtrip() {
        let provider = FakePasskeys::new(true);
        let credential = provider.create_credential("alice", "alice@example.com").await.unwrap();

        let payload = encrypt_share_with_passkey(&provider, &credential.credential_id, "03abcd")
            .await
            .unwrap();
        assert!(payload.salt.is_none());
        assert!(payload.kdf_params.is_none());

        let share = decrypt_share_with_passkey(&provider, &credential.credential_id, &payload)
            .await
            .unwrap();
        assert_eq!(share, "03abcd");
    }

    #[tokio::test]
    async fn test_wrong_credential_cannot_decrypt() {
        let provider = FakePasskeys::new(true);
        let alice = provider.create_credential("alice", "alice").await.unwrap();
        let bob = provider.create_credential("bob", "bob").await.unwrap();

        let payload = encrypt_share_with_passkey(&provider, &alice.credential_id, "03abcd")
            .await
            .unwrap();

        let result = decrypt_share_with_passkey(&provider, &bob.credential_id, &payload).await;
        assert!(matches!(
            result,
            Err(ClientError::Crypto(keyshare_crypto::CryptoError::Decryption))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_platform_fails_creation() {
        let provider = FakePasskeys::new(false);
        let result = provider.create_credential("alice", "alice").await;
        assert!(matches!(result, Err(ClientError::PasskeyUnsupported)));
    }
}
