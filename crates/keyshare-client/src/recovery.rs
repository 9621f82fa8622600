//! Recovery-method strategy.
//!
//! The strategy owns the full key lifecycle around recovery methods:
//! device-share storage (per-user scoped), split/reconstruct, server
//! communication, recovery execution, and recovery setup for every
//! supported method (password, passkey, phrase, backup file, email).
//!
//! The one rule every recovery path shares: the reconstructed key is
//! DID-verified BEFORE any share rotation or server write. A stale or wrong
//! credential reconstructs a plausible-looking but wrong key; writing
//! shares of that key over the server's auth share would destroy the
//! account's recovery state permanently. Fail closed, write nothing.

use std::sync::Arc;

use keyshare_crypto::phrase::{phrase_to_share, share_to_phrase};
use keyshare_crypto::shamir::{reconstruct_from_shares, Share};
use keyshare_crypto::{decrypt_with_password, encrypt_with_password, EncryptedPayload, PrivateKey};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::atomic::{split_and_verify, verify_stored_shares, ShareStorage};
use crate::error::{ClientError, Result};
use crate::passkey::{decrypt_share_with_passkey, encrypt_share_with_passkey, PasskeyProvider};
use crate::ports::{
    AuthUser, DidDeriver, EmailShareRequest, KeyServerPort, RecoveryMethodInfo,
    RecoveryMethodRecord, RecoveryMethodType, ServerKeyStatus,
};
use crate::storage::EncryptedShareStore;

/// Supported backup file format version.
pub const BACKUP_FILE_VERSION: u32 = 1;

/// A versioned, self-contained backup file. Round-trips through JSON with
/// no loss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFile {
    /// Format version.
    pub version: u32,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// The account DID at creation time.
    pub primary_did: String,
    /// Share version the contained share belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_version: Option<u32>,
    /// Password-encrypted recovery share.
    pub encrypted_share: EncryptedPayload,
}

/// Credentials for executing a recovery.
#[derive(Debug, Clone)]
pub enum RecoveryInput {
    /// Decrypt the server-stored share with a password.
    Password {
        /// The recovery password.
        password: String,
    },
    /// Decrypt the server-stored share with a passkey's PRF output.
    Passkey {
        /// WebAuthn credential id.
        credential_id: String,
    },
    /// Decode a recovery phrase. No password involved.
    Phrase {
        /// The word sequence.
        phrase: String,
    },
    /// Decrypt a share from a backup file.
    Backup {
        /// The backup file JSON.
        file_contents: String,
        /// The backup password.
        password: String,
    },
    /// Use an emailed share, optionally `"<version>:<share>"` prefixed.
    Email {
        /// The pasted share string.
        email_share: String,
    },
}

/// Parameters for setting up a recovery method.
#[derive(Debug, Clone)]
pub enum RecoverySetupInput {
    /// Store the recovery share encrypted under a password.
    Password {
        /// The recovery password.
        password: String,
    },
    /// Create a passkey and store the share encrypted under its PRF output.
    Passkey,
    /// Hand the user a recovery phrase.
    Phrase,
    /// Produce a password-encrypted backup file.
    Backup {
        /// The backup password.
        password: String,
        /// The account DID to embed.
        did: String,
    },
    /// Send the email share to the verified recovery email.
    Email,
}

/// Outcome of a recovery-method setup.
#[derive(Debug, Clone)]
pub enum RecoverySetupResult {
    /// Password method registered.
    Password,
    /// Passkey registered.
    Passkey {
        /// The created credential id.
        credential_id: String,
    },
    /// Phrase generated; show it to the user exactly once.
    Phrase {
        /// The recovery phrase.
        phrase: String,
    },
    /// Backup file generated; hand it to the user for download.
    Backup {
        /// The backup file.
        file: BackupFile,
    },
    /// Email share sent to the recovery email.
    Email,
}

/// Outcome of a successful recovery.
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    /// The recovered private key.
    pub private_key: PrivateKey,
    /// The account DID (the server's record).
    pub did: String,
}

/// The device + server halves of one split, as handed to callers that
/// distribute them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitKey {
    /// Device share, hex.
    pub local: String,
    /// Auth share, hex.
    pub remote: String,
}

/// Format an email share with its version prefix so recovery can request
/// the matching historical auth share.
pub fn format_versioned_email_share(email_share: &str, share_version: u32) -> String {
    format!("{share_version}:{email_share}")
}

/// Split a pasted email share into (share, version). Accepts the bare form
/// too; a missing or malformed prefix means "use the latest auth share".
pub fn parse_versioned_email_share(input: &str) -> (String, Option<u32>) {
    if let Some((prefix, rest)) = input.split_once(':') {
        if let Ok(version) = prefix.parse::<u32>() {
            if version > 0 && !rest.is_empty() {
                return (rest.to_string(), Some(version));
            }
        }
    }

    (input.to_string(), None)
}

#[derive(Default)]
struct StrategyState {
    /// Storage scope for the active user, set after auth.
    active_user: Option<String>,
    /// Email share cached from the most recent split, consumed by the next
    /// email-backup send so the emailed share matches the distributed pair.
    last_email_share: Option<String>,
    /// Share version cached from the most recent auth-share store.
    last_share_version: Option<u32>,
    /// Whether the server holds a verified recovery email; routes future
    /// email shares there instead of the primary address.
    has_recovery_email: bool,
}

/// Strategy wiring.
pub struct ShareStrategyConfig {
    /// Encrypted device-share storage.
    pub store: Arc<EncryptedShareStore>,
    /// Key server.
    pub server: Arc<dyn KeyServerPort>,
    /// Platform passkey layer, when available.
    pub passkeys: Option<Arc<dyn PasskeyProvider>>,
    /// DID derivation; when absent, recovery DID checks are skipped.
    pub did_from_private_key: Option<DidDeriver>,
    /// Whether email backup shares are enabled.
    pub enable_email_backup: bool,
}

/// The recovery-method strategy façade.
pub struct ShareStrategy {
    store: Arc<EncryptedShareStore>,
    server: Arc<dyn KeyServerPort>,
    passkeys: Option<Arc<dyn PasskeyProvider>>,
    did_from_private_key: Option<DidDeriver>,
    enable_email_backup: bool,
    inner: std::sync::Mutex<StrategyState>,
}

impl ShareStrategy {
    /// Create a strategy.
    pub fn new(config: ShareStrategyConfig) -> Self {
        Self {
            store: config.store,
            server: config.server,
            passkeys: config.passkeys,
            did_from_private_key: config.did_from_private_key,
            enable_email_backup: config.enable_email_backup,
            inner: std::sync::Mutex::new(StrategyState::default()),
        }
    }

    /// Scope local storage to a user so multiple accounts coexist on one
    /// device without clobbering each other. Called after authentication.
    pub fn set_active_user(&self, user_id: &str) {
        self.inner.lock().unwrap().active_user = Some(user_id.to_string());
    }

    fn scope(&self) -> Option<String> {
        self.inner.lock().unwrap().active_user.clone()
    }

    fn scoped_id(&self) -> String {
        EncryptedShareStore::device_share_id(self.scope().as_deref())
    }

    // --- Local key CRUD ---

    /// Whether a device share exists for the active user (including a
    /// legacy unscoped one).
    pub async fn has_local_key(&self) -> Result<bool> {
        if self.store.has_share(&self.scoped_id()).await? {
            return Ok(true);
        }

        // Shares stored before per-user scoping live under the unscoped id.
        if self.scope().is_some() {
            return self
                .store
                .has_share(&EncryptedShareStore::device_share_id(None))
                .await;
        }

        Ok(false)
    }

    /// Fetch the device share for the active user. A legacy unscoped share
    /// is transparently migrated to the scoped identifier on first read.
    pub async fn get_local_key(&self) -> Result<Option<String>> {
        let scoped_id = self.scoped_id();

        if let Some(share) = self.store.get_share(&scoped_id).await? {
            return Ok(Some(share));
        }

        if self.scope().is_some() {
            let legacy_id = EncryptedShareStore::device_share_id(None);

            if let Some(legacy) = self.store.get_share(&legacy_id).await? {
                // Migrate: copy to the scoped identifier. The legacy entry
                // stays in place, which is harmless.
                self.store.store_share(&scoped_id, &legacy).await?;
                return Ok(Some(legacy));
            }
        }

        Ok(None)
    }

    /// Store the device share for the active user.
    pub async fn store_local_key(&self, share_hex: &str) -> Result<()> {
        self.store.store_share(&self.scoped_id(), share_hex).await
    }

    /// Clear the active user's shares (or the whole store when unscoped).
    pub async fn clear_local_keys(&self) -> Result<()> {
        match self.scope() {
            Some(_) => self.store.clear(Some(&self.scoped_id())).await,
            None => self.store.clear(None).await,
        }
    }

    // --- Share versions ---

    /// The locally stored share version, if any.
    pub async fn get_local_share_version(&self) -> Result<Option<u32>> {
        self.store.get_share_version(&self.scoped_id()).await
    }

    /// Persist the share version alongside the device share.
    pub async fn store_local_share_version(&self, version: u32) -> Result<()> {
        self.store
            .store_share_version(&self.scoped_id(), version)
            .await
    }

    // --- Split / reconstruct ---

    /// Split a key, returning the (device, auth) pair for distribution.
    /// The email share is cached for the next email-backup send.
    pub async fn split_key(&self, private_key: &PrivateKey) -> Result<SplitKey> {
        let split = split_and_verify(private_key)?;

        self.inner.lock().unwrap().last_email_share = Some(split.shares.email.to_hex());

        Ok(SplitKey {
            local: split.shares.device.to_hex(),
            remote: split.shares.auth.to_hex(),
        })
    }

    /// Reconstruct a key from the (device, auth) pair.
    pub fn reconstruct_key(&self, local_hex: &str, remote_hex: &str) -> Result<PrivateKey> {
        Ok(reconstruct_from_shares(&[
            Share::from_hex(local_hex)?,
            Share::from_hex(remote_hex)?,
        ])?)
    }

    /// Health-check a (device, auth) pair against an expected DID.
    pub async fn verify_keys(
        &self,
        local_hex: &str,
        remote_hex: &str,
        expected_did: &str,
    ) -> bool {
        let Some(derive) = &self.did_from_private_key else {
            return true;
        };

        let view = PairView {
            device: local_hex.to_string(),
            auth: remote_hex.to_string(),
        };

        verify_stored_shares(&view, expected_did, derive).await.healthy
    }

    // --- Server communication ---

    /// Fetch the server key status, pinned to the locally stored share
    /// version so the matching auth share comes back.
    pub async fn fetch_server_key_status(&self) -> Result<ServerKeyStatus> {
        let local_version = self.get_local_share_version().await?;
        let status = self.server.fetch_key_status(local_version).await?;

        if !status.exists {
            // No server record means no recovery email either; clearing the
            // flag prevents stale routing from a previous session.
            self.inner.lock().unwrap().has_recovery_email = false;
            return Ok(status);
        }

        // Version repair: accounts created before versioning have a server
        // version but no local one. Backfill so device-link transfers and
        // recovery always know which pair they hold.
        if let (Some(server_version), None) = (status.share_version, local_version) {
            if let Err(e) = self.store_local_share_version(server_version).await {
                warn!(error = %e, "failed to backfill local share version");
            }
        }

        self.inner.lock().unwrap().has_recovery_email = status.masked_recovery_email.is_some();

        Ok(status)
    }

    /// Store the auth share on the server and persist the returned version
    /// locally.
    pub async fn store_auth_share(&self, auth_share: &str, primary_did: &str) -> Result<u32> {
        let version = self.server.store_auth_share(auth_share, primary_did).await?;

        self.store_local_share_version(version).await?;
        self.inner.lock().unwrap().last_share_version = Some(version);

        Ok(version)
    }

    /// Mark a legacy-provider account as migrated.
    pub async fn mark_migrated(&self) -> Result<()> {
        self.server.mark_migrated().await
    }

    /// Delete all server-side key material and wipe local storage.
    pub async fn delete_account(&self) -> Result<()> {
        self.server.delete_key().await?;
        self.store.clear(None).await
    }

    // --- Recovery execution ---

    /// Execute a recovery: obtain the recovery share for the chosen method,
    /// reconstruct, DID-verify, and only then persist the share as the new
    /// device share.
    ///
    /// No re-split happens here: the proven recovery share simply becomes
    /// the device share (recovery + auth reconstructs the key, so it is a
    /// valid device share), which keeps every other registered recovery
    /// method working.
    pub async fn execute_recovery(&self, input: RecoveryInput) -> Result<RecoveryResult> {
        // Step 1: obtain the plaintext recovery share + its version.
        let (recovery_share, share_version) = match input {
            RecoveryInput::Password { password } => {
                let record = self
                    .server
                    .get_recovery_share(RecoveryMethodType::Password, None)
                    .await?
                    .ok_or_else(|| ClientError::MissingRecoveryShare("password".to_string()))?;

                let payload = record
                    .encrypted_share
                    .ok_or_else(|| ClientError::MissingRecoveryShare("password".to_string()))?;

                let share = decrypt_with_password(&payload, &password)?;
                (share, record.share_version)
            }

            RecoveryInput::Passkey { credential_id } => {
                let provider = self
                    .passkeys
                    .as_ref()
                    .ok_or(ClientError::PasskeyUnsupported)?;

                let record = self
                    .server
                    .get_recovery_share(RecoveryMethodType::Passkey, Some(&credential_id))
                    .await?
                    .ok_or_else(|| ClientError::MissingRecoveryShare("passkey".to_string()))?;

                let payload = record
                    .encrypted_share
                    .ok_or_else(|| ClientError::MissingRecoveryShare("passkey".to_string()))?;

                let share =
                    decrypt_share_with_passkey(provider.as_ref(), &credential_id, &payload).await?;
                (share, record.share_version)
            }

            RecoveryInput::Phrase { phrase } => {
                let share = phrase_to_share(&phrase)?;

                // The phrase itself carries no version; the server's phrase
                // record does. Legacy setups may have none; fall through to
                // the latest auth share.
                let version = match self
                    .server
                    .get_recovery_share(RecoveryMethodType::Phrase, None)
                    .await
                {
                    Ok(record) => record.and_then(|r| r.share_version),
                    Err(e) => {
                        warn!(error = %e, "no phrase record on server, using latest auth share");
                        None
                    }
                };

                (share, version)
            }

            RecoveryInput::Backup {
                file_contents,
                password,
            } => {
                let backup: BackupFile = serde_json::from_str(&file_contents)
                    .map_err(|e| ClientError::InvalidBackupFile(e.to_string()))?;

                if backup.version != BACKUP_FILE_VERSION {
                    return Err(ClientError::UnsupportedBackupVersion(backup.version));
                }

                let share = decrypt_with_password(&backup.encrypted_share, &password)?;
                (share, backup.share_version)
            }

            RecoveryInput::Email { email_share } => {
                let (share, version) = parse_versioned_email_share(email_share.trim());
                (share, version)
            }
        };

        // Step 2: fetch the matching auth share and reconstruct.
        let status = self.server.fetch_key_status(share_version).await?;
        let auth_share = status.auth_share.clone().ok_or(ClientError::MissingAuthShare)?;

        let private_key = reconstruct_from_shares(&[
            Share::from_hex(&recovery_share)?,
            Share::from_hex(&auth_share)?,
        ])?;

        let primary_did = status.primary_did.clone().unwrap_or_default();

        // Step 3: validate BEFORE any write. A stale credential
        // reconstructs garbage; rotating garbage over the server's auth
        // share would be unrecoverable.
        if !primary_did.is_empty() {
            if let Some(derive) = &self.did_from_private_key {
                if derive(&private_key) != primary_did {
                    return Err(ClientError::RecoveryMismatch);
                }
            }
        }

        // Step 4: the proven recovery share becomes the device share.
        self.store_local_key(&recovery_share).await?;

        let version_to_store = share_version.or(status.share_version).unwrap_or(1);
        self.store_local_share_version(version_to_store).await?;

        Ok(RecoveryResult {
            private_key,
            did: primary_did,
        })
    }

    // --- Recovery setup ---

    /// Register a recovery method: re-split the key, distribute the fresh
    /// (device, auth) pair, and store/emit the recovery share per method.
    pub async fn setup_recovery_method(
        &self,
        private_key: &PrivateKey,
        input: RecoverySetupInput,
        auth_user: Option<&AuthUser>,
    ) -> Result<RecoverySetupResult> {
        // Passkey pre-flight: create the credential and verify PRF support
        // BEFORE any split/store/email work, so an unsupported platform
        // fails with zero side effects.
        let passkey_credential = if matches!(input, RecoverySetupInput::Passkey) {
            let provider = self
                .passkeys
                .as_ref()
                .ok_or(ClientError::PasskeyUnsupported)?;

            if !provider.is_supported() {
                return Err(ClientError::PasskeyUnsupported);
            }

            let user = auth_user.ok_or(ClientError::NotAuthenticated)?;
            let user_name = user
                .email
                .clone()
                .or_else(|| user.phone.clone())
                .unwrap_or_else(|| user.id.clone());

            Some(provider.create_credential(&user.id, &user_name).await?)
        } else {
            None
        };

        // Every setup starts from a fresh split so the stored recovery
        // share pairs with the auth share written below.
        let split = split_and_verify(private_key)?;

        self.inner.lock().unwrap().last_email_share = Some(split.shares.email.to_hex());

        self.store_local_key(&split.shares.device.to_hex()).await?;

        let status = self.server.fetch_key_status(None).await?;
        let primary_did = status.primary_did.clone().unwrap_or_default();

        let share_version = self
            .store_auth_share(&split.shares.auth.to_hex(), &primary_did)
            .await?;

        // Re-send the email backup share so it stays in sync with the new
        // auth share. Fire-and-forget; the email method handles its own
        // send exclusively.
        if self.enable_email_backup && !matches!(input, RecoverySetupInput::Email) {
            let (cached_share, to_recovery_email) = {
                let mut inner = self.inner.lock().unwrap();
                (inner.last_email_share.take(), inner.has_recovery_email)
            };

            if let Some(email_share) = cached_share {
                let payload = format_versioned_email_share(&email_share, share_version);
                let email = auth_user.and_then(|u| u.email.clone());

                let request = if to_recovery_email {
                    Some(EmailShareRequest {
                        email_share: payload,
                        email: None,
                        use_recovery_email: true,
                    })
                } else {
                    email.map(|email| EmailShareRequest {
                        email_share: payload,
                        email: Some(email),
                        use_recovery_email: false,
                    })
                };

                if let Some(request) = request {
                    let server = self.server.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.send_email_share(&request).await {
                            warn!(error = %e, "email backup share re-send failed (non-fatal)");
                        }
                    });
                }
            }
        }

        match input {
            RecoverySetupInput::Password { password } => {
                let encrypted = encrypt_with_password(&split.shares.recovery.to_hex(), &password)?;

                self.server
                    .add_recovery_method(&RecoveryMethodRecord {
                        method_type: RecoveryMethodType::Password,
                        encrypted_share: Some(encrypted),
                        credential_id: None,
                        share_version: Some(share_version),
                    })
                    .await?;

                Ok(RecoverySetupResult::Password)
            }

            RecoverySetupInput::Passkey => {
                // Created in the pre-flight block, so PRF is already known
                // to work.
                let (Some(credential), Some(provider)) =
                    (passkey_credential, self.passkeys.as_ref())
                else {
                    return Err(ClientError::PasskeyUnsupported);
                };

                let encrypted = encrypt_share_with_passkey(
                    provider.as_ref(),
                    &credential.credential_id,
                    &split.shares.recovery.to_hex(),
                )
                .await?;

                self.server
                    .add_recovery_method(&RecoveryMethodRecord {
                        method_type: RecoveryMethodType::Passkey,
                        encrypted_share: Some(encrypted),
                        credential_id: Some(credential.credential_id.clone()),
                        share_version: Some(share_version),
                    })
                    .await?;

                Ok(RecoverySetupResult::Passkey {
                    credential_id: credential.credential_id,
                })
            }

            RecoverySetupInput::Phrase => {
                let phrase = share_to_phrase(&split.shares.recovery.to_hex())?;

                // Registered without a share: the user holds the phrase.
                // The record exists so the method is listed and its version
                // can be looked up during recovery.
                self.server
                    .add_recovery_method(&RecoveryMethodRecord {
                        method_type: RecoveryMethodType::Phrase,
                        encrypted_share: None,
                        credential_id: None,
                        share_version: Some(share_version),
                    })
                    .await?;

                Ok(RecoverySetupResult::Phrase { phrase })
            }

            RecoverySetupInput::Backup { password, did } => {
                let encrypted = encrypt_with_password(&split.shares.recovery.to_hex(), &password)?;

                let file = BackupFile {
                    version: BACKUP_FILE_VERSION,
                    created_at: chrono::Utc::now().to_rfc3339(),
                    primary_did: did,
                    share_version: Some(share_version),
                    encrypted_share: encrypted,
                };

                self.server
                    .add_recovery_method(&RecoveryMethodRecord {
                        method_type: RecoveryMethodType::Backup,
                        encrypted_share: None,
                        credential_id: None,
                        share_version: Some(share_version),
                    })
                    .await?;

                Ok(RecoverySetupResult::Backup { file })
            }

            RecoverySetupInput::Email => {
                // The raw recovery email never reaches the client; the
                // server resolves the destination.
                self.server
                    .send_email_share(&EmailShareRequest {
                        email_share: format_versioned_email_share(
                            &split.shares.email.to_hex(),
                            share_version,
                        ),
                        email: None,
                        use_recovery_email: true,
                    })
                    .await?;

                self.server
                    .add_recovery_method(&RecoveryMethodRecord {
                        method_type: RecoveryMethodType::Email,
                        encrypted_share: None,
                        credential_id: None,
                        share_version: Some(share_version),
                    })
                    .await?;

                self.inner.lock().unwrap().has_recovery_email = true;

                Ok(RecoverySetupResult::Email)
            }
        }
    }

    /// Recovery methods the user can choose from. Errors degrade to an
    /// empty list; when email backup is enabled an email option is injected
    /// unless the server already lists one.
    pub async fn available_recovery_methods(&self) -> Vec<RecoveryMethodInfo> {
        match self.server.fetch_key_status(None).await {
            Ok(status) => {
                let mut methods = status.recovery_methods;

                if self.enable_email_backup
                    && !methods
                        .iter()
                        .any(|m| m.method_type == RecoveryMethodType::Email)
                {
                    methods.push(RecoveryMethodInfo {
                        method_type: RecoveryMethodType::Email,
                        created_at: Some(chrono::Utc::now().to_rfc3339()),
                        credential_id: None,
                    });
                }

                methods
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch recovery methods");
                Vec::new()
            }
        }
    }

    // --- Email backup ---

    /// Send the cached email share (from the most recent split) to the
    /// user. Routed to the verified recovery email when one exists, else to
    /// the supplied primary address. One-shot: the cache is consumed.
    pub async fn send_email_backup_share(&self, email: Option<&str>) -> Result<()> {
        if !self.enable_email_backup {
            return Ok(());
        }

        let (share, version, to_recovery_email) = {
            let mut inner = self.inner.lock().unwrap();
            let Some(share) = inner.last_email_share.take() else {
                warn!("no cached email share from split_key, skipping email backup");
                return Ok(());
            };
            (share, inner.last_share_version.take(), inner.has_recovery_email)
        };

        let payload = match version {
            Some(version) => format_versioned_email_share(&share, version),
            None => share,
        };

        let request = if to_recovery_email {
            EmailShareRequest {
                email_share: payload,
                email: None,
                use_recovery_email: true,
            }
        } else {
            let Some(email) = email else {
                warn!("no email address for backup share, skipping");
                return Ok(());
            };
            EmailShareRequest {
                email_share: payload,
                email: Some(email.to_string()),
                use_recovery_email: false,
            }
        };

        self.server.send_email_share(&request).await
    }
}

/// Read-only [`ShareStorage`] view over an in-memory (device, auth) pair.
struct PairView {
    device: String,
    auth: String,
}

#[async_trait::async_trait]
impl ShareStorage for PairView {
    async fn store_device(&self, _share_hex: &str) -> Result<()> {
        Err(ClientError::Storage("pair view is read-only".to_string()))
    }

    async fn store_auth(&self, _share_hex: &str) -> Result<()> {
        Err(ClientError::Storage("pair view is read-only".to_string()))
    }

    async fn get_device(&self) -> Result<Option<String>> {
        Ok(Some(self.device.clone()))
    }

    async fn get_auth(&self) -> Result<Option<String>> {
        Ok(Some(self.auth.clone()))
    }
}
