//! Capability ports consumed by the client engine.
//!
//! The engine never talks to a concrete auth SDK, HTTP framework, or
//! storage backend: it depends on these narrow interfaces, and test doubles
//! implement the same traits. Production implementations live in
//! [`crate::api`] (reqwest) and [`crate::storage`] (encrypted key-value
//! store).

use async_trait::async_trait;
use keyshare_crypto::{EncryptedPayload, PrivateKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

/// Derives the public DID for a private key.
///
/// Injected rather than hard-wired so hosts with their own DID method can
/// supply it; [`keyshare_crypto::did_key_from_private_key`] is the default.
pub type DidDeriver = Arc<dyn Fn(&PrivateKey) -> String + Send + Sync>;

/// An authenticated user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Stable user identifier.
    pub id: String,
    /// Primary email address, if known.
    pub email: Option<String>,
    /// Primary phone number, if known.
    pub phone: Option<String>,
}

/// Identity source: supplies the current user and identity tokens.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The currently signed-in user, if any.
    async fn current_user(&self) -> Result<Option<AuthUser>>;

    /// A fresh identity token for server calls.
    async fn id_token(&self) -> Result<String>;

    /// Provider discriminator sent with every server call.
    fn provider_type(&self) -> &str;

    /// Sign the current user out.
    async fn sign_out(&self) -> Result<()>;
}

/// Which engine a server-side key record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyProvider {
    /// A share-split key managed by this engine.
    Sss,
    /// The legacy single-factor provider; accounts on it need migration.
    Legacy,
}

/// A supported recovery method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMethodType {
    /// Recovery share encrypted under a user password.
    Password,
    /// Recovery share encrypted under a WebAuthn PRF output.
    Passkey,
    /// Recovery share encoded as a checksummed word sequence.
    Phrase,
    /// Recovery share inside a password-encrypted backup file.
    Backup,
    /// The fourth share, relayed once to the user's email.
    Email,
}

impl std::fmt::Display for RecoveryMethodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password => write!(f, "password"),
            Self::Passkey => write!(f, "passkey"),
            Self::Phrase => write!(f, "phrase"),
            Self::Backup => write!(f, "backup"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// Metadata about a registered recovery method. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryMethodInfo {
    /// Method discriminator.
    #[serde(rename = "type")]
    pub method_type: RecoveryMethodType,
    /// RFC 3339 creation time, when the server reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// WebAuthn credential id, for passkey methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
}

/// The server's view of a user's key record, normalized into one canonical
/// shape immediately after deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerKeyStatus {
    /// Whether the server holds any key record for the account.
    pub exists: bool,
    /// Which engine owns the record.
    pub key_provider: Option<KeyProvider>,
    /// The account's recorded DID.
    pub primary_did: Option<String>,
    /// Registered recovery methods.
    pub recovery_methods: Vec<RecoveryMethodInfo>,
    /// The auth share, hex. Always a plain string internally regardless of
    /// the wire shape.
    pub auth_share: Option<String>,
    /// Version of the returned (device, auth) share pair.
    pub share_version: Option<u32>,
    /// Masked form of the verified recovery email, when one is set.
    pub masked_recovery_email: Option<String>,
}

/// A recovery-method registration sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryMethodRecord {
    /// Method discriminator.
    #[serde(rename = "type")]
    pub method_type: RecoveryMethodType,
    /// Encrypted recovery share, for methods the server stores one for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_share: Option<EncryptedPayload>,
    /// WebAuthn credential id, for passkey methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    /// Share version this method's share belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_version: Option<u32>,
}

/// An encrypted recovery share fetched from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryShareRecord {
    /// The stored encrypted share, when the method stores one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_share: Option<EncryptedPayload>,
    /// Share version the stored share belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_version: Option<u32>,
}

/// A request to relay an email share to the user's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailShareRequest {
    /// The share payload, optionally `"<version>:<share>"` prefixed.
    pub email_share: String,
    /// Explicit destination address. Ignored when `use_recovery_email`.
    pub email: Option<String>,
    /// Route to the server-side verified recovery email; the raw address
    /// never leaves the server.
    pub use_recovery_email: bool,
}

/// Key-server operations, behind a trait so the transport stays swappable
/// and testable.
#[async_trait]
pub trait KeyServerPort: Send + Sync {
    /// Fetch the current key status + auth share, optionally pinned to a
    /// historical share version.
    async fn fetch_key_status(&self, share_version: Option<u32>) -> Result<ServerKeyStatus>;

    /// Store/overwrite the auth share and primary DID. Returns the new
    /// share version.
    async fn store_auth_share(&self, auth_share: &str, primary_did: &str) -> Result<u32>;

    /// Register a recovery method record.
    async fn add_recovery_method(&self, record: &RecoveryMethodRecord) -> Result<()>;

    /// Fetch an encrypted recovery share by method type. `Ok(None)` when the
    /// server has no record of that type.
    async fn get_recovery_share(
        &self,
        method: RecoveryMethodType,
        credential_id: Option<&str>,
    ) -> Result<Option<RecoveryShareRecord>>;

    /// Mark a legacy-provider account as migrated.
    async fn mark_migrated(&self) -> Result<()>;

    /// Delete all server-side key material for the account.
    async fn delete_key(&self) -> Result<()>;

    /// Relay an email share to the user's address. The server never
    /// persists it.
    async fn send_email_share(&self, request: &EmailShareRequest) -> Result<()>;
}

/// An ephemeral QR/short-code relay session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrSession {
    /// Relay session identifier.
    pub session_id: String,
    /// Human-typeable short code resolving to the same session.
    pub short_code: String,
    /// Relay-side TTL.
    pub expires_in_seconds: u64,
}

/// Relay session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrSessionStatus {
    /// Waiting for an approver.
    Pending,
    /// An approver has posted an encrypted payload.
    Approved,
}

/// Resolved relay session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrSessionInfo {
    /// Relay session identifier.
    pub session_id: String,
    /// Requester's ephemeral X25519 public key, base64.
    pub public_key: String,
    /// Session state.
    pub status: QrSessionStatus,
    /// Encrypted transfer payload JSON, present once approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_payload: Option<String>,
    /// DID of the approving device, present once approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_did: Option<String>,
}

/// Outcome of a best-effort push notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyResult {
    /// Whether any notification was dispatched.
    pub sent: bool,
    /// Number of devices notified.
    pub device_count: u32,
}

/// QR relay operations.
#[async_trait]
pub trait QrRelayPort: Send + Sync {
    /// Register a requester public key; returns the new session.
    async fn create_session(&self, public_key: &str) -> Result<QrSession>;

    /// Resolve a session by id or short code.
    /// Fails with [`crate::error::ClientError::SessionNotFound`] when the
    /// session does not exist or has expired.
    async fn get_session(&self, lookup: &str) -> Result<QrSessionInfo>;

    /// Post the encrypted payload, marking the session approved.
    async fn approve_session(
        &self,
        session_id: &str,
        encrypted_payload: &str,
        approver_did: &str,
    ) -> Result<()>;

    /// Best-effort push notification prompting other devices to open the
    /// approver flow.
    async fn notify_devices(&self, session_id: &str, short_code: &str) -> Result<NotifyResult>;
}

/// Local device-share storage as the coordinator sees it: one device share
/// for the active account.
#[async_trait]
pub trait LocalShareStore: Send + Sync {
    /// Store (overwrite) the device share.
    async fn store_device_share(&self, share_hex: &str) -> Result<()>;

    /// Fetch the device share, if present and decryptable.
    async fn get_device_share(&self) -> Result<Option<String>>;

    /// Whether a usable device share is present.
    async fn has_device_share(&self) -> Result<bool>;

    /// Remove all locally stored shares for the account.
    async fn clear_shares(&self) -> Result<()>;
}

/// Source of the legacy provider's key during migration. Best-effort: a
/// failure here downgrades to migration without a prefetched key.
#[async_trait]
pub trait LegacyKeyProvider: Send + Sync {
    /// Fetch the legacy key, if the provider still has one.
    async fn fetch_legacy_key(&self) -> Result<Option<String>>;
}
