//! # keyshare-client
//!
//! Client engine for keyshare custody. A user's signing key is split
//! 2-of-4 across their device, the key server, a chosen recovery method,
//! and an optional email backup; this crate owns everything around that
//! lifecycle on the client side:
//!
//! - the encrypted device-local share store ([`storage`])
//! - verified splitting and rollback-safe multi-store updates ([`atomic`])
//! - the unified auth/key-derivation state machine ([`coordinator`])
//! - the pluggable recovery-method strategy ([`recovery`])
//! - passkey (WebAuthn PRF) share protection ([`passkey`])
//! - the QR/short-code cross-device transfer flow ([`qr`])
//!
//! External systems (auth provider, key server, QR relay, platform
//! credentials, raw key-value storage) are consumed only through the
//! capability ports in [`ports`]; reqwest-backed implementations live in
//! [`api`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod api;
pub mod atomic;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod passkey;
pub mod ports;
pub mod qr;
pub mod recovery;
pub mod storage;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{HttpKeyServer, HttpQrRelay};
pub use atomic::{
    atomic_recovery, atomic_share_update, split_and_verify, verify_stored_shares, RecoveryOutcome,
    ShareHealth, ShareStorage, UpdateOptions, VerifiedSplit,
};
pub use coordinator::{AuthCoordinator, AuthCoordinatorConfig, AuthState, StateObserver};
pub use error::{ClientError, Result, UpdatePhase};
pub use passkey::{
    decrypt_share_with_passkey, encrypt_share_with_passkey, PasskeyCredential, PasskeyProvider,
};
pub use ports::{
    AuthProvider, AuthUser, DidDeriver, EmailShareRequest, KeyProvider, KeyServerPort,
    LegacyKeyProvider, LocalShareStore, NotifyResult, QrRelayPort, QrSession, QrSessionInfo,
    QrSessionStatus, RecoveryMethodInfo, RecoveryMethodRecord, RecoveryMethodType,
    RecoveryShareRecord, ServerKeyStatus,
};
pub use qr::{
    approve_qr_session, create_qr_login_session, notify_devices_for_session, poll_qr_session,
    poll_until_approved, ApprovedTransfer, PollOptions, PollResult, QrPayload, RequesterSession,
};
pub use recovery::{
    format_versioned_email_share, parse_versioned_email_share, BackupFile, RecoveryInput,
    RecoveryResult, RecoverySetupInput, RecoverySetupResult, ShareStrategy, ShareStrategyConfig,
    SplitKey, BACKUP_FILE_VERSION,
};
pub use storage::{
    DeviceShareStore, EncryptedShareStore, FsKeyValueStore, KeyValueStore, MemoryKeyValueStore,
    ShareEntry, DEFAULT_DEVICE_SHARE_ID,
};
