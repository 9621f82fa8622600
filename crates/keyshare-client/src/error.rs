//! Client error taxonomy.

use std::fmt;

use keyshare_crypto::CryptoError;
use thiserror::Error;

/// Phase of an atomic share update, reported by
/// [`ClientError::AtomicUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    /// Splitting and verifying the key.
    Split,
    /// Writing the device share to local storage.
    StoreDevice,
    /// Writing the auth share to the server.
    StoreAuth,
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Split => write!(f, "split"),
            Self::StoreDevice => write!(f, "store_device"),
            Self::StoreAuth => write!(f, "store_auth"),
        }
    }
}

/// Errors produced by the client engine.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A multi-store update failed partway. `rolled_back` reports whether
    /// the local device share was restored to its previous value.
    #[error("atomic share update failed in phase {phase} (rolled back: {rolled_back}): {source}")]
    AtomicUpdate {
        /// Which phase failed.
        phase: UpdatePhase,
        /// Whether the device-share write was rolled back.
        rolled_back: bool,
        /// The underlying failure.
        #[source]
        source: Box<ClientError>,
    },

    /// A recovery credential reconstructed a key whose DID does not match
    /// the account. Recovery is aborted before any write: overwriting the
    /// server's auth share with a wrong key would be unrecoverable.
    #[error("recovery produced an incorrect key; the recovery credential may be outdated")]
    RecoveryMismatch,

    /// QR session does not exist or has expired.
    #[error("QR session not found or expired")]
    SessionNotFound,

    /// QR polling was cancelled via the abort signal.
    #[error("QR login polling aborted")]
    SessionAborted,

    /// QR polling exhausted its timeout without an approval.
    #[error("QR login session timed out")]
    SessionTimeout,

    /// A session reported approval without carrying a payload.
    #[error("invalid QR session payload: {0}")]
    InvalidSessionPayload(String),

    /// A coordinator transition was requested from the wrong state.
    #[error("cannot {action} in state: {state}")]
    InvalidState {
        /// The requested transition.
        action: &'static str,
        /// The coordinator's current state name.
        state: String,
    },

    /// The platform has no WebAuthn PRF support; passkey setup must fail
    /// loudly instead of storing a non-functional credential.
    #[error("passkeys with the PRF extension are not supported on this platform")]
    PasskeyUnsupported,

    /// The user dismissed the platform credential prompt. Distinct from a
    /// generic failure so UIs can treat it as a non-error.
    #[error("passkey prompt was cancelled by the user")]
    PasskeyCancelled,

    /// The server holds no auth share for this account.
    #[error("no auth share found on server")]
    MissingAuthShare,

    /// No device share is stored locally.
    #[error("no device share found")]
    MissingDeviceShare,

    /// The server holds no recovery share of the requested type.
    #[error("no {0} recovery share found")]
    MissingRecoveryShare(String),

    /// A backup file declared a version this client does not understand.
    #[error("unsupported backup file version: {0}")]
    UnsupportedBackupVersion(u32),

    /// A backup file failed to parse.
    #[error("invalid backup file: {0}")]
    InvalidBackupFile(String),

    /// Local storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The server rejected a request.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Server-provided message, if any.
        message: String,
    },

    /// The requested resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The server could not be reached.
    #[error("cannot reach the key server")]
    ServerUnreachable,

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// No authenticated user is available for a call that requires one.
    #[error("not authenticated")]
    NotAuthenticated,

    /// An auth-provider failure.
    #[error("auth provider error: {0}")]
    AuthProvider(String),

    /// A cryptographic failure. Always propagated; a silent failure here
    /// risks an unrecoverable key.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::ServerUnreachable
        } else if let Some(status) = err.status() {
            Self::Server {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::ServerUnreachable
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
