//! Cross-device login over a QR code or short code.
//!
//! Two roles:
//!   - **Requester** (new device, no share): creates a relay session with an
//!     ephemeral public key, renders the QR payload, polls for approval.
//!   - **Approver** (logged-in device holding a share): resolves the session
//!     by scanned payload or typed code, encrypts its device share for the
//!     requester, posts the approval.
//!
//! The relay only ever sees public keys and ciphertext. Both keypairs are
//! ephemeral; no static identity key is exposed.

use std::time::Duration;

use keyshare_crypto::transfer::{
    decrypt_from_transfer, encrypt_for_transfer, TransferKeypair, TransferPayload,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::error::{ClientError, Result};
use crate::ports::{NotifyResult, QrRelayPort, QrSession, QrSessionStatus};

/// Contents of the rendered QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    /// Relay session to approve.
    pub session_id: String,
    /// Requester's ephemeral X25519 public key, base64.
    pub public_key: String,
}

/// Everything the requester needs to display a QR and start polling. The
/// keypair stays in memory only, never serialized.
pub struct RequesterSession {
    /// Relay session (id, short code, TTL).
    pub session: QrSession,
    /// Ephemeral keypair for this session's lifetime.
    pub keypair: TransferKeypair,
    /// Payload to render as a QR code.
    pub qr_payload: QrPayload,
}

/// Plaintext envelope carried inside the transfer payload.
#[derive(Debug, Serialize, Deserialize)]
struct TransferEnvelope {
    /// Device share, hex.
    d: String,
    /// Optional account hint (approver's email/phone) shown on the new
    /// device as a login hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    h: Option<String>,
}

/// Result of one poll.
#[derive(Debug)]
pub enum PollResult {
    /// Not yet approved.
    Pending,
    /// Approved and decrypted.
    Approved(ApprovedTransfer),
}

/// Decrypted approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedTransfer {
    /// The transferred device share, hex.
    pub device_share: String,
    /// DID of the approving device.
    pub approver_did: String,
    /// Optional login hint for the approver's account.
    pub account_hint: Option<String>,
}

/// Options for [`poll_until_approved`].
pub struct PollOptions {
    /// Delay between polls.
    pub interval: Duration,
    /// Total time budget.
    pub timeout: Duration,
    /// Abort signal: send `true` to cancel. Aborting rejects with
    /// [`ClientError::SessionAborted`], distinct from a timeout.
    pub abort: Option<watch::Receiver<bool>>,
    /// Invoked before each attempt with the 1-based attempt number.
    pub on_poll: Option<Box<dyn Fn(u32) + Send + Sync>>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(120),
            abort: None,
            on_poll: None,
        }
    }
}

/// Create a relay session and the requester's ephemeral keypair.
pub async fn create_qr_login_session(relay: &dyn QrRelayPort) -> Result<RequesterSession> {
    let keypair = TransferKeypair::generate();
    let public_key = keypair.public_key_base64();

    let session = relay.create_session(&public_key).await?;

    let qr_payload = QrPayload {
        session_id: session.session_id.clone(),
        public_key,
    };

    Ok(RequesterSession {
        session,
        keypair,
        qr_payload,
    })
}

/// Poll a session once. On approval, derives the shared key and decrypts
/// the transferred share.
pub async fn poll_qr_session(
    relay: &dyn QrRelayPort,
    session_id: &str,
    keypair: &TransferKeypair,
) -> Result<PollResult> {
    let info = relay.get_session(session_id).await?;

    if info.status == QrSessionStatus::Pending {
        return Ok(PollResult::Pending);
    }

    let encrypted_payload = info.encrypted_payload.ok_or_else(|| {
        ClientError::InvalidSessionPayload("session approved but payload is missing".to_string())
    })?;
    let approver_did = info.approver_did.ok_or_else(|| {
        ClientError::InvalidSessionPayload("session approved but approver DID is missing".to_string())
    })?;

    let payload: TransferPayload = serde_json::from_str(&encrypted_payload)
        .map_err(|e| ClientError::InvalidSessionPayload(e.to_string()))?;

    let plaintext = decrypt_from_transfer(&payload, keypair)?;

    let envelope: TransferEnvelope = serde_json::from_str(&plaintext)
        .map_err(|e| ClientError::InvalidSessionPayload(e.to_string()))?;

    Ok(PollResult::Approved(ApprovedTransfer {
        device_share: envelope.d,
        approver_did,
        account_hint: envelope.h,
    }))
}

/// Poll in a loop until approved, timed out, or aborted.
///
/// Timeout and abort reject with distinct errors
/// ([`ClientError::SessionTimeout`] vs [`ClientError::SessionAborted`]);
/// nothing continues polling after either.
pub async fn poll_until_approved(
    relay: &dyn QrRelayPort,
    session_id: &str,
    keypair: &TransferKeypair,
    mut options: PollOptions,
) -> Result<ApprovedTransfer> {
    let deadline = tokio::time::Instant::now() + options.timeout;
    let mut attempt: u32 = 0;

    loop {
        if let Some(abort) = &options.abort {
            if *abort.borrow() {
                return Err(ClientError::SessionAborted);
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(ClientError::SessionTimeout);
        }

        attempt += 1;
        if let Some(on_poll) = &options.on_poll {
            on_poll(attempt);
        }

        if let PollResult::Approved(transfer) =
            poll_qr_session(relay, session_id, keypair).await?
        {
            return Ok(transfer);
        }

        let sleep = tokio::time::sleep_until(
            tokio::time::Instant::now() + options.interval.min(deadline - tokio::time::Instant::now()),
        );

        match options.abort.as_mut() {
            Some(abort) => {
                tokio::select! {
                    _ = sleep => {}
                    changed = abort.changed() => {
                        if changed.is_ok() && *abort.borrow() {
                            return Err(ClientError::SessionAborted);
                        }
                    }
                }
            }
            None => sleep.await,
        }
    }
}

/// Approve a session: wrap the device share in the transfer envelope,
/// encrypt it for the requester, and post it to the relay.
pub async fn approve_qr_session(
    relay: &dyn QrRelayPort,
    session_id: &str,
    device_share: &str,
    approver_did: &str,
    recipient_public_key: &str,
    account_hint: Option<&str>,
) -> Result<()> {
    let envelope = TransferEnvelope {
        d: device_share.to_string(),
        h: account_hint.map(str::to_string),
    };

    let plaintext = serde_json::to_string(&envelope)
        .map_err(|e| ClientError::InvalidSessionPayload(e.to_string()))?;

    let payload = encrypt_for_transfer(&plaintext, recipient_public_key)?;

    let payload_json = serde_json::to_string(&payload)
        .map_err(|e| ClientError::InvalidSessionPayload(e.to_string()))?;

    relay
        .approve_session(session_id, &payload_json, approver_did)
        .await
}

/// Best-effort push notification asking the user's other devices to open
/// the approver flow. Never fails the caller: errors are logged and
/// reported as `sent: false`.
pub async fn notify_devices_for_session(
    relay: &dyn QrRelayPort,
    session_id: &str,
    short_code: &str,
) -> NotifyResult {
    match relay.notify_devices(session_id, short_code).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "device notification failed (non-fatal)");
            NotifyResult::default()
        }
    }
}
