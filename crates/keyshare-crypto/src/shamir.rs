//! Shamir secret sharing for private-key custody.
//!
//! A 32-byte private key is split into four shares with a 2-of-4 threshold:
//! any two shares reconstruct the key exactly, a single share reveals
//! nothing. The four shares are routed to device storage, the authenticated
//! server, the user's chosen recovery method, and an optional email backup.
//!
//! # Security Model
//!
//! - Each split draws fresh random polynomial coefficients, so two splits of
//!   the same key never produce an identical share value.
//! - Shares from *different* splits of the same key are NOT interchangeable:
//!   reconstruction from a mixed pair silently yields a wrong 32-byte value
//!   of the right shape. The math cannot detect this; only the downstream
//!   DID check can. Do not "fix" this with share-origin tagging; callers
//!   rely on the silent behavior and gate every recovery on DID
//!   verification instead.

use sharks::{Share as RawShare, Sharks};

use crate::constants::{PRIVATE_KEY_LEN, SHARE_LEN, SSS_THRESHOLD, SSS_TOTAL_SHARES};
use crate::errors::{CryptoError, Result};
use crate::keys::PrivateKey;

/// One output of a Shamir split: an index byte plus 32 data bytes.
///
/// Hex form is 66 characters (index byte followed by the data bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// Share index (x coordinate), 1-based, never zero.
    pub index: u8,
    /// Share data, same length as the secret.
    pub data: [u8; PRIVATE_KEY_LEN],
}

impl Share {
    /// Convert the share to its 66-character hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parse a share from its hex form.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|_| CryptoError::InvalidShareFormat("invalid hex encoding".to_string()))?;

        Self::from_bytes(&bytes)
    }

    /// Raw bytes: 1 index byte followed by 32 data bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SHARE_LEN);
        bytes.push(self.index);
        bytes.extend_from_slice(&self.data);
        bytes
    }

    /// Parse a share from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SHARE_LEN {
            return Err(CryptoError::InvalidShareFormat(format!(
                "expected {SHARE_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let index = bytes[0];
        if index == 0 {
            return Err(CryptoError::InvalidShareFormat(
                "share index cannot be 0".to_string(),
            ));
        }

        let mut data = [0u8; PRIVATE_KEY_LEN];
        data.copy_from_slice(&bytes[1..SHARE_LEN]);

        Ok(Self { index, data })
    }

    fn to_raw(&self) -> Result<RawShare> {
        RawShare::try_from(self.to_bytes().as_slice())
            .map_err(|e| CryptoError::InvalidShareFormat(e.to_string()))
    }

    fn from_raw(share: &RawShare) -> Result<Self> {
        let bytes: Vec<u8> = share.into();
        Self::from_bytes(&bytes)
    }
}

/// The four named shares produced by one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareSet {
    /// Stored encrypted on the user's device.
    pub device: Share,
    /// Stored by the authenticated server.
    pub auth: Share,
    /// Protected by the user's chosen recovery method.
    pub recovery: Share,
    /// Relayed once to the user's email, never persisted server-side.
    pub email: Share,
}

impl ShareSet {
    /// All C(4,2) = 6 share pairings with their labels.
    ///
    /// Every pairing of a valid split must reconstruct the original key;
    /// `split_and_verify` asserts this before any share is distributed.
    pub fn pairings(&self) -> [(&'static str, &Share, &Share); 6] {
        [
            ("device+auth", &self.device, &self.auth),
            ("device+recovery", &self.device, &self.recovery),
            ("device+email", &self.device, &self.email),
            ("auth+recovery", &self.auth, &self.recovery),
            ("auth+email", &self.auth, &self.email),
            ("recovery+email", &self.recovery, &self.email),
        ]
    }
}

/// Split a private key into four shares with a 2-of-4 threshold.
///
/// Each call draws fresh polynomial coefficients: splitting the same key
/// twice produces entirely disjoint share values, yet every pairing within
/// one split reconstructs the same key.
pub fn split_private_key(key: &PrivateKey) -> Result<ShareSet> {
    let sharks = Sharks(SSS_THRESHOLD as u8);

    let dealer = sharks.dealer(key.as_bytes());
    let raw: Vec<RawShare> = dealer.take(SSS_TOTAL_SHARES).collect();

    if raw.len() != SSS_TOTAL_SHARES {
        return Err(CryptoError::SplitFailed(format!(
            "expected {SSS_TOTAL_SHARES} shares, got {}",
            raw.len()
        )));
    }

    Ok(ShareSet {
        device: Share::from_raw(&raw[0])?,
        auth: Share::from_raw(&raw[1])?,
        recovery: Share::from_raw(&raw[2])?,
        email: Share::from_raw(&raw[3])?,
    })
}

/// Reconstruct a private key from shares.
///
/// Only the first two shares of the list are used; callers must pass
/// meaningful shares. Fails with [`CryptoError::InsufficientShares`] below
/// the threshold and [`CryptoError::DuplicateShareIndex`] when both shares
/// have the same index.
///
/// # Security Warning
///
/// Reconstruction does NOT verify the result. Two well-formed shares from
/// different splits of the same key reconstruct a different, wrong value
/// with no error here; callers must verify the derived DID before trusting
/// or persisting anything derived from the output.
pub fn reconstruct_from_shares(shares: &[Share]) -> Result<PrivateKey> {
    if shares.len() < SSS_THRESHOLD {
        return Err(CryptoError::InsufficientShares {
            required: SSS_THRESHOLD,
            provided: shares.len(),
        });
    }

    let selected = &shares[..SSS_THRESHOLD];

    if selected[0].index == selected[1].index {
        return Err(CryptoError::DuplicateShareIndex(selected[0].index));
    }

    let raw: Vec<RawShare> = selected
        .iter()
        .map(Share::to_raw)
        .collect::<Result<Vec<_>>>()?;

    let sharks = Sharks(SSS_THRESHOLD as u8);
    let secret = sharks
        .recover(&raw)
        .map_err(|e| CryptoError::ReconstructFailed(e.to_string()))?;

    let seed: [u8; PRIVATE_KEY_LEN] =
        secret
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::ReconstructFailed(format!(
                "invalid secret length: expected {PRIVATE_KEY_LEN} bytes, got {}",
                secret.len()
            )))?;

    Ok(PrivateKey::from_bytes(seed))
}
