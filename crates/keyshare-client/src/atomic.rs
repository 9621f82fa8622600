//! Atomic share operations.
//!
//! Splitting a key and distributing its shares touches two independent
//! backends (local device storage, remote server). These helpers guarantee
//! that a partial failure can never leave the key unrecoverable: shares are
//! verified against every pairing before they leave this module, and the
//! two-backend update rolls the local write back when the remote write
//! fails.

use async_trait::async_trait;
use keyshare_crypto::shamir::{reconstruct_from_shares, split_private_key, Share, ShareSet};
use keyshare_crypto::{CryptoError, PrivateKey};
use tracing::error;

use crate::error::{ClientError, Result, UpdatePhase};
use crate::ports::DidDeriver;

/// The two share slots an atomic update writes: the device share locally
/// and the auth share remotely.
#[async_trait]
pub trait ShareStorage: Send + Sync {
    /// Store (overwrite) the local device share.
    async fn store_device(&self, share_hex: &str) -> Result<()>;

    /// Store (overwrite) the remote auth share.
    async fn store_auth(&self, share_hex: &str) -> Result<()>;

    /// Fetch the local device share.
    async fn get_device(&self) -> Result<Option<String>>;

    /// Fetch the remote auth share.
    async fn get_auth(&self) -> Result<Option<String>>;
}

/// A split whose shares have been checked against every pairing.
#[derive(Debug, Clone)]
pub struct VerifiedSplit {
    /// The four verified shares.
    pub shares: ShareSet,
    /// Always true; carried so callers can assert they hold a verified
    /// split rather than a bare one.
    pub verified: bool,
}

/// Options for [`atomic_share_update`].
#[derive(Default)]
pub struct UpdateOptions {
    /// Device share to restore if the remote write fails after the local
    /// one succeeded.
    pub previous_device_share: Option<String>,
    /// Invoked after a successful rollback.
    pub on_rollback: Option<Box<dyn Fn() + Send + Sync>>,
}

/// Split a key and verify that all six share pairings reconstruct it.
///
/// Callers never receive unverified shares: any failing pairing aborts with
/// [`CryptoError::ShareVerification`] before anything is returned.
pub fn split_and_verify(key: &PrivateKey) -> Result<VerifiedSplit> {
    let shares = split_private_key(key)?;

    for (combination, a, b) in shares.pairings() {
        let reconstructed = reconstruct_from_shares(&[a.clone(), b.clone()])?;

        if reconstructed != *key {
            return Err(CryptoError::ShareVerification {
                combination: combination.to_string(),
                expected: key.to_hex(),
                got: reconstructed.to_hex(),
            }
            .into());
        }
    }

    Ok(VerifiedSplit {
        shares,
        verified: true,
    })
}

/// Split a key and distribute device + auth shares across both backends.
///
/// Phases: (1) split+verify, (2) store the device share locally, (3) store
/// the auth share remotely, in that order, each completing before the next
/// starts. If phase 3 fails and `previous_device_share` was supplied, the
/// local write is rolled back before the error propagates and `on_rollback`
/// is invoked. A rollback failure leaves local and remote shares
/// inconsistent; it is logged as critical and reported via
/// `rolled_back: false`.
pub async fn atomic_share_update(
    key: &PrivateKey,
    storage: &dyn ShareStorage,
    options: UpdateOptions,
) -> Result<ShareSet> {
    let split = split_and_verify(key).map_err(|e| ClientError::AtomicUpdate {
        phase: UpdatePhase::Split,
        rolled_back: false,
        source: Box::new(e),
    })?;

    let shares = split.shares;

    storage
        .store_device(&shares.device.to_hex())
        .await
        .map_err(|e| ClientError::AtomicUpdate {
            phase: UpdatePhase::StoreDevice,
            rolled_back: false,
            source: Box::new(e),
        })?;

    if let Err(cause) = storage.store_auth(&shares.auth.to_hex()).await {
        let mut rolled_back = false;

        if let Some(previous) = &options.previous_device_share {
            match storage.store_device(previous).await {
                Ok(()) => {
                    rolled_back = true;
                    if let Some(on_rollback) = &options.on_rollback {
                        on_rollback();
                    }
                }
                Err(rollback_error) => {
                    // The local share now belongs to a split the server never
                    // saw. Nothing more can be done from here; operators must
                    // treat this as a recovery-required account.
                    error!(
                        error = %rollback_error,
                        "CRITICAL: device-share rollback failed after auth-share store failure; \
                         local and remote shares are inconsistent"
                    );
                }
            }
        }

        return Err(ClientError::AtomicUpdate {
            phase: UpdatePhase::StoreAuth,
            rolled_back,
            source: Box::new(cause),
        });
    }

    Ok(shares)
}

/// Diagnostic result of a stored-share health check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShareHealth {
    /// True iff both shares are present, reconstruct, and match the DID.
    pub healthy: bool,
    /// A device share is stored locally.
    pub has_device_share: bool,
    /// An auth share is available remotely.
    pub has_auth_share: bool,
    /// The reconstructed key derives the expected DID.
    pub did_matches: bool,
    /// Description of the first problem found.
    pub error: Option<String>,
}

/// Health-check the currently stored shares. Never fails: every problem is
/// reported through the result.
pub async fn verify_stored_shares(
    storage: &dyn ShareStorage,
    expected_did: &str,
    did_from_private_key: &DidDeriver,
) -> ShareHealth {
    let mut health = ShareHealth::default();

    let device = match storage.get_device().await {
        Ok(Some(share)) => share,
        Ok(None) => {
            health.error = Some("no device share found".to_string());
            return health;
        }
        Err(e) => {
            health.error = Some(format!("failed to read device share: {e}"));
            return health;
        }
    };
    health.has_device_share = true;

    let auth = match storage.get_auth().await {
        Ok(Some(share)) => share,
        Ok(None) => {
            health.error = Some("no auth share found".to_string());
            return health;
        }
        Err(e) => {
            health.error = Some(format!("failed to read auth share: {e}"));
            return health;
        }
    };
    health.has_auth_share = true;

    let key = match parse_and_reconstruct(&device, &auth) {
        Ok(key) => key,
        Err(e) => {
            health.error = Some(format!("reconstruction failed: {e}"));
            return health;
        }
    };

    let derived = did_from_private_key(&key);
    health.did_matches = derived == expected_did;

    if health.did_matches {
        health.healthy = true;
    } else {
        health.error = Some(format!(
            "DID mismatch: stored shares derive {derived}, expected {expected_did}"
        ));
    }

    health
}

fn parse_and_reconstruct(device_hex: &str, auth_hex: &str) -> Result<PrivateKey> {
    let device = Share::from_hex(device_hex)?;
    let auth = Share::from_hex(auth_hex)?;
    Ok(reconstruct_from_shares(&[device, auth])?)
}

/// Outcome of [`atomic_recovery`].
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    /// The reconstructed key.
    pub private_key: PrivateKey,
    /// The fresh shares written during rotation.
    pub new_shares: ShareSet,
}

/// Reconstruct a key from (recovery, auth) shares, then rotate: split anew
/// and store fresh device + auth shares.
pub async fn atomic_recovery(
    recovery_share: &Share,
    auth_share: &Share,
    storage: &dyn ShareStorage,
) -> Result<RecoveryOutcome> {
    let private_key = reconstruct_from_shares(&[recovery_share.clone(), auth_share.clone()])?;

    let new_shares = atomic_share_update(&private_key, storage, UpdateOptions::default()).await?;

    Ok(RecoveryOutcome {
        private_key,
        new_shares,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyshare_crypto::did_key_from_private_key;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MockStorage {
        device: Mutex<Option<String>>,
        auth: Mutex<Option<String>>,
        fail_device_store: AtomicBool,
        fail_auth_store: AtomicBool,
        fail_device_rollback_after: Option<usize>,
        device_store_calls: AtomicUsize,
    }

    #[async_trait]
    impl ShareStorage for MockStorage {
        async fn store_device(&self, share_hex: &str) -> Result<()> {
            let call = self.device_store_calls.fetch_add(1, Ordering::SeqCst);

            if self.fail_device_store.load(Ordering::SeqCst) {
                return Err(ClientError::Storage("device store unavailable".to_string()));
            }
            if let Some(after) = self.fail_device_rollback_after {
                if call >= after {
                    return Err(ClientError::Storage("device store died".to_string()));
                }
            }

            *self.device.lock().await = Some(share_hex.to_string());
            Ok(())
        }

        async fn store_auth(&self, share_hex: &str) -> Result<()> {
            if self.fail_auth_store.load(Ordering::SeqCst) {
                return Err(ClientError::Server {
                    status: 500,
                    message: "network error".to_string(),
                });
            }
            *self.auth.lock().await = Some(share_hex.to_string());
            Ok(())
        }

        async fn get_device(&self) -> Result<Option<String>> {
            Ok(self.device.lock().await.clone())
        }

        async fn get_auth(&self) -> Result<Option<String>> {
            Ok(self.auth.lock().await.clone())
        }
    }

    fn did_deriver() -> DidDeriver {
        Arc::new(|key: &PrivateKey| did_key_from_private_key(key))
    }

    #[test]
    fn test_split_and_verify_returns_verified_shares() {
        let key = PrivateKey::generate();
        let split = split_and_verify(&key).unwrap();

        assert!(split.verified);
        let reconstructed = reconstruct_from_shares(&[
            split.shares.device.clone(),
            split.shares.auth.clone(),
        ])
        .unwrap();
        assert_eq!(reconstructed, key);
    }

    #[test]
    fn test_split_and_verify_fuzz_100_keys() {
        for _ in 0..100 {
            let key = PrivateKey::generate();
            let split = split_and_verify(&key).unwrap();

            for (label, a, b) in split.shares.pairings() {
                let reconstructed = reconstruct_from_shares(&[a.clone(), b.clone()]).unwrap();
                assert_eq!(reconstructed, key, "pairing {label} must reconstruct");
            }
        }
    }

    #[tokio::test]
    async fn test_update_stores_both_shares_on_success() {
        let key = PrivateKey::generate();
        let storage = MockStorage::default();

        let shares = atomic_share_update(&key, &storage, UpdateOptions::default())
            .await
            .unwrap();

        assert_eq!(
            storage.get_device().await.unwrap().as_deref(),
            Some(shares.device.to_hex().as_str())
        );
        assert_eq!(
            storage.get_auth().await.unwrap().as_deref(),
            Some(shares.auth.to_hex().as_str())
        );

        // The stored pair reconstructs the key.
        let reconstructed =
            reconstruct_from_shares(&[shares.device.clone(), shares.auth.clone()]).unwrap();
        assert_eq!(reconstructed, key);
    }

    #[tokio::test]
    async fn test_device_store_failure_reports_phase() {
        let key = PrivateKey::generate();
        let storage = MockStorage {
            fail_device_store: AtomicBool::new(true),
            ..Default::default()
        };

        let err = atomic_share_update(&key, &storage, UpdateOptions::default())
            .await
            .unwrap_err();

        match err {
            ClientError::AtomicUpdate {
                phase,
                rolled_back,
                ..
            } => {
                assert_eq!(phase, UpdatePhase::StoreDevice);
                assert!(!rolled_back);
            }
            other => panic!("expected AtomicUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auth_store_failure_rolls_back_device_share() {
        let key = PrivateKey::generate();
        let previous = "previous-device-share-hex".to_string();

        let storage = MockStorage {
            device: Mutex::new(Some(previous.clone())),
            fail_auth_store: AtomicBool::new(true),
            ..Default::default()
        };

        let rollback_seen = Arc::new(AtomicBool::new(false));
        let rollback_flag = rollback_seen.clone();

        let err = atomic_share_update(
            &key,
            &storage,
            UpdateOptions {
                previous_device_share: Some(previous.clone()),
                on_rollback: Some(Box::new(move || {
                    rollback_flag.store(true, Ordering::SeqCst);
                })),
            },
        )
        .await
        .unwrap_err();

        match err {
            ClientError::AtomicUpdate {
                phase,
                rolled_back,
                ..
            } => {
                assert_eq!(phase, UpdatePhase::StoreAuth);
                assert!(rolled_back);
            }
            other => panic!("expected AtomicUpdate, got {other:?}"),
        }

        assert_eq!(storage.get_device().await.unwrap(), Some(previous));
        assert!(rollback_seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_auth_store_failure_without_previous_share_does_not_roll_back() {
        let key = PrivateKey::generate();
        let storage = MockStorage {
            fail_auth_store: AtomicBool::new(true),
            ..Default::default()
        };

        let err = atomic_share_update(&key, &storage, UpdateOptions::default())
            .await
            .unwrap_err();

        match err {
            ClientError::AtomicUpdate {
                phase,
                rolled_back,
                ..
            } => {
                assert_eq!(phase, UpdatePhase::StoreAuth);
                assert!(!rolled_back);
            }
            other => panic!("expected AtomicUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rollback_failure_is_reported_as_not_rolled_back() {
        let key = PrivateKey::generate();

        // First device write (the new share) succeeds, the rollback write
        // fails: the inconsistency must surface as rolled_back = false.
        let storage = MockStorage {
            fail_auth_store: AtomicBool::new(true),
            fail_device_rollback_after: Some(1),
            ..Default::default()
        };

        let err = atomic_share_update(
            &key,
            &storage,
            UpdateOptions {
                previous_device_share: Some("previous".to_string()),
                on_rollback: None,
            },
        )
        .await
        .unwrap_err();

        match err {
            ClientError::AtomicUpdate {
                phase,
                rolled_back,
                ..
            } => {
                assert_eq!(phase, UpdatePhase::StoreAuth);
                assert!(!rolled_back);
            }
            other => panic!("expected AtomicUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_stored_shares_healthy() {
        let key = PrivateKey::generate();
        let split = split_and_verify(&key).unwrap();

        let storage = MockStorage {
            device: Mutex::new(Some(split.shares.device.to_hex())),
            auth: Mutex::new(Some(split.shares.auth.to_hex())),
            ..Default::default()
        };

        let expected_did = did_key_from_private_key(&key);
        let health = verify_stored_shares(&storage, &expected_did, &did_deriver()).await;

        assert!(health.healthy);
        assert!(health.has_device_share);
        assert!(health.has_auth_share);
        assert!(health.did_matches);
        assert!(health.error.is_none());
    }

    #[tokio::test]
    async fn test_verify_stored_shares_missing_device() {
        let storage = MockStorage {
            auth: Mutex::new(Some("some-auth-share".to_string())),
            ..Default::default()
        };

        let health = verify_stored_shares(&storage, "did:key:expected", &did_deriver()).await;

        assert!(!health.healthy);
        assert!(!health.has_device_share);
        assert_eq!(health.error.as_deref(), Some("no device share found"));
    }

    #[tokio::test]
    async fn test_verify_stored_shares_missing_auth() {
        let storage = MockStorage {
            device: Mutex::new(Some("some-device-share".to_string())),
            ..Default::default()
        };

        let health = verify_stored_shares(&storage, "did:key:expected", &did_deriver()).await;

        assert!(!health.healthy);
        assert!(health.has_device_share);
        assert!(!health.has_auth_share);
        assert_eq!(health.error.as_deref(), Some("no auth share found"));
    }

    #[tokio::test]
    async fn test_verify_stored_shares_did_mismatch() {
        let key = PrivateKey::generate();
        let split = split_and_verify(&key).unwrap();

        let storage = MockStorage {
            device: Mutex::new(Some(split.shares.device.to_hex())),
            auth: Mutex::new(Some(split.shares.auth.to_hex())),
            ..Default::default()
        };

        let health = verify_stored_shares(&storage, "did:key:different", &did_deriver()).await;

        assert!(!health.healthy);
        assert!(health.has_device_share);
        assert!(health.has_auth_share);
        assert!(!health.did_matches);
        assert!(health.error.as_deref().unwrap().contains("DID mismatch"));
    }

    #[tokio::test]
    async fn test_verify_stored_shares_tolerates_garbage() {
        let storage = MockStorage {
            device: Mutex::new(Some("not-a-share".to_string())),
            auth: Mutex::new(Some("also-garbage".to_string())),
            ..Default::default()
        };

        let health = verify_stored_shares(&storage, "did:key:expected", &did_deriver()).await;

        assert!(!health.healthy);
        assert!(health.error.is_some());
    }

    #[tokio::test]
    async fn test_atomic_recovery_rotates_shares() {
        let key = PrivateKey::generate();
        let original = split_and_verify(&key).unwrap().shares;
        let storage = MockStorage::default();

        let outcome = atomic_recovery(&original.recovery, &original.auth, &storage)
            .await
            .unwrap();

        assert_eq!(outcome.private_key, key);

        // New shares are a fresh split that still reconstructs the key.
        assert_ne!(outcome.new_shares.device, original.device);
        let reconstructed = reconstruct_from_shares(&[
            outcome.new_shares.device.clone(),
            outcome.new_shares.auth.clone(),
        ])
        .unwrap();
        assert_eq!(reconstructed, key);

        // Both backends were updated.
        assert_eq!(
            storage.get_device().await.unwrap().as_deref(),
            Some(outcome.new_shares.device.to_hex().as_str())
        );
        assert_eq!(
            storage.get_auth().await.unwrap().as_deref(),
            Some(outcome.new_shares.auth.to_hex().as_str())
        );
    }
}
