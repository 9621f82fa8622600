//! Unified authentication / key-derivation state machine.
//!
//! One coordinator instance owns one explicit state value and is the single
//! source of truth for "what state is this user in and what transition is
//! legal next". Every transition notifies the observer callback, which is
//! the only channel UI layers learn of state changes through.
//!
//! Transitions are sequential per instance: methods take `&mut self`, so a
//! second call while one is in flight is a compile-time impossibility from
//! one owner, and a caller error across owners.

use std::sync::Arc;

use async_trait::async_trait;
use keyshare_crypto::shamir::{reconstruct_from_shares, Share};
use keyshare_crypto::PrivateKey;
use tracing::warn;

use crate::atomic::{split_and_verify, verify_stored_shares, ShareStorage};
use crate::error::{ClientError, Result};
use crate::ports::{
    AuthProvider, AuthUser, DidDeriver, KeyProvider, KeyServerPort, LegacyKeyProvider,
    LocalShareStore, RecoveryMethodInfo,
};

/// The closed set of coordinator states. Exactly one is active per session.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// No user session.
    Idle,
    /// Querying the auth provider.
    Authenticating,
    /// A user is signed in; key status unknown.
    Authenticated {
        /// The signed-in user.
        user: AuthUser,
    },
    /// Querying the server's key record.
    CheckingKeyStatus,
    /// New user: no server-side key record exists.
    NeedsSetup {
        /// The signed-in user.
        user: AuthUser,
    },
    /// The account's key lives on the legacy single-factor provider.
    NeedsMigration {
        /// The signed-in user.
        user: AuthUser,
        /// The legacy key, when the provider-specific fetch succeeded.
        legacy_key: Option<String>,
    },
    /// The server has a key record but this device holds no usable share.
    NeedsRecovery {
        /// The signed-in user.
        user: AuthUser,
        /// Recovery methods the user can choose from.
        recovery_methods: Vec<RecoveryMethodInfo>,
    },
    /// Reconstructing or distributing shares.
    DerivingKey,
    /// Key reconstructed and verified; session usable.
    Ready {
        /// The signed-in user.
        user: AuthUser,
        /// The account DID.
        did: String,
        /// The reconstructed private key, held in memory only.
        private_key: PrivateKey,
    },
    /// An async step failed.
    Error {
        /// Human-readable failure description.
        error: String,
        /// Whether [`AuthCoordinator::retry`] is expected to help.
        can_retry: bool,
        /// The state active before the failure.
        previous: Option<Box<AuthState>>,
    },
}

impl AuthState {
    /// Stable state name, used in diagnostics and illegal-transition errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Authenticating => "authenticating",
            Self::Authenticated { .. } => "authenticated",
            Self::CheckingKeyStatus => "checking_key_status",
            Self::NeedsSetup { .. } => "needs_setup",
            Self::NeedsMigration { .. } => "needs_migration",
            Self::NeedsRecovery { .. } => "needs_recovery",
            Self::DerivingKey => "deriving_key",
            Self::Ready { .. } => "ready",
            Self::Error { .. } => "error",
        }
    }
}

/// Observer invoked after every state transition.
pub type StateObserver = Box<dyn Fn(&AuthState) + Send + Sync>;

/// Coordinator wiring.
pub struct AuthCoordinatorConfig {
    /// Identity source.
    pub auth: Arc<dyn AuthProvider>,
    /// Key server.
    pub server: Arc<dyn KeyServerPort>,
    /// Device-local share storage for the active account.
    pub local_store: Arc<dyn LocalShareStore>,
    /// DID derivation; when absent, DID verification is skipped.
    pub did_from_private_key: Option<DidDeriver>,
    /// Legacy-provider key fetch for migration, best-effort.
    pub legacy_keys: Option<Arc<dyn LegacyKeyProvider>>,
    /// State-change observer.
    pub on_state_change: Option<StateObserver>,
}

/// The auth/key-derivation coordinator.
pub struct AuthCoordinator {
    state: AuthState,
    auth: Arc<dyn AuthProvider>,
    server: Arc<dyn KeyServerPort>,
    local: Arc<dyn LocalShareStore>,
    did_from_private_key: Option<DidDeriver>,
    legacy_keys: Option<Arc<dyn LegacyKeyProvider>>,
    on_state_change: Option<StateObserver>,
}

impl AuthCoordinator {
    /// Create a coordinator in the `Idle` state.
    pub fn new(config: AuthCoordinatorConfig) -> Self {
        Self {
            state: AuthState::Idle,
            auth: config.auth,
            server: config.server,
            local: config.local_store,
            did_from_private_key: config.did_from_private_key,
            legacy_keys: config.legacy_keys,
            on_state_change: config.on_state_change,
        }
    }

    /// The current state.
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    fn set_state(&mut self, next: AuthState) {
        self.state = next;
        if let Some(observer) = &self.on_state_change {
            observer(&self.state);
        }
    }

    /// Determine the correct state for the current user.
    ///
    /// No user ⇒ `Idle`. Otherwise the server key record decides between
    /// `NeedsSetup`, `NeedsMigration`, `NeedsRecovery`, and `Ready`. A local
    /// share whose reconstruction does not match the account DID is cleared
    /// and treated exactly like a missing share: a non-matching local
    /// share is never trusted.
    pub async fn initialize(&mut self) -> AuthState {
        match self.initialize_inner().await {
            Ok(state) => state,
            Err(e) => {
                let previous = self.state.clone();
                self.set_state(AuthState::Error {
                    error: e.to_string(),
                    can_retry: true,
                    previous: Some(Box::new(previous)),
                });
                self.state.clone()
            }
        }
    }

    async fn initialize_inner(&mut self) -> Result<AuthState> {
        self.set_state(AuthState::Authenticating);

        let Some(user) = self.auth.current_user().await? else {
            self.set_state(AuthState::Idle);
            return Ok(self.state.clone());
        };

        self.set_state(AuthState::Authenticated { user: user.clone() });
        self.set_state(AuthState::CheckingKeyStatus);

        let has_local_share = self.local.has_device_share().await?;
        let status = self.server.fetch_key_status(None).await?;

        // No server record: new user.
        if !status.exists {
            self.set_state(AuthState::NeedsSetup { user });
            return Ok(self.state.clone());
        }

        // Legacy provider: offer migration, with the old key prefetched when
        // the provider still surrenders it.
        if status.key_provider == Some(KeyProvider::Legacy) {
            let legacy_key = match &self.legacy_keys {
                Some(provider) => match provider.fetch_legacy_key().await {
                    Ok(key) => key,
                    Err(e) => {
                        warn!(error = %e, "failed to fetch legacy key for migration");
                        None
                    }
                },
                None => None,
            };

            self.set_state(AuthState::NeedsMigration { user, legacy_key });
            return Ok(self.state.clone());
        }

        // Server record exists but this device has nothing usable.
        if !has_local_share {
            self.set_state(AuthState::NeedsRecovery {
                user,
                recovery_methods: status.recovery_methods,
            });
            return Ok(self.state.clone());
        }

        self.set_state(AuthState::DerivingKey);

        let device_share = self.local.get_device_share().await?;
        let (Some(device_share), Some(auth_share)) = (device_share, status.auth_share.clone())
        else {
            self.set_state(AuthState::NeedsRecovery {
                user,
                recovery_methods: status.recovery_methods,
            });
            return Ok(self.state.clone());
        };

        let private_key = reconstruct_from_shares(&[
            Share::from_hex(&device_share)?,
            Share::from_hex(&auth_share)?,
        ])?;

        if let (Some(derive), Some(primary_did)) =
            (&self.did_from_private_key, status.primary_did.as_deref())
        {
            let derived = derive(&private_key);

            if derived != primary_did {
                // Stale device share, e.g. from a rotation this device
                // missed. Clear it and force recovery.
                warn!("DID mismatch: stale device share detected, clearing local shares");
                self.local.clear_shares().await?;

                self.set_state(AuthState::NeedsRecovery {
                    user,
                    recovery_methods: status.recovery_methods,
                });
                return Ok(self.state.clone());
            }
        }

        self.set_state(AuthState::Ready {
            user,
            did: status.primary_did.unwrap_or_default(),
            private_key,
        });

        Ok(self.state.clone())
    }

    /// Set up a new key for a new user. Legal only from `NeedsSetup`.
    pub async fn setup_new_key(&mut self, private_key: &PrivateKey, did: &str) -> Result<AuthState> {
        let AuthState::NeedsSetup { user } = &self.state else {
            return Err(ClientError::InvalidState {
                action: "setup key",
                state: self.state.name().to_string(),
            });
        };
        let user = user.clone();

        match self.distribute_shares(private_key, did, false).await {
            Ok(()) => {
                self.set_state(AuthState::Ready {
                    user,
                    did: did.to_string(),
                    private_key: private_key.clone(),
                });
            }
            Err(e) => {
                self.set_state(AuthState::Error {
                    error: e.to_string(),
                    can_retry: true,
                    previous: Some(Box::new(AuthState::NeedsSetup { user })),
                });
            }
        }

        Ok(self.state.clone())
    }

    /// Migrate a legacy-provider key. Legal only from `NeedsMigration`.
    pub async fn migrate(&mut self, private_key: &PrivateKey, did: &str) -> Result<AuthState> {
        let AuthState::NeedsMigration { user, legacy_key } = &self.state else {
            return Err(ClientError::InvalidState {
                action: "migrate",
                state: self.state.name().to_string(),
            });
        };
        let (user, legacy_key) = (user.clone(), legacy_key.clone());

        match self.distribute_shares(private_key, did, true).await {
            Ok(()) => {
                self.set_state(AuthState::Ready {
                    user,
                    did: did.to_string(),
                    private_key: private_key.clone(),
                });
            }
            Err(e) => {
                self.set_state(AuthState::Error {
                    error: e.to_string(),
                    can_retry: true,
                    previous: Some(Box::new(AuthState::NeedsMigration { user, legacy_key })),
                });
            }
        }

        Ok(self.state.clone())
    }

    async fn distribute_shares(
        &mut self,
        private_key: &PrivateKey,
        did: &str,
        mark_migrated: bool,
    ) -> Result<()> {
        self.set_state(AuthState::DerivingKey);

        let split = split_and_verify(private_key)?;

        // Local first, then remote, so a remote failure leaves the server
        // record untouched.
        self.local
            .store_device_share(&split.shares.device.to_hex())
            .await?;
        self.server
            .store_auth_share(&split.shares.auth.to_hex(), did)
            .await?;

        if mark_migrated {
            self.server.mark_migrated().await?;
        }

        Ok(())
    }

    /// Recover with a decrypted recovery share. Legal only from
    /// `NeedsRecovery`.
    ///
    /// The reconstructed key must derive either the caller-supplied DID or
    /// the server's recorded one (the server is authoritative) BEFORE the
    /// share rotation writes anything anywhere.
    pub async fn recover(&mut self, recovery_share_hex: &str, did: &str) -> Result<AuthState> {
        let AuthState::NeedsRecovery {
            user,
            recovery_methods,
        } = &self.state
        else {
            return Err(ClientError::InvalidState {
                action: "recover",
                state: self.state.name().to_string(),
            });
        };
        let (user, recovery_methods) = (user.clone(), recovery_methods.clone());

        match self.recover_inner(recovery_share_hex, did).await {
            Ok((final_did, private_key)) => {
                self.set_state(AuthState::Ready {
                    user,
                    did: final_did,
                    private_key,
                });
            }
            Err(e) => {
                self.set_state(AuthState::Error {
                    error: e.to_string(),
                    can_retry: true,
                    previous: Some(Box::new(AuthState::NeedsRecovery {
                        user,
                        recovery_methods,
                    })),
                });
            }
        }

        Ok(self.state.clone())
    }

    async fn recover_inner(
        &mut self,
        recovery_share_hex: &str,
        did: &str,
    ) -> Result<(String, PrivateKey)> {
        self.set_state(AuthState::DerivingKey);

        let status = self.server.fetch_key_status(None).await?;
        let auth_share = status.auth_share.clone().ok_or(ClientError::MissingAuthShare)?;

        let private_key = reconstruct_from_shares(&[
            Share::from_hex(recovery_share_hex)?,
            Share::from_hex(&auth_share)?,
        ])?;

        if let Some(derive) = &self.did_from_private_key {
            let derived = derive(&private_key);

            if derived != did && status.primary_did.as_deref() != Some(derived.as_str()) {
                return Err(ClientError::RecoveryMismatch);
            }
        }

        // Rotate: fresh split, both stores updated.
        let split = split_and_verify(&private_key)?;
        let final_did = status.primary_did.clone().unwrap_or_else(|| did.to_string());

        self.local
            .store_device_share(&split.shares.device.to_hex())
            .await?;
        self.server
            .store_auth_share(&split.shares.auth.to_hex(), &final_did)
            .await?;

        Ok((final_did, private_key))
    }

    /// Health-check the stored shares. Legal only from `Ready`; any other
    /// state (and any internal failure) reports `false`, never an error.
    pub async fn verify_key_integrity(&self) -> bool {
        if !matches!(self.state, AuthState::Ready { .. }) {
            return false;
        }

        let Some(derive) = &self.did_from_private_key else {
            // Nothing to verify against.
            return true;
        };

        match self.server.fetch_key_status(None).await {
            Ok(status) => {
                let Some(primary_did) = status.primary_did.clone() else {
                    return true;
                };

                let view = HealthView {
                    local: self.local.as_ref(),
                    auth_share: status.auth_share,
                };

                verify_stored_shares(&view, &primary_did, derive).await.healthy
            }
            Err(e) => {
                warn!(error = %e, "key integrity verification failed");
                false
            }
        }
    }

    /// Sign out, clear local shares, return to `Idle` unconditionally.
    pub async fn logout(&mut self) {
        if let Err(e) = self.auth.sign_out().await {
            warn!(error = %e, "sign-out failed during logout");
        }
        if let Err(e) = self.local.clear_shares().await {
            warn!(error = %e, "failed to clear local shares during logout");
        }

        self.set_state(AuthState::Idle);
    }

    /// Retry after a failure: restore the pre-failure state and re-run
    /// [`AuthCoordinator::initialize`]. Legal only from `Error`; a no-op
    /// otherwise.
    pub async fn retry(&mut self) -> AuthState {
        let AuthState::Error { previous, .. } = &self.state else {
            return self.state.clone();
        };

        let restored = previous
            .clone()
            .map(|boxed| *boxed)
            .unwrap_or(AuthState::Idle);
        self.set_state(restored);

        self.initialize().await
    }
}

/// Read-only [`ShareStorage`] view stitching the local store to a fetched
/// auth share, so the atomic health check can run over live state.
struct HealthView<'a> {
    local: &'a dyn LocalShareStore,
    auth_share: Option<String>,
}

#[async_trait]
impl ShareStorage for HealthView<'_> {
    async fn store_device(&self, _share_hex: &str) -> Result<()> {
        Err(ClientError::Storage("health view is read-only".to_string()))
    }

    async fn store_auth(&self, _share_hex: &str) -> Result<()> {
        Err(ClientError::Storage("health view is read-only".to_string()))
    }

    async fn get_device(&self) -> Result<Option<String>> {
        self.local.get_device_share().await
    }

    async fn get_auth(&self) -> Result<Option<String>> {
        Ok(self.auth_share.clone())
    }
}
