//! Shared in-memory test doubles implementing the capability ports.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use keyshare_crypto::{did_key_from_private_key, PrivateKey};
use tokio::sync::Mutex;

use crate::atomic::split_and_verify;
use crate::error::{ClientError, Result};
use crate::ports::{
    AuthProvider, AuthUser, DidDeriver, EmailShareRequest, KeyProvider, KeyServerPort,
    LocalShareStore, RecoveryMethodInfo, RecoveryMethodRecord, RecoveryMethodType,
    RecoveryShareRecord, ServerKeyStatus,
};

pub(crate) fn mock_did_deriver() -> DidDeriver {
    Arc::new(|key: &PrivateKey| did_key_from_private_key(key))
}

pub(crate) struct MockAuthProvider {
    user: std::sync::Mutex<Option<AuthUser>>,
}

impl MockAuthProvider {
    pub fn signed_in(id: &str) -> Self {
        Self {
            user: std::sync::Mutex::new(Some(AuthUser {
                id: id.to_string(),
                email: Some(format!("{id}@example.com")),
                phone: None,
            })),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            user: std::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn current_user(&self) -> Result<Option<AuthUser>> {
        Ok(self.user.lock().unwrap().clone())
    }

    async fn id_token(&self) -> Result<String> {
        Ok("test-token".to_string())
    }

    fn provider_type(&self) -> &str {
        "firebase"
    }

    async fn sign_out(&self) -> Result<()> {
        *self.user.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct ServerState {
    pub key_provider: Option<KeyProvider>,
    pub primary_did: Option<String>,
    /// Version history of stored auth shares.
    pub auth_shares: HashMap<u32, String>,
    pub current_version: u32,
    pub recovery_methods: Vec<RecoveryMethodInfo>,
    pub recovery_records: HashMap<RecoveryMethodType, RecoveryShareRecord>,
    pub masked_recovery_email: Option<String>,
    pub auth_share_puts: u32,
    pub migrated: bool,
    pub deleted: bool,
    pub email_sends: Vec<EmailShareRequest>,
    pub fail_next_fetch: bool,
    pub fail_store_auth: bool,
}

#[derive(Default)]
pub(crate) struct MockKeyServer {
    pub state: Mutex<ServerState>,
    /// Recovery share seeded by `with_account`, for tests that need a
    /// matching share.
    seeded_recovery: std::sync::Mutex<Option<String>>,
}

impl MockKeyServer {
    /// A server holding a key record for `key`: auth share at version 1 and
    /// the account DID.
    pub fn with_account(key: &PrivateKey) -> Self {
        let split = split_and_verify(key).expect("split");
        let server = Self::default();

        {
            let mut state = server.state.try_lock().expect("fresh mutex");
            state.key_provider = Some(KeyProvider::Sss);
            state.primary_did = Some(did_key_from_private_key(key));
            state.current_version = 1;
            state
                .auth_shares
                .insert(1, split.shares.auth.to_hex());
        }

        *server.seeded_recovery.lock().unwrap() = Some(split.shares.recovery.to_hex());
        server
    }

    /// A server whose record belongs to the legacy provider.
    pub fn legacy_account(did: &str) -> Self {
        let server = Self::default();
        {
            let mut state = server.state.try_lock().expect("fresh mutex");
            state.key_provider = Some(KeyProvider::Legacy);
            state.primary_did = Some(did.to_string());
        }
        server
    }

    pub async fn seed_auth_share(&self, auth_share: &str, primary_did: &str) {
        let mut state = self.state.lock().await;
        state.key_provider = Some(KeyProvider::Sss);
        state.primary_did = Some(primary_did.to_string());
        state.current_version = state.current_version.max(1);
        let version = state.current_version;
        state.auth_shares.insert(version, auth_share.to_string());
    }

    pub async fn seeded_recovery_share(&self) -> String {
        self.seeded_recovery
            .lock()
            .unwrap()
            .clone()
            .expect("server was not seeded with an account")
    }

    pub async fn fail_next_fetch(&self) {
        self.state.lock().await.fail_next_fetch = true;
    }
}

#[async_trait]
impl KeyServerPort for MockKeyServer {
    async fn fetch_key_status(&self, share_version: Option<u32>) -> Result<ServerKeyStatus> {
        let mut state = self.state.lock().await;

        if state.fail_next_fetch {
            state.fail_next_fetch = false;
            return Err(ClientError::Server {
                status: 500,
                message: "injected fetch failure".to_string(),
            });
        }

        if state.key_provider.is_none() && state.primary_did.is_none() && state.auth_shares.is_empty()
        {
            return Ok(ServerKeyStatus::default());
        }

        let version = share_version.unwrap_or(state.current_version);
        let auth_share = state.auth_shares.get(&version).cloned();

        Ok(ServerKeyStatus {
            exists: true,
            key_provider: state.key_provider,
            primary_did: state.primary_did.clone(),
            recovery_methods: state.recovery_methods.clone(),
            auth_share,
            share_version: Some(state.current_version),
            masked_recovery_email: state.masked_recovery_email.clone(),
        })
    }

    async fn store_auth_share(&self, auth_share: &str, primary_did: &str) -> Result<u32> {
        let mut state = self.state.lock().await;

        if state.fail_store_auth {
            return Err(ClientError::Server {
                status: 500,
                message: "injected store failure".to_string(),
            });
        }

        state.current_version += 1;
        let version = state.current_version;
        state.auth_shares.insert(version, auth_share.to_string());
        state.primary_did = Some(primary_did.to_string());
        state.key_provider = Some(KeyProvider::Sss);
        state.auth_share_puts += 1;

        Ok(version)
    }

    async fn add_recovery_method(&self, record: &RecoveryMethodRecord) -> Result<()> {
        let mut state = self.state.lock().await;

        state.recovery_methods.push(RecoveryMethodInfo {
            method_type: record.method_type,
            created_at: Some("2026-01-01T00:00:00Z".to_string()),
            credential_id: record.credential_id.clone(),
        });
        state.recovery_records.insert(
            record.method_type,
            RecoveryShareRecord {
                encrypted_share: record.encrypted_share.clone(),
                share_version: record.share_version,
            },
        );

        Ok(())
    }

    async fn get_recovery_share(
        &self,
        method: RecoveryMethodType,
        _credential_id: Option<&str>,
    ) -> Result<Option<RecoveryShareRecord>> {
        Ok(self.state.lock().await.recovery_records.get(&method).cloned())
    }

    async fn mark_migrated(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.migrated = true;
        state.key_provider = Some(KeyProvider::Sss);
        Ok(())
    }

    async fn delete_key(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = ServerState {
            deleted: true,
            ..ServerState::default()
        };
        Ok(())
    }

    async fn send_email_share(&self, request: &EmailShareRequest) -> Result<()> {
        self.state.lock().await.email_sends.push(request.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockLocalStore {
    share: Mutex<Option<String>>,
}

#[async_trait]
impl LocalShareStore for MockLocalStore {
    async fn store_device_share(&self, share_hex: &str) -> Result<()> {
        *self.share.lock().await = Some(share_hex.to_string());
        Ok(())
    }

    async fn get_device_share(&self) -> Result<Option<String>> {
        Ok(self.share.lock().await.clone())
    }

    async fn has_device_share(&self) -> Result<bool> {
        Ok(self.share.lock().await.is_some())
    }

    async fn clear_shares(&self) -> Result<()> {
        *self.share.lock().await = None;
        Ok(())
    }
}
