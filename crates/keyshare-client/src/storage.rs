//! Device-local encrypted storage for shares.
//!
//! Shares are kept in a raw key-value store behind the [`KeyValueStore`]
//! port, one record per (optionally user-scoped) identifier. Every record
//! is independently encrypted with AES-256-GCM under a lazily created
//! master key, with the record identifier as associated data, so a share
//! stored under one identifier cannot be decrypted under another. A
//! companion plaintext record per identifier (`<id>:version`) tracks the
//! share version for cross-device recovery.
//!
//! Records that fail to parse or decrypt are treated as absent (with a
//! warning): a stale or corrupt local share must degrade to "needs
//! recovery", never to a hard failure.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use keyshare_crypto::aead::{decrypt_with_key, encrypt_with_key, AeadCiphertext};
use keyshare_crypto::generate_random_bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{ClientError, Result};
use crate::ports::LocalShareStore;

/// Default (unscoped) device-share identifier.
pub const DEFAULT_DEVICE_SHARE_ID: &str = "device-share";

const MASTER_KEY_RECORD: &str = "master-key";
const VERSION_SUFFIX: &str = ":version";
const RECORD_VERSION: u32 = 1;

/// Raw asynchronous key-value storage, supplied by the host platform.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store (overwrite) a value.
    async fn put(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// All stored keys.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Remove everything.
    async fn clear(&self) -> Result<()>;
}

/// In-memory store, for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

/// File-backed store: one JSON document, atomic tmp+rename writes,
/// owner-only permissions.
pub struct FsKeyValueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FsKeyValueStore {
    /// Open (or create on first write) a store at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<HashMap<String, Value>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| ClientError::Storage(format!("failed to read {}: {e}", self.path.display())))?;

        serde_json::from_str(&content)
            .map_err(|e| ClientError::Storage(format!("failed to parse {}: {e}", self.path.display())))
    }

    fn save(&self, entries: &HashMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ClientError::Storage(format!("cannot create data directory: {e}")))?;
        }

        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| ClientError::Storage(format!("failed to serialize: {e}")))?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &content)
            .map_err(|e| ClientError::Storage(format!("failed to write: {e}")))?;

        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| ClientError::Storage(format!("failed to commit write: {e}")))?;

        set_restrictive_permissions(&self.path)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FsKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().await;
        Ok(self.load()?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value);
        self.save(&entries)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load()?;
        entries.remove(key);
        self.save(&entries)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load()?.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .map_err(|e| ClientError::Storage(format!("failed to delete: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &PathBuf) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)
        .map_err(|e| ClientError::Storage(format!("failed to set file permissions: {e}")))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_restrictive_permissions(_path: &PathBuf) -> Result<()> {
    Ok(())
}

/// One encrypted record as persisted in the key-value store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptedRecord {
    version: u32,
    iv: String,
    cipher: String,
    key_version: u32,
}

/// A stored share as reported by [`EncryptedShareStore::list_shares`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareEntry {
    /// Storage identifier.
    pub id: String,
    /// Truncated share preview (first and last 8 hex chars).
    pub preview: String,
    /// Companion share version, if stored.
    pub share_version: Option<u32>,
}

/// Encrypted share storage layered over a [`KeyValueStore`].
pub struct EncryptedShareStore {
    kv: Arc<dyn KeyValueStore>,
    // Guards lazy master-key creation: concurrent first users serialize
    // here, so exactly one key is ever generated.
    master_key: Mutex<Option<[u8; 32]>>,
}

impl EncryptedShareStore {
    /// Create a store over the given backend.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            master_key: Mutex::new(None),
        }
    }

    /// The storage identifier for a device share, optionally scoped to a
    /// user so multiple accounts coexist on one device.
    pub fn device_share_id(user_scope: Option<&str>) -> String {
        match user_scope {
            Some(user) => format!("{DEFAULT_DEVICE_SHARE_ID}:{user}"),
            None => DEFAULT_DEVICE_SHARE_ID.to_string(),
        }
    }

    async fn master_key(&self) -> Result<[u8; 32]> {
        let mut guard = self.master_key.lock().await;

        if let Some(key) = *guard {
            return Ok(key);
        }

        let key = match self.kv.get(MASTER_KEY_RECORD).await? {
            Some(value) => {
                let hex_key = value.as_str().ok_or_else(|| {
                    ClientError::Storage("master key record is not a string".to_string())
                })?;
                let bytes = hex::decode(hex_key)
                    .map_err(|e| ClientError::Storage(format!("invalid master key: {e}")))?;
                bytes.as_slice().try_into().map_err(|_| {
                    ClientError::Storage(format!(
                        "invalid master key length: {}",
                        bytes.len()
                    ))
                })?
            }
            None => {
                let key: [u8; 32] = generate_random_bytes();
                self.kv
                    .put(MASTER_KEY_RECORD, Value::String(hex::encode(key)))
                    .await?;
                key
            }
        };

        *guard = Some(key);
        Ok(key)
    }

    /// Store (overwrite) a share under `id`.
    pub async fn store_share(&self, id: &str, share_hex: &str) -> Result<()> {
        let key = self.master_key().await?;
        let record = encrypt_with_key(&key, share_hex.as_bytes(), id.as_bytes())?;

        let stored = EncryptedRecord {
            version: RECORD_VERSION,
            iv: record.iv,
            cipher: record.ciphertext,
            key_version: 1,
        };

        let value = serde_json::to_value(&stored)
            .map_err(|e| ClientError::Storage(format!("failed to serialize record: {e}")))?;

        self.kv.put(id, value).await
    }

    /// Fetch the share stored under `id`.
    ///
    /// Malformed or undecryptable records are logged and treated as absent.
    pub async fn get_share(&self, id: &str) -> Result<Option<String>> {
        let Some(raw) = self.kv.get(id).await? else {
            return Ok(None);
        };

        let record: EncryptedRecord = match serde_json::from_value(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(id, error = %e, "stored entry is not a valid encrypted record, skipping");
                return Ok(None);
            }
        };

        let key = self.master_key().await?;
        let ciphertext = AeadCiphertext {
            iv: record.iv,
            ciphertext: record.cipher,
        };

        match decrypt_with_key(&key, &ciphertext, id.as_bytes()) {
            Ok(plaintext) => match String::from_utf8(plaintext) {
                Ok(share) => Ok(Some(share)),
                Err(_) => {
                    warn!(id, "stored share is not valid utf-8, skipping");
                    Ok(None)
                }
            },
            Err(e) => {
                warn!(id, error = %e, "failed to decrypt stored share, skipping");
                Ok(None)
            }
        }
    }

    /// Whether a usable share is stored under `id`.
    pub async fn has_share(&self, id: &str) -> Result<bool> {
        Ok(self.get_share(id).await?.is_some())
    }

    /// Remove the share under `id` and its companion version record.
    pub async fn delete_share(&self, id: &str) -> Result<()> {
        self.kv.delete(id).await?;
        self.kv.delete(&format!("{id}{VERSION_SUFFIX}")).await
    }

    /// Store the share version alongside the share under `id`.
    pub async fn store_share_version(&self, id: &str, version: u32) -> Result<()> {
        self.kv
            .put(&format!("{id}{VERSION_SUFFIX}"), Value::from(version))
            .await
    }

    /// Fetch the share version for `id`. `None` for pre-versioning records.
    pub async fn get_share_version(&self, id: &str) -> Result<Option<u32>> {
        let value = self.kv.get(&format!("{id}{VERSION_SUFFIX}")).await?;
        Ok(value.and_then(|v| v.as_u64()).map(|v| v as u32))
    }

    /// List all stored shares with previews and versions.
    ///
    /// Entries that exist but cannot be decrypted are orphans from stale
    /// code paths or corrupt data; they are removed (with their version
    /// records) so they stop resurfacing.
    pub async fn list_shares(&self) -> Result<Vec<ShareEntry>> {
        let mut entries = Vec::new();

        for id in self.kv.keys().await? {
            if id == MASTER_KEY_RECORD || id.ends_with(VERSION_SUFFIX) {
                continue;
            }

            match self.get_share(&id).await? {
                Some(share) => {
                    let preview = if share.len() > 16 {
                        format!("{}...{}", &share[..8], &share[share.len() - 8..])
                    } else {
                        share.clone()
                    };

                    let share_version = self.get_share_version(&id).await?;
                    entries.push(ShareEntry {
                        id,
                        preview,
                        share_version,
                    });
                }
                None => {
                    warn!(id = %id, "removing orphaned share entry that failed to decrypt");
                    self.delete_share(&id).await?;
                }
            }
        }

        Ok(entries)
    }

    /// Clear a single share (`Some(id)`) or wipe the whole store (`None`),
    /// master key included.
    pub async fn clear(&self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) => self.delete_share(id).await,
            None => {
                self.kv.clear().await?;
                // Next operation generates a fresh master key.
                *self.master_key.lock().await = None;
                Ok(())
            }
        }
    }
}

/// [`LocalShareStore`] view over an [`EncryptedShareStore`], pinned to one
/// share identifier. This is what the coordinator consumes.
pub struct DeviceShareStore {
    store: Arc<EncryptedShareStore>,
    id: String,
}

impl DeviceShareStore {
    /// Pin `store` to the given identifier.
    pub fn new(store: Arc<EncryptedShareStore>, id: impl Into<String>) -> Self {
        Self {
            store,
            id: id.into(),
        }
    }
}

#[async_trait]
impl LocalShareStore for DeviceShareStore {
    async fn store_device_share(&self, share_hex: &str) -> Result<()> {
        self.store.store_share(&self.id, share_hex).await
    }

    async fn get_device_share(&self) -> Result<Option<String>> {
        self.store.get_share(&self.id).await
    }

    async fn has_device_share(&self) -> Result<bool> {
        self.store.has_share(&self.id).await
    }

    async fn clear_shares(&self) -> Result<()> {
        self.store.clear(Some(&self.id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> EncryptedShareStore {
        EncryptedShareStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    #[tokio::test]
    async fn test_store_get_roundtrip() {
        let store = memory_store();
        store.store_share("device-share", &"ab".repeat(33)).await.unwrap();

        let share = store.get_share("device-share").await.unwrap();
        assert_eq!(share.as_deref(), Some("ab".repeat(33).as_str()));
        assert!(store.has_share("device-share").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_share_is_none() {
        let store = memory_store();
        assert_eq!(store.get_share("device-share").await.unwrap(), None);
        assert!(!store.has_share("device-share").await.unwrap());
    }

    #[tokio::test]
    async fn test_record_is_bound_to_its_identifier() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = EncryptedShareStore::new(kv.clone());

        store.store_share("device-share:alice", "aabbcc").await.unwrap();

        // Copy the raw record under a different identifier: the AAD binding
        // must make it undecryptable there.
        let raw = kv.get("device-share:alice").await.unwrap().unwrap();
        kv.put("device-share:bob", raw).await.unwrap();

        assert_eq!(store.get_share("device-share:bob").await.unwrap(), None);
        assert_eq!(
            store.get_share("device-share:alice").await.unwrap().as_deref(),
            Some("aabbcc")
        );
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_distinct_ids() {
        let store = Arc::new(memory_store());

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.store_share("device-share:a", "aa11").await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.store_share("device-share:b", "bb22").await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(
            store.get_share("device-share:a").await.unwrap().as_deref(),
            Some("aa11")
        );
        assert_eq!(
            store.get_share("device-share:b").await.unwrap().as_deref(),
            Some("bb22")
        );
    }

    #[tokio::test]
    async fn test_master_key_creation_is_idempotent_under_concurrency() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = Arc::new(EncryptedShareStore::new(kv.clone()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.store_share(&format!("share:{i}"), "cafe").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Every record decrypts under the single master key.
        for i in 0..8 {
            assert_eq!(
                store.get_share(&format!("share:{i}")).await.unwrap().as_deref(),
                Some("cafe")
            );
        }
    }

    #[tokio::test]
    async fn test_version_records() {
        let store = memory_store();
        assert_eq!(store.get_share_version("device-share").await.unwrap(), None);

        store.store_share_version("device-share", 7).await.unwrap();
        assert_eq!(store.get_share_version("device-share").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_delete_removes_share_and_version() {
        let store = memory_store();
        store.store_share("device-share", "aabb").await.unwrap();
        store.store_share_version("device-share", 3).await.unwrap();

        store.delete_share("device-share").await.unwrap();

        assert_eq!(store.get_share("device-share").await.unwrap(), None);
        assert_eq!(store.get_share_version("device-share").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_shares_skips_metadata_and_removes_orphans() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = EncryptedShareStore::new(kv.clone());

        store
            .store_share("device-share:alice", &"cd".repeat(33))
            .await
            .unwrap();
        store.store_share_version("device-share:alice", 2).await.unwrap();

        // Inject a record that will never decrypt.
        kv.put("device-share:ghost", serde_json::json!({"version": 1, "iv": "AAAA", "cipher": "AAAA", "keyVersion": 1}))
            .await
            .unwrap();

        let entries = store.list_shares().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "device-share:alice");
        assert_eq!(entries[0].share_version, Some(2));
        assert!(entries[0].preview.contains("..."));

        // The orphan was garbage-collected.
        assert_eq!(kv.get("device-share:ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_full_wipe_regenerates_master_key() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = EncryptedShareStore::new(kv.clone());

        store.store_share("device-share", "aabb").await.unwrap();
        let first_key = kv.get(MASTER_KEY_RECORD).await.unwrap().unwrap();

        store.clear(None).await.unwrap();
        assert_eq!(store.get_share("device-share").await.unwrap(), None);

        store.store_share("device-share", "ccdd").await.unwrap();
        let second_key = kv.get(MASTER_KEY_RECORD).await.unwrap().unwrap();

        assert_ne!(first_key, second_key);
        assert_eq!(
            store.get_share("device-share").await.unwrap().as_deref(),
            Some("ccdd")
        );
    }

    #[tokio::test]
    async fn test_scoped_clear_only_touches_one_id() {
        let store = memory_store();
        store.store_share("device-share:a", "aa").await.unwrap();
        store.store_share("device-share:b", "bb").await.unwrap();

        store.clear(Some("device-share:a")).await.unwrap();

        assert_eq!(store.get_share("device-share:a").await.unwrap(), None);
        assert_eq!(
            store.get_share("device-share:b").await.unwrap().as_deref(),
            Some("bb")
        );
    }

    #[tokio::test]
    async fn test_fs_store_roundtrip_and_atomic_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shares.json");

        let store = EncryptedShareStore::new(Arc::new(FsKeyValueStore::new(path.clone())));
        store.store_share("device-share", &"ef".repeat(33)).await.unwrap();
        store.store_share_version("device-share", 5).await.unwrap();

        // A second store over the same file sees the same data.
        let reopened = EncryptedShareStore::new(Arc::new(FsKeyValueStore::new(path.clone())));
        assert_eq!(
            reopened.get_share("device-share").await.unwrap().as_deref(),
            Some("ef".repeat(33).as_str())
        );
        assert_eq!(
            reopened.get_share_version("device-share").await.unwrap(),
            Some(5)
        );

        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_device_share_store_view() {
        let store = Arc::new(memory_store());
        let view = DeviceShareStore::new(store.clone(), "device-share:carol");

        assert!(!view.has_device_share().await.unwrap());
        view.store_device_share("beef").await.unwrap();
        assert_eq!(view.get_device_share().await.unwrap().as_deref(), Some("beef"));

        view.clear_shares().await.unwrap();
        assert!(!view.has_device_share().await.unwrap());
    }
}
