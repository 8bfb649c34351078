//! Durable credential records, one per signed-in user

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{PlayerError, Result};

/// Access/refresh token pair for one user, keyed by the external account id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry timestamp. The access token is usable for remote
    /// calls only while `now < expires_at`.
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Persistence seam for credential records.
///
/// Mutation goes exclusively through the refresh manager; deletion is an
/// account-lifecycle concern that lives outside this crate.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<Credential>>;
    async fn save(&self, credential: Credential) -> Result<()>;
}

/// In-memory store for tests and short-lived sessions.
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_credential(credential: Credential) -> Self {
        let store = Self::new();
        let mut records = store.records.write().await;
        records.insert(credential.user_id.clone(), credential);
        drop(records);
        store
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, user_id: &str) -> Result<Option<Credential>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn save(&self, credential: Credential) -> Result<()> {
        self.records
            .write()
            .await
            .insert(credential.user_id.clone(), credential);
        Ok(())
    }
}

/// JSON-file-backed store, one record per user.
///
/// The whole map is rewritten on save; credential records are tiny and
/// refreshes are rare, so this stays simple rather than clever.
pub struct FileCredentialStore {
    path: PathBuf,
    records: RwLock<HashMap<String, Credential>>,
}

impl FileCredentialStore {
    /// Open the store, loading any existing records from disk. A missing
    /// file is an empty store, not an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(PlayerError::Store(e.to_string())),
        };
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    async fn persist(&self, records: &HashMap<String, Credential>) -> Result<()> {
        let contents = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| PlayerError::Store(e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, user_id: &str) -> Result<Option<Credential>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn save(&self, credential: Credential) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(credential.user_id.clone(), credential);
        self.persist(&records).await
    }
}
