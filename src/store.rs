//! Decision record persistence.
//!
//! A repository interface (`get`/`put`/`delete` by user id) instead of
//! a process-global mutable store. Writes are full replacements of the
//! record under that key; there is no read-modify-write, so concurrent
//! runs for the same user settle as last-write-wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The persisted artifact of one completed decision run. Never mutated
/// after write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub prompt: String,
    pub options: Vec<String>,
    pub categories: Vec<String>,
    /// Normalized importance weights (sum to 1 per run).
    pub weights: HashMap<String, f64>,
    /// Final scores in [0, 100] per option.
    pub scores: HashMap<String, f64>,
    /// Explanation text shown to the user.
    pub result: String,
    /// Milliseconds since the UNIX epoch at write time.
    pub timestamp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store transport error: {0}")]
    Transport(String),
    #[error("store returned HTTP {0}")]
    Status(u16),
}

/// Write-through persistence gateway keyed by user id.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    async fn get(&self, uid: &str) -> Result<Option<DecisionRecord>, StoreError>;
    async fn put(&self, uid: &str, record: &DecisionRecord) -> Result<(), StoreError>;
    async fn delete(&self, uid: &str) -> Result<(), StoreError>;
}

pub type DynDecisionStore = Arc<dyn DecisionStore>;

// ------------------------------------------------------------
// In-memory store
// ------------------------------------------------------------

/// Mutex-guarded map; the default for local runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, DecisionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DecisionStore for MemoryStore {
    async fn get(&self, uid: &str) -> Result<Option<DecisionRecord>, StoreError> {
        let map = self.inner.lock().expect("store mutex poisoned");
        Ok(map.get(uid).cloned())
    }

    async fn put(&self, uid: &str, record: &DecisionRecord) -> Result<(), StoreError> {
        let mut map = self.inner.lock().expect("store mutex poisoned");
        map.insert(uid.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, uid: &str) -> Result<(), StoreError> {
        let mut map = self.inner.lock().expect("store mutex poisoned");
        map.remove(uid);
        Ok(())
    }
}

// ------------------------------------------------------------
// REST key-value store
// ------------------------------------------------------------

/// Document store over a Firebase-style REST surface:
/// `PUT/GET/DELETE {base}/users/{uid}.json` with the record as the JSON
/// body. Each PUT replaces the whole record.
pub struct RestKvStore {
    http: reqwest::Client,
    base_url: String,
}

impl RestKvStore {
    pub fn new(base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("decision-helper/0.1")
            .connect_timeout(std::time::Duration::from_secs(4))
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, uid: &str) -> String {
        format!("{}/users/{}.json", self.base_url, uid)
    }
}

#[async_trait]
impl DecisionStore for RestKvStore {
    async fn get(&self, uid: &str) -> Result<Option<DecisionRecord>, StoreError> {
        let resp = self
            .http
            .get(self.url_for(uid))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(StoreError::Status(resp.status().as_u16()));
        }
        // The REST surface answers `null` for an absent key.
        let record: Option<DecisionRecord> = resp
            .json()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(record)
    }

    async fn put(&self, uid: &str, record: &DecisionRecord) -> Result<(), StoreError> {
        let resp = self
            .http
            .put(self.url_for(uid))
            .json(record)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(StoreError::Status(resp.status().as_u16()));
        }
        Ok(())
    }

    async fn delete(&self, uid: &str) -> Result<(), StoreError> {
        let resp = self
            .http
            .delete(self.url_for(uid))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(StoreError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Pick the store implied by the config: REST when a database URL is
/// configured, otherwise in-memory.
pub fn build_store_from_config(database_url: Option<&str>) -> DynDecisionStore {
    match database_url {
        Some(url) if !url.trim().is_empty() => Arc::new(RestKvStore::new(url)),
        _ => Arc::new(MemoryStore::new()),
    }
}
