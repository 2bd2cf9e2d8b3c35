//! Memoization - one execution per canonical argument key.
//!
//! Concurrent callers for the same key attach to a single in-flight
//! execution. A successful result stays cached indefinitely; a failure
//! evicts the entry so the next call re-attempts from scratch. An optional
//! persistent store is consulted before execution and written after
//! success.

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use spillway_core::CallResult;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Canonical cache key for a call: function name plus serialized arguments
///
/// Equal values built the same way always produce equal keys.
#[must_use]
pub fn canonical_key(function_name: &str, args: &[Value]) -> String {
    let rendered = serde_json::to_string(args).unwrap_or_default();
    format!("{}({})", function_name, rendered)
}

/// External persistent key-value store for memoized results
///
/// Consulted before execution and populated after success. Store failures
/// are soft: a failed read is a cache miss, a failed write is dropped.
#[async_trait]
pub trait MemoStore: Send + Sync {
    /// Look up a cached value
    async fn get(&self, key: &str) -> Option<String>;

    /// Store a value
    async fn put(&self, key: &str, value: &str);
}

/// In-memory persistent store
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl MemoStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn put(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
    }
}

/// File-backed persistent store - one file per key under a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at the given directory
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Name-based UUID gives a stable, filename-safe encoding of the key
        let name = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes());
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl MemoStore for FileStore {
    async fn get(&self, key: &str) -> Option<String> {
        tokio::fs::read_to_string(self.path_for(key)).await.ok()
    }

    async fn put(&self, key: &str, value: &str) {
        if tokio::fs::create_dir_all(&self.dir).await.is_err() {
            return;
        }
        let _ = tokio::fs::write(self.path_for(key), value).await;
    }
}

type SharedExecution<V> = Shared<BoxFuture<'static, CallResult<V>>>;

/// In-flight and resolved executions keyed by canonical argument string
///
/// At most one underlying execution exists per key; all concurrent callers
/// for that key observe the same eventual outcome.
pub struct MemoCache<V> {
    inflight: Mutex<HashMap<String, SharedExecution<V>>>,
}

impl<V: Clone + Send + Sync + 'static> MemoCache<V> {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached keys (in-flight or resolved)
    pub async fn len(&self) -> usize {
        self.inflight.lock().await.len()
    }

    /// Whether the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.inflight.lock().await.is_empty()
    }

    /// Evict a key
    pub async fn evict(&self, key: &str) {
        self.inflight.lock().await.remove(key);
    }

    /// Run the execution for `key`, attaching to an in-flight one if present
    ///
    /// `make` is invoked only if no execution exists for the key. On failure
    /// the entry is evicted so the next caller re-attempts from scratch.
    pub async fn run<F>(&self, key: &str, make: F) -> CallResult<V>
    where
        F: FnOnce() -> BoxFuture<'static, CallResult<V>>,
    {
        let execution = {
            let mut map = self.inflight.lock().await;
            match map.get(key) {
                Some(existing) => existing.clone(),
                None => {
                    let shared = make().shared();
                    map.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        let result = execution.clone().await;

        if result.is_err() {
            let mut map = self.inflight.lock().await;
            // Only evict the execution we observed failing; a newer entry
            // installed by a later caller stays.
            if let Some(existing) = map.get(key) {
                if existing.ptr_eq(&execution) {
                    map.remove(key);
                }
            }
        }

        result
    }
}

impl<V: Clone + Send + Sync + 'static> Default for MemoCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
