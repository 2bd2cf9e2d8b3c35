//! The funnel - concurrency, rate, retry, and memoization composed.
//!
//! Wraps any asynchronous operation with the configured admission controls.
//! A call must hold a concurrency slot and a rate token before executing;
//! both waits are indefinite by design (fairness over deadline). The funnel
//! never fails a call solely due to contention and adds no side effects
//! beyond invoking the wrapped operation.

use crate::gate::ConcurrencyGate;
use crate::memo::{MemoCache, MemoStore};
use crate::rate::{DEFAULT_BURST, TokenBucket};
use crate::retry::RetryPolicy;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use spillway_core::CallResult;
use std::sync::Arc;

/// Funnel configuration
#[derive(Debug, Clone, PartialEq)]
pub struct FunnelConfig {
    /// Maximum simultaneous executions; `None` is unbounded
    pub concurrency: Option<usize>,
    /// Admissions per second; `None` is unbounded
    pub rate: Option<f64>,
    /// Extra instantaneous allowance above the rate
    pub burst: usize,
    /// Maximum additional attempts after a failure
    pub retry: usize,
    /// Whether to memoize results by canonical argument key
    pub memoize: bool,
}

impl FunnelConfig {
    /// Create a config with no limits, no retry, no memoization
    #[must_use]
    pub const fn new() -> Self {
        Self {
            concurrency: None,
            rate: None,
            burst: DEFAULT_BURST,
            retry: 0,
            memoize: false,
        }
    }

    /// Set the concurrency limit
    #[must_use]
    pub const fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit);
        self
    }

    /// Set the admission rate in operations per second
    #[must_use]
    pub const fn with_rate(mut self, rate: f64) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Set the burst allowance
    #[must_use]
    pub const fn with_burst(mut self, burst: usize) -> Self {
        self.burst = burst;
        self
    }

    /// Set the number of additional attempts on failure
    #[must_use]
    pub const fn with_retry(mut self, retry: usize) -> Self {
        self.retry = retry;
        self
    }

    /// Enable memoization
    #[must_use]
    pub const fn with_memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Admission-controlled execution wrapper
///
/// Cloning a funnel shares its admission state: all clones count against
/// the same slots, tokens, and memo cache.
pub struct Funnel<V> {
    gate: ConcurrencyGate,
    bucket: Option<Arc<TokenBucket>>,
    retry: RetryPolicy,
    memo: Option<Arc<MemoCache<V>>>,
    store: Option<Arc<dyn MemoStore>>,
}

impl<V> Clone for Funnel<V> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            bucket: self.bucket.clone(),
            retry: self.retry,
            memo: self.memo.clone(),
            store: self.store.clone(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Funnel<V> {
    /// Create a funnel from a configuration
    #[must_use]
    pub fn new(config: FunnelConfig) -> Self {
        Self {
            gate: ConcurrencyGate::new(config.concurrency),
            bucket: config
                .rate
                .map(|rate| Arc::new(TokenBucket::new(rate, config.burst))),
            retry: RetryPolicy::new(config.retry),
            memo: config.memoize.then(|| Arc::new(MemoCache::new())),
            store: None,
        }
    }

    /// Attach a persistent store consulted before and written after
    /// memoized executions
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MemoStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Run an operation through the funnel without memoization
    ///
    /// `op` may be invoked multiple times when retry is configured; the
    /// final failure is propagated unchanged.
    ///
    /// # Errors
    ///
    /// Returns the wrapped operation's own error once retries are exhausted
    pub async fn run<F>(&self, op: F) -> CallResult<V>
    where
        F: Fn() -> BoxFuture<'static, CallResult<V>> + Send + Sync + 'static,
    {
        execute_admitted(self.gate.clone(), self.bucket.clone(), self.retry, op).await
    }

    /// Run an operation through the funnel, memoized under `key`
    ///
    /// With memoization disabled this behaves exactly like [`Funnel::run`].
    /// Otherwise the persistent store (if any) is consulted first;
    /// concurrent callers for the same key share one in-flight execution;
    /// success is retained and written back to the store; failure evicts
    /// the key.
    ///
    /// # Errors
    ///
    /// Returns the wrapped operation's own error once retries are exhausted
    pub async fn run_keyed<F>(&self, key: &str, op: F) -> CallResult<V>
    where
        V: Serialize + DeserializeOwned,
        F: Fn() -> BoxFuture<'static, CallResult<V>> + Send + Sync + 'static,
    {
        let Some(memo) = self.memo.clone() else {
            return self.run(op).await;
        };

        if let Some(store) = &self.store {
            if let Some(raw) = store.get(key).await {
                if let Ok(value) = serde_json::from_str(&raw) {
                    return Ok(value);
                }
            }
        }

        let gate = self.gate.clone();
        let bucket = self.bucket.clone();
        let retry = self.retry;
        let store = self.store.clone();
        let stored_key = key.to_string();

        memo.run(key, move || {
            async move {
                let value = execute_admitted(gate, bucket, retry, op).await?;
                if let Some(store) = store {
                    if let Ok(raw) = serde_json::to_string(&value) {
                        store.put(&stored_key, &raw).await;
                    }
                }
                Ok(value)
            }
            .boxed()
        })
        .await
    }

    /// The concurrency gate shared by all clones
    #[must_use]
    pub const fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// The memo cache, if memoization is enabled
    #[must_use]
    pub fn memo(&self) -> Option<&MemoCache<V>> {
        self.memo.as_deref()
    }
}

/// Hold a slot and a token, then execute with retry
async fn execute_admitted<V, F>(
    gate: ConcurrencyGate,
    bucket: Option<Arc<TokenBucket>>,
    retry: RetryPolicy,
    op: F,
) -> CallResult<V>
where
    F: Fn() -> BoxFuture<'static, CallResult<V>> + Send + Sync + 'static,
{
    let _permit = gate.acquire().await;
    if let Some(bucket) = &bucket {
        bucket.take().await;
    }

    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= retry.max_retries {
                    return Err(error);
                }
                tokio::time::sleep(retry.delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memo::{MemoryStore, canonical_key};
    use serde_json::json;
    use spillway_core::CallError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_op(
        executions: Arc<AtomicUsize>,
        result: CallResult<u64>,
    ) -> impl Fn() -> BoxFuture<'static, CallResult<u64>> + Send + Sync + 'static {
        move || {
            let executions = executions.clone();
            let result = result.clone();
            async move {
                executions.fetch_add(1, Ordering::SeqCst);
                result
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_config_defaults() {
        let config = FunnelConfig::new();
        assert_eq!(config.concurrency, None);
        assert_eq!(config.rate, None);
        assert_eq!(config.burst, DEFAULT_BURST);
        assert_eq!(config.retry, 0);
        assert!(!config.memoize);
    }

    #[tokio::test]
    async fn test_run_passes_value_through() {
        let funnel: Funnel<u64> = Funnel::new(FunnelConfig::new());
        let value = funnel.run(|| async { Ok(5) }.boxed()).await.unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_run_propagates_error_unchanged() {
        let funnel: Funnel<u64> = Funnel::new(FunnelConfig::new());
        let error = funnel
            .run(|| {
                async {
                    Err(CallError::Remote {
                        message: "boom".to_string(),
                    })
                }
                .boxed()
            })
            .await
            .unwrap_err();
        assert_eq!(
            error,
            CallError::Remote {
                message: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_concurrency_one_serializes_executions() {
        let funnel: Funnel<u64> = Funnel::new(FunnelConfig::new().with_concurrency(1));
        let current = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let funnel = funnel.clone();
            let current = current.clone();
            let high_water = high_water.clone();
            handles.push(tokio::spawn(async move {
                funnel
                    .run(move || {
                        let current = current.clone();
                        let high_water = high_water.clone();
                        async move {
                            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                            high_water.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            current.fetch_sub(1, Ordering::SeqCst);
                            Ok(0)
                        }
                        .boxed()
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(high_water.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_paces_executions() {
        let funnel: Funnel<u64> =
            Funnel::new(FunnelConfig::new().with_rate(10.0).with_burst(1));
        let start = tokio::time::Instant::now();

        for _ in 0..3 {
            funnel.run(|| async { Ok(0) }.boxed()).await.unwrap();
        }
        // 1 burst token free, 2 waited at 100ms each
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let funnel: Funnel<u64> = Funnel::new(FunnelConfig::new().with_retry(2));
        let executions = Arc::new(AtomicUsize::new(0));

        let exec = executions.clone();
        let value = funnel
            .run(move || {
                let exec = exec.clone();
                async move {
                    if exec.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CallError::Remote {
                            message: "transient".to_string(),
                        })
                    } else {
                        Ok(11)
                    }
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(value, 11);
        assert_eq!(executions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_propagates_final_error() {
        let funnel: Funnel<u64> = Funnel::new(FunnelConfig::new().with_retry(1));
        let executions = Arc::new(AtomicUsize::new(0));

        let error = funnel
            .run(counting_op(
                executions.clone(),
                Err(CallError::Remote {
                    message: "permanent".to_string(),
                }),
            ))
            .await
            .unwrap_err();

        assert_eq!(
            error,
            CallError::Remote {
                message: "permanent".to_string()
            }
        );
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_memoize_dedups_concurrent_identical_calls() {
        let funnel: Funnel<u64> = Funnel::new(FunnelConfig::new().with_memoize(true));
        let executions = Arc::new(AtomicUsize::new(0));
        let key = canonical_key("f", &[json!(1), json!(2)]);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let funnel = funnel.clone();
            let executions = executions.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                funnel
                    .run_keyed(&key, move || {
                        let executions = executions.clone();
                        async move {
                            executions.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(3)
                        }
                        .boxed()
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 3);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_memoize_failure_not_cached() {
        let funnel: Funnel<u64> = Funnel::new(FunnelConfig::new().with_memoize(true));
        let executions = Arc::new(AtomicUsize::new(0));

        let first = funnel
            .run_keyed(
                "key",
                counting_op(
                    executions.clone(),
                    Err(CallError::Remote {
                        message: "boom".to_string(),
                    }),
                ),
            )
            .await;
        assert!(first.is_err());

        let second = funnel
            .run_keyed("key", counting_op(executions.clone(), Ok(4)))
            .await;
        assert_eq!(second.unwrap(), 4);
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_consulted_before_execution() {
        let store = Arc::new(MemoryStore::new());
        store.put("key", "99").await;

        let funnel: Funnel<u64> =
            Funnel::new(FunnelConfig::new().with_memoize(true)).with_store(store);
        let executions = Arc::new(AtomicUsize::new(0));

        let value = funnel
            .run_keyed("key", counting_op(executions.clone(), Ok(1)))
            .await
            .unwrap();

        assert_eq!(value, 99);
        assert_eq!(executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_written_after_success() {
        let store = Arc::new(MemoryStore::new());
        let funnel: Funnel<u64> =
            Funnel::new(FunnelConfig::new().with_memoize(true)).with_store(store.clone());

        let value = funnel
            .run_keyed("key", || async { Ok(7) }.boxed())
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(store.get("key").await, Some("7".to_string()));
    }

    #[tokio::test]
    async fn test_run_keyed_without_memoize_executes_every_time() {
        let funnel: Funnel<u64> = Funnel::new(FunnelConfig::new());
        let executions = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            funnel
                .run_keyed("key", counting_op(executions.clone(), Ok(1)))
                .await
                .unwrap();
        }
        assert_eq!(executions.load(Ordering::SeqCst), 3);
    }
}
