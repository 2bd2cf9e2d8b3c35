//! The invoker - one call API over two dispatch paths.
//!
//! Callers say `call("function", args)`; the invoker builds the request
//! envelope, runs it through the admission funnel when one is configured,
//! and dispatches it either to a local executor or through the correlation
//! engine. Each attempt carries a fresh CallId, so a retried call is a new
//! correlation, never a reused one.

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use spillway_core::{CallError, CallRequest, CallResponse, CallResult};
use spillway_engine::{CorrelationEngine, EngineConfig, EngineError};
use spillway_funnel::{Funnel, FunnelConfig, MemoStore, canonical_key};
use spillway_transport::Transport;
use std::sync::Arc;

/// How a call reaches its executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// In-process executor, no queue round trip
    Direct,
    /// Publish to the request queue and await the correlated response
    Queue,
}

/// Local execution capability for [`InvocationMode::Direct`]
///
/// Implementations execute the request in-process and hand back a full
/// response envelope, so direct and queue dispatch stay interchangeable
/// at the call site.
#[async_trait]
pub trait DirectInvoker: Send + Sync {
    /// Execute a call request and produce its response
    ///
    /// # Errors
    ///
    /// Returns error if the executor itself fails; a failure *of the
    /// invoked function* is a [`CallResponse`] with a failed outcome.
    async fn invoke(&self, request: &CallRequest) -> CallResult<CallResponse>;
}

/// Invoker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct InvokerConfig {
    /// Locator stamped onto requests as the response destination
    pub response_destination: String,
    /// Admission controls applied around dispatch; `None` is pass-through
    pub funnel: Option<FunnelConfig>,
}

impl InvokerConfig {
    /// Create a pass-through config for the given response destination
    #[must_use]
    pub fn new(response_destination: impl Into<String>) -> Self {
        Self {
            response_destination: response_destination.into(),
            funnel: None,
        }
    }

    /// Apply admission controls around every call
    #[must_use]
    pub fn with_funnel(mut self, funnel: FunnelConfig) -> Self {
        self.funnel = Some(funnel);
        self
    }
}

enum Dispatch<T> {
    Direct(Arc<dyn DirectInvoker>),
    Queue(Arc<CorrelationEngine<T>>),
}

impl<T> Clone for Dispatch<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Direct(executor) => Self::Direct(executor.clone()),
            Self::Queue(engine) => Self::Queue(engine.clone()),
        }
    }
}

/// Call-site facade over direct and queue dispatch
pub struct Invoker<T> {
    dispatch: Dispatch<T>,
    funnel: Option<Funnel<Value>>,
    response_destination: String,
}

impl<T: Transport + 'static> Invoker<T> {
    /// Create a queue-mode invoker over the given transport
    #[must_use]
    pub fn queue(transport: Arc<T>, config: InvokerConfig) -> Self {
        let engine = CorrelationEngine::new(
            transport,
            EngineConfig::new(config.response_destination.clone()),
        );
        Self {
            dispatch: Dispatch::Queue(Arc::new(engine)),
            funnel: config.funnel.map(Funnel::new),
            response_destination: config.response_destination,
        }
    }

    /// Create a direct-mode invoker over an in-process executor
    #[must_use]
    pub fn direct(executor: Arc<dyn DirectInvoker>, config: InvokerConfig) -> Self {
        Self {
            dispatch: Dispatch::Direct(executor),
            funnel: config.funnel.map(Funnel::new),
            response_destination: config.response_destination,
        }
    }

    /// Attach a persistent memo store to the configured funnel
    ///
    /// A no-op when no funnel is configured or memoization is disabled.
    #[must_use]
    pub fn with_memo_store(mut self, store: Arc<dyn MemoStore>) -> Self {
        self.funnel = self.funnel.map(|funnel| funnel.with_store(store));
        self
    }

    /// The configured invocation mode
    #[must_use]
    pub fn mode(&self) -> InvocationMode {
        match self.dispatch {
            Dispatch::Direct(_) => InvocationMode::Direct,
            Dispatch::Queue(_) => InvocationMode::Queue,
        }
    }

    /// The correlation engine, in queue mode
    #[must_use]
    pub fn engine(&self) -> Option<&Arc<CorrelationEngine<T>>> {
        match &self.dispatch {
            Dispatch::Queue(engine) => Some(engine),
            Dispatch::Direct(_) => None,
        }
    }

    /// Call a remote function and await its result
    ///
    /// Memoization (when enabled) keys on the canonical function-plus-args
    /// key, so identical concurrent calls share one execution regardless
    /// of dispatch path.
    ///
    /// # Errors
    ///
    /// Returns the execution failure, a publish failure, or
    /// [`CallError::EngineStopped`] after shutdown
    pub async fn call(&self, function_name: &str, args: Vec<Value>) -> CallResult<Value> {
        tracing::debug!(function_name, argc = args.len(), "dispatching call");
        match &self.funnel {
            Some(funnel) => {
                let key = canonical_key(function_name, &args);
                let op = self.dispatch_op(function_name.to_string(), args);
                funnel.run_keyed(&key, op).await
            }
            None => {
                dispatch_once(
                    self.dispatch.clone(),
                    self.request_for(function_name.to_string(), args),
                )
                .await
            }
        }
    }

    /// Drain and stop the underlying engine; a no-op in direct mode
    ///
    /// # Errors
    ///
    /// Returns error if the engine's stop control message cannot be
    /// published
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        match &self.dispatch {
            Dispatch::Queue(engine) => engine.stop().await,
            Dispatch::Direct(_) => Ok(()),
        }
    }

    fn request_for(&self, function_name: String, args: Vec<Value>) -> CallRequest {
        CallRequest::new(function_name, self.response_destination.clone()).with_args(args)
    }

    /// Build the retryable unit the funnel admits: envelope construction
    /// happens inside so every attempt gets a fresh CallId.
    fn dispatch_op(
        &self,
        function_name: String,
        args: Vec<Value>,
    ) -> impl Fn() -> BoxFuture<'static, CallResult<Value>> + Send + Sync + 'static {
        let dispatch = self.dispatch.clone();
        let destination = self.response_destination.clone();
        move || {
            let request = CallRequest::new(function_name.clone(), destination.clone())
                .with_args(args.clone());
            dispatch_once(dispatch.clone(), request).boxed()
        }
    }
}

async fn dispatch_once<T: Transport + 'static>(
    dispatch: Dispatch<T>,
    request: CallRequest,
) -> CallResult<Value> {
    match dispatch {
        Dispatch::Direct(executor) => {
            let response = executor.invoke(&request).await?;
            if response.call_id != request.call_id {
                return Err(CallError::Internal {
                    message: "executor responded for a different CallId".to_string(),
                });
            }
            response.outcome.into_result()
        }
        Dispatch::Queue(engine) => engine.enqueue_call(request).await.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spillway_core::{CallId, Timestamp};
    use spillway_funnel::MemoryStore;
    use spillway_transport::ChannelTransport;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Executor that sums integer args, with scripted leading failures
    struct ScriptedExecutor {
        seen: Mutex<Vec<CallId>>,
        failures_remaining: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                failures_remaining: AtomicUsize::new(0),
            }
        }

        fn failing_first(failures: usize) -> Self {
            let executor = Self::new();
            executor.failures_remaining.store(failures, Ordering::SeqCst);
            executor
        }

        fn seen(&self) -> Vec<CallId> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DirectInvoker for ScriptedExecutor {
        async fn invoke(&self, request: &CallRequest) -> CallResult<CallResponse> {
            self.seen.lock().unwrap().push(request.call_id);
            let started = Timestamp::now();
            if self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Ok(CallResponse::failed(request.call_id, "scripted", started));
            }
            let sum: i64 = request.args.iter().filter_map(Value::as_i64).sum();
            Ok(CallResponse::returned(request.call_id, json!(sum), started))
        }
    }

    fn spawn_adder(transport: Arc<ChannelTransport>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(request) = transport.next_request().await {
                let sum: i64 = request.args.iter().filter_map(Value::as_i64).sum();
                let response =
                    CallResponse::returned(request.call_id, json!(sum), Timestamp::now());
                let _ = transport.respond(&response).await;
            }
        })
    }

    #[tokio::test]
    async fn test_direct_call_returns_value() {
        let executor = Arc::new(ScriptedExecutor::new());
        let invoker: Invoker<ChannelTransport> =
            Invoker::direct(executor.clone(), InvokerConfig::new("responses"));
        assert_eq!(invoker.mode(), InvocationMode::Direct);

        let value = invoker
            .call("add", vec![json!(2), json!(3)])
            .await
            .unwrap();
        assert_eq!(value, json!(5));
        assert_eq!(executor.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_direct_failure_surfaces_as_remote_error() {
        let executor = Arc::new(ScriptedExecutor::failing_first(1));
        let invoker: Invoker<ChannelTransport> =
            Invoker::direct(executor, InvokerConfig::new("responses"));

        let error = invoker.call("add", vec![json!(1)]).await.unwrap_err();
        assert_eq!(
            error,
            CallError::Remote {
                message: "scripted".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_queue_call_round_trips() {
        let transport =
            Arc::new(ChannelTransport::new().with_poll_wait(Duration::from_millis(10)));
        let worker = spawn_adder(transport.clone());
        let invoker = Invoker::queue(transport.clone(), InvokerConfig::new("responses"));
        assert_eq!(invoker.mode(), InvocationMode::Queue);

        let value = invoker
            .call("add", vec![json!(4), json!(6)])
            .await
            .unwrap();
        assert_eq!(value, json!(10));

        invoker.shutdown().await.unwrap();
        transport.close();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_call_after_shutdown_rejected() {
        let transport =
            Arc::new(ChannelTransport::new().with_poll_wait(Duration::from_millis(10)));
        let invoker = Invoker::queue(transport, InvokerConfig::new("responses"));

        invoker.shutdown().await.unwrap();
        let error = invoker.call("add", vec![json!(1)]).await.unwrap_err();
        assert_eq!(error, CallError::EngineStopped);
    }

    #[tokio::test]
    async fn test_shutdown_is_noop_in_direct_mode() {
        let invoker: Invoker<ChannelTransport> = Invoker::direct(
            Arc::new(ScriptedExecutor::new()),
            InvokerConfig::new("responses"),
        );
        invoker.shutdown().await.unwrap();
        assert!(invoker.call("add", vec![json!(1)]).await.is_ok());
    }

    #[tokio::test]
    async fn test_retry_uses_fresh_call_id_per_attempt() {
        let executor = Arc::new(ScriptedExecutor::failing_first(1));
        let config = InvokerConfig::new("responses")
            .with_funnel(FunnelConfig::new().with_retry(2));
        let invoker: Invoker<ChannelTransport> = Invoker::direct(executor.clone(), config);

        let value = invoker.call("add", vec![json!(7)]).await.unwrap();
        assert_eq!(value, json!(7));

        let seen = executor.seen();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
    }

    #[tokio::test]
    async fn test_memoized_calls_share_one_execution() {
        let executor = Arc::new(ScriptedExecutor::new());
        let config = InvokerConfig::new("responses")
            .with_funnel(FunnelConfig::new().with_memoize(true));
        let invoker: Invoker<ChannelTransport> = Invoker::direct(executor.clone(), config);

        for _ in 0..3 {
            let value = invoker
                .call("add", vec![json!(1), json!(2)])
                .await
                .unwrap();
            assert_eq!(value, json!(3));
        }
        assert_eq!(executor.seen().len(), 1);

        // A different argument list is a different key
        invoker.call("add", vec![json!(9)]).await.unwrap();
        assert_eq!(executor.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_memo_store_shared_across_invokers() {
        let store = Arc::new(MemoryStore::new());
        let config = InvokerConfig::new("responses")
            .with_funnel(FunnelConfig::new().with_memoize(true));

        let first_executor = Arc::new(ScriptedExecutor::new());
        let first: Invoker<ChannelTransport> =
            Invoker::direct(first_executor, config.clone()).with_memo_store(store.clone());
        assert_eq!(first.call("add", vec![json!(5)]).await.unwrap(), json!(5));

        // A fresh invoker with an empty in-memory cache hits the store
        let second_executor = Arc::new(ScriptedExecutor::new());
        let second: Invoker<ChannelTransport> =
            Invoker::direct(second_executor.clone(), config).with_memo_store(store);
        assert_eq!(second.call("add", vec![json!(5)]).await.unwrap(), json!(5));
        assert!(second_executor.seen().is_empty());
    }

    #[tokio::test]
    async fn test_funnel_applies_to_queue_dispatch() {
        let transport =
            Arc::new(ChannelTransport::new().with_poll_wait(Duration::from_millis(10)));
        let worker = spawn_adder(transport.clone());
        let config = InvokerConfig::new("responses")
            .with_funnel(FunnelConfig::new().with_concurrency(2));
        let invoker = Arc::new(Invoker::queue(transport.clone(), config));

        let mut handles = Vec::new();
        for i in 0..8i64 {
            let invoker = invoker.clone();
            handles.push(tokio::spawn(async move {
                invoker.call("add", vec![json!(i), json!(1)]).await
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), json!(i as i64 + 1));
        }

        invoker.shutdown().await.unwrap();
        transport.close();
        worker.await.unwrap();
    }
}
