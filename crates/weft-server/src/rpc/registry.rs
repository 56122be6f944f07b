//! Method registry and async dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};
use weft_rpc::{Params, RpcError};

use crate::metrics::record_call;
use crate::pubsub::RESERVED_PREFIX;
use crate::rpc::context::CallContext;

/// Default time a single handler is allowed to run.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Calls slower than this are logged.
const SLOW_CALL: Duration = Duration::from_secs(5);

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler. `params` is still raw JSON; decode it with
    /// [`Params::parse`] or [`Params::require`].
    async fn handle(&self, params: Params, ctx: &CallContext) -> Result<Value, RpcError>;
}

/// Why a registration was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The name is in the built-in `System.` namespace.
    #[error("method name '{0}' is reserved")]
    Reserved(String),
    /// The name is empty.
    #[error("method name must not be empty")]
    EmptyName,
}

/// Registry mapping method names to handlers.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
    timeout: Duration,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Set the per-call time limit.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Per-call time limit.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a handler for a method name, replacing any previous one.
    pub fn register(
        &mut self,
        method: &str,
        handler: impl MethodHandler + 'static,
    ) -> Result<(), RegistryError> {
        if method.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if method.starts_with(RESERVED_PREFIX) {
            return Err(RegistryError::Reserved(method.to_owned()));
        }
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
        Ok(())
    }

    /// Register an async closure taking typed params.
    ///
    /// Params are decoded into `P` (`InvalidParams` on mismatch) and the
    /// result is serialized from `R` (`Serialization` on failure).
    pub fn register_fn<P, R, F, Fut>(&mut self, method: &str, f: F) -> Result<(), RegistryError>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RpcError>> + Send + 'static,
    {
        self.register(
            method,
            FnHandler {
                f,
                _types: PhantomData,
            },
        )
    }

    /// Dispatch a call to the registered handler, bounded by the timeout.
    pub async fn dispatch(
        &self,
        method: &str,
        params: Params,
        ctx: &CallContext,
    ) -> Result<Value, RpcError> {
        let start = Instant::now();
        let result = match self.handlers.get(method) {
            None => Err(RpcError::MethodNotFound {
                method: method.to_owned(),
            }),
            Some(handler) => {
                match tokio::time::timeout(self.timeout, handler.handle(params, ctx)).await {
                    Ok(result) => result,
                    Err(_elapsed) => {
                        error!(method, "RPC handler timed out after {:?}", self.timeout);
                        Err(RpcError::Timeout {
                            method: method.to_owned(),
                            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                        })
                    }
                }
            }
        };

        let duration = start.elapsed();
        record_call(method, &result, duration);
        if duration >= SLOW_CALL {
            warn!(
                method,
                duration_secs = duration.as_secs_f64(),
                "slow RPC request"
            );
        }
        result
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct FnHandler<F, P, R> {
    f: F,
    _types: PhantomData<fn(P) -> R>,
}

#[async_trait]
impl<P, R, F, Fut> MethodHandler for FnHandler<F, P, R>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(P, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, RpcError>> + Send + 'static,
{
    async fn handle(&self, params: Params, ctx: &CallContext) -> Result<Value, RpcError> {
        let params: P = params.parse()?;
        let result = (self.f)(params, ctx.clone()).await?;
        serde_json::to_value(result).map_err(|e| RpcError::serialization(&e))
    }
}
