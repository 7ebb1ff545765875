mod openai;
mod retry;
mod routing;

pub use retry::retry_with_backoff;
pub use routing::Router;

use crate::config::{Config, RetryConfig};
use crate::error::{ConfigError, GatewayError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// JSON schema the backend should constrain its answer to
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    pub response_schema: Option<ResponseSchema>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            response_schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Option<ResponseSchema>) -> Self {
        self.response_schema = schema;
        self
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &ChatRequest, timeout: Duration)
        -> Result<String, GatewayError>;
}

/// Single entry point for model calls.
///
/// Every call routes by model id, holds one permit of the shared limiter while
/// in flight, and aborts with [`GatewayError::Cancelled`] once the session's
/// cancellation token fires.
pub struct ModelGateway {
    router: Router,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    cancel: CancellationToken,
    calls: AtomicU64,
}

impl ModelGateway {
    pub fn new(
        router: Router,
        capacity: usize,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            router,
            semaphore: Arc::new(Semaphore::new(capacity.max(1))),
            timeout,
            cancel,
            calls: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &Config, cancel: CancellationToken) -> Result<Self, ConfigError> {
        let router = Router::from_config(config)?;
        Ok(Self::new(
            router,
            config.concurrency,
            Duration::from_secs(config.timeout_sec),
            cancel,
        ))
    }

    pub async fn invoke(&self, prompt: &str, model: &str) -> Result<String, GatewayError> {
        self.send(&ChatRequest::new(prompt, model)).await
    }

    pub async fn send(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        if request.prompt.trim().is_empty() {
            return Err(GatewayError::EmptyPrompt);
        }
        let route = self.router.route(&request.model)?;

        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(GatewayError::Cancelled),
            permit = self.semaphore.acquire() => permit?,
        };

        self.calls.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Calling {} via {} ({})",
            request.model,
            route.profile,
            route.backend.name()
        );

        let text = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(GatewayError::Cancelled),
            result = route.backend.complete(request, self.timeout) => result?,
        };

        if text.trim().is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        Ok(text)
    }

    /// `send` with a caller-supplied retry policy; only transient failures are retried.
    ///
    /// Cancellation also cuts short the wait between attempts.
    pub async fn send_with_retry(
        &self,
        request: &ChatRequest,
        retry: &RetryConfig,
    ) -> Result<String, GatewayError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GatewayError::Cancelled),
            result = retry_with_backoff(retry, GatewayError::is_transient, || {
                self.send(request)
            }) => result,
        }
    }

    /// Send with the retry policy when one is configured
    pub async fn send_with(
        &self,
        request: &ChatRequest,
        retry: Option<&RetryConfig>,
    ) -> Result<String, GatewayError> {
        match retry {
            Some(policy) => self.send_with_retry(request, policy).await,
            None => self.send(request).await,
        }
    }

    /// Token whose cancellation aborts every call made through this gateway
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Backend calls issued so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::routing::Route;
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&ChatRequest) -> Result<String, GatewayError> + Send + Sync>;

    /// In-process backend answering from a closure and recording every request
    pub struct ScriptedBackend {
        handler: Handler,
        delay: Duration,
        requests: Mutex<Vec<ChatRequest>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl ScriptedBackend {
        pub fn new<F>(handler: F) -> Arc<Self>
        where
            F: Fn(&ChatRequest) -> Result<String, GatewayError> + Send + Sync + 'static,
        {
            Self::with_delay(Duration::ZERO, handler)
        }

        pub fn with_delay<F>(delay: Duration, handler: F) -> Arc<Self>
        where
            F: Fn(&ChatRequest) -> Result<String, GatewayError> + Send + Sync + 'static,
        {
            Arc::new(Self {
                handler: Box::new(handler),
                delay,
                requests: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            })
        }

        pub fn echo() -> Arc<dyn ChatBackend> {
            Self::new(|req| Ok(req.prompt.clone()))
        }

        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn count<P: Fn(&ChatRequest) -> bool>(&self, predicate: P) -> usize {
            self.requests.lock().unwrap().iter().filter(|r| predicate(r)).count()
        }

        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: &ChatRequest,
            _timeout: Duration,
        ) -> Result<String, GatewayError> {
            self.requests.lock().unwrap().push(request.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.handler)(request)
        }
    }

    /// Gateway routing every model to `backend`
    pub fn gateway(backend: Arc<ScriptedBackend>, capacity: usize) -> ModelGateway {
        gateway_with_token(backend, capacity, CancellationToken::new())
    }

    pub fn gateway_with_token(
        backend: Arc<ScriptedBackend>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> ModelGateway {
        let router = Router::new(vec![Route {
            profile: "scripted".to_string(),
            pattern: None,
            backend,
        }]);
        ModelGateway::new(router, capacity, Duration::from_secs(5), cancel)
    }
}
