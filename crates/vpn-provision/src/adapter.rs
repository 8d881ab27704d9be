//! Backend adapter trait and call policy.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;
use vpn_core::{BackendKind, defaults};

use crate::error::AdapterError;

/// What an adapter needs to make a credential live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSpec {
    /// WireGuard public key or proxy client UUID.
    pub credential: String,
    /// Leased address (WireGuard only).
    pub address: Option<String>,
    /// Human-readable tag (the username).
    pub label: String,
}

/// A daemon whose live configuration mirrors ledger bindings.
///
/// `apply` and `remove` are idempotent: applying a present entry and
/// removing an absent one both succeed.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Make `peer` live.
    async fn apply(&self, peer: &PeerSpec) -> Result<(), AdapterError>;

    /// Remove the live entry for `credential`.
    async fn remove(&self, credential: &str) -> Result<(), AdapterError>;

    /// Whether `credential` is currently live.
    async fn contains(&self, credential: &str) -> Result<bool, AdapterError>;

    /// All live credentials.
    async fn list(&self) -> Result<Vec<String>, AdapterError>;

    /// Bring the daemon up.
    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Bring the daemon down.
    async fn stop(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

#[async_trait]
impl<A: BackendAdapter + ?Sized> BackendAdapter for Arc<A> {
    #[inline]
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    #[inline]
    async fn apply(&self, peer: &PeerSpec) -> Result<(), AdapterError> {
        (**self).apply(peer).await
    }

    #[inline]
    async fn remove(&self, credential: &str) -> Result<(), AdapterError> {
        (**self).remove(credential).await
    }

    #[inline]
    async fn contains(&self, credential: &str) -> Result<bool, AdapterError> {
        (**self).contains(credential).await
    }

    #[inline]
    async fn list(&self) -> Result<Vec<String>, AdapterError> {
        (**self).list().await
    }

    #[inline]
    async fn start(&self) -> Result<(), AdapterError> {
        (**self).start().await
    }

    #[inline]
    async fn stop(&self) -> Result<(), AdapterError> {
        (**self).stop().await
    }
}

/// Deadline and retry policy for adapter calls.
#[derive(Debug, Clone, Copy)]
pub struct AdapterPolicy {
    /// Deadline of a single attempt.
    pub timeout: Duration,
    /// Pause before the one retry of a transient failure.
    pub retry_delay: Duration,
}

impl Default for AdapterPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(defaults::DEFAULT_ADAPTER_TIMEOUT_SECS),
            retry_delay: Duration::from_millis(defaults::DEFAULT_ADAPTER_RETRY_DELAY_MS),
        }
    }
}

impl AdapterPolicy {
    pub fn new(timeout: Duration, retry_delay: Duration) -> Self {
        Self {
            timeout,
            retry_delay,
        }
    }

    /// Run `call` under the deadline, retrying a transient failure once.
    pub async fn run<T, F, Fut>(
        &self,
        backend: BackendKind,
        op: &'static str,
        mut call: F,
    ) -> Result<T, AdapterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        match self.attempt(backend, &mut call).await {
            Err(err) if err.is_transient() => {
                warn!(backend = %backend, op, error = %err, "transient adapter failure, retrying");
                vpn_metrics::record_adapter_retry(backend.as_str());
                tokio::time::sleep(self.retry_delay).await;
                self.attempt(backend, &mut call).await
            }
            other => other,
        }
    }

    async fn attempt<T, F, Fut>(&self, backend: BackendKind, call: &mut F) -> Result<T, AdapterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout),
        };
        vpn_metrics::record_adapter_call_duration(backend.as_str(), started.elapsed().as_secs_f64());
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn fast() -> AdapterPolicy {
        AdapterPolicy::new(Duration::from_millis(50), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_once() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = fast()
            .run(BackendKind::Proxy, "apply", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AdapterError::Reload("busy".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_transient_failure_surfaces() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = fast()
            .run(BackendKind::Proxy, "apply", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AdapterError::Unavailable("down".into()))
            })
            .await;
        assert!(matches!(result, Err(AdapterError::Unavailable(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = fast()
            .run(BackendKind::WireGuard, "apply", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AdapterError::InvalidCredential("bad key".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out_and_retries() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = fast()
            .run(BackendKind::WireGuard, "apply", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AdapterError::Timeout)));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
