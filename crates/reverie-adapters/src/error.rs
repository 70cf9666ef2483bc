//! Adapter error taxonomy and bounded retry
//!
//! Every adapter call resolves to a typed success or a typed failure;
//! transient failures are retried with bounded backoff inside the adapter
//! and only surfaced once retries exhaust, permanent failures surface
//! immediately.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Retryable: provider 5xx, rate limits, disconnects, timeouts.
    #[error("Transient external failure: {0}")]
    Transient(String),

    /// Not retryable: bad request, bad credentials, malformed payloads.
    #[error("Permanent external failure: {0}")]
    Permanent(String),
}

impl AdapterError {
    pub fn transient(msg: impl Into<String>) -> Self {
        AdapterError::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        AdapterError::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }

    /// Classify an HTTP status code the way providers document them:
    /// 429 and 5xx are worth retrying, the rest of 4xx is caller error.
    pub fn from_status(status: u16, context: &str) -> Self {
        if status == 429 || status >= 500 {
            AdapterError::Transient(format!("{context}: HTTP {status}"))
        } else {
            AdapterError::Permanent(format!("{context}: HTTP {status}"))
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return AdapterError::from_status(status.as_u16(), "http request");
        }
        if err.is_timeout() || err.is_connect() {
            AdapterError::Transient(err.to_string())
        } else {
            AdapterError::Permanent(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Permanent(format!("payload decode: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;

/// Run `op` up to `attempts` times, sleeping `base_delay * 2^n` between
/// transient failures. Permanent failures return immediately.
pub async fn with_retries<T, F, Fut>(attempts: u32, base_delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = base_delay;
    let mut last = None;

    for attempt in 1..=attempts.max(1) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!("Transient failure (attempt {attempt}/{attempts}): {err}");
                tokio::time::sleep(delay).await;
                delay *= 2;
                last = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last.unwrap_or_else(|| AdapterError::transient("retries exhausted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn status_classification() {
        assert!(AdapterError::from_status(500, "t").is_transient());
        assert!(AdapterError::from_status(429, "t").is_transient());
        assert!(!AdapterError::from_status(400, "t").is_transient());
        assert!(!AdapterError::from_status(401, "t").is_transient());
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retries(3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AdapterError::transient("flaky"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_do_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AdapterError::permanent("bad credentials")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_surfaces_after_exhaustion() {
        let result: Result<()> = with_retries(2, Duration::from_millis(1), || async {
            Err(AdapterError::transient("still down"))
        })
        .await;

        match result {
            Err(AdapterError::Transient(_)) => {}
            other => panic!("expected transient error, got {other:?}"),
        }
    }
}
