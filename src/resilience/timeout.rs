use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, warn};

/// Deadline wrapper for a single backend operation.
///
/// The operation runs as its own task. When the deadline elapses the envelope
/// stops waiting and reports `<operation>Timeout`, but the task is left to
/// finish on its own: an in-flight backend request is not aborted and keeps
/// its connection until the backend answers or the client-level timeout fires.
#[derive(Debug, Clone)]
pub struct CallEnvelope {
    operation: String,
    timeout: Duration,
}

impl CallEnvelope {
    pub fn new(operation: impl Into<String>, timeout: Duration) -> Self {
        Self {
            operation: operation.into(),
            timeout,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `operation` against the deadline.
    ///
    /// Results and failures produced before the deadline are returned unchanged.
    pub async fn call<F, T>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let start_time = Instant::now();
        debug!(
            "Starting operation '{}' with timeout {:?}",
            self.operation, self.timeout
        );

        let handle = tokio::spawn(operation);

        match timeout(self.timeout, handle).await {
            Ok(Ok(Ok(value))) => {
                debug!(
                    "Operation '{}' completed successfully in {:?}",
                    self.operation,
                    start_time.elapsed()
                );
                Ok(value)
            }
            Ok(Ok(Err(error))) => {
                debug!(
                    "Operation '{}' failed after {:?}: {}",
                    self.operation,
                    start_time.elapsed(),
                    error
                );
                Err(error)
            }
            Ok(Err(join_error)) => {
                error!("Operation '{}' aborted: {}", self.operation, join_error);
                Err(Error::Other(format!(
                    "Operation {} aborted: {join_error}",
                    self.operation
                )))
            }
            Err(_) => {
                warn!(
                    "Operation '{}' timed out after {:?}, abandoning in-flight call",
                    self.operation, self.timeout
                );
                Err(Error::Timeout {
                    operation: self.operation.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

/// Await a future that borrows request state, in place, under a deadline.
///
/// Unlike [`CallEnvelope::call`] the future is dropped when the deadline elapses.
pub async fn within<F, T>(operation: &str, duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Operation '{}' timed out after {:?}", operation, duration);
            Err(Error::Timeout {
                operation: operation.to_string(),
                timeout: duration,
            })
        }
    }
}
