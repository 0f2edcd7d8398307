use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    generation::{CommentGenerator, CommentRequest},
    Error, Result,
};

/// Bounded retry with a fixed pause between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Both the call and the pause observe `cancel`.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let res = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                res = op() => res,
            };

            match res {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "generation attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = sleep(self.backoff) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Applies a [`RetryPolicy`] around any [`CommentGenerator`].
#[derive(Clone)]
pub struct RetryingGenerator {
    inner: Arc<dyn CommentGenerator>,
    policy: RetryPolicy,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn CommentGenerator>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub async fn generate(&self, req: &CommentRequest, cancel: &CancellationToken) -> Result<String> {
        self.policy
            .run(cancel, || self.inner.generate(req))
            .await
    }
}
