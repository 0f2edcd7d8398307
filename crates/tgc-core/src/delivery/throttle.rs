use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Account-wide spacing between outbound comments.
///
/// The lock is held across the wait, so concurrent callers queue up and each
/// one measures its remaining time from the stamp left by the previous pass.
#[derive(Debug)]
pub struct AccountThrottle {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Default for AccountThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl AccountThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the next slot and stamp it.
    ///
    /// On cancellation nothing is stamped, so a later call still measures
    /// from the previous pass.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        let mut last = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.last.lock() => guard,
        };

        let Some(prev) = *last else {
            *last = Some(Instant::now());
            return Ok(());
        };

        let elapsed = prev.elapsed();
        if elapsed >= self.min_interval {
            *last = Some(Instant::now());
            return Ok(());
        }

        let remaining = self.min_interval - elapsed;
        tracing::info!(wait_secs = remaining.as_secs(), "account throttle delay before next comment");

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = sleep(remaining) => {
                *last = Some(Instant::now());
                Ok(())
            }
        }
    }
}
