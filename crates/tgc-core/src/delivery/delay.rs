//! Humanization timing: randomized pre-send delay and typing simulation.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30 * 60);

const TYPING_BASE: Duration = Duration::from_millis(700);
const TYPING_PER_CHAR: Duration = Duration::from_millis(70);
const TYPING_MAX: Duration = Duration::from_secs(7);

/// Draw a delay uniformly from `[min, max]`. A degenerate range yields `min`.
pub fn draw_delay<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let span = (max - min).as_millis() as u64;
    min + Duration::from_millis(rng.gen_range(0..=span))
}

/// How long a human would plausibly take to type `text`.
pub fn typing_duration(text: &str) -> Duration {
    let chars = text.chars().count() as u32;
    let d = TYPING_BASE + TYPING_PER_CHAR * chars;
    d.clamp(TYPING_BASE, TYPING_MAX)
}

/// Sleep for `d` unless `cancel` fires first.
pub async fn pause(d: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = sleep(d) => Ok(()),
    }
}
