//! Retry delay policy.

use std::time::Duration;

use crate::{Backoff, BackoffKind};

/// Delay used when a job carries a backoff kind this queue does not recognize
pub const DEFAULT_BACKOFF_DELAY: Duration = Duration::from_millis(2000);

/// Compute the delay before re-dispatching a job that has made `attempts` attempts.
///
/// `attempts` is the post-increment count, so the retry after the first
/// attempt waits exactly the base delay. Exponential delays are not capped;
/// the multiplier saturates instead of overflowing.
pub fn compute_backoff(backoff: &Backoff, attempts: u32) -> Duration {
    match backoff.kind {
        BackoffKind::Exponential => {
            let exponent = attempts.saturating_sub(1);
            let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
            backoff.base_delay.saturating_mul(factor)
        }
        BackoffKind::Fixed => backoff.base_delay,
        BackoffKind::Unknown => DEFAULT_BACKOFF_DELAY,
    }
}
