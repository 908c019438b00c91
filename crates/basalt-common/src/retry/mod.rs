//! Retry with backoff, adapted from the teacher's
//! `crates/common/src/retry/{mod.rs,policies.rs}`. Used by the chain
//! adapter contract (spec §4.7) for every remote call, and anywhere else a
//! transient error (spec §7) should be retried locally before surfacing.

use std::{thread::sleep, time::Duration};

use tracing::{error, warn};

pub mod policies;

pub trait Backoff {
    fn base_delay_ms(&self) -> u64;
    fn delay_for_attempt_ms(&self, attempt: u32) -> u64;
}

/// Runs `operation`, retrying up to `max_attempts` times (the first call
/// counts as attempt 0) with delays from `backoff`. Logs a warning on each
/// failed attempt and an error once attempts are exhausted.
pub fn retry_with_backoff<R, E, F>(name: &str, max_attempts: u32, backoff: &impl Backoff, operation: F) -> Result<R, E>
where
    F: FnMut() -> Result<R, E>,
    E: std::fmt::Debug,
{
    retry_with_backoff_inner(name, max_attempts, backoff, operation, sleep)
}

fn retry_with_backoff_inner<R, E, F, S>(
    name: &str,
    max_attempts: u32,
    backoff: &impl Backoff,
    mut operation: F,
    mut sleep_fn: S,
) -> Result<R, E>
where
    F: FnMut() -> Result<R, E>,
    E: std::fmt::Debug,
    S: FnMut(Duration),
{
    for attempt in 0..max_attempts {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < max_attempts => {
                let delay = backoff.delay_for_attempt_ms(attempt);
                warn!(attempt, ?err, name, delay_ms = delay, "attempt failed, retrying");
                sleep_fn(Duration::from_millis(delay));
            }
            Err(err) => {
                error!(name, ?err, "retries exhausted");
                return Err(err);
            }
        }
    }
    unreachable!("max_attempts must be >= 1")
}
