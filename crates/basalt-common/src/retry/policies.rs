use rand::Rng;

use super::Backoff;

/// Jittered exponential backoff: `wait = base * min(cap, 2^attempt) + uniform(0, wait/4)`,
/// matching the chain adapter contract's retry policy (spec §4.7).
#[derive(Clone, Copy, Debug)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    cap_multiplier: u64,
}

impl ExponentialBackoff {
    pub fn new(base_delay_ms: u64, cap_multiplier: u64) -> Self {
        Self {
            base_delay_ms,
            cap_multiplier,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 250,
            cap_multiplier: 8,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    fn delay_for_attempt_ms(&self, attempt: u32) -> u64 {
        let pow = 1u64 << attempt.min(self.cap_multiplier.trailing_zeros().max(3));
        let multiplier = pow.min(self.cap_multiplier);
        let wait = self.base_delay_ms.saturating_mul(multiplier);
        let jitter = rand::thread_rng().gen_range(0..=(wait / 4).max(1));
        wait + jitter
    }
}

/// Fixed-point multiplicative backoff (no jitter), kept for components that
/// want deterministic delays in tests.
#[derive(Clone, Copy, Debug)]
pub struct LinearBackoff {
    base_delay_ms: u64,
    multiplier: u64,
    multiplier_base: u64,
}

impl LinearBackoff {
    pub fn new(base_delay_ms: u64, multiplier: u64, multiplier_base: u64) -> Self {
        assert!(multiplier_base != 0);
        Self {
            base_delay_ms,
            multiplier,
            multiplier_base,
        }
    }
}

impl Backoff for LinearBackoff {
    fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    fn delay_for_attempt_ms(&self, attempt: u32) -> u64 {
        let mut delay = self.base_delay_ms;
        for _ in 0..attempt {
            delay = delay * self.multiplier / self.multiplier_base;
        }
        delay
    }
}
