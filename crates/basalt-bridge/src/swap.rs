//! Atomic swaps (HTLC) between a client and the federation.

use basalt_primitives::{Digest, PeerId};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq)]
pub struct AtomicSwap {
    pub swap_id: Digest,
    pub party_a: PeerId,
    pub party_b: PeerId,
    pub amount_a: u64,
    pub amount_b: u64,
    pub hash_lock: Digest,
    pub timelock: u64,
    pub claimed_a: bool,
    pub claimed_b: bool,
    pub refunded_a: bool,
    pub refunded_b: bool,
}

impl AtomicSwap {
    pub fn new(
        swap_id: Digest,
        party_a: PeerId,
        party_b: PeerId,
        amount_a: u64,
        amount_b: u64,
        hash_lock: Digest,
        timelock: u64,
    ) -> Self {
        Self {
            swap_id,
            party_a,
            party_b,
            amount_a,
            amount_b,
            hash_lock,
            timelock,
            claimed_a: false,
            claimed_b: false,
            refunded_a: false,
            refunded_b: false,
        }
    }

    fn is_party_a(&self, party: &PeerId) -> Option<bool> {
        if party == &self.party_a {
            Some(true)
        } else if party == &self.party_b {
            Some(false)
        } else {
            None
        }
    }

    /// `claim(party, secret)` requires `sha256(secret) == hash_lock` and
    /// `now < timelock`; marks the claiming side. Invariant 9: `claim` and
    /// `refund` for the same party cannot both succeed.
    pub fn claim(&mut self, party: &PeerId, secret: &[u8], now: u64) -> Result<(), SwapError> {
        let is_a = self.is_party_a(party).ok_or(SwapError::UnknownParty)?;
        if basalt_crypto::sha256(secret) != self.hash_lock {
            return Err(SwapError::BadSecret);
        }
        if now >= self.timelock {
            return Err(SwapError::TimelockExpired);
        }
        if is_a {
            if self.claimed_a || self.refunded_a {
                return Err(SwapError::AlreadySettled);
            }
            self.claimed_a = true;
        } else {
            if self.claimed_b || self.refunded_b {
                return Err(SwapError::AlreadySettled);
            }
            self.claimed_b = true;
        }
        Ok(())
    }

    /// `refund(party)` requires `now >= timelock` and that side not
    /// claimed/refunded.
    pub fn refund(&mut self, party: &PeerId, now: u64) -> Result<(), SwapError> {
        let is_a = self.is_party_a(party).ok_or(SwapError::UnknownParty)?;
        if now < self.timelock {
            return Err(SwapError::TimelockNotReached);
        }
        if is_a {
            if self.claimed_a || self.refunded_a {
                return Err(SwapError::AlreadySettled);
            }
            self.refunded_a = true;
        } else {
            if self.claimed_b || self.refunded_b {
                return Err(SwapError::AlreadySettled);
            }
            self.refunded_b = true;
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum SwapError {
    #[error("party is not part of this swap")]
    UnknownParty,
    #[error("secret does not hash to the hash lock")]
    BadSecret,
    #[error("timelock has already expired")]
    TimelockExpired,
    #[error("timelock has not been reached yet")]
    TimelockNotReached,
    #[error("this party's side is already claimed or refunded")]
    AlreadySettled,
}
