//! Anchor commitment builder and canonical snapshot encoding (spec §4.4).
//! The canonical text form in [`canonical`] is reused verbatim by the
//! snapshot journal (`basalt-snapshot`), since both need the same
//! deterministic encoding of an [`L2StateSnapshot`].

pub mod builder;
pub mod canonical;
pub mod snapshot;

pub use builder::{build_anchor_commitment, compute_state_root, validate_anchor, AnchorCommitment};
pub use canonical::canonicalize;
pub use snapshot::{BalanceEntry, EscrowEntry, L2StateSnapshot, PegInEntry, PegOutEntry, TaskEntry};
