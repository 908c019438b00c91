//! Shared identifiers, digests, and value types used across every crate in
//! the workspace. Keeping these in one leaf crate is what lets the ledger,
//! reorg detector, bridge, and orchestrator talk about the same task id or
//! anchor hash without depending on each other.

pub mod adapter_types;
pub mod digest;
pub mod errors;
pub mod ids;

pub use adapter_types::*;
pub use digest::{AnchorHash, Digest, DigestParseError, PegId, TaskId};
pub use errors::CoreError;
pub use ids::{PeerId, SignerId};
