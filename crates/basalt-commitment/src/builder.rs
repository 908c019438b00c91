//! Anchor commitment builder (spec §4.4): turns an [`L2StateSnapshot`] into
//! a deterministic [`AnchorCommitment`], and verifies one against a
//! snapshot.

use basalt_primitives::Digest;

use crate::canonical::canonicalize;
use crate::snapshot::L2StateSnapshot;

#[derive(Clone, Debug, PartialEq)]
pub struct AnchorCommitment {
    pub l2_state_root: Digest,
    pub timestamp_ms: u64,
    pub recovery_metadata: Vec<u8>,
    pub payload: Vec<u8>,
    pub hash: Digest,
}

/// `sha256(canonical_encoding(snapshot))` (spec §3 "L2 snapshot").
pub fn compute_state_root(snapshot: &L2StateSnapshot) -> Digest {
    basalt_crypto::sha256(canonicalize(snapshot).as_bytes())
}

fn build_payload(l2_state_root: &Digest, timestamp_ms: u64, recovery_metadata: &[u8]) -> Vec<u8> {
    format!(
        "ANCHOR|v1|{}|{}|{}",
        l2_state_root.to_hex(),
        timestamp_ms,
        hex::encode(recovery_metadata),
    )
    .into_bytes()
}

pub fn build_anchor_commitment(snapshot: &L2StateSnapshot) -> AnchorCommitment {
    let l2_state_root = compute_state_root(snapshot);
    let payload = build_payload(&l2_state_root, snapshot.timestamp_ms, &snapshot.recovery_metadata);
    let hash = basalt_crypto::sha256(&payload);
    AnchorCommitment {
        l2_state_root,
        timestamp_ms: snapshot.timestamp_ms,
        recovery_metadata: snapshot.recovery_metadata.clone(),
        payload,
        hash,
    }
}

/// Recomputes `l2_state_root` and `sha256(payload)` from `snapshot` and
/// compares both against `commitment`. Either mismatch is a hard failure
/// (spec §4.4 "Validation").
pub fn validate_anchor(commitment: &AnchorCommitment, snapshot: &L2StateSnapshot) -> bool {
    let expected_root = compute_state_root(snapshot);
    if expected_root != commitment.l2_state_root {
        return false;
    }
    let expected_payload = build_payload(&expected_root, commitment.timestamp_ms, &commitment.recovery_metadata);
    let expected_hash = basalt_crypto::sha256(&expected_payload);
    expected_hash == commitment.hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::BalanceEntry;

    fn snapshot() -> L2StateSnapshot {
        L2StateSnapshot {
            balances: vec![
                BalanceEntry { peer_id: "p1".into(), balance: 5 },
                BalanceEntry { peer_id: "p2".into(), balance: 10 },
            ],
            timestamp_ms: 12_345,
            ..Default::default()
        }
    }

    /// Scenario S4.
    #[test]
    fn commitment_is_a_pure_function_of_sorted_canonical_form() {
        let mut shuffled = snapshot();
        shuffled.balances.reverse();

        let c1 = build_anchor_commitment(&snapshot());
        let c2 = build_anchor_commitment(&shuffled);
        assert_eq!(c1.l2_state_root, c2.l2_state_root);
        assert_eq!(c1.hash, c2.hash);

        let mut changed = snapshot();
        changed.balances[1].balance = 11;
        let c3 = build_anchor_commitment(&changed);
        assert_ne!(c1.l2_state_root, c3.l2_state_root);
    }

    /// Invariant 5: state-root round trip, and any byte change flips it.
    #[test]
    fn validate_anchor_round_trips_and_detects_tampering() {
        let snap = snapshot();
        let commitment = build_anchor_commitment(&snap);
        assert!(validate_anchor(&commitment, &snap));

        let mut tampered = snap.clone();
        tampered.balances[0].balance += 1;
        assert!(!validate_anchor(&commitment, &tampered));

        let mut tampered_commitment = commitment.clone();
        tampered_commitment.hash.0[0] ^= 1;
        assert!(!validate_anchor(&tampered_commitment, &snap));
    }
}
