//! SPV merkle-proof verification: proves a transaction's inclusion in an
//! 80-byte Bitcoin block header without downloading the full block.

/// A client-submitted inclusion proof: the raw transaction, the sibling
/// hashes on the path to the root, and the 80-byte header that should
/// contain that root at bytes 36..68.
#[derive(Clone, Debug, PartialEq)]
pub struct SpvProof {
    pub tx_bytes: Vec<u8>,
    pub merkle_path: Vec<[u8; 32]>,
    pub block_header: [u8; 80],
}

/// Recomputes the merkle root by folding `double_sha256` over `tx_bytes`
/// and each sibling in `merkle_path`, ordering each pair canonically by
/// byte comparison before hashing (so the proof need not encode
/// left/right position), and compares it against the root embedded at
/// `block_header[36..68]`.
pub fn spv_verify(proof: &SpvProof) -> bool {
    let mut current = *basalt_crypto::double_sha256(&proof.tx_bytes).as_bytes();

    for sibling in &proof.merkle_path {
        let (a, b) = if current.as_slice() <= sibling.as_slice() {
            (current, *sibling)
        } else {
            (*sibling, current)
        };
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&a);
        buf[32..].copy_from_slice(&b);
        current = *basalt_crypto::double_sha256(&buf).as_bytes();
    }

    current.as_slice() == &proof.block_header[36..68]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with_root(root: [u8; 32]) -> [u8; 80] {
        let mut header = [0u8; 80];
        header[36..68].copy_from_slice(&root);
        header
    }

    fn build_proof(tx_bytes: &[u8], siblings: &[[u8; 32]]) -> SpvProof {
        let mut current = *basalt_crypto::double_sha256(tx_bytes).as_bytes();
        for sibling in siblings {
            let (a, b) = if current.as_slice() <= sibling.as_slice() {
                (current, *sibling)
            } else {
                (*sibling, current)
            };
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(&a);
            buf[32..].copy_from_slice(&b);
            current = *basalt_crypto::double_sha256(&buf).as_bytes();
        }
        SpvProof {
            tx_bytes: tx_bytes.to_vec(),
            merkle_path: siblings.to_vec(),
            block_header: header_with_root(current),
        }
    }

    /// Invariant 7: a valid path verifies.
    #[test]
    fn valid_path_verifies() {
        let siblings = [[1u8; 32], [2u8; 32]];
        let proof = build_proof(b"tx-bytes", &siblings);
        assert!(spv_verify(&proof));
    }

    /// Invariant 7: flipping any bit of a sibling, the tx, or the header's
    /// merkle-root bytes returns false.
    #[test]
    fn tampering_any_component_breaks_verification() {
        let siblings = [[1u8; 32], [2u8; 32]];
        let proof = build_proof(b"tx-bytes", &siblings);

        let mut bad_tx = proof.clone();
        bad_tx.tx_bytes[0] ^= 1;
        assert!(!spv_verify(&bad_tx));

        let mut bad_sibling = proof.clone();
        bad_sibling.merkle_path[0][0] ^= 1;
        assert!(!spv_verify(&bad_sibling));

        let mut bad_header = proof.clone();
        bad_header.block_header[36] ^= 1;
        assert!(!spv_verify(&bad_header));
    }

    #[test]
    fn empty_path_requires_tx_hash_to_equal_root() {
        let proof = build_proof(b"solo-tx", &[]);
        assert!(spv_verify(&proof));
    }
}
