//! Crypto primitives facade (spec §2): SHA-256, double-SHA-256, RIPEMD-160,
//! and hex encode/decode. Pure functions only — no key material, no
//! signing. Consumers that need Schnorr/ECDSA bring their own library.

use basalt_primitives::Digest;
use ripemd::Ripemd160;
use sha2::{Digest as _, Sha256};

/// `SHA-256(data)`.
pub fn sha256(data: &[u8]) -> Digest {
    let out = Sha256::digest(data);
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    Digest::from_bytes(buf)
}

/// `SHA-256(SHA-256(data))`, Bitcoin's standard double hash.
pub fn double_sha256(data: &[u8]) -> Digest {
    sha256(sha256(data).as_bytes())
}

/// `RIPEMD-160(data)`, returned as a 20-byte array (not a `Digest`, which is
/// fixed at 32 bytes).
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    let out = Ripemd160::digest(data);
    let mut buf = [0u8; 20];
    buf.copy_from_slice(&out);
    buf
}

/// Bitcoin's `HASH160`: `RIPEMD-160(SHA-256(data))`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(sha256(data).as_bytes())
}

pub fn to_hex(data: &[u8]) -> String {
    hex::encode(data)
}

pub fn from_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s)
}

/// `sha256`, hex-encoded — used throughout the commitment builder and
/// reorg detector, which work with hex strings at their boundaries.
pub fn sha256_hex(data: &[u8]) -> String {
    sha256(data).to_hex()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // sha256("") well-known test vector.
        let got = sha256(b"");
        assert_eq!(
            got.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn double_sha256_is_sha256_twice() {
        let once = sha256(b"hello");
        let twice = sha256(once.as_bytes());
        assert_eq!(double_sha256(b"hello"), twice);
    }

    #[test]
    fn hash160_matches_ripemd_of_sha256() {
        let expected = ripemd160(sha256(b"abc").as_bytes());
        assert_eq!(hash160(b"abc"), expected);
    }
}
