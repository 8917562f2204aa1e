//! Hashing Helpers
//!
//! SHA-256 wrappers shared by crash point derivation and round commitments.

use sha2::{Sha256, Digest};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Compute a simple hash of arbitrary data.
pub fn hash_bytes(data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Big-endian u32 from the first four digest bytes.
///
/// Equivalent to parsing the first eight hex characters of the digest.
#[inline]
pub fn leading_u32(hash: &StateHash) -> u32 {
    u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]])
}

/// Lowercase hex rendering.
pub fn to_hex(hash: &StateHash) -> String {
    hex::encode(hash)
}

/// Parse a 64-character hex digest.
pub fn from_hex(s: &str) -> Option<StateHash> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}
