//! Hash newtypes and digest functions.
//!
//! `Hash256` stores bytes in the serialization order (little-endian when read
//! as a 256-bit integer) and displays byte-reversed hex, matching the
//! convention used for block and transaction ids everywhere else in the
//! protocol.

use num_bigint::BigUint;
use ripemd::Ripemd160;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A 256-bit hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero hash.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Wrap raw bytes (serialization order).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }

    /// Raw bytes in serialization order.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// The hash interpreted as an unsigned 256-bit little-endian integer.
    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_le(&self.0)
    }

    /// Build a hash from an integer value, truncated to 256 bits.
    pub fn from_biguint(value: &BigUint) -> Self {
        let mut bytes = [0u8; 32];
        let le = value.to_bytes_le();
        let n = le.len().min(32);
        bytes[..n].copy_from_slice(&le[..n]);
        Hash256(bytes)
    }

    /// Low 64 bits of the little-endian integer interpretation.
    pub fn low_u64(&self) -> u64 {
        u64::from_le_bytes(self.0[0..8].try_into().expect("8 bytes"))
    }

    /// 32-bit limb `i` (0 = least significant) of the integer interpretation.
    pub fn le_limb(&self, i: usize) -> u32 {
        u32::from_le_bytes(self.0[i * 4..i * 4 + 4].try_into().expect("4 bytes"))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "{}", hex::encode(reversed))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self)
    }
}

impl FromStr for Hash256 {
    type Err = hex::FromHexError;

    /// Parse the display form (byte-reversed hex, optional `0x` prefix).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        bytes.reverse();
        Ok(Hash256(bytes))
    }
}

/// A 160-bit hash (key and script ids).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash160(pub [u8; 20]);

impl Hash160 {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Hash160(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// 32-bit limb `i` (0 = least significant) of the integer interpretation.
    pub fn le_limb(&self, i: usize) -> u32 {
        u32::from_le_bytes(self.0[i * 4..i * 4 + 4].try_into().expect("4 bytes"))
    }
}

impl fmt::Display for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "{}", hex::encode(reversed))
    }
}

impl fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash160({})", self)
    }
}

/// The node's primary content hash: double SHA-256.
pub fn hash256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    Hash256(second.into())
}

/// Double SHA-1, widened to 256 bits (low 20 bytes carry the digest).
pub fn sha1d(data: &[u8]) -> Hash256 {
    let first = Sha1::digest(data);
    let second = Sha1::digest(first);
    let mut bytes = [0u8; 32];
    bytes[..20].copy_from_slice(&second);
    Hash256(bytes)
}

/// RIPEMD-160 of SHA-256.
pub fn hash160(data: &[u8]) -> Hash160 {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    Hash160(ripe.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_byte_reversed() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let h = Hash256::from_bytes(bytes);
        let s = h.to_string();
        assert!(s.ends_with("ab"));
        assert!(s.starts_with("00"));
    }

    #[test]
    fn test_from_str_roundtrip() {
        let h = hash256(b"prism");
        let parsed: Hash256 = h.to_string().parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn test_biguint_is_little_endian() {
        let mut bytes = [0u8; 32];
        bytes[0] = 2;
        bytes[31] = 1;
        let h = Hash256::from_bytes(bytes);
        let n = h.to_biguint();
        assert_eq!(n, (BigUint::from(1u8) << 248) + BigUint::from(2u8));
        assert_eq!(Hash256::from_biguint(&n), h);
    }

    #[test]
    fn test_low_u64_and_limbs() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x01;
        bytes[8] = 0xff;
        let h = Hash256::from_bytes(bytes);
        assert_eq!(h.low_u64(), 1);
        assert_eq!(h.le_limb(2), 0xff);
    }

    #[test]
    fn test_hash256_known_vector() {
        // Double SHA-256 of the empty string.
        let h = hash256(b"");
        assert_eq!(
            h.to_string(),
            "56944c5d3f98413ef45cf54545538103cc9f298e0575820ad3591376e2e0f65d"
        );
    }

    #[test]
    fn test_hash160_width() {
        let h = hash160(b"key");
        assert_eq!(h.as_bytes().len(), 20);
    }
}
