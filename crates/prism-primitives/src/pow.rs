//! Proof-of-work algorithm tags and hash dispatch.
//!
//! The header's version field carries the algorithm tag in bits 11..14; all
//! decoding and dispatch happens here so no other module branches on the
//! algorithm set.

use crate::hash::{hash256, sha1d, Hash256};
use argon2::{Algorithm, Argon2, Params, Version};
use blake2::{Blake2b512, Digest};
use sha3::{Keccak512, Sha3_512};

/// Bit position of the algorithm tag inside the header version.
pub const ALGO_VERSION_SHIFT: u32 = 11;

/// Mask of the algorithm tag inside the header version.
pub const ALGO_VERSION_MASK: i32 = 0x7 << ALGO_VERSION_SHIFT;

/// Proof algorithm of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algo {
    Pos,
    PowSha256d,
    PowSha1d,
    PowQuark,
    PowScryptSq,
    PowArgon2d,
}

impl Algo {
    /// Number of algorithm tags (indexes the per-algorithm limit tables).
    pub const COUNT: usize = 6;

    pub fn index(self) -> usize {
        match self {
            Algo::Pos => 0,
            Algo::PowSha256d => 1,
            Algo::PowSha1d => 2,
            Algo::PowQuark => 3,
            Algo::PowScryptSq => 4,
            Algo::PowArgon2d => 5,
        }
    }

    /// Tag bits to OR into a header version.
    pub fn version_bits(self) -> i32 {
        (self.index() as i32) << ALGO_VERSION_SHIFT
    }

    /// Decode the tag from a header version. Unknown tags read as SHA256d so
    /// that version-bit experiments on other bits stay harmless.
    pub fn from_version(version: i32) -> Algo {
        match (version & ALGO_VERSION_MASK) >> ALGO_VERSION_SHIFT {
            0 => Algo::Pos,
            1 => Algo::PowSha256d,
            2 => Algo::PowSha1d,
            3 => Algo::PowQuark,
            4 => Algo::PowScryptSq,
            5 => Algo::PowArgon2d,
            _ => Algo::PowSha256d,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algo::Pos => "pos",
            Algo::PowSha256d => "sha256d",
            Algo::PowSha1d => "sha1d",
            Algo::PowQuark => "quark",
            Algo::PowScryptSq => "scrypt2",
            Algo::PowArgon2d => "argon2d",
        }
    }
}

/// Compute the proof hash of a serialized header under the given algorithm.
///
/// For proof-of-stake headers the proof lives in the kernel, not the header,
/// so the content hash is returned.
pub fn pow_hash(algo: Algo, header_bytes: &[u8]) -> Hash256 {
    match algo {
        Algo::Pos | Algo::PowSha256d => hash256(header_bytes),
        Algo::PowSha1d => sha1d(header_bytes),
        Algo::PowQuark => quark(header_bytes),
        Algo::PowScryptSq => scrypt_sq(header_bytes),
        Algo::PowArgon2d => argon2d(header_bytes),
    }
}

/// Quark-family chained 512-bit rounds, truncated to 256 bits.
fn quark(data: &[u8]) -> Hash256 {
    let r1 = Blake2b512::digest(data);
    let r2 = Keccak512::digest(r1);
    let r3 = Sha3_512::digest(r2);
    let r4 = Blake2b512::digest(r3);
    let mut out = [0u8; 32];
    out.copy_from_slice(&r4[..32]);
    Hash256(out)
}

/// Scrypt² proof hash: the header is both password and salt.
fn scrypt_sq(data: &[u8]) -> Hash256 {
    let params = scrypt::Params::new(10, 1, 1, 32).expect("static scrypt params");
    let mut out = [0u8; 32];
    scrypt::scrypt(data, data, &params, &mut out).expect("output length is fixed");
    Hash256(out)
}

/// Argon2d proof hash: the header is both password and salt.
fn argon2d(data: &[u8]) -> Hash256 {
    let params = Params::new(512, 1, 1, Some(32)).expect("static argon2 params");
    let ctx = Argon2::new(Algorithm::Argon2d, Version::V0x13, params);
    let mut out = [0u8; 32];
    // Salt shorter than 8 bytes is rejected; headers are always larger.
    ctx.hash_password_into(data, data, &mut out)
        .expect("output length is fixed");
    Hash256(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_roundtrip() {
        for algo in [
            Algo::Pos,
            Algo::PowSha256d,
            Algo::PowSha1d,
            Algo::PowQuark,
            Algo::PowScryptSq,
            Algo::PowArgon2d,
        ] {
            let version = 9 | algo.version_bits();
            assert_eq!(Algo::from_version(version), algo);
        }
    }

    #[test]
    fn test_tag_does_not_disturb_base_version() {
        let version = 9 | Algo::PowQuark.version_bits();
        assert_eq!(version & !ALGO_VERSION_MASK, 9);
    }

    #[test]
    fn test_dispatch_differs_per_algo() {
        let data = [7u8; 80];
        let sha = pow_hash(Algo::PowSha256d, &data);
        let sha1 = pow_hash(Algo::PowSha1d, &data);
        let quark = pow_hash(Algo::PowQuark, &data);
        assert_ne!(sha, sha1);
        assert_ne!(sha, quark);
        assert_ne!(sha1, quark);
    }

    #[test]
    fn test_sha1d_high_bytes_are_zero() {
        let h = pow_hash(Algo::PowSha1d, b"header");
        assert!(h.as_bytes()[20..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pos_uses_content_hash() {
        let data = [1u8; 80];
        assert_eq!(pow_hash(Algo::Pos, &data), hash256(&data));
    }
}
