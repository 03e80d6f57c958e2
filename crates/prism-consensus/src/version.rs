//! Header version computation.

use crate::params::ConsensusParams;
use prism_primitives::Algo;

/// Base version of blocks produced before any mandatory upgrade.
pub const MIN_BLOCK_VERSION: i32 = 4;

/// Compute the version of a new block at `height` carrying `algo`.
///
/// The base version follows the mandatory upgrade schedule; the proof
/// algorithm is encoded in the tag bits (see [`Algo::from_version`]).
pub fn compute_block_version(params: &ConsensusParams, height: u32, algo: Algo) -> i32 {
    let base = if height >= params.mandatory_upgrade_block[1] {
        params.upgrade_block_version[1]
    } else if height >= params.mandatory_upgrade_block[0] {
        params.upgrade_block_version[0]
    } else {
        MIN_BLOCK_VERSION
    };
    base.max(MIN_BLOCK_VERSION) | algo.version_bits()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ChainParams;

    #[test]
    fn test_version_follows_upgrade_schedule() {
        let c = ChainParams::main().consensus;
        let v0 = compute_block_version(&c, 0, Algo::PowSha256d);
        let v1 = compute_block_version(&c, c.mandatory_upgrade_block[0], Algo::PowSha256d);
        let v2 = compute_block_version(&c, c.mandatory_upgrade_block[1], Algo::PowSha256d);
        assert_eq!(v0 & !prism_primitives::ALGO_VERSION_MASK, MIN_BLOCK_VERSION);
        assert_eq!(v1 & !prism_primitives::ALGO_VERSION_MASK, 8);
        assert_eq!(v2 & !prism_primitives::ALGO_VERSION_MASK, 9);
    }

    #[test]
    fn test_algo_survives_roundtrip() {
        let c = ChainParams::main().consensus;
        for algo in [Algo::Pos, Algo::PowQuark, Algo::PowArgon2d] {
            let version = compute_block_version(&c, 2_000_000, algo);
            assert_eq!(Algo::from_version(version), algo);
        }
    }

    #[test]
    fn test_floor_applies_on_test_chains() {
        let c = ChainParams::testnet().consensus;
        // Upgrade versions are zero on test chains; the floor still applies.
        let version = compute_block_version(&c, 10, Algo::Pos);
        assert_eq!(version & !prism_primitives::ALGO_VERSION_MASK, MIN_BLOCK_VERSION);
    }
}
