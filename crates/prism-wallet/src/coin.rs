//! Spendable coins.

use prism_primitives::{Amount, OutPoint, Script};

/// A spendable transaction output with its confirmation metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub script_pubkey: Script,
    /// Height of the containing block.
    pub height: u32,
    /// Time of the containing block.
    pub time: u32,
    pub is_coinbase: bool,
    pub is_coinstake: bool,
}

impl Coin {
    /// Depth of this coin when the chain tip is at `tip_height`.
    pub fn depth(&self, tip_height: u32) -> u32 {
        tip_height.saturating_sub(self.height) + 1
    }

    /// Age in seconds at `now`.
    pub fn age(&self, now: i64) -> i64 {
        now - self.time as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_primitives::hash256;

    #[test]
    fn test_depth_and_age() {
        let coin = Coin {
            outpoint: OutPoint::new(hash256(b"tx"), 0),
            value: 100,
            script_pubkey: Script::new(),
            height: 10,
            time: 1000,
            is_coinbase: false,
            is_coinstake: false,
        };
        assert_eq!(coin.depth(10), 1);
        assert_eq!(coin.depth(19), 10);
        assert_eq!(coin.age(4600), 3600);
    }
}
