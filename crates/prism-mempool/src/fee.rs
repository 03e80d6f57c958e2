//! Fee rates.

use prism_primitives::Amount;
use std::fmt;

/// Fee rate in smallest units per 1000 virtual bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FeeRate {
    per_kvb: Amount,
}

impl FeeRate {
    pub fn from_per_kvb(per_kvb: Amount) -> Self {
        Self { per_kvb }
    }

    /// Rate implied by paying `fee` for `vsize` virtual bytes.
    pub fn from_fee(fee: Amount, vsize: u64) -> Self {
        if vsize == 0 {
            return Self { per_kvb: 0 };
        }
        Self {
            per_kvb: fee * 1000 / vsize as Amount,
        }
    }

    pub fn per_kvb(&self) -> Amount {
        self.per_kvb
    }

    /// Minimum fee for `vsize` virtual bytes at this rate, rounded up.
    pub fn fee(&self, vsize: u64) -> Amount {
        let mut fee = self.per_kvb * vsize as Amount / 1000;
        if fee == 0 && self.per_kvb > 0 {
            fee = self.per_kvb;
        }
        fee
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08}/kvB", self.per_kvb / 100_000_000, self.per_kvb % 100_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_scales_with_size() {
        let rate = FeeRate::from_per_kvb(1000);
        assert_eq!(rate.fee(1000), 1000);
        assert_eq!(rate.fee(250), 250);
        assert_eq!(rate.fee(2000), 2000);
    }

    #[test]
    fn test_nonzero_rate_never_rounds_to_free() {
        let rate = FeeRate::from_per_kvb(7);
        assert!(rate.fee(10) > 0);
    }

    #[test]
    fn test_from_fee() {
        let rate = FeeRate::from_fee(500, 250);
        assert_eq!(rate.per_kvb(), 2000);
    }
}
