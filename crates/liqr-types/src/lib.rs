//! # liqr-types
//!
//! Shared domain types used across the liqr workspace.
//!
//! The liquidation ledger partitions all state by [`RewardPair`]; every
//! other identifier is a 32-byte opaque value, rendered as hex for
//! display and logs.
//!
//! ## Modules
//!
//! - [`reports`] — Typed operation summaries returned by every engine
//!   entry point and mirrored into tracing events

pub mod reports;

use serde::{Deserialize, Serialize};

/// Common type aliases.
pub type TokenId = [u8; 32];
pub type VaultId = [u8; 32];
pub type AccountId = [u8; 32];
pub type OrderHandle = [u8; 32];
pub type BatchNumber = u64;

/// A (reward token, purchase token) conversion pair.
///
/// Every accumulator, finalized batch, and in-flight order is keyed by
/// its pair; state for distinct pairs is fully disjoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RewardPair {
    /// The yield/incentive token harvested from vaults.
    pub reward: TokenId,
    /// The token the reward is converted into before redistribution.
    pub purchase: TokenId,
}

impl RewardPair {
    /// Create a pair from its two token identifiers.
    pub fn new(reward: TokenId, purchase: TokenId) -> Self {
        Self { reward, purchase }
    }
}

impl std::fmt::Display for RewardPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}->{}",
            hex::encode(&self.reward[..4]),
            hex::encode(&self.purchase[..4])
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_ordering_is_total() {
        let a = RewardPair::new([0x01; 32], [0x02; 32]);
        let b = RewardPair::new([0x01; 32], [0x03; 32]);
        let c = RewardPair::new([0x02; 32], [0x01; 32]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_pair_display_truncates() {
        let pair = RewardPair::new([0xAA; 32], [0xBB; 32]);
        assert_eq!(pair.to_string(), "aaaaaaaa->bbbbbbbb");
    }

    #[test]
    fn test_pair_serde_roundtrip() {
        let pair = RewardPair::new([0x11; 32], [0x22; 32]);
        let json = serde_json::to_string(&pair).expect("serialize");
        let back: RewardPair = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(pair, back);
    }
}
