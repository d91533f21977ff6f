//! Typed operation summaries.
//!
//! Every mutating engine operation returns one of these reports; the same
//! fields are emitted as structured tracing events at the operation
//! boundary. Reports are plain data — callers that only care about the
//! side effects can discard them.

use serde::{Deserialize, Serialize};

use crate::{BatchNumber, OrderHandle, RewardPair, TokenId, VaultId};

/// One reward token collected from one vault.
///
/// A zero `amount` is valid: it records that the vault declared the
/// reward but held none of it at collection time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedReward {
    /// The reward token swept from the vault.
    pub reward: TokenId,
    /// The purchase token the vault resolved for this reward.
    pub purchase: TokenId,
    /// Amount of the reward token transferred to the ledger.
    pub amount: u64,
}

/// Per-vault slice of a collection run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultCollection {
    /// The contributing vault.
    pub vault: VaultId,
    /// Every declared reward of the vault, in declaration order.
    pub collected: Vec<CollectedReward>,
}

/// Summary of one `collect` call across all passed vaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub vaults: Vec<VaultCollection>,
}

impl CollectionReport {
    /// Total amount collected across all vaults for one pair.
    pub fn total_for(&self, pair: &RewardPair) -> u64 {
        self.vaults
            .iter()
            .flat_map(|v| v.collected.iter())
            .filter(|c| c.reward == pair.reward && c.purchase == pair.purchase)
            .map(|c| c.amount)
            .sum()
    }
}

/// Summary of a finalized batch, produced by both the synchronous swap
/// and the asynchronous settle path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReport {
    /// The pair that was finalized.
    pub pair: RewardPair,
    /// The batch number that was closed by this finalization.
    pub batch: BatchNumber,
    /// Total reward amount converted.
    pub reward_in: u64,
    /// Total purchase amount realized.
    pub purchase_out: u64,
    /// Floor-rounding residue retained by the ledger for this batch.
    pub dust: u64,
}

/// Summary of an `initiate` call on the asynchronous path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateReport {
    /// The pair the order covers.
    pub pair: RewardPair,
    /// Opaque handle returned by the order venue.
    pub handle: OrderHandle,
    /// Pending reward amount the order was placed for.
    pub amount: u64,
    /// Whether reward custody moved to the venue during this call.
    pub funds_moved: bool,
}

/// Summary of a single pull-claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReport {
    pub pair: RewardPair,
    pub batch: BatchNumber,
    /// The vault the allocation was paid to (equals the caller).
    pub vault: VaultId,
    /// Purchase-token amount transferred.
    pub amount: u64,
}

/// Summary of one push-donation call.
///
/// `amounts` is parallel to the triple arrays of the call; zero entries
/// mark triples that had nothing left to distribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationReport {
    pub amounts: Vec<u64>,
}

impl DonationReport {
    /// Total purchase amount paid out by the call.
    pub fn total(&self) -> u64 {
        self.amounts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_report_total_for() {
        let pair = RewardPair::new([0x01; 32], [0x02; 32]);
        let other = RewardPair::new([0x03; 32], [0x02; 32]);
        let report = CollectionReport {
            vaults: vec![
                VaultCollection {
                    vault: [0xA0; 32],
                    collected: vec![
                        CollectedReward { reward: pair.reward, purchase: pair.purchase, amount: 100 },
                        CollectedReward { reward: other.reward, purchase: other.purchase, amount: 7 },
                    ],
                },
                VaultCollection {
                    vault: [0xA1; 32],
                    collected: vec![CollectedReward {
                        reward: pair.reward,
                        purchase: pair.purchase,
                        amount: 250,
                    }],
                },
            ],
        };
        assert_eq!(report.total_for(&pair), 350);
        assert_eq!(report.total_for(&other), 7);
    }

    #[test]
    fn test_donation_report_total() {
        let report = DonationReport { amounts: vec![0, 40, 0, 2] };
        assert_eq!(report.total(), 42);
    }
}
