//! The per-pair partitioned book and the shared finalize routine.
//!
//! The [`Book`] is the single source of truth. Both settlement paths
//! (synchronous swap and asynchronous settle) finalize a batch through
//! the one [`Book::finalize`] routine, so the conservation and
//! monotonic-batching invariants hold regardless of which path ran.
//!
//! ## Proportional split
//!
//! ```text
//! allocation = floor(contribution * purchase_out / total_reward_in)
//! ```
//!
//! computed with u128 intermediates. The per-batch floor residue accrues
//! to the pair's `dust` counter and stays in ledger custody.

use std::collections::BTreeMap;

use liqr_types::{BatchNumber, RewardPair, VaultId};

use crate::accumulator::PendingAccumulator;
use crate::batch::{Allocation, FinalizedBatch};
use crate::{LedgerError, Result};

/// All ledger state of a single pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PairBook {
    /// The currently open batch number.
    open_batch: BatchNumber,
    /// Contributions accumulating into the open batch.
    pending: PendingAccumulator,
    /// Finalized batches by batch number; never deleted.
    finalized: BTreeMap<BatchNumber, FinalizedBatch>,
    /// Per-vault push-donation watermark: first batch not yet covered.
    donated_through: BTreeMap<VaultId, BatchNumber>,
    /// Cumulative floor-rounding residue retained by the ledger.
    dust: u64,
}

/// Result of finalizing one batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FinalizeOutcome {
    /// The batch number that was closed.
    pub batch: BatchNumber,
    /// Total reward amount converted.
    pub reward_in: u64,
    /// Total purchase amount realized.
    pub purchase_out: u64,
    /// Floor residue of this batch.
    pub dust: u64,
}

/// The full ledger book, partitioned by pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Book {
    pairs: BTreeMap<RewardPair, PairBook>,
}

impl Book {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the pair was ever registered by a collection.
    pub fn contains(&self, pair: &RewardPair) -> bool {
        self.pairs.contains_key(pair)
    }

    /// Register a pair without contributing anything.
    ///
    /// Collections call this even for zero sweeps so that the pair
    /// becomes addressable by swap/initiate.
    pub fn register(&mut self, pair: RewardPair) {
        self.pairs.entry(pair).or_default();
    }

    /// Add a vault contribution to the pair's open batch.
    ///
    /// Registers the pair if needed. A zero amount registers only.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Overflow`] on accumulator overflow
    pub fn accumulate(&mut self, pair: RewardPair, vault: VaultId, amount: u64) -> Result<()> {
        self.pairs.entry(pair).or_default().pending.credit(vault, amount)
    }

    /// Finalize the pair's open batch at the realized purchase amount.
    ///
    /// Writes the proportional allocations into a new finalized batch,
    /// increments the open batch number by exactly one, and replaces the
    /// accumulator with an empty one. This is the only routine that
    /// closes a batch; both settlement paths go through it.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidPair`] if the pair was never registered
    /// - [`LedgerError::NoPendingRewards`] if the accumulator is empty
    /// - [`LedgerError::Overflow`] on arithmetic overflow
    pub fn finalize(&mut self, pair: &RewardPair, purchase_out: u64) -> Result<FinalizeOutcome> {
        let book = self
            .pairs
            .get_mut(pair)
            .ok_or(LedgerError::InvalidPair(*pair))?;

        let reward_in = book.pending.total();
        if reward_in == 0 {
            return Err(LedgerError::NoPendingRewards(*pair));
        }

        let mut allocations = BTreeMap::new();
        let mut allocated: u64 = 0;
        for (vault, contribution) in book.pending.contributors() {
            let share = (contribution as u128)
                .checked_mul(purchase_out as u128)
                .ok_or(LedgerError::Overflow)?
                / reward_in as u128;
            // share <= purchase_out because contribution <= reward_in
            let amount = u64::try_from(share).map_err(|_| LedgerError::Overflow)?;
            allocated = allocated.checked_add(amount).ok_or(LedgerError::Overflow)?;
            allocations.insert(
                *vault,
                Allocation {
                    amount,
                    distributed: false,
                },
            );
        }

        let dust = purchase_out
            .checked_sub(allocated)
            .ok_or(LedgerError::Overflow)?;
        book.dust = book.dust.checked_add(dust).ok_or(LedgerError::Overflow)?;

        let batch = book.open_batch;
        book.finalized
            .insert(batch, FinalizedBatch::new(reward_in, purchase_out, allocations));
        book.open_batch += 1;
        book.pending = PendingAccumulator::new();

        tracing::info!(
            pair = %pair,
            batch,
            reward_in,
            purchase_out,
            dust,
            "batch finalized"
        );

        Ok(FinalizeOutcome {
            batch,
            reward_in,
            purchase_out,
            dust,
        })
    }

    /// Pull-claim a vault's allocation from a finalized batch.
    ///
    /// Zeroes the allocation and returns the amount owed.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidBatch`] if `batch` is not below the pair's
    ///   open batch (unknown pairs have open batch 0)
    /// - [`LedgerError::NotSwapped`] if the vault has no recorded
    ///   allocation in the batch
    /// - [`LedgerError::AlreadyDonated`] if the allocation was previously
    ///   zeroed by a claim or donation
    pub fn claim(
        &mut self,
        pair: &RewardPair,
        batch: BatchNumber,
        vault: &VaultId,
    ) -> Result<u64> {
        let open = self.open_batch(pair);
        if batch >= open {
            return Err(LedgerError::InvalidBatch { batch, open });
        }

        // Batch numbers are contiguous below the open batch, so the entry
        // must exist once the bound check passed.
        let finalized = self
            .pairs
            .get_mut(pair)
            .and_then(|b| b.finalized.get_mut(&batch))
            .ok_or(LedgerError::InvalidBatch { batch, open })?;

        match finalized.allocation(vault) {
            None => Err(LedgerError::NotSwapped { batch }),
            Some(alloc) if alloc.distributed => Err(LedgerError::AlreadyDonated { batch }),
            Some(_) => Ok(finalized.mark_distributed(vault)),
        }
    }

    /// Sum of a vault's still-undistributed allocations from its donation
    /// watermark up to (excluding) the pair's open batch.
    pub fn donatable(&self, pair: &RewardPair, vault: &VaultId) -> u64 {
        let Some(book) = self.pairs.get(pair) else {
            return 0;
        };
        let from = book.donated_through.get(vault).copied().unwrap_or(0);
        book.finalized
            .range(from..book.open_batch)
            .map(|(_, b)| b.undistributed(vault))
            .sum()
    }

    /// Zero every donatable allocation of (pair, vault) and advance the
    /// vault's watermark past all batches just covered.
    ///
    /// Returns the amount paid out, which may be zero; an all-zero donate
    /// call is rejected by the caller, not here.
    pub fn take_donatable(&mut self, pair: &RewardPair, vault: &VaultId) -> u64 {
        let Some(book) = self.pairs.get_mut(pair) else {
            return 0;
        };
        let from = book.donated_through.get(vault).copied().unwrap_or(0);
        let open = book.open_batch;

        let mut paid: u64 = 0;
        for (_, finalized) in book.finalized.range_mut(from..open) {
            // Undistributed sums never exceed the realized purchase total,
            // so this addition cannot overflow in practice; saturate to be
            // conservative rather than panic.
            paid = paid.saturating_add(finalized.mark_distributed(vault));
        }
        book.donated_through.insert(*vault, open);
        paid
    }

    /// The pair's current open batch number (0 for unknown pairs).
    pub fn open_batch(&self, pair: &RewardPair) -> BatchNumber {
        self.pairs.get(pair).map(|b| b.open_batch).unwrap_or(0)
    }

    /// Total pending reward amount of the pair's open batch.
    pub fn pending_total(&self, pair: &RewardPair) -> u64 {
        self.pairs.get(pair).map(|b| b.pending.total()).unwrap_or(0)
    }

    /// A single vault's pending contribution in the open batch.
    pub fn pending_contribution(&self, pair: &RewardPair, vault: &VaultId) -> u64 {
        self.pairs
            .get(pair)
            .map(|b| b.pending.contribution(vault))
            .unwrap_or(0)
    }

    /// Snapshot of a finalized batch.
    pub fn finalized(&self, pair: &RewardPair, batch: BatchNumber) -> Option<&FinalizedBatch> {
        self.pairs.get(pair).and_then(|b| b.finalized.get(&batch))
    }

    /// A vault's allocation in a finalized batch, if any.
    pub fn allocation(
        &self,
        pair: &RewardPair,
        batch: BatchNumber,
        vault: &VaultId,
    ) -> Option<Allocation> {
        self.finalized(pair, batch).and_then(|b| b.allocation(vault))
    }

    /// A vault's donation watermark for the pair.
    pub fn donated_through(&self, pair: &RewardPair, vault: &VaultId) -> BatchNumber {
        self.pairs
            .get(pair)
            .and_then(|b| b.donated_through.get(vault).copied())
            .unwrap_or(0)
    }

    /// Cumulative floor residue retained for the pair.
    pub fn dust(&self, pair: &RewardPair) -> u64 {
        self.pairs.get(pair).map(|b| b.dust).unwrap_or(0)
    }
}
