//! # liqr-ledger
//!
//! Pure multi-party accounting core of the liquidation ledger.
//!
//! All state is partitioned by [`RewardPair`](liqr_types::RewardPair):
//! each pair has exactly one open batch accumulating vault contributions,
//! a map of finalized batches holding per-vault allocations, and a
//! per-vault donation watermark. The crate performs no external callouts;
//! every mutation either completes or returns an error with no state
//! change, which is what lets the engine crate stay transactional.
//!
//! ## Modules
//!
//! - [`accumulator`] — Open-batch contribution accumulator
//! - [`batch`] — Finalized batches and per-vault allocations
//! - [`book`] — The per-pair partitioned book and the shared finalize
//!   routine used by both settlement paths

pub mod accumulator;
pub mod batch;
pub mod book;

use liqr_types::{BatchNumber, RewardPair};

/// Error types for ledger accounting operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The batch number does not refer to a finalized batch.
    #[error("batch {batch} is not finalized for this pair (open batch is {open})")]
    InvalidBatch {
        /// The requested batch number.
        batch: BatchNumber,
        /// The pair's current open batch number.
        open: BatchNumber,
    },

    /// The pair was never registered by a collection.
    #[error("pair {0} has never been registered")]
    InvalidPair(RewardPair),

    /// The pair's open accumulator holds no rewards.
    #[error("no pending rewards for pair {0}")]
    NoPendingRewards(RewardPair),

    /// The vault has no recorded allocation in the batch.
    #[error("no allocation was swapped for this vault in batch {batch}")]
    NotSwapped {
        /// The finalized batch that was queried.
        batch: BatchNumber,
    },

    /// The allocation was already zeroed by a claim or a donation.
    #[error("allocation in batch {batch} was already distributed")]
    AlreadyDonated {
        /// The finalized batch that was queried.
        batch: BatchNumber,
    },

    /// No un-distributed allocation exists for any requested triple.
    #[error("nothing to donate")]
    NothingToDonate,

    /// Arithmetic overflow in an accounting calculation.
    #[error("arithmetic overflow")]
    Overflow,
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
