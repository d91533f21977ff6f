//! # liqr-engine
//!
//! The liquidation coordinator: owns the accounting book plus token
//! custody, guards every entry point with a single global reentrancy
//! lock, and drives the two settlement paths and both distribution
//! styles.
//!
//! The engine is an explicitly constructed component — build one with
//! [`LedgerEngine::builder`], handing it the exchange adapters and the
//! authorization policy. Multiple independent engines can coexist; there
//! is no ambient state.
//!
//! Entry points take `&self` and keep state in `RefCell`s so that
//! collaborators holding an `Rc` of the engine can genuinely attempt
//! re-entry; the guard rejects such calls before any state is touched.
//!
//! ## Modules
//!
//! - [`auth`] — Pluggable authorization policy
//! - [`custody`] — Token custody balances held by the engine
//! - [`traits`] — Collaborator interfaces (vaults, exchange adapters)
//! - [`engine`] — The coordinator and all its entry points

pub mod auth;
pub mod custody;
pub mod engine;
pub(crate) mod guard;
pub mod traits;

pub use engine::{EngineBuilder, EngineSnapshot, LedgerEngine};

use liqr_ledger::LedgerError;

/// Error types surfaced at the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An accounting-level failure from the ledger book.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The caller does not hold the operator role.
    #[error("caller is not authorized as an operator")]
    NotAuthorized,

    /// A collaborator attempted to re-enter a mutating entry point
    /// during its own callback.
    #[error("reentrant call rejected")]
    ReentrancyDetected,

    /// The exchange realized less than the requested minimum output.
    #[error("insufficient output: realized {realized} below minimum {min}")]
    InsufficientOutput {
        /// The caller's minimum acceptable purchase amount.
        min: u64,
        /// The amount the adapter actually realized.
        realized: u64,
    },

    /// Array arguments are malformed (unequal lengths or empty).
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The engine's custody does not cover a requested transfer.
    #[error("insufficient custody: have {available}, need {required}")]
    InsufficientCustody {
        /// Balance currently held for the token.
        available: u64,
        /// Amount the transfer required.
        required: u64,
    },

    /// A vault or exchange adapter reported a failure.
    #[error("adapter failure: {0}")]
    Adapter(String),

    /// Arithmetic overflow in custody bookkeeping.
    #[error("arithmetic overflow")]
    Overflow,
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
