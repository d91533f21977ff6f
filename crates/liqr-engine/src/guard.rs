//! Global reentrancy guard.
//!
//! A single flag wraps every mutating entry point. It is acquired before
//! any state is read and held across every external callout to a vault
//! or exchange adapter, so a collaborator that calls back into the
//! engine during its own callback is rejected with
//! [`EngineError::ReentrancyDetected`] before anything is mutated.

use std::cell::Cell;

use crate::{EngineError, Result};

/// The engine's single mutual-exclusion flag.
#[derive(Debug, Default)]
pub(crate) struct ReentryGuard {
    entered: Cell<bool>,
}

impl ReentryGuard {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquire the guard, failing if it is already held.
    ///
    /// The returned permit releases the guard on drop, including on the
    /// error paths of the calling entry point.
    pub(crate) fn enter(&self) -> Result<EntryPermit<'_>> {
        if self.entered.get() {
            tracing::warn!("reentrant call rejected");
            return Err(EngineError::ReentrancyDetected);
        }
        self.entered.set(true);
        Ok(EntryPermit { guard: self })
    }
}

/// RAII release of the reentrancy guard.
pub(crate) struct EntryPermit<'a> {
    guard: &'a ReentryGuard,
}

impl Drop for EntryPermit<'_> {
    fn drop(&mut self) {
        self.guard.entered.set(false);
    }
}
