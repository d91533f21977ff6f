//! Open-batch contribution accumulator.
//!
//! One accumulator exists per pair, for the currently open batch only.
//! It records the total reward amount collected and the per-vault
//! contribution map; finalization consumes it and opens a fresh one.

use std::collections::BTreeMap;

use liqr_types::VaultId;

use crate::{LedgerError, Result};

/// Pending contributions of a pair's open batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PendingAccumulator {
    total: u64,
    contributions: BTreeMap<VaultId, u64>,
}

impl PendingAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vault contribution.
    ///
    /// A zero amount is a no-op that still succeeds; zero collections are
    /// valid and leave no trace in the contribution map.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Overflow`] if the vault's contribution or the
    ///   accumulator total would overflow
    pub fn credit(&mut self, vault: VaultId, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        // Check the total first: a vault entry can never exceed the total,
        // so this leaves the map untouched on overflow.
        let new_total = self.total.checked_add(amount).ok_or(LedgerError::Overflow)?;
        let entry = self.contributions.entry(vault).or_insert(0);
        *entry = entry.checked_add(amount).ok_or(LedgerError::Overflow)?;
        self.total = new_total;

        tracing::trace!(
            vault = %hex_prefix(&vault),
            amount,
            total = self.total,
            "accumulator credited"
        );
        Ok(())
    }

    /// Total reward amount pending in this accumulator.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// A single vault's pending contribution (zero if absent).
    pub fn contribution(&self, vault: &VaultId) -> u64 {
        self.contributions.get(vault).copied().unwrap_or(0)
    }

    /// Iterate (vault, contribution) entries in vault order.
    pub fn contributors(&self) -> impl Iterator<Item = (&VaultId, u64)> {
        self.contributions.iter().map(|(v, a)| (v, *a))
    }

    /// Whether no contributions have been recorded.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

fn hex_prefix(id: &VaultId) -> String {
    id[..4].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VAULT_A: VaultId = [0x0A; 32];
    const VAULT_B: VaultId = [0x0B; 32];

    #[test]
    fn test_credit_accumulates_per_vault() {
        let mut acc = PendingAccumulator::new();
        acc.credit(VAULT_A, 100).expect("credit");
        acc.credit(VAULT_B, 200).expect("credit");
        acc.credit(VAULT_A, 50).expect("credit");

        assert_eq!(acc.total(), 350);
        assert_eq!(acc.contribution(&VAULT_A), 150);
        assert_eq!(acc.contribution(&VAULT_B), 200);
    }

    #[test]
    fn test_zero_credit_is_noop() {
        let mut acc = PendingAccumulator::new();
        acc.credit(VAULT_A, 0).expect("zero credit");
        assert!(acc.is_empty());
        assert_eq!(acc.contributors().count(), 0);
    }

    #[test]
    fn test_credit_overflow_rejected() {
        let mut acc = PendingAccumulator::new();
        acc.credit(VAULT_A, u64::MAX).expect("first credit");
        let result = acc.credit(VAULT_B, 1);
        assert!(matches!(result, Err(LedgerError::Overflow)));
    }

    #[test]
    fn test_unknown_vault_contribution_is_zero() {
        let acc = PendingAccumulator::new();
        assert_eq!(acc.contribution(&VAULT_A), 0);
    }
}
