//! Finalized batches and per-vault allocations.
//!
//! A finalized batch is created once by the shared finalize routine and
//! afterwards only ever mutated by zeroing individual vault allocations
//! during distribution. Batches are retained forever so historical claims
//! can be audited and replayed.

use std::collections::BTreeMap;

use liqr_types::VaultId;

/// A vault's share of a finalized batch, pending distribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Allocation {
    /// Purchase-token amount still owed to the vault (zero once paid).
    pub amount: u64,
    /// Whether the allocation was already claimed or donated.
    pub distributed: bool,
}

/// One closed collect→swap cycle of a pair.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FinalizedBatch {
    /// Total reward amount converted in this batch.
    pub reward_in: u64,
    /// Total purchase amount the conversion realized.
    pub purchase_out: u64,
    allocations: BTreeMap<VaultId, Allocation>,
}

impl FinalizedBatch {
    /// Build a batch from the proportional split results.
    ///
    /// Only vaults with a non-zero contribution appear in the map.
    pub fn new(
        reward_in: u64,
        purchase_out: u64,
        allocations: BTreeMap<VaultId, Allocation>,
    ) -> Self {
        Self {
            reward_in,
            purchase_out,
            allocations,
        }
    }

    /// Look up a vault's allocation, distributed or not.
    pub fn allocation(&self, vault: &VaultId) -> Option<Allocation> {
        self.allocations.get(vault).copied()
    }

    /// A vault's still-undistributed amount (zero if absent or paid).
    pub fn undistributed(&self, vault: &VaultId) -> u64 {
        match self.allocations.get(vault) {
            Some(alloc) if !alloc.distributed => alloc.amount,
            _ => 0,
        }
    }

    /// Zero a vault's allocation and mark it distributed.
    ///
    /// Returns the amount that was owed. Returns zero without changing
    /// anything if the vault is absent or already distributed; callers
    /// decide whether that is an error.
    pub fn mark_distributed(&mut self, vault: &VaultId) -> u64 {
        match self.allocations.get_mut(vault) {
            Some(alloc) if !alloc.distributed => {
                let amount = alloc.amount;
                alloc.amount = 0;
                alloc.distributed = true;
                amount
            }
            _ => 0,
        }
    }

    /// Sum of all still-undistributed allocations.
    pub fn undistributed_total(&self) -> u64 {
        self.allocations
            .values()
            .filter(|a| !a.distributed)
            .map(|a| a.amount)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VAULT_A: VaultId = [0x0A; 32];
    const VAULT_B: VaultId = [0x0B; 32];

    fn two_vault_batch() -> FinalizedBatch {
        let mut allocations = BTreeMap::new();
        allocations.insert(VAULT_A, Allocation { amount: 200, distributed: false });
        allocations.insert(VAULT_B, Allocation { amount: 400, distributed: false });
        FinalizedBatch::new(300, 600, allocations)
    }

    #[test]
    fn test_mark_distributed_zeroes_once() {
        let mut batch = two_vault_batch();
        assert_eq!(batch.mark_distributed(&VAULT_A), 200);
        assert_eq!(batch.mark_distributed(&VAULT_A), 0);

        let alloc = batch.allocation(&VAULT_A).expect("allocation exists");
        assert_eq!(alloc.amount, 0);
        assert!(alloc.distributed);
    }

    #[test]
    fn test_undistributed_total_tracks_payouts() {
        let mut batch = two_vault_batch();
        assert_eq!(batch.undistributed_total(), 600);
        batch.mark_distributed(&VAULT_B);
        assert_eq!(batch.undistributed_total(), 200);
        assert_eq!(batch.undistributed(&VAULT_B), 0);
    }

    #[test]
    fn test_absent_vault_has_no_allocation() {
        let mut batch = two_vault_batch();
        let stranger: VaultId = [0xFF; 32];
        assert!(batch.allocation(&stranger).is_none());
        assert_eq!(batch.mark_distributed(&stranger), 0);
    }
}
