//! Pluggable authorization policy.
//!
//! A single policy is consulted uniformly at every operator-gated entry
//! point (collect, swap, initiate, settle, donate). Claims are not
//! operator-gated: the only check there is that the caller equals the
//! vault whose allocation is being claimed, and that comparison lives in
//! the ledger book, not here.

use std::collections::BTreeSet;

use liqr_types::AccountId;

/// Capability check consulted at operator-gated entry points.
pub trait AuthPolicy {
    /// Whether the caller holds the operator role.
    fn is_operator(&self, caller: &AccountId) -> bool;
}

/// Policy backed by an explicit set of operator identities.
#[derive(Clone, Debug, Default)]
pub struct OperatorSet {
    operators: BTreeSet<AccountId>,
}

impl OperatorSet {
    /// Create an empty set (nobody is an operator).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set from the given identities.
    pub fn with_operators(operators: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            operators: operators.into_iter().collect(),
        }
    }

    /// Grant the operator role to an identity.
    pub fn grant(&mut self, operator: AccountId) {
        self.operators.insert(operator);
    }

    /// Revoke the operator role from an identity.
    pub fn revoke(&mut self, operator: &AccountId) {
        self.operators.remove(operator);
    }
}

impl AuthPolicy for OperatorSet {
    fn is_operator(&self, caller: &AccountId) -> bool {
        self.operators.contains(caller)
    }
}

/// Policy that accepts every caller. Intended for tests and single-tenant
/// deployments where the embedding application does its own gating.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AuthPolicy for AllowAll {
    fn is_operator(&self, _caller: &AccountId) -> bool {
        true
    }
}
