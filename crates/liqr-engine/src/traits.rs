//! Collaborator interfaces.
//!
//! Vaults and exchange adapters are untrusted external code: every call
//! through these traits happens under the global reentrancy guard, and
//! their results propagate [`EngineError`] so that a collaborator which
//! attempts re-entry surfaces the guard's rejection to the outer caller
//! unchanged.

use liqr_types::{OrderHandle, TokenId, VaultId};

use crate::Result;

/// A contributing vault.
///
/// The vault declares which reward tokens it harvests and which purchase
/// token each reward converts into; `collect_rewards` sweeps its held
/// reward balances into the engine's custody.
pub trait Vault {
    /// The vault's identity, used as its key in every allocation map.
    fn id(&self) -> VaultId;

    /// The reward tokens this vault can contribute.
    fn reward_tokens(&self) -> Vec<TokenId>;

    /// The purchase token the given reward converts into.
    fn donate_token(&self, reward: &TokenId) -> TokenId;

    /// Transfer all currently held reward balances to the caller.
    ///
    /// Returns the per-token amounts actually transferred; tokens absent
    /// from the result were held at zero balance.
    fn collect_rewards(&mut self) -> Result<Vec<(TokenId, u64)>>;
}

/// Synchronous on-chain-style exchange adapter.
pub trait SwapAdapter {
    /// Atomically convert `from_amount` of `from` into at least `min_to`
    /// of `to`, returning the amount actually realized.
    ///
    /// A failed or under-filled exchange must leave no partial effect.
    fn swap(
        &mut self,
        from: &TokenId,
        from_amount: u64,
        to: &TokenId,
        min_to: u64,
        data: &[u8],
    ) -> Result<u64>;
}

/// Asynchronous off-chain order venue adapter.
///
/// Orders fill out-of-band; the venue's fill confirmation is presented
/// back to the engine through `settle` and verified by `confirm_fill`.
pub trait OrderVenueAdapter {
    /// Place (or re-authorize) an order converting `from_amount` of
    /// `from` into `to`, returning the venue's opaque handle.
    fn initiate(
        &mut self,
        from: &TokenId,
        to: &TokenId,
        from_amount: u64,
        data: &[u8],
    ) -> Result<OrderHandle>;

    /// Verify an out-of-band fill confirmation for a previously placed
    /// order.
    fn confirm_fill(&mut self, handle: &OrderHandle, realized: u64, proof: &[u8]) -> Result<()>;
}
