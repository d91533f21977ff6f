//! Token custody held by the engine.
//!
//! Collections move reward tokens from vaults into custody; swaps and
//! settles exchange reward custody for purchase custody; claims and
//! donations pay purchase custody back out. Floor-rounding dust stays in
//! custody indefinitely, which is why custody can exceed the sum of
//! outstanding allocations but never fall below it.

use std::collections::BTreeMap;

use liqr_types::TokenId;

use crate::{EngineError, Result};

/// Per-token balances in the engine's custody.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Custody {
    balances: BTreeMap<TokenId, u64>,
}

impl Custody {
    /// Create an empty custody map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record tokens entering custody.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Overflow`] if a token balance would overflow
    pub fn credit(&mut self, token: TokenId, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let entry = self.balances.entry(token).or_insert(0);
        *entry = entry.checked_add(amount).ok_or(EngineError::Overflow)?;
        Ok(())
    }

    /// Record tokens leaving custody.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InsufficientCustody`] if the balance does not
    ///   cover the amount
    pub fn debit(&mut self, token: &TokenId, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.balance(token);
        let remaining = available
            .checked_sub(amount)
            .ok_or(EngineError::InsufficientCustody {
                available,
                required: amount,
            })?;
        if remaining == 0 {
            self.balances.remove(token);
        } else {
            self.balances.insert(*token, remaining);
        }
        Ok(())
    }

    /// Current balance held for a token (zero if absent).
    pub fn balance(&self, token: &TokenId) -> u64 {
        self.balances.get(token).copied().unwrap_or(0)
    }
}
