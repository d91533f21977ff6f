//! The liquidation coordinator and all its entry points.
//!
//! Control flow: vaults → [`LedgerEngine::collect`] (accumulate) →
//! [`LedgerEngine::swap`] or [`LedgerEngine::initiate`] →
//! [`LedgerEngine::settle`] (finalize a batch, write allocations) →
//! [`LedgerEngine::claim`] / [`LedgerEngine::donate`] (zero the
//! allocation, move custody out).
//!
//! Every mutating entry point acquires the global reentrancy guard
//! first, checks authorization second, and validates inputs before any
//! state change; all failures are non-mutating.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use liqr_ledger::book::Book;
use liqr_ledger::LedgerError;
use liqr_types::reports::{
    ClaimReport, CollectedReward, CollectionReport, DonationReport, InitiateReport, SwapReport,
    VaultCollection,
};
use liqr_types::{AccountId, BatchNumber, OrderHandle, RewardPair, TokenId, VaultId};

use crate::auth::AuthPolicy;
use crate::custody::Custody;
use crate::guard::ReentryGuard;
use crate::traits::{OrderVenueAdapter, SwapAdapter, Vault};
use crate::{EngineError, Result};

/// An outstanding, unsettled order on the asynchronous path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InFlightOrder {
    /// Opaque handle returned by the order venue.
    pub handle: OrderHandle,
    /// Reward custody already transferred to the venue for this order.
    pub moved_amount: u64,
}

/// Point-in-time copy of all engine state, for equality checks in tests
/// and for audit snapshots.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EngineSnapshot {
    pub book: Book,
    pub custody: Custody,
    pub orders: BTreeMap<RewardPair, InFlightOrder>,
}

/// Builder for [`LedgerEngine`].
pub struct EngineBuilder {
    auth: Box<dyn AuthPolicy>,
    sync_adapter: Option<Rc<RefCell<dyn SwapAdapter>>>,
    venue_adapter: Option<Rc<RefCell<dyn OrderVenueAdapter>>>,
}

impl EngineBuilder {
    /// Set the authorization policy (defaults to an empty operator set).
    pub fn auth(mut self, policy: impl AuthPolicy + 'static) -> Self {
        self.auth = Box::new(policy);
        self
    }

    /// Configure the synchronous exchange adapter.
    pub fn sync_adapter(mut self, adapter: Rc<RefCell<dyn SwapAdapter>>) -> Self {
        self.sync_adapter = Some(adapter);
        self
    }

    /// Configure the asynchronous order venue adapter.
    pub fn venue_adapter(mut self, adapter: Rc<RefCell<dyn OrderVenueAdapter>>) -> Self {
        self.venue_adapter = Some(adapter);
        self
    }

    /// Build the engine.
    pub fn build(self) -> LedgerEngine {
        LedgerEngine {
            book: RefCell::new(Book::new()),
            custody: RefCell::new(Custody::new()),
            orders: RefCell::new(BTreeMap::new()),
            guard: ReentryGuard::new(),
            auth: self.auth,
            sync_adapter: self.sync_adapter,
            venue_adapter: self.venue_adapter,
        }
    }
}

/// The reward liquidation coordinator.
pub struct LedgerEngine {
    book: RefCell<Book>,
    custody: RefCell<Custody>,
    orders: RefCell<BTreeMap<RewardPair, InFlightOrder>>,
    guard: ReentryGuard,
    auth: Box<dyn AuthPolicy>,
    sync_adapter: Option<Rc<RefCell<dyn SwapAdapter>>>,
    venue_adapter: Option<Rc<RefCell<dyn OrderVenueAdapter>>>,
}

impl LedgerEngine {
    /// Start building an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder {
            auth: Box::new(crate::auth::OperatorSet::new()),
            sync_adapter: None,
            venue_adapter: None,
        }
    }

    fn require_operator(&self, caller: &AccountId) -> Result<()> {
        if self.auth.is_operator(caller) {
            Ok(())
        } else {
            Err(EngineError::NotAuthorized)
        }
    }

    /// Batch entry points settle each pair exactly once; a repeated pair
    /// would commit on its first occurrence and fail on the second.
    fn require_distinct(pairs: &[RewardPair]) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for pair in pairs {
            if !seen.insert(*pair) {
                return Err(EngineError::MalformedInput(format!("duplicate pair {pair}")));
            }
        }
        Ok(())
    }

    /// Pair must be known and its accumulator non-empty. Returns the
    /// pending total.
    fn require_pending(&self, pair: &RewardPair) -> Result<u64> {
        let book = self.book.borrow();
        if !book.contains(pair) {
            return Err(LedgerError::InvalidPair(*pair).into());
        }
        let total = book.pending_total(pair);
        if total == 0 {
            return Err(LedgerError::NoPendingRewards(*pair).into());
        }
        Ok(total)
    }

    // ------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------

    /// Collect pending rewards from the given vaults into the open batch
    /// of each (reward, purchase) pair.
    ///
    /// Vault callbacks run under the reentrancy guard; all accumulation
    /// is staged locally and committed only after the last callback has
    /// returned, so an aborted call leaves the ledger untouched. Zero
    /// sweeps are valid, are reported, and still register the pair. A
    /// token swept without appearing in the vault's declared reward set
    /// is credited and reported all the same.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ReentrancyDetected`] on re-entry
    /// - [`EngineError::NotAuthorized`] for non-operators
    /// - any error a vault callback returns, unmodified
    pub fn collect(
        &self,
        caller: &AccountId,
        vaults: &[Rc<RefCell<dyn Vault>>],
    ) -> Result<CollectionReport> {
        let _permit = self.guard.enter()?;
        self.require_operator(caller)?;

        // Stage everything; nothing is committed until all callouts are done.
        let mut staged: Vec<(RewardPair, VaultId, u64)> = Vec::new();
        let mut report = CollectionReport { vaults: Vec::new() };

        for vault_cell in vaults {
            let mut vault = vault_cell.borrow_mut();
            let vault_id = vault.id();
            let declared = vault.reward_tokens();
            let mut swept: BTreeMap<TokenId, u64> =
                vault.collect_rewards()?.into_iter().collect();

            let mut collected = Vec::with_capacity(declared.len());
            for reward in declared {
                let purchase = vault.donate_token(&reward);
                let amount = swept.remove(&reward).unwrap_or(0);
                staged.push((RewardPair::new(reward, purchase), vault_id, amount));
                collected.push(CollectedReward {
                    reward,
                    purchase,
                    amount,
                });

                tracing::trace!(
                    vault = %hex::encode(&vault_id[..4]),
                    pair = %RewardPair::new(reward, purchase),
                    amount,
                    "reward collected"
                );
            }

            // Custody moved for undeclared sweeps too; route them
            // through the same pair mapping instead of dropping them.
            for (reward, amount) in swept {
                let purchase = vault.donate_token(&reward);
                staged.push((RewardPair::new(reward, purchase), vault_id, amount));
                collected.push(CollectedReward {
                    reward,
                    purchase,
                    amount,
                });

                tracing::warn!(
                    vault = %hex::encode(&vault_id[..4]),
                    pair = %RewardPair::new(reward, purchase),
                    amount,
                    "undeclared reward swept"
                );
            }
            report.vaults.push(VaultCollection {
                vault: vault_id,
                collected,
            });
        }

        // Commit against working copies so an overflow cannot leave a
        // partially applied collection behind.
        let mut book = self.book.borrow().clone();
        let mut custody = self.custody.borrow().clone();
        for (pair, vault_id, amount) in staged {
            if amount == 0 {
                book.register(pair);
            } else {
                book.accumulate(pair, vault_id, amount)?;
                custody.credit(pair.reward, amount)?;
            }
        }
        *self.book.borrow_mut() = book;
        *self.custody.borrow_mut() = custody;

        tracing::info!(vaults = report.vaults.len(), "collection committed");
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Synchronous settlement
    // ------------------------------------------------------------------

    /// Convert the pair's entire pending reward balance atomically via
    /// the synchronous exchange adapter and finalize a batch.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidPair`] if the pair was never registered
    /// - [`LedgerError::NoPendingRewards`] if nothing is pending
    /// - [`EngineError::InsufficientOutput`] if the adapter realized
    ///   less than `min_purchase_out`; the accumulator is untouched and
    ///   the call can be retried with corrected inputs
    pub fn swap(
        &self,
        caller: &AccountId,
        pair: &RewardPair,
        min_purchase_out: u64,
        data: &[u8],
    ) -> Result<SwapReport> {
        let _permit = self.guard.enter()?;
        self.require_operator(caller)?;
        let reward_in = self.require_pending(pair)?;

        let adapter = self
            .sync_adapter
            .as_ref()
            .ok_or_else(|| EngineError::Adapter("no synchronous exchange adapter configured".into()))?
            .clone();
        let realized = adapter.borrow_mut().swap(
            &pair.reward,
            reward_in,
            &pair.purchase,
            min_purchase_out,
            data,
        )?;

        if realized < min_purchase_out {
            return Err(EngineError::InsufficientOutput {
                min: min_purchase_out,
                realized,
            });
        }

        let outcome = self.book.borrow_mut().finalize(pair, realized)?;
        {
            let mut custody = self.custody.borrow_mut();
            custody.debit(&pair.reward, reward_in)?;
            custody.credit(pair.purchase, realized)?;
        }

        tracing::info!(
            pair = %pair,
            batch = outcome.batch,
            reward_in,
            purchase_out = realized,
            "synchronous swap finalized"
        );
        Ok(SwapReport {
            pair: *pair,
            batch: outcome.batch,
            reward_in,
            purchase_out: realized,
            dust: outcome.dust,
        })
    }

    // ------------------------------------------------------------------
    // Asynchronous settlement
    // ------------------------------------------------------------------

    /// Start (or re-authorize) an off-chain order for the pair's pending
    /// rewards. The accumulator remains open; no batch is finalized.
    ///
    /// With `move_funds = false` the call only authorizes the order and
    /// may be re-issued any number of times while unfilled; the stored
    /// handle is refreshed. With `move_funds = true` reward custody is
    /// additionally transferred to the venue, at most once per in-flight
    /// order.
    pub fn initiate(
        &self,
        caller: &AccountId,
        pair: &RewardPair,
        move_funds: bool,
        data: &[u8],
    ) -> Result<InitiateReport> {
        let _permit = self.guard.enter()?;
        self.require_operator(caller)?;
        self.initiate_inner(pair, move_funds, data)
    }

    fn initiate_inner(
        &self,
        pair: &RewardPair,
        move_funds: bool,
        data: &[u8],
    ) -> Result<InitiateReport> {
        let amount = self.require_pending(pair)?;

        let adapter = self
            .venue_adapter
            .as_ref()
            .ok_or_else(|| EngineError::Adapter("no order venue adapter configured".into()))?
            .clone();
        let handle = adapter
            .borrow_mut()
            .initiate(&pair.reward, &pair.purchase, amount, data)?;

        Self::record_order(
            &mut self.orders.borrow_mut(),
            &mut self.custody.borrow_mut(),
            pair,
            amount,
            handle,
            move_funds,
        )
    }

    /// Record an accepted venue order; moves reward custody at most once
    /// per in-flight order.
    fn record_order(
        orders: &mut BTreeMap<RewardPair, InFlightOrder>,
        custody: &mut Custody,
        pair: &RewardPair,
        amount: u64,
        handle: OrderHandle,
        move_funds: bool,
    ) -> Result<InitiateReport> {
        let already_moved = orders.get(pair).map(|o| o.moved_amount).unwrap_or(0);
        let funds_moved = move_funds && already_moved == 0;
        if funds_moved {
            custody.debit(&pair.reward, amount)?;
        }
        orders.insert(
            *pair,
            InFlightOrder {
                handle,
                moved_amount: if funds_moved { amount } else { already_moved },
            },
        );

        tracing::info!(
            pair = %pair,
            amount,
            funds_moved,
            "async order initiated"
        );
        Ok(InitiateReport {
            pair: *pair,
            handle,
            amount,
            funds_moved,
        })
    }

    /// Confirm an out-of-band fill and finalize a batch, exactly as the
    /// synchronous path does.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NoPendingRewards`] if there is no in-flight
    ///   order for the pair or its accumulator is empty
    pub fn settle(
        &self,
        caller: &AccountId,
        pair: &RewardPair,
        realized: u64,
        proof: &[u8],
    ) -> Result<SwapReport> {
        let _permit = self.guard.enter()?;
        self.require_operator(caller)?;
        self.settle_inner(pair, realized, proof)
    }

    fn settle_inner(&self, pair: &RewardPair, realized: u64, proof: &[u8]) -> Result<SwapReport> {
        let reward_in = self.require_pending(pair)?;
        let order = self
            .orders
            .borrow()
            .get(pair)
            .copied()
            .ok_or(LedgerError::NoPendingRewards(*pair))?;

        let adapter = self
            .venue_adapter
            .as_ref()
            .ok_or_else(|| EngineError::Adapter("no order venue adapter configured".into()))?
            .clone();
        adapter
            .borrow_mut()
            .confirm_fill(&order.handle, realized, proof)?;

        Self::apply_settlement(
            &mut self.book.borrow_mut(),
            &mut self.custody.borrow_mut(),
            &mut self.orders.borrow_mut(),
            pair,
            reward_in,
            realized,
            order,
        )
    }

    /// Finalize a confirmed fill: write the batch, reconcile custody,
    /// close the in-flight order.
    fn apply_settlement(
        book: &mut Book,
        custody: &mut Custody,
        orders: &mut BTreeMap<RewardPair, InFlightOrder>,
        pair: &RewardPair,
        reward_in: u64,
        realized: u64,
        order: InFlightOrder,
    ) -> Result<SwapReport> {
        let outcome = book.finalize(pair, realized)?;
        // Whatever was not already handed to the venue leaves now.
        let remaining = reward_in.saturating_sub(order.moved_amount);
        custody.debit(&pair.reward, remaining)?;
        custody.credit(pair.purchase, realized)?;
        orders.remove(pair);

        tracing::info!(
            pair = %pair,
            batch = outcome.batch,
            reward_in,
            purchase_out = realized,
            "async order settled"
        );
        Ok(SwapReport {
            pair: *pair,
            batch: outcome.batch,
            reward_in,
            purchase_out: realized,
            dust: outcome.dust,
        })
    }

    /// [`initiate`](Self::initiate) across parallel arrays of pairs and
    /// adapter payloads. The whole batch is recorded or none of it: all
    /// venue callouts run before any order state or custody changes.
    ///
    /// # Errors
    ///
    /// - [`EngineError::MalformedInput`] on length mismatch or a
    ///   repeated pair
    pub fn initiate_many(
        &self,
        caller: &AccountId,
        pairs: &[RewardPair],
        datas: &[Vec<u8>],
        move_funds: bool,
    ) -> Result<Vec<InitiateReport>> {
        let _permit = self.guard.enter()?;
        self.require_operator(caller)?;
        if pairs.len() != datas.len() {
            return Err(EngineError::MalformedInput(format!(
                "{} pairs but {} payloads",
                pairs.len(),
                datas.len()
            )));
        }
        Self::require_distinct(pairs)?;

        let mut amounts = Vec::with_capacity(pairs.len());
        for pair in pairs {
            amounts.push(self.require_pending(pair)?);
        }

        let adapter = self
            .venue_adapter
            .as_ref()
            .ok_or_else(|| EngineError::Adapter("no order venue adapter configured".into()))?
            .clone();
        // A rejected order aborts the batch before any funds have moved.
        let mut handles = Vec::with_capacity(pairs.len());
        for ((pair, amount), data) in pairs.iter().zip(&amounts).zip(datas) {
            handles.push(adapter.borrow_mut().initiate(
                &pair.reward,
                &pair.purchase,
                *amount,
                data,
            )?);
        }

        // Record against working copies and swap them in whole.
        let mut orders = self.orders.borrow().clone();
        let mut custody = self.custody.borrow().clone();
        let mut reports = Vec::with_capacity(pairs.len());
        for ((pair, amount), handle) in pairs.iter().zip(&amounts).zip(handles) {
            reports.push(Self::record_order(
                &mut orders,
                &mut custody,
                pair,
                *amount,
                handle,
                move_funds,
            )?);
        }
        *self.orders.borrow_mut() = orders;
        *self.custody.borrow_mut() = custody;
        Ok(reports)
    }

    /// [`settle`](Self::settle) across parallel arrays of pairs,
    /// realized amounts, and fill proofs. The whole batch settles or
    /// none of it: every fill is confirmed with the venue before the
    /// first allocation is written, and ledger state is swapped in
    /// whole. A rejected fill leaves every order in flight and
    /// retryable.
    ///
    /// # Errors
    ///
    /// - [`EngineError::MalformedInput`] on length mismatch or a
    ///   repeated pair
    pub fn settle_many(
        &self,
        caller: &AccountId,
        pairs: &[RewardPair],
        realized: &[u64],
        proofs: &[Vec<u8>],
    ) -> Result<Vec<SwapReport>> {
        let _permit = self.guard.enter()?;
        self.require_operator(caller)?;
        if pairs.len() != realized.len() || pairs.len() != proofs.len() {
            return Err(EngineError::MalformedInput(format!(
                "{} pairs, {} amounts, {} proofs",
                pairs.len(),
                realized.len(),
                proofs.len()
            )));
        }
        Self::require_distinct(pairs)?;

        let mut staged = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let reward_in = self.require_pending(pair)?;
            let order = self
                .orders
                .borrow()
                .get(pair)
                .copied()
                .ok_or(LedgerError::NoPendingRewards(*pair))?;
            staged.push((reward_in, order));
        }

        let adapter = self
            .venue_adapter
            .as_ref()
            .ok_or_else(|| EngineError::Adapter("no order venue adapter configured".into()))?
            .clone();
        for (((_, order), amount), proof) in staged.iter().zip(realized).zip(proofs) {
            adapter.borrow_mut().confirm_fill(&order.handle, *amount, proof)?;
        }

        let mut book = self.book.borrow().clone();
        let mut custody = self.custody.borrow().clone();
        let mut orders = self.orders.borrow().clone();
        let mut reports = Vec::with_capacity(pairs.len());
        for ((pair, (reward_in, order)), amount) in pairs.iter().zip(staged).zip(realized) {
            reports.push(Self::apply_settlement(
                &mut book,
                &mut custody,
                &mut orders,
                pair,
                reward_in,
                *amount,
                order,
            )?);
        }
        *self.book.borrow_mut() = book;
        *self.custody.borrow_mut() = custody;
        *self.orders.borrow_mut() = orders;
        Ok(reports)
    }

    // ------------------------------------------------------------------
    // Distribution
    // ------------------------------------------------------------------

    /// Pull-claim the caller's allocation from a finalized batch.
    ///
    /// The caller identity is the vault itself; no operator role is
    /// required.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidBatch`] if `batch` is not finalized
    /// - [`LedgerError::NotSwapped`] if the caller had no allocation
    /// - [`LedgerError::AlreadyDonated`] if it was already distributed
    pub fn claim(
        &self,
        caller: &AccountId,
        batch: BatchNumber,
        pair: &RewardPair,
    ) -> Result<ClaimReport> {
        let _permit = self.guard.enter()?;

        let amount = self.book.borrow_mut().claim(pair, batch, caller)?;
        self.custody.borrow_mut().debit(&pair.purchase, amount)?;

        tracing::info!(
            pair = %pair,
            batch,
            vault = %hex::encode(&caller[..4]),
            amount,
            "allocation claimed"
        );
        Ok(ClaimReport {
            pair: *pair,
            batch,
            vault: *caller,
            amount,
        })
    }

    /// Push-donate every un-distributed allocation for the given
    /// (reward, purchase, vault) triples, across all finalized batches
    /// from each vault's watermark.
    ///
    /// # Errors
    ///
    /// - [`EngineError::MalformedInput`] if the arrays are empty or of
    ///   unequal length
    /// - [`LedgerError::NothingToDonate`] if every triple sums to zero;
    ///   nothing is mutated in that case
    pub fn donate(
        &self,
        caller: &AccountId,
        rewards: &[TokenId],
        purchases: &[TokenId],
        vaults: &[VaultId],
    ) -> Result<DonationReport> {
        let _permit = self.guard.enter()?;
        self.require_operator(caller)?;

        if rewards.is_empty() {
            return Err(EngineError::MalformedInput("empty donation arrays".into()));
        }
        if rewards.len() != purchases.len() || rewards.len() != vaults.len() {
            return Err(EngineError::MalformedInput(format!(
                "{} rewards, {} purchases, {} vaults",
                rewards.len(),
                purchases.len(),
                vaults.len()
            )));
        }

        // First pass is read-only: an all-zero donate must not advance
        // any watermark.
        let mut eligible: u64 = 0;
        {
            let book = self.book.borrow();
            for i in 0..rewards.len() {
                let pair = RewardPair::new(rewards[i], purchases[i]);
                eligible = eligible.saturating_add(book.donatable(&pair, &vaults[i]));
            }
        }
        if eligible == 0 {
            return Err(LedgerError::NothingToDonate.into());
        }

        let mut amounts = Vec::with_capacity(rewards.len());
        {
            let mut book = self.book.borrow_mut();
            let mut custody = self.custody.borrow_mut();
            for i in 0..rewards.len() {
                let pair = RewardPair::new(rewards[i], purchases[i]);
                let paid = book.take_donatable(&pair, &vaults[i]);
                custody.debit(&pair.purchase, paid)?;
                amounts.push(paid);
            }
        }

        let report = DonationReport { amounts };
        tracing::info!(
            triples = rewards.len(),
            total = report.total(),
            "donation distributed"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Read-only queries
    // ------------------------------------------------------------------

    /// The pair's current open batch number (0 for unknown pairs).
    pub fn open_batch(&self, pair: &RewardPair) -> BatchNumber {
        self.book.borrow().open_batch(pair)
    }

    /// Total reward amount pending in the pair's open batch.
    pub fn pending_total(&self, pair: &RewardPair) -> u64 {
        self.book.borrow().pending_total(pair)
    }

    /// A single vault's pending contribution in the open batch.
    pub fn pending_contribution(&self, pair: &RewardPair, vault: &VaultId) -> u64 {
        self.book.borrow().pending_contribution(pair, vault)
    }

    /// A vault's allocation in a finalized batch, if any.
    pub fn allocation(
        &self,
        pair: &RewardPair,
        batch: BatchNumber,
        vault: &VaultId,
    ) -> Option<liqr_ledger::batch::Allocation> {
        self.book.borrow().allocation(pair, batch, vault)
    }

    /// A vault's push-donation watermark for the pair.
    pub fn donated_through(&self, pair: &RewardPair, vault: &VaultId) -> BatchNumber {
        self.book.borrow().donated_through(pair, vault)
    }

    /// Cumulative floor residue retained for the pair.
    pub fn dust(&self, pair: &RewardPair) -> u64 {
        self.book.borrow().dust(pair)
    }

    /// Current custody balance for a token.
    pub fn custody_balance(&self, token: &TokenId) -> u64 {
        self.custody.borrow().balance(token)
    }

    /// The pair's outstanding unsettled order, if any.
    pub fn in_flight_order(&self, pair: &RewardPair) -> Option<InFlightOrder> {
        self.orders.borrow().get(pair).copied()
    }

    /// Copy the full engine state, mainly for before/after comparisons
    /// in tests.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            book: self.book.borrow().clone(),
            custody: self.custody.borrow().clone(),
            orders: self.orders.borrow().clone(),
        }
    }
}
