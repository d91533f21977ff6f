//! Integration test: two-phase asynchronous settlement.
//!
//! Exercises the off-chain order protocol:
//! 1. initiate (authorize-only, then funds-moving) against a live
//!    accumulator
//! 2. out-of-band fill, then settle with the venue's proof
//! 3. batch-style variants across parallel pair arrays
//! 4. independence: an in-flight async pair does not block synchronous
//!    activity on an unrelated pair
//! 5. batch atomicity: a malformed or partially rejected batch call
//!    changes nothing

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use liqr_engine::auth::OperatorSet;
use liqr_engine::traits::{OrderVenueAdapter, SwapAdapter, Vault};
use liqr_engine::{EngineError, LedgerEngine, Result};
use liqr_ledger::LedgerError;
use liqr_types::{OrderHandle, RewardPair, TokenId, VaultId};

const OPERATOR: [u8; 32] = [0xFE; 32];
const REWARD_X: TokenId = [0x01; 32];
const REWARD_Y: TokenId = [0x03; 32];
const PURCHASE: TokenId = [0x02; 32];
const VAULT: VaultId = [0x0A; 32];

fn pair_x() -> RewardPair {
    RewardPair::new(REWARD_X, PURCHASE)
}

fn pair_y() -> RewardPair {
    RewardPair::new(REWARD_Y, PURCHASE)
}

struct FundedVault {
    id: VaultId,
    holdings: Vec<(TokenId, u64)>,
}

impl FundedVault {
    fn new(id: VaultId, holdings: Vec<(TokenId, u64)>) -> Rc<RefCell<dyn Vault>> {
        Rc::new(RefCell::new(Self { id, holdings }))
    }
}

impl Vault for FundedVault {
    fn id(&self) -> VaultId {
        self.id
    }

    fn reward_tokens(&self) -> Vec<TokenId> {
        self.holdings.iter().map(|(t, _)| *t).collect()
    }

    fn donate_token(&self, _reward: &TokenId) -> TokenId {
        PURCHASE
    }

    fn collect_rewards(&mut self) -> Result<Vec<(TokenId, u64)>> {
        Ok(self
            .holdings
            .iter_mut()
            .map(|(t, amount)| (*t, std::mem::take(amount)))
            .collect())
    }
}

struct DoublingAdapter;

impl SwapAdapter for DoublingAdapter {
    fn swap(
        &mut self,
        _from: &TokenId,
        from_amount: u64,
        _to: &TokenId,
        _min_to: u64,
        _data: &[u8],
    ) -> Result<u64> {
        Ok(from_amount * 2)
    }
}

/// A venue that records placed orders and checks fill proofs against
/// the handles it handed out.
#[derive(Default)]
struct RecordingVenue {
    next: u8,
    open: BTreeMap<OrderHandle, u64>,
}

impl OrderVenueAdapter for RecordingVenue {
    fn initiate(
        &mut self,
        _from: &TokenId,
        _to: &TokenId,
        from_amount: u64,
        _data: &[u8],
    ) -> Result<OrderHandle> {
        self.next += 1;
        let handle = [self.next; 32];
        self.open.insert(handle, from_amount);
        Ok(handle)
    }

    fn confirm_fill(&mut self, handle: &OrderHandle, _realized: u64, proof: &[u8]) -> Result<()> {
        if !self.open.contains_key(handle) {
            return Err(EngineError::Adapter(format!(
                "unknown order {}",
                hex::encode(&handle[..4])
            )));
        }
        if proof.is_empty() {
            return Err(EngineError::Adapter("missing fill proof".into()));
        }
        self.open.remove(handle);
        Ok(())
    }
}

fn engine() -> Rc<LedgerEngine> {
    Rc::new(
        LedgerEngine::builder()
            .auth(OperatorSet::with_operators([OPERATOR]))
            .sync_adapter(Rc::new(RefCell::new(DoublingAdapter)))
            .venue_adapter(Rc::new(RefCell::new(RecordingVenue::default())))
            .build(),
    )
}

#[test]
fn two_phase_settlement_with_funds_moving() {
    let engine = engine();
    engine
        .collect(&OPERATOR, &[FundedVault::new(VAULT, vec![(REWARD_X, 500)])])
        .expect("collect");

    // Phase 1a: authorize only; custody stays with the engine.
    let auth_only = engine
        .initiate(&OPERATOR, &pair_x(), false, b"order")
        .expect("authorize");
    assert!(!auth_only.funds_moved);
    assert_eq!(engine.custody_balance(&REWARD_X), 500);

    // Phase 1b: move funds to the venue.
    let moved = engine
        .initiate(&OPERATOR, &pair_x(), true, b"order")
        .expect("fund order");
    assert!(moved.funds_moved);
    assert_eq!(engine.custody_balance(&REWARD_X), 0);

    // The accumulator stays open during the in-flight window.
    assert_eq!(engine.open_batch(&pair_x()), 0);
    assert_eq!(engine.pending_total(&pair_x()), 500);

    // Phase 2: the venue filled at 900; settle finalizes the batch.
    let report = engine
        .settle(&OPERATOR, &pair_x(), 900, b"fill-proof")
        .expect("settle");
    assert_eq!(report.batch, 0);
    assert_eq!(report.reward_in, 500);
    assert_eq!(report.purchase_out, 900);
    assert_eq!(engine.open_batch(&pair_x()), 1);
    assert_eq!(engine.custody_balance(&PURCHASE), 900);
    assert!(engine.in_flight_order(&pair_x()).is_none());

    // The whole allocation belongs to the single contributing vault.
    let claim = engine.claim(&VAULT, 0, &pair_x()).expect("claim");
    assert_eq!(claim.amount, 900);
}

#[test]
fn settle_rejects_bad_proof_and_stays_retryable() {
    let engine = engine();
    engine
        .collect(&OPERATOR, &[FundedVault::new(VAULT, vec![(REWARD_X, 100)])])
        .expect("collect");
    engine
        .initiate(&OPERATOR, &pair_x(), false, b"order")
        .expect("initiate");

    let before = engine.snapshot();
    let result = engine.settle(&OPERATOR, &pair_x(), 200, b"");
    assert!(matches!(result, Err(EngineError::Adapter(_))));
    assert_eq!(engine.snapshot(), before);

    engine
        .settle(&OPERATOR, &pair_x(), 200, b"fill-proof")
        .expect("settle after corrected proof");
}

#[test]
fn settle_before_initiate_rejected() {
    let engine = engine();
    engine
        .collect(&OPERATOR, &[FundedVault::new(VAULT, vec![(REWARD_X, 100)])])
        .expect("collect");

    let result = engine.settle(&OPERATOR, &pair_x(), 200, b"fill-proof");
    assert!(matches!(
        result,
        Err(EngineError::Ledger(LedgerError::NoPendingRewards(_)))
    ));
}

#[test]
fn batch_variants_cover_parallel_pairs() {
    let engine = engine();
    engine
        .collect(
            &OPERATOR,
            &[FundedVault::new(
                VAULT,
                vec![(REWARD_X, 100), (REWARD_Y, 50)],
            )],
        )
        .expect("collect");

    let reports = engine
        .initiate_many(
            &OPERATOR,
            &[pair_x(), pair_y()],
            &[b"x".to_vec(), b"y".to_vec()],
            false,
        )
        .expect("initiate many");
    assert_eq!(reports.len(), 2);
    assert!(engine.in_flight_order(&pair_x()).is_some());
    assert!(engine.in_flight_order(&pair_y()).is_some());

    let reports = engine
        .settle_many(
            &OPERATOR,
            &[pair_x(), pair_y()],
            &[200, 75],
            &[b"px".to_vec(), b"py".to_vec()],
        )
        .expect("settle many");
    assert_eq!(reports[0].purchase_out, 200);
    assert_eq!(reports[1].purchase_out, 75);
    assert_eq!(engine.open_batch(&pair_x()), 1);
    assert_eq!(engine.open_batch(&pair_y()), 1);
    assert_eq!(engine.custody_balance(&PURCHASE), 275);
}

#[test]
fn settle_many_duplicate_pair_changes_nothing() {
    let engine = engine();
    engine
        .collect(&OPERATOR, &[FundedVault::new(VAULT, vec![(REWARD_X, 100)])])
        .expect("collect");
    engine
        .initiate(&OPERATOR, &pair_x(), true, b"order")
        .expect("initiate");

    // Listing the same pair twice must not settle it once and then fail.
    let before = engine.snapshot();
    let result = engine.settle_many(
        &OPERATOR,
        &[pair_x(), pair_x()],
        &[200, 200],
        &[b"p1".to_vec(), b"p2".to_vec()],
    );
    assert!(matches!(result, Err(EngineError::MalformedInput(_))));
    assert_eq!(engine.snapshot(), before);
    assert_eq!(engine.open_batch(&pair_x()), 0);
    assert_eq!(engine.pending_total(&pair_x()), 100);
    assert!(engine.in_flight_order(&pair_x()).is_some());

    engine
        .settle(&OPERATOR, &pair_x(), 200, b"fill-proof")
        .expect("settle once");
    assert_eq!(engine.open_batch(&pair_x()), 1);
}

#[test]
fn settle_many_aborts_whole_batch_on_one_bad_proof() {
    let engine = engine();
    engine
        .collect(
            &OPERATOR,
            &[FundedVault::new(
                VAULT,
                vec![(REWARD_X, 100), (REWARD_Y, 50)],
            )],
        )
        .expect("collect");
    engine
        .initiate_many(
            &OPERATOR,
            &[pair_x(), pair_y()],
            &[b"x".to_vec(), b"y".to_vec()],
            false,
        )
        .expect("initiate many");

    let before = engine.snapshot();
    let result = engine.settle_many(
        &OPERATOR,
        &[pair_x(), pair_y()],
        &[200, 75],
        &[b"".to_vec(), b"py".to_vec()],
    );
    assert!(matches!(result, Err(EngineError::Adapter(_))));
    assert_eq!(engine.snapshot(), before);
    assert!(engine.in_flight_order(&pair_x()).is_some());
    assert!(engine.in_flight_order(&pair_y()).is_some());

    // Corrected proofs settle the whole batch.
    let reports = engine
        .settle_many(
            &OPERATOR,
            &[pair_x(), pair_y()],
            &[200, 75],
            &[b"px".to_vec(), b"py".to_vec()],
        )
        .expect("settle many after corrected proof");
    assert_eq!(reports.len(), 2);
    assert_eq!(engine.custody_balance(&PURCHASE), 275);
}

#[test]
fn in_flight_pair_does_not_block_sync_pair() {
    let engine = engine();
    engine
        .collect(
            &OPERATOR,
            &[FundedVault::new(
                VAULT,
                vec![(REWARD_X, 100), (REWARD_Y, 60)],
            )],
        )
        .expect("collect");

    // Pair X goes in-flight on the async path.
    engine
        .initiate(&OPERATOR, &pair_x(), true, b"order")
        .expect("initiate");

    // Pair Y settles synchronously while X is outstanding.
    let report = engine.swap(&OPERATOR, &pair_y(), 0, &[]).expect("sync swap");
    assert_eq!(report.purchase_out, 120);
    assert_eq!(engine.open_batch(&pair_y()), 1);

    // X is still open and still in flight.
    assert_eq!(engine.open_batch(&pair_x()), 0);
    assert!(engine.in_flight_order(&pair_x()).is_some());

    engine
        .settle(&OPERATOR, &pair_x(), 250, b"fill-proof")
        .expect("settle");
    assert_eq!(engine.open_batch(&pair_x()), 1);
}
