//! Bet Lifecycle Engine
//!
//! The authoritative state machine for every bet:
//!
//! ```text
//!   create ──► Open ──place_bet──► Open ──resolve──► Resolved (terminal)
//! ```
//!
//! Every public mutation is one atomic transition: preconditions are checked
//! first, arithmetic is checked before custody is touched, and state only
//! changes once nothing can fail. The single deliberate exception is payout:
//! once a bet is resolved, individual transfer failures are reported but
//! never roll the resolution back.
//!
//! The engine itself is single-threaded (`&mut self`). Callers that share it
//! across tasks must serialize access; see `network::service`.

use tracing::{debug, info};
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::config::LedgerConfig;
use crate::core::amount::{Amount, AMOUNT_ZERO};
use crate::core::hash::StateHash;
use crate::ledger::account::AccountId;
use crate::ledger::bet::{Bet, BetId, OptionIndex, OptionInfo, UserBet};
use crate::ledger::custody::ValueCustody;
use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::events::{EventBus, EventSink, LedgerEventData};
use crate::ledger::journal::{Journal, LedgerOp};
use crate::ledger::payout::{PayoutPlan, PayoutReport};
use crate::ledger::registry::BetRegistry;

/// Accounting result of a successful placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Bet the value went to.
    pub bet_id: BetId,
    /// Index of the chosen option.
    pub option_index: OptionIndex,
    /// Option total after the placement.
    pub option_total: Amount,
    /// Pot after the placement.
    pub total_pot: Amount,
}

/// Bet state machine with injected custody and event sink.
pub struct BetLifecycleEngine<C, S> {
    registry: BetRegistry,
    custody: C,
    events: EventBus<S>,
    journal: Option<Journal>,
}

impl<C: ValueCustody, S: EventSink> BetLifecycleEngine<C, S> {
    /// Create an engine governed by `authority`.
    pub fn new(authority: AccountId, custody: C, sink: S) -> Self {
        Self {
            registry: BetRegistry::new(authority),
            custody,
            events: EventBus::new(sink),
            journal: None,
        }
    }

    /// Create an engine from configuration.
    pub fn from_config(config: &LedgerConfig, custody: C, sink: S) -> Self {
        let engine = Self::new(config.authority, custody, sink);
        if config.record_journal {
            engine.with_journal()
        } else {
            engine
        }
    }

    /// Record every successful mutation in a journal.
    pub fn with_journal(mut self) -> Self {
        self.journal = Some(Journal::new());
        self
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Open a new bet. Authority only.
    pub fn create_bet(
        &mut self,
        caller: &AccountId,
        topic: &str,
        options: &[String],
    ) -> LedgerResult<BetId> {
        let bet_id = self.registry.create(caller, topic, options, &mut self.events)?;

        self.record(LedgerOp::CreateBet {
            caller: *caller,
            topic: topic.to_string(),
            options: options.to_vec(),
        });
        Ok(bet_id)
    }

    /// Place `amount` on `option` for `participant`.
    ///
    /// Checks, in order: bet exists, bet is open, option exists, amount is
    /// positive, totals cannot overflow. Only then is the stake collected from
    /// custody; if custody refuses, nothing changes.
    pub fn place_bet(
        &mut self,
        bet_id: BetId,
        option: &str,
        participant: &AccountId,
        amount: Amount,
    ) -> LedgerResult<Placement> {
        let bet = self.registry.get(bet_id)?;
        if bet.is_resolved() {
            return Err(LedgerError::AlreadyResolved(bet_id));
        }
        let option_index = bet.option_index(option).ok_or_else(|| LedgerError::InvalidOption {
            bet_id,
            option: option.to_string(),
        })?;
        if amount == AMOUNT_ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let totals = bet.checked_stake(option_index, participant, amount)?;

        self.custody
            .deposit(participant, amount)
            .map_err(|e| LedgerError::DepositRejected(e.to_string()))?;

        self.registry
            .get_mut(bet_id)?
            .apply_stake(option_index, *participant, amount, totals);

        self.events.publish(LedgerEventData::BetPlaced {
            bet_id,
            participant: *participant,
            amount,
            option: option.to_string(),
        });

        debug!(
            "Bet {}: {} placed {} on {:?} (pot {})",
            bet_id, participant.short(), amount, option, totals.total_pot
        );
        #[cfg(feature = "debug-tracing")]
        trace!("Bet {} totals after placement: {:?}", bet_id, self.registry.get(bet_id)?.option_totals());

        self.record(LedgerOp::PlaceBet {
            bet_id,
            option: option.to_string(),
            participant: *participant,
            amount,
        });

        Ok(Placement {
            bet_id,
            option_index,
            option_total: totals.option_total,
            total_pot: totals.total_pot,
        })
    }

    /// Declare the winner and pay out. Authority only.
    ///
    /// The payout plan is computed from the totals at this instant, then the
    /// bet is frozen and `BetResolved` emitted before any transfer runs, so
    /// the resolution is recorded whatever happens to individual payouts.
    pub fn resolve(
        &mut self,
        bet_id: BetId,
        winning_option: &str,
        caller: &AccountId,
    ) -> LedgerResult<PayoutReport> {
        self.registry.ensure_authority(caller)?;

        let bet = self.registry.get(bet_id)?;
        if bet.is_resolved() {
            return Err(LedgerError::AlreadyResolved(bet_id));
        }
        let winning_index = bet.option_index(winning_option).ok_or_else(|| {
            LedgerError::InvalidOption {
                bet_id,
                option: winning_option.to_string(),
            }
        })?;
        let plan = PayoutPlan::compute(bet, winning_index)?;

        // Commit: from here on the bet is frozen.
        self.registry.get_mut(bet_id)?.mark_resolved(winning_index);
        self.events.publish(LedgerEventData::BetResolved {
            bet_id,
            winning_option: winning_option.to_string(),
        });
        self.record(LedgerOp::ResolveBet {
            bet_id,
            winning_option: winning_option.to_string(),
            caller: *caller,
        });

        info!(
            "Bet {} resolved to {:?}: pot {}, winning total {}, {} winners",
            bet_id, winning_option, plan.total_pot, plan.winning_total, plan.payouts.len()
        );

        let report = plan.execute(&mut self.custody);

        let failed = report.payouts.iter().filter(|r| !r.is_paid()).count();
        if failed > 0 {
            info!("Bet {}: {} of {} payouts failed", bet_id, failed, report.payouts.len());
        }

        Ok(report)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Full bet record.
    pub fn get_bet(&self, bet_id: BetId) -> LedgerResult<&Bet> {
        self.registry.get(bet_id)
    }

    /// Options, totals and pot.
    pub fn get_option_info(&self, bet_id: BetId) -> LedgerResult<OptionInfo> {
        Ok(self.registry.get(bet_id)?.option_info())
    }

    /// One participant's stakes; empty lists if they never bet.
    pub fn get_user_bet(&self, bet_id: BetId, participant: &AccountId) -> LedgerResult<UserBet> {
        Ok(self.registry.get(bet_id)?.user_bet(participant))
    }

    /// Number of bets created.
    pub fn count(&self) -> usize {
        self.registry.count()
    }

    /// The bet authority.
    pub fn authority(&self) -> AccountId {
        self.registry.authority()
    }

    /// Underlying registry.
    pub fn registry(&self) -> &BetRegistry {
        &self.registry
    }

    /// Digest of the registry state.
    pub fn state_hash(&self) -> StateHash {
        self.registry.compute_hash()
    }

    /// Custody collaborator.
    pub fn custody(&self) -> &C {
        &self.custody
    }

    /// Custody collaborator, mutably (funding, test setup).
    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    /// Event sink.
    pub fn sink(&self) -> &S {
        self.events.sink()
    }

    /// Number of events emitted.
    pub fn events_emitted(&self) -> u64 {
        self.events.published()
    }

    /// Journal, if recording.
    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }

    fn record(&mut self, op: LedgerOp) {
        if self.journal.is_some() {
            let state_hash = self.registry.compute_hash();
            if let Some(journal) = self.journal.as_mut() {
                journal.record(op, state_hash);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::custody::Escrow;
    use crate::ledger::events::LedgerEvent;
    use crate::ledger::payout::PayoutOutcome;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    type TestEngine = BetLifecycleEngine<Escrow, Vec<LedgerEvent>>;

    const OWNER: AccountId = AccountId::new([0xAA; 16]);

    fn id(n: u8) -> AccountId {
        AccountId::new([n; 16])
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Engine where accounts 1..=10 each hold 1000 units.
    fn engine() -> TestEngine {
        let mut escrow = Escrow::new();
        for n in 1..=10 {
            escrow.fund(id(n), 1000).unwrap();
        }
        BetLifecycleEngine::new(OWNER, escrow, Vec::new())
    }

    fn engine_with_bet(options: &[&str]) -> TestEngine {
        let mut engine = engine();
        engine.create_bet(&OWNER, "Test Topic", &labels(options)).unwrap();
        engine
    }

    #[test]
    fn test_authority_is_exposed() {
        assert_eq!(engine().authority(), OWNER);
    }

    #[test]
    fn test_create_bet_starts_open() {
        let engine = engine_with_bet(&["Option1", "Option2"]);
        let bet = engine.get_bet(0).unwrap();

        assert_eq!(bet.topic(), "Test Topic");
        assert!(!bet.is_resolved());
        assert_eq!(engine.count(), 1);
    }

    #[test]
    fn test_place_bet_updates_totals() {
        let mut engine = engine_with_bet(&["TeamA", "TeamB", "Draw"]);

        engine.place_bet(0, "TeamA", &id(1), 2).unwrap();
        engine.place_bet(0, "TeamB", &id(2), 3).unwrap();
        let placement = engine.place_bet(0, "Draw", &id(3), 5).unwrap();

        assert_eq!(placement.option_index, 2);
        assert_eq!(placement.total_pot, 10);

        let info = engine.get_option_info(0).unwrap();
        assert_eq!(info.options, labels(&["TeamA", "TeamB", "Draw"]));
        assert_eq!(info.option_totals, vec![2, 3, 5]);
        assert_eq!(info.total_pot, 10);

        assert_eq!(engine.custody().held(), 10);
        assert_eq!(engine.custody().balance_of(&id(1)), 998);
    }

    #[test]
    fn test_place_bet_emits_event() {
        let mut engine = engine_with_bet(&["Team1", "Team2"]);
        engine.place_bet(0, "Team1", &id(1), 2).unwrap();

        let last = engine.sink().last().unwrap();
        assert_eq!(
            last.data,
            LedgerEventData::BetPlaced {
                bet_id: 0,
                participant: id(1),
                amount: 2,
                option: "Team1".into(),
            }
        );
        assert_eq!(last.sequence, 1);
    }

    #[test]
    fn test_user_bets_on_multiple_options() {
        let mut engine = engine_with_bet(&["Option1", "Option2", "Option3"]);
        engine.place_bet(0, "Option1", &id(1), 1).unwrap();
        engine.place_bet(0, "Option2", &id(1), 2).unwrap();

        let user = engine.get_user_bet(0, &id(1)).unwrap();
        assert_eq!(user.option_indexes, vec![0, 1]);
        assert_eq!(user.amounts, vec![1, 2]);
    }

    #[test]
    fn test_user_bets_on_same_option_accumulate() {
        let mut engine = engine_with_bet(&["Option1", "Option2", "Option3"]);
        engine.place_bet(0, "Option1", &id(1), 1).unwrap();
        engine.place_bet(0, "Option1", &id(1), 2).unwrap();

        let user = engine.get_user_bet(0, &id(1)).unwrap();
        assert_eq!(user.option_indexes, vec![0]);
        assert_eq!(user.amounts, vec![3]);
    }

    #[test]
    fn test_user_without_bets_gets_empty_lists() {
        let mut engine = engine_with_bet(&["CandidateX", "CandidateY"]);
        engine.place_bet(0, "CandidateX", &id(1), 4).unwrap();

        let user = engine.get_user_bet(0, &id(2)).unwrap();
        assert!(user.option_indexes.is_empty());
        assert!(user.amounts.is_empty());
    }

    #[test]
    fn test_user_bets_tracked_per_bet() {
        let mut engine = engine();
        engine.create_bet(&OWNER, "Game1", &labels(&["A", "B"])).unwrap();
        engine.create_bet(&OWNER, "Game2", &labels(&["X", "Y"])).unwrap();
        engine.place_bet(0, "A", &id(1), 2).unwrap();
        engine.place_bet(1, "Y", &id(1), 3).unwrap();

        let first = engine.get_user_bet(0, &id(1)).unwrap();
        let second = engine.get_user_bet(1, &id(1)).unwrap();
        assert_eq!((first.option_indexes, first.amounts), (vec![0], vec![2]));
        assert_eq!((second.option_indexes, second.amounts), (vec![1], vec![3]));
    }

    #[test]
    fn test_place_bet_precondition_order() {
        let mut engine = engine_with_bet(&["Option1", "Option2"]);

        // Unknown bet wins over every other problem.
        assert_eq!(
            engine.place_bet(5, "Nope", &id(1), 0),
            Err(LedgerError::NotFound(5))
        );

        // Unknown option is reported before the zero amount.
        assert_eq!(
            engine.place_bet(0, "Option4", &id(1), 0),
            Err(LedgerError::InvalidOption { bet_id: 0, option: "Option4".into() })
        );

        assert_eq!(engine.place_bet(0, "Option1", &id(1), 0), Err(LedgerError::InvalidAmount));

        engine.resolve(0, "Option1", &OWNER).unwrap();
        assert_eq!(
            engine.place_bet(0, "Option4", &id(1), 0),
            Err(LedgerError::AlreadyResolved(0))
        );
    }

    #[test]
    fn test_place_bet_on_missing_bet_leaves_count() {
        let mut engine = engine();
        assert_eq!(engine.place_bet(0, "Option1", &id(1), 1), Err(LedgerError::NotFound(0)));
        assert_eq!(engine.count(), 0);
    }

    #[test]
    fn test_option_match_is_exact() {
        let mut engine = engine_with_bet(&["Yes", "No"]);
        assert!(matches!(
            engine.place_bet(0, "yes", &id(1), 1),
            Err(LedgerError::InvalidOption { .. })
        ));
        assert!(matches!(
            engine.place_bet(0, "Yes ", &id(1), 1),
            Err(LedgerError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_rejected_deposit_changes_nothing() {
        let mut engine = engine_with_bet(&["A", "B"]);
        let hash_before = engine.state_hash();
        let events_before = engine.events_emitted();

        // Account 42 was never funded.
        let result = engine.place_bet(0, "A", &id(42), 1);
        assert!(matches!(result, Err(LedgerError::DepositRejected(_))));

        assert_eq!(engine.state_hash(), hash_before);
        assert_eq!(engine.events_emitted(), events_before);
        assert_eq!(engine.get_option_info(0).unwrap().total_pot, 0);
    }

    #[test]
    fn test_reference_payout_example() {
        let mut engine = engine_with_bet(&["A", "B"]);
        engine.place_bet(0, "A", &id(1), 2).unwrap();
        engine.place_bet(0, "A", &id(2), 3).unwrap();
        engine.place_bet(0, "B", &id(3), 5).unwrap();

        let report = engine.resolve(0, "A", &OWNER).unwrap();

        assert_eq!(report.total_pot, 10);
        assert_eq!(report.winning_total, 5);
        assert_eq!(report.paid_to(&id(1)), 4);
        assert_eq!(report.paid_to(&id(2)), 6);
        assert_eq!(report.paid_to(&id(3)), 0);
        assert_eq!(report.payouts.len(), 2);

        let escrow = engine.custody();
        assert_eq!(escrow.balance_of(&id(1)), 1002);
        assert_eq!(escrow.balance_of(&id(2)), 1003);
        assert_eq!(escrow.balance_of(&id(3)), 995);
        assert_eq!(escrow.held(), 0);
        assert!(escrow.is_balanced());
    }

    #[test]
    fn test_multi_option_resolution() {
        let mut engine = engine_with_bet(&["Option1", "Option2", "Option3"]);
        engine.place_bet(0, "Option1", &id(1), 1).unwrap();
        engine.place_bet(0, "Option2", &id(1), 2).unwrap();
        engine.place_bet(0, "Option2", &id(2), 3).unwrap();
        engine.place_bet(0, "Option3", &id(3), 4).unwrap();

        let report = engine.resolve(0, "Option2", &OWNER).unwrap();

        assert_eq!(report.paid_to(&id(1)), 4);
        assert_eq!(report.paid_to(&id(2)), 6);
        assert_eq!(report.paid_to(&id(3)), 0);

        let bet = engine.get_bet(0).unwrap();
        assert!(bet.is_resolved());
        assert_eq!(bet.winning_option(), Some("Option2"));
    }

    #[test]
    fn test_resolution_event_emitted_once() {
        let mut engine = engine_with_bet(&["Team1", "Team2"]);
        engine.place_bet(0, "Team1", &id(1), 2).unwrap();
        engine.resolve(0, "Team1", &OWNER).unwrap();
        let _ = engine.resolve(0, "Team1", &OWNER);

        let resolutions: Vec<_> = engine
            .sink()
            .iter()
            .filter(|e| matches!(e.data, LedgerEventData::BetResolved { .. }))
            .collect();
        assert_eq!(resolutions.len(), 1);
        assert_eq!(
            resolutions[0].data,
            LedgerEventData::BetResolved { bet_id: 0, winning_option: "Team1".into() }
        );
    }

    #[test]
    fn test_second_resolve_fails_without_change() {
        let mut engine = engine_with_bet(&["Answer1", "Answer2"]);
        engine.place_bet(0, "Answer1", &id(1), 3).unwrap();
        engine.resolve(0, "Answer1", &OWNER).unwrap();

        let hash = engine.state_hash();
        let held = engine.custody().held();

        assert_eq!(engine.resolve(0, "Answer2", &OWNER), Err(LedgerError::AlreadyResolved(0)));
        assert_eq!(engine.state_hash(), hash);
        assert_eq!(engine.custody().held(), held);
        assert_eq!(engine.get_bet(0).unwrap().winning_option(), Some("Answer1"));
    }

    #[test]
    fn test_resolve_preconditions() {
        let mut engine = engine_with_bet(&["Answer1", "Answer2"]);

        assert_eq!(
            engine.resolve(0, "Answer1", &id(1)),
            Err(LedgerError::Unauthorized { caller: id(1) })
        );
        // Authorization is checked before existence.
        assert_eq!(
            engine.resolve(9, "Answer1", &id(1)),
            Err(LedgerError::Unauthorized { caller: id(1) })
        );
        assert_eq!(engine.resolve(9, "Answer1", &OWNER), Err(LedgerError::NotFound(9)));
        assert_eq!(
            engine.resolve(0, "NonExistingOption", &OWNER),
            Err(LedgerError::InvalidOption { bet_id: 0, option: "NonExistingOption".into() })
        );
        assert!(!engine.get_bet(0).unwrap().is_resolved());
    }

    #[test]
    fn test_no_backers_on_winner_keeps_pot() {
        let mut engine = engine_with_bet(&["Number1", "Number2"]);
        engine.place_bet(0, "Number1", &id(1), 5).unwrap();
        let held_before = engine.custody().held();

        let report = engine.resolve(0, "Number2", &OWNER).unwrap();

        assert!(report.payouts.is_empty());
        assert_eq!(report.retained(), 5);
        assert_eq!(engine.custody().held(), held_before);
        assert!(matches!(
            engine.sink().last().map(|e| &e.data),
            Some(LedgerEventData::BetResolved { .. })
        ));
    }

    #[test]
    fn test_resolve_empty_bet() {
        let mut engine = engine_with_bet(&["Option1", "Option2"]);
        let report = engine.resolve(0, "Option1", &OWNER).unwrap();
        assert_eq!(report.total_pot, 0);
        assert!(report.payouts.is_empty());
    }

    #[test]
    fn test_failed_payout_does_not_block_others() {
        let mut engine = engine_with_bet(&["A", "B"]);
        engine.place_bet(0, "A", &id(1), 2).unwrap();
        engine.place_bet(0, "A", &id(2), 3).unwrap();
        engine.place_bet(0, "B", &id(3), 5).unwrap();
        engine.custody_mut().set_rejecting(id(1), true);

        let report = engine.resolve(0, "A", &OWNER).unwrap();

        let rejected = report.payouts.iter().find(|r| r.participant == id(1)).unwrap();
        assert!(matches!(rejected.outcome, PayoutOutcome::TransferFailed { .. }));
        assert_eq!(report.paid_to(&id(2)), 6);
        assert_eq!(report.failures().len(), 1);

        // Resolution stands; the failed reward stays held.
        assert!(engine.get_bet(0).unwrap().is_resolved());
        assert_eq!(engine.custody().held(), 4);
        assert!(engine.custody().is_balanced());
    }

    #[test]
    fn test_resolve_bets_independently() {
        let mut engine = engine();
        engine.create_bet(&OWNER, "Game1", &labels(&["TeamA", "TeamB"])).unwrap();
        engine.create_bet(&OWNER, "Game2", &labels(&["Player1", "Player2"])).unwrap();
        engine.place_bet(0, "TeamA", &id(1), 3).unwrap();
        engine.place_bet(1, "Player2", &id(1), 2).unwrap();
        engine.place_bet(0, "TeamB", &id(2), 1).unwrap();
        engine.place_bet(1, "Player1", &id(2), 4).unwrap();

        let first = engine.resolve(0, "TeamA", &OWNER).unwrap();
        let second = engine.resolve(1, "Player1", &OWNER).unwrap();

        assert_eq!(first.paid_to(&id(1)), 4);
        assert_eq!(second.paid_to(&id(2)), 6);
        // Net: id(1) staked 5, won 4; id(2) staked 5, won 6.
        assert_eq!(engine.custody().balance_of(&id(1)), 999);
        assert_eq!(engine.custody().balance_of(&id(2)), 1001);
    }

    #[test]
    fn test_many_bettors_even_split() {
        let mut engine = engine_with_bet(&["Runner1", "Runner2"]);
        for i in 0..60u8 {
            let who = id(i % 10 + 1);
            let option = if i % 2 == 0 { "Runner1" } else { "Runner2" };
            engine.place_bet(0, option, &who, 1).unwrap();
        }

        let report = engine.resolve(0, "Runner1", &OWNER).unwrap();
        let info = engine.get_option_info(0).unwrap();

        assert_eq!(info.total_pot, 60);
        assert_eq!(info.option_totals, vec![30, 30]);
        // Even-indexed iterations always map to odd account numbers.
        for n in [1u8, 3, 5, 7, 9] {
            assert_eq!(report.paid_to(&id(n)), 12);
        }
        for n in [2u8, 4, 6, 8, 10] {
            assert_eq!(report.paid_to(&id(n)), 0);
        }
    }

    #[test]
    fn test_floor_residual_is_retained() {
        let mut engine = engine_with_bet(&["A", "B"]);
        for n in 1..=3 {
            engine.place_bet(0, "A", &id(n), 1).unwrap();
        }
        engine.place_bet(0, "B", &id(4), 1).unwrap();

        let report = engine.resolve(0, "A", &OWNER).unwrap();
        assert_eq!(report.total_paid(), 3);
        assert_eq!(report.retained(), 1);
        assert_eq!(engine.custody().held(), 1);
    }

    #[test]
    fn test_event_order_matches_transitions() {
        let mut engine = engine_with_bet(&["A", "B"]);
        engine.place_bet(0, "A", &id(1), 1).unwrap();
        engine.resolve(0, "A", &OWNER).unwrap();

        let kinds: Vec<u64> = engine.sink().iter().map(|e| e.sequence).collect();
        assert_eq!(kinds, vec![0, 1, 2]);
        assert!(matches!(engine.sink()[0].data, LedgerEventData::BetCreated { .. }));
        assert!(matches!(engine.sink()[1].data, LedgerEventData::BetPlaced { .. }));
        assert!(matches!(engine.sink()[2].data, LedgerEventData::BetResolved { .. }));
    }

    #[test]
    fn test_journal_records_mutations_only() {
        let mut engine = engine().with_journal();
        engine.create_bet(&OWNER, "Quiz", &labels(&["A", "B"])).unwrap();
        let _ = engine.place_bet(0, "C", &id(1), 1);
        engine.place_bet(0, "A", &id(1), 1).unwrap();
        engine.resolve(0, "A", &OWNER).unwrap();

        let journal = engine.journal().unwrap();
        assert_eq!(journal.len(), 3);
        assert_eq!(journal.last_hash(), Some(engine.state_hash()));
    }

    #[test]
    fn test_randomized_bettors_conserve_value() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut engine = engine_with_bet(&["A", "B", "C"]);
        let options = ["A", "B", "C"];

        for _ in 0..200 {
            let who = id(rng.gen_range(1..=10));
            let option = options[rng.gen_range(0..3)];
            let amount = rng.gen_range(1..=5);
            engine.place_bet(0, option, &who, amount).unwrap();
        }

        let pot = engine.get_option_info(0).unwrap().total_pot;
        let report = engine.resolve(0, "B", &OWNER).unwrap();

        assert!(report.total_paid() <= pot);
        assert_eq!(engine.custody().held(), report.retained());
        assert!(engine.custody().is_balanced());
    }

    proptest! {
        #[test]
        fn pot_equals_sum_of_totals(stakes in prop::collection::vec((1u8..=5, 0usize..3, 1u128..1_000_000), 1..40)) {
            let mut escrow = Escrow::new();
            for n in 1..=5 {
                escrow.fund(id(n), u64::MAX as u128).unwrap();
            }
            let mut engine: TestEngine = BetLifecycleEngine::new(OWNER, escrow, Vec::new());
            engine.create_bet(&OWNER, "Prop", &labels(&["A", "B", "C"])).unwrap();
            let options = ["A", "B", "C"];

            for (who, option, amount) in &stakes {
                let before = engine.get_option_info(0).unwrap();
                engine.place_bet(0, options[*option], &id(*who), *amount).unwrap();
                let after = engine.get_option_info(0).unwrap();

                prop_assert_eq!(after.total_pot, before.total_pot + amount);
                prop_assert_eq!(after.option_totals[*option], before.option_totals[*option] + amount);
                prop_assert_eq!(after.total_pot, after.option_totals.iter().sum::<u128>());
            }

            let participant_sum: u128 = engine
                .get_bet(0)
                .unwrap()
                .participant_bets()
                .values()
                .flat_map(|entries| entries.iter().map(|e| e.amount))
                .sum();
            prop_assert_eq!(participant_sum, engine.get_option_info(0).unwrap().total_pot);
        }

        #[test]
        fn rewards_never_exceed_pot(stakes in prop::collection::vec((1u8..=5, 0usize..2, 1u128..1_000_000), 1..40), winner in 0usize..2) {
            let mut escrow = Escrow::new();
            for n in 1..=5 {
                escrow.fund(id(n), u64::MAX as u128).unwrap();
            }
            let mut engine: TestEngine = BetLifecycleEngine::new(OWNER, escrow, Vec::new());
            engine.create_bet(&OWNER, "Prop", &labels(&["A", "B"])).unwrap();
            let options = ["A", "B"];

            for (who, option, amount) in &stakes {
                engine.place_bet(0, options[*option], &id(*who), *amount).unwrap();
            }

            let pot = engine.get_option_info(0).unwrap().total_pot;
            let report = engine.resolve(0, options[winner], &OWNER).unwrap();

            prop_assert!(report.total_paid() <= pot);
            prop_assert!(report.payouts.iter().all(|r| r.is_paid()));
            prop_assert!(engine.custody().is_balanced());
        }
    }
}
