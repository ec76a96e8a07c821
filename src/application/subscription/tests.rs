use std::collections::HashSet;

use super::*;
use crate::domain::score::COLD_START;
use crate::domain::{Candidate, QuoteSample, ScoreSource};
use crate::error::ProviderError;
use crate::port::SubscribeAck;
use chrono::TimeZone;
use rust_decimal::Decimal;

fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 1, 30, 0).unwrap() + Duration::seconds(secs)
}

fn sym(name: &str) -> Symbol {
    Symbol::from(name)
}

fn snapshot(at: DateTime<Utc>, scores: &[(&str, f64)]) -> CandidateSnapshot {
    CandidateSnapshot::new(
        at,
        scores
            .iter()
            .map(|(name, score)| Candidate::new(sym(name), *score))
            .collect(),
    )
}

fn manager() -> SubscriptionManager {
    SubscriptionManager::new(SubscriptionPolicy::default())
}

fn make_live(ledger: &mut SlotLedger, name: &str) {
    ledger.begin_subscribe(&sym(name), t(-300)).unwrap();
    ledger.confirm_subscribe(&sym(name), t(-300)).unwrap();
}

fn confirm_all(mgr: &SubscriptionManager, ledger: &mut SlotLedger, plan: &ReconcilePlan, now: DateTime<Utc>) {
    for symbol in &plan.subscribe {
        mgr.apply_outcome(
            ledger,
            ActuationOutcome {
                symbol: symbol.clone(),
                kind: OutcomeKind::Subscribe(Ok(SubscribeAck::Confirmed)),
                epoch: plan.epoch,
            },
            now,
        );
    }
    for symbol in &plan.unsubscribe {
        mgr.apply_outcome(
            ledger,
            ActuationOutcome {
                symbol: symbol.clone(),
                kind: OutcomeKind::Unsubscribe(Ok(())),
                epoch: plan.epoch,
            },
            now,
        );
    }
}

fn subscribe_failed(symbol: &str, error: ProviderError, epoch: u64) -> ActuationOutcome {
    ActuationOutcome {
        symbol: sym(symbol),
        kind: OutcomeKind::Subscribe(Err(error)),
        epoch,
    }
}

// --- selection tests ---

#[test]
fn fills_free_slots_in_rank_order() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    let plan = mgr.reconcile(
        &mut ledger,
        &snapshot(t(0), &[("A", 1.0), ("B", 3.0), ("C", 2.0)]),
        t(0),
        PassMode::Full,
    );
    assert_eq!(plan.subscribe, vec![sym("B"), sym("C")]);
    assert_eq!(plan.backlog, Vec::<Symbol>::new());
    assert_eq!(ledger.get(&sym("A")).unwrap().priority_rank(), Some(2));
}

#[test]
fn cold_start_symbols_are_never_selected() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(5, Duration::seconds(60));
    let plan = mgr.reconcile(
        &mut ledger,
        &snapshot(t(0), &[("A", COLD_START), ("B", 0.8)]),
        t(0),
        PassMode::Full,
    );
    assert_eq!(plan.subscribe, vec![sym("B")]);
    assert_eq!(ledger.state_of(&sym("A")), SlotState::Unsubscribed);
}

#[test]
fn below_threshold_symbols_do_not_claim_slots() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(5, Duration::seconds(60));
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &[("A", 0.4)]), t(0), PassMode::Full);
    assert!(plan.subscribe.is_empty());
}

#[test]
fn ties_break_by_symbol() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(1, Duration::seconds(60));
    let plan = mgr.reconcile(
        &mut ledger,
        &snapshot(t(0), &[("B", 2.0), ("A", 2.0)]),
        t(0),
        PassMode::Full,
    );
    assert_eq!(plan.subscribe, vec![sym("A")]);
    assert_eq!(plan.backlog, vec![sym("B")]);
}

#[test]
fn retention_floor_keeps_live_symbol_when_room_remains() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    make_live(&mut ledger, "A");

    // 0.3 is below the threshold but above the floor.
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &[("A", 0.3)]), t(0), PassMode::Full);
    assert!(plan.unsubscribe.is_empty());
    assert_eq!(ledger.state_of(&sym("A")), SlotState::Live);

    let plan = mgr.reconcile(&mut ledger, &snapshot(t(5), &[("A", 0.2)]), t(5), PassMode::Full);
    assert_eq!(plan.unsubscribe, vec![sym("A")]);
}

#[test]
fn debounced_entrant_waits_but_holder_keeps_slot() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    make_live(&mut ledger, "A");
    let snap = CandidateSnapshot::new(
        t(0),
        vec![
            Candidate::new(sym("A"), 2.0).unstable(),
            Candidate::new(sym("B"), 3.0).unstable(),
        ],
    );
    let plan = mgr.reconcile(&mut ledger, &snap, t(0), PassMode::Full);
    assert!(plan.subscribe.is_empty());
    assert!(plan.unsubscribe.is_empty());
}

#[test]
fn ineligible_symbols_are_skipped() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    ledger.ensure(&sym("A"));
    ledger.mark_ineligible(&sym("A")).unwrap();
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &[("A", 5.0)]), t(0), PassMode::Full);
    assert!(plan.subscribe.is_empty());
    assert_eq!(ledger.get(&sym("A")).unwrap().priority_rank(), None);
}

#[test]
fn poll_only_mode_ranks_without_actuating() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    make_live(&mut ledger, "A");
    let plan = mgr.reconcile(
        &mut ledger,
        &snapshot(t(0), &[("A", 0.0), ("B", 5.0)]),
        t(0),
        PassMode::PollOnly,
    );
    assert!(plan.is_idle());
    assert_eq!(ledger.get(&sym("B")).unwrap().priority_rank(), Some(0));
}

// --- scenario tests ---

#[test]
fn higher_scorer_displaces_lowest_live_symbol() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    make_live(&mut ledger, "A");
    make_live(&mut ledger, "B");

    let plan = mgr.reconcile(
        &mut ledger,
        &snapshot(t(0), &[("A", 9.0), ("B", 8.0), ("C", 10.0)]),
        t(0),
        PassMode::Full,
    );

    assert_eq!(plan.unsubscribe, vec![sym("B")]);
    assert_eq!(ledger.state_of(&sym("B")), SlotState::PendingUnsubscribe);
    assert_eq!(ledger.state_of(&sym("A")), SlotState::Live);
    // Both slots are still held by A and the draining B.
    assert!(plan.subscribe.is_empty());
    assert_eq!(plan.backlog, vec![sym("C")]);
    assert_eq!(ledger.occupied(), 2);
}

#[test]
fn unsubscribe_window_holds_capacity_until_latency_elapses() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    make_live(&mut ledger, "A");
    make_live(&mut ledger, "B");
    let scores = [("A", 9.0), ("B", 8.0), ("C", 10.0)];

    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &scores), t(0), PassMode::Full);
    confirm_all(&mgr, &mut ledger, &plan, t(0));
    assert_eq!(plan.unsubscribe, vec![sym("B")]);

    let plan = mgr.reconcile(&mut ledger, &snapshot(t(30), &scores), t(30), PassMode::Full);
    assert_eq!(ledger.state_of(&sym("B")), SlotState::PendingUnsubscribe);
    assert_eq!(ledger.occupied(), 2);
    assert_eq!(plan.backlog, vec![sym("C")]);
    assert!(plan.released.is_empty());

    let plan = mgr.reconcile(&mut ledger, &snapshot(t(61), &scores), t(61), PassMode::Full);
    assert_eq!(plan.released, vec![sym("B")]);
    assert_eq!(ledger.state_of(&sym("B")), SlotState::Unsubscribed);
    // Freed capacity is taken on the following pass.
    assert!(plan.subscribe.is_empty());

    let plan = mgr.reconcile(&mut ledger, &snapshot(t(62), &scores), t(62), PassMode::Full);
    assert_eq!(plan.subscribe, vec![sym("C")]);
}

#[test]
fn disconnected_symbols_resubscribe_before_new_entrants() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(3, Duration::seconds(60));
    make_live(&mut ledger, "A");
    make_live(&mut ledger, "C");

    let dropped = ledger.disconnect();
    assert_eq!(dropped, vec![sym("A"), sym("C")]);
    assert_eq!(ledger.state_of(&sym("A")), SlotState::Unsubscribed);
    assert_eq!(ledger.state_of(&sym("C")), SlotState::Unsubscribed);

    let plan = mgr.reconcile(
        &mut ledger,
        &snapshot(t(0), &[("A", 5.0), ("C", 4.0), ("D", 50.0)]),
        t(0),
        PassMode::Full,
    );
    assert_eq!(plan.subscribe, vec![sym("A"), sym("C"), sym("D")]);
    assert!(!ledger.get(&sym("A")).unwrap().is_recovering());
}

#[test]
fn recovering_symbols_take_the_last_free_slot() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    make_live(&mut ledger, "A");
    make_live(&mut ledger, "B");
    ledger.begin_unsubscribe(&sym("B"), t(-1)).unwrap();
    ledger.disconnect();

    let plan = mgr.reconcile(
        &mut ledger,
        &snapshot(t(0), &[("A", 5.0), ("D", 50.0)]),
        t(0),
        PassMode::Full,
    );
    assert_eq!(plan.subscribe, vec![sym("A")]);
    assert_eq!(plan.backlog, vec![sym("D")]);
}

// --- invariant tests ---

/// Small deterministic generator so the sequences are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn score(&mut self) -> f64 {
        (self.next() % 1000) as f64 / 100.0
    }
}

fn random_snapshot(rng: &mut Lcg, at: DateTime<Utc>) -> CandidateSnapshot {
    let names = ["A", "B", "C", "D", "E", "F", "G", "H"];
    CandidateSnapshot::new(
        at,
        names.iter().map(|n| Candidate::new(sym(n), rng.score())).collect(),
    )
}

fn run_sequence(seed: u64) -> Vec<ReconcilePlan> {
    let mgr = manager();
    let mut ledger = SlotLedger::new(3, Duration::seconds(20));
    let mut rng = Lcg(seed);
    let mut plans = Vec::new();
    let mut outstanding: HashSet<Symbol> = HashSet::new();

    for step in 0..200 {
        let now = t(step * 7);
        let plan = mgr.reconcile(&mut ledger, &random_snapshot(&mut rng, now), now, PassMode::Full);

        for symbol in plan.subscribe.iter().chain(&plan.unsubscribe) {
            assert!(outstanding.insert(symbol.clone()), "double actuation for {symbol}");
        }
        assert!(ledger.occupied() <= ledger.max_live_slots());

        // Complete roughly two thirds of outstanding calls each step.
        let mut done: Vec<Symbol> = outstanding.iter().cloned().collect();
        done.sort();
        for symbol in done {
            if rng.next() % 3 == 0 {
                continue;
            }
            outstanding.remove(&symbol);
            let kind = match ledger.state_of(&symbol) {
                SlotState::PendingSubscribe if rng.next() % 5 == 0 => {
                    OutcomeKind::Subscribe(Err(ProviderError::Transient("reset".into())))
                }
                SlotState::PendingSubscribe => OutcomeKind::Subscribe(Ok(SubscribeAck::Confirmed)),
                _ => OutcomeKind::Unsubscribe(Ok(())),
            };
            mgr.apply_outcome(
                &mut ledger,
                ActuationOutcome {
                    symbol,
                    kind,
                    epoch: plan.epoch,
                },
                now,
            );
            assert!(ledger.occupied() <= ledger.max_live_slots());
        }
        plans.push(plan);
    }
    plans
}

#[test]
fn capacity_never_exceeded_and_no_double_actuation() {
    for seed in [1, 7, 42, 1_000_003] {
        run_sequence(seed);
    }
}

#[test]
fn identical_inputs_produce_identical_plans() {
    assert_eq!(run_sequence(99), run_sequence(99));
}

#[test]
fn released_capacity_not_reused_before_latency() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(1, Duration::seconds(60));
    make_live(&mut ledger, "A");

    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &[("A", 0.0), ("B", 3.0)]), t(0), PassMode::Full);
    confirm_all(&mgr, &mut ledger, &plan, t(0));
    assert_eq!(plan.unsubscribe, vec![sym("A")]);

    for secs in [1, 20, 59, 60] {
        let plan = mgr.reconcile(
            &mut ledger,
            &snapshot(t(secs), &[("A", 0.0), ("B", 3.0)]),
            t(secs),
            PassMode::Full,
        );
        assert!(plan.subscribe.is_empty(), "slot reused at t={secs}");
    }
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(61), &[("B", 3.0)]), t(61), PassMode::Full);
    assert_eq!(plan.subscribe, vec![sym("B")]);
}

// --- outcome tests ---

#[test]
fn transient_failure_backs_off_then_retries() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &[("A", 2.0)]), t(0), PassMode::Full);
    mgr.apply_outcome(
        &mut ledger,
        subscribe_failed("A", ProviderError::Transient("eof".into()), plan.epoch),
        t(0),
    );
    assert_eq!(ledger.state_of(&sym("A")), SlotState::Unsubscribed);

    // Initial backoff is one second.
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &[("A", 2.0)]), t(0), PassMode::Full);
    assert!(plan.subscribe.is_empty());
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(1), &[("A", 2.0)]), t(1), PassMode::Full);
    assert_eq!(plan.subscribe, vec![sym("A")]);
}

#[test]
fn repeated_failures_demote_and_park() {
    let policy = SubscriptionPolicy {
        max_pending_retries: 2,
        ..SubscriptionPolicy::default()
    };
    let mgr = SubscriptionManager::new(policy);
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    let mut now = t(0);

    for _ in 0..2 {
        let plan = mgr.reconcile(&mut ledger, &snapshot(now, &[("A", 2.0)]), now, PassMode::Full);
        assert_eq!(plan.subscribe, vec![sym("A")]);
        mgr.apply_outcome(
            &mut ledger,
            subscribe_failed("A", ProviderError::Timeout { operation: "subscribe", after_ms: 10 }, plan.epoch),
            now,
        );
        now += Duration::seconds(5);
    }

    let entry = ledger.get(&sym("A")).unwrap();
    assert_eq!(entry.failures(), 0);
    assert!(entry.in_backoff(t(5) + Duration::seconds(59)));
    assert!(!entry.in_backoff(t(5) + Duration::seconds(60)));
}

#[test]
fn rejected_symbol_becomes_ineligible() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &[("A", 2.0)]), t(0), PassMode::Full);
    mgr.apply_outcome(
        &mut ledger,
        subscribe_failed(
            "A",
            ProviderError::Rejected { symbol: "A".into(), reason: "delisted".into() },
            plan.epoch,
        ),
        t(0),
    );
    assert!(ledger.get(&sym("A")).unwrap().is_ineligible());
    assert_eq!(ledger.available(), 2);
}

#[test]
fn failures_for_unknown_symbols_leave_the_ledger_alone() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    let epoch = ledger.connection_epoch();
    for error in [
        ProviderError::Rejected { symbol: "Z".into(), reason: "delisted".into() },
        ProviderError::Transient("reset".into()),
    ] {
        mgr.apply_outcome(&mut ledger, subscribe_failed("Z", error, epoch), t(0));
    }
    mgr.apply_outcome(
        &mut ledger,
        ActuationOutcome {
            symbol: sym("Z"),
            kind: OutcomeKind::Unsubscribe(Err(ProviderError::Transient("reset".into()))),
            epoch,
        },
        t(0),
    );
    assert!(ledger.is_empty());
    assert_eq!(ledger.available(), 2);
}

#[test]
fn capacity_error_demotes_pending_entry() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &[("A", 2.0)]), t(0), PassMode::Full);
    mgr.apply_outcome(
        &mut ledger,
        subscribe_failed("A", ProviderError::Capacity { symbol: "A".into() }, plan.epoch),
        t(0),
    );
    assert_eq!(ledger.state_of(&sym("A")), SlotState::Unsubscribed);
    assert!(ledger.get(&sym("A")).unwrap().in_backoff(t(0)));
}

#[test]
fn failed_unsubscribe_returns_to_live() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    make_live(&mut ledger, "A");
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &[("A", 0.0)]), t(0), PassMode::Full);
    mgr.apply_outcome(
        &mut ledger,
        ActuationOutcome {
            symbol: sym("A"),
            kind: OutcomeKind::Unsubscribe(Err(ProviderError::Transient("busy".into()))),
            epoch: plan.epoch,
        },
        t(0),
    );
    assert_eq!(ledger.state_of(&sym("A")), SlotState::Live);

    let plan = mgr.reconcile(&mut ledger, &snapshot(t(2), &[("A", 0.0)]), t(2), PassMode::Full);
    assert_eq!(plan.unsubscribe, vec![sym("A")]);
}

#[test]
fn accepted_subscribe_promoted_after_ack_timeout() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &[("A", 2.0)]), t(0), PassMode::Full);
    mgr.apply_outcome(
        &mut ledger,
        ActuationOutcome {
            symbol: sym("A"),
            kind: OutcomeKind::Subscribe(Ok(SubscribeAck::Accepted)),
            epoch: plan.epoch,
        },
        t(0),
    );
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(10), &[("A", 2.0)]), t(10), PassMode::Full);
    assert_eq!(plan.promoted, vec![sym("A")]);
    assert_eq!(ledger.state_of(&sym("A")), SlotState::Live);
}

#[test]
fn poll_only_pass_does_not_promote_accepted_subscribe() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &[("A", 2.0)]), t(0), PassMode::Full);
    mgr.apply_outcome(
        &mut ledger,
        ActuationOutcome {
            symbol: sym("A"),
            kind: OutcomeKind::Subscribe(Ok(SubscribeAck::Accepted)),
            epoch: plan.epoch,
        },
        t(0),
    );

    let plan = mgr.reconcile(&mut ledger, &snapshot(t(10), &[("A", 2.0)]), t(10), PassMode::PollOnly);
    assert!(plan.promoted.is_empty());
    assert_eq!(ledger.state_of(&sym("A")), SlotState::PendingSubscribe);

    let plan = mgr.reconcile(&mut ledger, &snapshot(t(11), &[("A", 2.0)]), t(11), PassMode::Full);
    assert_eq!(plan.promoted, vec![sym("A")]);
    assert_eq!(ledger.state_of(&sym("A")), SlotState::Live);
}

#[test]
fn silent_live_holder_yields_once_its_live_score_expires() {
    let mgr = manager();
    let mut ledger =
        SlotLedger::new(1, Duration::seconds(60)).with_live_score_ttl(Duration::seconds(30));
    make_live(&mut ledger, "A");
    ledger.observe_live(&sym("A"), 5.0, QuoteSample::new(Decimal::from(100), t(0)));

    let plan = mgr.reconcile(&mut ledger, &snapshot(t(20), &[("A", 0.0), ("B", 3.0)]), t(20), PassMode::Full);
    assert!(plan.unsubscribe.is_empty());
    assert_eq!(ledger.get(&sym("A")).unwrap().effective_score(), 5.0);

    let plan = mgr.reconcile(&mut ledger, &snapshot(t(30), &[("A", 0.0), ("B", 3.0)]), t(30), PassMode::Full);
    assert_eq!(plan.unsubscribe, vec![sym("A")]);
    assert_eq!(plan.backlog, vec![sym("B")]);
    let score = ledger.get(&sym("A")).unwrap().score().copied().unwrap();
    assert_eq!(score.source, ScoreSource::Poll);
}

#[test]
fn stale_epoch_results_are_discarded() {
    let mgr = manager();
    let mut ledger = SlotLedger::new(2, Duration::seconds(60));
    let plan = mgr.reconcile(&mut ledger, &snapshot(t(0), &[("A", 2.0)]), t(0), PassMode::Full);
    ledger.disconnect();
    mgr.apply_outcome(
        &mut ledger,
        ActuationOutcome {
            symbol: sym("A"),
            kind: OutcomeKind::Subscribe(Ok(SubscribeAck::Confirmed)),
            epoch: plan.epoch,
        },
        t(1),
    );
    assert_eq!(ledger.state_of(&sym("A")), SlotState::PendingSubscribe);
}
