use super::*;
use chrono::TimeZone;
use rust_decimal_macros::dec;

fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 1, 30, 0).unwrap() + Duration::seconds(secs)
}

fn sym(name: &str) -> Symbol {
    Symbol::from(name)
}

fn ledger(max: usize) -> SlotLedger {
    SlotLedger::new(max, Duration::seconds(60))
}

fn make_live(ledger: &mut SlotLedger, name: &str, at: i64) {
    ledger.begin_subscribe(&sym(name), t(at)).unwrap();
    ledger.confirm_subscribe(&sym(name), t(at)).unwrap();
}

// --- capacity tests ---

#[test]
fn new_ledger_has_full_capacity() {
    let ledger = ledger(3);
    assert_eq!(ledger.occupied(), 0);
    assert_eq!(ledger.available(), 3);
    assert!(ledger.is_empty());
}

#[test]
fn begin_subscribe_refuses_past_capacity() {
    let mut ledger = ledger(2);
    make_live(&mut ledger, "A", 0);
    ledger.begin_subscribe(&sym("B"), t(0)).unwrap();

    let err = ledger.begin_subscribe(&sym("C"), t(0)).unwrap_err();
    assert_eq!(err, LedgerError::CapacityExhausted { occupied: 2, max: 2 });
    assert_eq!(ledger.state_of(&sym("C")), SlotState::Unsubscribed);
    assert!(ledger.get(&sym("C")).is_none());
}

#[test]
fn pending_unsubscribe_counts_until_released() {
    let mut ledger = ledger(1);
    make_live(&mut ledger, "A", 0);
    ledger.begin_unsubscribe(&sym("A"), t(0)).unwrap();
    ledger.unsubscribe_sent(&sym("A")).unwrap();

    assert_eq!(ledger.available(), 0);
    assert!(ledger.release_expired(t(59)).is_empty());
    assert_eq!(ledger.available(), 0);

    assert_eq!(ledger.release_expired(t(60)), vec![sym("A")]);
    assert_eq!(ledger.available(), 1);
}

#[test]
fn counts_by_state() {
    let mut ledger = ledger(5);
    make_live(&mut ledger, "A", 0);
    ledger.begin_subscribe(&sym("B"), t(0)).unwrap();
    ledger.ensure(&sym("C"));
    let counts = ledger.counts();
    assert_eq!(counts.live, 1);
    assert_eq!(counts.pending_subscribe, 1);
    assert_eq!(counts.unsubscribed, 1);
    assert_eq!(counts.occupied(), 2);
}

// --- score precedence tests ---

#[test]
fn poll_score_ignored_for_live_entry_with_live_score() {
    let mut ledger = ledger(2);
    make_live(&mut ledger, "A", 0);
    ledger.observe_live(&sym("A"), 3.0, QuoteSample::new(dec!(10), t(1)));

    assert!(!ledger.observe_poll(&sym("A"), 9.0, None, t(2), false));
    let score = ledger.get(&sym("A")).unwrap().score().copied().unwrap();
    assert_eq!(score.value, 3.0);
    assert_eq!(score.source, ScoreSource::Live);
}

#[test]
fn live_score_precedence_lapses_after_ttl() {
    let mut ledger = ledger(2).with_live_score_ttl(Duration::seconds(5));
    make_live(&mut ledger, "A", 0);
    ledger.observe_live(&sym("A"), 3.0, QuoteSample::new(dec!(10), t(1)));

    assert!(!ledger.observe_poll(&sym("A"), 0.1, None, t(5), false));
    assert!(ledger.observe_poll(&sym("A"), 0.1, None, t(6), false));
    let score = ledger.get(&sym("A")).unwrap().score().copied().unwrap();
    assert_eq!(score.value, 0.1);
    assert_eq!(score.source, ScoreSource::Poll);
}

#[test]
fn observe_poll_creates_entries_lazily() {
    let mut ledger = ledger(2);
    assert!(ledger.observe_poll(
        &sym("A"),
        1.5,
        Some(QuoteSample::new(dec!(5), t(0))),
        t(0),
        false
    ));
    let entry = ledger.get(&sym("A")).unwrap();
    assert_eq!(entry.state(), SlotState::Unsubscribed);
    assert_eq!(entry.last_sample().unwrap().price, dec!(5));
}

// --- lifecycle tests ---

#[test]
fn unknown_symbol_is_reported() {
    let mut ledger = ledger(2);
    assert!(matches!(
        ledger.confirm_subscribe(&sym("X"), t(0)),
        Err(LedgerError::UnknownSymbol { .. })
    ));
}

#[test]
fn failure_bookkeeping_on_unknown_symbol_is_an_error() {
    let mut ledger = ledger(2);
    assert!(matches!(
        ledger.record_failure(&sym("X"), t(5)),
        Err(LedgerError::UnknownSymbol { .. })
    ));
    assert!(ledger.reset_failures(&sym("X")).is_err());
    assert!(ledger.mark_ineligible(&sym("X")).is_err());
    assert!(ledger.is_empty());
}

#[test]
fn promote_overdue_only_touches_accepted_entries() {
    let mut ledger = ledger(3);
    ledger.begin_subscribe(&sym("A"), t(0)).unwrap();
    ledger.subscribe_returned(&sym("A"), false, t(0)).unwrap();
    ledger.begin_subscribe(&sym("B"), t(0)).unwrap();

    let promoted = ledger.promote_overdue(t(10), Duration::seconds(10));
    assert_eq!(promoted, vec![sym("A")]);
    assert_eq!(ledger.state_of(&sym("A")), SlotState::Live);
    assert_eq!(ledger.state_of(&sym("B")), SlotState::PendingSubscribe);
}

#[test]
fn disconnect_drops_live_and_keeps_draining_entries() {
    let mut ledger = ledger(4);
    make_live(&mut ledger, "A", 0);
    make_live(&mut ledger, "C", 0);
    make_live(&mut ledger, "D", 0);
    ledger.begin_unsubscribe(&sym("D"), t(5)).unwrap();
    ledger.begin_subscribe(&sym("B"), t(5)).unwrap();
    let epoch = ledger.connection_epoch();

    let dropped = ledger.disconnect();

    assert_eq!(dropped, vec![sym("A"), sym("C")]);
    assert_eq!(ledger.connection_epoch(), epoch + 1);
    assert!(ledger.get(&sym("A")).unwrap().is_recovering());
    assert_eq!(ledger.state_of(&sym("B")), SlotState::PendingSubscribe);
    assert!(!ledger.get(&sym("B")).unwrap().in_flight());
    assert_eq!(ledger.state_of(&sym("D")), SlotState::PendingUnsubscribe);
    assert_eq!(ledger.occupied(), 2);
    assert_eq!(ledger.release_expired(t(65)), vec![sym("D")]);
}

#[test]
fn reissue_pending_marks_calls_in_flight() {
    let mut ledger = ledger(2);
    ledger.begin_subscribe(&sym("B"), t(0)).unwrap();
    ledger.disconnect();

    assert_eq!(ledger.reissue_pending(t(3)), vec![sym("B")]);
    assert!(ledger.get(&sym("B")).unwrap().in_flight());
    assert!(ledger.reissue_pending(t(4)).is_empty());
}

#[test]
fn ineligible_reset_round_trip() {
    let mut ledger = ledger(2);
    ledger.ensure(&sym("A"));
    ledger.mark_ineligible(&sym("A")).unwrap();
    assert!(matches!(
        ledger.begin_subscribe(&sym("A"), t(0)),
        Err(LedgerError::Ineligible { .. })
    ));
    ledger.reset_ineligible(&sym("A")).unwrap();
    ledger.begin_subscribe(&sym("A"), t(0)).unwrap();
}

#[test]
fn assign_ranks_clears_previous_ranks() {
    let mut ledger = ledger(2);
    ledger.ensure(&sym("A"));
    ledger.ensure(&sym("B"));
    ledger.assign_ranks(&[sym("B"), sym("A")]);
    assert_eq!(ledger.get(&sym("B")).unwrap().priority_rank(), Some(0));

    ledger.assign_ranks(&[sym("A")]);
    assert_eq!(ledger.get(&sym("A")).unwrap().priority_rank(), Some(0));
    assert_eq!(ledger.get(&sym("B")).unwrap().priority_rank(), None);
}
