//! Scenario: every failed wait leaves the registry as it found it.
//!
//! # Invariants under test
//!
//! 1. No matching update within the window → `WaitError::Timeout` carrying
//!    the configured window, and `subscriber_count()` returns to its
//!    pre-call value.
//! 2. Long-lived subscriptions registered by other parties survive a failed
//!    wait.
//! 3. A transport refusal surfaces as `WaitError::Transport`, nothing is
//!    recorded as sent, and the waiter is removed.
//! 4. A late update arriving after a timeout is still applied to the store
//!    and does not disturb anything.

use std::time::Duration;

use olc_broker_paper::{CancelOutcome, PlaceOutcome};
use olc_execution::WaitError;
use olc_testkit::{active, limit_buy, Harness};

const WINDOW: Duration = Duration::from_millis(80);

#[test]
fn timeout_restores_subscriber_count() -> anyhow::Result<()> {
    let h = Harness::new(WINDOW)?;
    let _strategy = h.manager.subscribe(|_| {});
    let before = h.manager.subscriber_count();
    assert_eq!(before, 1);

    h.venue.script_place(PlaceOutcome::Silent);
    let err = h
        .manager
        .place_order_and_wait_until_active(limit_buy(3001))
        .unwrap_err();

    match err {
        WaitError::Timeout { waited, .. } => assert_eq!(waited, WINDOW),
        other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(h.manager.subscriber_count(), before);
    Ok(())
}

#[test]
fn late_update_after_timeout_is_still_stored() -> anyhow::Result<()> {
    let h = Harness::new(WINDOW)?;
    h.venue.script_place(PlaceOutcome::Silent);
    assert!(h
        .manager
        .place_order_and_wait_until_active(limit_buy(3002))
        .is_err());

    let order_id = h.venue.placed()[0].order_id;
    h.manager.apply_update(active(order_id, 3002));
    assert_eq!(h.manager.snapshot().len(), 1);
    assert_eq!(h.manager.subscriber_count(), 0);
    Ok(())
}

#[test]
fn transport_refusal_on_place() -> anyhow::Result<()> {
    let h = Harness::new(Duration::from_secs(5))?;
    h.venue.script_place(PlaceOutcome::Refuse);

    let err = h
        .manager
        .place_order_and_wait_until_active(limit_buy(3003))
        .unwrap_err();

    assert!(matches!(err, WaitError::Transport(_)), "{err}");
    assert!(h.venue.placed().is_empty());
    assert_eq!(h.manager.subscriber_count(), 0);
    Ok(())
}

#[test]
fn transport_refusal_on_cancel() -> anyhow::Result<()> {
    let h = Harness::new(Duration::from_secs(5))?;
    h.venue.script_cancel(CancelOutcome::Refuse);

    let err = h.manager.cancel_order_and_wait_for_completion(1).unwrap_err();

    assert!(matches!(err, WaitError::Transport(_)), "{err}");
    assert!(h.venue.cancelled().is_empty());
    assert_eq!(h.manager.subscriber_count(), 0);
    Ok(())
}
