//! Scenario: subscriber dispatch.
//!
//! # Invariants under test
//!
//! 1. Callbacks never run on the thread that delivered the update.
//! 2. A panicking subscriber does not prevent other subscribers (the
//!    ephemeral waiter included) from receiving the update, and does not
//!    reach the producer.
//! 3. A callback may re-enter the coordinator (read the snapshot, register
//!    another callback) without deadlocking.
//! 4. Many concurrent place-and-wait callers are each released by their own
//!    update.

use std::sync::{mpsc, Arc};

use olc_testkit::{active, limit_buy, Harness, RECV_TIMEOUT};

#[test]
fn callbacks_run_off_the_producer_thread() -> anyhow::Result<()> {
    let h = Harness::new(RECV_TIMEOUT)?;
    let (tx, rx) = mpsc::channel();
    let _sub = h.manager.subscribe(move |_| {
        let _ = tx.send(std::thread::current().id());
    });

    h.manager.apply_update(active(1, 0));

    assert_ne!(rx.recv_timeout(RECV_TIMEOUT)?, std::thread::current().id());
    Ok(())
}

#[test]
fn panicking_subscriber_is_contained() -> anyhow::Result<()> {
    let h = Harness::new(RECV_TIMEOUT)?;
    let _bad = h.manager.subscribe(|_| panic!("strategy bug"));

    h.manager.place_order_and_wait_until_active(limit_buy(6001))?;
    h.manager.place_order_and_wait_until_active(limit_buy(6002))?;

    assert_eq!(h.manager.snapshot().len(), 2);
    assert_eq!(h.manager.subscriber_count(), 1);
    Ok(())
}

#[test]
fn callback_may_reenter_the_coordinator() -> anyhow::Result<()> {
    let h = Harness::new(RECV_TIMEOUT)?;
    let (tx, rx) = mpsc::channel();
    let manager = Arc::downgrade(&h.manager);
    let _sub = h.manager.subscribe(move |_| {
        if let Some(m) = manager.upgrade() {
            let seen = m.snapshot().len();
            let id = m.register(|_| {});
            m.remove(id);
            let _ = tx.send(seen);
        }
    });

    h.manager.apply_update(active(1, 0));
    assert_eq!(rx.recv_timeout(RECV_TIMEOUT)?, 1);
    Ok(())
}

#[test]
fn concurrent_waiters_are_each_released() -> anyhow::Result<()> {
    let h = Harness::new(RECV_TIMEOUT)?;

    let waiters: Vec<_> = (0..16).map(|i| h.spawn_place(limit_buy(7000 + i))).collect();
    for w in waiters {
        w.join().expect("waiter thread")?;
    }

    let mut cids: Vec<i64> = h.manager.snapshot().iter().map(|o| o.cid).collect();
    cids.sort_unstable();
    assert_eq!(cids, (7000..7016).collect::<Vec<_>>());
    assert_eq!(h.manager.subscriber_count(), 0);
    Ok(())
}
