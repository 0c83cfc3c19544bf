//! Open-order table.
//!
//! # Invariants
//!
//! 1. At most one order per `order_id`.
//! 2. A `Canceled` update removes the entry and is never stored.
//! 3. `apply_update` is the only mutation besides `clear`; the removal and
//!    the conditional insert happen under one lock acquisition, so readers
//!    never see a half-applied update.
//!
//! Every read copies out. Nothing here hands a caller a live reference into
//! the table.
//!
//! After each mutation a revision counter is bumped and published through a
//! `watch` channel, for consumers that want "wake on any change".

use std::collections::BTreeMap;

use olc_schemas::{ExchangeOrder, ExchangeOrderState};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

pub struct OrderStore {
    orders: Mutex<BTreeMap<i64, ExchangeOrder>>,
    changes: watch::Sender<u64>,
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            orders: Mutex::new(BTreeMap::new()),
            changes,
        }
    }

    pub fn clear(&self) {
        self.orders.lock().clear();
        self.bump_revision();
        debug!("order store cleared");
    }

    /// Copy of all open orders, ordered by `order_id`.
    pub fn snapshot(&self) -> Vec<ExchangeOrder> {
        self.orders.lock().values().cloned().collect()
    }

    /// Replace the entry for `order.order_id`, or drop it if `order` is
    /// `Canceled`.
    pub fn apply_update(&self, order: ExchangeOrder) {
        let order_id = order.order_id;
        let state = order.state;
        let replaced = {
            let mut orders = self.orders.lock();
            let previous = orders.remove(&order_id);
            if state != ExchangeOrderState::Canceled {
                orders.insert(order_id, order);
            }
            previous.is_some()
        };
        self.bump_revision();
        debug!(order_id, state = %state, replaced, "order update applied");
    }

    pub fn get(&self, order_id: i64) -> Option<ExchangeOrder> {
        self.orders.lock().get(&order_id).cloned()
    }

    /// First open order carrying client id `cid`.
    pub fn find_by_cid(&self, cid: i64) -> Option<ExchangeOrder> {
        self.orders
            .lock()
            .values()
            .find(|o| o.cid == cid)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.orders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.lock().is_empty()
    }

    /// Receiver that observes the revision counter. `changed().await` wakes
    /// after the next mutation.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Number of mutations applied so far.
    pub fn revision(&self) -> u64 {
        *self.changes.borrow()
    }

    fn bump_revision(&self) {
        self.changes.send_modify(|rev| *rev += 1);
    }
}

impl std::fmt::Debug for OrderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderStore")
            .field("open_orders", &self.len())
            .field("revision", &self.revision())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn order(order_id: i64, cid: i64, state: ExchangeOrderState) -> ExchangeOrder {
        ExchangeOrder::new(order_id, cid, "tBTCUSD", state)
    }

    #[test]
    fn active_then_canceled_scenario() {
        let store = OrderStore::new();
        store.apply_update(order(1, 0, ExchangeOrderState::Active));
        assert_eq!(store.snapshot(), vec![order(1, 0, ExchangeOrderState::Active)]);

        store.apply_update(order(1, 0, ExchangeOrderState::Canceled));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn later_update_replaces_earlier() {
        let store = OrderStore::new();
        store.apply_update(order(5, 9, ExchangeOrderState::Active));
        store.apply_update(order(5, 9, ExchangeOrderState::PartiallyFilled));

        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].state, ExchangeOrderState::PartiallyFilled);
    }

    #[test]
    fn cancel_for_unknown_order_inserts_nothing() {
        let store = OrderStore::new();
        store.apply_update(order(3, 0, ExchangeOrderState::Canceled));
        assert!(store.is_empty());
    }

    #[test]
    fn terminal_states_other_than_canceled_are_kept() {
        let store = OrderStore::new();
        store.apply_update(order(1, 0, ExchangeOrderState::Executed));
        store.apply_update(order(2, 0, ExchangeOrderState::PostOnlyCanceled));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn snapshot_does_not_alias_internal_state() {
        let store = OrderStore::new();
        store.apply_update(order(1, 0, ExchangeOrderState::Active));
        let mut snap = store.snapshot();
        snap[0].state = ExchangeOrderState::Executed;
        snap.clear();
        assert_eq!(
            store.get(1).map(|o| o.state),
            Some(ExchangeOrderState::Active)
        );
    }

    #[test]
    fn find_by_cid_and_get() {
        let store = OrderStore::new();
        store.apply_update(order(10, 100, ExchangeOrderState::Active));
        store.apply_update(order(11, 101, ExchangeOrderState::New));
        assert_eq!(store.find_by_cid(101).map(|o| o.order_id), Some(11));
        assert!(store.find_by_cid(999).is_none());
        assert!(store.get(12).is_none());
    }

    #[test]
    fn clear_empties_and_bumps_revision() {
        let store = OrderStore::new();
        store.apply_update(order(1, 0, ExchangeOrderState::Active));
        let before = store.revision();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.revision(), before + 1);
    }

    #[test]
    fn every_update_is_signalled() {
        let store = OrderStore::new();
        let mut rx = store.subscribe_changes();
        assert!(!rx.has_changed().unwrap());

        store.apply_update(order(1, 0, ExchangeOrderState::Active));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);

        // A canceled update is still a mutation.
        store.apply_update(order(1, 0, ExchangeOrderState::Canceled));
        assert_eq!(*rx.borrow_and_update(), 2);
    }

    #[test]
    fn concurrent_updates_for_distinct_orders_all_land() {
        let store = Arc::new(OrderStore::new());
        let handles: Vec<_> = (0..8i64)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..100i64 {
                        let id = t * 1_000 + i;
                        store.apply_update(order(id, id, ExchangeOrderState::Active));
                        if i % 2 == 0 {
                            store.apply_update(order(id, id, ExchangeOrderState::Canceled));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 8 * 50);
        assert_eq!(store.revision(), 8 * 150);
    }
}
