//! Deterministic in-memory "paper" venue.
//!
//! Implements [`VenueConnection`] and answers every request with push
//! updates, the way a live venue session would, through an attached
//! [`OrderUpdateSink`].
//!
//! Design decisions (kept deterministic):
//! - Exchange order ids are assigned monotonically from 1, per venue.
//! - No randomness. No wall-clock timestamps: `created_ms`/`updated_ms` carry
//!   a logical tick that advances once per pushed update.
//! - Behaviour per request is scripted with [`PlaceOutcome`] /
//!   [`CancelOutcome`] queues; an empty queue means `Ack`.
//! - Pushed updates are built under the venue lock and delivered after it is
//!   released, so a sink may call straight back into the venue.
//! - The sink is held weakly. Once the coordinator is dropped, pushes are
//!   discarded.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use olc_config::secrets::ResolvedSecrets;
use olc_execution::{OrderUpdateSink, TransportError, VenueConnection};
use olc_schemas::{ExchangeOrder, ExchangeOrderState, OutboundOrderRequest};
use parking_lot::Mutex;
use tracing::{debug, trace};

pub mod types;

pub use types::{CancelOutcome, DeliveryMode, PaperVenueError, PlaceOutcome, PlacedOrder};

pub const PAPER_API_KEY: &str = "paper-api-key";

#[derive(Debug, Default)]
struct VenueBook {
    next_order_id: i64,
    tick: i64,
    /// Resting orders keyed by exchange order id.
    resting: BTreeMap<i64, ExchangeOrder>,
    placed: Vec<PlacedOrder>,
    cancelled: Vec<i64>,
    place_script: VecDeque<PlaceOutcome>,
    cancel_script: VecDeque<CancelOutcome>,
    delivery: DeliveryMode,
    pending: VecDeque<ExchangeOrder>,
}

impl VenueBook {
    fn stamp(&mut self, mut order: ExchangeOrder) -> ExchangeOrder {
        self.tick += 1;
        order.updated_ms = self.tick;
        order
    }
}

pub struct PaperVenue {
    authenticated: AtomicBool,
    api_key: String,
    book: Mutex<VenueBook>,
    sink: Mutex<Option<Weak<dyn OrderUpdateSink>>>,
}

impl Default for PaperVenue {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperVenue {
    /// Authenticated venue with inline delivery.
    pub fn new() -> Self {
        Self {
            authenticated: AtomicBool::new(true),
            api_key: PAPER_API_KEY.to_string(),
            book: Mutex::new(VenueBook {
                next_order_id: 1,
                ..VenueBook::default()
            }),
            sink: Mutex::new(None),
        }
    }

    /// Paper venue signing with the resolved venue api key, or
    /// [`PAPER_API_KEY`] when none is configured.
    pub fn from_secrets(secrets: &ResolvedSecrets) -> Self {
        let mut venue = Self::new();
        if let Some(key) = &secrets.venue_api_key {
            venue.api_key = key.clone();
        }
        venue
    }

    pub fn with_delivery(self, delivery: DeliveryMode) -> Self {
        self.book.lock().delivery = delivery;
        self
    }

    /// Route pushed updates to `sink` from now on.
    pub fn attach<S>(&self, sink: &Arc<S>)
    where
        S: OrderUpdateSink + 'static,
    {
        let weak = Arc::downgrade(sink);
        let weak: Weak<dyn OrderUpdateSink> = weak;
        *self.sink.lock() = Some(weak);
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    pub fn set_delivery(&self, delivery: DeliveryMode) {
        self.book.lock().delivery = delivery;
    }

    /// Queue the outcome of the next unscripted `place_order`.
    pub fn script_place(&self, outcome: PlaceOutcome) {
        self.book.lock().place_script.push_back(outcome);
    }

    /// Queue the outcome of the next unscripted `cancel_order`.
    pub fn script_cancel(&self, outcome: CancelOutcome) {
        self.book.lock().cancel_script.push_back(outcome);
    }

    /// Every request that left the process, in order.
    pub fn placed(&self) -> Vec<PlacedOrder> {
        self.book.lock().placed.clone()
    }

    /// Every cancel request that left the process, in order.
    pub fn cancelled(&self) -> Vec<i64> {
        self.book.lock().cancelled.clone()
    }

    /// Orders the venue considers open.
    pub fn resting(&self) -> Vec<ExchangeOrder> {
        self.book.lock().resting.values().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.book.lock().pending.len()
    }

    /// Deliver every queued update. Returns how many were delivered.
    pub fn flush(&self) -> usize {
        let pending: Vec<ExchangeOrder> = self.book.lock().pending.drain(..).collect();
        let n = pending.len();
        self.deliver_now(pending);
        n
    }

    /// Fill `fill_micros` of a resting order (unsigned). Pushes
    /// `PartiallyFilled`, or `Executed` once nothing remains, and returns the
    /// pushed order. Unknown ids push nothing.
    pub fn apply_fill(&self, order_id: i64, fill_micros: i64) -> Option<ExchangeOrder> {
        let update = {
            let mut book = self.book.lock();
            let mut order = book.resting.get(&order_id)?.clone();
            let remaining = order.amount_micros.abs().saturating_sub(fill_micros.abs()).max(0);
            order.amount_micros = remaining * order.amount_micros.signum();
            order.state = if remaining == 0 {
                ExchangeOrderState::Executed
            } else {
                ExchangeOrderState::PartiallyFilled
            };
            if order.price_micros.is_some() {
                order.price_avg_micros = order.price_micros;
            }
            let order = book.stamp(order);
            if order.state == ExchangeOrderState::Executed {
                book.resting.remove(&order_id);
            } else {
                book.resting.insert(order_id, order.clone());
            }
            order
        };
        debug!(order_id, state = %update.state, "paper fill");
        self.push(vec![update.clone()]);
        Some(update)
    }

    /// Push an arbitrary update, as if the venue had sent it unprompted.
    pub fn inject(&self, order: ExchangeOrder) {
        self.push(vec![order]);
    }

    fn push(&self, updates: Vec<ExchangeOrder>) {
        if updates.is_empty() {
            return;
        }
        let deferred = {
            let mut book = self.book.lock();
            if book.delivery == DeliveryMode::Deferred {
                book.pending.extend(updates.iter().cloned());
                true
            } else {
                false
            }
        };
        if !deferred {
            self.deliver_now(updates);
        }
    }

    fn deliver_now(&self, updates: Vec<ExchangeOrder>) {
        let sink = self.sink.lock().as_ref().and_then(Weak::upgrade);
        let Some(sink) = sink else {
            trace!(count = updates.len(), "no sink attached; updates dropped");
            return;
        };
        for order in updates {
            sink.on_order_update(order);
        }
    }

    fn order_from_request(order_id: i64, request: &OutboundOrderRequest) -> ExchangeOrder {
        ExchangeOrder {
            group_id: request.group_id,
            amount_micros: request.amount_micros,
            amount_at_creation_micros: request.amount_micros,
            order_type: request.order_type,
            price_micros: request.price_micros,
            hidden: request.hidden,
            api_key: request.api_key.clone(),
            ..ExchangeOrder::new(
                order_id,
                request.cid,
                request.symbol.clone(),
                ExchangeOrderState::Active,
            )
        }
    }
}

impl VenueConnection for PaperVenue {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    fn api_key(&self) -> String {
        self.api_key.clone()
    }

    fn place_order(&self, request: OutboundOrderRequest) -> Result<(), TransportError> {
        let updates = {
            let mut book = self.book.lock();
            let outcome = book.place_script.pop_front().unwrap_or_default();
            if outcome == PlaceOutcome::Refuse {
                return Err(Box::new(PaperVenueError::Refused {
                    what: format!("order cid={}", request.cid),
                }));
            }

            let order_id = book.next_order_id;
            book.next_order_id += 1;

            let mut order = Self::order_from_request(order_id, &request);
            book.tick += 1;
            order.created_ms = book.tick;
            book.placed.push(PlacedOrder { order_id, request });

            match outcome {
                PlaceOutcome::Ack => {
                    let order = book.stamp(order);
                    book.resting.insert(order_id, order.clone());
                    vec![order]
                }
                PlaceOutcome::Silent => {
                    let order = book.stamp(order);
                    book.resting.insert(order_id, order);
                    Vec::new()
                }
                PlaceOutcome::Reject => {
                    vec![book.stamp(order.with_state(ExchangeOrderState::Canceled))]
                }
                PlaceOutcome::Refuse => Vec::new(),
            }
        };
        debug!(pushed = updates.len(), "paper place");
        self.push(updates);
        Ok(())
    }

    fn cancel_order(&self, order_id: i64) -> Result<(), TransportError> {
        let updates = {
            let mut book = self.book.lock();
            let outcome = book.cancel_script.pop_front().unwrap_or_default();
            if outcome == CancelOutcome::Refuse {
                return Err(Box::new(PaperVenueError::Refused {
                    what: format!("cancel order_id={order_id}"),
                }));
            }
            book.cancelled.push(order_id);

            match (outcome, book.resting.get(&order_id).cloned()) {
                (_, None) | (CancelOutcome::Silent, _) | (CancelOutcome::Refuse, _) => Vec::new(),
                (CancelOutcome::Ack, Some(order)) => {
                    book.resting.remove(&order_id);
                    vec![book.stamp(order.with_state(ExchangeOrderState::Canceled))]
                }
                (CancelOutcome::PartialThenCancel, Some(order)) => {
                    book.resting.remove(&order_id);
                    let partial = book.stamp(order.with_state(ExchangeOrderState::PartiallyFilled));
                    let canceled = book.stamp(order.with_state(ExchangeOrderState::Canceled));
                    vec![partial, canceled]
                }
            }
        };
        debug!(order_id, pushed = updates.len(), "paper cancel");
        self.push(updates);
        Ok(())
    }
}

impl std::fmt::Debug for PaperVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperVenue")
            .field("authenticated", &self.is_authenticated())
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}
