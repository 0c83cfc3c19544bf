//! Shared helpers for scenario tests.
//!
//! - [`init_tracing`]: idempotent `tracing-subscriber` setup honouring
//!   `RUST_LOG` (default `info`), writing through the test harness capture.
//! - Order builders for hand-fed push updates.
//! - [`Harness`]: an [`OrderManager`] wired to a [`PaperVenue`] with a short
//!   wait window.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use olc_broker_paper::{DeliveryMode, PaperVenue};
use olc_config::CoordinatorConfig;
use olc_execution::{OrderManager, Subscription, WaitError};
use olc_schemas::{ExchangeOrder, ExchangeOrderState, OrderType, OutboundOrderRequest};
use tracing_subscriber::EnvFilter;

pub const TEST_SYMBOL: &str = "tBTCUSD";

/// Generous bound for "this should have happened already".
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Already initialised by another test in this binary: fine.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn order(order_id: i64, cid: i64, state: ExchangeOrderState) -> ExchangeOrder {
    ExchangeOrder::new(order_id, cid, TEST_SYMBOL, state)
}

pub fn active(order_id: i64, cid: i64) -> ExchangeOrder {
    order(order_id, cid, ExchangeOrderState::Active)
}

pub fn canceled(order_id: i64, cid: i64) -> ExchangeOrder {
    order(order_id, cid, ExchangeOrderState::Canceled)
}

/// 1.0 BTC exchange limit buy at 50 000 with a fixed cid.
pub fn limit_buy(cid: i64) -> OutboundOrderRequest {
    OutboundOrderRequest::new(TEST_SYMBOL, OrderType::ExchangeLimit, 1_000_000)
        .with_price_micros(50_000_000_000)
        .with_cid(cid)
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub manager: Arc<OrderManager>,
    pub venue: Arc<PaperVenue>,
}

impl Harness {
    /// Manager + inline paper venue, 2 dispatch workers, `wait` window.
    pub fn new(wait: Duration) -> Result<Self> {
        Self::with_delivery(wait, DeliveryMode::Inline)
    }

    pub fn with_delivery(wait: Duration, delivery: DeliveryMode) -> Result<Self> {
        init_tracing();
        let venue = Arc::new(PaperVenue::new().with_delivery(delivery));
        let cfg = CoordinatorConfig::default()
            .with_wait_timeout(wait)
            .with_dispatch_workers(2);
        let manager = Arc::new(OrderManager::new(venue.clone(), &cfg)?);
        venue.attach(&manager);
        Ok(Self { manager, venue })
    }

    /// Run `place_order_and_wait_until_active` on its own thread.
    pub fn spawn_place(&self, request: OutboundOrderRequest) -> JoinHandle<Result<(), WaitError>> {
        let manager = Arc::clone(&self.manager);
        std::thread::spawn(move || manager.place_order_and_wait_until_active(request))
    }

    /// Run `cancel_order_and_wait_for_completion` on its own thread.
    pub fn spawn_cancel(&self, order_id: i64) -> JoinHandle<Result<(), WaitError>> {
        let manager = Arc::clone(&self.manager);
        std::thread::spawn(move || manager.cancel_order_and_wait_for_completion(order_id))
    }

    /// Subscription forwarding every update into a channel.
    pub fn tap(&self) -> (Subscription<ExchangeOrder>, mpsc::Receiver<ExchangeOrder>) {
        let (tx, rx) = mpsc::channel();
        let sub = self.manager.subscribe(move |o| {
            let _ = tx.send(o.clone());
        });
        (sub, rx)
    }

    /// Block until the waiter registered by a spawned workflow is visible, so
    /// a deferred flush cannot race it. Panics after [`RECV_TIMEOUT`].
    pub fn await_subscribers(&self, n: usize) {
        let deadline = std::time::Instant::now() + RECV_TIMEOUT;
        while self.manager.subscriber_count() < n {
            assert!(
                std::time::Instant::now() < deadline,
                "expected {n} subscribers, have {}",
                self.manager.subscriber_count()
            );
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Block until the paper venue has queued `n` undelivered updates.
    pub fn await_pending(&self, n: usize) {
        let deadline = std::time::Instant::now() + RECV_TIMEOUT;
        while self.venue.pending_len() < n {
            assert!(
                std::time::Instant::now() < deadline,
                "expected {n} pending updates, have {}",
                self.venue.pending_len()
            );
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}
