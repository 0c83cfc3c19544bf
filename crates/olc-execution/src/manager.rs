//! Wait coordinator.
//!
//! [`OrderManager`] is the single ingestion point for push updates and the
//! owner of the two blocking workflows. Each workflow:
//!
//! 1. returns `Ok(())` without sending anything when the connection is not
//!    authenticated (logged at `error`),
//! 2. refuses with [`WaitError::InsideAsyncRuntime`], again without sending,
//!    when the caller's thread is driving an async runtime,
//! 3. subscribes an ephemeral waiter holding a one-shot sender,
//! 4. sends through the [`VenueConnection`],
//! 5. blocks on the one-shot raced against the wait timeout.
//!
//! The waiter is a [`Subscription`](crate::Subscription) guard, so it is
//! deregistered on success, timeout, interruption and transport failure
//! alike.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use olc_config::{CoordinatorConfig, StartupConfig};
use olc_schemas::{ExchangeOrder, ExchangeOrderState, OutboundOrderRequest};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::connection::{OrderUpdateSink, TransportError, VenueConnection};
use crate::dispatch::DispatchPool;
use crate::error::WaitError;
use crate::registry::{CallbackId, CallbackRegistry, Subscription};
use crate::store::OrderStore;

pub struct OrderManager {
    store: OrderStore,
    registry: CallbackRegistry<ExchangeOrder>,
    connection: Arc<dyn VenueConnection>,
    pool: Arc<DispatchPool>,
    wait_timeout: Duration,
}

impl OrderManager {
    pub fn new(connection: Arc<dyn VenueConnection>, config: &CoordinatorConfig) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(DispatchPool::new(config.dispatch_workers)?);
        info!(
            wait_timeout_ms = config.wait_timeout_ms,
            dispatch_workers = pool.workers(),
            "order manager ready"
        );
        Ok(Self {
            store: OrderStore::new(),
            registry: CallbackRegistry::new(Arc::clone(&pool)),
            connection,
            pool,
            wait_timeout: config.wait_timeout(),
        })
    }

    /// Build from resolved startup config: logs the config hash and mode, and
    /// warns once per config leaf nothing reads.
    pub fn from_startup(
        connection: Arc<dyn VenueConnection>,
        startup: &StartupConfig,
    ) -> Result<Self> {
        info!(
            mode = startup.mode.as_str(),
            config_hash = %startup.config_hash,
            venue = %startup.client.venue.name,
            "coordinator config resolved"
        );
        for leaf in &startup.unused_keys.unused_leaf_pointers {
            warn!(leaf = %leaf, "config key is not read by the coordinator");
        }
        Self::new(connection, &startup.client.coordinator)
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    pub fn store(&self) -> &OrderStore {
        &self.store
    }

    pub fn registry(&self) -> &CallbackRegistry<ExchangeOrder> {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Store facade
    // -----------------------------------------------------------------------

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn snapshot(&self) -> Vec<ExchangeOrder> {
        self.store.snapshot()
    }

    /// Apply a push update to the store, then fan it out to every subscriber.
    ///
    /// The store lock is released before the registry is touched.
    pub fn apply_update(&self, order: ExchangeOrder) {
        self.store.apply_update(order.clone());
        self.registry.notify(order);
    }

    // -----------------------------------------------------------------------
    // Registry facade
    // -----------------------------------------------------------------------

    pub fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&ExchangeOrder) + Send + Sync + 'static,
    {
        self.registry.register(callback)
    }

    pub fn remove(&self, id: CallbackId) -> bool {
        self.registry.remove(id)
    }

    /// Receive every order update until the returned guard is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription<ExchangeOrder>
    where
        F: Fn(&ExchangeOrder) + Send + Sync + 'static,
    {
        self.registry.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscriber_count()
    }

    // -----------------------------------------------------------------------
    // Blocking workflows
    // -----------------------------------------------------------------------

    /// Send `request` and block until the venue reports any update carrying
    /// its `cid`.
    ///
    /// A `Canceled` update (the venue's answer to a rejected order) also
    /// releases the wait; inspect [`OrderManager::snapshot`] or subscribe to
    /// tell the outcomes apart.
    ///
    /// # Errors
    /// [`WaitError::InsideAsyncRuntime`] without sending anything if called
    /// from a thread that is driving an async runtime.
    pub fn place_order_and_wait_until_active(
        &self,
        mut request: OutboundOrderRequest,
    ) -> Result<(), WaitError> {
        if !self.connection.is_authenticated() {
            error!(
                cid = request.cid,
                symbol = %request.symbol,
                "unable to place order: connection not authenticated"
            );
            return Ok(());
        }

        request.api_key = Some(self.connection.api_key());
        let cid = request.cid;
        info!(
            cid,
            symbol = %request.symbol,
            order_type = request.order_type.as_venue_str(),
            amount_micros = request.amount_micros,
            "placing order"
        );

        let connection = Arc::clone(&self.connection);
        self.send_and_wait(
            format!("order with cid {cid}"),
            move |order| order.cid == cid,
            move || connection.place_order(request),
        )
    }

    /// Request cancellation of `order_id` and block until the venue reports
    /// it `Canceled`. Other states for the same id do not release the wait.
    ///
    /// # Errors
    /// [`WaitError::InsideAsyncRuntime`] without sending anything if called
    /// from a thread that is driving an async runtime.
    pub fn cancel_order_and_wait_for_completion(&self, order_id: i64) -> Result<(), WaitError> {
        if !self.connection.is_authenticated() {
            error!(order_id, "unable to cancel order: connection not authenticated");
            return Ok(());
        }

        info!(order_id, "cancelling order");
        let connection = Arc::clone(&self.connection);
        self.send_and_wait(
            format!("cancel of order {order_id}"),
            move |order| {
                order.order_id == order_id && order.state == ExchangeOrderState::Canceled
            },
            move || connection.cancel_order(order_id),
        )
    }

    fn send_and_wait<P, S>(&self, what: String, matches: P, send: S) -> Result<(), WaitError>
    where
        P: Fn(&ExchangeOrder) -> bool + Send + Sync + 'static,
        S: FnOnce() -> Result<(), TransportError>,
    {
        // `block_on` cannot run here; refuse before anything irreversible.
        if Handle::try_current().is_ok() {
            error!(what = %what, "blocking wait called from inside an async runtime");
            return Err(WaitError::InsideAsyncRuntime { what });
        }

        let (tx, rx) = oneshot::channel::<()>();
        let tx = Mutex::new(Some(tx));
        let waiter = self.registry.subscribe(move |order| {
            if matches(order) {
                if let Some(tx) = tx.lock().take() {
                    // Receiver may already be gone after a timeout.
                    let _ = tx.send(());
                }
            }
        });
        debug!(callback_id = %waiter.id(), what = %what, "waiter registered");

        if let Err(err) = send() {
            warn!(what = %what, error = %err, "transport refused request");
            return Err(WaitError::Transport(err));
        }

        let wait = self.wait_timeout;
        // The timer must be created inside the runtime.
        let outcome = self
            .pool
            .block_on(async move { tokio::time::timeout(wait, rx).await });
        drop(waiter);

        match outcome {
            Ok(Ok(())) => {
                info!(what = %what, "wait satisfied");
                Ok(())
            }
            Ok(Err(_)) => {
                warn!(what = %what, "wait interrupted");
                Err(WaitError::Interrupted { what })
            }
            Err(_) => {
                let waited_ms = u64::try_from(self.wait_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(what = %what, waited_ms, "wait timed out");
                Err(WaitError::Timeout {
                    what,
                    waited: self.wait_timeout,
                })
            }
        }
    }
}

impl OrderUpdateSink for OrderManager {
    fn on_order_update(&self, order: ExchangeOrder) {
        self.apply_update(order);
    }
}

impl std::fmt::Debug for OrderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderManager")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .field("wait_timeout", &self.wait_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use olc_schemas::OrderType;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Weak;

    /// Connection that answers each request by pushing `reply` into the
    /// attached manager from a separate thread.
    struct StubConnection {
        authenticated: AtomicBool,
        sends: AtomicUsize,
        refuse: AtomicBool,
        reply: Mutex<Option<ExchangeOrderState>>,
        sink: Mutex<Option<Weak<OrderManager>>>,
        last_api_key: Mutex<Option<String>>,
    }

    impl StubConnection {
        fn new(authenticated: bool, reply: Option<ExchangeOrderState>) -> Arc<Self> {
            Arc::new(Self {
                authenticated: AtomicBool::new(authenticated),
                sends: AtomicUsize::new(0),
                refuse: AtomicBool::new(false),
                reply: Mutex::new(reply),
                sink: Mutex::new(None),
                last_api_key: Mutex::new(None),
            })
        }

        fn push_later(&self, order: ExchangeOrder) {
            let sink = self.sink.lock().clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                if let Some(manager) = sink.and_then(|w| w.upgrade()) {
                    manager.on_order_update(order);
                }
            });
        }
    }

    impl VenueConnection for StubConnection {
        fn is_authenticated(&self) -> bool {
            self.authenticated.load(Ordering::SeqCst)
        }

        fn api_key(&self) -> String {
            "stub-key".to_string()
        }

        fn place_order(&self, request: OutboundOrderRequest) -> Result<(), TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.refuse.load(Ordering::SeqCst) {
                return Err("socket closed".into());
            }
            *self.last_api_key.lock() = request.api_key.clone();
            if let Some(state) = *self.reply.lock() {
                self.push_later(ExchangeOrder::new(77, request.cid, request.symbol, state));
            }
            Ok(())
        }

        fn cancel_order(&self, order_id: i64) -> Result<(), TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if let Some(state) = *self.reply.lock() {
                self.push_later(ExchangeOrder::new(order_id, 0, "tBTCUSD", state));
            }
            Ok(())
        }
    }

    fn manager(conn: &Arc<StubConnection>, timeout_ms: u64) -> Arc<OrderManager> {
        let cfg = CoordinatorConfig::default()
            .with_wait_timeout(Duration::from_millis(timeout_ms))
            .with_dispatch_workers(2);
        let m = Arc::new(OrderManager::new(conn.clone(), &cfg).unwrap());
        *conn.sink.lock() = Some(Arc::downgrade(&m));
        m
    }

    fn request(cid: i64) -> OutboundOrderRequest {
        OutboundOrderRequest::new("tBTCUSD", OrderType::ExchangeLimit, 1_000_000)
            .with_price_micros(100_000_000)
            .with_cid(cid)
    }

    #[test]
    fn place_returns_once_matching_cid_arrives() {
        let conn = StubConnection::new(true, Some(ExchangeOrderState::Active));
        let m = manager(&conn, 2_000);

        m.place_order_and_wait_until_active(request(42)).unwrap();

        assert_eq!(conn.last_api_key.lock().as_deref(), Some("stub-key"));
        assert_eq!(m.subscriber_count(), 0);
    }

    #[test]
    fn place_times_out_and_deregisters() {
        let conn = StubConnection::new(true, None);
        let m = manager(&conn, 50);

        let err = m.place_order_and_wait_until_active(request(1)).unwrap_err();
        assert!(err.is_timeout(), "{err}");
        assert_eq!(m.subscriber_count(), 0);
    }

    #[test]
    fn unauthenticated_is_a_silent_no_op() {
        let conn = StubConnection::new(false, Some(ExchangeOrderState::Active));
        let m = manager(&conn, 50);

        m.place_order_and_wait_until_active(request(1)).unwrap();
        m.cancel_order_and_wait_for_completion(5).unwrap();
        assert_eq!(conn.sends.load(Ordering::SeqCst), 0);
        assert_eq!(m.subscriber_count(), 0);
    }

    #[test]
    fn transport_refusal_surfaces_and_cleans_up() {
        let conn = StubConnection::new(true, None);
        conn.refuse.store(true, Ordering::SeqCst);
        let m = manager(&conn, 2_000);

        let err = m.place_order_and_wait_until_active(request(1)).unwrap_err();
        assert!(matches!(err, WaitError::Transport(_)), "{err}");
        assert_eq!(m.subscriber_count(), 0);
    }

    #[test]
    fn cancel_ignores_non_canceled_updates() {
        let conn = StubConnection::new(true, Some(ExchangeOrderState::Active));
        let m = manager(&conn, 150);

        let err = m.cancel_order_and_wait_for_completion(9).unwrap_err();
        assert!(err.is_timeout(), "{err}");
    }

    #[test]
    fn cancel_returns_on_canceled() {
        let conn = StubConnection::new(true, Some(ExchangeOrderState::Canceled));
        let m = manager(&conn, 2_000);
        m.apply_update(ExchangeOrder::new(9, 0, "tBTCUSD", ExchangeOrderState::Active));

        m.cancel_order_and_wait_for_completion(9).unwrap();
        // The update reaches the store before the waiter is notified.
        assert!(m.snapshot().is_empty());
    }

    #[test]
    fn apply_update_fills_store_and_notifies() {
        let conn = StubConnection::new(true, None);
        let m = manager(&conn, 50);
        let (tx, rx) = std::sync::mpsc::channel();
        let _sub = m.subscribe(move |o| tx.send(o.order_id).unwrap());

        m.apply_update(ExchangeOrder::new(3, 0, "tBTCUSD", ExchangeOrderState::Active));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 3);
        assert_eq!(m.snapshot().len(), 1);
    }

    #[test]
    fn waiting_from_inside_a_runtime_sends_nothing() {
        let conn = StubConnection::new(true, Some(ExchangeOrderState::Canceled));
        let m = manager(&conn, 2_000);
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let (place, cancel) = rt.block_on(async {
            (
                m.place_order_and_wait_until_active(request(9200)),
                m.cancel_order_and_wait_for_completion(9),
            )
        });

        assert!(matches!(place, Err(WaitError::InsideAsyncRuntime { .. })), "{place:?}");
        assert!(matches!(cancel, Err(WaitError::InsideAsyncRuntime { .. })), "{cancel:?}");
        assert_eq!(conn.sends.load(Ordering::SeqCst), 0);
        assert_eq!(m.subscriber_count(), 0);
    }

    #[test]
    fn from_startup_uses_coordinator_section() {
        let loaded = olc_config::load_layered_yaml_from_strings(&[
            "coordinator:\n  wait_timeout_ms: 250\n  dispatch_workers: 1\n",
        ])
        .unwrap();
        let startup = loaded
            .resolve_startup(olc_config::UnusedKeyPolicy::Fail)
            .unwrap();
        let conn = StubConnection::new(true, None);

        let m = OrderManager::from_startup(conn, &startup).unwrap();
        assert_eq!(m.wait_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let conn = StubConnection::new(true, None);
        let cfg = CoordinatorConfig::default().with_dispatch_workers(0);
        let err = OrderManager::new(conn, &cfg).unwrap_err();
        assert!(err.to_string().contains("CONFIG_INVALID"), "{err}");
    }
}
