//! olc-execution
//!
//! Order-lifecycle coordination for a venue client.
//!
//! - [`OrderStore`]: the in-memory table of open orders. One mutation path,
//!   `apply_update`, which replaces by `order_id` and drops canceled orders.
//! - [`CallbackRegistry`]: generic subscriber set. Every `notify` fans out to
//!   all subscribers on the bounded [`DispatchPool`], never on the producer's
//!   thread; a panicking subscriber is contained.
//! - [`OrderManager`]: owns both, ingests push updates from the connection,
//!   and turns "the next update matching P" into a blocking call
//!   (place-and-wait, cancel-and-wait) with a bounded timeout.
//!
//! ```text
//! connection thread ──► OrderManager::apply_update
//!                           ├── OrderStore::apply_update     (store lock)
//!                           └── CallbackRegistry::notify     (registry lock, released)
//!                                  └── DispatchPool ──► callback(order) ...
//!                                                         └── ephemeral waiter ──► oneshot ──► blocked caller
//! ```
//!
//! The store lock and the registry lock are never held together, and no lock
//! is held while a callback runs.

mod connection;
mod dispatch;
mod error;
mod manager;
mod registry;
mod store;

pub use connection::{OrderUpdateSink, TransportError, VenueConnection};
pub use dispatch::DispatchPool;
pub use error::WaitError;
pub use manager::OrderManager;
pub use registry::{CallbackId, CallbackRegistry, Subscription};
pub use store::OrderStore;
