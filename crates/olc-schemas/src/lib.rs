//! olc-schemas
//!
//! Shared order types for the order-lifecycle coordinator:
//! - `ExchangeOrder` / `ExchangeOrderState`: the venue's view of an order,
//!   as delivered by push updates
//! - `OutboundOrderRequest`: the pre-send order description
//! - integer-micros price helpers used at the wire boundary
//! - client-id (`cid`) generation for request/acknowledgement correlation
//!
//! No IO, no locking. Everything here is plain data.

mod client_id;
mod order;
mod prices;
mod request;

pub use client_id::{next_client_id, ClientIdGenerator};
pub use order::{ExchangeOrder, ExchangeOrderState, OrderType, Side};
pub use prices::{micros_to_price, price_to_micros, PricingError, MICROS_PER_UNIT};
pub use request::OutboundOrderRequest;
