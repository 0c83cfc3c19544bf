//! Seams to the venue connection.
//!
//! The session layer (authentication, reconnect, wire encoding) lives outside
//! this crate. It is reached through [`VenueConnection`], and it pushes order
//! updates back through [`OrderUpdateSink`].

use olc_schemas::{ExchangeOrder, OutboundOrderRequest};

/// Error from a transport send. Boxed so adapters keep their own error types.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What the coordinator needs from the connection/broker.
///
/// `place_order` and `cancel_order` are fire-and-forget: `Ok(())` means the
/// request left this process, not that the venue accepted it. The outcome
/// arrives later as a push update.
pub trait VenueConnection: Send + Sync {
    fn is_authenticated(&self) -> bool;

    fn api_key(&self) -> String;

    fn place_order(&self, request: OutboundOrderRequest) -> Result<(), TransportError>;

    fn cancel_order(&self, order_id: i64) -> Result<(), TransportError>;
}

/// Ingestion point for push updates.
///
/// Connections hold this as a `Weak` handle so the coordinator and the
/// connection do not keep each other alive.
pub trait OrderUpdateSink: Send + Sync {
    fn on_order_update(&self, order: ExchangeOrder);
}
