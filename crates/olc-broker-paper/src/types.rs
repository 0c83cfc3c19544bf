use olc_schemas::OutboundOrderRequest;
use thiserror::Error;

/// How the paper venue answers the next `place_order`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaceOutcome {
    /// Accept and push `Active`.
    #[default]
    Ack,
    /// Refuse on the venue side. The venue reports refused orders as
    /// `Canceled`, so that is what gets pushed.
    Reject,
    /// Accept and rest the order, but push nothing.
    Silent,
    /// Fail the send locally; nothing reaches the venue.
    Refuse,
}

/// How the paper venue answers the next `cancel_order`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Push `Canceled` for a known order.
    #[default]
    Ack,
    /// Push `PartiallyFilled`, then `Canceled`.
    PartialThenCancel,
    /// Record the request, push nothing, keep the order resting.
    Silent,
    /// Fail the send locally.
    Refuse,
}

/// When pushed updates reach the attached sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// On the requesting thread, before `place_order`/`cancel_order` returns.
    #[default]
    Inline,
    /// Queued until [`PaperVenue::flush`](crate::PaperVenue::flush).
    Deferred,
}

/// A request the venue accepted for sending, with the order id it assigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order_id: i64,
    pub request: OutboundOrderRequest,
}

#[derive(Debug, Error)]
pub enum PaperVenueError {
    #[error("paper venue refused {what}")]
    Refused { what: String },
}
