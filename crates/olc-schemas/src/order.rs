//! Venue order representation.
//!
//! An [`ExchangeOrder`] is what the venue reports about one order on every
//! push update. The coordinator never builds one for a caller; they arrive
//! from the connection and are stored, replaced, or dropped from there.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ExchangeOrderState
// ---------------------------------------------------------------------------

/// Closed set of lifecycle states a venue reports for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeOrderState {
    /// Accepted but not yet working on the book.
    New,
    /// Working on the book, no fills.
    Active,
    /// Working on the book with at least one fill.
    PartiallyFilled,
    /// Fully filled. **Terminal.**
    Executed,
    /// Canceled by the caller or the venue. **Terminal.**
    Canceled,
    /// Post-only order that would have taken liquidity. **Terminal.**
    PostOnlyCanceled,
    /// Refused by the venue. **Terminal.**
    Rejected,
    /// Anything the venue sent that we do not recognise.
    Unknown,
}

impl ExchangeOrderState {
    /// Parse the venue's status string.
    ///
    /// Venues append fill details to some statuses
    /// (`"EXECUTED @ 9500.0(0.5)"`, `"PARTIALLY FILLED @ ..."`), so matching is
    /// on the leading status token. Unrecognised input maps to `Unknown`.
    pub fn from_venue_str(s: &str) -> Self {
        let s = s.trim();
        // Longest tokens first: "POSTONLY CANCELED" must not match "CANCELED".
        const TABLE: &[(&str, ExchangeOrderState)] = &[
            ("POSTONLY CANCELED", ExchangeOrderState::PostOnlyCanceled),
            ("PARTIALLY FILLED", ExchangeOrderState::PartiallyFilled),
            ("EXECUTED", ExchangeOrderState::Executed),
            ("CANCELED", ExchangeOrderState::Canceled),
            ("REJECTED", ExchangeOrderState::Rejected),
            ("ACTIVE", ExchangeOrderState::Active),
            ("NEW", ExchangeOrderState::New),
        ];
        TABLE
            .iter()
            .find(|(token, _)| s.starts_with(token))
            .map(|(_, state)| *state)
            .unwrap_or(ExchangeOrderState::Unknown)
    }

    pub fn as_venue_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Active => "ACTIVE",
            Self::PartiallyFilled => "PARTIALLY FILLED",
            Self::Executed => "EXECUTED",
            Self::Canceled => "CANCELED",
            Self::PostOnlyCanceled => "POSTONLY CANCELED",
            Self::Rejected => "REJECTED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// `true` if the venue will send no further updates for this order.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Executed | Self::Canceled | Self::PostOnlyCanceled | Self::Rejected
        )
    }

    /// `true` while the order can still trade.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::New | Self::Active | Self::PartiallyFilled)
    }
}

impl fmt::Display for ExchangeOrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_venue_str())
    }
}

// ---------------------------------------------------------------------------
// OrderType
// ---------------------------------------------------------------------------

/// Venue order types. `Exchange*` variants trade the spot wallet; the bare
/// variants trade margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    ExchangeMarket,
    Limit,
    ExchangeLimit,
    Stop,
    ExchangeStop,
    TrailingStop,
    ExchangeTrailingStop,
    Fok,
    ExchangeFok,
    StopLimit,
    ExchangeStopLimit,
}

impl OrderType {
    const ALL: [OrderType; 12] = [
        Self::Market,
        Self::ExchangeMarket,
        Self::Limit,
        Self::ExchangeLimit,
        Self::Stop,
        Self::ExchangeStop,
        Self::TrailingStop,
        Self::ExchangeTrailingStop,
        Self::Fok,
        Self::ExchangeFok,
        Self::StopLimit,
        Self::ExchangeStopLimit,
    ];

    pub fn from_venue_str(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.iter().copied().find(|t| t.as_venue_str() == s)
    }

    pub fn as_venue_str(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::ExchangeMarket => "EXCHANGE MARKET",
            Self::Limit => "LIMIT",
            Self::ExchangeLimit => "EXCHANGE LIMIT",
            Self::Stop => "STOP",
            Self::ExchangeStop => "EXCHANGE STOP",
            Self::TrailingStop => "TRAILING STOP",
            Self::ExchangeTrailingStop => "EXCHANGE TRAILING STOP",
            Self::Fok => "FOK",
            Self::ExchangeFok => "EXCHANGE FOK",
            Self::StopLimit => "STOP LIMIT",
            Self::ExchangeStopLimit => "EXCHANGE STOP LIMIT",
        }
    }

    /// `true` if the order needs a limit price.
    pub fn requires_price(&self) -> bool {
        !matches!(self, Self::Market | Self::ExchangeMarket)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_venue_str())
    }
}

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Derived from the sign of a signed amount: positive buys, negative sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// `None` for a zero amount.
    pub fn from_signed_amount(amount_micros: i64) -> Option<Self> {
        match amount_micros.signum() {
            1 => Some(Self::Buy),
            -1 => Some(Self::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// ExchangeOrder
// ---------------------------------------------------------------------------

/// One order as reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    /// Exchange-assigned id. Stable once assigned.
    pub order_id: i64,
    pub group_id: Option<i64>,
    /// Caller-assigned client id, echoed back by the venue.
    pub cid: i64,
    pub symbol: String,
    pub created_ms: i64,
    pub updated_ms: i64,
    /// Remaining signed amount (+buy, -sell), micros.
    pub amount_micros: i64,
    /// Signed amount when the order was created, micros.
    pub amount_at_creation_micros: i64,
    pub order_type: OrderType,
    pub state: ExchangeOrderState,
    pub price_micros: Option<i64>,
    pub price_avg_micros: Option<i64>,
    pub hidden: bool,
    pub api_key: Option<String>,
}

impl ExchangeOrder {
    /// Minimal order with zero amounts and an `ExchangeLimit` type; callers
    /// fill in the rest with struct update syntax.
    pub fn new(
        order_id: i64,
        cid: i64,
        symbol: impl Into<String>,
        state: ExchangeOrderState,
    ) -> Self {
        Self {
            order_id,
            group_id: None,
            cid,
            symbol: symbol.into(),
            created_ms: 0,
            updated_ms: 0,
            amount_micros: 0,
            amount_at_creation_micros: 0,
            order_type: OrderType::ExchangeLimit,
            state,
            price_micros: None,
            price_avg_micros: None,
            hidden: false,
            api_key: None,
        }
    }

    /// Copy of this order carrying a different state.
    pub fn with_state(&self, state: ExchangeOrderState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    pub fn side(&self) -> Option<Side> {
        Side::from_signed_amount(self.amount_at_creation_micros)
    }

    /// Filled amount (unsigned), micros.
    pub fn filled_micros(&self) -> i64 {
        (self.amount_at_creation_micros - self.amount_micros).abs()
    }
}
