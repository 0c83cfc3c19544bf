//! Outbound order request.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::client_id::next_client_id;
use crate::order::{OrderType, Side};
use crate::prices::{price_to_micros, PricingError};

/// The caller's intended order, before it is handed to the transport.
///
/// `cid` is assigned at construction; `api_key` is attached by the
/// coordinator immediately before dispatch. Once sent, the transport owns
/// the request.
///
/// **`api_key` is redacted in `Debug` output.**
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundOrderRequest {
    pub symbol: String,
    pub order_type: OrderType,
    /// Signed amount (+buy, -sell), micros.
    pub amount_micros: i64,
    pub price_micros: Option<i64>,
    pub price_trailing_micros: Option<i64>,
    pub price_aux_limit_micros: Option<i64>,
    pub hidden: bool,
    pub post_only: bool,
    pub group_id: Option<i64>,
    pub cid: i64,
    pub api_key: Option<String>,
}

impl OutboundOrderRequest {
    /// New request with a fresh `cid` from the process-wide generator.
    pub fn new(symbol: impl Into<String>, order_type: OrderType, amount_micros: i64) -> Self {
        Self {
            symbol: symbol.into(),
            order_type,
            amount_micros,
            price_micros: None,
            price_trailing_micros: None,
            price_aux_limit_micros: None,
            hidden: false,
            post_only: false,
            group_id: None,
            cid: next_client_id(),
            api_key: None,
        }
    }

    /// Exchange-wallet limit order from decimal caller input.
    ///
    /// # Errors
    /// [`PricingError`] if `amount` or `price` is not representable in micros.
    pub fn exchange_limit(
        symbol: impl Into<String>,
        amount: f64,
        price: f64,
    ) -> Result<Self, PricingError> {
        let amount_micros = price_to_micros(amount)?;
        let price_micros = price_to_micros(price)?;
        Ok(Self::new(symbol, OrderType::ExchangeLimit, amount_micros)
            .with_price_micros(price_micros))
    }

    /// Exchange-wallet market order from decimal caller input.
    pub fn exchange_market(symbol: impl Into<String>, amount: f64) -> Result<Self, PricingError> {
        Ok(Self::new(
            symbol,
            OrderType::ExchangeMarket,
            price_to_micros(amount)?,
        ))
    }

    pub fn with_price_micros(mut self, price_micros: i64) -> Self {
        self.price_micros = Some(price_micros);
        self
    }

    pub fn with_trailing_micros(mut self, price_trailing_micros: i64) -> Self {
        self.price_trailing_micros = Some(price_trailing_micros);
        self
    }

    pub fn with_aux_limit_micros(mut self, price_aux_limit_micros: i64) -> Self {
        self.price_aux_limit_micros = Some(price_aux_limit_micros);
        self
    }

    pub fn with_group_id(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Override the generated `cid`. The caller is then responsible for
    /// keeping it unique among in-flight requests.
    pub fn with_cid(mut self, cid: i64) -> Self {
        self.cid = cid;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn post_only(mut self) -> Self {
        self.post_only = true;
        self
    }

    pub fn side(&self) -> Option<Side> {
        Side::from_signed_amount(self.amount_micros)
    }
}

impl fmt::Debug for OutboundOrderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundOrderRequest")
            .field("symbol", &self.symbol)
            .field("order_type", &self.order_type)
            .field("amount_micros", &self.amount_micros)
            .field("price_micros", &self.price_micros)
            .field("price_trailing_micros", &self.price_trailing_micros)
            .field("price_aux_limit_micros", &self.price_aux_limit_micros)
            .field("hidden", &self.hidden)
            .field("post_only", &self.post_only)
            .field("group_id", &self.group_id)
            .field("cid", &self.cid)
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}
