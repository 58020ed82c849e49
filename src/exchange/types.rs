//! Type definitions for the exchange REST surface.

use crate::utils::decimal::decimal_from_json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A fixed (base, quote) trading pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub base: String,
    pub quote: String,
}

impl Instrument {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Wire identifier, e.g. "usdt-dop".
    pub fn symbol(&self) -> String {
        format!("{}-{}", self.base, self.quote)
    }

    /// Balance field for the base asset, e.g. "usdt_available".
    pub fn base_balance_field(&self) -> String {
        format!("{}_available", self.base)
    }

    /// Balance field for the quote asset, e.g. "dop_available".
    pub fn quote_balance_field(&self) -> String {
        format!("{}_available", self.quote)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Order type. The grid only ever rests limit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
}

/// Available balances for one instrument, fetched fresh each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balances {
    /// Spendable base asset (funds sell orders)
    pub base_available: Decimal,
    /// Spendable quote asset (funds buy orders)
    pub quote_available: Decimal,
}

/// One price level of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Order book snapshot, best levels first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// Parse `{"bids": [[price, size], ...], "asks": [...]}`.
    ///
    /// Prices and sizes may be numbers or numeric strings; rows without a
    /// numeric price are skipped.
    pub fn from_json(value: &Value) -> Self {
        Self {
            bids: parse_levels(value.get("bids")),
            asks: parse_levels(value.get("asks")),
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|level| level.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|level| level.price)
    }

    /// Mid of best bid and best ask; `None` if either side is empty or the
    /// prices are out of range.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => crate::utils::decimal::midpoint(bid, ask),
            _ => None,
        }
    }
}

fn parse_levels(levels: Option<&Value>) -> Vec<BookLevel> {
    levels
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let row = row.as_array()?;
                    Some(BookLevel {
                        price: decimal_from_json(row.first()?)?,
                        size: row.get(1).and_then(decimal_from_json).unwrap_or(Decimal::ZERO),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// New limit order request, serialized as the signed JSON body.
///
/// Field order is significant: it is the order the body is signed in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub size: Decimal,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

impl OrderRequest {
    pub fn limit(symbol: impl Into<String>, side: OrderSide, price: Decimal, size: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            order_type: OrderType::Limit,
            price,
        }
    }
}

/// Exchange acknowledgment of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub id: String,
}
