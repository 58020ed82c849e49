//! Venue-agnostic trading surface used by the strategy layer.
//!
//! Every operation reports failure as absence (`None` / `false`); the concrete
//! implementation has already logged the cause. This keeps the rebalance cycle
//! free of transport details and lets the paper exchange stand in for the live one.

use super::types::{Balances, Instrument, OrderAck, OrderBook, OrderRequest};
use async_trait::async_trait;

/// Trading operations the grid engine needs from a venue.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Available balances for both assets of `instrument`; missing fields read as zero.
    async fn get_balances(&self, instrument: &Instrument) -> Option<Balances>;

    /// Current order book for `symbol`; `None` if the fetch failed or the symbol is absent.
    async fn get_order_book(&self, symbol: &str) -> Option<OrderBook>;

    /// Submit a limit order; `Some` only when the venue returned an order id.
    async fn place_order(&self, order: &OrderRequest) -> Option<OrderAck>;

    /// Cancel every open order on `symbol`; `true` if the venue acknowledged.
    async fn cancel_all(&self, symbol: &str) -> bool;
}
