//! Mock exchange for paper trading and tests.
//!
//! Holds balances, resting orders and a static order book in memory. Placing an
//! order reserves the funds it would lock on a real venue; cancel-all releases them.

use super::traits::ExchangeApi;
use super::types::*;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A simulated resting order.
#[derive(Debug, Clone, PartialEq)]
pub struct MockOrder {
    pub id: String,
    pub request: OrderRequest,
}

impl MockOrder {
    /// Funds locked by this order: quote for buys, base for sells.
    fn reserved(&self) -> Decimal {
        match self.request.side {
            OrderSide::Buy => self.request.size * self.request.price,
            OrderSide::Sell => self.request.size,
        }
    }
}

/// Mock trading state for paper trading.
#[derive(Debug, Clone, Default)]
pub struct MockExchangeState {
    pub balances: Balances,
    pub open_orders: Vec<MockOrder>,
    pub book: OrderBook,
    pub orders_placed: u64,
    pub orders_rejected: u64,
    pub cancel_calls: u64,
    /// Failure injection
    pub fail_balances: bool,
    pub fail_book: bool,
    pub fail_cancel: bool,
}

/// Mock client that simulates the exchange's REST responses.
pub struct MockExchange {
    state: Arc<RwLock<MockExchangeState>>,
    order_id_counter: AtomicU64,
}

impl MockExchange {
    /// Create a new mock exchange with starting balances.
    pub fn new(balances: Balances) -> Self {
        let state = MockExchangeState {
            balances,
            ..MockExchangeState::default()
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            order_id_counter: AtomicU64::new(1),
        }
    }

    /// Replace the simulated order book.
    pub async fn set_order_book(&self, book: OrderBook) {
        self.state.write().await.book = book;
    }

    pub async fn set_fail_balances(&self, fail: bool) {
        self.state.write().await.fail_balances = fail;
    }

    pub async fn set_fail_book(&self, fail: bool) {
        self.state.write().await.fail_book = fail;
    }

    pub async fn set_fail_cancel(&self, fail: bool) {
        self.state.write().await.fail_cancel = fail;
    }

    /// Get a copy of the current state.
    pub async fn get_state(&self) -> MockExchangeState {
        self.state.read().await.clone()
    }

    pub async fn open_orders(&self) -> Vec<MockOrder> {
        self.state.read().await.open_orders.clone()
    }
}

#[async_trait]
impl ExchangeApi for MockExchange {
    async fn get_balances(&self, instrument: &Instrument) -> Option<Balances> {
        let state = self.state.read().await;
        if state.fail_balances {
            warn!("[MOCK] Balance fetch failure injected");
            return None;
        }

        debug!(
            %instrument,
            base_available = %state.balances.base_available,
            quote_available = %state.balances.quote_available,
            "[MOCK] Balances"
        );
        Some(state.balances)
    }

    async fn get_order_book(&self, symbol: &str) -> Option<OrderBook> {
        let state = self.state.read().await;
        if state.fail_book {
            warn!(%symbol, "[MOCK] Order book failure injected");
            return None;
        }
        Some(state.book.clone())
    }

    async fn place_order(&self, order: &OrderRequest) -> Option<OrderAck> {
        let mut state = self.state.write().await;

        if order.size <= Decimal::ZERO || order.price <= Decimal::ZERO {
            state.orders_rejected += 1;
            warn!(side = %order.side, size = %order.size, price = %order.price, "[MOCK] Rejected non-positive order");
            return None;
        }

        let id = format!("mock-{}", self.order_id_counter.fetch_add(1, Ordering::SeqCst));
        let resting = MockOrder {
            id: id.clone(),
            request: order.clone(),
        };
        let reserved = resting.reserved();

        let available = match order.side {
            OrderSide::Buy => &mut state.balances.quote_available,
            OrderSide::Sell => &mut state.balances.base_available,
        };
        if reserved > *available {
            warn!(side = %order.side, %reserved, available = %*available, "[MOCK] Insufficient balance");
            state.orders_rejected += 1;
            return None;
        }
        *available -= reserved;

        state.open_orders.push(resting);
        state.orders_placed += 1;

        info!(%id, side = %order.side, size = %order.size, price = %order.price, "[MOCK] Order resting");
        Some(OrderAck { id })
    }

    async fn cancel_all(&self, symbol: &str) -> bool {
        let mut state = self.state.write().await;
        state.cancel_calls += 1;
        if state.fail_cancel {
            warn!(%symbol, "[MOCK] Cancel failure injected");
            return false;
        }

        let cancelled: Vec<MockOrder> = state
            .open_orders
            .iter()
            .filter(|o| o.request.symbol == symbol)
            .cloned()
            .collect();
        state.open_orders.retain(|o| o.request.symbol != symbol);

        for order in &cancelled {
            match order.request.side {
                OrderSide::Buy => state.balances.quote_available += order.reserved(),
                OrderSide::Sell => state.balances.base_available += order.reserved(),
            }
        }

        info!(%symbol, count = cancelled.len(), "[MOCK] Cancelled open orders");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn funded() -> MockExchange {
        MockExchange::new(Balances {
            base_available: dec!(100),
            quote_available: dec!(5800),
        })
    }

    #[tokio::test]
    async fn test_place_reserves_and_cancel_releases() {
        let exchange = funded();

        let buy = OrderRequest::limit("usdt-dop", OrderSide::Buy, dec!(50), dec!(10));
        let sell = OrderRequest::limit("usdt-dop", OrderSide::Sell, dec!(60), dec!(25));
        assert!(exchange.place_order(&buy).await.is_some());
        assert!(exchange.place_order(&sell).await.is_some());

        let state = exchange.get_state().await;
        assert_eq!(state.balances.quote_available, dec!(5300));
        assert_eq!(state.balances.base_available, dec!(75));
        assert_eq!(state.open_orders.len(), 2);

        assert!(exchange.cancel_all("usdt-dop").await);
        let state = exchange.get_state().await;
        assert_eq!(state.balances.quote_available, dec!(5800));
        assert_eq!(state.balances.base_available, dec!(100));
        assert!(state.open_orders.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_zero_size_and_overspend() {
        let exchange = funded();

        let zero = OrderRequest::limit("usdt-dop", OrderSide::Sell, dec!(60), Decimal::ZERO);
        assert!(exchange.place_order(&zero).await.is_none());

        let too_big = OrderRequest::limit("usdt-dop", OrderSide::Sell, dec!(60), dec!(101));
        assert!(exchange.place_order(&too_big).await.is_none());

        assert_eq!(exchange.get_state().await.orders_rejected, 2);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let exchange = funded();
        let instrument = Instrument::new("usdt", "dop");

        exchange.set_fail_balances(true).await;
        assert!(exchange.get_balances(&instrument).await.is_none());

        exchange.set_fail_cancel(true).await;
        assert!(!exchange.cancel_all("usdt-dop").await);
        assert_eq!(exchange.get_state().await.cancel_calls, 1);
    }
}
