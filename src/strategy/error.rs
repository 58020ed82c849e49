use thiserror::Error;

/// Reasons a rebalance cycle stops before touching any orders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    #[error("couldn't get orderbook")]
    OrderBookUnavailable,

    #[error("insufficient data: {0}")]
    InsufficientData(&'static str),

    #[error("couldn't get balance")]
    BalanceUnavailable,
}
