//! Reference price selection and the operator override cell.
//!
//! The override is a single-writer, single-reader cell backed by a `watch`
//! channel: the command listener writes, the scheduler reads the latest value
//! at the start of each cycle. Readers never observe a torn value.

use super::error::CycleError;
use crate::config::{PriceConfig, PriceSource};
use crate::exchange::ExchangeApi;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{info, warn};

/// Current override value and whether an operator has ever set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceOverride {
    pub price: Decimal,
    pub operator_set: bool,
}

/// Write half of the override cell.
pub struct OverrideWriter {
    tx: watch::Sender<PriceOverride>,
}

/// Read half of the override cell.
pub struct OverrideReader {
    rx: watch::Receiver<PriceOverride>,
}

/// Create the cell seeded with the configured default price.
pub fn override_cell(initial: Decimal) -> (OverrideWriter, OverrideReader) {
    let (tx, rx) = watch::channel(PriceOverride {
        price: initial,
        operator_set: false,
    });
    (OverrideWriter { tx }, OverrideReader { rx })
}

impl OverrideWriter {
    pub fn set(&self, price: Decimal) {
        self.tx.send_replace(PriceOverride {
            price,
            operator_set: true,
        });
    }
}

impl OverrideReader {
    pub fn get(&self) -> PriceOverride {
        *self.rx.borrow()
    }
}

/// Strategy for choosing the reference price of a cycle.
pub enum ReferencePriceProvider {
    /// Always the override cell's value
    FixedOverride(OverrideReader),
    /// Order-book mid, unless an operator has set the override
    BookMid(OverrideReader),
}

impl ReferencePriceProvider {
    pub fn from_config(config: &PriceConfig, reader: OverrideReader) -> Self {
        match config.source {
            PriceSource::FixedOverride => Self::FixedOverride(reader),
            PriceSource::BookMid => Self::BookMid(reader),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FixedOverride(_) => "fixed_override",
            Self::BookMid(_) => "book_mid",
        }
    }

    /// Resolve the reference price for this cycle.
    pub async fn resolve(&self, exchange: &dyn ExchangeApi, symbol: &str) -> Result<Decimal, CycleError> {
        match self {
            Self::FixedOverride(reader) => {
                let current = reader.get();
                info!(price = %current.price, "Using mid-price");
                Ok(current.price)
            }
            Self::BookMid(reader) => {
                let current = reader.get();
                if current.operator_set {
                    info!(price = %current.price, "Using operator mid-price");
                    return Ok(current.price);
                }

                let book = exchange
                    .get_order_book(symbol)
                    .await
                    .ok_or(CycleError::OrderBookUnavailable)?;

                match book.mid_price() {
                    Some(mid) => {
                        info!(
                            best_bid = ?book.best_bid(),
                            best_ask = ?book.best_ask(),
                            %mid,
                            "Using order book mid-price"
                        );
                        Ok(mid)
                    }
                    None => {
                        warn!("Insufficient order book data");
                        Err(CycleError::InsufficientData("order book has no usable mid"))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Balances, BookLevel, MockExchange, OrderBook};
    use rust_decimal_macros::dec;

    fn book(bid: Option<Decimal>, ask: Option<Decimal>) -> OrderBook {
        let level = |price| BookLevel { price, size: dec!(1) };
        OrderBook {
            bids: bid.map(level).into_iter().collect(),
            asks: ask.map(level).into_iter().collect(),
        }
    }

    #[test]
    fn test_override_cell_latest_write_wins() {
        let (writer, reader) = override_cell(dec!(58));
        assert_eq!(reader.get(), PriceOverride { price: dec!(58), operator_set: false });

        writer.set(dec!(60.5));
        writer.set(dec!(61));
        assert_eq!(reader.get(), PriceOverride { price: dec!(61), operator_set: true });
    }

    #[tokio::test]
    async fn test_fixed_override_ignores_book() {
        let exchange = MockExchange::new(Balances::default());
        exchange.set_order_book(book(Some(dec!(10)), Some(dec!(12)))).await;

        let (writer, reader) = override_cell(dec!(58));
        let provider = ReferencePriceProvider::FixedOverride(reader);
        assert_eq!(provider.resolve(&exchange, "usdt-dop").await, Ok(dec!(58)));

        writer.set(dec!(60.5));
        assert_eq!(provider.resolve(&exchange, "usdt-dop").await, Ok(dec!(60.5)));
    }

    #[tokio::test]
    async fn test_book_mid_until_operator_sets_price() {
        let exchange = MockExchange::new(Balances::default());
        exchange.set_order_book(book(Some(dec!(57.9)), Some(dec!(58.3)))).await;

        let (writer, reader) = override_cell(dec!(58));
        let provider = ReferencePriceProvider::BookMid(reader);
        assert_eq!(provider.resolve(&exchange, "usdt-dop").await, Ok(dec!(58.1)));

        writer.set(dec!(59));
        assert_eq!(provider.resolve(&exchange, "usdt-dop").await, Ok(dec!(59)));
    }

    #[tokio::test]
    async fn test_book_mid_failures() {
        let exchange = MockExchange::new(Balances::default());
        let (_writer, reader) = override_cell(dec!(58));
        let provider = ReferencePriceProvider::BookMid(reader);

        exchange.set_order_book(book(Some(dec!(57.9)), None)).await;
        assert!(matches!(
            provider.resolve(&exchange, "usdt-dop").await,
            Err(CycleError::InsufficientData(_))
        ));

        exchange
            .set_order_book(book(Some(Decimal::MAX), Some(Decimal::MAX)))
            .await;
        assert!(matches!(
            provider.resolve(&exchange, "usdt-dop").await,
            Err(CycleError::InsufficientData(_))
        ));

        exchange.set_fail_book(true).await;
        assert_eq!(
            provider.resolve(&exchange, "usdt-dop").await,
            Err(CycleError::OrderBookUnavailable)
        );
    }
}
