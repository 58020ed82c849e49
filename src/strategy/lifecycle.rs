//! Order lifecycle: cancel the resting grid, then place the new one.

use super::planner::{GridLevel, GridPlan};
use crate::exchange::{ExchangeApi, Instrument, OrderAck};
use crate::notify::Notifier;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Outcome of one replace pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub cancelled: bool,
    pub intended: usize,
    pub placed: usize,
}

impl CycleReport {
    pub fn is_complete(&self) -> bool {
        self.placed == self.intended
    }

    pub fn failed(&self) -> usize {
        self.intended.saturating_sub(self.placed)
    }
}

pub struct OrderLifecycleManager {
    exchange: Arc<dyn ExchangeApi>,
    notifier: Arc<dyn Notifier>,
    instrument: Instrument,
    cancel_failure_delay: Duration,
}

impl OrderLifecycleManager {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        notifier: Arc<dyn Notifier>,
        instrument: Instrument,
        cancel_failure_delay: Duration,
    ) -> Self {
        Self {
            exchange,
            notifier,
            instrument,
            cancel_failure_delay,
        }
    }

    /// Cancel every resting order on the instrument.
    ///
    /// On failure, waits `cancel_failure_delay` and returns `false`; the
    /// caller proceeds to place the new grid regardless.
    pub async fn cancel_all(&self) -> bool {
        let symbol = self.instrument.symbol();
        if self.exchange.cancel_all(&symbol).await {
            info!(%symbol, "Cancelled all orders");
            self.notifier.notify("Cancelled all orders").await;
            true
        } else {
            error!(%symbol, "Failed to cancel orders");
            tokio::time::sleep(self.cancel_failure_delay).await;
            false
        }
    }

    /// Submit one grid level as a limit order.
    pub async fn place_order(&self, level: &GridLevel) -> Option<OrderAck> {
        let request = level.to_request(&self.instrument.symbol());
        info!(
            side = %level.side,
            level = level.index,
            price = %level.price,
            size = %level.size,
            "Attempting to place order"
        );

        match self.exchange.place_order(&request).await {
            Some(ack) => {
                info!(order_id = %ack.id, side = %level.side, price = %level.price, "Order placed");
                self.notifier
                    .notify(&format!(
                        "Placed {} order: Size ({}): {}, Price: {}",
                        level.side, self.instrument.base, level.size, level.price
                    ))
                    .await;
                Some(ack)
            }
            None => {
                error!(side = %level.side, price = %level.price, size = %level.size, "Failed to place order");
                None
            }
        }
    }

    /// Place every level of `plan` in interleaved order. `cancelled` is the
    /// outcome of the preceding [`cancel_all`](Self::cancel_all).
    pub async fn place_grid(&self, plan: &GridPlan, cancelled: bool) -> CycleReport {
        if !cancelled {
            warn!("Placing new grid over possibly stale orders");
        }

        let levels = plan.interleaved();
        let mut placed = 0;
        for level in &levels {
            if self.place_order(level).await.is_some() {
                placed += 1;
            }
        }

        CycleReport {
            cancelled,
            intended: levels.len(),
            placed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Balances, MockExchange, OrderSide};
    use crate::notify::MockNotifier;
    use crate::strategy::planner::{GridParams, GridPlanner};
    use crate::strategy::sizing::Proportional;
    use rust_decimal_macros::dec;

    fn instrument() -> Instrument {
        Instrument::new("usdt", "dop")
    }

    fn balances() -> Balances {
        Balances {
            base_available: dec!(100),
            quote_available: dec!(5800),
        }
    }

    fn plan(levels: u32) -> GridPlan {
        GridPlanner::new(
            GridParams {
                levels,
                spread_per_level: dec!(0.09),
                allocation_fraction: dec!(0.99),
            },
            Box::new(Proportional),
        )
        .plan(dec!(58), &balances())
    }

    async fn replace(manager: &OrderLifecycleManager, plan: &GridPlan) -> CycleReport {
        let cancelled = manager.cancel_all().await;
        manager.place_grid(plan, cancelled).await
    }

    fn quiet_notifier() -> Arc<dyn Notifier> {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().returning(|_| ());
        Arc::new(notifier)
    }

    #[tokio::test]
    async fn test_cancel_then_place_every_level() {
        let exchange = Arc::new(MockExchange::new(balances()));
        let manager = OrderLifecycleManager::new(
            exchange.clone(),
            quiet_notifier(),
            instrument(),
            Duration::from_secs(10),
        );

        let report = replace(&manager, &plan(3)).await;

        assert_eq!(report, CycleReport { cancelled: true, intended: 6, placed: 6 });
        assert!(report.is_complete());

        let orders = exchange.open_orders().await;
        assert_eq!(orders.len(), 6);
        assert_eq!(orders[0].request.side, OrderSide::Buy);
        assert_eq!(orders[0].request.price, dec!(52.78));
        assert_eq!(orders[1].request.side, OrderSide::Sell);
        assert_eq!(orders[1].request.price, dec!(63.22));
    }

    #[tokio::test]
    async fn test_notifications_for_cancel_and_placement() {
        let exchange = Arc::new(MockExchange::new(balances()));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|m| m == "Cancelled all orders")
            .times(1)
            .returning(|_| ());
        notifier
            .expect_notify()
            .withf(|m| m.starts_with("Placed buy order: Size (usdt): ") && m.ends_with("Price: 52.78"))
            .times(1)
            .returning(|_| ());
        notifier
            .expect_notify()
            .withf(|m| m.starts_with("Placed sell order: Size (usdt): 99") && m.ends_with("Price: 63.22"))
            .times(1)
            .returning(|_| ());

        let manager = OrderLifecycleManager::new(
            exchange,
            Arc::new(notifier),
            instrument(),
            Duration::from_secs(10),
        );
        let report = replace(&manager, &plan(1)).await;
        assert_eq!(report.placed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_failure_waits_then_places() {
        let exchange = Arc::new(MockExchange::new(balances()));
        exchange.set_fail_cancel(true).await;

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|m| m == "Cancelled all orders")
            .never();
        notifier.expect_notify().returning(|_| ());

        let manager = OrderLifecycleManager::new(
            exchange.clone(),
            Arc::new(notifier),
            instrument(),
            Duration::from_secs(10),
        );

        let started = tokio::time::Instant::now();
        let report = replace(&manager, &plan(2)).await;

        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(!report.cancelled);
        assert_eq!(report.placed, 4);
        assert_eq!(exchange.open_orders().await.len(), 4);
    }

    #[tokio::test]
    async fn test_rejected_orders_are_counted() {
        let exchange = Arc::new(MockExchange::new(Balances {
            base_available: dec!(100),
            quote_available: Default::default(),
        }));
        let manager = OrderLifecycleManager::new(
            exchange,
            quiet_notifier(),
            instrument(),
            Duration::from_secs(10),
        );

        // zero quote balance gives zero-size bids, which the exchange rejects
        let report = replace(&manager, &plan(2)).await;
        assert_eq!(report.intended, 4);
        assert_eq!(report.placed, 2);
        assert_eq!(report.failed(), 2);
        assert!(!report.is_complete());
    }
}
