//! Grid planner
//!
//! Turns a reference price and the current balances into a symmetric ladder
//! of limit orders: `N` bids below the reference and `N` asks above it, one
//! pair per level. Prices step by `spread_per_level` of the reference per level
//! and are rounded to the grid's two decimal places.

use super::sizing::{Proportional, RandomWeighted, SizingPolicy};
use crate::config::{GridConfig, SizingKind};
use crate::exchange::{Balances, OrderRequest, OrderSide};
use crate::utils::decimal::round_grid;
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Grid shape parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridParams {
    pub levels: u32,
    pub spread_per_level: Decimal,
    pub allocation_fraction: Decimal,
}

impl From<&GridConfig> for GridParams {
    fn from(config: &GridConfig) -> Self {
        Self {
            levels: config.levels,
            spread_per_level: config.spread_per_level,
            allocation_fraction: config.allocation_fraction,
        }
    }
}

/// A single rung of the ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLevel {
    pub side: OrderSide,
    /// 1-based distance from the reference price
    pub index: u32,
    pub price: Decimal,
    /// Size in base units
    pub size: Decimal,
}

impl GridLevel {
    pub fn to_request(&self, symbol: &str) -> OrderRequest {
        OrderRequest::limit(symbol, self.side, self.price, self.size)
    }

    /// Quote value of the rung at its limit price.
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// The full ladder for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPlan {
    pub reference_price: Decimal,
    /// Bids, nearest first
    pub buys: Vec<GridLevel>,
    /// Asks, nearest first
    pub sells: Vec<GridLevel>,
}

impl GridPlan {
    /// Placement order: buy 1, sell 1, buy 2, sell 2, ...
    pub fn interleaved(&self) -> Vec<GridLevel> {
        self.buys
            .iter()
            .zip(self.sells.iter())
            .flat_map(|(buy, sell)| [*buy, *sell])
            .collect()
    }

    pub fn order_count(&self) -> usize {
        self.buys.len() + self.sells.len()
    }

    /// Quote committed by the bids.
    pub fn buy_notional(&self) -> Decimal {
        self.buys.iter().map(GridLevel::notional).sum()
    }

    /// Base committed by the asks.
    pub fn sell_volume(&self) -> Decimal {
        self.sells.iter().map(|level| level.size).sum()
    }
}

pub struct GridPlanner {
    params: GridParams,
    policy: Box<dyn SizingPolicy>,
}

impl GridPlanner {
    pub fn new(params: GridParams, policy: Box<dyn SizingPolicy>) -> Self {
        Self { params, policy }
    }

    pub fn from_config(config: &GridConfig) -> Self {
        let policy: Box<dyn SizingPolicy> = match config.sizing {
            SizingKind::Proportional => Box::new(Proportional),
            SizingKind::RandomWeighted => Box::new(RandomWeighted::new()),
        };
        Self::new(GridParams::from(config), policy)
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// `(buy_i, sell_i)` for `i = 1..=levels`, rounded to the grid precision.
    ///
    /// A price that overflows `Decimal` comes out as zero, which in turn
    /// zeroes that level's size.
    pub fn price_ladder(&self, reference: Decimal) -> Vec<(Decimal, Decimal)> {
        (1..=self.params.levels)
            .map(|i| {
                let offset = Decimal::from(i).checked_mul(self.params.spread_per_level);
                let price = |factor: Option<Decimal>| {
                    factor
                        .and_then(|factor| reference.checked_mul(factor))
                        .map(round_grid)
                        .unwrap_or_else(|| {
                            warn!(%reference, level = i, "Grid price out of range");
                            Decimal::ZERO
                        })
                };
                (
                    price(offset.and_then(|o| Decimal::ONE.checked_sub(o))),
                    price(offset.and_then(|o| Decimal::ONE.checked_add(o))),
                )
            })
            .collect()
    }

    /// Build the ladder for `reference` given the balances fetched this cycle.
    ///
    /// Bids spend quote: each gets a quote allocation divided by its price.
    /// Asks spend base directly. A non-positive reference collapses every
    /// size to zero; so does an empty balance on the corresponding side.
    pub fn plan(&self, reference: Decimal, balances: &Balances) -> GridPlan {
        let levels = self.params.levels as usize;
        let ladder = self.price_ladder(reference);

        let (quote_allocs, base_allocs) = if reference > Decimal::ZERO {
            (
                self.policy.allocate(
                    balances.quote_available,
                    self.params.allocation_fraction,
                    levels,
                ),
                self.policy.allocate(
                    balances.base_available,
                    self.params.allocation_fraction,
                    levels,
                ),
            )
        } else {
            (vec![Decimal::ZERO; levels], vec![Decimal::ZERO; levels])
        };

        let mut buys = Vec::with_capacity(levels);
        let mut sells = Vec::with_capacity(levels);

        for (i, (buy_price, sell_price)) in ladder.into_iter().enumerate() {
            let index = i as u32 + 1;
            let quote_alloc = quote_allocs.get(i).copied().unwrap_or(Decimal::ZERO);
            let base_alloc = base_allocs.get(i).copied().unwrap_or(Decimal::ZERO);

            let buy_size = if buy_price > Decimal::ZERO {
                quote_alloc
                    .checked_div(buy_price)
                    .map(round_grid)
                    .unwrap_or(Decimal::ZERO)
                    .max(Decimal::ZERO)
            } else {
                Decimal::ZERO
            };
            let sell_size = if sell_price > Decimal::ZERO {
                round_grid(base_alloc).max(Decimal::ZERO)
            } else {
                Decimal::ZERO
            };

            buys.push(GridLevel {
                side: OrderSide::Buy,
                index,
                price: buy_price,
                size: buy_size,
            });
            sells.push(GridLevel {
                side: OrderSide::Sell,
                index,
                price: sell_price,
                size: sell_size,
            });
        }

        debug!(
            "Planned {} levels around {} with {} sizing",
            levels,
            reference,
            self.policy.name()
        );

        GridPlan {
            reference_price: reference,
            buys,
            sells,
        }
    }
}
