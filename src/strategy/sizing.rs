//! Sizing policies: how one side's budget is spread across grid levels.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::sync::Mutex;

/// Splits a side's committed balance across the grid levels.
///
/// Implementations return `levels` allocations, denominated in the side's own
/// asset, whose sum is `balance * fraction`. A non-positive balance yields zeros.
pub trait SizingPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn allocate(&self, balance: Decimal, fraction: Decimal, levels: usize) -> Vec<Decimal>;
}

/// Every level receives `fraction / levels` of the balance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Proportional;

impl SizingPolicy for Proportional {
    fn name(&self) -> &'static str {
        "proportional"
    }

    fn allocate(&self, balance: Decimal, fraction: Decimal, levels: usize) -> Vec<Decimal> {
        if levels == 0 {
            return Vec::new();
        }
        if balance <= Decimal::ZERO {
            return vec![Decimal::ZERO; levels];
        }

        let per_level = balance * (fraction / Decimal::from(levels));
        vec![per_level; levels]
    }
}

/// Uniform random draws in `[0, balance]`, renormalised to the budget.
pub struct RandomWeighted {
    rng: Mutex<StdRng>,
}

impl RandomWeighted {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic draws, for reproducible plans.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn draw(&self, balance: Decimal, levels: usize) -> Vec<Decimal> {
        let upper = balance.to_f64().unwrap_or(0.0).max(0.0);
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        (0..levels)
            .map(|_| {
                let draw: f64 = rng.gen_range(0.0..=upper);
                Decimal::from_f64(draw).unwrap_or(Decimal::ZERO)
            })
            .collect()
    }
}

impl Default for RandomWeighted {
    fn default() -> Self {
        Self::new()
    }
}

impl SizingPolicy for RandomWeighted {
    fn name(&self) -> &'static str {
        "random_weighted"
    }

    fn allocate(&self, balance: Decimal, fraction: Decimal, levels: usize) -> Vec<Decimal> {
        if balance <= Decimal::ZERO {
            return vec![Decimal::ZERO; levels];
        }

        let draws = self.draw(balance, levels);
        renormalize(&draws, balance * fraction)
    }
}

/// Scale `draws` so they sum to `budget`: `w_i = d_i * budget / Σd`.
///
/// All-zero (or empty) draws give all-zero weights.
pub fn renormalize(draws: &[Decimal], budget: Decimal) -> Vec<Decimal> {
    let total: Decimal = draws.iter().copied().sum();
    if total <= Decimal::ZERO {
        return vec![Decimal::ZERO; draws.len()];
    }

    draws.iter().map(|d| d / total * budget).collect()
}
