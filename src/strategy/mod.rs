//! Grid market-making strategy.
//!
//! - `price`: reference price selection and the operator override cell
//! - `sizing`: pluggable per-level budget split
//! - `planner`: the symmetric price/size ladder
//! - `lifecycle`: cancel-all then place
//! - `scheduler`: the rebalance state machine

mod error;
pub mod lifecycle;
pub mod planner;
pub mod price;
pub mod scheduler;
pub mod sizing;

pub use error::CycleError;
pub use lifecycle::{CycleReport, OrderLifecycleManager};
pub use planner::{GridLevel, GridParams, GridPlan, GridPlanner};
pub use price::{override_cell, OverrideReader, OverrideWriter, PriceOverride, ReferencePriceProvider};
pub use scheduler::{CycleOutcome, CycleState, DayMarker, Scheduler};
pub use sizing::{Proportional, RandomWeighted, SizingPolicy};
