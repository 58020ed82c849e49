//! Rebalance scheduler
//!
//! Drives one cancel-and-replace cycle per interval:
//!
//! `Idle → FetchingReference → FetchingBalance → Cancelling → Placing → Reporting → Sleeping`
//!
//! A failed reference or balance fetch short-circuits to `Sleeping` without
//! touching any orders. No cycle failure is fatal to the loop.

use super::error::CycleError;
use super::lifecycle::{CycleReport, OrderLifecycleManager};
use super::planner::GridPlanner;
use super::price::ReferencePriceProvider;
use crate::exchange::{ExchangeApi, Instrument};
use crate::notify::Notifier;
use chrono::{Local, NaiveDate};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const STARTED: &str = "Market Maker Bot started";
pub const NEW_DAY_REMINDER: &str = "New day started. Please update the mid-price if needed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    FetchingReference,
    FetchingBalance,
    Cancelling,
    Placing,
    Reporting,
    Sleeping,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::FetchingReference => "fetching_reference",
            CycleState::FetchingBalance => "fetching_balance",
            CycleState::Cancelling => "cancelling",
            CycleState::Placing => "placing",
            CycleState::Reporting => "reporting",
            CycleState::Sleeping => "sleeping",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Aborted(CycleError),
}

/// Tracks the calendar day so the reminder fires once per day.
#[derive(Debug, Clone, Copy)]
pub struct DayMarker {
    current: NaiveDate,
}

impl DayMarker {
    pub fn new(today: NaiveDate) -> Self {
        Self { current: today }
    }

    /// Returns `true` the first time a later date is observed.
    pub fn roll(&mut self, today: NaiveDate) -> bool {
        if today > self.current {
            self.current = today;
            true
        } else {
            false
        }
    }
}

pub struct Scheduler {
    exchange: Arc<dyn ExchangeApi>,
    notifier: Arc<dyn Notifier>,
    instrument: Instrument,
    planner: GridPlanner,
    price: ReferencePriceProvider,
    lifecycle: OrderLifecycleManager,
    interval: Duration,
    state: CycleState,
    day: DayMarker,
    trail: Vec<CycleState>,
}

impl Scheduler {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        notifier: Arc<dyn Notifier>,
        instrument: Instrument,
        planner: GridPlanner,
        price: ReferencePriceProvider,
        interval: Duration,
        cancel_failure_delay: Duration,
    ) -> Self {
        let lifecycle = OrderLifecycleManager::new(
            exchange.clone(),
            notifier.clone(),
            instrument.clone(),
            cancel_failure_delay,
        );

        Self {
            exchange,
            notifier,
            instrument,
            planner,
            price,
            lifecycle,
            interval,
            state: CycleState::Idle,
            day: DayMarker::new(Local::now().date_naive()),
            trail: Vec::new(),
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// States visited by the most recent cycle, in order.
    pub fn last_cycle_states(&self) -> &[CycleState] {
        &self.trail
    }

    fn transition(&mut self, next: CycleState) {
        debug!(from = %self.state, to = %next, "Cycle state");
        self.state = next;
        self.trail.push(next);
    }

    /// Announce startup and log the opening portfolio.
    pub async fn announce_startup(&self) {
        info!("Market Maker Bot started");
        self.notifier.notify(STARTED).await;
        self.notifier
            .notify("Bot started. Fetching initial portfolio balance.")
            .await;

        match self.exchange.get_balances(&self.instrument).await {
            Some(balances) => info!(
                base = %balances.base_available,
                quote = %balances.quote_available,
                "Initial portfolio"
            ),
            None => warn!("Could not fetch initial portfolio balance"),
        }
    }

    /// Send the daily reminder if `today` is a new calendar day.
    pub async fn check_day_boundary(&mut self, today: NaiveDate) -> bool {
        if !self.day.roll(today) {
            return false;
        }
        info!(%today, "New day started");
        self.notifier.notify(NEW_DAY_REMINDER).await;
        true
    }

    /// Run one full cycle. Always ends in `Sleeping`.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.trail.clear();
        self.transition(CycleState::Idle);
        self.check_day_boundary(Local::now().date_naive()).await;

        let symbol = self.instrument.symbol();

        self.transition(CycleState::FetchingReference);
        let reference = match self.price.resolve(self.exchange.as_ref(), &symbol).await {
            Ok(price) => price,
            Err(e) => return self.abort(e).await,
        };

        self.transition(CycleState::FetchingBalance);
        let Some(balances) = self.exchange.get_balances(&self.instrument).await else {
            return self.abort(CycleError::BalanceUnavailable).await;
        };

        let plan = self.planner.plan(reference, &balances);
        info!(
            reference = %reference,
            orders = plan.order_count(),
            buy_notional = %plan.buy_notional(),
            sell_volume = %plan.sell_volume(),
            "Planned grid"
        );

        self.transition(CycleState::Cancelling);
        let cancelled = self.lifecycle.cancel_all().await;

        self.transition(CycleState::Placing);
        let report = self.lifecycle.place_grid(&plan, cancelled).await;

        self.transition(CycleState::Reporting);
        self.report(&report).await;

        self.transition(CycleState::Sleeping);
        CycleOutcome::Completed(report)
    }

    async fn report(&self, report: &CycleReport) {
        if report.is_complete() {
            info!(placed = report.placed, "Successfully updated all orders");
        } else {
            warn!(
                placed = report.placed,
                intended = report.intended,
                failed = report.failed(),
                "Some orders failed to place"
            );
            self.notifier
                .notify(&format!(
                    "Placed {} out of {} orders",
                    report.placed, report.intended
                ))
                .await;
        }

        if let Some(remaining) = self.exchange.get_balances(&self.instrument).await {
            info!(
                base = %remaining.base_available,
                quote = %remaining.quote_available,
                "Remaining balances after placing orders"
            );
        }
    }

    async fn abort(&mut self, reason: CycleError) -> CycleOutcome {
        error!(%reason, "Failed to update orders");
        self.notifier
            .notify(&format!("Error in main loop: {}", reason))
            .await;
        self.transition(CycleState::Sleeping);
        CycleOutcome::Aborted(reason)
    }

    /// Cycle forever, sleeping `interval` between cycles.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            sizing = self.planner.policy_name(),
            price_source = self.price.name(),
            "Starting rebalance loop"
        );

        loop {
            match self.run_cycle().await {
                CycleOutcome::Completed(report) => {
                    debug!(placed = report.placed, intended = report.intended, "Cycle completed")
                }
                CycleOutcome::Aborted(reason) => debug!(%reason, "Cycle aborted"),
            }

            info!("Sleeping for {} seconds", self.interval.as_secs());
            tokio::time::sleep(self.interval).await;
        }
    }
}
