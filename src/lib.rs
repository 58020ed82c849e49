//! # Grid Market Maker
//!
//! Keeps a symmetric grid of resting limit orders around a reference price on
//! a single spot instrument, cancelling and re-placing the whole grid on a
//! fixed interval.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Signed REST client, paper exchange and order-book stream
//! - `strategy`: Grid planning, order lifecycle and the rebalance scheduler
//! - `command`: Operator commands that move the reference price
//! - `notify`: Operator notifications (Telegram or log)
//! - `viewer`: Terminal order-book viewer
//! - `utils`: Shared utilities, decimal arithmetic and retry backoff

pub mod command;
pub mod config;
pub mod exchange;
pub mod notify;
pub mod strategy;
pub mod utils;
pub mod viewer;

pub use config::Config;
