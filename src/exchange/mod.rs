//! Exchange integration for the grid market maker.
//!
//! - `client`: signed REST client (balances, order book, orders, cancel-all)
//! - `mock`: in-memory paper exchange
//! - `websocket`: order-book stream used by the book viewer
//! - `auth`: HMAC request signing

pub mod auth;
mod client;
mod error;
pub mod mock;
mod traits;
mod types;
pub mod websocket;

pub use client::ExchangeClient;
pub use error::ApiError;
pub use mock::MockExchange;
pub use traits::ExchangeApi;
pub use types::*;
pub use websocket::{BookEvent, BookStream};
