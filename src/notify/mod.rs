//! Outbound operator notifications.
//!
//! Delivery is fire-and-forget: a failed send is logged by the implementation
//! and never interrupts the trading loop.

pub mod telegram;

use async_trait::async_trait;
use tracing::info;

pub use telegram::{TelegramApi, TelegramCommands};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Notifier used when no chat transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        info!(target: "notify", "{}", message);
    }
}
