//! Streaming order-book feed for the live book viewer.

use super::types::OrderBook;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Interval between keepalive pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Stream event types.
#[derive(Debug, Clone, PartialEq)]
pub enum BookEvent {
    /// Full replacement snapshot for the subscribed symbol
    Snapshot(OrderBook),
    /// Connection established and subscription sent
    Connected,
    /// Connection lost
    Disconnected,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    topic: Option<String>,
    symbol: Option<String>,
    data: Option<Value>,
}

/// Subscription request for one symbol's order book.
pub fn subscribe_message(symbol: &str) -> String {
    json!({ "op": "subscribe", "args": [format!("orderbook:{}", symbol)] }).to_string()
}

pub fn ping_message() -> String {
    json!({ "op": "ping" }).to_string()
}

/// Extract a snapshot if `text` is an order-book update for `symbol`.
pub fn parse_book_message(text: &str, symbol: &str) -> Option<OrderBook> {
    let message: StreamMessage = serde_json::from_str(text).ok()?;
    if message.topic.as_deref() != Some("orderbook") || message.symbol.as_deref() != Some(symbol) {
        return None;
    }
    message.data.as_ref().map(OrderBook::from_json)
}

/// Order-book stream client.
pub struct BookStream {
    url: String,
    symbol: String,
}

impl BookStream {
    pub fn new(url: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            symbol: symbol.into(),
        }
    }

    /// Connect, subscribe and forward snapshots until the connection ends.
    pub async fn run(&self, tx: mpsc::Sender<BookEvent>) -> Result<()> {
        info!("Connecting to WebSocket: {}", self.url);

        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .context("Failed to connect to WebSocket")?;

        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(subscribe_message(&self.symbol).into()))
            .await
            .context("Failed to send subscription")?;

        // Notify connection established
        let _ = tx.send(BookEvent::Connected).await;

        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.tick().await;

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    if let Err(e) = write.send(Message::Text(ping_message().into())).await {
                        error!("Failed to send ping: {}", e);
                        break;
                    }
                    debug!("Sent keepalive ping");
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(book) = parse_book_message(&text, &self.symbol) {
                            if tx.send(BookEvent::Snapshot(book)).await.is_err() {
                                warn!("Event receiver dropped");
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("### closed ###");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                },
            }
        }

        let _ = tx.send(BookEvent::Disconnected).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_subscribe_message() {
        assert_eq!(
            subscribe_message("usdt-dop"),
            r#"{"op":"subscribe","args":["orderbook:usdt-dop"]}"#
        );
        assert_eq!(ping_message(), r#"{"op":"ping"}"#);
    }

    #[test]
    fn test_parse_filters_topic_and_symbol() {
        let update = r#"{"topic":"orderbook","symbol":"usdt-dop","data":{"bids":[["57.9","10"]],"asks":[["58.2","4"]]}}"#;
        let book = parse_book_message(update, "usdt-dop").unwrap();
        assert_eq!(book.best_bid(), Some(dec!(57.9)));
        assert_eq!(book.best_ask(), Some(dec!(58.2)));

        assert!(parse_book_message(update, "btc-dop").is_none());

        let trade = r#"{"topic":"trade","symbol":"usdt-dop","data":[]}"#;
        assert!(parse_book_message(trade, "usdt-dop").is_none());

        assert!(parse_book_message(r#"{"message":"pong"}"#, "usdt-dop").is_none());
        assert!(parse_book_message("not json", "usdt-dop").is_none());
    }
}
