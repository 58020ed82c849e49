//! Terminal order-book viewer.
//!
//! Subscribes to the order-book stream and redraws a three-column table
//! (`Bids | Price | Asks`) on every snapshot.

use crate::exchange::{BookEvent, BookLevel, BookStream, OrderBook};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tracing::info;

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[H";

#[derive(Debug, Clone, Copy)]
enum Align {
    Left,
    Center,
    Right,
}

const COLUMNS: [(&str, Align); 3] = [
    ("Bids", Align::Right),
    ("Price", Align::Center),
    ("Asks", Align::Left),
];

fn pad(text: &str, width: usize, align: Align) -> String {
    match align {
        Align::Left => format!("{:<width$}", text),
        Align::Center => format!("{:^width$}", text),
        Align::Right => format!("{:>width$}", text),
    }
}

fn format_field(value: Option<rust_decimal::Decimal>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

/// One row per depth index: `[bid size, "bid price | ask price", ask size]`.
pub fn book_rows(book: &OrderBook) -> Vec<[String; 3]> {
    let depth = book.bids.len().max(book.asks.len());
    (0..depth)
        .map(|i| {
            let bid = book.bids.get(i);
            let ask = book.asks.get(i);
            [
                format_field(bid.map(|l: &BookLevel| l.size)),
                format!(
                    "{} | {}",
                    format_field(bid.map(|l| l.price)),
                    format_field(ask.map(|l| l.price))
                ),
                format_field(ask.map(|l| l.size)),
            ]
        })
        .collect()
}

/// Render the book as a bordered table followed by the update stamp.
pub fn render_table(book: &OrderBook, updated: DateTime<Local>) -> String {
    let rows = book_rows(book);

    let widths: Vec<usize> = COLUMNS
        .iter()
        .enumerate()
        .map(|(i, (header, _))| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let border = format!(
        "+{}+",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    let line = |cells: [&str; 3]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(COLUMNS.iter())
            .zip(widths.iter())
            .map(|((cell, (_, align)), width)| format!(" {} ", pad(cell, *width, *align)))
            .collect();
        format!("|{}|", padded.join("|"))
    };

    let mut out = vec![
        border.clone(),
        line([COLUMNS[0].0, COLUMNS[1].0, COLUMNS[2].0]),
        border.clone(),
    ];
    for row in &rows {
        out.push(line([row[0].as_str(), row[1].as_str(), row[2].as_str()]));
    }
    out.push(border);
    out.push(format!("Last updated: {}", updated.format("%Y-%m-%d %H:%M:%S")));
    out.join("\n")
}

/// Stream the book for `symbol` and redraw until the connection closes.
pub async fn run_viewer(stream_url: &str, symbol: &str) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(64);
    let stream = BookStream::new(stream_url, symbol);
    let feed = tokio::spawn(async move { stream.run(tx).await });

    while let Some(event) = rx.recv().await {
        match event {
            BookEvent::Connected => info!("Opened connection"),
            BookEvent::Snapshot(book) => {
                print!("{}", CLEAR_SCREEN);
                println!("{}", render_table(&book, Local::now()));
            }
            BookEvent::Disconnected => break,
        }
    }

    feed.await.context("Order book stream task failed")?
}
