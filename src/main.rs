//! Grid Market Maker - Main Entry Point
//!
//! Runs the rebalance loop against the live exchange or the in-memory paper
//! exchange, plus the order-book viewer and an offline grid preview.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grid_market_maker::command::{CommandChannel, StdinCommands};
use grid_market_maker::config::{Config, SizingKind};
use grid_market_maker::exchange::{
    Balances, BookLevel, ExchangeApi, ExchangeClient, MockExchange, OrderBook,
};
use grid_market_maker::notify::{LogNotifier, Notifier, TelegramApi, TelegramCommands};
use grid_market_maker::strategy::{
    override_cell, GridParams, GridPlan, GridPlanner, Proportional, RandomWeighted,
    ReferencePriceProvider, Scheduler, SizingPolicy,
};
use grid_market_maker::utils::decimal::round_grid;
use grid_market_maker::utils::RetryPolicy;
use grid_market_maker::viewer::run_viewer;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Paper trading starts with this much of each asset.
const PAPER_BASE_BALANCE: Decimal = dec!(1000);
const PAPER_QUOTE_BALANCE: Decimal = dec!(58000);

/// Grid Market Maker CLI
#[derive(Parser)]
#[command(name = "grid-market-maker")]
#[command(version, about = "Symmetric order-grid market maker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream the live order book as a table
    Book,

    /// Print the grid for a reference price and balances without trading
    Plan {
        /// Reference price
        #[arg(short, long)]
        price: Decimal,

        /// Available base asset
        #[arg(short, long)]
        base: Decimal,

        /// Available quote asset
        #[arg(short, long)]
        quote: Decimal,

        /// Levels per side (defaults to config)
        #[arg(short, long)]
        levels: Option<u32>,

        /// Spread per level, e.g. 0.09 (defaults to config)
        #[arg(short, long)]
        spread: Option<Decimal>,

        /// Allocation fraction, e.g. 0.99 (defaults to config)
        #[arg(short, long)]
        fraction: Option<Decimal>,

        /// proportional | random_weighted (defaults to config)
        #[arg(long, value_parser = parse_sizing)]
        sizing: Option<SizingKind>,

        /// Seed for random_weighted sizing
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Trading mode: Live (real money) or Mock (paper trading).
#[derive(Debug, Clone, Copy, PartialEq)]
enum TradingMode {
    Live,
    Mock,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate()?;

    match cli.command {
        Some(Commands::Book) => return run_book(&config).await,
        Some(Commands::Plan {
            price,
            base,
            quote,
            levels,
            spread,
            fraction,
            sizing,
            seed,
        }) => {
            let params = GridParams {
                levels: levels.unwrap_or(config.grid.levels),
                spread_per_level: spread.unwrap_or(config.grid.spread_per_level),
                allocation_fraction: fraction.unwrap_or(config.grid.allocation_fraction),
            };
            let policy: Box<dyn SizingPolicy> = match (sizing.unwrap_or(config.grid.sizing), seed) {
                (SizingKind::Proportional, _) => Box::new(Proportional),
                (SizingKind::RandomWeighted, Some(seed)) => Box::new(RandomWeighted::with_seed(seed)),
                (SizingKind::RandomWeighted, None) => Box::new(RandomWeighted::new()),
            };
            let balances = Balances {
                base_available: base,
                quote_available: quote,
            };
            show_plan(&config, &GridPlanner::new(params, policy), price, &balances);
            return Ok(());
        }
        None => {}
    }

    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║            Grid Market Maker v{}                        ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");

    let trading_mode = if std::env::var("LIVE_TRADING").unwrap_or_default() == "true" {
        warn!("⚠️  LIVE TRADING MODE - Real money at risk!");
        TradingMode::Live
    } else {
        info!("📝 MOCK TRADING MODE - Paper trading enabled");
        TradingMode::Mock
    };

    log_config(&config);

    let instrument = config.exchange.instrument();

    let exchange: Arc<dyn ExchangeApi> = match trading_mode {
        TradingMode::Live => {
            anyhow::ensure!(
                !config.exchange.api_key.is_empty() && !config.exchange.api_secret.is_empty(),
                "Live trading requires exchange.api_key and exchange.api_secret"
            );
            let retry = RetryPolicy::from_config(&config.retry);
            Arc::new(ExchangeClient::new(&config.exchange, retry)?)
        }
        TradingMode::Mock => Arc::new(paper_exchange(&config).await),
    };

    let (writer, reader) = override_cell(config.price.default_mid_price);

    // Telegram carries both notifications and commands; without it, log and stdin.
    let notifier: Arc<dyn Notifier> = if config.telegram.is_enabled() {
        let api = TelegramApi::new(&config.telegram)?;
        let commands = TelegramCommands::new(api.clone(), config.telegram.poll_timeout_secs);
        let notifier: Arc<dyn Notifier> = Arc::new(api);
        tokio::spawn(CommandChannel::new(commands, writer, notifier.clone()).run());
        info!("📨 Telegram notifications and commands enabled");
        notifier
    } else {
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        tokio::spawn(CommandChannel::new(StdinCommands::spawn(), writer, notifier.clone()).run());
        info!("⌨️  Telegram disabled; type `update_price <price>` to move the grid");
        notifier
    };

    let scheduler = Scheduler::new(
        exchange,
        notifier,
        instrument,
        GridPlanner::from_config(&config.grid),
        ReferencePriceProvider::from_config(&config.price, reader),
        Duration::from_secs(config.schedule.update_interval_secs),
        Duration::from_secs(config.schedule.cancel_failure_delay_secs),
    );

    scheduler.announce_startup().await;

    info!("🚀 Starting main trading loop...");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    tokio::select! {
        _ = scheduler.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("🛑 Shutdown signal received");
        }
    }

    info!("👋 Grid market maker stopped");
    Ok(())
}

/// Initialize logging with file and console output.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "grid-market-maker.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("grid_market_maker=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup. Credentials are never logged.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Exchange: {}", config.exchange.base_url);
    info!("   Instrument: {}", config.exchange.symbol());
    info!("   Levels per side: {}", config.grid.levels);
    info!(
        "   Spread per level: {:.2}%",
        config.grid.spread_per_level * dec!(100)
    );
    info!(
        "   Allocation: {:.0}%",
        config.grid.allocation_fraction * dec!(100)
    );
    info!("   Sizing: {:?}", config.grid.sizing);
    info!(
        "   Reference price: {:?} (default {})",
        config.price.source, config.price.default_mid_price
    );
    info!(
        "   Update interval: {}s",
        config.schedule.update_interval_secs
    );
    info!("   Retry attempts: {}", config.retry.max_attempts);
}

/// Paper exchange funded with fixed balances and a one-level book around
/// the configured default price.
async fn paper_exchange(config: &Config) -> MockExchange {
    let exchange = MockExchange::new(Balances {
        base_available: PAPER_BASE_BALANCE,
        quote_available: PAPER_QUOTE_BALANCE,
    });

    let mid = config.price.default_mid_price;
    exchange
        .set_order_book(OrderBook {
            bids: vec![BookLevel {
                price: round_grid(mid * dec!(0.995)),
                size: dec!(100),
            }],
            asks: vec![BookLevel {
                price: round_grid(mid * dec!(1.005)),
                size: dec!(100),
            }],
        })
        .await;

    info!(
        base = %PAPER_BASE_BALANCE,
        quote = %PAPER_QUOTE_BALANCE,
        "📂 Paper exchange funded"
    );
    exchange
}

async fn run_book(config: &Config) -> Result<()> {
    let symbol = config.exchange.symbol();
    tokio::select! {
        result = run_viewer(&config.exchange.stream_url, &symbol) => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            Ok(())
        }
    }
}

fn show_plan(config: &Config, planner: &GridPlanner, reference: Decimal, balances: &Balances) {
    let plan: GridPlan = planner.plan(reference, balances);
    let base = &config.exchange.base_asset;
    let quote = &config.exchange.quote_asset;

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              GRID PREVIEW                                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    println!("\n📊 Inputs");
    println!("   ├─ Reference:  {}", reference);
    println!("   ├─ {}:  {}", base, balances.base_available);
    println!("   ├─ {}:  {}", quote, balances.quote_available);
    println!("   └─ Sizing:     {}", planner.policy_name());

    println!("\n📈 Levels");
    for (buy, sell) in plan.buys.iter().zip(plan.sells.iter()) {
        println!(
            "   {:>2}  BUY {:>10} @ {:>8}   |   SELL {:>10} @ {:>8}",
            buy.index, buy.size, buy.price, sell.size, sell.price
        );
    }

    println!("\n💰 Committed");
    println!("   ├─ Bids:  {:.2} {}", plan.buy_notional(), quote);
    println!("   └─ Asks:  {:.2} {}", plan.sell_volume(), base);
}

fn parse_sizing(value: &str) -> Result<SizingKind, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| format!("unknown sizing '{}', expected proportional or random_weighted", value))
}
