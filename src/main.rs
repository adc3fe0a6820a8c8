use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

use trendbot::api::{BybitClient, MarketDataGateway, PaperBalance, SyntheticMarket};
use trendbot::config::Exchange;
use trendbot::execution::{DryRunExecutor, ExecutionGateway};
use trendbot::state::BotSnapshot;
use trendbot::strategy::SmaCrossStrategy;
use trendbot::{BotConfig, BotController, LoopTiming, TradingEngine};

#[derive(Parser, Debug)]
#[command(name = "trendbot")]
#[command(about = "Single-asset SMA crossover trading bot")]
struct Args {
    /// Optional TOML config file, layered under environment variables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the synthetic market and force dry-run
    #[arg(long)]
    offline: bool,

    /// Seconds between status lines
    #[arg(long, default_value = "60")]
    status_every: u64,

    /// Seed for the synthetic market
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging();

    let mut config =
        BotConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if args.offline {
        config.exchange = Exchange::Synthetic;
        config.dry_run = true;
    }

    tracing::info!("🚀 trendbot starting on {} (DRY_RUN={})", config.symbol, config.dry_run);
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Exchange: {:?} (testnet={})", config.exchange, config.testnet);
    tracing::info!("  SMA: {}/{}", config.short_window, config.long_window);
    tracing::info!(
        "  Spend: {:.1}% | SL: {:.1}% | TP: {:.1}%",
        config.quote_spend_pct * 100.0,
        config.stop_loss_pct * 100.0,
        config.take_profit_pct * 100.0
    );
    tracing::info!("  Interval: {}s (cooldown {}s)", config.sleep_interval, config.error_cooldown);

    let (market, executor) = build_gateways(&config, args.seed)?;

    let engine = TradingEngine::new(
        Box::new(SmaCrossStrategy::new(config.short_window, config.long_window)),
        market,
        executor,
        config.risk_params(),
        Default::default(),
    )
    .with_max_candles(config.max_candles)
    .with_price_source(config.price_source);

    let bot = BotController::new(engine, LoopTiming::from_config(&config));
    bot.start().context("Failed to start decision loop")?;

    tracing::info!("\nPress Ctrl+C to stop...\n");

    let mut status = interval(Duration::from_secs(args.status_every.max(1)));
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);
    status.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
                break;
            }
            _ = status.tick() => {
                log_status(&bot.snapshot());
            }
        }
    }

    bot.shutdown().await;
    log_status(&bot.snapshot());
    tracing::info!("👋 trendbot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trendbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_gateways(
    config: &BotConfig,
    seed: u64,
) -> anyhow::Result<(Arc<dyn MarketDataGateway>, Arc<dyn ExecutionGateway>)> {
    let market: Arc<dyn MarketDataGateway>;
    let executor: Arc<dyn ExecutionGateway>;

    match config.exchange {
        Exchange::Synthetic => {
            market = Arc::new(SyntheticMarket::new(
                seed,
                30_000.0,
                config.interval_minutes(),
                config.default_balance,
            ));
            executor = Arc::new(DryRunExecutor::new());
        }
        Exchange::Bybit => {
            let client = BybitClient::new(config.bybit_settings())
                .context("Failed to create Bybit client")?;

            if config.dry_run {
                market = Arc::new(PaperBalance::new(client, config.default_balance));
                executor = Arc::new(DryRunExecutor::new());
            } else {
                tracing::warn!("⚠️  LIVE trading enabled on {}", config.venue_symbol());
                let client = Arc::new(client);
                market = client.clone();
                executor = client;
            }
        }
    }

    Ok((market, executor))
}

fn log_status(snapshot: &BotSnapshot) {
    let price = snapshot.candles.last().map(|c| c.close).unwrap_or_default();
    let signal = snapshot
        .last_signal
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());

    tracing::info!(
        "📈 cycles={} price={:.2} fast={} slow={} signal={} position={:?} qty={} realized={:.2} unrealized={:.2}",
        snapshot.cycles,
        price,
        format_average(snapshot.fast),
        format_average(snapshot.slow),
        signal,
        snapshot.position.side,
        snapshot.position.quantity,
        snapshot.realized_pnl,
        snapshot.position.unrealized_pnl(price)
    );
}

fn format_average(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".to_string())
}
