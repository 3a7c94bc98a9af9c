//! Stealthflow service entry point.
//!
//! Runs the trading loop headless: structured logs to stdout, metrics
//! pushed as `METRICS_JSON:` lines, no incoming connections.
//!
//! # Usage
//! ```sh
//! stealthflow run --demo --log-level debug --max-trades 5
//! ```
//!
//! Exit codes: 0 normal, 1 fatal initialization or broker error,
//! 130 interrupted.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stealthflow::application::advisor::{
    AdvisorGateway, HttpTransport, MasterKey, ProviderEndpoint, ProviderKey,
};
use stealthflow::application::execution::ExecutionEngine;
use stealthflow::application::risk::RiskManager;
use stealthflow::application::scheduler::TradingLoop;
use stealthflow::application::strategies::{
    AdvisorStrategy, BollingerBandsStrategy, MacdStrategy, MovingAverageCrossStrategy,
    RsiStrategy, StrategyRegistry,
};
use stealthflow::config::Config;
use stealthflow::infrastructure::mock::MockBroker;
use stealthflow::infrastructure::observability::{Metrics, MetricsReporter};
use stealthflow::infrastructure::simulation::{NetworkLatency, VolatilitySlippage};
use rand::Rng;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "stealthflow", version, about = "Autonomous trading orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Recover from fatal errors and print a periodic status block.
    #[arg(long, global = true)]
    demo: bool,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Override the daily trade cap.
    #[arg(long, global = true)]
    max_trades: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the live trading loop.
    Run,
}

fn init_logging(level: Option<&str>) {
    let level = level
        .and_then(|l| l.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_logging(cli.log_level.as_deref());

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("stealthflow failed: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let Command::Run = cli.command;

    info!("stealthflow {} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env().context("failed to load configuration")?;
    config.scheduler.demo = cli.demo;
    if let Some(max_trades) = cli.max_trades {
        config.scheduler.max_trades_per_day = max_trades;
    }
    info!(
        "Configuration loaded: {} symbols, {} advisory providers, tick every {:?}",
        config.symbols.len(),
        config.provider_keys.len(),
        config.scheduler.tick_interval
    );

    // One injectable random source feeds every jitter, variance and
    // selection draw; a seed makes a whole session reproducible.
    let rng = Arc::new(Mutex::new(match config.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }));

    let master_key = if config.master_key.is_empty() {
        warn!("MASTER_KEY not set; using an ephemeral key for this session");
        uuid::Uuid::new_v4().to_string()
    } else {
        config.master_key.clone()
    };
    let master = MasterKey::from_passphrase(&master_key);

    // Seal provider credentials; the plaintext from the environment is
    // dropped with the config copy.
    let mut endpoints = Vec::new();
    for (provider, keys) in &config.provider_keys {
        let sealed = keys
            .iter()
            .map(|k| ProviderKey::seal_new(&master, k))
            .collect::<Result<Vec<_>, _>>()
            .context("failed to seal provider credentials")?;
        endpoints.push(ProviderEndpoint::new(*provider, sealed));
    }
    let has_advisors = !endpoints.is_empty();

    let metrics = Metrics::new()?;

    let transport = Arc::new(HttpTransport::new(Duration::from_secs(10)));
    let gateway = Arc::new(
        AdvisorGateway::new(
            endpoints,
            master,
            transport,
            rng.clone(),
            config.gateway.clone(),
        )
        .with_metrics(metrics.clone()),
    );

    let mut registry = StrategyRegistry::new();
    registry.register(Arc::new(MovingAverageCrossStrategy::default()), 0.2);
    registry.register(Arc::new(RsiStrategy::default()), 0.15);
    registry.register(Arc::new(MacdStrategy::default()), 0.15);
    registry.register(Arc::new(BollingerBandsStrategy::default()), 0.1);
    if has_advisors {
        registry.register(
            Arc::new(AdvisorStrategy::new(gateway.clone())),
            config.advisor_weight,
        );
    } else {
        warn!("No advisory provider keys configured; running on technical strategies only");
    }

    let risk = Arc::new(RiskManager::new(
        config.risk.clone(),
        config.sector_map.clone(),
    ));

    // Order flow goes through the simulated adapter; wiring a real
    // brokerage means swapping this Arc for its adapter.
    let broker = Arc::new(MockBroker::with_market_friction(
        Box::new(NetworkLatency::new(40, 25)),
        Box::new(VolatilitySlippage::new(0.0005)),
    ));
    seed_demo_market(&broker, &config, &rng);

    let engine = Arc::new(ExecutionEngine::new(
        broker.clone(),
        config.execution.clone(),
        rng.clone(),
    ));

    let reporter = MetricsReporter::new(
        risk.clone(),
        metrics.clone(),
        config.observability_interval_s,
    );
    tokio::spawn(async move {
        reporter.run().await;
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received; finishing the current tick");
                interrupted.store(true, Ordering::SeqCst);
                let _ = shutdown_tx.send(true);
            }
        });
    }

    let mut trading_loop = TradingLoop::new(
        broker,
        registry,
        risk,
        engine,
        metrics,
        config.scheduler.clone(),
        shutdown_rx,
    );
    trading_loop.run().await?;

    if interrupted.load(Ordering::SeqCst) {
        Ok(130)
    } else {
        Ok(0)
    }
}

/// Seed the simulated adapter with a watchlist, sectors and a synthetic
/// price history per symbol.
fn seed_demo_market(broker: &MockBroker, config: &Config, rng: &Arc<Mutex<StdRng>>) {
    broker.set_watchlist(config.symbols.clone());
    for (symbol, sector) in &config.sector_map {
        broker.set_sector(symbol, sector);
    }

    let mut rng = rng.lock().expect("rng lock poisoned");
    for symbol in &config.symbols {
        let mut price = rng.random_range(50.0..500.0);
        let drift = rng.random_range(-0.002..0.004);
        let closes: Vec<Decimal> = (0..90)
            .map(|_| {
                let shock = rng.random_range(-0.02..0.02);
                price *= 1.0 + drift + shock;
                Decimal::from_f64(price).unwrap_or(Decimal::from(100))
            })
            .collect();
        if let Some(last) = closes.last() {
            broker.set_quote(symbol, *last);
        }
        broker.set_history(symbol, closes);
    }
}
