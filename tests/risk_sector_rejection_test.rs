//! Sector-cap rejections must stop orders before they reach the broker.

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stealthflow::application::execution::{BreakerConfig, ExecutionConfig, ExecutionEngine};
use stealthflow::application::risk::RiskManager;
use stealthflow::application::scheduler::{SchedulerConfig, TickOutcome, TradingLoop};
use stealthflow::application::strategies::{Strategy, StrategyRegistry, TickData};
use stealthflow::domain::order::ExecutionTactic;
use stealthflow::domain::portfolio::{PortfolioSnapshot, PositionState};
use stealthflow::domain::signal::{Signal, SignalKind};
use stealthflow::domain::sizing::RiskParameters;
use stealthflow::infrastructure::mock::MockBroker;
use stealthflow::infrastructure::observability::Metrics;
use rust_decimal::Decimal;
use tokio::sync::watch;

struct BuyMsft;

#[async_trait]
impl Strategy for BuyMsft {
    fn name(&self) -> &str {
        "buy_msft"
    }

    async fn generate(&self, _data: &TickData) -> Result<Vec<Signal>> {
        Ok(vec![Signal::new("MSFT", SignalKind::Buy, 1.0, "buy_msft")])
    }
}

#[tokio::test]
async fn sector_cap_rejection_places_no_order() {
    let broker = Arc::new(MockBroker::new());
    broker.set_market_open(true);
    broker.set_watchlist(vec!["MSFT".to_string()]);
    broker.set_quote("MSFT", dec!(400));
    broker.set_sector("MSFT", "tech");
    broker.set_history(
        "MSFT",
        (0..30).map(|i| Decimal::from(395 + (i % 5))).collect(),
    );

    // Existing tech exposure at 19% of a 100k account.
    let mut snapshot = PortfolioSnapshot::empty(dec!(100000));
    snapshot.cash = dec!(81000);
    snapshot.positions.insert(
        "AAPL".to_string(),
        PositionState {
            quantity: dec!(100),
            market_value: dec!(19000),
            sector: "tech".to_string(),
        },
    );
    broker.set_portfolio(snapshot);

    // Sizing at full confidence proposes a 5% tech buy; 19% + 5% breaks
    // the 20% cap.
    let risk = Arc::new(RiskManager::new(
        RiskParameters {
            max_sector_exposure: 0.20,
            max_position_fraction: 0.05,
            volatility_scaling: false,
            ..RiskParameters::default()
        },
        HashMap::from([("MSFT".to_string(), "tech".to_string())]),
    ));

    let engine = Arc::new(ExecutionEngine::new(
        broker.clone(),
        ExecutionConfig {
            jitter_range_ms: (0, 1),
            size_variance: 0.0,
            decoy_probability: 0.0,
            breaker: BreakerConfig::default(),
            ..ExecutionConfig::default()
        },
        Arc::new(Mutex::new(StdRng::seed_from_u64(5))),
    ));

    let mut registry = StrategyRegistry::new();
    registry.register(Arc::new(BuyMsft), 1.0);

    let (_tx, rx) = watch::channel(false);
    let mut trading_loop = TradingLoop::new(
        broker.clone(),
        registry,
        risk,
        engine,
        Metrics::new().unwrap(),
        SchedulerConfig {
            default_tactic: ExecutionTactic::Simple,
            gate_retry: Duration::from_millis(10),
            ..SchedulerConfig::default()
        },
        rx,
    );

    let outcome = trading_loop.tick().await.unwrap();

    // The signal was produced but the sizing was rejected: the tick
    // completes with zero trades and the broker sees no order.
    assert_eq!(
        outcome,
        TickOutcome::Completed {
            decisions: 1,
            trades: 0
        }
    );
    assert!(broker.placed_orders().is_empty());
    assert_eq!(trading_loop.trade_count(), 0);
}
