use crate::application::execution::ExecutionEngine;
use crate::application::risk::{annualized_volatility, RiskManager, DEFAULT_VOLATILITY};
use crate::application::strategies::{StrategyRegistry, TickData};
use crate::domain::errors::BrokerError;
use crate::domain::order::{ExecutionTactic, OrderIntent, OrderSide};
use crate::domain::ports::BrokerAdapter;
use crate::domain::signal::SignalKind;
use crate::infrastructure::observability::Metrics;
use anyhow::Result;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub max_trades_per_day: u32,
    pub max_session: Duration,
    /// Sleep between gate retries when the market is closed or the global
    /// breaker is open.
    pub gate_retry: Duration,
    pub global_breaker_cooldown: Duration,
    /// Consecutive transient broker errors before the global breaker trips.
    pub broker_error_burst: u32,
    /// Tactic stamped on dispatched intents.
    pub default_tactic: ExecutionTactic,
    /// Demo mode recovers from fatal errors and prints a status block.
    pub demo: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(15 * 60),
            max_trades_per_day: 10,
            max_session: Duration::from_secs(6 * 3600),
            gate_retry: Duration::from_secs(60),
            global_breaker_cooldown: Duration::from_secs(300),
            broker_error_burst: 3,
            default_tactic: ExecutionTactic::Auto,
            demo: false,
        }
    }
}

/// Outcome of one pass through the tick state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Global breaker open; retry after the gate interval.
    BreakerTripped,
    /// Market closed; retry after the gate interval.
    MarketClosed,
    /// Trade or session cap reached; the loop terminates.
    SessionExhausted,
    /// Tick abandoned after a broker error; accounting already updated.
    Skipped,
    Completed { decisions: usize, trades: usize },
}

/// The outer cooperative loop: one serialized tick at a time through
/// Fetch, Decide, Execute and Account, under global gating.
///
/// The loop exclusively owns the session counters and the global breaker;
/// the risk manager and engine own their own state.
pub struct TradingLoop {
    broker: Arc<dyn BrokerAdapter>,
    registry: StrategyRegistry,
    risk: Arc<RiskManager>,
    engine: Arc<ExecutionEngine>,
    metrics: Metrics,
    config: SchedulerConfig,
    shutdown: watch::Receiver<bool>,
    session_start: Instant,
    trade_count: u32,
    decision_count: u64,
    error_count: u64,
    last_trade_at: Option<Instant>,
    consecutive_broker_errors: u32,
    global_tripped_until: Option<Instant>,
}

impl TradingLoop {
    pub fn new(
        broker: Arc<dyn BrokerAdapter>,
        registry: StrategyRegistry,
        risk: Arc<RiskManager>,
        engine: Arc<ExecutionEngine>,
        metrics: Metrics,
        config: SchedulerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            broker,
            registry,
            risk,
            engine,
            metrics,
            config,
            shutdown,
            session_start: Instant::now(),
            trade_count: 0,
            decision_count: 0,
            error_count: 0,
            last_trade_at: None,
            consecutive_broker_errors: 0,
            global_tripped_until: None,
        }
    }

    pub fn trade_count(&self) -> u32 {
        self.trade_count
    }

    /// Drive ticks until the session caps are hit or shutdown is
    /// signalled. A shutdown mid-sleep exits after the current tick.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "TradingLoop: session started (interval {:?}, max {} trades, {} strategies){}",
            self.config.tick_interval,
            self.config.max_trades_per_day,
            self.registry.len(),
            if self.config.demo { " [DEMO]" } else { "" }
        );

        loop {
            if *self.shutdown.borrow() {
                info!("TradingLoop: shutdown requested, stopping");
                break;
            }

            match self.tick().await {
                Ok(TickOutcome::SessionExhausted) => {
                    info!("TradingLoop: session caps reached, stopping");
                    break;
                }
                Ok(TickOutcome::BreakerTripped) | Ok(TickOutcome::MarketClosed) => {
                    if self.sleep_or_shutdown(self.config.gate_retry).await {
                        break;
                    }
                }
                Ok(TickOutcome::Skipped) => {
                    if self.sleep_or_shutdown(self.config.gate_retry).await {
                        break;
                    }
                }
                Ok(TickOutcome::Completed { decisions, trades }) => {
                    debug!(
                        "TradingLoop: tick complete ({} decisions, {} trades)",
                        decisions, trades
                    );
                    if self.config.demo {
                        self.log_demo_status();
                    }
                    if self.sleep_or_shutdown(self.config.tick_interval).await {
                        break;
                    }
                }
                Err(e) => {
                    self.error_count += 1;
                    if self.config.demo {
                        warn!("TradingLoop: recovered from error in demo mode: {}", e);
                        if self.sleep_or_shutdown(Duration::from_secs(10)).await {
                            break;
                        }
                    } else {
                        error!("TradingLoop: fatal error: {}", e);
                        return Err(e);
                    }
                }
            }
        }

        // Decoy cancellations are fire-and-forget but joined on shutdown.
        self.engine.join_decoy_tasks().await;
        info!(
            "TradingLoop: session over ({} trades, {} decisions, {} errors)",
            self.trade_count, self.decision_count, self.error_count
        );
        Ok(())
    }

    /// One pass of the tick state machine: Gate, Fetch, Decide, Execute,
    /// Account.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        // --- Gate ---
        if let Some(until) = self.global_tripped_until {
            if Instant::now() < until {
                debug!("TradingLoop: global breaker open for {:?}", until - Instant::now());
                return Ok(TickOutcome::BreakerTripped);
            }
            info!("TradingLoop: global breaker cooldown elapsed");
            self.global_tripped_until = None;
            self.consecutive_broker_errors = 0;
        }

        match self.broker.market_is_open().await {
            Ok(true) => {}
            Ok(false) => {
                debug!("TradingLoop: market closed, waiting");
                return Ok(TickOutcome::MarketClosed);
            }
            Err(e) => {
                self.note_broker_error(e)?;
                return Ok(TickOutcome::Skipped);
            }
        }

        if self.trade_count >= self.config.max_trades_per_day {
            info!(
                "TradingLoop: daily trade cap of {} reached",
                self.config.max_trades_per_day
            );
            return Ok(TickOutcome::SessionExhausted);
        }
        if self.session_start.elapsed() > self.config.max_session {
            info!("TradingLoop: maximum session duration reached");
            return Ok(TickOutcome::SessionExhausted);
        }

        // --- Fetch ---
        let snapshot = match self.broker.get_portfolio().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.note_broker_error(e)?;
                return Ok(TickOutcome::Skipped);
            }
        };
        let watchlist = match self.broker.get_watchlist().await {
            Ok(watchlist) => watchlist,
            Err(e) => {
                self.note_broker_error(e)?;
                return Ok(TickOutcome::Skipped);
            }
        };
        self.consecutive_broker_errors = 0;

        self.risk.update_snapshot(snapshot.clone());
        self.risk.record_mark(snapshot.equity, Utc::now());
        self.engine.update_order_cap(snapshot.equity);
        self.metrics
            .portfolio_equity_usd
            .set(snapshot.equity.to_f64().unwrap_or(0.0));
        self.metrics
            .portfolio_cash_usd
            .set(snapshot.cash.to_f64().unwrap_or(0.0));
        self.metrics
            .drawdown_current
            .set(self.risk.current_drawdown());

        let mut series: HashMap<String, Vec<Decimal>> = HashMap::new();
        let mut quotes: HashMap<String, Decimal> = HashMap::new();
        for symbol in &watchlist {
            match self.broker.get_historical(symbol).await {
                Ok(closes) if !closes.is_empty() => {
                    series.insert(symbol.clone(), closes);
                }
                Ok(_) => debug!("TradingLoop: no history for {}, skipping", symbol),
                Err(e) => warn!("TradingLoop: history fetch failed for {}: {}", symbol, e),
            }
            match self.broker.get_quote(symbol).await {
                Ok(price) => {
                    quotes.insert(symbol.clone(), price);
                }
                Err(e) => debug!("TradingLoop: no quote for {}: {}", symbol, e),
            }
        }

        // Average normalized volatility drives execution pacing.
        if !series.is_empty() {
            let sigma_sum: f64 = series.values().map(|s| annualized_volatility(s)).sum();
            let normalized = sigma_sum / series.len() as f64 / DEFAULT_VOLATILITY;
            self.engine.update_market_conditions(normalized, 1.0);
        }

        // --- Decide ---
        let tick_data = TickData {
            snapshot: snapshot.clone(),
            series,
            quotes,
        };
        let combined = self.registry.combine(&tick_data).await;
        self.decision_count += combined.len() as u64;
        for signal in combined.values() {
            let decision = signal.effective_kind().to_string();
            self.metrics
                .decisions_total
                .with_label_values(&[decision.as_str()])
                .inc();
        }

        // --- Execute (serially, to keep cash accounting coherent) ---
        let mut symbols: Vec<&String> = combined.keys().collect();
        symbols.sort();
        let mut trades_this_tick = 0usize;

        for symbol in symbols {
            let signal = &combined[symbol];
            if !signal.is_actionable() {
                continue;
            }
            if self.trade_count >= self.config.max_trades_per_day {
                info!("TradingLoop: trade cap hit mid-tick, deferring remaining signals");
                break;
            }

            let Some(price) = tick_data
                .quotes
                .get(symbol)
                .copied()
                .or_else(|| tick_data.series.get(symbol).and_then(|s| s.last().copied()))
            else {
                warn!("TradingLoop: no price for {}, skipping signal", symbol);
                continue;
            };

            let volatility = tick_data
                .series
                .get(symbol)
                .map(|s| annualized_volatility(s))
                .unwrap_or(DEFAULT_VOLATILITY);

            let sizing = match self.risk.evaluate(signal, price, volatility) {
                Ok(sizing) => sizing,
                Err(rejection) => {
                    warn!("TradingLoop: risk rejected {}: {}", symbol, rejection);
                    self.metrics
                        .risk_rejections_total
                        .with_label_values(&[rejection_label(&rejection)])
                        .inc();
                    continue;
                }
            };

            let side = match signal.effective_kind() {
                SignalKind::Buy => OrderSide::Buy,
                SignalKind::Sell => OrderSide::Sell,
                SignalKind::Hold => continue,
            };
            let intent = OrderIntent {
                symbol: symbol.clone(),
                side,
                total_quantity: sizing.quantity,
                reference_price: price,
                tactic: self.config.default_tactic,
            };

            match self.engine.execute(&intent).await {
                Ok(result) if result.success => {
                    self.risk.record_fill(signal, &sizing);
                    self.trade_count += 1;
                    trades_this_tick += 1;
                    self.last_trade_at = Some(Instant::now());
                    let side_label = side.to_string();
                    self.metrics
                        .trades_total
                        .with_label_values(&[side_label.as_str(), "filled"])
                        .inc();
                    info!(
                        "TradingLoop: {} {} {} @ {} (confidence {:.2}, filled {})",
                        side, sizing.quantity, symbol, price, signal.confidence, result.filled_quantity
                    );
                }
                Ok(result) => {
                    warn!(
                        "TradingLoop: execution failed for {}: {}",
                        symbol,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                    let side_label = side.to_string();
                    self.metrics
                        .trades_total
                        .with_label_values(&[side_label.as_str(), "failed"])
                        .inc();
                }
                Err(e) => {
                    warn!("TradingLoop: {}", e);
                    self.metrics
                        .breaker_trips_total
                        .with_label_values(&["symbol"])
                        .inc();
                }
            }
        }

        // --- Account ---
        self.metrics.ticks_total.inc();
        Ok(TickOutcome::Completed {
            decisions: combined.len(),
            trades: trades_this_tick,
        })
    }

    /// Count a broker error toward the global breaker. Fatal errors end a
    /// live session; demo mode recovers.
    fn note_broker_error(&mut self, error: BrokerError) -> Result<()> {
        self.error_count += 1;
        if error.is_fatal() && !self.config.demo {
            return Err(anyhow::anyhow!("fatal broker error: {}", error));
        }

        self.consecutive_broker_errors += 1;
        warn!(
            "TradingLoop: broker error {}/{}: {}",
            self.consecutive_broker_errors, self.config.broker_error_burst, error
        );
        if self.consecutive_broker_errors >= self.config.broker_error_burst {
            warn!(
                "TradingLoop: global breaker tripped for {:?}",
                self.config.global_breaker_cooldown
            );
            self.global_tripped_until = Some(Instant::now() + self.config.global_breaker_cooldown);
            self.metrics
                .breaker_trips_total
                .with_label_values(&["global"])
                .inc();
        }
        Ok(())
    }

    async fn sleep_or_shutdown(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = time::sleep(duration) => false,
            _ = self.shutdown.changed() => true,
        }
    }

    fn log_demo_status(&self) {
        let snapshot = self.risk.snapshot();
        info!(
            "=== DEMO STATUS === session {:?} | trades {}/{} | decisions {} | errors {} | equity ${} | last trade {}",
            self.session_start.elapsed(),
            self.trade_count,
            self.config.max_trades_per_day,
            self.decision_count,
            self.error_count,
            snapshot.equity,
            self.last_trade_at
                .map(|t| format!("{:?} ago", t.elapsed()))
                .unwrap_or_else(|| "never".to_string())
        );
    }
}

fn rejection_label(rejection: &crate::domain::errors::RiskRejection) -> &'static str {
    use crate::domain::errors::RiskRejection::*;
    match rejection {
        InvalidQuantity { .. } => "invalid_quantity",
        DrawdownExceeded { .. } => "drawdown",
        PortfolioRisk { .. } => "portfolio_risk",
        SymbolRisk { .. } => "symbol_risk",
        SectorExposure { .. } => "sector",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::execution::{BreakerConfig, ExecutionConfig};
    use crate::application::strategies::Strategy;
    use crate::domain::signal::Signal;
    use crate::domain::sizing::RiskParameters;
    use crate::infrastructure::mock::MockBroker;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct AlwaysBuy {
        symbol: String,
        confidence: f64,
    }

    #[async_trait]
    impl Strategy for AlwaysBuy {
        fn name(&self) -> &str {
            "always_buy"
        }

        async fn generate(&self, _data: &TickData) -> Result<Vec<Signal>> {
            Ok(vec![Signal::new(
                &self.symbol,
                SignalKind::Buy,
                self.confidence,
                "always_buy",
            )])
        }
    }

    fn fast_execution_config() -> ExecutionConfig {
        ExecutionConfig {
            jitter_range_ms: (0, 1),
            size_variance: 0.0,
            chunk_variance: 0.0,
            decoy_probability: 0.0,
            breaker: BreakerConfig {
                max_consecutive_failures: 3,
                cooldown: Duration::from_millis(100),
            },
            ..ExecutionConfig::default()
        }
    }

    fn loop_with(
        broker: Arc<MockBroker>,
        registry: StrategyRegistry,
        config: SchedulerConfig,
    ) -> (TradingLoop, watch::Sender<bool>) {
        let rng = Arc::new(Mutex::new(StdRng::seed_from_u64(11)));
        let engine = Arc::new(ExecutionEngine::new(
            broker.clone(),
            fast_execution_config(),
            rng,
        ));
        let risk = Arc::new(RiskManager::new(
            RiskParameters::default(),
            HashMap::from([("AAPL".to_string(), "tech".to_string())]),
        ));
        let (tx, rx) = watch::channel(false);
        let metrics = Metrics::new().unwrap();
        (
            TradingLoop::new(broker, registry, risk, engine, metrics, config, rx),
            tx,
        )
    }

    fn seeded_broker() -> Arc<MockBroker> {
        let broker = Arc::new(MockBroker::new());
        broker.set_market_open(true);
        broker.set_watchlist(vec!["AAPL".to_string()]);
        broker.set_quote("AAPL", dec!(100));
        broker.set_sector("AAPL", "tech");
        broker.set_history(
            "AAPL",
            (0..30)
                .map(|i| Decimal::from(95 + (i % 5)))
                .collect(),
        );
        broker
    }

    fn simple_tactic_config() -> SchedulerConfig {
        SchedulerConfig {
            default_tactic: ExecutionTactic::Simple,
            ..SchedulerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_tick_flows_signal_to_order() {
        let broker = seeded_broker();
        let mut registry = StrategyRegistry::new();
        registry.register(
            Arc::new(AlwaysBuy {
                symbol: "AAPL".to_string(),
                confidence: 0.9,
            }),
            1.0,
        );
        let (mut trading_loop, _tx) = loop_with(broker.clone(), registry, simple_tactic_config());

        let outcome = trading_loop.tick().await.unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Completed {
                decisions: 1,
                trades: 1
            }
        );
        assert_eq!(trading_loop.trade_count(), 1);
        let placed = broker.placed_orders();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].symbol, "AAPL");
        assert_eq!(placed[0].side, OrderSide::Buy);
    }

    #[tokio::test]
    async fn test_trade_cap_exhausts_session() {
        let broker = seeded_broker();
        let registry = StrategyRegistry::new();
        let config = SchedulerConfig {
            max_trades_per_day: 0,
            ..simple_tactic_config()
        };
        let (mut trading_loop, _tx) = loop_with(broker, registry, config);

        assert_eq!(
            trading_loop.tick().await.unwrap(),
            TickOutcome::SessionExhausted
        );
    }

    #[tokio::test]
    async fn test_market_closed_gates_tick() {
        let broker = seeded_broker();
        broker.set_market_open(false);
        let (mut trading_loop, _tx) =
            loop_with(broker.clone(), StrategyRegistry::new(), simple_tactic_config());

        assert_eq!(trading_loop.tick().await.unwrap(), TickOutcome::MarketClosed);
        assert!(broker.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn test_broker_burst_trips_global_breaker() {
        let broker = seeded_broker();
        for _ in 0..3 {
            broker.push_portfolio_failure(BrokerError::transient("api down"));
        }
        let config = SchedulerConfig {
            broker_error_burst: 3,
            ..simple_tactic_config()
        };
        let (mut trading_loop, _tx) = loop_with(broker, StrategyRegistry::new(), config);

        for _ in 0..3 {
            assert_eq!(trading_loop.tick().await.unwrap(), TickOutcome::Skipped);
        }
        // Breaker now open: the next tick gates immediately.
        assert_eq!(
            trading_loop.tick().await.unwrap(),
            TickOutcome::BreakerTripped
        );
    }

    #[tokio::test]
    async fn test_fatal_broker_error_bubbles_in_live_mode() {
        let broker = seeded_broker();
        broker.push_portfolio_failure(BrokerError::fatal("account revoked"));
        let (mut trading_loop, _tx) =
            loop_with(broker, StrategyRegistry::new(), simple_tactic_config());

        assert!(trading_loop.tick().await.is_err());
    }

    #[tokio::test]
    async fn test_fatal_broker_error_recovered_in_demo() {
        let broker = seeded_broker();
        broker.push_portfolio_failure(BrokerError::fatal("account revoked"));
        let config = SchedulerConfig {
            demo: true,
            ..simple_tactic_config()
        };
        let (mut trading_loop, _tx) = loop_with(broker, StrategyRegistry::new(), config);

        assert_eq!(trading_loop.tick().await.unwrap(), TickOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_trade_cap_respected_mid_tick() {
        let broker = seeded_broker();
        broker.set_watchlist(vec!["AAPL".to_string(), "MSFT".to_string()]);
        broker.set_quote("MSFT", dec!(200));
        broker.set_sector("MSFT", "tech");
        broker.set_history(
            "MSFT",
            (0..30).map(|i| Decimal::from(195 + (i % 5))).collect(),
        );

        let mut registry = StrategyRegistry::new();
        registry.register(
            Arc::new(AlwaysBuy {
                symbol: "AAPL".to_string(),
                confidence: 0.9,
            }),
            0.5,
        );
        registry.register(
            Arc::new(AlwaysBuy {
                symbol: "MSFT".to_string(),
                confidence: 0.9,
            }),
            0.5,
        );
        let config = SchedulerConfig {
            max_trades_per_day: 1,
            ..simple_tactic_config()
        };
        let (mut trading_loop, _tx) = loop_with(broker.clone(), registry, config);

        let outcome = trading_loop.tick().await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Completed {
                decisions: 2,
                trades: 1
            }
        );
        assert_eq!(broker.placed_orders().len(), 1);
    }
}
