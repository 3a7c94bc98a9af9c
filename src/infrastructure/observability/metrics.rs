//! Prometheus metrics definitions for the trading service.
//!
//! All metrics use the `stealthflow_` prefix. Values are pushed through
//! structured log lines by the reporter; no HTTP server is exposed.

use prometheus::{
    core::{AtomicF64, GenericGauge},
    CounterVec, Gauge, IntCounter, Opts, Registry,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Completed trading-loop ticks
    pub ticks_total: IntCounter,
    /// Combined signals produced, by decision
    pub decisions_total: CounterVec,
    /// Executed trades by side and outcome
    pub trades_total: CounterVec,
    /// Sizings rejected by the risk manager, by reason
    pub risk_rejections_total: CounterVec,
    /// Advisory gateway calls by provider and outcome
    pub advisor_calls_total: CounterVec,
    /// Circuit breaker trips by scope (global/provider/symbol)
    pub breaker_trips_total: CounterVec,
    /// Total account equity in USD
    pub portfolio_equity_usd: GenericGauge<AtomicF64>,
    /// Available cash in USD
    pub portfolio_cash_usd: GenericGauge<AtomicF64>,
    /// Current daily drawdown (0-1)
    pub drawdown_current: GenericGauge<AtomicF64>,
    /// Service uptime in seconds
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ticks_total = IntCounter::with_opts(Opts::new(
            "stealthflow_ticks_total",
            "Completed trading-loop ticks",
        ))?;
        registry.register(Box::new(ticks_total.clone()))?;

        let decisions_total = CounterVec::new(
            Opts::new(
                "stealthflow_decisions_total",
                "Combined signals produced, by decision",
            ),
            &["decision"],
        )?;
        registry.register(Box::new(decisions_total.clone()))?;

        let trades_total = CounterVec::new(
            Opts::new(
                "stealthflow_trades_total",
                "Executed trades by side and outcome",
            ),
            &["side", "outcome"],
        )?;
        registry.register(Box::new(trades_total.clone()))?;

        let risk_rejections_total = CounterVec::new(
            Opts::new(
                "stealthflow_risk_rejections_total",
                "Sizings rejected by the risk manager",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(risk_rejections_total.clone()))?;

        let advisor_calls_total = CounterVec::new(
            Opts::new(
                "stealthflow_advisor_calls_total",
                "Advisory gateway calls by provider and outcome",
            ),
            &["provider", "outcome"],
        )?;
        registry.register(Box::new(advisor_calls_total.clone()))?;

        let breaker_trips_total = CounterVec::new(
            Opts::new(
                "stealthflow_breaker_trips_total",
                "Circuit breaker trips by scope",
            ),
            &["scope"],
        )?;
        registry.register(Box::new(breaker_trips_total.clone()))?;

        let portfolio_equity_usd = Gauge::with_opts(Opts::new(
            "stealthflow_portfolio_equity_usd",
            "Total account equity in USD",
        ))?;
        registry.register(Box::new(portfolio_equity_usd.clone()))?;

        let portfolio_cash_usd = Gauge::with_opts(Opts::new(
            "stealthflow_portfolio_cash_usd",
            "Available cash in USD",
        ))?;
        registry.register(Box::new(portfolio_cash_usd.clone()))?;

        let drawdown_current = Gauge::with_opts(Opts::new(
            "stealthflow_drawdown_current",
            "Current daily drawdown (0-1)",
        ))?;
        registry.register(Box::new(drawdown_current.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "stealthflow_uptime_seconds",
            "Service uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            ticks_total,
            decisions_total,
            trades_total,
            risk_rejections_total,
            advisor_calls_total,
            breaker_trips_total,
            portfolio_equity_usd,
            portfolio_cash_usd,
            drawdown_current,
            uptime_seconds,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        let metrics = Metrics::new().unwrap();

        metrics.ticks_total.inc();
        metrics.ticks_total.inc();
        metrics
            .trades_total
            .with_label_values(&["buy", "filled"])
            .inc();

        assert_eq!(metrics.ticks_total.get(), 2);

        let families = metrics.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "stealthflow_ticks_total"));
    }

    #[test]
    fn test_gauges_track_latest_value() {
        let metrics = Metrics::new().unwrap();

        metrics.portfolio_equity_usd.set(100_000.0);
        metrics.portfolio_equity_usd.set(98_500.0);
        assert_eq!(metrics.portfolio_equity_usd.get(), 98_500.0);
    }
}
