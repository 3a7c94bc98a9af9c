//! Push-based metrics reporter.
//!
//! Periodically emits a structured JSON snapshot to the log stream. No
//! HTTP server, no incoming connections, only outbound data.

use crate::application::risk::RiskManager;
use crate::infrastructure::observability::Metrics;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::info;

#[derive(Serialize)]
struct MetricsSnapshot {
    timestamp: String,
    uptime_seconds: u64,
    version: String,
    portfolio: PortfolioMetrics,
    counters: CounterMetrics,
}

#[derive(Serialize)]
struct PortfolioMetrics {
    equity_usd: f64,
    cash_usd: f64,
    positions_count: usize,
    drawdown_latched: bool,
}

#[derive(Serialize)]
struct CounterMetrics {
    ticks: u64,
    trades_filled: f64,
    risk_rejections: f64,
}

/// Emits one `METRICS_JSON:` line per interval until the process exits.
pub struct MetricsReporter {
    risk: Arc<RiskManager>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(risk: Arc<RiskManager>, metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            risk,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    pub async fn run(self) {
        info!(
            "MetricsReporter: push-based metrics started (interval: {:?})",
            self.interval
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.emit();
        }
    }

    fn emit(&self) {
        let uptime = self.start_time.elapsed().as_secs();
        self.metrics.uptime_seconds.set(uptime as f64);

        let snapshot = self.risk.snapshot();
        let trades_filled: f64 = self
            .metrics
            .trades_total
            .with_label_values(&["buy", "filled"])
            .get()
            + self
                .metrics
                .trades_total
                .with_label_values(&["sell", "filled"])
                .get();
        let rejections: f64 = self
            .metrics
            .registry()
            .gather()
            .iter()
            .filter(|f| f.name() == "stealthflow_risk_rejections_total")
            .flat_map(|f| f.get_metric())
            .map(|m| m.get_counter().value())
            .sum();

        let report = MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            portfolio: PortfolioMetrics {
                equity_usd: snapshot.equity.to_f64().unwrap_or(0.0),
                cash_usd: snapshot.cash.to_f64().unwrap_or(0.0),
                positions_count: snapshot.positions.len(),
                drawdown_latched: self.risk.drawdown_latched(),
            },
            counters: CounterMetrics {
                ticks: self.metrics.ticks_total.get(),
                trades_filled,
                risk_rejections: rejections,
            },
        };

        match serde_json::to_string(&report) {
            Ok(json) => info!("METRICS_JSON:{}", json),
            Err(e) => info!("MetricsReporter: failed to serialize snapshot: {}", e),
        }
    }
}
