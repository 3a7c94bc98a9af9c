mod advisor;
mod bollinger;
mod ma_cross;
mod macd;
mod registry;
mod rsi;

pub use advisor::AdvisorStrategy;
pub use bollinger::BollingerBandsStrategy;
pub use ma_cross::MovingAverageCrossStrategy;
pub use macd::MacdStrategy;
pub use registry::StrategyRegistry;
pub use rsi::RsiStrategy;

use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::signal::Signal;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Market-data bundle handed to every strategy on each tick.
#[derive(Debug, Clone)]
pub struct TickData {
    pub snapshot: PortfolioSnapshot,
    /// Recent daily closes per symbol, oldest first.
    pub series: HashMap<String, Vec<Decimal>>,
    pub quotes: HashMap<String, Decimal>,
}

impl TickData {
    pub fn symbols(&self) -> Vec<&str> {
        self.series.keys().map(|s| s.as_str()).collect()
    }

    /// Close series as f64 for indicator math, or None when absent/empty.
    pub fn closes_f64(&self, symbol: &str) -> Option<Vec<f64>> {
        let series = self.series.get(symbol)?;
        if series.is_empty() {
            return None;
        }
        Some(
            series
                .iter()
                .map(|d| d.to_f64().unwrap_or(0.0))
                .collect(),
        )
    }
}

/// A signal generator. Implementations produce zero or more signals per
/// tick; the registry fuses them per symbol.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Data fields this strategy needs present in the tick bundle.
    fn required_fields(&self) -> Vec<&'static str> {
        vec!["symbol", "close"]
    }

    async fn generate(&self, data: &TickData) -> Result<Vec<Signal>>;
}
