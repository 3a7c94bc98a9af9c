use crate::application::strategies::{Strategy, TickData};
use crate::domain::signal::{Signal, SignalKind};
use anyhow::Result;
use async_trait::async_trait;
use ta::indicators::RelativeStrengthIndex;
use ta::Next;

/// RSI mean-reversion: oversold readings buy, overbought readings sell.
pub struct RsiStrategy {
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl RsiStrategy {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Self {
        Self {
            period,
            oversold,
            overbought,
        }
    }
}

impl Default for RsiStrategy {
    fn default() -> Self {
        Self::new(14, 30.0, 70.0)
    }
}

#[async_trait]
impl Strategy for RsiStrategy {
    fn name(&self) -> &str {
        "rsi"
    }

    async fn generate(&self, data: &TickData) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();

        for symbol in data.symbols() {
            let Some(closes) = data.closes_f64(symbol) else {
                continue;
            };
            if closes.len() < self.period {
                continue;
            }

            let mut indicator = RelativeStrengthIndex::new(self.period)
                .map_err(|e| anyhow::anyhow!("invalid rsi period: {}", e))?;
            let mut rsi = 50.0;
            for close in &closes {
                rsi = indicator.next(*close);
            }

            let (kind, confidence) = if rsi < self.oversold {
                (
                    SignalKind::Buy,
                    ((self.oversold - rsi) / self.oversold).min(0.9),
                )
            } else if rsi > self.overbought {
                (
                    SignalKind::Sell,
                    ((rsi - self.overbought) / (100.0 - self.overbought)).min(0.9),
                )
            } else {
                // Graded hold: weakest conviction dead-center in the band.
                let mid = (self.overbought + self.oversold) / 2.0;
                let half = (self.overbought - self.oversold) / 2.0;
                let distance = (rsi - mid).abs();
                (SignalKind::Hold, 0.3 + 0.4 * (1.0 - distance / half))
            };

            signals.push(
                Signal::new(symbol, kind, confidence, self.name())
                    .with_metadata("rsi", format!("{:.2}", rsi)),
            );
        }

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::PortfolioSnapshot;
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn tick_with_closes(closes: Vec<f64>) -> TickData {
        let mut series = HashMap::new();
        series.insert(
            "AAPL".to_string(),
            closes
                .into_iter()
                .map(|c| Decimal::from_f64(c).unwrap())
                .collect(),
        );
        TickData {
            snapshot: PortfolioSnapshot::empty(dec!(100000)),
            series,
            quotes: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_steady_losses_read_oversold() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - 3.0 * i as f64).collect();
        let strategy = RsiStrategy::default();

        let signals = strategy.generate(&tick_with_closes(closes)).await.unwrap();
        assert_eq!(signals[0].kind, SignalKind::Buy);
    }

    #[tokio::test]
    async fn test_steady_gains_read_overbought() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + 3.0 * i as f64).collect();
        let strategy = RsiStrategy::default();

        let signals = strategy.generate(&tick_with_closes(closes)).await.unwrap();
        assert_eq!(signals[0].kind, SignalKind::Sell);
    }

    #[tokio::test]
    async fn test_short_series_skipped() {
        let strategy = RsiStrategy::default();
        let signals = strategy
            .generate(&tick_with_closes(vec![100.0, 101.0, 102.0]))
            .await
            .unwrap();
        assert!(signals.is_empty());
    }
}
