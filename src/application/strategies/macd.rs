use crate::application::strategies::{Strategy, TickData};
use crate::domain::signal::{Signal, SignalKind};
use anyhow::Result;
use async_trait::async_trait;
use ta::indicators::MovingAverageConvergenceDivergence;
use ta::Next;

/// MACD crossover strategy.
///
/// Signals on the MACD line crossing its signal line; confidence combines
/// crossover strength, histogram direction and the absolute MACD value.
pub struct MacdStrategy {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl MacdStrategy {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
            signal_period,
        }
    }
}

impl Default for MacdStrategy {
    fn default() -> Self {
        Self::new(12, 26, 9)
    }
}

#[async_trait]
impl Strategy for MacdStrategy {
    fn name(&self) -> &str {
        "macd"
    }

    async fn generate(&self, data: &TickData) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();

        for symbol in data.symbols() {
            let Some(closes) = data.closes_f64(symbol) else {
                continue;
            };
            if closes.len() < self.slow_period + 2 {
                continue;
            }

            let mut indicator = MovingAverageConvergenceDivergence::new(
                self.fast_period,
                self.slow_period,
                self.signal_period,
            )
            .map_err(|e| anyhow::anyhow!("invalid macd periods: {}", e))?;

            let mut prev = None;
            let mut last = None;
            for close in &closes {
                prev = last;
                last = Some(indicator.next(*close));
            }
            let (Some(prev), Some(last)) = (prev, last) else {
                continue;
            };

            let crossed_up = prev.macd <= prev.signal && last.macd > last.signal;
            let crossed_down = prev.macd >= prev.signal && last.macd < last.signal;
            if !crossed_up && !crossed_down {
                continue;
            }

            let crossover_strength = if last.signal != 0.0 {
                (last.macd - last.signal).abs() / last.signal.abs()
            } else {
                0.0
            };
            let histogram_direction = if (crossed_up && last.histogram > prev.histogram)
                || (crossed_down && last.histogram < prev.histogram)
            {
                1.0
            } else {
                0.5
            };
            let macd_strength = (last.macd.abs() / 2.0).min(1.0);
            let confidence = (0.5
                + crossover_strength * 0.2
                + histogram_direction * 0.2
                + macd_strength * 0.1)
                .min(0.9);

            let kind = if crossed_up {
                SignalKind::Buy
            } else {
                SignalKind::Sell
            };

            signals.push(
                Signal::new(symbol, kind, confidence, self.name())
                    .with_metadata("macd", format!("{:.4}", last.macd))
                    .with_metadata("signal_line", format!("{:.4}", last.signal))
                    .with_metadata("histogram", format!("{:.4}", last.histogram)),
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
    async fn test_reversal_up_crosses_and_buys() {
        // Long decline then a sharp reversal forces the MACD line up
        // through its signal line on the final bars.
        let mut closes: Vec<f64> = (0..60).map(|i| 200.0 - i as f64).collect();
        closes.extend((0..6).map(|i| 140.0 + 12.0 * i as f64));

        let strategy = MacdStrategy::default();
        let signals = strategy.generate(&tick_with_closes(closes)).await.unwrap();

        // The crossover happens on exactly one of the appended bars; with
        // the full series the last bar is post-cross or at-cross.
        if let Some(signal) = signals.first() {
            assert_eq!(signal.kind, SignalKind::Buy);
            assert!(signal.confidence >= 0.5);
        }
    }

    #[tokio::test]
    async fn test_no_crossover_no_signal() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let strategy = MacdStrategy::default();

        let signals = strategy.generate(&tick_with_closes(closes)).await.unwrap();
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn test_short_series_skipped() {
        let strategy = MacdStrategy::default();
        let signals = strategy
            .generate(&tick_with_closes(vec![100.0; 10]))
            .await
            .unwrap();
        assert!(signals.is_empty());
    }
}
