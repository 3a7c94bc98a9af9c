use crate::application::strategies::{Strategy, TickData};
use crate::domain::signal::{Signal, SignalKind};
use anyhow::Result;
use async_trait::async_trait;
use ta::indicators::BollingerBands;
use ta::Next;

/// Bollinger band breach strategy.
///
/// Buys when price breaks below the lower band, sells above the upper
/// band; confidence scales with the distance from the middle band
/// normalized by band width.
pub struct BollingerBandsStrategy {
    window: usize,
    num_std: f64,
}

impl BollingerBandsStrategy {
    pub fn new(window: usize, num_std: f64) -> Self {
        Self { window, num_std }
    }
}

impl Default for BollingerBandsStrategy {
    fn default() -> Self {
        Self::new(20, 2.0)
    }
}

#[async_trait]
impl Strategy for BollingerBandsStrategy {
    fn name(&self) -> &str {
        "bollinger"
    }

    async fn generate(&self, data: &TickData) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();

        for symbol in data.symbols() {
            let Some(closes) = data.closes_f64(symbol) else {
                continue;
            };
            if closes.len() < self.window + 2 {
                continue;
            }

            let mut indicator = BollingerBands::new(self.window, self.num_std)
                .map_err(|e| anyhow::anyhow!("invalid bollinger parameters: {}", e))?;

            let mut prev_bands = None;
            let mut last_bands = None;
            for close in &closes {
                prev_bands = last_bands;
                last_bands = Some(indicator.next(*close));
            }
            let (Some(prev_bands), Some(last_bands)) = (prev_bands, last_bands) else {
                continue;
            };

            let last_close = closes[closes.len() - 1];
            let prev_close = closes[closes.len() - 2];
            if last_bands.average <= 0.0 {
                continue;
            }

            let band_width = (last_bands.upper - last_bands.lower) / last_bands.average;
            if band_width <= 0.0 {
                continue;
            }
            let distance_factor = (last_close - last_bands.average).abs() / last_bands.average;
            let breach_confidence = (0.5 + distance_factor * (1.0 / band_width)).min(0.9);

            let percent_b = (last_close - last_bands.lower) / (last_bands.upper - last_bands.lower);

            let (kind, confidence) =
                if prev_close >= prev_bands.lower && last_close < last_bands.lower {
                    (SignalKind::Buy, breach_confidence)
                } else if prev_close <= prev_bands.upper && last_close > last_bands.upper {
                    (SignalKind::Sell, breach_confidence)
                } else if percent_b < 0.0 {
                    (SignalKind::Buy, (0.5 + percent_b.abs() * 0.5).min(0.8))
                } else if percent_b > 1.0 {
                    (SignalKind::Sell, (0.5 + (percent_b - 1.0) * 0.5).min(0.8))
                } else {
                    continue;
                };

            signals.push(
                Signal::new(symbol, kind, confidence, self.name())
                    .with_metadata("middle_band", format!("{:.4}", last_bands.average))
                    .with_metadata("upper_band", format!("{:.4}", last_bands.upper))
                    .with_metadata("lower_band", format!("{:.4}", last_bands.lower))
                    .with_metadata("percent_b", format!("{:.4}", percent_b)),
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
    async fn test_crash_through_lower_band_buys() {
        let mut closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        closes.push(80.0); // far below the lower band

        let strategy = BollingerBandsStrategy::default();
        let signals = strategy.generate(&tick_with_closes(closes)).await.unwrap();

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Buy);
        assert!(signals[0].confidence > 0.5);
    }

    #[tokio::test]
    async fn test_spike_through_upper_band_sells() {
        let mut closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        closes.push(120.0);

        let strategy = BollingerBandsStrategy::default();
        let signals = strategy.generate(&tick_with_closes(closes)).await.unwrap();

        assert_eq!(signals[0].kind, SignalKind::Sell);
    }

    #[tokio::test]
    async fn test_price_inside_bands_is_quiet() {
        let closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();

        let strategy = BollingerBandsStrategy::default();
        let signals = strategy.generate(&tick_with_closes(closes)).await.unwrap();
        assert!(signals.is_empty());
    }
}
