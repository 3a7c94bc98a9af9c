use crate::application::strategies::{Strategy, TickData};
use crate::domain::signal::{Signal, SignalKind};
use anyhow::Result;
use async_trait::async_trait;
use ta::indicators::SimpleMovingAverage;
use ta::Next;

/// Moving average crossover.
///
/// Buys while the short average sits above the long one, sells on the
/// inverse; confidence grows with the spread between the averages.
pub struct MovingAverageCrossStrategy {
    short_window: usize,
    long_window: usize,
}

impl MovingAverageCrossStrategy {
    pub fn new(short_window: usize, long_window: usize) -> Self {
        Self {
            short_window,
            long_window,
        }
    }
}

impl Default for MovingAverageCrossStrategy {
    fn default() -> Self {
        Self::new(20, 50)
    }
}

#[async_trait]
impl Strategy for MovingAverageCrossStrategy {
    fn name(&self) -> &str {
        "ma_cross"
    }

    async fn generate(&self, data: &TickData) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();

        for symbol in data.symbols() {
            let Some(closes) = data.closes_f64(symbol) else {
                continue;
            };

            let mut short = SimpleMovingAverage::new(self.short_window)
                .map_err(|e| anyhow::anyhow!("invalid short window: {}", e))?;
            let mut long = SimpleMovingAverage::new(self.long_window)
                .map_err(|e| anyhow::anyhow!("invalid long window: {}", e))?;

            let mut short_ma = 0.0;
            let mut long_ma = 0.0;
            for close in &closes {
                short_ma = short.next(*close);
                long_ma = long.next(*close);
            }

            if long_ma <= 0.0 {
                continue;
            }

            let (kind, confidence) = if short_ma > long_ma {
                (
                    SignalKind::Buy,
                    ((short_ma / long_ma - 1.0) * 10.0).min(0.9),
                )
            } else if short_ma < long_ma {
                (
                    SignalKind::Sell,
                    ((long_ma / short_ma - 1.0) * 10.0).min(0.9),
                )
            } else {
                (SignalKind::Hold, 0.5)
            };

            signals.push(
                Signal::new(symbol, kind, confidence, self.name())
                    .with_metadata("short_ma", format!("{:.4}", short_ma))
                    .with_metadata("long_ma", format!("{:.4}", long_ma)),
            );
        }

        Ok(signals)
    }
}
