use crate::application::strategies::{Strategy, TickData};
use crate::domain::signal::{Signal, SignalKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fusion decision thresholds: weighted score strictly above +0.3 is a
/// BUY, strictly below -0.3 a SELL, the boundary itself resolves to HOLD.
const BUY_THRESHOLD: f64 = 0.3;
const SELL_THRESHOLD: f64 = -0.3;

/// Holds the weighted strategy ensemble and fuses per-symbol outputs into
/// one combined signal each.
pub struct StrategyRegistry {
    entries: Vec<(Arc<dyn Strategy>, f64)>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a strategy. Weights need not sum to one; they are normalized
    /// per symbol at fusion time. Negative weights are clamped to zero.
    pub fn register(&mut self, strategy: Arc<dyn Strategy>, weight: f64) {
        self.entries.push((strategy, weight.max(0.0)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every strategy in registration order and fuse their outputs.
    ///
    /// A strategy that errors is skipped and its weight excluded from this
    /// tick's normalization. Fusion is order-independent and idempotent
    /// for identical inputs.
    pub async fn combine(&self, data: &TickData) -> HashMap<String, Signal> {
        let mut per_symbol: HashMap<String, Vec<(SignalKind, f64, f64, String)>> = HashMap::new();

        for (strategy, weight) in &self.entries {
            if *weight == 0.0 {
                continue;
            }
            match strategy.generate(data).await {
                Ok(signals) => {
                    for signal in signals {
                        per_symbol.entry(signal.symbol.clone()).or_default().push((
                            signal.effective_kind(),
                            signal.confidence,
                            *weight,
                            signal.source.clone(),
                        ));
                    }
                }
                Err(e) => {
                    warn!(
                        "StrategyRegistry: {} failed this tick, excluding its weight: {}",
                        strategy.name(),
                        e
                    );
                }
            }
        }

        let mut combined = HashMap::new();
        for (symbol, components) in per_symbol {
            let total_weight: f64 = components.iter().map(|(_, _, w, _)| w).sum();
            if total_weight <= 0.0 {
                continue;
            }

            let score: f64 = components
                .iter()
                .map(|(kind, _, w, _)| kind.score() * w)
                .sum::<f64>()
                / total_weight;
            let confidence: f64 = components
                .iter()
                .map(|(_, c, w, _)| c * w)
                .sum::<f64>()
                / total_weight;

            let kind = if score > BUY_THRESHOLD {
                SignalKind::Buy
            } else if score < SELL_THRESHOLD {
                SignalKind::Sell
            } else {
                SignalKind::Hold
            };

            let sources: Vec<&str> = components.iter().map(|(_, _, _, s)| s.as_str()).collect();
            debug!(
                "StrategyRegistry [{}]: score={:.3} -> {} (confidence={:.2}, components={})",
                symbol,
                score,
                kind,
                confidence,
                components.len()
            );

            let signal = Signal::new(symbol.clone(), kind, confidence, "combined")
                .with_metadata("weighted_score", format!("{:.6}", score))
                .with_metadata("component_count", components.len().to_string())
                .with_metadata("component_sources", sources.join(","));
            combined.insert(symbol, signal);
        }

        combined
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
