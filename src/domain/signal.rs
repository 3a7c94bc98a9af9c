use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Directional advice for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
}

impl SignalKind {
    /// Numeric value used by weighted fusion: BUY=+1, SELL=-1, HOLD=0.
    pub fn score(&self) -> f64 {
        match self {
            SignalKind::Buy => 1.0,
            SignalKind::Sell => -1.0,
            SignalKind::Hold => 0.0,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Buy => write!(f, "buy"),
            SignalKind::Sell => write!(f, "sell"),
            SignalKind::Hold => write!(f, "hold"),
        }
    }
}

/// An advisory instruction for one symbol, produced by a strategy or by
/// the fusion step of the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub kind: SignalKind,
    /// Confidence in [0, 1]. Clamped on construction.
    pub confidence: f64,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        kind: SignalKind,
        confidence: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            source: source.into(),
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// A BUY/SELL with zero confidence carries no conviction and is
    /// treated as HOLD everywhere downstream.
    pub fn effective_kind(&self) -> SignalKind {
        if self.confidence <= 0.0 {
            SignalKind::Hold
        } else {
            self.kind
        }
    }

    /// HOLD signals never trigger sizing.
    pub fn is_actionable(&self) -> bool {
        !matches!(self.effective_kind(), SignalKind::Hold)
    }
}
