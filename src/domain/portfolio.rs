use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One open position inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionState {
    pub quantity: Decimal,
    pub market_value: Decimal,
    pub sector: String,
}

/// Point-in-time account state consumed by the risk manager. The snapshot
/// is a plain value: it is copied out of the owning mutex for read-only
/// algorithmic use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: Decimal,
    pub equity: Decimal,
    pub positions: HashMap<String, PositionState>,
    pub daily_realized_pnl: Decimal,
    pub daily_high_water_mark: Decimal,
}

impl PortfolioSnapshot {
    pub fn empty(cash: Decimal) -> Self {
        Self {
            cash,
            equity: cash,
            positions: HashMap::new(),
            daily_realized_pnl: Decimal::ZERO,
            daily_high_water_mark: cash,
        }
    }

    /// Fraction of equity currently allocated to `symbol`, 0.0 if flat.
    pub fn position_fraction(&self, symbol: &str) -> f64 {
        if self.equity <= Decimal::ZERO {
            return 0.0;
        }
        self.positions
            .get(symbol)
            .map(|p| (p.market_value / self.equity).to_f64().unwrap_or(0.0))
            .unwrap_or(0.0)
    }

    pub fn position_quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Per-sector exposure as fractions of equity.
    pub fn sector_exposure(&self) -> HashMap<String, f64> {
        let mut exposure: HashMap<String, f64> = HashMap::new();
        if self.equity <= Decimal::ZERO {
            return exposure;
        }
        for position in self.positions.values() {
            let fraction = (position.market_value / self.equity).to_f64().unwrap_or(0.0);
            *exposure.entry(position.sector.clone()).or_insert(0.0) += fraction;
        }
        exposure
    }
}
