use crate::domain::errors::RiskRejection;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::signal::{Signal, SignalKind};
use crate::domain::sizing::{PositionSizing, RiskParameters};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Bounds applied to the inverse-volatility sizing factor.
const VOLATILITY_FACTOR_MIN: f64 = 0.25;
const VOLATILITY_FACTOR_MAX: f64 = 2.0;
const BASELINE_VOLATILITY: f64 = 0.20;

#[derive(Debug)]
struct RiskState {
    snapshot: PortfolioSnapshot,
    /// Risk contributions accepted today, keyed by symbol.
    accepted_risk: HashMap<String, f64>,
    /// Sector fractions accepted today on top of the snapshot exposure.
    accepted_sector_fraction: HashMap<String, f64>,
    day: NaiveDate,
    high_water_mark: Decimal,
    drawdown_latched: bool,
}

/// Converts a signal plus portfolio state into either an accepted sizing
/// or a typed rejection. Deterministic for identical inputs.
///
/// The portfolio snapshot lives behind a single mutex and is copied out
/// for read-only use; fills are recorded back through the same lock.
pub struct RiskManager {
    params: RiskParameters,
    sector_map: HashMap<String, String>,
    state: Mutex<RiskState>,
}

impl RiskManager {
    pub fn new(params: RiskParameters, sector_map: HashMap<String, String>) -> Self {
        Self {
            params,
            sector_map,
            state: Mutex::new(RiskState {
                snapshot: PortfolioSnapshot::empty(Decimal::ZERO),
                accepted_risk: HashMap::new(),
                accepted_sector_fraction: HashMap::new(),
                day: Utc::now().date_naive(),
                high_water_mark: Decimal::ZERO,
                drawdown_latched: false,
            }),
        }
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    /// Replace the working snapshot with a fresh broker fetch.
    pub fn update_snapshot(&self, snapshot: PortfolioSnapshot) {
        let mut state = self.state.lock().expect("risk state lock poisoned");
        state.snapshot = snapshot;
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        self.state
            .lock()
            .expect("risk state lock poisoned")
            .snapshot
            .clone()
    }

    /// Update the daily high-water mark and the drawdown latch. Crossing
    /// a day boundary resets all daily accounting.
    pub fn record_mark(&self, equity: Decimal, now: DateTime<Utc>) {
        let mut state = self.state.lock().expect("risk state lock poisoned");

        let today = now.date_naive();
        if today != state.day {
            info!("RiskManager: day rolled to {}, resetting daily accounting", today);
            state.day = today;
            state.high_water_mark = equity;
            state.drawdown_latched = false;
            state.accepted_risk.clear();
            state.accepted_sector_fraction.clear();
            return;
        }

        if equity > state.high_water_mark {
            state.high_water_mark = equity;
        }

        if state.high_water_mark > Decimal::ZERO && !state.drawdown_latched {
            let drawdown = ((state.high_water_mark - equity) / state.high_water_mark)
                .to_f64()
                .unwrap_or(0.0);
            if drawdown > self.params.max_daily_drawdown {
                warn!(
                    "RiskManager: daily drawdown {:.2}% exceeds {:.2}%, sizing halted for the day",
                    drawdown * 100.0,
                    self.params.max_daily_drawdown * 100.0
                );
                state.drawdown_latched = true;
            }
        }
    }

    /// Size a signal against the current snapshot, then run the
    /// acceptance checks. The first failing check rejects; a rejected
    /// sizing is dropped, never clipped.
    pub fn evaluate(
        &self,
        signal: &Signal,
        price: Decimal,
        volatility: f64,
    ) -> Result<PositionSizing, RiskRejection> {
        let state = self.state.lock().expect("risk state lock poisoned");
        let snapshot = state.snapshot.clone();

        let sizing = self.size(signal, price, volatility, &snapshot);
        self.validate(signal, &sizing, &state, &snapshot)?;
        Ok(sizing)
    }

    fn size(
        &self,
        signal: &Signal,
        price: Decimal,
        volatility: f64,
        snapshot: &PortfolioSnapshot,
    ) -> PositionSizing {
        let mut base_fraction = self.params.max_position_fraction * signal.confidence;

        if self.params.volatility_scaling && volatility > 0.0 {
            let factor = (1.0 / (volatility / BASELINE_VOLATILITY))
                .clamp(VOLATILITY_FACTOR_MIN, VOLATILITY_FACTOR_MAX);
            base_fraction *= factor;
        }

        let current_fraction = snapshot.position_fraction(&signal.symbol);
        let current_quantity = snapshot.position_quantity(&signal.symbol);
        let kind = signal.effective_kind();

        let fraction = match kind {
            SignalKind::Buy if current_quantity > Decimal::ZERO => {
                // Adding to a long: only the headroom above the current
                // allocation is available.
                (base_fraction - current_fraction).max(0.0)
            }
            SignalKind::Sell if current_quantity > Decimal::ZERO => current_fraction,
            _ => base_fraction,
        };

        let notional = snapshot.equity * Decimal::from_f64(fraction).unwrap_or(Decimal::ZERO);
        let mut quantity = if price > Decimal::ZERO {
            notional / price
        } else {
            Decimal::ZERO
        };
        if kind == SignalKind::Sell {
            quantity = quantity.min(current_quantity);
        }

        let risk_contribution = fraction * self.params.default_stop_pct;

        let (stop_price, target_price) = match kind {
            SignalKind::Buy => (
                Some(price * Decimal::from_f64(1.0 - self.params.default_stop_pct).unwrap_or(Decimal::ONE)),
                Some(price * Decimal::from_f64(1.0 + self.params.default_target_pct).unwrap_or(Decimal::ONE)),
            ),
            SignalKind::Sell => (
                Some(price * Decimal::from_f64(1.0 + self.params.default_stop_pct).unwrap_or(Decimal::ONE)),
                Some(price * Decimal::from_f64(1.0 - self.params.default_target_pct).unwrap_or(Decimal::ONE)),
            ),
            SignalKind::Hold => (None, None),
        };

        PositionSizing {
            symbol: signal.symbol.clone(),
            quantity,
            notional: quantity * price,
            portfolio_fraction: fraction,
            risk_contribution,
            stop_price,
            target_price,
        }
    }

    fn validate(
        &self,
        signal: &Signal,
        sizing: &PositionSizing,
        state: &RiskState,
        snapshot: &PortfolioSnapshot,
    ) -> Result<(), RiskRejection> {
        if sizing.quantity <= Decimal::ZERO {
            return Err(RiskRejection::InvalidQuantity {
                symbol: sizing.symbol.clone(),
            });
        }

        if state.drawdown_latched {
            let drawdown = if state.high_water_mark > Decimal::ZERO {
                ((state.high_water_mark - snapshot.equity) / state.high_water_mark)
                    .to_f64()
                    .unwrap_or(0.0)
            } else {
                0.0
            };
            return Err(RiskRejection::DrawdownExceeded {
                drawdown_pct: drawdown * 100.0,
                max_pct: self.params.max_daily_drawdown * 100.0,
            });
        }

        let open_risk: f64 = state.accepted_risk.values().sum();
        let projected_risk = open_risk + sizing.risk_contribution;
        if projected_risk > self.params.max_portfolio_risk_daily {
            return Err(RiskRejection::PortfolioRisk {
                projected: projected_risk,
                max: self.params.max_portfolio_risk_daily,
            });
        }

        if sizing.risk_contribution > self.params.max_symbol_risk {
            return Err(RiskRejection::SymbolRisk {
                symbol: sizing.symbol.clone(),
                contribution: sizing.risk_contribution,
                max: self.params.max_symbol_risk,
            });
        }

        let sector = self.sector_of(signal, snapshot);
        let held_exposure = snapshot.sector_exposure().get(&sector).copied().unwrap_or(0.0);
        let pending = state
            .accepted_sector_fraction
            .get(&sector)
            .copied()
            .unwrap_or(0.0);
        let projected_exposure = held_exposure + pending + sizing.portfolio_fraction;
        if projected_exposure > self.params.max_sector_exposure {
            return Err(RiskRejection::SectorExposure {
                sector,
                projected: projected_exposure,
                max: self.params.max_sector_exposure,
            });
        }

        Ok(())
    }

    /// Record an accepted sizing that actually reached the broker, so the
    /// daily risk and sector totals bind later evaluations in the tick.
    pub fn record_fill(&self, signal: &Signal, sizing: &PositionSizing) {
        let mut state = self.state.lock().expect("risk state lock poisoned");
        let snapshot = state.snapshot.clone();
        let sector = self.sector_of(signal, &snapshot);

        *state
            .accepted_risk
            .entry(sizing.symbol.clone())
            .or_insert(0.0) += sizing.risk_contribution;
        *state.accepted_sector_fraction.entry(sector).or_insert(0.0) +=
            sizing.portfolio_fraction;

        debug!(
            "RiskManager: recorded fill {} fraction={:.4} risk={:.4}",
            sizing.symbol, sizing.portfolio_fraction, sizing.risk_contribution
        );
    }

    pub fn drawdown_latched(&self) -> bool {
        self.state
            .lock()
            .expect("risk state lock poisoned")
            .drawdown_latched
    }

    /// Current drawdown off the daily high-water mark, as a fraction.
    pub fn current_drawdown(&self) -> f64 {
        let state = self.state.lock().expect("risk state lock poisoned");
        if state.high_water_mark <= Decimal::ZERO {
            return 0.0;
        }
        ((state.high_water_mark - state.snapshot.equity) / state.high_water_mark)
            .to_f64()
            .unwrap_or(0.0)
            .max(0.0)
    }

    fn sector_of(&self, signal: &Signal, snapshot: &PortfolioSnapshot) -> String {
        snapshot
            .positions
            .get(&signal.symbol)
            .map(|p| p.sector.clone())
            .or_else(|| self.sector_map.get(&signal.symbol).cloned())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}
