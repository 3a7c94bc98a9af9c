use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configuration bounding the risk manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Maximum position size as a fraction of equity.
    pub max_position_fraction: f64,
    /// Maximum total risk contribution accepted per day.
    pub max_portfolio_risk_daily: f64,
    /// Maximum risk contribution for a single symbol.
    pub max_symbol_risk: f64,
    /// Maximum exposure to any one sector.
    pub max_sector_exposure: f64,
    /// Daily drawdown that latches sizing rejection for the rest of the day.
    pub max_daily_drawdown: f64,
    pub default_stop_pct: f64,
    pub default_target_pct: f64,
    /// Scale base fraction inversely with annualized volatility.
    pub volatility_scaling: bool,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_position_fraction: 0.05,
            max_portfolio_risk_daily: 0.02,
            max_symbol_risk: 0.01,
            max_sector_exposure: 0.20,
            max_daily_drawdown: 0.05,
            default_stop_pct: 0.05,
            default_target_pct: 0.10,
            volatility_scaling: true,
        }
    }
}

/// Accepted output of the risk manager for one proposed trade.
///
/// Invariant: `notional = quantity * reference_price`; a sizing whose risk
/// contribution would exceed `max_symbol_risk` is rejected, not clipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizing {
    pub symbol: String,
    pub quantity: Decimal,
    pub notional: Decimal,
    pub portfolio_fraction: f64,
    pub risk_contribution: f64,
    pub stop_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters_are_conservative() {
        let params = RiskParameters::default();
        assert!(params.max_symbol_risk <= params.max_portfolio_risk_daily);
        assert!(params.max_position_fraction < params.max_sector_exposure);
        assert!(params.volatility_scaling);
    }
}
