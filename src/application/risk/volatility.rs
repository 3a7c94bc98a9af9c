use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Fallback when the series is too short for a meaningful estimate.
pub const DEFAULT_VOLATILITY: f64 = 0.20;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const MIN_SAMPLES: usize = 10;

/// Annualized volatility from a series of daily closes, oldest first.
///
/// Computed as the standard deviation of simple daily returns scaled by
/// sqrt(252). Series shorter than ten points fall back to the 20% default.
pub fn annualized_volatility(closes: &[Decimal]) -> f64 {
    if closes.len() < MIN_SAMPLES {
        return DEFAULT_VOLATILITY;
    }

    let prices: Vec<f64> = closes
        .iter()
        .map(|c| c.to_f64().unwrap_or(0.0))
        .collect();

    let mut returns = Vec::with_capacity(prices.len() - 1);
    for pair in prices.windows(2) {
        if pair[0] > 0.0 {
            returns.push(pair[1] / pair[0] - 1.0);
        }
    }
    if returns.len() < 2 {
        return DEFAULT_VOLATILITY;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / returns.len() as f64;

    variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    fn closes(values: &[f64]) -> Vec<Decimal> {
        values
            .iter()
            .map(|v| Decimal::from_f64(*v).unwrap())
            .collect()
    }

    #[test]
    fn test_short_series_uses_default() {
        assert_eq!(
            annualized_volatility(&closes(&[100.0, 101.0, 99.0])),
            DEFAULT_VOLATILITY
        );
    }

    #[test]
    fn test_constant_prices_have_zero_volatility() {
        let series = closes(&[100.0; 30]);
        assert_eq!(annualized_volatility(&series), 0.0);
    }

    #[test]
    fn test_choppier_series_is_more_volatile() {
        let calm: Vec<f64> = (0..30).map(|i| 100.0 + 0.1 * (i % 2) as f64).collect();
        let wild: Vec<f64> = (0..30).map(|i| 100.0 + 10.0 * (i % 2) as f64).collect();

        let calm_vol = annualized_volatility(&closes(&calm));
        let wild_vol = annualized_volatility(&closes(&wild));
        assert!(wild_vol > calm_vol);
        assert!(calm_vol > 0.0);
    }

    #[test]
    fn test_deterministic() {
        let series = closes(&[100.0, 102.0, 99.0, 103.0, 101.0, 98.0, 104.0, 100.0, 97.0, 105.0, 102.0]);
        assert_eq!(annualized_volatility(&series), annualized_volatility(&series));
    }
}
