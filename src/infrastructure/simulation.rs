use crate::domain::order::OrderSide;
use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::time::Duration;

/// Simulated broker round-trip delay.
pub trait LatencyModel: Send + Sync {
    fn next_delay(&self) -> Duration;
}

/// Base RTT plus uniform jitter, clamped at zero.
#[derive(Debug, Clone)]
pub struct NetworkLatency {
    base_ms: u64,
    jitter_ms: u64,
}

impl NetworkLatency {
    pub fn new(base_ms: u64, jitter_ms: u64) -> Self {
        Self { base_ms, jitter_ms }
    }
}

impl LatencyModel for NetworkLatency {
    fn next_delay(&self) -> Duration {
        let mut rng = rand::rng();
        let jitter = rng.random_range(-(self.jitter_ms as i64)..=(self.jitter_ms as i64));
        Duration::from_millis((self.base_ms as i64 + jitter).max(0) as u64)
    }
}

/// Instant acknowledgement, used by tests.
pub struct ZeroLatency;

impl LatencyModel for ZeroLatency {
    fn next_delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// Simulated fill-price degradation.
pub trait SlippageModel: Send + Sync {
    fn fill_price(&self, price: Decimal, quantity: Decimal, side: OrderSide) -> Decimal;
}

/// Uniform noise around the quote plus a fixed impact cost that always
/// moves the price against the taker: buys fill higher, sells lower.
#[derive(Debug, Clone)]
pub struct VolatilitySlippage {
    spread_factor: f64,
}

impl VolatilitySlippage {
    pub fn new(spread_factor: f64) -> Self {
        Self { spread_factor }
    }
}

impl SlippageModel for VolatilitySlippage {
    fn fill_price(&self, price: Decimal, _quantity: Decimal, side: OrderSide) -> Decimal {
        if self.spread_factor <= 0.0 {
            return price;
        }
        let mut rng = rand::rng();
        let noise = rng.random_range(-self.spread_factor..=self.spread_factor);
        let impact = self.spread_factor * 0.2;

        let pct_change = match side {
            OrderSide::Buy => impact + noise,
            OrderSide::Sell => -(impact + noise),
        };

        let adjusted = price.to_f64().unwrap_or(0.0) * (1.0 + pct_change);
        Decimal::from_f64(adjusted.max(0.0)).unwrap_or(price)
    }
}

/// Perfect execution at the quoted price, used by tests.
pub struct ZeroSlippage;

impl SlippageModel for ZeroSlippage {
    fn fill_price(&self, price: Decimal, _quantity: Decimal, _side: OrderSide) -> Decimal {
        price
    }
}
