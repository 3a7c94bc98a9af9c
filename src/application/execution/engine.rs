use crate::application::execution::breaker::{BreakerConfig, SymbolBreakers};
use crate::application::execution::pattern::PatternTracker;
use crate::domain::errors::ExecutionError;
use crate::domain::order::{ChunkFill, ExecutionResult, ExecutionTactic, OrderIntent, OrderSide};
use crate::domain::ports::{BrokerAdapter, OrderOptions};
use rand::rngs::StdRng;
use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, info, warn};

const MIN_JITTER_MS: f64 = 10.0;
/// Order-to-cap ratio boundaries used by auto tactic selection.
const SMALL_ORDER_RATIO: f64 = 0.05;
const LARGE_ORDER_RATIO: f64 = 0.10;
const MEDIUM_ORDER_RATIO_MAX: f64 = 0.20;

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Timing jitter bounds in milliseconds, scaled down by volatility.
    pub jitter_range_ms: (u64, u64),
    /// Requested size varies by U(-v, +v) before splitting.
    pub size_variance: f64,
    /// Per-chunk size variance inside iceberg/TWAP/VWAP splits.
    pub chunk_variance: f64,
    pub decoy_probability: f64,
    /// Decoy size as a fraction of the real order.
    pub decoy_size_range: (f64, f64),
    /// How far from market decoys are priced.
    pub decoy_price_offset_range: (f64, f64),
    /// Delay before a decoy is cancelled, seconds.
    pub decoy_cancel_range_s: (f64, f64),
    pub min_iceberg_chunks: usize,
    pub max_iceberg_chunks: usize,
    /// Inter-chunk delay bounds, seconds, scaled by volatility.
    pub iceberg_delay_range_s: (f64, f64),
    pub twap_slices: usize,
    pub twap_interval_range_s: (f64, f64),
    pub vwap_profile: Vec<f64>,
    pub vwap_interval_range_s: (f64, f64),
    pub breaker: BreakerConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            jitter_range_ms: (50, 500),
            size_variance: 0.15,
            chunk_variance: 0.10,
            decoy_probability: 0.2,
            decoy_size_range: (0.01, 0.05),
            decoy_price_offset_range: (0.01, 0.05),
            decoy_cancel_range_s: (5.0, 30.0),
            min_iceberg_chunks: 3,
            max_iceberg_chunks: 8,
            iceberg_delay_range_s: (0.5, 3.0),
            twap_slices: 5,
            twap_interval_range_s: (30.0, 120.0),
            vwap_profile: vec![0.08, 0.12, 0.15, 0.20, 0.15, 0.12, 0.10, 0.08],
            vwap_interval_range_s: (30.0, 120.0),
            breaker: BreakerConfig::default(),
        }
    }
}

/// Normalized market regime factors, 1.0 = average. Clamped to [0.1, 5.0].
#[derive(Debug, Clone, Copy)]
pub struct MarketConditions {
    pub volatility: f64,
    pub volume: f64,
}

impl Default for MarketConditions {
    fn default() -> Self {
        Self {
            volatility: 1.0,
            volume: 1.0,
        }
    }
}

/// Places order intents while keeping the flow hard to detect: timing
/// jitter, size variance, rotating split tactics, opposite-side decoys
/// and per-symbol circuit breakers.
///
/// The engine never retries; retries are the trading loop's contract.
pub struct ExecutionEngine {
    broker: Arc<dyn BrokerAdapter>,
    config: ExecutionConfig,
    breakers: SymbolBreakers,
    patterns: Mutex<HashMap<String, PatternTracker>>,
    conditions: Mutex<MarketConditions>,
    /// Reference notional against which order size ratios are judged,
    /// refreshed from account equity each tick.
    order_cap: Mutex<Decimal>,
    rng: Arc<Mutex<StdRng>>,
    decoys: tokio::sync::Mutex<JoinSet<()>>,
}

impl ExecutionEngine {
    pub fn new(
        broker: Arc<dyn BrokerAdapter>,
        config: ExecutionConfig,
        rng: Arc<Mutex<StdRng>>,
    ) -> Self {
        Self {
            breakers: SymbolBreakers::new(config.breaker.clone()),
            broker,
            config,
            patterns: Mutex::new(HashMap::new()),
            conditions: Mutex::new(MarketConditions::default()),
            order_cap: Mutex::new(Decimal::from(100_000)),
            rng,
            decoys: tokio::sync::Mutex::new(JoinSet::new()),
        }
    }

    pub fn update_market_conditions(&self, volatility: f64, volume: f64) {
        let mut conditions = self.conditions.lock().expect("conditions lock poisoned");
        conditions.volatility = volatility.clamp(0.1, 5.0);
        conditions.volume = volume.clamp(0.1, 5.0);
    }

    pub fn update_order_cap(&self, cap: Decimal) {
        if cap > Decimal::ZERO {
            *self.order_cap.lock().expect("order cap lock poisoned") = cap;
        }
    }

    pub fn breakers(&self) -> &SymbolBreakers {
        &self.breakers
    }

    /// Place one intent. Errors only when the symbol's breaker is open;
    /// every broker-level outcome is folded into the returned result.
    pub async fn execute(&self, intent: &OrderIntent) -> Result<ExecutionResult, ExecutionError> {
        self.breakers.check(&intent.symbol)?;

        self.apply_timing_jitter(&intent.symbol).await;
        let quantity = self.apply_size_variance(intent.total_quantity);

        let tactic = match intent.tactic {
            ExecutionTactic::Auto => self.select_tactic(quantity * intent.reference_price),
            explicit => explicit,
        };
        debug!(
            "ExecutionEngine [{}]: {} {} via {} (requested {})",
            intent.symbol, intent.side, quantity, tactic, intent.total_quantity
        );

        let result = match tactic {
            ExecutionTactic::Iceberg => self.run_iceberg(intent, quantity).await,
            ExecutionTactic::Twap => self.run_twap(intent, quantity).await,
            ExecutionTactic::Vwap => self.run_vwap(intent, quantity).await,
            ExecutionTactic::Simple | ExecutionTactic::Auto => {
                self.run_simple(intent, quantity).await
            }
        };

        if result.filled_quantity > Decimal::ZERO {
            // Decoys go out only after at least one real fragment; they
            // must never front-run the intent.
            if self.sample_unit() < self.config.decoy_probability {
                self.place_decoy(intent).await;
            }

            let mut patterns = self.patterns.lock().expect("pattern lock poisoned");
            patterns
                .entry(intent.symbol.clone())
                .or_default()
                .record(&intent.symbol, Instant::now());
        }

        info!(
            "ExecutionEngine [{}]: {} filled {}/{} via {}",
            intent.symbol, intent.side, result.filled_quantity, intent.total_quantity, tactic
        );
        Ok(result)
    }

    /// Wait for outstanding decoy cancellations, called on shutdown.
    pub async fn join_decoy_tasks(&self) {
        let mut decoys = self.decoys.lock().await;
        while decoys.join_next().await.is_some() {}
    }

    async fn apply_timing_jitter(&self, symbol: &str) {
        let (lo, hi) = self.config.jitter_range_ms;
        let mut jitter_ms = self.sample_range(lo as f64, hi as f64);

        // More volatile markets get less sleep.
        let volatility = self
            .conditions
            .lock()
            .expect("conditions lock poisoned")
            .volatility;
        jitter_ms /= volatility;

        let flagged = self
            .patterns
            .lock()
            .expect("pattern lock poisoned")
            .get(symbol)
            .map(|p| p.flagged())
            .unwrap_or(false);
        if flagged {
            jitter_ms *= 2.0;
        }

        jitter_ms = jitter_ms.max(MIN_JITTER_MS);
        time::sleep(Duration::from_millis(jitter_ms as u64)).await;
    }

    fn apply_size_variance(&self, quantity: Decimal) -> Decimal {
        let v = self.config.size_variance;
        if v <= 0.0 {
            return quantity;
        }
        // Floor keeps the adjusted quantity strictly positive.
        let factor = (1.0 + self.sample_range(-v, v)).max(0.01);
        quantity * Decimal::from_f64(factor).unwrap_or(Decimal::ONE)
    }

    fn select_tactic(&self, notional: Decimal) -> ExecutionTactic {
        let cap = *self.order_cap.lock().expect("order cap lock poisoned");
        let ratio = if cap > Decimal::ZERO {
            (notional / cap).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };
        let (volatility, volume) = {
            let c = self.conditions.lock().expect("conditions lock poisoned");
            (c.volatility, c.volume)
        };

        let mut weighted = [
            (ExecutionTactic::Iceberg, {
                let mut w = 1.0;
                if ratio > LARGE_ORDER_RATIO {
                    w += 2.0;
                }
                w * volume
            }),
            (ExecutionTactic::Twap, {
                let mut w = 1.0;
                if (SMALL_ORDER_RATIO..=MEDIUM_ORDER_RATIO_MAX).contains(&ratio) {
                    w += 1.5;
                }
                w
            }),
            (ExecutionTactic::Vwap, {
                let mut w = 1.0;
                if ratio > LARGE_ORDER_RATIO {
                    w += 1.0;
                }
                w * volatility
            }),
            (ExecutionTactic::Simple, {
                let mut w = 1.0;
                if ratio < SMALL_ORDER_RATIO {
                    w += 2.0;
                }
                w / volatility
            }),
        ];

        // Weight jitter keeps selection from being predictable.
        for (_, weight) in weighted.iter_mut() {
            *weight *= self.sample_range(0.8, 1.2);
        }

        let total: f64 = weighted.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return ExecutionTactic::Simple;
        }
        let mut roll = self.sample_unit() * total;
        for (tactic, weight) in weighted {
            if roll <= weight {
                return tactic;
            }
            roll -= weight;
        }
        ExecutionTactic::Simple
    }

    async fn run_simple(&self, intent: &OrderIntent, quantity: Decimal) -> ExecutionResult {
        match self.place_chunk(intent, quantity).await {
            Some(fill) => ExecutionResult {
                success: true,
                filled_quantity: fill.quantity,
                tactic_used: ExecutionTactic::Simple,
                chunks: vec![fill],
                failure_reason: None,
            },
            None => ExecutionResult::failed(ExecutionTactic::Simple, "order placement failed"),
        }
    }

    async fn run_iceberg(&self, intent: &OrderIntent, quantity: Decimal) -> ExecutionResult {
        let chunks = self.sample_chunk_count();
        let chunk_size = quantity / Decimal::from(chunks as u64);
        let volatility = self
            .conditions
            .lock()
            .expect("conditions lock poisoned")
            .volatility;

        let mut filled = Decimal::ZERO;
        let mut fills = Vec::new();
        let mut last_error = None;

        for i in 0..chunks {
            let remaining = quantity - filled;
            if remaining <= Decimal::ZERO {
                break;
            }
            // The last chunk absorbs rounding and any unfilled remainder.
            let current = if i == chunks - 1 {
                remaining
            } else {
                (chunk_size * self.chunk_variance_factor()).min(remaining)
            };
            if current <= Decimal::ZERO {
                continue;
            }

            match self.place_chunk(intent, current).await {
                Some(fill) => {
                    filled += fill.quantity;
                    fills.push(fill);
                }
                None => last_error = Some("iceberg chunk placement failed".to_string()),
            }

            if i < chunks - 1 {
                let (lo, hi) = self.config.iceberg_delay_range_s;
                let delay = self.sample_range(lo, hi) * volatility;
                time::sleep(Duration::from_secs_f64(delay.max(0.0))).await;
            }
        }

        ExecutionResult {
            success: filled > Decimal::ZERO,
            filled_quantity: filled,
            tactic_used: ExecutionTactic::Iceberg,
            chunks: fills,
            failure_reason: last_error,
        }
    }

    async fn run_twap(&self, intent: &OrderIntent, quantity: Decimal) -> ExecutionResult {
        let slices = self.config.twap_slices.max(1);
        let slice_size = quantity / Decimal::from(slices as u64);
        let volatility = self
            .conditions
            .lock()
            .expect("conditions lock poisoned")
            .volatility;

        let mut filled = Decimal::ZERO;
        let mut fills = Vec::new();
        let mut last_error = None;

        for i in 0..slices {
            let remaining = quantity - filled;
            if remaining <= Decimal::ZERO {
                break;
            }
            let current = if i == slices - 1 {
                remaining
            } else {
                (slice_size * self.chunk_variance_factor()).min(remaining)
            };
            if current <= Decimal::ZERO {
                continue;
            }

            match self.place_chunk(intent, current).await {
                Some(fill) => {
                    filled += fill.quantity;
                    fills.push(fill);
                }
                None => last_error = Some("twap slice placement failed".to_string()),
            }

            if i < slices - 1 {
                let (lo, hi) = self.config.twap_interval_range_s;
                let interval = (self.sample_range(lo, hi) / volatility).max(1.0);
                time::sleep(Duration::from_secs_f64(interval)).await;
            }
        }

        ExecutionResult {
            success: filled > Decimal::ZERO,
            filled_quantity: filled,
            tactic_used: ExecutionTactic::Twap,
            chunks: fills,
            failure_reason: last_error,
        }
    }

    async fn run_vwap(&self, intent: &OrderIntent, quantity: Decimal) -> ExecutionResult {
        let profile = self.config.vwap_profile.clone();
        let volume = self
            .conditions
            .lock()
            .expect("conditions lock poisoned")
            .volume;

        let mut filled = Decimal::ZERO;
        let mut fills = Vec::new();
        let mut last_error = None;

        for (i, bucket_fraction) in profile.iter().enumerate() {
            let remaining = quantity - filled;
            if remaining <= Decimal::ZERO {
                break;
            }
            let base = quantity * Decimal::from_f64(*bucket_fraction).unwrap_or(Decimal::ZERO);
            let current = (base * self.chunk_variance_factor()).min(remaining);
            if current <= Decimal::ZERO {
                continue;
            }

            match self.place_chunk(intent, current).await {
                Some(fill) => {
                    filled += fill.quantity;
                    fills.push(fill);
                }
                None => last_error = Some("vwap slice placement failed".to_string()),
            }

            if i < profile.len() - 1 {
                let (lo, hi) = self.config.vwap_interval_range_s;
                let interval = (self.sample_range(lo, hi) / volume).max(1.0);
                time::sleep(Duration::from_secs_f64(interval)).await;
            }
        }

        ExecutionResult {
            success: filled > Decimal::ZERO,
            filled_quantity: filled,
            tactic_used: ExecutionTactic::Vwap,
            chunks: fills,
            failure_reason: last_error,
        }
    }

    /// Place one fragment, feeding the per-symbol breaker on both paths.
    async fn place_chunk(&self, intent: &OrderIntent, quantity: Decimal) -> Option<ChunkFill> {
        match self
            .broker
            .place_order(
                &intent.symbol,
                intent.side,
                quantity,
                intent.reference_price,
                OrderOptions::default(),
            )
            .await
        {
            Ok(ack) => {
                self.breakers.record_success(&intent.symbol);
                Some(ChunkFill {
                    quantity: ack.filled_quantity,
                    price: intent.reference_price,
                    order_id: ack.order_id,
                })
            }
            Err(e) => {
                warn!(
                    "ExecutionEngine [{}]: fragment of {} failed: {}",
                    intent.symbol, quantity, e
                );
                self.breakers.record_failure(&intent.symbol);
                None
            }
        }
    }

    /// Post-only order on the opposite side, priced away from market and
    /// cancelled shortly after. Failures are logged and ignored; decoys
    /// never feed the circuit breaker.
    async fn place_decoy(&self, intent: &OrderIntent) {
        let side = intent.side.opposite();
        let (size_lo, size_hi) = self.config.decoy_size_range;
        let quantity = intent.total_quantity
            * Decimal::from_f64(self.sample_range(size_lo, size_hi)).unwrap_or(Decimal::ZERO);
        if quantity <= Decimal::ZERO {
            return;
        }

        let (offset_lo, offset_hi) = self.config.decoy_price_offset_range;
        let offset = self.sample_range(offset_lo, offset_hi);
        let price = match side {
            // Buy decoys rest below market, sell decoys above.
            OrderSide::Buy => {
                intent.reference_price * Decimal::from_f64(1.0 - offset).unwrap_or(Decimal::ONE)
            }
            OrderSide::Sell => {
                intent.reference_price * Decimal::from_f64(1.0 + offset).unwrap_or(Decimal::ONE)
            }
        };

        match self
            .broker
            .place_order(&intent.symbol, side, quantity, price, OrderOptions::post_only())
            .await
        {
            Ok(ack) => {
                debug!(
                    "ExecutionEngine [{}]: decoy {} {} @ {} placed",
                    intent.symbol, side, quantity, price
                );
                let (cancel_lo, cancel_hi) = self.config.decoy_cancel_range_s;
                let delay = Duration::from_secs_f64(self.sample_range(cancel_lo, cancel_hi));
                let broker = Arc::clone(&self.broker);
                let symbol = intent.symbol.clone();

                self.decoys.lock().await.spawn(async move {
                    time::sleep(delay).await;
                    if let Err(e) = broker.cancel_order(&ack.order_id).await {
                        debug!("ExecutionEngine [{}]: decoy cancellation failed: {}", symbol, e);
                    }
                });
            }
            Err(e) => {
                debug!("ExecutionEngine [{}]: decoy placement failed: {}", intent.symbol, e);
            }
        }
    }

    fn sample_chunk_count(&self) -> usize {
        let lo = self.config.min_iceberg_chunks.max(1);
        let hi = self.config.max_iceberg_chunks.max(lo);
        if lo == hi {
            return lo;
        }
        self.rng
            .lock()
            .expect("rng lock poisoned")
            .random_range(lo..=hi)
    }

    fn chunk_variance_factor(&self) -> Decimal {
        let v = self.config.chunk_variance;
        if v <= 0.0 {
            return Decimal::ONE;
        }
        Decimal::from_f64(1.0 + self.sample_range(-v, v)).unwrap_or(Decimal::ONE)
    }

    fn sample_range(&self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        self.rng
            .lock()
            .expect("rng lock poisoned")
            .random_range(lo..hi)
    }

    fn sample_unit(&self) -> f64 {
        self.rng.lock().expect("rng lock poisoned").random::<f64>()
    }
}
