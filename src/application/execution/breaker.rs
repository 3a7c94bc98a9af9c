use crate::domain::errors::ExecutionError;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Failure timestamps retained per symbol for diagnostics.
const FAILURE_RING_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub max_consecutive_failures: u32,
    /// How long a tripped symbol stays barred.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            cooldown: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct BreakerEntry {
    consecutive_failures: u32,
    tripped_until: Option<Instant>,
    failure_times: VecDeque<Instant>,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            tripped_until: None,
            failure_times: VecDeque::with_capacity(FAILURE_RING_CAPACITY),
        }
    }
}

/// Per-symbol circuit breakers owned by the execution engine.
///
/// All state sits behind one registry-wide mutex; reads and writes are
/// short. Expired trips are closed lazily on check.
pub struct SymbolBreakers {
    entries: Mutex<HashMap<String, BreakerEntry>>,
    config: BreakerConfig,
}

impl SymbolBreakers {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Gate an execution attempt. Tripped symbols error without reaching
    /// the broker.
    pub fn check(&self, symbol: &str) -> Result<(), ExecutionError> {
        let mut entries = self.entries.lock().expect("breaker registry lock poisoned");
        let Some(entry) = entries.get_mut(symbol) else {
            return Ok(());
        };

        if let Some(until) = entry.tripped_until {
            let now = Instant::now();
            if now < until {
                return Err(ExecutionError::SymbolBreakerOpen {
                    symbol: symbol.to_string(),
                    retry_in: until - now,
                });
            }
            info!("SymbolBreakers [{}]: cooldown elapsed, closing breaker", symbol);
            entry.tripped_until = None;
            entry.consecutive_failures = 0;
        }
        Ok(())
    }

    pub fn record_failure(&self, symbol: &str) {
        let mut entries = self.entries.lock().expect("breaker registry lock poisoned");
        let entry = entries
            .entry(symbol.to_string())
            .or_insert_with(BreakerEntry::new);

        entry.consecutive_failures += 1;
        if entry.failure_times.len() == FAILURE_RING_CAPACITY {
            entry.failure_times.pop_front();
        }
        entry.failure_times.push_back(Instant::now());

        if entry.consecutive_failures >= self.config.max_consecutive_failures
            && entry.tripped_until.is_none()
        {
            warn!(
                "SymbolBreakers [{}]: tripped after {} consecutive failures, barring for {:?}",
                symbol, entry.consecutive_failures, self.config.cooldown
            );
            entry.tripped_until = Some(Instant::now() + self.config.cooldown);
        }
    }

    pub fn record_success(&self, symbol: &str) {
        let mut entries = self.entries.lock().expect("breaker registry lock poisoned");
        if let Some(entry) = entries.get_mut(symbol) {
            entry.consecutive_failures = 0;
        }
    }

    pub fn is_tripped(&self, symbol: &str) -> bool {
        self.check(symbol).is_err()
    }
}
