use crate::domain::errors::BrokerError;
use crate::domain::order::{OrderAck, OrderSide, OrderStatus};
use crate::domain::portfolio::{PortfolioSnapshot, PositionState};
use crate::domain::ports::{BrokerAdapter, OrderOptions};
use crate::infrastructure::market_calendar;
use crate::infrastructure::simulation::{LatencyModel, SlippageModel, ZeroLatency, ZeroSlippage};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

/// One order as it reached the adapter, recorded for assertions.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub options: OrderOptions,
}

/// In-memory broker used by demo mode and tests.
///
/// Fills are immediate and update the simulated portfolio; failures are
/// scripted per order index or queued per fetch call. Safe for the
/// concurrent access pattern of one trading loop plus background
/// cancellation tasks.
pub struct MockBroker {
    quotes: RwLock<HashMap<String, Decimal>>,
    portfolio: RwLock<PortfolioSnapshot>,
    watchlist: RwLock<Vec<String>>,
    history: RwLock<HashMap<String, Vec<Decimal>>>,
    sectors: RwLock<HashMap<String, String>>,
    placed: Mutex<Vec<PlacedOrder>>,
    cancelled: Mutex<Vec<String>>,
    /// Zero-based order call indices that fail with a transient error.
    fail_order_indices: Mutex<HashSet<usize>>,
    order_call_index: AtomicUsize,
    /// Errors returned by the next portfolio fetches, in order.
    portfolio_failures: Mutex<VecDeque<BrokerError>>,
    /// Manual session override; `None` follows the Eastern-time calendar.
    market_open_override: Mutex<Option<bool>>,
    latency: Box<dyn LatencyModel>,
    slippage: Box<dyn SlippageModel>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::with_market_friction(Box::new(ZeroLatency), Box::new(ZeroSlippage))
    }

    /// Adapter with simulated round-trip delay and fill-price slippage,
    /// used by demo mode for believable paper fills.
    pub fn with_market_friction(
        latency: Box<dyn LatencyModel>,
        slippage: Box<dyn SlippageModel>,
    ) -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
            portfolio: RwLock::new(PortfolioSnapshot::empty(Decimal::from(100_000))),
            watchlist: RwLock::new(Vec::new()),
            history: RwLock::new(HashMap::new()),
            sectors: RwLock::new(HashMap::new()),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            fail_order_indices: Mutex::new(HashSet::new()),
            order_call_index: AtomicUsize::new(0),
            portfolio_failures: Mutex::new(VecDeque::new()),
            market_open_override: Mutex::new(None),
            latency,
            slippage,
        }
    }

    pub fn set_quote(&self, symbol: &str, price: Decimal) {
        self.quotes
            .write()
            .expect("quotes lock poisoned")
            .insert(symbol.to_string(), price);
    }

    pub fn set_portfolio(&self, snapshot: PortfolioSnapshot) {
        *self.portfolio.write().expect("portfolio lock poisoned") = snapshot;
    }

    pub fn set_watchlist(&self, symbols: Vec<String>) {
        *self.watchlist.write().expect("watchlist lock poisoned") = symbols;
    }

    pub fn set_history(&self, symbol: &str, closes: Vec<Decimal>) {
        self.history
            .write()
            .expect("history lock poisoned")
            .insert(symbol.to_string(), closes);
    }

    pub fn set_sector(&self, symbol: &str, sector: &str) {
        self.sectors
            .write()
            .expect("sectors lock poisoned")
            .insert(symbol.to_string(), sector.to_string());
    }

    /// Pin the session state, bypassing the calendar.
    pub fn set_market_open(&self, open: bool) {
        *self
            .market_open_override
            .lock()
            .expect("market override lock poisoned") = Some(open);
    }

    /// Drop any manual override and follow the Eastern-time calendar.
    pub fn follow_market_calendar(&self) {
        *self
            .market_open_override
            .lock()
            .expect("market override lock poisoned") = None;
    }

    /// Script transient failures for specific order calls, zero-indexed
    /// over every `place_order` seen by this adapter.
    pub fn fail_orders_at(&self, indices: Vec<usize>) {
        let mut fail = self
            .fail_order_indices
            .lock()
            .expect("failure script lock poisoned");
        fail.extend(indices);
    }

    /// Queue an error for the next portfolio fetch.
    pub fn push_portfolio_failure(&self, error: BrokerError) {
        self.portfolio_failures
            .lock()
            .expect("portfolio failures lock poisoned")
            .push_back(error);
    }

    pub fn placed_orders(&self) -> Vec<PlacedOrder> {
        self.placed.lock().expect("placed lock poisoned").clone()
    }

    pub fn cancelled_orders(&self) -> Vec<String> {
        self.cancelled.lock().expect("cancelled lock poisoned").clone()
    }

    fn sector_of(&self, symbol: &str) -> String {
        self.sectors
            .read()
            .expect("sectors lock poisoned")
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Apply an immediate fill to the simulated account.
    fn apply_fill(&self, symbol: &str, side: OrderSide, quantity: Decimal, price: Decimal) {
        let mut portfolio = self.portfolio.write().expect("portfolio lock poisoned");
        let notional = quantity * price;
        let sector = self.sector_of(symbol);

        match side {
            OrderSide::Buy => {
                portfolio.cash -= notional;
                let position =
                    portfolio
                        .positions
                        .entry(symbol.to_string())
                        .or_insert(PositionState {
                            quantity: Decimal::ZERO,
                            market_value: Decimal::ZERO,
                            sector,
                        });
                position.quantity += quantity;
                position.market_value += notional;
            }
            OrderSide::Sell => {
                portfolio.cash += notional;
                let remove = if let Some(position) = portfolio.positions.get_mut(symbol) {
                    position.quantity -= quantity;
                    position.market_value -= notional;
                    position.quantity <= Decimal::ZERO
                } else {
                    false
                };
                if remove {
                    portfolio.positions.remove(symbol);
                }
            }
        }
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerAdapter for MockBroker {
    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        options: OrderOptions,
    ) -> Result<OrderAck, BrokerError> {
        let index = self.order_call_index.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_order_indices
            .lock()
            .expect("failure script lock poisoned")
            .contains(&index)
        {
            return Err(BrokerError::transient("scripted order failure"));
        }

        tokio::time::sleep(self.latency.next_delay()).await;

        self.placed.lock().expect("placed lock poisoned").push(PlacedOrder {
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            options,
        });

        if options.post_only {
            // Resting order: accepted but unfilled until cancelled.
            return Ok(OrderAck {
                order_id: Uuid::new_v4().to_string(),
                filled_quantity: Decimal::ZERO,
                status: OrderStatus::Accepted,
            });
        }

        let fill_price = self.slippage.fill_price(price, quantity, side);
        self.apply_fill(symbol, side, quantity, fill_price);
        Ok(OrderAck {
            order_id: Uuid::new_v4().to_string(),
            filled_quantity: quantity,
            status: OrderStatus::Filled,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        self.cancelled
            .lock()
            .expect("cancelled lock poisoned")
            .push(order_id.to_string());
        Ok(())
    }

    async fn get_portfolio(&self) -> Result<PortfolioSnapshot, BrokerError> {
        if let Some(error) = self
            .portfolio_failures
            .lock()
            .expect("portfolio failures lock poisoned")
            .pop_front()
        {
            return Err(error);
        }
        Ok(self.portfolio.read().expect("portfolio lock poisoned").clone())
    }

    async fn get_quote(&self, symbol: &str) -> Result<Decimal, BrokerError> {
        self.quotes
            .read()
            .expect("quotes lock poisoned")
            .get(symbol)
            .copied()
            .ok_or_else(|| BrokerError::transient(format!("no quote for {}", symbol)))
    }

    async fn get_historical(&self, symbol: &str) -> Result<Vec<Decimal>, BrokerError> {
        Ok(self
            .history
            .read()
            .expect("history lock poisoned")
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_watchlist(&self) -> Result<Vec<String>, BrokerError> {
        Ok(self.watchlist.read().expect("watchlist lock poisoned").clone())
    }

    async fn market_is_open(&self) -> Result<bool, BrokerError> {
        let pinned = *self
            .market_open_override
            .lock()
            .expect("market override lock poisoned");
        Ok(pinned.unwrap_or_else(|| market_calendar::is_market_open(Utc::now())))
    }
}
