use crate::domain::errors::BrokerError;
use crate::domain::order::{OrderAck, OrderSide};
use crate::domain::portfolio::PortfolioSnapshot;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Per-order options understood by brokers.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderOptions {
    /// Post-only orders rest on the book and never cross the spread.
    pub post_only: bool,
}

impl OrderOptions {
    pub fn post_only() -> Self {
        Self { post_only: true }
    }
}

/// Narrow brokerage capability set consumed by the execution engine and the
/// trading loop. Implementations must be safe for concurrent calls: the
/// loop and background decoy-cancellation tasks may overlap.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        options: OrderOptions,
    ) -> Result<OrderAck, BrokerError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;

    async fn get_portfolio(&self) -> Result<PortfolioSnapshot, BrokerError>;

    async fn get_quote(&self, symbol: &str) -> Result<Decimal, BrokerError>;

    /// Recent daily closes, oldest first.
    async fn get_historical(&self, symbol: &str) -> Result<Vec<Decimal>, BrokerError>;

    async fn get_watchlist(&self) -> Result<Vec<String>, BrokerError>;

    async fn market_is_open(&self) -> Result<bool, BrokerError>;
}
