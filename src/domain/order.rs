use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Order-splitting tactic applied by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionTactic {
    /// Weighted selection against order size and market conditions.
    Auto,
    Simple,
    Iceberg,
    Twap,
    Vwap,
}

impl std::fmt::Display for ExecutionTactic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionTactic::Auto => "auto",
            ExecutionTactic::Simple => "simple",
            ExecutionTactic::Iceberg => "iceberg",
            ExecutionTactic::Twap => "twap",
            ExecutionTactic::Vwap => "vwap",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ExecutionTactic {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ExecutionTactic::Auto),
            "simple" => Ok(ExecutionTactic::Simple),
            "iceberg" => Ok(ExecutionTactic::Iceberg),
            "twap" => Ok(ExecutionTactic::Twap),
            "vwap" => Ok(ExecutionTactic::Vwap),
            _ => anyhow::bail!(
                "Invalid execution tactic: {}. Must be auto, simple, iceberg, twap or vwap",
                s
            ),
        }
    }
}

/// Input to the execution engine. Immutable value passed by copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: OrderSide,
    pub total_quantity: Decimal,
    pub reference_price: Decimal,
    pub tactic: ExecutionTactic,
}

/// Broker acknowledgement for a single placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub filled_quantity: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Filled,
    Accepted,
    Rejected,
}

/// One dispatched fragment of an intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFill {
    pub quantity: Decimal,
    pub price: Decimal,
    pub order_id: String,
}

/// Aggregate outcome of executing one intent. Partial failures are values,
/// never errors: success means at least one fragment filled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub filled_quantity: Decimal,
    pub tactic_used: ExecutionTactic,
    pub chunks: Vec<ChunkFill>,
    pub failure_reason: Option<String>,
}

impl ExecutionResult {
    pub fn failed(tactic: ExecutionTactic, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            filled_quantity: Decimal::ZERO,
            tactic_used: tactic,
            chunks: Vec::new(),
            failure_reason: Some(reason.into()),
        }
    }
}
