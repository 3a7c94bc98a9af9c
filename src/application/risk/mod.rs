mod manager;
mod volatility;

pub use manager::RiskManager;
pub use volatility::{annualized_volatility, DEFAULT_VOLATILITY};
