mod breaker;
mod engine;
mod pattern;

pub use breaker::{BreakerConfig, SymbolBreakers};
pub use engine::{ExecutionConfig, ExecutionEngine, MarketConditions};
pub use pattern::PatternTracker;
