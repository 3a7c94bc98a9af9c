pub mod market_calendar;
pub mod mock;
pub mod observability;
pub mod simulation;
