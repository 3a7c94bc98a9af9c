use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the advisor gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider {provider} is rate limited")]
    RateLimited { provider: String },

    #[error("process call budget exhausted ({calls_per_minute} calls/min)")]
    CallBudgetExhausted { calls_per_minute: u32 },

    #[error("all advisory providers exhausted, last error: {last}")]
    Exhausted { last: String },

    #[error("invalid advisor response: {reason}")]
    InvalidResponse { reason: String },

    #[error("advisor request failed: {reason}")]
    Transport { reason: String },

    #[error("advisor request timed out after {timeout_s}s")]
    Timeout { timeout_s: u64 },

    #[error("advisor gateway breaker open, retry in {retry_in:?}")]
    BreakerOpen { retry_in: Duration },
}

impl GatewayError {
    /// Schema failures are not transient; everything else may be retried.
    pub fn is_transient(&self) -> bool {
        !matches!(self, GatewayError::InvalidResponse { .. })
    }
}

/// Typed rejections produced by the risk manager. A rejection means the
/// proposed sizing is dropped, never clipped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RiskRejection {
    #[error("position size for {symbol} computes to zero")]
    InvalidQuantity { symbol: String },

    #[error("daily drawdown limit reached: {drawdown_pct:.2}% > {max_pct:.2}%")]
    DrawdownExceeded { drawdown_pct: f64, max_pct: f64 },

    #[error("portfolio risk limit exceeded: {projected:.4} > {max:.4}")]
    PortfolioRisk { projected: f64, max: f64 },

    #[error("symbol risk limit exceeded for {symbol}: {contribution:.4} > {max:.4}")]
    SymbolRisk {
        symbol: String,
        contribution: f64,
        max: f64,
    },

    #[error("sector exposure limit for {sector}: {projected:.4} > {max:.4}")]
    SectorExposure {
        sector: String,
        projected: f64,
        max: f64,
    },
}

/// Errors surfaced by the execution engine before any broker call is made.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("circuit breaker open for {symbol}, retry in {retry_in:?}")]
    SymbolBreakerOpen { symbol: String, retry_in: Duration },
}

/// Errors surfaced by broker adapters.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("transient broker error: {reason}")]
    Transient { reason: String },

    #[error("fatal broker error: {reason}")]
    Fatal { reason: String },
}

impl BrokerError {
    pub fn transient(reason: impl Into<String>) -> Self {
        BrokerError::Transient {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        BrokerError::Fatal {
            reason: reason.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, BrokerError::Fatal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_rejection_formatting() {
        let rejection = RiskRejection::SectorExposure {
            sector: "tech".to_string(),
            projected: 0.24,
            max: 0.20,
        };

        let msg = rejection.to_string();
        assert!(msg.contains("tech"));
        assert!(msg.contains("0.2400"));
        assert!(msg.contains("0.2000"));
    }

    #[test]
    fn test_invalid_response_is_not_transient() {
        let err = GatewayError::InvalidResponse {
            reason: "missing choices".to_string(),
        };
        assert!(!err.is_transient());

        let err = GatewayError::Timeout { timeout_s: 10 };
        assert!(err.is_transient());
    }

    #[test]
    fn test_broker_error_fatality() {
        assert!(BrokerError::fatal("account closed").is_fatal());
        assert!(!BrokerError::transient("http 503").is_fatal());
    }
}
