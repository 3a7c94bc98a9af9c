use crate::application::advisor::{GatewayConfig, ProviderId};
use crate::application::execution::{BreakerConfig, ExecutionConfig};
use crate::application::scheduler::SchedulerConfig;
use crate::domain::order::ExecutionTactic;
use crate::domain::sizing::RiskParameters;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Process configuration, loaded once at startup from the environment.
/// Parse failures are fatal: the process exits with code 1.
#[derive(Debug, Clone)]
pub struct Config {
    pub symbols: Vec<String>,
    pub sector_map: HashMap<String, String>,
    /// Passphrase for the credential vault; see `MASTER_KEY`.
    pub master_key: String,
    /// Plaintext provider credentials straight from the environment; they
    /// are sealed into the gateway at startup and not retained.
    pub provider_keys: HashMap<ProviderId, Vec<String>>,
    pub rng_seed: Option<u64>,
    pub advisor_weight: f64,
    pub observability_interval_s: u64,
    pub scheduler: SchedulerConfig,
    pub gateway: GatewayConfig,
    pub execution: ExecutionConfig,
    pub risk: RiskParameters,
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let symbols_str = env::var("SYMBOLS").unwrap_or_else(|_| "AAPL".to_string());
        let symbols = parse_list(&symbols_str);
        if symbols.is_empty() {
            anyhow::bail!("SYMBOLS must name at least one symbol");
        }

        // Sector map, `SYM:sector` pairs.
        let sectors_env = env::var("SECTORS").unwrap_or_default();
        let mut sector_map = HashMap::new();
        for entry in sectors_env.split(',') {
            if let Some((symbol, sector)) = entry.split_once(':') {
                sector_map.insert(symbol.trim().to_string(), sector.trim().to_string());
            }
        }

        let master_key = env::var("MASTER_KEY").unwrap_or_default();

        // Per-provider credentials: `REQUESTY_API_KEYS` (comma separated)
        // with `REQUESTY_API_KEY` accepted as a single-key fallback.
        let mut provider_keys = HashMap::new();
        for provider in ProviderId::DEFAULT_PRIORITY {
            let name = provider.as_str().to_uppercase();
            let keys = env::var(format!("{}_API_KEYS", name))
                .map(|raw| parse_list(&raw))
                .or_else(|_| env::var(format!("{}_API_KEY", name)).map(|k| vec![k]))
                .unwrap_or_default();
            if !keys.is_empty() {
                provider_keys.insert(provider, keys);
            }
        }

        let priority_str = env::var("PROVIDER_PRIORITY").unwrap_or_default();
        let priority = if priority_str.trim().is_empty() {
            ProviderId::DEFAULT_PRIORITY.to_vec()
        } else {
            parse_list(&priority_str)
                .iter()
                .map(|name| ProviderId::from_str(name))
                .collect::<Result<Vec<_>>>()
                .context("Failed to parse PROVIDER_PRIORITY")?
        };

        let rng_seed = match env::var("RNG_SEED") {
            Ok(raw) => Some(raw.parse::<u64>().context("Failed to parse RNG_SEED")?),
            Err(_) => None,
        };

        let tick_interval_minutes: u64 = parse_env("TICK_INTERVAL_MINUTES", 15)?;
        let max_trades_per_day: u32 = parse_env("MAX_TRADES_PER_DAY", 10)?;
        let max_session_hours: u64 = parse_env("MAX_SESSION_HOURS", 6)?;
        let broker_error_burst: u32 = parse_env("BROKER_ERROR_BURST", 3)?;
        let default_tactic: ExecutionTactic =
            parse_env("EXECUTION_TACTIC", ExecutionTactic::Auto)?;

        let scheduler = SchedulerConfig {
            tick_interval: Duration::from_secs(tick_interval_minutes * 60),
            max_trades_per_day,
            max_session: Duration::from_secs(max_session_hours * 3600),
            gate_retry: Duration::from_secs(parse_env("GATE_RETRY_SECONDS", 60)?),
            global_breaker_cooldown: Duration::from_secs(parse_env(
                "GLOBAL_BREAKER_COOLDOWN_S",
                300,
            )?),
            broker_error_burst,
            default_tactic,
            demo: false,
        };

        let calls_per_minute: u32 = parse_env("AI_CALLS_PER_MINUTE", 60)?;
        let cache_ttl_minutes: u64 = parse_env("CACHE_TTL_MINUTES", 15)?;
        let block_when_saturated: bool = parse_env("AI_CALLS_BLOCK", false)?;

        let gateway = GatewayConfig {
            priority,
            calls_per_minute,
            block_when_saturated,
            cache_ttl: Duration::from_secs(cache_ttl_minutes * 60),
            key_cooldown: Duration::from_secs(parse_env("KEY_COOLDOWN_SECONDS", 60)?),
            ..GatewayConfig::default()
        };

        let risk = RiskParameters {
            max_position_fraction: parse_env("MAX_POSITION_FRACTION", 0.05)?,
            max_portfolio_risk_daily: parse_env("MAX_PORTFOLIO_RISK_DAILY", 0.02)?,
            max_symbol_risk: parse_env("MAX_SYMBOL_RISK", 0.01)?,
            max_sector_exposure: parse_env("MAX_SECTOR_EXPOSURE", 0.20)?,
            max_daily_drawdown: parse_env("MAX_DAILY_DRAWDOWN", 0.05)?,
            default_stop_pct: parse_env("DEFAULT_STOP_PCT", 0.05)?,
            default_target_pct: parse_env("DEFAULT_TARGET_PCT", 0.10)?,
            volatility_scaling: parse_env("VOLATILITY_SCALING", true)?,
        };
        for (name, value) in [
            ("MAX_POSITION_FRACTION", risk.max_position_fraction),
            ("MAX_PORTFOLIO_RISK_DAILY", risk.max_portfolio_risk_daily),
            ("MAX_SYMBOL_RISK", risk.max_symbol_risk),
            ("MAX_SECTOR_EXPOSURE", risk.max_sector_exposure),
            ("MAX_DAILY_DRAWDOWN", risk.max_daily_drawdown),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be a fraction in [0, 1], got {}", name, value);
            }
        }

        let jitter_min_ms: u64 = parse_env("JITTER_MIN_MS", 50)?;
        let jitter_max_ms: u64 = parse_env("JITTER_MAX_MS", 500)?;
        if jitter_min_ms > jitter_max_ms {
            anyhow::bail!(
                "JITTER_MIN_MS ({}) must not exceed JITTER_MAX_MS ({})",
                jitter_min_ms,
                jitter_max_ms
            );
        }
        let min_iceberg_chunks: usize = parse_env("ICEBERG_MIN_CHUNKS", 3)?;
        let max_iceberg_chunks: usize = parse_env("ICEBERG_MAX_CHUNKS", 8)?;
        if min_iceberg_chunks == 0 || min_iceberg_chunks > max_iceberg_chunks {
            anyhow::bail!(
                "ICEBERG_MIN_CHUNKS..ICEBERG_MAX_CHUNKS must be a non-empty range, got {}..{}",
                min_iceberg_chunks,
                max_iceberg_chunks
            );
        }

        let vwap_profile = match env::var("VWAP_PROFILE") {
            Ok(raw) => {
                let profile = parse_list(&raw)
                    .iter()
                    .map(|v| v.parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to parse VWAP_PROFILE")?;
                if profile.is_empty() || profile.iter().any(|p| *p <= 0.0) {
                    anyhow::bail!("VWAP_PROFILE must be positive bucket fractions");
                }
                profile
            }
            Err(_) => ExecutionConfig::default().vwap_profile,
        };

        let execution = ExecutionConfig {
            jitter_range_ms: (jitter_min_ms, jitter_max_ms),
            size_variance: parse_env("SIZE_VARIANCE", 0.15)?,
            chunk_variance: parse_env("CHUNK_VARIANCE", 0.10)?,
            decoy_probability: parse_env("DECOY_PROBABILITY", 0.2)?,
            min_iceberg_chunks,
            max_iceberg_chunks,
            twap_slices: parse_env("TWAP_SLICES", 5)?,
            vwap_profile,
            breaker: BreakerConfig {
                max_consecutive_failures: parse_env("MAX_CONSECUTIVE_FAILURES", 3)?,
                cooldown: Duration::from_secs(parse_env("BREAKER_COOLDOWN_S", 300)?),
            },
            ..ExecutionConfig::default()
        };

        Ok(Config {
            symbols,
            sector_map,
            master_key,
            provider_keys,
            rng_seed,
            advisor_weight: parse_env("ADVISOR_WEIGHT", 0.4)?,
            observability_interval_s: parse_env("OBSERVABILITY_INTERVAL", 60)?,
            scheduler,
            gateway,
            execution,
            risk,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-var tests mutate process state; serialize them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "SYMBOLS",
            "SECTORS",
            "MAX_POSITION_FRACTION",
            "JITTER_MIN_MS",
            "JITTER_MAX_MS",
            "PROVIDER_PRIORITY",
            "ICEBERG_MIN_CHUNKS",
            "ICEBERG_MAX_CHUNKS",
            "RNG_SEED",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults_load() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let config = Config::from_env().unwrap();
        assert_eq!(config.symbols, vec!["AAPL"]);
        assert_eq!(config.scheduler.max_trades_per_day, 10);
        assert_eq!(config.gateway.calls_per_minute, 60);
        assert_eq!(config.execution.jitter_range_ms, (50, 500));
        assert_eq!(config.execution.vwap_profile.len(), 8);
        assert!((config.risk.max_sector_exposure - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_symbols_and_sectors_parse() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("SYMBOLS", "AAPL, MSFT ,TSLA");
        env::set_var("SECTORS", "AAPL:tech, MSFT:tech, XOM:energy");

        let config = Config::from_env().unwrap();
        assert_eq!(config.symbols, vec!["AAPL", "MSFT", "TSLA"]);
        assert_eq!(config.sector_map["XOM"], "energy");

        clear_env();
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("MAX_POSITION_FRACTION", "1.5");

        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_inverted_jitter_range_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("JITTER_MIN_MS", "600");
        env::set_var("JITTER_MAX_MS", "500");

        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_provider_priority_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("PROVIDER_PRIORITY", "openai,deepseek");

        let config = Config::from_env().unwrap();
        assert_eq!(
            config.gateway.priority,
            vec![ProviderId::Openai, ProviderId::Deepseek]
        );
        clear_env();
    }
}
