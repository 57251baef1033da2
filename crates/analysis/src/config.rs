//! Analysis board configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ceval::PoolConfig;

use crate::error::AnalysisError;

#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    /// Path to Stockfish binary
    pub stockfish_path: String,

    /// Hash table size per engine, in MB
    pub hash_mb: u32,

    /// Depth limits, worker count and PV lines
    pub pool: PoolConfig,

    /// Quiet period after navigation before an evaluation starts
    pub ceval_debounce: Duration,

    /// Quiet period before asking the rules engine for missing destinations
    pub situation_debounce: Duration,

    /// Where the evaluation preference is persisted
    pub settings_path: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            stockfish_path: "/usr/local/bin/stockfish".to_string(),
            hash_mb: 16,
            pool: PoolConfig::default(),
            ceval_debounce: Duration::from_millis(800),
            situation_debounce: Duration::from_millis(50),
            settings_path: PathBuf::from("analysis-settings.json"),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Result<Self, AnalysisError> {
        let defaults = Self::default();

        let stockfish_path = env::var("STOCKFISH_PATH").unwrap_or(defaults.stockfish_path);

        let pool = PoolConfig {
            min_depth: parsed("CEVAL_MIN_DEPTH", defaults.pool.min_depth),
            max_depth: parsed("CEVAL_MAX_DEPTH", defaults.pool.max_depth),
            workers: parsed("CEVAL_WORKERS", defaults.pool.workers),
            multi_pv: parsed("CEVAL_MULTI_PV", defaults.pool.multi_pv),
        };
        validate_pool(&pool)?;

        let settings_path = env::var("ANALYSIS_SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.settings_path);

        Ok(Self {
            stockfish_path,
            hash_mb: parsed("CEVAL_HASH_MB", defaults.hash_mb),
            pool,
            ceval_debounce: Duration::from_millis(parsed("CEVAL_DEBOUNCE_MS", 800)),
            situation_debounce: Duration::from_millis(parsed("SITUATION_DEBOUNCE_MS", 50)),
            settings_path,
        })
    }
}

fn validate_pool(pool: &PoolConfig) -> Result<(), AnalysisError> {
    if pool.min_depth > pool.max_depth {
        return Err(AnalysisError::Config(
            "CEVAL_MIN_DEPTH must not exceed CEVAL_MAX_DEPTH",
        ));
    }
    if pool.workers == 0 {
        return Err(AnalysisError::Config("CEVAL_WORKERS must be at least 1"));
    }
    if pool.multi_pv == 0 {
        return Err(AnalysisError::Config("CEVAL_MULTI_PV must be at least 1"));
    }
    Ok(())
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
