// Configuration for the Signal Engine
// Explicit immutable records passed into the pipeline; nothing is read
// from ambient or global state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

// ============================================================================
// Configuration Structures
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    pub rest_base_url: String,
    pub ws_base_url: String,

    // REST settings
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub requests_per_minute: u32,

    // WebSocket settings
    pub ws_ping_interval_secs: u64,
    pub ws_reconnect_max_delay_secs: u64,
    pub ws_connect_timeout_secs: u64,
    pub ws_max_reconnect_attempts: u32,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            rest_base_url: "https://api.binance.com".to_string(),
            ws_base_url: "wss://stream.binance.com:9443/ws".to_string(),
            request_timeout_secs: 10,
            max_retries: 3,
            requests_per_minute: 1200,
            ws_ping_interval_secs: 20,
            ws_reconnect_max_delay_secs: 60,
            ws_connect_timeout_secs: 10,
            ws_max_reconnect_attempts: 10,
        }
    }
}

/// Indicator and pivot parameters for one decision cycle. Immutable once
/// constructed; handed to the pipeline by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    // Pivot window
    pub left: usize,
    pub right: usize,

    // Oscillators and trend
    pub rsi_len: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_sig: usize,
    pub atr_len: usize,
    pub ema_period: usize,
    pub stoch_period: usize,
    pub stoch_signal: usize,

    // Candle floor below which no pipeline runs
    pub min_candles: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            left: 10,
            right: 10,
            rsi_len: 20,
            macd_fast: 12,
            macd_slow: 26,
            macd_sig: 9,
            atr_len: 20,
            ema_period: 20,
            stoch_period: 14,
            stoch_signal: 3,
            min_candles: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub pairs: Vec<String>,
    pub timeframes: Vec<String>,
    pub default_timeframe: String,
    pub kline_limit: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            pairs: vec![
                "BTC/USDT".to_string(),
                "ETH/USDT".to_string(),
                "ADA/USDT".to_string(),
                "SOL/USDT".to_string(),
                "AVAX/USDT".to_string(),
            ],
            timeframes: vec![
                "5m".to_string(),
                "15m".to_string(),
                "30m".to_string(),
                "1h".to_string(),
                "4h".to_string(),
                "8h".to_string(),
                "1d".to_string(),
                "1w".to_string(),
                "1M".to_string(),
            ],
            default_timeframe: "4h".to_string(),
            kline_limit: 200,
        }
    }
}

// ============================================================================
// Configuration Summary
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub rest_base_url: String,
    pub ws_base_url: String,
    pub pair_count: usize,
    pub default_timeframe: String,
    pub kline_limit: u32,
}

impl fmt::Display for ConfigSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConfigSummary(rest={}, ws={}, pairs={}, tf={}, limit={})",
            self.rest_base_url, self.ws_base_url, self.pair_count, self.default_timeframe, self.kline_limit
        )
    }
}

// ============================================================================
// Engine Configuration
// ============================================================================

/// Complete engine configuration. Constructed by the caller and passed
/// down; components never reach for a global instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub binance: BinanceConfig,
    pub indicators: IndicatorConfig,
    pub scan: ScanConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON file, falling back to defaults for
    /// missing sections. A missing file is not an error.
    pub fn load_from_file(config_path: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = Path::new(config_path);
        if !path.exists() {
            warn!(path = config_path, "Config file not found, using defaults");
            return Ok(config);
        }

        let content = fs::read_to_string(path)?;
        let config_data: HashMap<String, serde_json::Value> = serde_json::from_str(&content)?;

        if let Some(binance_data) = config_data.get("binance") {
            config.binance = serde_json::from_value(binance_data.clone())?;
        }
        if let Some(indicator_data) = config_data.get("indicators") {
            config.indicators = serde_json::from_value(indicator_data.clone())?;
        }
        if let Some(scan_data) = config_data.get("scan") {
            config.scan = serde_json::from_value(scan_data.clone())?;
        }

        info!(path = config_path, "Configuration loaded");
        Ok(config)
    }

    /// Apply environment variable overrides for the endpoints and pair list.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(rest_url) = std::env::var("BINANCE_REST_URL") {
            self.binance.rest_base_url = rest_url;
        }
        if let Ok(ws_url) = std::env::var("BINANCE_WS_URL") {
            self.binance.ws_base_url = ws_url;
        }
        if let Ok(pairs) = std::env::var("SIGNAL_PAIRS") {
            let parsed: Vec<String> = pairs
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.scan.pairs = parsed;
            }
        }
    }

    /// Save configuration to a JSON file.
    pub fn save_to_file(&self, config_path: &str) -> Result<(), ConfigError> {
        if let Some(parent) = Path::new(config_path).parent() {
            fs::create_dir_all(parent)?;
        }

        let mut config_map = HashMap::new();
        config_map.insert("binance", serde_json::to_value(&self.binance)?);
        config_map.insert("indicators", serde_json::to_value(&self.indicators)?);
        config_map.insert("scan", serde_json::to_value(&self.scan)?);

        let json = serde_json::to_string_pretty(&config_map)?;
        fs::write(config_path, json)?;

        info!(path = config_path, "Configuration saved");
        Ok(())
    }

    /// Validate configuration, collecting all failures into one error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let ind = &self.indicators;

        if ind.left == 0 || ind.right == 0 {
            errors.push("pivot window sizes left/right must be positive".to_string());
        }
        if ind.macd_fast >= ind.macd_slow {
            errors.push(format!(
                "macd_fast ({}) must be smaller than macd_slow ({})",
                ind.macd_fast, ind.macd_slow
            ));
        }
        if ind.rsi_len == 0 || ind.atr_len == 0 || ind.ema_period == 0 {
            errors.push("indicator periods must be positive".to_string());
        }
        if ind.stoch_period == 0 || ind.stoch_signal == 0 {
            errors.push("stochastic periods must be positive".to_string());
        }
        if ind.min_candles < ind.macd_slow + ind.macd_sig {
            errors.push(format!(
                "min_candles ({}) must cover MACD warm-up ({})",
                ind.min_candles,
                ind.macd_slow + ind.macd_sig
            ));
        }
        if (self.scan.kline_limit as usize) < ind.min_candles {
            errors.push(format!(
                "kline_limit ({}) must be at least min_candles ({})",
                self.scan.kline_limit, ind.min_candles
            ));
        }
        if self.scan.pairs.is_empty() {
            errors.push("scan pair list must not be empty".to_string());
        }
        if !self.scan.timeframes.contains(&self.scan.default_timeframe) {
            errors.push(format!(
                "default timeframe '{}' is not in the supported list",
                self.scan.default_timeframe
            ));
        }

        if !errors.is_empty() {
            for error in &errors {
                warn!(error = %error, "Config validation error");
            }
            return Err(ConfigError::Validation(errors.join("; ")));
        }

        Ok(())
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            rest_base_url: self.binance.rest_base_url.clone(),
            ws_base_url: self.binance.ws_base_url.clone(),
            pair_count: self.scan.pairs.len(),
            default_timeframe: self.scan.default_timeframe.clone(),
            kline_limit: self.scan.kline_limit,
        }
    }
}
