// Signal Engine
// Fetches candle history, runs the decision pipeline, and ranks scan results

use futures::future::join_all;
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::core::{Direction, EngineConfig, PivotKind, Signal};
use crate::layer1::{MarketDataClient, RestClientError};
use crate::layer2::{compute_snapshot, fetch_candles, find_series_pivot, CandleSeries, FetchOutcome};
use crate::layer3::{decision, risk};

/// Normalize a user-entered pair into an exchange symbol. Uppercases,
/// strips separators, and appends the USDT quote to bare assets:
/// "btc" -> "BTCUSDT", "ETH/USDT" -> "ETHUSDT", "solusdt" -> "SOLUSDT".
pub fn normalize_pair(pair: &str) -> String {
    let cleaned: String = pair
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if cleaned.ends_with("USDT") {
        cleaned
    } else {
        format!("{}USDT", cleaned)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Runs the full decision pipeline per symbol-timeframe pair.
///
/// Every failure mode degrades to a Neutral signal; nothing in a scan can
/// take the process down.
pub struct SignalEngine {
    client: MarketDataClient,
    config: EngineConfig,
}

impl SignalEngine {
    pub fn new(config: EngineConfig) -> Result<Self, RestClientError> {
        let client = MarketDataClient::from_config(&config.binance)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn client(&self) -> &MarketDataClient {
        &self.client
    }

    /// One decision cycle: fetch history, evaluate, attach risk levels.
    pub async fn generate_signal(&self, pair: &str, timeframe: &str) -> Signal {
        let symbol = normalize_pair(pair);
        let outcome = fetch_candles(
            &self.client,
            &symbol,
            timeframe,
            self.config.scan.kline_limit,
        )
        .await;

        match outcome {
            FetchOutcome::Complete(series) => self.evaluate_series(&symbol, timeframe, &series),
            FetchOutcome::Empty(reason) => {
                info!(symbol = %symbol, timeframe = %timeframe, reason = %reason, "No usable candles, emitting neutral");
                Signal::neutral(symbol, 0.0, timeframe.to_string(), now_millis())
            }
        }
    }

    /// The pure pipeline over an already-fetched series. Deterministic:
    /// identical series and config produce an identical decision.
    pub fn evaluate_series(&self, symbol: &str, timeframe: &str, series: &CandleSeries) -> Signal {
        let ind = &self.config.indicators;
        let price = series.last_close().unwrap_or(0.0);

        if series.len() < ind.min_candles {
            debug!(
                symbol = %symbol,
                candles = series.len(),
                required = ind.min_candles,
                "Insufficient history, emitting neutral"
            );
            return Signal::neutral(symbol.to_string(), price, timeframe.to_string(), now_millis());
        }

        let last_high_pivot = find_series_pivot(series, ind.left, ind.right, PivotKind::High);
        let last_low_pivot = find_series_pivot(series, ind.left, ind.right, PivotKind::Low);

        let snapshot = match compute_snapshot(series, ind) {
            Some(snapshot) => snapshot,
            None => {
                debug!(symbol = %symbol, "Indicator warm-up not satisfied, emitting neutral");
                return Signal::neutral(
                    symbol.to_string(),
                    price,
                    timeframe.to_string(),
                    now_millis(),
                );
            }
        };

        let direction = decision::evaluate(
            price,
            last_high_pivot.as_ref(),
            last_low_pivot.as_ref(),
            &snapshot,
        );

        let levels = risk::risk_levels(direction, price, snapshot.atr);
        let signal = Signal::new(
            symbol.to_string(),
            direction,
            price,
            levels.map(|l| l.target_price),
            levels.map(|l| l.stop_loss_price),
            match direction {
                Direction::Neutral => 50,
                _ => decision::confidence(snapshot.rsi),
            },
            timeframe.to_string(),
            now_millis(),
        );

        debug!(symbol = %symbol, signal = %signal, rsi = snapshot.rsi, "Pipeline complete");
        signal
    }

    /// Scan the configured watchlist concurrently on one timeframe.
    pub async fn scan(&self, timeframe: &str) -> Vec<Signal> {
        self.scan_pairs(&self.config.scan.pairs, timeframe).await
    }

    /// Scan an explicit pair list concurrently; results are ordered
    /// actionable-first, then by confidence descending.
    pub async fn scan_pairs(&self, pairs: &[String], timeframe: &str) -> Vec<Signal> {
        info!(pairs = pairs.len(), timeframe = %timeframe, "Starting scan");

        let mut signals = join_all(
            pairs
                .iter()
                .map(|pair| self.generate_signal(pair, timeframe)),
        )
        .await;

        signals.sort_by(|a, b| rank(a, b));

        let actionable = signals.iter().filter(|s| s.is_actionable()).count();
        info!(signals = signals.len(), actionable = actionable, "Scan complete");
        signals
    }

    /// Latest trade price for a pair.
    pub async fn current_price(&self, pair: &str) -> Result<f64, RestClientError> {
        let symbol = normalize_pair(pair);
        self.client.get_ticker_price(&symbol).await
    }
}

fn rank(a: &Signal, b: &Signal) -> Ordering {
    match (
        a.direction == Direction::Neutral,
        b.direction == Direction::Neutral,
    ) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => b.confidence.cmp(&a.confidence),
    }
}
