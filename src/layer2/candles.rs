// Candle Series Assembly
// Parses Binance kline payloads into column-ordered series for indicator math

use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::Candle;
use crate::layer1::{MarketDataClient, RestClientError};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("Kline payload is not an array")]
    NotAnArray,
    #[error("Invalid kline row {index}: {message}")]
    InvalidRow { index: usize, message: String },
}

// ============================================================================
// Candle Series
// ============================================================================

/// OHLCV history for one symbol/timeframe, oldest candle first.
///
/// Columns are stored as parallel vectors so indicator passes can walk a
/// single field without reassembling candles.
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    open_times: Vec<i64>,
    opens: Vec<f64>,
    highs: Vec<f64>,
    lows: Vec<f64>,
    closes: Vec<f64>,
    volumes: Vec<f64>,
}

impl CandleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            open_times: Vec::with_capacity(capacity),
            opens: Vec::with_capacity(capacity),
            highs: Vec::with_capacity(capacity),
            lows: Vec::with_capacity(capacity),
            closes: Vec::with_capacity(capacity),
            volumes: Vec::with_capacity(capacity),
        }
    }

    pub fn from_candles(candles: impl IntoIterator<Item = Candle>) -> Self {
        let mut series = Self::new();
        for candle in candles {
            series.push(candle);
        }
        series
    }

    pub fn push(&mut self, candle: Candle) {
        self.open_times.push(candle.open_time);
        self.opens.push(candle.open);
        self.highs.push(candle.high);
        self.lows.push(candle.low);
        self.closes.push(candle.close);
        self.volumes.push(candle.volume);
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.closes.last().copied()
    }

    pub fn candle(&self, index: usize) -> Option<Candle> {
        if index >= self.len() {
            return None;
        }
        Some(Candle {
            open_time: self.open_times[index],
            open: self.opens[index],
            high: self.highs[index],
            low: self.lows[index],
            close: self.closes[index],
            volume: self.volumes[index],
        })
    }

    pub fn open_times(&self) -> &[i64] {
        &self.open_times
    }

    pub fn opens(&self) -> &[f64] {
        &self.opens
    }

    pub fn highs(&self) -> &[f64] {
        &self.highs
    }

    pub fn lows(&self) -> &[f64] {
        &self.lows
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }
}

// ============================================================================
// Kline Payload Parsing
// ============================================================================

fn row_i64(row: &[Value], idx: usize, field: &str, row_index: usize) -> Result<i64, SeriesError> {
    row.get(idx)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| SeriesError::InvalidRow {
            index: row_index,
            message: format!("missing or non-integer {}", field),
        })
}

fn row_f64(row: &[Value], idx: usize, field: &str, row_index: usize) -> Result<f64, SeriesError> {
    let value = row.get(idx).ok_or_else(|| SeriesError::InvalidRow {
        index: row_index,
        message: format!("missing {}", field),
    })?;
    // Binance sends OHLCV as strings; accept bare numbers too
    match value {
        Value::String(s) => s.parse::<f64>().map_err(|_| SeriesError::InvalidRow {
            index: row_index,
            message: format!("invalid {}: '{}'", field, s),
        }),
        Value::Number(n) => n.as_f64().ok_or_else(|| SeriesError::InvalidRow {
            index: row_index,
            message: format!("invalid {}", field),
        }),
        other => Err(SeriesError::InvalidRow {
            index: row_index,
            message: format!("invalid {}: {:?}", field, other),
        }),
    }
}

/// Parse a `/api/v3/klines` response into a candle series.
///
/// Rows arrive oldest first as
/// `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`.
pub fn parse_kline_rows(payload: &Value) -> Result<CandleSeries, SeriesError> {
    let rows = payload.as_array().ok_or(SeriesError::NotAnArray)?;

    let mut series = CandleSeries::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let row = row.as_array().ok_or_else(|| SeriesError::InvalidRow {
            index: i,
            message: "row is not an array".to_string(),
        })?;

        series.push(Candle {
            open_time: row_i64(row, 0, "open_time", i)?,
            open: row_f64(row, 1, "open", i)?,
            high: row_f64(row, 2, "high", i)?,
            low: row_f64(row, 3, "low", i)?,
            close: row_f64(row, 4, "close", i)?,
            volume: row_f64(row, 5, "volume", i)?,
        });
    }

    Ok(series)
}

// ============================================================================
// Typed Fetch Outcome
// ============================================================================

/// Why a fetch produced no usable series
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyReason {
    Transport(String),
    Malformed(String),
    NoData,
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyReason::Transport(msg) => write!(f, "transport error: {}", msg),
            EmptyReason::Malformed(msg) => write!(f, "malformed payload: {}", msg),
            EmptyReason::NoData => write!(f, "exchange returned no candles"),
        }
    }
}

/// Result of a candle fetch. Failures are data, not errors: the caller
/// downgrades to a neutral signal instead of propagating.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Complete(CandleSeries),
    Empty(EmptyReason),
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, FetchOutcome::Complete(_))
    }

    pub fn into_series(self) -> Option<CandleSeries> {
        match self {
            FetchOutcome::Complete(series) => Some(series),
            FetchOutcome::Empty(_) => None,
        }
    }
}

/// Fetch and parse candle history for one symbol/timeframe.
pub async fn fetch_candles(
    client: &MarketDataClient,
    symbol: &str,
    interval: &str,
    limit: u32,
) -> FetchOutcome {
    let payload = match client.get_klines(symbol, interval, limit).await {
        Ok(payload) => payload,
        Err(e) => {
            warn!(symbol = %symbol, interval = %interval, error = %e, "Kline fetch failed");
            let reason = match e {
                RestClientError::Malformed(msg) => EmptyReason::Malformed(msg),
                other => EmptyReason::Transport(other.to_string()),
            };
            return FetchOutcome::Empty(reason);
        }
    };

    let series = match parse_kline_rows(&payload) {
        Ok(series) => series,
        Err(e) => {
            warn!(symbol = %symbol, interval = %interval, error = %e, "Kline payload rejected");
            return FetchOutcome::Empty(EmptyReason::Malformed(e.to_string()));
        }
    };

    if series.is_empty() {
        warn!(symbol = %symbol, interval = %interval, "Kline response contained no rows");
        return FetchOutcome::Empty(EmptyReason::NoData);
    }

    debug!(symbol = %symbol, interval = %interval, candles = series.len(), "Candles fetched");
    FetchOutcome::Complete(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kline_row(open_time: i64, o: f64, h: f64, l: f64, c: f64, v: f64) -> Value {
        json!([
            open_time,
            o.to_string(),
            h.to_string(),
            l.to_string(),
            c.to_string(),
            v.to_string(),
            open_time + 59_999,
            "1000.0",
            42,
            "500.0",
            "500.0",
            "0"
        ])
    }

    #[test]
    fn test_parse_kline_rows() {
        let payload = json!([
            kline_row(1_700_000_000_000, 100.0, 105.0, 99.0, 104.0, 12.5),
            kline_row(1_700_000_060_000, 104.0, 106.0, 103.0, 105.5, 8.0),
        ]);

        let series = parse_kline_rows(&payload).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.open_times()[0], 1_700_000_000_000);
        assert_eq!(series.closes(), &[104.0, 105.5]);
        assert_eq!(series.highs()[1], 106.0);
        assert_eq!(series.last_close(), Some(105.5));

        let first = series.candle(0).unwrap();
        assert_eq!(first.open, 100.0);
        assert_eq!(first.volume, 12.5);
        assert!(series.candle(2).is_none());
    }

    #[test]
    fn test_parse_rejects_non_array() {
        let result = parse_kline_rows(&json!({"code": -1121, "msg": "Invalid symbol."}));
        assert!(matches!(result, Err(SeriesError::NotAnArray)));
    }

    #[test]
    fn test_parse_rejects_bad_row() {
        let payload = json!([[1_700_000_000_000i64, "not_a_price", "2", "3", "4", "5"]]);
        match parse_kline_rows(&payload) {
            Err(SeriesError::InvalidRow { index, message }) => {
                assert_eq!(index, 0);
                assert!(message.contains("open"));
            }
            other => panic!("Expected InvalidRow, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_accepts_numeric_fields() {
        // Some fixtures emit numbers instead of strings
        let payload = json!([[1_700_000_000_000i64, 1.0, 2.0, 0.5, 1.5, 10.0, 0, "0", 0, "0", "0", "0"]]);
        let series = parse_kline_rows(&payload).unwrap();
        assert_eq!(series.closes(), &[1.5]);
    }

    #[test]
    fn test_empty_payload_parses_to_empty_series() {
        let series = parse_kline_rows(&json!([])).unwrap();
        assert!(series.is_empty());
        assert_eq!(series.last_close(), None);
    }

    #[test]
    fn test_fetch_outcome_accessors() {
        let complete = FetchOutcome::Complete(CandleSeries::new());
        assert!(complete.is_complete());
        assert!(complete.into_series().is_some());

        let empty = FetchOutcome::Empty(EmptyReason::NoData);
        assert!(!empty.is_complete());
        assert!(empty.clone().into_series().is_none());
        assert_eq!(
            EmptyReason::Transport("timeout".to_string()).to_string(),
            "transport error: timeout"
        );
    }

    #[test]
    fn test_series_from_candles() {
        let candles = vec![
            Candle::new(1, 10.0, 12.0, 9.0, 11.0, 100.0),
            Candle::new(2, 11.0, 13.0, 10.0, 12.0, 150.0),
        ];
        let series = CandleSeries::from_candles(candles);
        assert_eq!(series.len(), 2);
        assert_eq!(series.volumes(), &[100.0, 150.0]);
    }
}
