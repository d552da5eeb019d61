// Core Type Definitions for the Signal Engine
// Shared across all layers

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    /// PnL sign: +1 for Long, -1 for Short, 0 for Neutral.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
            Direction::Neutral => 0.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PivotKind {
    High,
    Low,
}

impl fmt::Display for PivotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Lifecycle of one tracked symbol: a signal exists but no stream yet
/// (Generated), the stream is delivering ticks (Active), or the
/// subscription was torn down and the state discarded (Removed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingPhase {
    Generated,
    Active,
    Removed,
}

impl fmt::Display for TrackingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// Candle
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64, // milliseconds
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl fmt::Display for Candle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Candle(t={}, o={:.2}, h={:.2}, l={:.2}, c={:.2}, v={:.4})",
            self.open_time, self.open, self.high, self.low, self.close, self.volume
        )
    }
}

// ============================================================================
// PivotPoint
// ============================================================================

/// A local extremum in a price series, relative to a symmetric window.
/// Scoped to one decision cycle; `index` refers into the series it was
/// detected on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PivotPoint {
    pub index: usize,
    pub value: f64,
    pub kind: PivotKind,
}

impl PivotPoint {
    pub fn new(index: usize, value: f64, kind: PivotKind) -> Self {
        Self { index, value, kind }
    }
}

impl fmt::Display for PivotPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pivot({:?}@{} = {:.2})", self.kind, self.index, self.value)
    }
}

// ============================================================================
// IndicatorSnapshot
// ============================================================================

/// Last computed indicator values, aligned to the most recent candle.
/// `obv_prev` is the second-to-last OBV value; the decision rule compares
/// the two to detect accumulation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub macd_histogram: f64,
    pub atr: f64,
    pub obv: f64,
    pub obv_prev: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub ema: f64,
}

impl fmt::Display for IndicatorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Indicators(rsi={:.2}, macd_hist={:.4}, atr={:.4}, obv={:.2}, stoch={:.2}/{:.2}, ema={:.2})",
            self.rsi, self.macd_histogram, self.atr, self.obv, self.stoch_k, self.stoch_d, self.ema
        )
    }
}

// ============================================================================
// Signal
// ============================================================================

/// A directional trade signal. Immutable after creation; re-running the
/// pipeline produces a new Signal rather than mutating an old one.
/// Target and stop are absent for Neutral signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub target_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub confidence: u8,
    pub timeframe: String,
    pub created_at: i64, // milliseconds
}

impl Signal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: String,
        direction: Direction,
        entry_price: f64,
        target_price: Option<f64>,
        stop_loss_price: Option<f64>,
        confidence: u8,
        timeframe: String,
        created_at: i64,
    ) -> Self {
        Self {
            symbol,
            direction,
            entry_price,
            target_price,
            stop_loss_price,
            confidence,
            timeframe,
            created_at,
        }
    }

    /// Neutral signal carrying only the entry price. Returned when the data
    /// is insufficient or no condition set holds.
    pub fn neutral(symbol: String, entry_price: f64, timeframe: String, created_at: i64) -> Self {
        Self {
            symbol,
            direction: Direction::Neutral,
            entry_price,
            target_price: None,
            stop_loss_price: None,
            confidence: 50,
            timeframe,
            created_at,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.direction != Direction::Neutral
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.target_price, self.stop_loss_price) {
            (Some(target), Some(stop)) => write!(
                f,
                "Signal({} {} entry={:.2} target={:.2} stop={:.2} conf={} tf={})",
                self.symbol, self.direction, self.entry_price, target, stop, self.confidence, self.timeframe
            ),
            _ => write!(
                f,
                "Signal({} {} entry={:.2} tf={})",
                self.symbol, self.direction, self.entry_price, self.timeframe
            ),
        }
    }
}

// ============================================================================
// TickerUpdate
// ============================================================================

/// One inbound tick from the streaming feed: last price plus the rolling
/// 24h percent change reported by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerUpdate {
    pub symbol: String,
    pub last_price: f64,
    pub change_24h_percent: f64,
    pub event_time: u64,
}

impl TickerUpdate {
    pub fn new(symbol: String, last_price: f64, change_24h_percent: f64, event_time: u64) -> Self {
        Self {
            symbol,
            last_price,
            change_24h_percent,
            event_time,
        }
    }
}

impl fmt::Display for TickerUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ticker({} last={:.2} 24h={:+.2}%)",
            self.symbol, self.last_price, self.change_24h_percent
        )
    }
}

// ============================================================================
// LiveTrackingState
// ============================================================================

/// Rolling per-symbol tracking state, recomputed on every tick. Owned
/// exclusively by the live tracker entry for one subscribed symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveTrackingState {
    pub symbol: String,
    pub live_price: f64,
    pub change_24h_percent: f64,
    pub progress_to_target_percent: f64,
    pub pnl_percent: f64,
    pub pnl_value: f64,
}

impl LiveTrackingState {
    pub fn new(symbol: String, entry_price: f64) -> Self {
        Self {
            symbol,
            live_price: entry_price,
            change_24h_percent: 0.0,
            progress_to_target_percent: 0.0,
            pnl_percent: 0.0,
            pnl_value: 0.0,
        }
    }
}

impl fmt::Display for LiveTrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tracking({} live={:.2} 24h={:+.2}% progress={:.1}% pnl={:+.2}%)",
            self.symbol,
            self.live_price,
            self.change_24h_percent,
            self.progress_to_target_percent,
            self.pnl_percent
        )
    }
}
