// Live Tracker
// Follows open signals against the streaming ticker feed, one isolated
// subscription per symbol

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::core::{
    BinanceConfig, Direction, LiveTrackingState, Signal, TickerUpdate, TrackingPhase,
};
use crate::layer1::{StreamEvent, StreamStats, TickerSubscription};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{0} is already tracked")]
    AlreadyTracked(String),
    #[error("{0} is not tracked")]
    NotTracked(String),
}

// ============================================================================
// Events
// ============================================================================

/// Typed tracker notifications. Broadcast so any number of observers can
/// follow tracking without polling the state map.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    TickApplied {
        symbol: String,
        state: LiveTrackingState,
    },
    StreamErrored {
        symbol: String,
        message: String,
    },
    Removed {
        symbol: String,
    },
}

// ============================================================================
// Tick Math
// ============================================================================

/// Recompute the tracking state for one signal at a live price.
///
/// Progress toward target is the travelled share of the entry-to-target
/// distance, forced to 100 once price crosses the target in favor and to 0
/// whenever price sits on the adverse side of entry, clamped to [0, 100].
/// PnL is signed by direction, so a falling price is a gain for a Short.
/// Neutral signals have no target and report zero progress and PnL.
pub fn tracking_state(signal: &Signal, live_price: f64, change_24h_percent: f64) -> LiveTrackingState {
    let entry = signal.entry_price;
    let sign = signal.direction.sign();

    let progress = match signal.target_price {
        Some(target) => {
            let total_distance = (target - entry).abs();
            let mut progress = if total_distance == 0.0 {
                0.0
            } else {
                (live_price - entry).abs() / total_distance * 100.0
            };
            match signal.direction {
                Direction::Long => {
                    if live_price > target {
                        progress = 100.0;
                    }
                    if live_price < entry {
                        progress = 0.0;
                    }
                }
                Direction::Short => {
                    if live_price < target {
                        progress = 100.0;
                    }
                    if live_price > entry {
                        progress = 0.0;
                    }
                }
                Direction::Neutral => progress = 0.0,
            }
            progress.clamp(0.0, 100.0)
        }
        None => 0.0,
    };

    let pnl_value = (live_price - entry) * sign;
    let pnl_percent = if entry == 0.0 {
        0.0
    } else {
        (live_price - entry) / entry * 100.0 * sign
    };

    LiveTrackingState {
        symbol: signal.symbol.clone(),
        live_price,
        change_24h_percent,
        progress_to_target_percent: progress,
        pnl_percent,
        pnl_value,
    }
}

// ============================================================================
// Tracked Entries
// ============================================================================

/// Point-in-time view of one tracked symbol
#[derive(Debug, Clone)]
pub struct TrackedSnapshot {
    pub signal: Signal,
    pub state: LiveTrackingState,
    pub phase: TrackingPhase,
    pub ticks_applied: u64,
    pub stream_errors: u64,
}

struct TrackedEntry {
    signal: Signal,
    state: LiveTrackingState,
    phase: TrackingPhase,
    ticks_applied: u64,
    stream_errors: u64,
    subscription: TickerSubscription,
    consumer: tokio::task::JoinHandle<()>,
}

#[derive(Debug, Clone, Default)]
pub struct TrackerStats {
    pub tracked: usize,
    pub ticks_applied: u64,
    pub stream_errors: u64,
}

impl fmt::Display for TrackerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TrackerStats(tracked={}, ticks={}, stream_errors={})",
            self.tracked, self.ticks_applied, self.stream_errors
        )
    }
}

// ============================================================================
// Live Tracker
// ============================================================================

/// Owns one ticker subscription per tracked symbol. Symbols are isolated
/// units: ticks are applied on independent tasks and a dead stream never
/// touches another symbol's entry.
pub struct LiveTracker {
    config: BinanceConfig,
    entries: Arc<RwLock<HashMap<String, TrackedEntry>>>,
    event_tx: broadcast::Sender<TrackerEvent>,
}

impl LiveTracker {
    pub fn new(config: BinanceConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            entries: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Receiver for tracker events. Each call gets an independent cursor.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_tx.subscribe()
    }

    /// Start tracking a signal against the live feed. Must be called within
    /// a tokio runtime.
    pub fn track(&self, signal: Signal) -> Result<(), TrackerError> {
        let symbol = signal.symbol.clone();
        if self.entries.read().contains_key(&symbol) {
            return Err(TrackerError::AlreadyTracked(symbol));
        }

        let (subscription, stream_rx) = TickerSubscription::spawn(&symbol, &self.config);
        let state = LiveTrackingState::new(symbol.clone(), signal.entry_price);

        let consumer = tokio::spawn(consume_stream(
            symbol.clone(),
            signal.clone(),
            stream_rx,
            self.entries.clone(),
            self.event_tx.clone(),
        ));

        info!(symbol = %symbol, direction = %signal.direction, "Tracking signal");
        self.entries.write().insert(
            symbol,
            TrackedEntry {
                signal,
                state,
                phase: TrackingPhase::Generated,
                ticks_applied: 0,
                stream_errors: 0,
                subscription,
                consumer,
            },
        );
        Ok(())
    }

    /// Stop tracking a symbol: unsubscribe, close the stream, drop the
    /// entry, and notify observers.
    pub async fn untrack(&self, symbol: &str) -> Result<(), TrackerError> {
        let entry = self
            .entries
            .write()
            .remove(symbol)
            .ok_or_else(|| TrackerError::NotTracked(symbol.to_string()))?;

        entry.subscription.shutdown().await;
        let _ = entry.consumer.await;

        let _ = self.event_tx.send(TrackerEvent::Removed {
            symbol: symbol.to_string(),
        });
        info!(symbol = %symbol, "Signal removed from tracking");
        Ok(())
    }

    /// Tear down every subscription.
    pub async fn untrack_all(&self) {
        let symbols = self.tracked_symbols();
        for symbol in symbols {
            // NotTracked here means a concurrent untrack got there first
            let _ = self.untrack(&symbol).await;
        }
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.entries.read().contains_key(symbol)
    }

    pub fn tracked_symbols(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn state(&self, symbol: &str) -> Option<LiveTrackingState> {
        self.entries.read().get(symbol).map(|e| e.state.clone())
    }

    pub fn phase(&self, symbol: &str) -> Option<TrackingPhase> {
        self.entries.read().get(symbol).map(|e| e.phase)
    }

    pub fn snapshot(&self, symbol: &str) -> Option<TrackedSnapshot> {
        self.entries.read().get(symbol).map(|e| TrackedSnapshot {
            signal: e.signal.clone(),
            state: e.state.clone(),
            phase: e.phase,
            ticks_applied: e.ticks_applied,
            stream_errors: e.stream_errors,
        })
    }

    pub fn snapshots(&self) -> Vec<TrackedSnapshot> {
        let entries = self.entries.read();
        let mut all: Vec<TrackedSnapshot> = entries
            .values()
            .map(|e| TrackedSnapshot {
                signal: e.signal.clone(),
                state: e.state.clone(),
                phase: e.phase,
                ticks_applied: e.ticks_applied,
                stream_errors: e.stream_errors,
            })
            .collect();
        all.sort_by(|a, b| a.signal.symbol.cmp(&b.signal.symbol));
        all
    }

    pub fn stream_stats(&self, symbol: &str) -> Option<StreamStats> {
        self.entries
            .read()
            .get(symbol)
            .map(|e| e.subscription.get_stats())
    }

    pub fn get_stats(&self) -> TrackerStats {
        let entries = self.entries.read();
        TrackerStats {
            tracked: entries.len(),
            ticks_applied: entries.values().map(|e| e.ticks_applied).sum(),
            stream_errors: entries.values().map(|e| e.stream_errors).sum(),
        }
    }
}

/// Apply stream events for one symbol until its subscription ends.
async fn consume_stream(
    symbol: String,
    signal: Signal,
    mut stream_rx: tokio::sync::mpsc::UnboundedReceiver<StreamEvent>,
    entries: Arc<RwLock<HashMap<String, TrackedEntry>>>,
    event_tx: broadcast::Sender<TrackerEvent>,
) {
    while let Some(event) = stream_rx.recv().await {
        match event {
            StreamEvent::Tick(update) => {
                if update.symbol != symbol {
                    debug!(expected = %symbol, got = %update.symbol, "Tick for wrong symbol dropped");
                    continue;
                }
                let state = apply_tick(&symbol, &signal, &update, &entries);
                if let Some(state) = state {
                    let _ = event_tx.send(TrackerEvent::TickApplied {
                        symbol: symbol.clone(),
                        state,
                    });
                }
            }
            StreamEvent::Error(message) => {
                warn!(symbol = %symbol, error = %message, "Stream error while tracking");
                if let Some(entry) = entries.write().get_mut(&symbol) {
                    entry.stream_errors += 1;
                }
                let _ = event_tx.send(TrackerEvent::StreamErrored {
                    symbol: symbol.clone(),
                    message,
                });
            }
        }
    }
    debug!(symbol = %symbol, "Stream consumer finished");
}

fn apply_tick(
    symbol: &str,
    signal: &Signal,
    update: &TickerUpdate,
    entries: &Arc<RwLock<HashMap<String, TrackedEntry>>>,
) -> Option<LiveTrackingState> {
    let state = tracking_state(signal, update.last_price, update.change_24h_percent);
    let mut entries = entries.write();
    let entry = entries.get_mut(symbol)?;
    entry.state = state.clone();
    entry.phase = TrackingPhase::Active;
    entry.ticks_applied += 1;
    Some(state)
}
