// Signal Pulse - Binance spot signal engine
//
// Layered crate:
//   core   - shared types, configuration, logging
//   layer1 - Binance connectivity (REST market data, ticker streams)
//   layer2 - series processing (candles, pivots, indicator passes)
//   layer3 - signal generation and live tracking

pub mod core;
pub mod layer1;
pub mod layer2;
pub mod layer3;

// Top-level re-exports covering the common embedding surface
pub use crate::core::{
    setup_logging, BinanceConfig, Candle, ConfigError, ConnectionStatus, Direction, EngineConfig,
    IndicatorConfig, IndicatorSnapshot, LiveTrackingState, PivotKind, PivotPoint, ScanConfig,
    Signal, TickerUpdate, TrackingPhase,
};
pub use crate::layer1::{MarketDataClient, RestClientError, StreamError, TickerSubscription};
pub use crate::layer2::{CandleSeries, EmptyReason, FetchOutcome};
pub use crate::layer3::{
    normalize_pair, LiveTracker, SignalEngine, TrackerError, TrackerEvent,
};
