// Layer 3 - Signal Generation & Tracking
// Turns processed series into directional signals and follows them live

// Entry rules
pub mod decision;

// Target/stop sizing
pub mod risk;

// Fetch-evaluate-rank orchestration
pub mod engine;

// Live signal tracking against the ticker feed
pub mod tracker;

// Decision re-exports
pub use decision::{confidence, evaluate, RSI_LOWER_BOUND, RSI_UPPER_BOUND};

// Risk re-exports
pub use risk::{risk_levels, RiskLevels, STOP_ATR_MULTIPLIER, TARGET_ATR_MULTIPLIER};

// Engine re-exports
pub use engine::{normalize_pair, SignalEngine};

// Tracker re-exports
pub use tracker::{
    tracking_state, LiveTracker, TrackedSnapshot, TrackerError, TrackerEvent, TrackerStats,
};
