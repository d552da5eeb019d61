// Layer 2 - Series Processing
// Pure computation over candle history: parsing, pivots, indicator passes

pub mod candles;
pub mod indicators;
pub mod pivots;

// Re-export commonly used items
pub use candles::{
    fetch_candles, parse_kline_rows, CandleSeries, EmptyReason, FetchOutcome, SeriesError,
};
pub use indicators::{
    atr, compute_snapshot, ema, macd, obv, rsi, sma, stochastic, MacdPoint, StochasticSeries,
};
pub use pivots::{find_pivot, find_series_pivot};
