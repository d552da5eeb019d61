// Layer 1 - Binance Connectivity
// REST market data and per-symbol ticker streams

pub mod rest_client;
pub mod stream;

// Re-export commonly used items for convenience
pub use rest_client::{MarketDataClient, RateLimiter, RestClientError, RestClientStats};
pub use stream::{
    parse_ticker_message, ticker_stream_name, StreamError, StreamEvent, StreamStats,
    TickerSubscription,
};
