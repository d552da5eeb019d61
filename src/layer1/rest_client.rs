// REST Client for Binance Spot Market Data
// Rate-limited GETs against the public endpoints with bounded retries

use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::core::BinanceConfig;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum RestClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {code} (status {status}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl RestClientError {
    /// Transport failures, rate limiting, and server-side errors may clear
    /// up on a later attempt; every other API error is final.
    fn is_retryable(&self) -> bool {
        match self {
            RestClientError::Http(_) => true,
            RestClientError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            RestClientError::Malformed(_) => false,
        }
    }
}

// ============================================================================
// Rate Limiter
// ============================================================================

struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token bucket shared by every request a client sends.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = f64::from(requests_per_minute);
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Take one token, sleeping until the bucket refills when it is empty.
    pub async fn acquire(&self) {
        loop {
            let wait_secs = {
                let mut bucket = self.bucket.lock().await;
                let elapsed = bucket.refilled_at.elapsed().as_secs_f64();
                bucket.tokens =
                    (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                bucket.refilled_at = Instant::now();
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                (1.0 - bucket.tokens) / self.refill_per_sec
            };
            tokio::time::sleep(Duration::from_secs_f64(wait_secs.max(0.01))).await;
        }
    }
}

// ============================================================================
// Client Statistics
// ============================================================================

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct RestClientStats {
    pub requests_sent: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub retries: u64,
    pub success_rate: f64,
}

impl fmt::Display for RestClientStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RestClientStats(sent={}, ok={}, fail={}, retries={}, rate={:.2}%)",
            self.requests_sent,
            self.requests_succeeded,
            self.requests_failed,
            self.retries,
            self.success_rate * 100.0
        )
    }
}

// ============================================================================
// Market Data Client
// ============================================================================

/// REST client for the public Binance spot market-data endpoints.
///
/// Requests pass through a token bucket rate limiter; retryable failures are
/// retried with exponential backoff up to `max_retries` extra attempts.
pub struct MarketDataClient {
    http: Client,
    base_url: String,
    max_retries: u32,
    limiter: RateLimiter,
    counters: Counters,
}

impl MarketDataClient {
    pub fn new(
        base_url: &str,
        requests_per_minute: u32,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, RestClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
            limiter: RateLimiter::new(requests_per_minute),
            counters: Counters::default(),
        })
    }

    pub fn from_config(config: &BinanceConfig) -> Result<Self, RestClientError> {
        Self::new(
            &config.rest_base_url,
            config.requests_per_minute,
            config.request_timeout_secs,
            config.max_retries,
        )
    }

    /// Rate-limited GET with retry. The returned error is the last attempt's.
    async fn get(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Value, RestClientError> {
        self.limiter.acquire().await;
        let url = format!("{}{}", self.base_url, endpoint);

        let mut attempt = 0u32;
        loop {
            self.counters.sent.fetch_add(1, Ordering::Relaxed);
            match self.send_once(&url, query).await {
                Ok(body) => {
                    self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    return Ok(body);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = Duration::from_secs(1u64 << attempt);
                    warn!(
                        endpoint = endpoint,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        delay_secs = delay.as_secs(),
                        "Request failed, will retry"
                    );
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }
    }

    /// One HTTP round trip, with non-2xx responses mapped onto the Binance
    /// error body.
    async fn send_once(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, RestClientError> {
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if status.is_success() {
            return Ok(body);
        }

        Err(RestClientError::Api {
            status: status.as_u16(),
            code: body.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: body
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        })
    }

    // ========================================================================
    // Market Data Endpoints
    // ========================================================================

    /// Raw kline rows for (symbol, interval), most recent `limit` candles.
    /// Rows arrive oldest first as `[openTime, "o", "h", "l", "c", "v", ...]`.
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Value, RestClientError> {
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        self.get("/api/v3/klines", &query).await
    }

    /// Last trade price for a symbol.
    pub async fn get_ticker_price(&self, symbol: &str) -> Result<f64, RestClientError> {
        let query = [("symbol", symbol.to_string())];
        let body = self.get("/api/v3/ticker/price", &query).await?;

        body.get("price")
            .and_then(Value::as_str)
            .and_then(|p| p.parse::<f64>().ok())
            .ok_or_else(|| RestClientError::Malformed(format!("ticker price payload: {}", body)))
    }

    /// Test connectivity
    pub async fn ping(&self) -> bool {
        self.get("/api/v3/ping", &[]).await.is_ok()
    }

    pub fn stats(&self) -> RestClientStats {
        let sent = self.counters.sent.load(Ordering::Relaxed);
        let succeeded = self.counters.succeeded.load(Ordering::Relaxed);
        RestClientStats {
            requests_sent: sent,
            requests_succeeded: succeeded,
            requests_failed: self.counters.failed.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            success_rate: if sent > 0 {
                succeeded as f64 / sent as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_full_bucket_never_sleeps() {
        let limiter = RateLimiter::new(1200);
        // Both acquires drain tokens straight from the full bucket
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(limiter.bucket.lock().await.tokens <= 1198.0 + 1e-6);
    }

    #[tokio::test]
    async fn test_rate_limiter_blocks_then_refills() {
        let limiter = RateLimiter::new(6000); // 100 tokens/sec
        limiter.bucket.lock().await.tokens = 0.0;

        let before = Instant::now();
        limiter.acquire().await;
        // An empty bucket at 100/sec refills one token in ~10ms
        assert!(before.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_retryable_classification() {
        let rate_limited = RestClientError::Api {
            status: 429,
            code: -1003,
            message: "Too many requests".to_string(),
        };
        assert!(rate_limited.is_retryable());

        let server_error = RestClientError::Api {
            status: 503,
            code: 0,
            message: "Service unavailable".to_string(),
        };
        assert!(server_error.is_retryable());

        let bad_symbol = RestClientError::Api {
            status: 400,
            code: -1121,
            message: "Invalid symbol.".to_string(),
        };
        assert!(!bad_symbol.is_retryable());

        assert!(!RestClientError::Malformed("no price".to_string()).is_retryable());
    }

    #[test]
    fn test_client_creation_from_config() {
        let config = BinanceConfig::default();
        let client = MarketDataClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, "https://api.binance.com");
        assert_eq!(client.max_retries, 3);
    }

    #[test]
    fn test_trailing_slash_is_stripped() {
        let client = MarketDataClient::new("https://api.binance.com/", 1200, 10, 3).unwrap();
        assert_eq!(client.base_url, "https://api.binance.com");
    }

    #[test]
    fn test_stats_initial() {
        let client = MarketDataClient::new("https://api.binance.com", 1200, 10, 3).unwrap();

        let stats = client.stats();
        assert_eq!(stats.requests_sent, 0);
        assert_eq!(stats.requests_succeeded, 0);
        assert_eq!(stats.requests_failed, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(format!("{}", stats).contains("sent=0"));
    }
}
