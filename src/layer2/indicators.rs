// Batch Technical Indicators
// Full-history passes over one candle series. Warm-up candles are consumed;
// each output vector only covers the span where the value is defined.

use crate::core::{IndicatorConfig, IndicatorSnapshot};
use crate::layer2::candles::CandleSeries;

// ============================================================================
// Moving Averages
// ============================================================================

/// Simple moving average. Output length is `values.len() - period + 1`;
/// empty when the input is shorter than `period`.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut window_sum: f64 = values[..period].iter().sum();
    out.push(window_sum / period as f64);
    for i in period..values.len() {
        window_sum += values[i] - values[i - period];
        out.push(window_sum / period as f64);
    }
    out
}

/// Exponential moving average seeded with the SMA of the first `period`
/// values. Output aligns to input index `period - 1` onward.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len() - period + 1);
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out.push(seed);
    let mut current = seed;
    for &value in &values[period..] {
        current = (value - current) * multiplier + current;
        out.push(current);
    }
    out
}

// ============================================================================
// RSI
// ============================================================================

/// Relative Strength Index with Wilder smoothing.
///
/// Gains/losses are seeded with the simple average of the first `period`
/// price changes, then smoothed as `(prev * (period - 1) + current) / period`.
/// The first output corresponds to input index `period`; output length is
/// `values.len() - period`.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() <= period {
        return Vec::new();
    }

    let mut gains = Vec::with_capacity(values.len() - 1);
    let mut losses = Vec::with_capacity(values.len() - 1);
    for pair in values.windows(2) {
        let change = pair[1] - pair[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain: f64 = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss: f64 = losses[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(gains.len() - period + 1);
    out.push(rsi_value(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period as f64 - 1.0) + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + losses[i]) / period as f64;
        out.push(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

// ============================================================================
// ATR
// ============================================================================

/// Average True Range with Wilder smoothing. The first true range has no
/// prior close and falls back to `high - low`. Output aligns to input index
/// `period - 1` onward.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = highs.len().min(lows.len()).min(closes.len());
    if period == 0 || n < period {
        return Vec::new();
    }

    let mut true_ranges = Vec::with_capacity(n);
    true_ranges.push(highs[0] - lows[0]);
    for i in 1..n {
        let hl = highs[i] - lows[i];
        let hc = (highs[i] - closes[i - 1]).abs();
        let lc = (lows[i] - closes[i - 1]).abs();
        true_ranges.push(hl.max(hc).max(lc));
    }

    let mut current: f64 = true_ranges[..period].iter().sum::<f64>() / period as f64;
    let mut out = Vec::with_capacity(n - period + 1);
    out.push(current);
    for &tr in &true_ranges[period..] {
        current = (current * (period as f64 - 1.0) + tr) / period as f64;
        out.push(current);
    }
    out
}

// ============================================================================
// OBV
// ============================================================================

/// On-Balance Volume. The first candle anchors the running total at zero;
/// each later candle adds its volume when the close rose, subtracts it when
/// the close fell, and leaves the total unchanged on an equal close.
pub fn obv(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let n = closes.len().min(volumes.len());
    if n == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(n);
    let mut running = 0.0;
    out.push(running);
    for i in 1..n {
        if closes[i] > closes[i - 1] {
            running += volumes[i];
        } else if closes[i] < closes[i - 1] {
            running -= volumes[i];
        }
        out.push(running);
    }
    out
}

// ============================================================================
// MACD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD line (fast EMA - slow EMA), signal line (EMA of the MACD line), and
/// histogram (MACD - signal). Points are emitted only once all three are
/// defined; the first corresponds to input index `slow + signal_period - 2`.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal_period: usize) -> Vec<MacdPoint> {
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return Vec::new();
    }
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    if slow_ema.is_empty() {
        return Vec::new();
    }

    // Both EMA vectors end at the last input index; align from the back
    let offset = fast_ema.len() - slow_ema.len();
    let macd_line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, &s)| fast_ema[i + offset] - s)
        .collect();

    let signal_line = ema(&macd_line, signal_period);
    if signal_line.is_empty() {
        return Vec::new();
    }

    let skip = macd_line.len() - signal_line.len();
    signal_line
        .iter()
        .enumerate()
        .map(|(i, &sig)| {
            let m = macd_line[i + skip];
            MacdPoint {
                macd: m,
                signal: sig,
                histogram: m - sig,
            }
        })
        .collect()
}

// ============================================================================
// Stochastic Oscillator
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct StochasticSeries {
    /// %K values, first at input index `period - 1`
    pub k: Vec<f64>,
    /// %D values (SMA of %K), first at input index `period + signal_period - 2`
    pub d: Vec<f64>,
}

/// Fast stochastic: %K compares the close to the high/low range of the
/// trailing `period` candles; %D is the SMA of %K over `signal_period`.
pub fn stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
    signal_period: usize,
) -> StochasticSeries {
    let n = highs.len().min(lows.len()).min(closes.len());
    if period == 0 || n < period {
        return StochasticSeries::default();
    }

    let mut k = Vec::with_capacity(n - period + 1);
    for i in (period - 1)..n {
        let window = (i + 1 - period)..=i;
        let highest = highs[window.clone()]
            .iter()
            .fold(f64::MIN, |acc, &v| acc.max(v));
        let lowest = lows[window].iter().fold(f64::MAX, |acc, &v| acc.min(v));
        let range = highest - lowest;
        if range == 0.0 {
            // Flat window; center rather than divide by zero
            k.push(50.0);
        } else {
            k.push(100.0 * (closes[i] - lowest) / range);
        }
    }

    let d = sma(&k, signal_period);
    StochasticSeries { k, d }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Run every indicator pass over a series and collect the latest values.
/// Returns None when the series is too short for any pass to produce a value.
pub fn compute_snapshot(
    series: &CandleSeries,
    config: &IndicatorConfig,
) -> Option<IndicatorSnapshot> {
    let closes = series.closes();

    let rsi_series = rsi(closes, config.rsi_len);
    let macd_series = macd(closes, config.macd_fast, config.macd_slow, config.macd_sig);
    let atr_series = atr(series.highs(), series.lows(), closes, config.atr_len);
    let obv_series = obv(closes, series.volumes());
    let stoch = stochastic(
        series.highs(),
        series.lows(),
        closes,
        config.stoch_period,
        config.stoch_signal,
    );
    let ema_series = ema(closes, config.ema_period);

    if obv_series.len() < 2 {
        return None;
    }

    Some(IndicatorSnapshot {
        rsi: *rsi_series.last()?,
        macd_histogram: macd_series.last()?.histogram,
        atr: *atr_series.last()?,
        obv: obv_series[obv_series.len() - 1],
        obv_prev: obv_series[obv_series.len() - 2],
        stoch_k: *stoch.k.last()?,
        stoch_d: *stoch.d.last()?,
        ema: *ema_series.last()?,
    })
}
