// End-to-End Signal Flow Tests for Signal Pulse
//
// These tests exercise the full signal pipeline without network connections:
//   Raw kline JSON → Layer 2 (CandleSeries → indicators/pivots) →
//   Layer 3 (SignalEngine → Signal) → raw ticker JSON → tracking state
//
// Run with: cargo test --test signal_flow_test

use serde_json::Value;

use signal_pulse::core::{Direction, EngineConfig};
use signal_pulse::layer1::parse_ticker_message;
use signal_pulse::layer2::{parse_kline_rows, CandleSeries, SeriesError};
use signal_pulse::layer3::{tracking_state, SignalEngine};

// ============================================================================
// Helpers
// ============================================================================

fn engine() -> SignalEngine {
    SignalEngine::new(EngineConfig::default()).expect("default config should build an engine")
}

/// Build one REST kline row the way `/api/v3/klines` returns it: open time as
/// an integer, OHLCV as strings, followed by fields the parser ignores.
fn make_kline_row(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> String {
    format!(
        r#"[{t},"{o}","{h}","{l}","{c}","{v}",{tc},"0.0",12,"0.0","0.0","0"]"#,
        t = open_time,
        o = open,
        h = high,
        l = low,
        c = close,
        v = volume,
        tc = open_time + 59_999,
    )
}

fn make_kline_payload(rows: &[String]) -> Value {
    serde_json::from_str(&format!("[{}]", rows.join(","))).expect("rows should form valid JSON")
}

/// Sixty candles: a straight decline into a trough at 109, then a two-up
/// one-down recovery that closes at 131 with every oscillator onside.
fn recovery_payload() -> Value {
    let mut rows = Vec::new();
    let mut close = 130.0;
    for i in 0..60 {
        if i <= 20 {
            close = 130.0 - i as f64;
        } else {
            close += if i % 2 == 1 { 2.0 } else { -1.0 };
        }
        rows.push(make_kline_row(
            i as i64 * 60_000,
            close,
            close + 1.0,
            close - 1.0,
            close,
            100.0,
        ));
    }
    make_kline_payload(&rows)
}

/// Build a raw 24hrTicker event as the combined-stream socket delivers it.
fn make_ticker_json(symbol: &str, last_price: f64, change_pct: f64) -> String {
    format!(
        r#"{{"e":"24hrTicker","E":1700000000000,"s":"{s}","p":"1.50","P":"{pc}","w":"0","o":"0","h":"0","l":"0","c":"{c}","v":"0","q":"0","O":0,"C":0,"F":0,"L":0,"n":42}}"#,
        s = symbol,
        pc = change_pct,
        c = last_price,
    )
}

// ============================================================================
// TEST 1 – Layer 2: raw kline payload parses into a candle series
// ============================================================================

#[test]
fn test_kline_payload_parses_into_series() {
    let payload = make_kline_payload(&[
        make_kline_row(1_000, 100.0, 105.0, 99.0, 104.0, 12.5),
        make_kline_row(61_000, 104.0, 108.0, 103.0, 107.5, 9.0),
    ]);

    let series = parse_kline_rows(&payload).expect("payload should parse");
    assert_eq!(series.len(), 2);
    assert_eq!(series.open_times()[0], 1_000);
    assert!((series.opens()[0] - 100.0).abs() < 1e-12);
    assert!((series.highs()[1] - 108.0).abs() < 1e-12);
    assert!((series.lows()[0] - 99.0).abs() < 1e-12);
    assert_eq!(series.last_close(), Some(107.5));
    assert!((series.volumes()[1] - 9.0).abs() < 1e-12);
}

#[test]
fn test_kline_payload_with_bad_row_is_rejected() {
    let payload: Value = serde_json::from_str(
        r#"[[1000,"100.0","105.0","99.0","not-a-price","12.5",60999,"0",1,"0","0","0"]]"#,
    )
    .expect("literal should be valid JSON");

    let err = parse_kline_rows(&payload).expect_err("bad close should fail");
    match err {
        SeriesError::InvalidRow { index, message } => {
            assert_eq!(index, 0);
            assert!(message.contains("close"), "message should name the field: {}", message);
        }
        other => panic!("Expected InvalidRow, got {:?}", other),
    }
}

// ============================================================================
// TEST 2 – Full flow: kline JSON → series → Long signal with risk brackets
// ============================================================================

#[test]
fn test_recovery_payload_produces_long_signal() {
    let series = parse_kline_rows(&recovery_payload()).expect("payload should parse");
    assert_eq!(series.len(), 60);

    let signal = engine().evaluate_series("BTCUSDT", "4h", &series);

    assert_eq!(signal.direction, Direction::Long);
    assert_eq!(signal.symbol, "BTCUSDT");
    assert_eq!(signal.timeframe, "4h");
    assert!(signal.is_actionable());
    assert!(signal.confidence > 50 && signal.confidence <= 100);
    assert_eq!(signal.entry_price, 131.0);

    let target = signal.target_price.expect("Long signal carries a target");
    let stop = signal.stop_loss_price.expect("Long signal carries a stop");
    assert!(stop < signal.entry_price && signal.entry_price < target);

    // Target sits 1.5 ATR above entry, stop 0.75 ATR below
    let reward = target - signal.entry_price;
    let risk = signal.entry_price - stop;
    assert!((reward - 2.0 * risk).abs() < 1e-9);
}

// ============================================================================
// TEST 3 – Insufficient history downgrades to a neutral signal
// ============================================================================

#[test]
fn test_short_history_payload_is_neutral() {
    let rows: Vec<String> = (0..10)
        .map(|i| {
            let close = 50.0 + i as f64;
            make_kline_row(i * 60_000, close, close + 0.5, close - 0.5, close, 5.0)
        })
        .collect();
    let series = parse_kline_rows(&make_kline_payload(&rows)).expect("payload should parse");

    let signal = engine().evaluate_series("DOGEUSDT", "1h", &series);

    assert_eq!(signal.direction, Direction::Neutral);
    assert!(!signal.is_actionable());
    assert_eq!(signal.entry_price, 59.0, "entry falls back to the last close");
    assert!(signal.target_price.is_none());
    assert!(signal.stop_loss_price.is_none());
    assert_eq!(signal.confidence, 50);
}

// ============================================================================
// TEST 4 – Layer 1: raw ticker event parses into a TickerUpdate
// ============================================================================

#[test]
fn test_ticker_event_parses() {
    let json = make_ticker_json("BTCUSDT", 64_250.5, -2.35);

    let tick = parse_ticker_message(&json).expect("ticker should parse");
    assert_eq!(tick.symbol, "BTCUSDT");
    assert!((tick.last_price - 64_250.5).abs() < 1e-9);
    assert!((tick.change_24h_percent - (-2.35)).abs() < 1e-9);
    assert_eq!(tick.event_time, 1_700_000_000_000);
}

// ============================================================================
// TEST 5 – Signal + ticks: tracking state follows the live price
// ============================================================================

#[test]
fn test_long_signal_tracking_through_tick_sequence() {
    let series = parse_kline_rows(&recovery_payload()).expect("payload should parse");
    let signal = engine().evaluate_series("BTCUSDT", "4h", &series);
    assert_eq!(signal.direction, Direction::Long);

    let entry = signal.entry_price;
    let target = signal.target_price.expect("target");
    let stop = signal.stop_loss_price.expect("stop");

    // Tick 1: price slips below entry. Progress floors at zero, pnl negative.
    let tick = parse_ticker_message(&make_ticker_json("BTCUSDT", stop, -1.8))
        .expect("ticker should parse");
    let state = tracking_state(&signal, tick.last_price, tick.change_24h_percent);
    assert_eq!(state.progress_to_target_percent, 0.0);
    assert!(state.pnl_percent < 0.0);
    assert!((state.pnl_value - (stop - entry)).abs() < 1e-9);
    assert!((state.change_24h_percent - (-1.8)).abs() < 1e-9);

    // Tick 2: halfway to target.
    let halfway = entry + (target - entry) / 2.0;
    let tick = parse_ticker_message(&make_ticker_json("BTCUSDT", halfway, 0.9))
        .expect("ticker should parse");
    let state = tracking_state(&signal, tick.last_price, tick.change_24h_percent);
    assert!((state.progress_to_target_percent - 50.0).abs() < 1e-9);
    assert!(state.pnl_percent > 0.0);

    // Tick 3: price blows through the target. Progress pins at 100.
    let beyond = target + (target - entry);
    let tick = parse_ticker_message(&make_ticker_json("BTCUSDT", beyond, 4.2))
        .expect("ticker should parse");
    let state = tracking_state(&signal, tick.last_price, tick.change_24h_percent);
    assert_eq!(state.progress_to_target_percent, 100.0);
    assert!((state.pnl_value - (beyond - entry)).abs() < 1e-9);
    assert_eq!(state.symbol, "BTCUSDT");
    assert!((state.live_price - beyond).abs() < 1e-9);
}

#[test]
fn test_short_signal_tracking_gains_as_price_falls() {
    use signal_pulse::core::Signal;

    let signal = Signal::new(
        "ETHUSDT".to_string(),
        Direction::Short,
        100.0,
        Some(94.0),
        Some(103.0),
        70,
        "4h".to_string(),
        0,
    );

    let tick = parse_ticker_message(&make_ticker_json("ETHUSDT", 97.0, -3.0))
        .expect("ticker should parse");
    let state = tracking_state(&signal, tick.last_price, tick.change_24h_percent);

    assert!((state.progress_to_target_percent - 50.0).abs() < 1e-9);
    assert!((state.pnl_percent - 3.0).abs() < 1e-9, "short pnl gains as price falls");
    assert!((state.pnl_value - 3.0).abs() < 1e-9);
}

// ============================================================================
// TEST 6 – Determinism: same payload, same signal
// ============================================================================

#[test]
fn test_same_payload_yields_identical_signal() {
    let eng = engine();
    let first_series = parse_kline_rows(&recovery_payload()).expect("payload should parse");
    let second_series = parse_kline_rows(&recovery_payload()).expect("payload should parse");

    let first = eng.evaluate_series("SOLUSDT", "1d", &first_series);
    let second = eng.evaluate_series("SOLUSDT", "1d", &second_series);

    assert_eq!(first.direction, second.direction);
    assert_eq!(first.entry_price, second.entry_price);
    assert_eq!(first.target_price, second.target_price);
    assert_eq!(first.stop_loss_price, second.stop_loss_price);
    assert_eq!(first.confidence, second.confidence);
}

// ============================================================================
// TEST 7 – Series accessors survive the JSON round trip
// ============================================================================

#[test]
fn test_series_candle_accessor_matches_rows() {
    let payload = make_kline_payload(&[
        make_kline_row(0, 10.0, 12.0, 9.0, 11.0, 3.0),
        make_kline_row(60_000, 11.0, 13.0, 10.5, 12.5, 4.0),
    ]);
    let series = parse_kline_rows(&payload).expect("payload should parse");

    let candle = series.candle(1).expect("index 1 exists");
    assert_eq!(candle.open_time, 60_000);
    assert!((candle.open - 11.0).abs() < 1e-12);
    assert!((candle.close - 12.5).abs() < 1e-12);
    assert!(series.candle(2).is_none());

    let empty = CandleSeries::new();
    assert!(empty.is_empty());
    assert_eq!(empty.last_close(), None);
}
