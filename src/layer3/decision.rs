// Decision Engine
// Pure rule evaluation over the latest price, pivots, and indicator snapshot

use crate::core::{Direction, IndicatorSnapshot, PivotPoint};

/// RSI must sit strictly inside this band for either direction
pub const RSI_LOWER_BOUND: f64 = 30.0;
pub const RSI_UPPER_BOUND: f64 = 70.0;

/// Evaluate entry conditions for one symbol.
///
/// Long requires all of: price above the last low pivot, RSI inside the
/// band, positive MACD histogram, rising OBV, price above the EMA, and
/// %K above %D. Short mirrors each condition, with OBV flat-or-falling.
/// A missing pivot fails its breakout condition; it is not an error.
pub fn evaluate(
    price: f64,
    last_high_pivot: Option<&PivotPoint>,
    last_low_pivot: Option<&PivotPoint>,
    snapshot: &IndicatorSnapshot,
) -> Direction {
    let rsi_ok = snapshot.rsi > RSI_LOWER_BOUND && snapshot.rsi < RSI_UPPER_BOUND;
    let obv_up = snapshot.obv > snapshot.obv_prev;

    let break_up = last_low_pivot.map_or(false, |pivot| price > pivot.value);
    if break_up
        && rsi_ok
        && snapshot.macd_histogram > 0.0
        && obv_up
        && price > snapshot.ema
        && snapshot.stoch_k > snapshot.stoch_d
    {
        return Direction::Long;
    }

    let break_down = last_high_pivot.map_or(false, |pivot| price < pivot.value);
    if break_down
        && rsi_ok
        && snapshot.macd_histogram < 0.0
        && !obv_up
        && price < snapshot.ema
        && snapshot.stoch_k < snapshot.stoch_d
    {
        return Direction::Short;
    }

    Direction::Neutral
}

/// Confidence score: RSI distance from the neutral line, floored at 50.
/// A ranking aid only, not a probability.
pub fn confidence(rsi: f64) -> u8 {
    let score = (50.0 + (rsi - 50.0).abs()).round();
    score.clamp(50.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PivotKind;

    fn snapshot(
        rsi: f64,
        macd_histogram: f64,
        obv: f64,
        obv_prev: f64,
        stoch_k: f64,
        stoch_d: f64,
        ema: f64,
    ) -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi,
            macd_histogram,
            atr: 2.0,
            obv,
            obv_prev,
            stoch_k,
            stoch_d,
            ema,
        }
    }

    fn low_pivot(value: f64) -> PivotPoint {
        PivotPoint::new(49, value, PivotKind::Low)
    }

    fn high_pivot(value: f64) -> PivotPoint {
        PivotPoint::new(49, value, PivotKind::High)
    }

    #[test]
    fn test_long_when_all_conditions_hold() {
        // Price 160 after a climb from 100, low pivot at 110, RSI 55
        let snap = snapshot(55.0, 0.8, 1000.0, 900.0, 80.0, 70.0, 150.0);
        let direction = evaluate(160.0, None, Some(&low_pivot(110.0)), &snap);
        assert_eq!(direction, Direction::Long);
        assert_eq!(confidence(snap.rsi), 55);
    }

    #[test]
    fn test_short_when_all_conditions_hold() {
        let snap = snapshot(45.0, -0.8, 900.0, 1000.0, 20.0, 30.0, 95.0);
        let direction = evaluate(90.0, Some(&high_pivot(110.0)), None, &snap);
        assert_eq!(direction, Direction::Short);
        assert_eq!(confidence(snap.rsi), 55);
    }

    #[test]
    fn test_missing_pivot_blocks_direction() {
        let long_snap = snapshot(55.0, 0.8, 1000.0, 900.0, 80.0, 70.0, 150.0);
        assert_eq!(evaluate(160.0, None, None, &long_snap), Direction::Neutral);

        let short_snap = snapshot(45.0, -0.8, 900.0, 1000.0, 20.0, 30.0, 95.0);
        assert_eq!(evaluate(90.0, None, None, &short_snap), Direction::Neutral);
    }

    #[test]
    fn test_rsi_band_is_exclusive() {
        let mut snap = snapshot(70.0, 0.8, 1000.0, 900.0, 80.0, 70.0, 150.0);
        let pivot = low_pivot(110.0);
        assert_eq!(evaluate(160.0, None, Some(&pivot), &snap), Direction::Neutral);

        snap.rsi = 30.0;
        assert_eq!(evaluate(160.0, None, Some(&pivot), &snap), Direction::Neutral);

        snap.rsi = 30.01;
        assert_eq!(evaluate(160.0, None, Some(&pivot), &snap), Direction::Long);
    }

    #[test]
    fn test_flat_obv_blocks_long_but_allows_short() {
        let long_snap = snapshot(55.0, 0.8, 1000.0, 1000.0, 80.0, 70.0, 150.0);
        assert_eq!(
            evaluate(160.0, None, Some(&low_pivot(110.0)), &long_snap),
            Direction::Neutral
        );

        let short_snap = snapshot(45.0, -0.8, 1000.0, 1000.0, 20.0, 30.0, 95.0);
        assert_eq!(
            evaluate(90.0, Some(&high_pivot(110.0)), None, &short_snap),
            Direction::Short
        );
    }

    #[test]
    fn test_price_below_pivot_is_not_a_breakout() {
        let snap = snapshot(55.0, 0.8, 1000.0, 900.0, 80.0, 70.0, 100.0);
        assert_eq!(
            evaluate(105.0, None, Some(&low_pivot(110.0)), &snap),
            Direction::Neutral
        );
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let snap = snapshot(55.0, 0.8, 1000.0, 900.0, 80.0, 70.0, 150.0);
        let pivot = low_pivot(110.0);
        let first = evaluate(160.0, None, Some(&pivot), &snap);
        let second = evaluate(160.0, None, Some(&pivot), &snap);
        assert_eq!(first, second);
    }

    #[test]
    fn test_confidence_bounds() {
        assert_eq!(confidence(50.0), 50);
        assert_eq!(confidence(55.0), 55);
        assert_eq!(confidence(45.0), 55);
        assert_eq!(confidence(0.0), 100);
        assert_eq!(confidence(100.0), 100);
        assert_eq!(confidence(62.5), 63);
    }
}
