// Pivot Detection
// Local extrema over a symmetric neighborhood window, most recent first

use crate::core::{PivotKind, PivotPoint};
use crate::layer2::candles::CandleSeries;

/// Find the most recent pivot in a value series.
///
/// Index `i` qualifies when `values[i]` equals the extremum of the window
/// `[i - left, i + right]`, so `i` needs `left` values before it and `right`
/// values after it. Equal extremes within one window all qualify and the
/// highest index wins, which can move the reported pivot abruptly between
/// runs on noisy data. Returns None when the series is shorter than
/// `left + right + 1`.
pub fn find_pivot(
    values: &[f64],
    left: usize,
    right: usize,
    kind: PivotKind,
) -> Option<PivotPoint> {
    if values.len() < left + right + 1 {
        return None;
    }

    let last_eligible = values.len() - 1 - right;
    for i in (left..=last_eligible).rev() {
        let window = &values[i - left..=i + right];
        let qualifies = match kind {
            PivotKind::High => window.iter().all(|&v| v <= values[i]),
            PivotKind::Low => window.iter().all(|&v| v >= values[i]),
        };
        if qualifies {
            return Some(PivotPoint::new(i, values[i], kind));
        }
    }
    None
}

/// Find the most recent pivot in a candle series, reading highs for High
/// pivots and lows for Low pivots.
pub fn find_series_pivot(
    series: &CandleSeries,
    left: usize,
    right: usize,
    kind: PivotKind,
) -> Option<PivotPoint> {
    let values = match kind {
        PivotKind::High => series.highs(),
        PivotKind::Low => series.lows(),
    };
    find_pivot(values, left, right, kind)
}
