//! Custom momentum score: a linearly weighted moving average of rolling
//! z-scores over closes.

/// Rolling z-score `(x - mean) / stdev` over `window` points, using the
/// sample standard deviation. The first `window - 1` entries are `None`.
/// A flat window (zero deviation) yields a non-finite value.
pub fn rolling_zscores(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window < 2 {
        return vec![None; values.len()];
    }

    values
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let mean = slice.iter().sum::<f64>() / window as f64;
            let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (window - 1) as f64;
            Some((x - mean) / var.sqrt())
        })
        .collect()
}

/// Weighted average of the last `period` values with weights `1..=period`
/// (heaviest on the most recent). `None` if any of them is missing.
pub fn weighted_moving_average(values: &[Option<f64>], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    let weight_sum = (period * (period + 1) / 2) as f64;

    let mut acc = 0.0;
    for (k, v) in tail.iter().enumerate() {
        acc += (*v)? * (k + 1) as f64;
    }
    Some(acc / weight_sum)
}

/// Bars needed before the latest weighted z-score exists.
pub fn min_bars(window: usize, period: usize) -> usize {
    window + period - 1
}

/// Latest weighted z-score of `closes`, or `None` when there are too few
/// bars or the value is not finite.
pub fn latest_weighted_zscore(closes: &[f64], window: usize, period: usize) -> Option<f64> {
    if closes.len() < min_bars(window, period) {
        return None;
    }
    let z = rolling_zscores(closes, window);
    weighted_moving_average(&z, period).filter(|v| v.is_finite())
}
