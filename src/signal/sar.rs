//! Parabolic Stop-and-Reverse.
//!
//! Wilder's trailing stop: while a trend persists the stop moves toward the
//! extreme point (EP) by an acceleration factor that grows by `step` on every
//! new extreme, capped at `max_step`. When price crosses the stop the trend
//! flips and the stop jumps to the prior EP.
//!
//! Seeding follows the common dataframe convention: the stop starts at the
//! first close and the initial direction comes from the first two bars'
//! directional movement.

/// Direction of the trend the stop is trailing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    /// Stop sits below price (long).
    Rising,
    /// Stop sits above price (short).
    Falling,
}

/// SAR value of a single bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SarPoint {
    pub value: f64,
    pub trend: Trend,
}

/// Bars needed before the first stop value exists.
pub const MIN_BARS: usize = 2;

/// Compute the stop for every bar from index 1 onward.
///
/// Returns `None` when the slices disagree in length, hold fewer than
/// [`MIN_BARS`] bars, or contain a non-finite high/low/first close.
pub fn parabolic_sar_series(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    step: f64,
    max_step: f64,
) -> Option<Vec<SarPoint>> {
    let n = high.len();
    if n < MIN_BARS || low.len() != n || close.len() != n {
        return None;
    }
    if !close[0].is_finite() || high.iter().chain(low.iter()).any(|v| !v.is_finite()) {
        return None;
    }

    let up_move = high[1] - high[0];
    let down_move = low[0] - low[1];
    let mut trend = if down_move > up_move && down_move > 0.0 {
        Trend::Falling
    } else {
        Trend::Rising
    };

    let mut extreme = match trend {
        Trend::Falling => low[0],
        Trend::Rising => high[0],
    };
    let mut sar = close[0];
    let mut af = step;
    let mut points = Vec::with_capacity(n - 1);

    for i in 1..n {
        let prev = i - 1;
        let prev2 = i.saturating_sub(2);
        let mut next = sar + af * (extreme - sar);

        let reverse = match trend {
            Trend::Falling => {
                let reverse = high[i] > next;
                if low[i] < extreme {
                    extreme = low[i];
                    af = (af + step).min(max_step);
                }
                next = next.max(high[prev]).max(high[prev2]);
                reverse
            }
            Trend::Rising => {
                let reverse = low[i] < next;
                if high[i] > extreme {
                    extreme = high[i];
                    af = (af + step).min(max_step);
                }
                next = next.min(low[prev]).min(low[prev2]);
                reverse
            }
        };

        if reverse {
            next = extreme;
            af = step;
            trend = match trend {
                Trend::Falling => Trend::Rising,
                Trend::Rising => Trend::Falling,
            };
            extreme = match trend {
                Trend::Falling => low[i],
                Trend::Rising => high[i],
            };
        }

        sar = next;
        points.push(SarPoint { value: sar, trend });
    }

    Some(points)
}

/// Stop value of the most recent bar.
pub fn latest_sar(high: &[f64], low: &[f64], close: &[f64], step: f64, max_step: f64) -> Option<SarPoint> {
    parabolic_sar_series(high, low, close, step, max_step)?.last().copied()
}
