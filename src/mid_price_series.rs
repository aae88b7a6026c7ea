//! Bounded, uniformly-sampled mid-price history.
//!
//! Pandas-centric resampling is replaced with an explicit ring of samples:
//! a contiguous, gap-free `VecDeque<(tick, value)>`, one entry per tick on
//! a fixed grid. Because the deque is always gap-free, windowed means and
//! range means reduce to plain slice arithmetic instead of a timestamp
//! lookup.

use std::collections::VecDeque;

/// A uniformly-sampled series of mid-prices on an integer tick grid.
#[derive(Clone, Debug)]
pub struct MidPriceSeries {
    interval_ms: i64,
    samples: VecDeque<(i64, f64)>,
}

fn tick_for(t_ms: i64, interval_ms: i64) -> i64 {
    // Ceiling division: the first grid tick at or after `t_ms`.
    (t_ms + interval_ms - 1).div_euclid(interval_ms)
}

impl MidPriceSeries {
    pub fn new(interval_ms: i64) -> Self {
        assert!(interval_ms > 0, "sample interval must be positive");
        Self {
            interval_ms,
            samples: VecDeque::new(),
        }
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last_tick(&self) -> Option<i64> {
        self.samples.back().map(|&(tick, _)| tick)
    }

    /// Drop all samples at or after `t_ms` (strictly before is retained).
    fn truncate_before(&mut self, t_ms: i64) {
        while let Some(&(tick, _)) = self.samples.back() {
            if tick * self.interval_ms >= t_ms {
                self.samples.pop_back();
            } else {
                break;
            }
        }
    }

    /// Append observation `(t_ms, mid)`, resampling onto the grid.
    ///
    /// If `t_ms` is at or before existing history, that history is
    /// truncated and replaced — this makes re-delivery of a message
    /// idempotent and lets a late update correct the record at its own
    /// timestamp.
    pub fn append(&mut self, t_ms: i64, mid: f64) {
        self.truncate_before(t_ms);

        let target_tick = tick_for(t_ms, self.interval_ms);

        match self.samples.back().copied() {
            None => {
                self.samples.push_back((target_tick, mid));
            }
            Some((last_tick, last_val)) => {
                // Forward-fill every grid tick strictly between the last
                // retained sample and the new one with the last value,
                // then append the new observation itself.
                for tick in (last_tick + 1)..target_tick {
                    self.samples.push_back((tick, last_val));
                }
                self.samples.push_back((target_tick, mid));
            }
        }
    }

    /// Mean of samples in the trailing window ending at the last tick,
    /// skipping NaN entries (an all-NaN window yields NaN).
    ///
    /// The window is inclusive of both endpoints (`[last_tick - window,
    /// last_tick]`), so it spans `window_ticks + 1` samples, not
    /// `window_ticks` — a 60 s window at a 1 s grid covers 61 ticks.
    pub fn windowed_mean(&self, window_ms: i64) -> f64 {
        let window_ticks = (window_ms / self.interval_ms).max(1) as usize + 1;
        let n = self.samples.len().min(window_ticks);
        if n == 0 {
            return f64::NAN;
        }
        let mut sum = 0.0;
        let mut count = 0u64;
        for &(_, val) in self.samples.iter().rev().take(n) {
            if !val.is_nan() {
                sum += val;
                count += 1;
            }
        }
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }

    /// Mean of samples whose tick falls in `[from_tick, to_tick)`,
    /// skipping NaN entries. NaN if the range has no samples.
    pub fn mean_in_range(&self, from_tick: i64, to_tick: i64) -> f64 {
        let Some(&(first_tick, _)) = self.samples.front() else {
            return f64::NAN;
        };
        let len = self.samples.len() as i64;
        let start = (from_tick - first_tick).max(0);
        let end = (to_tick - first_tick).min(len);
        if start >= end {
            return f64::NAN;
        }
        let mut sum = 0.0;
        let mut count = 0u64;
        for i in start..end {
            let val = self.samples[i as usize].1;
            if !val.is_nan() {
                sum += val;
                count += 1;
            }
        }
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }

    /// Drop every sample with tick time strictly before `cutoff_ms`.
    pub fn trim_before(&mut self, cutoff_ms: i64) {
        while let Some(&(tick, _)) = self.samples.front() {
            if tick * self.interval_ms < cutoff_ms {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_single_point_on_first_observation() {
        let mut series = MidPriceSeries::new(1_000);
        series.append(0, 17.05);
        assert_eq!(series.last_tick(), Some(0));
        assert_eq!(series.windowed_mean(60_000), 17.05);
    }

    #[test]
    fn forward_fills_gaps_between_observations() {
        let mut series = MidPriceSeries::new(1_000);
        series.append(0, 10.0);
        series.append(3_000, 20.0);
        // Ticks 0,1,2 forward-filled with 10.0, tick 3 is the new value.
        assert_eq!(series.windowed_mean(4_000), (10.0 * 3.0 + 20.0) / 4.0);
    }

    #[test]
    fn empty_snapshot_then_two_updates() {
        let mut series = MidPriceSeries::new(1_000);
        // Snapshot at T0: both books empty -> mid is NaN.
        series.append(0, f64::NAN);
        // Update at T0+1s: mid = (4 + 10) / 2 = 7.0
        series.append(1_000, 7.0);
        // Update at T0+2s: book emptied -> mid is NaN again.
        series.append(2_000, f64::NAN);

        for window in [60_000, 300_000, 900_000] {
            assert_eq!(series.windowed_mean(window), 7.0, "window {window}");
        }
    }

    #[test]
    fn late_update_replaces_existing_history_idempotently() {
        let mut series = MidPriceSeries::new(1_000);
        series.append(0, 1.0);
        series.append(1_000, 2.0);
        series.append(2_000, 3.0);

        let before = series.clone();
        // Re-delivering the same late update twice must be idempotent.
        series.append(1_000, 2.0);
        series.append(2_000, 3.0);
        assert_eq!(series.last_tick(), before.last_tick());
        assert_eq!(series.windowed_mean(10_000), before.windowed_mean(10_000));
    }

    #[test]
    fn trim_before_drops_old_samples() {
        let mut series = MidPriceSeries::new(1_000);
        for t in 0..10 {
            series.append(t * 1_000, t as f64);
        }
        series.trim_before(5_000);
        assert_eq!(series.samples.front().unwrap().0, 5);
    }

    #[test]
    fn mean_in_range_skips_nan_and_out_of_range() {
        let mut series = MidPriceSeries::new(1_000);
        series.append(0, 1.0);
        series.append(1_000, f64::NAN);
        series.append(2_000, 3.0);
        series.append(3_000, 5.0);

        assert_eq!(series.mean_in_range(0, 3), 2.0); // ticks 0,1,2 -> skip NaN -> mean(1,3)
        assert!(series.mean_in_range(10, 20).is_nan());
    }
}
