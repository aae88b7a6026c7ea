//! Coarse-grained table of observed vs. forecast mid-price per bucket.

use std::collections::BTreeMap;

/// One row of the forecast table, keyed by coarse bucket tick.
#[derive(Copy, Clone, Debug, Default)]
pub struct ForecastRow {
    pub mid_price: f64,
    pub forecast_mid_price: f64,
    pub used_in_training: bool,
}

impl ForecastRow {
    fn empty() -> Self {
        Self {
            mid_price: f64::NAN,
            forecast_mid_price: f64::NAN,
            used_in_training: false,
        }
    }

    pub fn forecast_error(&self) -> f64 {
        (self.forecast_mid_price - self.mid_price).abs()
    }
}

/// Bounded table of forecast rows on the coarse sample grid.
#[derive(Clone, Debug, Default)]
pub struct ForecastTable {
    rows: BTreeMap<i64, ForecastRow>,
    interval_ms: i64,
}

impl ForecastTable {
    pub fn new(interval_ms: i64) -> Self {
        assert!(interval_ms > 0, "forecast sample interval must be positive");
        Self {
            rows: BTreeMap::new(),
            interval_ms,
        }
    }

    /// Record the mean observed mid-price for a newly-closed coarse
    /// bucket. The row is marked not-yet-used-in-training.
    pub fn close_bucket(&mut self, bucket: i64, mean_mid_price: f64) {
        let row = self.rows.entry(bucket).or_insert_with(ForecastRow::empty);
        row.mid_price = mean_mid_price;
        row.used_in_training = false;
    }

    /// Rows closed but not yet fed to the forecaster, oldest first.
    pub fn untrained_rows(&self) -> Vec<(i64, f64)> {
        self.rows
            .iter()
            .filter(|(_, row)| !row.used_in_training && !row.mid_price.is_nan())
            .map(|(&bucket, row)| (bucket, row.mid_price))
            .collect()
    }

    pub fn mark_trained(&mut self, buckets: &[i64]) {
        for bucket in buckets {
            if let Some(row) = self.rows.get_mut(bucket) {
                row.used_in_training = true;
            }
        }
    }

    /// All observed `mid_price` values in chronological order, used as
    /// the training snapshot handed to a full refit.
    pub fn observed_series(&self) -> Vec<f64> {
        self.rows
            .values()
            .filter(|row| !row.mid_price.is_nan())
            .map(|row| row.mid_price)
            .collect()
    }

    /// Write a forecast value for `bucket`, computing `forecast_error`
    /// immediately if the bucket's `mid_price` is already known.
    pub fn set_forecast(&mut self, bucket: i64, forecast_mid_price: f64) {
        let row = self.rows.entry(bucket).or_insert_with(ForecastRow::empty);
        row.forecast_mid_price = forecast_mid_price;
    }

    /// `forecast_mid_price` of the most recent row, or NaN if empty.
    pub fn last_forecast(&self) -> f64 {
        self.rows
            .values()
            .next_back()
            .map(|row| row.forecast_mid_price)
            .unwrap_or(f64::NAN)
    }

    /// Mean `forecast_error` over the trailing window, among rows whose
    /// `mid_price` is known, skipping NaN errors.
    ///
    /// Anchored at the last bucket with a *known* `mid_price`, not the
    /// last row in the table — the table also carries future rows
    /// written by `set_forecast` for buckets that haven't closed yet,
    /// and those would otherwise pull the whole window into the future.
    pub fn windowed_error_mean(&self, window_ms: i64) -> f64 {
        let Some((&last_bucket, _)) = self
            .rows
            .iter()
            .filter(|(_, row)| !row.mid_price.is_nan())
            .next_back()
        else {
            return f64::NAN;
        };
        let window_buckets = (window_ms / self.interval_ms).max(1);
        let cutoff = last_bucket - window_buckets;

        let mut sum = 0.0;
        let mut count = 0u64;
        for (&bucket, row) in self.rows.range((cutoff + 1)..=last_bucket) {
            if row.mid_price.is_nan() {
                continue;
            }
            let err = row.forecast_error();
            if !err.is_nan() {
                sum += err;
                count += 1;
            }
            let _ = bucket;
        }
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }

    pub fn trim_before(&mut self, cutoff_bucket: i64) {
        let keep_from = cutoff_bucket;
        self.rows = self.rows.split_off(&keep_from);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_bucket_marks_untrained() {
        let mut table = ForecastTable::new(6_000);
        table.close_bucket(0, 100.0);
        table.close_bucket(1, 101.0);
        assert_eq!(table.untrained_rows(), vec![(0, 100.0), (1, 101.0)]);
    }

    #[test]
    fn mark_trained_removes_rows_from_untrained_set() {
        let mut table = ForecastTable::new(6_000);
        table.close_bucket(0, 100.0);
        table.mark_trained(&[0]);
        assert!(table.untrained_rows().is_empty());
    }

    #[test]
    fn forecast_error_computed_once_observed() {
        let mut table = ForecastTable::new(6_000);
        table.set_forecast(5, 10.0);
        table.close_bucket(5, 11.0);
        let row = table.rows[&5];
        assert_eq!(row.forecast_error(), 1.0);
    }

    #[test]
    fn last_forecast_nan_when_empty() {
        let table = ForecastTable::new(6_000);
        assert!(table.last_forecast().is_nan());
    }

    #[test]
    fn trim_before_drops_old_buckets() {
        let mut table = ForecastTable::new(6_000);
        for b in 0..5 {
            table.close_bucket(b, b as f64);
        }
        table.trim_before(3);
        assert_eq!(table.len(), 2);
    }
}
