//! Orchestrator: coordinates both `PriceBook`s, the `MidPriceSeries`, the
//! `ForecastTable`, and the `Forecaster` behind one coherent update
//! pipeline driven from a single ingest thread.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Error;
use crate::forecast_table::ForecastTable;
use crate::forecaster::{Forecaster, ModelParams, SeasonalMeanModel, SeasonalModel};
use crate::messages::{L2Update, Snapshot};
use crate::mid_price_series::MidPriceSeries;
use crate::price_book::{Order, PriceBook, Side};

/// Widest observed spread since the engine started, and when it was
/// first observed. Never decremented.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BidAskDiff {
    pub highest_bid_price: f64,
    pub lowest_ask_price: f64,
    pub observed_at: i64,
}

impl BidAskDiff {
    pub fn diff(&self) -> f64 {
        self.lowest_ask_price - self.highest_bid_price
    }
}

/// Immutable statistics snapshot returned by `OrderBook::get_stats`.
#[derive(Clone, Debug)]
pub struct OrderBookStats {
    pub current_highest_bid: Order,
    pub current_lowest_ask: Order,
    pub max_ask_bid_diff: BidAskDiff,
    pub forecasted_mid_price: f64,
    /// window (seconds) -> mean mid-price
    pub mid_prices: BTreeMap<i64, f64>,
    /// window (seconds) -> mean forecast error
    pub forecast_errors: BTreeMap<i64, f64>,
}

/// Tunable engine configuration, defaults matching the Coinbase-derived
/// source this was ported from.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub sample_interval_ms: i64,
    pub forecast_window_ms: i64,
    pub seasonality_m: u32,
    pub windows_ms: Vec<i64>,
    pub max_window_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let windows_ms = vec![60_000, 300_000, 900_000];
        Self {
            sample_interval_ms: 50,
            forecast_window_ms: 60_000,
            seasonality_m: 10,
            max_window_ms: *windows_ms.iter().max().unwrap(),
            windows_ms,
        }
    }
}

impl EngineConfig {
    fn forecast_interval_ms(&self) -> i64 {
        self.forecast_window_ms / self.seasonality_m as i64
    }

    fn forecast_horizon(&self) -> usize {
        self.forecast_window_ms
            .div_ceil(self.forecast_interval_ms()) as usize
    }
}

fn coarse_bucket(t_ms: i64, interval_ms: i64) -> i64 {
    t_ms.div_euclid(interval_ms)
}

/// The order-book engine for a single product.
pub struct OrderBook<M: SeasonalModel + Default + Send + 'static = SeasonalMeanModel> {
    bids: PriceBook,
    asks: PriceBook,
    last_update_ms: i64,
    max_ask_bid_diff: BidAskDiff,
    mid_prices: MidPriceSeries,
    forecast_table: ForecastTable,
    forecaster: Arc<Forecaster<M>>,
    next_open_bucket: i64,
    config: EngineConfig,
}

impl<M: SeasonalModel + Default + Send + 'static> OrderBook<M> {
    /// Build a fresh engine from an initial snapshot.
    pub fn from_snapshot(snapshot: Snapshot, config: EngineConfig) -> Self {
        let mut bids = PriceBook::new(Side::Bid);
        let mut asks = PriceBook::new(Side::Ask);
        for (price, qty) in &snapshot.bids {
            bids.insert(*price, *qty);
        }
        for (price, qty) in &snapshot.asks {
            asks.insert(*price, *qty);
        }

        let params = ModelParams {
            seasonality: config.seasonality_m,
            ..ModelParams::default()
        };
        let forecast_interval_ms = config.forecast_interval_ms();

        let mut engine = Self {
            bids,
            asks,
            last_update_ms: snapshot.time_ms,
            max_ask_bid_diff: BidAskDiff {
                highest_bid_price: f64::NAN,
                lowest_ask_price: f64::NAN,
                observed_at: snapshot.time_ms,
            },
            mid_prices: MidPriceSeries::new(config.sample_interval_ms),
            forecast_table: ForecastTable::new(forecast_interval_ms),
            forecaster: Arc::new(Forecaster::new(params)),
            next_open_bucket: coarse_bucket(snapshot.time_ms, forecast_interval_ms),
            config,
        };
        engine.run_pipeline(snapshot.time_ms);
        engine
    }

    /// Apply an incremental update.
    ///
    /// `last_update` (the engine's notion of "now", used for the spread
    /// timestamp and for trimming bounded history) never regresses. A
    /// late update's own timestamp is still passed through to
    /// `MidPriceSeries::append`, so it can replace history at that
    /// earlier point without moving "now" backwards.
    pub fn apply_update(&mut self, update: L2Update) -> Result<(), Error> {
        for change in &update.changes {
            match change.side {
                Side::Bid => self.bids.insert(change.price, change.quantity),
                Side::Ask => self.asks.insert(change.price, change.quantity),
            }
        }
        self.last_update_ms = self.last_update_ms.max(update.time_ms);
        self.run_pipeline(update.time_ms);
        Ok(())
    }

    fn run_pipeline(&mut self, event_ms: i64) {
        // 1 & 2: new diff, monotonic maximum.
        let bid = self.bids.best();
        let ask = self.asks.best();
        let diff = BidAskDiff {
            highest_bid_price: bid.price_level,
            lowest_ask_price: ask.price_level,
            observed_at: self.last_update_ms,
        };
        if diff.diff() > self.max_ask_bid_diff.diff() || self.max_ask_bid_diff.diff().is_nan() {
            self.max_ask_bid_diff = diff;
        }

        // 3: append to the mid-price series.
        let mid = (bid.price_level + ask.price_level) / 2.0;
        self.mid_prices.append(event_ms, mid);

        // 4: close any coarse buckets that have now fully elapsed.
        let forecast_interval_ms = self.config.forecast_interval_ms();
        let current_bucket = coarse_bucket(self.last_update_ms, forecast_interval_ms);
        let mut newly_closed = Vec::new();
        while self.next_open_bucket < current_bucket {
            let bucket = self.next_open_bucket;
            let from_tick = bucket * forecast_interval_ms / self.mid_prices.interval_ms();
            let to_tick = (bucket + 1) * forecast_interval_ms / self.mid_prices.interval_ms();
            let mean = self.mid_prices.mean_in_range(from_tick, to_tick);
            self.forecast_table.close_bucket(bucket, mean);
            newly_closed.push(bucket);
            self.next_open_bucket += 1;
        }

        // 5: feed the forecaster (synchronous update, or schedule refit).
        if !newly_closed.is_empty() {
            let untrained = self.forecast_table.untrained_rows();
            let observations: Vec<f64> = untrained.iter().map(|&(_, v)| v).collect();
            let buckets: Vec<i64> = untrained.iter().map(|&(b, _)| b).collect();
            if !observations.is_empty() {
                let table = self.forecast_table.clone();
                self.forecaster
                    .ingest(&observations, current_bucket - 1, move || table.observed_series());
                self.forecast_table.mark_trained(&buckets);
            }
        }

        // 6: materialize the forecast for whichever model is currently
        // installed, even if a refit is in flight (it always runs).
        let horizon = self.config.forecast_horizon();
        if let Some((anchor_bucket, values)) = self.forecaster.current_forecast(horizon) {
            for (k, value) in values.into_iter().enumerate() {
                self.forecast_table
                    .set_forecast(anchor_bucket + 1 + k as i64, value);
            }
        }

        // 7: free bounded-history tails.
        let cutoff_ms = self.last_update_ms - self.config.max_window_ms - self.config.sample_interval_ms;
        self.mid_prices.trim_before(cutoff_ms);
        let cutoff_bucket = coarse_bucket(cutoff_ms, forecast_interval_ms);
        self.forecast_table.trim_before(cutoff_bucket);
    }

    /// A consistent statistics snapshot across all sub-components.
    pub fn get_stats(&self) -> OrderBookStats {
        let mid_prices = self
            .config
            .windows_ms
            .iter()
            .map(|&w| (w / 1_000, self.mid_prices.windowed_mean(w)))
            .collect();
        let forecast_errors = self
            .config
            .windows_ms
            .iter()
            .map(|&w| (w / 1_000, self.forecast_table.windowed_error_mean(w)))
            .collect();

        OrderBookStats {
            current_highest_bid: self.bids.best(),
            current_lowest_ask: self.asks.best(),
            max_ask_bid_diff: self.max_ask_bid_diff,
            forecasted_mid_price: self.forecast_table.last_forecast(),
            mid_prices,
            forecast_errors,
        }
    }

    /// Deep copies of both sides, safe for callers to hold independently.
    pub fn take_snapshot(&self) -> (PriceBook, PriceBook) {
        (self.bids.clone(), self.asks.clone())
    }

    pub fn last_update_ms(&self) -> i64 {
        self.last_update_ms
    }

    pub fn await_forecaster_idle(&self, timeout: std::time::Duration) -> bool {
        self.forecaster.await_idle(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Change;

    fn config_1s_samples() -> EngineConfig {
        EngineConfig {
            sample_interval_ms: 1_000,
            ..EngineConfig::default()
        }
    }

    fn snapshot_at(time_ms: i64, bids: Vec<(f64, f64)>, asks: Vec<(f64, f64)>) -> Snapshot {
        Snapshot {
            product_id: "BTC-USD".into(),
            bids,
            asks,
            time_ms,
        }
    }

    #[test]
    fn snapshot_alone_yields_expected_books_and_mid_price() {
        let snapshot = snapshot_at(
            0,
            vec![(10.0, 1.1), (2.1, 2.0), (3.5, 0.0), (14.0, 14.0)],
            vec![(100.0, 10.1), (20.1, 20.0), (30.5, 0.0), (400.0, 400.0)],
        );
        let engine: OrderBook = OrderBook::from_snapshot(snapshot, config_1s_samples());
        let stats = engine.get_stats();

        assert_eq!(stats.current_highest_bid, Order { price_level: 14.0, quantity: 14.0 });
        assert_eq!(stats.current_lowest_ask, Order { price_level: 20.1, quantity: 20.0 });
        assert!((stats.max_ask_bid_diff.diff() - 6.1).abs() < 1e-9);
        for (_, mid) in &stats.mid_prices {
            assert!((mid - 17.05).abs() < 1e-9);
        }
        assert!(stats.forecasted_mid_price.is_nan());
    }

    #[test]
    fn empty_snapshot_then_zeroing_updates() {
        let snapshot = snapshot_at(0, vec![], vec![]);
        let mut engine: OrderBook = OrderBook::from_snapshot(snapshot, config_1s_samples());

        engine
            .apply_update(L2Update {
                product_id: "BTC-USD".into(),
                time_ms: 1_000,
                changes: vec![
                    Change { side: Side::Ask, price: 10.0, quantity: 1.0 },
                    Change { side: Side::Bid, price: 2.0, quantity: 0.2 },
                    Change { side: Side::Ask, price: 13.3, quantity: 3.0 },
                    Change { side: Side::Bid, price: 4.0, quantity: 4.0 },
                ],
            })
            .unwrap();

        engine
            .apply_update(L2Update {
                product_id: "BTC-USD".into(),
                time_ms: 2_000,
                changes: vec![
                    Change { side: Side::Ask, price: 10.0, quantity: 0.0 },
                    Change { side: Side::Bid, price: 2.0, quantity: 0.0 },
                    Change { side: Side::Ask, price: 13.3, quantity: 0.0 },
                    Change { side: Side::Bid, price: 4.0, quantity: 0.0 },
                ],
            })
            .unwrap();

        let stats = engine.get_stats();
        assert!(stats.current_highest_bid.price_level.is_nan());
        assert!(stats.current_lowest_ask.price_level.is_nan());
        assert_eq!(stats.max_ask_bid_diff.highest_bid_price, 4.0);
        assert_eq!(stats.max_ask_bid_diff.lowest_ask_price, 10.0);
        assert_eq!(stats.max_ask_bid_diff.observed_at, 1_000);
        for (_, mid) in &stats.mid_prices {
            assert!((mid - 7.0).abs() < 1e-9, "expected 7.0, got {mid}");
        }
    }

    #[test]
    fn max_spread_never_decreases() {
        let snapshot = snapshot_at(0, vec![(10.0, 1.0)], vec![(20.0, 1.0)]);
        let mut engine: OrderBook = OrderBook::from_snapshot(snapshot, config_1s_samples());
        let first_diff = engine.get_stats().max_ask_bid_diff.diff();

        // Narrow the spread: max must not shrink.
        engine
            .apply_update(L2Update {
                product_id: "BTC-USD".into(),
                time_ms: 1_000,
                changes: vec![Change { side: Side::Bid, price: 19.0, quantity: 1.0 }],
            })
            .unwrap();
        assert_eq!(engine.get_stats().max_ask_bid_diff.diff(), first_diff);

        // Widen it further: max must grow.
        engine
            .apply_update(L2Update {
                product_id: "BTC-USD".into(),
                time_ms: 2_000,
                changes: vec![Change { side: Side::Bid, price: 1.0, quantity: 1.0 }],
            })
            .unwrap();
        assert!(engine.get_stats().max_ask_bid_diff.diff() > first_diff);
    }

    #[test]
    fn last_update_does_not_regress_on_a_late_update() {
        let snapshot = snapshot_at(10_000, vec![(10.0, 1.0)], vec![(20.0, 1.0)]);
        let mut engine: OrderBook = OrderBook::from_snapshot(snapshot, config_1s_samples());
        let before = engine.last_update_ms();

        engine
            .apply_update(L2Update {
                product_id: "BTC-USD".into(),
                time_ms: before - 1_000,
                changes: vec![Change { side: Side::Bid, price: 11.0, quantity: 1.0 }],
            })
            .unwrap();

        assert_eq!(engine.last_update_ms(), before);
    }

    #[test]
    fn idempotent_reapplication_of_the_same_update() {
        let snapshot = snapshot_at(0, vec![(10.0, 1.0)], vec![(20.0, 1.0)]);
        let mut engine: OrderBook = OrderBook::from_snapshot(snapshot, config_1s_samples());
        let update = L2Update {
            product_id: "BTC-USD".into(),
            time_ms: 1_000,
            changes: vec![Change { side: Side::Bid, price: 12.0, quantity: 2.0 }],
        };
        engine.apply_update(update.clone()).unwrap();
        let stats_once = engine.get_stats();
        engine.apply_update(update).unwrap();
        let stats_twice = engine.get_stats();

        assert_eq!(stats_once.current_highest_bid, stats_twice.current_highest_bid);
        assert_eq!(stats_once.mid_prices, stats_twice.mid_prices);
    }

    #[test]
    fn take_snapshot_matches_a_book_rebuilt_from_the_same_updates() {
        let snapshot = snapshot_at(0, vec![(10.0, 1.0)], vec![(20.0, 1.0)]);
        let mut engine: OrderBook = OrderBook::from_snapshot(snapshot, config_1s_samples());
        engine
            .apply_update(L2Update {
                product_id: "BTC-USD".into(),
                time_ms: 1_000,
                changes: vec![
                    Change { side: Side::Bid, price: 12.0, quantity: 2.0 },
                    Change { side: Side::Ask, price: 18.0, quantity: 3.0 },
                ],
            })
            .unwrap();

        let (bids_snapshot, asks_snapshot) = engine.take_snapshot();

        let mut rebuilt_bids = PriceBook::new(Side::Bid);
        rebuilt_bids.insert(10.0, 1.0);
        rebuilt_bids.insert(12.0, 2.0);
        let mut rebuilt_asks = PriceBook::new(Side::Ask);
        rebuilt_asks.insert(20.0, 1.0);
        rebuilt_asks.insert(18.0, 3.0);

        assert_eq!(bids_snapshot.levels(), rebuilt_bids.levels());
        assert_eq!(asks_snapshot.levels(), rebuilt_asks.levels());

        // Mutating the engine afterwards must not alias into the snapshot.
        engine
            .apply_update(L2Update {
                product_id: "BTC-USD".into(),
                time_ms: 2_000,
                changes: vec![Change { side: Side::Bid, price: 12.0, quantity: 0.0 }],
            })
            .unwrap();
        assert_eq!(bids_snapshot.levels(), rebuilt_bids.levels());
    }
}
