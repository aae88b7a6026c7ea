//! Seasonal mid-price forecaster: incremental update plus background refit.
//!
//! No auto-ARIMA crate exists in this codebase's dependency set, so the
//! model is an opaque `SeasonalModel` trait with one concrete deterministic
//! implementation. Swapping in a real fit/update/forecast backend only
//! requires a new trait impl; tests use a stub model to stay deterministic.
//!
//! The original design holds a single lock across the entire background
//! fit. A `std::sync::MutexGuard` cannot cross a spawned-thread boundary,
//! so this keeps the spirit (only one refit at a time, ingest never blocks
//! on it) through an `AtomicBool` refit gate plus a `Mutex`-guarded model
//! state that both sides touch only briefly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::Error;

/// Fixed fit/update/forecast parameters, mirroring an auto-ARIMA
/// configuration without depending on one.
#[derive(Clone, Copy, Debug)]
pub struct ModelParams {
    pub start_p: u32,
    pub start_q: u32,
    pub max_p: u32,
    pub max_q: u32,
    pub seasonality: u32,
    pub seasonal: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            start_p: 1,
            start_q: 1,
            max_p: 5,
            max_q: 5,
            seasonality: 10,
            seasonal: true,
        }
    }
}

/// Opaque seasonal time-series model oracle.
pub trait SeasonalModel: Send {
    /// Fit from scratch against the full training series.
    fn fit(&mut self, series: &[f64], params: &ModelParams) -> Result<(), Error>;

    /// Incrementally fold new observations into the current model.
    fn update(&mut self, observations: &[f64]);

    /// Produce `horizon` forecast values starting one bucket past the
    /// most recent training observation.
    fn forecast(&self, horizon: usize) -> Vec<f64>;
}

/// Deterministic default model: tracks a per-phase seasonal mean, updated
/// by exponential smoothing. Stands in for a real auto-ARIMA backend.
#[derive(Default)]
pub struct SeasonalMeanModel {
    seasonal_means: Vec<f64>,
    phase: usize,
}

const SMOOTHING_ALPHA: f64 = 0.3;

impl SeasonalModel for SeasonalMeanModel {
    fn fit(&mut self, series: &[f64], params: &ModelParams) -> Result<(), Error> {
        if series.is_empty() {
            return Err(Error::ForecastFit("empty training series".into()));
        }
        let m = params.seasonality.max(1) as usize;
        let mut sums = vec![0.0_f64; m];
        let mut counts = vec![0u32; m];
        for (i, &v) in series.iter().enumerate() {
            sums[i % m] += v;
            counts[i % m] += 1;
        }
        self.seasonal_means = sums
            .iter()
            .zip(&counts)
            .map(|(&s, &c)| if c > 0 { s / c as f64 } else { f64::NAN })
            .collect();
        self.phase = series.len() % m;
        Ok(())
    }

    fn update(&mut self, observations: &[f64]) {
        if self.seasonal_means.is_empty() {
            return;
        }
        let m = self.seasonal_means.len();
        for &v in observations {
            let idx = self.phase % m;
            let prior = self.seasonal_means[idx];
            self.seasonal_means[idx] = if prior.is_nan() {
                v
            } else {
                prior * (1.0 - SMOOTHING_ALPHA) + v * SMOOTHING_ALPHA
            };
            self.phase = (self.phase + 1) % m;
        }
    }

    fn forecast(&self, horizon: usize) -> Vec<f64> {
        if self.seasonal_means.is_empty() {
            return vec![f64::NAN; horizon];
        }
        let m = self.seasonal_means.len();
        (0..horizon)
            .map(|k| self.seasonal_means[(self.phase + k) % m])
            .collect()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Fitting,
    Ready,
    Updating,
}

struct Inner<M> {
    model: Option<M>,
    lifecycle: Lifecycle,
    updates_since_refit: u32,
    refit_threshold: u32,
    model_update_tick: i64,
}

/// Owns the forecaster's lifecycle state and coordinates the background
/// refit worker.
pub struct Forecaster<M: SeasonalModel + Default + Send + 'static> {
    state: Mutex<Inner<M>>,
    refitting: AtomicBool,
    done_rx: Mutex<Option<mpsc::Receiver<()>>>,
    params: ModelParams,
}

pub type DefaultForecaster = Forecaster<SeasonalMeanModel>;

impl<M: SeasonalModel + Default + Send + 'static> Forecaster<M> {
    pub fn new(params: ModelParams) -> Self {
        let refit_threshold = 2 * params.seasonality + 1;
        Self {
            state: Mutex::new(Inner {
                model: None,
                lifecycle: Lifecycle::Uninitialized,
                updates_since_refit: 0,
                refit_threshold,
                model_update_tick: 0,
            }),
            refitting: AtomicBool::new(false),
            done_rx: Mutex::new(None),
            params,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lock().unwrap().lifecycle
    }

    /// Fold newly-closed buckets into the forecaster: either an
    /// incremental update on the ingest thread, or (once the threshold is
    /// crossed) a full background refit, started at most once at a time.
    ///
    /// `as_of_tick` anchors the next forecast horizon. `history` is only
    /// invoked if a refit is actually triggered, to avoid an unconditional
    /// copy of the whole observed series on every ingest cycle.
    pub fn ingest(
        self: &Arc<Self>,
        new_observations: &[f64],
        as_of_tick: i64,
        history: impl FnOnce() -> Vec<f64>,
    ) {
        if new_observations.is_empty() {
            return;
        }

        let mut should_refit = false;
        {
            let mut state = self.state.lock().unwrap();
            match state.lifecycle {
                Lifecycle::Ready => {
                    if state.updates_since_refit < state.refit_threshold {
                        if let Some(model) = state.model.as_mut() {
                            state.lifecycle = Lifecycle::Updating;
                            model.update(new_observations);
                            state.lifecycle = Lifecycle::Ready;
                        }
                        state.updates_since_refit += new_observations.len() as u32;
                        state.model_update_tick = as_of_tick;
                    } else {
                        should_refit = true;
                    }
                }
                Lifecycle::Uninitialized | Lifecycle::Fitting => {
                    state.updates_since_refit += new_observations.len() as u32;
                    if state.updates_since_refit >= state.refit_threshold {
                        should_refit = true;
                    }
                }
                Lifecycle::Updating => {
                    // Ingest never observes this state; update above is
                    // synchronous and restores Ready before releasing.
                    state.updates_since_refit += new_observations.len() as u32;
                }
            }

            if should_refit {
                if self.refitting.swap(true, Ordering::AcqRel) {
                    should_refit = false; // a refit is already running
                } else {
                    state.lifecycle = Lifecycle::Fitting;
                }
            }
        }

        if should_refit {
            self.spawn_refit(history(), as_of_tick);
        }
    }

    fn spawn_refit(self: &Arc<Self>, snapshot: Vec<f64>, as_of_tick: i64) {
        let (tx, rx) = mpsc::channel();
        *self.done_rx.lock().unwrap() = Some(rx);

        let me = Arc::clone(self);
        let params = self.params;
        thread::spawn(move || {
            info!(n = snapshot.len(), "starting forecaster refit");
            let mut model = M::default();
            match model.fit(&snapshot, &params) {
                Ok(()) => {
                    let mut state = me.state.lock().unwrap();
                    state.model = Some(model);
                    state.lifecycle = Lifecycle::Ready;
                    state.updates_since_refit = 0;
                    state.model_update_tick = as_of_tick;
                    info!("forecaster refit complete");
                }
                Err(e) => {
                    debug!(error = %e, "forecaster refit failed, backing off");
                    let mut state = me.state.lock().unwrap();
                    state.refit_threshold += params.seasonality;
                    state.lifecycle = if state.model.is_some() {
                        Lifecycle::Ready
                    } else {
                        Lifecycle::Uninitialized
                    };
                }
            }
            me.refitting.store(false, Ordering::Release);
            let _ = tx.send(());
        });
    }

    /// Current forecast anchored at the installed model's
    /// `model_update_tick`, or `None` if no model is installed yet.
    pub fn current_forecast(&self, horizon: usize) -> Option<(i64, Vec<f64>)> {
        let state = self.state.lock().unwrap();
        let model = state.model.as_ref()?;
        Some((state.model_update_tick, model.forecast(horizon)))
    }

    /// Block up to `timeout` for an in-flight refit to finish. Returns
    /// `true` if idle (no refit was running, or it finished in time).
    pub fn await_idle(&self, timeout: Duration) -> bool {
        if !self.refitting.load(Ordering::Acquire) {
            return true;
        }
        match self.done_rx.lock().unwrap().take() {
            Some(rx) => rx.recv_timeout(timeout).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubModel {
        fitted: bool,
        last_value: f64,
    }

    impl Default for StubModel {
        fn default() -> Self {
            Self {
                fitted: false,
                last_value: f64::NAN,
            }
        }
    }

    impl SeasonalModel for StubModel {
        fn fit(&mut self, series: &[f64], _params: &ModelParams) -> Result<(), Error> {
            if series.is_empty() {
                return Err(Error::ForecastFit("empty".into()));
            }
            self.fitted = true;
            self.last_value = *series.last().unwrap();
            Ok(())
        }

        fn update(&mut self, observations: &[f64]) {
            if let Some(&v) = observations.last() {
                self.last_value = v;
            }
        }

        fn forecast(&self, horizon: usize) -> Vec<f64> {
            vec![self.last_value; horizon]
        }
    }

    #[test]
    fn starts_uninitialized_with_no_forecast() {
        let forecaster: Arc<Forecaster<StubModel>> = Arc::new(Forecaster::new(ModelParams::default()));
        assert_eq!(forecaster.lifecycle(), Lifecycle::Uninitialized);
        assert!(forecaster.current_forecast(5).is_none());
    }

    #[test]
    fn crossing_threshold_triggers_refit_and_becomes_ready() {
        let params = ModelParams {
            seasonality: 2,
            ..ModelParams::default()
        };
        let forecaster: Arc<Forecaster<StubModel>> = Arc::new(Forecaster::new(params));
        let threshold = 2 * params.seasonality + 1;

        let history: Vec<f64> = (0..threshold).map(|i| i as f64).collect();
        forecaster.ingest(&history, 100, || history.clone());

        assert!(forecaster.await_idle(Duration::from_secs(2)));
        assert_eq!(forecaster.lifecycle(), Lifecycle::Ready);
        let (tick, forecast) = forecaster.current_forecast(3).unwrap();
        assert_eq!(tick, 100);
        assert_eq!(forecast.len(), 3);
        assert!(!forecast[0].is_nan());
    }

    #[test]
    fn failed_fit_bumps_threshold_and_stays_uninitialized() {
        let params = ModelParams {
            seasonality: 2,
            ..ModelParams::default()
        };
        let forecaster: Arc<Forecaster<StubModel>> = Arc::new(Forecaster::new(params));
        // Trigger a refit with an empty history closure -> fit fails.
        let threshold = 2 * params.seasonality + 1;
        let observations: Vec<f64> = (0..threshold).map(|i| i as f64).collect();
        forecaster.ingest(&observations, 0, Vec::new);

        assert!(forecaster.await_idle(Duration::from_secs(2)));
        assert_eq!(forecaster.lifecycle(), Lifecycle::Uninitialized);
        assert!(forecaster.current_forecast(1).is_none());
    }

    #[test]
    fn seasonal_mean_model_fits_deterministically() {
        let mut model = SeasonalMeanModel::default();
        let params = ModelParams {
            seasonality: 2,
            ..ModelParams::default()
        };
        model.fit(&[1.0, 2.0, 3.0, 4.0], &params).unwrap();
        // phase 0 -> mean(1,3)=2.0, phase 1 -> mean(2,4)=3.0
        let forecast = model.forecast(2);
        assert_eq!(forecast, vec![2.0, 3.0]);
    }
}
