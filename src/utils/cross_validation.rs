//! Cross-validation utilities for time series forecasting.
//!
//! AutoMFLES scores every hyperparameter candidate through [`cross_validate`];
//! the same machinery is usable directly for model comparison.

use crate::core::TimeSeries;
use crate::error::Result;
use crate::models::Forecaster;
use crate::utils::metrics::{calculate_metrics, AccuracyMetrics};

/// Cross-validation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CVStrategy {
    /// Rolling window: fixed training window size, slides forward.
    Rolling,
    /// Expanding window: training window grows, starts from initial_window.
    #[default]
    Expanding,
}

/// Configuration for time series cross-validation.
#[derive(Debug, Clone)]
pub struct CVConfig {
    /// Forecast horizon for each fold.
    pub horizon: usize,
    /// Initial training window size.
    pub initial_window: usize,
    /// Step size between fold origins.
    pub step_size: usize,
    /// Cross-validation strategy.
    pub strategy: CVStrategy,
    /// Optional seasonal period for MASE calculation.
    pub seasonal_period: Option<usize>,
}

impl Default for CVConfig {
    fn default() -> Self {
        Self {
            horizon: 1,
            initial_window: 10,
            step_size: 1,
            strategy: CVStrategy::Expanding,
            seasonal_period: None,
        }
    }
}

impl CVConfig {
    /// Expanding-window configuration.
    pub fn expanding(initial_window: usize, horizon: usize) -> Self {
        Self {
            initial_window,
            horizon,
            ..Self::default()
        }
    }

    /// Rolling-window configuration.
    pub fn rolling(window_size: usize, horizon: usize) -> Self {
        Self {
            initial_window: window_size,
            horizon,
            strategy: CVStrategy::Rolling,
            ..Self::default()
        }
    }

    /// Set the step size between folds.
    pub fn with_step_size(mut self, step_size: usize) -> Self {
        self.step_size = step_size;
        self
    }

    /// Set the seasonal period for MASE calculation.
    pub fn with_seasonal_period(mut self, period: usize) -> Self {
        self.seasonal_period = Some(period);
        self
    }
}

/// Results from cross-validation.
#[derive(Debug, Clone)]
pub struct CVResults {
    /// Number of folds evaluated.
    pub n_folds: usize,
    /// Aggregated metrics across all folds.
    pub aggregated: AggregatedMetrics,
    /// Per-fold metrics.
    pub fold_metrics: Vec<AccuracyMetrics>,
    /// Actual values across all folds (flattened).
    pub actual_values: Vec<f64>,
    /// Predicted values across all folds (flattened).
    pub predicted_values: Vec<f64>,
}

/// Metrics aggregated across folds.
#[derive(Debug, Clone)]
pub struct AggregatedMetrics {
    /// Mean MAE across folds.
    pub mae: f64,
    /// Mean RMSE across folds.
    pub rmse: f64,
    /// Mean sMAPE across folds.
    pub smape: f64,
    /// Mean MAPE across folds (None if any fold had zeros in the actuals).
    pub mape: Option<f64>,
    /// Standard deviation of MAE across folds.
    pub mae_std: f64,
    /// Standard deviation of RMSE across folds.
    pub rmse_std: f64,
}

/// Perform time series cross-validation.
///
/// Each fold trains a fresh model from `model_factory` on the observations
/// before the fold origin (all of them for [`CVStrategy::Expanding`], the
/// trailing `initial_window` for [`CVStrategy::Rolling`]) and scores the
/// forecast against the next `horizon` observations. Zero folds (series too
/// short) is reported in the result, not an error.
pub fn cross_validate<F, Factory>(
    config: &CVConfig,
    series: &TimeSeries,
    model_factory: Factory,
) -> Result<CVResults>
where
    F: Forecaster,
    Factory: Fn() -> F,
{
    let n = series.len();
    let mut fold_metrics = Vec::new();
    let mut all_actual = Vec::new();
    let mut all_predicted = Vec::new();

    let mut origin = config.initial_window;
    while origin + config.horizon <= n {
        let train_start = match config.strategy {
            CVStrategy::Rolling => origin.saturating_sub(config.initial_window),
            CVStrategy::Expanding => 0,
        };

        let train_series = series.slice(train_start, origin)?;

        let mut model = model_factory();
        model.fit(&train_series)?;
        let forecast = model.predict(config.horizon)?;
        let predictions = forecast.primary();

        let actual = &series.primary_values()[origin..origin + config.horizon];

        let metrics = calculate_metrics(actual, predictions, config.seasonal_period)?;
        fold_metrics.push(metrics);

        all_actual.extend_from_slice(actual);
        all_predicted.extend_from_slice(predictions);

        origin += config.step_size.max(1);
    }

    let n_folds = fold_metrics.len();
    if n_folds == 0 {
        return Ok(CVResults {
            n_folds: 0,
            aggregated: AggregatedMetrics {
                mae: f64::NAN,
                rmse: f64::NAN,
                smape: f64::NAN,
                mape: None,
                mae_std: f64::NAN,
                rmse_std: f64::NAN,
            },
            fold_metrics: vec![],
            actual_values: vec![],
            predicted_values: vec![],
        });
    }

    let mae_values: Vec<f64> = fold_metrics.iter().map(|m| m.mae).collect();
    let rmse_values: Vec<f64> = fold_metrics.iter().map(|m| m.rmse).collect();
    let smape_mean =
        fold_metrics.iter().map(|m| m.smape).sum::<f64>() / n_folds as f64;

    let mape = if fold_metrics.iter().all(|m| m.mape.is_some()) {
        Some(fold_metrics.iter().filter_map(|m| m.mape).sum::<f64>() / n_folds as f64)
    } else {
        None
    };

    Ok(CVResults {
        n_folds,
        aggregated: AggregatedMetrics {
            mae: mae_values.iter().sum::<f64>() / n_folds as f64,
            rmse: rmse_values.iter().sum::<f64>() / n_folds as f64,
            smape: smape_mean,
            mape,
            mae_std: std_dev(&mae_values),
            rmse_std: std_dev(&rmse_values),
        },
        fold_metrics,
        actual_values: all_actual,
        predicted_values: all_predicted,
    })
}

/// Sample standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Forecast;
    use crate::error::ForecastError;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    /// Minimal forecaster for exercising the CV loop: repeats the last
    /// observed value.
    #[derive(Default)]
    struct LastValue {
        last: Option<f64>,
    }

    impl Forecaster for LastValue {
        fn fit(&mut self, series: &TimeSeries) -> Result<()> {
            self.last = series.primary_values().last().copied();
            Ok(())
        }

        fn predict(&self, horizon: usize) -> Result<Forecast> {
            let last = self.last.ok_or(ForecastError::FitRequired)?;
            Ok(Forecast::from_values(vec![last; horizon]))
        }

        fn fitted_values(&self) -> Option<&[f64]> {
            None
        }

        fn residuals(&self) -> Option<&[f64]> {
            None
        }

        fn name(&self) -> &str {
            "LastValue"
        }
    }

    fn make_series(values: Vec<f64>) -> TimeSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let timestamps = (0..values.len())
            .map(|i| base + Duration::hours(i as i64))
            .collect();
        TimeSeries::univariate(timestamps, values).unwrap()
    }

    #[test]
    fn expanding_window_fold_count() {
        let ts = make_series((0..20).map(|i| i as f64).collect());
        let results =
            cross_validate(&CVConfig::expanding(10, 1), &ts, LastValue::default).unwrap();

        // Origins 10..=19, one-step folds.
        assert_eq!(results.n_folds, 10);
        assert!(results.aggregated.mae.is_finite());
    }

    #[test]
    fn rolling_window_fold_count() {
        let ts = make_series((0..20).map(|i| i as f64).collect());
        let results = cross_validate(&CVConfig::rolling(10, 1), &ts, LastValue::default).unwrap();
        assert_eq!(results.n_folds, 10);
    }

    #[test]
    fn step_size_reduces_folds() {
        let ts = make_series((0..20).map(|i| i as f64).collect());
        let config = CVConfig::expanding(10, 1).with_step_size(2);
        let results = cross_validate(&config, &ts, LastValue::default).unwrap();
        assert_eq!(results.n_folds, 5);
    }

    #[test]
    fn multi_step_horizon_collects_all_values() {
        let ts = make_series((0..20).map(|i| i as f64).collect());
        let results =
            cross_validate(&CVConfig::expanding(10, 3), &ts, LastValue::default).unwrap();

        // Origins 10..=17 with horizon 3.
        assert_eq!(results.n_folds, 8);
        assert_eq!(results.actual_values.len(), 8 * 3);
        assert_eq!(results.predicted_values.len(), 8 * 3);
    }

    #[test]
    fn short_series_yields_zero_folds() {
        let ts = make_series(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let results =
            cross_validate(&CVConfig::expanding(10, 1), &ts, LastValue::default).unwrap();
        assert_eq!(results.n_folds, 0);
        assert!(results.aggregated.mae.is_nan());
    }

    #[test]
    fn last_value_is_exact_on_constant_series() {
        let ts = make_series(vec![5.0; 20]);
        let results =
            cross_validate(&CVConfig::expanding(10, 1), &ts, LastValue::default).unwrap();
        assert_relative_eq!(results.aggregated.mae, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn aggregated_mae_is_mean_of_folds() {
        let ts = make_series((0..20).map(|i| i as f64 + 0.1 * (i as f64).sin()).collect());
        let results =
            cross_validate(&CVConfig::expanding(10, 1), &ts, LastValue::default).unwrap();

        let manual: f64 =
            results.fold_metrics.iter().map(|m| m.mae).sum::<f64>() / results.n_folds as f64;
        assert_relative_eq!(results.aggregated.mae, manual, epsilon = 1e-10);
        assert!(results.aggregated.rmse >= results.aggregated.mae);
    }

    #[test]
    fn config_builders_set_fields() {
        let expanding = CVConfig::expanding(10, 3);
        assert_eq!(expanding.strategy, CVStrategy::Expanding);
        assert_eq!(expanding.initial_window, 10);
        assert_eq!(expanding.horizon, 3);

        let rolling = CVConfig::rolling(15, 2).with_step_size(5).with_seasonal_period(4);
        assert_eq!(rolling.strategy, CVStrategy::Rolling);
        assert_eq!(rolling.step_size, 5);
        assert_eq!(rolling.seasonal_period, Some(4));
    }
}
