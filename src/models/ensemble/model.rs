//! Ensemble forecaster combining multiple models.
//!
//! Members are either pre-built model instances or factories; factories are
//! re-invoked on every `fit()` so no state leaks between fits. A member
//! whose fit fails is carried with zero weight rather than failing the
//! ensemble; only all members failing is an error.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::{BoxedForecaster, Forecaster, ForecasterFactory};
use crate::utils::metrics::{mae, mape, mse, rmse, smape};
use crate::utils::stats::median;

/// How member forecasts are combined into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombinationMethod {
    /// Unweighted mean of member forecasts.
    #[default]
    Mean,
    /// Per-step median of member forecasts.
    Median,
    /// Softmax over member AIC values (lower AIC, higher weight).
    WeightedAIC,
    /// Softmax over member BIC values.
    WeightedBIC,
    /// Softmax over holdout accuracy (lower error, higher weight).
    WeightedAccuracy,
}

impl CombinationMethod {
    fn label(self) -> &'static str {
        match self {
            CombinationMethod::Mean => "Mean",
            CombinationMethod::Median => "Median",
            CombinationMethod::WeightedAIC => "WeightedAIC",
            CombinationMethod::WeightedBIC => "WeightedBIC",
            CombinationMethod::WeightedAccuracy => "WeightedAccuracy",
        }
    }
}

/// Error metric for [`CombinationMethod::WeightedAccuracy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccuracyMetric {
    #[default]
    Mae,
    Mse,
    Rmse,
    /// NaN on series containing zeros; such members score +inf.
    Mape,
    Smape,
}

/// Ensemble configuration.
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    /// Combination method.
    pub method: CombinationMethod,
    /// Holdout fraction for accuracy weighting.
    pub validation_split: f64,
    /// Softmax temperature; larger values flatten the weights.
    pub temperature: f64,
    /// Weights below this are zeroed before renormalization.
    pub min_weight: f64,
    /// Renormalize weights to sum to one.
    pub normalize_weights: bool,
    /// Metric used by accuracy weighting.
    pub accuracy_metric: AccuracyMetric,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            method: CombinationMethod::Mean,
            validation_split: 0.2,
            temperature: 1.0,
            min_weight: 0.0,
            normalize_weights: true,
            accuracy_metric: AccuracyMetric::Mae,
        }
    }
}

impl EnsembleConfig {
    pub fn new(method: CombinationMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_validation_split(mut self, split: f64) -> Self {
        self.validation_split = split;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_min_weight(mut self, min_weight: f64) -> Self {
        self.min_weight = min_weight;
        self
    }

    pub fn with_normalize_weights(mut self, on: bool) -> Self {
        self.normalize_weights = on;
        self
    }

    pub fn with_accuracy_metric(mut self, metric: AccuracyMetric) -> Self {
        self.accuracy_metric = metric;
        self
    }

    /// Range-check the numeric knobs.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(ForecastError::InvalidParameter(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        if !(0.0..1.0).contains(&self.min_weight) {
            return Err(ForecastError::InvalidParameter(format!(
                "min_weight must be in [0, 1), got {}",
                self.min_weight
            )));
        }
        Ok(())
    }
}

/// Ensemble forecaster.
pub struct Ensemble {
    config: EnsembleConfig,
    factories: Option<Vec<ForecasterFactory>>,
    models: Vec<BoxedForecaster>,
    /// True for members whose fit succeeded.
    fit_ok: Vec<bool>,
    weights: Vec<f64>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
    name: String,
    is_fitted: bool,
}

impl Ensemble {
    /// Ensemble over pre-built model instances.
    pub fn new(models: Vec<BoxedForecaster>) -> Self {
        let count = models.len();
        Self {
            config: EnsembleConfig::default(),
            factories: None,
            models,
            fit_ok: Vec::new(),
            weights: Vec::new(),
            fitted: None,
            residuals: None,
            name: Self::format_name(CombinationMethod::Mean, count),
            is_fitted: false,
        }
    }

    /// Ensemble over factories; members are re-created on every fit.
    pub fn from_factories(factories: Vec<ForecasterFactory>) -> Self {
        let count = factories.len();
        Self {
            config: EnsembleConfig::default(),
            factories: Some(factories),
            models: Vec::new(),
            fit_ok: Vec::new(),
            weights: Vec::new(),
            fitted: None,
            residuals: None,
            name: Self::format_name(CombinationMethod::Mean, count),
            is_fitted: false,
        }
    }

    /// Set the combination method.
    pub fn with_method(mut self, method: CombinationMethod) -> Self {
        self.config.method = method;
        self.name = Self::format_name(method, self.member_count());
        self
    }

    /// Replace the full configuration.
    pub fn with_config(mut self, config: EnsembleConfig) -> Self {
        self.name = Self::format_name(config.method, self.member_count());
        self.config = config;
        self
    }

    fn format_name(method: CombinationMethod, count: usize) -> String {
        format!("Ensemble{}[{count}]", method.label())
    }

    /// Number of member models (or factories before the first fit).
    pub fn member_count(&self) -> usize {
        match &self.factories {
            Some(factories) if self.models.is_empty() => factories.len(),
            _ => self.models.len(),
        }
    }

    /// Member weights from the last fit. Zero marks a failed or floored
    /// member; with normalization on, nonzero weights sum to one.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Combination method in use.
    pub fn method(&self) -> CombinationMethod {
        self.config.method
    }

    fn accuracy_error(metric: AccuracyMetric, actual: &[f64], predicted: &[f64]) -> f64 {
        match metric {
            AccuracyMetric::Mae => mae(actual, predicted),
            AccuracyMetric::Mse => mse(actual, predicted),
            AccuracyMetric::Rmse => rmse(actual, predicted),
            AccuracyMetric::Mape => mape(actual, predicted),
            AccuracyMetric::Smape => smape(actual, predicted),
        }
    }

    /// Softmax over negated scores: weight_i ∝ exp(-(s_i - s_min) / T).
    /// Members with non-finite scores get zero; if every score is
    /// non-finite, fitted members share uniform weight.
    fn softmax_weights(&self, scores: &[f64]) -> Vec<f64> {
        let n = scores.len();
        let s_min = scores
            .iter()
            .copied()
            .filter(|s| s.is_finite())
            .fold(f64::INFINITY, f64::min);

        if !s_min.is_finite() {
            let fitted = self.fit_ok.iter().filter(|&&ok| ok).count().max(1);
            return self
                .fit_ok
                .iter()
                .map(|&ok| if ok { 1.0 / fitted as f64 } else { 0.0 })
                .collect();
        }

        let temperature = self.config.temperature.max(1e-10);
        let raw: Vec<f64> = scores
            .iter()
            .map(|&s| {
                if s.is_finite() {
                    (-(s - s_min) / temperature).exp()
                } else {
                    0.0
                }
            })
            .collect();
        let sum: f64 = raw.iter().sum();
        if sum <= 0.0 {
            return vec![1.0 / n as f64; n];
        }
        raw.iter().map(|w| w / sum).collect()
    }

    /// Zero out weights below the floor, then renormalize.
    fn apply_weight_floor(&self, mut weights: Vec<f64>) -> Vec<f64> {
        if self.config.min_weight > 0.0 {
            for w in &mut weights {
                if *w < self.config.min_weight {
                    *w = 0.0;
                }
            }
        }
        if self.config.normalize_weights {
            let sum: f64 = weights.iter().sum();
            if sum > 0.0 {
                for w in &mut weights {
                    *w /= sum;
                }
            } else {
                let fitted = self.fit_ok.iter().filter(|&&ok| ok).count().max(1);
                for (w, &ok) in weights.iter_mut().zip(&self.fit_ok) {
                    *w = if ok { 1.0 / fitted as f64 } else { 0.0 };
                }
            }
        }
        weights
    }

    fn compute_weights(&mut self, series: &TimeSeries) -> Result<()> {
        let n_members = self.models.len();
        let weights = match self.config.method {
            CombinationMethod::Mean => {
                let fitted = self.fit_ok.iter().filter(|&&ok| ok).count().max(1);
                self.fit_ok
                    .iter()
                    .map(|&ok| if ok { 1.0 / fitted as f64 } else { 0.0 })
                    .collect()
            }
            // Median ignores weights when combining; report membership.
            CombinationMethod::Median => self
                .fit_ok
                .iter()
                .map(|&ok| if ok { 1.0 } else { 0.0 })
                .collect(),
            CombinationMethod::WeightedAIC => {
                let scores: Vec<f64> = self
                    .models
                    .iter()
                    .zip(&self.fit_ok)
                    .map(|(m, &ok)| {
                        if ok {
                            m.aic().unwrap_or(f64::INFINITY)
                        } else {
                            f64::INFINITY
                        }
                    })
                    .collect();
                self.softmax_weights(&scores)
            }
            CombinationMethod::WeightedBIC => {
                let scores: Vec<f64> = self
                    .models
                    .iter()
                    .zip(&self.fit_ok)
                    .map(|(m, &ok)| {
                        if ok {
                            m.bic().unwrap_or(f64::INFINITY)
                        } else {
                            f64::INFINITY
                        }
                    })
                    .collect();
                self.softmax_weights(&scores)
            }
            CombinationMethod::WeightedAccuracy => {
                let scores = self.holdout_scores(series)?;
                self.softmax_weights(&scores)
            }
        };

        debug_assert_eq!(n_members, self.fit_ok.len());
        self.weights = if self.config.method == CombinationMethod::Median {
            weights
        } else {
            self.apply_weight_floor(weights)
        };
        Ok(())
    }

    /// Score each member on its in-sample fit over the full series.
    fn in_sample_scores(&self, series: &TimeSeries) -> Vec<f64> {
        let actual = series.primary_values();
        let metric = self.config.accuracy_metric;
        self.models
            .iter()
            .zip(&self.fit_ok)
            .map(|(model, &ok)| {
                if !ok {
                    return f64::INFINITY;
                }
                match model.fitted_values() {
                    Some(fitted) if fitted.len() == actual.len() => {
                        let err = Self::accuracy_error(metric, actual, fitted);
                        if err.is_finite() {
                            err
                        } else {
                            f64::INFINITY
                        }
                    }
                    _ => f64::INFINITY,
                }
            })
            .collect()
    }

    /// Score each member on a trailing holdout: fit on the head, forecast
    /// the tail, then refit on the full series. A zero split skips the
    /// holdout and scores the in-sample fit instead.
    fn holdout_scores(&mut self, series: &TimeSeries) -> Result<Vec<f64>> {
        let split = self.config.validation_split;
        if !(0.0..1.0).contains(&split) {
            return Err(ForecastError::InvalidParameter(format!(
                "validation_split must be in [0, 1), got {split}"
            )));
        }
        if split == 0.0 {
            return Ok(self.in_sample_scores(series));
        }

        let n = series.len();
        let train_len = ((n as f64) * (1.0 - split)).floor() as usize;
        let holdout = n - train_len;
        if train_len < 4 || holdout < 1 {
            return Err(ForecastError::InsufficientData {
                needed: 5,
                got: n,
            });
        }

        let train = series.slice(0, train_len)?;
        let actual = &series.primary_values()[train_len..];
        let metric = self.config.accuracy_metric;

        let mut scores = Vec::with_capacity(self.models.len());
        for (model, ok) in self.models.iter_mut().zip(self.fit_ok.iter_mut()) {
            if !*ok {
                scores.push(f64::INFINITY);
                continue;
            }
            let score = match model.fit(&train).and_then(|()| model.predict(holdout)) {
                Ok(forecast) => {
                    let err = Self::accuracy_error(metric, actual, forecast.primary());
                    if err.is_finite() {
                        err
                    } else {
                        f64::INFINITY
                    }
                }
                Err(_) => f64::INFINITY,
            };
            // Restore the full-data fit.
            if model.fit(series).is_err() {
                *ok = false;
                scores.push(f64::INFINITY);
            } else {
                scores.push(score);
            }
        }
        Ok(scores)
    }

    /// Combine one horizon step across members, skipping non-finite values.
    fn combine_step(&self, values: &[f64]) -> f64 {
        match self.config.method {
            CombinationMethod::Mean => {
                let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
                if finite.is_empty() {
                    f64::NAN
                } else {
                    finite.iter().sum::<f64>() / finite.len() as f64
                }
            }
            CombinationMethod::Median => {
                let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
                if finite.is_empty() {
                    f64::NAN
                } else {
                    median(&finite)
                }
            }
            _ => {
                let mut weighted_sum = 0.0;
                let mut weight_sum = 0.0;
                for (&v, &w) in values.iter().zip(&self.weights) {
                    if v.is_finite() && w > 0.0 {
                        weighted_sum += w * v;
                        weight_sum += w;
                    }
                }
                if weight_sum > 0.0 {
                    weighted_sum / weight_sum
                } else {
                    f64::NAN
                }
            }
        }
    }

    /// Combine member series column-wise; all must share the same length.
    fn combine_series(&self, columns: &[Vec<f64>]) -> Result<Vec<f64>> {
        let Some(len) = columns.iter().map(Vec::len).max() else {
            return Ok(Vec::new());
        };
        for column in columns {
            if column.len() != len {
                return Err(ForecastError::DimensionMismatch {
                    expected: len,
                    got: column.len(),
                });
            }
        }
        Ok((0..len)
            .map(|h| {
                let step: Vec<f64> = columns.iter().map(|c| c[h]).collect();
                self.combine_step(&step)
            })
            .collect())
    }

    /// Per-member columns for one closure over a member; failed members
    /// contribute NaN columns so indices stay aligned with weights.
    fn member_columns<F>(&self, len: usize, mut get: F) -> Vec<Vec<f64>>
    where
        F: FnMut(&BoxedForecaster) -> Option<Vec<f64>>,
    {
        self.models
            .iter()
            .zip(&self.fit_ok)
            .map(|(model, &ok)| {
                if ok {
                    get(model).unwrap_or_else(|| vec![f64::NAN; len])
                } else {
                    vec![f64::NAN; len]
                }
            })
            .collect()
    }
}

impl Forecaster for Ensemble {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        self.config.validate()?;
        if let Some(factories) = &self.factories {
            self.models = factories.iter().map(|f| f()).collect();
        }
        if self.models.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "ensemble has no member models".to_string(),
            ));
        }
        self.name = Self::format_name(self.config.method, self.models.len());

        self.fit_ok = self
            .models
            .iter_mut()
            .map(|model| model.fit(series).is_ok())
            .collect();

        if !self.fit_ok.iter().any(|&ok| ok) {
            return Err(ForecastError::ComputationError(
                "every ensemble member failed to fit".to_string(),
            ));
        }

        self.compute_weights(series)?;

        // Combined in-sample fit from members that expose fitted values.
        let n = series.len();
        let columns = self.member_columns(n, |model| {
            model.fitted_values().filter(|f| f.len() == n).map(<[f64]>::to_vec)
        });
        let combined = self.combine_series(&columns)?;
        let residuals: Vec<f64> = series
            .primary_values()
            .iter()
            .zip(&combined)
            .map(|(y, f)| y - f)
            .collect();
        self.fitted = Some(combined);
        self.residuals = Some(residuals);

        self.is_fitted = true;
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        if !self.is_fitted {
            return Err(ForecastError::FitRequired);
        }
        if horizon == 0 {
            return Ok(Forecast::new());
        }

        let columns = self.member_columns(horizon, |model| {
            model
                .predict(horizon)
                .ok()
                .map(|f| f.primary().to_vec())
        });
        Ok(Forecast::from_values(self.combine_series(&columns)?))
    }

    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<Forecast> {
        let point = self.predict(horizon)?;
        if !(0.0..1.0).contains(&level) || level <= 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "confidence level must be in (0, 1), got {level}"
            )));
        }
        if horizon == 0 {
            return Ok(point);
        }

        let member_forecasts: Vec<Option<Forecast>> = self
            .models
            .iter()
            .zip(&self.fit_ok)
            .map(|(model, &ok)| {
                if ok {
                    model.predict_with_intervals(horizon, level).ok()
                } else {
                    None
                }
            })
            .collect();

        let lower_columns: Vec<Vec<f64>> = member_forecasts
            .iter()
            .map(|f| {
                f.as_ref()
                    .and_then(|f| f.lower().map(<[f64]>::to_vec))
                    .unwrap_or_else(|| vec![f64::NAN; horizon])
            })
            .collect();
        let upper_columns: Vec<Vec<f64>> = member_forecasts
            .iter()
            .map(|f| {
                f.as_ref()
                    .and_then(|f| f.upper().map(<[f64]>::to_vec))
                    .unwrap_or_else(|| vec![f64::NAN; horizon])
            })
            .collect();

        let lower = self.combine_series(&lower_columns)?;
        let upper = self.combine_series(&upper_columns)?;

        // Members without native intervals leave NaN holes; fall back to
        // the combined point forecast there.
        let point_values = point.primary().to_vec();
        let lower: Vec<f64> = lower
            .iter()
            .zip(&point_values)
            .map(|(&l, &p)| if l.is_finite() { l.min(p) } else { p })
            .collect();
        let upper: Vec<f64> = upper
            .iter()
            .zip(&point_values)
            .map(|(&u, &p)| if u.is_finite() { u.max(p) } else { p })
            .collect();

        Ok(Forecast::from_values_with_intervals(
            point_values,
            lower,
            upper,
        ))
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.fitted.as_deref()
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
