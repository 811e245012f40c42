//! MFLES (Median, Fourier, Level, Exponential Smoothing) forecasting model.
//!
//! A boosting decomposition: each round fits a median baseline (first round
//! only), a trend, Fourier seasonal terms per period, and a residual
//! smoother against the current residual, each damped by its own learning
//! rate. Preprocessing z-scores the data and optionally log-transforms it;
//! all components live on the transformed scale and are inverted for
//! predictions and residuals.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::Forecaster;
use crate::utils::ols::{linear_fit, siegel_fit, solve_symmetric};
use crate::utils::stats::{mean, median, population_std_dev, quantile_normal};

const EPSILON: f64 = 1e-10;
const MAX_FOURIER_TERMS: usize = 10;

/// Trend fitting method used inside the boosting loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendMethod {
    /// Ordinary least squares over the time index.
    #[default]
    Ols,
    /// Siegel repeated-medians regression, resistant to outliers.
    SiegelRobust,
    /// Piecewise-linear fit with evenly spaced changepoints.
    Piecewise,
}

/// MFLES hyperparameters.
///
/// Every learning rate lies in `[0, 1]`; a rate of exactly zero disables
/// that component entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct MFLESParams {
    /// Seasonal periods, longest-dominant first. A period is only fitted
    /// when the series covers at least two full cycles.
    pub seasonal_periods: Vec<usize>,
    /// Learning rate of the one-time median baseline.
    pub lr_median: f64,
    /// Learning rate of the per-round trend component.
    pub lr_trend: f64,
    /// Learning rate of the Fourier seasonal terms.
    pub lr_season: f64,
    /// Learning rate of the residual smoother.
    pub lr_rs: f64,
    /// Reserved for exogenous regressors; validated but unused.
    pub lr_exogenous: f64,
    /// Maximum boosting rounds.
    pub max_rounds: usize,
    /// Trend estimator.
    pub trend_method: TrendMethod,
    /// Fourier pairs per period; `None` chooses adaptively from the period.
    pub fourier_order: Option<usize>,
    /// Force or forbid the log transform; `None` auto-detects.
    pub multiplicative: Option<bool>,
    /// Median baseline over a trailing two-cycle window instead of global.
    pub moving_medians: bool,
    /// Residual smoother: moving average when `true`, ES ensemble otherwise.
    pub smoother: bool,
    /// Moving-average window when `smoother` is set.
    pub ma_window: usize,
    /// Smallest alpha in the ES ensemble.
    pub min_alpha: f64,
    /// Largest alpha in the ES ensemble.
    pub max_alpha: f64,
    /// Number of alphas in the ES ensemble.
    pub es_ensemble_steps: usize,
    /// Weight recent seasonal cycles more heavily when fitting Fourier terms.
    pub seasonality_weights: bool,
    /// Cap residual outliers between rounds.
    pub cap_outliers: bool,
    /// Sigma multiple for outlier capping.
    pub outlier_sigma: f64,
    /// First round eligible for outlier capping.
    pub outlier_cap_start_round: usize,
    /// Relative MSE improvement a smoother round must beat to be accepted.
    pub round_penalty: f64,
    /// Early-stop threshold relative to the preprocessed data range.
    pub convergence_threshold: f64,
    /// Coefficient-of-variation threshold for multiplicative auto-detection.
    pub cov_threshold: f64,
    /// Changepoint count for piecewise trends, as a fraction of series length.
    pub n_changepoints_pct: f64,
    /// Shrink trend extrapolation by the trend's in-sample R-squared.
    pub trend_penalty: bool,
}

impl Default for MFLESParams {
    fn default() -> Self {
        Self {
            seasonal_periods: vec![12],
            lr_median: 1.0,
            lr_trend: 0.3,
            lr_season: 0.5,
            lr_rs: 0.8,
            lr_exogenous: 0.0,
            max_rounds: 10,
            trend_method: TrendMethod::Ols,
            fourier_order: None,
            multiplicative: None,
            moving_medians: false,
            smoother: false,
            ma_window: 5,
            min_alpha: 0.05,
            max_alpha: 1.0,
            es_ensemble_steps: 20,
            seasonality_weights: false,
            cap_outliers: false,
            outlier_sigma: 3.0,
            outlier_cap_start_round: 5,
            round_penalty: 0.0001,
            convergence_threshold: 0.001,
            cov_threshold: 0.7,
            n_changepoints_pct: 0.25,
            trend_penalty: true,
        }
    }
}

impl MFLESParams {
    /// Validate every parameter range; called eagerly at construction.
    pub fn validate(&self) -> Result<()> {
        let check_lr = |lr: f64, name: &str| -> Result<()> {
            if !(0.0..=1.0).contains(&lr) {
                return Err(ForecastError::InvalidParameter(format!(
                    "{name} must be in [0, 1], got {lr}"
                )));
            }
            Ok(())
        };
        check_lr(self.lr_median, "lr_median")?;
        check_lr(self.lr_trend, "lr_trend")?;
        check_lr(self.lr_season, "lr_season")?;
        check_lr(self.lr_rs, "lr_rs")?;
        check_lr(self.lr_exogenous, "lr_exogenous")?;

        if self.max_rounds < 1 {
            return Err(ForecastError::InvalidParameter(
                "max_rounds must be at least 1".to_string(),
            ));
        }
        for &period in &self.seasonal_periods {
            if period < 1 {
                return Err(ForecastError::InvalidParameter(
                    "seasonal periods must be >= 1".to_string(),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.cov_threshold) {
            return Err(ForecastError::InvalidParameter(format!(
                "cov_threshold must be in [0, 1], got {}",
                self.cov_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.n_changepoints_pct) {
            return Err(ForecastError::InvalidParameter(format!(
                "n_changepoints_pct must be in [0, 1], got {}",
                self.n_changepoints_pct
            )));
        }
        if self.min_alpha <= 0.0 || self.max_alpha > 1.0 || self.min_alpha > self.max_alpha {
            return Err(ForecastError::InvalidParameter(format!(
                "alpha range must satisfy 0 < min <= max <= 1, got [{}, {}]",
                self.min_alpha, self.max_alpha
            )));
        }
        if self.es_ensemble_steps < 1 {
            return Err(ForecastError::InvalidParameter(
                "es_ensemble_steps must be at least 1".to_string(),
            ));
        }
        if self.smoother && self.ma_window < 1 {
            return Err(ForecastError::InvalidParameter(
                "ma_window must be at least 1".to_string(),
            ));
        }
        if self.outlier_sigma <= 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "outlier_sigma must be positive, got {}",
                self.outlier_sigma
            )));
        }
        if self.round_penalty < 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "round_penalty must be non-negative, got {}",
                self.round_penalty
            )));
        }
        if self.convergence_threshold < 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "convergence_threshold must be non-negative, got {}",
                self.convergence_threshold
            )));
        }
        Ok(())
    }
}

/// Builder with eager validation.
#[derive(Debug, Clone, Default)]
pub struct MFLESBuilder {
    params: MFLESParams,
}

impl MFLESBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seasonal_periods(mut self, periods: Vec<usize>) -> Self {
        self.params.seasonal_periods = periods;
        self
    }

    pub fn lr_median(mut self, lr: f64) -> Self {
        self.params.lr_median = lr;
        self
    }

    pub fn lr_trend(mut self, lr: f64) -> Self {
        self.params.lr_trend = lr;
        self
    }

    pub fn lr_season(mut self, lr: f64) -> Self {
        self.params.lr_season = lr;
        self
    }

    pub fn lr_rs(mut self, lr: f64) -> Self {
        self.params.lr_rs = lr;
        self
    }

    pub fn max_rounds(mut self, rounds: usize) -> Self {
        self.params.max_rounds = rounds;
        self
    }

    pub fn trend_method(mut self, method: TrendMethod) -> Self {
        self.params.trend_method = method;
        self
    }

    pub fn fourier_order(mut self, order: usize) -> Self {
        self.params.fourier_order = Some(order);
        self
    }

    pub fn multiplicative(mut self, on: bool) -> Self {
        self.params.multiplicative = Some(on);
        self
    }

    pub fn moving_medians(mut self, on: bool) -> Self {
        self.params.moving_medians = on;
        self
    }

    pub fn smoother(mut self, on: bool) -> Self {
        self.params.smoother = on;
        self
    }

    pub fn ma_window(mut self, window: usize) -> Self {
        self.params.ma_window = window;
        self
    }

    pub fn seasonality_weights(mut self, on: bool) -> Self {
        self.params.seasonality_weights = on;
        self
    }

    pub fn cap_outliers(mut self, on: bool) -> Self {
        self.params.cap_outliers = on;
        self
    }

    pub fn trend_penalty(mut self, on: bool) -> Self {
        self.params.trend_penalty = on;
        self
    }

    /// Validate and produce the model.
    pub fn build(self) -> Result<MFLES> {
        MFLES::with_params(self.params)
    }
}

/// Accumulated Fourier coefficients for one seasonal period.
#[derive(Debug, Clone)]
struct SeasonalCoeffs {
    order: usize,
    sin: Vec<f64>,
    cos: Vec<f64>,
}

/// Decomposition of a fitted series into components on the original scale.
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub level: Vec<f64>,
    pub residuals: Vec<f64>,
}

/// MFLES forecasting model.
#[derive(Debug, Clone)]
pub struct MFLES {
    params: MFLESParams,
    // Fitted state
    mean: f64,
    std: f64,
    is_multiplicative: bool,
    median_component: Vec<f64>,
    trend_component: Vec<f64>,
    level_component: Vec<f64>,
    seasonal_components: Vec<(usize, Vec<f64>)>,
    fourier_coeffs: Vec<(usize, SeasonalCoeffs)>,
    /// Last two accumulated trend values; the forecast slope comes from
    /// their difference.
    accumulated_trend: Option<[f64; 2]>,
    final_level: f64,
    actual_rounds: usize,
    preprocessed: Vec<f64>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
    n: usize,
}

impl MFLES {
    /// Create an MFLES model with default parameters.
    pub fn new() -> Self {
        Self::unvalidated(MFLESParams::default())
    }

    /// Create an MFLES model, validating the parameters eagerly.
    pub fn with_params(params: MFLESParams) -> Result<Self> {
        params.validate()?;
        Ok(Self::unvalidated(params))
    }

    /// Builder entry point.
    pub fn builder() -> MFLESBuilder {
        MFLESBuilder::new()
    }

    fn unvalidated(params: MFLESParams) -> Self {
        Self {
            params,
            mean: 0.0,
            std: 1.0,
            is_multiplicative: false,
            median_component: Vec::new(),
            trend_component: Vec::new(),
            level_component: Vec::new(),
            seasonal_components: Vec::new(),
            fourier_coeffs: Vec::new(),
            accumulated_trend: None,
            final_level: 0.0,
            actual_rounds: 0,
            preprocessed: Vec::new(),
            fitted: None,
            residuals: None,
            n: 0,
        }
    }

    /// The model's hyperparameters.
    pub fn params(&self) -> &MFLESParams {
        &self.params
    }

    /// Boosting rounds actually performed in the last fit.
    pub fn actual_rounds(&self) -> usize {
        self.actual_rounds
    }

    /// Whether the last fit used the log transform.
    pub fn is_multiplicative(&self) -> bool {
        self.is_multiplicative
    }

    /// Components on the original scale; only valid after fit.
    pub fn seasonal_decompose(&self) -> Result<Decomposition> {
        if self.fitted.is_none() {
            return Err(ForecastError::FitRequired);
        }
        let n = self.trend_component.len();
        let mut seasonal = vec![0.0; n];
        for (_, component) in &self.seasonal_components {
            for (s, c) in seasonal.iter_mut().zip(component.iter()) {
                *s += c;
            }
        }
        Ok(Decomposition {
            trend: self.postprocess(&self.trend_component),
            seasonal: self.postprocess(&seasonal),
            level: self.postprocess(&self.level_component),
            residuals: self.residuals.clone().unwrap_or_default(),
        })
    }

    /// Z-score the raw data, then log-transform if multiplicative mode is
    /// active and the normalized data stayed positive.
    fn preprocess(&mut self, data: &[f64]) -> Vec<f64> {
        let n = data.len();
        self.mean = mean(data);
        let std = population_std_dev(data);
        self.std = if std < EPSILON { 1.0 } else { std };

        self.is_multiplicative = match self.params.multiplicative {
            Some(flag) => flag,
            None => self.should_use_multiplicative(data),
        };

        let mut out: Vec<f64> = data.iter().map(|&v| (v - self.mean) / self.std).collect();

        if self.is_multiplicative {
            let min_val = out.iter().copied().fold(f64::INFINITY, f64::min);
            if min_val > 0.0 {
                for v in &mut out {
                    *v = v.ln();
                }
            } else {
                self.is_multiplicative = false;
            }
        }

        debug_assert_eq!(out.len(), n);
        out
    }

    /// Invert the preprocessing: exp first when multiplicative, then undo
    /// the z-score.
    fn postprocess(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .map(|&v| {
                let v = if self.is_multiplicative { v.exp() } else { v };
                v * self.std + self.mean
            })
            .collect()
    }

    fn should_use_multiplicative(&self, data: &[f64]) -> bool {
        let min_val = data.iter().copied().fold(f64::INFINITY, f64::min);
        if min_val <= 0.0 {
            return false;
        }
        let has_seasonality = self
            .params
            .seasonal_periods
            .first()
            .is_some_and(|&p| p > 1);
        if !has_seasonality {
            return false;
        }
        let m = mean(data);
        let cov = if m.abs() < EPSILON {
            0.0
        } else {
            population_std_dev(data) / m.abs()
        };
        cov > self.params.cov_threshold
    }

    /// Flat median baseline: the global median, or the median of the most
    /// recent two seasonal cycles when moving medians are requested.
    fn fit_median_component(&self, data: &[f64]) -> Vec<f64> {
        let n = data.len();
        let value = if self.params.moving_medians {
            match self.params.seasonal_periods.first() {
                Some(&period) => {
                    let window = (2 * period).min(n);
                    median(&data[n - window..])
                }
                None => median(data),
            }
        } else {
            median(data)
        };
        vec![value; n]
    }

    fn fit_trend(&self, data: &[f64]) -> Vec<f64> {
        match self.params.trend_method {
            TrendMethod::Ols => {
                let (slope, intercept) = linear_fit(data);
                (0..data.len())
                    .map(|i| intercept + slope * i as f64)
                    .collect()
            }
            TrendMethod::SiegelRobust => {
                let (slope, intercept) = siegel_fit(data);
                (0..data.len())
                    .map(|i| intercept + slope * i as f64)
                    .collect()
            }
            TrendMethod::Piecewise => self.fit_piecewise_trend(data),
        }
    }

    /// Piecewise-linear trend with evenly spaced changepoints; each segment
    /// is an independent OLS fit over its local index.
    fn fit_piecewise_trend(&self, data: &[f64]) -> Vec<f64> {
        let n = data.len();
        if n < 4 {
            let (slope, intercept) = linear_fit(data);
            return (0..n).map(|i| intercept + slope * i as f64).collect();
        }

        let n_changepoints = ((n as f64 * self.params.n_changepoints_pct) as usize)
            .max(1)
            .min(n / 2);

        let mut boundaries = Vec::with_capacity(n_changepoints + 2);
        boundaries.push(0);
        for i in 1..=n_changepoints {
            boundaries.push(i * n / (n_changepoints + 1));
        }
        boundaries.push(n);

        let mut trend_fit = vec![0.0; n];
        for window in boundaries.windows(2) {
            let (start, end) = (window[0], window[1]);
            if end - start < 2 {
                continue;
            }
            let (slope, intercept) = linear_fit(&data[start..end]);
            for i in start..end {
                trend_fit[i] = intercept + slope * (i - start) as f64;
            }
        }
        trend_fit
    }

    /// Number of Fourier pairs for a period, capped at half the period.
    fn fourier_pairs(&self, period: usize) -> usize {
        let k = match self.params.fourier_order {
            Some(k) => k,
            None => {
                if period < 10 {
                    5
                } else if period < 70 {
                    10
                } else {
                    15
                }
            }
        };
        k.min(period / 2).min(MAX_FOURIER_TERMS)
    }

    /// Recency weights for seasonal fitting: later cycles weigh up to twice
    /// as much as the first.
    fn seasonality_weights(n: usize, period: usize) -> Vec<f64> {
        let total_cycles = n as f64 / period as f64;
        (0..n)
            .map(|i| {
                let cycle_num = i as f64 / period as f64;
                1.0 + cycle_num / total_cycles
            })
            .collect()
    }

    /// Fit Fourier terms for one period by (weighted) least squares.
    /// Returns the fitted seasonal series and the coefficients.
    fn fit_fourier_season(
        &self,
        data: &[f64],
        period: usize,
        weighted: bool,
    ) -> Option<(Vec<f64>, SeasonalCoeffs)> {
        let n = data.len();
        let k = self.fourier_pairs(period);
        if k < 1 {
            return None;
        }

        let weights = if weighted {
            Self::seasonality_weights(n, period)
        } else {
            vec![1.0; n]
        };

        // Design matrix rows: [sin(w1 t), cos(w1 t), sin(w2 t), cos(w2 t), ...]
        let dim = 2 * k;
        let mut design = vec![vec![0.0; dim]; n];
        for (i, row) in design.iter_mut().enumerate() {
            for freq in 1..=k {
                let angle = 2.0 * std::f64::consts::PI * freq as f64 * i as f64 / period as f64;
                row[2 * (freq - 1)] = angle.sin();
                row[2 * (freq - 1) + 1] = angle.cos();
            }
        }

        // Normal equations (X'WX) beta = X'Wy with a small ridge so the
        // Cholesky solve never hits a semidefinite system.
        let mut xtwx = vec![vec![0.0; dim]; dim];
        let mut xtwy = vec![0.0; dim];
        for i in 0..n {
            let w = weights[i];
            for j in 0..dim {
                xtwy[j] += w * design[i][j] * data[i];
                for l in j..dim {
                    xtwx[j][l] += w * design[i][j] * design[i][l];
                }
            }
        }
        for j in 0..dim {
            for l in 0..j {
                xtwx[j][l] = xtwx[l][j];
            }
            xtwx[j][j] += 1e-8;
        }

        let beta = solve_symmetric(&xtwx, &xtwy)?;

        let mut fit = vec![0.0; n];
        for (i, row) in design.iter().enumerate() {
            fit[i] = row.iter().zip(beta.iter()).map(|(x, b)| x * b).sum();
        }

        let mut sin = Vec::with_capacity(k);
        let mut cos = Vec::with_capacity(k);
        for freq in 0..k {
            sin.push(beta[2 * freq]);
            cos.push(beta[2 * freq + 1]);
        }
        Some((fit, SeasonalCoeffs { order: k, sin, cos }))
    }

    /// ES ensemble: one-step-ahead exponential smoothing averaged over an
    /// evenly spaced alpha grid. Returns the fit and the mean final level.
    fn fit_es_ensemble(&self, data: &[f64]) -> (Vec<f64>, f64) {
        let n = data.len();
        let steps = self.params.es_ensemble_steps.max(1);
        let alphas: Vec<f64> = if steps == 1 {
            vec![(self.params.min_alpha + self.params.max_alpha) / 2.0]
        } else {
            (0..steps)
                .map(|i| {
                    self.params.min_alpha
                        + (self.params.max_alpha - self.params.min_alpha) * i as f64
                            / (steps - 1) as f64
                })
                .collect()
        };

        let mut fit = vec![0.0; n];
        let mut final_levels = Vec::with_capacity(alphas.len());
        for &alpha in &alphas {
            let mut level = data[0];
            for (f, &y) in fit.iter_mut().zip(data.iter()) {
                *f += level;
                level = alpha * y + (1.0 - alpha) * level;
            }
            final_levels.push(level);
        }
        let count = alphas.len() as f64;
        for f in &mut fit {
            *f /= count;
        }
        (fit, final_levels.iter().sum::<f64>() / count)
    }

    /// Trailing moving average; the final level is its last value.
    fn fit_moving_average(&self, data: &[f64], window: usize) -> (Vec<f64>, f64) {
        let n = data.len();
        let window = window.min(n).max(1);
        let mut fit = vec![0.0; n];
        for i in 0..n {
            let start = i.saturating_sub(window - 1);
            let slice = &data[start..=i];
            fit[i] = slice.iter().sum::<f64>() / slice.len() as f64;
        }
        let last = fit[n - 1];
        (fit, last)
    }

    /// Clamp residuals to mean plus/minus `outlier_sigma` population sigmas.
    fn cap_outliers(&self, data: &mut [f64]) {
        let m = mean(data);
        let sigma = population_std_dev(data);
        let lower = m - self.params.outlier_sigma * sigma;
        let upper = m + self.params.outlier_sigma * sigma;
        for v in data.iter_mut() {
            *v = v.clamp(lower, upper);
        }
    }

    fn r_squared(actual: &[f64], fitted: &[f64]) -> f64 {
        let m = mean(actual);
        let mut ss_tot = 0.0;
        let mut ss_res = 0.0;
        for (a, f) in actual.iter().zip(fitted.iter()) {
            ss_tot += (a - m).powi(2);
            ss_res += (a - f).powi(2);
        }
        if ss_tot < EPSILON {
            0.0
        } else {
            1.0 - ss_res / ss_tot
        }
    }

    /// Trend extrapolation from the accumulated last-two trend values,
    /// shrunk by the in-sample trend R-squared when the penalty is on.
    fn project_trend(&self, horizon: usize) -> Vec<f64> {
        let Some([prev, last]) = self.accumulated_trend else {
            return vec![0.0; horizon];
        };
        let slope = last - prev;
        let penalty = if self.params.trend_penalty {
            Self::r_squared(&self.preprocessed, &self.trend_component).max(0.0)
        } else {
            1.0
        };
        (0..horizon)
            .map(|h| (slope * (h + 1) as f64 + last) * penalty)
            .collect()
    }

    fn project_fourier(&self, coeffs: &SeasonalCoeffs, period: usize, horizon: usize) -> Vec<f64> {
        (0..horizon)
            .map(|h| {
                let t = (self.n + h) as f64;
                let mut value = 0.0;
                for k in 1..=coeffs.order {
                    let angle = 2.0 * std::f64::consts::PI * k as f64 * t / period as f64;
                    value += coeffs.sin[k - 1] * angle.sin() + coeffs.cos[k - 1] * angle.cos();
                }
                value
            })
            .collect()
    }

    /// Forecast on the transformed scale, before postprocessing.
    fn raw_forecast(&self, horizon: usize) -> Vec<f64> {
        let mut forecast = vec![0.0; horizon];

        if let Some(&median_value) = self.median_component.last() {
            for f in &mut forecast {
                *f += median_value;
            }
        }

        for (f, t) in forecast.iter_mut().zip(self.project_trend(horizon)) {
            *f += t;
        }

        for (period, coeffs) in &self.fourier_coeffs {
            for (f, s) in forecast
                .iter_mut()
                .zip(self.project_fourier(coeffs, *period, horizon))
            {
                *f += s;
            }
        }

        for f in &mut forecast {
            *f += self.final_level;
        }

        forecast
    }
}

impl Default for MFLES {
    fn default() -> Self {
        Self::new()
    }
}

impl Forecaster for MFLES {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        if series.is_multivariate() {
            return Err(ForecastError::DimensionMismatch {
                expected: 1,
                got: series.dimensions(),
            });
        }
        let raw = series.primary_values();
        let n = raw.len();
        if n < 4 {
            return Err(ForecastError::InsufficientData { needed: 4, got: n });
        }
        self.n = n;

        let preprocessed = self.preprocess(raw);
        self.preprocessed = preprocessed.clone();

        self.median_component = vec![0.0; n];
        self.trend_component = vec![0.0; n];
        self.level_component = vec![0.0; n];
        self.seasonal_components = self
            .params
            .seasonal_periods
            .iter()
            .map(|&p| (p, vec![0.0; n]))
            .collect();
        self.fourier_coeffs.clear();
        self.accumulated_trend = None;
        self.final_level = 0.0;
        self.actual_rounds = 0;

        let mut residuals = preprocessed.clone();
        let mut accumulated_level = 0.0;

        let data_range = {
            let max = preprocessed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = preprocessed.iter().copied().fold(f64::INFINITY, f64::min);
            max - min
        };

        for iter in 0..self.params.max_rounds {
            // Median baseline, first round only.
            if iter == 0 && self.params.lr_median > 0.0 {
                let median_fit = self.fit_median_component(&residuals);
                for i in 0..n {
                    let contribution = self.params.lr_median * median_fit[i];
                    self.median_component[i] += contribution;
                    residuals[i] -= contribution;
                }
            }

            // Trend.
            if self.params.lr_trend > 0.0 {
                let trend_fit = self.fit_trend(&residuals);
                match &mut self.accumulated_trend {
                    None => {
                        self.accumulated_trend = Some([trend_fit[n - 2], trend_fit[n - 1]]);
                    }
                    Some(acc) => {
                        acc[0] += self.params.lr_trend * trend_fit[n - 2];
                        acc[1] += self.params.lr_trend * trend_fit[n - 1];
                    }
                }
                for i in 0..n {
                    let contribution = self.params.lr_trend * trend_fit[i];
                    self.trend_component[i] += contribution;
                    residuals[i] -= contribution;
                }
            }

            // Fourier seasonality per period with at least two full cycles.
            if self.params.lr_season > 0.0 {
                for idx in 0..self.params.seasonal_periods.len() {
                    let period = self.params.seasonal_periods[idx];
                    if n < 2 * period {
                        continue;
                    }
                    let Some((seasonal_fit, coeffs)) = self.fit_fourier_season(
                        &residuals,
                        period,
                        self.params.seasonality_weights,
                    ) else {
                        continue;
                    };

                    match self
                        .fourier_coeffs
                        .iter_mut()
                        .find(|(p, _)| *p == period)
                    {
                        None => {
                            let mut scaled = coeffs;
                            for c in scaled.sin.iter_mut().chain(scaled.cos.iter_mut()) {
                                *c *= self.params.lr_season;
                            }
                            self.fourier_coeffs.push((period, scaled));
                        }
                        Some((_, acc)) => {
                            for (a, c) in acc.sin.iter_mut().zip(coeffs.sin.iter()) {
                                *a += self.params.lr_season * c;
                            }
                            for (a, c) in acc.cos.iter_mut().zip(coeffs.cos.iter()) {
                                *a += self.params.lr_season * c;
                            }
                        }
                    }

                    let component = &mut self.seasonal_components[idx].1;
                    for i in 0..n {
                        let contribution = self.params.lr_season * seasonal_fit[i];
                        component[i] += contribution;
                        residuals[i] -= contribution;
                    }
                }
            }

            // Residual smoothing, gated on MSE improvement.
            if self.params.lr_rs > 0.0 {
                let (rs_fit, level) = if self.params.smoother {
                    self.fit_moving_average(&residuals, self.params.ma_window)
                } else {
                    self.fit_es_ensemble(&residuals)
                };

                let mse_before = residuals.iter().map(|r| r * r).sum::<f64>() / n as f64;
                let mse_after = residuals
                    .iter()
                    .zip(rs_fit.iter())
                    .map(|(r, f)| {
                        let r = r - self.params.lr_rs * f;
                        r * r
                    })
                    .sum::<f64>()
                    / n as f64;

                if mse_after <= mse_before + self.params.round_penalty * mse_before {
                    accumulated_level += self.params.lr_rs * level;
                    for i in 0..n {
                        let contribution = self.params.lr_rs * rs_fit[i];
                        self.level_component[i] += contribution;
                        residuals[i] -= contribution;
                    }
                }
            }

            if self.params.cap_outliers
                && iter >= self.params.outlier_cap_start_round
                && iter % 5 == 0
            {
                self.cap_outliers(&mut residuals);
            }

            self.actual_rounds = iter + 1;

            let residual_rms =
                (residuals.iter().map(|r| r * r).sum::<f64>() / n as f64).sqrt();
            if residual_rms < self.params.convergence_threshold * data_range && iter >= 5 {
                break;
            }
        }

        self.final_level = accumulated_level;

        // Fitted values are the component sum on the transformed scale;
        // residuals are reported on the original scale.
        let mut fitted = vec![0.0; n];
        for i in 0..n {
            fitted[i] = self.median_component[i]
                + self.trend_component[i]
                + self.level_component[i];
            for (_, component) in &self.seasonal_components {
                fitted[i] += component[i];
            }
        }
        let fitted_original = self.postprocess(&fitted);
        let residuals_original: Vec<f64> = raw
            .iter()
            .zip(fitted_original.iter())
            .map(|(a, f)| a - f)
            .collect();

        self.fitted = Some(fitted);
        self.residuals = Some(residuals_original);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        if self.fitted.is_none() {
            return Err(ForecastError::FitRequired);
        }
        if horizon == 0 {
            return Ok(Forecast::new());
        }
        let forecast = self.raw_forecast(horizon);
        Ok(Forecast::from_values(self.postprocess(&forecast)))
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

        let residuals = self.residuals.as_ref().ok_or(ForecastError::FitRequired)?;
        let sigma = population_std_dev(residuals);
        let sigma = if sigma.is_finite() { sigma } else { 0.0 };
        let z = quantile_normal((1.0 + level) / 2.0);

        let preds = point.primary();
        let lower: Vec<f64> = preds
            .iter()
            .enumerate()
            .map(|(h, &p)| p - z * sigma * ((h + 1) as f64).sqrt())
            .collect();
        let upper: Vec<f64> = preds
            .iter()
            .enumerate()
            .map(|(h, &p)| p + z * sigma * ((h + 1) as f64).sqrt())
            .collect();

        Ok(Forecast::from_values_with_intervals(
            preds.to_vec(),
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
        "MFLES"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn make_timestamps(n: usize) -> Vec<chrono::DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::hours(i as i64)).collect()
    }

    fn make_seasonal_series(n: usize, period: usize) -> TimeSeries {
        let timestamps = make_timestamps(n);
        let values: Vec<f64> = (0..n)
            .map(|i| {
                let trend = 50.0 + 0.5 * i as f64;
                let seasonal =
                    10.0 * (2.0 * std::f64::consts::PI * (i % period) as f64 / period as f64).sin();
                let noise = ((i * 17) % 7) as f64 * 0.1 - 0.3;
                trend + seasonal + noise
            })
            .collect();
        TimeSeries::univariate(timestamps, values).unwrap()
    }

    #[test]
    fn mfles_basic() {
        let ts = make_seasonal_series(100, 12);
        let mut model = MFLES::new();
        model.fit(&ts).unwrap();

        let forecast = model.predict(12).unwrap();
        assert_eq!(forecast.horizon(), 12);
        assert!(forecast.primary().iter().all(|v| v.is_finite()));
        assert!(model.actual_rounds() >= 1);
    }

    #[test]
    fn mfles_captures_trend() {
        let ts = make_seasonal_series(100, 12);
        let mut model = MFLES::new();
        model.fit(&ts).unwrap();

        let forecast = model.predict(24).unwrap();
        let preds = forecast.primary();
        let first_half: f64 = preds[..12].iter().sum::<f64>() / 12.0;
        let second_half: f64 = preds[12..].iter().sum::<f64>() / 12.0;
        assert!(
            second_half > first_half,
            "trend should continue upward: {second_half} vs {first_half}"
        );
    }

    #[test]
    fn mfles_all_rates_zero_yields_zero_fit() {
        let ts = make_seasonal_series(60, 12);
        let mut model = MFLES::builder()
            .lr_median(0.0)
            .lr_trend(0.0)
            .lr_season(0.0)
            .lr_rs(0.0)
            .build()
            .unwrap();
        model.fit(&ts).unwrap();

        for &f in model.fitted_values().unwrap() {
            assert!(f.abs() < 1e-10);
        }
    }

    #[test]
    fn mfles_robust_trend_method() {
        let ts = make_seasonal_series(100, 12);
        let mut model = MFLES::builder()
            .trend_method(TrendMethod::SiegelRobust)
            .build()
            .unwrap();
        model.fit(&ts).unwrap();

        let forecast = model.predict(12).unwrap();
        assert!(forecast.primary().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn mfles_piecewise_trend_method() {
        // Slope change mid-series.
        let timestamps = make_timestamps(80);
        let values: Vec<f64> = (0..80)
            .map(|i| {
                if i < 40 {
                    10.0 + 0.2 * i as f64
                } else {
                    18.0 + 1.0 * (i - 40) as f64
                }
            })
            .collect();
        let ts = TimeSeries::univariate(timestamps, values).unwrap();

        let mut model = MFLES::builder()
            .trend_method(TrendMethod::Piecewise)
            .seasonal_periods(vec![])
            .build()
            .unwrap();
        model.fit(&ts).unwrap();

        let forecast = model.predict(5).unwrap();
        assert!(forecast.primary().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn mfles_moving_average_smoother() {
        let ts = make_seasonal_series(100, 12);
        let mut model = MFLES::builder()
            .smoother(true)
            .ma_window(6)
            .build()
            .unwrap();
        model.fit(&ts).unwrap();

        let forecast = model.predict(12).unwrap();
        assert_eq!(forecast.horizon(), 12);
    }

    #[test]
    fn mfles_confidence_intervals_widen_with_horizon() {
        let ts = make_seasonal_series(100, 12);
        let mut model = MFLES::new();
        model.fit(&ts).unwrap();

        let forecast = model.predict_with_intervals(12, 0.95).unwrap();
        assert!(forecast.has_intervals());

        let preds = forecast.primary();
        let lower = forecast.lower().unwrap();
        let upper = forecast.upper().unwrap();
        for i in 0..12 {
            assert!(lower[i] <= preds[i]);
            assert!(upper[i] >= preds[i]);
        }
        let w_first = upper[0] - lower[0];
        let w_last = upper[11] - lower[11];
        assert!(w_last >= w_first);
    }

    #[test]
    fn mfles_seasonal_decompose_components_sum() {
        let ts = make_seasonal_series(96, 12);
        let mut model = MFLES::new();
        model.fit(&ts).unwrap();

        let decomposition = model.seasonal_decompose().unwrap();
        assert_eq!(decomposition.trend.len(), 96);
        assert_eq!(decomposition.seasonal.len(), 96);
        assert_eq!(decomposition.level.len(), 96);
        assert_eq!(decomposition.residuals.len(), 96);
    }

    #[test]
    fn mfles_decompose_requires_fit() {
        let model = MFLES::new();
        assert!(matches!(
            model.seasonal_decompose(),
            Err(ForecastError::FitRequired)
        ));
    }

    #[test]
    fn mfles_requires_fit() {
        let model = MFLES::new();
        assert!(matches!(model.predict(5), Err(ForecastError::FitRequired)));
    }

    #[test]
    fn mfles_zero_horizon() {
        let ts = make_seasonal_series(60, 12);
        let mut model = MFLES::new();
        model.fit(&ts).unwrap();

        assert_eq!(model.predict(0).unwrap().horizon(), 0);
    }

    #[test]
    fn mfles_zero_horizon_still_checks_level() {
        let ts = make_seasonal_series(60, 12);
        let mut model = MFLES::new();
        model.fit(&ts).unwrap();

        assert!(matches!(
            model.predict_with_intervals(0, 5.0),
            Err(ForecastError::InvalidParameter(_))
        ));
    }

    #[test]
    fn mfles_insufficient_data() {
        let ts = TimeSeries::univariate(make_timestamps(3), vec![1.0, 2.0, 3.0]).unwrap();
        let mut model = MFLES::new();
        assert!(matches!(
            model.fit(&ts),
            Err(ForecastError::InsufficientData { .. })
        ));
    }

    #[test]
    fn mfles_rejects_invalid_params() {
        assert!(MFLES::builder().lr_trend(1.5).build().is_err());
        assert!(MFLES::builder().max_rounds(0).build().is_err());
        assert!(MFLES::builder()
            .seasonal_periods(vec![0])
            .build()
            .is_err());
        assert!(MFLES::with_params(MFLESParams {
            min_alpha: 0.9,
            max_alpha: 0.1,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn mfles_constant_series() {
        let ts = TimeSeries::univariate(make_timestamps(50), vec![42.0; 50]).unwrap();
        let mut model = MFLES::new();
        model.fit(&ts).unwrap();

        let forecast = model.predict(12).unwrap();
        for &pred in forecast.primary() {
            assert!((pred - 42.0).abs() < 1.0, "expected ~42, got {pred}");
        }
    }

    #[test]
    fn mfles_handles_negative_values() {
        let timestamps = make_timestamps(100);
        let values: Vec<f64> = (0..100)
            .map(|i| {
                let trend = 0.5 * i as f64;
                let seasonal = 10.0 * (2.0 * std::f64::consts::PI * (i % 12) as f64 / 12.0).sin();
                trend + seasonal - 30.0
            })
            .collect();
        let ts = TimeSeries::univariate(timestamps, values).unwrap();

        let mut model = MFLES::new();
        model.fit(&ts).unwrap();
        assert!(!model.is_multiplicative());

        let forecast = model.predict(12).unwrap();
        assert!(forecast.primary().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn mfles_early_stop_records_rounds() {
        // A pure line is explained almost immediately.
        let timestamps = make_timestamps(60);
        let values: Vec<f64> = (0..60).map(|i| 5.0 + 2.0 * i as f64).collect();
        let ts = TimeSeries::univariate(timestamps, values).unwrap();

        let mut model = MFLES::builder()
            .seasonal_periods(vec![])
            .build()
            .unwrap();
        model.fit(&ts).unwrap();

        assert!(model.actual_rounds() <= model.params().max_rounds);
    }

    #[test]
    fn mfles_refit_overwrites_state() {
        let ts1 = make_seasonal_series(60, 12);
        let ts2 = TimeSeries::univariate(make_timestamps(40), vec![7.0; 40]).unwrap();

        let mut model = MFLES::new();
        model.fit(&ts1).unwrap();
        model.fit(&ts2).unwrap();

        assert_eq!(model.fitted_values().unwrap().len(), 40);
        let forecast = model.predict(6).unwrap();
        for &pred in forecast.primary() {
            assert!((pred - 7.0).abs() < 1.0);
        }
    }

    #[test]
    fn mfles_name() {
        assert_eq!(MFLES::new().name(), "MFLES");
    }
}
