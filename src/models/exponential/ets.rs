//! ETS (Error-Trend-Seasonal) state-space forecasting model.
//!
//! Exponential smoothing in the state-space formulation: an error component
//! (additive or multiplicative), a trend component (none, additive,
//! multiplicative, each optionally damped) and a seasonal component (none,
//! additive, multiplicative) give 30 model combinations. Smoothing
//! parameters are estimated by maximum likelihood unless pinned.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::Forecaster;
use crate::utils::optimization::{nelder_mead, NelderMeadConfig};
use crate::utils::stats::quantile_normal;

const ALPHA_BOUNDS: (f64, f64) = (0.0001, 0.9999);
const PHI_BOUNDS: (f64, f64) = (0.8, 0.98);

/// Error component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorType {
    /// Additive errors
    #[default]
    Additive,
    /// Multiplicative errors
    Multiplicative,
}

/// Trend component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendType {
    /// No trend
    #[default]
    None,
    /// Additive trend
    Additive,
    /// Additive damped trend
    AdditiveDamped,
    /// Multiplicative trend
    Multiplicative,
    /// Multiplicative damped trend
    MultiplicativeDamped,
}

/// Seasonal component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeasonalType {
    /// No seasonality
    #[default]
    None,
    /// Additive seasonality
    Additive,
    /// Multiplicative seasonality
    Multiplicative,
}

/// ETS model specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ETSSpec {
    pub error: ErrorType,
    pub trend: TrendType,
    pub seasonal: SeasonalType,
}

impl ETSSpec {
    /// Create a new ETS specification.
    pub fn new(error: ErrorType, trend: TrendType, seasonal: SeasonalType) -> Self {
        Self {
            error,
            trend,
            seasonal,
        }
    }

    /// ETS(A,N,N) - Simple exponential smoothing with additive errors.
    pub fn ann() -> Self {
        Self::new(ErrorType::Additive, TrendType::None, SeasonalType::None)
    }

    /// ETS(A,A,N) - Holt's linear method with additive errors.
    pub fn aan() -> Self {
        Self::new(ErrorType::Additive, TrendType::Additive, SeasonalType::None)
    }

    /// ETS(A,Ad,N) - Damped trend with additive errors.
    pub fn aadn() -> Self {
        Self::new(
            ErrorType::Additive,
            TrendType::AdditiveDamped,
            SeasonalType::None,
        )
    }

    /// ETS(A,A,A) - Holt-Winters additive.
    pub fn aaa() -> Self {
        Self::new(
            ErrorType::Additive,
            TrendType::Additive,
            SeasonalType::Additive,
        )
    }

    /// ETS(A,A,M) - Holt-Winters multiplicative seasonality.
    pub fn aam() -> Self {
        Self::new(
            ErrorType::Additive,
            TrendType::Additive,
            SeasonalType::Multiplicative,
        )
    }

    /// ETS(M,N,N) - Simple exponential smoothing with multiplicative errors.
    pub fn mnn() -> Self {
        Self::new(
            ErrorType::Multiplicative,
            TrendType::None,
            SeasonalType::None,
        )
    }

    /// ETS(M,A,M) - Multiplicative Holt-Winters.
    pub fn mam() -> Self {
        Self::new(
            ErrorType::Multiplicative,
            TrendType::Additive,
            SeasonalType::Multiplicative,
        )
    }

    /// Get a short name for this specification, e.g. `"ETS(A,Ad,M)"`.
    pub fn short_name(&self) -> String {
        let e = match self.error {
            ErrorType::Additive => "A",
            ErrorType::Multiplicative => "M",
        };
        let t = match self.trend {
            TrendType::None => "N",
            TrendType::Additive => "A",
            TrendType::AdditiveDamped => "Ad",
            TrendType::Multiplicative => "M",
            TrendType::MultiplicativeDamped => "Md",
        };
        let s = match self.seasonal {
            SeasonalType::None => "N",
            SeasonalType::Additive => "A",
            SeasonalType::Multiplicative => "M",
        };
        format!("ETS({},{},{})", e, t, s)
    }

    /// Check if this model has a trend component.
    pub fn has_trend(&self) -> bool {
        !matches!(self.trend, TrendType::None)
    }

    /// Check if this model has a seasonal component.
    pub fn has_seasonal(&self) -> bool {
        !matches!(self.seasonal, SeasonalType::None)
    }

    /// Check if this model has a damped trend.
    pub fn is_damped(&self) -> bool {
        matches!(
            self.trend,
            TrendType::AdditiveDamped | TrendType::MultiplicativeDamped
        )
    }

    /// Check if the trend component is multiplicative.
    pub fn has_multiplicative_trend(&self) -> bool {
        matches!(
            self.trend,
            TrendType::Multiplicative | TrendType::MultiplicativeDamped
        )
    }

    /// Whether the model contains any multiplicative component, in which
    /// case the data must be strictly positive.
    pub fn requires_positive_data(&self) -> bool {
        self.error == ErrorType::Multiplicative
            || self.has_multiplicative_trend()
            || self.seasonal == SeasonalType::Multiplicative
    }
}

/// State carried through the smoothing recursion.
#[derive(Debug, Clone)]
struct State {
    level: f64,
    trend: f64,
    seasonals: Vec<f64>,
}

/// Outcome of one pass of the filter over the data.
struct FilterOutput {
    state: State,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    /// Sum of squared one-step errors, scaled relatively for
    /// multiplicative-error models.
    sum_sq_scaled: f64,
    /// Sum of `ln|mu_t|` over the filtered range (multiplicative error only).
    sum_log_mu: f64,
    /// Number of filtered observations.
    count: usize,
}

/// One fully specified set of smoothing parameters.
#[derive(Debug, Clone, Copy)]
struct ParamSet {
    alpha: f64,
    beta: f64,
    gamma: f64,
    phi: f64,
}

/// ETS state-space model.
#[derive(Debug, Clone)]
pub struct ETS {
    spec: ETSSpec,
    seasonal_period: usize,
    /// Pinned smoothing parameters; `None` means estimate.
    fixed_alpha: Option<f64>,
    fixed_beta: Option<f64>,
    fixed_gamma: Option<f64>,
    fixed_phi: Option<f64>,
    max_iterations: usize,
    // Fitted state
    alpha: Option<f64>,
    beta: Option<f64>,
    gamma: Option<f64>,
    phi: Option<f64>,
    state: Option<State>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
    residual_variance: Option<f64>,
    log_likelihood: Option<f64>,
    aic: Option<f64>,
    aicc: Option<f64>,
    bic: Option<f64>,
    n: usize,
}

impl ETS {
    /// Create a new ETS model with the given specification.
    ///
    /// Smoothing parameters are estimated at fit time by maximizing the
    /// Gaussian likelihood of the one-step errors.
    pub fn new(spec: ETSSpec, seasonal_period: usize) -> Self {
        Self {
            spec,
            seasonal_period: seasonal_period.max(1),
            fixed_alpha: None,
            fixed_beta: None,
            fixed_gamma: None,
            fixed_phi: None,
            max_iterations: 1000,
            alpha: None,
            beta: None,
            gamma: None,
            phi: None,
            state: None,
            fitted: None,
            residuals: None,
            residual_variance: None,
            log_likelihood: None,
            aic: None,
            aicc: None,
            bic: None,
            n: 0,
        }
    }

    /// ETS(A,N,N): simple exponential smoothing with estimated alpha.
    pub fn simple() -> Self {
        Self::new(ETSSpec::ann(), 1)
    }

    /// Create an ETS model with every applicable parameter pinned.
    pub fn with_params(
        spec: ETSSpec,
        seasonal_period: usize,
        alpha: f64,
        beta: Option<f64>,
        gamma: Option<f64>,
        phi: Option<f64>,
    ) -> Self {
        let mut model = Self::new(spec, seasonal_period);
        model.set_fixed_params(Some(alpha), beta, gamma, phi);
        model
    }

    /// Pin a subset of smoothing parameters; unpinned ones stay estimated.
    pub fn set_fixed_params(
        &mut self,
        alpha: Option<f64>,
        beta: Option<f64>,
        gamma: Option<f64>,
        phi: Option<f64>,
    ) {
        self.fixed_alpha = alpha.map(|a| a.clamp(ALPHA_BOUNDS.0, ALPHA_BOUNDS.1));
        self.fixed_beta = beta.map(|b| b.clamp(ALPHA_BOUNDS.0, ALPHA_BOUNDS.1));
        self.fixed_gamma = gamma.map(|g| g.clamp(ALPHA_BOUNDS.0, ALPHA_BOUNDS.1));
        self.fixed_phi = phi.map(|p| p.clamp(PHI_BOUNDS.0, PHI_BOUNDS.1));
    }

    /// Cap the optimizer iteration count.
    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations.max(1);
    }

    /// Get the model specification.
    pub fn spec(&self) -> ETSSpec {
        self.spec
    }

    /// Seasonal period used by the model.
    pub fn seasonal_period(&self) -> usize {
        self.seasonal_period
    }

    /// Level smoothing parameter after fitting.
    pub fn alpha(&self) -> Option<f64> {
        self.alpha
    }
    /// Trend smoothing parameter after fitting.
    pub fn beta(&self) -> Option<f64> {
        self.beta
    }
    /// Seasonal smoothing parameter after fitting.
    pub fn gamma(&self) -> Option<f64> {
        self.gamma
    }
    /// Damping parameter after fitting.
    pub fn phi(&self) -> Option<f64> {
        self.phi
    }

    /// Akaike information criterion.
    pub fn aic(&self) -> Option<f64> {
        self.aic
    }
    /// Corrected Akaike information criterion.
    pub fn aicc(&self) -> Option<f64> {
        self.aicc
    }
    /// Bayesian information criterion.
    pub fn bic(&self) -> Option<f64> {
        self.bic
    }
    /// Maximized log-likelihood.
    pub fn log_likelihood(&self) -> Option<f64> {
        self.log_likelihood
    }
    /// One-step residual variance.
    pub fn mse(&self) -> Option<f64> {
        self.residual_variance
    }
    /// Sum of squared one-step residuals past the warm-up prefix.
    pub fn sse(&self) -> Option<f64> {
        self.residual_variance
            .map(|v| v * self.n.saturating_sub(self.start_index()) as f64)
    }
    /// Number of observations the model was fitted on.
    pub fn sample_size(&self) -> usize {
        self.n
    }
    /// Final level state.
    pub fn last_level(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.level)
    }
    /// Final trend state.
    pub fn last_trend(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.trend)
    }

    /// Index of the first observation the filter produces a real one-step
    /// forecast for.
    fn start_index(&self) -> usize {
        if self.spec.has_seasonal() {
            self.seasonal_period
        } else {
            1
        }
    }

    /// Initialize level, trend, and seasonal states from the data head.
    fn initialize_state(&self, values: &[f64]) -> State {
        let period = self.seasonal_period;
        let seasonal = self.spec.has_seasonal() && values.len() >= period;

        let level = if seasonal {
            values.iter().take(period).sum::<f64>() / period as f64
        } else {
            values[0]
        };

        let trend = match self.spec.trend {
            TrendType::None => 0.0,
            TrendType::Additive | TrendType::AdditiveDamped => {
                if seasonal && values.len() >= 2 * period {
                    let sum: f64 = (0..period)
                        .map(|i| (values[period + i] - values[i]) / period as f64)
                        .sum();
                    sum / period as f64
                } else if values.len() >= 2 {
                    values[1] - values[0]
                } else {
                    0.0
                }
            }
            TrendType::Multiplicative | TrendType::MultiplicativeDamped => {
                // Growth factor; falls back to flat growth when the head of
                // the series does not support a ratio.
                if seasonal && values.len() >= 2 * period {
                    let first: f64 = values.iter().take(period).sum::<f64>() / period as f64;
                    let second: f64 =
                        values[period..2 * period].iter().sum::<f64>() / period as f64;
                    if first > 1e-10 && second > 0.0 {
                        (second / first).powf(1.0 / period as f64)
                    } else {
                        1.0
                    }
                } else if values.len() >= 2
                    && values[0].abs() > 1e-10
                    && values[1] / values[0] > 0.0
                {
                    values[1] / values[0]
                } else {
                    1.0
                }
            }
        };

        let seasonals = if seasonal {
            match self.spec.seasonal {
                SeasonalType::Additive => values.iter().take(period).map(|y| y - level).collect(),
                SeasonalType::Multiplicative => values
                    .iter()
                    .take(period)
                    .map(|y| if level.abs() > 1e-10 { y / level } else { 1.0 })
                    .collect(),
                SeasonalType::None => vec![],
            }
        } else {
            vec![]
        };

        State {
            level,
            trend,
            seasonals,
        }
    }

    /// Level after applying one step of trend.
    fn trended_level(&self, level: f64, trend: f64, phi: f64) -> f64 {
        match self.spec.trend {
            TrendType::None => level,
            TrendType::Additive => level + trend,
            TrendType::AdditiveDamped => level + phi * trend,
            TrendType::Multiplicative => level * trend,
            TrendType::MultiplicativeDamped => level * trend.abs().max(1e-10).powf(phi),
        }
    }

    /// Run the smoothing recursion over the series with the given parameters.
    fn run_filter(
        &self,
        values: &[f64],
        alpha: f64,
        beta: f64,
        gamma: f64,
        phi: f64,
    ) -> FilterOutput {
        let period = self.seasonal_period;
        let start_idx = self.start_index();
        let mut state = self.initialize_state(values);

        let mut fitted = Vec::with_capacity(values.len());
        let mut residuals = Vec::with_capacity(values.len());
        // Warm-up range: states are built from these observations.
        for &val in values.iter().take(start_idx.min(values.len())) {
            fitted.push(val);
            residuals.push(0.0);
        }

        let mut sum_sq_scaled = 0.0;
        let mut sum_log_mu = 0.0;
        let mut count = 0;

        for (t, &y) in values.iter().enumerate().skip(start_idx) {
            let season_idx = if self.spec.has_seasonal() {
                t % period
            } else {
                0
            };
            let s = if self.spec.has_seasonal() {
                state.seasonals[season_idx]
            } else {
                0.0
            };

            let base = self.trended_level(state.level, state.trend, phi);
            let mu = match self.spec.seasonal {
                SeasonalType::None => base,
                SeasonalType::Additive => base + s,
                SeasonalType::Multiplicative => base * s,
            };

            fitted.push(mu);
            let error = y - mu;
            residuals.push(error);

            let scaled = if self.spec.error == ErrorType::Multiplicative && mu.abs() > 1e-10 {
                error / mu
            } else {
                error
            };
            sum_sq_scaled += scaled * scaled;
            if self.spec.error == ErrorType::Multiplicative {
                sum_log_mu += mu.abs().max(1e-10).ln();
            }
            count += 1;

            // Seasonally adjusted observation for the level update.
            let y_adj = match self.spec.seasonal {
                SeasonalType::None => y,
                SeasonalType::Additive => y - s,
                SeasonalType::Multiplicative => {
                    if s.abs() > 1e-10 {
                        y / s
                    } else {
                        y
                    }
                }
            };

            let level_prev = state.level;
            state.level = alpha * y_adj + (1.0 - alpha) * base;

            match self.spec.trend {
                TrendType::None => {}
                TrendType::Additive => {
                    state.trend = beta * (state.level - level_prev) + (1.0 - beta) * state.trend;
                }
                TrendType::AdditiveDamped => {
                    state.trend =
                        beta * (state.level - level_prev) + (1.0 - beta) * phi * state.trend;
                }
                TrendType::Multiplicative => {
                    let growth = if level_prev.abs() > 1e-10 {
                        state.level / level_prev
                    } else {
                        state.trend
                    };
                    state.trend = beta * growth + (1.0 - beta) * state.trend;
                }
                TrendType::MultiplicativeDamped => {
                    let growth = if level_prev.abs() > 1e-10 {
                        state.level / level_prev
                    } else {
                        state.trend
                    };
                    state.trend =
                        beta * growth + (1.0 - beta) * state.trend.abs().max(1e-10).powf(phi);
                }
            }

            if self.spec.has_seasonal() {
                state.seasonals[season_idx] = match self.spec.seasonal {
                    SeasonalType::Additive => gamma * (y - state.level) + (1.0 - gamma) * s,
                    SeasonalType::Multiplicative => {
                        if state.level.abs() > 1e-10 {
                            gamma * (y / state.level) + (1.0 - gamma) * s
                        } else {
                            s
                        }
                    }
                    SeasonalType::None => s,
                };
            }
        }

        FilterOutput {
            state,
            fitted,
            residuals,
            sum_sq_scaled,
            sum_log_mu,
            count,
        }
    }

    /// Negative log-likelihood of the one-step errors under the given
    /// parameters. Multiplicative-error models carry the `ln|mu|` Jacobian.
    fn negative_log_likelihood(&self, values: &[f64], params: &ParamSet) -> f64 {
        if values.len() <= self.start_index() {
            return f64::MAX;
        }
        let out = self.run_filter(values, params.alpha, params.beta, params.gamma, params.phi);
        if out.count == 0 {
            return f64::MAX;
        }

        let n = out.count as f64;
        let sigma2 = (out.sum_sq_scaled / n).max(1e-300);
        let mut ll = -0.5 * n * (1.0 + sigma2.ln() + (2.0 * std::f64::consts::PI).ln());
        if self.spec.error == ErrorType::Multiplicative {
            ll -= out.sum_log_mu;
        }
        if !ll.is_finite() {
            return f64::MAX;
        }
        -ll
    }

    /// Estimate the free smoothing parameters with Nelder-Mead, holding any
    /// pinned parameters at their fixed values.
    fn optimize_params(&self, values: &[f64]) -> ParamSet {
        let config = NelderMeadConfig {
            max_iter: self.max_iterations,
            tolerance: 1e-8,
            ..Default::default()
        };

        // Layout of the free-parameter vector: whichever of
        // alpha/beta/gamma/phi are both applicable and unpinned, in order.
        let free_alpha = self.fixed_alpha.is_none();
        let free_beta = self.spec.has_trend() && self.fixed_beta.is_none();
        let free_gamma = self.spec.has_seasonal() && self.fixed_gamma.is_none();
        let free_phi = self.spec.is_damped() && self.fixed_phi.is_none();

        let mut initial = Vec::new();
        let mut bounds = Vec::new();
        if free_alpha {
            initial.push(0.3);
            bounds.push(ALPHA_BOUNDS);
        }
        if free_beta {
            initial.push(0.1);
            bounds.push(ALPHA_BOUNDS);
        }
        if free_gamma {
            initial.push(0.1);
            bounds.push(ALPHA_BOUNDS);
        }
        if free_phi {
            initial.push(0.98);
            bounds.push(PHI_BOUNDS);
        }

        let decode = |x: &[f64]| -> ParamSet {
            let mut idx = 0;
            let mut take = || {
                let v = x[idx];
                idx += 1;
                v
            };
            let alpha = if free_alpha {
                take().clamp(ALPHA_BOUNDS.0, ALPHA_BOUNDS.1)
            } else {
                self.fixed_alpha.unwrap_or(0.3)
            };
            let beta = if free_beta {
                take().clamp(ALPHA_BOUNDS.0, ALPHA_BOUNDS.1)
            } else {
                self.fixed_beta.unwrap_or(0.1)
            };
            let gamma = if free_gamma {
                take().clamp(ALPHA_BOUNDS.0, ALPHA_BOUNDS.1)
            } else {
                self.fixed_gamma.unwrap_or(0.1)
            };
            let phi = if free_phi {
                take().clamp(PHI_BOUNDS.0, PHI_BOUNDS.1)
            } else {
                self.fixed_phi.unwrap_or(0.98)
            };
            ParamSet {
                alpha,
                beta,
                gamma,
                phi,
            }
        };

        if initial.is_empty() {
            return decode(&[]);
        }

        let result = nelder_mead(
            |x| self.negative_log_likelihood(values, &decode(x)),
            &initial,
            Some(&bounds),
            config,
        );
        decode(&result.x)
    }

    /// Multi-step trend contribution to the forecast at horizon `h`.
    fn trend_at_horizon(&self, level: f64, trend: f64, phi: f64, h: usize) -> f64 {
        match self.spec.trend {
            TrendType::None => level,
            TrendType::Additive => level + h as f64 * trend,
            TrendType::AdditiveDamped => level + Self::damped_sum(phi, h) * trend,
            TrendType::Multiplicative => level * trend.abs().max(1e-10).powi(h as i32),
            TrendType::MultiplicativeDamped => {
                level * trend.abs().max(1e-10).powf(Self::damped_sum(phi, h))
            }
        }
    }

    /// `phi + phi^2 + ... + phi^h`.
    fn damped_sum(phi: f64, h: usize) -> f64 {
        if (phi - 1.0).abs() < 1e-10 {
            h as f64
        } else {
            phi * (1.0 - phi.powi(h as i32)) / (1.0 - phi)
        }
    }

    /// Number of estimated parameters: smoothing parameters plus initial
    /// states, as counted for the information criteria.
    fn num_params(&self) -> usize {
        let mut count = 2; // alpha, initial level
        if self.spec.has_trend() {
            count += 2; // beta, initial trend
        }
        if self.spec.is_damped() {
            count += 1; // phi
        }
        if self.spec.has_seasonal() {
            count += 1 + self.seasonal_period; // gamma, initial indices
        }
        count
    }

    fn point_forecast(&self, state: &State, phi: f64, h: usize) -> f64 {
        let base = self.trend_at_horizon(state.level, state.trend, phi, h);
        if self.spec.has_seasonal() {
            let s = state.seasonals[(self.n + h - 1) % self.seasonal_period];
            match self.spec.seasonal {
                SeasonalType::Additive => base + s,
                SeasonalType::Multiplicative => base * s,
                SeasonalType::None => base,
            }
        } else {
            base
        }
    }

    /// Fit the model against raw values; used by the `Forecaster`
    /// implementation and directly by model selection.
    pub fn fit_values(&mut self, values: &[f64]) -> Result<()> {
        let min_len = if self.spec.has_seasonal() {
            2 * self.seasonal_period
        } else {
            2
        };
        if values.len() < min_len {
            return Err(ForecastError::InsufficientData {
                needed: min_len,
                got: values.len(),
            });
        }
        if self.spec.requires_positive_data() && values.iter().any(|&v| v <= 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "{} requires strictly positive data",
                self.spec.short_name()
            )));
        }

        self.n = values.len();

        let all_pinned = self.fixed_alpha.is_some()
            && (!self.spec.has_trend() || self.fixed_beta.is_some())
            && (!self.spec.has_seasonal() || self.fixed_gamma.is_some())
            && (!self.spec.is_damped() || self.fixed_phi.is_some());
        let params = if all_pinned {
            ParamSet {
                alpha: self.fixed_alpha.unwrap_or(0.3),
                beta: self.fixed_beta.unwrap_or(0.1),
                gamma: self.fixed_gamma.unwrap_or(0.1),
                phi: self.fixed_phi.unwrap_or(0.98),
            }
        } else {
            self.optimize_params(values)
        };

        self.alpha = Some(params.alpha);
        self.beta = self.spec.has_trend().then_some(params.beta);
        self.gamma = self.spec.has_seasonal().then_some(params.gamma);
        self.phi = if self.spec.is_damped() {
            Some(params.phi)
        } else {
            None
        };

        let out = self.run_filter(values, params.alpha, params.beta, params.gamma, params.phi);

        if out.count > 0 {
            let n = out.count as f64;
            let start_idx = self.start_index();
            let variance = out.residuals[start_idx..]
                .iter()
                .map(|r| r * r)
                .sum::<f64>()
                / n;
            self.residual_variance = Some(variance);

            let sigma2 = (out.sum_sq_scaled / n).max(1e-300);
            let mut ll = -0.5 * n * (1.0 + sigma2.ln() + (2.0 * std::f64::consts::PI).ln());
            if self.spec.error == ErrorType::Multiplicative {
                ll -= out.sum_log_mu;
            }
            let k = self.num_params() as f64;
            self.log_likelihood = Some(ll);
            self.aic = Some(-2.0 * ll + 2.0 * k);
            self.aicc = Some(-2.0 * ll + 2.0 * k * n / (n - k - 1.0).max(1.0));
            self.bic = Some(-2.0 * ll + k * n.ln());
        }

        self.state = Some(out.state);
        self.fitted = Some(out.fitted);
        self.residuals = Some(out.residuals);

        Ok(())
    }
}

impl Default for ETS {
    fn default() -> Self {
        Self::simple()
    }
}

impl Forecaster for ETS {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        if series.is_multivariate() {
            return Err(ForecastError::DimensionMismatch {
                expected: 1,
                got: series.dimensions(),
            });
        }
        self.fit_values(series.primary_values())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let state = self.state.as_ref().ok_or(ForecastError::FitRequired)?;
        let phi = self.phi.unwrap_or(1.0);

        if horizon == 0 {
            return Ok(Forecast::new());
        }

        let predictions: Vec<f64> = (1..=horizon)
            .map(|h| self.point_forecast(state, phi, h))
            .collect();
        Ok(Forecast::from_values(predictions))
    }

    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<Forecast> {
        let state = self.state.as_ref().ok_or(ForecastError::FitRequired)?;
        let phi = self.phi.unwrap_or(1.0);
        let variance = self.residual_variance.unwrap_or(0.0);

        if !(0.0..1.0).contains(&level) || level <= 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "confidence level must be in (0, 1), got {level}"
            )));
        }
        if horizon == 0 {
            return Ok(Forecast::new());
        }

        let z = quantile_normal((1.0 + level) / 2.0);
        let period = self.seasonal_period;

        let mut predictions = Vec::with_capacity(horizon);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);

        for h in 1..=horizon {
            let pred = self.point_forecast(state, phi, h);
            predictions.push(pred);

            // Variance grows with the number of state updates between the
            // forecast origin and the horizon step.
            let k = if self.spec.has_seasonal() {
                ((h - 1) / period) + 1
            } else {
                h
            };
            let se = (variance * k as f64).sqrt();
            lower.push(pred - z * se);
            upper.push(pred + z * se);
        }

        Ok(Forecast::from_values_with_intervals(
            predictions,
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
        "ETS"
    }

    fn aic(&self) -> Option<f64> {
        self.aic
    }

    fn bic(&self) -> Option<f64> {
        self.bic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn make_timestamps(n: usize) -> Vec<chrono::DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::hours(i as i64)).collect()
    }

    fn make_series(values: Vec<f64>) -> TimeSeries {
        TimeSeries::univariate(make_timestamps(values.len()), values).unwrap()
    }

    #[test]
    fn ets_ann_flat_forecast() {
        let values: Vec<f64> = (0..20).map(|i| 10.0 + (i as f64 * 0.1).sin()).collect();
        let ts = make_series(values);

        let mut model = ETS::simple();
        model.fit(&ts).unwrap();

        let forecast = model.predict(5).unwrap();
        assert_eq!(forecast.horizon(), 5);

        let preds = forecast.primary();
        assert_relative_eq!(preds[0], preds[4], epsilon = 1e-10);
    }

    #[test]
    fn ets_aan_extends_trend() {
        let values: Vec<f64> = (0..20).map(|i| 10.0 + 2.0 * i as f64).collect();
        let ts = make_series(values);

        let mut model = ETS::new(ETSSpec::aan(), 1);
        model.fit(&ts).unwrap();

        let forecast = model.predict(5).unwrap();
        let preds = forecast.primary();
        assert!(preds[4] > preds[0]);
    }

    #[test]
    fn ets_aaa_seasonal() {
        let values: Vec<f64> = (0..32)
            .map(|i| 10.0 + 3.0 * (2.0 * std::f64::consts::PI * i as f64 / 8.0).sin())
            .collect();
        let ts = make_series(values);

        let mut model = ETS::new(ETSSpec::aaa(), 8);
        model.fit(&ts).unwrap();

        let forecast = model.predict(8).unwrap();
        assert_eq!(forecast.horizon(), 8);
        assert!(forecast.primary().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn ets_damped_trend_is_more_conservative() {
        let values: Vec<f64> = (0..30).map(|i| 10.0 + 2.0 * i as f64).collect();
        let ts = make_series(values);

        let mut model_undamped = ETS::new(ETSSpec::aan(), 1);
        let mut model_damped = ETS::new(ETSSpec::aadn(), 1);
        model_undamped.fit(&ts).unwrap();
        model_damped.fit(&ts).unwrap();

        let f_undamped = model_undamped.predict(10).unwrap();
        let f_damped = model_damped.predict(10).unwrap();
        assert!(f_undamped.primary()[9] > f_damped.primary()[9]);
    }

    #[test]
    fn ets_multiplicative_trend_compounds() {
        let values: Vec<f64> = (0..25).map(|i| 100.0 * 1.05_f64.powi(i)).collect();
        let ts = make_series(values);

        let mut model = ETS::new(
            ETSSpec::new(
                ErrorType::Additive,
                TrendType::Multiplicative,
                SeasonalType::None,
            ),
            1,
        );
        model.fit(&ts).unwrap();

        let preds = model.predict(5).unwrap();
        let p = preds.primary();
        // Exponential growth forecasts grow by a roughly constant factor.
        assert!(p[4] > p[0]);
        let r1 = p[1] / p[0];
        let r4 = p[4] / p[3];
        assert_relative_eq!(r1, r4, epsilon = 0.02);
        assert!(r1 > 1.0);
    }

    #[test]
    fn ets_multiplicative_trend_rejects_nonpositive_data() {
        let values: Vec<f64> = (0..10).map(|i| i as f64 - 3.0).collect();
        let ts = make_series(values);

        let mut model = ETS::new(
            ETSSpec::new(
                ErrorType::Additive,
                TrendType::Multiplicative,
                SeasonalType::None,
            ),
            1,
        );
        assert!(matches!(
            model.fit(&ts),
            Err(ForecastError::InvalidParameter(_))
        ));
    }

    #[test]
    fn ets_with_fixed_params() {
        let values: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let ts = make_series(values);

        let mut model = ETS::with_params(ETSSpec::aan(), 1, 0.5, Some(0.1), None, None);
        model.fit(&ts).unwrap();

        assert_relative_eq!(model.alpha().unwrap(), 0.5, epsilon = 1e-10);
        assert_relative_eq!(model.beta().unwrap(), 0.1, epsilon = 1e-10);
    }

    #[test]
    fn ets_partial_pinning_estimates_the_rest() {
        let values: Vec<f64> = (0..30).map(|i| 5.0 + 0.5 * i as f64).collect();
        let ts = make_series(values);

        let mut model = ETS::new(ETSSpec::aan(), 1);
        model.set_fixed_params(Some(0.4), None, None, None);
        model.fit(&ts).unwrap();

        assert_relative_eq!(model.alpha().unwrap(), 0.4, epsilon = 1e-10);
        assert!(model.beta().is_some());
    }

    #[test]
    fn ets_confidence_intervals_bracket_predictions() {
        let values: Vec<f64> = (0..20).map(|i| 10.0 + i as f64).collect();
        let ts = make_series(values);

        let mut model = ETS::simple();
        model.fit(&ts).unwrap();

        let forecast = model.predict_with_intervals(5, 0.95).unwrap();
        assert!(forecast.has_intervals());

        let lower = forecast.lower().unwrap();
        let upper = forecast.upper().unwrap();
        let preds = forecast.primary();
        for i in 0..5 {
            assert!(lower[i] < preds[i]);
            assert!(upper[i] > preds[i]);
        }
    }

    #[test]
    fn ets_interval_width_grows_with_confidence() {
        let values: Vec<f64> = (0..25).map(|i| 10.0 + (i as f64 * 0.7).sin()).collect();
        let ts = make_series(values);

        let mut model = ETS::simple();
        model.fit(&ts).unwrap();

        let f80 = model.predict_with_intervals(5, 0.80).unwrap();
        let f99 = model.predict_with_intervals(5, 0.99).unwrap();
        let w80 = f80.upper().unwrap()[0] - f80.lower().unwrap()[0];
        let w99 = f99.upper().unwrap()[0] - f99.lower().unwrap()[0];
        assert!(w99 > w80);
    }

    #[test]
    fn ets_information_criteria_present_after_fit() {
        let values: Vec<f64> = (0..30).map(|i| 10.0 + (i as f64 * 0.5).sin()).collect();
        let ts = make_series(values);

        let mut model = ETS::simple();
        model.fit(&ts).unwrap();

        assert!(model.aic().is_some());
        assert!(model.aicc().is_some());
        assert!(model.bic().is_some());
        assert!(model.log_likelihood().is_some());
        assert!(model.aicc().unwrap() >= model.aic().unwrap());
    }

    #[test]
    fn ets_spec_short_names() {
        assert_eq!(ETSSpec::ann().short_name(), "ETS(A,N,N)");
        assert_eq!(ETSSpec::aan().short_name(), "ETS(A,A,N)");
        assert_eq!(ETSSpec::aadn().short_name(), "ETS(A,Ad,N)");
        assert_eq!(ETSSpec::aaa().short_name(), "ETS(A,A,A)");
        assert_eq!(ETSSpec::mam().short_name(), "ETS(M,A,M)");
        assert_eq!(
            ETSSpec::new(
                ErrorType::Multiplicative,
                TrendType::MultiplicativeDamped,
                SeasonalType::None
            )
            .short_name(),
            "ETS(M,Md,N)"
        );
    }

    #[test]
    fn ets_insufficient_data() {
        let ts = make_series(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut model = ETS::new(ETSSpec::aaa(), 8);
        assert!(matches!(
            model.fit(&ts),
            Err(ForecastError::InsufficientData { .. })
        ));
    }

    #[test]
    fn ets_requires_fit() {
        let model = ETS::simple();
        assert!(matches!(model.predict(5), Err(ForecastError::FitRequired)));
        assert!(matches!(
            model.predict_with_intervals(5, 0.95),
            Err(ForecastError::FitRequired)
        ));
    }

    #[test]
    fn ets_zero_horizon() {
        let ts = make_series((0..10).map(|i| i as f64).collect());
        let mut model = ETS::simple();
        model.fit(&ts).unwrap();

        let forecast = model.predict(0).unwrap();
        assert_eq!(forecast.horizon(), 0);
    }

    #[test]
    fn ets_zero_horizon_still_checks_level() {
        let ts = make_series((0..10).map(|i| i as f64).collect());
        let mut model = ETS::simple();
        model.fit(&ts).unwrap();

        assert!(matches!(
            model.predict_with_intervals(0, 5.0),
            Err(ForecastError::InvalidParameter(_))
        ));
    }

    #[test]
    fn ets_multiplicative_seasonal() {
        let values: Vec<f64> = (0..24)
            .map(|i| {
                let seasonal = 1.0 + 0.3 * (2.0 * std::f64::consts::PI * i as f64 / 6.0).sin();
                100.0 * seasonal
            })
            .collect();
        let ts = make_series(values);

        let mut model = ETS::new(ETSSpec::aam(), 6);
        model.fit(&ts).unwrap();

        let forecast = model.predict(6).unwrap();
        assert_eq!(forecast.horizon(), 6);
        assert!(forecast.primary().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn ets_fitted_and_residuals_cover_series() {
        let ts = make_series((0..15).map(|i| 3.0 + i as f64).collect());
        let mut model = ETS::new(ETSSpec::aan(), 1);
        model.fit(&ts).unwrap();

        assert_eq!(model.fitted_values().unwrap().len(), 15);
        assert_eq!(model.residuals().unwrap().len(), 15);
    }

    #[test]
    fn ets_fit_statistics_are_consistent() {
        let ts = make_series((0..20).map(|i| 5.0 + 0.5 * i as f64).collect());
        let mut model = ETS::new(ETSSpec::aan(), 1);
        model.fit(&ts).unwrap();

        assert_eq!(model.sample_size(), 20);
        let mse = model.mse().unwrap();
        let sse = model.sse().unwrap();
        assert!(mse >= 0.0);
        assert!((sse - mse * 19.0).abs() < 1e-9);
        assert!(model.last_level().is_some());
        assert!(model.last_trend().is_some());
    }
}
