//! Automatic MFLES configuration search.
//!
//! AutoMFLES scores a small grid of smoothing configurations by rolling-origin
//! cross-validation and refits the winner on the full series. The grid varies
//! the residual smoother (ES ensemble vs. moving averages of several widths),
//! recency weighting of the seasonal fit, and whether seasonality is used at
//! all; everything else comes from the base parameters.

use std::time::Instant;

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::mfles::{MFLESParams, MFLES};
use crate::models::Forecaster;
use crate::utils::cross_validation::{cross_validate, CVConfig, CVStrategy};

/// Fallback CV horizon when no seasonal period is configured.
const DEFAULT_HORIZON: usize = 7;
/// Moving-average window codes tried by the grid. Negative codes are
/// resolved against the dominant seasonal period; `-3` selects the ES
/// ensemble instead of a moving average.
const MA_WINDOW_CODES: [i64; 3] = [-1, -2, -3];

/// Configuration for the AutoMFLES search.
#[derive(Debug, Clone)]
pub struct AutoMFLESConfig {
    /// Base hyperparameters shared by every candidate.
    pub base_params: MFLESParams,
    /// CV forecast horizon; `None` uses the dominant seasonal period.
    pub cv_horizon: Option<usize>,
    /// CV initial training window; `None` derives it from the horizon.
    pub cv_initial_window: Option<usize>,
    /// CV step between fold origins; `None` uses the horizon.
    pub cv_step: Option<usize>,
    /// CV windowing strategy.
    pub cv_strategy: CVStrategy,
}

impl Default for AutoMFLESConfig {
    fn default() -> Self {
        Self {
            base_params: MFLESParams::default(),
            cv_horizon: None,
            cv_initial_window: None,
            cv_step: None,
            cv_strategy: CVStrategy::Rolling,
        }
    }
}

impl AutoMFLESConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seasonal_periods(mut self, periods: Vec<usize>) -> Self {
        self.base_params.seasonal_periods = periods;
        self
    }

    pub fn with_base_params(mut self, params: MFLESParams) -> Self {
        self.base_params = params;
        self
    }

    pub fn with_cv_horizon(mut self, horizon: usize) -> Self {
        self.cv_horizon = Some(horizon);
        self
    }

    pub fn with_cv_initial_window(mut self, window: usize) -> Self {
        self.cv_initial_window = Some(window);
        self
    }

    pub fn with_cv_step(mut self, step: usize) -> Self {
        self.cv_step = Some(step);
        self
    }

    pub fn with_cv_strategy(mut self, strategy: CVStrategy) -> Self {
        self.cv_strategy = strategy;
        self
    }
}

/// Search diagnostics from the last fit.
#[derive(Debug, Clone, Default)]
pub struct AutoMFLESDiagnostics {
    /// Candidate configurations scored.
    pub configs_evaluated: usize,
    /// Cross-validation MAE of the winner.
    pub best_cv_mae: f64,
    /// Winner's recency weighting flag.
    pub best_seasonality_weights: bool,
    /// Winner's smoother flag (moving average vs. ES ensemble).
    pub best_smoother: bool,
    /// Winner's resolved moving-average window (0 for the ES ensemble).
    pub best_ma_window: usize,
    /// Whether the winner used seasonality.
    pub best_seasonality: bool,
    /// Wall-clock search time in milliseconds.
    pub optimization_time_ms: u64,
}

/// One point of the candidate grid, already resolved to concrete params.
#[derive(Debug, Clone)]
struct Candidate {
    params: MFLESParams,
    seasonality_weights: bool,
    smoother: bool,
    ma_window: usize,
    seasonal: bool,
}

/// Automatic MFLES model selection by time series cross-validation.
#[derive(Default)]
pub struct AutoMFLES {
    config: AutoMFLESConfig,
    selected: Option<MFLES>,
    diagnostics: Option<AutoMFLESDiagnostics>,
}

impl AutoMFLES {
    /// Create an AutoMFLES with default configuration (monthly seasonality).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an AutoMFLES with the given seasonal periods.
    pub fn with_seasonal_periods(periods: Vec<usize>) -> Self {
        Self::with_config(AutoMFLESConfig::new().with_seasonal_periods(periods))
    }

    /// Create an AutoMFLES with a full configuration.
    pub fn with_config(config: AutoMFLESConfig) -> Self {
        Self {
            config,
            selected: None,
            diagnostics: None,
        }
    }

    /// Search diagnostics from the last fit.
    pub fn diagnostics(&self) -> Result<&AutoMFLESDiagnostics> {
        self.diagnostics.as_ref().ok_or(ForecastError::FitRequired)
    }

    /// The refitted winning model.
    pub fn selected_model(&self) -> Result<&MFLES> {
        self.selected.as_ref().ok_or(ForecastError::FitRequired)
    }

    /// The winning model's full parameter set. Refitting a plain
    /// [`MFLES`] with these parameters reproduces the selection.
    pub fn selected_params(&self) -> Result<&MFLESParams> {
        Ok(self.selected_model()?.params())
    }

    /// Whether the winner weights recent seasonal cycles more heavily.
    pub fn selected_seasonality_weights(&self) -> Result<bool> {
        Ok(self.selected_params()?.seasonality_weights)
    }

    /// Whether the winner smooths residuals with a moving average.
    pub fn selected_smoother(&self) -> Result<bool> {
        Ok(self.selected_params()?.smoother)
    }

    /// The winner's moving-average window; meaningful when
    /// [`selected_smoother`](Self::selected_smoother) is true.
    pub fn selected_ma_window(&self) -> Result<usize> {
        Ok(self.selected_params()?.ma_window)
    }

    /// The winner's seasonal periods (empty when seasonality lost).
    pub fn selected_seasonal_periods(&self) -> Result<&[usize]> {
        Ok(&self.selected_params()?.seasonal_periods)
    }

    /// Resolve a negative window code against the dominant period.
    fn resolve_ma_window(&self, code: i64) -> usize {
        let period = self.config.base_params.seasonal_periods.first().copied();
        match code {
            -1 => period.unwrap_or(5).max(1),
            -2 => period.map(|p| (p / 2).max(1)).unwrap_or(3),
            other if other > 0 => other as usize,
            _ => 0,
        }
    }

    fn build_grid(&self) -> Vec<Candidate> {
        let mut grid = Vec::new();
        let has_periods = !self.config.base_params.seasonal_periods.is_empty();
        let season_options: &[bool] = if has_periods {
            &[true, false]
        } else {
            &[false]
        };

        for &seasonality_weights in &[false, true] {
            for &smoother_flag in &[false, true] {
                for &window_code in &MA_WINDOW_CODES {
                    for &seasonal in season_options {
                        // Code -3 and the ES flag both mean "no moving
                        // average"; keep the grid shape regardless.
                        let use_ma = smoother_flag && window_code != -3;
                        let ma_window = if use_ma {
                            self.resolve_ma_window(window_code)
                        } else {
                            0
                        };

                        let mut params = self.config.base_params.clone();
                        params.seasonality_weights = seasonality_weights;
                        params.smoother = use_ma;
                        params.ma_window = if use_ma { ma_window } else { params.ma_window };
                        if !seasonal {
                            params.seasonal_periods = Vec::new();
                        }

                        grid.push(Candidate {
                            params,
                            seasonality_weights,
                            smoother: use_ma,
                            ma_window,
                            seasonal,
                        });
                    }
                }
            }
        }
        grid
    }

    fn cv_config(&self, n: usize) -> CVConfig {
        let horizon = self
            .config
            .cv_horizon
            .or_else(|| self.config.base_params.seasonal_periods.first().copied())
            .unwrap_or(DEFAULT_HORIZON)
            .max(1);

        // The derived window is clamped so short series still get at least
        // one fold.
        let initial_window = self
            .config
            .cv_initial_window
            .unwrap_or(10 * horizon)
            .min(n.saturating_sub(horizon))
            .max(4);

        let step = self.config.cv_step.unwrap_or(horizon).max(1);

        CVConfig {
            horizon,
            initial_window,
            step_size: step,
            strategy: self.cv_strategy(),
            seasonal_period: self.config.base_params.seasonal_periods.first().copied(),
        }
    }

    fn cv_strategy(&self) -> CVStrategy {
        self.config.cv_strategy
    }

    fn score(&self, cv: &CVConfig, series: &TimeSeries, candidate: &Candidate) -> f64 {
        let template = match MFLES::with_params(candidate.params.clone()) {
            Ok(model) => model,
            Err(_) => return f64::INFINITY,
        };
        let result = cross_validate(cv, series, || template.clone());
        match result {
            Ok(results) if results.n_folds > 0 && results.aggregated.mae.is_finite() => {
                results.aggregated.mae
            }
            _ => f64::INFINITY,
        }
    }
}

impl Forecaster for AutoMFLES {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        let start = Instant::now();
        if series.is_multivariate() {
            return Err(ForecastError::DimensionMismatch {
                expected: 1,
                got: series.dimensions(),
            });
        }
        let n = series.len();
        if n < 8 {
            return Err(ForecastError::InsufficientData { needed: 8, got: n });
        }
        self.config.base_params.validate()?;

        let cv = self.cv_config(n);
        if cv.initial_window + cv.horizon > n {
            return Err(ForecastError::InsufficientData {
                needed: cv.initial_window + cv.horizon,
                got: n,
            });
        }

        let grid = self.build_grid();
        let mut best: Option<(f64, Candidate)> = None;
        let mut evaluated = 0usize;

        for candidate in grid {
            let score = self.score(&cv, series, &candidate);
            evaluated += 1;
            let improves = match &best {
                None => true,
                Some((best_score, _)) => score < *best_score,
            };
            if improves {
                best = Some((score, candidate));
            }
        }

        let (best_score, winner) = best.ok_or_else(|| {
            ForecastError::ComputationError("no MFLES configuration could be evaluated".to_string())
        })?;
        if !best_score.is_finite() {
            return Err(ForecastError::ComputationError(
                "every MFLES configuration failed cross-validation".to_string(),
            ));
        }

        let mut model = MFLES::with_params(winner.params.clone())?;
        model.fit(series)?;
        self.selected = Some(model);

        self.diagnostics = Some(AutoMFLESDiagnostics {
            configs_evaluated: evaluated,
            best_cv_mae: best_score,
            best_seasonality_weights: winner.seasonality_weights,
            best_smoother: winner.smoother,
            best_ma_window: winner.ma_window,
            best_seasonality: winner.seasonal,
            optimization_time_ms: start.elapsed().as_millis() as u64,
        });
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        self.selected_model()?.predict(horizon)
    }

    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<Forecast> {
        self.selected_model()?.predict_with_intervals(horizon, level)
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.selected.as_ref().and_then(|m| m.fitted_values())
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.selected.as_ref().and_then(|m| m.residuals())
    }

    fn name(&self) -> &str {
        "AutoMFLES"
    }
}
