//! Automatic ETS model selection.
//!
//! AutoETS enumerates every (error, trend, seasonal, damped) combination
//! consistent with a specification mask and damping policy, fits each
//! candidate by maximum likelihood, and keeps the one with the lowest
//! information criterion. Candidate failures are counted, not propagated;
//! fit() only fails when no candidate converges.

use std::time::Instant;

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::exponential::ets::{ETSSpec, ErrorType, SeasonalType, TrendType, ETS};
use crate::models::Forecaster;

/// Selection criterion for AutoETS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionCriterion {
    /// Akaike Information Criterion
    AIC,
    /// Corrected Akaike Information Criterion
    #[default]
    AICc,
    /// Bayesian Information Criterion
    BIC,
}

/// Damped-trend search policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DampedPolicy {
    /// Try both damped and undamped variants of every trendful candidate.
    #[default]
    Auto,
    /// Only damped trends.
    Always,
    /// Only undamped trends.
    Never,
}

/// Configuration for AutoETS.
#[derive(Debug, Clone)]
pub struct AutoETSConfig {
    /// Specification mask, three characters (error, trend, seasonal) over
    /// `{A, M, N, Z}` where `Z` searches every valid type, or four
    /// characters with a literal `d` in third position to force damping,
    /// e.g. `"ZZZ"`, `"AAN"`, `"AAdN"`.
    pub spec: String,
    /// Selection criterion to use.
    pub criterion: SelectionCriterion,
    /// Seasonal period (`None` for non-seasonal).
    pub seasonal_period: Option<usize>,
    /// Damped-trend policy, overridden by a `d` in the mask.
    pub damped: DampedPolicy,
    /// Pinned smoothing parameters; unpinned ones are estimated.
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    pub phi: Option<f64>,
    /// Iteration cap for the per-candidate optimizer.
    pub max_iterations: usize,
    /// Include multiplicative trends in `Z` searches. Off by default;
    /// compounding trends extrapolate aggressively.
    pub allow_multiplicative_trend: bool,
}

impl Default for AutoETSConfig {
    fn default() -> Self {
        Self {
            spec: "ZZZ".to_string(),
            criterion: SelectionCriterion::AICc,
            seasonal_period: None,
            damped: DampedPolicy::Auto,
            alpha: None,
            beta: None,
            gamma: None,
            phi: None,
            max_iterations: 300,
            allow_multiplicative_trend: false,
        }
    }
}

impl AutoETSConfig {
    /// Configuration for non-seasonal data.
    pub fn non_seasonal() -> Self {
        Self {
            seasonal_period: Some(1),
            ..Default::default()
        }
    }

    /// Configuration with a specific seasonal period.
    pub fn with_period(period: usize) -> Self {
        Self {
            seasonal_period: Some(period),
            ..Default::default()
        }
    }

    /// Set the specification mask.
    pub fn with_spec(mut self, spec: impl Into<String>) -> Self {
        self.spec = spec.into();
        self
    }

    /// Set the selection criterion.
    pub fn with_criterion(mut self, criterion: SelectionCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the damping policy.
    pub fn with_damped(mut self, damped: DampedPolicy) -> Self {
        self.damped = damped;
        self
    }

    /// Pin the level smoothing parameter.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// Pin the trend smoothing parameter.
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = Some(beta);
        self
    }

    /// Pin the seasonal smoothing parameter.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = Some(gamma);
        self
    }

    /// Pin the damping parameter.
    pub fn with_phi(mut self, phi: f64) -> Self {
        self.phi = Some(phi);
        self
    }

    /// Cap the optimizer iterations per candidate.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Include multiplicative trends in the search space.
    pub fn with_multiplicative_trend(mut self) -> Self {
        self.allow_multiplicative_trend = true;
        self
    }
}

/// The options a parsed mask allows for each component slot.
#[derive(Debug, Clone)]
struct MaskOptions {
    errors: Vec<ErrorType>,
    trends: Vec<TrendType>,
    seasonals: Vec<SeasonalType>,
    /// `Some(true)` when the mask carries a literal `d`.
    forced_damped: bool,
}

/// Diagnostics from one AutoETS search.
#[derive(Debug, Clone)]
pub struct AutoETSDiagnostics {
    /// Candidate specifications fitted (including failures).
    pub models_evaluated: usize,
    /// Candidates that failed to fit or produced no criterion.
    pub models_failed: usize,
    /// Criterion value of the winner.
    pub best_score: f64,
    /// Short name of the winning specification.
    pub best_model: String,
    /// Wall-clock duration of the whole search in milliseconds.
    pub optimization_time_ms: u64,
}

/// Automatic ETS model selection.
#[derive(Debug, Clone)]
pub struct AutoETS {
    config: AutoETSConfig,
    selected_model: Option<ETS>,
    selected_spec: Option<ETSSpec>,
    model_scores: Vec<(ETSSpec, f64)>,
    diagnostics: Option<AutoETSDiagnostics>,
}

impl AutoETS {
    /// Create a new AutoETS with default configuration (`"ZZZ"` mask).
    pub fn new() -> Self {
        Self::with_config(AutoETSConfig::default())
    }

    /// Create a new AutoETS with custom configuration.
    pub fn with_config(config: AutoETSConfig) -> Self {
        Self {
            config,
            selected_model: None,
            selected_spec: None,
            model_scores: Vec::new(),
            diagnostics: None,
        }
    }

    /// Create AutoETS for non-seasonal data.
    pub fn non_seasonal() -> Self {
        Self::with_config(AutoETSConfig::non_seasonal())
    }

    /// Create AutoETS with a specific seasonal period.
    pub fn with_period(period: usize) -> Self {
        Self::with_config(AutoETSConfig::with_period(period))
    }

    /// The winning specification.
    pub fn selected_spec(&self) -> Option<ETSSpec> {
        self.selected_spec
    }

    /// The fitted winning model.
    pub fn selected_model(&self) -> Result<&ETS> {
        self.selected_model.as_ref().ok_or(ForecastError::FitRequired)
    }

    /// Search diagnostics; only available after a successful fit.
    pub fn diagnostics(&self) -> Result<&AutoETSDiagnostics> {
        self.diagnostics.as_ref().ok_or(ForecastError::FitRequired)
    }

    /// Every successfully scored candidate, sorted ascending by score.
    pub fn model_scores(&self) -> &[(ETSSpec, f64)] {
        &self.model_scores
    }

    /// Parse the specification mask into per-slot search options.
    fn parse_mask(&self) -> Result<MaskOptions> {
        let chars: Vec<char> = self.config.spec.chars().collect();
        let (error_ch, trend_ch, season_ch, forced_damped) = match chars.len() {
            3 => (chars[0], chars[1], chars[2], false),
            4 => {
                if chars[2] != 'd' {
                    return Err(ForecastError::InvalidParameter(format!(
                        "four-character ETS spec must have 'd' in third position, got '{}'",
                        self.config.spec
                    )));
                }
                (chars[0], chars[1], chars[3], true)
            }
            _ => {
                return Err(ForecastError::InvalidParameter(format!(
                    "ETS spec must be 3 or 4 characters, got '{}'",
                    self.config.spec
                )))
            }
        };

        let errors = match error_ch {
            'A' => vec![ErrorType::Additive],
            'M' => vec![ErrorType::Multiplicative],
            'Z' => vec![ErrorType::Additive, ErrorType::Multiplicative],
            c => {
                return Err(ForecastError::InvalidParameter(format!(
                    "invalid error type '{c}' in ETS spec (expected A, M, or Z)"
                )))
            }
        };

        // Base trend kinds; damped variants are expanded during candidate
        // enumeration according to the damping policy.
        let trends = match trend_ch {
            'N' => vec![TrendType::None],
            'A' => vec![TrendType::Additive],
            'M' => vec![TrendType::Multiplicative],
            'Z' => {
                let mut t = vec![TrendType::None, TrendType::Additive];
                if self.config.allow_multiplicative_trend {
                    t.push(TrendType::Multiplicative);
                }
                t
            }
            c => {
                return Err(ForecastError::InvalidParameter(format!(
                    "invalid trend type '{c}' in ETS spec (expected N, A, M, or Z)"
                )))
            }
        };

        let seasonals = match season_ch {
            'N' => vec![SeasonalType::None],
            'A' => vec![SeasonalType::Additive],
            'M' => vec![SeasonalType::Multiplicative],
            'Z' => vec![
                SeasonalType::None,
                SeasonalType::Additive,
                SeasonalType::Multiplicative,
            ],
            c => {
                return Err(ForecastError::InvalidParameter(format!(
                    "invalid seasonal type '{c}' in ETS spec (expected N, A, M, or Z)"
                )))
            }
        };

        Ok(MaskOptions {
            errors,
            trends,
            seasonals,
            forced_damped,
        })
    }

    /// Expand a base trend kind per the damping policy.
    fn damped_variants(&self, base: TrendType, forced: bool) -> Vec<TrendType> {
        let (undamped, damped) = match base {
            TrendType::None => return vec![TrendType::None],
            TrendType::Additive | TrendType::AdditiveDamped => {
                (TrendType::Additive, TrendType::AdditiveDamped)
            }
            TrendType::Multiplicative | TrendType::MultiplicativeDamped => {
                (TrendType::Multiplicative, TrendType::MultiplicativeDamped)
            }
        };
        if forced {
            return vec![damped];
        }
        match self.config.damped {
            DampedPolicy::Auto => vec![undamped, damped],
            DampedPolicy::Always => vec![damped],
            DampedPolicy::Never => vec![undamped],
        }
    }

    /// Enumerate every valid candidate specification for the mask.
    fn generate_candidates(&self, options: &MaskOptions, has_seasonal: bool) -> Vec<ETSSpec> {
        let mut candidates = Vec::new();
        for &error in &options.errors {
            for &base_trend in &options.trends {
                for trend in self.damped_variants(base_trend, options.forced_damped) {
                    for &seasonal in &options.seasonals {
                        if seasonal != SeasonalType::None && !has_seasonal {
                            continue;
                        }
                        if !Self::is_valid_combination(error, trend, seasonal) {
                            continue;
                        }
                        candidates.push(ETSSpec::new(error, trend, seasonal));
                    }
                }
            }
        }
        candidates
    }

    /// Combinations known to be numerically unstable or ill-defined are
    /// excluded from the search space.
    fn is_valid_combination(error: ErrorType, trend: TrendType, seasonal: SeasonalType) -> bool {
        let mult_trend = matches!(
            trend,
            TrendType::Multiplicative | TrendType::MultiplicativeDamped
        );
        // A compounding trend cannot coexist with additive seasonal offsets.
        if mult_trend && seasonal == SeasonalType::Additive {
            return false;
        }
        // Relative errors on additive trend plus additive season diverge.
        if error == ErrorType::Multiplicative
            && matches!(trend, TrendType::Additive | TrendType::AdditiveDamped)
            && seasonal == SeasonalType::Additive
        {
            return false;
        }
        true
    }

    fn criterion_of(&self, model: &ETS) -> Option<f64> {
        let value = match self.config.criterion {
            SelectionCriterion::AIC => model.aic(),
            SelectionCriterion::AICc => model.aicc(),
            SelectionCriterion::BIC => model.bic(),
        };
        value.filter(|v| v.is_finite())
    }
}

impl Default for AutoETS {
    fn default() -> Self {
        Self::new()
    }
}

impl Forecaster for AutoETS {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        let start = Instant::now();
        if series.is_multivariate() {
            return Err(ForecastError::DimensionMismatch {
                expected: 1,
                got: series.dimensions(),
            });
        }
        let values = series.primary_values();
        if values.len() < 4 {
            return Err(ForecastError::InsufficientData {
                needed: 4,
                got: values.len(),
            });
        }

        let options = self.parse_mask()?;
        let seasonal_period = self.config.seasonal_period.unwrap_or(1);
        let has_seasonal = seasonal_period > 1 && values.len() >= 2 * seasonal_period;

        let candidates = self.generate_candidates(&options, has_seasonal);
        self.model_scores.clear();

        let mut best_model: Option<ETS> = None;
        let mut best_spec: Option<ETSSpec> = None;
        let mut best_score = f64::INFINITY;
        let mut evaluated = 0;
        let mut failed = 0;

        for spec in candidates {
            let period = if spec.has_seasonal() {
                seasonal_period
            } else {
                1
            };

            evaluated += 1;
            let mut model = ETS::new(spec, period);
            model.set_fixed_params(
                self.config.alpha,
                self.config.beta,
                self.config.gamma,
                self.config.phi,
            );
            model.set_max_iterations(self.config.max_iterations);

            match model.fit_values(values) {
                Ok(()) => match self.criterion_of(&model) {
                    Some(score) => {
                        self.model_scores.push((spec, score));
                        // Strict comparison: ties go to the first candidate.
                        if score < best_score {
                            best_score = score;
                            best_model = Some(model);
                            best_spec = Some(spec);
                        }
                    }
                    None => failed += 1,
                },
                Err(_) => failed += 1,
            }
        }

        self.model_scores
            .sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let best_model = best_model.ok_or_else(|| {
            ForecastError::ComputationError("No valid ETS model could be fitted".to_string())
        })?;
        let best_spec = best_spec.unwrap_or_else(|| best_model.spec());

        self.diagnostics = Some(AutoETSDiagnostics {
            models_evaluated: evaluated,
            models_failed: failed,
            best_score,
            best_model: best_spec.short_name(),
            optimization_time_ms: start.elapsed().as_millis() as u64,
        });
        self.selected_model = Some(best_model);
        self.selected_spec = Some(best_spec);

        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        self.selected_model()?.predict(horizon)
    }

    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<Forecast> {
        self.selected_model()?.predict_with_intervals(horizon, level)
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.selected_model.as_ref()?.fitted_values()
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.selected_model.as_ref()?.residuals()
    }

    fn name(&self) -> &str {
        "AutoETS"
    }

    fn aic(&self) -> Option<f64> {
        self.selected_model.as_ref()?.aic()
    }

    fn bic(&self) -> Option<f64> {
        self.selected_model.as_ref()?.bic()
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

    fn make_series(values: Vec<f64>) -> TimeSeries {
        TimeSeries::univariate(make_timestamps(values.len()), values).unwrap()
    }

    #[test]
    fn auto_ets_selects_model() {
        let values: Vec<f64> = (0..30).map(|i| 10.0 + (i as f64 * 0.2).sin()).collect();
        let ts = make_series(values);

        let mut model = AutoETS::non_seasonal();
        model.fit(&ts).unwrap();

        assert!(model.selected_spec().is_some());
        assert!(!model.model_scores().is_empty());

        let forecast = model.predict(5).unwrap();
        assert_eq!(forecast.horizon(), 5);
    }

    #[test]
    fn auto_ets_with_trend() {
        let values: Vec<f64> = (0..40).map(|i| 10.0 + 1.5 * i as f64).collect();
        let ts = make_series(values);

        let mut model = AutoETS::non_seasonal();
        model.fit(&ts).unwrap();

        assert!(model.selected_spec().unwrap().has_trend());
    }

    #[test]
    fn auto_ets_with_seasonality() {
        let values: Vec<f64> = (0..48)
            .map(|i| 10.0 + 5.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect();
        let ts = make_series(values);

        let mut model = AutoETS::with_period(12);
        model.fit(&ts).unwrap();

        assert!(model.selected_spec().unwrap().has_seasonal());
    }

    #[test]
    fn auto_ets_pinned_mask_restricts_search() {
        let values: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
        let ts = make_series(values);

        let config = AutoETSConfig::non_seasonal().with_spec("AAN");
        let mut model = AutoETS::with_config(config);
        model.fit(&ts).unwrap();

        let spec = model.selected_spec().unwrap();
        assert_eq!(spec.error, ErrorType::Additive);
        assert_eq!(spec.seasonal, SeasonalType::None);
        assert!(matches!(
            spec.trend,
            TrendType::Additive | TrendType::AdditiveDamped
        ));
    }

    #[test]
    fn auto_ets_four_char_mask_forces_damping() {
        let values: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
        let ts = make_series(values);

        let config = AutoETSConfig::non_seasonal().with_spec("AAdN");
        let mut model = AutoETS::with_config(config);
        model.fit(&ts).unwrap();

        assert_eq!(model.selected_spec().unwrap().trend, TrendType::AdditiveDamped);
    }

    #[test]
    fn auto_ets_rejects_malformed_mask() {
        let values: Vec<f64> = (0..20).map(|i| i as f64 + 1.0).collect();
        let ts = make_series(values);

        for bad in ["ZZ", "ZZZZZ", "XZZ", "AAxN"] {
            let config = AutoETSConfig::non_seasonal().with_spec(bad);
            let mut model = AutoETS::with_config(config);
            assert!(
                matches!(model.fit(&ts), Err(ForecastError::InvalidParameter(_))),
                "mask '{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn auto_ets_damped_never_excludes_damped_specs() {
        let values: Vec<f64> = (0..30).map(|i| 10.0 + 2.0 * i as f64).collect();
        let ts = make_series(values);

        let config = AutoETSConfig::non_seasonal().with_damped(DampedPolicy::Never);
        let mut model = AutoETS::with_config(config);
        model.fit(&ts).unwrap();

        for (spec, _) in model.model_scores() {
            assert!(!spec.is_damped());
        }
    }

    #[test]
    fn auto_ets_pinned_alpha_propagates_to_winner() {
        let values: Vec<f64> = (0..30).map(|i| 10.0 + (i as f64 * 0.4).cos()).collect();
        let ts = make_series(values);

        let config = AutoETSConfig::non_seasonal().with_alpha(0.42);
        let mut model = AutoETS::with_config(config);
        model.fit(&ts).unwrap();

        let winner = model.selected_model().unwrap();
        assert!((winner.alpha().unwrap() - 0.42).abs() < 1e-10);
    }

    #[test]
    fn auto_ets_multiplicative_trend_opt_in() {
        let values: Vec<f64> = (0..30).map(|i| 100.0 * 1.08_f64.powi(i)).collect();
        let ts = make_series(values);

        let mut default_search = AutoETS::non_seasonal();
        default_search.fit(&ts).unwrap();
        for (spec, _) in default_search.model_scores() {
            assert!(!spec.has_multiplicative_trend());
        }

        let config = AutoETSConfig::non_seasonal().with_multiplicative_trend();
        let mut wide_search = AutoETS::with_config(config);
        wide_search.fit(&ts).unwrap();
        assert!(wide_search
            .model_scores()
            .iter()
            .any(|(spec, _)| spec.has_multiplicative_trend()));
    }

    #[test]
    fn auto_ets_model_scores_sorted() {
        let values: Vec<f64> = (0..30).map(|i| 10.0 + i as f64 * 0.5).collect();
        let ts = make_series(values);

        let mut model = AutoETS::non_seasonal();
        model.fit(&ts).unwrap();

        let scores = model.model_scores();
        assert!(!scores.is_empty());
        for i in 1..scores.len() {
            assert!(scores[i].1 >= scores[i - 1].1);
        }
    }

    #[test]
    fn auto_ets_diagnostics_match_reported_winner() {
        let values: Vec<f64> = (0..40).map(|i| 10.0 + 0.5 * i as f64).collect();
        let ts = make_series(values);

        let mut model = AutoETS::non_seasonal();
        model.fit(&ts).unwrap();

        let diagnostics = model.diagnostics().unwrap();
        assert!(diagnostics.models_evaluated > 0);
        assert!(diagnostics.best_score.is_finite());
        assert_eq!(
            diagnostics.best_model,
            model.selected_spec().unwrap().short_name()
        );
        // The best score is the minimum of the sorted score list.
        assert!((diagnostics.best_score - model.model_scores()[0].1).abs() < 1e-9);
    }

    #[test]
    fn auto_ets_refit_reproduces_best_score() {
        let values: Vec<f64> = (0..36).map(|i| 20.0 + 0.3 * i as f64).collect();
        let ts = make_series(values);

        let mut search = AutoETS::non_seasonal();
        search.fit(&ts).unwrap();
        let spec = search.selected_spec().unwrap();
        let best_score = search.diagnostics().unwrap().best_score;

        let mut refit = ETS::new(spec, 1);
        refit.set_max_iterations(300);
        refit.fit(&ts).unwrap();
        assert!((refit.aicc().unwrap() - best_score).abs() < 1e-6);
    }

    #[test]
    fn auto_ets_confidence_intervals() {
        let values: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
        let ts = make_series(values);

        let mut model = AutoETS::non_seasonal();
        model.fit(&ts).unwrap();

        let forecast = model.predict_with_intervals(5, 0.95).unwrap();
        assert!(forecast.has_intervals());
    }

    #[test]
    fn auto_ets_insufficient_data() {
        let ts = make_series(vec![1.0, 2.0, 3.0]);
        let mut model = AutoETS::non_seasonal();
        assert!(matches!(
            model.fit(&ts),
            Err(ForecastError::InsufficientData { .. })
        ));
    }

    #[test]
    fn auto_ets_requires_fit() {
        let model = AutoETS::new();
        assert!(matches!(model.predict(5), Err(ForecastError::FitRequired)));
        assert!(matches!(
            model.diagnostics(),
            Err(ForecastError::FitRequired)
        ));
    }

    #[test]
    fn auto_ets_different_criteria() {
        let values: Vec<f64> = (0..40).map(|i| 10.0 + i as f64).collect();
        let ts = make_series(values);

        let config_aic = AutoETSConfig::non_seasonal().with_criterion(SelectionCriterion::AIC);
        let config_bic = AutoETSConfig::non_seasonal().with_criterion(SelectionCriterion::BIC);

        let mut model_aic = AutoETS::with_config(config_aic);
        let mut model_bic = AutoETS::with_config(config_bic);
        model_aic.fit(&ts).unwrap();
        model_bic.fit(&ts).unwrap();

        assert!(model_aic.selected_spec().is_some());
        assert!(model_bic.selected_spec().is_some());
    }

    #[test]
    fn single_candidate_mask_matches_direct_fit() {
        let values: Vec<f64> = (0..30).map(|i| 20.0 + (i as f64 * 0.7).sin()).collect();
        let ts = make_series(values.clone());

        let mut auto = AutoETS::with_config(AutoETSConfig::non_seasonal().with_spec("ANN"));
        auto.fit(&ts).unwrap();

        let mut direct = ETS::new(ETSSpec::ann(), 1);
        direct.set_max_iterations(300);
        direct.fit_values(&values).unwrap();

        let auto_score = auto.diagnostics().unwrap().best_score;
        let direct_score = direct.aicc().unwrap();
        assert!((auto_score - direct_score).abs() < 1e-6);
    }

    #[test]
    fn auto_ets_name() {
        assert_eq!(AutoETS::new().name(), "AutoETS");
    }
}
