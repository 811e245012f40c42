//! Forecaster trait defining the common interface for all models.

use crate::core::{Forecast, TimeSeries};
use crate::error::Result;

/// Common interface for all forecasting models.
///
/// Object-safe; models are routinely handled as `Box<dyn Forecaster>` (see
/// [`BoxedForecaster`]). Every model follows the same lifecycle: constructed
/// unfit, `fit()` validates the series and populates fitted state, and
/// prediction or diagnostics before a successful fit fail with
/// [`ForecastError::FitRequired`](crate::error::ForecastError::FitRequired).
pub trait Forecaster {
    /// Fit the model to the time series data.
    ///
    /// Rejects empty, multivariate, or too-short input with a configuration
    /// error; re-fitting overwrites all prior state.
    fn fit(&mut self, series: &TimeSeries) -> Result<()>;

    /// Generate predictions for the specified horizon.
    ///
    /// A horizon of zero yields an empty forecast.
    fn predict(&self, horizon: usize) -> Result<Forecast>;

    /// Generate predictions with prediction intervals at the given
    /// confidence level (e.g. `0.95`).
    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<Forecast> {
        // Models without native intervals fall back to point predictions.
        let _ = level;
        self.predict(horizon)
    }

    /// Fitted values (in-sample one-step predictions).
    fn fitted_values(&self) -> Option<&[f64]>;

    /// Residuals (actual - fitted).
    fn residuals(&self) -> Option<&[f64]>;

    /// Model name, e.g. `"ETS(A,A,N)"` or `"MFLES"`.
    fn name(&self) -> &str;

    /// Whether the model has been fitted.
    fn is_fitted(&self) -> bool {
        self.fitted_values().is_some()
    }

    /// Akaike information criterion of the fitted model, when the model
    /// carries a likelihood. Ensembles weight members through this.
    fn aic(&self) -> Option<f64> {
        None
    }

    /// Bayesian information criterion of the fitted model, when available.
    fn bic(&self) -> Option<f64> {
        None
    }
}

/// Type alias for boxed forecaster trait objects.
pub type BoxedForecaster = Box<dyn Forecaster>;

/// Zero-argument factory producing fresh model instances.
///
/// Ensembles built from factories re-instantiate every member on each
/// `fit()`, so no state leaks across fits to different data.
pub type ForecasterFactory = Box<dyn Fn() -> BoxedForecaster + Send + Sync>;
