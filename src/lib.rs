//! # autoforecast
//!
//! Automatic time series model fitting and selection.
//!
//! The library centers on the [`Forecaster`](models::Forecaster) trait:
//! every model is constructed unfit, fitted against a
//! [`TimeSeries`](core::TimeSeries), and then queried for point forecasts
//! or prediction intervals. On top of the base engines, ETS state-space
//! smoothing ([`models::exponential::ETS`]) and gradient-boosted
//! decomposition ([`models::mfles::MFLES`]), automatic searches pick a
//! configuration by information criteria ([`models::exponential::AutoETS`])
//! or cross-validation ([`models::mfles::AutoMFLES`]), and
//! [`models::ensemble::Ensemble`] combines any set of fitted models.

// Allow some clippy warnings for cleaner code in specific cases
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod core;
pub mod error;
pub mod models;
pub mod utils;

pub use error::{ForecastError, Result};

pub mod prelude {
    pub use crate::core::{Forecast, TimeSeries};
    pub use crate::error::{ForecastError, Result};
    pub use crate::models::exponential::{AutoETS, AutoETSConfig, ETSSpec, ETS};
    pub use crate::models::mfles::{AutoMFLES, MFLESParams, MFLES};
    pub use crate::models::{
        BoxedForecaster, CombinationMethod, Ensemble, EnsembleConfig, Forecaster,
        ForecasterFactory,
    };
    pub use crate::utils::{calculate_metrics, quantile_normal, AccuracyMetrics};
}
