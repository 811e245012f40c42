//! Forecasting models.

mod traits;

pub mod ensemble;
pub mod exponential;
pub mod mfles;

pub use ensemble::{AccuracyMetric, CombinationMethod, Ensemble, EnsembleConfig};
pub use exponential::{AutoETS, ETSSpec, ETS};
pub use mfles::{AutoMFLES, MFLES};
pub use traits::{BoxedForecaster, Forecaster, ForecasterFactory};
