//! Ensemble forecasting.
//!
//! Combines multiple forecasters into one, with mean, median, or
//! information-criterion and accuracy based weighting.

mod model;

pub use model::{AccuracyMetric, CombinationMethod, Ensemble, EnsembleConfig};
