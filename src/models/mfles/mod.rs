//! MFLES gradient-boosted decomposition models.
//!
//! [`MFLES`] is the boosting engine; [`AutoMFLES`] searches its smoothing
//! configurations by cross-validation.

mod auto;
mod model;

pub use auto::{AutoMFLES, AutoMFLESConfig, AutoMFLESDiagnostics};
pub use model::{Decomposition, MFLESBuilder, MFLESParams, TrendMethod, MFLES};
