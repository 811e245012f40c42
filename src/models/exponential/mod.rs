//! Exponential smoothing models.
//!
//! The ETS (Error-Trend-Seasonal) state-space framework and its automatic
//! specification search, AutoETS.

mod auto_ets;
mod ets;

pub use auto_ets::{
    AutoETS, AutoETSConfig, AutoETSDiagnostics, DampedPolicy, SelectionCriterion,
};
pub use ets::{ETSSpec, ErrorType, SeasonalType, TrendType, ETS};
