//! Forecast result structure for holding predictions.

/// A forecast: point predictions and optional prediction intervals.
///
/// Invariant maintained by all producers: when intervals are present they
/// have the same length as the point sequence and satisfy
/// `lower[i] <= point[i] <= upper[i]`. A horizon of zero is represented by
/// empty sequences, not an error.
#[derive(Debug, Clone, Default)]
pub struct Forecast {
    point: Vec<f64>,
    lower: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
}

impl Forecast {
    /// Create an empty forecast.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a forecast from point predictions.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            point: values,
            lower: None,
            upper: None,
        }
    }

    /// Create a forecast with prediction intervals.
    pub fn from_values_with_intervals(values: Vec<f64>, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), lower.len());
        debug_assert_eq!(values.len(), upper.len());
        Self {
            point: values,
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// Forecast horizon (number of steps).
    pub fn horizon(&self) -> usize {
        self.point.len()
    }

    /// Whether the forecast holds no predictions.
    pub fn is_empty(&self) -> bool {
        self.point.is_empty()
    }

    /// Point predictions.
    pub fn primary(&self) -> &[f64] {
        &self.point
    }

    /// Whether interval bounds are available.
    pub fn has_intervals(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }

    /// Lower interval bounds, if available.
    pub fn lower(&self) -> Option<&[f64]> {
        self.lower.as_deref()
    }

    /// Upper interval bounds, if available.
    pub fn upper(&self) -> Option<&[f64]> {
        self.upper.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_values_creates_point_forecast() {
        let forecast = Forecast::from_values(vec![1.0, 2.0, 3.0, 4.0]);
        assert!(!forecast.is_empty());
        assert_eq!(forecast.horizon(), 4);
        assert_eq!(forecast.primary(), &[1.0, 2.0, 3.0, 4.0]);
        assert!(!forecast.has_intervals());
        assert!(forecast.lower().is_none());
        assert!(forecast.upper().is_none());
    }

    #[test]
    fn from_values_with_intervals_exposes_bounds() {
        let forecast =
            Forecast::from_values_with_intervals(vec![2.0, 3.0], vec![1.0, 2.0], vec![3.0, 4.0]);
        assert!(forecast.has_intervals());
        assert_eq!(forecast.primary(), &[2.0, 3.0]);
        assert_eq!(forecast.lower().unwrap(), &[1.0, 2.0]);
        assert_eq!(forecast.upper().unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn empty_forecast_represents_zero_horizon() {
        let forecast = Forecast::new();
        assert!(forecast.is_empty());
        assert_eq!(forecast.horizon(), 0);
        assert_eq!(forecast.primary(), &[] as &[f64]);
    }
}
