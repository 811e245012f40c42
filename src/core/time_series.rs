//! TimeSeries data structure for representing temporal data.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, Utc};

/// An immutable time series: ascending timestamps plus one or more
/// equal-length value columns.
///
/// Models in this crate are univariate and read [`primary_values`]; the
/// column count is kept so that `fit()` can reject multivariate input
/// explicitly rather than silently using the first column.
///
/// [`primary_values`]: TimeSeries::primary_values
#[derive(Debug, Clone)]
pub struct TimeSeries {
    timestamps: Vec<DateTime<Utc>>,
    /// Values stored column-major: values[dimension][observation]
    values: Vec<Vec<f64>>,
}

impl TimeSeries {
    /// Create a univariate time series.
    pub fn univariate(timestamps: Vec<DateTime<Utc>>, values: Vec<f64>) -> Result<Self> {
        Self::multivariate(timestamps, vec![values])
    }

    /// Create a multivariate time series from value columns.
    pub fn multivariate(timestamps: Vec<DateTime<Utc>>, values: Vec<Vec<f64>>) -> Result<Self> {
        if timestamps.is_empty() || values.iter().all(|c| c.is_empty()) {
            return Err(ForecastError::EmptyData);
        }

        for i in 1..timestamps.len() {
            if timestamps[i] <= timestamps[i - 1] {
                return Err(ForecastError::TimestampError(
                    "timestamps must be strictly increasing".to_string(),
                ));
            }
        }

        for column in &values {
            if column.len() != timestamps.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: timestamps.len(),
                    got: column.len(),
                });
            }
        }

        Ok(Self { timestamps, values })
    }

    /// Create a univariate series from values alone, with synthetic evenly
    /// spaced timestamps. Callers that only have a numeric sequence (the
    /// models treat observations as evenly spaced by index anyway) use this.
    pub fn from_values(values: Vec<f64>) -> Result<Self> {
        let start = DateTime::<Utc>::UNIX_EPOCH;
        let timestamps = (0..values.len())
            .map(|i| start + Duration::hours(i as i64))
            .collect();
        Self::univariate(timestamps, values)
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the series has no observations.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Number of value columns.
    pub fn dimensions(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has more than one value column.
    pub fn is_multivariate(&self) -> bool {
        self.values.len() > 1
    }

    /// Timestamps of the observations.
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Values for a specific dimension.
    pub fn values(&self, dimension: usize) -> Result<&[f64]> {
        self.values
            .get(dimension)
            .map(|v| v.as_slice())
            .ok_or(ForecastError::IndexOutOfBounds {
                index: dimension,
                size: self.values.len(),
            })
    }

    /// Values of the primary (first) dimension.
    pub fn primary_values(&self) -> &[f64] {
        self.values.first().map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Sub-series over the half-open observation range `[start, end)`.
    ///
    /// Used for validation splits and cross-validation folds.
    pub fn slice(&self, start: usize, end: usize) -> Result<TimeSeries> {
        if start >= end || end > self.len() {
            return Err(ForecastError::IndexOutOfBounds {
                index: end,
                size: self.len(),
            });
        }

        Ok(Self {
            timestamps: self.timestamps[start..end].to_vec(),
            values: self
                .values
                .iter()
                .map(|column| column[start..end].to_vec())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_timestamps(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::hours(i as i64)).collect()
    }

    #[test]
    fn univariate_construction_validates_lengths() {
        let ts = TimeSeries::univariate(make_timestamps(3), vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(ts.len(), 3);
        assert_eq!(ts.dimensions(), 1);
        assert!(!ts.is_multivariate());
        assert_eq!(ts.primary_values(), &[1.0, 2.0, 3.0]);

        let result = TimeSeries::univariate(make_timestamps(3), vec![1.0, 2.0]);
        assert!(matches!(
            result,
            Err(ForecastError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            TimeSeries::univariate(vec![], vec![]),
            Err(ForecastError::EmptyData)
        ));
        assert!(matches!(
            TimeSeries::from_values(vec![]),
            Err(ForecastError::EmptyData)
        ));
    }

    #[test]
    fn non_increasing_timestamps_are_rejected() {
        let mut timestamps = make_timestamps(3);
        timestamps[2] = timestamps[1];
        let result = TimeSeries::univariate(timestamps, vec![1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(ForecastError::TimestampError(_))));
    }

    #[test]
    fn multivariate_series_reports_dimensions() {
        let ts = TimeSeries::multivariate(
            make_timestamps(2),
            vec![vec![1.0, 2.0], vec![10.0, 20.0]],
        )
        .unwrap();
        assert!(ts.is_multivariate());
        assert_eq!(ts.values(1).unwrap(), &[10.0, 20.0]);
        assert!(ts.values(2).is_err());
    }

    #[test]
    fn from_values_generates_even_spacing() {
        let ts = TimeSeries::from_values(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(ts.len(), 4);
        let stamps = ts.timestamps();
        let step = stamps[1] - stamps[0];
        assert_eq!(stamps[3] - stamps[2], step);
    }

    #[test]
    fn slice_extracts_half_open_range() {
        let ts = TimeSeries::univariate(make_timestamps(5), vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let sub = ts.slice(1, 4).unwrap();
        assert_eq!(sub.primary_values(), &[2.0, 3.0, 4.0]);
        assert_eq!(sub.timestamps()[0], ts.timestamps()[1]);

        assert!(ts.slice(3, 3).is_err());
        assert!(ts.slice(0, 6).is_err());
    }
}
