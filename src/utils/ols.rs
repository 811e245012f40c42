//! Least-squares helpers for trend and seasonal fitting.
//!
//! MFLES fits its trend components against the time index with [`linear_fit`]
//! or [`siegel_fit`], and solves the Fourier-basis normal equations with
//! [`solve_symmetric`].

use crate::utils::stats::median;

/// Fit `y = intercept + slope * t` over the time index `t = 0..n` by
/// ordinary least squares. Returns `(slope, intercept)`; a degenerate
/// design (fewer than two points) yields a flat line at the mean.
pub fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }

    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = values.iter().sum::<f64>() / n as f64;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let x_dev = i as f64 - mean_x;
        numerator += x_dev * (y - mean_y);
        denominator += x_dev * x_dev;
    }

    if denominator.abs() < 1e-10 {
        (0.0, mean_y)
    } else {
        let slope = numerator / denominator;
        (slope, mean_y - slope * mean_x)
    }
}

/// Siegel repeated-medians regression over the time index.
///
/// For each point, the median of the pairwise slopes to all other points is
/// taken; the overall slope is the median of those medians, and the intercept
/// the median of `y_i - slope * i`. Highly resistant to outliers. For long
/// series the pairwise computation is subsampled to keep it bounded.
pub fn siegel_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n < 2 {
        return (0.0, values.first().copied().unwrap_or(0.0));
    }

    // Subsample evenly above this size; the estimator is statistical, not
    // exact, so this preserves robustness at a fraction of the cost.
    const MAX_POINTS: usize = 100;
    let indices: Vec<usize> = if n <= MAX_POINTS {
        (0..n).collect()
    } else {
        (0..MAX_POINTS).map(|k| k * (n - 1) / (MAX_POINTS - 1)).collect()
    };

    let mut point_slopes = Vec::with_capacity(indices.len());
    for &i in &indices {
        let mut slopes = Vec::with_capacity(indices.len() - 1);
        for &j in &indices {
            if i != j {
                slopes.push((values[j] - values[i]) / (j as f64 - i as f64));
            }
        }
        point_slopes.push(median(&slopes));
    }

    let slope = median(&point_slopes);
    let intercepts: Vec<f64> = indices
        .iter()
        .map(|&i| values[i] - slope * i as f64)
        .collect();

    (slope, median(&intercepts))
}

/// Solve `A x = b` for symmetric positive definite `A` via Cholesky
/// decomposition. Returns `None` when `A` is not positive definite; callers
/// add ridge regularization to the diagonal beforehand when the design may
/// be near-singular.
pub fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }

    // A = L L'
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    // L y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * y[j];
        }
        y[i] = sum / l[i][i];
    }

    // L' x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linear_fit_recovers_exact_line() {
        // y = 2 + 3t
        let values: Vec<f64> = (0..10).map(|t| 2.0 + 3.0 * t as f64).collect();
        let (slope, intercept) = linear_fit(&values);
        assert_relative_eq!(slope, 3.0, epsilon = 1e-10);
        assert_relative_eq!(intercept, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn linear_fit_flat_for_degenerate_input() {
        let (slope, intercept) = linear_fit(&[7.0]);
        assert_relative_eq!(slope, 0.0, epsilon = 1e-10);
        assert_relative_eq!(intercept, 7.0, epsilon = 1e-10);
    }

    #[test]
    fn siegel_fit_matches_ols_on_clean_line() {
        let values: Vec<f64> = (0..20).map(|t| 1.0 + 0.5 * t as f64).collect();
        let (slope, intercept) = siegel_fit(&values);
        assert_relative_eq!(slope, 0.5, epsilon = 1e-8);
        assert_relative_eq!(intercept, 1.0, epsilon = 1e-8);
    }

    #[test]
    fn siegel_fit_ignores_gross_outliers() {
        let mut values: Vec<f64> = (0..30).map(|t| 1.0 + 0.5 * t as f64).collect();
        values[10] = 1000.0;
        values[20] = -500.0;

        let (robust_slope, _) = siegel_fit(&values);
        let (ols_slope, _) = linear_fit(&values);

        assert_relative_eq!(robust_slope, 0.5, epsilon = 0.05);
        assert!((ols_slope - 0.5).abs() > (robust_slope - 0.5).abs());
    }

    #[test]
    fn solve_symmetric_small_system() {
        // [[4, 2], [2, 3]] x = [10, 9] -> x = [1.5, 2.0]
        let a = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let b = vec![10.0, 9.0];
        let x = solve_symmetric(&a, &b).unwrap();
        assert_relative_eq!(x[0], 1.5, epsilon = 1e-10);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn solve_symmetric_rejects_indefinite() {
        let a = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let b = vec![1.0, 1.0];
        assert!(solve_symmetric(&a, &b).is_none());
    }
}
