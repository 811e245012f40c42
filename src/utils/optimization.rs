//! Derivative-free optimization for smoothing-parameter estimation.
//!
//! AutoETS plugs its negative log-likelihood objective into [`nelder_mead`];
//! the optimizer knows nothing about models, it just minimizes a function of
//! a bounded parameter vector.

/// Result of a Nelder-Mead run.
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    /// Best parameter vector found.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub fx: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether the simplex converged before hitting the iteration cap.
    ///
    /// Convergence means the function-value spread across the simplex, or the
    /// maximum vertex distance from the centroid, fell below `tolerance`.
    pub converged: bool,
}

/// Configuration for Nelder-Mead optimization.
#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    /// Maximum number of iterations.
    pub max_iter: usize,
    /// Convergence tolerance on the simplex spread.
    pub tolerance: f64,
    /// Reflection coefficient.
    pub reflection: f64,
    /// Expansion coefficient.
    pub expansion: f64,
    /// Contraction coefficient.
    pub contraction: f64,
    /// Shrinkage coefficient.
    pub shrink: f64,
    /// Relative step used to build the initial simplex.
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tolerance: 1e-8,
            reflection: 1.0,
            expansion: 2.0,
            contraction: 0.5,
            shrink: 0.5,
            initial_step: 0.05,
        }
    }
}

/// Minimize `objective` over a parameter vector with optional box bounds.
///
/// Bounds are enforced by clamping every candidate vertex, so the objective
/// is never evaluated outside the box.
///
/// # Example
/// ```
/// use autoforecast::utils::optimization::{nelder_mead, NelderMeadConfig};
///
/// let result = nelder_mead(
///     |x| (x[0] - 2.0).powi(2) + (x[1] - 3.0).powi(2),
///     &[0.0, 0.0],
///     None,
///     NelderMeadConfig::default(),
/// );
///
/// assert!(result.converged);
/// assert!((result.x[0] - 2.0).abs() < 0.01);
/// ```
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: Option<&[(f64, f64)]>,
    config: NelderMeadConfig,
) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    if n == 0 {
        return NelderMeadResult {
            x: vec![],
            fx: f64::NAN,
            iterations: 0,
            converged: false,
        };
    }

    // Build the initial simplex: the start point plus one perturbed vertex
    // per dimension.
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(apply_bounds(initial, bounds));
    for i in 0..n {
        let mut vertex = initial.to_vec();
        let step = if initial[i].abs() > 1e-10 {
            config.initial_step * initial[i].abs()
        } else {
            config.initial_step
        };
        vertex[i] += step;
        simplex.push(apply_bounds(&vertex, bounds));
    }

    let mut values: Vec<f64> = simplex.iter().map(|v| objective(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| {
            values[a]
                .partial_cmp(&values[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let best = order[0];
        let worst = order[n];
        let second_worst = order[n - 1];

        if values[worst] - values[best] < config.tolerance {
            converged = true;
            break;
        }

        let centroid = centroid_excluding(&simplex, worst);
        let spread = simplex
            .iter()
            .map(|v| distance(v, &centroid))
            .fold(0.0, f64::max);
        if spread < config.tolerance {
            converged = true;
            break;
        }

        // Reflection
        let reflected = apply_bounds(
            &move_along(&centroid, &simplex[worst], -config.reflection),
            bounds,
        );
        let f_reflected = objective(&reflected);

        if f_reflected < values[second_worst] && f_reflected >= values[best] {
            simplex[worst] = reflected;
            values[worst] = f_reflected;
            continue;
        }

        // Expansion
        if f_reflected < values[best] {
            let expanded =
                apply_bounds(&move_along(&centroid, &reflected, config.expansion), bounds);
            let f_expanded = objective(&expanded);
            if f_expanded < f_reflected {
                simplex[worst] = expanded;
                values[worst] = f_expanded;
            } else {
                simplex[worst] = reflected;
                values[worst] = f_reflected;
            }
            continue;
        }

        // Contraction, outside or inside depending on the reflected value
        if f_reflected < values[worst] {
            let contracted =
                apply_bounds(&move_along(&centroid, &reflected, config.contraction), bounds);
            let f_contracted = objective(&contracted);
            if f_contracted <= f_reflected {
                simplex[worst] = contracted;
                values[worst] = f_contracted;
                continue;
            }
        } else {
            let contracted = apply_bounds(
                &move_along(&centroid, &simplex[worst], config.contraction),
                bounds,
            );
            let f_contracted = objective(&contracted);
            if f_contracted < values[worst] {
                simplex[worst] = contracted;
                values[worst] = f_contracted;
                continue;
            }
        }

        // Shrink all vertices towards the best one
        let anchor = simplex[best].clone();
        for i in 0..=n {
            if i != best {
                for j in 0..n {
                    simplex[i][j] = anchor[j] + config.shrink * (simplex[i][j] - anchor[j]);
                }
                simplex[i] = apply_bounds(&simplex[i], bounds);
                values[i] = objective(&simplex[i]);
            }
        }
    }

    let best = values
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0);

    NelderMeadResult {
        x: simplex[best].clone(),
        fx: values[best],
        iterations,
        converged,
    }
}

/// Centroid of the simplex excluding one vertex.
fn centroid_excluding(simplex: &[Vec<f64>], exclude: usize) -> Vec<f64> {
    let n = simplex[0].len();
    let count = (simplex.len() - 1) as f64;
    let mut centroid = vec![0.0; n];
    for (i, vertex) in simplex.iter().enumerate() {
        if i != exclude {
            for j in 0..n {
                centroid[j] += vertex[j];
            }
        }
    }
    for c in &mut centroid {
        *c /= count;
    }
    centroid
}

/// Point at `centroid + coefficient * (target - centroid)`.
///
/// A negative coefficient reflects `target` through the centroid.
fn move_along(centroid: &[f64], target: &[f64], coefficient: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(target.iter())
        .map(|(c, t)| c + coefficient * (t - c))
        .collect()
}

fn apply_bounds(point: &[f64], bounds: Option<&[(f64, f64)]>) -> Vec<f64> {
    match bounds {
        None => point.to_vec(),
        Some(b) => point
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                if i < b.len() {
                    x.clamp(b[i].0, b[i].1)
                } else {
                    x
                }
            })
            .collect(),
    }
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_quadratic_minimum() {
        let result = nelder_mead(
            |x| (x[0] - 2.0).powi(2) + (x[1] - 3.0).powi(2),
            &[0.0, 0.0],
            None,
            NelderMeadConfig::default(),
        );

        assert!(result.converged);
        assert_relative_eq!(result.x[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(result.x[1], 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.fx, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn handles_rosenbrock_valley() {
        let config = NelderMeadConfig {
            max_iter: 5000,
            tolerance: 1e-10,
            ..Default::default()
        };
        let result = nelder_mead(
            |x| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2),
            &[0.0, 0.0],
            None,
            config,
        );

        assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(result.x[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn stops_at_active_bound() {
        // Unconstrained minimum at 5, box ends at 3.
        let result = nelder_mead(
            |x| (x[0] - 5.0).powi(2),
            &[1.0],
            Some(&[(0.0, 3.0)]),
            NelderMeadConfig::default(),
        );

        assert_relative_eq!(result.x[0], 3.0, epsilon = 1e-4);
    }

    #[test]
    fn smoothing_objective_stays_in_bounds() {
        let data = [10.0, 12.0, 11.0, 13.0, 14.0, 13.0, 15.0, 16.0];
        let sse = |params: &[f64]| {
            let alpha = params[0];
            let mut level = data[0];
            let mut error_sum = 0.0;
            for &y in &data[1..] {
                let error = y - level;
                error_sum += error * error;
                level = alpha * y + (1.0 - alpha) * level;
            }
            error_sum
        };

        let result = nelder_mead(
            sse,
            &[0.5],
            Some(&[(0.01, 0.99)]),
            NelderMeadConfig::default(),
        );

        assert!(result.converged);
        assert!(result.x[0] >= 0.01 && result.x[0] <= 0.99);
    }

    #[test]
    fn empty_initial_point_does_not_converge() {
        let result = nelder_mead(|_| 0.0, &[], None, NelderMeadConfig::default());
        assert!(!result.converged);
        assert!(result.fx.is_nan());
    }

    #[test]
    fn iteration_cap_is_respected() {
        let config = NelderMeadConfig {
            max_iter: 3,
            tolerance: 0.0,
            ..Default::default()
        };
        let result = nelder_mead(|x| x[0].powi(2), &[10.0], None, config);
        assert_eq!(result.iterations, 3);
        assert!(!result.converged);
    }
}
