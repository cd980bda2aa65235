//! Levenberg-Marquardt optimizer for one-dimensional curve fitting.

use super::linear_solver::solve;

/// Configuration for Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmConfig {
    /// Maximum iterations before giving up.
    pub max_iterations: usize,
    /// Relative parameter change below which the fit has converged.
    pub convergence_threshold: f64,
    /// Initial damping parameter.
    pub initial_lambda: f64,
    /// Factor to increase lambda on a rejected step.
    pub lambda_up: f64,
    /// Factor to decrease lambda on an accepted step.
    pub lambda_down: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            convergence_threshold: 1e-10,
            initial_lambda: 0.001,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

/// Result of an optimization run.
#[derive(Debug, Clone, Copy)]
pub struct LmResult<const N: usize> {
    pub params: [f64; N],
    pub chi2: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// A model `y = f(x; params)` with analytic partial derivatives.
pub trait LmModel<const N: usize> {
    fn evaluate(&self, x: f64, params: &[f64; N]) -> f64;

    fn jacobian_row(&self, x: f64, params: &[f64; N]) -> [f64; N];
}

/// Minimize the sum of squared residuals of `model` against `(xs, ys)`.
///
/// The fit is reported as not converged if the iteration limit is hit, the
/// normal equations become singular, or the parameters leave the finite range.
pub fn optimize<const N: usize, M: LmModel<N>>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    initial_params: [f64; N],
    config: &LmConfig,
) -> LmResult<N> {
    let mut params = initial_params;
    let mut lambda = config.initial_lambda;
    let mut chi2 = compute_chi2(model, xs, ys, &params);
    let mut converged = false;
    let mut iterations = 0;

    if !chi2.is_finite() {
        return LmResult {
            params,
            chi2,
            converged,
            iterations,
        };
    }

    for iter in 0..config.max_iterations {
        iterations = iter + 1;

        let (hessian, gradient) = normal_equations(model, xs, ys, &params);
        let mut damped = hessian;
        for (i, row) in damped.iter_mut().enumerate() {
            row[i] *= 1.0 + lambda;
        }

        let Some(delta) = solve(&damped, &gradient) else {
            break;
        };

        let mut trial = params;
        for (p, d) in trial.iter_mut().zip(delta.iter()) {
            *p += d;
        }
        let trial_chi2 = compute_chi2(model, xs, ys, &trial);

        if trial_chi2.is_finite() && trial_chi2 < chi2 {
            let improvement = (chi2 - trial_chi2) / chi2.max(f64::MIN_POSITIVE);
            // Tiny steps only signal convergence near the Gauss-Newton regime;
            // under heavy damping they are an artifact of lambda.
            let undamped = lambda <= 1.0;
            params = trial;
            chi2 = trial_chi2;
            lambda *= config.lambda_down;

            let small_step = delta
                .iter()
                .zip(params.iter())
                .all(|(d, p)| d.abs() <= config.convergence_threshold * (p.abs() + 1e-12));
            if undamped && (small_step || improvement < 1e-12) {
                converged = true;
                break;
            }
        } else {
            lambda *= config.lambda_up;
            if lambda > 1e12 {
                // No downhill step left: sitting in a minimum.
                converged = true;
                break;
            }
        }
    }

    if params.iter().any(|p| !p.is_finite()) {
        converged = false;
    }

    LmResult {
        params,
        chi2,
        converged,
        iterations,
    }
}

fn compute_chi2<const N: usize, M: LmModel<N>>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    params: &[f64; N],
) -> f64 {
    xs.iter()
        .zip(ys.iter())
        .map(|(&x, &y)| {
            let r = y - model.evaluate(x, params);
            r * r
        })
        .sum()
}

/// Build J^T J and J^T r.
#[allow(clippy::needless_range_loop)]
fn normal_equations<const N: usize, M: LmModel<N>>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    params: &[f64; N],
) -> ([[f64; N]; N], [f64; N]) {
    let mut hessian = [[0.0f64; N]; N];
    let mut gradient = [0.0f64; N];

    for (&x, &y) in xs.iter().zip(ys.iter()) {
        let row = model.jacobian_row(x, params);
        let r = y - model.evaluate(x, params);
        for i in 0..N {
            gradient[i] += row[i] * r;
            for j in i..N {
                hessian[i][j] += row[i] * row[j];
            }
        }
    }

    for i in 1..N {
        for j in 0..i {
            hessian[i][j] = hessian[j][i];
        }
    }

    (hessian, gradient)
}
