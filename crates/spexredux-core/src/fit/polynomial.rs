use serde::{Deserialize, Serialize};

use super::linear_solver::solve;
use crate::error::{ReduxError, Result};

/// A polynomial stored highest power first: `c[0]*x^n + ... + c[n]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    pub coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients.iter().fold(0.0, |acc, &c| acc * x + c)
    }
}

/// Least-squares fit of a linear (`degree = 1`) or quadratic (`degree = 2`)
/// polynomial.
///
/// Abscissae are centered and scaled before solving so that detector-sized
/// pixel values do not square into an ill-conditioned system.
pub fn fit_polynomial(xs: &[f64], ys: &[f64], degree: usize) -> Result<Polynomial> {
    if xs.len() != ys.len() {
        return Err(ReduxError::InvalidConfig(format!(
            "{} abscissae for {} ordinates",
            xs.len(),
            ys.len()
        )));
    }
    if xs.len() <= degree {
        return Err(ReduxError::TooFewReferencePoints {
            required: degree + 1,
            found: xs.len(),
        });
    }

    let n = xs.len() as f64;
    let center = xs.iter().sum::<f64>() / n;
    let scale = xs
        .iter()
        .map(|x| (x - center).abs())
        .fold(0.0f64, f64::max);
    if scale == 0.0 {
        return Err(ReduxError::SingularFit);
    }
    let ts: Vec<f64> = xs.iter().map(|x| (x - center) / scale).collect();

    match degree {
        1 => {
            // y = beta*t + gamma
            let [beta, gamma] = normal_solve::<2>(&ts, ys)?;
            let m = beta / scale;
            Ok(Polynomial {
                coefficients: vec![m, gamma - m * center],
            })
        }
        2 => {
            // y = alpha*t^2 + beta*t + gamma
            let [alpha, beta, gamma] = normal_solve::<3>(&ts, ys)?;
            let s2 = scale * scale;
            let a = alpha / s2;
            let b = beta / scale - 2.0 * alpha * center / s2;
            let c = alpha * center * center / s2 - beta * center / scale + gamma;
            Ok(Polynomial {
                coefficients: vec![a, b, c],
            })
        }
        other => Err(ReduxError::InvalidConfig(format!(
            "unsupported polynomial degree {other}"
        ))),
    }
}

/// Solve the normal equations for coefficients of t^(N-1) .. t^0.
#[allow(clippy::needless_range_loop)]
fn normal_solve<const N: usize>(ts: &[f64], ys: &[f64]) -> Result<[f64; N]> {
    let mut ata = [[0.0f64; N]; N];
    let mut aty = [0.0f64; N];
    for (&t, &y) in ts.iter().zip(ys.iter()) {
        let mut row = [0.0f64; N];
        for k in 0..N {
            row[k] = t.powi((N - 1 - k) as i32);
        }
        for i in 0..N {
            aty[i] += row[i] * y;
            for j in 0..N {
                ata[i][j] += row[i] * row[j];
            }
        }
    }
    solve(&ata, &aty).ok_or(ReduxError::SingularFit)
}
