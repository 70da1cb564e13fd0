//! Gauss-Legendre rules on the reference interval `[-1, 1]`.

use crate::{Error, Rule};
use std::f64::consts::PI;

/// Newton iterations stop once the update falls below this threshold.
const ROOT_TOLERANCE: f64 = 1e-15;

/// Upper bound on Newton iterations per root. The initial guesses are accurate enough that
/// only a handful of iterations are ever needed.
const MAX_NEWTON_ITERATIONS: usize = 100;

/// Value and derivative of the Legendre polynomial `P_n` at `x`.
///
/// The derivative formula is singular at `|x| == 1`, so this must only be used in the open
/// interval `(-1, 1)`.
fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    // Bonnet's recursion: m P_m(x) = (2m - 1) x P_{m-1}(x) - (m - 1) P_{m-2}(x)
    let mut current = 1.0;
    let mut previous = 0.0;
    for m in 1..=n {
        let m = m as f64;
        let next = ((2.0 * m - 1.0) * x * current - (m - 1.0) * previous) / m;
        previous = current;
        current = next;
    }

    let n = n as f64;
    let derivative = n * (x * current - previous) / (x * x - 1.0);
    (current, derivative)
}

/// Gauss-Legendre rule with the given number of points.
///
/// With `n` points the rule integrates polynomials of degree up to `2n - 1` exactly. Points
/// are returned in increasing order.
///
/// # Panics
///
/// Panics if zero points are requested. See [`try_gauss`] for a fallible variant.
pub fn gauss(num_points: usize) -> Rule {
    try_gauss(num_points).expect("number of points must be positive")
}

/// Gauss-Legendre rule with the given number of points, or an error if `num_points == 0`.
pub fn try_gauss(num_points: usize) -> Result<Rule, Error> {
    let n = num_points;
    if n == 0 {
        return Err(Error::NoRuleAvailable);
    }

    // Roots are symmetric about the origin, so only the negative half is computed
    let half = (n + 1) / 2;
    let mut points = vec![0.0; n];
    let mut weights = vec![0.0; n];

    for i in 0..half {
        let mut x = -(PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let (p, dp) = legendre_with_derivative(n, x);
            let dx = -p / dp;
            x += dx;
            if dx.abs() <= ROOT_TOLERANCE {
                break;
            }
        }

        let dp = legendre_with_derivative(n, x).1;
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        points[i] = x;
        weights[i] = w;
        points[n - 1 - i] = -x;
        weights[n - 1 - i] = w;
    }

    // The middle root of an odd rule is exactly zero
    if n % 2 == 1 {
        points[n / 2] = 0.0;
    }

    Ok((weights, points))
}
