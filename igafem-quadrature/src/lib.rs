//! Quadrature rules for the cells of tensor-product spline spaces.
//!
//! Tensor-product spaces integrate cell by cell and direction by direction, so only
//! univariate rules are provided here. A rule on the reference interval `[-1, 1]` is mapped
//! onto a physical cell with [`map_to_interval`].

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that a rule satisfying the given requirements is not available.
    NoRuleAvailable,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable => {
                write!(f, "There is no quadrature rule satisfying the requirements available")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A univariate rule, stored as `(weights, points)`.
pub type Rule = (Vec<f64>, Vec<f64>);

/// Approximates the integral of `f` with the given rule.
pub fn integrate(rule: &Rule, f: impl Fn(f64) -> f64) -> f64 {
    let (weights, points) = rule;
    weights.iter().zip(points).map(|(w, &x)| w * f(x)).sum()
}

/// Maps a rule on the reference interval `[-1, 1]` onto the interval `[a, b]`.
///
/// Weights are scaled by the Jacobian `(b - a) / 2` of the affine map, so that the mapped
/// rule integrates over `[a, b]` directly.
pub fn map_to_interval(rule: &Rule, a: f64, b: f64) -> Rule {
    let (weights, points) = rule;
    let half_length = 0.5 * (b - a);
    let midpoint = 0.5 * (a + b);
    let weights = weights.iter().map(|w| half_length * w).collect();
    let points = points.iter().map(|xi| half_length * xi + midpoint).collect();
    (weights, points)
}
