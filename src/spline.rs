//! Univariate B-spline spaces on open knot vectors.
//!
//! [`SplineSpace`] evaluates the B-spline basis and its derivatives at Gauss points of every
//! cell and packs the result into the [`FiniteElementSpace`] layout consumed by assembly.
use crate::error::AssemblyError;
use crate::space::FiniteElementSpace;
use igafem_quadrature::map_to_interval;
use igafem_quadrature::univariate::try_gauss;
use log::debug;
use ndarray::{s, Array2, Array4};

/// A B-spline space of a given degree over a grid of breakpoints.
///
/// The knot vector is open: the first and last breakpoints are repeated `degree + 1` times and
/// interior breakpoints appear once, so the basis is $C^{p-1}$ across cells and interpolates at
/// the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineSpace {
    degree: usize,
    breaks: Vec<f64>,
    knots: Vec<f64>,
}

impl SplineSpace {
    /// Creates a space over the given strictly increasing breakpoints.
    pub fn new(degree: usize, breaks: &[f64]) -> Result<Self, AssemblyError> {
        if breaks.len() < 2 {
            return Err(AssemblyError::InvalidSpace(
                "a spline space needs at least two breakpoints".to_string(),
            ));
        }
        if breaks.windows(2).any(|pair| !(pair[0] < pair[1])) {
            return Err(AssemblyError::InvalidSpace(
                "breakpoints must be strictly increasing".to_string(),
            ));
        }

        let first = breaks[0];
        let last = breaks[breaks.len() - 1];
        let interior = &breaks[1..breaks.len() - 1];
        let knots = std::iter::repeat(first)
            .take(degree + 1)
            .chain(interior.iter().copied())
            .chain(std::iter::repeat(last).take(degree + 1))
            .collect();

        Ok(Self {
            degree,
            breaks: breaks.to_vec(),
            knots,
        })
    }

    /// Creates a space over `ncells` cells of equal size on `[0, 1]`.
    pub fn uniform(degree: usize, ncells: usize) -> Result<Self, AssemblyError> {
        let breaks: Vec<f64> = (0..=ncells).map(|i| i as f64 / ncells as f64).collect();
        Self::new(degree, &breaks)
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn breaks(&self) -> &[f64] {
        &self.breaks
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn ncells(&self) -> usize {
        self.breaks.len() - 1
    }

    pub fn nbasis(&self) -> usize {
        self.knots.len() - self.degree - 1
    }

    /// The quadrature order used by [`fem_space`](Self::fem_space): `degree + 1` points, which
    /// integrate products of two basis functions exactly.
    pub fn default_quad_order(&self) -> usize {
        self.degree + 1
    }

    /// Precomputes the quadrature data with the default quadrature order and first derivatives.
    pub fn fem_space(&self) -> Result<FiniteElementSpace, AssemblyError> {
        self.fem_space_with(self.default_quad_order(), 1)
    }

    /// Precomputes basis values and derivatives up to order `nderiv` at `quad_order` Gauss
    /// points per cell.
    pub fn fem_space_with(&self, quad_order: usize, nderiv: usize) -> Result<FiniteElementSpace, AssemblyError> {
        let p = self.degree;
        let ncells = self.ncells();
        let reference_rule = try_gauss(quad_order).map_err(|err| AssemblyError::InvalidSpace(err.to_string()))?;

        let mut basis = Array4::zeros((nderiv + 1, p + 1, quad_order, ncells));
        let mut weights = Array2::zeros((quad_order, ncells));
        let mut points = Array2::zeros((quad_order, ncells));
        let mut spans = Vec::with_capacity(ncells);

        for (cell, pair) in self.breaks.windows(2).enumerate() {
            // With an open knot vector, cell i is the knot interval [t_{p+i}, t_{p+i+1})
            let span = p + cell;
            let (cell_weights, cell_points) = map_to_interval(&reference_rule, pair[0], pair[1]);
            for (q, (&w, &x)) in cell_weights.iter().zip(&cell_points).enumerate() {
                weights[[q, cell]] = w;
                points[[q, cell]] = x;
                let ders = self.basis_derivatives(x, span, nderiv);
                basis.slice_mut(s![.., .., q, cell]).assign(&ders);
            }
            spans.push(span);
        }

        debug!(
            "Precomputed spline space data: degree {p}, {ncells} cells, {quad_order} quadrature points, {nderiv} derivatives"
        );
        FiniteElementSpace::from_raw_parts(p, self.nbasis(), spans, basis, weights)?.with_quadrature_points(points)
    }

    /// Values and derivatives up to order `n` of the `p + 1` basis functions that are nonzero
    /// in the knot interval `span`, as a `(n + 1) x (p + 1)` array.
    ///
    /// Follows algorithm A2.3 of Piegl and Tiller, The NURBS Book (2nd ed.). Derivatives of
    /// order higher than the degree are zero.
    fn basis_derivatives(&self, x: f64, span: usize, n: usize) -> Array2<f64> {
        let p = self.degree;
        let knots = &self.knots;

        // ndu holds basis functions in its upper triangle and knot differences in its lower one
        let mut ndu = Array2::<f64>::zeros((p + 1, p + 1));
        let mut left = vec![0.0; p + 1];
        let mut right = vec![0.0; p + 1];
        ndu[[0, 0]] = 1.0;
        for j in 1..=p {
            left[j] = x - knots[span + 1 - j];
            right[j] = knots[span + j] - x;
            let mut saved = 0.0;
            for r in 0..j {
                ndu[[j, r]] = right[r + 1] + left[j - r];
                let temp = ndu[[r, j - 1]] / ndu[[j, r]];
                ndu[[r, j]] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            ndu[[j, j]] = saved;
        }

        let mut ders = Array2::<f64>::zeros((n + 1, p + 1));
        for j in 0..=p {
            ders[[0, j]] = ndu[[j, p]];
        }

        let top = n.min(p);
        let mut a = Array2::<f64>::zeros((2, p + 1));
        for r in 0..=p {
            let (mut s1, mut s2) = (0, 1);
            a[[0, 0]] = 1.0;
            for k in 1..=top {
                let mut d = 0.0;
                let rk = r as isize - k as isize;
                let pk = p - k;
                if r >= k {
                    let rk = rk as usize;
                    a[[s2, 0]] = a[[s1, 0]] / ndu[[pk + 1, rk]];
                    d = a[[s2, 0]] * ndu[[rk, pk]];
                }
                let j1 = if rk >= -1 { 1 } else { (-rk) as usize };
                let j2 = if r <= pk + 1 { k - 1 } else { p - r };
                for j in j1..=j2 {
                    let col = (rk + j as isize) as usize;
                    a[[s2, j]] = (a[[s1, j]] - a[[s1, j - 1]]) / ndu[[pk + 1, col]];
                    d += a[[s2, j]] * ndu[[col, pk]];
                }
                if r <= pk {
                    a[[s2, k]] = -a[[s1, k - 1]] / ndu[[pk + 1, r]];
                    d += a[[s2, k]] * ndu[[r, pk]];
                }
                ders[[k, r]] = d;
                std::mem::swap(&mut s1, &mut s2);
            }
        }

        // Multiply by p! / (p - k)!
        let mut factor = p as f64;
        for k in 1..=top {
            ders.row_mut(k).mapv_inplace(|v| v * factor);
            factor *= (p - k) as f64;
        }

        ders
    }
}
