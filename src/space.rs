//! Precomputed quadrature data of tensor-product spline spaces.
//!
//! Assembly does not evaluate basis functions itself. Each direction of a tensor-product space
//! is described by a [`FiniteElementSpace`] holding, per cell, the values and derivatives of
//! the nonzero basis functions at the quadrature points, the quadrature weights and the span
//! of the cell. The data can be computed from a knot vector with
//! [`SplineSpace`](crate::spline::SplineSpace) or supplied directly with
//! [`FiniteElementSpace::from_raw_parts`].
use crate::error::AssemblyError;
use crate::kernel::DirectionData;
use crate::stencil::StencilVectorSpace;
use ndarray::{Array2, Array4, Axis};

/// Quadrature data of a univariate spline space.
///
/// The arrays are laid out as
///
/// - `basis`: `[derivative, local basis function (0..=p), quadrature point, cell]`,
/// - `weights`: `[quadrature point, cell]`,
/// - `spans`: one entry per cell.
///
/// The span of a cell is the global index of the last basis function that is nonzero on the
/// cell, so the `p + 1` nonzero functions are `spans[cell] - p ..= spans[cell]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FiniteElementSpace {
    degree: usize,
    nbasis: usize,
    spans: Vec<usize>,
    basis: Array4<f64>,
    weights: Array2<f64>,
    points: Option<Array2<f64>>,
}

impl FiniteElementSpace {
    /// Creates a space from precomputed arrays, checking that they are consistent.
    ///
    /// The number of cells is the length of `spans`, the number of quadrature points per cell is
    /// the extent of the third axis of `basis`.
    pub fn from_raw_parts(
        degree: usize,
        nbasis: usize,
        spans: Vec<usize>,
        basis: Array4<f64>,
        weights: Array2<f64>,
    ) -> Result<Self, AssemblyError> {
        let invalid = |msg: String| Err(AssemblyError::InvalidSpace(msg));
        let ncells = spans.len();
        if ncells == 0 {
            return invalid("a space needs at least one cell".to_string());
        }
        if nbasis < degree + 1 {
            return invalid(format!("{nbasis} basis functions are too few for degree {degree}"));
        }

        let &[nderiv, nlocal, nquad, basis_cells] = basis.shape() else {
            unreachable!("Array4 always has four axes")
        };
        if nderiv == 0 || nlocal != degree + 1 || basis_cells != ncells {
            return invalid(format!(
                "basis has shape {:?}, expected [_, {}, _, {ncells}] with at least one derivative order",
                basis.shape(),
                degree + 1
            ));
        }
        if nquad == 0 {
            return invalid("cells need at least one quadrature point".to_string());
        }
        if weights.shape() != [nquad, ncells] {
            return invalid(format!(
                "weights have shape {:?}, expected [{nquad}, {ncells}]",
                weights.shape()
            ));
        }

        if let Some((cell, span)) = spans
            .iter()
            .copied()
            .enumerate()
            .find(|&(_, span)| span < degree || span >= nbasis)
        {
            return invalid(format!(
                "span {span} of cell {cell} is outside {degree}..{nbasis}"
            ));
        }
        if spans.windows(2).any(|pair| pair[0] > pair[1]) {
            return invalid("spans must be non-decreasing".to_string());
        }

        Ok(Self {
            degree,
            nbasis,
            spans,
            basis,
            weights,
            points: None,
        })
    }

    /// Attaches the physical quadrature points, laid out as `[quadrature point, cell]`.
    pub fn with_quadrature_points(self, points: Array2<f64>) -> Result<Self, AssemblyError> {
        if points.shape() != self.weights.shape() {
            return Err(AssemblyError::InvalidSpace(format!(
                "quadrature points have shape {:?}, expected {:?}",
                points.shape(),
                self.weights.shape()
            )));
        }
        Ok(Self {
            points: Some(points),
            ..self
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn nbasis(&self) -> usize {
        self.nbasis
    }

    pub fn ncells(&self) -> usize {
        self.spans.len()
    }

    /// Number of quadrature points per cell.
    pub fn quad_order(&self) -> usize {
        self.weights.nrows()
    }

    /// Highest derivative order available in [`basis`](Self::basis).
    pub fn nderiv(&self) -> usize {
        self.basis.shape()[0] - 1
    }

    pub fn spans(&self) -> &[usize] {
        &self.spans
    }

    pub fn basis(&self) -> &Array4<f64> {
        &self.basis
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    /// Physical quadrature points, if the space was built with them.
    pub fn quadrature_points(&self) -> Option<&Array2<f64>> {
        self.points.as_ref()
    }

    /// The data of a single cell, as handed to element kernels.
    ///
    /// # Panics
    ///
    /// Panics if `cell >= self.ncells()`.
    pub fn cell_data(&self, cell: usize) -> DirectionData<'_> {
        DirectionData {
            degree: self.degree,
            num_quad_points: self.quad_order(),
            basis: self.basis.index_axis(Axis(3), cell),
            weights: self.weights.column(cell),
            points: self.points.as_ref().map(|points| points.column(cell)),
        }
    }
}

/// A tensor product of univariate spaces.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorFemSpace {
    spaces: Vec<FiniteElementSpace>,
}

impl TensorFemSpace {
    pub fn new(spaces: Vec<FiniteElementSpace>) -> Result<Self, AssemblyError> {
        if spaces.is_empty() {
            return Err(AssemblyError::InvalidSpace(
                "a tensor-product space needs at least one factor".to_string(),
            ));
        }
        Ok(Self { spaces })
    }

    /// The parametric dimension, i.e. the number of factors.
    pub fn pdim(&self) -> usize {
        self.spaces.len()
    }

    pub fn spaces(&self) -> &[FiniteElementSpace] {
        &self.spaces
    }

    pub fn ncells(&self) -> Vec<usize> {
        self.spaces.iter().map(FiniteElementSpace::ncells).collect()
    }

    pub fn degrees(&self) -> Vec<usize> {
        self.spaces.iter().map(FiniteElementSpace::degree).collect()
    }

    pub fn nbasis(&self) -> Vec<usize> {
        self.spaces.iter().map(FiniteElementSpace::nbasis).collect()
    }

    /// The serial index space of the coefficients, padded by the degree in each direction.
    pub fn vector_space(&self) -> StencilVectorSpace {
        StencilVectorSpace::new(self.nbasis(), self.degrees())
    }
}

impl From<FiniteElementSpace> for TensorFemSpace {
    fn from(space: FiniteElementSpace) -> Self {
        Self { spaces: vec![space] }
    }
}
