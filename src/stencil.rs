//! Banded storage for operators and vectors on tensor-product spline spaces.
//!
//! A basis function of degree $p$ only overlaps with the $p$ neighbours on either side in the
//! same direction, so an operator on an $N$-dimensional tensor-product space couples a row
//! $r = (r_1, \dots, r_N)$ only to the columns $c$ with $|c_k - r_k| \leq p_k$. A
//! [`StencilMatrix`] stores exactly this band in a dense array of shape
//! `(n_1, ..., n_N, 2 p_1 + 1, ..., 2 p_N + 1)`: entry $(r, c)$ lives at
//! `[r_1 - s_1, ..., r_N - s_N, c_1 - r_1 + p_1, ..., c_N - r_N + p_N]`, where $s_k$ is the
//! first row owned by the store. A [`StencilVector`] uses the same leading axes without the
//! trailing offset axes.
//!
//! Stores are created zero-filled and never resized. Conversion to general sparse formats is
//! provided through [`nalgebra_sparse`].
use crate::error::AssemblyError;
use itertools::izip;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::{ArrayD, ArrayViewMutD, IxDyn, Slice};
use serde::{Deserialize, Serialize};

/// Describes the global index space of a stencil store and the part of it the store owns.
///
/// Per direction it holds the global number of points `npts`, the owned range
/// `starts..=ends` and the padding `pads`, which equals the degree of the basis in that
/// direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StencilVectorSpace {
    npts: Vec<usize>,
    starts: Vec<usize>,
    ends: Vec<usize>,
    pads: Vec<usize>,
}

impl StencilVectorSpace {
    /// Creates a space in which every point is owned.
    ///
    /// # Panics
    ///
    /// Panics if `npts` and `pads` differ in length, are empty, or if any direction has no
    /// points.
    pub fn new(npts: Vec<usize>, pads: Vec<usize>) -> Self {
        assert_eq!(npts.len(), pads.len(), "npts and pads must have the same length");
        assert!(!npts.is_empty(), "a stencil space needs at least one direction");
        assert!(npts.iter().all(|&n| n > 0), "every direction must have at least one point");
        let starts = vec![0; npts.len()];
        let ends = npts.iter().map(|n| n - 1).collect();
        Self {
            npts,
            starts,
            ends,
            pads,
        }
    }

    /// Restricts ownership to the rows `starts..=ends` in each direction.
    ///
    /// This describes the sub-domain of one process in a distributed decomposition. Stores
    /// created from the returned space only hold the owned rows.
    pub fn with_owned_range(self, starts: Vec<usize>, ends: Vec<usize>) -> Result<Self, AssemblyError> {
        if starts.len() != self.ndim() || ends.len() != self.ndim() {
            return Err(AssemblyError::InvalidSpace(format!(
                "owned range must have {} directions, got {} starts and {} ends",
                self.ndim(),
                starts.len(),
                ends.len()
            )));
        }
        for (k, (&s, &e, &n)) in izip!(&starts, &ends, &self.npts).enumerate() {
            if s > e || e >= n {
                return Err(AssemblyError::InvalidSpace(format!(
                    "owned range {s}..={e} in direction {k} is not within 0..{n}"
                )));
            }
        }
        Ok(Self { starts, ends, ..self })
    }

    pub fn ndim(&self) -> usize {
        self.npts.len()
    }

    pub fn npts(&self) -> &[usize] {
        &self.npts
    }

    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    pub fn ends(&self) -> &[usize] {
        &self.ends
    }

    pub fn pads(&self) -> &[usize] {
        &self.pads
    }

    /// Number of owned points in each direction.
    pub fn owned_extents(&self) -> Vec<usize> {
        izip!(&self.starts, &self.ends)
            .map(|(s, e)| e - s + 1)
            .collect()
    }

    /// Total number of global points.
    pub fn dimension(&self) -> usize {
        self.npts.iter().product()
    }

    /// Row-major flat index of a global multi-index (the last direction varies fastest).
    pub fn flat_index(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.ndim());
        izip!(index, &self.npts).fold(0, |flat, (&i, &n)| flat * n + i)
    }

    fn is_owned(&self, index: &[usize]) -> bool {
        izip!(index, &self.starts, &self.ends).all(|(i, s, e)| s <= i && i <= e)
    }
}

/// A banded operator on a tensor-product spline space.
#[derive(Debug, Clone, PartialEq)]
pub struct StencilMatrix {
    space: StencilVectorSpace,
    data: ArrayD<f64>,
}

impl StencilMatrix {
    /// Creates a zero matrix mapping the given space to itself.
    pub fn new(space: &StencilVectorSpace) -> Self {
        let shape: Vec<usize> = space
            .owned_extents()
            .into_iter()
            .chain(space.pads().iter().map(|p| 2 * p + 1))
            .collect();
        Self {
            space: space.clone(),
            data: ArrayD::zeros(IxDyn(&shape)),
        }
    }

    pub fn space(&self) -> &StencilVectorSpace {
        &self.space
    }

    /// Shape of the backing array, `(n_1, ..., n_N, 2 p_1 + 1, ..., 2 p_N + 1)`.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// The backing array.
    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Mutable view of the backing array. The view cannot change the shape of the store.
    pub fn data_mut(&mut self) -> ArrayViewMutD<'_, f64> {
        self.data.view_mut()
    }

    pub fn set_zero(&mut self) {
        self.data.fill(0.0);
    }

    /// Returns the entry at the given global row and column.
    ///
    /// Entries outside the band or in rows the store does not own are zero.
    ///
    /// # Panics
    ///
    /// Panics if the multi-indices do not have one entry per direction.
    pub fn get(&self, row: &[usize], col: &[usize]) -> f64 {
        assert_eq!(row.len(), self.space.ndim(), "row index has wrong number of directions");
        assert_eq!(col.len(), self.space.ndim(), "column index has wrong number of directions");
        self.storage_index(row, col)
            .map(|idx| self.data[&idx[..]])
            .unwrap_or(0.0)
    }

    fn storage_index(&self, row: &[usize], col: &[usize]) -> Option<Vec<usize>> {
        if !self.space.is_owned(row) {
            return None;
        }
        let space = &self.space;
        let mut idx: Vec<usize> = izip!(row, &space.starts).map(|(r, s)| r - s).collect();
        for (&r, &c, &p, &n) in izip!(row, col, &space.pads, &space.npts) {
            if c >= n || r.abs_diff(c) > p {
                return None;
            }
            idx.push(c + p - r);
        }
        Some(idx)
    }

    /// Calls `f(row, col, value)` for every stored entry whose column lies inside the global
    /// index space. Entries of the band that reach past the boundary are padding and skipped.
    fn for_each_entry(&self, mut f: impl FnMut(&[usize], &[usize], f64)) {
        let space = &self.space;
        let n = space.ndim();
        let mut row = vec![0; n];
        let mut col = vec![0; n];
        'entries: for (idx, &value) in self.data.indexed_iter() {
            for k in 0..n {
                let r = idx[k] + space.starts[k];
                // Column shifted by the padding, so that it stays non-negative
                let shifted = r + idx[n + k];
                let p = space.pads[k];
                if shifted < p || shifted - p >= space.npts[k] {
                    continue 'entries;
                }
                row[k] = r;
                col[k] = shifted - p;
            }
            f(&row, &col, value);
        }
    }

    /// Converts to coordinate format over the flattened global index space.
    ///
    /// Every entry of the band inside the index space is emitted, including explicit zeros.
    pub fn to_coo(&self) -> CooMatrix<f64> {
        let n = self.space.dimension();
        let mut coo = CooMatrix::new(n, n);
        self.for_each_entry(|row, col, value| {
            coo.push(self.space.flat_index(row), self.space.flat_index(col), value)
        });
        coo
    }

    /// Converts to compressed sparse row format over the flattened global index space.
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        CsrMatrix::from(&self.to_coo())
    }

    /// Converts to a dense matrix over the flattened global index space.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let n = self.space.dimension();
        let mut dense = DMatrix::zeros(n, n);
        self.for_each_entry(|row, col, value| {
            dense[(self.space.flat_index(row), self.space.flat_index(col))] += value
        });
        dense
    }

    /// Computes the product `y = A x` on the owned rows.
    ///
    /// Columns that `x` does not own contribute nothing, so for a store restricted to a
    /// sub-domain the result is only complete after a halo exchange, which is not provided.
    pub fn dot(&self, x: &StencilVector) -> Result<StencilVector, AssemblyError> {
        if x.space() != &self.space {
            return Err(AssemblyError::StoreMismatch(
                "vector and matrix are defined on different spaces".to_string(),
            ));
        }
        let mut y = StencilVector::new(&self.space);
        self.for_each_entry(|row, col, value| {
            if self.space.is_owned(col) {
                let local_row: Vec<usize> = izip!(row, &self.space.starts).map(|(r, s)| r - s).collect();
                y.data[&local_row[..]] += value * x.get(col);
            }
        });
        Ok(y)
    }
}

/// A vector on a tensor-product spline space, stored over the owned points.
#[derive(Debug, Clone, PartialEq)]
pub struct StencilVector {
    space: StencilVectorSpace,
    data: ArrayD<f64>,
}

impl StencilVector {
    /// Creates a zero vector in the given space.
    pub fn new(space: &StencilVectorSpace) -> Self {
        Self {
            space: space.clone(),
            data: ArrayD::zeros(IxDyn(&space.owned_extents())),
        }
    }

    pub fn space(&self) -> &StencilVectorSpace {
        &self.space
    }

    /// Shape of the backing array, `(n_1, ..., n_N)`.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> ArrayViewMutD<'_, f64> {
        self.data.view_mut()
    }

    pub fn set_zero(&mut self) {
        self.data.fill(0.0);
    }

    /// Returns the entry at the given global index, or zero if the index is not owned.
    pub fn get(&self, index: &[usize]) -> f64 {
        assert_eq!(index.len(), self.space.ndim(), "index has wrong number of directions");
        if !self.space.is_owned(index) {
            return 0.0;
        }
        let local: Vec<usize> = izip!(index, &self.space.starts).map(|(i, s)| i - s).collect();
        self.data[&local[..]]
    }

    /// Converts to a vector over the flattened global index space. Points that are not owned
    /// are zero.
    pub fn to_dvector(&self) -> DVector<f64> {
        let mut result = DVector::zeros(self.space.dimension());
        let mut global = vec![0; self.space.ndim()];
        for (idx, &value) in self.data.indexed_iter() {
            for (k, g) in global.iter_mut().enumerate() {
                *g = idx[k] + self.space.starts[k];
            }
            result[self.space.flat_index(&global)] = value;
        }
        result
    }
}

/// Common interface of the stores the assembly loops write into.
pub(crate) trait StencilStorage {
    fn vector_space(&self) -> &StencilVectorSpace;

    /// Shape of the element buffer a single cell contributes.
    fn local_shape(&self) -> Vec<usize>;

    fn storage_mut(&mut self) -> &mut ArrayD<f64>;

    /// Adds `local` to the slab whose leading corner is at `offsets` (in store coordinates).
    /// All trailing axes are covered entirely.
    fn accumulate(&mut self, offsets: &[usize], local: &ArrayD<f64>) {
        let n = offsets.len();
        let mut slab = self.storage_mut().slice_each_axis_mut(|axis| {
            let k = axis.axis.index();
            if k < n {
                Slice::from(offsets[k]..offsets[k] + local.shape()[k])
            } else {
                Slice::from(..)
            }
        });
        slab += local;
    }
}

impl StencilStorage for StencilMatrix {
    fn vector_space(&self) -> &StencilVectorSpace {
        &self.space
    }

    fn local_shape(&self) -> Vec<usize> {
        let pads = self.space.pads();
        pads.iter()
            .map(|p| p + 1)
            .chain(pads.iter().map(|p| 2 * p + 1))
            .collect()
    }

    fn storage_mut(&mut self) -> &mut ArrayD<f64> {
        &mut self.data
    }
}

impl StencilStorage for StencilVector {
    fn vector_space(&self) -> &StencilVectorSpace {
        &self.space
    }

    fn local_shape(&self) -> Vec<usize> {
        self.space.pads().iter().map(|p| p + 1).collect()
    }

    fn storage_mut(&mut self) -> &mut ArrayD<f64> {
        &mut self.data
    }
}
