//! Assembly of stencil matrices and vectors from element kernels.
//!
//! Assembly visits the cells of a tensor-product space in row-major order (the first
//! direction varies slowest). For each cell it hands the quadrature data of every direction to
//! the element kernel, which fills a local buffer, and adds the buffer to the slab of the store
//! starting at the first basis function that is nonzero on the cell. In direction $k$ that is
//! the global row `spans_k[cell_k] - p_k`.
//!
//! Assembly is additive: assembling twice into the same store doubles its content. A failing
//! kernel aborts assembly and leaves the store with the contributions of the cells visited so
//! far, which the caller should discard.
//!
//! ```
//! use igafem::assembly::assemble_matrix;
//! use igafem::kernels::LaplaceKernel;
//! use igafem::space::TensorFemSpace;
//! use igafem::spline::SplineSpace;
//!
//! # fn main() -> Result<(), igafem::error::AssemblyError> {
//! let v1 = SplineSpace::uniform(2, 4)?.fem_space()?;
//! let v2 = SplineSpace::uniform(2, 4)?.fem_space()?;
//! let space = TensorFemSpace::new(vec![v1, v2])?;
//! let stiffness = assemble_matrix(&space, &LaplaceKernel, None)?;
//! assert_eq!(stiffness.shape(), &[6, 6, 5, 5]);
//! # Ok(())
//! # }
//! ```
use crate::error::AssemblyError;
use crate::kernel::{BoundKernel, DirectionData, ElementKernel, KernelArg};
use crate::space::{FiniteElementSpace, TensorFemSpace};
use crate::stencil::{StencilMatrix, StencilStorage, StencilVector, StencilVectorSpace};
use log::debug;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::ops::Range;

/// Which cells an assembly visits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellRange {
    /// Every cell of the space.
    #[default]
    All,
    /// The cells whose rows `spans_k[cell] - p_k ..= spans_k[cell]` lie entirely in the owned
    /// range `starts_k ..= ends_k` of the store.
    ///
    /// For a store owning a sub-domain of a distributed decomposition these are the cells
    /// assembled by that sub-domain. Contributions to rows owned by neighbouring
    /// sub-domains (the halo) are not exchanged. For a serial store this is the same as
    /// [`CellRange::All`].
    Owned,
}

/// How the local buffer is prepared between cells.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalBufferPolicy {
    /// The buffer is zeroed before every kernel call.
    #[default]
    ZeroEachCell,
    /// The buffer is zeroed once per assembly and then left as the previous cell's kernel call
    /// left it. The kernel must overwrite every entry, otherwise contributions of neighbouring
    /// cells bleed into each other.
    KernelOverwrites,
}

/// Settings of a [`StencilAssembler`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblySettings {
    pub cell_range: CellRange,
    pub local_buffer: LocalBufferPolicy,
}

/// The parametric dimensions assembly is available for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParametricDim {
    OneD,
    TwoD,
    ThreeD,
}

impl ParametricDim {
    pub fn dim(self) -> usize {
        match self {
            Self::OneD => 1,
            Self::TwoD => 2,
            Self::ThreeD => 3,
        }
    }
}

impl TryFrom<usize> for ParametricDim {
    type Error = AssemblyError;

    fn try_from(pdim: usize) -> Result<Self, Self::Error> {
        match pdim {
            1 => Ok(Self::OneD),
            2 => Ok(Self::TwoD),
            3 => Ok(Self::ThreeD),
            other => Err(AssemblyError::UnsupportedDimension(other)),
        }
    }
}

#[derive(Debug)]
struct AssemblerWorkspace {
    local: ArrayD<f64>,
}

impl Default for AssemblerWorkspace {
    fn default() -> Self {
        Self {
            local: ArrayD::zeros(IxDyn(&[0])),
        }
    }
}

impl AssemblerWorkspace {
    /// Returns the local buffer with the given shape, filled with zeros.
    fn local_buffer(&mut self, shape: &[usize]) -> &mut ArrayD<f64> {
        if self.local.shape() == shape {
            self.local.fill(0.0);
        } else {
            self.local = ArrayD::zeros(IxDyn(shape));
        }
        &mut self.local
    }
}

/// Assembles stencil matrices and vectors on tensor-product spaces of dimension 1, 2 and 3.
///
/// The assembler keeps its local buffer between assemblies to avoid reallocations. It is
/// therefore not `Sync`, and a kernel must not call back into the assembler that is running
/// it. Assembling into one store from several threads is not supported; the `&mut` borrow of
/// the store rules it out.
#[derive(Debug, Default)]
pub struct StencilAssembler {
    settings: AssemblySettings,
    workspace: RefCell<AssemblerWorkspace>,
}

impl StencilAssembler {
    pub fn new(settings: AssemblySettings) -> Self {
        Self {
            settings,
            workspace: RefCell::default(),
        }
    }

    pub fn settings(&self) -> &AssemblySettings {
        &self.settings
    }

    /// Assembles a matrix into a new zero store sized to `space.vector_space()`.
    ///
    /// Fails with [`AssemblyError::UnsupportedDimension`] before allocating anything if the
    /// parametric dimension of `space` is not 1, 2 or 3.
    pub fn assemble_matrix<K>(
        &self,
        space: &TensorFemSpace,
        kernel: &K,
        args: Option<KernelArg>,
    ) -> Result<StencilMatrix, AssemblyError>
    where
        K: ?Sized + ElementKernel,
    {
        let dim = ParametricDim::try_from(space.pdim())?;
        let mut matrix = StencilMatrix::new(&space.vector_space());
        self.assemble_dispatch(dim, space, kernel, args, &mut matrix)?;
        Ok(matrix)
    }

    /// Accumulates a matrix into an existing store.
    ///
    /// The store is left untouched if the dimension is unsupported, the arguments are invalid
    /// or the store does not match the space.
    pub fn assemble_matrix_into<K>(
        &self,
        space: &TensorFemSpace,
        kernel: &K,
        args: Option<KernelArg>,
        matrix: &mut StencilMatrix,
    ) -> Result<(), AssemblyError>
    where
        K: ?Sized + ElementKernel,
    {
        let dim = ParametricDim::try_from(space.pdim())?;
        self.assemble_dispatch(dim, space, kernel, args, matrix)
    }

    /// Assembles a vector into a new zero store sized to `space.vector_space()`.
    pub fn assemble_vector<K>(
        &self,
        space: &TensorFemSpace,
        kernel: &K,
        args: Option<KernelArg>,
    ) -> Result<StencilVector, AssemblyError>
    where
        K: ?Sized + ElementKernel,
    {
        let dim = ParametricDim::try_from(space.pdim())?;
        let mut vector = StencilVector::new(&space.vector_space());
        self.assemble_dispatch(dim, space, kernel, args, &mut vector)?;
        Ok(vector)
    }

    /// Accumulates a vector into an existing store.
    pub fn assemble_vector_into<K>(
        &self,
        space: &TensorFemSpace,
        kernel: &K,
        args: Option<KernelArg>,
        vector: &mut StencilVector,
    ) -> Result<(), AssemblyError>
    where
        K: ?Sized + ElementKernel,
    {
        let dim = ParametricDim::try_from(space.pdim())?;
        self.assemble_dispatch(dim, space, kernel, args, vector)
    }

    pub fn assemble_matrix_1d<K>(
        &self,
        space: &TensorFemSpace,
        kernel: &K,
        args: Option<KernelArg>,
        matrix: &mut StencilMatrix,
    ) -> Result<(), AssemblyError>
    where
        K: ?Sized + ElementKernel,
    {
        let kernel = prepare(space, kernel, args, &*matrix)?;
        self.assemble_1d(space, &kernel, matrix)
    }

    pub fn assemble_matrix_2d<K>(
        &self,
        space: &TensorFemSpace,
        kernel: &K,
        args: Option<KernelArg>,
        matrix: &mut StencilMatrix,
    ) -> Result<(), AssemblyError>
    where
        K: ?Sized + ElementKernel,
    {
        let kernel = prepare(space, kernel, args, &*matrix)?;
        self.assemble_2d(space, &kernel, matrix)
    }

    pub fn assemble_matrix_3d<K>(
        &self,
        space: &TensorFemSpace,
        kernel: &K,
        args: Option<KernelArg>,
        matrix: &mut StencilMatrix,
    ) -> Result<(), AssemblyError>
    where
        K: ?Sized + ElementKernel,
    {
        let kernel = prepare(space, kernel, args, &*matrix)?;
        self.assemble_3d(space, &kernel, matrix)
    }

    pub fn assemble_vector_1d<K>(
        &self,
        space: &TensorFemSpace,
        kernel: &K,
        args: Option<KernelArg>,
        vector: &mut StencilVector,
    ) -> Result<(), AssemblyError>
    where
        K: ?Sized + ElementKernel,
    {
        let kernel = prepare(space, kernel, args, &*vector)?;
        self.assemble_1d(space, &kernel, vector)
    }

    pub fn assemble_vector_2d<K>(
        &self,
        space: &TensorFemSpace,
        kernel: &K,
        args: Option<KernelArg>,
        vector: &mut StencilVector,
    ) -> Result<(), AssemblyError>
    where
        K: ?Sized + ElementKernel,
    {
        let kernel = prepare(space, kernel, args, &*vector)?;
        self.assemble_2d(space, &kernel, vector)
    }

    pub fn assemble_vector_3d<K>(
        &self,
        space: &TensorFemSpace,
        kernel: &K,
        args: Option<KernelArg>,
        vector: &mut StencilVector,
    ) -> Result<(), AssemblyError>
    where
        K: ?Sized + ElementKernel,
    {
        let kernel = prepare(space, kernel, args, &*vector)?;
        self.assemble_3d(space, &kernel, vector)
    }

    fn assemble_dispatch<K, S>(
        &self,
        dim: ParametricDim,
        space: &TensorFemSpace,
        kernel: &K,
        args: Option<KernelArg>,
        store: &mut S,
    ) -> Result<(), AssemblyError>
    where
        K: ?Sized + ElementKernel,
        S: StencilStorage,
    {
        let kernel = prepare(space, kernel, args, &*store)?;
        debug!(
            "Assembling over {:?} cells of degrees {:?} ({} bound kernel arguments)",
            space.ncells(),
            space.degrees(),
            kernel.args().len()
        );
        match dim {
            ParametricDim::OneD => self.assemble_1d(space, &kernel, store),
            ParametricDim::TwoD => self.assemble_2d(space, &kernel, store),
            ParametricDim::ThreeD => self.assemble_3d(space, &kernel, store),
        }
    }

    fn assemble_1d<K, S>(
        &self,
        space: &TensorFemSpace,
        kernel: &BoundKernel<'_, K>,
        store: &mut S,
    ) -> Result<(), AssemblyError>
    where
        K: ?Sized + ElementKernel,
        S: StencilStorage,
    {
        let [v1] = factors::<1>(space)?;
        let r1 = self.cell_range(v1, 0, store.vector_space());

        let mut ws = self.workspace.borrow_mut();
        let mut cells = CellLoop::new(self.settings.local_buffer, kernel, store, &mut ws);
        for ie1 in r1 {
            cells.visit([v1], [ie1])?;
        }
        Ok(())
    }

    fn assemble_2d<K, S>(
        &self,
        space: &TensorFemSpace,
        kernel: &BoundKernel<'_, K>,
        store: &mut S,
    ) -> Result<(), AssemblyError>
    where
        K: ?Sized + ElementKernel,
        S: StencilStorage,
    {
        let [v1, v2] = factors::<2>(space)?;
        let r1 = self.cell_range(v1, 0, store.vector_space());
        let r2 = self.cell_range(v2, 1, store.vector_space());

        let mut ws = self.workspace.borrow_mut();
        let mut cells = CellLoop::new(self.settings.local_buffer, kernel, store, &mut ws);
        for ie1 in r1 {
            for ie2 in r2.clone() {
                cells.visit([v1, v2], [ie1, ie2])?;
            }
        }
        Ok(())
    }

    fn assemble_3d<K, S>(
        &self,
        space: &TensorFemSpace,
        kernel: &BoundKernel<'_, K>,
        store: &mut S,
    ) -> Result<(), AssemblyError>
    where
        K: ?Sized + ElementKernel,
        S: StencilStorage,
    {
        let [v1, v2, v3] = factors::<3>(space)?;
        let r1 = self.cell_range(v1, 0, store.vector_space());
        let r2 = self.cell_range(v2, 1, store.vector_space());
        let r3 = self.cell_range(v3, 2, store.vector_space());

        let mut ws = self.workspace.borrow_mut();
        let mut cells = CellLoop::new(self.settings.local_buffer, kernel, store, &mut ws);
        for ie1 in r1 {
            for ie2 in r2.clone() {
                for ie3 in r3.clone() {
                    cells.visit([v1, v2, v3], [ie1, ie2, ie3])?;
                }
            }
        }
        Ok(())
    }

    fn cell_range(&self, space: &FiniteElementSpace, direction: usize, store: &StencilVectorSpace) -> Range<usize> {
        let ncells = space.ncells();
        match self.settings.cell_range {
            CellRange::All => 0..ncells,
            CellRange::Owned => {
                let (start, end) = (store.starts()[direction], store.ends()[direction]);
                let p = space.degree();
                // Spans are non-decreasing, so the cells whose rows lie in start..=end are
                // contiguous
                let first = space.spans().partition_point(|&span| span - p < start);
                let last = space.spans().partition_point(|&span| span <= end);
                first..last.max(first)
            }
        }
    }
}

/// Assembles a matrix into a new store with a default [`StencilAssembler`].
pub fn assemble_matrix<K>(
    space: &TensorFemSpace,
    kernel: &K,
    args: Option<KernelArg>,
) -> Result<StencilMatrix, AssemblyError>
where
    K: ?Sized + ElementKernel,
{
    StencilAssembler::default().assemble_matrix(space, kernel, args)
}

/// Accumulates a matrix into `matrix` with a default [`StencilAssembler`].
pub fn assemble_matrix_into<K>(
    space: &TensorFemSpace,
    kernel: &K,
    args: Option<KernelArg>,
    matrix: &mut StencilMatrix,
) -> Result<(), AssemblyError>
where
    K: ?Sized + ElementKernel,
{
    StencilAssembler::default().assemble_matrix_into(space, kernel, args, matrix)
}

/// Assembles a vector into a new store with a default [`StencilAssembler`].
pub fn assemble_vector<K>(
    space: &TensorFemSpace,
    kernel: &K,
    args: Option<KernelArg>,
) -> Result<StencilVector, AssemblyError>
where
    K: ?Sized + ElementKernel,
{
    StencilAssembler::default().assemble_vector(space, kernel, args)
}

/// Accumulates a vector into `vector` with a default [`StencilAssembler`].
pub fn assemble_vector_into<K>(
    space: &TensorFemSpace,
    kernel: &K,
    args: Option<KernelArg>,
    vector: &mut StencilVector,
) -> Result<(), AssemblyError>
where
    K: ?Sized + ElementKernel,
{
    StencilAssembler::default().assemble_vector_into(space, kernel, args, vector)
}

/// Checks the store against the space and binds the kernel arguments.
fn prepare<'k, K, S>(
    space: &TensorFemSpace,
    kernel: &'k K,
    args: Option<KernelArg>,
    store: &S,
) -> Result<BoundKernel<'k, K>, AssemblyError>
where
    K: ?Sized + ElementKernel,
    S: StencilStorage,
{
    let store_space = store.vector_space();
    if store_space.npts() != space.nbasis().as_slice() || store_space.pads() != space.degrees().as_slice() {
        return Err(AssemblyError::StoreMismatch(format!(
            "store has {:?} points with pads {:?}, space has {:?} basis functions of degrees {:?}",
            store_space.npts(),
            store_space.pads(),
            space.nbasis(),
            space.degrees()
        )));
    }
    BoundKernel::new(kernel, args)
}

fn factors<const N: usize>(space: &TensorFemSpace) -> Result<[&FiniteElementSpace; N], AssemblyError> {
    let spaces: &[FiniteElementSpace; N] = space.spaces().try_into().map_err(|_| {
        AssemblyError::InvalidSpace(format!(
            "expected a space of parametric dimension {N}, got {}",
            space.pdim()
        ))
    })?;
    Ok(std::array::from_fn(|k| &spaces[k]))
}

/// Position in the store of the first row a cell contributes to in one direction.
fn slab_offset(
    space: &FiniteElementSpace,
    direction: usize,
    cell: usize,
    start: usize,
    extent: usize,
) -> Result<usize, AssemblyError> {
    let span = space.spans()[cell];
    let p = space.degree();
    // Spans are at least p, see FiniteElementSpace::from_raw_parts
    let first = span - p;
    match first.checked_sub(start) {
        Some(offset) if offset + p < extent => Ok(offset),
        _ => Err(AssemblyError::SpanOutOfRange { direction, cell, span }),
    }
}

/// Per-assembly state of the cell loops.
struct CellLoop<'a, K: ?Sized, S> {
    policy: LocalBufferPolicy,
    kernel: &'a BoundKernel<'a, K>,
    store: &'a mut S,
    local: &'a mut ArrayD<f64>,
    starts: Vec<usize>,
    extents: Vec<usize>,
}

impl<'a, K, S> CellLoop<'a, K, S>
where
    K: ?Sized + ElementKernel,
    S: StencilStorage,
{
    fn new(
        policy: LocalBufferPolicy,
        kernel: &'a BoundKernel<'a, K>,
        store: &'a mut S,
        workspace: &'a mut AssemblerWorkspace,
    ) -> Self {
        let starts = store.vector_space().starts().to_vec();
        let extents = store.vector_space().owned_extents();
        let local = workspace.local_buffer(&store.local_shape());
        Self {
            policy,
            kernel,
            store,
            local,
            starts,
            extents,
        }
    }

    fn visit<const N: usize>(
        &mut self,
        factors: [&FiniteElementSpace; N],
        cell: [usize; N],
    ) -> Result<(), AssemblyError> {
        let mut offsets = [0; N];
        for (k, offset) in offsets.iter_mut().enumerate() {
            *offset = slab_offset(factors[k], k, cell[k], self.starts[k], self.extents[k])?;
        }

        let data: [DirectionData<'_>; N] = std::array::from_fn(|k| factors[k].cell_data(cell[k]));
        if self.policy == LocalBufferPolicy::ZeroEachCell {
            self.local.fill(0.0);
        }
        self.kernel
            .compute(&data, self.local.view_mut())
            .map_err(|err| {
                debug!("Element kernel failed on cell {cell:?}: {err}");
                AssemblyError::Kernel(err)
            })?;
        self.store.accumulate(&offsets, &*self.local);
        Ok(())
    }
}
