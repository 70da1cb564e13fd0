//! Element kernels and their extra arguments.
//!
//! An element kernel computes the local contribution of a single cell from the quadrature
//! data of each direction. For a matrix the local buffer has shape
//! `(p_1 + 1, ..., p_N + 1, 2 p_1 + 1, ..., 2 p_N + 1)`: the leading axes index the local test
//! function $i$, the trailing axes the offset $j_k - i_k + p_k$ of the trial function $j$. For a
//! vector the buffer has shape `(p_1 + 1, ..., p_N + 1)`.
//!
//! Whether the buffer holds zeros when the kernel is called depends on the
//! [`LocalBufferPolicy`](crate::assembly::LocalBufferPolicy) of the assembler. A kernel that
//! writes every entry of the buffer is correct under both policies.
use crate::error::AssemblyError;
use indexmap::IndexMap;
use ndarray::{ArrayD, ArrayView1, ArrayView3, ArrayViewMutD};

/// The quadrature data of one cell in one direction.
#[derive(Debug, Clone, Copy)]
pub struct DirectionData<'a> {
    /// Degree `p` of the basis.
    pub degree: usize,
    /// Number `k` of quadrature points in the cell.
    pub num_quad_points: usize,
    /// Basis values, laid out as `[derivative, local basis function, quadrature point]`.
    pub basis: ArrayView3<'a, f64>,
    /// Quadrature weights of the cell.
    pub weights: ArrayView1<'a, f64>,
    /// Physical coordinates of the quadrature points, if the space provides them.
    pub points: Option<ArrayView1<'a, f64>>,
}

/// An extra argument forwarded to an element kernel after its quadrature data.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelArg {
    Scalar(f64),
    Integer(i64),
    /// For example coefficients of a field evaluated at the quadrature points.
    Array(ArrayD<f64>),
    Sequence(Vec<KernelArg>),
    /// Named arguments. Binding uses the insertion order of the entries.
    Mapping(IndexMap<String, KernelArg>),
}

impl KernelArg {
    /// Builds a mapping from `(name, value)` pairs, keeping their order.
    pub fn mapping<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, KernelArg)>,
    {
        Self::Mapping(
            entries
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Numeric value of a scalar or integer argument.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayD<f64>> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "a scalar",
            Self::Integer(_) => "an integer",
            Self::Array(_) => "an array",
            Self::Sequence(_) => "a sequence",
            Self::Mapping(_) => "a mapping",
        }
    }

    /// Freezes the argument into the positional list a kernel receives.
    ///
    /// A sequence is used as is. A mapping contributes its values in insertion order; keys are
    /// not re-sorted. Any other argument is rejected.
    pub fn into_positional(self) -> Result<Vec<KernelArg>, AssemblyError> {
        match self {
            Self::Sequence(args) => Ok(args),
            Self::Mapping(args) => Ok(args.into_values().collect()),
            other => Err(AssemblyError::InvalidArgument(format!(
                "expected a sequence or a mapping, got {}",
                other.kind()
            ))),
        }
    }
}

impl From<f64> for KernelArg {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<i64> for KernelArg {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<ArrayD<f64>> for KernelArg {
    fn from(array: ArrayD<f64>) -> Self {
        Self::Array(array)
    }
}

impl From<Vec<KernelArg>> for KernelArg {
    fn from(args: Vec<KernelArg>) -> Self {
        Self::Sequence(args)
    }
}

impl From<IndexMap<String, KernelArg>> for KernelArg {
    fn from(args: IndexMap<String, KernelArg>) -> Self {
        Self::Mapping(args)
    }
}

/// Computes the local contribution of one cell.
///
/// `cell` holds one entry per direction, `output` is the local buffer and `args` the extra
/// positional arguments bound before assembly started. The kernel must not rely on `output`
/// being zero unless the assembler zeroes it (see the module documentation).
pub trait ElementKernel {
    fn compute_element(
        &self,
        cell: &[DirectionData<'_>],
        output: ArrayViewMutD<'_, f64>,
        args: &[KernelArg],
    ) -> eyre::Result<()>;
}

impl<K> ElementKernel for &K
where
    K: ?Sized + ElementKernel,
{
    fn compute_element(
        &self,
        cell: &[DirectionData<'_>],
        output: ArrayViewMutD<'_, f64>,
        args: &[KernelArg],
    ) -> eyre::Result<()> {
        (**self).compute_element(cell, output, args)
    }
}

/// A kernel backed by a closure. Construct with [`kernel_fn`].
#[derive(Debug, Clone, Copy)]
pub struct FnKernel<F>(F);

/// Wraps a closure as an [`ElementKernel`].
///
/// ```
/// use igafem::kernel::kernel_fn;
///
/// let ones = kernel_fn(|_cell, mut output, _args| {
///     output.fill(1.0);
///     Ok(())
/// });
/// # let _ = ones;
/// ```
pub fn kernel_fn<F>(f: F) -> FnKernel<F>
where
    F: Fn(&[DirectionData<'_>], ArrayViewMutD<'_, f64>, &[KernelArg]) -> eyre::Result<()>,
{
    FnKernel(f)
}

impl<F> ElementKernel for FnKernel<F>
where
    F: Fn(&[DirectionData<'_>], ArrayViewMutD<'_, f64>, &[KernelArg]) -> eyre::Result<()>,
{
    fn compute_element(
        &self,
        cell: &[DirectionData<'_>],
        output: ArrayViewMutD<'_, f64>,
        args: &[KernelArg],
    ) -> eyre::Result<()> {
        (self.0)(cell, output, args)
    }
}

/// A kernel with its extra arguments applied.
///
/// Binding happens once per assembly, before the cell loop.
#[derive(Debug)]
pub struct BoundKernel<'a, K: ?Sized> {
    kernel: &'a K,
    args: Vec<KernelArg>,
}

impl<'a, K> BoundKernel<'a, K>
where
    K: ?Sized + ElementKernel,
{
    /// Binds `args` to the kernel. `None` binds no arguments.
    pub fn new(kernel: &'a K, args: Option<KernelArg>) -> Result<Self, AssemblyError> {
        let args = match args {
            Some(args) => args.into_positional()?,
            None => Vec::new(),
        };
        Ok(Self { kernel, args })
    }

    pub fn args(&self) -> &[KernelArg] {
        &self.args
    }

    pub fn compute(&self, cell: &[DirectionData<'_>], output: ArrayViewMutD<'_, f64>) -> eyre::Result<()> {
        self.kernel.compute_element(cell, output, &self.args)
    }
}
