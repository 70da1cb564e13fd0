//! Element kernels for common bilinear and linear forms on the parametric domain.
//!
//! On a tensor-product cell, both the quadrature rule and the basis factor by direction, so
//! every integral with a constant coefficient is a product (or sum of products) of univariate
//! cell integrals. These are computed once per cell and direction and then combined for each
//! pair of local basis functions. [`SourceKernel`] has a coordinate-dependent integrand and
//! loops over the tensor-product quadrature points instead.
//!
//! All kernels overwrite the full local buffer and therefore work under either
//! [`LocalBufferPolicy`](crate::assembly::LocalBufferPolicy).
use crate::kernel::{DirectionData, ElementKernel, KernelArg};
use eyre::eyre;
use itertools::{izip, Itertools};
use nalgebra::{DMatrix, DVector};
use ndarray::{ArrayView1, ArrayViewMutD};

/// The mass form $\int u v \, dx$.
#[derive(Debug, Copy, Clone, Default)]
pub struct MassKernel;

/// The Laplace (stiffness) form $\int \nabla u \cdot \nabla v \, dx$.
#[derive(Debug, Copy, Clone, Default)]
pub struct LaplaceKernel;

/// The form $\int \nabla u \cdot \nabla v + c \, u v \, dx$.
///
/// The coefficient $c$ is read from the first extra argument, which must be a scalar or an
/// integer.
#[derive(Debug, Copy, Clone, Default)]
pub struct LaplaceMassKernel;

/// The load form $\int f v \, dx$ for a constant $f$.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ConstantSourceKernel {
    pub value: f64,
}

impl ConstantSourceKernel {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

/// The load form $\int f v \, dx$ for a function $f$ of the physical coordinates.
///
/// `f` receives one coordinate per direction and is evaluated at the tensor-product quadrature
/// points of each cell. The space must carry its quadrature points, as spaces built by
/// [`SplineSpace`](crate::spline::SplineSpace) do.
///
/// ```
/// use igafem::assembly::assemble_vector;
/// use igafem::kernels::SourceKernel;
/// use igafem::space::TensorFemSpace;
/// use igafem::spline::SplineSpace;
///
/// # fn main() -> Result<(), igafem::error::AssemblyError> {
/// let space = TensorFemSpace::from(SplineSpace::uniform(2, 4)?.fem_space()?);
/// let load = assemble_vector(&space, &SourceKernel::new(|x: &[f64]| x[0] * (1.0 - x[0])), None)?;
/// assert!((load.data().sum() - 1.0 / 6.0).abs() < 1e-14);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Copy, Clone)]
pub struct SourceKernel<F> {
    f: F,
}

impl<F> SourceKernel<F>
where
    F: Fn(&[f64]) -> f64,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

/// Cell integrals of products of basis derivatives in one direction,
/// `A[i, j] = sum_q w_q B[row_derivative, i, q] B[col_derivative, j, q]`.
fn univariate_matrix(
    direction: &DirectionData<'_>,
    row_derivative: usize,
    col_derivative: usize,
) -> eyre::Result<DMatrix<f64>> {
    check_derivatives(direction, row_derivative.max(col_derivative))?;
    let DirectionData {
        degree,
        num_quad_points,
        basis,
        weights,
        ..
    } = direction;
    Ok(DMatrix::from_fn(degree + 1, degree + 1, |i, j| {
        (0..*num_quad_points)
            .map(|q| weights[q] * basis[[row_derivative, i, q]] * basis[[col_derivative, j, q]])
            .sum()
    }))
}

/// Cell integrals of the basis functions in one direction.
fn univariate_vector(direction: &DirectionData<'_>) -> DVector<f64> {
    let DirectionData {
        degree,
        num_quad_points,
        basis,
        weights,
        ..
    } = direction;
    DVector::from_fn(degree + 1, |i, _| {
        (0..*num_quad_points)
            .map(|q| weights[q] * basis[[0, i, q]])
            .sum()
    })
}

fn check_derivatives(direction: &DirectionData<'_>, required: usize) -> eyre::Result<()> {
    let available = direction.basis.shape()[0];
    if required >= available {
        return Err(eyre!(
            "kernel needs basis derivatives of order {required}, but only orders below {available} are available"
        ));
    }
    Ok(())
}

fn check_shape(output: &ArrayViewMutD<'_, f64>, expected: &[usize]) -> eyre::Result<()> {
    if output.shape() != expected {
        return Err(eyre!(
            "local buffer has shape {:?}, expected {:?}",
            output.shape(),
            expected
        ));
    }
    Ok(())
}

/// All local multi-indices of a cell, the last direction varying fastest.
fn local_indices(cell: &[DirectionData<'_>]) -> Vec<Vec<usize>> {
    cell.iter()
        .map(|direction| 0..direction.degree + 1)
        .multi_cartesian_product()
        .collect()
}

/// Overwrites a local matrix buffer with `entry(i, j)` for all pairs of local test and trial
/// functions.
fn fill_local_matrix(
    cell: &[DirectionData<'_>],
    mut output: ArrayViewMutD<'_, f64>,
    entry: impl Fn(&[usize], &[usize]) -> f64,
) -> eyre::Result<()> {
    let expected: Vec<usize> = cell
        .iter()
        .map(|d| d.degree + 1)
        .chain(cell.iter().map(|d| 2 * d.degree + 1))
        .collect();
    check_shape(&output, &expected)?;

    output.fill(0.0);
    let indices = local_indices(cell);
    let mut idx = Vec::with_capacity(2 * cell.len());
    for i in &indices {
        for j in &indices {
            idx.clear();
            idx.extend_from_slice(i);
            idx.extend(izip!(i, j, cell).map(|(i, j, d)| j + d.degree - i));
            output[&idx[..]] = entry(i, j);
        }
    }
    Ok(())
}

fn laplace_entry(mass: &[DMatrix<f64>], stiffness: &[DMatrix<f64>], i: &[usize], j: &[usize]) -> f64 {
    (0..mass.len())
        .map(|d| {
            izip!(0.., i, j)
                .map(|(k, &i, &j)| {
                    if k == d {
                        stiffness[k][(i, j)]
                    } else {
                        mass[k][(i, j)]
                    }
                })
                .product::<f64>()
        })
        .sum()
}

fn mass_entry(mass: &[DMatrix<f64>], i: &[usize], j: &[usize]) -> f64 {
    izip!(mass, i, j).map(|(m, &i, &j)| m[(i, j)]).product()
}

impl ElementKernel for MassKernel {
    fn compute_element(
        &self,
        cell: &[DirectionData<'_>],
        output: ArrayViewMutD<'_, f64>,
        _args: &[KernelArg],
    ) -> eyre::Result<()> {
        let mass: Vec<_> = cell
            .iter()
            .map(|d| univariate_matrix(d, 0, 0))
            .collect::<eyre::Result<_>>()?;
        fill_local_matrix(cell, output, |i, j| mass_entry(&mass, i, j))
    }
}

impl ElementKernel for LaplaceKernel {
    fn compute_element(
        &self,
        cell: &[DirectionData<'_>],
        output: ArrayViewMutD<'_, f64>,
        _args: &[KernelArg],
    ) -> eyre::Result<()> {
        let mass: Vec<_> = cell
            .iter()
            .map(|d| univariate_matrix(d, 0, 0))
            .collect::<eyre::Result<_>>()?;
        let stiffness: Vec<_> = cell
            .iter()
            .map(|d| univariate_matrix(d, 1, 1))
            .collect::<eyre::Result<_>>()?;
        fill_local_matrix(cell, output, |i, j| laplace_entry(&mass, &stiffness, i, j))
    }
}

impl ElementKernel for LaplaceMassKernel {
    fn compute_element(
        &self,
        cell: &[DirectionData<'_>],
        output: ArrayViewMutD<'_, f64>,
        args: &[KernelArg],
    ) -> eyre::Result<()> {
        let c = args
            .first()
            .and_then(KernelArg::as_scalar)
            .ok_or_else(|| eyre!("expected a scalar mass coefficient as first argument"))?;
        let mass: Vec<_> = cell
            .iter()
            .map(|d| univariate_matrix(d, 0, 0))
            .collect::<eyre::Result<_>>()?;
        let stiffness: Vec<_> = cell
            .iter()
            .map(|d| univariate_matrix(d, 1, 1))
            .collect::<eyre::Result<_>>()?;
        fill_local_matrix(cell, output, |i, j| {
            laplace_entry(&mass, &stiffness, i, j) + c * mass_entry(&mass, i, j)
        })
    }
}

impl ElementKernel for ConstantSourceKernel {
    fn compute_element(
        &self,
        cell: &[DirectionData<'_>],
        mut output: ArrayViewMutD<'_, f64>,
        _args: &[KernelArg],
    ) -> eyre::Result<()> {
        let expected: Vec<usize> = cell.iter().map(|d| d.degree + 1).collect();
        check_shape(&output, &expected)?;

        let loads: Vec<_> = cell.iter().map(univariate_vector).collect();
        for i in local_indices(cell) {
            let value: f64 = izip!(&loads, &i).map(|(load, &i)| load[i]).product();
            output[&i[..]] = self.value * value;
        }
        Ok(())
    }
}

impl<F> ElementKernel for SourceKernel<F>
where
    F: Fn(&[f64]) -> f64,
{
    fn compute_element(
        &self,
        cell: &[DirectionData<'_>],
        mut output: ArrayViewMutD<'_, f64>,
        _args: &[KernelArg],
    ) -> eyre::Result<()> {
        let expected: Vec<usize> = cell.iter().map(|d| d.degree + 1).collect();
        check_shape(&output, &expected)?;
        let points: Vec<ArrayView1<'_, f64>> = cell
            .iter()
            .map(|d| {
                d.points
                    .ok_or_else(|| eyre!("source kernel needs the quadrature points of the space"))
            })
            .collect::<eyre::Result<_>>()?;

        output.fill(0.0);
        let indices = local_indices(cell);
        let mut x = vec![0.0; cell.len()];
        for q in cell
            .iter()
            .map(|d| 0..d.num_quad_points)
            .multi_cartesian_product()
        {
            let mut weight = 1.0;
            for (k, (&qk, d)) in q.iter().zip(cell).enumerate() {
                x[k] = points[k][qk];
                weight *= d.weights[qk];
            }
            let fw = weight * (self.f)(&x);
            for i in &indices {
                let phi: f64 = izip!(i, &q, cell)
                    .map(|(&i, &q, d)| d.basis[[0, i, q]])
                    .product();
                output[&i[..]] += fw * phi;
            }
        }
        Ok(())
    }
}
