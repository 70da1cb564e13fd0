use igafem::kernel::{DirectionData, ElementKernel, KernelArg};
use igafem::space::{FiniteElementSpace, TensorFemSpace};
use igafem::spline::SplineSpace;
use ndarray::{Array2, Array4, ArrayViewMutD};

mod kernel;
mod kernels;
mod space;

/// A space with spans `p, p + 1, ...` and a single dummy quadrature point per cell, for tests
/// that do not look at the quadrature data.
pub fn raw_space(degree: usize, ncells: usize) -> FiniteElementSpace {
    let spans = (0..ncells).map(|cell| degree + cell).collect();
    let basis = Array4::zeros((1, degree + 1, 1, ncells));
    let weights = Array2::ones((1, ncells));
    FiniteElementSpace::from_raw_parts(degree, ncells + degree, spans, basis, weights).unwrap()
}

pub fn spline_space(degree: usize, ncells: usize) -> FiniteElementSpace {
    SplineSpace::uniform(degree, ncells)
        .unwrap()
        .fem_space()
        .unwrap()
}

pub fn tensor_spline_space(degrees: &[usize], ncells: &[usize]) -> TensorFemSpace {
    let spaces = degrees
        .iter()
        .zip(ncells)
        .map(|(&p, &n)| spline_space(p, n))
        .collect();
    TensorFemSpace::new(spaces).unwrap()
}

/// Writes ones into the whole local buffer, so every stored entry counts the cells that
/// contribute to it.
#[derive(Debug)]
pub struct OnesKernel;

impl ElementKernel for OnesKernel {
    fn compute_element(
        &self,
        _cell: &[DirectionData<'_>],
        mut output: ArrayViewMutD<'_, f64>,
        _args: &[KernelArg],
    ) -> eyre::Result<()> {
        output.fill(1.0);
        Ok(())
    }
}
