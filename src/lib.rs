//! Assembly of banded (stencil) matrices and vectors for tensor-product B-spline spaces.
//!
//! The crate is organised leaf to root:
//!
//! - [`spline`] and [`space`] provide the per-cell quadrature data of each direction,
//! - [`kernel`] defines element kernels and their extra arguments, [`kernels`] provides common
//!   ones,
//! - [`stencil`] holds the banded stores,
//! - [`assembly`] runs the cell loops that drive kernels and accumulate into the stores.

pub mod assembly;
pub mod error;
pub mod kernel;
pub mod kernels;
pub mod space;
pub mod spline;
pub mod stencil;

pub mod quadrature {
    pub use igafem_quadrature::*;
}

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
pub extern crate ndarray;
