use super::{raw_space, spline_space, tensor_spline_space};
use igafem::assembly::{assemble_matrix, assemble_vector};
use igafem::error::AssemblyError;
use igafem::kernel::KernelArg;
use igafem::kernels::{ConstantSourceKernel, LaplaceKernel, LaplaceMassKernel, MassKernel, SourceKernel};
use igafem::space::TensorFemSpace;
use igafem::spline::SplineSpace;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector};

#[test]
fn linear_stiffness_and_mass_on_two_cells() {
    let space = TensorFemSpace::from(spline_space(1, 2));

    let stiffness = assemble_matrix(&space, &LaplaceKernel, None).unwrap();
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
        2.0, -2.0, 0.0,
        -2.0, 4.0, -2.0,
        0.0, -2.0, 2.0]);
    assert_matrix_eq!(stiffness.to_dense(), expected, comp = abs, tol = 1e-13);

    let mass = assemble_matrix(&space, &MassKernel, None).unwrap();
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
        1.0 / 6.0, 1.0 / 12.0, 0.0,
        1.0 / 12.0, 1.0 / 3.0, 1.0 / 12.0,
        0.0, 1.0 / 12.0, 1.0 / 6.0]);
    assert_matrix_eq!(mass.to_dense(), expected, comp = abs, tol = 1e-14);
}

#[test]
fn two_dimensional_laplace_annihilates_constants() {
    let space = tensor_spline_space(&[3, 2], &[5, 4]);
    let stiffness = assemble_matrix(&space, &LaplaceKernel, None).unwrap();
    assert_eq!(stiffness.shape(), &[8, 6, 7, 5]);

    let dense = stiffness.to_dense();
    let ones = DVector::repeat(dense.ncols(), 1.0);
    let zeros = DVector::zeros(dense.nrows());
    assert_matrix_eq!(&dense * ones, zeros, comp = abs, tol = 1e-11);
    assert_matrix_eq!(dense, dense.transpose(), comp = abs, tol = 1e-12);
}

#[test]
fn mass_matrix_integrates_to_the_domain_volume() {
    let space = tensor_spline_space(&[2, 2], &[3, 5]);
    let mass = assemble_matrix(&space, &MassKernel, None).unwrap();
    assert_scalar_eq!(mass.to_dense().sum(), 1.0, comp = abs, tol = 1e-13);

    // The band entries beyond the boundary stay zero for a mass kernel
    assert_scalar_eq!(mass.data().sum(), 1.0, comp = abs, tol = 1e-13);
}

#[test]
fn laplace_mass_combines_both_forms() {
    let space = tensor_spline_space(&[2, 1], &[2, 3]);
    let c = 2.5;
    let laplace = assemble_matrix(&space, &LaplaceKernel, None).unwrap().to_dense();
    let mass = assemble_matrix(&space, &MassKernel, None).unwrap().to_dense();
    let combined = assemble_matrix(&space, &LaplaceMassKernel, Some(KernelArg::Sequence(vec![c.into()])))
        .unwrap()
        .to_dense();
    assert_matrix_eq!(combined, laplace + c * mass, comp = abs, tol = 1e-12);
}

#[test]
fn laplace_mass_without_coefficient_fails() {
    let space = TensorFemSpace::from(spline_space(2, 3));
    let result = assemble_matrix(&space, &LaplaceMassKernel, None);
    assert!(matches!(result, Err(AssemblyError::Kernel(_))));

    let args = KernelArg::mapping([("c", KernelArg::Sequence(vec![]))]);
    let result = assemble_matrix(&space, &LaplaceMassKernel, Some(args));
    assert!(matches!(result, Err(AssemblyError::Kernel(_))));
}

#[test]
fn laplace_needs_first_derivatives() {
    let values_only = SplineSpace::uniform(2, 3)
        .unwrap()
        .fem_space_with(3, 0)
        .unwrap();
    let space = TensorFemSpace::from(values_only);
    assert!(assemble_matrix(&space, &MassKernel, None).is_ok());

    let err = assemble_matrix(&space, &LaplaceKernel, None).unwrap_err();
    assert!(matches!(err, AssemblyError::Kernel(_)));
    assert!(err.to_string().contains("derivatives"));
}

#[test]
fn matrix_kernels_reject_vector_buffers() {
    let space = TensorFemSpace::from(spline_space(1, 2));
    let result = assemble_vector(&space, &MassKernel, None);
    assert!(matches!(result, Err(AssemblyError::Kernel(_))));

    let result = assemble_matrix(&space, &ConstantSourceKernel::new(1.0), None);
    assert!(matches!(result, Err(AssemblyError::Kernel(_))));
}

#[test]
fn constant_source_scales_with_its_value() {
    let space = tensor_spline_space(&[2, 3], &[4, 2]);
    let unit = assemble_vector(&space, &ConstantSourceKernel::new(1.0), None).unwrap();
    let scaled = assemble_vector(&space, &ConstantSourceKernel::new(-3.0), None).unwrap();

    assert_scalar_eq!(unit.data().sum(), 1.0, comp = abs, tol = 1e-13);
    assert_matrix_eq!(scaled.to_dvector(), -3.0 * unit.to_dvector(), comp = abs, tol = 1e-14);
    assert!(unit.data().iter().all(|&v| v > 0.0));
}

#[test]
fn linear_source_on_two_linear_cells() {
    let space = TensorFemSpace::from(spline_space(1, 2));
    let load = assemble_vector(&space, &SourceKernel::new(|x: &[f64]| x[0]), None).unwrap();

    let expected = DVector::from_column_slice(&[1.0 / 24.0, 1.0 / 4.0, 5.0 / 24.0]);
    assert_matrix_eq!(load.to_dvector(), expected, comp = abs, tol = 1e-14);
}

#[test]
fn coordinate_dependent_source_in_three_dimensions() {
    let space = tensor_spline_space(&[2, 2, 2], &[3, 2, 4]);
    let f = |x: &[f64]| x[0] * (1.0 - x[0]) * x[1] * (1.0 - x[1]) * x[2];
    let load = assemble_vector(&space, &SourceKernel::new(f), None).unwrap();
    assert_eq!(load.shape(), &[5, 4, 6]);

    // Partition of unity: the entries sum to the integral of f over the unit cube
    assert_scalar_eq!(load.data().sum(), 1.0 / 72.0, comp = abs, tol = 1e-14);

    // A constant function reproduces the constant source kernel
    let constant = assemble_vector(&space, &SourceKernel::new(|_: &[f64]| 2.0), None).unwrap();
    let reference = assemble_vector(&space, &ConstantSourceKernel::new(2.0), None).unwrap();
    assert_matrix_eq!(constant.to_dvector(), reference.to_dvector(), comp = abs, tol = 1e-14);
}

#[test]
fn source_needs_quadrature_points() {
    let space = TensorFemSpace::from(raw_space(1, 2));
    let err = assemble_vector(&space, &SourceKernel::new(|x: &[f64]| x[0]), None).unwrap_err();
    assert!(matches!(err, AssemblyError::Kernel(_)));
    assert!(err.to_string().contains("quadrature points"));
}
