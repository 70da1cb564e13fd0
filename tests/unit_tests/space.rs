use super::raw_space;
use igafem::error::AssemblyError;
use igafem::space::{FiniteElementSpace, TensorFemSpace};
use igafem::spline::SplineSpace;
use matrixcompare::assert_scalar_eq;
use ndarray::{s, Array2, Array4, Axis};
use proptest::prelude::*;

fn invalid_space(result: Result<FiniteElementSpace, AssemblyError>) -> bool {
    matches!(result, Err(AssemblyError::InvalidSpace(_)))
}

#[test]
fn raw_parts_are_validated() {
    let basis = || Array4::zeros((2, 3, 4, 2));
    let weights = || Array2::ones((4, 2));

    let space = FiniteElementSpace::from_raw_parts(2, 4, vec![2, 3], basis(), weights()).unwrap();
    assert_eq!(space.ncells(), 2);
    assert_eq!(space.quad_order(), 4);
    assert_eq!(space.nderiv(), 1);
    assert!(space.quadrature_points().is_none());

    // No cells
    assert!(invalid_space(FiniteElementSpace::from_raw_parts(
        2,
        4,
        vec![],
        Array4::zeros((2, 3, 4, 0)),
        Array2::ones((4, 0))
    )));
    // Too few basis functions
    assert!(invalid_space(FiniteElementSpace::from_raw_parts(2, 2, vec![2, 2], basis(), weights())));
    // Wrong number of local basis functions
    assert!(invalid_space(FiniteElementSpace::from_raw_parts(
        1,
        4,
        vec![2, 3],
        basis(),
        weights()
    )));
    // Weights disagree with the basis
    assert!(invalid_space(FiniteElementSpace::from_raw_parts(
        2,
        4,
        vec![2, 3],
        basis(),
        Array2::ones((3, 2))
    )));
    // Spans out of range
    assert!(invalid_space(FiniteElementSpace::from_raw_parts(2, 4, vec![1, 3], basis(), weights())));
    assert!(invalid_space(FiniteElementSpace::from_raw_parts(2, 4, vec![2, 4], basis(), weights())));
    // Decreasing spans
    assert!(invalid_space(FiniteElementSpace::from_raw_parts(2, 4, vec![3, 2], basis(), weights())));
}

#[test]
fn quadrature_points_must_match_the_weights() {
    let space = raw_space(1, 3);
    assert!(invalid_space(space.clone().with_quadrature_points(Array2::zeros((2, 3)))));
    let space = space.with_quadrature_points(Array2::zeros((1, 3))).unwrap();
    assert!(space.quadrature_points().is_some());
}

#[test]
fn cell_data_exposes_one_cell() {
    let mut basis = Array4::zeros((1, 2, 1, 3));
    basis[[0, 1, 0, 2]] = 7.0;
    let weights = Array2::from_shape_vec((1, 3), vec![0.1, 0.2, 0.3]).unwrap();
    let space = FiniteElementSpace::from_raw_parts(1, 4, vec![1, 2, 3], basis, weights).unwrap();

    let data = space.cell_data(2);
    assert_eq!(data.degree, 1);
    assert_eq!(data.num_quad_points, 1);
    assert_eq!(data.basis.shape(), &[1, 2, 1]);
    assert_eq!(data.basis[[0, 1, 0]], 7.0);
    assert_eq!(data.weights[0], 0.3);
    assert!(data.points.is_none());

    let points = Array2::from_shape_vec((1, 3), vec![0.5, 1.5, 2.5]).unwrap();
    let space = space.with_quadrature_points(points).unwrap();
    let data = space.cell_data(1);
    assert_eq!(data.points.map(|points| points[0]), Some(1.5));
}

#[test]
fn tensor_space_needs_a_factor() {
    assert!(matches!(
        TensorFemSpace::new(vec![]),
        Err(AssemblyError::InvalidSpace(_))
    ));
}

#[test]
fn tensor_space_index_space() {
    let space = TensorFemSpace::new(vec![raw_space(2, 3), raw_space(1, 4)]).unwrap();
    assert_eq!(space.pdim(), 2);
    assert_eq!(space.ncells(), vec![3, 4]);
    assert_eq!(space.degrees(), vec![2, 1]);
    assert_eq!(space.nbasis(), vec![5, 5]);

    let vector_space = space.vector_space();
    assert_eq!(vector_space.npts(), &[5, 5]);
    assert_eq!(vector_space.pads(), &[2, 1]);
    assert_eq!(vector_space.starts(), &[0, 0]);
    assert_eq!(vector_space.ends(), &[4, 4]);
}

#[test]
fn spline_space_rejects_bad_breakpoints() {
    assert!(SplineSpace::new(2, &[0.0]).is_err());
    assert!(SplineSpace::new(2, &[0.0, 0.5, 0.5, 1.0]).is_err());
    assert!(SplineSpace::new(1, &[1.0, 0.0]).is_err());
}

#[test]
fn spline_space_knots_are_open() {
    let space = SplineSpace::new(2, &[0.0, 0.25, 1.0]).unwrap();
    assert_eq!(space.knots(), &[0.0, 0.0, 0.0, 0.25, 1.0, 1.0, 1.0]);
    assert_eq!(space.ncells(), 2);
    assert_eq!(space.nbasis(), 4);
}

#[test]
fn spline_space_rejects_empty_quadrature() {
    let space = SplineSpace::uniform(1, 2).unwrap();
    assert!(matches!(
        space.fem_space_with(0, 1),
        Err(AssemblyError::InvalidSpace(_))
    ));
}

proptest! {
    #[test]
    fn spline_quadrature_data_is_consistent(
        degree in 0usize..5,
        ncells in 1usize..7,
        extra_points in 0usize..3,
    ) {
        let spline = SplineSpace::uniform(degree, ncells).unwrap();
        let quad_order = degree + 1 + extra_points;
        let space = spline.fem_space_with(quad_order, 2).unwrap();

        prop_assert_eq!(space.nbasis(), ncells + degree);
        prop_assert_eq!(space.ncells(), ncells);
        prop_assert_eq!(space.quad_order(), quad_order);
        prop_assert_eq!(space.basis().shape(), &[3, degree + 1, quad_order, ncells][..]);
        let spans: Vec<usize> = (0..ncells).map(|cell| degree + cell).collect();
        prop_assert_eq!(space.spans(), &spans[..]);

        let h = 1.0 / ncells as f64;
        let points = space.quadrature_points().unwrap();
        for cell in 0..ncells {
            assert_scalar_eq!(space.weights().column(cell).sum(), h, comp = abs, tol = 1e-13);
            for &x in points.column(cell) {
                prop_assert!(x > cell as f64 * h - 1e-14 && x < (cell + 1) as f64 * h + 1e-14);
            }

            let cell_basis = space.basis().index_axis(Axis(3), cell);
            for q in 0..quad_order {
                // Partition of unity, so derivatives sum to zero
                let values = cell_basis.slice(s![0, .., q]).sum();
                let first = cell_basis.slice(s![1, .., q]).sum();
                let second = cell_basis.slice(s![2, .., q]).sum();
                assert_scalar_eq!(values, 1.0, comp = abs, tol = 1e-12);
                assert_scalar_eq!(first, 0.0, comp = abs, tol = 1e-9);
                assert_scalar_eq!(second, 0.0, comp = abs, tol = 1e-7);
                prop_assert!(cell_basis.slice(s![0, .., q]).iter().all(|&v| v >= -1e-14));
            }
        }
    }
}
