use igafem::error::AssemblyError;
use igafem::kernel::{BoundKernel, KernelArg};
use indexmap::IndexMap;
use ndarray::{ArrayD, IxDyn};

use super::OnesKernel;

#[test]
fn sequence_is_used_as_is() {
    let args = KernelArg::Sequence(vec![KernelArg::Scalar(1.0), KernelArg::Integer(2)]);
    let positional = args.into_positional().unwrap();
    assert_eq!(positional, vec![KernelArg::Scalar(1.0), KernelArg::Integer(2)]);
}

#[test]
fn mapping_values_follow_insertion_order() {
    let mut map = IndexMap::new();
    map.insert("b".to_string(), KernelArg::Scalar(2.0));
    map.insert("a".to_string(), KernelArg::Scalar(1.0));
    let positional = KernelArg::from(map).into_positional().unwrap();
    assert_eq!(positional, vec![KernelArg::Scalar(2.0), KernelArg::Scalar(1.0)]);
}

#[test]
fn non_collection_arguments_are_rejected() {
    let array = ArrayD::<f64>::zeros(IxDyn(&[2, 2]));
    for arg in [
        KernelArg::Scalar(1.0),
        KernelArg::Integer(1),
        KernelArg::Array(array),
    ] {
        assert!(matches!(
            arg.into_positional(),
            Err(AssemblyError::InvalidArgument(_))
        ));
    }
}

#[test]
fn accessors() {
    assert_eq!(KernelArg::Scalar(1.5).as_scalar(), Some(1.5));
    assert_eq!(KernelArg::Integer(3).as_scalar(), Some(3.0));
    assert_eq!(KernelArg::Integer(3).as_integer(), Some(3));
    assert_eq!(KernelArg::Scalar(1.5).as_integer(), None);
    assert_eq!(KernelArg::Sequence(vec![]).as_scalar(), None);

    let array = ArrayD::<f64>::from_elem(IxDyn(&[3]), 2.0);
    assert_eq!(KernelArg::from(array.clone()).as_array(), Some(&array));
}

#[test]
fn bound_kernel_freezes_arguments() {
    let kernel = OnesKernel;
    let bound = BoundKernel::new(&kernel, None).unwrap();
    assert!(bound.args().is_empty());

    let args = KernelArg::mapping([("c", KernelArg::Scalar(0.5)), ("n", KernelArg::Integer(4))]);
    let bound = BoundKernel::new(&kernel, Some(args)).unwrap();
    assert_eq!(bound.args(), &[KernelArg::Scalar(0.5), KernelArg::Integer(4)]);

    let err = BoundKernel::new(&kernel, Some(KernelArg::Integer(1))).unwrap_err();
    assert!(err.to_string().contains("an integer"));
}
