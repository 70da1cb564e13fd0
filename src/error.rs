//! Error type shared by space construction, stencil storage and assembly.
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Library-wide error type.
#[derive(Debug)]
#[non_exhaustive]
pub enum AssemblyError {
    /// Assembly is only available for parametric dimensions 1, 2 and 3.
    UnsupportedDimension(usize),
    /// Extra kernel arguments were given in a shape other than a sequence or a mapping.
    InvalidArgument(String),
    /// The space data is inconsistent, or does not have the dimension the procedure expects.
    InvalidSpace(String),
    /// The output store was created for a different space.
    StoreMismatch(String),
    /// The rows touched by a cell fall outside the rows covered by the store.
    SpanOutOfRange { direction: usize, cell: usize, span: usize },
    /// The element kernel failed. The store holds the contributions of all cells visited
    /// before the failing one.
    Kernel(eyre::Report),
}

impl Display for AssemblyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedDimension(dim) => {
                write!(f, "No assembly procedure for parametric dimension {dim} (expected 1, 2 or 3)")
            }
            Self::InvalidArgument(msg) => write!(f, "Invalid kernel arguments: {msg}"),
            Self::InvalidSpace(msg) => write!(f, "Invalid finite element space: {msg}"),
            Self::StoreMismatch(msg) => write!(f, "Store does not match the space: {msg}"),
            Self::SpanOutOfRange { direction, cell, span } => {
                write!(
                    f,
                    "Span {span} of cell {cell} in direction {direction} addresses rows outside the store"
                )
            }
            Self::Kernel(err) => write!(f, "Element kernel failed: {err}"),
        }
    }
}

impl Error for AssemblyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Kernel(err) => {
                let source: &(dyn Error + 'static) = err.as_ref();
                Some(source)
            }
            _ => None,
        }
    }
}
