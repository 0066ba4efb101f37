//! Dtype-dispatched elementwise kernels over strided n-dimensional views.
//!
//! Operands are byte buffers described by a dtype tag, a shape, signed byte
//! strides, a byte offset and a layout order. A call names its operands and a
//! stateless callback; the library finds the row of a [`DispatchTable`] whose
//! dtype signature matches, picks a traversal for the operand rank and runs
//! the callback once per element.
//!
//! # Core Types
//!
//! - [`NdarrayView`] / [`NdarrayViewMut`]: validated handles over borrowed bytes
//! - [`DType`], [`Element`], [`CastInto`]: runtime tags and typed element access
//! - [`Payload`]: a type-erased `fn` pointer callback
//! - [`DispatchTable`]: ordered (signature, [`KernelSet`]) rows, first match wins
//! - [`Config`] / [`Strategy`]: tile size and traversal selection
//!
//! # Traversals
//!
//! - Unblocked kernels for ranks 0 through [`MAX_SPECIALIZED_RANK`]
//! - Cache-blocked kernels for ranks 2 through [`MAX_SPECIALIZED_RANK`]
//! - A generic kernel for any higher rank
//!
//! # Example
//!
//! ```rust
//! use strided_dispatch::{unary, NdarrayView, NdarrayViewMut, Order, Payload};
//!
//! fn scale(x: f64) -> f64 {
//!     x * 2.0
//! }
//!
//! let x = [1.0f64, 2.0, 3.0, 4.0];
//! let mut y = [0.0f64; 4];
//! let xv = NdarrayView::from_slice(&x, &[4], Order::RowMajor).unwrap();
//! let mut yv = NdarrayViewMut::from_slice_mut(&mut y, &[4], Order::RowMajor).unwrap();
//! unary(&xv, &mut yv, &Payload::unary(scale)).unwrap();
//! assert_eq!(y, [2.0, 4.0, 6.0, 8.0]);
//! ```
//!
//! # Status codes
//!
//! [`status`] folds a call result into `0` or the negative code from
//! [`StridedError::code`].

mod block;
mod builtin;
mod config;
mod dispatch;
pub mod dtype;
pub mod index;
mod kernel;
mod map;
pub mod order;
mod payload;
pub mod view;

use smallvec::SmallVec;

// ============================================================================
// Dispatch
// ============================================================================
pub use builtin::{
    assign, assign_with, binary, binary_with, nullary, nullary_with, status, unary, unary_with,
    ASSIGN, BINARY, NULLARY, UNARY,
};
pub use dispatch::{
    BinaryKernel, BlockedKernels, DispatchRow, DispatchTable, Kernel, KernelSet, NullaryKernel,
    UnaryKernel, UnblockedKernels,
};
pub use kernel::KernelKind;
pub use payload::Payload;

// ============================================================================
// Arrays and element types
// ============================================================================
pub use dtype::{signature_name, CastInto, DType, Element};
pub use index::{ind2sub, sub2ind, IndexMode};
pub use order::{element_count, iteration_order, shape_to_strides, Order};
pub use view::{Layout, NdarrayView, NdarrayViewMut};

pub use config::{Config, Strategy};

// ============================================================================
// Constants
// ============================================================================

/// Default tile footprint in bytes for blocked traversal.
pub const BLOCK_SIZE_IN_BYTES: usize = 64;

/// Tile edge in elements for 8-byte elements under the default block size.
pub const BLOCK_SIZE_IN_ELEMENTS: usize = 8;

/// Highest rank with a dedicated kernel; higher ranks use the generic kernel.
pub const MAX_SPECIALIZED_RANK: usize = 10;

/// Per-axis storage that stays inline up to [`MAX_SPECIALIZED_RANK`] axes.
pub(crate) type Axes<T> = SmallVec<[T; MAX_SPECIALIZED_RANK]>;

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur while dispatching an elementwise call.
#[derive(Debug, thiserror::Error)]
pub enum StridedError {
    /// No row of the table matches the operand dtypes.
    #[error("no dispatch row matches signature `{}`", signature_name(.0))]
    NoMatchingSignature(Vec<DType>),

    /// A negative rank was passed to the rank router.
    #[error("invalid rank {0}")]
    InvalidRank(isize),

    /// An operand handle was missing.
    #[error("operand {index} is null")]
    NullOperand { index: usize },

    /// Operand ranks do not match.
    #[error("rank mismatch: {0} vs {1}")]
    RankMismatch(usize, usize),

    /// Operand shapes do not match.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// Stride array length doesn't match the shape.
    #[error("stride and shape length mismatch")]
    StrideLengthMismatch,

    /// Integer overflow while computing a byte offset.
    #[error("offset overflow while computing byte index")]
    OffsetOverflow,

    /// The view addresses bytes outside its buffer.
    #[error("view spans bytes {min}..={max} but buffer has {len}")]
    OutOfBounds { min: isize, max: isize, len: usize },

    /// Wrong number of operands or signature entries.
    #[error("expected {expected} operands, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    /// The payload's callback type differs from what the row expects.
    #[error("payload type mismatch: expected {expected}, found {found}")]
    PayloadMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Block size is zero or not a power of two.
    #[error("block size {0} is not a power of two")]
    InvalidBlockSize(usize),

    /// An element index lies outside its extent.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: isize, len: usize },

    /// A typed accessor was used with the wrong element type.
    #[error("dtype mismatch: array holds {expected}, accessed as {found}")]
    DTypeMismatch { expected: DType, found: DType },
}

impl StridedError {
    /// Status code of this error. Success is `0`; every error is negative.
    ///
    /// | code | error                                                     |
    /// |------|-----------------------------------------------------------|
    /// | -1   | `NoMatchingSignature`                                     |
    /// | -2   | `InvalidRank`                                             |
    /// | -3   | `NullOperand`                                             |
    /// | -4   | `RankMismatch`, `ShapeMismatch`                           |
    /// | -5   | `StrideLengthMismatch`, `OffsetOverflow`, `OutOfBounds`   |
    /// | -6   | `ArityMismatch`                                           |
    /// | -7   | `PayloadMismatch`                                         |
    /// | -8   | `InvalidBlockSize`                                        |
    /// | -9   | `IndexOutOfBounds`                                        |
    /// | -10  | `DTypeMismatch`                                           |
    pub fn code(&self) -> i8 {
        match self {
            StridedError::NoMatchingSignature(_) => -1,
            StridedError::InvalidRank(_) => -2,
            StridedError::NullOperand { .. } => -3,
            StridedError::RankMismatch(..) | StridedError::ShapeMismatch(..) => -4,
            StridedError::StrideLengthMismatch
            | StridedError::OffsetOverflow
            | StridedError::OutOfBounds { .. } => -5,
            StridedError::ArityMismatch { .. } => -6,
            StridedError::PayloadMismatch { .. } => -7,
            StridedError::InvalidBlockSize(_) => -8,
            StridedError::IndexOutOfBounds { .. } => -9,
            StridedError::DTypeMismatch { .. } => -10,
        }
    }
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, StridedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_per_kind() {
        let errors = [
            StridedError::NoMatchingSignature(vec![DType::Int8]),
            StridedError::InvalidRank(-1),
            StridedError::NullOperand { index: 0 },
            StridedError::ShapeMismatch(vec![1], vec![2]),
            StridedError::OutOfBounds {
                min: -1,
                max: 0,
                len: 0,
            },
            StridedError::ArityMismatch {
                expected: 2,
                found: 1,
            },
            StridedError::PayloadMismatch {
                expected: "a",
                found: "b",
            },
            StridedError::InvalidBlockSize(3),
            StridedError::IndexOutOfBounds { index: 4, len: 4 },
            StridedError::DTypeMismatch {
                expected: DType::Int8,
                found: DType::Uint8,
            },
        ];
        let mut codes: Vec<i8> = errors.iter().map(StridedError::code).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_no_matching_signature_message() {
        let err = StridedError::NoMatchingSignature(vec![DType::Int8, DType::Int8]);
        assert_eq!(err.to_string(), "no dispatch row matches signature `s_s`");
    }

    #[test]
    fn test_constants_agree() {
        assert_eq!(BLOCK_SIZE_IN_BYTES / 8, BLOCK_SIZE_IN_ELEMENTS);
        assert!(BLOCK_SIZE_IN_BYTES.is_power_of_two());
    }
}
