//! Linear-index and subscript conversion with configurable out-of-range
//! handling.

use crate::order::{element_count, Order};
use crate::{Result, StridedError};

/// How an out-of-range index is resolved.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum IndexMode {
    /// Reject indices outside `[0, len)`.
    #[default]
    Error,
    /// Wrap around modulo the extent (so `-1` is the last element).
    Wrap,
    /// Clamp to the nearest valid index.
    Clamp,
}

/// Resolve `index` against an extent of `len` under `mode`.
pub fn resolve_index(index: isize, len: usize, mode: IndexMode) -> Result<usize> {
    let out_of_bounds = StridedError::IndexOutOfBounds { index, len };
    if len == 0 {
        return Err(out_of_bounds);
    }
    let n = isize::try_from(len).map_err(|_| StridedError::OffsetOverflow)?;
    let resolved = match mode {
        IndexMode::Error => {
            if index < 0 || index >= n {
                return Err(out_of_bounds);
            }
            index
        }
        IndexMode::Wrap => index.rem_euclid(n),
        IndexMode::Clamp => index.clamp(0, n - 1),
    };
    Ok(resolved as usize)
}

/// Convert a linear view index into subscripts for `shape`.
///
/// The linear index enumerates elements in `order`: for row-major the last
/// subscript varies fastest.
pub fn ind2sub(shape: &[usize], order: Order, index: isize, mode: IndexMode) -> Result<Vec<usize>> {
    let len = element_count(shape)?;
    let mut rem = resolve_index(index, len, mode)?;
    let rank = shape.len();
    let mut subs = vec![0usize; rank];
    for k in 0..rank {
        let axis = match order {
            Order::RowMajor => rank - 1 - k,
            Order::ColumnMajor => k,
        };
        subs[axis] = rem % shape[axis];
        rem /= shape[axis];
    }
    Ok(subs)
}

/// Convert subscripts into a linear view index for `shape`.
///
/// Each subscript is resolved against its own extent under `mode`.
pub fn sub2ind(shape: &[usize], order: Order, subs: &[isize], mode: IndexMode) -> Result<usize> {
    if subs.len() != shape.len() {
        return Err(StridedError::RankMismatch(shape.len(), subs.len()));
    }
    element_count(shape)?;
    let rank = shape.len();
    let mut index = 0usize;
    let mut scale = 1usize;
    for k in 0..rank {
        let axis = match order {
            Order::RowMajor => rank - 1 - k,
            Order::ColumnMajor => k,
        };
        let sub = resolve_index(subs[axis], shape[axis], mode)?;
        index += sub * scale;
        scale *= shape[axis];
    }
    Ok(index)
}
