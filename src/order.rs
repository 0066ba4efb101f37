//! Layout orders and stride arithmetic over signed byte strides.

use crate::{Result, StridedError};

/// Memory layout convention of an ndarray.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Order {
    /// C-like layout: last axis varies fastest.
    #[default]
    RowMajor,
    /// Fortran-like layout: first axis varies fastest.
    ColumnMajor,
}

/// Number of elements addressed by `shape`.
///
/// A zero extent anywhere gives `0`; otherwise the product must fit in `usize`.
pub fn element_count(shape: &[usize]) -> Result<usize> {
    if shape.contains(&0) {
        return Ok(0);
    }
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or(StridedError::OffsetOverflow)
}

/// Compute contiguous byte strides for `shape` in the given `order`.
///
/// Fails with [`StridedError::OffsetOverflow`] if a stride does not fit in
/// `isize`.
pub fn shape_to_strides(
    shape: &[usize],
    bytes_per_element: usize,
    order: Order,
) -> Result<Vec<isize>> {
    let rank = shape.len();
    let bpe = isize::try_from(bytes_per_element).map_err(|_| StridedError::OffsetOverflow)?;
    let mut strides = vec![bpe; rank];
    let scaled = |stride: isize, dim: usize| {
        isize::try_from(dim)
            .ok()
            .and_then(|d| stride.checked_mul(d))
            .ok_or(StridedError::OffsetOverflow)
    };
    match order {
        Order::RowMajor => {
            for i in (0..rank.saturating_sub(1)).rev() {
                strides[i] = scaled(strides[i + 1], shape[i + 1])?;
            }
        }
        Order::ColumnMajor => {
            for i in 1..rank {
                strides[i] = scaled(strides[i - 1], shape[i - 1])?;
            }
        }
    }
    Ok(strides)
}

/// Direction in which a strided view walks memory.
///
/// Returns `1` if no stride is negative, `-1` if no stride is positive (and at
/// least one is negative), and `0` for mixed signs.
pub fn iteration_order(strides: &[isize]) -> i8 {
    let negative = strides.iter().filter(|&&s| s < 0).count();
    if negative == 0 {
        return 1;
    }
    let positive = strides.iter().filter(|&&s| s > 0).count();
    if positive == 0 {
        -1
    } else {
        0
    }
}

/// Minimum and maximum byte index of the *first byte* of any element a view
/// can address.
///
/// For views with a zero extent the result is `(offset, offset)`, although no
/// element is addressable.
pub fn min_max_view_byte_index(
    shape: &[usize],
    strides: &[isize],
    offset: isize,
) -> Result<(isize, isize)> {
    if shape.len() != strides.len() {
        return Err(StridedError::StrideLengthMismatch);
    }
    let mut min = offset;
    let mut max = offset;
    if shape.iter().any(|&d| d == 0) {
        return Ok((min, max));
    }
    for (&dim, &stride) in shape.iter().zip(strides) {
        let span = isize::try_from(dim - 1)
            .ok()
            .and_then(|d| d.checked_mul(stride))
            .ok_or(StridedError::OffsetOverflow)?;
        if span >= 0 {
            max = max.checked_add(span).ok_or(StridedError::OffsetOverflow)?;
        } else {
            min = min.checked_add(span).ok_or(StridedError::OffsetOverflow)?;
        }
    }
    Ok((min, max))
}

/// Returns `Some(1)` if `strides` are exactly the contiguous byte strides for
/// `shape` in `order`, `Some(-1)` if they are their negation, `None` otherwise.
///
/// Axes with extent `<= 1` are ignored since they never move the offset.
pub fn contiguous_direction(
    shape: &[usize],
    strides: &[isize],
    bytes_per_element: usize,
    order: Order,
) -> Option<i8> {
    if shape.len() != strides.len() {
        return None;
    }
    let rank = shape.len();
    let mut expected = bytes_per_element as isize;
    let mut direction: Option<i8> = None;
    for k in 0..rank {
        let axis = match order {
            Order::RowMajor => rank - 1 - k,
            Order::ColumnMajor => k,
        };
        let (dim, stride) = (shape[axis], strides[axis]);
        if dim <= 1 {
            continue;
        }
        let sign = if stride == expected {
            1
        } else if stride == -expected {
            -1
        } else {
            return None;
        };
        match direction {
            None => direction = Some(sign),
            Some(d) if d != sign => return None,
            Some(_) => {}
        }
        expected = expected.saturating_mul(dim as isize);
    }
    Some(direction.unwrap_or(1))
}

/// Whether a view over `shape`/`strides` is contiguous in either direction.
pub fn is_contiguous(
    shape: &[usize],
    strides: &[isize],
    bytes_per_element: usize,
    order: Order,
) -> bool {
    contiguous_direction(shape, strides, bytes_per_element, order).is_some()
}
