//! Rank-specialized traversal engine.
//!
//! A traversal walks the index space of `N` equally shaped operands and hands
//! the caller one `[isize; N]` of byte offsets per element. Offsets advance
//! incrementally (odometer style); no index is ever recomputed from scratch.
//!
//! - [`Unblocked`]: hand-written loops for ranks 0-3, const-generic odometer
//!   for ranks 4-10
//! - [`Generic`]: one dynamic odometer for any rank
//! - [`Blocked`](crate::block::Blocked): tiled loops for ranks 2-10

use crate::config::Config;
use crate::order::Order;
use crate::view::Layout;
use crate::{Axes, Result, StridedError};

/// Which traversal a call was routed to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KernelKind {
    /// Plain nested loops for the given rank.
    Unblocked(usize),
    /// Cache-blocked loops for the given rank.
    Blocked(usize),
    /// Dynamic-rank fallback.
    Generic,
}

// ============================================================================
// Operand checks
// ============================================================================

/// Every layout must have the shape of the first one.
pub(crate) fn check_shapes(layouts: &[&Layout]) -> Result<()> {
    let Some((&head, rest)) = layouts.split_first() else {
        return Ok(());
    };
    for layout in rest {
        if layout.ndims() != head.ndims() {
            return Err(StridedError::RankMismatch(head.ndims(), layout.ndims()));
        }
        if layout.shape() != head.shape() {
            return Err(StridedError::ShapeMismatch(
                head.shape().to_vec(),
                layout.shape().to_vec(),
            ));
        }
    }
    Ok(())
}

/// Shape agreement plus an exact rank for rank-specialized traversals.
fn check_rank<const N: usize>(layouts: &[&Layout; N], rank: usize) -> Result<()> {
    if let Some(head) = layouts.first() {
        if head.ndims() != rank {
            return Err(StridedError::RankMismatch(rank, head.ndims()));
        }
    }
    check_shapes(layouts)
}

// ============================================================================
// Loop nest
// ============================================================================

/// Loop nest over `N` operands with axes arranged innermost first.
#[derive(Clone, Debug)]
pub(crate) struct LoopNest<const N: usize> {
    pub(crate) shape: Axes<usize>,
    /// `strides[k][n]` is the byte stride of operand `n` along nest axis `k`.
    pub(crate) strides: Axes<[isize; N]>,
    pub(crate) offsets: [isize; N],
    /// Tile edge in elements; only read by blocked traversals.
    pub(crate) tile: usize,
}

impl<const N: usize> LoopNest<N> {
    fn from_axes(layouts: [&Layout; N], axes: impl Iterator<Item = usize>, tile: usize) -> Self {
        let head = layouts[0];
        let mut shape = Axes::new();
        let mut strides = Axes::new();
        for axis in axes {
            shape.push(head.shape()[axis]);
            strides.push(std::array::from_fn(|n| layouts[n].strides()[axis]));
        }
        Self {
            shape,
            strides,
            offsets: std::array::from_fn(|n| layouts[n].offset()),
            tile,
        }
    }

    /// Axes in storage order of the first operand: the last axis is innermost
    /// for row-major, the first axis for column-major.
    pub(crate) fn by_order(layouts: [&Layout; N]) -> Self {
        let head = layouts[0];
        let rank = head.ndims();
        match head.order() {
            Order::RowMajor => Self::from_axes(layouts, (0..rank).rev(), 0),
            Order::ColumnMajor => Self::from_axes(layouts, 0..rank, 0),
        }
    }

    /// Axes sorted by increasing stride magnitude of the first operand.
    /// Ties keep their original relative order.
    pub(crate) fn by_stride(layouts: [&Layout; N], tile: usize) -> Self {
        let head = layouts[0];
        let mut axes: Axes<usize> = (0..head.ndims()).collect();
        axes.sort_by_key(|&axis| head.strides()[axis].unsigned_abs());
        Self::from_axes(layouts, axes.into_iter(), tile)
    }

    pub(crate) fn rank(&self) -> usize {
        self.shape.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.shape.iter().any(|&d| d == 0)
    }
}

#[inline(always)]
pub(crate) fn advance<const N: usize>(offsets: &mut [isize; N], delta: &[isize; N]) {
    for (offset, d) in offsets.iter_mut().zip(delta.iter()) {
        *offset += d;
    }
}

/// Undo `extent - 1` steps along an axis after its counter wraps.
#[inline(always)]
pub(crate) fn rollover<const N: usize>(offsets: &mut [isize; N], stride: &[isize; N], extent: usize) {
    let steps = extent as isize - 1;
    for (offset, s) in offsets.iter_mut().zip(stride.iter()) {
        *offset -= steps * s;
    }
}

/// Step applied when moving one position along `outer` after a full sweep of
/// `extent` positions along `inner`.
#[inline(always)]
pub(crate) fn delta<const N: usize>(
    outer: &[isize; N],
    inner: &[isize; N],
    extent: usize,
) -> [isize; N] {
    std::array::from_fn(|n| outer[n] - extent as isize * inner[n])
}

// ============================================================================
// Traversal strategies
// ============================================================================

/// A traversal family, selected statically per kernel instantiation.
pub(crate) trait Traversal {
    const KIND: KernelKind;

    /// Validate the operands and arrange their axes. Fails before any byte
    /// is touched if the operands disagree in shape or do not fit the
    /// traversal's rank.
    fn nest<const N: usize>(layouts: [&Layout; N], config: &Config) -> Result<LoopNest<N>>;

    fn run<const N: usize, F: FnMut([isize; N])>(nest: &LoopNest<N>, f: F);
}

/// Unblocked traversal specialized for rank `R`.
pub(crate) struct Unblocked<const R: usize>;

impl<const R: usize> Traversal for Unblocked<R> {
    const KIND: KernelKind = KernelKind::Unblocked(R);

    fn nest<const N: usize>(layouts: [&Layout; N], _config: &Config) -> Result<LoopNest<N>> {
        check_rank(&layouts, R)?;
        Ok(LoopNest::by_order(layouts))
    }

    #[inline]
    fn run<const N: usize, F: FnMut([isize; N])>(nest: &LoopNest<N>, f: F) {
        match R {
            0 => kernel_0d(nest, f),
            1 => kernel_1d(nest, f),
            2 => kernel_2d(nest, f),
            3 => kernel_3d(nest, f),
            _ => kernel_rank::<R, N, F>(nest, f),
        }
    }
}

/// Dynamic-rank traversal.
pub(crate) struct Generic;

impl Traversal for Generic {
    const KIND: KernelKind = KernelKind::Generic;

    fn nest<const N: usize>(layouts: [&Layout; N], _config: &Config) -> Result<LoopNest<N>> {
        check_shapes(&layouts)?;
        Ok(LoopNest::by_order(layouts))
    }

    #[inline]
    fn run<const N: usize, F: FnMut([isize; N])>(nest: &LoopNest<N>, f: F) {
        kernel_generic(nest, f)
    }
}

// ============================================================================
// Specialized kernels
// ============================================================================

#[inline]
fn kernel_0d<const N: usize, F: FnMut([isize; N])>(nest: &LoopNest<N>, mut f: F) {
    f(nest.offsets);
}

#[inline]
fn kernel_1d<const N: usize, F: FnMut([isize; N])>(nest: &LoopNest<N>, mut f: F) {
    let s0 = nest.strides[0];
    let mut offsets = nest.offsets;
    for _ in 0..nest.shape[0] {
        f(offsets);
        advance(&mut offsets, &s0);
    }
}

#[inline]
fn kernel_2d<const N: usize, F: FnMut([isize; N])>(nest: &LoopNest<N>, mut f: F) {
    let (n0, n1) = (nest.shape[0], nest.shape[1]);
    let s0 = nest.strides[0];
    let d1 = delta(&nest.strides[1], &s0, n0);
    let mut offsets = nest.offsets;
    for _ in 0..n1 {
        for _ in 0..n0 {
            f(offsets);
            advance(&mut offsets, &s0);
        }
        advance(&mut offsets, &d1);
    }
}

#[inline]
fn kernel_3d<const N: usize, F: FnMut([isize; N])>(nest: &LoopNest<N>, mut f: F) {
    let (n0, n1, n2) = (nest.shape[0], nest.shape[1], nest.shape[2]);
    let s0 = nest.strides[0];
    let d1 = delta(&nest.strides[1], &s0, n0);
    let d2 = delta(&nest.strides[2], &nest.strides[1], n1);
    let mut offsets = nest.offsets;
    for _ in 0..n2 {
        for _ in 0..n1 {
            for _ in 0..n0 {
                f(offsets);
                advance(&mut offsets, &s0);
            }
            advance(&mut offsets, &d1);
        }
        advance(&mut offsets, &d2);
    }
}

/// Odometer over exactly `R` axes with per-axis deltas held on the stack.
#[inline]
fn kernel_rank<const R: usize, const N: usize, F: FnMut([isize; N])>(
    nest: &LoopNest<N>,
    mut f: F,
) {
    if nest.is_empty() {
        return;
    }
    let mut shape = [0usize; R];
    shape.copy_from_slice(&nest.shape[..R]);
    let mut deltas = [[0isize; N]; R];
    deltas[0] = nest.strides[0];
    for k in 1..R {
        deltas[k] = delta(&nest.strides[k], &nest.strides[k - 1], shape[k - 1]);
    }

    let mut counters = [0usize; R];
    let mut offsets = nest.offsets;
    loop {
        for _ in 0..shape[0] {
            f(offsets);
            advance(&mut offsets, &deltas[0]);
        }
        let mut k = 1;
        loop {
            if k == R {
                return;
            }
            advance(&mut offsets, &deltas[k]);
            counters[k] += 1;
            if counters[k] < shape[k] {
                break;
            }
            counters[k] = 0;
            k += 1;
        }
    }
}

/// One element per iteration; counters carry from the innermost axis out.
fn kernel_generic<const N: usize, F: FnMut([isize; N])>(nest: &LoopNest<N>, mut f: F) {
    if nest.is_empty() {
        return;
    }
    let rank = nest.rank();
    let mut counters: Axes<usize> = Axes::from_elem(0, rank);
    let mut offsets = nest.offsets;
    loop {
        f(offsets);
        let mut k = 0;
        loop {
            if k == rank {
                return;
            }
            counters[k] += 1;
            if counters[k] < nest.shape[k] {
                advance(&mut offsets, &nest.strides[k]);
                break;
            }
            counters[k] = 0;
            rollover(&mut offsets, &nest.strides[k], nest.shape[k]);
            k += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    fn visits<T: Traversal, const N: usize>(layouts: [&Layout; N]) -> Vec<[isize; N]> {
        let config = Config::default();
        let nest = T::nest(layouts, &config).unwrap();
        let mut out = Vec::new();
        T::run(&nest, |offsets| out.push(offsets));
        out
    }

    fn sorted<const N: usize>(mut v: Vec<[isize; N]>) -> Vec<[isize; N]> {
        v.sort();
        v
    }

    #[test]
    fn test_by_order_row_major_reverses_axes() {
        let layout = Layout::contiguous(DType::Float64, &[2, 3, 4], Order::RowMajor).unwrap();
        let nest = LoopNest::by_order([&layout]);
        assert_eq!(nest.shape.as_slice(), &[4, 3, 2]);
        assert_eq!(nest.strides[0], [8]);

        let layout = Layout::contiguous(DType::Float64, &[2, 3, 4], Order::ColumnMajor).unwrap();
        let nest = LoopNest::by_order([&layout]);
        assert_eq!(nest.shape.as_slice(), &[2, 3, 4]);
    }

    #[test]
    fn test_by_stride_sorts_by_magnitude() {
        let layout =
            Layout::new(DType::Uint8, &[2, 3, 4], &[-1, 8, 2], 1, Order::RowMajor).unwrap();
        let nest = LoopNest::by_stride([&layout], 4);
        assert_eq!(nest.shape.as_slice(), &[2, 4, 3]);
        assert_eq!(nest.strides.as_slice(), &[[-1], [2], [8]]);
        assert_eq!(nest.offsets, [1]);
    }

    #[test]
    fn test_row_major_visits_in_memory_order() {
        let layout = Layout::contiguous(DType::Int32, &[2, 3], Order::RowMajor).unwrap();
        let seen = visits::<Unblocked<2>, 1>([&layout]);
        let expected: Vec<[isize; 1]> = (0..6).map(|i| [i * 4]).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_rank0_visits_offset_once() {
        let layout = Layout::new(DType::Int8, &[], &[], 5, Order::RowMajor).unwrap();
        assert_eq!(visits::<Unblocked<0>, 1>([&layout]), vec![[5]]);
        assert_eq!(visits::<Generic, 1>([&layout]), vec![[5]]);
    }

    #[test]
    fn test_zero_extent_never_calls() {
        let layout = Layout::contiguous(DType::Float32, &[3, 0, 2, 2, 2], Order::RowMajor).unwrap();
        assert!(visits::<Unblocked<5>, 1>([&layout]).is_empty());
        assert!(visits::<Generic, 1>([&layout]).is_empty());
        let layout = Layout::contiguous(DType::Float32, &[0, 4], Order::ColumnMajor).unwrap();
        assert!(visits::<Unblocked<2>, 1>([&layout]).is_empty());
    }

    #[test]
    fn test_specialized_and_generic_agree() {
        let shape = [2usize, 3, 1, 2, 3];
        let a = Layout::contiguous(DType::Float64, &shape, Order::RowMajor).unwrap();
        let b = Layout::new(
            DType::Int16,
            &shape,
            &[-2, 4 * 12, 7, 12, 4],
            2,
            Order::ColumnMajor,
        )
        .unwrap();
        let specialized = visits::<Unblocked<5>, 2>([&a, &b]);
        let generic = visits::<Generic, 2>([&a, &b]);
        assert_eq!(specialized.len(), 36);
        assert_eq!(specialized, generic);
    }

    #[test]
    fn test_column_major_first_operand_drives_order() {
        let a = Layout::contiguous(DType::Uint8, &[2, 2], Order::ColumnMajor).unwrap();
        let b = Layout::contiguous(DType::Uint8, &[2, 2], Order::RowMajor).unwrap();
        let seen = visits::<Unblocked<2>, 2>([&a, &b]);
        assert_eq!(seen, vec![[0, 0], [1, 2], [2, 1], [3, 3]]);

        // Swapping operands changes the visit order but not the pairing.
        let swapped: Vec<[isize; 2]> = visits::<Unblocked<2>, 2>([&b, &a])
            .into_iter()
            .map(|[x, y]| [y, x])
            .collect();
        assert_ne!(swapped, seen);
        assert_eq!(sorted(swapped), sorted(seen));
    }

    #[test]
    fn test_nest_rejects_wrong_rank() {
        let layout = Layout::contiguous(DType::Float64, &[4], Order::RowMajor).unwrap();
        let config = Config::default();
        assert!(matches!(
            Unblocked::<3>::nest([&layout], &config),
            Err(StridedError::RankMismatch(3, 1))
        ));
        assert!(matches!(
            Unblocked::<0>::nest([&layout], &config),
            Err(StridedError::RankMismatch(0, 1))
        ));
        assert!(Generic::nest([&layout], &config).is_ok());
    }

    #[test]
    fn test_nest_rejects_disagreeing_shapes() {
        let long = Layout::contiguous(DType::Float64, &[4], Order::RowMajor).unwrap();
        let short = Layout::contiguous(DType::Float64, &[2], Order::RowMajor).unwrap();
        let matrix = Layout::contiguous(DType::Float64, &[2, 2], Order::RowMajor).unwrap();
        let config = Config::default();
        assert!(matches!(
            Unblocked::<1>::nest([&long, &short], &config),
            Err(StridedError::ShapeMismatch(_, _))
        ));
        assert!(matches!(
            Generic::nest([&long, &matrix], &config),
            Err(StridedError::RankMismatch(1, 2))
        ));
    }
}
