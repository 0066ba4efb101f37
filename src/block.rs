//! Cache-blocked traversal.
//!
//! Axes are ordered by increasing stride magnitude of the first operand. The
//! two innermost axes are cut into square tiles whose edge is the configured
//! block size divided by the widest element; every tile is swept completely
//! before moving on, for every position of the outer axes.

use crate::config::Config;
use crate::kernel::{advance, check_shapes, delta, rollover, KernelKind, LoopNest, Traversal};
use crate::view::Layout;
use crate::{Result, StridedError};

/// Blocked traversal specialized for rank `R` (2 through 10).
pub(crate) struct Blocked<const R: usize>;

impl<const R: usize> Traversal for Blocked<R> {
    const KIND: KernelKind = KernelKind::Blocked(R);

    fn nest<const N: usize>(layouts: [&Layout; N], config: &Config) -> Result<LoopNest<N>> {
        if let Some(head) = layouts.first() {
            if head.ndims() != R || R < 2 {
                return Err(StridedError::RankMismatch(R, head.ndims()));
            }
        }
        check_shapes(&layouts)?;
        let widest = layouts
            .iter()
            .map(|layout| layout.bytes_per_element())
            .max()
            .unwrap_or(0);
        Ok(LoopNest::by_stride(layouts, config.tile_edge(widest)))
    }

    #[inline]
    fn run<const N: usize, F: FnMut([isize; N])>(nest: &LoopNest<N>, f: F) {
        kernel_blocked::<R, N, F>(nest, f)
    }
}

fn kernel_blocked<const R: usize, const N: usize, F: FnMut([isize; N])>(
    nest: &LoopNest<N>,
    mut f: F,
) {
    if R < 2 || nest.is_empty() {
        return;
    }
    let mut counters = [0usize; R];
    let mut base = nest.offsets;
    loop {
        sweep_tiles(nest, &base, &mut f);
        let mut k = 2;
        loop {
            if k == R {
                return;
            }
            counters[k] += 1;
            if counters[k] < nest.shape[k] {
                advance(&mut base, &nest.strides[k]);
                break;
            }
            counters[k] = 0;
            rollover(&mut base, &nest.strides[k], nest.shape[k]);
            k += 1;
        }
    }
}

/// Visit the plane spanned by nest axes 0 and 1, starting at `base`, tile by
/// tile. Edge tiles are truncated to the remaining extent.
#[inline]
fn sweep_tiles<const N: usize, F: FnMut([isize; N])>(nest: &LoopNest<N>, base: &[isize; N], f: &mut F) {
    let (n0, n1) = (nest.shape[0], nest.shape[1]);
    let (s0, s1) = (nest.strides[0], nest.strides[1]);
    let tile = nest.tile.max(1);

    let mut j1 = 0usize;
    while j1 < n1 {
        let t1 = tile.min(n1 - j1);
        let mut j0 = 0usize;
        while j0 < n0 {
            let t0 = tile.min(n0 - j0);
            let d1 = delta(&s1, &s0, t0);
            let mut offsets: [isize; N] =
                std::array::from_fn(|n| base[n] + j1 as isize * s1[n] + j0 as isize * s0[n]);
            for _ in 0..t1 {
                for _ in 0..t0 {
                    f(offsets);
                    advance(&mut offsets, &s0);
                }
                advance(&mut offsets, &d1);
            }
            j0 += t0;
        }
        j1 += t1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::kernel::Unblocked;
    use crate::order::Order;

    fn visits<T: Traversal, const N: usize>(layouts: [&Layout; N], config: &Config) -> Vec<[isize; N]> {
        let nest = T::nest(layouts, config).unwrap();
        let mut out = Vec::new();
        T::run(&nest, |offsets| out.push(offsets));
        out
    }

    #[test]
    fn test_tile_edge_from_widest_operand() {
        let a = Layout::contiguous(DType::Uint8, &[16, 16], Order::RowMajor).unwrap();
        let b = Layout::contiguous(DType::Complex128, &[16, 16], Order::RowMajor).unwrap();
        let nest = Blocked::<2>::nest([&a, &b], &Config::default()).unwrap();
        assert_eq!(nest.tile, 4);
        let nest = Blocked::<2>::nest([&a], &Config::default()).unwrap();
        assert_eq!(nest.tile, 64);
    }

    #[test]
    fn test_tiles_visit_first_tile_before_second() {
        let layout = Layout::contiguous(DType::Float64, &[3, 3], Order::RowMajor).unwrap();
        let config = Config::new().with_block_size(16).unwrap();
        let seen: Vec<isize> = visits::<Blocked<2>, 1>([&layout], &config)
            .into_iter()
            .map(|[o]| o / 8)
            .collect();
        // 2x2 tiles over a 3x3 row-major matrix, innermost axis is the column.
        assert_eq!(seen, vec![0, 1, 3, 4, 2, 5, 6, 7, 8]);
    }

    #[test]
    fn test_blocked_visits_same_set_as_unblocked() {
        let shape = [5usize, 3, 7, 2];
        let a = Layout::new(
            DType::Float32,
            &shape,
            &[-4, 5 * 7 * 2 * 4, 2 * 4 * 5, 4 * 5],
            4 * 4,
            Order::RowMajor,
        )
        .unwrap();
        let b = Layout::contiguous(DType::Int64, &shape, Order::ColumnMajor).unwrap();
        let config = Config::new().with_block_size(8).unwrap();
        let mut blocked = visits::<Blocked<4>, 2>([&a, &b], &config);
        let mut unblocked = visits::<Unblocked<4>, 2>([&a, &b], &config);
        assert_eq!(blocked.len(), 5 * 3 * 7 * 2);
        blocked.sort();
        unblocked.sort();
        assert_eq!(blocked, unblocked);
    }

    #[test]
    fn test_blocked_zero_extent() {
        let layout = Layout::contiguous(DType::Uint16, &[4, 0, 3], Order::RowMajor).unwrap();
        assert!(visits::<Blocked<3>, 1>([&layout], &Config::default()).is_empty());
    }

    #[test]
    fn test_blocked_rejects_mismatched_operands() {
        let vector = Layout::contiguous(DType::Float64, &[4], Order::RowMajor).unwrap();
        let square = Layout::contiguous(DType::Float64, &[2, 2], Order::RowMajor).unwrap();
        let wide = Layout::contiguous(DType::Float64, &[2, 3], Order::RowMajor).unwrap();
        let config = Config::default();
        assert!(matches!(
            Blocked::<2>::nest([&vector], &config),
            Err(StridedError::RankMismatch(2, 1))
        ));
        assert!(matches!(
            Blocked::<3>::nest([&square], &config),
            Err(StridedError::RankMismatch(3, 2))
        ));
        assert!(matches!(
            Blocked::<2>::nest([&square, &wide], &config),
            Err(StridedError::ShapeMismatch(_, _))
        ));
    }
}
