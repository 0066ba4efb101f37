//! Byte-buffer ndarray handles.
//!
//! This module provides the operand types accepted by every dispatch entry
//! point:
//!
//! - [`Layout`]: dtype, shape, signed byte strides, byte offset and order
//! - [`NdarrayView`]: a validated read-only handle over borrowed bytes
//! - [`NdarrayViewMut`]: a validated writable handle over borrowed bytes
//!
//! Construction checks that every byte any element of the view can address
//! lies inside the buffer, so the traversal kernels never index out of range.

use std::fmt;

use bytemuck::{NoUninit, Pod};

use crate::dtype::{DType, Element};
use crate::index::{ind2sub, IndexMode};
use crate::order::{element_count, min_max_view_byte_index, shape_to_strides, Order};
use crate::{Axes, Result, StridedError};

// ============================================================================
// Layout
// ============================================================================

/// Metadata of an ndarray: everything except the buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    dtype: DType,
    shape: Axes<usize>,
    strides: Axes<isize>,
    offset: isize,
    order: Order,
}

impl Layout {
    /// Build a layout without checking it against any buffer.
    pub fn new(
        dtype: DType,
        shape: &[usize],
        strides: &[isize],
        offset: isize,
        order: Order,
    ) -> Result<Self> {
        if shape.len() != strides.len() {
            return Err(StridedError::StrideLengthMismatch);
        }
        element_count(shape)?;
        Ok(Self {
            dtype,
            shape: Axes::from_slice(shape),
            strides: Axes::from_slice(strides),
            offset,
            order,
        })
    }

    /// Contiguous layout of `shape` in `order`, starting at byte zero.
    pub fn contiguous(dtype: DType, shape: &[usize], order: Order) -> Result<Self> {
        element_count(shape)?;
        let strides = shape_to_strides(shape, dtype.bytes_per_element(), order)?;
        Ok(Self {
            dtype,
            shape: Axes::from_slice(shape),
            strides: Axes::from_vec(strides),
            offset: 0,
            order,
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn offset(&self) -> isize {
        self.offset
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn ndims(&self) -> usize {
        self.shape.len()
    }

    /// Number of addressable elements. Constructors reject shapes whose
    /// element count overflows `usize`.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|&d| d == 0)
    }

    pub fn bytes_per_element(&self) -> usize {
        self.dtype.bytes_per_element()
    }

    /// Check that every addressed element of this layout fits in `len` bytes.
    pub fn validate(&self, len: usize) -> Result<()> {
        let (min, max) = min_max_view_byte_index(&self.shape, &self.strides, self.offset)?;
        if self.is_empty() {
            return Ok(());
        }
        let end = max
            .checked_add(self.bytes_per_element() as isize)
            .ok_or(StridedError::OffsetOverflow)?;
        if min < 0 || end as usize > len {
            return Err(StridedError::OutOfBounds { min, max, len });
        }
        Ok(())
    }

    /// Byte offset of the element at `subs`. Subscripts are not checked.
    pub(crate) fn byte_offset(&self, subs: &[usize]) -> isize {
        subs.iter()
            .zip(self.strides.iter())
            .fold(self.offset, |acc, (&i, &s)| acc + i as isize * s)
    }

    fn check_subscripts(&self, subs: &[usize]) -> Result<()> {
        if subs.len() != self.ndims() {
            return Err(StridedError::RankMismatch(self.ndims(), subs.len()));
        }
        for (&i, &dim) in subs.iter().zip(self.shape.iter()) {
            if i >= dim {
                return Err(StridedError::IndexOutOfBounds {
                    index: i as isize,
                    len: dim,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn check_dtype<T: Element>(&self) -> Result<()> {
        if T::DTYPE != self.dtype {
            return Err(StridedError::DTypeMismatch {
                expected: self.dtype,
                found: T::DTYPE,
            });
        }
        Ok(())
    }

    /// Same dtype and order with a new geometry; used to squeeze or flatten a
    /// view onto exactly the bytes it already addresses.
    pub(crate) fn reshaped(&self, shape: &[usize], strides: &[isize], offset: isize) -> Self {
        Self {
            dtype: self.dtype,
            shape: Axes::from_slice(shape),
            strides: Axes::from_slice(strides),
            offset,
            order: self.order,
        }
    }
}

fn checked_len(data_len: usize, shape: &[usize]) -> Result<()> {
    let expected = element_count(shape)?;
    if data_len != expected {
        return Err(StridedError::ShapeMismatch(vec![data_len], shape.to_vec()));
    }
    Ok(())
}

/// Read every element of `layout` in logical row-major order.
fn collect<T: Element>(data: &[u8], layout: &Layout) -> Result<Vec<T>> {
    layout.check_dtype::<T>()?;
    let mut out = Vec::with_capacity(layout.len());
    if layout.is_empty() {
        return Ok(out);
    }
    let rank = layout.ndims();
    let mut index: Axes<usize> = Axes::from_elem(0, rank);
    loop {
        out.push(T::read(data, layout.byte_offset(&index) as usize));
        let mut axis = rank;
        loop {
            if axis == 0 {
                return Ok(out);
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < layout.shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}

// ============================================================================
// NdarrayView
// ============================================================================

/// Read-only ndarray handle over a borrowed byte buffer.
#[derive(Clone)]
pub struct NdarrayView<'a> {
    data: &'a [u8],
    layout: Layout,
}

impl fmt::Debug for NdarrayView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdarrayView")
            .field("layout", &self.layout)
            .field("buffer_len", &self.data.len())
            .finish()
    }
}

impl<'a> NdarrayView<'a> {
    /// Create a view, validating strides and bounds against `data`.
    pub fn new(
        data: &'a [u8],
        dtype: DType,
        shape: &[usize],
        strides: &[isize],
        offset: isize,
        order: Order,
    ) -> Result<Self> {
        let layout = Layout::new(dtype, shape, strides, offset, order)?;
        Self::from_layout(data, layout)
    }

    pub fn from_layout(data: &'a [u8], layout: Layout) -> Result<Self> {
        layout.validate(data.len())?;
        Ok(Self { data, layout })
    }

    /// Contiguous view over typed data.
    pub fn from_slice<T: Element + NoUninit>(
        data: &'a [T],
        shape: &[usize],
        order: Order,
    ) -> Result<Self> {
        checked_len(data.len(), shape)?;
        Ok(Self {
            data: bytemuck::cast_slice(data),
            layout: Layout::contiguous(T::DTYPE, shape, order)?,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn dtype(&self) -> DType {
        self.layout.dtype
    }

    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    pub fn strides(&self) -> &[isize] {
        self.layout.strides()
    }

    pub fn offset(&self) -> isize {
        self.layout.offset
    }

    pub fn order(&self) -> Order {
        self.layout.order
    }

    pub fn ndims(&self) -> usize {
        self.layout.ndims()
    }

    pub fn len(&self) -> usize {
        self.layout.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Element at `subs`.
    pub fn get<T: Element>(&self, subs: &[usize]) -> Result<T> {
        self.layout.check_dtype::<T>()?;
        self.layout.check_subscripts(subs)?;
        Ok(T::read(self.data, self.layout.byte_offset(subs) as usize))
    }

    /// Element at linear index `index`, enumerated in the view's order.
    pub fn iget<T: Element>(&self, index: isize, mode: IndexMode) -> Result<T> {
        let subs = ind2sub(self.shape(), self.order(), index, mode)?;
        self.get(&subs)
    }

    /// Copy out all elements in logical row-major order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        collect(self.data, &self.layout)
    }

    pub(crate) fn with_layout(&self, layout: Layout) -> NdarrayView<'a> {
        NdarrayView {
            data: self.data,
            layout,
        }
    }
}

// ============================================================================
// NdarrayViewMut
// ============================================================================

/// Writable ndarray handle over a borrowed byte buffer.
///
/// Only the buffer is ever written by the dispatch entry points; the layout is
/// never changed.
pub struct NdarrayViewMut<'a> {
    data: &'a mut [u8],
    layout: Layout,
}

impl fmt::Debug for NdarrayViewMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdarrayViewMut")
            .field("layout", &self.layout)
            .field("buffer_len", &self.data.len())
            .finish()
    }
}

impl<'a> NdarrayViewMut<'a> {
    pub fn new(
        data: &'a mut [u8],
        dtype: DType,
        shape: &[usize],
        strides: &[isize],
        offset: isize,
        order: Order,
    ) -> Result<Self> {
        let layout = Layout::new(dtype, shape, strides, offset, order)?;
        Self::from_layout(data, layout)
    }

    pub fn from_layout(data: &'a mut [u8], layout: Layout) -> Result<Self> {
        layout.validate(data.len())?;
        Ok(Self { data, layout })
    }

    /// Contiguous writable view over typed data.
    pub fn from_slice_mut<T: Element + Pod>(
        data: &'a mut [T],
        shape: &[usize],
        order: Order,
    ) -> Result<Self> {
        checked_len(data.len(), shape)?;
        Ok(Self {
            data: bytemuck::cast_slice_mut(data),
            layout: Layout::contiguous(T::DTYPE, shape, order)?,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn dtype(&self) -> DType {
        self.layout.dtype
    }

    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    pub fn strides(&self) -> &[isize] {
        self.layout.strides()
    }

    pub fn offset(&self) -> isize {
        self.layout.offset
    }

    pub fn order(&self) -> Order {
        self.layout.order
    }

    pub fn ndims(&self) -> usize {
        self.layout.ndims()
    }

    pub fn len(&self) -> usize {
        self.layout.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &*self.data
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }

    pub fn as_view(&self) -> NdarrayView<'_> {
        NdarrayView {
            data: &*self.data,
            layout: self.layout.clone(),
        }
    }

    pub fn reborrow(&mut self) -> NdarrayViewMut<'_> {
        NdarrayViewMut {
            data: &mut *self.data,
            layout: self.layout.clone(),
        }
    }

    pub fn get<T: Element>(&self, subs: &[usize]) -> Result<T> {
        self.as_view().get(subs)
    }

    pub fn set<T: Element>(&mut self, subs: &[usize], value: T) -> Result<()> {
        self.layout.check_dtype::<T>()?;
        self.layout.check_subscripts(subs)?;
        value.write(&mut *self.data, self.layout.byte_offset(subs) as usize);
        Ok(())
    }

    pub fn iget<T: Element>(&self, index: isize, mode: IndexMode) -> Result<T> {
        self.as_view().iget(index, mode)
    }

    pub fn iset<T: Element>(&mut self, index: isize, value: T, mode: IndexMode) -> Result<()> {
        let subs = ind2sub(self.shape(), self.order(), index, mode)?;
        self.set(&subs, value)
    }

    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        collect(&*self.data, &self.layout)
    }

    pub(crate) fn with_layout(&mut self, layout: Layout) -> NdarrayViewMut<'_> {
        NdarrayViewMut {
            data: &mut *self.data,
            layout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_contiguous() {
        let data = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let view = NdarrayView::from_slice(&data, &[2, 3], Order::RowMajor).unwrap();
        assert_eq!(view.strides(), &[24, 8]);
        assert_eq!(view.dtype(), DType::Float64);
        assert_eq!(view.get::<f64>(&[1, 0]).unwrap(), 4.0);

        let view = NdarrayView::from_slice(&data, &[2, 3], Order::ColumnMajor).unwrap();
        assert_eq!(view.strides(), &[8, 16]);
        assert_eq!(view.get::<f64>(&[1, 0]).unwrap(), 2.0);
        assert_eq!(view.to_vec::<f64>().unwrap(), vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_from_slice_length_mismatch() {
        let data = [0i32; 5];
        assert!(matches!(
            NdarrayView::from_slice(&data, &[2, 3], Order::RowMajor),
            Err(StridedError::ShapeMismatch(_, _))
        ));
    }

    #[test]
    fn test_overflowing_shapes_are_rejected() {
        let empty: [f64; 0] = [];
        assert!(matches!(
            NdarrayView::from_slice(&empty, &[usize::MAX, 2], Order::RowMajor),
            Err(StridedError::OffsetOverflow)
        ));
        let mut empty_mut: [f64; 0] = [];
        assert!(matches!(
            NdarrayViewMut::from_slice_mut(&mut empty_mut, &[2, usize::MAX], Order::ColumnMajor),
            Err(StridedError::OffsetOverflow)
        ));
        assert!(matches!(
            Layout::contiguous(DType::Int8, &[usize::MAX / 2, 4], Order::RowMajor),
            Err(StridedError::OffsetOverflow)
        ));
        assert!(matches!(
            Layout::new(DType::Int8, &[usize::MAX, 3], &[0, 0], 0, Order::RowMajor),
            Err(StridedError::OffsetOverflow)
        ));
        // A zero extent makes the element count zero whatever the other extents are.
        let layout =
            Layout::new(DType::Int8, &[usize::MAX, 2, 0], &[1, 1, 1], 0, Order::RowMajor).unwrap();
        assert_eq!(layout.len(), 0);
    }

    #[test]
    fn test_bounds_validation() {
        let buf = [0u8; 32];
        // Last element starts at byte 24 and ends at 32.
        assert!(NdarrayView::new(&buf, DType::Float64, &[4], &[8], 0, Order::RowMajor).is_ok());
        assert!(matches!(
            NdarrayView::new(&buf, DType::Float64, &[4], &[8], 8, Order::RowMajor),
            Err(StridedError::OutOfBounds { .. })
        ));
        // Negative stride walking below zero.
        assert!(matches!(
            NdarrayView::new(&buf, DType::Float64, &[2], &[-8], 0, Order::RowMajor),
            Err(StridedError::OutOfBounds { min: -8, .. })
        ));
        assert!(matches!(
            NdarrayView::new(&buf, DType::Float64, &[2], &[8, 8], 0, Order::RowMajor),
            Err(StridedError::StrideLengthMismatch)
        ));
    }

    #[test]
    fn test_empty_view_skips_bounds() {
        let buf: [u8; 0] = [];
        let view = NdarrayView::new(&buf, DType::Int16, &[3, 0], &[2, 2], 100, Order::RowMajor)
            .unwrap();
        assert!(view.is_empty());
        assert_eq!(view.len(), 0);
        assert!(view.to_vec::<i16>().unwrap().is_empty());
    }

    #[test]
    fn test_get_checks() {
        let data = [1u16, 2, 3];
        let view = NdarrayView::from_slice(&data, &[3], Order::RowMajor).unwrap();
        assert!(matches!(
            view.get::<i16>(&[0]),
            Err(StridedError::DTypeMismatch {
                expected: DType::Uint16,
                found: DType::Int16
            })
        ));
        assert!(matches!(
            view.get::<u16>(&[3]),
            Err(StridedError::IndexOutOfBounds { index: 3, len: 3 })
        ));
        assert!(matches!(
            view.get::<u16>(&[0, 0]),
            Err(StridedError::RankMismatch(1, 2))
        ));
    }

    #[test]
    fn test_iget_iset_modes() {
        let mut data = [0i32; 6];
        let mut view = NdarrayViewMut::from_slice_mut(&mut data, &[2, 3], Order::RowMajor).unwrap();
        view.iset(-1, 7i32, IndexMode::Wrap).unwrap();
        view.iset(99, 5i32, IndexMode::Clamp).unwrap();
        view.iset(1, 3i32, IndexMode::Error).unwrap();
        assert!(view.iset(6, 1i32, IndexMode::Error).is_err());
        assert_eq!(view.iget::<i32>(5, IndexMode::Error).unwrap(), 5);
        assert_eq!(view.iget::<i32>(-5, IndexMode::Wrap).unwrap(), 3);
        assert_eq!(data, [0, 3, 0, 0, 0, 5]);
    }

    #[test]
    fn test_negative_stride_view_reads_reversed() {
        let data = [1i8, 2, 3, 4];
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        let view = NdarrayView::new(bytes, DType::Int8, &[4], &[-1], 3, Order::RowMajor).unwrap();
        assert_eq!(view.to_vec::<i8>().unwrap(), vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_rank0_view() {
        let data = [42u64];
        let view = NdarrayView::from_slice(&data, &[], Order::RowMajor).unwrap();
        assert_eq!(view.ndims(), 0);
        assert_eq!(view.len(), 1);
        assert_eq!(view.get::<u64>(&[]).unwrap(), 42);
        assert_eq!(view.to_vec::<u64>().unwrap(), vec![42]);
    }
}
