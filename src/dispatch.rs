//! Dispatch tables: dtype signatures mapped to rank-indexed kernel sets.
//!
//! A call flows through three stages:
//!
//! 1. **Resolve**: scan rows in registration order and take the first whose
//!    signature equals the operands' dtypes exactly.
//! 2. **Plan**: check operand shapes, then (under [`Strategy::Auto`]) squeeze
//!    or flatten the operands and decide between unblocked and blocked loops.
//! 3. **Route**: pick the kernel for the planned rank from the row's set.
//!
//! Every failure is reported before any operand memory is touched.

use std::fmt;

use crate::config::{Config, Strategy};
use crate::dtype::{signature_name, CastInto, DType, Element};
use crate::kernel::{check_shapes, KernelKind};
use crate::order::{contiguous_direction, iteration_order};
use crate::payload::Payload;
use crate::view::{Layout, NdarrayView, NdarrayViewMut};
use crate::{Axes, Result, StridedError, MAX_SPECIALIZED_RANK};

// ============================================================================
// Kernel function types
// ============================================================================

/// Kernel writing one output from a `fn() -> T` payload.
pub type NullaryKernel = fn(&mut NdarrayViewMut<'_>, &Payload, &Config) -> Result<()>;

/// Kernel mapping one input onto one output.
pub type UnaryKernel =
    fn(&NdarrayView<'_>, &mut NdarrayViewMut<'_>, &Payload, &Config) -> Result<()>;

/// Kernel combining two inputs into one output.
pub type BinaryKernel = fn(
    &NdarrayView<'_>,
    &NdarrayView<'_>,
    &mut NdarrayViewMut<'_>,
    &Payload,
    &Config,
) -> Result<()>;

/// A kernel function type with a fixed operand count.
pub trait Kernel: Copy + Send + Sync + 'static {
    /// Number of operands, output included.
    const ARITY: usize;

    fn invoke(
        self,
        inputs: &[&NdarrayView<'_>],
        out: &mut NdarrayViewMut<'_>,
        payload: &Payload,
        config: &Config,
    ) -> Result<()>;
}

fn arity_error(expected: usize, inputs: usize) -> StridedError {
    StridedError::ArityMismatch {
        expected,
        found: inputs + 1,
    }
}

impl Kernel for NullaryKernel {
    const ARITY: usize = 1;

    fn invoke(
        self,
        inputs: &[&NdarrayView<'_>],
        out: &mut NdarrayViewMut<'_>,
        payload: &Payload,
        config: &Config,
    ) -> Result<()> {
        match inputs {
            [] => (self)(out, payload, config),
            _ => Err(arity_error(Self::ARITY, inputs.len())),
        }
    }
}

impl Kernel for UnaryKernel {
    const ARITY: usize = 2;

    fn invoke(
        self,
        inputs: &[&NdarrayView<'_>],
        out: &mut NdarrayViewMut<'_>,
        payload: &Payload,
        config: &Config,
    ) -> Result<()> {
        match inputs {
            [x] => (self)(x, out, payload, config),
            _ => Err(arity_error(Self::ARITY, inputs.len())),
        }
    }
}

impl Kernel for BinaryKernel {
    const ARITY: usize = 3;

    fn invoke(
        self,
        inputs: &[&NdarrayView<'_>],
        out: &mut NdarrayViewMut<'_>,
        payload: &Payload,
        config: &Config,
    ) -> Result<()> {
        match inputs {
            [x, y] => (self)(x, y, out, payload, config),
            _ => Err(arity_error(Self::ARITY, inputs.len())),
        }
    }
}

// ============================================================================
// Kernel sets and the rank router
// ============================================================================

/// Unblocked kernels for ranks `0..=MAX_SPECIALIZED_RANK` plus the generic
/// fallback.
#[derive(Copy, Clone)]
pub struct UnblockedKernels<K> {
    pub ranks: [K; MAX_SPECIALIZED_RANK + 1],
    pub generic: K,
}

/// Blocked kernels for ranks `2..=MAX_SPECIALIZED_RANK`, indexed by `rank - 2`.
pub type BlockedKernels<K> = [K; MAX_SPECIALIZED_RANK - 1];

/// All kernels of one dispatch row.
#[derive(Copy, Clone)]
pub struct KernelSet<K> {
    unblocked: UnblockedKernels<K>,
    blocked: Option<BlockedKernels<K>>,
}

impl<K> fmt::Debug for KernelSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelSet")
            .field("blocked", &self.blocked.is_some())
            .finish()
    }
}

impl<K: Kernel> KernelSet<K> {
    pub fn new(unblocked: UnblockedKernels<K>, blocked: Option<BlockedKernels<K>>) -> Self {
        Self { unblocked, blocked }
    }

    /// Drop the blocked kernels; the router then always picks unblocked ones.
    pub fn without_blocked(mut self) -> Self {
        self.blocked = None;
        self
    }

    pub fn has_blocked(&self) -> bool {
        self.blocked.is_some()
    }

    /// Pick the kernel for `rank`.
    ///
    /// Ranks above [`MAX_SPECIALIZED_RANK`] always get the generic kernel.
    /// Blocked kernels are only chosen for `rank >= 2` when requested and
    /// present.
    pub fn route(&self, rank: isize, prefer_blocked: bool) -> Result<(KernelKind, K)> {
        let rank = usize::try_from(rank).map_err(|_| StridedError::InvalidRank(rank))?;
        if rank > MAX_SPECIALIZED_RANK {
            return Ok((KernelKind::Generic, self.unblocked.generic));
        }
        if prefer_blocked && rank >= 2 {
            if let Some(blocked) = &self.blocked {
                return Ok((KernelKind::Blocked(rank), blocked[rank - 2]));
            }
        }
        Ok((KernelKind::Unblocked(rank), self.unblocked.ranks[rank]))
    }
}

// ============================================================================
// Dispatch table
// ============================================================================

/// One signature and its kernels.
#[derive(Clone)]
pub struct DispatchRow<K> {
    signature: Box<[DType]>,
    kernels: KernelSet<K>,
}

impl<K> DispatchRow<K> {
    pub fn signature(&self) -> &[DType] {
        &self.signature
    }

    pub fn kernels(&self) -> &KernelSet<K> {
        &self.kernels
    }
}

impl<K> fmt::Debug for DispatchRow<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRow")
            .field("signature", &signature_name(&self.signature))
            .field("kernels", &self.kernels)
            .finish()
    }
}

/// Ordered rows of (dtype signature, kernel set). First match wins.
///
/// ```
/// use strided_dispatch::{DispatchTable, NdarrayView, NdarrayViewMut, Order, Payload, UnaryKernel};
///
/// fn negate(x: i32) -> i32 {
///     -x
/// }
///
/// let table = DispatchTable::<UnaryKernel>::new().register::<i32, i32>();
/// let x = [1i32, 2, 3];
/// let mut y = [0i32; 3];
/// let xv = NdarrayView::from_slice(&x, &[3], Order::RowMajor).unwrap();
/// let mut yv = NdarrayViewMut::from_slice_mut(&mut y, &[3], Order::RowMajor).unwrap();
/// table.apply(&xv, &mut yv, &Payload::unary(negate)).unwrap();
/// assert_eq!(y, [-1, -2, -3]);
/// ```
#[derive(Clone)]
pub struct DispatchTable<K> {
    rows: Vec<DispatchRow<K>>,
}

impl<K> fmt::Debug for DispatchTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rows.iter()).finish()
    }
}

impl<K: Kernel> Default for DispatchTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kernel> DispatchTable<K> {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Build a table from parallel lists of signatures, unblocked kernel
    /// sets and optional blocked kernel sets.
    pub fn build(
        signatures: Vec<Vec<DType>>,
        unblocked: Vec<UnblockedKernels<K>>,
        blocked: Vec<Option<BlockedKernels<K>>>,
    ) -> Result<Self> {
        for found in [unblocked.len(), blocked.len()] {
            if found != signatures.len() {
                return Err(StridedError::ArityMismatch {
                    expected: signatures.len(),
                    found,
                });
            }
        }
        let mut table = Self::new();
        for ((signature, unblocked), blocked) in signatures.into_iter().zip(unblocked).zip(blocked)
        {
            table = table.push_row(&signature, KernelSet::new(unblocked, blocked))?;
        }
        log::debug!(
            "built dispatch table: {} rows, {} operands",
            table.rows.len(),
            K::ARITY
        );
        Ok(table)
    }

    /// Append a row. The signature must name one dtype per operand.
    pub fn push_row(mut self, signature: &[DType], kernels: KernelSet<K>) -> Result<Self> {
        if signature.len() != K::ARITY {
            return Err(StridedError::ArityMismatch {
                expected: K::ARITY,
                found: signature.len(),
            });
        }
        self.push(signature, kernels);
        Ok(self)
    }

    fn push(&mut self, signature: &[DType], kernels: KernelSet<K>) {
        log::trace!(
            "dispatch row {}: {}",
            self.rows.len(),
            signature_name(signature)
        );
        self.rows.push(DispatchRow {
            signature: signature.into(),
            kernels,
        });
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[DispatchRow<K>] {
        &self.rows
    }

    /// Index and kernels of the first row whose signature equals `dtypes`.
    pub fn resolve(&self, dtypes: &[DType]) -> Result<(usize, &KernelSet<K>)> {
        if dtypes.len() != K::ARITY {
            return Err(StridedError::ArityMismatch {
                expected: K::ARITY,
                found: dtypes.len(),
            });
        }
        self.rows
            .iter()
            .enumerate()
            .find(|(_, row)| *row.signature == *dtypes)
            .map(|(index, row)| (index, &row.kernels))
            .ok_or_else(|| StridedError::NoMatchingSignature(dtypes.to_vec()))
    }

    /// Kernel kind a call over `operands` (inputs first, output last) would
    /// run, or `None` if there are no elements to visit.
    pub fn select(&self, operands: &[&Layout], config: &Config) -> Result<Option<KernelKind>> {
        let dtypes: Axes<DType> = operands.iter().map(|layout| layout.dtype()).collect();
        let (_, kernels) = self.resolve(&dtypes)?;
        match plan(operands, config)? {
            Plan::Empty => Ok(None),
            Plan::Route {
                rank,
                prefer_blocked,
                ..
            } => {
                let (kind, _) = kernels.route(rank as isize, prefer_blocked)?;
                Ok(Some(kind))
            }
        }
    }

    /// Apply the table to nullable operand handles with the default config.
    pub fn apply_arrays(
        &self,
        inputs: &[Option<&NdarrayView<'_>>],
        out: Option<&mut NdarrayViewMut<'_>>,
        payload: &Payload,
    ) -> Result<()> {
        self.apply_arrays_with(inputs, out, payload, &Config::default())
    }

    /// Apply the table to nullable operand handles.
    ///
    /// A missing handle is reported as [`StridedError::NullOperand`] with its
    /// position (inputs first, output last).
    pub fn apply_arrays_with(
        &self,
        inputs: &[Option<&NdarrayView<'_>>],
        out: Option<&mut NdarrayViewMut<'_>>,
        payload: &Payload,
        config: &Config,
    ) -> Result<()> {
        if inputs.len() + 1 != K::ARITY {
            return Err(arity_error(K::ARITY, inputs.len()));
        }
        let mut present: Axes<&NdarrayView<'_>> = Axes::new();
        for (index, input) in inputs.iter().copied().enumerate() {
            present.push(input.ok_or(StridedError::NullOperand { index })?);
        }
        let out = out.ok_or(StridedError::NullOperand {
            index: inputs.len(),
        })?;
        self.execute(&present, out, payload, config)
    }

    pub(crate) fn execute(
        &self,
        inputs: &[&NdarrayView<'_>],
        out: &mut NdarrayViewMut<'_>,
        payload: &Payload,
        config: &Config,
    ) -> Result<()> {
        if inputs.len() + 1 != K::ARITY {
            return Err(arity_error(K::ARITY, inputs.len()));
        }
        let mut dtypes: Axes<DType> = inputs.iter().map(|x| x.dtype()).collect();
        dtypes.push(out.dtype());
        let (row, kernels) = self.resolve(&dtypes)?;

        let mut layouts: Axes<&Layout> = inputs.iter().map(|x| x.layout()).collect();
        layouts.push(out.layout());
        let (rank, prefer_blocked, reshaped) = match plan(&layouts, config)? {
            Plan::Empty => {
                log::trace!("row {row} ({}): nothing to visit", signature_name(&dtypes));
                return Ok(());
            }
            Plan::Route {
                rank,
                prefer_blocked,
                reshaped,
            } => (rank, prefer_blocked, reshaped),
        };
        drop(layouts);
        let (kind, kernel) = kernels.route(rank as isize, prefer_blocked)?;
        log::trace!("row {row} ({}) -> {kind:?}", signature_name(&dtypes));

        match reshaped {
            None => kernel.invoke(inputs, out, payload, config),
            Some(mut layouts) => {
                let out_layout = layouts.pop().ok_or(StridedError::ArityMismatch {
                    expected: K::ARITY,
                    found: 0,
                })?;
                let views: Axes<NdarrayView<'_>> = inputs
                    .iter()
                    .zip(layouts)
                    .map(|(x, layout)| x.with_layout(layout))
                    .collect();
                let refs: Axes<&NdarrayView<'_>> = views.iter().collect();
                let mut out = out.with_layout(out_layout);
                kernel.invoke(&refs, &mut out, payload, config)
            }
        }
    }
}

// ============================================================================
// Typed registration and entry points
// ============================================================================

impl DispatchTable<NullaryKernel> {
    /// Append a row for an output of type `T` and a `fn() -> T` payload.
    pub fn register<T>(self) -> Self
    where
        T: Element + CastInto<T>,
    {
        self.register_as::<T, T>()
    }

    /// Append a row for an output of type `T` and a `fn() -> C` payload.
    pub fn register_as<T, C>(mut self) -> Self
    where
        T: Element,
        C: CastInto<T> + 'static,
    {
        self.push(&[T::DTYPE], KernelSet::nullary_as::<T, C>());
        self
    }

    pub fn apply(&self, out: &mut NdarrayViewMut<'_>, payload: &Payload) -> Result<()> {
        self.apply_with(out, payload, &Config::default())
    }

    pub fn apply_with(
        &self,
        out: &mut NdarrayViewMut<'_>,
        payload: &Payload,
        config: &Config,
    ) -> Result<()> {
        self.execute(&[], out, payload, config)
    }
}

impl DispatchTable<UnaryKernel> {
    /// Append a row for `A -> B` and a `fn(A) -> B` payload.
    pub fn register<A, B>(self) -> Self
    where
        A: Element + CastInto<A>,
        B: Element + CastInto<B>,
    {
        self.register_as::<A, B, A, B>()
    }

    /// Append a row for `A -> B` and a `fn(CA) -> CB` payload.
    pub fn register_as<A, B, CA, CB>(mut self) -> Self
    where
        A: Element + CastInto<CA>,
        B: Element,
        CA: 'static,
        CB: CastInto<B> + 'static,
    {
        self.push(&[A::DTYPE, B::DTYPE], KernelSet::unary_as::<A, B, CA, CB>());
        self
    }

    /// Append a row casting `A` into `B` without calling the payload.
    pub fn register_assign<A, B>(mut self) -> Self
    where
        A: Element + CastInto<B>,
        B: Element,
    {
        self.push(&[A::DTYPE, B::DTYPE], KernelSet::assign::<A, B>());
        self
    }

    pub fn apply(
        &self,
        x: &NdarrayView<'_>,
        out: &mut NdarrayViewMut<'_>,
        payload: &Payload,
    ) -> Result<()> {
        self.apply_with(x, out, payload, &Config::default())
    }

    pub fn apply_with(
        &self,
        x: &NdarrayView<'_>,
        out: &mut NdarrayViewMut<'_>,
        payload: &Payload,
        config: &Config,
    ) -> Result<()> {
        self.execute(&[x], out, payload, config)
    }
}

impl DispatchTable<BinaryKernel> {
    /// Append a row for `(A, B) -> C` and a `fn(A, B) -> C` payload.
    pub fn register<A, B, C>(self) -> Self
    where
        A: Element + CastInto<A>,
        B: Element + CastInto<B>,
        C: Element + CastInto<C>,
    {
        self.register_as::<A, B, C, A, B, C>()
    }

    /// Append a row for `(A, B) -> C` and a `fn(CA, CB) -> CC` payload.
    pub fn register_as<A, B, C, CA, CB, CC>(mut self) -> Self
    where
        A: Element + CastInto<CA>,
        B: Element + CastInto<CB>,
        C: Element,
        CA: 'static,
        CB: 'static,
        CC: CastInto<C> + 'static,
    {
        self.push(
            &[A::DTYPE, B::DTYPE, C::DTYPE],
            KernelSet::binary_as::<A, B, C, CA, CB, CC>(),
        );
        self
    }

    pub fn apply(
        &self,
        x: &NdarrayView<'_>,
        y: &NdarrayView<'_>,
        out: &mut NdarrayViewMut<'_>,
        payload: &Payload,
    ) -> Result<()> {
        self.apply_with(x, y, out, payload, &Config::default())
    }

    pub fn apply_with(
        &self,
        x: &NdarrayView<'_>,
        y: &NdarrayView<'_>,
        out: &mut NdarrayViewMut<'_>,
        payload: &Payload,
        config: &Config,
    ) -> Result<()> {
        self.execute(&[x, y], out, payload, config)
    }
}

// ============================================================================
// Planning
// ============================================================================

#[derive(Debug, PartialEq)]
enum Plan {
    /// Some extent is zero.
    Empty,
    Route {
        rank: usize,
        prefer_blocked: bool,
        /// Replacement layouts of lower rank addressing the same bytes.
        reshaped: Option<Vec<Layout>>,
    },
}

fn plan(layouts: &[&Layout], config: &Config) -> Result<Plan> {
    let Some(&head) = layouts.first() else {
        return Err(StridedError::ArityMismatch {
            expected: 1,
            found: 0,
        });
    };
    check_shapes(layouts)?;
    if head.is_empty() {
        return Ok(Plan::Empty);
    }
    let rank = head.ndims();
    let route = |prefer_blocked| Plan::Route {
        rank,
        prefer_blocked,
        reshaped: None,
    };
    Ok(match config.strategy() {
        Strategy::Unblocked => route(false),
        Strategy::Blocked => route(true),
        Strategy::Auto => plan_auto(layouts, head),
    })
}

fn plan_auto(layouts: &[&Layout], head: &Layout) -> Plan {
    let rank = head.ndims();
    if rank <= 1 {
        return Plan::Route {
            rank,
            prefer_blocked: false,
            reshaped: None,
        };
    }

    // At most one axis longer than one: view every operand along that axis.
    let mut non_singleton = (0..rank).filter(|&axis| head.shape()[axis] != 1);
    let first = non_singleton.next();
    if non_singleton.next().is_none() {
        let axis = first.unwrap_or(0);
        let reshaped = layouts
            .iter()
            .map(|l| l.reshaped(&[l.shape()[axis]], &[l.strides()[axis]], l.offset()))
            .collect();
        return Plan::Route {
            rank: 1,
            prefer_blocked: false,
            reshaped: Some(reshaped),
        };
    }

    // Contiguous in one shared order: a single 1-d sweep per operand.
    let order = head.order();
    let directions: Option<Axes<i8>> = layouts
        .iter()
        .map(|l| contiguous_direction(l.shape(), l.strides(), l.bytes_per_element(), order))
        .collect();
    if let Some(directions) = directions {
        let len = head.len();
        let reshaped = layouts
            .iter()
            .zip(directions)
            .map(|(l, dir)| {
                let stride = isize::from(dir) * l.bytes_per_element() as isize;
                l.reshaped(&[len], &[stride], l.offset())
            })
            .collect();
        return Plan::Route {
            rank: 1,
            prefer_blocked: false,
            reshaped: Some(reshaped),
        };
    }

    let uniform = layouts
        .iter()
        .all(|l| iteration_order(l.strides()) != 0 && l.order() == order);
    Plan::Route {
        rank,
        prefer_blocked: !uniform,
        reshaped: None,
    }
}
