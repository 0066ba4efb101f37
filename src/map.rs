//! Typed element kernels and their instantiation into kernel sets.
//!
//! Each kernel is a generic function over the element types of its operands,
//! the types its callback works on, and a [`Traversal`]. Instantiating one for
//! every traversal yields the fn-pointer arrays stored in dispatch rows.

use crate::block::Blocked;
use crate::config::Config;
use crate::dispatch::{BinaryKernel, KernelSet, NullaryKernel, UnaryKernel, UnblockedKernels};
use crate::dtype::{CastInto, Element};
use crate::kernel::{Generic, Traversal, Unblocked};
use crate::payload::Payload;
use crate::view::{NdarrayView, NdarrayViewMut};
use crate::Result;

// ============================================================================
// Kernels
// ============================================================================

/// Fill `out` with the callback's result, cast from `C` to `T`.
pub(crate) fn nullary_kernel<T, C, Tr>(
    out: &mut NdarrayViewMut<'_>,
    payload: &Payload,
    config: &Config,
) -> Result<()>
where
    T: Element,
    C: CastInto<T> + 'static,
    Tr: Traversal,
{
    let f = payload.downcast::<fn() -> C>()?;
    out.layout().check_dtype::<T>()?;
    let nest = Tr::nest([out.layout()], config)?;
    log::trace!("{:?} nullary over {:?}", Tr::KIND, nest.shape);
    let dst = out.bytes_mut();
    Tr::run(&nest, |[io]| {
        <C as CastInto<T>>::cast_into(f()).write(dst, io as usize);
    });
    Ok(())
}

/// `out[i] = f(x[i])`, casting `A -> CA` before and `CB -> B` after the call.
pub(crate) fn unary_kernel<A, B, CA, CB, Tr>(
    x: &NdarrayView<'_>,
    out: &mut NdarrayViewMut<'_>,
    payload: &Payload,
    config: &Config,
) -> Result<()>
where
    A: Element + CastInto<CA>,
    B: Element,
    CA: 'static,
    CB: CastInto<B> + 'static,
    Tr: Traversal,
{
    let f = payload.downcast::<fn(CA) -> CB>()?;
    x.layout().check_dtype::<A>()?;
    out.layout().check_dtype::<B>()?;
    let nest = Tr::nest([x.layout(), out.layout()], config)?;
    log::trace!("{:?} unary over {:?}", Tr::KIND, nest.shape);
    let src = x.as_bytes();
    let dst = out.bytes_mut();
    Tr::run(&nest, |[ix, io]| {
        let a = <A as CastInto<CA>>::cast_into(A::read(src, ix as usize));
        <CB as CastInto<B>>::cast_into(f(a)).write(dst, io as usize);
    });
    Ok(())
}

/// `out[i] = f(x[i], y[i])` with the same casting rules as [`unary_kernel`].
pub(crate) fn binary_kernel<A, B, C, CA, CB, CC, Tr>(
    x: &NdarrayView<'_>,
    y: &NdarrayView<'_>,
    out: &mut NdarrayViewMut<'_>,
    payload: &Payload,
    config: &Config,
) -> Result<()>
where
    A: Element + CastInto<CA>,
    B: Element + CastInto<CB>,
    C: Element,
    CA: 'static,
    CB: 'static,
    CC: CastInto<C> + 'static,
    Tr: Traversal,
{
    let f = payload.downcast::<fn(CA, CB) -> CC>()?;
    x.layout().check_dtype::<A>()?;
    y.layout().check_dtype::<B>()?;
    out.layout().check_dtype::<C>()?;
    let nest = Tr::nest([x.layout(), y.layout(), out.layout()], config)?;
    log::trace!("{:?} binary over {:?}", Tr::KIND, nest.shape);
    let (src_x, src_y) = (x.as_bytes(), y.as_bytes());
    let dst = out.bytes_mut();
    Tr::run(&nest, |[ix, iy, io]| {
        let a = <A as CastInto<CA>>::cast_into(A::read(src_x, ix as usize));
        let b = <B as CastInto<CB>>::cast_into(B::read(src_y, iy as usize));
        <CC as CastInto<C>>::cast_into(f(a, b)).write(dst, io as usize);
    });
    Ok(())
}

/// `out[i] = x[i] as B`. The payload is not consulted.
pub(crate) fn assign_kernel<A, B, Tr>(
    x: &NdarrayView<'_>,
    out: &mut NdarrayViewMut<'_>,
    _payload: &Payload,
    config: &Config,
) -> Result<()>
where
    A: Element + CastInto<B>,
    B: Element,
    Tr: Traversal,
{
    x.layout().check_dtype::<A>()?;
    out.layout().check_dtype::<B>()?;
    let nest = Tr::nest([x.layout(), out.layout()], config)?;
    log::trace!("{:?} assign over {:?}", Tr::KIND, nest.shape);
    let src = x.as_bytes();
    let dst = out.bytes_mut();
    Tr::run(&nest, |[ix, io]| {
        <A as CastInto<B>>::cast_into(A::read(src, ix as usize)).write(dst, io as usize);
    });
    Ok(())
}

// ============================================================================
// Instantiation
// ============================================================================

/// Instantiate `$kernel` for every traversal and collect the results into a
/// [`KernelSet`] of `$fn_ty` pointers.
macro_rules! kernel_set {
    ($kernel:ident [$($t:ty),*] as $fn_ty:ty) => {
        KernelSet::new(
            UnblockedKernels {
                ranks: [
                    $kernel::<$($t,)* Unblocked<0>> as $fn_ty,
                    $kernel::<$($t,)* Unblocked<1>> as $fn_ty,
                    $kernel::<$($t,)* Unblocked<2>> as $fn_ty,
                    $kernel::<$($t,)* Unblocked<3>> as $fn_ty,
                    $kernel::<$($t,)* Unblocked<4>> as $fn_ty,
                    $kernel::<$($t,)* Unblocked<5>> as $fn_ty,
                    $kernel::<$($t,)* Unblocked<6>> as $fn_ty,
                    $kernel::<$($t,)* Unblocked<7>> as $fn_ty,
                    $kernel::<$($t,)* Unblocked<8>> as $fn_ty,
                    $kernel::<$($t,)* Unblocked<9>> as $fn_ty,
                    $kernel::<$($t,)* Unblocked<10>> as $fn_ty,
                ],
                generic: $kernel::<$($t,)* Generic> as $fn_ty,
            },
            Some([
                $kernel::<$($t,)* Blocked<2>> as $fn_ty,
                $kernel::<$($t,)* Blocked<3>> as $fn_ty,
                $kernel::<$($t,)* Blocked<4>> as $fn_ty,
                $kernel::<$($t,)* Blocked<5>> as $fn_ty,
                $kernel::<$($t,)* Blocked<6>> as $fn_ty,
                $kernel::<$($t,)* Blocked<7>> as $fn_ty,
                $kernel::<$($t,)* Blocked<8>> as $fn_ty,
                $kernel::<$($t,)* Blocked<9>> as $fn_ty,
                $kernel::<$($t,)* Blocked<10>> as $fn_ty,
            ]),
        )
    };
}

impl KernelSet<NullaryKernel> {
    /// Kernels for an output of type `T` filled by a `fn() -> T` payload.
    pub fn nullary<T>() -> Self
    where
        T: Element + CastInto<T>,
    {
        Self::nullary_as::<T, T>()
    }

    /// Kernels for an output of type `T` filled by a `fn() -> C` payload.
    pub fn nullary_as<T, C>() -> Self
    where
        T: Element,
        C: CastInto<T> + 'static,
    {
        kernel_set!(nullary_kernel[T, C] as NullaryKernel)
    }
}

impl KernelSet<UnaryKernel> {
    /// Kernels for `A -> B` driven by a `fn(A) -> B` payload.
    pub fn unary<A, B>() -> Self
    where
        A: Element + CastInto<A>,
        B: Element + CastInto<B>,
    {
        Self::unary_as::<A, B, A, B>()
    }

    /// Kernels for `A -> B` driven by a `fn(CA) -> CB` payload.
    pub fn unary_as<A, B, CA, CB>() -> Self
    where
        A: Element + CastInto<CA>,
        B: Element,
        CA: 'static,
        CB: CastInto<B> + 'static,
    {
        kernel_set!(unary_kernel[A, B, CA, CB] as UnaryKernel)
    }

    /// Kernels casting `A` into `B` with no payload call.
    pub fn assign<A, B>() -> Self
    where
        A: Element + CastInto<B>,
        B: Element,
    {
        kernel_set!(assign_kernel[A, B] as UnaryKernel)
    }
}

impl KernelSet<BinaryKernel> {
    /// Kernels for `(A, B) -> C` driven by a `fn(A, B) -> C` payload.
    pub fn binary<A, B, C>() -> Self
    where
        A: Element + CastInto<A>,
        B: Element + CastInto<B>,
        C: Element + CastInto<C>,
    {
        Self::binary_as::<A, B, C, A, B, C>()
    }

    /// Kernels for `(A, B) -> C` driven by a `fn(CA, CB) -> CC` payload.
    pub fn binary_as<A, B, C, CA, CB, CC>() -> Self
    where
        A: Element + CastInto<CA>,
        B: Element + CastInto<CB>,
        C: Element,
        CA: 'static,
        CB: 'static,
        CC: CastInto<C> + 'static,
    {
        kernel_set!(binary_kernel[A, B, C, CA, CB, CC] as BinaryKernel)
    }
}
