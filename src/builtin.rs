//! Process-wide dispatch tables and the plain entry points over them.
//!
//! | table       | rows                                                        |
//! |-------------|-------------------------------------------------------------|
//! | [`NULLARY`] | one per dtype, payload `fn() -> T`                          |
//! | [`UNARY`]   | one per dtype with `fn(T) -> T`, then `s_u`, `t_i`, `f_d`   |
//! | [`BINARY`]  | one per dtype, payload `fn(T, T) -> T`                      |
//! | [`ASSIGN`]  | identity and cast pairs; the payload is never called        |

use std::sync::LazyLock;

use half::f16;
use num_complex::{Complex32, Complex64};

use crate::config::Config;
use crate::dispatch::{BinaryKernel, DispatchTable, NullaryKernel, UnaryKernel};
use crate::payload::Payload;
use crate::view::{NdarrayView, NdarrayViewMut};
use crate::Result;

/// `fn() -> T` fill for every dtype.
pub static NULLARY: LazyLock<DispatchTable<NullaryKernel>> = LazyLock::new(|| {
    let table = DispatchTable::<NullaryKernel>::new()
        .register::<bool>()
        .register::<i8>()
        .register::<u8>()
        .register::<i16>()
        .register::<u16>()
        .register::<i32>()
        .register::<u32>()
        .register::<i64>()
        .register::<u64>()
        .register::<f16>()
        .register::<f32>()
        .register::<f64>()
        .register::<Complex32>()
        .register::<Complex64>();
    log::debug!("built NULLARY table: {} rows", table.len());
    table
});

/// `fn(T) -> T` for every dtype plus mixed-type rows.
pub static UNARY: LazyLock<DispatchTable<UnaryKernel>> = LazyLock::new(|| {
    let table = unary_identity_rows()
        .register::<i8, u32>()
        .register::<u16, i32>()
        .register::<f32, f64>();
    log::debug!("built UNARY table: {} rows", table.len());
    table
});

fn unary_identity_rows() -> DispatchTable<UnaryKernel> {
    DispatchTable::<UnaryKernel>::new()
        .register::<bool, bool>()
        .register::<i8, i8>()
        .register::<u8, u8>()
        .register::<i16, i16>()
        .register::<u16, u16>()
        .register::<i32, i32>()
        .register::<u32, u32>()
        .register::<i64, i64>()
        .register::<u64, u64>()
        .register::<f16, f16>()
        .register::<f32, f32>()
        .register::<f64, f64>()
        .register::<Complex32, Complex32>()
        .register::<Complex64, Complex64>()
}

/// `fn(T, T) -> T` for every dtype.
pub static BINARY: LazyLock<DispatchTable<BinaryKernel>> = LazyLock::new(|| {
    let table = binary_rows();
    log::debug!("built BINARY table: {} rows", table.len());
    table
});

fn binary_rows() -> DispatchTable<BinaryKernel> {
    DispatchTable::<BinaryKernel>::new()
        .register::<bool, bool, bool>()
        .register::<i8, i8, i8>()
        .register::<u8, u8, u8>()
        .register::<i16, i16, i16>()
        .register::<u16, u16, u16>()
        .register::<i32, i32, i32>()
        .register::<u32, u32, u32>()
        .register::<i64, i64, i64>()
        .register::<u64, u64, u64>()
        .register::<f16, f16, f16>()
        .register::<f32, f32, f32>()
        .register::<f64, f64, f64>()
        .register::<Complex32, Complex32, Complex32>()
        .register::<Complex64, Complex64, Complex64>()
}

// Each `$from` is registered against the whole `$to` list.
macro_rules! assign_pairs {
    (@from $table:ident, $from:ty => ($($to:ty),*)) => {
        $( $table = $table.register_assign::<$from, $to>(); )*
    };
    ($table:ident, [$($from:ty),*] => $to:tt) => {
        $( assign_pairs!(@from $table, $from => $to); )*
    };
}

/// Typed copies: identity for every dtype and the lossless or `as`-style
/// casts between them.
pub static ASSIGN: LazyLock<DispatchTable<UnaryKernel>> = LazyLock::new(|| {
    let mut table = DispatchTable::<UnaryKernel>::new();
    assign_pairs!(
        table,
        [i8, u8, i16, u16, i32, u32, i64, u64, f16, f32, f64]
            => (i8, u8, i16, u16, i32, u32, i64, u64, f16, f32, f64, Complex32, Complex64)
    );
    assign_pairs!(table, [Complex32, Complex64] => (Complex32, Complex64));
    assign_pairs!(
        table,
        [bool] => (bool, i8, u8, i16, u16, i32, u32, i64, u64, f16, f32, f64, Complex32, Complex64)
    );
    log::debug!("built ASSIGN table: {} rows", table.len());
    table
});

// ============================================================================
// Entry points
// ============================================================================

pub fn nullary(out: &mut NdarrayViewMut<'_>, payload: &Payload) -> Result<()> {
    NULLARY.apply(out, payload)
}

pub fn nullary_with(out: &mut NdarrayViewMut<'_>, payload: &Payload, config: &Config) -> Result<()> {
    NULLARY.apply_with(out, payload, config)
}

pub fn unary(x: &NdarrayView<'_>, out: &mut NdarrayViewMut<'_>, payload: &Payload) -> Result<()> {
    UNARY.apply(x, out, payload)
}

pub fn unary_with(
    x: &NdarrayView<'_>,
    out: &mut NdarrayViewMut<'_>,
    payload: &Payload,
    config: &Config,
) -> Result<()> {
    UNARY.apply_with(x, out, payload, config)
}

pub fn binary(
    x: &NdarrayView<'_>,
    y: &NdarrayView<'_>,
    out: &mut NdarrayViewMut<'_>,
    payload: &Payload,
) -> Result<()> {
    BINARY.apply(x, y, out, payload)
}

pub fn binary_with(
    x: &NdarrayView<'_>,
    y: &NdarrayView<'_>,
    out: &mut NdarrayViewMut<'_>,
    payload: &Payload,
    config: &Config,
) -> Result<()> {
    BINARY.apply_with(x, y, out, payload, config)
}

/// Copy `x` into `out`, casting between their dtypes.
pub fn assign(x: &NdarrayView<'_>, out: &mut NdarrayViewMut<'_>) -> Result<()> {
    assign_with(x, out, &Config::default())
}

pub fn assign_with(x: &NdarrayView<'_>, out: &mut NdarrayViewMut<'_>, config: &Config) -> Result<()> {
    ASSIGN.apply_with(x, out, &Payload::empty(), config)
}

/// Collapse a call result into a status code: `0` on success, otherwise
/// [`StridedError::code`](crate::StridedError::code).
pub fn status(result: Result<()>) -> i8 {
    match result {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}
