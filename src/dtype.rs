//! Data type tags and typed element access over byte buffers.
//!
//! A [`DType`] is the runtime tag carried by every ndarray handle. The
//! [`Element`] trait ties a Rust type to its tag and knows how to read and
//! write one element at a byte offset. [`CastInto`] supplies the conversions
//! used by assignment rows and by rows whose payload works on other types.

use std::fmt;

use half::f16;
use num_complex::{Complex32, Complex64};
use num_traits::AsPrimitive;

/// Runtime element type tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float16,
    Float32,
    Float64,
    /// Single-precision complex (two `f32`).
    Complex64,
    /// Double-precision complex (two `f64`).
    Complex128,
}

impl DType {
    /// Every supported tag, ordered from narrowest to widest within each kind.
    pub const ALL: [DType; 14] = [
        DType::Bool,
        DType::Int8,
        DType::Uint8,
        DType::Int16,
        DType::Uint16,
        DType::Int32,
        DType::Uint32,
        DType::Int64,
        DType::Uint64,
        DType::Float16,
        DType::Float32,
        DType::Float64,
        DType::Complex64,
        DType::Complex128,
    ];

    /// Size of one element in bytes.
    pub const fn bytes_per_element(self) -> usize {
        match self {
            DType::Bool | DType::Int8 | DType::Uint8 => 1,
            DType::Int16 | DType::Uint16 | DType::Float16 => 2,
            DType::Int32 | DType::Uint32 | DType::Float32 => 4,
            DType::Int64 | DType::Uint64 | DType::Float64 | DType::Complex64 => 8,
            DType::Complex128 => 16,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int8 => "int8",
            DType::Uint8 => "uint8",
            DType::Int16 => "int16",
            DType::Uint16 => "uint16",
            DType::Int32 => "int32",
            DType::Uint32 => "uint32",
            DType::Int64 => "int64",
            DType::Uint64 => "uint64",
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
        }
    }

    /// Single-character abbreviation used in signature names (e.g. `s_u`).
    pub const fn abbrev(self) -> char {
        match self {
            DType::Bool => 'x',
            DType::Int8 => 's',
            DType::Uint8 => 'b',
            DType::Int16 => 'k',
            DType::Uint16 => 't',
            DType::Int32 => 'i',
            DType::Uint32 => 'u',
            DType::Int64 => 'l',
            DType::Uint64 => 'v',
            DType::Float16 => 'h',
            DType::Float32 => 'f',
            DType::Float64 => 'd',
            DType::Complex64 => 'c',
            DType::Complex128 => 'z',
        }
    }

    /// Look up a tag by its [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<DType> {
        DType::ALL.into_iter().find(|d| d.name() == name)
    }

    pub const fn is_complex(self) -> bool {
        matches!(self, DType::Complex64 | DType::Complex128)
    }

    pub const fn is_floating(self) -> bool {
        matches!(self, DType::Float16 | DType::Float32 | DType::Float64)
    }

    /// Integer or floating; neither bool nor complex.
    pub const fn is_real(self) -> bool {
        self.is_integer() || self.is_floating()
    }

    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            DType::Int8
                | DType::Uint8
                | DType::Int16
                | DType::Uint16
                | DType::Int32
                | DType::Uint32
                | DType::Int64
                | DType::Uint64
        )
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Render a dtype tuple in abbreviated form, e.g. `[Int8, Uint32]` -> `s_u`.
pub fn signature_name(dtypes: &[DType]) -> String {
    let mut name = String::with_capacity(dtypes.len() * 2);
    for (i, dtype) in dtypes.iter().enumerate() {
        if i > 0 {
            name.push('_');
        }
        name.push(dtype.abbrev());
    }
    name
}

// ============================================================================
// Element access
// ============================================================================

/// A Rust type stored in ndarray buffers under a fixed [`DType`] tag.
///
/// Reads and writes are unaligned and native-endian. Callers guarantee that
/// `offset..offset + DTYPE.bytes_per_element()` lies inside `buf`; the
/// ndarray constructors validate this for every element a view can address.
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn read(buf: &[u8], offset: usize) -> Self;

    fn write(self, buf: &mut [u8], offset: usize);
}

macro_rules! impl_pod_element {
    ($($t:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$dtype;

                #[inline(always)]
                fn read(buf: &[u8], offset: usize) -> Self {
                    bytemuck::pod_read_unaligned(&buf[offset..offset + std::mem::size_of::<$t>()])
                }

                #[inline(always)]
                fn write(self, buf: &mut [u8], offset: usize) {
                    buf[offset..offset + std::mem::size_of::<$t>()]
                        .copy_from_slice(bytemuck::bytes_of(&self));
                }
            }
        )*
    };
}

impl_pod_element!(
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f16 => Float16,
    f32 => Float32,
    f64 => Float64,
    Complex32 => Complex64,
    Complex64 => Complex128,
);

// Stored as one byte; any non-zero byte reads as `true`.
impl Element for bool {
    const DTYPE: DType = DType::Bool;

    #[inline(always)]
    fn read(buf: &[u8], offset: usize) -> Self {
        buf[offset] != 0
    }

    #[inline(always)]
    fn write(self, buf: &mut [u8], offset: usize) {
        buf[offset] = u8::from(self);
    }
}

// ============================================================================
// Casting
// ============================================================================

/// Element conversion used by assignment and by cast-through payload rows.
///
/// Real-to-real conversions follow `as` semantics (truncation toward zero,
/// saturation at the integer range, NaN to zero).
pub trait CastInto<T>: Copy {
    fn cast_into(self) -> T;
}

macro_rules! impl_real_casts {
    (@from $from:ty => $($to:ty),*) => {
        $(
            impl CastInto<$to> for $from {
                #[inline(always)]
                fn cast_into(self) -> $to {
                    <$from as AsPrimitive<$to>>::as_(self)
                }
            }
        )*
    };
    ($($from:ty),*) => {
        $(impl_real_casts!(@from $from => i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);)*
    };
}

impl_real_casts!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

macro_rules! impl_half_casts {
    ($($t:ty),*) => {
        $(
            impl CastInto<f16> for $t {
                #[inline(always)]
                fn cast_into(self) -> f16 {
                    f16::from_f64(CastInto::<f64>::cast_into(self))
                }
            }

            impl CastInto<$t> for f16 {
                #[inline(always)]
                fn cast_into(self) -> $t {
                    // f32 represents every f16 value exactly.
                    CastInto::<$t>::cast_into(self.to_f32())
                }
            }
        )*
    };
}

impl_half_casts!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl CastInto<f16> for f16 {
    #[inline(always)]
    fn cast_into(self) -> f16 {
        self
    }
}

macro_rules! impl_real_to_complex {
    ($($t:ty),*) => {
        $(
            impl CastInto<Complex32> for $t {
                #[inline(always)]
                fn cast_into(self) -> Complex32 {
                    Complex32::new(CastInto::<f32>::cast_into(self), 0.0)
                }
            }

            impl CastInto<Complex64> for $t {
                #[inline(always)]
                fn cast_into(self) -> Complex64 {
                    Complex64::new(CastInto::<f64>::cast_into(self), 0.0)
                }
            }
        )*
    };
}

impl_real_to_complex!(i8, u8, i16, u16, i32, u32, i64, u64, f16, f32, f64);

impl CastInto<Complex32> for Complex32 {
    #[inline(always)]
    fn cast_into(self) -> Complex32 {
        self
    }
}

impl CastInto<Complex64> for Complex64 {
    #[inline(always)]
    fn cast_into(self) -> Complex64 {
        self
    }
}

impl CastInto<Complex64> for Complex32 {
    #[inline(always)]
    fn cast_into(self) -> Complex64 {
        Complex64::new(f64::from(self.re), f64::from(self.im))
    }
}

impl CastInto<Complex32> for Complex64 {
    #[inline(always)]
    fn cast_into(self) -> Complex32 {
        Complex32::new(self.re as f32, self.im as f32)
    }
}

macro_rules! impl_bool_casts {
    ($($t:ty),*) => {
        $(
            impl CastInto<$t> for bool {
                #[inline(always)]
                fn cast_into(self) -> $t {
                    CastInto::<$t>::cast_into(u8::from(self))
                }
            }
        )*
    };
}

impl_bool_casts!(i8, u8, i16, u16, i32, u32, i64, u64, f16, f32, f64, Complex32, Complex64);

impl CastInto<bool> for bool {
    #[inline(always)]
    fn cast_into(self) -> bool {
        self
    }
}
