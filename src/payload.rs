//! Type-erased per-element callbacks.

use std::any::{type_name, Any};
use std::fmt;

use crate::{Result, StridedError};

/// A stateless element callback supplied for one dispatch call.
///
/// The callback is a plain function pointer stored behind `dyn Any`; the
/// kernel a row routes to recovers the concrete pointer type before touching
/// any operand memory.
///
/// ```
/// use strided_dispatch::Payload;
///
/// fn double(x: f64) -> f64 {
///     x * 2.0
/// }
///
/// let payload = Payload::unary(double);
/// assert_eq!(payload.type_name(), "fn(f64) -> f64");
/// ```
pub struct Payload {
    callback: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    /// Callback producing one output element per call.
    pub fn nullary<T: 'static>(f: fn() -> T) -> Self {
        Self::erase(f)
    }

    pub fn unary<A: 'static, B: 'static>(f: fn(A) -> B) -> Self {
        Self::erase(f)
    }

    pub fn binary<A: 'static, B: 'static, C: 'static>(f: fn(A, B) -> C) -> Self {
        Self::erase(f)
    }

    /// Placeholder carried by assignment calls, whose kernels cast directly.
    pub(crate) fn empty() -> Self {
        Self::erase(())
    }

    fn erase<F: Any + Send + Sync>(f: F) -> Self {
        Self {
            callback: Box::new(f),
            type_name: type_name::<F>(),
        }
    }

    /// Rust type name of the wrapped callback.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn downcast<F: Copy + 'static>(&self) -> Result<F> {
        self.callback
            .downcast_ref::<F>()
            .copied()
            .ok_or_else(|| StridedError::PayloadMismatch {
                expected: type_name::<F>(),
                found: self.type_name,
            })
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type_name", &self.type_name)
            .finish()
    }
}
