//! Runtime tuning of kernel selection and cache blocking.

use crate::{Result, StridedError, BLOCK_SIZE_IN_BYTES, BLOCK_SIZE_IN_ELEMENTS};

/// Which traversal family a call may use.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Squeeze and flatten where possible, then pick unblocked kernels for
    /// uniformly ordered operands and blocked kernels otherwise.
    #[default]
    Auto,
    /// Always route to the unblocked kernel for the operand rank.
    Unblocked,
    /// Route to the blocked kernel whenever the row has one and rank >= 2.
    Blocked,
}

/// Per-call configuration for the dispatch entry points.
///
/// ```
/// use strided_dispatch::{Config, Strategy};
///
/// let config = Config::new()
///     .with_block_size(128)
///     .unwrap()
///     .with_strategy(Strategy::Blocked);
/// assert_eq!(config.block_size_bytes(), 128);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    block_size_bytes: usize,
    strategy: Strategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size_bytes: BLOCK_SIZE_IN_BYTES,
            strategy: Strategy::Auto,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tile footprint in bytes. Must be a non-zero power of two.
    pub fn with_block_size(mut self, bytes: usize) -> Result<Self> {
        if !bytes.is_power_of_two() {
            return Err(StridedError::InvalidBlockSize(bytes));
        }
        self.block_size_bytes = bytes;
        Ok(self)
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn block_size_bytes(&self) -> usize {
        self.block_size_bytes
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Tile edge in elements for operands whose widest element is `widest`
    /// bytes. Never zero.
    pub(crate) fn tile_edge(&self, widest: usize) -> usize {
        if widest == 0 {
            return BLOCK_SIZE_IN_ELEMENTS;
        }
        (self.block_size_bytes / widest).max(1)
    }
}
