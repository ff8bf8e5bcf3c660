//! Stencil width.

use std::fmt;

use crate::error::TopologyError;

/// Number of predecessor cells an interior node reads: 3, 5, 7 or 9.
///
/// The width is odd so every interior node has a centre; `half()` cells
/// on each side feed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StencilWidth(u8);

impl StencilWidth {
    /// Three-point stencil.
    pub const THREE: Self = Self(3);
    /// Five-point stencil.
    pub const FIVE: Self = Self(5);

    /// Validate and wrap a width.
    pub fn new(width: usize) -> Result<Self, TopologyError> {
        match width {
            3 | 5 | 7 | 9 => Ok(Self(width as u8)),
            _ => Err(TopologyError::InvalidStencilWidth { width }),
        }
    }

    /// The width as a count.
    pub fn get(self) -> usize {
        self.0 as usize
    }

    /// Cells on each side of the centre.
    pub fn half(self) -> usize {
        (self.0 as usize - 1) / 2
    }
}

impl fmt::Display for StencilWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<usize> for StencilWidth {
    type Error = TopologyError;

    fn try_from(width: usize) -> Result<Self, Self::Error> {
        Self::new(width)
    }
}
