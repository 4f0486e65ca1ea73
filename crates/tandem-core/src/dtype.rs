//! Element data types and buffer shapes.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Dimensions of a row-major buffer.
///
/// Uses `SmallVec<[usize; 4]>` so every registered sensor shape (at most
/// three dimensions) lives inline.
pub type Shape = SmallVec<[usize; 4]>;

/// Primitive element type of a shared buffer.
///
/// The serialized names are part of the manifest wire format and must
/// match what the engine expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    /// One byte per element, 0 = false, anything else = true.
    #[serde(rename = "bool")]
    Bool,
    /// Unsigned 8-bit integer.
    #[serde(rename = "uint8")]
    U8,
    /// IEEE-754 single precision, native endianness.
    #[serde(rename = "float32")]
    F32,
}

impl Dtype {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Bool | Self::U8 => 1,
            Self::F32 => 4,
        }
    }

    /// Wire name of this dtype.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "uint8",
            Self::F32 => "float32",
        }
    }

    /// Byte length of a buffer of `shape` elements of this dtype.
    ///
    /// Returns `None` on overflow.
    pub fn byte_len(self, shape: &[usize]) -> Option<usize> {
        shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .and_then(|n| n.checked_mul(self.size()))
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Number of elements in `shape` (the empty shape has one element).
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}
