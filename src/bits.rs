//! Fixed-width bit vector values.
//!
//! Every net holds a [`Bits`] value whose width equals the bit width of the
//! net's data type. Values are always kept masked to their width, so two
//! values compare equal exactly when their widths and bit patterns match.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Widest value the simulator can hold in a single net.
pub const MAX_WIDTH: u32 = 128;

/// A fixed-width unsigned bit vector of 1 to [`MAX_WIDTH`] bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bits {
    width: u32,
    value: u128,
}

#[inline]
fn mask(width: u32) -> u128 {
    if width >= MAX_WIDTH {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

impl Bits {
    /// Creates a value, truncating `value` to `width` bits.
    ///
    /// # Panics
    /// Panics if `width` is zero or larger than [`MAX_WIDTH`].
    pub fn new(width: u32, value: u128) -> Self {
        assert!(
            (1..=MAX_WIDTH).contains(&width),
            "bit width {width} outside 1..={MAX_WIDTH}"
        );
        Self {
            width,
            value: value & mask(width),
        }
    }

    /// All-zero value of the given width.
    pub fn zero(width: u32) -> Self {
        Self::new(width, 0)
    }

    /// Single-bit value.
    pub fn from_bool(bit: bool) -> Self {
        Self::new(1, bit as u128)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn value(&self) -> u128 {
        self.value
    }

    /// Low 64 bits of the value.
    pub fn as_u64(&self) -> u64 {
        self.value as u64
    }

    pub fn is_nonzero(&self) -> bool {
        self.value != 0
    }

    /// Zero-extends or truncates to `width`.
    pub fn resize(self, width: u32) -> Self {
        Self::new(width, self.value)
    }

    /// Extracts `width` bits starting at bit `lo`.
    ///
    /// Bits beyond the end of the value read as zero.
    pub fn slice(self, lo: u32, width: u32) -> Self {
        let shifted = if lo >= MAX_WIDTH { 0 } else { self.value >> lo };
        Self::new(width, shifted)
    }

    /// Returns a copy with `width(part)` bits starting at `lo` replaced by `part`.
    ///
    /// Bits of `part` that fall beyond the end of `self` are dropped.
    pub fn set_slice(self, lo: u32, part: Bits) -> Self {
        if lo >= self.width {
            return self;
        }
        let field = mask(part.width) << lo;
        let value = (self.value & !field) | ((part.value << lo) & field);
        Self::new(self.width, value)
    }

    /// Concatenates values, the first element ending up in the most significant bits.
    ///
    /// # Panics
    /// Panics if `parts` is empty or the total width exceeds [`MAX_WIDTH`].
    pub fn concat(parts: &[Bits]) -> Self {
        let width: u32 = parts.iter().map(|p| p.width).sum();
        let mut value = 0u128;
        for part in parts {
            value = if part.width >= MAX_WIDTH {
                part.value
            } else {
                (value << part.width) | part.value
            };
        }
        Self::new(width, value)
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.width.div_ceil(4) as usize;
        write!(f, "{:0digits$x}", self.value)
    }
}

impl fmt::Debug for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'h{}", self.width, self)
    }
}
