use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// A key that can be printed as the raw bits it packs.
///
/// Reports and profiler method names render keys through [`SelectorKey::bits`],
/// so two distinct keys should not share the same bits.
pub trait SelectorKey: Eq + Hash {
    fn bits(&self) -> u64;
}

macro_rules! impl_selector_key {
    ($($ty:ty),*) => {
        $(
            impl SelectorKey for $ty {
                fn bits(&self) -> u64 {
                    *self as u64
                }
            }
        )*
    };
}

impl_selector_key!(u8, u16, u32, u64, usize);

/// Bit-packed rendering state selecting one routine variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector(u64);

impl Selector {
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// Store `value` in the `width`-bit field starting at bit `offset`.
    ///
    /// Bits of `value` above `width` are dropped.
    pub fn with_field(self, offset: u32, width: u32, value: u64) -> Self {
        let mask = field_mask(offset, width);
        Self((self.0 & !(mask << offset)) | ((value & mask) << offset))
    }

    /// Read the `width`-bit field starting at bit `offset`.
    pub fn field(self, offset: u32, width: u32) -> u64 {
        let mask = field_mask(offset, width);
        (self.0 >> offset) & mask
    }

    pub fn is_set(self, bit: u32) -> bool {
        self.field(bit, 1) != 0
    }
}

fn field_mask(offset: u32, width: u32) -> u64 {
    assert!(
        width > 0 && offset + width <= u64::BITS,
        "selector field {offset}+{width} does not fit in 64 bits"
    );
    if width == u64::BITS {
        u64::MAX
    } else {
        (1 << width) - 1
    }
}

impl SelectorKey for Selector {
    fn bits(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Selector {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

impl fmt::LowerHex for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_round_trip_without_touching_neighbours() {
        let selector = Selector::default()
            .with_field(0, 4, 0xf)
            .with_field(4, 2, 1)
            .with_field(60, 4, 0x9);

        assert_eq!(selector.field(0, 4), 0xf);
        assert_eq!(selector.field(4, 2), 1);
        assert_eq!(selector.field(60, 4), 0x9);
        assert_eq!(selector.bits(), 0x9000_0000_0000_001f);

        let updated = selector.with_field(4, 2, 2);
        assert_eq!(updated.field(0, 4), 0xf);
        assert_eq!(updated.field(4, 2), 2);
        assert!(updated.is_set(5));
        assert!(!updated.is_set(4));
    }

    #[test]
    fn oversized_values_are_truncated() {
        let selector = Selector::default().with_field(8, 3, 0xff);
        assert_eq!(selector.bits(), 0x700);
    }

    #[test]
    fn full_width_field_covers_every_bit() {
        let selector = Selector::default().with_field(0, 64, u64::MAX);
        assert_eq!(selector.field(0, 64), u64::MAX);
        assert_eq!(format!("{selector:x}"), "ffffffffffffffff");
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn field_past_the_top_bit_panics() {
        let _ = Selector::default().with_field(62, 4, 1);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn reading_past_the_top_bit_panics() {
        let _ = Selector::new(u64::MAX).field(64, 1);
    }
}
