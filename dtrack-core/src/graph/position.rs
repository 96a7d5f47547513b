//! Registry Positions
//!
//! A position is the address of one computed node's dirty bit: a group index
//! plus a single-bit mask inside that group's 64-bit word.

use std::fmt;

use crate::error::{GraphError, Result};

/// Number of positions held by one group.
pub const GROUP_WIDTH: u32 = u64::BITS;

/// Handle identifying one computed node's slot in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    group: u32,
    bit: u64,
}

impl Position {
    /// Build a position from its raw parts without validating the mask.
    ///
    /// Registry operations reject positions whose mask is not a single bit,
    /// so this is safe to call with arbitrary input.
    pub const fn from_raw(group: u32, bit: u64) -> Self {
        Self { group, bit }
    }

    /// Build a position from a group index and a bit index (0 = least significant).
    ///
    /// Fails with [`GraphError::InvalidMask`] if `index` is not below
    /// [`GROUP_WIDTH`].
    pub fn from_index(group: u32, index: u32) -> Result<Self> {
        let bit = 1u64
            .checked_shl(index)
            .ok_or(GraphError::InvalidMask { group, mask: 0 })?;
        Ok(Self { group, bit })
    }

    /// Group index.
    pub fn group(&self) -> u32 {
        self.group
    }

    /// Single-bit mask inside the group word.
    pub fn bit(&self) -> u64 {
        self.bit
    }

    /// Index of the bit inside the group word.
    pub fn bit_index(&self) -> u32 {
        self.bit.trailing_zeros()
    }

    /// Check that the mask has exactly one bit set.
    pub fn validate(&self) -> Result<()> {
        if self.bit.count_ones() == 1 {
            Ok(())
        } else {
            Err(GraphError::InvalidMask {
                group: self.group,
                mask: self.bit,
            })
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "position {}:{}", self.group, self.bit_index())
    }
}

/// Iterate the single-bit masks set in `word`, most significant first.
pub(crate) fn bits(mut word: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        if word == 0 {
            return None;
        }
        let bit = 1u64 << (GROUP_WIDTH - 1 - word.leading_zeros());
        word &= !bit;
        Some(bit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_single_bit() {
        assert!(Position::from_raw(0, 1).validate().is_ok());
        assert!(Position::from_raw(3, 1 << 63).validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_masks() {
        assert_eq!(
            Position::from_raw(2, 0).validate(),
            Err(GraphError::InvalidMask { group: 2, mask: 0 })
        );
        assert!(Position::from_raw(0, 0b110).validate().is_err());
    }

    #[test]
    fn bit_index_round_trips() {
        let position = Position::from_index(1, 17).unwrap();
        assert_eq!(position.bit(), 1 << 17);
        assert_eq!(position.bit_index(), 17);
        assert_eq!(position.to_string(), "position 1:17");
    }

    #[test]
    fn from_index_rejects_out_of_range_bits() {
        assert_eq!(Position::from_index(0, 63).unwrap().bit(), 1 << 63);
        assert_eq!(
            Position::from_index(4, 64),
            Err(GraphError::InvalidMask { group: 4, mask: 0 })
        );
        assert!(Position::from_index(0, u32::MAX).is_err());
    }

    #[test]
    fn bits_walks_high_to_low() {
        let found: Vec<u64> = bits(0b1010_0001).collect();
        assert_eq!(found, vec![0b1000_0000, 0b0010_0000, 0b0000_0001]);
        assert_eq!(bits(0).count(), 0);
        assert_eq!(bits(u64::MAX).count(), 64);
    }
}
