//! Slot Registry
//!
//! The registry hands out compact positions to computed nodes and keeps a
//! single dirty bit per position. It is pure bit accounting: nothing in here
//! knows how to recompute anything.
//!
//! # Layout
//!
//! Positions are packed into groups of 64. Each group has two words:
//!
//! - `occupancy`: bits currently assigned to live nodes
//! - `dirty`: bits whose node must recompute before its value is trusted
//!
//! A dirty bit is always an occupied bit. Groups whose occupancy drops to
//! zero are discarded, so the footprint follows the live node count rather
//! than the historical high-water mark.
//!
//! # Allocation
//!
//! Groups are scanned in ascending order and the first group with a free bit
//! donates its most significant free bit. When every group is full, a new
//! group is opened at the lowest unused index.

use std::collections::BTreeMap;

use tracing::trace;

use super::position::{Position, GROUP_WIDTH};
use crate::error::{GraphError, Result};

/// Bitmap allocator with one dirty bit per allocated position.
#[derive(Debug, Default, Clone)]
pub struct SlotRegistry {
    /// Group index -> bits assigned to live nodes. Never holds a zero word.
    occupancy: BTreeMap<u32, u64>,

    /// Group index -> bits that need recomputation. Never holds a zero word.
    dirty: BTreeMap<u32, u64>,
}

impl SlotRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, clean position.
    pub fn allocate(&mut self) -> Position {
        let free_group = self
            .occupancy
            .iter()
            .find(|(_, word)| **word != u64::MAX)
            .map(|(group, word)| (*group, *word));

        let position = match free_group {
            Some((group, word)) => {
                let free = !word;
                let bit = 1u64 << (GROUP_WIDTH - 1 - free.leading_zeros());
                Position::from_raw(group, bit)
            }
            None => Position::from_raw(self.next_unused_group(), 1u64 << (GROUP_WIDTH - 1)),
        };

        *self.occupancy.entry(position.group()).or_insert(0) |= position.bit();
        trace!(%position, "allocated");
        position
    }

    /// Release a position, clearing both its occupancy and dirty bits.
    pub fn free(&mut self, position: Position) -> Result<()> {
        self.check_occupied(position)?;

        clear_bit(&mut self.occupancy, position);
        clear_bit(&mut self.dirty, position);
        trace!(%position, "freed");
        Ok(())
    }

    /// Mark a position as needing recomputation. Idempotent.
    pub fn mark_dirty(&mut self, position: Position) -> Result<()> {
        self.check_occupied(position)?;

        *self.dirty.entry(position.group()).or_insert(0) |= position.bit();
        trace!(%position, "marked dirty");
        Ok(())
    }

    /// Clear a position's dirty bit after its node has recomputed.
    pub fn mark_clean(&mut self, position: Position) -> Result<()> {
        self.check_occupied(position)?;

        clear_bit(&mut self.dirty, position);
        Ok(())
    }

    /// Whether the position must recompute before its value is trusted.
    ///
    /// Positions in groups that were never dirtied are clean.
    pub fn is_dirty(&self, position: Position) -> bool {
        self.dirty
            .get(&position.group())
            .is_some_and(|word| word & position.bit() != 0)
    }

    /// Whether the position is currently allocated.
    pub fn is_occupied(&self, position: Position) -> bool {
        position.validate().is_ok()
            && self
                .occupancy
                .get(&position.group())
                .is_some_and(|word| word & position.bit() != 0)
    }

    /// Number of allocated positions.
    pub fn live_count(&self) -> usize {
        self.occupancy.values().map(|word| word.count_ones() as usize).sum()
    }

    /// Number of dirty positions.
    pub fn dirty_count(&self) -> usize {
        self.dirty.values().map(|word| word.count_ones() as usize).sum()
    }

    /// Number of groups currently holding at least one live position.
    pub fn group_count(&self) -> usize {
        self.occupancy.len()
    }

    fn check_occupied(&self, position: Position) -> Result<()> {
        position.validate()?;
        if self.is_occupied(position) {
            Ok(())
        } else {
            Err(GraphError::NotOccupied(position))
        }
    }

    /// Lowest group index with no entry. Only called when every present group is full.
    fn next_unused_group(&self) -> u32 {
        let mut candidate = 0;
        for group in self.occupancy.keys() {
            if *group != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }
}

fn clear_bit(words: &mut BTreeMap<u32, u64>, position: Position) {
    if let Some(word) = words.get_mut(&position.group()) {
        *word &= !position.bit();
        if *word == 0 {
            words.remove(&position.group());
        }
    }
}
