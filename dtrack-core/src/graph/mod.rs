//! Slot Registry
//!
//! This module implements the bookkeeping layer underneath the reactive
//! graph: the compact positions handed out to computed nodes and their
//! dirty bits.
//!
//! # Overview
//!
//! Every computed node owns exactly one [`Position`]. A position lives in a
//! group of 64 and is addressed by `(group, bit)`. The [`SlotRegistry`] keeps
//! one occupancy word and one dirty word per group.
//!
//! # Design Decisions
//!
//! 1. The registry only does bit accounting. Recomputation lives in
//!    [`crate::reactive`], which keeps the bit arithmetic testable on its own.
//!
//! 2. The dirty test masks the group word with the queried bit, so several
//!    dirty positions in one group never make an unrelated position look
//!    dirty (or clean).
//!
//! 3. Every operation validates that the position's mask is a single bit.

mod position;
mod registry;

pub use position::{Position, GROUP_WIDTH};
pub use registry::SlotRegistry;

pub(crate) use position::bits;
