//! Reactive Primitives
//!
//! This module implements the dependency graph itself: observable cells,
//! computed nodes and the graph that owns them.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Cell`] is a container for mutable state. Computed nodes register
//! themselves as watchers of the cells they read. When a cell's value
//! changes, its watchers are marked dirty.
//!
//! ## Computed Nodes
//!
//! A [`Computed`] node is a derived value over a typed tuple of inputs. It
//! caches its result and recomputes only when read while dirty. Its result
//! lives in a cell of its own, so nodes can depend on nodes.
//!
//! ## Graphs
//!
//! A [`Graph`] owns the slot registry and the arenas every cell and node
//! lives in. Independent graphs never share state.
//!
//! # Implementation Notes
//!
//! Dependencies are declared explicitly and bound by position
//! (`node.watch::<1, _>(&cell)`), not discovered by tracking reads. Evaluation
//! is pull-based: writes only flip dirty bits, reads do the work.

mod cell;
mod computed;
mod inputs;
mod runtime;

pub use cell::{Cell, Source};
pub use computed::Computed;
pub use inputs::{Compute, InputAt, Inputs};
pub use runtime::{CellId, Graph};
