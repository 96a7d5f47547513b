//! dtrack Core
//!
//! This crate provides an incremental computation engine: observable cells
//! and computed nodes whose results are recomputed lazily, only when one of
//! their inputs changed since the last computation.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `graph`: The slot registry. Compact positions and their dirty bits.
//! - `reactive`: Cells, computed nodes and the graph that owns them.
//!
//! # Example
//!
//! ```rust
//! use dtrack_core::reactive::Graph;
//!
//! let graph = Graph::new();
//!
//! // Create a cell
//! let count = graph.cell(1);
//!
//! // Create derived values
//! let doubled = graph.computed(0, |c: &i32| c * 2);
//! let label = graph.computed(String::new(), |c: &i32, d: &i32| format!("{c} -> {d}"));
//!
//! doubled.watch::<0, _>(&count).unwrap();
//! label.watch::<0, _>(&count).unwrap();
//! label.watch::<1, _>(&doubled).unwrap();
//! assert_eq!(label.value(), "1 -> 2");
//!
//! // Update the cell; nothing recomputes until the next read
//! count.set(5);
//! assert_eq!(label.value(), "5 -> 10");
//! ```
//!
//! The graph is single-threaded. Its handles are neither `Send` nor `Sync`.

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::GraphConfig;
pub use error::{GraphError, Result};
