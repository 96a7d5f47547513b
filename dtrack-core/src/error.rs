//! Error types.
//!
//! Every variant is a precondition violation: the caller handed the graph a
//! position, mask or handle that does not satisfy the operation's contract.
//! None of them are transient, so there is nothing to retry.

use thiserror::Error;

use crate::graph::Position;

/// Errors returned by registry and graph operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The position's bit is zero or has more than one bit set.
    #[error("mask {mask:#018x} in group {group} is not a single bit")]
    InvalidMask {
        /// Group index of the offending position.
        group: u32,
        /// The raw mask that was passed in.
        mask: u64,
    },

    /// The position is not currently allocated.
    #[error("{0} is not occupied")]
    NotOccupied(Position),

    /// The position is not registered as a watcher of the cell.
    #[error("{0} is not watching this cell")]
    NotWatching(Position),

    /// A handle from one graph was passed to another graph.
    #[error("handle belongs to a different graph")]
    ForeignGraph,
}

/// Result alias used throughout the crate.
pub type Result<T, E = GraphError> = std::result::Result<T, E>;
