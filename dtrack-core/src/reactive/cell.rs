//! Observable Cell
//!
//! A cell is the fundamental reactive primitive. It holds a value and
//! remembers which computed nodes watch it.
//!
//! # How Cells Work
//!
//! 1. A computed node binds one of its inputs to a cell, which registers the
//!    node's registry position as a watcher.
//!
//! 2. When the cell's value changes, every watching position is marked
//!    dirty. Writing a value equal to the current one does nothing.
//!
//! 3. Nothing recomputes until a dirty node is read.
//!
//! # Watcher Layout
//!
//! Watchers are stored the way the registry addresses positions: one 64-bit
//! word per group, so a cell watched by many nodes in the same group costs a
//! single word.

use std::fmt::{self, Debug};
use std::marker::PhantomData;

use smallvec::SmallVec;

use super::runtime::{CellId, Graph};
use crate::error::Result;
use crate::graph::{bits, Position};

/// Set of positions watching a cell, as `(group, mask)` words sorted by group.
#[derive(Debug, Default, Clone)]
pub(crate) struct Watchers {
    words: SmallVec<[(u32, u64); 2]>,
}

impl Watchers {
    pub(crate) fn insert(&mut self, position: Position) {
        match self.find(position.group()) {
            Ok(index) => self.words[index].1 |= position.bit(),
            Err(index) => self.words.insert(index, (position.group(), position.bit())),
        }
    }

    /// Returns whether the position was present.
    pub(crate) fn remove(&mut self, position: Position) -> bool {
        let Ok(index) = self.find(position.group()) else {
            return false;
        };
        let word = &mut self.words[index].1;
        if *word & position.bit() == 0 {
            return false;
        }
        *word &= !position.bit();
        if *word == 0 {
            self.words.remove(index);
        }
        true
    }

    pub(crate) fn contains(&self, position: Position) -> bool {
        self.find(position.group())
            .is_ok_and(|index| self.words[index].1 & position.bit() != 0)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = Position> + '_ {
        self.words
            .iter()
            .flat_map(|&(group, word)| bits(word).map(move |bit| Position::from_raw(group, bit)))
    }

    pub(crate) fn len(&self) -> usize {
        self.words.iter().map(|(_, word)| word.count_ones() as usize).sum()
    }

    fn find(&self, group: u32) -> std::result::Result<usize, usize> {
        self.words.binary_search_by_key(&group, |(g, _)| *g)
    }
}

/// An observable cell holding a value of type `T`.
///
/// Cloning the handle shares the cell; the cell is destroyed when the last
/// handle is dropped. Computed nodes do not hold handles to their inputs, so
/// they never keep an input cell alive.
///
/// # Example
///
/// ```rust
/// use dtrack_core::reactive::Graph;
///
/// let graph = Graph::new();
/// let count = graph.cell(0);
///
/// count.set(5);
/// assert_eq!(count.value(), 5);
///
/// count.update(|v| v + 1);
/// assert_eq!(count.value(), 6);
/// ```
pub struct Cell<T: 'static> {
    graph: Graph,
    id: CellId,
    _marker: PhantomData<T>,
}

impl<T> Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    pub(crate) fn from_parts(graph: Graph, id: CellId) -> Self {
        Self {
            graph,
            id,
            _marker: PhantomData,
        }
    }

    /// Arena key of this cell.
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Graph this cell belongs to.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Get the current value. Never recomputes anything.
    pub fn value(&self) -> T {
        self.with(T::clone)
    }

    /// Run `f` with a reference to the current value.
    ///
    /// The graph is borrowed while `f` runs, so `f` must not touch the graph.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.graph.state().borrow();
        let value = state
            .peek::<T>(self.id)
            .expect("live handle keeps its cell alive");
        f(value)
    }

    /// Store a new value and dirty every watcher.
    ///
    /// A value equal to the current one is ignored: no watcher is dirtied.
    pub fn set(&self, value: T) {
        self.graph.state().borrow_mut().write(self.id, value);
    }

    /// Update the value using a function of the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = self.with(f);
        self.set(next);
    }

    /// Register `position` as a watcher. Watching twice is the same as once.
    pub fn watch(&self, position: Position) -> Result<()> {
        self.graph.state().borrow_mut().watch(self.id, position)
    }

    /// Remove `position` from the watchers.
    ///
    /// Fails with [`GraphError::NotWatching`](crate::GraphError::NotWatching)
    /// if the position is not watching this cell.
    pub fn unwatch(&self, position: Position) -> Result<()> {
        self.graph.state().borrow_mut().unwatch(self.id, position)
    }

    /// Dirty every watcher without changing the value.
    ///
    /// Nodes reading this cell treat it as changed and recompute on their
    /// next read.
    pub fn invalidate(&self) {
        self.graph.state().borrow_mut().touch(self.id);
    }

    /// Whether `position` is watching this cell.
    pub fn is_watched_by(&self, position: Position) -> bool {
        self.graph
            .state()
            .borrow()
            .cell_slot(self.id)
            .is_some_and(|slot| slot.watchers.contains(position))
    }

    /// Number of positions watching this cell.
    pub fn watcher_count(&self) -> usize {
        self.graph
            .state()
            .borrow()
            .cell_slot(self.id)
            .map_or(0, |slot| slot.watchers.len())
    }
}

/// Anything a computed node can bind an input to: a cell, or another
/// computed node through its result cell.
pub trait Source<T: 'static> {
    /// The cell a node watches when bound to this source.
    fn as_cell(&self) -> &Cell<T>;
}

impl<T> Source<T> for Cell<T>
where
    T: Clone + PartialEq + 'static,
{
    fn as_cell(&self) -> &Cell<T> {
        self
    }
}

impl<T: 'static> Clone for Cell<T> {
    fn clone(&self) -> Self {
        self.graph.state().borrow_mut().retain_cell(self.id);
        Self {
            graph: self.graph.clone(),
            id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Drop for Cell<T> {
    fn drop(&mut self) {
        let removed = self.graph.state().borrow_mut().release_cell(self.id);
        drop(removed);
    }
}

impl<T> Debug for Cell<T>
where
    T: Clone + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id)
            .field("value", &self.value())
            .field("watcher_count", &self.watcher_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
