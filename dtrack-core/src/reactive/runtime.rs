//! Graph Runtime
//!
//! The runtime is the central coordinator that connects cells and computed
//! nodes. It owns the slot registry, the cell arena and the per-node
//! bookkeeping, and it drives invalidation and recomputation.
//!
//! # How It Works
//!
//! 1. A computed node allocates a registry position when it is created.
//!
//! 2. Binding an input registers the node's position as a watcher of the
//!    input cell.
//!
//! 3. When a cell's value changes, the runtime:
//!    a. Marks every watching position dirty
//!    b. Follows positions that belong to computed nodes to the watchers of
//!       that node's result cell, so dirtiness reaches transitive dependents
//!    c. Does not recompute anything; nodes are lazy
//!
//! 4. Reading a dirty node first refreshes any dirty node whose result it
//!    reads. It then runs its function only if one of the cells it reads
//!    changed since its last run, and clears its dirty bit either way.
//!
//! A dirty bit therefore means "check before use". Every change to a cell
//! stamps it with the graph clock, and every node records the clock of its
//! last run. An upstream node that recomputes to an equal result does not
//! stamp its result cell, so nodes further down keep their cached value.
//!
//! # Ownership
//!
//! All state sits behind one `Rc<RefCell<_>>` shared by every handle created
//! from a [`Graph`]. Handles keep the state alive, so a graph can never be
//! dropped out from under its cells and nodes. Inputs are stored as
//! generational [`CellId`]s; a destroyed input is detected by a failed arena
//! lookup and reads as its type's default.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::cell::{Cell, Watchers};
use super::computed::Computed;
use super::inputs::{Compute, Inputs};
use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::graph::{Position, SlotRegistry, GROUP_WIDTH};

new_key_type! {
    /// Arena key of an observable cell.
    pub struct CellId;
}

/// Type-erased recomputation step of a computed node.
pub(crate) trait Recompute {
    /// Pull inputs, run the function and store the result into `output`.
    fn recompute(&self, state: &mut GraphState, output: CellId, inputs: &[Option<CellId>]);
}

/// Arena entry for one observable cell.
pub(crate) struct CellSlot {
    value: Box<dyn Any>,
    pub(crate) watchers: Watchers,
    /// Live handles. The cell is destroyed when this reaches zero.
    handles: usize,
    /// Position of the computed node whose result this cell caches.
    producer: Option<Position>,
    /// Graph clock at the last change of the value.
    changed_at: u64,
}

/// Bookkeeping for one computed node, keyed by its position.
pub(crate) struct NodeSlot {
    output: CellId,
    inputs: SmallVec<[Option<CellId>; 4]>,
    /// Live input cells as of the last run. A slot that differs from
    /// `inputs` was rebound, unbound or destroyed since.
    seen: SmallVec<[Option<CellId>; 4]>,
    /// Every cell this position is registered on.
    edges: SmallVec<[CellId; 4]>,
    kernel: Rc<dyn Recompute>,
    recomputes: u64,
    /// Graph clock at the last run (or at creation).
    verified_at: u64,
}

/// Shared state behind a [`Graph`].
pub struct GraphState {
    config: GraphConfig,
    registry: SlotRegistry,
    cells: SlotMap<CellId, CellSlot>,
    nodes: HashMap<Position, NodeSlot>,
    /// Advances on every change to any cell.
    clock: u64,
    /// Result-change hooks queued during recomputation, run once the state
    /// is no longer borrowed.
    pending: Vec<Box<dyn FnOnce()>>,
}

impl GraphState {
    fn new(config: GraphConfig) -> Self {
        let capacity = config.initial_groups * GROUP_WIDTH as usize;
        Self {
            registry: SlotRegistry::new(),
            cells: SlotMap::with_capacity_and_key(capacity),
            nodes: HashMap::with_capacity(capacity),
            clock: 0,
            pending: Vec::new(),
            config,
        }
    }

    pub(crate) fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub(crate) fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------------
    // Cells
    // ------------------------------------------------------------------------

    pub(crate) fn insert_cell<T: 'static>(&mut self, value: T, producer: Option<Position>) -> CellId {
        self.cells.insert(CellSlot {
            value: Box::new(value),
            watchers: Watchers::default(),
            handles: 1,
            producer,
            changed_at: self.clock,
        })
    }

    pub(crate) fn retain_cell(&mut self, id: CellId) {
        if let Some(slot) = self.cells.get_mut(id) {
            slot.handles += 1;
        }
    }

    /// Drop one handle. Returns the removed slot once the last handle is gone
    /// so the caller can drop the value after releasing the borrow.
    pub(crate) fn release_cell(&mut self, id: CellId) -> Option<CellSlot> {
        let slot = self.cells.get_mut(id)?;
        slot.handles -= 1;
        if slot.handles > 0 {
            return None;
        }

        if self.config.invalidate_on_drop {
            self.invalidate(id);
        }
        let slot = self.cells.remove(id)?;
        for position in slot.watchers.iter() {
            if let Some(node) = self.nodes.get_mut(&position) {
                node.edges.retain(|edge| *edge != id);
            }
        }
        Some(slot)
    }

    pub(crate) fn cell_slot(&self, id: CellId) -> Option<&CellSlot> {
        self.cells.get(id)
    }

    pub(crate) fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Borrow a cell's value. `None` if the cell is gone.
    pub(crate) fn peek<T: 'static>(&self, id: CellId) -> Option<&T> {
        self.cells.get(id)?.value.downcast_ref::<T>()
    }

    /// Clone a cell's value, or the type's default when the cell is unbound
    /// or has been destroyed.
    pub(crate) fn read_or_default<T: Clone + Default + 'static>(&self, id: Option<CellId>) -> T {
        id.and_then(|id| self.peek::<T>(id))
            .cloned()
            .unwrap_or_default()
    }

    /// Change-detected write. Returns whether the stored value changed.
    pub(crate) fn write<T: PartialEq + 'static>(&mut self, id: CellId, value: T) -> bool {
        let Some(slot) = self.cells.get_mut(id) else {
            return false;
        };
        let current = slot
            .value
            .downcast_mut::<T>()
            .expect("cell holds a value of its handle's type");
        if *current == value {
            return false;
        }
        *current = value;
        self.touch(id);
        true
    }

    /// Record a change to `id` and dirty its watchers.
    pub(crate) fn touch(&mut self, id: CellId) {
        self.clock += 1;
        if let Some(slot) = self.cells.get_mut(id) {
            slot.changed_at = self.clock;
        }
        self.invalidate(id);
    }

    /// Mark every watcher of `id` dirty, following node result cells so
    /// transitive dependents are dirtied too.
    ///
    /// Positions that are already dirty are not followed: their dependents
    /// were dirtied when they were.
    pub(crate) fn invalidate(&mut self, id: CellId) {
        let mut stack: SmallVec<[CellId; 8]> = SmallVec::new();
        stack.push(id);

        while let Some(id) = stack.pop() {
            let Some(slot) = self.cells.get(id) else {
                continue;
            };
            for position in slot.watchers.iter() {
                if self.registry.is_dirty(position) {
                    continue;
                }
                self.registry
                    .mark_dirty(position)
                    .expect("watcher set only holds live positions");
                if let Some(node) = self.nodes.get(&position) {
                    stack.push(node.output);
                }
            }
        }
    }

    /// Register `position` as a watcher of `id`. Idempotent.
    pub(crate) fn watch(&mut self, id: CellId, position: Position) -> Result<()> {
        position.validate()?;
        if !self.registry.is_occupied(position) {
            return Err(GraphError::NotOccupied(position));
        }
        let Some(slot) = self.cells.get_mut(id) else {
            return Ok(());
        };
        slot.watchers.insert(position);

        if let Some(node) = self.nodes.get_mut(&position) {
            if !node.edges.contains(&id) {
                node.edges.push(id);
            }
        }
        Ok(())
    }

    /// Remove `position` from the watchers of `id`.
    pub(crate) fn unwatch(&mut self, id: CellId, position: Position) -> Result<()> {
        position.validate()?;
        let removed = self
            .cells
            .get_mut(id)
            .is_some_and(|slot| slot.watchers.remove(position));
        if !removed {
            return Err(GraphError::NotWatching(position));
        }

        if let Some(node) = self.nodes.get_mut(&position) {
            node.edges.retain(|edge| *edge != id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Computed nodes
    // ------------------------------------------------------------------------

    pub(crate) fn insert_node(
        &mut self,
        position: Position,
        output: CellId,
        arity: usize,
        kernel: Rc<dyn Recompute>,
    ) {
        let mut inputs = SmallVec::new();
        inputs.resize(arity, None);
        self.nodes.insert(
            position,
            NodeSlot {
                output,
                seen: inputs.clone(),
                inputs,
                edges: SmallVec::new(),
                kernel,
                recomputes: 0,
                verified_at: self.clock,
            },
        );
    }

    pub(crate) fn allocate(&mut self) -> Position {
        self.registry.allocate()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn recompute_count(&self, position: Position) -> u64 {
        self.nodes.get(&position).map_or(0, |node| node.recomputes)
    }

    pub(crate) fn input(&self, position: Position, index: usize) -> Option<CellId> {
        self.nodes
            .get(&position)
            .and_then(|node| node.inputs.get(index).copied().flatten())
            .filter(|id| self.cells.contains_key(*id))
    }

    /// Point input slot `index` of the node at `position` to `source`.
    ///
    /// The previous cell in that slot stops being watched unless another
    /// slot of the same node still reads it.
    pub(crate) fn bind(&mut self, position: Position, index: usize, source: Option<CellId>) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&position)
            .ok_or(GraphError::NotOccupied(position))?;
        let previous = std::mem::replace(&mut node.inputs[index], source);
        let still_read = previous.is_some_and(|prev| node.inputs.contains(&Some(prev)));

        if let Some(prev) = previous {
            let watching = self
                .cells
                .get(prev)
                .is_some_and(|slot| slot.watchers.contains(position));
            if watching && !still_read && Some(prev) != source {
                self.unwatch(prev, position)?;
            }
        }
        if let Some(source) = source {
            self.watch(source, position)?;
        }

        debug!(%position, index, bound = source.is_some(), "rebound input");
        if self.config.dirty_on_bind {
            self.mark_node_dirty(position)?;
        }
        Ok(())
    }

    /// Mark a node dirty and propagate to the watchers of its result.
    pub(crate) fn mark_node_dirty(&mut self, position: Position) -> Result<()> {
        if self.registry.is_dirty(position) {
            return Ok(());
        }
        self.registry.mark_dirty(position)?;
        if let Some(output) = self.nodes.get(&position).map(|node| node.output) {
            self.invalidate(output);
        }
        Ok(())
    }

    /// Bring the node at `position` up to date if it is dirty.
    ///
    /// The function runs only when a cell the node reads changed since its
    /// last run; otherwise the dirty bit is just cleared.
    pub(crate) fn refresh(&mut self, position: Position) {
        if !self.registry.is_dirty(position) {
            return;
        }
        self.refresh_upstream(position);
        if self.inputs_changed(position) {
            self.recompute(position);
        } else {
            trace!(%position, "inputs unchanged, keeping cached result");
            self.registry
                .mark_clean(position)
                .expect("live node owns its position");
        }
    }

    /// Recompute the node at `position` regardless of its dirty bit.
    pub(crate) fn apply(&mut self, position: Position) {
        self.refresh_upstream(position);
        self.recompute(position);
    }

    /// Refresh every dirty node whose result the node at `position` reads.
    fn refresh_upstream(&mut self, position: Position) {
        let Some(node) = self.nodes.get(&position) else {
            return;
        };
        let producers: SmallVec<[Position; 4]> = node
            .inputs
            .iter()
            .flatten()
            .chain(&node.edges)
            .filter_map(|id| self.cells.get(*id).and_then(|slot| slot.producer))
            .collect();

        for producer in producers {
            self.refresh(producer);
        }
    }

    /// Whether a cell read by the node at `position` changed since its last run.
    fn inputs_changed(&self, position: Position) -> bool {
        let Some(node) = self.nodes.get(&position) else {
            return false;
        };
        let rebound = node.inputs.iter().zip(&node.seen).any(|(input, seen)| {
            let live = input.filter(|id| self.cells.contains_key(*id));
            live != *seen
        });
        rebound
            || node
                .inputs
                .iter()
                .flatten()
                .chain(&node.edges)
                .any(|id| self.cells.get(*id).is_some_and(|slot| slot.changed_at > node.verified_at))
    }

    fn recompute(&mut self, position: Position) {
        let Some(node) = self.nodes.get(&position) else {
            return;
        };
        let kernel = Rc::clone(&node.kernel);
        let output = node.output;
        let inputs = node.inputs.clone();

        debug!(%position, "recomputing");
        kernel.recompute(self, output, &inputs);

        self.registry
            .mark_clean(position)
            .expect("live node owns its position");
        let seen = inputs
            .iter()
            .map(|input| input.filter(|id| self.cells.contains_key(*id)))
            .collect();
        let clock = self.clock;
        if let Some(node) = self.nodes.get_mut(&position) {
            node.seen = seen;
            node.verified_at = clock;
            node.recomputes += 1;
        }
    }

    pub(crate) fn queue_hook(&mut self, hook: Box<dyn FnOnce()>) {
        self.pending.push(hook);
    }

    /// Tear down the node at `position`: unregister it from every cell it
    /// watches, detach it from its result cell and free its position.
    ///
    /// The slot is returned so its function can be dropped after the borrow
    /// is released.
    pub(crate) fn remove_node(&mut self, position: Position) -> Option<NodeSlot> {
        let node = self.nodes.remove(&position)?;

        for id in &node.edges {
            if let Some(slot) = self.cells.get_mut(*id) {
                slot.watchers.remove(position);
            }
        }
        if let Some(slot) = self.cells.get_mut(node.output) {
            slot.producer = None;
        }
        if let Err(err) = self.registry.free(position) {
            warn!(%position, %err, "computed node torn down with inconsistent registry state");
        }
        Some(node)
    }
}

impl fmt::Debug for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphState")
            .field("config", &self.config)
            .field("live_nodes", &self.nodes.len())
            .field("live_cells", &self.cells.len())
            .field("dirty_nodes", &self.registry.dirty_count())
            .finish()
    }
}

/// Handle to one dependency graph.
///
/// Cloning the handle shares the graph. Every cell and computed node created
/// from it is bound to it and keeps it alive.
///
/// # Example
///
/// ```rust
/// use dtrack_core::reactive::Graph;
///
/// let graph = Graph::new();
/// let x = graph.cell(5);
/// let f = graph.computed(0, |a: &i32| a + 1);
///
/// f.watch::<0, _>(&x).unwrap();
/// assert_eq!(f.value(), 6);
///
/// x.set(10);
/// assert_eq!(f.value(), 11);
/// ```
#[derive(Clone)]
pub struct Graph {
    state: Rc<RefCell<GraphState>>,
}

impl Graph {
    /// Create a graph with the default configuration.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Create a graph with the given configuration.
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(GraphState::new(config))),
        }
    }

    /// Configuration this graph was created with.
    pub fn config(&self) -> GraphConfig {
        self.state.borrow().config().clone()
    }

    /// Create an observable cell holding `value`.
    pub fn cell<T>(&self, value: T) -> Cell<T>
    where
        T: Clone + PartialEq + 'static,
    {
        let id = self.state.borrow_mut().insert_cell(value, None);
        Cell::from_parts(self.clone(), id)
    }

    /// Create an observable cell holding `T::default()`.
    pub fn cell_default<T>(&self) -> Cell<T>
    where
        T: Clone + PartialEq + Default + 'static,
    {
        self.cell(T::default())
    }

    /// Create a computed node with an initial result and no bound inputs.
    ///
    /// The node starts clean, so reading it returns `initial` until an input
    /// changes or [`Computed::apply`] is called.
    pub fn computed<T, In, F>(&self, initial: T, compute: F) -> Computed<T, In>
    where
        T: Clone + PartialEq + 'static,
        In: Inputs,
        F: Compute<In, T>,
    {
        Computed::new(self.clone(), initial, compute)
    }

    /// Create a computed node whose initial result is `T::default()`.
    pub fn computed_default<T, In, F>(&self, compute: F) -> Computed<T, In>
    where
        T: Clone + PartialEq + Default + 'static,
        In: Inputs,
        F: Compute<In, T>,
    {
        self.computed(T::default(), compute)
    }

    /// Number of live computed nodes.
    pub fn live_nodes(&self) -> usize {
        self.state.borrow().node_count()
    }

    /// Number of live cells, including node result caches.
    pub fn live_cells(&self) -> usize {
        self.state.borrow().cell_count()
    }

    /// Number of computed nodes waiting to recompute.
    pub fn dirty_nodes(&self) -> usize {
        self.state.borrow().registry().dirty_count()
    }

    /// Whether two handles refer to the same graph.
    pub fn same_graph(&self, other: &Graph) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn state(&self) -> &RefCell<GraphState> {
        &self.state
    }

    /// Run result-change hooks queued by the last operation.
    pub(crate) fn run_pending(&self) {
        let pending = std::mem::take(&mut self.state.borrow_mut().pending);
        for hook in pending {
            hook();
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Graph").field(&*self.state.borrow()).finish()
    }
}
