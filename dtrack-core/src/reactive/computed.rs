//! Computed Node
//!
//! A computed node is a cached derived value over a typed tuple of inputs.
//! It re-evaluates only when one of its inputs changed.
//!
//! # How Computed Nodes Work
//!
//! 1. On creation the node allocates a registry position and stores its
//!    initial result in a cell of its own. It starts clean.
//!
//! 2. Binding input `I` to a cell (or to another node's result cell)
//!    registers the node's position as a watcher of that cell.
//!
//! 3. When a watched cell changes, the node's dirty bit is set, and so is
//!    the dirty bit of every node downstream of it.
//!
//! 4. On the next read, a dirty node first brings its upstream nodes up to
//!    date. If none of the cells it reads actually changed, it keeps its
//!    cached result. Otherwise it pulls its inputs, runs its function and
//!    stores the result into its result cell. Either way the dirty bit is
//!    cleared.
//!
//! Any number of upstream changes between two reads cost one recomputation,
//! and an upstream node that recomputes to an equal result costs none.
//!
//! # Unbound and Destroyed Inputs
//!
//! Nodes never keep their inputs alive. An input slot that was never bound,
//! or whose cell has since been destroyed, reads as its type's default.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::debug;

use super::cell::{Cell, Source};
use super::inputs::{Compute, InputAt, Inputs};
use super::runtime::{CellId, Graph, GraphState, Recompute};
use crate::error::{GraphError, Result};
use crate::graph::Position;

/// Callback invoked with the new result after a recomputation changed it.
type Hook<T> = Rc<RefCell<Option<Box<dyn FnMut(&T)>>>>;

/// The typed half of a node: its function and its result hook.
struct Kernel<T: 'static, In, F> {
    compute: F,
    hook: Hook<T>,
    _marker: PhantomData<fn(In) -> T>,
}

impl<T, In, F> Recompute for Kernel<T, In, F>
where
    T: Clone + PartialEq + 'static,
    In: Inputs,
    F: Compute<In, T>,
{
    fn recompute(&self, state: &mut GraphState, output: CellId, inputs: &[Option<CellId>]) {
        let args = In::pull(state, inputs);
        let result = self.compute.compute(&args);

        let notify = self.hook.borrow().is_some().then(|| result.clone());
        if state.write(output, result) {
            if let Some(value) = notify {
                let hook = Rc::clone(&self.hook);
                state.queue_hook(Box::new(move || fire(&hook, &value)));
            }
        }
    }
}

/// Run a hook without holding its borrow, so the hook may replace itself.
fn fire<T>(hook: &Hook<T>, value: &T) {
    let taken = hook.borrow_mut().take();
    if let Some(mut callback) = taken {
        callback(value);
        let mut slot = hook.borrow_mut();
        if slot.is_none() {
            *slot = Some(callback);
        }
    }
}

/// A cached derived value that recomputes only when its inputs change.
///
/// # Type Parameters
///
/// - `T`: The result type. `PartialEq` lets an unchanged result stop
///   invalidation from spreading further.
/// - `In`: Tuple of input types, e.g. `(String, i32)`.
///
/// # Example
///
/// ```rust
/// use dtrack_core::reactive::Graph;
///
/// let graph = Graph::new();
/// let width = graph.cell(3);
/// let height = graph.cell(4);
/// let area = graph.computed(0, |w: &i32, h: &i32| w * h);
///
/// area.watch::<0, _>(&width).unwrap();
/// area.watch::<1, _>(&height).unwrap();
/// assert_eq!(area.value(), 12);
/// ```
pub struct Computed<T: 'static, In> {
    graph: Graph,

    /// Registry position; identifies this node's dirty bit.
    position: Position,

    /// Result cache, itself observable so other nodes can depend on it.
    output: Cell<T>,

    hook: Hook<T>,

    _inputs: PhantomData<fn(In)>,
}

impl<T, In> Computed<T, In>
where
    T: Clone + PartialEq + 'static,
    In: Inputs,
{
    pub(crate) fn new<F>(graph: Graph, initial: T, compute: F) -> Self
    where
        F: Compute<In, T>,
    {
        let hook: Hook<T> = Rc::new(RefCell::new(None));
        let (position, output) = {
            let mut state = graph.state().borrow_mut();
            let position = state.allocate();
            let output = state.insert_cell(initial, Some(position));
            let kernel = Rc::new(Kernel {
                compute,
                hook: Rc::clone(&hook),
                _marker: PhantomData,
            });
            state.insert_node(position, output, In::ARITY, kernel);
            (position, output)
        };
        debug!(%position, arity = In::ARITY, "created computed node");

        Self {
            output: Cell::from_parts(graph.clone(), output),
            graph,
            position,
            hook,
            _inputs: PhantomData,
        }
    }

    /// Registry position of this node.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Graph this node belongs to.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The result cell.
    ///
    /// Other nodes watch this cell to depend on this node. Writing to it
    /// directly is overwritten by the next recomputation.
    pub fn output(&self) -> &Cell<T> {
        &self.output
    }

    /// Get the result, recomputing first if the node is dirty.
    pub fn value(&self) -> T {
        self.graph.state().borrow_mut().refresh(self.position);
        self.graph.run_pending();
        self.output.value()
    }

    /// Recompute now, whether or not the node is dirty.
    pub fn apply(&self) {
        self.graph.state().borrow_mut().apply(self.position);
        self.graph.run_pending();
    }

    /// Whether the next read has to check the inputs, and recompute if one
    /// of them changed.
    pub fn is_dirty(&self) -> bool {
        self.graph.state().borrow().registry().is_dirty(self.position)
    }

    /// Number of times the function has run.
    pub fn recompute_count(&self) -> u64 {
        self.graph.state().borrow().recompute_count(self.position)
    }

    /// Bind input `I` to `source`, a cell or another computed node.
    ///
    /// The cell previously bound to `I` stops being watched (unless another
    /// input of this node still reads it).
    pub fn watch<const I: usize, S>(&self, source: &S) -> Result<()>
    where
        In: InputAt<I>,
        S: Source<<In as InputAt<I>>::Value>,
    {
        let cell = source.as_cell();
        if !self.graph.same_graph(cell.graph()) {
            return Err(GraphError::ForeignGraph);
        }
        self.graph
            .state()
            .borrow_mut()
            .bind(self.position, I, Some(cell.id()))
    }

    /// Clear input `I`. It reads as its default until bound again.
    pub fn unbind<const I: usize>(&self) -> Result<()>
    where
        In: InputAt<I>,
    {
        self.graph.state().borrow_mut().bind(self.position, I, None)
    }

    /// Whether input `I` is bound to a live cell.
    pub fn is_bound<const I: usize>(&self) -> bool
    where
        In: InputAt<I>,
    {
        self.graph.state().borrow().input(self.position, I).is_some()
    }

    /// Call `hook` with the new result whenever a recomputation changes it.
    ///
    /// The hook runs after the graph is released, so it may read or write
    /// cells and nodes.
    pub fn set_on_result_changed(&self, hook: impl FnMut(&T) + 'static) {
        *self.hook.borrow_mut() = Some(Box::new(hook));
    }

    /// Remove the result hook.
    pub fn clear_on_result_changed(&self) {
        self.hook.borrow_mut().take();
    }
}

impl<T: 'static, In> Drop for Computed<T, In> {
    fn drop(&mut self) {
        let removed = self.graph.state().borrow_mut().remove_node(self.position);
        if removed.is_some() {
            debug!(position = %self.position, "dropped computed node");
        }
        drop(removed);
    }
}

impl<T, In> Source<T> for Computed<T, In>
where
    T: Clone + PartialEq + 'static,
{
    fn as_cell(&self) -> &Cell<T> {
        &self.output
    }
}

impl<T, In> Debug for Computed<T, In>
where
    T: Clone + PartialEq + Debug + 'static,
    In: Inputs,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("position", &self.position)
            .field("dirty", &self.is_dirty())
            .field("cached", &self.output.value())
            .field("recompute_count", &self.recompute_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
