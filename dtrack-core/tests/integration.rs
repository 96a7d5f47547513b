//! Integration Tests for the Dependency Graph
//!
//! These tests verify that cells, computed nodes and the slot registry work
//! together correctly.

use std::cell::Cell as Counter;
use std::rc::Rc;

use dtrack_core::reactive::{Computed, Graph};
use dtrack_core::{GraphConfig, GraphError};

/// A single-input node that counts how often its function runs.
fn counting<F>(graph: &Graph, calls: &Rc<Counter<u32>>, f: F) -> Computed<i32, (i32,)>
where
    F: Fn(i32) -> i32 + 'static,
{
    let calls = calls.clone();
    graph.computed(0, move |a: &i32| {
        calls.set(calls.get() + 1);
        f(*a)
    })
}

/// A node watching a cell follows it.
#[test]
fn node_follows_cell() {
    let graph = Graph::new();
    let x = graph.cell(5);
    let f = graph.computed(0, |a: &i32| a + 1);

    assert_eq!(f.value(), 0);

    f.watch::<0, _>(&x).unwrap();
    assert_eq!(f.value(), 6);

    x.set(10);
    assert_eq!(f.value(), 11);
}

/// An explicit apply picks up a freshly bound input.
#[test]
fn apply_after_bind() {
    let graph = Graph::new();
    let x = graph.cell(5);
    let t = graph.computed(2, |a: &i32| a + 1);

    assert_eq!(t.value(), 2);

    t.watch::<0, _>(&x).unwrap();
    t.apply();
    assert_eq!(t.value(), 6);

    x.set(10);
    assert_eq!(t.value(), 11);
}

/// Unbound slots are called with their type's default.
#[test]
fn apply_with_unbound_inputs() {
    let graph = Graph::new();
    let g = graph.computed((false, 9), |s1: &String, n: &i32, s2: &String| {
        (s1.len() == s2.len(), *n)
    });

    g.apply();
    assert_eq!(g.value().1, 0);
}

/// Writing an equal value dirties nothing and recomputes nothing.
#[test]
fn equal_write_is_ignored() {
    let graph = Graph::new();
    let calls = Rc::new(Counter::new(0));
    let x = graph.cell(3);
    let f = counting(&graph, &calls, |a| a * 2);
    f.watch::<0, _>(&x).unwrap();
    assert_eq!(f.value(), 6);

    x.set(3);
    assert!(!f.is_dirty());
    assert_eq!(f.value(), 6);
    assert_eq!(calls.get(), 1);
}

/// Reads of a clean node never call the function.
#[test]
fn repeated_reads_are_memoized() {
    let graph = Graph::new();
    let calls = Rc::new(Counter::new(0));
    let x = graph.cell(1);
    let f = counting(&graph, &calls, |a| a + 100);
    f.watch::<0, _>(&x).unwrap();

    for _ in 0..10 {
        assert_eq!(f.value(), 101);
    }
    assert_eq!(calls.get(), 1);

    x.set(2);
    for _ in 0..10 {
        assert_eq!(f.value(), 102);
    }
    assert_eq!(calls.get(), 2);
}

/// Nodes can depend on nodes; a change at the root dirties the whole chain.
#[test]
fn chain_propagates_transitively() {
    let graph = Graph::new();
    let x = graph.cell(1);
    let a = graph.computed(0, |v: &i32| v + 1);
    let b = graph.computed(0, |v: &i32| v * 2);
    let c = graph.computed(0, |v: &i32| v - 3);

    a.watch::<0, _>(&x).unwrap();
    b.watch::<0, _>(&a).unwrap();
    c.watch::<0, _>(&b).unwrap();
    assert_eq!(c.value(), 1);
    assert_eq!(graph.dirty_nodes(), 0);

    x.set(10);
    assert!(a.is_dirty());
    assert!(b.is_dirty());
    assert!(c.is_dirty());

    // Reading the tail refreshes everything upstream exactly once.
    assert_eq!(c.value(), 19);
    assert!(!a.is_dirty());
    assert!(!b.is_dirty());
    assert!(!c.is_dirty());
    assert_eq!(a.recompute_count(), 2);
    assert_eq!(b.recompute_count(), 2);
    assert_eq!(c.recompute_count(), 2);
}

/// A shared upstream node recomputes once even when read through two paths.
#[test]
fn diamond_recomputes_shared_node_once() {
    let graph = Graph::new();
    let calls = Rc::new(Counter::new(0));
    let x = graph.cell(2);
    let base = counting(&graph, &calls, |v| v * 10);
    let left = graph.computed(0, |v: &i32| v + 1);
    let right = graph.computed(0, |v: &i32| v + 2);
    let sum = graph.computed(0, |l: &i32, r: &i32| l + r);

    base.watch::<0, _>(&x).unwrap();
    left.watch::<0, _>(&base).unwrap();
    right.watch::<0, _>(&base).unwrap();
    sum.watch::<0, _>(&left).unwrap();
    sum.watch::<1, _>(&right).unwrap();

    assert_eq!(sum.value(), 43);
    assert_eq!(calls.get(), 1);

    x.set(3);
    assert_eq!(sum.value(), 63);
    assert_eq!(calls.get(), 2);
}

/// A node whose only input recomputed to an equal result keeps its cache.
#[test]
fn unchanged_intermediate_result_stops_recomputation() {
    let graph = Graph::new();
    let calls = Rc::new(Counter::new(0));
    let x = graph.cell(1);
    let tens = graph.computed(0, |v: &i32| v / 10);
    let tail = counting(&graph, &calls, |v| v + 1);

    tens.watch::<0, _>(&x).unwrap();
    tail.watch::<0, _>(&tens).unwrap();
    assert_eq!(tail.value(), 1);
    assert_eq!(calls.get(), 1);

    x.set(2);
    assert_eq!(tens.value(), 0);
    assert_eq!(tail.value(), 1);
    assert!(!tail.is_dirty());
    assert_eq!(calls.get(), 1);
    assert_eq!(graph.dirty_nodes(), 0);
}

/// Intermediate nodes may be read in any order.
#[test]
fn reading_middle_then_tail() {
    let graph = Graph::new();
    let x = graph.cell(1);
    let a = graph.computed(0, |v: &i32| v * 3);
    let b = graph.computed(0, |v: &i32| v + 1);
    a.watch::<0, _>(&x).unwrap();
    b.watch::<0, _>(&a).unwrap();
    assert_eq!(b.value(), 4);

    x.set(2);
    assert_eq!(a.value(), 6);
    assert!(b.is_dirty());
    assert_eq!(b.value(), 7);
}

/// After a rebind the old cell no longer reaches the node.
#[test]
fn rebind_isolation() {
    let graph = Graph::new();
    let old = graph.cell(1);
    let new = graph.cell(2);
    let f = graph.computed(0, |v: &i32| *v);

    f.watch::<0, _>(&old).unwrap();
    assert_eq!(f.value(), 1);
    f.watch::<0, _>(&new).unwrap();
    assert_eq!(f.value(), 2);

    old.set(50);
    assert!(!f.is_dirty());
    assert_eq!(f.value(), 2);

    new.set(60);
    assert!(f.is_dirty());
    assert_eq!(f.value(), 60);
}

/// A node built on a dropped node's position is not reached by the dropped
/// node's old inputs.
#[test]
fn reused_position_is_not_dirtied_by_stale_edges() {
    let graph = Graph::new();
    let x = graph.cell(1);

    let first = graph.computed(0, |v: &i32| *v);
    first.watch::<0, _>(&x).unwrap();
    assert_eq!(first.value(), 1);
    let position = first.position();
    drop(first);

    let second = graph.computed(7, |v: &i32| v * 100);
    assert_eq!(second.position(), position);

    x.set(2);
    assert!(!second.is_dirty());
    assert_eq!(second.value(), 7);
}

/// Several dirty nodes in one group never make a clean neighbour look dirty.
#[test]
fn dirty_bits_in_one_group_stay_independent() {
    let graph = Graph::new();
    let x = graph.cell(1);
    let y = graph.cell(1);

    let on_x: Vec<Computed<i32, (i32,)>> = (0..3).map(|_| graph.computed(0, |v: &i32| *v)).collect();
    let on_y = graph.computed(0, |v: &i32| *v);

    for node in &on_x {
        node.watch::<0, _>(&x).unwrap();
        node.value();
    }
    on_y.watch::<0, _>(&y).unwrap();
    assert_eq!(on_y.value(), 1);

    assert!(on_x
        .iter()
        .chain(std::iter::once(&on_y))
        .all(|node| node.position().group() == 0));

    x.set(2);
    assert!(on_x.iter().all(|node| node.is_dirty()));
    assert!(!on_y.is_dirty());
    assert_eq!(graph.dirty_nodes(), 3);
}

/// Positions spill into new groups and the registry shrinks again.
#[test]
fn many_nodes_span_groups() {
    let graph = Graph::new();
    let x = graph.cell(1);

    let nodes: Vec<_> = (0..150)
        .map(|i| {
            let node = graph.computed(0, move |v: &i32| v + i);
            node.watch::<0, _>(&x).unwrap();
            node
        })
        .collect();
    assert!(nodes.iter().any(|node| node.position().group() == 2));
    assert_eq!(x.watcher_count(), 150);

    x.set(10);
    assert_eq!(graph.dirty_nodes(), 150);
    assert_eq!(nodes[149].value(), 159);
    assert_eq!(graph.dirty_nodes(), 149);

    drop(nodes);
    assert_eq!(graph.live_nodes(), 0);
    assert_eq!(x.watcher_count(), 0);
    assert_eq!(graph.dirty_nodes(), 0);
}

/// Dropping a cell makes its readers fall back to the default value.
#[test]
fn dropped_input_defaults() {
    let graph = Graph::new();
    let name = graph.cell("dtrack".to_string());
    let length = graph.computed(0usize, |s: &String| s.len());
    length.watch::<0, _>(&name).unwrap();
    assert_eq!(length.value(), 6);

    drop(name);
    assert!(!length.is_bound::<0>());
    assert_eq!(length.value(), 0);
}

/// Dropping an upstream node makes its readers fall back to the default value.
#[test]
fn dropped_upstream_node_defaults() {
    let graph = Graph::new();
    let x = graph.cell(3);
    let doubled = graph.computed(0, |v: &i32| v * 2);
    let next = graph.computed(0, |v: &i32| v + 1);

    doubled.watch::<0, _>(&x).unwrap();
    next.watch::<0, _>(&doubled).unwrap();
    assert_eq!(next.value(), 7);

    drop(doubled);
    assert_eq!(graph.live_nodes(), 1);
    assert!(next.is_dirty());
    assert!(!next.is_bound::<0>());
    assert_eq!(next.value(), 1);
    assert_eq!(next.recompute_count(), 2);

    x.set(4);
    assert!(!next.is_dirty());
    assert_eq!(x.watcher_count(), 0);
}

/// Config loaded from JSON drives graph behaviour.
#[test]
fn json_config_controls_binding() {
    let config = GraphConfig::from_json(r#"{ "dirty_on_bind": false, "initial_groups": 2 }"#).unwrap();
    let graph = Graph::with_config(config.clone());
    assert_eq!(graph.config(), config);

    let x = graph.cell(5);
    let f = graph.computed(0, |v: &i32| v + 1);
    f.watch::<0, _>(&x).unwrap();
    assert!(!f.is_dirty());
    assert_eq!(f.value(), 0);
}

/// Handles from one graph cannot be wired into another.
#[test]
fn graphs_are_independent() {
    let first = Graph::new();
    let second = Graph::new();
    let x = first.cell(1);
    let f = second.computed(0, |v: &i32| *v);

    assert_eq!(f.watch::<0, _>(&x), Err(GraphError::ForeignGraph));
    assert_eq!(first.live_nodes(), 0);
    assert_eq!(second.live_nodes(), 1);
}

/// Result hooks see every distinct result in order.
#[test]
fn hooks_report_result_changes() {
    let graph = Graph::new();
    let x = graph.cell(0);
    let parity = graph.computed(false, |v: &i32| v % 2 == 1);
    parity.watch::<0, _>(&x).unwrap();

    let log = Rc::new(std::cell::RefCell::new(Vec::new()));
    let log_clone = log.clone();
    parity.set_on_result_changed(move |odd| log_clone.borrow_mut().push(*odd));

    for v in 1..=4 {
        x.set(v);
        parity.value();
    }
    assert_eq!(*log.borrow(), vec![true, false, true, false]);
}
