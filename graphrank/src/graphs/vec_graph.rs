/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::traits::{GraphId, RandomAccessGraph};

/// A weighted arc, stored as a pair (target, weight).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct WeightedArc(usize, f64);

impl From<(usize, f64)> for WeightedArc {
    fn from((v, w): (usize, f64)) -> Self {
        Self(v, w)
    }
}

impl From<WeightedArc> for (usize, f64) {
    fn from(value: WeightedArc) -> (usize, f64) {
        (value.0, value.1)
    }
}

/// A mutable [`RandomAccessGraph`] implementation based on a vector of
/// vectors of weighted arcs.
///
/// Arcs can be added only in increasing successor order for each source node;
/// [`add_arcs`](Self::add_arcs) sorts its input to satisfy this constraint.
///
/// Every graph (including copies, see [`copy`](Self::copy)) has a distinct
/// [`GraphId`], which operator and reweighting caches use as key.
#[derive(Debug)]
pub struct VecGraph {
    id: GraphId,
    /// The number of arcs in the graph.
    num_arcs: u64,
    /// For each node, its list of successors.
    succ: Vec<Vec<WeightedArc>>,
}

impl Default for VecGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloning produces a graph with the same structure but a fresh [`GraphId`]:
/// caches keyed by the original graph never apply to the clone.
impl Clone for VecGraph {
    fn clone(&self) -> Self {
        Self {
            id: GraphId::fresh(),
            num_arcs: self.num_arcs,
            succ: self.succ.clone(),
        }
    }
}

impl VecGraph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self {
            id: GraphId::fresh(),
            num_arcs: 0,
            succ: vec![],
        }
    }

    /// Creates a new empty graph with `n` nodes.
    pub fn empty(n: usize) -> Self {
        Self {
            id: GraphId::fresh(),
            num_arcs: 0,
            succ: Vec::from_iter((0..n).map(|_| Vec::new())),
        }
    }

    /// Adds an isolated node to the graph and returns true if it is a new node.
    pub fn add_node(&mut self, node: usize) -> bool {
        let len = self.succ.len();
        self.succ.extend((len..=node).map(|_| Vec::new()));
        len <= node
    }

    /// Adds a weighted arc to the graph.
    ///
    /// New arcs must be added in increasing successor order, or this method
    /// will panic.
    ///
    /// # Panics
    ///
    /// This method will panic:
    /// - if one of the given nodes is greater or equal than the number of nodes
    ///   in the graph;
    /// - if the successor is lesser than or equal to the current last successor
    ///   of the source node.
    pub fn add_arc(&mut self, u: usize, v: usize, w: f64) {
        let max = u.max(v);
        if max >= self.succ.len() {
            panic!(
                "Node {} does not exist (the graph has {} nodes)",
                max,
                self.succ.len(),
            );
        }
        let succ = &mut self.succ[u];

        match succ.last() {
            None => {
                succ.push((v, w).into());
                self.num_arcs += 1;
            }
            Some(WeightedArc(last, _weight)) => {
                if v <= *last {
                    // arcs have to be inserted in increasing successor order
                    panic!(
                        "Error adding arc ({u}, {v}): successor is not increasing; the last arc inserted was ({u}, {last})"
                    );
                }
                succ.push((v, w).into());
                self.num_arcs += 1;
            }
        }
    }

    /// Adds weighted arcs from an [`IntoIterator`], adding new nodes as needed.
    ///
    /// The items must be pairs of the form `((usize, usize), w)` specifying an
    /// arc and its weight.
    pub fn add_arcs(&mut self, arcs: impl IntoIterator<Item = ((usize, usize), f64)>) {
        let mut arcs = arcs.into_iter().collect::<Vec<_>>();
        arcs.sort_by(|x, y| x.0.cmp(&y.0));
        for ((u, v), w) in arcs {
            self.add_node(u);
            self.add_node(v);
            self.add_arc(u, v, w);
        }
    }

    /// Creates a new graph from an [`IntoIterator`] of weighted arcs.
    pub fn from_arcs(arcs: impl IntoIterator<Item = ((usize, usize), f64)>) -> Self {
        let mut g = Self::new();
        g.add_arcs(arcs);
        g
    }

    /// Creates a new graph from an [`IntoIterator`] of undirected edges.
    ///
    /// Every edge `(u, v)` is added as the two arcs `(u, v)` and `(v, u)`,
    /// both with weight 1.
    pub fn from_edges(edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut g = Self::new();
        g.add_arcs(
            edges
                .into_iter()
                .flat_map(|(u, v)| [((u, v), 1.0), ((v, u), 1.0)]),
        );
        g
    }

    /// Returns a structural copy of this graph with a fresh [`GraphId`].
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Shrinks the capacity of the graph to fit its current size.
    pub fn shrink_to_fit(&mut self) {
        self.succ.shrink_to_fit();
        for s in self.succ.iter_mut() {
            s.shrink_to_fit();
        }
    }
}

impl RandomAccessGraph for VecGraph {
    type Successors<'succ> = core::iter::Map<
        core::iter::Copied<core::slice::Iter<'succ, WeightedArc>>,
        fn(WeightedArc) -> (usize, f64),
    >;

    #[inline(always)]
    fn id(&self) -> GraphId {
        self.id
    }

    #[inline(always)]
    fn num_nodes(&self) -> usize {
        self.succ.len()
    }

    #[inline(always)]
    fn num_arcs(&self) -> u64 {
        self.num_arcs
    }

    #[inline(always)]
    fn outdegree(&self, node: usize) -> usize {
        self.succ[node].len()
    }

    #[inline(always)]
    fn successors(&self, node: usize) -> Self::Successors<'_> {
        self.succ[node].iter().copied().map(Into::into)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_vec_graph() {
        let g = VecGraph::from_arcs([
            ((0, 1), 1.0),
            ((0, 2), 0.5),
            ((1, 2), 2.0),
            ((2, 4), 1.0),
            ((3, 4), 1.0),
        ]);
        assert_eq!(g.num_nodes(), 5);
        assert_eq!(g.num_arcs(), 5);
        assert_eq!(g.outdegree(0), 2);
        assert_eq!(g.successors(0).collect::<Vec<_>>(), vec![(1, 1.0), (2, 0.5)]);
        assert!(g.has_arc(1, 2));
        assert!(!g.has_arc(2, 1));
        assert_eq!(g.weighted_outdegree(0), 1.5);
    }

    #[test]
    fn test_copy_gets_fresh_id() {
        let g = VecGraph::from_edges([(0, 1), (1, 2)]);
        let h = g.copy();
        assert_ne!(g.id(), h.id());
        assert_eq!(g.num_nodes(), h.num_nodes());
        assert_eq!(g.num_arcs(), h.num_arcs());
    }

    #[test]
    fn test_from_edges_is_symmetric() {
        let g = VecGraph::from_edges([(0, 1), (0, 2)]);
        assert!(g.has_arc(0, 1) && g.has_arc(1, 0));
        assert!(g.has_arc(0, 2) && g.has_arc(2, 0));
        assert_eq!(g.num_arcs(), 4);
    }

    #[test]
    #[should_panic]
    fn test_decreasing_successor_panics() {
        let mut g = VecGraph::empty(3);
        g.add_arc(0, 2, 1.0);
        g.add_arc(0, 1, 1.0);
    }
}
