/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::sync::atomic::{AtomicU64, Ordering};

/// A process-unique graph identifier.
///
/// Normalized-operator and reweighted-graph caches are keyed by this value
/// rather than by object identity: every graph receives a fresh identifier at
/// construction, and copies receive a fresh one too, so a cache entry can
/// never be confused with a different graph that happens to live at the same
/// address.
///
/// The identifier says nothing about the graph's *contents*: callers that
/// cache by `GraphId` under an assume-immutability contract are responsible
/// for not mutating the graph afterwards, or for clearing the cache
/// explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(u64);

impl GraphId {
    /// Returns a fresh, never-before-issued identifier.
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        GraphId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A weighted graph providing random access to successor lists.
///
/// Successors are returned as `(node, weight)` pairs. Ranking algorithms
/// treat the node universe as the interval `0..num_nodes()`, in the graph's
/// stable node order.
pub trait RandomAccessGraph {
    /// The type of the iterator over the successors of a node.
    type Successors<'succ>: Iterator<Item = (usize, f64)>
    where
        Self: 'succ;

    /// Returns the identifier of this graph (see [`GraphId`]).
    fn id(&self) -> GraphId;

    /// Returns the number of nodes in the graph.
    fn num_nodes(&self) -> usize;

    /// Returns the number of arcs in the graph.
    fn num_arcs(&self) -> u64;

    /// Returns the number of successors of a node.
    fn outdegree(&self, node: usize) -> usize;

    /// Returns the successors of a node with their weights.
    fn successors(&self, node: usize) -> Self::Successors<'_>;

    /// Returns the sum of the weights of the arcs leaving a node.
    fn weighted_outdegree(&self, node: usize) -> f64 {
        self.successors(node).map(|(_, w)| w).sum()
    }

    /// Returns whether there is an arc going from `src` to `dst`.
    ///
    /// Note that the default implementation performs a linear scan.
    fn has_arc(&self, src: usize, dst: usize) -> bool {
        for (succ, _) in self.successors(src) {
            if succ == dst {
                return true;
            }
        }
        false
    }
}
