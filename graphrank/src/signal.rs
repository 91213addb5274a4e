/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Graph signals: dense score vectors over the node universe of one graph.

use crate::traits::{GraphId, RandomAccessGraph};

/// Division that resolves a zero denominator to zero instead of NaN/inf.
#[inline(always)]
pub fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// An ordered mapping from the nodes of one graph to numeric values.
///
/// A signal is associated with exactly one graph (recorded as its
/// [`GraphId`]); arithmetic between two signals requires identical node
/// universes and panics otherwise. Signals are replaced, not mutated in
/// place, across postprocessing stages.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSignal {
    graph_id: GraphId,
    values: Box<[f64]>,
}

impl GraphSignal {
    /// Creates an all-zero signal over the node universe of `graph`.
    pub fn zeros(graph: &impl RandomAccessGraph) -> Self {
        Self {
            graph_id: graph.id(),
            values: vec![0.0; graph.num_nodes()].into_boxed_slice(),
        }
    }

    /// Creates a signal assigning `value` to every node of `graph`.
    pub fn uniform(graph: &impl RandomAccessGraph, value: f64) -> Self {
        Self {
            graph_id: graph.id(),
            values: vec![value; graph.num_nodes()].into_boxed_slice(),
        }
    }

    /// Creates a signal from sparse `(node, value)` pairs; unlisted nodes get
    /// zero.
    ///
    /// # Panics
    ///
    /// Panics if a pair refers to a node outside the graph's node universe.
    pub fn from_pairs(graph: &impl RandomAccessGraph, pairs: &[(usize, f64)]) -> Self {
        let mut signal = Self::zeros(graph);
        let n = signal.values.len();
        for &(node, value) in pairs {
            if node >= n {
                panic!("Node {node} does not exist (the graph has {n} nodes)");
            }
            signal.values[node] = value;
        }
        signal
    }

    /// Creates a signal from a dense value slice in node order.
    ///
    /// # Panics
    ///
    /// Panics if the slice length does not match the number of nodes.
    pub fn from_values(graph: &impl RandomAccessGraph, values: impl Into<Box<[f64]>>) -> Self {
        let values = values.into();
        assert_eq!(
            values.len(),
            graph.num_nodes(),
            "Value vector length ({}) does not match the number of nodes ({})",
            values.len(),
            graph.num_nodes()
        );
        Self {
            graph_id: graph.id(),
            values,
        }
    }

    /// Creates a signal over the same node universe as `other` from sparse
    /// `(node, value)` pairs.
    ///
    /// # Panics
    ///
    /// Panics if a pair refers to a node outside the universe.
    pub fn from_pairs_like(other: &GraphSignal, pairs: &[(usize, f64)]) -> Self {
        let mut signal = Self {
            graph_id: other.graph_id,
            values: vec![0.0; other.len()].into_boxed_slice(),
        };
        for &(node, value) in pairs {
            if node >= signal.values.len() {
                panic!(
                    "Node {node} does not exist (the signal has {} nodes)",
                    signal.values.len()
                );
            }
            signal.values[node] = value;
        }
        signal
    }

    /// Returns a copy of this signal re-associated with `graph`.
    ///
    /// Used when scores computed on a derived graph (e.g. a reweighted copy)
    /// must be read back as scores of the original graph.
    ///
    /// # Panics
    ///
    /// Panics if the node universes have different sizes.
    pub fn with_graph(&self, graph: &impl RandomAccessGraph) -> Self {
        assert_eq!(
            self.values.len(),
            graph.num_nodes(),
            "Signal length ({}) does not match the number of nodes ({})",
            self.values.len(),
            graph.num_nodes()
        );
        Self {
            graph_id: graph.id(),
            values: self.values.clone(),
        }
    }

    /// Returns the identifier of the graph this signal is defined over.
    #[inline(always)]
    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    /// Returns the number of nodes in the signal's universe.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the node universe is empty.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the values in node order.
    #[inline(always)]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns the value of a node.
    #[inline(always)]
    pub fn get(&self, node: usize) -> f64 {
        self.values[node]
    }

    /// Returns the sum of all values.
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Returns the maximum value, or 0 for an empty universe.
    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::MIN, f64::max).max(0.0)
    }

    /// Returns this signal divided by its maximum value; an all-zero signal
    /// stays all-zero.
    pub fn normalized_by_max(&self) -> Self {
        let max = self.values.iter().copied().fold(0.0f64, f64::max);
        self.map(|v| safe_div(v, max))
    }

    /// Returns this signal divided by the sum of its values; an all-zero
    /// signal stays all-zero.
    pub fn normalized_by_sum(&self) -> Self {
        let sum = self.sum();
        self.map(|v| safe_div(v, sum))
    }

    /// Returns a signal over the same universe with `f` applied to every
    /// value.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            graph_id: self.graph_id,
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Iterates over `(node, value)` pairs, skipping nodes marked nonzero in
    /// the exclusion mask.
    ///
    /// The mask is itself a signal over the same universe; it filters read
    /// access only and never mutates this signal.
    pub fn iter_excluding<'a>(
        &'a self,
        exclude: Option<&'a GraphSignal>,
    ) -> impl Iterator<Item = (usize, f64)> + 'a {
        if let Some(mask) = exclude {
            self.assert_same_universe(mask);
        }
        self.values
            .iter()
            .copied()
            .enumerate()
            .filter(move |&(node, _)| exclude.is_none_or(|mask| mask.get(node) == 0.0))
    }

    fn assert_same_universe(&self, other: &GraphSignal) {
        assert_eq!(
            self.graph_id, other.graph_id,
            "Arithmetic between signals of different graphs"
        );
        debug_assert_eq!(self.values.len(), other.values.len());
    }

    /// Combines two signals over the same universe elementwise.
    pub fn zip_with(&self, other: &GraphSignal, f: impl Fn(f64, f64) -> f64) -> Self {
        self.assert_same_universe(other);
        Self {
            graph_id: self.graph_id,
            values: self
                .values
                .iter()
                .zip(other.values.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }
}

impl core::ops::Add<&GraphSignal> for &GraphSignal {
    type Output = GraphSignal;

    fn add(self, other: &GraphSignal) -> GraphSignal {
        self.zip_with(other, |a, b| a + b)
    }
}

impl core::ops::Sub<&GraphSignal> for &GraphSignal {
    type Output = GraphSignal;

    fn sub(self, other: &GraphSignal) -> GraphSignal {
        self.zip_with(other, |a, b| a - b)
    }
}

/// Elementwise product.
impl core::ops::Mul<&GraphSignal> for &GraphSignal {
    type Output = GraphSignal;

    fn mul(self, other: &GraphSignal) -> GraphSignal {
        self.zip_with(other, |a, b| a * b)
    }
}

impl core::ops::Mul<f64> for &GraphSignal {
    type Output = GraphSignal;

    fn mul(self, scalar: f64) -> GraphSignal {
        self.map(|v| v * scalar)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graphs::vec_graph::VecGraph;

    #[test]
    fn test_sparse_construction() {
        let g = VecGraph::from_edges([(0, 1), (1, 2), (2, 3)]);
        let s = GraphSignal::from_pairs(&g, &[(0, 1.0), (2, 0.5)]);
        assert_eq!(s.values(), &[1.0, 0.0, 0.5, 0.0]);
        assert_eq!(s.sum(), 1.5);
        assert_eq!(s.max(), 1.0);
    }

    #[test]
    fn test_arithmetic() {
        let g = VecGraph::from_edges([(0, 1), (1, 2)]);
        let a = GraphSignal::from_pairs(&g, &[(0, 1.0), (1, 2.0)]);
        let b = GraphSignal::from_pairs(&g, &[(1, 3.0), (2, 1.0)]);
        assert_eq!((&a + &b).values(), &[1.0, 5.0, 1.0]);
        assert_eq!((&a - &b).values(), &[1.0, -1.0, -1.0]);
        assert_eq!((&a * &b).values(), &[0.0, 6.0, 0.0]);
        assert_eq!((&a * 2.0).values(), &[2.0, 4.0, 0.0]);
    }

    #[test]
    #[should_panic]
    fn test_cross_graph_arithmetic_panics() {
        let g = VecGraph::from_edges([(0, 1)]);
        let h = VecGraph::from_edges([(0, 1)]);
        let a = GraphSignal::uniform(&g, 1.0);
        let b = GraphSignal::uniform(&h, 1.0);
        let _ = &a + &b;
    }

    #[test]
    fn test_safe_normalization_of_zero_signal() {
        let g = VecGraph::from_edges([(0, 1)]);
        let z = GraphSignal::zeros(&g);
        assert_eq!(z.normalized_by_max().values(), &[0.0, 0.0]);
        assert_eq!(z.normalized_by_sum().values(), &[0.0, 0.0]);
    }

    #[test]
    fn test_exclusion_mask_filters_reads_only() {
        let g = VecGraph::from_edges([(0, 1), (1, 2)]);
        let s = GraphSignal::from_values(&g, vec![1.0, 2.0, 3.0]);
        let mask = GraphSignal::from_pairs(&g, &[(1, 1.0)]);
        let visible: Vec<_> = s.iter_excluding(Some(&mask)).collect();
        assert_eq!(visible, vec![(0, 1.0), (2, 3.0)]);
        // the underlying signal is untouched
        assert_eq!(s.values(), &[1.0, 2.0, 3.0]);
    }
}
