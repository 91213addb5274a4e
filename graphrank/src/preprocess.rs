/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Normalized sparse operators derived from graphs, and their cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::signal::safe_div;
use crate::traits::{GraphId, RandomAccessGraph};

/// The rule used to scale the adjacency operator before iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Normalization {
    /// Column-stochastic scaling: each node's outgoing weights sum to one, so
    /// scores flow along arcs. This is the PageRank-style normalization.
    #[default]
    Column,
    /// Row scaling: each node averages the scores of its successors.
    Row,
    /// Symmetric scaling by inverse square roots of weighted degrees.
    Symmetric,
    /// [`Symmetric`](Normalization::Symmetric) for graphs whose arcs all have
    /// a reciprocal, [`Column`](Normalization::Column) otherwise.
    Auto,
}

impl std::fmt::Display for Normalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Normalization::Column => f.write_str("column"),
            Normalization::Row => f.write_str("row"),
            Normalization::Symmetric => f.write_str("symmetric"),
            Normalization::Auto => f.write_str("auto"),
        }
    }
}

/// A square sparse matrix in Compressed Sparse Row form.
///
/// Row `i` lists the coefficients of the linear combination producing
/// component `i` of [`mul_vec`](Self::mul_vec). Rows are stored as parallel
/// column/value slices delimited by an offsets vector whose first entry is
/// always zero.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    n: usize,
    offsets: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
}

impl CsrMatrix {
    /// Builds an `n`×`n` matrix from `(row, col, value)` triples.
    ///
    /// Triples are sorted internally; duplicate coordinates are summed.
    pub fn from_triples(n: usize, mut triples: Vec<(usize, usize, f64)>) -> Self {
        triples.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        let mut offsets = Vec::with_capacity(n + 1);
        offsets.push(0);
        let mut cols = Vec::with_capacity(triples.len());
        let mut vals = Vec::with_capacity(triples.len());
        let mut iter = triples.into_iter().peekable();
        for row in 0..n {
            while let Some(&(r, c, v)) = iter.peek() {
                if r != row {
                    break;
                }
                iter.next();
                if cols.len() > offsets[row] && *cols.last().unwrap() == c {
                    *vals.last_mut().unwrap() += v;
                } else {
                    cols.push(c);
                    vals.push(v);
                }
            }
            offsets.push(cols.len());
        }
        Self {
            n,
            offsets,
            cols,
            vals,
        }
    }

    /// Returns the number of rows (and columns).
    pub fn num_rows(&self) -> usize {
        self.n
    }

    /// Returns the number of stored entries.
    pub fn num_entries(&self) -> usize {
        self.vals.len()
    }

    /// Iterates over the `(col, value)` entries of a row.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let start = self.offsets[row];
        let end = self.offsets[row + 1];
        self.cols[start..end]
            .iter()
            .copied()
            .zip(self.vals[start..end].iter().copied())
    }

    /// Sparse matrix–vector multiply: `out = M x`.
    ///
    /// Entries are accumulated in a fixed order, so repeated calls on the
    /// same inputs are bit-identical.
    ///
    /// # Panics
    ///
    /// Panics if `x` or `out` have a length different from the matrix order.
    pub fn mul_vec(&self, x: &[f64], out: &mut [f64]) {
        assert_eq!(x.len(), self.n);
        assert_eq!(out.len(), self.n);
        for row in 0..self.n {
            let start = self.offsets[row];
            let end = self.offsets[row + 1];
            let mut sum = 0.0;
            for (&col, &val) in self.cols[start..end].iter().zip(&self.vals[start..end]) {
                sum += val * x[col];
            }
            out[row] = sum;
        }
    }
}

/// Builds normalized operators from graphs and caches them.
///
/// The cache is owned by the preprocessor (not process-global) and is keyed
/// by `(GraphId, Normalization)`. Entries are never invalidated
/// automatically: callers enabling
/// [`assume_immutability`](Self::assume_immutability) are responsible for not
/// mutating a graph after its first normalization, or for calling
/// [`invalidate`](Self::invalidate)/[`clear`](Self::clear) explicitly.
#[derive(Debug, Default)]
pub struct Preprocessor {
    normalization: Normalization,
    assume_immutability: bool,
    cache: RefCell<HashMap<(GraphId, Normalization), Rc<CsrMatrix>>>,
}

impl Preprocessor {
    /// Creates a preprocessor with the given normalization and caching
    /// disabled.
    pub fn new(normalization: Normalization) -> Self {
        Self {
            normalization,
            assume_immutability: false,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Enables or disables the operator cache.
    pub fn assume_immutability(mut self, value: bool) -> Self {
        self.assume_immutability = value;
        self
    }

    /// Returns the configured normalization.
    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    /// Returns the normalized operator for `graph`, building it on a cache
    /// miss.
    pub fn operator(&self, graph: &impl RandomAccessGraph) -> Rc<CsrMatrix> {
        if !self.assume_immutability {
            return Rc::new(self.build(graph));
        }
        let key = (graph.id(), self.normalization);
        if let Some(op) = self.cache.borrow().get(&key) {
            return op.clone();
        }
        log::debug!(
            "Normalizing graph {:?} ({} normalization, {} nodes)...",
            graph.id(),
            self.normalization,
            graph.num_nodes()
        );
        let op = Rc::new(self.build(graph));
        self.cache.borrow_mut().insert(key, op.clone());
        op
    }

    /// Drops the cached operators for one graph.
    pub fn invalidate(&self, id: GraphId) {
        self.cache.borrow_mut().retain(|(gid, _), _| *gid != id);
    }

    /// Drops all cached operators.
    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
    }

    fn build(&self, graph: &impl RandomAccessGraph) -> CsrMatrix {
        let n = graph.num_nodes();
        let normalization = match self.normalization {
            Normalization::Auto => {
                if is_symmetric(graph) {
                    Normalization::Symmetric
                } else {
                    Normalization::Column
                }
            }
            other => other,
        };
        let degrees: Vec<f64> = (0..n).map(|v| graph.weighted_outdegree(v)).collect();
        let mut triples = Vec::with_capacity(graph.num_arcs() as usize);
        for u in 0..n {
            for (v, w) in graph.successors(u) {
                // Entry (row, col) scales x[col] into out[row].
                let (row, col, val) = match normalization {
                    Normalization::Column => (v, u, safe_div(w, degrees[u])),
                    Normalization::Row => (u, v, safe_div(w, degrees[u])),
                    Normalization::Symmetric => {
                        (v, u, safe_div(w, (degrees[u] * degrees[v]).sqrt()))
                    }
                    Normalization::Auto => unreachable!(),
                };
                triples.push((row, col, val));
            }
        }
        CsrMatrix::from_triples(n, triples)
    }
}

/// Returns whether every arc has a reciprocal.
///
/// This is a linear scan per arc, so it is only run when building an operator
/// with [`Normalization::Auto`].
fn is_symmetric(graph: &impl RandomAccessGraph) -> bool {
    for u in 0..graph.num_nodes() {
        for (v, _) in graph.successors(u) {
            if !graph.has_arc(v, u) {
                return false;
            }
        }
    }
    true
}
