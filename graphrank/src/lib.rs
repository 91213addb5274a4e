/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Graph signals and normalized sparse operators for seed-based node ranking.
//!
//! This crate provides the representation layer of the graphrank framework:
//!
//! - [graph access traits](crate::traits) and a mutable in-memory
//!   [`VecGraph`](crate::graphs::vec_graph::VecGraph) implementation;
//! - [`GraphSignal`](crate::signal::GraphSignal), a dense vector of scores
//!   over the node universe of a specific graph;
//! - a [`Preprocessor`](crate::preprocess::Preprocessor) that derives a
//!   normalized sparse operator from a graph and caches it under an
//!   assume-immutability contract.
//!
//! The actual ranking algorithms (graph filters, postprocessors, tuners)
//! live in the companion `graphrank-algo` crate.

pub mod graphs;
pub mod preprocess;
pub mod signal;
pub mod traits;

pub mod prelude {
    pub use crate::graphs::vec_graph::VecGraph;
    pub use crate::preprocess::{CsrMatrix, Normalization, Preprocessor};
    pub use crate::signal::{safe_div, GraphSignal};
    pub use crate::traits::{GraphId, RandomAccessGraph};
}
