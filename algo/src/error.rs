/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Error types shared by filters, postprocessors and optimizers.

use graphrank::traits::GraphId;
use thiserror::Error;

/// Errors raised by graph filters and postprocessors.
///
/// Configuration and input-validation errors surface at the call boundary,
/// before any iteration; [`NotConverged`](FilterError::NotConverged) is a
/// distinct, user-actionable condition that is never retried internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    /// The stopping rule exhausted its iteration budget without reaching
    /// tolerance.
    #[error("Could not converge within {iterations} iterations")]
    NotConverged { iterations: usize },

    /// A personalization signal was built over a different graph's node
    /// universe.
    #[error("Signal is defined over graph {signal:?}, not over graph {graph:?}")]
    GraphMismatch { graph: GraphId, signal: GraphId },

    /// A dense personalization vector has the wrong length for the graph.
    #[error("Personalization length ({actual}) does not match the number of nodes ({expected})")]
    LengthMismatch { expected: usize, actual: usize },

    /// A sparse personalization pair refers to a node outside the universe.
    #[error("Node {node} does not exist (the graph has {num_nodes} nodes)")]
    InvalidNode { node: usize, num_nodes: usize },

    /// `transform` was called on a postprocessor wrapping a non-identity
    /// ranker.
    #[error("transform only makes sense with an identity base ranker; use rank instead")]
    TransformWithBaseRanker,

    /// The postprocessor cannot transform signals at all.
    #[error("{0} cannot transform graph signals; use rank instead")]
    UnsupportedTransform(&'static str),

    /// An inner parameter search failed.
    #[error(transparent)]
    Optimize(#[from] OptimizeError),
}

/// Configuration errors of the black-box optimizer.
///
/// All of these are detected during input validation, before the loss is
/// evaluated even once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptimizeError {
    /// `min_vals` and `max_vals` have different lengths, are empty, or
    /// violate `min <= max` somewhere.
    #[error("Invalid parameter bounds: {0}")]
    InvalidBounds(String),

    /// A strategy knob has a value the strategy cannot work with.
    #[error("Invalid optimizer configuration: {0}")]
    InvalidConfig(String),
}
