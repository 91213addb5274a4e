/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Composable rank postprocessors.
//!
//! A postprocessor wraps a base [`NodeRanking`] (another filter or
//! postprocessor) and transforms its output signal, so stages chain into
//! arbitrary pipelines. Every postprocessor offers two entry points:
//!
//! - `rank(graph, personalization)`: delegate to the wrapped ranker, then
//!   transform its output;
//! - `transform(ranks)`: pure function on an already-computed signal. This
//!   is legal only when nothing is wrapped (the identity base); calling it
//!   on a wrapping postprocessor fails with
//!   [`FilterError::TransformWithBaseRanker`], directing the caller to
//!   `rank` instead.
//!
//! Fairness-aware postprocessors live in the [`fairness`] submodule.

pub mod fairness;

use graphrank::graphs::vec_graph::VecGraph;
use graphrank::signal::{safe_div, GraphSignal};
use graphrank::traits::RandomAccessGraph;

use crate::error::FilterError;
use crate::filters::{NodeRanking, Personalization};

/// Resolves the optional base ranker: delegate if present, otherwise the
/// personalization itself is the result.
fn delegate(
    ranker: &mut Option<Box<dyn NodeRanking>>,
    graph: &VecGraph,
    personalization: Personalization,
) -> Result<GraphSignal, FilterError> {
    match ranker {
        Some(ranker) => ranker.rank(graph, personalization),
        None => personalization.to_signal(graph),
    }
}

/// The identity ranker: returns the personalization unchanged.
///
/// Serves as a baseline against which to compare actual ranking pipelines.
pub struct Tautology;

impl NodeRanking for Tautology {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        personalization.to_signal(graph)
    }
}

/// How [`Normalize`] rescales scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizeMode {
    /// Divide by the maximum score.
    #[default]
    Max,
    /// Divide by the sum of scores.
    Sum,
}

/// Rescales scores by their maximum or sum.
///
/// An all-zero signal stays all-zero (safe division), and the
/// transformation is idempotent: rescaled scores already have maximum (or
/// sum) one.
pub struct Normalize {
    ranker: Option<Box<dyn NodeRanking>>,
    mode: NormalizeMode,
}

impl Normalize {
    /// Creates an identity-based normalizer, usable via
    /// [`transform`](Self::transform).
    pub fn new(mode: NormalizeMode) -> Self {
        Self { ranker: None, mode }
    }

    /// Creates a normalizer postprocessing the output of `ranker`.
    pub fn wrapping(ranker: Box<dyn NodeRanking>, mode: NormalizeMode) -> Self {
        Self {
            ranker: Some(ranker),
            mode,
        }
    }

    /// Transforms an already-computed signal.
    ///
    /// Only legal for the identity base; wrapping normalizers must be
    /// invoked through [`rank`](NodeRanking::rank).
    pub fn transform(&self, ranks: &GraphSignal) -> Result<GraphSignal, FilterError> {
        if self.ranker.is_some() {
            return Err(FilterError::TransformWithBaseRanker);
        }
        Ok(self.apply(ranks))
    }

    fn apply(&self, ranks: &GraphSignal) -> GraphSignal {
        match self.mode {
            NormalizeMode::Max => ranks.normalized_by_max(),
            NormalizeMode::Sum => ranks.normalized_by_sum(),
        }
    }
}

impl NodeRanking for Normalize {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        let ranks = delegate(&mut self.ranker, graph, personalization)?;
        Ok(self.apply(&ranks))
    }
}

/// Replaces scores with their rank position: 1 for the highest score, 2 for
/// the second highest, and so on, ties broken by stable node order.
pub struct Ordinals {
    ranker: Option<Box<dyn NodeRanking>>,
}

impl Default for Ordinals {
    fn default() -> Self {
        Self::new()
    }
}

impl Ordinals {
    /// Creates an identity-based ordinal converter.
    pub fn new() -> Self {
        Self { ranker: None }
    }

    /// Creates an ordinal converter postprocessing the output of `ranker`.
    pub fn wrapping(ranker: Box<dyn NodeRanking>) -> Self {
        Self {
            ranker: Some(ranker),
        }
    }

    /// Transforms an already-computed signal.
    ///
    /// Only legal for the identity base.
    pub fn transform(&self, ranks: &GraphSignal) -> Result<GraphSignal, FilterError> {
        if self.ranker.is_some() {
            return Err(FilterError::TransformWithBaseRanker);
        }
        Ok(Self::apply(ranks))
    }

    fn apply(ranks: &GraphSignal) -> GraphSignal {
        let values = ranks.values();
        let mut order: Vec<usize> = (0..values.len()).collect();
        // stable sort: equal scores keep their node order
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
        let pairs: Vec<(usize, f64)> = order
            .iter()
            .enumerate()
            .map(|(position, &node)| (node, (position + 1) as f64))
            .collect();
        GraphSignal::from_pairs_like(ranks, &pairs)
    }
}

impl NodeRanking for Ordinals {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        let ranks = delegate(&mut self.ranker, graph, personalization)?;
        Ok(Self::apply(&ranks))
    }
}

/// The cutoff rule used by [`Threshold`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cutoff {
    /// Scores at least this value become 1, the rest 0.
    Fixed(f64),
    /// Automatic cutoff: scores are divided by weighted node degree, sorted
    /// descending, and the threshold is placed at the point of maximum
    /// relative consecutive drop.
    Gap,
}

/// Binarizes scores at a fixed or automatically detected cutoff.
///
/// The gap heuristic needs node degrees, so the graph is an explicit input
/// of [`transform`](Self::transform) rather than state captured at some
/// earlier call.
pub struct Threshold {
    ranker: Option<Box<dyn NodeRanking>>,
    cutoff: Cutoff,
}

impl Threshold {
    /// Creates an identity-based thresholder.
    pub fn new(cutoff: Cutoff) -> Self {
        Self {
            ranker: None,
            cutoff,
        }
    }

    /// Creates a thresholder postprocessing the output of `ranker`.
    pub fn wrapping(ranker: Box<dyn NodeRanking>, cutoff: Cutoff) -> Self {
        Self {
            ranker: Some(ranker),
            cutoff,
        }
    }

    /// Transforms an already-computed signal over `graph`.
    ///
    /// Only legal for the identity base. Fails with
    /// [`FilterError::GraphMismatch`] if the signal does not belong to
    /// `graph`.
    pub fn transform(
        &self,
        graph: &VecGraph,
        ranks: &GraphSignal,
    ) -> Result<GraphSignal, FilterError> {
        if self.ranker.is_some() {
            return Err(FilterError::TransformWithBaseRanker);
        }
        Self::apply(self.cutoff, graph, ranks)
    }

    fn apply(cutoff: Cutoff, graph: &VecGraph, ranks: &GraphSignal) -> Result<GraphSignal, FilterError> {
        if ranks.graph_id() != graph.id() {
            return Err(FilterError::GraphMismatch {
                graph: graph.id(),
                signal: ranks.graph_id(),
            });
        }
        let (values, threshold) = match cutoff {
            Cutoff::Fixed(threshold) => (ranks.clone(), threshold),
            Cutoff::Gap => {
                let by_degree = GraphSignal::from_values(
                    graph,
                    ranks
                        .values()
                        .iter()
                        .enumerate()
                        .map(|(v, &rank)| safe_div(rank, graph.weighted_outdegree(v)))
                        .collect::<Vec<_>>(),
                );
                let mut sorted = by_degree.values().to_vec();
                sorted.sort_unstable_by(|a, b| b.total_cmp(a));
                let mut max_diff = 0.0;
                let mut threshold = 0.0;
                let mut prev_rank = 0.0;
                for &rank in &sorted {
                    if prev_rank > 0.0 {
                        let diff = (prev_rank - rank) / prev_rank;
                        if diff > max_diff {
                            max_diff = diff;
                            threshold = rank;
                        }
                    }
                    prev_rank = rank;
                }
                (by_degree, threshold)
            }
        };
        Ok(values.map(|v| if v >= threshold { 1.0 } else { 0.0 }))
    }
}

impl NodeRanking for Threshold {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        let ranks = delegate(&mut self.ranker, graph, personalization)?;
        Self::apply(self.cutoff, graph, &ranks)
    }
}
