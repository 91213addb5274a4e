/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Absorbing random walks.
//!
//! Each node carries an absorption rate *aᵢ* (1 unless overridden) and the
//! filter iterates
//!
//! > *xᵢ* ← ( α (*M* **x**)ᵢ + (1 − α) *aᵢ* *pᵢ* ) / ( α + (1 − α) *aᵢ* )
//!
//! Nodes with higher absorption rates hold on to their personalization more
//! strongly. With the uniform rate *aᵢ* = 1 the denominator is exactly 1 and
//! the recurrence coincides with PageRank's, bit for bit.

use dsi_progress_logger::{no_logging, ProgressLog};
use graphrank::graphs::vec_graph::VecGraph;
use graphrank::preprocess::Preprocessor;
use graphrank::signal::GraphSignal;
use graphrank::traits::RandomAccessGraph;

use super::{FilterCore, GraphFilter, NodeRanking, Personalization};
use crate::convergence::StoppingRule;
use crate::error::FilterError;

/// The absorbing-random-walk filter.
pub struct AbsorbingWalks {
    core: FilterCore,
    alpha: f64,
    absorption: Vec<(usize, f64)>,
}

impl Default for AbsorbingWalks {
    fn default() -> Self {
        Self::new()
    }
}

impl AbsorbingWalks {
    /// Creates an absorbing-walk filter with α = 0.85 and uniform absorption.
    pub fn new() -> Self {
        Self {
            core: FilterCore::new(),
            alpha: 0.85,
            absorption: Vec::new(),
        }
    }

    /// Sets the damping factor α.
    ///
    /// # Panics
    ///
    /// Panics if `alpha` is not in the interval [0 . . 1).
    pub fn alpha(&mut self, alpha: f64) -> &mut Self {
        assert!(
            (0.0..1.0).contains(&alpha),
            "The damping factor must be in [0 . . 1), got {alpha}"
        );
        self.alpha = alpha;
        self
    }

    /// Overrides the absorption rate of specific nodes; every other node
    /// keeps the rate 1.
    pub fn absorption(&mut self, rates: impl IntoIterator<Item = (usize, f64)>) -> &mut Self {
        self.absorption = rates.into_iter().collect();
        self
    }

    /// Sets the preprocessor providing the normalized operator.
    pub fn preprocessor(&mut self, preprocessor: Preprocessor) -> &mut Self {
        self.core.set_preprocessor(preprocessor);
        self
    }

    /// Sets the stopping rule.
    pub fn stopping_rule(&mut self, rule: Box<dyn StoppingRule>) -> &mut Self {
        self.core.set_stopping(rule);
        self
    }

    /// Computes scores, logging progress.
    pub fn rank_with_logging(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
        pl: &mut impl ProgressLog,
    ) -> Result<GraphSignal, FilterError> {
        let num_nodes = graph.num_nodes();
        let mut rates = vec![1.0; num_nodes];
        for &(node, rate) in &self.absorption {
            if node >= num_nodes {
                return Err(FilterError::InvalidNode { node, num_nodes });
            }
            rates[node] = rate;
        }
        let alpha = self.alpha;
        log::info!("Alpha: {}", alpha);
        self.core
            .rank_recursive(graph, personalization, pl, |_, p, _, mx, out| {
                for i in 0..out.len() {
                    out[i] = (alpha * mx[i] + (1.0 - alpha) * rates[i] * p[i])
                        / (alpha + (1.0 - alpha) * rates[i]);
                }
            })
    }
}

impl NodeRanking for AbsorbingWalks {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        self.rank_with_logging(graph, personalization, no_logging![])
    }
}

impl GraphFilter for AbsorbingWalks {
    fn swap_stopping_rule(&mut self, rule: Box<dyn StoppingRule>) -> Box<dyn StoppingRule> {
        self.core.swap_stopping(rule)
    }

    fn last_iterations(&self) -> usize {
        self.core.last_iterations()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_high_absorption_pins_scores_to_seeds() -> Result<(), FilterError> {
        let graph = VecGraph::from_edges([(0, 1), (1, 2), (2, 3)]);
        let mut aw = AbsorbingWalks::new();
        aw.stopping_rule(Box::new(
            crate::convergence::ConvergenceManager::new().max_iters(10000),
        ));
        let baseline = aw.rank(&graph, Personalization::Sparse(&[(0, 1.0)]))?;
        aw.absorption([(0, 1000.0)]);
        let pinned = aw.rank(&graph, Personalization::Sparse(&[(0, 1.0)]))?;
        // a strongly absorbing seed retains more of its own score
        assert!(pinned.get(0) > baseline.get(0));
        Ok(())
    }

    #[test]
    fn test_invalid_absorption_node_is_rejected() {
        let graph = VecGraph::from_edges([(0, 1)]);
        let mut aw = AbsorbingWalks::new();
        aw.absorption([(7, 2.0)]);
        assert_eq!(
            aw.rank(&graph, Personalization::Uniform),
            Err(FilterError::InvalidNode {
                node: 7,
                num_nodes: 2
            })
        );
    }
}
