/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Personalized PageRank via power iteration.
//!
//! The recurrence is
//!
//! > **x** ← α *M* **x** + (1 − α) **p**
//!
//! where *M* is the normalized adjacency operator, **p** the personalization
//! and α the damping factor. With column normalization *M* is
//! column-stochastic and the iteration preserves the mass of **p** (dangling
//! nodes excepted).
//!
//! # Examples
//!
//! ```
//! use graphrank::graphs::vec_graph::VecGraph;
//! use graphrank::preprocess::{Normalization, Preprocessor};
//! use graphrank_algo::filters::pagerank::PageRank;
//! use graphrank_algo::filters::{NodeRanking, Personalization};
//!
//! let graph = VecGraph::from_edges([(0, 1), (1, 2), (2, 3), (3, 0)]);
//! let mut pr = PageRank::new();
//! pr.alpha(0.85)
//!     .preprocessor(Preprocessor::new(Normalization::Column));
//! let scores = pr.rank(&graph, Personalization::Sparse(&[(0, 1.0)]))?;
//! assert_eq!(scores.len(), 4);
//! assert!(scores.get(0) > scores.get(2));
//! # Ok::<(), graphrank_algo::error::FilterError>(())
//! ```

use dsi_progress_logger::{no_logging, ProgressLog};
use graphrank::graphs::vec_graph::VecGraph;
use graphrank::preprocess::Preprocessor;
use graphrank::signal::GraphSignal;

use super::{FilterCore, GraphFilter, NodeRanking, Personalization};
use crate::convergence::StoppingRule;
use crate::error::FilterError;

/// The personalized PageRank filter.
pub struct PageRank {
    core: FilterCore,
    alpha: f64,
}

impl Default for PageRank {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRank {
    /// Creates a PageRank filter with α = 0.85, automatic normalization and
    /// the default stopping rule.
    pub fn new() -> Self {
        Self {
            core: FilterCore::new(),
            alpha: 0.85,
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
        let alpha = self.alpha;
        log::info!("Alpha: {}", alpha);
        self.core
            .rank_recursive(graph, personalization, pl, |_, p, _, mx, out| {
                for ((o, &m), &p) in out.iter_mut().zip(mx.iter()).zip(p.iter()) {
                    *o = alpha * m + (1.0 - alpha) * p;
                }
            })
    }
}

impl NodeRanking for PageRank {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        self.rank_with_logging(graph, personalization, no_logging![])
    }
}

impl GraphFilter for PageRank {
    fn swap_stopping_rule(&mut self, rule: Box<dyn StoppingRule>) -> Box<dyn StoppingRule> {
        self.core.swap_stopping(rule)
    }

    fn last_iterations(&self) -> usize {
        self.core.last_iterations()
    }
}
