/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Filters defined by an explicit parameter list.
//!
//! [`GenericGraphFilter`] evaluates the polynomial Σₖ wₖ·*M*ᵏ**p** for a
//! user-supplied coefficient list; an impulse-response filter is exactly this
//! computation. [`LowPassRecursiveGraphFilter`] instead runs one recursive
//! low-pass sweep per parameter:
//!
//! > **x** ← (1 − cₖ) **x** + cₖ *M* **x**.
//!
//! Both are the natural targets for black-box parameter tuning, since their
//! whole behavior is the parameter vector.

use dsi_progress_logger::{no_logging, ProgressLog};
use graphrank::graphs::vec_graph::VecGraph;
use graphrank::preprocess::Preprocessor;
use graphrank::signal::GraphSignal;

use super::{FilterCore, GraphFilter, NodeRanking, Personalization};
use crate::convergence::{ConvergenceManager, StoppingRule};
use crate::error::FilterError;

/// A closed-form filter with explicit polynomial coefficients.
pub struct GenericGraphFilter {
    core: FilterCore,
    params: Vec<f64>,
}

impl GenericGraphFilter {
    /// Creates a filter computing Σₖ `params[k]`·*M*ᵏ**p**.
    ///
    /// The default stopping rule is count-only with exactly one iteration
    /// per coefficient; an error-based rule may truncate the series earlier.
    ///
    /// # Panics
    ///
    /// Panics if `params` is empty.
    pub fn new(params: impl Into<Vec<f64>>) -> Self {
        let params = params.into();
        assert!(!params.is_empty(), "At least one coefficient is required");
        Self {
            core: FilterCore::with_stopping(Box::new(ConvergenceManager::fixed_iterations(
                params.len(),
            ))),
            params,
        }
    }

    /// Returns the coefficient list.
    pub fn params(&self) -> &[f64] {
        &self.params
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
        let params = std::mem::take(&mut self.params);
        let result = self.core.rank_closed_form(graph, personalization, pl, |k| {
            params.get(k).copied().unwrap_or(0.0)
        });
        self.params = params;
        result
    }
}

impl NodeRanking for GenericGraphFilter {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        self.rank_with_logging(graph, personalization, no_logging![])
    }
}

impl GraphFilter for GenericGraphFilter {
    fn swap_stopping_rule(&mut self, rule: Box<dyn StoppingRule>) -> Box<dyn StoppingRule> {
        self.core.swap_stopping(rule)
    }

    fn last_iterations(&self) -> usize {
        self.core.last_iterations()
    }
}

/// A recursive low-pass filter applying one smoothing sweep per parameter.
pub struct LowPassRecursiveGraphFilter {
    core: FilterCore,
    params: Vec<f64>,
}

impl LowPassRecursiveGraphFilter {
    /// Creates a filter running the sweep `x ← (1 − cₖ)x + cₖMx` once per
    /// parameter, in order.
    ///
    /// # Panics
    ///
    /// Panics if `params` is empty.
    pub fn new(params: impl Into<Vec<f64>>) -> Self {
        let params = params.into();
        assert!(!params.is_empty(), "At least one parameter is required");
        Self {
            core: FilterCore::with_stopping(Box::new(ConvergenceManager::fixed_iterations(
                params.len(),
            ))),
            params,
        }
    }

    /// Returns the parameter list.
    pub fn params(&self) -> &[f64] {
        &self.params
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
        let params = std::mem::take(&mut self.params);
        let result = self
            .core
            .rank_recursive(graph, personalization, pl, |k, _, x, mx, out| {
                // one sweep per parameter; past the end the iterate is fixed
                let c = params.get(k - 1).copied().unwrap_or(0.0);
                for ((o, &x), &m) in out.iter_mut().zip(x.iter()).zip(mx.iter()) {
                    *o = (1.0 - c) * x + c * m;
                }
            });
        self.params = params;
        result
    }
}

impl NodeRanking for LowPassRecursiveGraphFilter {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        self.rank_with_logging(graph, personalization, no_logging![])
    }
}

impl GraphFilter for LowPassRecursiveGraphFilter {
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
    use graphrank::preprocess::Normalization;

    #[test]
    fn test_single_coefficient_scales_personalization() -> Result<(), FilterError> {
        let graph = VecGraph::from_edges([(0, 1), (1, 2)]);
        let mut filter = GenericGraphFilter::new([2.0]);
        let scores = filter.rank(&graph, Personalization::Sparse(&[(1, 1.0)]))?;
        assert_eq!(scores.values(), &[0.0, 2.0, 0.0]);
        assert_eq!(filter.last_iterations(), 1);
        Ok(())
    }

    #[test]
    fn test_two_term_expansion() -> Result<(), FilterError> {
        // path 0 - 1 - 2 with column normalization: node 1 splits its mass
        let graph = VecGraph::from_edges([(0, 1), (1, 2)]);
        let mut filter = GenericGraphFilter::new([1.0, 1.0]);
        filter.preprocessor(Preprocessor::new(Normalization::Column));
        let scores = filter.rank(&graph, Personalization::Sparse(&[(1, 1.0)]))?;
        // p + Mp = (0, 1, 0) + (0.5, 0, 0.5)
        assert_eq!(scores.values(), &[0.5, 1.0, 0.5]);
        Ok(())
    }

    #[test]
    fn test_low_pass_runs_once_per_parameter() -> Result<(), FilterError> {
        let graph = VecGraph::from_edges([(0, 1), (1, 2), (2, 0)]);
        let mut filter = LowPassRecursiveGraphFilter::new([0.5, 0.5, 0.5]);
        let scores = filter.rank(&graph, Personalization::Sparse(&[(0, 1.0)]))?;
        assert_eq!(filter.last_iterations(), 3);
        assert!(scores.get(0) > 0.0 && scores.get(1) > 0.0);
        Ok(())
    }
}
