/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Heat-kernel diffusion filters.
//!
//! [`HeatKernel`] computes the closed-form series
//!
//! > e⁻ᵗ Σₖ tᵏ/k! · *M*ᵏ **p**
//!
//! whose coefficients decay factorially, so the series is truncated as soon
//! as the partial sums stabilize under the stopping rule's tolerance.
//! [`BiasedKernel`] is a recursive approximation of the same diffusion that
//! biases each iteration towards the personalization:
//!
//! > **x** ← (1 − aₖ) **p** + aₖ *M* **x**,  aₖ = α t / k.

use dsi_progress_logger::{no_logging, ProgressLog};
use graphrank::graphs::vec_graph::VecGraph;
use graphrank::preprocess::Preprocessor;
use graphrank::signal::GraphSignal;

use super::{FilterCore, GraphFilter, NodeRanking, Personalization};
use crate::convergence::StoppingRule;
use crate::error::FilterError;

/// The closed-form heat-kernel filter.
pub struct HeatKernel {
    core: FilterCore,
    t: f64,
}

impl Default for HeatKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl HeatKernel {
    /// Creates a heat-kernel filter with diffusion time t = 5.
    pub fn new() -> Self {
        Self {
            core: FilterCore::new(),
            t: 5.0,
        }
    }

    /// Sets the diffusion time t. Lower values concentrate scores closer to
    /// the seeds.
    ///
    /// # Panics
    ///
    /// Panics if `t` is not positive.
    pub fn t(&mut self, t: f64) -> &mut Self {
        assert!(t > 0.0, "The diffusion time must be positive, got {t}");
        self.t = t;
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
        let t = self.t;
        log::info!("Diffusion time: {}", t);
        // c₀ = e⁻ᵗ, cₖ₊₁ = cₖ · t/(k+1)
        let mut c = (-t).exp();
        self.core.rank_closed_form(graph, personalization, pl, |k| {
            if k > 0 {
                c *= t / k as f64;
            }
            c
        })
    }
}

impl NodeRanking for HeatKernel {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        self.rank_with_logging(graph, personalization, no_logging![])
    }
}

impl GraphFilter for HeatKernel {
    fn swap_stopping_rule(&mut self, rule: Box<dyn StoppingRule>) -> Box<dyn StoppingRule> {
        self.core.swap_stopping(rule)
    }

    fn last_iterations(&self) -> usize {
        self.core.last_iterations()
    }
}

/// The recursive biased-kernel filter.
pub struct BiasedKernel {
    core: FilterCore,
    alpha: f64,
    t: f64,
}

impl Default for BiasedKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl BiasedKernel {
    /// Creates a biased-kernel filter with α = 0.85 and t = 1.
    pub fn new() -> Self {
        Self {
            core: FilterCore::new(),
            alpha: 0.85,
            t: 1.0,
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

    /// Sets the diffusion time t.
    ///
    /// # Panics
    ///
    /// Panics if `t` is not positive.
    pub fn t(&mut self, t: f64) -> &mut Self {
        assert!(t > 0.0, "The diffusion time must be positive, got {t}");
        self.t = t;
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
        let t = self.t;
        log::info!("Alpha: {}, diffusion time: {}", alpha, t);
        self.core
            .rank_recursive(graph, personalization, pl, |k, p, _, mx, out| {
                let a = alpha * t / k as f64;
                for ((o, &m), &p) in out.iter_mut().zip(mx.iter()).zip(p.iter()) {
                    *o = (1.0 - a) * p + a * m;
                }
            })
    }
}

impl NodeRanking for BiasedKernel {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        self.rank_with_logging(graph, personalization, no_logging![])
    }
}

impl GraphFilter for BiasedKernel {
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
    fn test_heat_kernel_series_truncates() -> Result<(), FilterError> {
        let graph = VecGraph::from_edges([(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)]);
        let mut hk = HeatKernel::new();
        hk.t(3.0);
        let scores = hk.rank(&graph, Personalization::Sparse(&[(0, 1.0)]))?;
        // factorial decay truncates the series well inside the default budget
        assert!(hk.last_iterations() < 100);
        // scores concentrate near the seed
        assert!(scores.get(0) > scores.get(5));
        Ok(())
    }

    #[test]
    fn test_smaller_t_is_more_local() -> Result<(), FilterError> {
        let graph = VecGraph::from_edges([(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)]);
        let seed = Personalization::Sparse(&[(0, 1.0)]);
        let mut near = HeatKernel::new();
        near.t(1.0);
        let mut far = HeatKernel::new();
        far.t(7.0);
        let near = near.rank(&graph, seed)?.normalized_by_sum();
        let far = far.rank(&graph, seed)?.normalized_by_sum();
        assert!(near.get(0) > far.get(0));
        Ok(())
    }

    #[test]
    fn test_biased_kernel_converges() -> Result<(), FilterError> {
        let graph = VecGraph::from_edges([(0, 1), (1, 2), (2, 0)]);
        let mut bk = BiasedKernel::new();
        // the 1/k bias decays slowly, so give the rule room beyond the
        // default budget
        bk.stopping_rule(Box::new(
            crate::convergence::ConvergenceManager::new().max_iters(10000),
        ));
        let scores = bk.rank(&graph, Personalization::Sparse(&[(0, 1.0)]))?;
        assert!(scores.get(0) > scores.get(2));
        Ok(())
    }
}
