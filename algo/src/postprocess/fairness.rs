/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Fairness-aware rank editing.
//!
//! All schemes here take a sensitive-group indicator signal (values in
//! `[0, 1]`, nonzero marking group membership) and push the score mass
//! allotted to the group toward its population share φ, each with a
//! different intervention point:
//!
//! - [`AdHocFairness`] edits the output scores directly, additively or
//!   multiplicatively;
//! - [`FairWalk`] reweights the graph's arcs before ranking;
//! - [`FairPersonalizer`] edits the personalization instead, searching for
//!   the edit that best trades rank retention against statistical parity.

use std::collections::HashMap;

use graphrank::graphs::vec_graph::VecGraph;
use graphrank::signal::{safe_div, GraphSignal};
use graphrank::traits::{GraphId, RandomAccessGraph};

use crate::convergence::ConvergenceManager;
use crate::error::FilterError;
use crate::filters::{GraphFilter, NodeRanking, Personalization};
use crate::measures::{
    ArithmeticMean, GroupMetric, Mabs, Measure, Mistreatment, PRule,
};
use crate::optimize::{Optimizer, PartitionStrategy};
use crate::postprocess::delegate;

/// Values below this are treated as exhausted during mass redistribution.
const MIN_MASS: f64 = 1E-12;

/// How [`AdHocFairness`] moves score mass between groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FairnessMethod {
    /// Take mass uniformly from the over-represented group, never driving a
    /// score negative, and credit what was actually removed to the other
    /// group.
    #[default]
    Additive,
    /// Rescale each group so its mass matches its population share exactly.
    Multiplicative,
}

/// Direct score editing toward statistical parity.
///
/// Scores are first sum-normalized. The additive method never increases
/// total mass; it credits only the mass it managed to remove, so heavily
/// skewed inputs may end short of exact parity. The multiplicative method
/// always reaches exact parity but can distort score ratios inside each
/// group's complement.
pub struct AdHocFairness {
    ranker: Option<Box<dyn NodeRanking>>,
    sensitive: GraphSignal,
    method: FairnessMethod,
}

impl AdHocFairness {
    /// Creates an identity-based editor, usable via
    /// [`transform`](Self::transform).
    pub fn new(sensitive: GraphSignal, method: FairnessMethod) -> Self {
        Self {
            ranker: None,
            sensitive,
            method,
        }
    }

    /// Creates an editor postprocessing the output of `ranker`.
    pub fn wrapping(
        ranker: Box<dyn NodeRanking>,
        sensitive: GraphSignal,
        method: FairnessMethod,
    ) -> Self {
        Self {
            ranker: Some(ranker),
            sensitive,
            method,
        }
    }

    /// Transforms an already-computed signal. Only legal for the identity
    /// base.
    pub fn transform(&self, ranks: &GraphSignal) -> Result<GraphSignal, FilterError> {
        if self.ranker.is_some() {
            return Err(FilterError::TransformWithBaseRanker);
        }
        self.apply(ranks)
    }

    fn apply(&self, ranks: &GraphSignal) -> Result<GraphSignal, FilterError> {
        if self.sensitive.graph_id() != ranks.graph_id() {
            return Err(FilterError::GraphMismatch {
                graph: self.sensitive.graph_id(),
                signal: ranks.graph_id(),
            });
        }
        let ranks = ranks.normalized_by_sum();
        let sensitive = self.sensitive.values();
        let phi = safe_div(self.sensitive.sum(), sensitive.len() as f64);
        match self.method {
            FairnessMethod::Multiplicative => {
                let mut sensitive_mass = 0.0;
                let mut rest_mass = 0.0;
                for (rank, s) in ranks.values().iter().zip(sensitive) {
                    sensitive_mass += rank * s;
                    rest_mass += rank * (1.0 - s);
                }
                let sensitive_scale = safe_div(phi, sensitive_mass);
                let rest_scale = safe_div(1.0 - phi, rest_mass);
                Ok(ranks.zip_with(&self.sensitive, |rank, s| {
                    rank * (s * sensitive_scale + (1.0 - s) * rest_scale)
                }))
            }
            FairnessMethod::Additive => {
                let mut values = ranks.values().to_vec();
                let sensitive_mass: f64 = values
                    .iter()
                    .zip(sensitive)
                    .map(|(rank, s)| rank * s)
                    .sum();
                let sensitive_weight = self.sensitive.sum();
                let rest_weight = sensitive.len() as f64 - sensitive_weight;
                if sensitive_mass < phi {
                    let removed = distribute(phi - sensitive_mass, &mut values, sensitive, false);
                    for (value, s) in values.iter_mut().zip(sensitive) {
                        *value += s * safe_div(removed, sensitive_weight);
                    }
                } else {
                    let rest_mass = 1.0 - sensitive_mass;
                    if rest_mass < 1.0 - phi {
                        let removed =
                            distribute(1.0 - phi - rest_mass, &mut values, sensitive, true);
                        for (value, s) in values.iter_mut().zip(sensitive) {
                            *value += (1.0 - s) * safe_div(removed, rest_weight);
                        }
                    }
                }
                let pairs: Vec<(usize, f64)> = values.into_iter().enumerate().collect();
                Ok(GraphSignal::from_pairs_like(&ranks, &pairs))
            }
        }
    }
}

impl NodeRanking for AdHocFairness {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        let ranks = delegate(&mut self.ranker, graph, personalization)?;
        self.apply(&ranks)
    }
}

/// Repeatedly shaves the smallest remaining donor score until `deficit` has
/// been collected or the donors are exhausted. Returns the mass actually
/// removed.
fn distribute(
    mut deficit: f64,
    values: &mut [f64],
    sensitive: &[f64],
    from_sensitive: bool,
) -> f64 {
    let mut removed = 0.0;
    let mut shave = f64::INFINITY;
    while shave >= MIN_MASS && deficit > 0.0 {
        let donors: Vec<usize> = values
            .iter()
            .zip(sensitive)
            .enumerate()
            .filter(|(_, (&value, &s))| value >= MIN_MASS && (s != 0.0) == from_sensitive)
            .map(|(node, _)| node)
            .collect();
        if donors.is_empty() {
            break;
        }
        let share = deficit / donors.len() as f64;
        let smallest = donors
            .iter()
            .map(|&node| values[node])
            .fold(f64::INFINITY, f64::min);
        shave = smallest.min(share);
        for &node in &donors {
            values[node] -= shave;
        }
        let taken = shave * donors.len() as f64;
        deficit -= taken;
        removed += taken;
    }
    removed
}

/// Ranks on a reweighted copy of the graph in which each node's outgoing
/// mass is discounted by its group's population share, so random walks
/// cross group boundaries at parity.
///
/// Reweighted graphs are cached by graph identity under the assumption
/// that graphs are immutable while wrapped; call
/// [`clear_cache`](Self::clear_cache) after mutating one.
pub struct FairWalk {
    ranker: Box<dyn NodeRanking>,
    sensitive: GraphSignal,
    cache: HashMap<GraphId, VecGraph>,
}

impl FairWalk {
    pub fn new(ranker: Box<dyn NodeRanking>, sensitive: GraphSignal) -> Self {
        Self {
            ranker,
            sensitive,
            cache: HashMap::new(),
        }
    }

    /// Always fails: arc reweighting has no meaning for an already-computed
    /// signal.
    pub fn transform(&self, _ranks: &GraphSignal) -> Result<GraphSignal, FilterError> {
        Err(FilterError::UnsupportedTransform("FairWalk"))
    }

    /// Drops all cached reweighted graphs.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn reweighted(&mut self, graph: &VecGraph) -> &VecGraph {
        let sensitive = &self.sensitive;
        self.cache.entry(graph.id()).or_insert_with(|| {
            let phi = safe_div(sensitive.sum(), graph.num_nodes() as f64);
            let mut fair = VecGraph::empty(graph.num_nodes());
            for u in 0..graph.num_nodes() {
                let s = sensitive.get(u);
                let factor = s * phi + (1.0 - s) * (1.0 - phi);
                for (v, w) in graph.successors(u) {
                    fair.add_arc(u, v, safe_div(w, factor));
                }
            }
            fair
        })
    }
}

impl NodeRanking for FairWalk {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        if self.sensitive.graph_id() != graph.id() {
            return Err(FilterError::GraphMismatch {
                graph: graph.id(),
                signal: self.sensitive.graph_id(),
            });
        }
        let personalization = personalization.to_signal(graph)?;
        self.reweighted(graph);
        let fair = &self.cache[&graph.id()];
        let moved = personalization.with_graph(fair);
        let ranks = self.ranker.rank(fair, Personalization::Signal(&moved))?;
        // the caller's signals live on the original graph
        Ok(ranks.with_graph(graph))
    }
}

/// The parity notion optimized by [`FairPersonalizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParityType {
    /// Disparate impact, measured by the pRule.
    #[default]
    Impact,
    /// True-positive-rate parity against the training personalization.
    Tpr,
    /// True-negative-rate parity against the training personalization.
    Tnr,
    /// The mean of the two rate parities.
    Mistreatment,
}

/// Personalization-editing fairness.
///
/// Instead of touching the graph or the output, this scheme searches for an
/// edited personalization whose ranking is simultaneously close to the
/// original one and fair. Per node, the edit blends two exponential
/// curves of the gap between the node's original rank and its seed value,
/// with separate curve parameters for the sensitive group and the rest;
/// the curve parameters are found by grid search over a fixed loss
/// combining rank retention with the chosen [`ParityType`].
///
/// During the search the wrapped filter's stopping rule is swapped for a
/// fixed budget equal to the iterations its first run needed, so every
/// candidate costs the same; the original rule is restored before
/// returning.
pub struct FairPersonalizer {
    ranker: Box<dyn GraphFilter>,
    sensitive: GraphSignal,
    parity: ParityType,
    target_parity: f64,
    retain_rank_weight: f64,
    parity_weight: f64,
    parameter_buckets: usize,
    max_residual: f64,
}

impl FairPersonalizer {
    pub fn new(ranker: Box<dyn GraphFilter>, sensitive: GraphSignal) -> Self {
        Self {
            ranker,
            sensitive,
            parity: ParityType::default(),
            target_parity: 1.0,
            retain_rank_weight: 1.0,
            parity_weight: 1.0,
            parameter_buckets: 1,
            max_residual: 1.0,
        }
    }

    pub fn parity(mut self, parity: ParityType) -> Self {
        self.parity = parity;
        self
    }

    /// Parity values above this are not rewarded further. Must lie in
    /// `(0, 1]`.
    pub fn target_parity(mut self, target: f64) -> Self {
        assert!(
            target > 0.0 && target <= 1.0,
            "The parity target must be in (0, 1], got {target}"
        );
        self.target_parity = target;
        self
    }

    pub fn retain_rank_weight(mut self, weight: f64) -> Self {
        self.retain_rank_weight = weight;
        self
    }

    pub fn parity_weight(mut self, weight: f64) -> Self {
        self.parity_weight = weight;
        self
    }

    /// Number of independent curve-parameter groups. More buckets widen the
    /// search space.
    pub fn parameter_buckets(mut self, buckets: usize) -> Self {
        assert!(buckets > 0, "At least one parameter bucket is needed");
        self.parameter_buckets = buckets;
        self
    }

    /// Upper bound for the residual weight of the original seeds in the
    /// edited personalization.
    pub fn max_residual(mut self, max_residual: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&max_residual),
            "The residual bound must be in [0, 1], got {max_residual}"
        );
        self.max_residual = max_residual;
        self
    }

    fn parity_measure(&self, personalization: &GraphSignal) -> Box<dyn Measure> {
        match self.parity {
            ParityType::Impact => Box::new(PRule::new(self.sensitive.clone())),
            ParityType::Tpr => Box::new(Mistreatment::new(
                personalization.clone(),
                self.sensitive.clone(),
                GroupMetric::Tpr,
            )),
            ParityType::Tnr => Box::new(Mistreatment::new(
                personalization.clone(),
                self.sensitive.clone(),
                GroupMetric::Tnr,
            )),
            ParityType::Mistreatment => Box::new(ArithmeticMean::new(vec![
                Box::new(Mistreatment::new(
                    personalization.clone(),
                    self.sensitive.clone(),
                    GroupMetric::Tpr,
                )),
                Box::new(Mistreatment::new(
                    personalization.clone(),
                    self.sensitive.clone(),
                    GroupMetric::Tnr,
                )),
            ])),
        }
    }
}

/// The per-node personalization edit: a blend of two exponential curves of
/// the rank-seed gap, with curve parameters interpolated between the
/// sensitive setting (`params[4i]`, `params[4i + 2]`) and the rest
/// (`params[4i + 1]`, `params[4i + 3]`) per bucket, plus a residual weight
/// for the original seeds in the last slot.
fn edit_personalization(
    params: &[f64],
    buckets: usize,
    personalization: &GraphSignal,
    ranks: &GraphSignal,
    sensitive: &GraphSignal,
) -> GraphSignal {
    let seeds = personalization.normalized_by_max();
    let ranks = ranks.normalized_by_max();
    let residual = params[4 * buckets];
    let pairs: Vec<(usize, f64)> = seeds
        .values()
        .iter()
        .zip(ranks.values())
        .zip(sensitive.values())
        .enumerate()
        .map(|(node, ((&seed, &rank), &s))| {
            let gap = (rank - seed).abs();
            let mut value = 0.0;
            for bucket in 0..buckets {
                let a = s * (params[4 * bucket] - params[4 * bucket + 1]) + params[4 * bucket + 1];
                let b =
                    s * (params[4 * bucket + 2] - params[4 * bucket + 3]) + params[4 * bucket + 3];
                value += (1.0 - a) * (b * gap).exp() + a * (-b * gap).exp();
            }
            (node, (1.0 - residual) * value + residual * seed)
        })
        .collect();
    GraphSignal::from_pairs_like(personalization, &pairs)
}

impl NodeRanking for FairPersonalizer {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        if self.sensitive.graph_id() != graph.id() {
            return Err(FilterError::GraphMismatch {
                graph: graph.id(),
                signal: self.sensitive.graph_id(),
            });
        }
        let personalization = personalization.to_signal(graph)?;
        let original = self
            .ranker
            .rank(graph, Personalization::Signal(&personalization))?;
        let budget = self.ranker.last_iterations().max(1);

        let buckets = self.parameter_buckets;
        let mut min_vals = Vec::with_capacity(4 * buckets + 1);
        let mut max_vals = Vec::with_capacity(4 * buckets + 1);
        for _ in 0..buckets {
            min_vals.extend_from_slice(&[0.0, 0.0, -5.0, -5.0]);
            max_vals.extend_from_slice(&[1.0, 1.0, 5.0, 5.0]);
        }
        min_vals.push(0.0);
        max_vals.push(self.max_residual);

        let error = Mabs::new(original.clone());
        let parity = self.parity_measure(&personalization);
        let retain_rank_weight = self.retain_rank_weight;
        let parity_weight = self.parity_weight;
        let target_parity = self.target_parity;
        let sensitive = &self.sensitive;
        let ranker = &mut self.ranker;
        let previous_rule =
            ranker.swap_stopping_rule(Box::new(ConvergenceManager::fixed_iterations(budget)));

        let best = Optimizer::new(min_vals, max_vals)
            .deviation_tol(Some(1E-6))
            .divide_range(2.0)
            .partition(PartitionStrategy::Split(10))
            .optimize(|params| {
                let edited =
                    edit_personalization(params, buckets, &personalization, &original, sensitive);
                let ranks = match ranker.rank(graph, Personalization::Signal(&edited)) {
                    Ok(ranks) => ranks,
                    Err(error) => {
                        log::warn!("Candidate edit failed to rank: {error}");
                        return f64::INFINITY;
                    }
                };
                let retention = match error.evaluate(&ranks) {
                    Ok(value) => value,
                    Err(_) => return f64::INFINITY,
                };
                let fairness = match parity.evaluate(&ranks) {
                    Ok(value) => value,
                    Err(_) => return f64::INFINITY,
                };
                -retain_rank_weight * retention * error.best_direction()
                    - parity_weight * target_parity.min(fairness)
            });

        let outcome = best.map_err(FilterError::from).and_then(|best| {
            let edited =
                edit_personalization(&best, buckets, &personalization, &original, sensitive);
            ranker.rank(graph, Personalization::Signal(&edited))
        });
        self.ranker.swap_stopping_rule(previous_rule);
        outcome
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::convergence::ConvergenceManager;
    use crate::filters::pagerank::PageRank;

    fn two_cliques() -> VecGraph {
        // nodes 0..3 and 3..6 form triangles bridged by the arc 2-3
        VecGraph::from_edges([
            (0, 1),
            (0, 2),
            (1, 2),
            (2, 3),
            (3, 4),
            (3, 5),
            (4, 5),
        ])
    }

    fn sensitive(graph: &VecGraph) -> GraphSignal {
        GraphSignal::from_values(graph, vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0])
    }

    #[test]
    fn test_multiplicative_fairness_reaches_exact_parity() -> Result<(), FilterError> {
        let graph = two_cliques();
        let ranks = GraphSignal::from_values(&graph, vec![0.1, 0.1, 0.1, 0.4, 0.2, 0.1]);
        let fair = AdHocFairness::new(sensitive(&graph), FairnessMethod::Multiplicative)
            .transform(&ranks)?;
        let prule = PRule::new(sensitive(&graph)).evaluate(&fair)?;
        assert!((prule - 1.0).abs() < 1E-12, "got {prule}");
        assert!((fair.sum() - 1.0).abs() < 1E-12);
        Ok(())
    }

    #[test]
    fn test_additive_fairness_never_creates_mass() -> Result<(), FilterError> {
        let graph = two_cliques();
        let ranks = GraphSignal::from_values(&graph, vec![0.05, 0.05, 0.1, 0.4, 0.3, 0.1]);
        let editor = AdHocFairness::new(sensitive(&graph), FairnessMethod::Additive);
        let fair = editor.transform(&ranks)?;
        assert!(fair.sum() <= 1.0 + 1E-12, "got {}", fair.sum());
        assert!(fair.values().iter().all(|&v| v >= -1E-12));
        let before = PRule::new(sensitive(&graph)).evaluate(&ranks.normalized_by_sum())?;
        let after = PRule::new(sensitive(&graph)).evaluate(&fair)?;
        assert!(after > before, "{after} vs {before}");
        Ok(())
    }

    #[test]
    fn test_additive_fairness_leaves_fair_ranks_alone() -> Result<(), FilterError> {
        let graph = two_cliques();
        let ranks = GraphSignal::uniform(&graph, 1.0);
        let fair =
            AdHocFairness::new(sensitive(&graph), FairnessMethod::Additive).transform(&ranks)?;
        for value in fair.values() {
            assert!((value - 1.0 / 6.0).abs() < 1E-12);
        }
        Ok(())
    }

    #[test]
    fn test_fair_walk_matches_manual_reweighting() -> Result<(), FilterError> {
        let graph = two_cliques();
        let sensitive = sensitive(&graph);
        // φ = 1/2, so each arc's weight doubles and ranking is unchanged
        // after column normalization
        let mut direct = PageRank::new();
        direct.stopping_rule(Box::new(ConvergenceManager::new().max_iters(10000)));
        let expected = direct.rank(&graph, Personalization::Uniform)?;
        let mut inner = PageRank::new();
        inner.stopping_rule(Box::new(ConvergenceManager::new().max_iters(10000)));
        let mut walk = FairWalk::new(Box::new(inner), sensitive);
        let ranks = walk.rank(&graph, Personalization::Uniform)?;
        assert_eq!(ranks.graph_id(), graph.id());
        for (value, reference) in ranks.values().iter().zip(expected.values()) {
            assert!((value - reference).abs() < 1E-12);
        }
        Ok(())
    }

    #[test]
    fn test_fair_walk_has_no_transform() {
        let graph = two_cliques();
        let walk = FairWalk::new(Box::new(PageRank::new()), sensitive(&graph));
        assert_eq!(
            walk.transform(&GraphSignal::zeros(&graph)),
            Err(FilterError::UnsupportedTransform("FairWalk"))
        );
    }

    #[test]
    fn test_fair_walk_cache_is_stable_across_calls() -> Result<(), FilterError> {
        let graph = two_cliques();
        let mut inner = PageRank::new();
        inner.stopping_rule(Box::new(ConvergenceManager::new().max_iters(10000)));
        let mut walk = FairWalk::new(Box::new(inner), sensitive(&graph));
        let first = walk.rank(&graph, Personalization::Sparse(&[(0, 1.0)]))?;
        let second = walk.rank(&graph, Personalization::Sparse(&[(0, 1.0)]))?;
        assert_eq!(first, second);
        walk.clear_cache();
        let third = walk.rank(&graph, Personalization::Sparse(&[(0, 1.0)]))?;
        assert_eq!(first, third);
        Ok(())
    }

    #[test]
    fn test_fair_personalizer_does_not_hurt_parity() -> Result<(), FilterError> {
        let graph = two_cliques();
        let sensitive = sensitive(&graph);
        let mut base = PageRank::new();
        base.stopping_rule(Box::new(ConvergenceManager::new().max_iters(10000)));
        let seeds = Personalization::Sparse(&[(3, 1.0)]);
        let mut reference = PageRank::new();
        reference.stopping_rule(Box::new(ConvergenceManager::new().max_iters(10000)));
        let original = reference.rank(&graph, Personalization::Sparse(&[(3, 1.0)]))?;
        let before = PRule::new(sensitive.clone()).evaluate(&original)?;

        let mut personalizer = FairPersonalizer::new(Box::new(base), sensitive.clone())
            .parity_weight(10.0)
            .retain_rank_weight(0.1);
        let fair = personalizer.rank(&graph, seeds)?;
        assert_eq!(fair.graph_id(), graph.id());
        let after = PRule::new(sensitive).evaluate(&fair)?;
        assert!(after >= before - 1E-6, "{after} vs {before}");
        Ok(())
    }
}
