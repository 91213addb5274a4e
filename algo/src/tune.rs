/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Filter hyperparameter search over a train/validation split.
//!
//! [`ParameterTuner`] wraps a factory that builds a ranker from a parameter
//! vector. At ranking time it holds out part of the personalization's
//! seeds, searches the parameter box for the vector whose ranker best
//! recovers the held-out seeds (by AUC, training seeds excluded), and then
//! ranks the full personalization with the winning parameters. The split
//! is seeded, so tuning is reproducible.

use graphrank::graphs::vec_graph::VecGraph;
use graphrank::signal::GraphSignal;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::FilterError;
use crate::filters::{NodeRanking, Personalization};
use crate::measures::{Auc, Measure};
use crate::optimize::Optimizer;

/// Tunes the parameters of rankers produced by a factory closure. See the
/// [module](self) documentation.
pub struct ParameterTuner<F> {
    factory: F,
    optimizer: Optimizer,
    fraction_of_training: f64,
    seed: u64,
}

impl<F: FnMut(&[f64]) -> Box<dyn NodeRanking>> ParameterTuner<F> {
    /// Creates a tuner searching the box `[min_vals, max_vals]` with the
    /// default grid optimizer, holding out 20% of the seeds for
    /// validation.
    pub fn new(factory: F, min_vals: Vec<f64>, max_vals: Vec<f64>) -> Self {
        Self {
            factory,
            optimizer: Optimizer::new(min_vals, max_vals),
            fraction_of_training: 0.8,
            seed: 0,
        }
    }

    /// Replaces the whole optimizer configuration, bounds included.
    pub fn optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// The fraction of seeds used for training. Must lie strictly between
    /// 0 and 1.
    pub fn fraction_of_training(mut self, fraction: f64) -> Self {
        assert!(
            fraction > 0.0 && fraction < 1.0,
            "The training fraction must be in (0 . . 1), got {fraction}"
        );
        self.fraction_of_training = fraction;
        self
    }

    /// Seeds the train/validation shuffle.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl<F: FnMut(&[f64]) -> Box<dyn NodeRanking>> NodeRanking for ParameterTuner<F> {
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError> {
        let signal = personalization.to_signal(graph)?;
        let mut seeds: Vec<usize> = signal
            .values()
            .iter()
            .enumerate()
            .filter(|(_, &value)| value != 0.0)
            .map(|(node, _)| node)
            .collect();
        let factory = &mut self.factory;
        if seeds.len() < 2 {
            log::warn!(
                "Cannot hold out a validation set from {} seed(s), ranking untuned",
                seeds.len()
            );
            let start = self.optimizer.clone().deviation_tol(None).parameter_tol(None);
            let params = start.optimize(|_| 0.0)?;
            return factory(&params).rank(graph, Personalization::Signal(&signal));
        }
        let mut rng = SmallRng::seed_from_u64(self.seed);
        seeds.shuffle(&mut rng);
        let cut = ((seeds.len() as f64 * self.fraction_of_training).round() as usize)
            .clamp(1, seeds.len() - 1);
        let training_pairs: Vec<(usize, f64)> = seeds[..cut]
            .iter()
            .map(|&node| (node, signal.get(node)))
            .collect();
        let validation_pairs: Vec<(usize, f64)> = seeds[cut..]
            .iter()
            .map(|&node| (node, signal.get(node)))
            .collect();
        let training = GraphSignal::from_pairs_like(&signal, &training_pairs);
        let validation = GraphSignal::from_pairs_like(&signal, &validation_pairs);
        let measure = Auc::new(validation).excluding(training.clone());

        log::info!(
            "Tuning on {} training and {} validation seeds",
            cut,
            seeds.len() - cut
        );
        let best = self.optimizer.optimize(|params| {
            let ranks = match factory(params).rank(graph, Personalization::Signal(&training)) {
                Ok(ranks) => ranks,
                Err(error) => {
                    log::warn!("Candidate parameters {params:?} failed to rank: {error}");
                    return f64::INFINITY;
                }
            };
            match measure.evaluate(&ranks) {
                Ok(value) => -measure.best_direction() * value,
                Err(_) => f64::INFINITY,
            }
        })?;
        log::info!("Best parameters: {best:?}");
        factory(&best).rank(graph, Personalization::Signal(&signal))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::convergence::ConvergenceManager;
    use crate::filters::pagerank::PageRank;
    use crate::optimize::PartitionStrategy;
    use graphrank::traits::RandomAccessGraph;

    fn pagerank_factory(params: &[f64]) -> Box<dyn NodeRanking> {
        let mut ranker = PageRank::new();
        ranker
            .alpha(params[0])
            .stopping_rule(Box::new(ConvergenceManager::new().max_iters(10000)));
        Box::new(ranker)
    }

    fn two_cliques() -> VecGraph {
        VecGraph::from_edges([(0, 1), (0, 2), (1, 2), (2, 3), (3, 4), (3, 5), (4, 5)])
    }

    #[test]
    fn test_tuning_is_reproducible() -> Result<(), FilterError> {
        let graph = two_cliques();
        let seeds = [(0, 1.0), (1, 1.0), (2, 1.0)];
        let optimizer = Optimizer::new(vec![0.1], vec![0.9])
            .deviation_tol(Some(1E-3))
            .partition(PartitionStrategy::Split(5));
        let mut tuner = ParameterTuner::new(pagerank_factory, vec![0.1], vec![0.9])
            .optimizer(optimizer.clone())
            .seed(7);
        let first = tuner.rank(&graph, Personalization::Sparse(&seeds))?;
        let mut again = ParameterTuner::new(pagerank_factory, vec![0.1], vec![0.9])
            .optimizer(optimizer)
            .seed(7);
        let second = again.rank(&graph, Personalization::Sparse(&seeds))?;
        assert_eq!(first, second);
        assert_eq!(first.graph_id(), graph.id());
        Ok(())
    }

    #[test]
    fn test_single_seed_falls_back_to_untuned_midpoint() -> Result<(), FilterError> {
        let graph = two_cliques();
        let mut tuner = ParameterTuner::new(pagerank_factory, vec![0.1], vec![0.9]);
        let ranks = tuner.rank(&graph, Personalization::Sparse(&[(0, 1.0)]))?;
        assert!(ranks.sum() > 0.0);
        Ok(())
    }
}
