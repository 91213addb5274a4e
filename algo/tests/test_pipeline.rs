/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! End-to-end pipelines: filters feeding postprocessor chains, evaluated by
//! measures and tuned over parameter boxes.

use graphrank::graphs::vec_graph::VecGraph;
use graphrank::signal::GraphSignal;
use graphrank::traits::RandomAccessGraph;
use graphrank_algo::convergence::ConvergenceManager;
use graphrank_algo::error::FilterError;
use graphrank_algo::filters::closed_form::GenericGraphFilter;
use graphrank_algo::filters::pagerank::PageRank;
use graphrank_algo::filters::{NodeRanking, Personalization};
use graphrank_algo::measures::{Auc, Measure, PRule};
use graphrank_algo::optimize::{Optimizer, PartitionStrategy};
use graphrank_algo::postprocess::fairness::{AdHocFairness, FairnessMethod};
use graphrank_algo::postprocess::{Cutoff, Normalize, NormalizeMode, Ordinals, Threshold};
use graphrank_algo::tune::ParameterTuner;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two triangles bridged by a single edge; nodes 0..3 form the sensitive
/// group.
fn two_cliques() -> VecGraph {
    VecGraph::from_edges([(0, 1), (0, 2), (1, 2), (2, 3), (3, 4), (3, 5), (4, 5)])
}

fn converged_pagerank() -> PageRank {
    let mut pr = PageRank::new();
    pr.stopping_rule(Box::new(ConvergenceManager::new().max_iters(10000)));
    pr
}

#[test]
fn test_ordinals_over_normalized_pagerank() -> Result<(), FilterError> {
    init_log();
    let graph = two_cliques();
    let normalized = Normalize::wrapping(Box::new(converged_pagerank()), NormalizeMode::Max);
    let mut pipeline = Ordinals::wrapping(Box::new(normalized));
    let ordinals = pipeline.rank(&graph, Personalization::Sparse(&[(0, 1.0)]))?;
    // every position 1..=6 appears exactly once
    let mut seen = ordinals.values().to_vec();
    seen.sort_by(f64::total_cmp);
    assert_eq!(seen, (1..=6).map(f64::from).collect::<Vec<_>>());
    // the seed's own clique outranks the far one
    assert!(ordinals.get(0) < ordinals.get(4));
    assert!(ordinals.get(0) < ordinals.get(5));
    Ok(())
}

#[test]
fn test_gap_threshold_recovers_the_seeded_clique() -> Result<(), FilterError> {
    let graph = two_cliques();
    let mut pipeline = Threshold::wrapping(Box::new(converged_pagerank()), Cutoff::Gap);
    let members = pipeline.rank(&graph, Personalization::Sparse(&[(0, 1.0), (1, 1.0)]))?;
    assert!(members.values().iter().all(|&v| v == 0.0 || v == 1.0));
    assert_eq!(members.get(0), 1.0);
    assert_eq!(members.get(1), 1.0);
    assert_eq!(members.get(4), 0.0);
    assert_eq!(members.get(5), 0.0);
    Ok(())
}

#[test]
fn test_fairness_editing_over_a_live_ranker() -> Result<(), FilterError> {
    let graph = two_cliques();
    let sensitive = GraphSignal::from_values(&graph, vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
    let mut pipeline = AdHocFairness::wrapping(
        Box::new(converged_pagerank()),
        sensitive.clone(),
        FairnessMethod::Multiplicative,
    );
    // seeds concentrated in the non-sensitive clique
    let fair = pipeline.rank(&graph, Personalization::Sparse(&[(4, 1.0), (5, 1.0)]))?;
    let prule = PRule::new(sensitive).evaluate(&fair)?;
    assert!((prule - 1.0).abs() < 1E-9, "got {prule}");
    Ok(())
}

/// Tunes the coefficients of a two-term polynomial filter and checks that
/// the tuned ranking separates the seeded clique at least as well as the
/// box-midpoint one.
#[test]
fn test_tuned_polynomial_filter_beats_nothing() -> Result<(), FilterError> {
    init_log();
    let graph = two_cliques();
    let factory = |params: &[f64]| -> Box<dyn NodeRanking> {
        Box::new(GenericGraphFilter::new(params.to_vec()))
    };
    let optimizer = Optimizer::new(vec![0.0, 0.0], vec![1.0, 1.0])
        .deviation_tol(Some(1E-3))
        .partition(PartitionStrategy::Split(3));
    let mut tuner = ParameterTuner::new(factory, vec![0.0, 0.0], vec![1.0, 1.0])
        .optimizer(optimizer)
        .seed(3);
    let seeds = [(0, 1.0), (1, 1.0), (2, 1.0)];
    let tuned = tuner.rank(&graph, Personalization::Sparse(&seeds))?;
    assert_eq!(tuned.graph_id(), graph.id());

    let known = GraphSignal::from_pairs(&graph, &seeds);
    let auc = Auc::new(known);
    let tuned_auc = auc.evaluate(&tuned)?;
    let mut midpoint = GenericGraphFilter::new(vec![0.5, 0.5]);
    let baseline = midpoint.rank(&graph, Personalization::Sparse(&seeds))?;
    let baseline_auc = auc.evaluate(&baseline)?;
    assert!(
        tuned_auc >= baseline_auc - 1E-9,
        "{tuned_auc} vs {baseline_auc}"
    );
    Ok(())
}
