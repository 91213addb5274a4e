/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use graphrank::graphs::vec_graph::VecGraph;
use graphrank::preprocess::{Normalization, Preprocessor};
use graphrank::signal::GraphSignal;
use graphrank::traits::RandomAccessGraph;
use graphrank_algo::convergence::ConvergenceManager;
use graphrank_algo::error::FilterError;
use graphrank_algo::filters::absorbing::AbsorbingWalks;
use graphrank_algo::filters::kernels::HeatKernel;
use graphrank_algo::filters::pagerank::PageRank;
use graphrank_algo::filters::{GraphFilter, NodeRanking, Personalization};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Builds a seeded random weighted digraph on `n` nodes with the given arc
/// probability. Isolated nodes are kept, so dangling columns occur.
fn random_graph(n: usize, arc_probability: f64, seed: u64) -> VecGraph {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut arcs = Vec::new();
    for u in 0..n {
        for v in 0..n {
            if u != v && rng.random::<f64>() < arc_probability {
                arcs.push(((u, v), rng.random_range(0.5..2.0)));
            }
        }
    }
    let mut g = VecGraph::empty(n);
    g.add_arcs(arcs);
    g
}

/// Returns the ℓ-∞ distance between two vectors.
fn l_inf_distance(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// Applies the column-normalized adjacency operator: scatters
/// `x[u] · w(u, v) / wdeg(u)` to each successor `v`. Dangling nodes
/// contribute nothing.
fn scatter(graph: &VecGraph, x: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; graph.num_nodes()];
    for u in 0..graph.num_nodes() {
        let wdeg = graph.weighted_outdegree(u);
        if wdeg == 0.0 {
            continue;
        }
        for (v, w) in graph.successors(u) {
            out[v] += x[u] * w / wdeg;
        }
    }
    out
}

/// Reference PageRank by plain power iteration, driven far below the
/// tolerances used in the comparisons.
fn power_method(graph: &VecGraph, alpha: f64, p: &[f64]) -> Vec<f64> {
    let mut x = p.to_vec();
    for _ in 0..1_000_000 {
        let mx = scatter(graph, &x);
        let next: Vec<f64> = mx
            .iter()
            .zip(p)
            .map(|(&m, &q)| alpha * m + (1.0 - alpha) * q)
            .collect();
        let diff: f64 = x.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum();
        x = next;
        if diff < 1E-15 {
            break;
        }
    }
    x
}

#[test]
fn test_reruns_are_bit_identical() {
    init_log();
    let g = random_graph(50, 0.1, 0);
    let seeds = [(0, 1.0), (7, 0.5)];
    let mut pr = PageRank::new();
    let first = pr.rank(&g, Personalization::Sparse(&seeds)).unwrap();
    let second = pr.rank(&g, Personalization::Sparse(&seeds)).unwrap();
    assert_eq!(first.values(), second.values());
    let mut other = PageRank::new();
    let third = other.rank(&g, Personalization::Sparse(&seeds)).unwrap();
    assert_eq!(first.values(), third.values());
}

#[test]
fn test_zero_personalization_short_circuits() {
    let g = random_graph(20, 0.2, 1);
    let mut pr = PageRank::new();
    let ranks = pr.rank(&g, Personalization::Dense(&vec![0.0; 20])).unwrap();
    assert!(ranks.values().iter().all(|&v| v == 0.0));
    assert_eq!(pr.last_iterations(), 0);
}

#[test]
fn test_budget_exhaustion_reports_iterations() {
    let g = random_graph(50, 0.1, 2);
    let mut pr = PageRank::new();
    pr.stopping_rule(Box::new(ConvergenceManager::new().tol(1E-15).max_iters(5)));
    let result = pr.rank(&g, Personalization::Uniform);
    assert_eq!(result, Err(FilterError::NotConverged { iterations: 5 }));
    assert_eq!(pr.last_iterations(), 5);
    assert_eq!(
        result.unwrap_err().to_string(),
        "Could not converge within 5 iterations"
    );
}

/// Absorbing walks with the default unit absorption rate solve the same
/// recurrence as PageRank, down to the floating-point operation order.
#[test]
fn test_unit_absorption_matches_pagerank() {
    for &alpha in &[0.5, 0.85, 0.99] {
        let g = random_graph(50, 0.1, 3);
        let seeds = [(3, 1.0), (11, 2.0)];
        let stop = || Box::new(ConvergenceManager::new().tol(1E-12).max_iters(100000));
        let mut pr = PageRank::new();
        pr.alpha(alpha).stopping_rule(stop());
        let mut aw = AbsorbingWalks::new();
        aw.alpha(alpha).stopping_rule(stop());
        let expected = pr.rank(&g, Personalization::Sparse(&seeds)).unwrap();
        let actual = aw.rank(&g, Personalization::Sparse(&seeds)).unwrap();
        assert_eq!(expected.values(), actual.values(), "alpha={alpha}");
        assert_eq!(pr.last_iterations(), aw.last_iterations());
    }
}

#[test]
fn test_pagerank_matches_power_method() {
    init_log();
    for &(n, arc_p, seed) in &[(10, 0.5, 4u64), (50, 0.1, 5), (200, 0.05, 6)] {
        let g = random_graph(n, arc_p, seed);
        let p = vec![1.0; n];
        for &alpha in &[0.25, 0.5, 0.85] {
            let expected = power_method(&g, alpha, &p);
            let mut pr = PageRank::new();
            pr.alpha(alpha)
                .preprocessor(Preprocessor::new(Normalization::Column))
                .stopping_rule(Box::new(
                    ConvergenceManager::new().tol(1E-14).max_iters(100000),
                ));
            let ranks = pr.rank(&g, Personalization::Uniform).unwrap();
            assert!(
                l_inf_distance(&expected, ranks.values()) < 1E-9,
                "n={n} alpha={alpha}: ℓ∞={}",
                l_inf_distance(&expected, ranks.values())
            );
        }
    }
}

/// The heat kernel must agree with a direct evaluation of its defining
/// series e⁻ᵗ Σₖ tᵏ/k! Mᵏp, summed far past the truncation point.
#[test]
fn test_heat_kernel_matches_direct_series() {
    let g = random_graph(50, 0.1, 7);
    let p = vec![1.0; 50];
    for &t in &[1.0f64, 3.0, 5.0] {
        let mut expected = vec![0.0; 50];
        let mut pk = p.clone();
        let mut c = (-t).exp();
        for k in 0..200 {
            if k > 0 {
                pk = scatter(&g, &pk);
                c *= t / k as f64;
            }
            for (e, &v) in expected.iter_mut().zip(&pk) {
                *e += c * v;
            }
        }
        let mut hk = HeatKernel::new();
        hk.t(t)
            .preprocessor(Preprocessor::new(Normalization::Column))
            .stopping_rule(Box::new(
                ConvergenceManager::new().tol(1E-12).max_iters(100000),
            ));
        let ranks = hk.rank(&g, Personalization::Uniform).unwrap();
        assert!(
            l_inf_distance(&expected, ranks.values()) < 1E-9,
            "t={t}: ℓ∞={}",
            l_inf_distance(&expected, ranks.values())
        );
    }
}

#[test]
fn test_foreign_signal_is_rejected() {
    let g = random_graph(20, 0.2, 8);
    let other = random_graph(20, 0.2, 8);
    let foreign = GraphSignal::uniform(&other, 1.0);
    let mut pr = PageRank::new();
    assert!(matches!(
        pr.rank(&g, Personalization::Signal(&foreign)),
        Err(FilterError::GraphMismatch { .. })
    ));
}
