/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Graph filters: iterative and closed-form node-ranking algorithms.
//!
//! A graph filter maps a personalization signal (the sparse prior from which
//! scores are diffused) to a converged score signal by repeatedly applying an
//! affine update derived from the graph's normalized adjacency operator.
//! Recursive filters ([`PageRank`](pagerank::PageRank),
//! [`AbsorbingWalks`](absorbing::AbsorbingWalks),
//! [`BiasedKernel`](kernels::BiasedKernel),
//! [`LowPassRecursiveGraphFilter`](closed_form::LowPassRecursiveGraphFilter))
//! iterate a recurrence until a [stopping rule](crate::convergence) fires;
//! closed-form filters ([`HeatKernel`](kernels::HeatKernel),
//! [`GenericGraphFilter`](closed_form::GenericGraphFilter)) accumulate a
//! weighted sum of operator powers applied to the personalization, driven
//! through the same stopping-rule interface for uniformity.
//!
//! Outputs are never renormalized automatically; chain a
//! [`Normalize`](crate::postprocess::Normalize) postprocessor if needed.

pub mod absorbing;
pub mod closed_form;
pub mod kernels;
pub mod pagerank;

use dsi_progress_logger::ProgressLog;
use graphrank::graphs::vec_graph::VecGraph;
use graphrank::preprocess::{Normalization, Preprocessor};
use graphrank::signal::GraphSignal;
use graphrank::traits::RandomAccessGraph;

use crate::convergence::{ConvergenceManager, StoppingRule};
use crate::error::FilterError;

/// A personalization specification accepted at the `rank` boundary.
///
/// Whatever the form, it is resolved into a [`GraphSignal`] over the target
/// graph before any iteration; specifications that cannot belong to the
/// graph's node universe are rejected with a [`FilterError`].
#[derive(Debug, Clone, Copy, Default)]
pub enum Personalization<'a> {
    /// Every node seeded with 1.
    #[default]
    Uniform,
    /// Sparse `(node, value)` pairs; unlisted nodes get zero.
    Sparse(&'a [(usize, f64)]),
    /// A dense value vector in node order.
    Dense(&'a [f64]),
    /// An existing signal, which must be defined over the target graph.
    Signal(&'a GraphSignal),
}

impl Personalization<'_> {
    /// Resolves this specification into a signal over `graph`.
    pub fn to_signal(&self, graph: &impl RandomAccessGraph) -> Result<GraphSignal, FilterError> {
        let num_nodes = graph.num_nodes();
        match *self {
            Personalization::Uniform => Ok(GraphSignal::uniform(graph, 1.0)),
            Personalization::Sparse(pairs) => {
                for &(node, _) in pairs {
                    if node >= num_nodes {
                        return Err(FilterError::InvalidNode { node, num_nodes });
                    }
                }
                Ok(GraphSignal::from_pairs(graph, pairs))
            }
            Personalization::Dense(values) => {
                if values.len() != num_nodes {
                    return Err(FilterError::LengthMismatch {
                        expected: num_nodes,
                        actual: values.len(),
                    });
                }
                Ok(GraphSignal::from_values(graph, values))
            }
            Personalization::Signal(signal) => {
                if signal.graph_id() != graph.id() {
                    return Err(FilterError::GraphMismatch {
                        graph: graph.id(),
                        signal: signal.graph_id(),
                    });
                }
                Ok(signal.clone())
            }
        }
    }
}

/// Anything that turns a personalization into a score signal over a graph.
///
/// Implemented both by [graph filters](GraphFilter) and by
/// [postprocessors](crate::postprocess), so the two compose freely into
/// chains.
pub trait NodeRanking {
    /// Computes scores for `graph` from the given personalization.
    fn rank(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
    ) -> Result<GraphSignal, FilterError>;
}

/// The extra capabilities of an actual filter, beyond ranking.
///
/// Exposing the stopping rule lets callers freeze an observed iteration
/// budget and restore the original rule afterwards, which is how
/// [`FairPersonalizer`](crate::postprocess::fairness::FairPersonalizer)
/// keeps candidate evaluations comparable.
pub trait GraphFilter: NodeRanking {
    /// Replaces the stopping rule, returning the previous one.
    fn swap_stopping_rule(&mut self, rule: Box<dyn StoppingRule>) -> Box<dyn StoppingRule>;

    /// Returns the number of iterations performed by the last `rank` call.
    fn last_iterations(&self) -> usize;
}

/// State shared by every filter: the operator source, the stopping rule and
/// the two iteration drivers.
pub(crate) struct FilterCore {
    preprocessor: Preprocessor,
    stopping: Box<dyn StoppingRule>,
    last_iterations: usize,
}

impl FilterCore {
    pub(crate) fn new() -> Self {
        Self {
            preprocessor: Preprocessor::new(Normalization::Auto),
            stopping: Box::new(ConvergenceManager::new()),
            last_iterations: 0,
        }
    }

    pub(crate) fn with_stopping(stopping: Box<dyn StoppingRule>) -> Self {
        Self {
            preprocessor: Preprocessor::new(Normalization::Auto),
            stopping,
            last_iterations: 0,
        }
    }

    pub(crate) fn set_preprocessor(&mut self, preprocessor: Preprocessor) {
        self.preprocessor = preprocessor;
    }

    pub(crate) fn set_stopping(&mut self, stopping: Box<dyn StoppingRule>) {
        self.stopping = stopping;
    }

    pub(crate) fn swap_stopping(&mut self, stopping: Box<dyn StoppingRule>) -> Box<dyn StoppingRule> {
        std::mem::replace(&mut self.stopping, stopping)
    }

    pub(crate) fn last_iterations(&self) -> usize {
        self.last_iterations
    }

    /// Runs the recurrence `x ← step(x, Mx)` until the stopping rule fires.
    ///
    /// `step` receives the 1-based iteration number, the personalization
    /// values, the current iterate, the operator applied to it, and the
    /// output slice to fill.
    pub(crate) fn rank_recursive(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
        pl: &mut impl ProgressLog,
        mut step: impl FnMut(usize, &[f64], &[f64], &[f64], &mut [f64]),
    ) -> Result<GraphSignal, FilterError> {
        let p = personalization.to_signal(graph)?;
        if let Some(zeros) = self.zero_personalization(graph, &p) {
            return Ok(zeros);
        }
        let n = graph.num_nodes();
        let operator = self.preprocessor.operator(graph);

        let mut x = p.values().to_vec();
        let mut mx = vec![0.0; n];
        let mut next = vec![0.0; n];

        self.stopping.start(true);
        pl.item_name("iteration");
        pl.expected_updates(None);
        pl.start("Computing ranks...");

        let mut iteration = 0;
        let outcome = loop {
            operator.mul_vec(&x, &mut mx);
            iteration += 1;
            step(iteration, p.values(), &x, &mx, &mut next);
            std::mem::swap(&mut x, &mut next);
            pl.light_update();
            match self.stopping.has_converged(&x) {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(e) => break Err(e),
            }
        };
        pl.done();
        self.last_iterations = self.stopping.iteration();
        outcome?;
        log::debug!(
            "Converged in {} iterations ({:?})",
            self.last_iterations,
            self.stopping.elapsed()
        );
        Ok(GraphSignal::from_values(graph, x))
    }

    /// Accumulates the series Σₖ cₖ·Mᵏp, polling the stopping rule on the
    /// partial sums.
    ///
    /// With a count-only rule this computes exactly as many terms as the
    /// budget; with an error-based rule the series is truncated once the
    /// partial sums stabilize under the tolerance.
    pub(crate) fn rank_closed_form(
        &mut self,
        graph: &VecGraph,
        personalization: Personalization,
        pl: &mut impl ProgressLog,
        mut coefficient: impl FnMut(usize) -> f64,
    ) -> Result<GraphSignal, FilterError> {
        let p = personalization.to_signal(graph)?;
        if let Some(zeros) = self.zero_personalization(graph, &p) {
            return Ok(zeros);
        }
        let n = graph.num_nodes();
        let operator = self.preprocessor.operator(graph);

        // pk holds Mᵏp for increasing k
        let mut pk = p.values().to_vec();
        let mut mx = vec![0.0; n];
        let c0 = coefficient(0);
        let mut acc: Vec<f64> = pk.iter().map(|&v| c0 * v).collect();

        self.stopping.start(true);
        pl.item_name("term");
        pl.expected_updates(None);
        pl.start("Accumulating series...");

        let mut k = 0;
        let outcome = loop {
            match self.stopping.has_converged(&acc) {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(e) => break Err(e),
            }
            k += 1;
            operator.mul_vec(&pk, &mut mx);
            std::mem::swap(&mut pk, &mut mx);
            let c = coefficient(k);
            for (a, &v) in acc.iter_mut().zip(pk.iter()) {
                *a += c * v;
            }
            pl.light_update();
        };
        pl.done();
        self.last_iterations = self.stopping.iteration();
        outcome?;
        log::debug!(
            "Series truncated after {} terms ({:?})",
            self.last_iterations,
            self.stopping.elapsed()
        );
        Ok(GraphSignal::from_values(graph, acc))
    }

    /// An all-zero personalization propagates to an all-zero output with no
    /// iteration at all (and, in particular, no division by zero).
    fn zero_personalization(&mut self, graph: &VecGraph, p: &GraphSignal) -> Option<GraphSignal> {
        if p.values().iter().all(|&v| v == 0.0) {
            log::debug!("All-zero personalization, skipping iteration");
            self.last_iterations = 0;
            Some(GraphSignal::zeros(graph))
        } else {
            None
        }
    }
}
