/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Evaluation measures for node-ranking signals.
//!
//! A [`Measure`] scores a ranking signal against reference data held by the
//! measure itself (ground-truth labels, a sensitive-group indicator, or
//! both). [`Measure::best_direction`] tells optimizers whether larger
//! values are better (`1.0`) or worse (`-1.0`), so losses can be formed as
//! `-direction * value` without special-casing each metric.

use graphrank::signal::{safe_div, GraphSignal};
use kahan::KahanSum;

use crate::error::FilterError;

/// A quality or fairness score for a ranking signal.
pub trait Measure {
    /// Evaluates the measure on `scores`.
    ///
    /// Fails with [`FilterError::GraphMismatch`] if `scores` does not
    /// belong to the same graph as the measure's reference signals.
    fn evaluate(&self, scores: &GraphSignal) -> Result<f64, FilterError>;

    /// `1.0` if larger values are better, `-1.0` if smaller are.
    fn best_direction(&self) -> f64 {
        1.0
    }
}

fn check_graph(reference: &GraphSignal, scores: &GraphSignal) -> Result<(), FilterError> {
    if reference.graph_id() != scores.graph_id() {
        return Err(FilterError::GraphMismatch {
            graph: reference.graph_id(),
            signal: scores.graph_id(),
        });
    }
    Ok(())
}

/// Mean absolute error against known scores. Smaller is better.
pub struct Mabs {
    known: GraphSignal,
}

impl Mabs {
    pub fn new(known: GraphSignal) -> Self {
        Self { known }
    }
}

impl Measure for Mabs {
    fn evaluate(&self, scores: &GraphSignal) -> Result<f64, FilterError> {
        check_graph(&self.known, scores)?;
        let mut sum = KahanSum::new();
        for (known, score) in self.known.values().iter().zip(scores.values()) {
            sum += (known - score).abs();
        }
        Ok(safe_div(sum.sum(), self.known.len() as f64))
    }

    fn best_direction(&self) -> f64 {
        -1.0
    }
}

/// Euclidean distance from known scores. Smaller is better.
pub struct Euclidean {
    known: GraphSignal,
}

impl Euclidean {
    pub fn new(known: GraphSignal) -> Self {
        Self { known }
    }
}

impl Measure for Euclidean {
    fn evaluate(&self, scores: &GraphSignal) -> Result<f64, FilterError> {
        check_graph(&self.known, scores)?;
        let mut sum = KahanSum::new();
        for (known, score) in self.known.values().iter().zip(scores.values()) {
            sum += (known - score) * (known - score);
        }
        Ok(sum.sum().sqrt())
    }

    fn best_direction(&self) -> f64 {
        -1.0
    }
}

/// Pearson correlation with known scores.
pub struct PearsonCorrelation {
    known: GraphSignal,
}

impl PearsonCorrelation {
    pub fn new(known: GraphSignal) -> Self {
        Self { known }
    }
}

impl Measure for PearsonCorrelation {
    fn evaluate(&self, scores: &GraphSignal) -> Result<f64, FilterError> {
        check_graph(&self.known, scores)?;
        let n = self.known.len() as f64;
        let mean_known = safe_div(self.known.sum(), n);
        let mean_scores = safe_div(scores.sum(), n);
        let mut cov = KahanSum::new();
        let mut var_known = KahanSum::new();
        let mut var_scores = KahanSum::new();
        for (known, score) in self.known.values().iter().zip(scores.values()) {
            let dk = known - mean_known;
            let ds = score - mean_scores;
            cov += dk * ds;
            var_known += dk * dk;
            var_scores += ds * ds;
        }
        Ok(safe_div(
            cov.sum(),
            (var_known.sum() * var_scores.sum()).sqrt(),
        ))
    }
}

/// Area under the ROC curve against binary known labels.
///
/// Ties in the scores get the average of the rank positions they span.
/// Nodes marked nonzero in the optional exclusion signal (typically the
/// training seeds) are left out of the evaluation. A degenerate evaluation
/// set with a single class yields the uninformative value 0.5.
pub struct Auc {
    known: GraphSignal,
    exclude: Option<GraphSignal>,
}

impl Auc {
    pub fn new(known: GraphSignal) -> Self {
        Self {
            known,
            exclude: None,
        }
    }

    /// Excludes nodes marked nonzero in `exclude` from the evaluation.
    pub fn excluding(mut self, exclude: GraphSignal) -> Self {
        self.exclude = Some(exclude);
        self
    }
}

impl Measure for Auc {
    fn evaluate(&self, scores: &GraphSignal) -> Result<f64, FilterError> {
        check_graph(&self.known, scores)?;
        if let Some(exclude) = &self.exclude {
            check_graph(exclude, scores)?;
        }
        let evaluated: Vec<(f64, bool)> = self
            .known
            .iter_excluding(self.exclude.as_ref())
            .map(|(node, known)| (scores.get(node), known != 0.0))
            .collect();
        let positives = evaluated.iter().filter(|(_, positive)| *positive).count();
        let negatives = evaluated.len() - positives;
        if positives == 0 || negatives == 0 {
            log::warn!("AUC evaluated on a single-class set, returning 0.5");
            return Ok(0.5);
        }
        let mut order: Vec<usize> = (0..evaluated.len()).collect();
        order.sort_unstable_by(|&a, &b| evaluated[a].0.total_cmp(&evaluated[b].0));
        // 1-based fractional ranks, ties averaged
        let mut ranks = vec![0.0; evaluated.len()];
        let mut start = 0;
        while start < order.len() {
            let mut end = start;
            while end + 1 < order.len()
                && evaluated[order[end + 1]].0 == evaluated[order[start]].0
            {
                end += 1;
            }
            let rank = (start + end) as f64 / 2.0 + 1.0;
            for &index in &order[start..=end] {
                ranks[index] = rank;
            }
            start = end + 1;
        }
        let mut positive_ranks = KahanSum::new();
        for (index, (_, positive)) in evaluated.iter().enumerate() {
            if *positive {
                positive_ranks += ranks[index];
            }
        }
        let positives = positives as f64;
        Ok(
            (positive_ranks.sum() - positives * (positives + 1.0) / 2.0)
                / (positives * negatives as f64),
        )
    }
}

fn normalized_products(known: &GraphSignal, scores: &GraphSignal) -> (Vec<f64>, Vec<f64>) {
    let known_max = known.max();
    let score_max = scores.max();
    let known: Vec<f64> = known.values().iter().map(|&v| safe_div(v, known_max)).collect();
    let scores: Vec<f64> = scores.values().iter().map(|&v| safe_div(v, score_max)).collect();
    (known, scores)
}

/// True positive rate of the scores over the known positives.
///
/// Both signals are max-normalized, so graded scores contribute
/// fractionally.
pub struct Tpr {
    known: GraphSignal,
}

impl Tpr {
    pub fn new(known: GraphSignal) -> Self {
        Self { known }
    }
}

impl Measure for Tpr {
    fn evaluate(&self, scores: &GraphSignal) -> Result<f64, FilterError> {
        check_graph(&self.known, scores)?;
        let (known, scores) = normalized_products(&self.known, scores);
        let mut hits = KahanSum::new();
        let mut total = KahanSum::new();
        for (k, s) in known.iter().zip(&scores) {
            hits += k * s;
            total += *k;
        }
        Ok(safe_div(hits.sum(), total.sum()))
    }
}

/// True negative rate of the scores over the known negatives.
pub struct Tnr {
    known: GraphSignal,
}

impl Tnr {
    pub fn new(known: GraphSignal) -> Self {
        Self { known }
    }
}

impl Measure for Tnr {
    fn evaluate(&self, scores: &GraphSignal) -> Result<f64, FilterError> {
        check_graph(&self.known, scores)?;
        let (known, scores) = normalized_products(&self.known, scores);
        let mut hits = KahanSum::new();
        let mut total = KahanSum::new();
        for (k, s) in known.iter().zip(&scores) {
            hits += (1.0 - k) * (1.0 - s);
            total += 1.0 - *k;
        }
        Ok(safe_div(hits.sum(), total.sum()))
    }
}

/// Disparate-impact parity: the ratio between the smaller and the larger of
/// the two groups' mean scores. 1 is perfectly fair.
pub struct PRule {
    sensitive: GraphSignal,
}

impl PRule {
    pub fn new(sensitive: GraphSignal) -> Self {
        Self { sensitive }
    }
}

impl Measure for PRule {
    fn evaluate(&self, scores: &GraphSignal) -> Result<f64, FilterError> {
        check_graph(&self.sensitive, scores)?;
        let mut sensitive_mass = KahanSum::new();
        let mut sensitive_count = KahanSum::new();
        let mut rest_mass = KahanSum::new();
        let mut rest_count = KahanSum::new();
        for (s, score) in self.sensitive.values().iter().zip(scores.values()) {
            sensitive_mass += s * score;
            sensitive_count += *s;
            rest_mass += (1.0 - s) * score;
            rest_count += 1.0 - s;
        }
        let sensitive_mean = safe_div(sensitive_mass.sum(), sensitive_count.sum());
        let rest_mean = safe_div(rest_mass.sum(), rest_count.sum());
        Ok(safe_div(
            sensitive_mean.min(rest_mean),
            sensitive_mean.max(rest_mean),
        ))
    }
}

/// The base rate compared across groups by [`Mistreatment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMetric {
    Tpr,
    Tnr,
}

/// Disparate-mistreatment parity: one minus the absolute difference of a
/// base rate ([`GroupMetric`]) between the sensitive group and the rest.
/// 1 is perfectly fair.
pub struct Mistreatment {
    known: GraphSignal,
    sensitive: GraphSignal,
    metric: GroupMetric,
}

impl Mistreatment {
    pub fn new(known: GraphSignal, sensitive: GraphSignal, metric: GroupMetric) -> Self {
        Self {
            known,
            sensitive,
            metric,
        }
    }

    fn group_rate(&self, scores: &GraphSignal, in_sensitive: bool) -> f64 {
        let (known, scores) = normalized_products(&self.known, scores);
        let mut hits = KahanSum::new();
        let mut total = KahanSum::new();
        for ((k, s), group) in known.iter().zip(&scores).zip(self.sensitive.values()) {
            if (*group != 0.0) != in_sensitive {
                continue;
            }
            match self.metric {
                GroupMetric::Tpr => {
                    hits += k * s;
                    total += *k;
                }
                GroupMetric::Tnr => {
                    hits += (1.0 - k) * (1.0 - s);
                    total += 1.0 - *k;
                }
            }
        }
        safe_div(hits.sum(), total.sum())
    }
}

impl Measure for Mistreatment {
    fn evaluate(&self, scores: &GraphSignal) -> Result<f64, FilterError> {
        check_graph(&self.known, scores)?;
        check_graph(&self.sensitive, scores)?;
        let sensitive_rate = self.group_rate(scores, true);
        let rest_rate = self.group_rate(scores, false);
        Ok(1.0 - (sensitive_rate - rest_rate).abs())
    }
}

/// Arithmetic mean of component measures.
///
/// Components must agree on [`best_direction`](Measure::best_direction);
/// mixing directions panics at construction.
pub struct ArithmeticMean {
    measures: Vec<Box<dyn Measure>>,
}

impl ArithmeticMean {
    pub fn new(measures: Vec<Box<dyn Measure>>) -> Self {
        assert!(!measures.is_empty(), "No measures to average");
        let direction = measures[0].best_direction();
        assert!(
            measures
                .iter()
                .all(|measure| measure.best_direction() == direction),
            "Cannot average measures with opposite best directions"
        );
        Self { measures }
    }
}

impl Measure for ArithmeticMean {
    fn evaluate(&self, scores: &GraphSignal) -> Result<f64, FilterError> {
        let mut sum = KahanSum::new();
        for measure in &self.measures {
            sum += measure.evaluate(scores)?;
        }
        Ok(sum.sum() / self.measures.len() as f64)
    }

    fn best_direction(&self) -> f64 {
        self.measures[0].best_direction()
    }
}
