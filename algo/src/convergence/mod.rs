/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Stopping rules for iterative graph filters.
//!
//! A [`StoppingRule`] is a stateful object polled once per iteration with the
//! current iterate. The standard implementation is [`ConvergenceManager`],
//! which compares consecutive iterates under an [error metric](ErrorMetric)
//! and fails with [`FilterError::NotConverged`] when its iteration budget is
//! exhausted. [`RankOrderConvergenceManager`] instead declares convergence
//! once the rank *ordering* is statistically stable, and
//! [`preds::PredicateRule`] adapts any composable [`Predicate`] over
//! [`preds::PredParams`] into a stopping rule.
//!
//! # Examples
//! ```
//! use graphrank_algo::convergence::{ConvergenceManager, StoppingRule};
//!
//! let mut convergence = ConvergenceManager::new().tol(1e-9);
//! convergence.start(true);
//! let mut x = vec![1.0, 0.0];
//! loop {
//!     x = vec![x[0] * 0.5, x[1]]; // some iterative update
//!     if convergence.has_converged(&x)? {
//!         break;
//!     }
//! }
//! # Ok::<(), graphrank_algo::error::FilterError>(())
//! ```

use std::time::{Duration, Instant};

use itertools::Itertools;
use kahan::KahanSum;

use crate::error::FilterError;

pub mod preds {
    //! Predicates implementing stopping conditions.
    //!
    //! [`PredicateRule`] runs an iterative computation until a composable
    //! [`Predicate`] over [`PredParams`] evaluates to true. You can combine
    //! the predicates of this module using the `and` and `or` methods
    //! provided by the [`Predicate`] trait.
    //!
    //! # Examples
    //! ```
    //! # fn main() -> Result<(), Box<dyn std::error::Error>> {
    //! use predicates::prelude::*;
    //! use graphrank_algo::convergence::preds::{ErrorBelow, MaxIter, PredicateRule};
    //!
    //! let mut predicate = ErrorBelow::try_from(1E-6)?.boxed();
    //! predicate = predicate.or(MaxIter::from(100)).boxed();
    //! let rule = PredicateRule::from(predicate);
    //! #     Ok(())
    //! # }
    //! ```

    use anyhow::ensure;
    use predicates::{reflection::PredicateReflection, Predicate};
    use std::fmt::Display;
    use std::time::{Duration, Instant};

    use super::{mean_absolute_difference, StoppingRule};
    use crate::error::FilterError;

    #[doc(hidden)]
    /// This structure is passed to stopping predicates to provide the
    /// information that is needed to evaluate them.
    #[derive(Debug)]
    pub struct PredParams {
        pub iteration: usize,
        pub error: f64,
    }

    /// Stops after at most the provided number of iterations.
    #[derive(Debug, Clone)]
    pub struct MaxIter {
        max_iter: usize,
    }

    impl MaxIter {
        pub const DEFAULT_MAX_ITER: usize = usize::MAX;
    }

    impl From<usize> for MaxIter {
        fn from(max_iter: usize) -> Self {
            MaxIter { max_iter }
        }
    }

    impl Default for MaxIter {
        fn default() -> Self {
            Self::from(Self::DEFAULT_MAX_ITER)
        }
    }

    impl Display for MaxIter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_fmt(format_args!("(max iter: {})", self.max_iter))
        }
    }

    impl PredicateReflection for MaxIter {}

    impl Predicate<PredParams> for MaxIter {
        fn eval(&self, pred_params: &PredParams) -> bool {
            pred_params.iteration >= self.max_iter
        }
    }

    /// Stops when the mean absolute difference between successive iterates
    /// falls below a given threshold.
    #[derive(Debug, Clone)]
    pub struct ErrorBelow {
        threshold: f64,
    }

    impl ErrorBelow {
        pub const DEFAULT_THRESHOLD: f64 = 1E-6;
    }

    impl TryFrom<Option<f64>> for ErrorBelow {
        type Error = anyhow::Error;
        fn try_from(threshold: Option<f64>) -> anyhow::Result<Self> {
            Ok(match threshold {
                Some(threshold) => {
                    ensure!(!threshold.is_nan());
                    ensure!(threshold > 0.0, "The threshold must be positive");
                    ErrorBelow { threshold }
                }
                None => Self::default(),
            })
        }
    }

    impl TryFrom<f64> for ErrorBelow {
        type Error = anyhow::Error;
        fn try_from(threshold: f64) -> anyhow::Result<Self> {
            Some(threshold).try_into()
        }
    }

    impl Default for ErrorBelow {
        fn default() -> Self {
            Self::try_from(Self::DEFAULT_THRESHOLD).unwrap()
        }
    }

    impl Display for ErrorBelow {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_fmt(format_args!("(error: {})", self.threshold))
        }
    }

    impl PredicateReflection for ErrorBelow {}
    impl Predicate<PredParams> for ErrorBelow {
        fn eval(&self, pred_params: &PredParams) -> bool {
            pred_params.error <= self.threshold
        }
    }

    /// Adapts a [`Predicate`] over [`PredParams`] into a [`StoppingRule`].
    ///
    /// The error field of [`PredParams`] is the mean absolute difference
    /// between successive iterates (infinite on the first call, when no
    /// previous iterate exists). The predicate evaluating to true means the
    /// computation should stop; this rule never reports a convergence
    /// failure.
    pub struct PredicateRule<P: Predicate<PredParams>> {
        predicate: P,
        iteration: usize,
        last: Option<Box<[f64]>>,
        started_at: Option<Instant>,
        elapsed: Duration,
    }

    impl<P: Predicate<PredParams>> From<P> for PredicateRule<P> {
        fn from(predicate: P) -> Self {
            Self {
                predicate,
                iteration: 0,
                last: None,
                started_at: None,
                elapsed: Duration::ZERO,
            }
        }
    }

    impl<P: Predicate<PredParams>> StoppingRule for PredicateRule<P> {
        fn start(&mut self, restart_timer: bool) {
            if restart_timer || self.started_at.is_none() {
                self.started_at = Some(Instant::now());
                self.elapsed = Duration::ZERO;
                self.iteration = 0;
            }
            self.last = None;
        }

        fn has_converged(&mut self, iterate: &[f64]) -> Result<bool, FilterError> {
            self.iteration += 1;
            let error = match &self.last {
                Some(last) => mean_absolute_difference(last, iterate),
                None => f64::INFINITY,
            };
            self.last = Some(iterate.into());
            if let Some(started_at) = self.started_at {
                self.elapsed = started_at.elapsed();
            }
            Ok(self.predicate.eval(&PredParams {
                iteration: self.iteration,
                error,
            }))
        }

        fn iteration(&self) -> usize {
            self.iteration
        }

        fn elapsed(&self) -> Duration {
            self.elapsed
        }
    }
}

/// Returns the mean absolute difference between two equal-length slices.
pub(crate) fn mean_absolute_difference(prev: &[f64], next: &[f64]) -> f64 {
    debug_assert_eq!(prev.len(), next.len());
    if prev.is_empty() {
        return 0.0;
    }
    let mut sum = KahanSum::new();
    for (&a, &b) in prev.iter().zip(next.iter()) {
        sum += (a - b).abs();
    }
    sum.sum() / prev.len() as f64
}

/// A stateful stopping rule polled once per filter iteration.
///
/// `start` must be called before the first `has_converged`; one call to
/// `has_converged` increments the iteration count exactly once, and the count
/// never decreases between `start` calls.
pub trait StoppingRule {
    /// Resets the rule for a new run.
    ///
    /// If `restart_timer` is false and a previous run exists, iteration and
    /// wall-clock accounting are preserved and only the last-iterate memory
    /// is cleared. This is used when a filter is re-entered with warm state,
    /// e.g. inside tuning loops.
    fn start(&mut self, restart_timer: bool);

    /// Checks whether convergence has been achieved by comparing this
    /// iteration's values with the previous iteration's.
    fn has_converged(&mut self, iterate: &[f64]) -> Result<bool, FilterError>;

    /// Returns the number of iterations seen since the last timer restart.
    fn iteration(&self) -> usize;

    /// Returns the wall-clock time spent since the last timer restart.
    fn elapsed(&self) -> Duration;
}

/// How to measure the "error" between consecutive iterates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMetric {
    /// Mean absolute difference.
    #[default]
    Mabs,
    /// Count-only sentinel: no numeric comparison is performed and
    /// convergence is declared exactly when the iteration budget is reached.
    Iterations,
}

/// The standard stopping rule: consecutive-iterate error under a tolerance.
///
/// Convergence is declared when the configured [`ErrorMetric`] between the
/// previous and current iterate is at most the tolerance. Reaching the
/// iteration budget is a [`FilterError::NotConverged`] failure, except in
/// [count-only mode](ErrorMetric::Iterations) where the budget itself is the
/// convergence point.
#[derive(Debug, Clone)]
pub struct ConvergenceManager {
    tol: f64,
    error_metric: ErrorMetric,
    max_iters: usize,
    iteration: usize,
    last: Option<Box<[f64]>>,
    started_at: Option<Instant>,
    elapsed: Duration,
}

impl Default for ConvergenceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvergenceManager {
    pub const DEFAULT_TOL: f64 = 1E-6;
    pub const DEFAULT_MAX_ITERS: usize = 100;

    /// Creates a manager with tolerance 10⁻⁶, the
    /// [`Mabs`](ErrorMetric::Mabs) metric and a 100-iteration budget.
    pub fn new() -> Self {
        Self {
            tol: Self::DEFAULT_TOL,
            error_metric: ErrorMetric::default(),
            max_iters: Self::DEFAULT_MAX_ITERS,
            iteration: 0,
            last: None,
            started_at: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Creates a count-only manager that declares convergence after exactly
    /// `iterations` iterations.
    ///
    /// Used to freeze an observed iteration budget so that repeated runs are
    /// comparable.
    pub fn fixed_iterations(iterations: usize) -> Self {
        Self::new()
            .error_metric(ErrorMetric::Iterations)
            .max_iters(iterations)
    }

    /// Sets the numerical tolerance.
    ///
    /// Values below the floating-point precision are snapped to
    /// [`f64::EPSILON`] to avoid spurious non-convergence from rounding
    /// noise.
    ///
    /// # Panics
    ///
    /// Panics if `tol` is NaN or nonpositive.
    pub fn tol(mut self, tol: f64) -> Self {
        assert!(tol > 0.0, "The tolerance must be positive, got {tol}");
        self.tol = tol.max(f64::EPSILON);
        self
    }

    /// Sets the error metric.
    pub fn error_metric(mut self, error_metric: ErrorMetric) -> Self {
        self.error_metric = error_metric;
        self
    }

    /// Sets the iteration budget.
    pub fn max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }
}

impl StoppingRule for ConvergenceManager {
    fn start(&mut self, restart_timer: bool) {
        if restart_timer || self.started_at.is_none() {
            self.started_at = Some(Instant::now());
            self.elapsed = Duration::ZERO;
            self.iteration = 0;
        }
        self.last = None;
    }

    fn has_converged(&mut self, iterate: &[f64]) -> Result<bool, FilterError> {
        self.iteration += 1;
        if let Some(started_at) = self.started_at {
            self.elapsed = started_at.elapsed();
        }
        if self.iteration >= self.max_iters {
            if self.error_metric == ErrorMetric::Iterations {
                return Ok(true);
            }
            return Err(FilterError::NotConverged {
                iterations: self.max_iters,
            });
        }
        let converged = match (&self.last, self.error_metric) {
            (_, ErrorMetric::Iterations) => false,
            (None, _) => false,
            (Some(last), ErrorMetric::Mabs) => mean_absolute_difference(last, iterate) <= self.tol,
        };
        self.last = Some(iterate.into());
        Ok(converged)
    }

    fn iteration(&self) -> usize {
        self.iteration
    }

    fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl std::fmt::Display for ConvergenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{} iterations ({:?})",
            self.iteration, self.elapsed
        ))
    }
}

/// The statistical criterion used by [`RankOrderConvergenceManager`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RankOrderCriterion {
    /// Derives the needed fraction of random walks from a normal-quantile
    /// bound over the gaps between sorted consecutive rank values. With
    /// fewer than two distinct consecutive gaps the rank order is already as
    /// stable as it can get and convergence is declared trivially.
    #[default]
    RankGap,
    /// Uses the configured confidence directly as the needed fraction of
    /// random walks.
    FractionOfWalks,
}

/// A stopping rule based on the statistical stability of rank ordering.
///
/// Tracks the running average of iterates and declares convergence once the
/// fraction of the PageRank random-walk series accumulated so far exceeds a
/// needed fraction derived from the chosen [`RankOrderCriterion`]. It never
/// fails with a convergence error.
#[derive(Debug, Clone)]
pub struct RankOrderConvergenceManager {
    pagerank_alpha: f64,
    confidence: f64,
    criterion: RankOrderCriterion,
    iteration: usize,
    accumulated: Option<Box<[f64]>>,
    started_at: Option<Instant>,
    elapsed: Duration,
}

impl RankOrderConvergenceManager {
    pub const DEFAULT_CONFIDENCE: f64 = 0.98;

    /// Creates a manager for the random-walk series of the given damping
    /// factor, with confidence 0.98 and the
    /// [`RankGap`](RankOrderCriterion::RankGap) criterion.
    ///
    /// # Panics
    ///
    /// Panics if `pagerank_alpha` is not in the interval [0 . . 1).
    pub fn new(pagerank_alpha: f64) -> Self {
        assert!(
            (0.0..1.0).contains(&pagerank_alpha),
            "The damping factor must be in [0 . . 1), got {pagerank_alpha}"
        );
        Self {
            pagerank_alpha,
            confidence: Self::DEFAULT_CONFIDENCE,
            criterion: RankOrderCriterion::default(),
            iteration: 0,
            accumulated: None,
            started_at: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Sets the confidence level.
    ///
    /// # Panics
    ///
    /// Panics if `confidence` is not in the open interval (0 . . 1).
    pub fn confidence(mut self, confidence: f64) -> Self {
        assert!(
            confidence > 0.0 && confidence < 1.0,
            "The confidence must be in (0 . . 1), got {confidence}"
        );
        self.confidence = confidence;
        self
    }

    /// Sets the convergence criterion.
    pub fn criterion(mut self, criterion: RankOrderCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Returns the fraction of the random-walk series covered by the
    /// iterations performed so far.
    ///
    /// The series Σₙ αⁿ/n converges to −ln(1 − α); the returned value is the
    /// partial sum up to the current iteration divided by that supremum.
    pub fn current_fraction_of_random_walks(&self) -> f64 {
        let sup_of_series_sum = -(1.0 - self.pagerank_alpha).ln();
        let mut series_sum = 0.0;
        let mut power = 1.0;
        for n in 1..=self.iteration {
            power *= self.pagerank_alpha;
            series_sum += power / n as f64;
        }
        series_sum / sup_of_series_sum
    }

    fn needed_fraction_of_random_walks(&self, iterate: &[f64]) -> f64 {
        match self.criterion {
            RankOrderCriterion::FractionOfWalks => self.confidence,
            RankOrderCriterion::RankGap => {
                let mut sorted = iterate.to_vec();
                sorted.sort_unstable_by(|a, b| a.total_cmp(b));
                let gaps: Vec<f64> = sorted
                    .iter()
                    .tuple_windows()
                    .filter(|(a, b)| a != b)
                    .map(|(a, b)| b - a)
                    .collect();
                if gaps.len() < 2 {
                    // fewer than two distinct consecutive values: the rank
                    // order cannot change, so any fraction suffices
                    return 0.0;
                }
                let max = gaps.iter().copied().fold(f64::MIN, f64::max);
                let min = gaps.iter().copied().fold(f64::MAX, f64::min);
                let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
                let std = (gaps.iter().map(|g| (g - mean) * (g - mean)).sum::<f64>()
                    / gaps.len() as f64)
                    .sqrt();
                1.0 - (max - min) / (norm_ppf(self.confidence) * std * gaps.len() as f64)
            }
        }
    }
}

impl StoppingRule for RankOrderConvergenceManager {
    fn start(&mut self, restart_timer: bool) {
        if restart_timer || self.started_at.is_none() {
            self.started_at = Some(Instant::now());
            self.elapsed = Duration::ZERO;
            self.iteration = 0;
            self.accumulated = None;
        }
    }

    fn has_converged(&mut self, iterate: &[f64]) -> Result<bool, FilterError> {
        let iteration = self.iteration as f64;
        self.accumulated = Some(match &self.accumulated {
            None => iterate.into(),
            Some(accumulated) => accumulated
                .iter()
                .zip(iterate.iter())
                .map(|(&acc, &new)| (acc * iteration + new) / (iteration + 1.0))
                .collect(),
        });
        self.iteration += 1;
        if let Some(started_at) = self.started_at {
            self.elapsed = started_at.elapsed();
        }
        Ok(self.current_fraction_of_random_walks() >= self.needed_fraction_of_random_walks(iterate))
    }

    fn iteration(&self) -> usize {
        self.iteration
    }

    fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Inverse of the standard normal cumulative distribution function.
///
/// Acklam's rational approximation, accurate to about 1.15·10⁻⁹ over the
/// whole domain; amply sufficient for deriving confidence bounds.
fn norm_ppf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    debug_assert!(p > 0.0 && p < 1.0);
    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}
