/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Black-box minimization over bounded parameter boxes.
//!
//! [`Optimizer`] minimizes an arbitrary loss closure over an axis-aligned
//! box, with a choice of [`Strategy`]: coordinate-descent grid search (the
//! default), a Nelder-Mead simplex, or a projected quasi-Newton method with
//! finite-difference gradients. The grid search is the most robust choice
//! for the noisy, non-smooth losses that arise from tuning ranking
//! pipelines; the other strategies converge faster on smooth objectives.
//!
//! Both stopping tolerances are optional. A missing tolerance simply never
//! triggers its stopping clause, and when both are missing the search
//! cannot run at all and the box midpoint is returned without evaluating
//! the loss.

mod lbfgsb;
mod nelder_mead;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::OptimizeError;

/// How the grid strategy lays out candidate values inside each
/// per-dimension search interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PartitionStrategy {
    /// This many evenly spaced points, endpoints included.
    Split(usize),
    /// Points at this fixed spacing from the interval's lower end.
    Step(f64),
}

impl Default for PartitionStrategy {
    fn default() -> Self {
        Self::Split(5)
    }
}

/// How the grid strategy shrinks search ranges between sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShrinkStrategy {
    /// Divide the current range by the configured factor after each sweep.
    #[default]
    Divide,
    /// Rescale the original range by `sweep^-factor`.
    Shrinking,
}

/// The minimization algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Coordinate-descent grid search with shrinking ranges.
    #[default]
    Grid,
    /// Nelder-Mead simplex, clamped to the box.
    NelderMead,
    /// Projected quasi-Newton descent with finite-difference gradients.
    Lbfgsb,
}

/// A configured black-box minimizer. See the [module](self) documentation.
///
/// # Examples
///
/// ```
/// use graphrank_algo::optimize::Optimizer;
///
/// let best = Optimizer::new(vec![0.0, 0.0], vec![1.0, 1.0])
///     .parameter_tol(Some(1E-8))
///     .optimize(|p| (p[0] - 0.25).powi(2) + (p[1] - 0.75).powi(2))
///     .unwrap();
/// assert!((best[0] - 0.25).abs() < 1E-6);
/// assert!((best[1] - 0.75).abs() < 1E-6);
/// ```
#[derive(Debug, Clone)]
pub struct Optimizer {
    min_vals: Vec<f64>,
    max_vals: Vec<f64>,
    deviation_tol: Option<f64>,
    parameter_tol: Option<f64>,
    divide_range: f64,
    partition: PartitionStrategy,
    shrink: ShrinkStrategy,
    strategy: Strategy,
    depth: usize,
    randomize: Option<u64>,
}

impl Optimizer {
    /// Creates a grid-search minimizer over the box `[min_vals, max_vals]`
    /// with a loss-deviation tolerance of 10⁻⁹.
    pub fn new(min_vals: Vec<f64>, max_vals: Vec<f64>) -> Self {
        Self {
            min_vals,
            max_vals,
            deviation_tol: Some(1E-9),
            parameter_tol: None,
            divide_range: 1.01,
            partition: PartitionStrategy::default(),
            shrink: ShrinkStrategy::default(),
            strategy: Strategy::default(),
            depth: 1,
            randomize: None,
        }
    }

    /// Stop when a full sweep improves the loss by no more than this.
    /// `None` disables the clause.
    pub fn deviation_tol(mut self, tol: Option<f64>) -> Self {
        self.deviation_tol = tol;
        self
    }

    /// Stop when every search range has shrunk below this. `None` disables
    /// the clause.
    pub fn parameter_tol(mut self, tol: Option<f64>) -> Self {
        self.parameter_tol = tol;
        self
    }

    /// The range-shrinking factor. Must exceed 1.
    pub fn divide_range(mut self, divide_range: f64) -> Self {
        assert!(
            divide_range > 1.0,
            "The range divisor must exceed 1, got {divide_range}"
        );
        self.divide_range = divide_range;
        self
    }

    pub fn partition(mut self, partition: PartitionStrategy) -> Self {
        self.partition = partition;
        self
    }

    pub fn shrink(mut self, shrink: ShrinkStrategy) -> Self {
        self.shrink = shrink;
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Restart the search this many times, each run centered on the
    /// previous best point.
    pub fn depth(mut self, depth: usize) -> Self {
        assert!(depth > 0, "The search depth must be positive, got {depth}");
        self.depth = depth;
        self
    }

    /// Start from a seeded random point in the box instead of the midpoint.
    pub fn randomize(mut self, seed: u64) -> Self {
        self.randomize = Some(seed);
        self
    }

    fn validate(&self) -> Result<(), OptimizeError> {
        if self.min_vals.len() != self.max_vals.len() {
            return Err(OptimizeError::InvalidBounds(format!(
                "{} lower bounds but {} upper bounds",
                self.min_vals.len(),
                self.max_vals.len()
            )));
        }
        if self.min_vals.is_empty() {
            return Err(OptimizeError::InvalidBounds(
                "The parameter box is empty".into(),
            ));
        }
        for (dim, (&lo, &hi)) in self.min_vals.iter().zip(&self.max_vals).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(OptimizeError::InvalidBounds(format!(
                    "Dimension {dim} has bounds [{lo}, {hi}]"
                )));
            }
        }
        if let PartitionStrategy::Split(points) = self.partition {
            if points == 0 {
                return Err(OptimizeError::InvalidConfig(
                    "The split partition needs at least one point".into(),
                ));
            }
        }
        if let PartitionStrategy::Step(step) = self.partition {
            if !(step > 0.0) {
                return Err(OptimizeError::InvalidConfig(format!(
                    "The partition step must be positive, got {step}"
                )));
            }
        }
        for tol in [self.deviation_tol, self.parameter_tol].into_iter().flatten() {
            if !(tol >= 0.0) {
                return Err(OptimizeError::InvalidConfig(format!(
                    "Tolerances must be nonnegative, got {tol}"
                )));
            }
        }
        Ok(())
    }

    fn start_point(&self) -> Vec<f64> {
        match self.randomize {
            Some(seed) => {
                let mut rng = SmallRng::seed_from_u64(seed);
                self.min_vals
                    .iter()
                    .zip(&self.max_vals)
                    .map(|(&lo, &hi)| {
                        if lo == hi {
                            lo
                        } else {
                            rng.random_range(lo..=hi)
                        }
                    })
                    .collect()
            }
            None => self
                .min_vals
                .iter()
                .zip(&self.max_vals)
                .map(|(&lo, &hi)| (lo + hi) / 2.0)
                .collect(),
        }
    }

    /// Minimizes `loss` over the box and returns the best point found.
    ///
    /// The loss must return a finite value or infinity; infinity marks an
    /// infeasible point and is never selected over a finite one.
    pub fn optimize(&self, mut loss: impl FnMut(&[f64]) -> f64) -> Result<Vec<f64>, OptimizeError> {
        self.validate()?;
        let start = self.start_point();
        // a degenerate box or disabled stopping clauses leave nothing to
        // search, so no evaluations happen at all
        let degenerate = self
            .min_vals
            .iter()
            .zip(&self.max_vals)
            .all(|(&lo, &hi)| lo == hi);
        if degenerate || (self.deviation_tol.is_none() && self.parameter_tol.is_none()) {
            return Ok(start);
        }
        let mut best = start;
        for _ in 0..self.depth {
            best = match self.strategy {
                Strategy::Grid => self.grid_search(&mut loss, best),
                Strategy::NelderMead => nelder_mead::minimize(
                    &mut loss,
                    best,
                    &self.min_vals,
                    &self.max_vals,
                    self.parameter_tol,
                    self.deviation_tol,
                ),
                Strategy::Lbfgsb => lbfgsb::minimize(
                    &mut loss,
                    best,
                    &self.min_vals,
                    &self.max_vals,
                    self.parameter_tol,
                    self.deviation_tol,
                ),
            };
        }
        Ok(best)
    }

    /// Like [`optimize`](Self::optimize), but evaluates `validation_loss` at
    /// every point that improves the training loss and logs both values.
    ///
    /// The validation value is reported for inspection only and never
    /// influences the returned point.
    pub fn optimize_with_validation(
        &self,
        mut loss: impl FnMut(&[f64]) -> f64,
        mut validation_loss: impl FnMut(&[f64]) -> f64,
    ) -> Result<Vec<f64>, OptimizeError> {
        let mut best_seen = f64::INFINITY;
        self.optimize(|params| {
            let value = loss(params);
            if value < best_seen {
                best_seen = value;
                log::debug!(
                    "Loss improved to {value} (validation loss {})",
                    validation_loss(params)
                );
            }
            value
        })
    }

    /// Coordinate-descent grid search: sweep the dimensions, trying a
    /// partition of each dimension's current interval while the others stay
    /// fixed, then shrink the intervals and repeat.
    fn grid_search(&self, loss: &mut impl FnMut(&[f64]) -> f64, start: Vec<f64>) -> Vec<f64> {
        let initial_ranges: Vec<f64> = self
            .min_vals
            .iter()
            .zip(&self.max_vals)
            .map(|(&lo, &hi)| hi - lo)
            .collect();
        let mut ranges = initial_ranges.clone();
        let mut best = start;
        let mut best_loss = loss(&best);
        let mut previous_loss = f64::INFINITY;
        let mut sweep = 0usize;
        loop {
            let range_exceeds = self
                .parameter_tol
                .is_some_and(|tol| ranges.iter().cloned().fold(0.0, f64::max) > tol);
            let still_improving = self
                .deviation_tol
                .is_some_and(|tol| (previous_loss - best_loss).abs() > tol);
            if !(range_exceeds || still_improving) {
                break;
            }
            previous_loss = best_loss;
            sweep += 1;
            for dim in 0..best.len() {
                let lo = (best[dim] - ranges[dim] / 2.0).max(self.min_vals[dim]);
                let hi = (best[dim] + ranges[dim] / 2.0).min(self.max_vals[dim]);
                for candidate in self.candidates(lo, hi) {
                    let kept = best[dim];
                    best[dim] = candidate;
                    let value = loss(&best);
                    if value < best_loss {
                        best_loss = value;
                    } else {
                        best[dim] = kept;
                    }
                }
            }
            for (range, &initial) in ranges.iter_mut().zip(&initial_ranges) {
                *range = match self.shrink {
                    ShrinkStrategy::Divide => *range / self.divide_range,
                    ShrinkStrategy::Shrinking => initial / (sweep as f64).powf(self.divide_range),
                };
            }
        }
        best
    }

    fn candidates(&self, lo: f64, hi: f64) -> Vec<f64> {
        if hi <= lo {
            return vec![lo];
        }
        match self.partition {
            PartitionStrategy::Split(1) => vec![(lo + hi) / 2.0],
            PartitionStrategy::Split(points) => (0..points)
                .map(|i| lo + (hi - lo) * i as f64 / (points - 1) as f64)
                .collect(),
            PartitionStrategy::Step(step) => {
                let mut values = Vec::new();
                let mut value = lo;
                while value <= hi {
                    values.push(value);
                    value += step;
                }
                values
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_invalid_bounds_are_rejected() {
        let result = Optimizer::new(vec![0.0, 1.0], vec![1.0, 0.0]).optimize(|_| 0.0);
        assert!(matches!(result, Err(OptimizeError::InvalidBounds(_))));
        let result = Optimizer::new(vec![0.0], vec![1.0, 1.0]).optimize(|_| 0.0);
        assert!(matches!(result, Err(OptimizeError::InvalidBounds(_))));
    }

    #[test]
    fn test_invalid_partition_is_rejected() {
        let result = Optimizer::new(vec![0.0], vec![1.0])
            .partition(PartitionStrategy::Step(0.0))
            .optimize(|_| 0.0);
        assert!(matches!(result, Err(OptimizeError::InvalidConfig(_))));
    }

    #[test]
    fn test_degenerate_box_evaluates_nothing() {
        let mut evaluations = 0;
        let best = Optimizer::new(vec![0.3, 0.7], vec![0.3, 0.7])
            .optimize(|_| {
                evaluations += 1;
                0.0
            })
            .unwrap();
        assert_eq!(best, vec![0.3, 0.7]);
        assert_eq!(evaluations, 0);
    }

    #[test]
    fn test_disabled_tolerances_return_the_midpoint() {
        let mut evaluations = 0;
        let best = Optimizer::new(vec![0.0, 0.0], vec![1.0, 2.0])
            .deviation_tol(None)
            .parameter_tol(None)
            .optimize(|_| {
                evaluations += 1;
                0.0
            })
            .unwrap();
        assert_eq!(best, vec![0.5, 1.0]);
        assert_eq!(evaluations, 0);
    }

    #[test]
    fn test_grid_minimizes_a_quartic() {
        let best = Optimizer::new(vec![0.0, 0.0], vec![5.0, 5.0])
            .deviation_tol(None)
            .parameter_tol(Some(1E-8))
            .divide_range(2.0)
            .partition(PartitionStrategy::Split(11))
            .optimize(|p| (p[0] - 2.0).powi(2) + (p[1] - 1.0).powi(4))
            .unwrap();
        assert!((best[0] - 2.0).abs() < 1E-6, "got {}", best[0]);
        assert!((best[1] - 1.0).abs() < 1E-6, "got {}", best[1]);
    }

    #[test]
    fn test_flat_landscape_terminates() {
        let best = Optimizer::new(vec![0.0], vec![1.0])
            .optimize(|_| 42.0)
            .unwrap();
        assert_eq!(best, vec![0.5]);
    }

    #[test]
    fn test_step_partition_hits_grid_values() {
        let best = Optimizer::new(vec![0.0], vec![1.0])
            .partition(PartitionStrategy::Step(0.25))
            .parameter_tol(Some(1E-6))
            .optimize(|p| (p[0] - 0.77).abs())
            .unwrap();
        assert!((best[0] - 0.77).abs() < 1E-2, "got {}", best[0]);
    }

    #[test]
    fn test_shrinking_strategy_converges() {
        let best = Optimizer::new(vec![0.0], vec![4.0])
            .shrink(ShrinkStrategy::Shrinking)
            .divide_range(2.0)
            .parameter_tol(Some(1E-6))
            .deviation_tol(None)
            .optimize(|p| (p[0] - 3.0).powi(2))
            .unwrap();
        assert!((best[0] - 3.0).abs() < 1E-3, "got {}", best[0]);
    }

    #[test]
    fn test_randomized_start_is_reproducible() {
        let optimizer = Optimizer::new(vec![0.0], vec![1.0]).randomize(42);
        let first = optimizer.clone().optimize(|p| (p[0] - 0.5).powi(2)).unwrap();
        let second = optimizer.optimize(|p| (p[0] - 0.5).powi(2)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_validation_loss_is_observed_but_never_chosen() {
        let mut validations = 0;
        let plain = Optimizer::new(vec![0.0], vec![4.0])
            .parameter_tol(Some(1E-8))
            .optimize(|p| (p[0] - 3.0).powi(2))
            .unwrap();
        let logged = Optimizer::new(vec![0.0], vec![4.0])
            .parameter_tol(Some(1E-8))
            .optimize_with_validation(
                |p| (p[0] - 3.0).powi(2),
                |_| {
                    validations += 1;
                    // a validation loss preferring the other end of the box
                    f64::INFINITY
                },
            )
            .unwrap();
        assert_eq!(plain, logged);
        assert!(validations > 0);
    }

    #[test]
    fn test_nelder_mead_strategy_minimizes_a_quadratic() {
        let best = Optimizer::new(vec![0.0, 0.0], vec![4.0, 4.0])
            .strategy(Strategy::NelderMead)
            .parameter_tol(Some(1E-9))
            .optimize(|p| (p[0] - 3.0).powi(2) + (p[1] - 1.0).powi(2))
            .unwrap();
        assert!((best[0] - 3.0).abs() < 1E-3, "got {}", best[0]);
        assert!((best[1] - 1.0).abs() < 1E-3, "got {}", best[1]);
    }

    #[test]
    fn test_lbfgsb_strategy_minimizes_a_quadratic() {
        let best = Optimizer::new(vec![0.0, 0.0], vec![4.0, 4.0])
            .strategy(Strategy::Lbfgsb)
            .optimize(|p| (p[0] - 3.0).powi(2) + (p[1] - 1.0).powi(2))
            .unwrap();
        assert!((best[0] - 3.0).abs() < 1E-3, "got {}", best[0]);
        assert!((best[1] - 1.0).abs() < 1E-3, "got {}", best[1]);
    }

    #[test]
    fn test_infinite_loss_regions_are_avoided() {
        let best = Optimizer::new(vec![0.0], vec![1.0])
            .parameter_tol(Some(1E-8))
            .optimize(|p| {
                if p[0] < 0.5 {
                    f64::INFINITY
                } else {
                    (p[0] - 0.75).powi(2)
                }
            })
            .unwrap();
        assert!((best[0] - 0.75).abs() < 1E-6, "got {}", best[0]);
    }
}
