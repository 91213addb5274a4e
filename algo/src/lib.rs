/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Node-ranking algorithms for the graphrank framework.
//!
//! This crate turns a filter specification (a recurrence or a closed-form
//! polynomial over a normalized adjacency operator) into a convergent
//! iterative computation over graph signals:
//!
//! - [`filters`]: personalized PageRank, absorbing random walks, heat-kernel
//!   diffusion and generic polynomial filters;
//! - [`convergence`]: stateful stopping rules driving the filter loops;
//! - [`postprocess`]: composable rank transformations, including
//!   fairness-aware editing schemes;
//! - [`measures`]: scalar evaluation functions used as tuning losses;
//! - [`optimize`]: black-box minimization over bounded parameter boxes;
//! - [`tune`]: filter hyperparameter search over a train/validation split.

pub mod convergence;
pub mod error;
pub mod filters;
pub mod measures;
pub mod optimize;
pub mod postprocess;
pub mod tune;

pub mod prelude {
    pub use crate::convergence::{
        ConvergenceManager, ErrorMetric, RankOrderConvergenceManager, StoppingRule,
    };
    pub use crate::error::{FilterError, OptimizeError};
    pub use crate::filters::absorbing::AbsorbingWalks;
    pub use crate::filters::closed_form::{GenericGraphFilter, LowPassRecursiveGraphFilter};
    pub use crate::filters::kernels::{BiasedKernel, HeatKernel};
    pub use crate::filters::pagerank::PageRank;
    pub use crate::filters::{GraphFilter, NodeRanking, Personalization};
    pub use crate::measures::Measure;
    pub use crate::optimize::{Optimizer, PartitionStrategy, ShrinkStrategy, Strategy};
    pub use crate::postprocess::{Normalize, Ordinals, Tautology, Threshold};
    pub use crate::tune::ParameterTuner;
}
