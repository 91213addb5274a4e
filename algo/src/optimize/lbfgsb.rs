/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Projected quasi-Newton (BFGS) descent with finite-difference gradients.
//!
//! The loss is treated as a black box, so gradients come from central
//! differences and every trial point is projected back into the box. The
//! dense inverse-Hessian approximation is adequate at the low
//! dimensionalities of ranking-pipeline tuning.

const MAX_ITERATIONS: usize = 500;
const ARMIJO_C1: f64 = 1E-4;
const BACKTRACK: f64 = 0.5;
const MAX_BACKTRACKS: usize = 40;

fn project(point: &mut [f64], min_vals: &[f64], max_vals: &[f64]) {
    for ((value, &lo), &hi) in point.iter_mut().zip(min_vals).zip(max_vals) {
        *value = value.clamp(lo, hi);
    }
}

fn gradient(
    loss: &mut impl FnMut(&[f64]) -> f64,
    point: &[f64],
    min_vals: &[f64],
    max_vals: &[f64],
) -> Vec<f64> {
    let mut gradient = vec![0.0; point.len()];
    let mut probe = point.to_vec();
    for dim in 0..point.len() {
        let h = 1E-6 * (1.0 + point[dim].abs());
        let forward = (point[dim] + h).min(max_vals[dim]);
        let backward = (point[dim] - h).max(min_vals[dim]);
        if forward == backward {
            continue;
        }
        probe[dim] = forward;
        let above = loss(&probe);
        probe[dim] = backward;
        let below = loss(&probe);
        probe[dim] = point[dim];
        gradient[dim] = (above - below) / (forward - backward);
    }
    gradient
}

/// Minimizes `loss` from `start` inside the box. Stops when the projected
/// step falls below `parameter_tol`, the loss decrease falls below
/// `deviation_tol`, or an iteration cap is reached.
pub(super) fn minimize(
    loss: &mut impl FnMut(&[f64]) -> f64,
    start: Vec<f64>,
    min_vals: &[f64],
    max_vals: &[f64],
    parameter_tol: Option<f64>,
    deviation_tol: Option<f64>,
) -> Vec<f64> {
    let dims = start.len();
    let mut point = start;
    project(&mut point, min_vals, max_vals);
    let mut value = loss(&point);
    let mut grad = gradient(loss, &point, min_vals, max_vals);
    // inverse-Hessian approximation, started at the identity
    let mut inverse: Vec<Vec<f64>> = (0..dims)
        .map(|i| (0..dims).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for _ in 0..MAX_ITERATIONS {
        let mut direction: Vec<f64> = (0..dims)
            .map(|i| -(0..dims).map(|j| inverse[i][j] * grad[j]).sum::<f64>())
            .collect();
        let descent: f64 = direction.iter().zip(&grad).map(|(d, g)| d * g).sum();
        if descent >= 0.0 {
            // curvature information went stale, fall back to steepest descent
            for (d, g) in direction.iter_mut().zip(&grad) {
                *d = -g;
            }
        }

        let mut step = 1.0;
        let mut next = point.clone();
        let mut next_value = value;
        let mut accepted = false;
        for _ in 0..MAX_BACKTRACKS {
            for ((n, &p), &d) in next.iter_mut().zip(&point).zip(&direction) {
                *n = p + step * d;
            }
            project(&mut next, min_vals, max_vals);
            next_value = loss(&next);
            let predicted: f64 = next
                .iter()
                .zip(&point)
                .zip(&grad)
                .map(|((n, p), g)| (n - p) * g)
                .sum();
            if next_value <= value + ARMIJO_C1 * predicted && next_value < value {
                accepted = true;
                break;
            }
            step *= BACKTRACK;
        }
        if !accepted {
            break;
        }

        let displacement: Vec<f64> = next.iter().zip(&point).map(|(n, p)| n - p).collect();
        let step_size = displacement.iter().fold(0.0, |acc: f64, d| acc.max(d.abs()));
        let improvement = value - next_value;
        let next_grad = gradient(loss, &next, min_vals, max_vals);
        let grad_change: Vec<f64> = next_grad.iter().zip(&grad).map(|(n, g)| n - g).collect();

        // BFGS update, skipped when curvature is not informative
        let curvature: f64 = displacement
            .iter()
            .zip(&grad_change)
            .map(|(s, y)| s * y)
            .sum();
        if curvature > 1E-12 {
            let rho = 1.0 / curvature;
            let mut hy = vec![0.0; dims];
            for i in 0..dims {
                hy[i] = (0..dims).map(|j| inverse[i][j] * grad_change[j]).sum();
            }
            let yhy: f64 = grad_change.iter().zip(&hy).map(|(y, h)| y * h).sum();
            for i in 0..dims {
                for j in 0..dims {
                    inverse[i][j] += (1.0 + rho * yhy) * rho * displacement[i] * displacement[j]
                        - rho * (hy[i] * displacement[j] + displacement[i] * hy[j]);
                }
            }
        }

        point = next;
        value = next_value;
        grad = next_grad;

        let parameter_done = parameter_tol.is_some_and(|tol| step_size <= tol);
        let deviation_done = deviation_tol.is_some_and(|tol| improvement <= tol);
        if parameter_done || deviation_done {
            break;
        }
    }
    point
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_minimizes_a_quadratic_bowl() {
        let mut loss = |p: &[f64]| (p[0] - 0.2).powi(2) + 2.0 * (p[1] - 0.8).powi(2);
        let best = minimize(
            &mut loss,
            vec![0.5, 0.5],
            &[0.0, 0.0],
            &[1.0, 1.0],
            None,
            Some(1E-14),
        );
        assert!((best[0] - 0.2).abs() < 1E-4, "got {}", best[0]);
        assert!((best[1] - 0.8).abs() < 1E-4, "got {}", best[1]);
    }

    #[test]
    fn test_projection_keeps_iterates_in_the_box() {
        let mut loss = |p: &[f64]| (p[0] + 1.0).powi(2);
        let best = minimize(&mut loss, vec![0.5], &[0.0], &[1.0], None, Some(1E-14));
        assert!((best[0] - 0.0).abs() < 1E-4, "got {}", best[0]);
    }
}
