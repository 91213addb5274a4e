/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Nelder-Mead simplex minimization clamped to a box.

/// Hard cap on iterations so disabled tolerances cannot spin forever.
const MAX_ITERATIONS: usize = 2000;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINKAGE: f64 = 0.5;

fn clamp(point: &mut [f64], min_vals: &[f64], max_vals: &[f64]) {
    for ((value, &lo), &hi) in point.iter_mut().zip(min_vals).zip(max_vals) {
        *value = value.clamp(lo, hi);
    }
}

/// Minimizes `loss` starting from `start`, keeping every trial point inside
/// the box. Stops when the simplex diameter falls below `parameter_tol`,
/// when the loss spread across the simplex falls below `deviation_tol`, or
/// after a fixed iteration cap.
pub(super) fn minimize(
    loss: &mut impl FnMut(&[f64]) -> f64,
    start: Vec<f64>,
    min_vals: &[f64],
    max_vals: &[f64],
    parameter_tol: Option<f64>,
    deviation_tol: Option<f64>,
) -> Vec<f64> {
    let dims = start.len();
    // initial simplex: the start point plus one vertex per dimension,
    // offset by 5% of that dimension's extent
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dims + 1);
    simplex.push(start.clone());
    for dim in 0..dims {
        let mut vertex = start.clone();
        let extent = max_vals[dim] - min_vals[dim];
        let offset = if extent > 0.0 { 0.05 * extent } else { 0.05 };
        vertex[dim] = if vertex[dim] + offset <= max_vals[dim] {
            vertex[dim] + offset
        } else {
            vertex[dim] - offset
        };
        clamp(&mut vertex, min_vals, max_vals);
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|vertex| loss(vertex)).collect();

    for _ in 0..MAX_ITERATIONS {
        let mut order: Vec<usize> = (0..simplex.len()).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        if converged(&simplex, &values, parameter_tol, deviation_tol) {
            break;
        }

        // centroid of all vertices but the worst
        let mut centroid = vec![0.0; dims];
        for vertex in &simplex[..dims] {
            for (c, v) in centroid.iter_mut().zip(vertex) {
                *c += v / dims as f64;
            }
        }
        let worst = simplex[dims].clone();
        let worst_value = values[dims];

        let mut reflected: Vec<f64> = centroid
            .iter()
            .zip(&worst)
            .map(|(c, w)| c + REFLECTION * (c - w))
            .collect();
        clamp(&mut reflected, min_vals, max_vals);
        let reflected_value = loss(&reflected);

        if reflected_value < values[0] {
            let mut expanded: Vec<f64> = centroid
                .iter()
                .zip(&worst)
                .map(|(c, w)| c + EXPANSION * (c - w))
                .collect();
            clamp(&mut expanded, min_vals, max_vals);
            let expanded_value = loss(&expanded);
            if expanded_value < reflected_value {
                simplex[dims] = expanded;
                values[dims] = expanded_value;
            } else {
                simplex[dims] = reflected;
                values[dims] = reflected_value;
            }
        } else if reflected_value < values[dims - 1] {
            simplex[dims] = reflected;
            values[dims] = reflected_value;
        } else {
            let mut contracted: Vec<f64> = centroid
                .iter()
                .zip(&worst)
                .map(|(c, w)| c + CONTRACTION * (w - c))
                .collect();
            clamp(&mut contracted, min_vals, max_vals);
            let contracted_value = loss(&contracted);
            if contracted_value < worst_value {
                simplex[dims] = contracted;
                values[dims] = contracted_value;
            } else {
                // shrink every vertex toward the best one
                let best = simplex[0].clone();
                for (vertex, value) in simplex.iter_mut().zip(values.iter_mut()).skip(1) {
                    for (v, b) in vertex.iter_mut().zip(&best) {
                        *v = b + SHRINKAGE * (*v - b);
                    }
                    clamp(vertex, min_vals, max_vals);
                    *value = loss(vertex);
                }
            }
        }
    }

    let best = values
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0);
    simplex.swap_remove(best)
}

fn converged(
    simplex: &[Vec<f64>],
    values: &[f64],
    parameter_tol: Option<f64>,
    deviation_tol: Option<f64>,
) -> bool {
    let diameter = simplex[1..]
        .iter()
        .map(|vertex| {
            vertex
                .iter()
                .zip(&simplex[0])
                .map(|(v, b)| (v - b).abs())
                .fold(0.0, f64::max)
        })
        .fold(0.0, f64::max);
    let spread = values[values.len() - 1] - values[0];
    parameter_tol.is_some_and(|tol| diameter <= tol)
        || deviation_tol.is_some_and(|tol| spread.abs() <= tol)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_minimizes_a_shifted_quadratic() {
        let mut loss = |p: &[f64]| (p[0] - 0.3).powi(2) + (p[1] - 0.6).powi(2);
        let best = minimize(
            &mut loss,
            vec![0.5, 0.5],
            &[0.0, 0.0],
            &[1.0, 1.0],
            Some(1E-10),
            None,
        );
        assert!((best[0] - 0.3).abs() < 1E-6, "got {}", best[0]);
        assert!((best[1] - 0.6).abs() < 1E-6, "got {}", best[1]);
    }

    #[test]
    fn test_respects_the_box() {
        // unconstrained minimum lies outside the box
        let mut loss = |p: &[f64]| (p[0] - 2.0).powi(2);
        let best = minimize(&mut loss, vec![0.5], &[0.0], &[1.0], Some(1E-10), None);
        assert!((best[0] - 1.0).abs() < 1E-6, "got {}", best[0]);
    }
}
