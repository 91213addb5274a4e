/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Signals and normalized operators working together across module
//! boundaries.

use anyhow::Result;
use graphrank::graphs::vec_graph::VecGraph;
use graphrank::preprocess::{Normalization, Preprocessor};
use graphrank::signal::GraphSignal;
use graphrank::traits::RandomAccessGraph;

fn star() -> VecGraph {
    // node 0 is the hub
    VecGraph::from_edges([(0, 1), (0, 2), (0, 3)])
}

#[test]
fn test_column_operator_preserves_signal_mass() -> Result<()> {
    let g = star();
    let preprocessor = Preprocessor::new(Normalization::Column);
    let operator = preprocessor.operator(&g);
    let x = GraphSignal::from_values(&g, vec![0.4, 0.3, 0.2, 0.1]);
    let mut out = vec![0.0; g.num_nodes()];
    operator.mul_vec(x.values(), &mut out);
    let mass: f64 = out.iter().sum();
    assert!((mass - x.sum()).abs() < 1E-12);
    Ok(())
}

#[test]
fn test_symmetric_operator_is_symmetric() -> Result<()> {
    let g = star();
    let preprocessor = Preprocessor::new(Normalization::Symmetric);
    let operator = preprocessor.operator(&g);
    // entry (v, u) equals entry (u, v) for a symmetric graph
    for u in 0..g.num_nodes() {
        for (v, w) in operator.row(u) {
            let mirrored = operator
                .row(v)
                .find(|&(col, _)| col == u)
                .map(|(_, w)| w)
                .unwrap();
            assert_eq!(w, mirrored, "entry ({u}, {v})");
        }
    }
    Ok(())
}

#[test]
fn test_signal_arithmetic_tracks_the_graph() -> Result<()> {
    let g = star();
    let a = GraphSignal::from_pairs(&g, &[(0, 1.0), (2, 3.0)]);
    let b = GraphSignal::uniform(&g, 1.0);
    let sum = &a + &b;
    assert_eq!(sum.values(), &[2.0, 1.0, 4.0, 1.0]);
    assert_eq!(sum.graph_id(), g.id());
    let scaled = &sum * 0.5;
    assert_eq!(scaled.values(), &[1.0, 0.5, 2.0, 0.5]);
    Ok(())
}

#[test]
#[should_panic(expected = "different graphs")]
fn test_cross_graph_arithmetic_panics() {
    let g = star();
    let h = star();
    let a = GraphSignal::uniform(&g, 1.0);
    let b = GraphSignal::uniform(&h, 1.0);
    let _ = &a + &b;
}

#[test]
fn test_clone_creates_a_distinct_graph_identity() -> Result<()> {
    let g = star();
    let copy = g.copy();
    assert_ne!(g.id(), copy.id());
    let signal = GraphSignal::uniform(&g, 1.0);
    // a clone is a different signal universe
    assert_ne!(signal.graph_id(), copy.id());
    Ok(())
}
