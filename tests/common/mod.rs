//! Helpers shared by the integration tests.

#![allow(dead_code)]

use meso_traffic::{
    LinkAttributes, LinkFields, LinkId, NodeAttributes, NodeId, Simulation, SimulationConfig,
};

/// Checks `value` against `expected` with a relative tolerance, falling back
/// to an absolute tolerance of 0.1 when zero is expected.
pub fn equal_tolerance(value: f64, expected: f64, rel_tol: f64) -> bool {
    let abs_tol = if expected == 0.0 { 0.1 } else { 0.0 };
    (value - expected).abs() <= (expected * rel_tol).abs() + abs_tol
}

#[track_caller]
pub fn assert_close(value: f64, expected: f64) {
    assert_close_tol(value, expected, 0.1);
}

#[track_caller]
pub fn assert_close_tol(value: f64, expected: f64, rel_tol: f64) {
    assert!(
        equal_tolerance(value, expected, rel_tol),
        "{} is not within {}% of {}",
        value,
        rel_tol * 100.0,
        expected
    );
}

/// Checks the flow, density and speed of one cell.
#[track_caller]
pub fn assert_cell(
    fields: &LinkFields,
    cell: (usize, usize),
    q: f64,
    k: f64,
    v: f64,
    rel_tol: f64,
) {
    assert_close_tol(fields.q_mat[cell], q, rel_tol);
    assert_close_tol(fields.k_mat[cell], k, rel_tol);
    assert_close_tol(fields.v_mat[cell], v, rel_tol);
}

pub fn new_sim(deltan: u32, tmax: f64) -> Simulation {
    Simulation::new(SimulationConfig {
        deltan,
        tmax,
        random_seed: Some(0),
        ..Default::default()
    })
    .unwrap()
}

/// A 1 km link with the given free flow speed and jam density.
pub fn road(free_flow_speed: f64, jam_density: f64) -> LinkAttributes<'static> {
    LinkAttributes {
        length: 1000.0,
        free_flow_speed,
        jam_density,
        ..Default::default()
    }
}

/// Adds a chain of nodes joined by the given links, in order.
pub fn corridor(
    sim: &mut Simulation,
    nodes: &[NodeAttributes],
    links: &[LinkAttributes],
) -> (Vec<NodeId>, Vec<LinkId>) {
    assert_eq!(nodes.len(), links.len() + 1);
    let nodes = nodes
        .iter()
        .map(|attribs| sim.add_node(attribs).unwrap())
        .collect::<Vec<_>>();
    let links = links
        .iter()
        .zip(nodes.windows(2))
        .map(|(attribs, pair)| {
            sim.add_link(&LinkAttributes {
                from: pair[0],
                to: pair[1],
                ..attribs.clone()
            })
            .unwrap()
        })
        .collect();
    (nodes, links)
}

/// `n` plain nodes.
pub fn plain_nodes(n: usize) -> Vec<NodeAttributes<'static>> {
    (0..n)
        .map(|i| NodeAttributes {
            x: i as f64,
            ..Default::default()
        })
        .collect()
}
