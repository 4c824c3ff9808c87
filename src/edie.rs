//! Aggregation of platoon trajectories into traffic state fields.
//!
//! Each link is divided into cells of `dt` seconds by `dx` metres. Within a
//! cell, Edie's generalised definitions give the flow as the total distance
//! travelled divided by the cell area, and the density as the total time
//! spent divided by the cell area.

use crate::error::{positive, Result};
use crate::simulation::Clock;
use crate::util::bin_index;
use crate::{LinkId, LinkSet, PlatoonSet};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use std::ops::{Index, IndexMut};

/// The resolution of the aggregation grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdieConfig {
    /// The width of a time bin in s.
    pub dt: f64,
    /// The width of a space bin in m.
    pub dx: f64,
}

impl Default for EdieConfig {
    fn default() -> Self {
        Self {
            dt: 120.0,
            dx: 100.0,
        }
    }
}

impl EdieConfig {
    /// Checks that both bin widths are positive.
    pub fn validate(&self) -> Result<()> {
        positive("edie dt", self.dt)?;
        positive("edie dx", self.dx)?;
        Ok(())
    }
}

/// A dense matrix indexed by `(time bin, space bin)`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Grid {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl Grid {
    fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: vec![0.0; rows * cols],
        }
    }

    /// The number of time bins.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The number of space bins.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Gets a cell, or `None` if it is outside the grid.
    pub fn get(&self, t: usize, x: usize) -> Option<f64> {
        (t < self.rows && x < self.cols).then(|| self.values[t * self.cols + x])
    }

    /// A row of the grid: the values along the link in one time bin.
    pub fn row(&self, t: usize) -> &[f64] {
        &self.values[t * self.cols..(t + 1) * self.cols]
    }

    /// The mean over the link in one time bin.
    pub fn row_mean(&self, t: usize) -> f64 {
        mean(self.row(t).iter().copied())
    }

    /// The mean over time in one space bin.
    pub fn col_mean(&self, x: usize) -> f64 {
        mean((0..self.rows).map(|t| self[(t, x)]))
    }

    /// The mean of every cell.
    pub fn mean(&self) -> f64 {
        mean(self.values.iter().copied())
    }

    fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            values: self.values.iter().copied().map(f).collect(),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (count, total) = values.fold((0, 0.0), |(n, sum), v| (n + 1, sum + v));
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

impl Index<(usize, usize)> for Grid {
    type Output = f64;

    fn index(&self, (t, x): (usize, usize)) -> &f64 {
        assert!(t < self.rows && x < self.cols, "cell ({}, {}) outside grid", t, x);
        &self.values[t * self.cols + x]
    }
}

impl IndexMut<(usize, usize)> for Grid {
    fn index_mut(&mut self, (t, x): (usize, usize)) -> &mut f64 {
        assert!(t < self.rows && x < self.cols, "cell ({}, {}) outside grid", t, x);
        &mut self.values[t * self.cols + x]
    }
}

/// The flow, density and speed fields of one link.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkFields {
    /// Flow in veh/s.
    pub q_mat: Grid,
    /// Density in veh/m.
    pub k_mat: Grid,
    /// Speed in m/s. Empty cells take the free flow speed.
    pub v_mat: Grid,
    /// Total distance travelled per cell in veh·m.
    pub dn: Grid,
    /// Total time spent per cell in veh·s.
    pub tn: Grid,
}

/// The aggregated traffic state of every link.
#[derive(Clone, Debug)]
pub struct EdieState {
    config: EdieConfig,
    links: SecondaryMap<LinkId, LinkFields>,
}

impl EdieState {
    pub(crate) fn compute(
        config: &EdieConfig,
        clock: &Clock,
        deltan: f64,
        links: &LinkSet,
        platoons: &PlatoonSet,
    ) -> Self {
        let rows = bin_index(clock.tmax(), config.dt);
        let mut sums = links
            .iter()
            .map(|(id, link)| {
                let cols = bin_index(link.length(), config.dx);
                (id, (Grid::zeros(rows, cols), Grid::zeros(rows, cols)))
            })
            .collect::<SecondaryMap<_, _>>();

        let samples = platoons
            .values()
            .flat_map(|p| p.trajectory().iter())
            .sorted_by_key(|s| s.link);
        for (link_id, group) in &samples.group_by(|s| s.link) {
            let Some((tn, dn)) = sums.get_mut(link_id) else {
                continue;
            };
            for sample in group {
                let t = bin_index(sample.time, config.dt);
                let x = bin_index(sample.pos, config.dx);
                if t >= rows || x >= tn.cols() {
                    continue;
                }
                tn[(t, x)] += clock.dt() * deltan;
                dn[(t, x)] += sample.speed * clock.dt() * deltan;
            }
        }

        let area = config.dt * config.dx;
        let fields = sums
            .into_iter()
            .map(|(id, (tn, dn))| {
                let u = links[id].fd().free_flow_speed();
                let k_mat = tn.map(|v| v / area);
                let q_mat = dn.map(|v| v / area);
                let values = q_mat
                    .values
                    .iter()
                    .zip(&k_mat.values)
                    .map(|(q, k)| if *k > 0.0 { q / k } else { u })
                    .collect();
                let v_mat = Grid {
                    values,
                    ..q_mat.clone()
                };
                (
                    id,
                    LinkFields {
                        q_mat,
                        k_mat,
                        v_mat,
                        dn,
                        tn,
                    },
                )
            })
            .collect();

        Self {
            config: *config,
            links: fields,
        }
    }

    /// The resolution the state was computed at.
    pub fn config(&self) -> &EdieConfig {
        &self.config
    }

    /// The fields of a link.
    pub fn link(&self, link_id: LinkId) -> Option<&LinkFields> {
        self.links.get(link_id)
    }
}

impl Index<LinkId> for EdieState {
    type Output = LinkFields;

    fn index(&self, link_id: LinkId) -> &LinkFields {
        &self.links[link_id]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        Demand, Error, LinkAttributes, NodeAttributes, Signal, Simulation, SimulationConfig,
    };
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn grid_means() {
        let mut grid = Grid::zeros(2, 3);
        grid[(0, 0)] = 3.0;
        grid[(1, 2)] = 6.0;
        assert_approx_eq!(grid.row_mean(0), 1.0);
        assert_approx_eq!(grid.col_mean(2), 3.0);
        assert_approx_eq!(grid.mean(), 1.5);
        assert_eq!(grid.get(2, 0), None);
        assert_eq!(grid.row(1), &[0.0, 0.0, 6.0]);
    }

    #[test]
    fn steady_free_flow() {
        let mut sim = Simulation::new(SimulationConfig {
            tmax: 1000.0,
            ..Default::default()
        })
        .unwrap();
        let a = sim.add_node(&NodeAttributes::default()).unwrap();
        let b = sim.add_node(&NodeAttributes::default()).unwrap();
        let link = sim
            .add_link(&LinkAttributes {
                from: a,
                to: b,
                length: 1000.0,
                free_flow_speed: 20.0,
                jam_density: 0.2,
                ..Default::default()
            })
            .unwrap();
        sim.add_demand(&Demand::new(a, b, 0.0, 500.0, 0.5)).unwrap();
        sim.run();

        let state = sim.edie_state(&EdieConfig::default()).unwrap();
        let fields = &state[link];
        assert_eq!(fields.q_mat.rows(), 8);
        assert_eq!(fields.q_mat.cols(), 10);
        assert_approx_eq!(fields.q_mat[(2, 5)], 0.5);
        assert_approx_eq!(fields.k_mat[(2, 5)], 0.025);
        assert_approx_eq!(fields.v_mat[(2, 5)], 20.0);
        assert_approx_eq!(fields.q_mat[(7, 5)], 0.0);
        assert_approx_eq!(fields.v_mat[(7, 5)], 20.0);
    }

    #[test]
    fn queue_at_link_end_is_outside_grid() {
        let mut sim = Simulation::new(SimulationConfig {
            tmax: 600.0,
            ..Default::default()
        })
        .unwrap();
        let a = sim.add_node(&NodeAttributes::default()).unwrap();
        let m = sim
            .add_node(&NodeAttributes {
                signal: Signal::from_durations(&[1000.0, 1000.0]).unwrap(),
                ..Default::default()
            })
            .unwrap();
        let b = sim.add_node(&NodeAttributes::default()).unwrap();
        let road = |from, to, signal_group| LinkAttributes {
            from,
            to,
            length: 1000.0,
            free_flow_speed: 20.0,
            jam_density: 0.2,
            signal_group,
            ..Default::default()
        };
        let approach = sim.add_link(&road(a, m, 1)).unwrap();
        sim.add_link(&road(m, b, 0)).unwrap();
        sim.add_demand(&Demand::new(a, b, 0.0, 300.0, 0.2)).unwrap();
        sim.run();

        let samples = sim
            .iter_platoons()
            .flat_map(|p| p.trajectory())
            .filter(|s| s.link == approach)
            .collect::<Vec<_>>();
        assert!(samples.iter().any(|s| s.pos == 1000.0));

        let state = sim.edie_state(&EdieConfig::default()).unwrap();
        let fields = &state[approach];
        assert_eq!(fields.tn.rows(), 5);
        assert_eq!(fields.tn.cols(), 10);
        let inside = samples
            .iter()
            .filter(|s| s.pos < 1000.0 && s.time < 600.0)
            .count();
        let total = fields.tn.mean() * 50.0;
        assert_approx_eq!(total, inside as f64 * 25.0);
    }

    #[test]
    fn rejects_empty_bins() {
        let sim = Simulation::new(SimulationConfig::default()).unwrap();
        let config = EdieConfig { dt: 0.0, dx: 100.0 };
        assert!(matches!(
            sim.edie_state(&config),
            Err(Error::InvalidParameter { name: "edie dt", .. })
        ));
    }
}
