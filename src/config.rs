//! Run configuration and JSON scenario files.
//!
//! A scenario describes a whole run: the simulation parameters, the network
//! and the demand, with nodes and links referred to by name.
//!
//! ```json
//! {
//!   "config": { "deltan": 5, "tmax": 2000 },
//!   "nodes": [
//!     { "name": "orig", "x": 0, "y": 0 },
//!     { "name": "mid", "x": 1, "y": 0, "signal": [60, 60] },
//!     { "name": "dest", "x": 2, "y": 0 }
//!   ],
//!   "links": [
//!     { "name": "in", "from": "orig", "to": "mid", "length": 1000 },
//!     { "name": "out", "from": "mid", "to": "dest", "length": 1000, "capacity_out": 0.4 }
//!   ],
//!   "demands": [
//!     { "origin": "orig", "destination": "dest", "t_start": 0, "t_end": 500, "flow": 0.5 }
//!   ]
//! }
//! ```

use crate::error::{positive, Error, Result};
use crate::signal::{Signal, SignalPhase};
use crate::{Demand, EdieConfig, LinkAttributes, LinkId, NodeAttributes, NodeId, Simulation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Global parameters of a simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// A name for the run, used in log messages.
    pub name: String,
    /// The number of vehicles per platoon.
    pub deltan: u32,
    /// The simulation horizon in s.
    pub tmax: f64,
    /// The reaction time of a single vehicle in s.
    pub reaction_time: f64,
    /// Seed for randomised demand. Drawn from the OS if absent.
    pub random_seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            name: "simulation".to_owned(),
            deltan: 5,
            tmax: 3600.0,
            reaction_time: 1.0,
            random_seed: None,
        }
    }
}

impl SimulationConfig {
    /// The simulation step in s, the time a platoon takes to react.
    pub fn dt(&self) -> f64 {
        self.reaction_time * self.deltan as f64
    }

    /// Checks that the parameters describe a runnable simulation.
    pub fn validate(&self) -> Result<()> {
        positive("deltan", self.deltan as f64)?;
        positive("tmax", self.tmax)?;
        positive("reaction_time", self.reaction_time)?;
        Ok(())
    }
}

fn default_free_flow_speed() -> f64 {
    20.0
}

fn default_jam_density() -> f64 {
    0.2
}

/// A node in a scenario file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub flow_capacity: Option<f64>,
    /// Phase durations in s; phase `i` is green for signal group `i`.
    #[serde(default)]
    pub signal: Vec<f64>,
    /// Explicit signal phases, taking precedence over `signal`.
    #[serde(default)]
    pub phases: Vec<SignalPhase>,
}

impl NodeSpec {
    fn signal(&self) -> Result<Signal> {
        if self.phases.is_empty() {
            Signal::from_durations(&self.signal)
        } else {
            Signal::fixed_cycle(self.phases.clone())
        }
    }
}

/// A link in a scenario file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkSpec {
    pub name: String,
    /// Name of the upstream node.
    pub from: String,
    /// Name of the downstream node.
    pub to: String,
    pub length: f64,
    #[serde(default = "default_free_flow_speed")]
    pub free_flow_speed: f64,
    #[serde(default = "default_jam_density")]
    pub jam_density: f64,
    #[serde(default)]
    pub capacity_out: Option<f64>,
    #[serde(default)]
    pub capacity_in: Option<f64>,
    #[serde(default)]
    pub wave_speed: Option<f64>,
    #[serde(default)]
    pub merge_priority: Option<f64>,
    #[serde(default)]
    pub signal_group: u32,
}

/// A demand in a scenario file. Exactly one of `flow` and `volume` should be given.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DemandSpec {
    pub origin: String,
    pub destination: String,
    pub t_start: f64,
    pub t_end: f64,
    /// Flow in veh/s.
    #[serde(default)]
    pub flow: Option<f64>,
    /// Total number of vehicles over the window.
    #[serde(default)]
    pub volume: Option<f64>,
    /// Names of the links to follow, if not the shortest route.
    #[serde(default)]
    pub route: Option<Vec<String>>,
}

/// A complete simulation scenario.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: SimulationConfig,
    pub nodes: Vec<NodeSpec>,
    pub links: Vec<LinkSpec>,
    #[serde(default)]
    pub demands: Vec<DemandSpec>,
    /// Resolution of the aggregated traffic state, if it should be computed.
    #[serde(default)]
    pub edie: Option<EdieConfig>,
}

impl Scenario {
    /// Parses a scenario from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(json)?;
        if let Some(edie) = &scenario.edie {
            edie.validate()?;
        }
        Ok(scenario)
    }

    /// Reads a scenario from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Builds the network and demand of the scenario into a new simulation.
    pub fn build(&self) -> Result<Simulation> {
        if let Some(edie) = &self.edie {
            edie.validate()?;
        }
        let mut sim = Simulation::new(self.config.clone())?;

        let mut nodes = HashMap::<&str, NodeId>::new();
        for spec in &self.nodes {
            let id = sim.add_node(&NodeAttributes {
                name: &spec.name,
                x: spec.x,
                y: spec.y,
                flow_capacity: spec.flow_capacity,
                signal: spec.signal()?,
            })?;
            if nodes.insert(&spec.name, id).is_some() {
                return Err(Error::DuplicateName(spec.name.clone()));
            }
        }
        let node = |name: &str| {
            nodes
                .get(name)
                .copied()
                .ok_or_else(|| Error::UnknownNodeName(name.to_owned()))
        };

        let mut links = HashMap::<&str, LinkId>::new();
        for spec in &self.links {
            let id = sim.add_link(&LinkAttributes {
                name: &spec.name,
                from: node(&spec.from)?,
                to: node(&spec.to)?,
                length: spec.length,
                free_flow_speed: spec.free_flow_speed,
                jam_density: spec.jam_density,
                capacity_out: spec.capacity_out,
                capacity_in: spec.capacity_in,
                wave_speed: spec.wave_speed,
                merge_priority: spec.merge_priority,
                signal_group: spec.signal_group,
            })?;
            if links.insert(&spec.name, id).is_some() {
                return Err(Error::DuplicateName(spec.name.clone()));
            }
        }

        for spec in &self.demands {
            let origin = node(&spec.origin)?;
            let destination = node(&spec.destination)?;
            let mut demand = match (spec.flow, spec.volume) {
                (Some(flow), _) => Demand::new(origin, destination, spec.t_start, spec.t_end, flow),
                (None, Some(volume)) => {
                    Demand::with_volume(origin, destination, spec.t_start, spec.t_end, volume)?
                }
                (None, None) => {
                    return Err(Error::InvalidParameter {
                        name: "demand flow",
                        value: f64::NAN,
                        reason: "either a flow or a volume is required",
                    })
                }
            };
            if let Some(route) = &spec.route {
                let route = route
                    .iter()
                    .map(|name| {
                        links
                            .get(name.as_str())
                            .copied()
                            .ok_or_else(|| Error::UnknownLinkName(name.clone()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                demand = demand.with_route(route);
            }
            sim.add_demand(&demand)?;
        }

        Ok(sim)
    }
}
