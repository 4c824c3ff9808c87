//! A mesoscopic traffic network simulator.
//!
//! Vehicles travel through a network of links and nodes as platoons of
//! `deltan` vehicles. Links move their platoons with Newell's simplified car
//! following model, nodes resolve merging, diverging and signalised transfers
//! between links, and the resulting trajectories can be aggregated into
//! flow, density and speed fields using Edie's generalised definitions.

pub use cgmath;
pub use config::{Scenario, SimulationConfig};
pub use demand::Demand;
pub use edie::{EdieConfig, EdieState, Grid, LinkFields};
pub use error::{Error, Result};
pub use fundamental::FundamentalDiagram;
pub use link::{Link, LinkAttributes, LinkState};
pub use node::{Node, NodeAttributes};
pub use platoon::{Platoon, PlatoonState, Route, TrajectorySample};
pub use signal::{Signal, SignalPhase, SignalPlan};
pub use simulation::{Clock, Simulation};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use stats::RunStats;
pub use util::Interval;

mod config;
mod demand;
mod edie;
mod error;
mod fundamental;
mod link;
mod node;
mod platoon;
mod signal;
mod simulation;
mod stats;
mod util;

new_key_type! {
    /// Unique ID of a [Node].
    pub struct NodeId;
    /// Unique ID of a [Link].
    pub struct LinkId;
    /// Unique ID of a [Platoon].
    pub struct PlatoonId;
}

/// A 2D point, used for node coordinates.
pub type Point2d = cgmath::Point2<f64>;

type NodeSet = SlotMap<NodeId, Node>;
type LinkSet = SlotMap<LinkId, Link>;
type PlatoonSet = SlotMap<PlatoonId, Platoon>;
