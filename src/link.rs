use crate::fundamental::FundamentalDiagram;
use crate::simulation::Clock;
use crate::{LinkId, NodeId, PlatoonId, PlatoonSet};
use serde::Serialize;
use std::collections::VecDeque;

/// A link is a directed road segment between two nodes.
///
/// The platoons on a link are kept in order, front (closest to the
/// downstream node) first, and never overtake one another.
#[derive(Clone, Debug)]
pub struct Link {
    /// The link ID.
    id: LinkId,
    /// A human readable name.
    name: String,
    /// The upstream node.
    from: NodeId,
    /// The downstream node.
    to: NodeId,
    /// Length in m.
    length: f64,
    /// The fundamental diagram.
    fd: FundamentalDiagram,
    /// Outflow capacity in veh/s, or `None` if unlimited.
    capacity_out: Option<f64>,
    /// Inflow capacity in veh/s, or `None` if unlimited.
    capacity_in: Option<f64>,
    /// The number of vehicles which may still leave the link.
    out_budget: f64,
    /// The number of vehicles which may still enter the link.
    in_budget: f64,
    /// Relative priority when merging with other links.
    merge_priority: f64,
    /// The signal group controlling the downstream end of the link.
    signal_group: u32,
    /// The platoons on the link, front first.
    platoons: VecDeque<PlatoonId>,
    /// Cumulative number of vehicles that have entered the link, one entry per step.
    cum_arrival: Vec<f64>,
    /// Cumulative number of vehicles that have left the link, one entry per step.
    cum_departure: Vec<f64>,
    /// Total number of vehicles that have entered the link.
    arrivals: f64,
    /// Total number of vehicles that have left the link.
    departures: f64,
}

/// The attributes of a link.
#[derive(Clone, Debug, Default)]
pub struct LinkAttributes<'a> {
    /// A human readable name.
    pub name: &'a str,
    /// The upstream node.
    pub from: NodeId,
    /// The downstream node.
    pub to: NodeId,
    /// The length in m.
    pub length: f64,
    /// The free flow speed in m/s.
    pub free_flow_speed: f64,
    /// The jam density in veh/m.
    pub jam_density: f64,
    /// Maximum outflow in veh/s.
    pub capacity_out: Option<f64>,
    /// Maximum inflow in veh/s.
    pub capacity_in: Option<f64>,
    /// Backward wave speed in m/s. Derived from the reaction time if absent.
    pub wave_speed: Option<f64>,
    /// Merge priority. Defaults to the link's outflow capacity.
    pub merge_priority: Option<f64>,
    /// The signal group of the link at its downstream node.
    pub signal_group: u32,
}

/// A snapshot of the traffic on a link.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LinkState {
    /// The number of platoons.
    pub platoons: usize,
    /// The number of vehicles.
    pub vehicles: f64,
    /// Mean density in veh/m.
    pub density: f64,
    /// Mean speed of the platoons over the last step, in m/s.
    pub speed: f64,
    /// Instantaneous travel time in s.
    pub travel_time: f64,
}

impl Link {
    /// Creates a new link.
    pub(crate) fn new(
        id: LinkId,
        attribs: &LinkAttributes,
        fd: FundamentalDiagram,
        dt: f64,
    ) -> Self {
        let merge_priority = attribs
            .merge_priority
            .or(attribs.capacity_out)
            .unwrap_or_else(|| fd.capacity());
        Self {
            id,
            name: attribs.name.to_owned(),
            from: attribs.from,
            to: attribs.to,
            length: attribs.length,
            fd,
            capacity_out: attribs.capacity_out,
            capacity_in: attribs.capacity_in,
            out_budget: attribs.capacity_out.map_or(f64::INFINITY, |c| c * dt),
            in_budget: attribs.capacity_in.map_or(f64::INFINITY, |c| c * dt),
            merge_priority,
            signal_group: attribs.signal_group,
            platoons: VecDeque::new(),
            cum_arrival: vec![],
            cum_departure: vec![],
            arrivals: 0.0,
            departures: 0.0,
        }
    }

    /// Gets the link ID.
    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The upstream node.
    pub fn origin_node(&self) -> NodeId {
        self.from
    }

    /// The downstream node.
    pub fn destination_node(&self) -> NodeId {
        self.to
    }

    /// Gets the length of the link in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The link's fundamental diagram.
    pub fn fd(&self) -> &FundamentalDiagram {
        &self.fd
    }

    /// The time taken to traverse the link at the free flow speed, in s.
    pub fn free_flow_time(&self) -> f64 {
        self.length / self.fd.free_flow_speed()
    }

    pub fn capacity_out(&self) -> Option<f64> {
        self.capacity_out
    }

    pub fn capacity_in(&self) -> Option<f64> {
        self.capacity_in
    }

    pub fn merge_priority(&self) -> f64 {
        self.merge_priority
    }

    pub fn signal_group(&self) -> u32 {
        self.signal_group
    }

    /// The platoons on the link, front first.
    pub fn platoons(&self) -> impl Iterator<Item = PlatoonId> + '_ {
        self.platoons.iter().copied()
    }

    /// The platoon closest to the downstream node.
    pub fn front(&self) -> Option<PlatoonId> {
        self.platoons.front().copied()
    }

    /// The cumulative number of vehicles which had entered the link by the end of each step.
    pub fn cum_arrival(&self) -> &[f64] {
        &self.cum_arrival
    }

    /// The cumulative number of vehicles which had left the link by the end of each step.
    pub fn cum_departure(&self) -> &[f64] {
        &self.cum_departure
    }

    /// The minimum spacing between two consecutive platoons in m.
    pub(crate) fn jam_gap(&self, deltan: f64) -> f64 {
        self.fd.jam_spacing() * deltan
    }

    /// Tops up the inflow and outflow budgets for a new step.
    /// Budgets are only refilled while they cannot pass a whole platoon,
    /// so an idle link does not bank capacity.
    pub(crate) fn refill_budgets(&mut self, clock: &Clock, deltan: f64) {
        if let Some(capacity) = self.capacity_out {
            if self.out_budget < deltan {
                self.out_budget += capacity * clock.dt();
            }
        }
        if let Some(capacity) = self.capacity_in {
            if self.in_budget < deltan {
                self.in_budget += capacity * clock.dt();
            }
        }
    }

    /// Whether a platoon may enter the upstream end of the link this step.
    pub(crate) fn can_receive(&self, platoons: &PlatoonSet, deltan: f64) -> bool {
        let has_space = match self.platoons.back() {
            Some(id) => platoons[*id].pos() > self.jam_gap(deltan),
            None => true,
        };
        has_space && self.in_budget >= deltan
    }

    /// The receiving flow `R` in veh/s: the flow the link can absorb this step.
    pub fn receiving_flow(&self, platoons: &PlatoonSet, clock: &Clock, deltan: f64) -> f64 {
        if self.can_receive(platoons, deltan) {
            deltan / clock.dt()
        } else {
            0.0
        }
    }

    /// The front platoon and its next link, if it is waiting to leave this step.
    pub(crate) fn exit_request(
        &self,
        platoons: &PlatoonSet,
        deltan: f64,
    ) -> Option<(PlatoonId, LinkId)> {
        if self.out_budget < deltan {
            return None;
        }
        let front = &platoons[*self.platoons.front()?];
        if front.at_link_end(self) {
            front.next_link().map(|next| (front.id(), next))
        } else {
            None
        }
    }

    /// The sending flow `S` in veh/s: the flow the link can emit this step,
    /// disregarding any signal at the downstream node.
    pub fn sending_flow(&self, platoons: &PlatoonSet, clock: &Clock, deltan: f64) -> f64 {
        match self.exit_request(platoons, deltan) {
            Some(_) => deltan / clock.dt(),
            None => 0.0,
        }
    }

    /// Appends a platoon to the upstream end of the link.
    pub(crate) fn accept(&mut self, id: PlatoonId, deltan: f64) {
        self.platoons.push_back(id);
        self.arrivals += deltan;
        self.in_budget -= deltan;
    }

    /// Removes the front platoon so it can move to its next link.
    pub(crate) fn release(&mut self, deltan: f64) -> Option<PlatoonId> {
        let id = self.platoons.pop_front()?;
        self.departures += deltan;
        self.out_budget -= deltan;
        Some(id)
    }

    /// Removes the front platoon as it has reached its destination.
    /// Trips ending at the downstream node do not use the outflow capacity.
    pub(crate) fn finish(&mut self, deltan: f64) -> Option<PlatoonId> {
        let id = self.platoons.pop_front()?;
        self.departures += deltan;
        Some(id)
    }

    /// Computes the next position of every platoon on the link.
    ///
    /// Each platoon follows the start of step position of the platoon ahead,
    /// so the result does not depend on the order links are processed in.
    pub(crate) fn car_follow(&self, platoons: &mut PlatoonSet, clock: &Clock, deltan: f64) {
        let jam_gap = self.jam_gap(deltan);
        let mut leader_pos = None;
        for id in &self.platoons {
            let platoon = &mut platoons[*id];
            platoon.car_follow(self, leader_pos, clock.dt(), jam_gap);
            leader_pos = Some(platoon.pos());
        }
    }

    /// Appends this step's totals to the cumulative curves.
    pub(crate) fn record_cumulative(&mut self) {
        self.cum_arrival.push(self.arrivals);
        self.cum_departure.push(self.departures);
    }

    /// The number of vehicles on the link.
    pub fn vehicles(&self, deltan: f64) -> f64 {
        self.platoons.len() as f64 * deltan
    }

    /// The mean density on the link in veh/m.
    pub fn density(&self, deltan: f64) -> f64 {
        self.vehicles(deltan) / self.length
    }

    /// Summarises the current traffic state of the link.
    pub fn state(&self, platoons: &PlatoonSet, deltan: f64) -> LinkState {
        let speed = if self.platoons.is_empty() {
            self.fd.free_flow_speed()
        } else {
            let total = self.platoons.iter().map(|id| platoons[*id].speed()).sum::<f64>();
            total / self.platoons.len() as f64
        };
        let travel_time = if speed > 0.0 {
            self.length / speed
        } else {
            f64::INFINITY
        };
        LinkState {
            platoons: self.platoons.len(),
            vehicles: self.vehicles(deltan),
            density: self.density(deltan),
            speed,
            travel_time,
        }
    }

    /// Checks the link's structural invariants, returning a description of the first one violated.
    pub(crate) fn check_invariants(&self, platoons: &PlatoonSet, deltan: f64) -> Option<String> {
        let density = self.density(deltan);
        // One platoon of slack, as the rearmost platoon may sit right at the entrance.
        let limit = self.fd.jam_density() + deltan / self.length;
        if density > limit * (1.0 + 1e-9) {
            return Some(format!(
                "density {:.4} exceeds jam density {:.4}",
                density,
                self.fd.jam_density()
            ));
        }
        let positions = self.platoons.iter().map(|id| platoons[*id].pos());
        let mut ahead = f64::INFINITY;
        for pos in positions {
            if pos > ahead || pos < 0.0 || pos > self.length {
                return Some(format!("platoon at {:.2} out of order or off the link", pos));
            }
            ahead = pos;
        }
        None
    }
}
