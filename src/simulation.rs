use crate::config::SimulationConfig;
use crate::demand::{self, Demand};
use crate::edie::{EdieConfig, EdieState};
use crate::error::{positive, Error, Result};
use crate::fundamental::FundamentalDiagram;
use crate::link::{Link, LinkAttributes};
use crate::node::{Node, NodeAttributes, Transfer};
use crate::platoon::route::{Route, RouteTable};
use crate::platoon::Platoon;
use crate::stats::RunStats;
use crate::{LinkId, LinkSet, NodeId, NodeSet, PlatoonId, PlatoonSet};
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Log a progress summary once per this many steps.
const REPORT_INTERVAL: usize = 100;

/// Stop reporting invariant violations after this many.
const MAX_WARNINGS: usize = 20;

/// The simulation clock: the current step and the fixed step length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Clock {
    /// The index of the current step.
    step: usize,
    /// The step length in s.
    dt: f64,
    /// The simulation horizon in s.
    tmax: f64,
}

impl Clock {
    /// Creates a clock at time zero.
    pub fn new(dt: f64, tmax: f64) -> Self {
        Self { step: 0, dt, tmax }
    }

    /// The index of the current step.
    pub fn step(&self) -> usize {
        self.step
    }

    /// The time at the start of the current step in s.
    pub fn time(&self) -> f64 {
        self.step as f64 * self.dt
    }

    /// The step length in s.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// The simulation horizon in s.
    pub fn tmax(&self) -> f64 {
        self.tmax
    }

    /// The number of steps needed to reach the horizon.
    pub fn total_steps(&self) -> usize {
        (self.tmax / self.dt) as usize
    }

    /// Whether the horizon has been reached.
    pub fn is_finished(&self) -> bool {
        self.step >= self.total_steps()
    }

    fn advance(&mut self) {
        self.step += 1;
    }
}

/// A mesoscopic traffic simulation.
///
/// The lifecycle of a run is: build the network, add demand, step until the
/// horizon, then read the statistics and aggregate the trajectories. A
/// simulation cannot be restarted; create a new one for every run.
pub struct Simulation {
    /// The configuration of the run.
    config: SimulationConfig,
    /// The simulation clock.
    clock: Clock,
    /// The nodes in the network.
    nodes: NodeSet,
    /// The links in the network.
    links: LinkSet,
    /// Every platoon created so far, whatever its state.
    platoons: PlatoonSet,
    /// Platoons which have not departed yet, by departure step.
    scheduled: BTreeMap<usize, Vec<PlatoonId>>,
    /// Platoons which have reached their destination, in order of arrival.
    completed: Vec<PlatoonId>,
    /// Cache of free flow shortest routes.
    routes: RouteTable,
    /// Random number generator for randomised demand.
    rng: StdRng,
    /// The number of invariant violations logged.
    warnings: usize,
}

impl Simulation {
    /// Creates a new, empty simulation.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let clock = Clock::new(config.dt(), config.tmax);
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            clock,
            nodes: NodeSet::with_key(),
            links: LinkSet::with_key(),
            platoons: PlatoonSet::with_key(),
            scheduled: BTreeMap::new(),
            completed: vec![],
            routes: RouteTable::default(),
            rng,
            warnings: 0,
        })
    }

    /// The configuration of the run.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The simulation clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The number of vehicles per platoon.
    pub fn deltan(&self) -> f64 {
        self.config.deltan as f64
    }

    /// Adds a node to the network.
    pub fn add_node(&mut self, attributes: &NodeAttributes) -> Result<NodeId> {
        self.check_not_started()?;
        if let Some(capacity) = attributes.flow_capacity {
            positive("flow_capacity", capacity)?;
        }
        let dt = self.clock.dt();
        Ok(self
            .nodes
            .insert_with_key(|id| Node::new(id, attributes, dt)))
    }

    /// Adds a link between two existing nodes.
    pub fn add_link(&mut self, attributes: &LinkAttributes) -> Result<LinkId> {
        self.check_not_started()?;
        for node in [attributes.from, attributes.to] {
            if !self.nodes.contains_key(node) {
                return Err(Error::UnknownNode(node));
            }
        }
        let length = positive("length", attributes.length)?;
        let tau = self.config.reaction_time;
        let fd = match attributes.wave_speed {
            Some(w) => FundamentalDiagram::with_wave_speed(
                attributes.free_flow_speed,
                attributes.jam_density,
                tau,
                w,
            )?,
            None => {
                FundamentalDiagram::new(attributes.free_flow_speed, attributes.jam_density, tau)?
            }
        };
        for (name, value) in [
            ("capacity_out", attributes.capacity_out),
            ("capacity_in", attributes.capacity_in),
            ("merge_priority", attributes.merge_priority),
        ] {
            if let Some(value) = value {
                positive(name, value)?;
            }
        }
        let spacing = fd.jam_spacing() * self.deltan();
        if length < spacing {
            return Err(Error::LinkTooShort { length, spacing });
        }
        let dt = self.clock.dt();
        if length < fd.free_flow_speed() * dt {
            warn!(
                "link `{}` is shorter than the free flow distance of one step; \
                 travel times will be rounded up",
                attributes.name
            );
        }

        let id = self
            .links
            .insert_with_key(|id| Link::new(id, attributes, fd, dt));
        self.nodes[attributes.from].add_link_out(id);
        self.nodes[attributes.to].add_link_in(id);
        self.routes.clear();
        Ok(id)
    }

    /// Adds a demand, creating its platoons. Returns the number of platoons created.
    pub fn add_demand(&mut self, demand: &Demand) -> Result<usize> {
        self.check_not_started()?;
        demand.validate()?;
        let route = self.route_for(demand.origin, demand.destination, demand.route.as_deref())?;
        let departures = demand.departures(self.clock.dt(), self.deltan());
        for step in &departures {
            self.create_platoon(demand.origin, demand.destination, route.clone(), *step);
        }
        Ok(departures.len())
    }

    /// Adds a demand whose origin and destination are drawn at random, for
    /// every platoon, from the given sets of nodes. The draws depend only on
    /// the configured random seed.
    pub fn add_demand_nodes2nodes(
        &mut self,
        origins: &[NodeId],
        destinations: &[NodeId],
        t_start: f64,
        t_end: f64,
        flow: f64,
    ) -> Result<usize> {
        self.check_not_started()?;
        let template = Demand::new(NodeId::default(), NodeId::default(), t_start, t_end, flow);
        template.validate()?;
        let empty = |name: &'static str| Error::InvalidParameter {
            name,
            value: 0.0,
            reason: "needs at least one node",
        };
        if origins.is_empty() {
            return Err(empty("origins"));
        }
        if destinations.is_empty() {
            return Err(empty("destinations"));
        }

        // Nothing is scheduled, and the generator is left untouched, unless
        // every draw succeeds.
        let mut rng = self.rng.clone();
        let departures = demand::expand(template.window, flow, self.clock.dt(), self.deltan());
        let mut trips = Vec::with_capacity(departures.len());
        for step in departures {
            let origin = *origins.choose(&mut rng).ok_or_else(|| empty("origins"))?;
            let candidates = destinations
                .iter()
                .copied()
                .filter(|id| *id != origin)
                .collect::<Vec<_>>();
            let destination = *candidates
                .choose(&mut rng)
                .ok_or_else(|| empty("destinations"))?;
            let route = self.route_for(origin, destination, None)?;
            trips.push((origin, destination, route, step));
        }

        self.rng = rng;
        let count = trips.len();
        for (origin, destination, route, step) in trips {
            self.create_platoon(origin, destination, route, step);
        }
        Ok(count)
    }

    /// Finds or validates the route for a trip.
    fn route_for(
        &mut self,
        origin: NodeId,
        destination: NodeId,
        links: Option<&[LinkId]>,
    ) -> Result<Route> {
        for node in [origin, destination] {
            if !self.nodes.contains_key(node) {
                return Err(Error::UnknownNode(node));
            }
        }
        match links {
            Some(links) => Route::from_links(&self.links, origin, destination, links),
            None => self.routes.get(&self.nodes, &self.links, origin, destination),
        }
    }

    fn create_platoon(&mut self, origin: NodeId, destination: NodeId, route: Route, step: usize) {
        let size = self.deltan();
        let departure_time = step as f64 * self.clock.dt();
        let id = self.platoons.insert_with_key(|id| {
            Platoon::new(id, size, origin, destination, route, departure_time)
        });
        self.scheduled.entry(step).or_default().push(id);
    }

    fn check_not_started(&self) -> Result<()> {
        if self.clock.step() > 0 {
            Err(Error::AlreadyStarted)
        } else {
            Ok(())
        }
    }

    /// Whether the simulation has steps left before its horizon.
    pub fn is_running(&self) -> bool {
        !self.clock.is_finished()
    }

    /// Runs the simulation until the horizon.
    pub fn run(&mut self) {
        self.run_until(self.clock.tmax());
    }

    /// Runs the simulation until the clock reaches `time` seconds or the horizon,
    /// whichever comes first.
    pub fn run_until(&mut self, time: f64) {
        if self.clock.step() == 0 {
            info!(
                "{}: simulating {} nodes, {} links and {} platoons of {} vehicles, dt = {} s",
                self.config.name,
                self.nodes.len(),
                self.links.len(),
                self.platoons.len(),
                self.config.deltan,
                self.clock.dt()
            );
        }
        while self.is_running() && self.clock.time() < time {
            self.step();
        }
        if !self.is_running() {
            info!(
                "{}: finished at t = {} s\n{}",
                self.config.name,
                self.clock.time(),
                self.stats()
            );
        }
    }

    /// Advances the simulation by one step.
    pub fn step(&mut self) {
        let clock = self.clock;
        let deltan = self.deltan();

        self.refill(&clock, deltan);
        self.inject(deltan);
        let transfers = self.resolve(deltan);
        self.apply(&transfers, deltan);
        self.move_platoons(&clock, deltan);
        self.release_departures(&clock);
        self.check_invariants(deltan);

        if clock.step() % REPORT_INTERVAL == 0 {
            let running = self.links.values().map(|l| l.platoons().count()).sum::<usize>();
            debug!(
                "t = {} s: {} platoons running, {} completed",
                clock.time(),
                running,
                self.completed.len()
            );
        }
        self.clock.advance();
    }

    /// Tops up link and node budgets and advances the signals.
    fn refill(&mut self, clock: &Clock, deltan: f64) {
        for link in self.links.values_mut() {
            link.refill_budgets(clock, deltan);
        }
        for node in self.nodes.values_mut() {
            node.update(clock, deltan);
        }
    }

    /// Lets waiting platoons enter the network at their origins.
    fn inject(&mut self, deltan: f64) {
        let Self {
            nodes,
            links,
            platoons,
            ..
        } = self;
        for node in nodes.values_mut() {
            node.inject(links, platoons, deltan);
        }
    }

    /// Resolves the transfers at every node. Nodes only read the state of
    /// the links, so they may be resolved in any order.
    fn resolve(&mut self, deltan: f64) -> Vec<Transfer> {
        let Self {
            nodes,
            links,
            platoons,
            ..
        } = self;
        nodes
            .values_mut()
            .flat_map(|node| node.resolve(links, platoons, deltan))
            .collect()
    }

    /// Moves the transferred platoons onto their next links.
    fn apply(&mut self, transfers: &[Transfer], deltan: f64) {
        for transfer in transfers {
            let released = self.links[transfer.from].release(deltan);
            debug_assert_eq!(released, Some(transfer.platoon));
            self.links[transfer.to].accept(transfer.platoon, deltan);
            self.platoons[transfer.platoon].advance_link();
            trace!(
                "platoon {:?} moves from {} to {}",
                transfer.platoon,
                self.links[transfer.from].name(),
                self.links[transfer.to].name()
            );
        }
    }

    /// Applies car following on every link, then commits the new positions
    /// and completes the trips which have reached their destination.
    fn move_platoons(&mut self, clock: &Clock, deltan: f64) {
        for link in self.links.values() {
            link.car_follow(&mut self.platoons, clock, deltan);
        }
        for (link_id, link) in self.links.iter_mut() {
            for id in link.platoons() {
                self.platoons[id].commit(link_id, clock.time(), clock.dt());
            }
            while let Some(front) = link.front() {
                let platoon = &mut self.platoons[front];
                if !platoon.at_link_end(link) || platoon.next_link().is_some() {
                    break;
                }
                platoon.complete(clock.time());
                link.finish(deltan);
                self.completed.push(front);
            }
            link.record_cumulative();
        }
    }

    /// Moves the platoons whose departure time has come into their origin's queue.
    fn release_departures(&mut self, clock: &Clock) {
        let later = self.scheduled.split_off(&(clock.step() + 1));
        let due = std::mem::replace(&mut self.scheduled, later);
        for id in due.into_values().flatten() {
            let platoon = &mut self.platoons[id];
            platoon.set_waiting();
            self.nodes[platoon.origin()].enqueue(id);
        }
    }

    /// Logs any link whose state breaks the model's invariants.
    fn check_invariants(&mut self, deltan: f64) {
        if self.warnings >= MAX_WARNINGS {
            return;
        }
        for link in self.links.values() {
            if let Some(problem) = link.check_invariants(&self.platoons, deltan) {
                warn!("t = {} s, link `{}`: {}", self.clock.time(), link.name(), problem);
                self.warnings += 1;
                if self.warnings == MAX_WARNINGS {
                    warn!("further invariant violations will not be reported");
                    return;
                }
            }
        }
    }

    /// Returns an iterator over all the nodes.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Returns an iterator over all the links.
    pub fn iter_links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Returns an iterator over every platoon created, whatever its state.
    pub fn iter_platoons(&self) -> impl Iterator<Item = &Platoon> {
        self.platoons.values()
    }

    /// Returns an iterator over the completed platoons, in order of arrival.
    pub fn iter_completed(&self) -> impl Iterator<Item = &Platoon> {
        self.completed.iter().map(|id| &self.platoons[*id])
    }

    /// Gets a reference to the node with the given ID.
    pub fn get_node(&self, node_id: NodeId) -> &Node {
        &self.nodes[node_id]
    }

    /// Gets a reference to the link with the given ID.
    pub fn get_link(&self, link_id: LinkId) -> &Link {
        &self.links[link_id]
    }

    /// Gets a reference to the platoon with the given ID.
    pub fn get_platoon(&self, platoon_id: PlatoonId) -> &Platoon {
        &self.platoons[platoon_id]
    }

    /// Finds a node by name.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes.values().find(|n| n.name() == name).map(|n| n.id())
    }

    /// Finds a link by name.
    pub fn find_link(&self, name: &str) -> Option<LinkId> {
        self.links.values().find(|l| l.name() == name).map(|l| l.id())
    }

    /// The current traffic state of a link.
    pub fn link_state(&self, link_id: LinkId) -> crate::LinkState {
        self.links[link_id].state(&self.platoons, self.deltan())
    }

    /// The sending and receiving flows of a link at the current state, in veh/s.
    pub fn link_bounds(&self, link_id: LinkId) -> (f64, f64) {
        let link = &self.links[link_id];
        let deltan = self.deltan();
        (
            link.sending_flow(&self.platoons, &self.clock, deltan),
            link.receiving_flow(&self.platoons, &self.clock, deltan),
        )
    }

    /// Summarises the trips of the run so far.
    pub fn stats(&self) -> RunStats {
        RunStats::compute(self.platoons.values(), self.clock.step())
    }

    /// Aggregates the recorded trajectories into flow, density and speed
    /// fields using Edie's generalised definitions.
    pub fn edie_state(&self, config: &EdieConfig) -> Result<EdieState> {
        config.validate()?;
        Ok(EdieState::compute(
            config,
            &self.clock,
            self.deltan(),
            &self.links,
            &self.platoons,
        ))
    }
}
