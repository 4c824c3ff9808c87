use crate::signal::Signal;
use crate::simulation::Clock;
use crate::{LinkId, LinkSet, NodeId, PlatoonId, PlatoonSet, Point2d};
use log::trace;
use smallvec::SmallVec;
use std::collections::VecDeque;

/// A node is a junction where links meet, or an origin or destination of trips.
#[derive(Clone, Debug)]
pub struct Node {
    /// The node ID.
    id: NodeId,
    /// A human readable name.
    name: String,
    /// Coordinates, only used for presentation.
    position: Point2d,
    /// Maximum total flow through the node in veh/s, or `None` if unlimited.
    flow_capacity: Option<f64>,
    /// The number of vehicles which may still pass through the node this step.
    budget: f64,
    /// The traffic signal.
    signal: Signal,
    /// The links which end at this node.
    links_in: SmallVec<[LinkId; 4]>,
    /// The links which start at this node.
    links_out: SmallVec<[LinkId; 4]>,
    /// Merge credit of each incoming link, parallel to `links_in`.
    credit: SmallVec<[f64; 4]>,
    /// Platoons waiting to enter the network at this node, in departure order.
    waiting: VecDeque<PlatoonId>,
}

/// The attributes of a node.
#[derive(Clone, Debug, Default)]
pub struct NodeAttributes<'a> {
    /// A human readable name.
    pub name: &'a str,
    /// The x coordinate.
    pub x: f64,
    /// The y coordinate.
    pub y: f64,
    /// Maximum total flow through the node in veh/s.
    pub flow_capacity: Option<f64>,
    /// The traffic control at the node.
    pub signal: Signal,
}

/// A platoon moving from one link to the next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Transfer {
    pub platoon: PlatoonId,
    pub from: LinkId,
    pub to: LinkId,
}

/// A platoon at the end of an incoming link which may move this step.
#[derive(Clone, Copy, Debug)]
struct Request {
    /// Index into `links_in`.
    slot: usize,
    platoon: PlatoonId,
    next: LinkId,
}

impl Node {
    /// Creates a new node.
    pub(crate) fn new(id: NodeId, attribs: &NodeAttributes, dt: f64) -> Self {
        Self {
            id,
            name: attribs.name.to_owned(),
            position: Point2d::new(attribs.x, attribs.y),
            flow_capacity: attribs.flow_capacity,
            budget: attribs.flow_capacity.map_or(f64::INFINITY, |c| c * dt),
            signal: attribs.signal.clone(),
            links_in: SmallVec::new(),
            links_out: SmallVec::new(),
            credit: SmallVec::new(),
            waiting: VecDeque::new(),
        }
    }

    /// Gets the node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's coordinates.
    pub fn position(&self) -> Point2d {
        self.position
    }

    pub fn flow_capacity(&self) -> Option<f64> {
        self.flow_capacity
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    /// The links which end at this node.
    pub fn links_in(&self) -> &[LinkId] {
        &self.links_in
    }

    /// The links which start at this node.
    pub fn links_out(&self) -> &[LinkId] {
        &self.links_out
    }

    /// The number of platoons waiting to enter the network here.
    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }

    pub(crate) fn add_link_in(&mut self, link_id: LinkId) {
        self.links_in.push(link_id);
        self.credit.push(0.0);
    }

    pub(crate) fn add_link_out(&mut self, link_id: LinkId) {
        self.links_out.push(link_id);
    }

    /// Queues a platoon to enter the network at this node.
    pub(crate) fn enqueue(&mut self, platoon: PlatoonId) {
        self.waiting.push_back(platoon);
    }

    /// Advances the signal and tops up the flow budget for a new step.
    pub(crate) fn update(&mut self, clock: &Clock, deltan: f64) {
        self.signal.step(clock.dt());
        if let Some(capacity) = self.flow_capacity {
            if self.budget < deltan {
                self.budget += capacity * clock.dt();
            }
        }
    }

    /// Lets the platoon at the head of the waiting queue enter its first link, if there is room.
    ///
    /// Only the head may enter, so a platoon bound for a full link holds
    /// back every platoon queued behind it.
    pub(crate) fn inject(
        &mut self,
        links: &mut LinkSet,
        platoons: &mut PlatoonSet,
        deltan: f64,
    ) -> Option<PlatoonId> {
        let head = *self.waiting.front()?;
        let link_id = platoons[head].first_link();
        let link = &mut links[link_id];
        if !link.can_receive(platoons, deltan) {
            return None;
        }
        self.waiting.pop_front();
        platoons[head].depart(link);
        link.accept(head, deltan);
        trace!("platoon {:?} departs from {} onto {}", head, self.name, link.name());
        Some(head)
    }

    /// Decides which platoons move from the incoming to the outgoing links this step.
    ///
    /// Each outgoing link accepts at most one platoon per step. When several
    /// incoming links compete for the same outgoing link, the winner is
    /// chosen by smooth weighted round robin over the merge priorities: each
    /// competitor earns its priority in credit, the richest one moves and
    /// pays the combined priority of all competitors. Over time every link
    /// is served in proportion to its priority, and the choice is deterministic.
    pub(crate) fn resolve(
        &mut self,
        links: &LinkSet,
        platoons: &PlatoonSet,
        deltan: f64,
    ) -> SmallVec<[Transfer; 4]> {
        let mut transfers = SmallVec::new();
        let requests = self
            .links_in
            .iter()
            .enumerate()
            .filter(|(_, id)| self.signal.is_green(links[**id].signal_group()))
            .filter_map(|(slot, id)| {
                let (platoon, next) = links[*id].exit_request(platoons, deltan)?;
                Some(Request {
                    slot,
                    platoon,
                    next,
                })
            })
            .collect::<SmallVec<[Request; 4]>>();

        if requests.is_empty() {
            return transfers;
        }

        for idx in 0..self.links_out.len() {
            let out_id = self.links_out[idx];
            if self.budget < deltan {
                break;
            }
            if !links[out_id].can_receive(platoons, deltan) {
                continue;
            }
            let competitors = requests
                .iter()
                .filter(|r| r.next == out_id)
                .copied()
                .collect::<SmallVec<[Request; 4]>>();
            if let Some(winner) = self.choose(&competitors, links) {
                transfers.push(Transfer {
                    platoon: winner.platoon,
                    from: self.links_in[winner.slot],
                    to: out_id,
                });
                self.budget -= deltan;
            }
        }

        transfers
    }

    /// Picks the competitor with the most merge credit.
    fn choose(&mut self, competitors: &[Request], links: &LinkSet) -> Option<Request> {
        let priority = |r: &Request| links[self.links_in[r.slot]].merge_priority();
        let total = competitors.iter().map(priority).sum::<f64>();
        for request in competitors {
            self.credit[request.slot] += priority(request);
        }
        // Ties go to the link added first.
        let winner = competitors.iter().copied().reduce(|best, r| {
            if self.credit[r.slot] > self.credit[best.slot] {
                r
            } else {
                best
            }
        })?;
        self.credit[winner.slot] -= total;
        Some(winner)
    }
}
