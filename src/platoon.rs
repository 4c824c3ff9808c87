use crate::link::Link;
use crate::{LinkId, NodeId, PlatoonId};
use serde::Serialize;

pub(crate) mod route;

pub use route::Route;

/// The lifecycle state of a platoon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PlatoonState {
    /// Created, but its departure time has not been reached.
    Scheduled,
    /// Waiting at its origin node to enter the network.
    Waiting,
    /// Travelling along a link.
    Running,
    /// Arrived at its destination.
    Completed,
}

/// The position and speed of a platoon over one simulation step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TrajectorySample {
    /// The time at the start of the step in s.
    pub time: f64,
    /// The link the platoon was on.
    pub link: LinkId,
    /// The position along the link at the start of the step in m.
    pub pos: f64,
    /// The speed over the step in m/s.
    pub speed: f64,
}

/// A group of `deltan` vehicles which travel together.
#[derive(Clone, Debug)]
pub struct Platoon {
    /// The platoon ID.
    pub(crate) id: PlatoonId,
    /// The number of vehicles in the platoon.
    size: f64,
    /// The lifecycle state.
    state: PlatoonState,
    /// The node the trip starts at.
    origin: NodeId,
    /// The node the trip ends at.
    destination: NodeId,
    /// The fixed route of the trip.
    route: Route,
    /// Index into the route of the current link.
    leg: usize,
    /// The position along the current link in m.
    pos: f64,
    /// The position at the end of the current step, as computed by car following.
    pos_next: f64,
    /// The speed over the last step in m/s.
    speed: f64,
    /// The scheduled departure time in s.
    departure_time: f64,
    /// The arrival time in s, once the trip is complete.
    arrival_time: Option<f64>,
    /// The distance travelled so far in m.
    distance: f64,
    /// The recorded trajectory.
    trajectory: Vec<TrajectorySample>,
}

impl Platoon {
    /// Creates a new platoon which will depart at the given time.
    pub(crate) fn new(
        id: PlatoonId,
        size: f64,
        origin: NodeId,
        destination: NodeId,
        route: Route,
        departure_time: f64,
    ) -> Self {
        Self {
            id,
            size,
            state: PlatoonState::Scheduled,
            origin,
            destination,
            route,
            leg: 0,
            pos: 0.0,
            pos_next: 0.0,
            speed: 0.0,
            departure_time,
            arrival_time: None,
            distance: 0.0,
            trajectory: vec![],
        }
    }

    /// Gets the platoon's ID.
    pub fn id(&self) -> PlatoonId {
        self.id
    }

    /// The number of vehicles represented by the platoon.
    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn state(&self) -> PlatoonState {
        self.state
    }

    pub fn origin(&self) -> NodeId {
        self.origin
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    /// The platoon's fixed route.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// The link the platoon is currently travelling on, if it is running.
    pub fn link_id(&self) -> Option<LinkId> {
        match self.state {
            PlatoonState::Running => self.route.links().get(self.leg).copied(),
            _ => None,
        }
    }

    /// The link the platoon will enter after its current one,
    /// or `None` if its current link ends at the destination.
    pub fn next_link(&self) -> Option<LinkId> {
        self.route.links().get(self.leg + 1).copied()
    }

    /// The first link of the route.
    pub(crate) fn first_link(&self) -> LinkId {
        self.route.links()[0]
    }

    /// The position along the current link in m.
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// The speed over the last simulated step in m/s.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// The scheduled departure time in s.
    pub fn departure_time(&self) -> f64 {
        self.departure_time
    }

    /// The arrival time in s, if the trip has been completed.
    pub fn arrival_time(&self) -> Option<f64> {
        self.arrival_time
    }

    /// The travel time of a completed trip in s.
    pub fn travel_time(&self) -> Option<f64> {
        self.arrival_time.map(|t| t - self.departure_time)
    }

    /// The travel time in excess of the free flow travel time along the route, in s.
    pub fn delay(&self) -> Option<f64> {
        self.travel_time()
            .map(|t| t - self.route.free_flow_time())
    }

    /// The distance travelled so far in m.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// The recorded trajectory, one sample per step spent on a link.
    pub fn trajectory(&self) -> &[TrajectorySample] {
        &self.trajectory
    }

    /// Moves the platoon into the waiting queue of its origin.
    pub(crate) fn set_waiting(&mut self) {
        self.state = PlatoonState::Waiting;
    }

    /// Places the platoon at the start of the first link of its route.
    pub(crate) fn depart(&mut self, link: &Link) {
        self.state = PlatoonState::Running;
        self.leg = 0;
        self.pos = 0.0;
        self.pos_next = 0.0;
        self.speed = link.fd().free_flow_speed();
    }

    /// Moves the platoon onto the next link of its route.
    pub(crate) fn advance_link(&mut self) {
        self.leg += 1;
        self.pos = 0.0;
        self.pos_next = 0.0;
    }

    /// Whether the platoon is waiting at the downstream end of its link.
    pub(crate) fn at_link_end(&self, link: &Link) -> bool {
        self.pos >= link.length()
    }

    /// Applies Newell's simplified car following model to compute the
    /// position at the end of this step.
    ///
    /// # Parameters
    /// * `link` - The link the platoon is on
    /// * `leader_pos` - The position of the platoon ahead at the start of the step
    /// * `dt` - The time step in s, equal to the reaction time times the platoon size
    /// * `jam_gap` - The jam spacing of a whole platoon in m
    pub(crate) fn car_follow(
        &mut self,
        link: &Link,
        leader_pos: Option<f64>,
        dt: f64,
        jam_gap: f64,
    ) {
        let mut pos_next = self.pos + link.fd().free_flow_speed() * dt;
        if let Some(leader_pos) = leader_pos {
            // Never move backwards, even when closer to the leader than the jam gap.
            let congested = f64::max(leader_pos - jam_gap, self.pos);
            pos_next = f64::min(pos_next, congested);
        }
        self.pos_next = f64::min(pos_next, link.length());
    }

    /// Commits the position computed by [`Platoon::car_follow`] and records
    /// the trajectory sample for the step starting at `time`.
    pub(crate) fn commit(&mut self, link_id: LinkId, time: f64, dt: f64) {
        let travelled = self.pos_next - self.pos;
        self.speed = travelled / dt;
        self.trajectory.push(TrajectorySample {
            time,
            link: link_id,
            pos: self.pos,
            speed: self.speed,
        });
        self.distance += travelled;
        self.pos = self.pos_next;
    }

    /// Marks the trip as complete.
    pub(crate) fn complete(&mut self, time: f64) {
        self.state = PlatoonState::Completed;
        self.arrival_time = Some(time);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::link::LinkAttributes;
    use crate::{FundamentalDiagram, Link, LinkId};
    use assert_approx_eq::assert_approx_eq;
    use slotmap::{KeyData, SlotMap};

    fn test_link() -> Link {
        let attribs = LinkAttributes {
            length: 1000.0,
            free_flow_speed: 20.0,
            jam_density: 0.2,
            ..Default::default()
        };
        let fd = FundamentalDiagram::new(20.0, 0.2, 1.0).unwrap();
        Link::new(LinkId::from(KeyData::from_ffi(1)), &attribs, fd, 5.0)
    }

    fn test_platoon() -> Platoon {
        let mut ids = SlotMap::<PlatoonId, ()>::with_key();
        let link = LinkId::from(KeyData::from_ffi(1));
        let route = Route::new(vec![link], 50.0);
        Platoon::new(
            ids.insert(()),
            5.0,
            NodeId::default(),
            NodeId::default(),
            route,
            10.0,
        )
    }

    #[test]
    fn free_flow_step() {
        let link = test_link();
        let mut platoon = test_platoon();
        platoon.depart(&link);
        platoon.car_follow(&link, None, 5.0, 25.0);
        platoon.commit(link.id(), 15.0, 5.0);
        assert_approx_eq!(platoon.pos(), 100.0);
        assert_approx_eq!(platoon.speed(), 20.0);
        assert_eq!(platoon.trajectory().len(), 1);
        assert_approx_eq!(platoon.trajectory()[0].pos, 0.0);
    }

    #[test]
    fn follows_leader_with_jam_gap() {
        let link = test_link();
        let mut platoon = test_platoon();
        platoon.depart(&link);
        platoon.car_follow(&link, Some(60.0), 5.0, 25.0);
        platoon.commit(link.id(), 0.0, 5.0);
        assert_approx_eq!(platoon.pos(), 35.0);
        assert_approx_eq!(platoon.speed(), 7.0);

        // A leader closer than the jam gap stops the platoon without reversing it.
        platoon.car_follow(&link, Some(40.0), 5.0, 25.0);
        platoon.commit(link.id(), 5.0, 5.0);
        assert_approx_eq!(platoon.pos(), 35.0);
        assert_approx_eq!(platoon.speed(), 0.0);
    }

    #[test]
    fn stops_at_link_end() {
        let link = test_link();
        let mut platoon = test_platoon();
        platoon.depart(&link);
        for step in 0..12 {
            platoon.car_follow(&link, None, 5.0, 25.0);
            platoon.commit(link.id(), 5.0 * step as f64, 5.0);
        }
        assert_approx_eq!(platoon.pos(), 1000.0);
        assert!(platoon.at_link_end(&link));
        assert_approx_eq!(platoon.distance(), 1000.0);
    }

    #[test]
    fn travel_time_and_delay() {
        let mut platoon = test_platoon();
        assert_eq!(platoon.travel_time(), None);
        platoon.complete(70.0);
        assert_eq!(platoon.state(), PlatoonState::Completed);
        assert_approx_eq!(platoon.travel_time().unwrap(), 60.0);
        assert_approx_eq!(platoon.delay().unwrap(), 10.0);
    }
}
