use crate::error::{non_negative, positive, Result};
use crate::util::Interval;
use crate::{LinkId, NodeId};

/// A constant flow of trips between two nodes over a time window.
#[derive(Clone, Debug, PartialEq)]
pub struct Demand {
    /// The origin node.
    pub origin: NodeId,
    /// The destination node.
    pub destination: NodeId,
    /// The departure window in s.
    pub window: Interval<f64>,
    /// The flow in veh/s.
    pub flow: f64,
    /// An explicit route. The free flow shortest route is used if absent.
    pub route: Option<Vec<LinkId>>,
}

impl Demand {
    /// Creates a demand of `flow` veh/s departing between `t_start` and `t_end`.
    pub fn new(origin: NodeId, destination: NodeId, t_start: f64, t_end: f64, flow: f64) -> Self {
        Self {
            origin,
            destination,
            window: Interval::new(t_start, t_end),
            flow,
            route: None,
        }
    }

    /// Creates a demand of `volume` vehicles spread evenly between `t_start` and `t_end`.
    pub fn with_volume(
        origin: NodeId,
        destination: NodeId,
        t_start: f64,
        t_end: f64,
        volume: f64,
    ) -> Result<Self> {
        let duration = positive("demand duration", t_end - t_start)?;
        Ok(Self::new(origin, destination, t_start, t_end, volume / duration))
    }

    /// Makes the trips follow the given links instead of the shortest route.
    pub fn with_route(mut self, route: Vec<LinkId>) -> Self {
        self.route = Some(route);
        self
    }

    /// Checks the window and flow.
    pub(crate) fn validate(&self) -> Result<()> {
        non_negative("demand start", self.window.min)?;
        non_negative("demand duration", self.window.length())?;
        non_negative("demand flow", self.flow)?;
        Ok(())
    }

    /// Expands the demand into the steps at which each platoon departs.
    ///
    /// The demand accumulates `flow*dt` vehicles every step of the window and
    /// releases a platoon whenever a whole one has built up, so departures are
    /// spaced `deltan/flow` seconds apart up to the step resolution.
    pub(crate) fn departures(&self, dt: f64, deltan: f64) -> Vec<usize> {
        expand(self.window, self.flow, dt, deltan)
    }
}

/// Spreads a flow over a window into platoon departure steps.
pub(crate) fn expand(window: Interval<f64>, flow: f64, dt: f64, deltan: f64) -> Vec<usize> {
    let mut departures = vec![];
    let mut accumulated = 0.0;
    for step in window.steps(dt) {
        accumulated += flow * dt;
        while accumulated >= deltan {
            departures.push(step);
            accumulated -= deltan;
        }
    }
    departures
}
