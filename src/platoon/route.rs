use crate::error::{Error, Result};
use crate::{LinkId, LinkSet, NodeId, NodeSet};
use pathfinding::directed::dijkstra::dijkstra;
use std::collections::HashMap;

/// Travel times are rounded to this resolution (in s) for the shortest path search.
const COST_RESOLUTION: f64 = 0.001;

/// A fixed sequence of links from an origin to a destination.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    /// The links, in travel order.
    links: Vec<LinkId>,
    /// The free flow travel time along the route in s.
    free_flow_time: f64,
}

impl Route {
    pub(crate) fn new(links: Vec<LinkId>, free_flow_time: f64) -> Self {
        Self {
            links,
            free_flow_time,
        }
    }

    /// The links of the route, in travel order.
    pub fn links(&self) -> &[LinkId] {
        &self.links
    }

    /// The free flow travel time along the route in s.
    pub fn free_flow_time(&self) -> f64 {
        self.free_flow_time
    }

    /// Checks that the given links form a connected path from `origin` to `destination`.
    pub(crate) fn from_links(
        links: &LinkSet,
        origin: NodeId,
        destination: NodeId,
        route: &[LinkId],
    ) -> Result<Self> {
        let mut at = origin;
        for link_id in route {
            let link = links.get(*link_id).ok_or(Error::UnknownLink(*link_id))?;
            if link.origin_node() != at {
                return Err(Error::InvalidRoute);
            }
            at = link.destination_node();
        }
        if route.is_empty() || at != destination {
            return Err(Error::InvalidRoute);
        }
        let free_flow_time = route.iter().map(|id| links[*id].free_flow_time()).sum();
        Ok(Self::new(route.to_vec(), free_flow_time))
    }
}

/// Caches the free flow shortest routes between pairs of nodes.
#[derive(Clone, Debug, Default)]
pub(crate) struct RouteTable {
    routes: HashMap<(NodeId, NodeId), Route>,
}

impl RouteTable {
    /// Finds the free flow shortest route between two nodes.
    pub fn get(
        &mut self,
        nodes: &NodeSet,
        links: &LinkSet,
        origin: NodeId,
        destination: NodeId,
    ) -> Result<Route> {
        if let Some(route) = self.routes.get(&(origin, destination)) {
            return Ok(route.clone());
        }
        let route = shortest_route(nodes, links, origin, destination)
            .ok_or(Error::NoRoute(origin, destination))?;
        self.routes.insert((origin, destination), route.clone());
        Ok(route)
    }

    /// Forgets all cached routes. Must be called whenever the network changes.
    pub fn clear(&mut self) {
        self.routes.clear();
    }
}

/// Finds the route with the shortest free flow travel time.
fn shortest_route(
    nodes: &NodeSet,
    links: &LinkSet,
    origin: NodeId,
    destination: NodeId,
) -> Option<Route> {
    if origin == destination {
        return None;
    }
    let (path, _) = dijkstra(
        &origin,
        |id| successors(*id, nodes, links),
        |id| *id == destination,
    )?;
    let route = path
        .windows(2)
        .map(|pair| fastest_link(pair[0], pair[1], nodes, links))
        .collect::<Option<Vec<_>>>()?;
    let free_flow_time = route.iter().map(|id| links[*id].free_flow_time()).sum();
    Some(Route::new(route, free_flow_time))
}

fn successors<'a>(
    node_id: NodeId,
    nodes: &'a NodeSet,
    links: &'a LinkSet,
) -> impl Iterator<Item = (NodeId, u64)> + 'a {
    nodes[node_id].links_out().iter().map(move |id| {
        let link = &links[*id];
        (link.destination_node(), cost(link.free_flow_time()))
    })
}

/// The fastest of the parallel links between two nodes.
fn fastest_link(from: NodeId, to: NodeId, nodes: &NodeSet, links: &LinkSet) -> Option<LinkId> {
    nodes[from]
        .links_out()
        .iter()
        .copied()
        .filter(|id| links[*id].destination_node() == to)
        .min_by_key(|id| cost(links[*id].free_flow_time()))
}

fn cost(time: f64) -> u64 {
    (time / COST_RESOLUTION).round() as u64
}
