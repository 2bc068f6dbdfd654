//! Routing-graph construction from an OSM extract.
//!
//! Way endpoints and nodes shared by two or more ways become routing nodes;
//! the chains between them collapse into synthetic edges weighted by
//! accumulated haversine distance over the way's speed (seconds). Only the
//! largest weakly-connected component survives the build.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::graph::{NodeIndex, RoadGraph};
use crate::osm::{OneWay, OsmExtract};
use crate::spatial::distance_m;

/// Assumed speed for ways without a usable `maxspeed` tag, in km/h.
pub const DEFAULT_SPEED_KMH: f64 = 30.0;

pub struct GraphBuilder {
    extract: OsmExtract,
}

impl GraphBuilder {
    pub fn new(extract: OsmExtract) -> Self {
        Self { extract }
    }

    pub fn build(self) -> RoadGraph {
        let usage = self.count_way_membership();
        let routing_nodes = self.collect_routing_nodes(&usage);

        // Assign graph indices in way order so the build is deterministic.
        let mut graph = RoadGraph::new();
        let mut id_to_index: HashMap<i64, NodeIndex> = HashMap::new();
        for way in &self.extract.ways {
            for node_id in &way.node_ids {
                if !routing_nodes.contains(node_id) || id_to_index.contains_key(node_id) {
                    continue;
                }
                if let Some(&(lat, lon)) = self.extract.nodes.get(node_id) {
                    id_to_index.insert(*node_id, graph.add_node(lat, lon));
                }
            }
        }

        for way in &self.extract.ways {
            if way.node_ids.len() < 2 {
                continue;
            }

            let speed_kmh = if way.maxspeed_kmh > 0 {
                f64::from(way.maxspeed_kmh)
            } else {
                DEFAULT_SPEED_KMH
            };
            let speed_mps = speed_kmh * 1000.0 / 3600.0;

            let mut prev_routing = way
                .node_ids
                .first()
                .filter(|id| id_to_index.contains_key(*id))
                .copied();
            let mut acc_distance = 0.0;

            for pair in way.node_ids.windows(2) {
                let (prev_id, curr_id) = (pair[0], pair[1]);
                let (Some(&prev), Some(&curr)) = (
                    self.extract.nodes.get(&prev_id),
                    self.extract.nodes.get(&curr_id),
                ) else {
                    // Node clipped out of the extract; the chain breaks here.
                    prev_routing = None;
                    acc_distance = 0.0;
                    continue;
                };

                acc_distance += distance_m(prev.0, prev.1, curr.0, curr.1);

                if !id_to_index.contains_key(&curr_id) {
                    continue;
                }
                if let Some(prev_routing_id) = prev_routing {
                    if acc_distance > 0.0 {
                        let eta = acc_distance / speed_mps;
                        let from = id_to_index[&prev_routing_id];
                        let to = id_to_index[&curr_id];
                        match way.oneway {
                            OneWay::Forward => graph.add_edge(way.id, from, to, eta),
                            OneWay::Backward => graph.add_edge(way.id, to, from, eta),
                            OneWay::No => {
                                graph.add_edge(way.id, from, to, eta);
                                graph.add_edge(way.id, to, from, eta);
                            }
                        }
                    }
                }
                prev_routing = Some(curr_id);
                acc_distance = 0.0;
            }
        }

        largest_weak_component(graph)
    }

    fn count_way_membership(&self) -> HashMap<i64, u32> {
        let mut table = HashMap::new();
        for way in &self.extract.ways {
            for node_id in &way.node_ids {
                *table.entry(*node_id).or_insert(0) += 1;
            }
        }
        table
    }

    fn collect_routing_nodes(&self, usage: &HashMap<i64, u32>) -> HashSet<i64> {
        let mut routing_nodes = HashSet::new();
        for way in &self.extract.ways {
            if let (Some(first), Some(last)) = (way.node_ids.first(), way.node_ids.last()) {
                routing_nodes.insert(*first);
                routing_nodes.insert(*last);
            }
        }
        for (node_id, count) in usage {
            if *count > 1 {
                routing_nodes.insert(*node_id);
            }
        }
        routing_nodes
    }
}

/// Keep only the largest weakly-connected component, renumbering nodes but
/// preserving edge ids so bidirectional pairs keep sharing theirs.
fn largest_weak_component(graph: RoadGraph) -> RoadGraph {
    let n = graph.num_nodes();
    if n == 0 {
        return graph;
    }

    let mut undirected: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
    for edge in graph.edges() {
        undirected[edge.from].push(edge.to);
        undirected[edge.to].push(edge.from);
    }

    let mut visited = vec![false; n];
    let mut components: Vec<Vec<NodeIndex>> = Vec::new();
    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::from([start]);
        visited[start] = true;
        while let Some(curr) = queue.pop_front() {
            component.push(curr);
            for &next in &undirected[curr] {
                if !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        components.push(component);
    }

    if components.len() == 1 {
        return graph;
    }

    let main = components
        .iter()
        .max_by_key(|c| c.len())
        .cloned()
        .unwrap_or_default();

    let mut old_to_new: HashMap<NodeIndex, NodeIndex> = HashMap::with_capacity(main.len());
    let mut filtered = RoadGraph::new();
    for &old_idx in &main {
        let node = graph.node(old_idx);
        old_to_new.insert(old_idx, filtered.add_node(node.lat, node.lon));
    }
    for edge in graph.edges() {
        if let (Some(&from), Some(&to)) = (old_to_new.get(&edge.from), old_to_new.get(&edge.to)) {
            filtered.add_edge(edge.id, from, to, edge.weight);
        }
    }
    filtered
}
