//! Road graph: immutable topology with mutable per-edge traversal weights.

/// Dense node index; position in the graph's node vector.
pub type NodeIndex = usize;

/// External edge id, carried over from the source data. The two directed
/// records of a bidirectional road share one id.
pub type EdgeId = i64;

#[derive(Debug, Clone, PartialEq)]
pub struct RoadNode {
    pub lat: f64,
    pub lon: f64,
    /// Slots into the graph's edge vector for outgoing edges.
    outgoing: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoadEdge {
    pub id: EdgeId,
    pub from: NodeIndex,
    pub to: NodeIndex,
    /// Expected traversal time in seconds. Strictly positive.
    pub weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoadGraph {
    nodes: Vec<RoadNode>,
    edges: Vec<RoadEdge>,
}

impl RoadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, lat: f64, lon: f64) -> NodeIndex {
        self.nodes.push(RoadNode {
            lat,
            lon,
            outgoing: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// Append a directed edge. Endpoints must already exist and the weight
    /// must be positive and finite.
    pub fn add_edge(&mut self, id: EdgeId, from: NodeIndex, to: NodeIndex, weight: f64) {
        assert!(from < self.nodes.len(), "edge `from` out of range");
        assert!(to < self.nodes.len(), "edge `to` out of range");
        assert!(weight.is_finite() && weight > 0.0, "edge weight must be positive");

        let slot = self.edges.len();
        self.edges.push(RoadEdge { id, from, to, weight });
        self.nodes[from].outgoing.push(slot);
    }

    /// Set the weight of the first edge record with the given id. No-op when
    /// no edge carries that id.
    pub fn update_edge_weight(&mut self, id: EdgeId, new_weight: f64) {
        if let Some(edge) = self.edges.iter_mut().find(|e| e.id == id) {
            edge.weight = new_weight;
        }
    }

    /// Set the weight of the edge in the given slot (position in `edges()`).
    pub(crate) fn update_edge_slot(&mut self, slot: usize, new_weight: f64) {
        if let Some(edge) = self.edges.get_mut(slot) {
            edge.weight = new_weight;
        }
    }

    /// Outgoing `(neighbor, weight)` pairs of a node. Borrows the graph;
    /// callers cannot hold the iterator across mutations.
    pub fn neighbors(&self, idx: NodeIndex) -> impl Iterator<Item = (NodeIndex, f64)> + '_ {
        self.nodes[idx]
            .outgoing
            .iter()
            .map(move |&slot| (self.edges[slot].to, self.edges[slot].weight))
    }

    pub fn node(&self, idx: NodeIndex) -> &RoadNode {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &[RoadNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[RoadEdge] {
        &self.edges
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }
}
