//! Adjacency tables derived from the set of hexes on the map.
//!
//! Built once when a board is generated or loaded and never mutated. All
//! lookups return slices in canonical (sorted) order.

use crate::hex::{EdgeCoord, HexCoord, NodeCoord};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Precomputed hex/edge/node relations for one map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    hexes: Vec<HexCoord>,
    edges: Vec<EdgeCoord>,
    nodes: Vec<NodeCoord>,
    hex_neighbours: HashMap<HexCoord, Vec<HexCoord>>,
    hex_nodes: HashMap<HexCoord, Vec<NodeCoord>>,
    node_hexes: HashMap<NodeCoord, Vec<HexCoord>>,
    node_edges: HashMap<NodeCoord, Vec<EdgeCoord>>,
    node_neighbours: HashMap<NodeCoord, Vec<NodeCoord>>,
    edge_nodes: HashMap<EdgeCoord, Vec<NodeCoord>>,
    edge_neighbours: HashMap<EdgeCoord, Vec<EdgeCoord>>,
}

impl Topology {
    /// Derive every table from the hexes that are on the map
    pub fn new(land: impl IntoIterator<Item = HexCoord>) -> Self {
        let hex_set: BTreeSet<HexCoord> = land.into_iter().collect();
        let hexes: Vec<HexCoord> = hex_set.iter().copied().collect();

        let mut hex_neighbours = HashMap::new();
        let mut hex_nodes = HashMap::new();
        let mut edge_set = BTreeSet::new();
        let mut node_set = BTreeSet::new();

        for hex in &hexes {
            let mut neighbours: Vec<HexCoord> = hex
                .neighbours()
                .into_iter()
                .filter(|n| hex_set.contains(n))
                .collect();
            neighbours.sort();
            hex_neighbours.insert(*hex, neighbours);

            let mut corners = hex.corners().to_vec();
            corners.sort();
            node_set.extend(corners.iter().copied());
            hex_nodes.insert(*hex, corners);

            edge_set.extend(hex.sides());
        }

        let edges: Vec<EdgeCoord> = edge_set.iter().copied().collect();
        let nodes: Vec<NodeCoord> = node_set.iter().copied().collect();

        let mut node_hexes = HashMap::new();
        let mut node_edges = HashMap::new();
        for node in &nodes {
            let on_map: Vec<HexCoord> = node
                .hexes()
                .into_iter()
                .filter(|h| hex_set.contains(h))
                .collect();
            node_hexes.insert(*node, on_map);

            let mut touching: Vec<EdgeCoord> = node
                .edges()
                .into_iter()
                .filter(|e| edge_set.contains(e))
                .collect();
            touching.sort();
            node_edges.insert(*node, touching);
        }

        let mut edge_nodes = HashMap::new();
        for edge in &edges {
            edge_nodes.insert(*edge, edge.endpoints().to_vec());
        }

        let mut node_neighbours = HashMap::new();
        for node in &nodes {
            let mut adjacent: Vec<NodeCoord> = node_edges[node]
                .iter()
                .flat_map(|e| edge_nodes[e].iter().copied())
                .filter(|n| n != node)
                .collect();
            adjacent.sort();
            adjacent.dedup();
            node_neighbours.insert(*node, adjacent);
        }

        let mut edge_neighbours = HashMap::new();
        for edge in &edges {
            let mut adjacent: Vec<EdgeCoord> = edge_nodes[edge]
                .iter()
                .flat_map(|n| node_edges[n].iter().copied())
                .filter(|e| e != edge)
                .collect();
            adjacent.sort();
            adjacent.dedup();
            edge_neighbours.insert(*edge, adjacent);
        }

        Self {
            hexes,
            edges,
            nodes,
            hex_neighbours,
            hex_nodes,
            node_hexes,
            node_edges,
            node_neighbours,
            edge_nodes,
            edge_neighbours,
        }
    }

    /// All hexes on the map, sorted
    pub fn hexes(&self) -> &[HexCoord] {
        &self.hexes
    }

    /// All road slots, sorted
    pub fn edges(&self) -> &[EdgeCoord] {
        &self.edges
    }

    /// All settlement slots, sorted
    pub fn nodes(&self) -> &[NodeCoord] {
        &self.nodes
    }

    pub fn contains_hex(&self, hex: &HexCoord) -> bool {
        self.hex_neighbours.contains_key(hex)
    }

    pub fn contains_edge(&self, edge: &EdgeCoord) -> bool {
        self.edge_nodes.contains_key(edge)
    }

    pub fn contains_node(&self, node: &NodeCoord) -> bool {
        self.node_hexes.contains_key(node)
    }

    /// Neighbouring hexes that are on the map
    pub fn neighbours_of(&self, hex: &HexCoord) -> &[HexCoord] {
        self.hex_neighbours.get(hex).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The six corners of a hex
    pub fn nodes_of_hex(&self, hex: &HexCoord) -> &[NodeCoord] {
        self.hex_nodes.get(hex).map(Vec::as_slice).unwrap_or(&[])
    }

    /// On-map hexes bordering a node (1 to 3)
    pub fn hexes_of(&self, node: &NodeCoord) -> &[HexCoord] {
        self.node_hexes.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Road slots meeting at a node (2 or 3)
    pub fn edges_of(&self, node: &NodeCoord) -> &[EdgeCoord] {
        self.node_edges.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The two ends of a road slot
    pub fn nodes_of_edge(&self, edge: &EdgeCoord) -> &[NodeCoord] {
        self.edge_nodes.get(edge).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Settlement slots one edge away
    pub fn adjacent_nodes(&self, node: &NodeCoord) -> &[NodeCoord] {
        self.node_neighbours.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Road slots sharing an end with `edge`
    pub fn adjacent_edges(&self, edge: &EdgeCoord) -> &[EdgeCoord] {
        self.edge_neighbours.get(edge).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edges with exactly one side on the map
    pub fn coastal_edges(&self) -> Vec<EdgeCoord> {
        self.edges
            .iter()
            .filter(|e| e.hexes().iter().filter(|h| self.contains_hex(h)).count() == 1)
            .copied()
            .collect()
    }

    /// Whether every hex can reach every other through neighbour links
    pub fn is_connected(&self) -> bool {
        let Some(start) = self.hexes.first() else {
            return true;
        };
        let mut seen = HashSet::from([*start]);
        let mut queue = VecDeque::from([*start]);
        while let Some(hex) = queue.pop_front() {
            for next in self.neighbours_of(&hex) {
                if seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        seen.len() == self.hexes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> Topology {
        Topology::new(HexCoord::spiral(3))
    }

    #[test]
    fn test_standard_counts() {
        let topology = standard();
        assert_eq!(topology.hexes().len(), 19);
        assert_eq!(topology.edges().len(), 72);
        assert_eq!(topology.nodes().len(), 54);
    }

    #[test]
    fn test_small_map_counts() {
        let single = Topology::new([HexCoord::new(0, 0)]);
        assert_eq!(single.edges().len(), 6);
        assert_eq!(single.nodes().len(), 6);

        let seven = Topology::new(HexCoord::spiral(2));
        assert_eq!(seven.edges().len(), 30);
        assert_eq!(seven.nodes().len(), 24);
    }

    #[test]
    fn test_interior_hexes_have_six_neighbours() {
        let topology = standard();
        let origin = HexCoord::new(0, 0);
        for hex in topology.hexes() {
            let count = topology.neighbours_of(hex).len();
            if hex.distance_to(&origin) < 2 {
                assert_eq!(count, 6, "interior hex {hex} should have 6 neighbours");
            } else {
                assert!((3..=4).contains(&count), "rim hex {hex} has {count}");
            }
        }
    }

    #[test]
    fn test_map_is_connected() {
        assert!(standard().is_connected());
        let split = Topology::new([HexCoord::new(0, 0), HexCoord::new(3, 0)]);
        assert!(!split.is_connected());
    }

    #[test]
    fn test_node_hexes_and_edges() {
        let topology = standard();
        for node in topology.nodes() {
            let hexes = topology.hexes_of(node);
            assert!((1..=3).contains(&hexes.len()));
            assert!(hexes.windows(2).all(|w| w[0] < w[1]));

            let edges = topology.edges_of(node);
            assert!((2..=3).contains(&edges.len()));
            for edge in edges {
                assert!(topology.nodes_of_edge(edge).contains(node));
            }
        }
    }

    #[test]
    fn test_edge_neighbours() {
        let topology = standard();
        let centre_edge = EdgeCoord::new(HexCoord::new(0, 0), HexCoord::new(1, 0));
        assert_eq!(topology.adjacent_edges(&centre_edge).len(), 4);
        for edge in topology.edges() {
            let adjacent = topology.adjacent_edges(edge);
            assert!((2..=4).contains(&adjacent.len()));
            assert!(!adjacent.contains(edge));
        }
    }

    #[test]
    fn test_coastal_edges() {
        // The rim of the 19-hex map has 30 outward-facing sides.
        assert_eq!(standard().coastal_edges().len(), 30);
    }

    #[test]
    fn test_unknown_coordinates_have_no_relations() {
        let topology = standard();
        let far = HexCoord::new(10, 10);
        assert!(!topology.contains_hex(&far));
        assert!(topology.neighbours_of(&far).is_empty());
        assert!(topology.nodes_of_hex(&far).is_empty());
    }
}
