//! Game board: generated tiles, derived topology, structures and harbours.
//!
//! This module contains:
//! - Resource and hex kinds
//! - Seeded board generation with bounded allocation retries
//! - Structure/road occupancy and placement validation
//! - Production and robber queries
//! - Longest road calculation
//!
//! The tiles and topology are fixed once generated; only the robber and the
//! occupancy tables change, and only through the game state machine.

use crate::hex::{EdgeCoord, HexCoord, NodeCoord};
use crate::ledger::{costs, Colour, ResourceHand};
use crate::topology::Topology;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Map radius of the standard game (19 hexes)
pub const STANDARD_RADIUS: u32 = 3;

/// Allocation restarts allowed before generation gives up
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 1000;

/// Numbers that may not border each other
const RED_NUMBERS: [u8; 2] = [6, 8];

/// Resource kinds produced by hexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Resource {
    Brick,
    Lumber,
    Ore,
    Grain,
    Wool,
}

impl Resource {
    /// All resource types
    pub const ALL: [Resource; 5] = [
        Resource::Brick,
        Resource::Lumber,
        Resource::Ore,
        Resource::Grain,
        Resource::Wool,
    ];
}

/// What a hex produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HexKind {
    /// Produces a resource when its number is rolled
    Resource(Resource),
    /// No production; starts with the robber
    Desert,
}

/// A single hex tile on the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Position on the hex grid
    pub coord: HexCoord,
    /// Resource or desert
    pub kind: HexKind,
    /// Dice number that triggers production (2-12, None for desert)
    pub number: Option<u8>,
    /// Whether the robber is currently on this tile
    pub has_robber: bool,
}

impl Tile {
    /// Create a new resource tile
    pub fn new_resource(coord: HexCoord, resource: Resource, number: u8) -> Self {
        Self {
            coord,
            kind: HexKind::Resource(resource),
            number: Some(number),
            has_robber: false,
        }
    }

    /// Create a desert tile
    pub fn desert(coord: HexCoord) -> Self {
        Self {
            coord,
            kind: HexKind::Desert,
            number: None,
            has_robber: true, // Robber starts on desert
        }
    }

    /// Get the resource this tile produces, if any
    pub fn resource(&self) -> Option<Resource> {
        match self.kind {
            HexKind::Resource(r) => Some(r),
            HexKind::Desert => None,
        }
    }

    /// The resource this tile yields for `roll`, if it produces at all
    pub fn production(&self, roll: u8) -> Option<Resource> {
        if self.has_robber || self.number != Some(roll) {
            return None;
        }
        self.resource()
    }
}

/// Structure tier on a node.
///
/// Production, victory points and cost are all looked up from the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Settlement,
    City,
}

impl Tier {
    /// Resources granted per producing hex
    pub fn production(&self) -> u32 {
        match self {
            Tier::Settlement => 1,
            Tier::City => 2,
        }
    }

    pub fn victory_points(&self) -> u32 {
        match self {
            Tier::Settlement => 1,
            Tier::City => 2,
        }
    }

    pub fn cost(&self) -> ResourceHand {
        match self {
            Tier::Settlement => costs::settlement(),
            Tier::City => costs::city(),
        }
    }
}

/// A settlement or city owned by one colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Structure {
    pub colour: Colour,
    pub tier: Tier,
}

/// Harbor types for maritime trading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Harbor {
    /// 3:1 trade any resource
    Generic,
    /// 2:1 trade for a specific resource
    Specific(Resource),
}

impl Harbor {
    /// The exchange rate for this harbor
    pub fn rate(&self) -> u32 {
        match self {
            Harbor::Generic => 3,
            Harbor::Specific(_) => 2,
        }
    }
}

/// Harbor placement on the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarborPlacement {
    /// The coastal edge where ships dock
    pub edge: EdgeCoord,
    pub harbor: Harbor,
}

/// Map size and the token pools drawn during generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardLayout {
    /// Rings counted from the centre hex (3 = 19 hexes)
    pub radius: u32,
    /// One entry per hex
    pub kinds: Vec<HexKind>,
    /// One entry per non-desert hex
    pub numbers: Vec<u8>,
    pub harbors: Vec<Harbor>,
}

impl BoardLayout {
    /// The standard 19-hex layout
    pub fn standard() -> Self {
        let mut kinds = Vec::with_capacity(19);
        for (resource, count) in [
            (Resource::Brick, 3),
            (Resource::Grain, 4),
            (Resource::Ore, 3),
            (Resource::Wool, 4),
            (Resource::Lumber, 4),
        ] {
            kinds.extend(std::iter::repeat(HexKind::Resource(resource)).take(count));
        }
        kinds.push(HexKind::Desert);

        let mut harbors = vec![Harbor::Generic; 4];
        harbors.extend(Resource::ALL.map(Harbor::Specific));

        Self {
            radius: STANDARD_RADIUS,
            kinds,
            numbers: vec![2, 3, 3, 4, 4, 5, 5, 6, 6, 8, 8, 9, 9, 10, 10, 11, 11, 12],
            harbors,
        }
    }

    fn check_pools(&self, hex_count: usize) -> Result<(), GenerationError> {
        if self.kinds.len() != hex_count {
            return Err(GenerationError::PoolMismatch {
                pool: "hex kind".to_string(),
                expected: hex_count,
                actual: self.kinds.len(),
            });
        }
        let producing = self
            .kinds
            .iter()
            .filter(|k| matches!(k, HexKind::Resource(_)))
            .count();
        if self.numbers.len() != producing {
            return Err(GenerationError::PoolMismatch {
                pool: "number token".to_string(),
                expected: producing,
                actual: self.numbers.len(),
            });
        }
        if let Some(&bad) = self.numbers.iter().find(|&&n| !(2..=12).contains(&n) || n == 7) {
            return Err(GenerationError::InvalidNumber(bad));
        }
        Ok(())
    }
}

impl Default for BoardLayout {
    fn default() -> Self {
        Self::standard()
    }
}

/// Board generation failures
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GenerationError {
    #[error("{pool} pool has {actual} entries, map needs {expected}")]
    PoolMismatch {
        pool: String,
        expected: usize,
        actual: usize,
    },

    #[error("number token {0} is outside 2-12 or is 7")]
    InvalidNumber(u8),

    #[error("token allocation failed after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },
}

/// Why a structure or road can't go where it was asked to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PlacementError {
    #[error("location is not on the board")]
    OffBoard,

    #[error("location is already occupied")]
    Occupied,

    #[error("too close to another settlement")]
    TooClose,

    #[error("not connected to your roads")]
    NotConnected,

    #[error("road must touch the settlement just placed")]
    NotBesideSetupSettlement,
}

/// The complete game board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BoardSnapshot", into = "BoardSnapshot")]
pub struct Board {
    tiles: BTreeMap<HexCoord, Tile>,
    topology: Topology,
    structures: HashMap<NodeCoord, Structure>,
    roads: HashMap<EdgeCoord, Colour>,
    harbors: Vec<HarborPlacement>,
    robber_location: HexCoord,
}

impl Board {
    /// Generate the standard board from a seed.
    ///
    /// The same seed always yields the same board.
    pub fn generate(seed: u64) -> Result<Self, GenerationError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self::generate_with_rng(&BoardLayout::standard(), &mut rng)
    }

    /// Generate a board for `layout`, drawing from `rng`
    pub fn generate_with_rng<R: Rng>(
        layout: &BoardLayout,
        rng: &mut R,
    ) -> Result<Self, GenerationError> {
        let topology = Topology::new(HexCoord::spiral(layout.radius));
        layout.check_pools(topology.hexes().len())?;

        let tiles = allocate_tokens(&topology, layout, rng)?;
        let robber_location = tiles
            .values()
            .find(|t| t.has_robber)
            .map(|t| t.coord)
            .unwrap_or_default();

        let mut board = Self {
            tiles,
            topology,
            structures: HashMap::new(),
            roads: HashMap::new(),
            harbors: Vec::new(),
            robber_location,
        };
        board.place_harbors(&layout.harbors, rng);
        Ok(board)
    }

    /// Add harbours to coastal edges, spread around the rim
    fn place_harbors<R: Rng>(&mut self, harbors: &[Harbor], rng: &mut R) {
        let mut kinds = harbors.to_vec();
        kinds.shuffle(rng);

        let mut available = self.topology.coastal_edges();
        available.shuffle(rng);

        let mut selected: Vec<EdgeCoord> = Vec::new();
        while selected.len() < kinds.len() && !available.is_empty() {
            // Farthest-point selection: take the candidate whose nearest
            // already-chosen harbour is farthest away.
            let idx = if selected.is_empty() {
                0
            } else {
                available
                    .iter()
                    .enumerate()
                    .map(|(idx, candidate)| {
                        let nearest = selected
                            .iter()
                            .map(|s| edge_distance(candidate, s))
                            .min()
                            .unwrap_or(u32::MAX);
                        (idx, nearest)
                    })
                    .fold((0, 0), |best, next| if next.1 > best.1 { next } else { best })
                    .0
            };
            selected.push(available.remove(idx));
        }

        self.harbors = selected
            .into_iter()
            .zip(kinds)
            .map(|(edge, harbor)| HarborPlacement { edge, harbor })
            .collect();
    }

    // ==================== Topology Queries ====================

    /// The derived adjacency tables
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Neighbouring hexes on the map
    pub fn neighbours_of(&self, hex: &HexCoord) -> &[HexCoord] {
        self.topology.neighbours_of(hex)
    }

    /// Road slots meeting at a node
    pub fn edges_of(&self, node: &NodeCoord) -> &[EdgeCoord] {
        self.topology.edges_of(node)
    }

    /// On-map hexes bordering a node, in coordinate order
    pub fn hexes_of(&self, node: &NodeCoord) -> &[HexCoord] {
        self.topology.hexes_of(node)
    }

    /// Get a tile by coordinate
    pub fn tile(&self, coord: &HexCoord) -> Option<&Tile> {
        self.tiles.get(coord)
    }

    /// All tiles in coordinate order
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn harbors(&self) -> &[HarborPlacement] {
        &self.harbors
    }

    /// Get the robber's current location
    pub fn robber_location(&self) -> HexCoord {
        self.robber_location
    }

    // ==================== Occupancy Queries ====================

    /// Structure at a node
    pub fn structure_at(&self, node: &NodeCoord) -> Option<Structure> {
        self.structures.get(node).copied()
    }

    /// Owner of the road at an edge
    pub fn road_at(&self, edge: &EdgeCoord) -> Option<Colour> {
        self.roads.get(edge).copied()
    }

    /// All structures in node order
    pub fn structures(&self) -> Vec<(NodeCoord, Structure)> {
        let mut all: Vec<_> = self.structures.iter().map(|(n, s)| (*n, *s)).collect();
        all.sort_by_key(|(node, _)| *node);
        all
    }

    /// All roads in edge order
    pub fn roads(&self) -> Vec<(EdgeCoord, Colour)> {
        let mut all: Vec<_> = self.roads.iter().map(|(e, c)| (*e, *c)).collect();
        all.sort_by_key(|(edge, _)| *edge);
        all
    }

    /// Harbours reachable from a colour's structures
    pub fn harbors_of(&self, colour: Colour) -> Vec<Harbor> {
        self.harbors
            .iter()
            .filter(|h| {
                self.topology
                    .nodes_of_edge(&h.edge)
                    .iter()
                    .any(|n| self.structure_at(n).is_some_and(|s| s.colour == colour))
            })
            .map(|h| h.harbor)
            .collect()
    }

    /// Colours with a structure on a corner of `hex`, sorted
    pub fn colours_on_hex(&self, hex: &HexCoord) -> Vec<Colour> {
        let colours: BTreeSet<Colour> = self
            .topology
            .nodes_of_hex(hex)
            .iter()
            .filter_map(|n| self.structure_at(n))
            .map(|s| s.colour)
            .collect();
        colours.into_iter().collect()
    }

    // ==================== Validation Methods ====================

    /// No structure on any node one edge away
    pub fn satisfies_distance_rule(&self, node: &NodeCoord) -> bool {
        self.topology
            .adjacent_nodes(node)
            .iter()
            .all(|adj| self.structure_at(adj).is_none())
    }

    /// Check a settlement site. During setup no road connection is required.
    pub fn check_settlement(
        &self,
        colour: Colour,
        node: &NodeCoord,
        is_setup: bool,
    ) -> Result<(), PlacementError> {
        if !self.topology.contains_node(node) {
            return Err(PlacementError::OffBoard);
        }
        if self.structure_at(node).is_some() {
            return Err(PlacementError::Occupied);
        }
        if !self.satisfies_distance_rule(node) {
            return Err(PlacementError::TooClose);
        }
        if !is_setup && !self.node_touches_road(node, colour) {
            return Err(PlacementError::NotConnected);
        }
        Ok(())
    }

    fn node_touches_road(&self, node: &NodeCoord, colour: Colour) -> bool {
        self.edges_of(node)
            .iter()
            .any(|e| self.road_at(e) == Some(colour))
    }

    /// Check a road slot.
    ///
    /// `pending` is a road of the same colour that counts as built, for
    /// placing two roads in one move.
    pub fn check_road(
        &self,
        colour: Colour,
        edge: &EdgeCoord,
        pending: Option<&EdgeCoord>,
    ) -> Result<(), PlacementError> {
        if !self.topology.contains_edge(edge) {
            return Err(PlacementError::OffBoard);
        }
        if self.road_at(edge).is_some() || pending == Some(edge) {
            return Err(PlacementError::Occupied);
        }

        let owns = |e: &EdgeCoord| self.road_at(e) == Some(colour) || pending == Some(e);
        let connected = self.topology.nodes_of_edge(edge).iter().any(|end| {
            match self.structure_at(end) {
                Some(s) if s.colour == colour => true,
                // An opponent's structure cuts the network at this end
                Some(_) => false,
                None => self
                    .edges_of(end)
                    .iter()
                    .any(|adj| adj != edge && owns(adj)),
            }
        });
        if !connected {
            return Err(PlacementError::NotConnected);
        }
        Ok(())
    }

    /// Empty nodes where `colour` may build a settlement
    pub fn valid_settlement_spots(&self, colour: Colour, is_setup: bool) -> Vec<NodeCoord> {
        self.topology
            .nodes()
            .iter()
            .filter(|n| self.check_settlement(colour, n, is_setup).is_ok())
            .copied()
            .collect()
    }

    /// Empty edges where `colour` may build a road
    pub fn valid_road_spots(&self, colour: Colour) -> Vec<EdgeCoord> {
        self.topology
            .edges()
            .iter()
            .filter(|e| self.check_road(colour, e, None).is_ok())
            .copied()
            .collect()
    }

    /// Settlements of `colour` that can be upgraded
    pub fn valid_city_spots(&self, colour: Colour) -> Vec<NodeCoord> {
        self.structures()
            .into_iter()
            .filter(|(_, s)| s.colour == colour && s.tier == Tier::Settlement)
            .map(|(node, _)| node)
            .collect()
    }

    // ==================== Mutation Methods ====================

    /// Place a settlement (assumes validation already done)
    pub(crate) fn place_settlement(&mut self, node: NodeCoord, colour: Colour) {
        self.structures.insert(
            node,
            Structure {
                colour,
                tier: Tier::Settlement,
            },
        );
    }

    /// Upgrade a settlement to a city
    pub(crate) fn upgrade_to_city(&mut self, node: NodeCoord, colour: Colour) {
        self.structures.insert(
            node,
            Structure {
                colour,
                tier: Tier::City,
            },
        );
    }

    /// Place a road
    pub(crate) fn place_road(&mut self, edge: EdgeCoord, colour: Colour) {
        self.roads.insert(edge, colour);
    }

    /// Move the robber to a new location
    pub(crate) fn move_robber(&mut self, new_location: HexCoord) {
        if let Some(tile) = self.tiles.get_mut(&self.robber_location) {
            tile.has_robber = false;
        }
        if let Some(tile) = self.tiles.get_mut(&new_location) {
            tile.has_robber = true;
        }
        self.robber_location = new_location;
    }

    // ==================== Longest Road Calculation ====================

    /// Longest simple path through `colour`'s roads.
    ///
    /// With `opponents_break`, a node holding another colour's structure can
    /// end a path but not be passed through.
    pub fn longest_road(&self, colour: Colour, opponents_break: bool) -> u32 {
        let owned: HashSet<EdgeCoord> = self
            .roads
            .iter()
            .filter(|(_, c)| **c == colour)
            .map(|(e, _)| *e)
            .collect();
        if owned.is_empty() {
            return 0;
        }

        let starts: BTreeSet<NodeCoord> = owned
            .iter()
            .flat_map(|e| self.topology.nodes_of_edge(e).iter().copied())
            .collect();

        let mut best = 0;
        for start in &starts {
            let mut visited = HashSet::from([*start]);
            best = best.max(self.walk_road(colour, opponents_break, &owned, *start, &mut visited));
        }
        best
    }

    fn walk_road(
        &self,
        colour: Colour,
        opponents_break: bool,
        owned: &HashSet<EdgeCoord>,
        at: NodeCoord,
        visited: &mut HashSet<NodeCoord>,
    ) -> u32 {
        let mut longest = 0;
        for edge in self.edges_of(&at) {
            if !owned.contains(edge) {
                continue;
            }
            let Some(next) = self
                .topology
                .nodes_of_edge(edge)
                .iter()
                .find(|n| **n != at)
                .copied()
            else {
                continue;
            };
            if visited.contains(&next) {
                continue;
            }

            let blocked =
                opponents_break && self.structure_at(&next).is_some_and(|s| s.colour != colour);
            let onward = if blocked {
                0
            } else {
                visited.insert(next);
                let length = self.walk_road(colour, opponents_break, owned, next, visited);
                visited.remove(&next);
                length
            };
            longest = longest.max(1 + onward);
        }
        longest
    }

    /// Serializable form of this board
    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot::from(self.clone())
    }
}

/// Distance between the midpoints of two edges, in half-hex steps
fn edge_distance(e1: &EdgeCoord, e2: &EdgeCoord) -> u32 {
    let [a1, b1] = e1.hexes();
    let [a2, b2] = e2.hexes();
    let m1 = HexCoord::new(a1.q + b1.q, a1.r + b1.r);
    let m2 = HexCoord::new(a2.q + b2.q, a2.r + b2.r);
    m1.distance_to(&m2)
}

/// Assign kinds and numbers, restarting whenever a draw dead-ends
fn allocate_tokens<R: Rng>(
    topology: &Topology,
    layout: &BoardLayout,
    rng: &mut R,
) -> Result<BTreeMap<HexCoord, Tile>, GenerationError> {
    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
        if let Some(tiles) = try_allocate(topology, layout, rng) {
            if attempt > 1 {
                debug!(attempt, "board allocation succeeded after restart");
            }
            return Ok(tiles);
        }
        debug!(attempt, "board allocation dead-ended, restarting");
    }
    Err(GenerationError::AllocationExhausted {
        attempts: MAX_ALLOCATION_ATTEMPTS,
    })
}

fn try_allocate<R: Rng>(
    topology: &Topology,
    layout: &BoardLayout,
    rng: &mut R,
) -> Option<BTreeMap<HexCoord, Tile>> {
    let mut kinds = layout.kinds.clone();
    kinds.shuffle(rng);
    let mut numbers = layout.numbers.clone();
    numbers.shuffle(rng);

    let mut tiles: BTreeMap<HexCoord, Tile> = BTreeMap::new();
    for &coord in topology.hexes() {
        let tile = match kinds.pop()? {
            HexKind::Desert => Tile::desert(coord),
            HexKind::Resource(resource) => {
                let borders_red = topology.neighbours_of(&coord).iter().any(|n| {
                    tiles
                        .get(n)
                        .and_then(|t| t.number)
                        .is_some_and(|num| RED_NUMBERS.contains(&num))
                });
                let pick = numbers
                    .iter()
                    .position(|n| !(borders_red && RED_NUMBERS.contains(n)))?;
                Tile::new_resource(coord, resource, numbers.remove(pick))
            }
        };
        tiles.insert(coord, tile);
    }

    // Every token must be used
    (kinds.is_empty() && numbers.is_empty()).then_some(tiles)
}

/// Board contents without the derived tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub tiles: Vec<Tile>,
    pub harbors: Vec<HarborPlacement>,
    pub structures: Vec<(NodeCoord, Structure)>,
    pub roads: Vec<(EdgeCoord, Colour)>,
}

impl From<Board> for BoardSnapshot {
    fn from(board: Board) -> Self {
        let structures = board.structures();
        let roads = board.roads();
        Self {
            tiles: board.tiles.into_values().collect(),
            harbors: board.harbors,
            structures,
            roads,
        }
    }
}

impl From<BoardSnapshot> for Board {
    fn from(snapshot: BoardSnapshot) -> Self {
        let topology = Topology::new(snapshot.tiles.iter().map(|t| t.coord));
        let robber_location = snapshot
            .tiles
            .iter()
            .find(|t| t.has_robber)
            .map(|t| t.coord)
            .unwrap_or_default();
        Self {
            tiles: snapshot.tiles.into_iter().map(|t| (t.coord, t)).collect(),
            topology,
            structures: snapshot.structures.into_iter().collect(),
            roads: snapshot.roads.into_iter().collect(),
            harbors: snapshot.harbors,
            robber_location,
        }
    }
}
