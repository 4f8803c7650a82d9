//! Hex coordinate system using axial coordinates (q, r).
//!
//! This module provides the foundational coordinate types for the hex map:
//! - `HexCoord`: identifies a single hex
//! - `EdgeCoord`: the border between two neighbouring hexes (a road slot)
//! - `NodeCoord`: the corner where three mutually neighbouring hexes meet
//!   (a settlement/city slot)
//!
//! Edges and nodes are named by the hexes that meet there, stored sorted, so
//! two descriptions of the same slot always compare equal. Perimeter slots
//! name off-map coordinates too; the board decides which of those hexes exist.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate differences that make two hexes neighbours, in ring order.
///
/// Consecutive entries (wrapping) are themselves neighbours, which is what
/// lets `HexCoord::corners` build a node from a hex and two offsets.
pub const NEIGHBOUR_OFFSETS: [(i32, i32); 6] = [
    (1, 0),  // East
    (1, -1), // NorthEast
    (0, -1), // NorthWest
    (-1, 0), // West
    (-1, 1), // SouthWest
    (0, 1),  // SouthEast
];

/// Axial coordinate for hex grid.
///
/// In axial coordinates:
/// - `q` increases going east (right)
/// - `r` increases going southeast
/// - The third coordinate `s` (not stored) satisfies: q + r + s = 0
///
/// Ordering is by `(q, r)`, which is the canonical order used everywhere.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct HexCoord {
    /// Column (increases going east)
    pub q: i32,
    /// Row (increases going southeast)
    pub r: i32,
}

impl HexCoord {
    /// Create a new hex coordinate
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// The implicit third coordinate (s = -q - r)
    pub const fn s(&self) -> i32 {
        -self.q - self.r
    }

    fn offset(&self, (dq, dr): (i32, i32)) -> HexCoord {
        HexCoord::new(self.q + dq, self.r + dr)
    }

    /// The six neighbouring coordinates in ring order starting from East
    pub fn neighbours(&self) -> [HexCoord; 6] {
        NEIGHBOUR_OFFSETS.map(|offset| self.offset(offset))
    }

    /// Whether `other` lies in the neighbour offset set of `self`
    pub fn is_neighbour(&self, other: &HexCoord) -> bool {
        NEIGHBOUR_OFFSETS.contains(&(other.q - self.q, other.r - self.r))
    }

    /// Distance to another hex (in hex steps)
    pub fn distance_to(&self, other: &HexCoord) -> u32 {
        let dq = (self.q - other.q).abs();
        let dr = (self.r - other.r).abs();
        let ds = (self.s() - other.s()).abs();
        ((dq + dr + ds) / 2) as u32
    }

    /// All coordinates within `radius - 1` steps of the origin, sorted.
    ///
    /// A radius of 3 gives the 19-hex standard map.
    pub fn spiral(radius: u32) -> Vec<HexCoord> {
        let reach = radius.saturating_sub(1) as i32;
        let mut coords = Vec::new();
        for q in -reach..=reach {
            for r in -reach..=reach {
                let coord = HexCoord::new(q, r);
                if coord.s().abs() <= reach {
                    coords.push(coord);
                }
            }
        }
        coords
    }

    /// The six corners of this hex
    pub fn corners(&self) -> [NodeCoord; 6] {
        std::array::from_fn(|i| {
            NodeCoord::new(
                *self,
                self.offset(NEIGHBOUR_OFFSETS[i]),
                self.offset(NEIGHBOUR_OFFSETS[(i + 1) % 6]),
            )
        })
    }

    /// The six sides of this hex
    pub fn sides(&self) -> [EdgeCoord; 6] {
        self.neighbours().map(|n| EdgeCoord::new(*self, n))
    }
}

impl fmt::Display for HexCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.q, self.r)
    }
}

/// Edge coordinate - the border shared by two neighbouring hexes.
///
/// Stored as the unordered pair, lower coordinate first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeCoord {
    a: HexCoord,
    b: HexCoord,
}

impl EdgeCoord {
    /// Create the edge between two hexes (order of arguments is irrelevant).
    ///
    /// The hexes are expected to be neighbours; use `try_new` for untrusted input.
    pub fn new(x: HexCoord, y: HexCoord) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    /// Create an edge, or `None` if the hexes don't share a border
    pub fn try_new(x: HexCoord, y: HexCoord) -> Option<Self> {
        x.is_neighbour(&y).then(|| Self::new(x, y))
    }

    /// The 2 hexes that share this edge, in canonical order
    pub fn hexes(&self) -> [HexCoord; 2] {
        [self.a, self.b]
    }

    /// The 2 nodes at the ends of this edge.
    ///
    /// Each end is the third hex that neighbours both sides of the edge.
    pub fn endpoints(&self) -> [NodeCoord; 2] {
        let mut ends = self
            .a
            .neighbours()
            .into_iter()
            .filter(|c| c.is_neighbour(&self.b))
            .map(|c| NodeCoord::new(self.a, self.b, c));
        match (ends.next(), ends.next()) {
            (Some(first), Some(second)) => {
                if first <= second {
                    [first, second]
                } else {
                    [second, first]
                }
            }
            // Only reachable for a pair that isn't adjacent.
            _ => {
                let degenerate = NodeCoord::new(self.a, self.b, self.b);
                [degenerate, degenerate]
            }
        }
    }
}

impl fmt::Display for EdgeCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.a, self.b)
    }
}

/// Node coordinate - the corner where three hexes meet.
///
/// Settlements and cities are built on nodes. Stored as the sorted triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeCoord {
    hexes: [HexCoord; 3],
}

impl NodeCoord {
    /// Create a node from the three hexes meeting there (any order)
    pub fn new(x: HexCoord, y: HexCoord, z: HexCoord) -> Self {
        let mut hexes = [x, y, z];
        hexes.sort();
        Self { hexes }
    }

    /// Create a node, or `None` unless the three hexes are mutually neighbours
    pub fn try_new(x: HexCoord, y: HexCoord, z: HexCoord) -> Option<Self> {
        (x.is_neighbour(&y) && y.is_neighbour(&z) && x.is_neighbour(&z))
            .then(|| Self::new(x, y, z))
    }

    /// The 3 hex coordinates touching this node (some may be off the map)
    pub fn hexes(&self) -> [HexCoord; 3] {
        self.hexes
    }

    /// The 3 edges that meet at this node
    pub fn edges(&self) -> [EdgeCoord; 3] {
        let [x, y, z] = self.hexes;
        [EdgeCoord::new(x, y), EdgeCoord::new(x, z), EdgeCoord::new(y, z)]
    }

    /// The 3 nodes one edge away (for the distance rule)
    pub fn adjacent_nodes(&self) -> [NodeCoord; 3] {
        self.edges().map(|edge| {
            let [first, second] = edge.endpoints();
            if first == *self {
                second
            } else {
                first
            }
        })
    }
}

impl fmt::Display for NodeCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.hexes;
        write!(f, "{}/{}/{}", x, y, z)
    }
}
