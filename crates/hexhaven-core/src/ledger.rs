//! Player resources, development cards and built pieces.
//!
//! This module contains:
//! - Player colours and development cards
//! - ResourceHand for managing resource counts
//! - Building costs
//! - The per-player ledger and the bank operations over all players
//!
//! The ledger is a passive bank plus inventory. It never decides whether a
//! move is legal; the game state machine does that and then records the
//! outcome here.

use crate::board::{Board, Resource};
use crate::hex::{EdgeCoord, NodeCoord};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Road pieces each player starts with
pub const ROAD_PIECES: u32 = 15;
/// Settlement pieces each player starts with
pub const SETTLEMENT_PIECES: u32 = 5;
/// City pieces each player starts with
pub const CITY_PIECES: u32 = 4;

/// Player colour; doubles as the player's identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Colour {
    Red,
    Blue,
    Orange,
    White,
}

impl Colour {
    /// Colours in seat order
    pub const ALL: [Colour; 4] = [Colour::Red, Colour::Blue, Colour::Orange, Colour::White];
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Colour::Red => "red",
            Colour::Blue => "blue",
            Colour::Orange => "orange",
            Colour::White => "white",
        };
        f.write_str(name)
    }
}

/// Development card types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DevelopmentCard {
    /// Move robber and steal, counts toward Largest Army
    Knight,
    /// Worth 1 VP, never played
    VictoryPoint,
    /// Build 2 roads for free
    RoadBuilding,
    /// Take any 2 resources from the bank
    YearOfPlenty,
    /// All players must give you all of one resource type
    Monopoly,
}

impl DevelopmentCard {
    /// Create the standard development card deck (25 cards)
    pub fn standard_deck() -> Vec<DevelopmentCard> {
        let mut deck = Vec::with_capacity(25);
        deck.extend(std::iter::repeat(DevelopmentCard::Knight).take(14));
        deck.extend(std::iter::repeat(DevelopmentCard::VictoryPoint).take(5));
        deck.extend(std::iter::repeat(DevelopmentCard::RoadBuilding).take(2));
        deck.extend(std::iter::repeat(DevelopmentCard::YearOfPlenty).take(2));
        deck.extend(std::iter::repeat(DevelopmentCard::Monopoly).take(2));
        deck
    }

    /// Whether this card can be played (VP cards are never "played")
    pub fn is_playable(&self) -> bool {
        !matches!(self, DevelopmentCard::VictoryPoint)
    }
}

/// A hand of resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHand {
    pub brick: u32,
    pub lumber: u32,
    pub ore: u32,
    pub grain: u32,
    pub wool: u32,
}

impl ResourceHand {
    /// Create an empty hand
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hand with specific amounts
    pub fn with_amounts(brick: u32, lumber: u32, ore: u32, grain: u32, wool: u32) -> Self {
        Self {
            brick,
            lumber,
            ore,
            grain,
            wool,
        }
    }

    /// Create a hand with a single resource
    pub fn single(resource: Resource, amount: u32) -> Self {
        let mut hand = Self::new();
        hand.add(resource, amount);
        hand
    }

    /// Total number of resource cards
    pub fn total(&self) -> u32 {
        self.brick + self.lumber + self.ore + self.grain + self.wool
    }

    /// Check if hand is empty
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Get count of a specific resource
    pub fn get(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Brick => self.brick,
            Resource::Lumber => self.lumber,
            Resource::Ore => self.ore,
            Resource::Grain => self.grain,
            Resource::Wool => self.wool,
        }
    }

    fn slot(&mut self, resource: Resource) -> &mut u32 {
        match resource {
            Resource::Brick => &mut self.brick,
            Resource::Lumber => &mut self.lumber,
            Resource::Ore => &mut self.ore,
            Resource::Grain => &mut self.grain,
            Resource::Wool => &mut self.wool,
        }
    }

    /// Add resources to hand
    pub fn add(&mut self, resource: Resource, amount: u32) {
        *self.slot(resource) += amount;
    }

    /// Add another hand to this one
    pub fn add_hand(&mut self, other: &ResourceHand) {
        for resource in Resource::ALL {
            self.add(resource, other.get(resource));
        }
    }

    /// First resource kind this hand is short of, as `(kind, have, need)`
    pub fn shortfall(&self, cost: &ResourceHand) -> Option<(Resource, u32, u32)> {
        Resource::ALL
            .into_iter()
            .map(|r| (r, self.get(r), cost.get(r)))
            .find(|(_, have, need)| have < need)
    }

    /// Check if can afford a cost
    pub fn can_afford(&self, cost: &ResourceHand) -> bool {
        self.shortfall(cost).is_none()
    }

    /// Subtract a cost, leaving the hand untouched if any kind is short
    pub fn try_subtract(&mut self, cost: &ResourceHand) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        for resource in Resource::ALL {
            *self.slot(resource) -= cost.get(resource);
        }
        true
    }

    /// Non-zero counts in resource order
    pub fn iter(&self) -> impl Iterator<Item = (Resource, u32)> + '_ {
        Resource::ALL
            .into_iter()
            .map(|r| (r, self.get(r)))
            .filter(|(_, n)| *n > 0)
    }

    /// Remove a random card (for robber stealing)
    pub fn steal_random<R: Rng>(&mut self, rng: &mut R) -> Option<Resource> {
        let cards: Vec<Resource> = self
            .iter()
            .flat_map(|(r, n)| std::iter::repeat(r).take(n as usize))
            .collect();
        let resource = *cards.choose(rng)?;
        *self.slot(resource) -= 1;
        Some(resource)
    }
}

/// Building costs
pub mod costs {
    use super::ResourceHand;

    /// Cost to build a road: 1 brick, 1 lumber
    pub fn road() -> ResourceHand {
        ResourceHand::with_amounts(1, 1, 0, 0, 0)
    }

    /// Cost to build a settlement: 1 brick, 1 lumber, 1 grain, 1 wool
    pub fn settlement() -> ResourceHand {
        ResourceHand::with_amounts(1, 1, 0, 1, 1)
    }

    /// Cost to upgrade to city: 3 ore, 2 grain
    pub fn city() -> ResourceHand {
        ResourceHand::with_amounts(0, 0, 3, 2, 0)
    }

    /// Cost to buy a development card: 1 ore, 1 grain, 1 wool
    pub fn development_card() -> ResourceHand {
        ResourceHand::with_amounts(0, 0, 1, 1, 1)
    }
}

/// Ledger failures
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LedgerError {
    #[error("needs {need} {resource:?} but holds {have}")]
    InsufficientResources {
        resource: Resource,
        have: u32,
        need: u32,
    },

    #[error("no player with colour {0}")]
    UnknownPlayer(Colour),
}

/// Resources handed to one player by a single production step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGrant {
    pub colour: Colour,
    pub resource: Resource,
    pub amount: u32,
}

/// A single player's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLedger {
    pub colour: Colour,
    /// Display name
    pub name: String,
    /// Current resources
    pub hand: ResourceHand,
    pub roads: BTreeSet<EdgeCoord>,
    pub settlements: BTreeSet<NodeCoord>,
    pub cities: BTreeSet<NodeCoord>,
    /// Development cards in hand (unplayed)
    pub dev_cards: Vec<DevelopmentCard>,
    /// Development cards bought this turn (can't be played same turn)
    pub dev_cards_bought_this_turn: Vec<DevelopmentCard>,
    /// Number of knights played (for Largest Army)
    pub knights_played: u32,
    /// Length of this player's longest road, as last computed
    pub longest_road: u32,
    pub has_longest_road: bool,
    pub has_largest_army: bool,
}

impl PlayerLedger {
    /// Create a new player
    pub fn new(colour: Colour, name: impl Into<String>) -> Self {
        Self {
            colour,
            name: name.into(),
            hand: ResourceHand::new(),
            roads: BTreeSet::new(),
            settlements: BTreeSet::new(),
            cities: BTreeSet::new(),
            dev_cards: Vec::new(),
            dev_cards_bought_this_turn: Vec::new(),
            knights_played: 0,
            longest_road: 0,
            has_longest_road: false,
            has_largest_army: false,
        }
    }

    pub fn roads_remaining(&self) -> u32 {
        ROAD_PIECES.saturating_sub(self.roads.len() as u32)
    }

    pub fn settlements_remaining(&self) -> u32 {
        SETTLEMENT_PIECES.saturating_sub(self.settlements.len() as u32)
    }

    pub fn cities_remaining(&self) -> u32 {
        CITY_PIECES.saturating_sub(self.cities.len() as u32)
    }

    /// Victory point cards held, bought this turn or earlier
    pub fn hidden_victory_points(&self) -> u32 {
        self.dev_cards
            .iter()
            .chain(&self.dev_cards_bought_this_turn)
            .filter(|c| matches!(c, DevelopmentCard::VictoryPoint))
            .count() as u32
    }

    /// Points every player can see: structures and bonuses
    pub fn public_victory_points(&self) -> u32 {
        let mut vp = self.settlements.len() as u32 + 2 * self.cities.len() as u32;
        if self.has_longest_road {
            vp += 2;
        }
        if self.has_largest_army {
            vp += 2;
        }
        vp
    }

    /// Calculate total victory points
    pub fn victory_points(&self) -> u32 {
        self.public_victory_points() + self.hidden_victory_points()
    }

    /// Move cards bought this turn into the playable hand
    pub(crate) fn unlock_new_cards(&mut self) {
        let bought = std::mem::take(&mut self.dev_cards_bought_this_turn);
        self.dev_cards.extend(bought);
    }

    /// Remove one playable copy of `card`
    pub(crate) fn take_card(&mut self, card: DevelopmentCard) -> bool {
        match self.dev_cards.iter().position(|c| *c == card) {
            Some(idx) => {
                self.dev_cards.remove(idx);
                true
            }
            None => false,
        }
    }
}

/// Resource and piece bookkeeping for every seat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    players: Vec<PlayerLedger>,
}

impl Ledger {
    /// Create a ledger for the given seats, in seat order
    pub fn new(players: impl IntoIterator<Item = (Colour, String)>) -> Self {
        Self {
            players: players
                .into_iter()
                .map(|(colour, name)| PlayerLedger::new(colour, name))
                .collect(),
        }
    }

    /// All players in seat order
    pub fn players(&self) -> &[PlayerLedger] {
        &self.players
    }

    pub fn player(&self, colour: Colour) -> Option<&PlayerLedger> {
        self.players.iter().find(|p| p.colour == colour)
    }

    pub(crate) fn player_mut(&mut self, colour: Colour) -> Option<&mut PlayerLedger> {
        self.players.iter_mut().find(|p| p.colour == colour)
    }

    pub(crate) fn players_mut(&mut self) -> &mut [PlayerLedger] {
        &mut self.players
    }

    fn require_mut(&mut self, colour: Colour) -> Result<&mut PlayerLedger, LedgerError> {
        self.player_mut(colour)
            .ok_or(LedgerError::UnknownPlayer(colour))
    }

    /// A copy of the player's hand (empty for unknown colours)
    pub fn hand(&self, colour: Colour) -> ResourceHand {
        self.player(colour).map(|p| p.hand.clone()).unwrap_or_default()
    }

    /// Add resources to a player's hand
    pub fn grant(&mut self, colour: Colour, amounts: &ResourceHand) {
        match self.player_mut(colour) {
            Some(player) => player.hand.add_hand(amounts),
            None => warn!(%colour, "grant to unknown player ignored"),
        }
    }

    /// Deduct `cost` in full, or change nothing
    pub fn spend(&mut self, colour: Colour, cost: &ResourceHand) -> Result<(), LedgerError> {
        let player = self.require_mut(colour)?;
        if let Some((resource, have, need)) = player.hand.shortfall(cost) {
            return Err(LedgerError::InsufficientResources {
                resource,
                have,
                need,
            });
        }
        player.hand.try_subtract(cost);
        Ok(())
    }

    pub fn can_afford(&self, colour: Colour, cost: &ResourceHand) -> bool {
        self.player(colour)
            .is_some_and(|p| p.hand.can_afford(cost))
    }

    /// Production for `roll`: every structure on the board collects from each
    /// bordering hex that carries the number and is free of the robber.
    ///
    /// Grants are aggregated per colour and resource, in colour order.
    pub fn distribute(&mut self, board: &Board, roll: u8) -> Vec<ResourceGrant> {
        let mut totals: BTreeMap<(Colour, Resource), u32> = BTreeMap::new();
        for (node, structure) in board.structures() {
            for hex in board.hexes_of(&node) {
                let produced = board.tile(hex).and_then(|t| t.production(roll));
                if let Some(resource) = produced {
                    *totals.entry((structure.colour, resource)).or_default() +=
                        structure.tier.production();
                }
            }
        }

        let grants: Vec<ResourceGrant> = totals
            .into_iter()
            .map(|((colour, resource), amount)| ResourceGrant {
                colour,
                resource,
                amount,
            })
            .collect();
        for grant in &grants {
            self.grant(grant.colour, &ResourceHand::single(grant.resource, grant.amount));
        }
        grants
    }

    /// Move a hand of cards between players, atomically
    pub fn transfer(
        &mut self,
        from: Colour,
        to: Colour,
        hand: &ResourceHand,
    ) -> Result<(), LedgerError> {
        if self.player(to).is_none() {
            return Err(LedgerError::UnknownPlayer(to));
        }
        self.spend(from, hand)?;
        self.grant(to, hand);
        Ok(())
    }

    /// Move one random card from `victim` to `thief`
    pub fn steal_random<R: Rng>(
        &mut self,
        thief: Colour,
        victim: Colour,
        rng: &mut R,
    ) -> Option<Resource> {
        self.player(thief)?;
        let stolen = self.player_mut(victim)?.hand.steal_random(rng)?;
        self.grant(thief, &ResourceHand::single(stolen, 1));
        Some(stolen)
    }

    /// Collect every card of `resource` from the other players into `to`'s hand
    pub fn take_all(&mut self, to: Colour, resource: Resource) -> u32 {
        let mut collected = 0;
        for player in self.players.iter_mut().filter(|p| p.colour != to) {
            let amount = player.hand.get(resource);
            player.hand.try_subtract(&ResourceHand::single(resource, amount));
            collected += amount;
        }
        self.grant(to, &ResourceHand::single(resource, collected));
        collected
    }

    // ==================== Piece Records ====================

    pub(crate) fn record_road(&mut self, colour: Colour, edge: EdgeCoord) {
        if let Some(player) = self.player_mut(colour) {
            player.roads.insert(edge);
        }
    }

    pub(crate) fn record_settlement(&mut self, colour: Colour, node: NodeCoord) {
        if let Some(player) = self.player_mut(colour) {
            player.settlements.insert(node);
        }
    }

    pub(crate) fn record_city(&mut self, colour: Colour, node: NodeCoord) {
        if let Some(player) = self.player_mut(colour) {
            player.settlements.remove(&node);
            player.cities.insert(node);
        }
    }
}
