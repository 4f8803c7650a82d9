//! Hexhaven - a hex-map resource-trading board game engine
//!
//! This crate provides the authoritative game logic, including:
//! - Hex coordinate system and the adjacency tables derived from it
//! - Seeded board generation with resource and number token allocation
//! - Per-player resource hands, pieces and victory points
//! - Game state machine with full rule enforcement
//!
//! # Architecture
//!
//! The engine is transport-agnostic: a host feeds [`GameAction`]s into
//! [`GameState::apply`] and forwards the returned [`GameEvent`]s to players.
//! All randomness comes from a seeded `ChaCha8Rng` carried in the state, so a
//! serialized game resumes with the same dice.
//!
//! # Modules
//!
//! - [`hex`]: Coordinate system for hexes, edges (road slots) and nodes (settlement slots)
//! - [`topology`]: Precomputed adjacency for one map
//! - [`board`]: Tiles, harbours, structures, roads and generation
//! - [`ledger`]: Player hands, pieces and victory points
//! - [`actions`]: Moves and the events they produce
//! - [`game`]: Game state machine

pub mod actions;
pub mod board;
pub mod game;
pub mod hex;
pub mod ledger;
pub mod topology;

// Re-export commonly used types
pub use actions::{DevelopmentPlay, GameAction, GameEvent, TradeOffer, TradePartner};
pub use board::{
    Board, BoardLayout, BoardSnapshot, GenerationError, Harbor, HexKind, PlacementError, Resource,
    Structure, Tier, Tile,
};
pub use game::{GameError, GamePhase, GameRules, GameState, SetupPlacing};
pub use hex::{EdgeCoord, HexCoord, NodeCoord};
pub use ledger::{Colour, DevelopmentCard, Ledger, LedgerError, PlayerLedger, ResourceHand};
pub use topology::Topology;
