//! Wire protocol messages for Hexhaven multiplayer.

use hexhaven_core::{
    Board, Colour, GameAction, GameError, GameEvent, GamePhase, Resource, TradeOffer,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Submit a game action on behalf of a colour
    Move { colour: Colour, action: GameAction },

    /// Send chat message
    Chat { message: String },

    /// Leave the game
    Leave,

    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Seat assignment for a newly grouped game
    Welcome {
        session_id: Uuid,
        colour: Colour,
        players: Vec<(Colour, String)>,
    },

    /// The full board, sent once at game start
    BoardSnapshot { board: Board },

    /// It's your move: the phase and the moves currently legal
    Prompt {
        colour: Colour,
        phase: GamePhase,
        actions: Vec<GameAction>,
    },

    /// Dice were rolled
    DiceRolled {
        colour: Colour,
        dice: (u8, u8),
        total: u8,
    },

    /// A player received resources
    ResourceGranted {
        colour: Colour,
        resource: Resource,
        amount: u32,
        roll: Option<u8>,
    },

    /// Current player changed
    TurnChanged { colour: Colour, turn_number: u32 },

    /// A trade offer addressed to a colour
    TradeProposed { offer: TradeOffer },

    /// Any other game event, redacted for the receiving seat
    Event { event: GameEvent },

    /// The submitted move was not applied
    MoveRejected { colour: Colour, error: GameError },

    /// Chat message received
    ChatMessage { colour: Colour, message: String },

    /// Error occurred
    Error { message: String },

    /// Pong response
    Pong,

    /// Game finished
    GameOver {
        winner: Colour,
        victory_points: u32,
    },
}

impl ServerMessage {
    /// Wrap a game event as seen by `viewer`.
    ///
    /// Dice, grants, turn changes and trade offers get their own message kinds.
    pub fn from_event(event: &GameEvent, viewer: Colour) -> Self {
        match event.redacted_for(viewer) {
            GameEvent::DiceRolled {
                colour,
                dice,
                total,
            } => ServerMessage::DiceRolled {
                colour,
                dice,
                total,
            },
            GameEvent::ResourceGranted {
                colour,
                resource,
                amount,
                roll,
            } => ServerMessage::ResourceGranted {
                colour,
                resource,
                amount,
                roll,
            },
            GameEvent::TurnChanged {
                colour,
                turn_number,
            } => ServerMessage::TurnChanged {
                colour,
                turn_number,
            },
            GameEvent::TradeProposed { offer } => ServerMessage::TradeProposed { offer },
            event => ServerMessage::Event { event },
        }
    }
}
