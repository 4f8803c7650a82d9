//! A running game: one [`GameState`] bound to one connection per seat.
//!
//! The session task is the only writer of game state. It prompts whichever
//! colour the state machine is waiting on, reads that seat's next message,
//! applies it and fans the resulting events out to every seat. Messages from
//! other seats stay queued until it is their turn to act.

use crate::connection::{ConnectionError, ServerConnection};
use crate::protocol::{ClientMessage, ServerMessage};
use hexhaven_core::{Colour, GameError, GameEvent, GameRules, GameState};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("player {0} disconnected")]
    PlayerDisconnected(Colour),

    #[error("player {0} did not move in time")]
    MoveTimedOut(Colour),

    #[error("no connection for player {0}")]
    MissingSeat(Colour),

    #[error("could not start game: {0}")]
    Game(#[from] GameError),
}

/// One player's place at the table
pub struct Seat {
    pub colour: Colour,
    pub name: String,
    pub connection: ServerConnection,
}

impl Seat {
    pub fn new(colour: Colour, name: impl Into<String>, connection: ServerConnection) -> Self {
        Self {
            colour,
            name: name.into(),
            connection,
        }
    }
}

pub struct GameSession {
    id: Uuid,
    game: GameState,
    seats: Vec<Seat>,
    move_timeout: Option<Duration>,
}

impl GameSession {
    /// Start a new game for `seats`, in seat order
    pub fn new(seats: Vec<Seat>, seed: u64, rules: GameRules) -> Result<Self, SessionError> {
        let players = seats.iter().map(|s| (s.colour, s.name.clone())).collect();
        let game = GameState::new(players, seed, rules)?;
        Ok(Self::resume(game, seats))
    }

    /// Continue an in-flight game with fresh connections
    pub fn resume(game: GameState, seats: Vec<Seat>) -> Self {
        Self {
            id: Uuid::new_v4(),
            game,
            seats,
            move_timeout: None,
        }
    }

    /// Use a specific session id, such as the one sent in `Welcome`
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Give up on a player who takes longer than `timeout` to move
    pub fn with_move_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.move_timeout = timeout;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Copy of the game state for resuming later
    pub fn snapshot(&self) -> GameState {
        self.game.clone()
    }

    /// Play until someone wins or a seat drops out.
    ///
    /// Every connection is closed when this returns.
    pub async fn run(&mut self) -> Result<Colour, SessionError> {
        let result = self.play().await;
        match &result {
            Ok(winner) => info!(session = %self.id, %winner, "game finished"),
            Err(e) => warn!(session = %self.id, "game ended early: {}", e),
        }
        for seat in &mut self.seats {
            seat.connection.close();
        }
        result
    }

    async fn play(&mut self) -> Result<Colour, SessionError> {
        for player in self.game.players() {
            if !self.seats.iter().any(|s| s.colour == player.colour) {
                return Err(SessionError::MissingSeat(player.colour));
            }
        }

        info!(session = %self.id, seats = self.seats.len(), "game starting");
        self.broadcast(ServerMessage::BoardSnapshot {
            board: self.game.board().clone(),
        })?;

        loop {
            // Only a finished game has nobody to wait on
            let Some(actor) = self.game.pending_actor() else {
                return self.finish();
            };

            self.send_to(
                actor,
                ServerMessage::Prompt {
                    colour: actor,
                    phase: self.game.phase().clone(),
                    actions: self.game.legal_actions(actor),
                },
            )?;

            match self.receive_from(actor).await? {
                ClientMessage::Move { colour, action } => {
                    if colour != actor {
                        self.send_to(
                            actor,
                            ServerMessage::MoveRejected {
                                colour,
                                error: GameError::NotYourTurn,
                            },
                        )?;
                        continue;
                    }
                    debug!(session = %self.id, %colour, ?action, "applying move");
                    match self.game.apply(colour, action) {
                        Ok(events) => self.broadcast_events(&events)?,
                        Err(error) => {
                            debug!(session = %self.id, %colour, "move rejected: {}", error);
                            self.send_to(actor, ServerMessage::MoveRejected { colour, error })?;
                        }
                    }
                }
                ClientMessage::Chat { message } => {
                    self.broadcast(ServerMessage::ChatMessage {
                        colour: actor,
                        message,
                    })?;
                }
                ClientMessage::Ping => self.send_to(actor, ServerMessage::Pong)?,
                ClientMessage::Leave => {
                    info!(session = %self.id, colour = %actor, "player left");
                    return Err(SessionError::PlayerDisconnected(actor));
                }
            }
        }
    }

    fn finish(&self) -> Result<Colour, SessionError> {
        let winner = self.game.winner().ok_or(GameError::GameOver)?;
        let message = ServerMessage::GameOver {
            winner,
            victory_points: self.game.victory_points(winner),
        };
        // The result stands even if a seat has already gone
        for seat in &self.seats {
            if let Err(e) = seat.connection.send(message.clone()) {
                debug!(session = %self.id, colour = %seat.colour, "game over not delivered: {}", e);
            }
        }
        Ok(winner)
    }

    /// Next usable message from `colour`, reporting bad payloads back to them
    async fn receive_from(&mut self, colour: Colour) -> Result<ClientMessage, SessionError> {
        let timeout = self.move_timeout;
        loop {
            let seat = self
                .seats
                .iter_mut()
                .find(|s| s.colour == colour)
                .ok_or(SessionError::MissingSeat(colour))?;

            let received = match timeout {
                Some(limit) => seat.connection.receive_timeout(limit).await,
                None => seat.connection.receive().await,
            };
            match received {
                Ok(message) => return Ok(message),
                Err(ConnectionError::MalformedMessage(reason)) => {
                    warn!(session = %self.id, %colour, "malformed message: {}", reason);
                    if seat
                        .connection
                        .send(ServerMessage::Error {
                            message: format!("malformed message: {reason}"),
                        })
                        .is_err()
                    {
                        return Err(SessionError::PlayerDisconnected(colour));
                    }
                }
                Err(ConnectionError::Timeout) => return Err(SessionError::MoveTimedOut(colour)),
                Err(e) => {
                    info!(session = %self.id, %colour, "connection lost: {}", e);
                    return Err(SessionError::PlayerDisconnected(colour));
                }
            }
        }
    }

    /// Every seat gets its own redacted view of `events`
    fn broadcast_events(&self, events: &[GameEvent]) -> Result<(), SessionError> {
        for seat in &self.seats {
            for event in events {
                self.deliver(seat, ServerMessage::from_event(event, seat.colour))?;
            }
        }
        Ok(())
    }

    fn broadcast(&self, message: ServerMessage) -> Result<(), SessionError> {
        for seat in &self.seats {
            self.deliver(seat, message.clone())?;
        }
        Ok(())
    }

    fn send_to(&self, colour: Colour, message: ServerMessage) -> Result<(), SessionError> {
        let seat = self
            .seats
            .iter()
            .find(|s| s.colour == colour)
            .ok_or(SessionError::MissingSeat(colour))?;
        self.deliver(seat, message)
    }

    /// A seat that can no longer be written to has left the game
    fn deliver(&self, seat: &Seat, message: ServerMessage) -> Result<(), SessionError> {
        seat.connection.send(message).map_err(|e| {
            info!(session = %self.id, colour = %seat.colour, "connection lost: {}", e);
            SessionError::PlayerDisconnected(seat.colour)
        })
    }
}
