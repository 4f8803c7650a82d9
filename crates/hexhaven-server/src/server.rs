//! TCP acceptor: groups incoming players into games and runs each one.

use crate::config::ServerConfig;
use crate::connection::{Connection, ServerConnection};
use crate::protocol::ServerMessage;
use crate::session::{GameSession, Seat};
use hexhaven_core::Colour;
use std::io;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Bind `config.addr` and serve games until the listener fails
pub async fn run_server(config: ServerConfig) -> io::Result<()> {
    let listener = TcpListener::bind(config.addr).await?;
    info!("Hexhaven server listening on {}", config.addr);
    serve(listener, config).await
}

/// Accept players on an already bound listener.
///
/// Every `players_per_game` connections, in arrival order, become one game;
/// seats take colours in seat order.
pub async fn serve(listener: TcpListener, config: ServerConfig) -> io::Result<()> {
    let mut lobby: Vec<ServerConnection> = Vec::new();

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        info!("New connection from {}", peer_addr);
        lobby.push(Connection::over_tcp(stream));

        if lobby.len() >= config.players_per_game {
            let connections = std::mem::take(&mut lobby);
            start_game(connections, &config);
        }
    }
}

/// Seat the grouped connections and spawn their session
fn start_game(connections: Vec<ServerConnection>, config: &ServerConfig) {
    let session_id = Uuid::new_v4();
    // Low bits of the session id when no seed is configured
    let seed = config
        .seed
        .unwrap_or_else(|| session_id.as_u128() as u64);

    let seats: Vec<Seat> = Colour::ALL
        .into_iter()
        .zip(connections)
        .map(|(colour, connection)| Seat::new(colour, format!("Player {colour}"), connection))
        .collect();
    let players: Vec<(Colour, String)> = seats.iter().map(|s| (s.colour, s.name.clone())).collect();

    for seat in &seats {
        let welcome = ServerMessage::Welcome {
            session_id,
            colour: seat.colour,
            players: players.clone(),
        };
        // A seat that is already gone fails the session's first broadcast
        if let Err(e) = seat.connection.send(welcome) {
            warn!(session = %session_id, colour = %seat.colour, "welcome not delivered: {}", e);
        }
    }

    let rules = config.rules.clone();
    let move_timeout = config.move_timeout;
    info!(session = %session_id, seed, players = seats.len(), "starting game");

    tokio::spawn(async move {
        match GameSession::new(seats, seed, rules) {
            Ok(session) => {
                let mut session = session
                    .with_id(session_id)
                    .with_move_timeout(move_timeout);
                // Outcome is logged by the session
                let _ = session.run().await;
            }
            Err(e) => error!(session = %session_id, "failed to start game: {}", e),
        }
    });
}
