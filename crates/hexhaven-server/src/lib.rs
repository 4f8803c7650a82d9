//! Hexhaven multiplayer host.
//!
//! - [`protocol`]: messages exchanged with players
//! - [`framing`]: length-prefixed frames for the TCP transport
//! - [`connection`]: the duplex channel and its in-process transport
//! - [`net`]: the TCP transport
//! - [`session`]: drives one game over its seats' connections
//! - [`server`]: accepts players and starts sessions
//! - [`config`]: environment configuration

pub mod config;
pub mod connection;
pub mod framing;
pub mod net;
pub mod protocol;
pub mod server;
pub mod session;

pub use config::{ConfigError, ServerConfig};
pub use connection::{
    in_process_pair, ClientConnection, Connection, ConnectionError, ServerConnection,
};
pub use net::connect;
pub use protocol::{ClientMessage, ServerMessage};
pub use server::{run_server, serve};
pub use session::{GameSession, Seat, SessionError};
