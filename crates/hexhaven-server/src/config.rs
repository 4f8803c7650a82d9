//! Server configuration from environment variables.

use hexhaven_core::game::{MAX_PLAYERS, MIN_PLAYERS};
use hexhaven_core::GameRules;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

/// Settings for the acceptor and the sessions it starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// `SERVER_ADDR`
    pub addr: SocketAddr,
    /// `PLAYERS_PER_GAME`, 2 to 4
    pub players_per_game: usize,
    /// `GAME_SEED`; each game derives a fresh seed when unset
    pub seed: Option<u64>,
    /// `MOVE_TIMEOUT_SECS`; no limit when unset
    pub move_timeout: Option<Duration>,
    /// Rules for every game, `VICTORY_POINTS` overriding the threshold
    pub rules: GameRules,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            players_per_game: 4,
            seed: None,
            move_timeout: None,
            rules: GameRules::default(),
        }
    }
}

impl ServerConfig {
    /// Read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; missing keys take defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let addr = parse(&lookup, "SERVER_ADDR")?.unwrap_or(defaults.addr);

        let players_per_game = parse::<usize, _>(&lookup, "PLAYERS_PER_GAME")?
            .unwrap_or(defaults.players_per_game);
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&players_per_game) {
            return Err(ConfigError::OutOfRange {
                key: "PLAYERS_PER_GAME",
                value: players_per_game as u64,
                min: MIN_PLAYERS as u64,
                max: MAX_PLAYERS as u64,
            });
        }

        let seed = parse(&lookup, "GAME_SEED")?;
        let move_timeout = parse(&lookup, "MOVE_TIMEOUT_SECS")?.map(Duration::from_secs);

        let mut rules = defaults.rules;
        if let Some(points) = parse::<u32, _>(&lookup, "VICTORY_POINTS")? {
            if points == 0 {
                return Err(ConfigError::OutOfRange {
                    key: "VICTORY_POINTS",
                    value: 0,
                    min: 1,
                    max: u32::MAX as u64,
                });
            }
            rules.victory_points_to_win = points;
        }

        Ok(Self {
            addr,
            players_per_game,
            seed,
            move_timeout,
            rules,
        })
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}
