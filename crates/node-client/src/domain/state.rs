//! Connection lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a [`ConnectionSupervisor`](crate::adapters::connection::ConnectionSupervisor).
///
/// ```text
///            connect()           transport open
///   CLOSED ────────────► CONNECTING ─────────────► OPEN
///     ▲                      │                       │
///     │ cool-down elapsed    │ error / remote close  │
///     └──────────────── FAILURE ◄────────────────────┘
/// ```
///
/// A deliberate local close moves straight to CLOSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Connecting,
    Open,
    #[default]
    Closed,
    Failure,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Failure => "FAILURE",
        };
        f.write_str(name)
    }
}
