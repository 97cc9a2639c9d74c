// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection lifecycle states.
//!
//! # State Machine
//!
//! ```text
//!      +----------+
//!      |  Start   |
//!      +----+-----+
//!           | connect() ok
//!           v
//!      +----------+  foreground retries exhausted
//!      |  Alive   |-------------------------------+
//!      +--+----^--+                               |
//!  ping   |    | reconnect ok (timer)             |
//!  fails  v    |                                  v
//!      +--+----+--+  reconnect retries      +----------+
//!      | Polling  |------------------------>|   Dead   |
//!      +----------+  exhausted (timer)      +----------+
//!
//!      Alive --disconnect()--> Dead
//!      Alive/Polling --shutdown()--> Dead
//! ```
//!
//! `Dead` is terminal. `Start` is left only by a successful `connect()`;
//! shutting down a handler that never connected keeps it in `Start`.

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected
    #[default]
    Start,

    /// Connected and answering pings (a.k.a. CONNECTED)
    Alive,

    /// Connection lost, background reconnect in progress
    Polling,

    /// Retries exhausted or explicitly disconnected (terminal state)
    Dead,
}

impl ConnectionState {
    /// Check if the state accepts foreground remote calls.
    pub fn is_operational(&self) -> bool {
        matches!(self, ConnectionState::Alive)
    }

    /// Check if the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Dead)
    }

    /// Check whether `next` is a legal successor of `self`.
    ///
    /// Staying in the same state is not a transition and is rejected.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Start, Alive)
                | (Alive, Polling)
                | (Alive, Dead)
                | (Polling, Alive)
                | (Polling, Dead)
        )
    }

    /// Status string as reported by `status_string()`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Start => "START",
            ConnectionState::Alive => "ALIVE",
            ConnectionState::Polling => "POLLING",
            ConnectionState::Dead => "DEAD",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
