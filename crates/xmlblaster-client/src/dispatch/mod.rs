// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection dispatch: lifecycle states, fail-over listener and the
//! connections handler that drives them.

pub mod handler;
pub mod listener;
pub mod state;

pub use handler::{ConnectionsHandler, HandlerStats};
pub use listener::{ClosureProblemsListener, ConnectionEvent, ConnectionProblemsListener};
pub use state::ConnectionState;
