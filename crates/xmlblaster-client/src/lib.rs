// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # xmlblaster-client
//!
//! Fail-safe client connection for the xmlBlaster message broker.
//!
//! Applications issue logically synchronous requests (publish, subscribe,
//! get, erase). The client hides transient outages: failed calls are retried
//! with a fixed delay, a background ping notices a silent server, and a lost
//! connection is re-established automatically while the application is told
//! through a [`ConnectionProblemsListener`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use xmlblaster_client::{ClientProperties, ClientRuntime, ConnectQos, MessageUnit, Result, XmlBlasterAccess};
//!
//! fn main() -> Result<()> {
//!     let props = ClientProperties::load(std::env::args());
//!     let (runtime, _broker) = ClientRuntime::local(props)?;
//!
//!     let access = XmlBlasterAccess::new(runtime.clone(), "demo");
//!     access.connect(runtime.connect_qos("joe")?, None)?;
//!     access.publish(&MessageUnit::new("<key oid='hello'/>", "world", ""))?;
//!     access.disconnect("<qos/>")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |                        XmlBlasterAccess                       |
//! |  requests -> ConnectionsHandler    updates <- CallbackServer  |
//! +---------------------------------------------------------------+
//! |                       ConnectionsHandler                      |
//! |  START -> ALIVE <-> POLLING -> DEAD | retry loop | ping timer |
//! +---------------------------------------------------------------+
//! |                         ClientRuntime                         |
//! |  Timeout (ping thread) | TransportRegistry | ClientProperties |
//! +---------------------------------------------------------------+
//! |                           Transports                          |
//! |  dyn RemoteConnection | dyn CallbackServer | LOCAL (built in) |
//! +---------------------------------------------------------------+
//! ```
//!
//! ## Retry policy
//!
//! Configured per connection by [`Address`]:
//!
//! | Property | Default | Meaning |
//! |----------|---------|---------|
//! | `retries` | `-1` | failed attempts tolerated per call, `-1` forever |
//! | `delay` | `5000` ms | wait between attempts; `0` disables fail-safe mode |
//! | `pingInterval` | `10000` ms | liveness check period; `0` disables pinging |
//!
//! ## Modules Overview
//!
//! - [`access`] - client facade (start here)
//! - [`dispatch`] - connection state machine and listener
//! - [`protocol`] - transport traits, registry and the `LOCAL` transport
//! - [`qos`] - request and reply values, [`Address`]
//! - [`timer`] - shared timer thread
//! - [`config`] - property loading

pub mod access;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod qos;
pub mod runtime;
pub mod timer;

pub use access::XmlBlasterAccess;
pub use config::ClientProperties;
pub use dispatch::{
    ClosureProblemsListener, ConnectionEvent, ConnectionProblemsListener, ConnectionState,
    ConnectionsHandler, HandlerStats,
};
pub use error::{Error, ErrorKind, Result};
pub use protocol::{
    callback::ClosureUpdateHandler, CallbackServer, MethodName, RemoteConnection, TransportRegistry,
    UpdateHandler,
};
#[cfg(feature = "local")]
pub use protocol::LocalBroker;
pub use qos::{
    Address, ConnectQos, ConnectReturnQos, MessageUnit, SessionQos, SubscribeReturnQos, UpdateQos,
    EMPTY_QOS, STATUS_OK,
};
pub use runtime::ClientRuntime;
pub use timer::{TimerKey, Timeout};
