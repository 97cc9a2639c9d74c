// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport plumbing.
//!
//! # Architecture
//!
//! ```text
//! +--------------------+       +----------------------+
//! | ConnectionsHandler | ----> | dyn RemoteConnection | ----> server
//! +--------------------+       +----------------------+
//!           ^
//!           | created by
//! +--------------------+       +----------------------+
//! | TransportRegistry  | ----> | dyn CallbackServer   | <---- server updates
//! +--------------------+       +----------------------+
//!                                         |
//!                                         v
//!                             dyn UpdateHandler (application)
//! ```
//!
//! A transport is selected by its `(type, version)` pair, e.g.
//! `("SOCKET", "1.0")`. The wire encoding is the transport's business.

pub mod callback;
#[cfg(feature = "local")]
pub mod local;
pub mod registry;

pub use callback::{CallbackServer, UpdateHandler};
#[cfg(feature = "local")]
pub use local::{LocalBroker, LocalCallbackServer, LocalConnection};
pub use registry::{CallbackServerFactory, ConnectionFactory, TransportRegistry};

use crate::qos::{ConnectQos, ConnectReturnQos, MessageUnit, SubscribeReturnQos};
use crate::Result;

// ============================================================================
// Method names
// ============================================================================

/// Remote methods, used for error reporting and call accounting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MethodName {
    Connect,
    Disconnect,
    Ping,
    Subscribe,
    UnSubscribe,
    Get,
    Publish,
    PublishOneway,
    PublishArr,
    Erase,
    Update,
}

impl MethodName {
    /// All methods, in declaration order.
    pub const ALL: [MethodName; 11] = [
        MethodName::Connect,
        MethodName::Disconnect,
        MethodName::Ping,
        MethodName::Subscribe,
        MethodName::UnSubscribe,
        MethodName::Get,
        MethodName::Publish,
        MethodName::PublishOneway,
        MethodName::PublishArr,
        MethodName::Erase,
        MethodName::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MethodName::Connect => "connect",
            MethodName::Disconnect => "disconnect",
            MethodName::Ping => "ping",
            MethodName::Subscribe => "subscribe",
            MethodName::UnSubscribe => "unSubscribe",
            MethodName::Get => "get",
            MethodName::Publish => "publish",
            MethodName::PublishOneway => "publishOneway",
            MethodName::PublishArr => "publishArr",
            MethodName::Erase => "erase",
            MethodName::Update => "update",
        }
    }
}

impl std::fmt::Display for MethodName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Remote connection
// ============================================================================

/// One client-to-server transport.
///
/// Every call blocks until the server answers or the transport gives up.
/// Transport failures must be reported as [`crate::ErrorKind::Communication`]
/// errors (they are retried), broker rejections as [`crate::Error::Remote`]
/// (they are not).
pub trait RemoteConnection: Send {
    /// Transport type this connection implements, e.g. `SOCKET`.
    fn protocol(&self) -> &str;

    /// Log in. Also used to re-establish a lost session.
    fn connect(&mut self, qos: &ConnectQos) -> Result<ConnectReturnQos>;

    /// Log out.
    fn disconnect(&mut self, qos: &str) -> Result<bool>;

    /// Liveness check.
    fn ping(&mut self, qos: &str) -> Result<String>;

    fn subscribe(&mut self, key: &str, qos: &str) -> Result<SubscribeReturnQos>;

    fn unsubscribe(&mut self, key: &str, qos: &str) -> Result<Vec<String>>;

    fn get(&mut self, key: &str, qos: &str) -> Result<Vec<MessageUnit>>;

    fn publish(&mut self, msg: &MessageUnit) -> Result<String>;

    /// Publish without acknowledgement.
    fn publish_oneway(&mut self, msgs: &[MessageUnit]) -> Result<()>;

    fn publish_arr(&mut self, msgs: &[MessageUnit]) -> Result<Vec<String>>;

    fn erase(&mut self, key: &str, qos: &str) -> Result<Vec<String>>;

    /// Release transport resources. Only `connect()` may follow, which
    /// reopens them.
    fn shutdown(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _ = std::any::type_name::<TransportRegistry>();
        let _ = std::any::type_name::<dyn RemoteConnection>();
        let _ = std::any::type_name::<dyn CallbackServer>();
    }

    #[test]
    fn test_method_names() {
        assert_eq!(MethodName::UnSubscribe.to_string(), "unSubscribe");
        assert_eq!(MethodName::PublishOneway.as_str(), "publishOneway");
        assert_eq!(MethodName::ALL.len(), 11);
    }
}
