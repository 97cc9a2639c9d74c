// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport factories keyed by `(type, version)`.
//!
//! The registry is an ordinary value owned by the application (through
//! [`crate::ClientRuntime`]). Transports that need process-wide resources
//! keep them inside their factory closure, so their lifetime ends with the
//! registry.

use super::{CallbackServer, RemoteConnection};
use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;

/// Builds a fresh connection for one client.
pub type ConnectionFactory = Arc<dyn Fn() -> Result<Box<dyn RemoteConnection>> + Send + Sync>;

/// Builds a fresh callback server for one client.
pub type CallbackServerFactory = Arc<dyn Fn() -> Result<Box<dyn CallbackServer>> + Send + Sync>;

type TransportKey = (String, String);

/// Registered transports.
#[derive(Default)]
pub struct TransportRegistry {
    connections: DashMap<TransportKey, ConnectionFactory>,
    callbacks: DashMap<TransportKey, CallbackServerFactory>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the client side of a transport. Replaces an earlier entry.
    pub fn register_connection<F>(&self, protocol: &str, version: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn RemoteConnection>> + Send + Sync + 'static,
    {
        log::debug!("[registry] connection plugin {},{} registered", protocol, version);
        self.connections
            .insert(key(protocol, version), Arc::new(factory));
    }

    /// Register the callback side of a transport. Replaces an earlier entry.
    pub fn register_callback_server<F>(&self, protocol: &str, version: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn CallbackServer>> + Send + Sync + 'static,
    {
        log::debug!("[registry] callback plugin {},{} registered", protocol, version);
        self.callbacks.insert(key(protocol, version), Arc::new(factory));
    }

    /// Register the in-process transport under `("LOCAL", "1.0")`.
    #[cfg(feature = "local")]
    pub fn register_local(&self, broker: &Arc<super::LocalBroker>) {
        let b = broker.clone();
        self.register_connection("LOCAL", "1.0", move || {
            Ok(Box::new(super::LocalConnection::new(b.clone())) as Box<dyn RemoteConnection>)
        });
        let b = broker.clone();
        self.register_callback_server("LOCAL", "1.0", move || {
            Ok(Box::new(super::LocalCallbackServer::new(b.clone())) as Box<dyn CallbackServer>)
        });
    }

    /// Instantiate a connection for `(protocol, version)`.
    pub fn create_connection(&self, protocol: &str, version: &str) -> Result<Box<dyn RemoteConnection>> {
        let factory = self
            .connections
            .get(&key(protocol, version))
            .map(|f| f.value().clone())
            .ok_or_else(|| unknown("connection", protocol, version))?;
        factory()
    }

    /// Instantiate a callback server for `(protocol, version)`.
    pub fn create_callback_server(&self, protocol: &str, version: &str) -> Result<Box<dyn CallbackServer>> {
        let factory = self
            .callbacks
            .get(&key(protocol, version))
            .map(|f| f.value().clone())
            .ok_or_else(|| unknown("callback", protocol, version))?;
        factory()
    }

    pub fn has_connection(&self, protocol: &str, version: &str) -> bool {
        self.connections.contains_key(&key(protocol, version))
    }

    pub fn has_callback_server(&self, protocol: &str, version: &str) -> bool {
        self.callbacks.contains_key(&key(protocol, version))
    }

    /// Registered connection transports, sorted.
    pub fn protocols(&self) -> Vec<(String, String)> {
        let mut list: Vec<_> = self.connections.iter().map(|e| e.key().clone()).collect();
        list.sort();
        list
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}

fn key(protocol: &str, version: &str) -> TransportKey {
    (protocol.to_string(), version.to_string())
}

fn unknown(kind: &str, protocol: &str, version: &str) -> Error {
    Error::config(format!(
        "no {} plugin registered for type '{}' version '{}'",
        kind, protocol, version
    ))
}
