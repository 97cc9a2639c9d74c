// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application-scoped client resources.
//!
//! A [`ClientRuntime`] bundles what all clients of one application share:
//! the ping timer thread, the transport registry and the properties. It is
//! created once, cloned into every [`crate::XmlBlasterAccess`], and the timer
//! thread stops when the last clone is dropped.

use crate::config::ClientProperties;
use crate::dispatch::ConnectionsHandler;
use crate::protocol::TransportRegistry;
use crate::qos::{Address, ConnectQos};
use crate::timer::Timeout;
use crate::Result;
use std::sync::Arc;

/// Name of the shared ping timer thread.
pub const PING_TIMER_NAME: &str = "xmlblaster-ping-timer";

/// Shared timer, transports and properties.
#[derive(Clone, Debug)]
pub struct ClientRuntime {
    timer: Arc<Timeout>,
    registry: Arc<TransportRegistry>,
    properties: Arc<ClientProperties>,
}

impl ClientRuntime {
    /// Start the ping timer. No transport is registered yet.
    pub fn new(properties: ClientProperties) -> Result<Self> {
        let timer = Timeout::new(PING_TIMER_NAME)?;
        log::debug!("[runtime] started with {} properties", properties.len());
        Ok(Self {
            timer: Arc::new(timer),
            registry: Arc::new(TransportRegistry::new()),
            properties: Arc::new(properties),
        })
    }

    /// Runtime with the in-process transport registered, plus its broker.
    #[cfg(feature = "local")]
    pub fn local(properties: ClientProperties) -> Result<(Self, Arc<crate::protocol::LocalBroker>)> {
        let runtime = Self::new(properties)?;
        let broker = crate::protocol::LocalBroker::new();
        runtime.registry.register_local(&broker);
        Ok((runtime, broker))
    }

    pub fn timer(&self) -> &Arc<Timeout> {
        &self.timer
    }

    pub fn registry(&self) -> &Arc<TransportRegistry> {
        &self.registry
    }

    pub fn properties(&self) -> &ClientProperties {
        &self.properties
    }

    /// Address configured by the properties.
    pub fn address(&self) -> Result<Address> {
        Address::from_properties(&self.properties)
    }

    /// Connect QoS for `login_name` with the configured address.
    pub fn connect_qos(&self, login_name: &str) -> Result<ConnectQos> {
        Ok(ConnectQos::builder(login_name).address(self.address()?).build())
    }

    /// New handler on this runtime's timer and registry.
    pub fn connections_handler(&self, name: impl Into<String>) -> ConnectionsHandler {
        ConnectionsHandler::new(name, self.timer.clone(), self.registry.clone())
    }
}
