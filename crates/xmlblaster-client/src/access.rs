// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client facade.
//!
//! [`XmlBlasterAccess`] is what applications use: it owns one
//! [`ConnectionsHandler`] and, when updates are wanted, one
//! [`CallbackServer`]. Requests go through the handler and inherit its
//! retry and fail-over behaviour; updates come in through the callback
//! server and are routed to the subscription's handler, or to the default
//! handler passed at `connect()`.

use crate::dispatch::{ConnectionProblemsListener, ConnectionState, ConnectionsHandler};
use crate::protocol::{CallbackServer, MethodName, UpdateHandler};
use crate::qos::{ConnectQos, ConnectReturnQos, MessageUnit, SubscribeReturnQos, UpdateQos, STATUS_OK};
use crate::runtime::ClientRuntime;
use crate::{ClientProperties, Error, Result};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

// ============================================================================
// Update routing
// ============================================================================

/// Routes incoming updates to per-subscription handlers.
#[derive(Default)]
struct UpdateDispatcher {
    default_handler: RwLock<Option<Arc<dyn UpdateHandler>>>,
    subscriptions: DashMap<String, Arc<dyn UpdateHandler>>,
}

impl UpdateHandler for UpdateDispatcher {
    fn update(&self, session_id: &str, key: &str, content: &[u8], qos: &UpdateQos) -> Result<String> {
        let by_subscription = qos
            .subscription_id
            .as_ref()
            .and_then(|id| self.subscriptions.get(id).map(|h| h.value().clone()));
        let handler = by_subscription.or_else(|| self.default_handler.read().clone());
        match handler {
            Some(h) => h.update(session_id, key, content, qos),
            None => {
                log::error!(
                    "[access] update for {} (subscription {:?}) has no handler, dropped",
                    key,
                    qos.subscription_id
                );
                Ok(STATUS_OK.to_string())
            }
        }
    }
}

/// Subscription id in an unsubscribe reply such as `<qos><subscribe id='__subId:3'/></qos>`.
fn subscription_id_of(qos: &str) -> Option<String> {
    let doc = roxmltree::Document::parse(qos).ok()?;
    doc.descendants()
        .find(|n| n.has_tag_name("subscribe"))
        .and_then(|n| n.attribute("id"))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Facade
// ============================================================================

/// Fail-safe client connection. See the module docs.
///
/// ```ignore
/// let (runtime, _broker) = ClientRuntime::local(ClientProperties::new())?;
/// let access = XmlBlasterAccess::new(runtime, "demo");
/// access.connect(ConnectQos::new("joe"), None)?;
/// access.publish(&MessageUnit::new("<key oid='hello'/>", "world", ""))?;
/// access.disconnect("<qos/>")?;
/// ```
pub struct XmlBlasterAccess {
    name: String,
    runtime: ClientRuntime,
    handler: RwLock<Option<Arc<ConnectionsHandler>>>,
    callback: Mutex<Option<Box<dyn CallbackServer>>>,
    dispatcher: Arc<UpdateDispatcher>,
    listener: Mutex<Option<Weak<dyn ConnectionProblemsListener>>>,
}

impl XmlBlasterAccess {
    /// Create an unconnected client. `name` is used in log messages.
    pub fn new(runtime: ClientRuntime, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runtime,
            handler: RwLock::new(None),
            callback: Mutex::new(None),
            dispatcher: Arc::new(UpdateDispatcher::default()),
            listener: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runtime(&self) -> &ClientRuntime {
        &self.runtime
    }

    /// Handler for the current connection, if `connect()` was called.
    pub fn connections_handler(&self) -> Option<Arc<ConnectionsHandler>> {
        self.handler.read().clone()
    }

    fn require_handler(&self, method: MethodName) -> Result<Arc<ConnectionsHandler>> {
        self.connections_handler()
            .ok_or(Error::NoConnection { method })
    }

    /// Register the fail-over listener. Only a weak reference is kept.
    /// May be called before or after `connect()`.
    pub fn init_failsafe<L>(&self, listener: &Arc<L>)
    where
        L: ConnectionProblemsListener + 'static,
    {
        let listener: Arc<dyn ConnectionProblemsListener> = listener.clone();
        let weak = Arc::downgrade(&listener);
        if let Some(handler) = self.connections_handler() {
            handler.set_listener(weak.clone());
        }
        *self.listener.lock() = Some(weak);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Log in. With an `update_handler` a callback server is started first
    /// and its address is sent along, so the server can push messages.
    pub fn connect(
        &self,
        qos: ConnectQos,
        update_handler: Option<Arc<dyn UpdateHandler>>,
    ) -> Result<ConnectReturnQos> {
        let handler = {
            let mut slot = self.handler.write();
            slot.get_or_insert_with(|| {
                Arc::new(self.runtime.connections_handler(format!("connections-handler:{}", self.name)))
            })
            .clone()
        };

        let mut qos = qos;
        if let Some(update_handler) = update_handler {
            *self.dispatcher.default_handler.write() = Some(update_handler);
            let mut callback = self.callback.lock();
            if callback.is_none() {
                let address = qos.address();
                let mut server = self
                    .runtime
                    .registry()
                    .create_callback_server(address.protocol(), address.version())?;
                let dispatcher: Arc<dyn UpdateHandler> = self.dispatcher.clone();
                server.initialize(qos.session().login_name(), dispatcher)?;
                log::info!(
                    "[access] {} callback server listening on '{}'",
                    server.protocol(),
                    server.callback_address()
                );
                *callback = Some(server);
            }
            if let Some(server) = callback.as_ref() {
                qos = qos.with_callback_address(server.callback_address());
            }
        }

        if let Some(listener) = self.listener.lock().clone() {
            handler.set_listener(listener);
        }

        let ret = handler.connect(qos)?;
        log::info!("[access] {} connected as '{}'", self.name, ret.session_name);
        Ok(ret)
    }

    /// Log out, stop the callback server and forget subscriptions.
    /// Returns `Ok(false)` if the connection was already dead.
    pub fn disconnect(&self, qos: &str) -> Result<bool> {
        let handler = self.require_handler(MethodName::Disconnect)?;
        let result = handler.disconnect(qos);
        self.shutdown_callback();
        self.dispatcher.subscriptions.clear();
        result
    }

    /// Drop the connection without logging out. The server keeps the
    /// session until it expires.
    pub fn leave_server(&self) {
        log::info!("[access] {} leaving server without disconnect", self.name);
        self.shutdown_callback();
        if let Some(handler) = self.connections_handler() {
            handler.shutdown();
        }
    }

    fn shutdown_callback(&self) {
        if let Some(mut server) = self.callback.lock().take() {
            if let Err(e) = server.shutdown() {
                log::warn!("[access] callback server shutdown failed: {}", e);
            }
        }
    }

    // ========================================================================
    // Requests
    // ========================================================================

    pub fn subscribe(&self, key: &str, qos: &str) -> Result<SubscribeReturnQos> {
        self.require_handler(MethodName::Subscribe)?.subscribe(key, qos)
    }

    /// Subscribe and route this subscription's updates to `handler`
    /// instead of the default one.
    pub fn subscribe_with(
        &self,
        key: &str,
        qos: &str,
        handler: Arc<dyn UpdateHandler>,
    ) -> Result<SubscribeReturnQos> {
        let ret = self.subscribe(key, qos)?;
        log::debug!("[access] handler registered for {}", ret.subscription_id);
        self.dispatcher
            .subscriptions
            .insert(ret.subscription_id.clone(), handler);
        Ok(ret)
    }

    pub fn unsubscribe(&self, key: &str, qos: &str) -> Result<Vec<String>> {
        let ret = self.require_handler(MethodName::UnSubscribe)?.unsubscribe(key, qos)?;
        for id in ret.iter().filter_map(|q| subscription_id_of(q)) {
            self.dispatcher.subscriptions.remove(&id);
        }
        Ok(ret)
    }

    pub fn get(&self, key: &str, qos: &str) -> Result<Vec<MessageUnit>> {
        self.require_handler(MethodName::Get)?.get(key, qos)
    }

    pub fn publish(&self, msg: &MessageUnit) -> Result<String> {
        self.require_handler(MethodName::Publish)?.publish(msg)
    }

    pub fn publish_oneway(&self, msgs: &[MessageUnit]) -> Result<()> {
        self.require_handler(MethodName::PublishOneway)?.publish_oneway(msgs)
    }

    pub fn publish_arr(&self, msgs: &[MessageUnit]) -> Result<Vec<String>> {
        self.require_handler(MethodName::PublishArr)?.publish_arr(msgs)
    }

    pub fn erase(&self, key: &str, qos: &str) -> Result<Vec<String>> {
        self.require_handler(MethodName::Erase)?.erase(key, qos)
    }

    pub fn ping(&self, qos: &str) -> Result<String> {
        self.require_handler(MethodName::Ping)?.ping(qos)
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn state(&self) -> ConnectionState {
        self.connections_handler()
            .map_or(ConnectionState::Start, |h| h.state())
    }

    pub fn is_connected(&self) -> bool {
        self.connections_handler().is_some_and(|h| h.is_connected())
    }

    pub fn is_alive(&self) -> bool {
        self.connections_handler().is_some_and(|h| h.is_alive())
    }

    pub fn is_polling(&self) -> bool {
        self.connections_handler().is_some_and(|h| h.is_polling())
    }

    pub fn is_dead(&self) -> bool {
        self.connections_handler().map_or(true, |h| h.is_dead())
    }

    /// Handler state, or `DEAD` before the first `connect()`.
    pub fn status_string(&self) -> &'static str {
        self.connections_handler()
            .map_or(ConnectionState::Dead.as_str(), |h| h.status_string())
    }

    /// Login name of the last `connect()`.
    pub fn login_name(&self) -> Option<String> {
        self.connections_handler()?
            .connect_qos()
            .map(|q| q.session().login_name().to_string())
    }

    /// Absolute session name assigned by the server.
    pub fn session_name(&self) -> Option<String> {
        self.connections_handler()?
            .connect_return_qos()
            .map(|r| r.session_name)
    }

    /// Help text for the client properties.
    pub fn usage() -> String {
        let mut text = String::from("\nXmlBlasterAccess client\n");
        text.push_str(&ClientProperties::usage());
        text
    }
}

impl Drop for XmlBlasterAccess {
    fn drop(&mut self) {
        self.shutdown_callback();
        if let Some(handler) = self.handler.write().take() {
            handler.shutdown();
        }
    }
}

impl std::fmt::Debug for XmlBlasterAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlBlasterAccess")
            .field("name", &self.name)
            .field("status", &self.status_string())
            .field("subscriptions", &self.dispatcher.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_id_of() {
        assert_eq!(
            subscription_id_of("<qos><subscribe id='__subId:3'/></qos>").as_deref(),
            Some("__subId:3")
        );
        assert_eq!(
            subscription_id_of("<qos><subscribe id=\"__subId:4\"/></qos>").as_deref(),
            Some("__subId:4")
        );
        assert_eq!(
            subscription_id_of("<qos><subscribe xid='other' id='__subId:7'/></qos>").as_deref(),
            Some("__subId:7")
        );
        assert_eq!(
            subscription_id_of("<qos><state id='OK'/><subscribe id='__subId:8'/></qos>").as_deref(),
            Some("__subId:8")
        );
        assert_eq!(subscription_id_of("<qos><subscribe xid='x'/></qos>"), None);
        assert_eq!(subscription_id_of("<qos/>"), None);
        assert_eq!(subscription_id_of("<qos><subscribe id='broken'"), None);
    }

    #[test]
    fn test_dispatcher_without_handler_acks() {
        let dispatcher = UpdateDispatcher::default();
        let status = dispatcher
            .update("s", "<key oid='a'/>", b"", &UpdateQos::default())
            .unwrap();
        assert_eq!(status, STATUS_OK);
    }

    #[cfg(feature = "local")]
    #[test]
    fn test_status_before_connect() {
        let (runtime, _broker) = ClientRuntime::local(ClientProperties::new()).unwrap();
        let access = XmlBlasterAccess::new(runtime, "idle");
        assert_eq!(access.status_string(), "DEAD");
        assert!(access.is_dead());
        assert!(!access.is_connected());
        assert!(access.login_name().is_none());
        assert!(matches!(
            access.publish(&MessageUnit::default()).unwrap_err(),
            Error::NoConnection { method: MethodName::Publish }
        ));
        assert!(XmlBlasterAccess::usage().contains("pingInterval"));
    }
}
