// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process `LOCAL` transport.
//!
//! [`LocalBroker`] is a small in-memory broker: one retained message per
//! topic, exact-oid subscriptions. Clients reach it through
//! [`LocalConnection`] and receive updates through [`LocalCallbackServer`],
//! which runs them on its own thread.
//!
//! The broker can be told to misbehave, which is how fail-over is exercised
//! without a network:
//!
//! ```ignore
//! let broker = LocalBroker::new();
//! broker.set_reachable(false);   // every call fails with a communication error
//! broker.fail_next(2);           // the next two calls fail, then recover
//! broker.reject_next(1);         // the next call is rejected by the "server"
//! assert_eq!(broker.calls(MethodName::Publish), 3);
//! ```

use super::{CallbackServer, MethodName, RemoteConnection, UpdateHandler};
use crate::qos::{
    ConnectQos, ConnectReturnQos, MessageUnit, SubscribeReturnQos, UpdateQos, STATUS_OK,
};
use crate::{Error, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Transport type served by this module.
pub const LOCAL_PROTOCOL: &str = "LOCAL";

// ============================================================================
// Broker
// ============================================================================

struct Session {
    login_name: String,
    public_id: u64,
    callback: Option<Arc<dyn UpdateHandler>>,
}

struct Subscription {
    secret_session_id: String,
    oid: String,
}

#[derive(Default)]
struct BrokerState {
    topics: BTreeMap<String, MessageUnit>,
    subscriptions: BTreeMap<String, Subscription>,
    sessions: HashMap<String, Session>,
    callbacks: HashMap<String, Arc<dyn UpdateHandler>>,
    next_id: u64,
}

impl BrokerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct FaultPlan {
    reachable: bool,
    fail_next: u32,
    reject_next: u32,
    calls: HashMap<MethodName, u64>,
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self {
            reachable: true,
            fail_next: 0,
            reject_next: 0,
            calls: HashMap::new(),
        }
    }
}

/// One pending callback, delivered after the broker lock is released.
struct Delivery {
    handler: Arc<dyn UpdateHandler>,
    session_id: String,
    key: String,
    content: Vec<u8>,
    qos: UpdateQos,
}

/// In-memory broker shared by local connections.
#[derive(Default)]
pub struct LocalBroker {
    state: Mutex<BrokerState>,
    faults: Mutex<FaultPlan>,
}

impl LocalBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // === Fault injection ===

    /// While unreachable every call fails with a communication error.
    pub fn set_reachable(&self, reachable: bool) {
        log::debug!("[local-broker] reachable={}", reachable);
        self.faults.lock().reachable = reachable;
    }

    pub fn is_reachable(&self) -> bool {
        self.faults.lock().reachable
    }

    /// Fail the next `n` calls with a communication error.
    pub fn fail_next(&self, n: u32) {
        self.faults.lock().fail_next = n;
    }

    /// Reject the next `n` calls with a remote (user) error.
    pub fn reject_next(&self, n: u32) {
        self.faults.lock().reject_next = n;
    }

    /// Calls received for `method`, failed ones included.
    pub fn calls(&self, method: MethodName) -> u64 {
        self.faults.lock().calls.get(&method).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        self.faults.lock().calls.clear();
    }

    // === Inspection ===

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Oids of retained topics.
    pub fn topics(&self) -> Vec<String> {
        self.state.lock().topics.keys().cloned().collect()
    }

    // ========================================================================
    // Request handling
    // ========================================================================

    fn check(&self, method: MethodName) -> Result<()> {
        let mut faults = self.faults.lock();
        *faults.calls.entry(method).or_insert(0) += 1;
        if !faults.reachable {
            return Err(Error::communication(format!("{}: LOCAL broker is not reachable", method)));
        }
        if faults.fail_next > 0 {
            faults.fail_next -= 1;
            return Err(Error::communication(format!("{}: injected transport failure", method)));
        }
        if faults.reject_next > 0 {
            faults.reject_next -= 1;
            return Err(Error::remote(
                "user.illegalArgument",
                format!("{}: request rejected", method),
            ));
        }
        Ok(())
    }

    fn register_callback(&self, login_name: &str, handler: Arc<dyn UpdateHandler>) -> String {
        let mut state = self.state.lock();
        let address = format!("local://{}/{}", login_name, state.next_id());
        state.callbacks.insert(address.clone(), handler);
        address
    }

    fn unregister_callback(&self, address: &str) {
        self.state.lock().callbacks.remove(address);
    }

    fn connect(&self, qos: &ConnectQos) -> Result<ConnectReturnQos> {
        self.check(MethodName::Connect)?;
        let mut state = self.state.lock();
        let callback = qos
            .callback_address()
            .and_then(|addr| state.callbacks.get(addr).cloned());

        let resumed = qos
            .session()
            .secret_session_id
            .as_ref()
            .filter(|id| state.sessions.contains_key(*id))
            .cloned();
        let secret = match resumed {
            Some(id) => {
                if let Some(session) = state.sessions.get_mut(&id) {
                    if callback.is_some() {
                        session.callback = callback;
                    }
                }
                id
            }
            None => {
                let public_id = state.next_id();
                let id = format!("sessionId:local-{}", public_id);
                state.sessions.insert(
                    id.clone(),
                    Session {
                        login_name: qos.session().login_name().to_string(),
                        public_id,
                        callback,
                    },
                );
                id
            }
        };

        let session = state
            .sessions
            .get(&secret)
            .ok_or_else(|| Error::internal("session vanished during connect"))?;
        let session_name = format!("/node/local/client/{}/{}", session.login_name, session.public_id);
        let xml = format!(
            "<qos><session name='{}' sessionId='{}'/></qos>",
            session_name, secret
        );
        Ok(ConnectReturnQos {
            session_name,
            secret_session_id: secret,
            xml,
        })
    }

    fn disconnect(&self, secret: &str) -> Result<bool> {
        self.check(MethodName::Disconnect)?;
        let mut state = self.state.lock();
        state.subscriptions.retain(|_, s| s.secret_session_id != secret);
        Ok(state.sessions.remove(secret).is_some())
    }

    fn ping(&self) -> Result<String> {
        self.check(MethodName::Ping)?;
        Ok(STATUS_OK.to_string())
    }

    fn subscribe(&self, secret: &str, key: &str) -> Result<SubscribeReturnQos> {
        self.check(MethodName::Subscribe)?;
        let oid = require_oid(key)?;
        let (subscription_id, retained) = {
            let mut state = self.state.lock();
            require_session(&state, secret)?;
            let subscription_id = format!("__subId:{}", state.next_id());
            state.subscriptions.insert(
                subscription_id.clone(),
                Subscription {
                    secret_session_id: secret.to_string(),
                    oid: oid.clone(),
                },
            );
            let retained = state
                .topics
                .get(&oid)
                .and_then(|msg| delivery_for(&state, &subscription_id, secret, msg, "OK"));
            (subscription_id, retained)
        };
        deliver(retained.into_iter().collect());
        let xml = format!("<qos><subscribe id='{}'/></qos>", subscription_id);
        Ok(SubscribeReturnQos {
            subscription_id,
            xml,
        })
    }

    fn unsubscribe(&self, secret: &str, key: &str) -> Result<Vec<String>> {
        self.check(MethodName::UnSubscribe)?;
        let target = require_oid(key)?;
        let mut state = self.state.lock();
        require_session(&state, secret)?;
        let removed: Vec<String> = state
            .subscriptions
            .iter()
            .filter(|(id, s)| s.secret_session_id == secret && (**id == target || s.oid == target))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &removed {
            state.subscriptions.remove(id);
        }
        Ok(removed
            .into_iter()
            .map(|id| format!("<qos><subscribe id='{}'/></qos>", id))
            .collect())
    }

    fn get(&self, secret: &str, key: &str) -> Result<Vec<MessageUnit>> {
        self.check(MethodName::Get)?;
        let oid = require_oid(key)?;
        let state = self.state.lock();
        require_session(&state, secret)?;
        Ok(state.topics.get(&oid).cloned().into_iter().collect())
    }

    fn publish(&self, method: MethodName, secret: &str, msgs: &[MessageUnit]) -> Result<Vec<String>> {
        self.check(method)?;
        let mut replies = Vec::with_capacity(msgs.len());
        let mut deliveries = Vec::new();
        {
            let mut state = self.state.lock();
            require_session(&state, secret)?;
            for msg in msgs {
                let oid = match parse_oid(&msg.key) {
                    Some(oid) => oid,
                    None => format!("local-{}", state.next_id()),
                };
                let stored = MessageUnit {
                    key: format!("<key oid='{}'/>", oid),
                    content: msg.content.clone(),
                    qos: msg.qos.clone(),
                };
                deliveries.extend(fan_out(&state, &oid, &stored, "OK"));
                state.topics.insert(oid.clone(), stored);
                replies.push(format!("<qos><state id='OK'/><key oid='{}'/></qos>", oid));
            }
        }
        deliver(deliveries);
        Ok(replies)
    }

    fn erase(&self, secret: &str, key: &str) -> Result<Vec<String>> {
        self.check(MethodName::Erase)?;
        let oid = require_oid(key)?;
        let deliveries;
        let erased = {
            let mut state = self.state.lock();
            require_session(&state, secret)?;
            match state.topics.remove(&oid) {
                Some(msg) => {
                    let notice = MessageUnit {
                        content: Vec::new(),
                        ..msg
                    };
                    deliveries = fan_out(&state, &oid, &notice, "ERASED");
                    vec![format!("<qos><key oid='{}'/></qos>", oid)]
                }
                None => {
                    deliveries = Vec::new();
                    Vec::new()
                }
            }
        };
        deliver(deliveries);
        Ok(erased)
    }
}

fn require_session(state: &BrokerState, secret: &str) -> Result<()> {
    if state.sessions.contains_key(secret) {
        Ok(())
    } else {
        Err(Error::remote("user.notConnected", "unknown or expired session"))
    }
}

fn fan_out(state: &BrokerState, oid: &str, msg: &MessageUnit, msg_state: &str) -> Vec<Delivery> {
    state
        .subscriptions
        .iter()
        .filter(|(_, s)| s.oid == oid)
        .filter_map(|(id, s)| delivery_for(state, id, &s.secret_session_id, msg, msg_state))
        .collect()
}

fn delivery_for(
    state: &BrokerState,
    subscription_id: &str,
    secret: &str,
    msg: &MessageUnit,
    msg_state: &str,
) -> Option<Delivery> {
    let handler = state.sessions.get(secret)?.callback.clone()?;
    Some(Delivery {
        handler,
        session_id: secret.to_string(),
        key: msg.key.clone(),
        content: msg.content.clone(),
        qos: UpdateQos {
            subscription_id: Some(subscription_id.to_string()),
            state: msg_state.to_string(),
            xml: format!(
                "<qos><state id='{}'/><subscribe id='{}'/></qos>",
                msg_state, subscription_id
            ),
        },
    })
}

fn deliver(deliveries: Vec<Delivery>) {
    for d in deliveries {
        if let Err(e) = d.handler.update(&d.session_id, &d.key, &d.content, &d.qos) {
            log::warn!("[local-broker] update for {} failed: {}", d.key, e);
        }
    }
}

/// Topic oid of a key: the `oid` attribute of an XML key, or the string
/// itself when it is not XML.
pub fn parse_oid(key: &str) -> Option<String> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    if !key.starts_with('<') {
        return Some(key.to_string());
    }
    let doc = roxmltree::Document::parse(key).ok()?;
    doc.root_element()
        .attribute("oid")
        .filter(|oid| !oid.is_empty())
        .map(str::to_string)
}

fn require_oid(key: &str) -> Result<String> {
    parse_oid(key).ok_or_else(|| {
        Error::remote(
            "user.query.invalid",
            format!("LOCAL broker only supports exact oid keys, got '{}'", key),
        )
    })
}

// ============================================================================
// Client side
// ============================================================================

/// Client connection to a [`LocalBroker`].
pub struct LocalConnection {
    broker: Arc<LocalBroker>,
    secret_session_id: Option<String>,
}

impl LocalConnection {
    pub fn new(broker: Arc<LocalBroker>) -> Self {
        Self {
            broker,
            secret_session_id: None,
        }
    }

    fn session(&self) -> &str {
        self.secret_session_id.as_deref().unwrap_or("")
    }
}

impl RemoteConnection for LocalConnection {
    fn protocol(&self) -> &str {
        LOCAL_PROTOCOL
    }

    fn connect(&mut self, qos: &ConnectQos) -> Result<ConnectReturnQos> {
        let ret = self.broker.connect(qos)?;
        self.secret_session_id = Some(ret.secret_session_id.clone());
        Ok(ret)
    }

    fn disconnect(&mut self, _qos: &str) -> Result<bool> {
        let ok = self.broker.disconnect(self.session())?;
        self.secret_session_id = None;
        Ok(ok)
    }

    fn ping(&mut self, _qos: &str) -> Result<String> {
        self.broker.ping()
    }

    fn subscribe(&mut self, key: &str, _qos: &str) -> Result<SubscribeReturnQos> {
        self.broker.subscribe(self.session(), key)
    }

    fn unsubscribe(&mut self, key: &str, _qos: &str) -> Result<Vec<String>> {
        self.broker.unsubscribe(self.session(), key)
    }

    fn get(&mut self, key: &str, _qos: &str) -> Result<Vec<MessageUnit>> {
        self.broker.get(self.session(), key)
    }

    fn publish(&mut self, msg: &MessageUnit) -> Result<String> {
        let mut replies = self
            .broker
            .publish(MethodName::Publish, self.session(), std::slice::from_ref(msg))?;
        replies
            .pop()
            .ok_or_else(|| Error::internal("publish produced no reply"))
    }

    fn publish_oneway(&mut self, msgs: &[MessageUnit]) -> Result<()> {
        self.broker
            .publish(MethodName::PublishOneway, self.session(), msgs)
            .map(|_| ())
    }

    fn publish_arr(&mut self, msgs: &[MessageUnit]) -> Result<Vec<String>> {
        self.broker.publish(MethodName::PublishArr, self.session(), msgs)
    }

    fn erase(&mut self, key: &str, _qos: &str) -> Result<Vec<String>> {
        self.broker.erase(self.session(), key)
    }

    fn shutdown(&mut self) {
        self.secret_session_id = None;
    }
}

/// One update queued for the callback thread.
struct Queued {
    session_id: String,
    key: String,
    content: Vec<u8>,
    qos: UpdateQos,
}

enum CallbackMsg {
    Update(Queued),
    Stop,
}

/// Handler the broker sees: queues the update and acknowledges at once.
struct QueueingHandler {
    tx: Sender<CallbackMsg>,
}

impl UpdateHandler for QueueingHandler {
    fn update(&self, session_id: &str, key: &str, content: &[u8], qos: &UpdateQos) -> Result<String> {
        self.tx
            .send(CallbackMsg::Update(Queued {
                session_id: session_id.to_string(),
                key: key.to_string(),
                content: content.to_vec(),
                qos: qos.clone(),
            }))
            .map_err(|_| Error::communication("callback server is shut down"))?;
        Ok(STATUS_OK.to_string())
    }
}

struct CallbackWorker {
    tx: Sender<CallbackMsg>,
    handle: JoinHandle<()>,
}

fn run_callback_worker(name: &str, rx: &Receiver<CallbackMsg>, handler: &dyn UpdateHandler) {
    log::debug!("[{}] started", name);
    for msg in rx {
        let CallbackMsg::Update(u) = msg else {
            break;
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            handler.update(&u.session_id, &u.key, &u.content, &u.qos)
        }));
        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => log::warn!("[{}] update for {} failed: {}", name, u.key, e),
            Err(_) => log::error!("[{}] update handler panicked on {}", name, u.key),
        }
    }
    log::debug!("[{}] stopped", name);
}

/// Callback endpoint registered with a [`LocalBroker`].
///
/// Updates run on a dedicated thread, never on the caller of the request
/// that triggered them, so a handler may call back into the client.
pub struct LocalCallbackServer {
    broker: Arc<LocalBroker>,
    address: Option<String>,
    worker: Option<CallbackWorker>,
}

impl LocalCallbackServer {
    pub fn new(broker: Arc<LocalBroker>) -> Self {
        Self {
            broker,
            address: None,
            worker: None,
        }
    }

    fn stop_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.tx.send(CallbackMsg::Stop);
        // a handler shutting down its own client cannot join itself
        if worker.handle.thread().id() == std::thread::current().id() {
            return;
        }
        if worker.handle.join().is_err() {
            log::error!("[local-callback] worker thread panicked");
        }
    }
}

impl CallbackServer for LocalCallbackServer {
    fn initialize(&mut self, login_name: &str, handler: Arc<dyn UpdateHandler>) -> Result<()> {
        self.shutdown()?;

        let (tx, rx) = unbounded();
        let name = format!("local-callback-{}", login_name);
        let worker_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_callback_worker(&worker_name, &rx, handler.as_ref()))
            .map_err(|e| Error::internal(format!("failed to spawn callback thread '{}': {}", name, e)))?;

        let queue = Arc::new(QueueingHandler { tx: tx.clone() });
        self.address = Some(self.broker.register_callback(login_name, queue));
        self.worker = Some(CallbackWorker { tx, handle });
        Ok(())
    }

    fn protocol(&self) -> &str {
        LOCAL_PROTOCOL
    }

    fn callback_address(&self) -> String {
        self.address.clone().unwrap_or_default()
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(addr) = self.address.take() {
            self.broker.unregister_callback(&addr);
        }
        self.stop_worker();
        Ok(())
    }
}

impl Drop for LocalCallbackServer {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::callback::ClosureUpdateHandler;
    use std::time::Duration;

    fn connected(broker: &Arc<LocalBroker>, login: &str) -> LocalConnection {
        let mut conn = LocalConnection::new(broker.clone());
        conn.connect(&ConnectQos::new(login)).unwrap();
        conn
    }

    fn with_callback(broker: &Arc<LocalBroker>, login: &str) -> (LocalConnection, LocalCallbackServer, Receiver<(String, UpdateQos)>) {
        let (tx, rx) = unbounded();
        let mut cb = LocalCallbackServer::new(broker.clone());
        cb.initialize(
            login,
            Arc::new(ClosureUpdateHandler::new(move |_s, _k, content, qos| {
                let _ = tx.send((String::from_utf8_lossy(content).into_owned(), qos.clone()));
                Ok(STATUS_OK.to_string())
            })),
        )
        .unwrap();
        let qos = ConnectQos::new(login).with_callback_address(cb.callback_address());
        let mut conn = LocalConnection::new(broker.clone());
        conn.connect(&qos).unwrap();
        (conn, cb, rx)
    }

    #[test]
    fn test_parse_oid() {
        assert_eq!(parse_oid("<key oid='Hello'/>").as_deref(), Some("Hello"));
        assert_eq!(parse_oid("  Hello ").as_deref(), Some("Hello"));
        assert_eq!(parse_oid("<key queryType='XPATH'>//key</key>"), None);
        assert_eq!(parse_oid("<key oid=''/>"), None);
        assert_eq!(parse_oid("<broken"), None);
        assert_eq!(parse_oid(""), None);
    }

    #[test]
    fn test_publish_get_erase() {
        let broker = LocalBroker::new();
        let mut conn = connected(&broker, "joe");
        conn.publish(&MessageUnit::new("<key oid='a'/>", "hi", "<qos/>"))
            .unwrap();
        let msgs = conn.get("<key oid='a'/>", "<qos/>").unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content_str(), "hi");
        assert_eq!(broker.topics(), vec!["a".to_string()]);

        assert_eq!(conn.erase("a", "<qos/>").unwrap().len(), 1);
        assert!(conn.get("a", "<qos/>").unwrap().is_empty());
    }

    #[test]
    fn test_subscribe_receives_updates() {
        let broker = LocalBroker::new();
        let (mut sub, _cb, rx) = with_callback(&broker, "sub");
        let mut publisher = connected(&broker, "pub");

        let ret = sub.subscribe("<key oid='news'/>", "<qos/>").unwrap();
        publisher
            .publish_arr(&[
                MessageUnit::new("news", "one", "<qos/>"),
                MessageUnit::new("other", "x", "<qos/>"),
            ])
            .unwrap();
        let (content, qos) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(content, "one");
        assert_eq!(qos.subscription_id.as_deref(), Some(ret.subscription_id.as_str()));
        assert!(rx.try_recv().is_err());

        publisher.erase("news", "<qos/>").unwrap();
        let (_, qos) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(qos.state, "ERASED");

        assert_eq!(sub.unsubscribe(&ret.subscription_id, "<qos/>").unwrap().len(), 1);
        assert_eq!(broker.subscription_count(), 0);
    }

    #[test]
    fn test_updates_run_on_callback_thread() {
        let broker = LocalBroker::new();
        let (tx, rx) = unbounded();
        let mut cb = LocalCallbackServer::new(broker.clone());
        cb.initialize(
            "sub",
            Arc::new(ClosureUpdateHandler::new(move |_s, _k, _c, _q| {
                let _ = tx.send(std::thread::current().name().map(str::to_string));
                Ok(STATUS_OK.to_string())
            })),
        )
        .unwrap();
        let mut sub = LocalConnection::new(broker.clone());
        sub.connect(&ConnectQos::new("sub").with_callback_address(cb.callback_address()))
            .unwrap();
        sub.subscribe("t", "<qos/>").unwrap();

        sub.publish(&MessageUnit::new("t", "x", "<qos/>")).unwrap();
        let thread = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(thread.as_deref(), Some("local-callback-sub"));

        cb.shutdown().unwrap();
        assert_eq!(cb.callback_address(), "");
        sub.publish(&MessageUnit::new("t", "y", "<qos/>")).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_retained_message_on_subscribe() {
        let broker = LocalBroker::new();
        let mut publisher = connected(&broker, "pub");
        publisher.publish(&MessageUnit::new("t", "kept", "<qos/>")).unwrap();
        let (mut sub, _cb, rx) = with_callback(&broker, "sub");
        sub.subscribe("t", "<qos/>").unwrap();
        let (content, _) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(content, "kept");
    }

    #[test]
    fn test_fault_injection() {
        let broker = LocalBroker::new();
        let mut conn = connected(&broker, "joe");

        broker.fail_next(2);
        assert!(conn.ping("<qos/>").unwrap_err().is_communication());
        assert!(conn.ping("<qos/>").unwrap_err().is_communication());
        assert!(conn.ping("<qos/>").is_ok());
        assert_eq!(broker.calls(MethodName::Ping), 3);

        broker.reject_next(1);
        let err = conn.publish(&MessageUnit::new("a", "x", "")).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::User);

        broker.set_reachable(false);
        assert!(conn.get("a", "").unwrap_err().is_communication());
        broker.set_reachable(true);
        assert!(conn.get("a", "").is_ok());
    }

    #[test]
    fn test_reconnect_resumes_session() {
        let broker = LocalBroker::new();
        let mut conn = LocalConnection::new(broker.clone());
        let first = conn.connect(&ConnectQos::new("joe")).unwrap();
        let again = conn
            .connect(&ConnectQos::new("joe").with_secret_session_id(first.secret_session_id.clone()))
            .unwrap();
        assert_eq!(first.secret_session_id, again.secret_session_id);
        assert_eq!(broker.session_count(), 1);

        assert!(conn.disconnect("<qos/>").unwrap());
        assert_eq!(broker.session_count(), 0);
        let err = conn.get("a", "").unwrap_err();
        assert_eq!(err.error_code(), "user.notConnected");
    }

    #[test]
    fn test_xpath_query_rejected() {
        let broker = LocalBroker::new();
        let mut conn = connected(&broker, "joe");
        let err = conn
            .subscribe("<key queryType='XPATH'>//key</key>", "<qos/>")
            .unwrap_err();
        assert_eq!(err.error_code(), "user.query.invalid");
    }
}
