// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fail-safe connection state machine.
//!
//! [`ConnectionsHandler`] owns one [`RemoteConnection`] and hides transient
//! outages from the application:
//!
//! - Foreground calls (`publish`, `subscribe`, ...) are retried in the
//!   calling thread, `retries + 1` attempts at most, sleeping `delay`
//!   between attempts with the lock released. Exhaustion kills the
//!   connection (ALIVE -> DEAD, POLLING is not visited).
//! - A ping runs every `pingInterval` on the shared [`Timeout`] worker.
//!   A failed ping moves ALIVE -> POLLING and starts reconnect attempts
//!   every `delay`; a successful one moves back to ALIVE, `retries`
//!   consecutive failures move to DEAD.
//!
//! One mutex guards the state, the transport and the pending timer. Each
//! timer registration carries a generation number; a callback whose
//! generation no longer matches the pending one is stale and does nothing.
//! Listener notifications are sent after the mutex is released.

use super::listener::{ConnectionEvent, ConnectionProblemsListener};
use super::state::ConnectionState;
use crate::protocol::{MethodName, RemoteConnection, TransportRegistry};
use crate::qos::{Address, ConnectQos, ConnectReturnQos, MessageUnit, SubscribeReturnQos, EMPTY_QOS};
use crate::timer::{TimerKey, Timeout};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

// ============================================================================
// Timer bookkeeping
// ============================================================================

/// What a scheduled timer is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerKind {
    Ping,
    Reconnect,
}

#[derive(Clone, Copy, Debug)]
struct PendingTimer {
    key: TimerKey,
    generation: u64,
    kind: TimerKind,
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters of a [`ConnectionsHandler`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandlerStats {
    /// Foreground remote calls attempted (retries included)
    pub calls: u64,
    /// Foreground attempts that failed with a communication error
    pub failed_calls: u64,
    /// Background liveness pings sent
    pub pings: u64,
    /// Pings that failed
    pub failed_pings: u64,
    /// Background reconnect attempts
    pub reconnect_attempts: u64,
    /// Successful reconnects
    pub reconnects: u64,
}

#[derive(Default)]
struct AtomicStats {
    calls: AtomicU64,
    failed_calls: AtomicU64,
    pings: AtomicU64,
    failed_pings: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnects: AtomicU64,
}

impl AtomicStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HandlerStats {
        HandlerStats {
            calls: self.calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            pings: self.pings.load(Ordering::Relaxed),
            failed_pings: self.failed_pings.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Shared state
// ============================================================================

struct Core {
    state: ConnectionState,
    connect_qos: Option<ConnectQos>,
    connect_return: Option<ConnectReturnQos>,
    connection: Option<Box<dyn RemoteConnection>>,
    retry_counter: u32,
    pending: Option<PendingTimer>,
    next_generation: u64,
}

impl Core {
    fn address(&self) -> Address {
        self.connect_qos
            .as_ref()
            .map(|q| q.address().clone())
            .unwrap_or_default()
    }

    /// Fail with the error matching the current state unless ALIVE.
    fn check_operational(&self, method: MethodName) -> Result<()> {
        match self.state {
            ConnectionState::Alive => Ok(()),
            ConnectionState::Start => Err(Error::NoConnection { method }),
            ConnectionState::Polling => Err(Error::NoConnectionPolling { method }),
            ConnectionState::Dead => Err(Error::NoConnectionDead { method, cause: None }),
        }
    }

    fn connection(&mut self) -> Result<&mut (dyn RemoteConnection + 'static)> {
        self.connection
            .as_deref_mut()
            .ok_or_else(|| Error::internal("no transport instantiated"))
    }

    fn shutdown_transport(&mut self) {
        if let Some(conn) = self.connection.as_mut() {
            conn.shutdown();
        }
    }
}

struct Inner {
    name: String,
    timer: Arc<Timeout>,
    registry: Arc<TransportRegistry>,
    core: Mutex<Core>,
    listener: Mutex<Option<Weak<dyn ConnectionProblemsListener>>>,
    stats: AtomicStats,
}

impl Inner {
    fn set_state(&self, core: &mut Core, next: ConnectionState) {
        if !core.state.can_transition_to(next) {
            debug_assert!(false, "illegal transition {} -> {}", core.state, next);
            log::error!("[{}] refusing illegal transition {} -> {}", self.name, core.state, next);
            return;
        }
        log::info!("[{}] {} -> {}", self.name, core.state, next);
        core.state = next;
    }

    fn cancel_timer(&self, core: &mut Core) {
        if let Some(pending) = core.pending.take() {
            self.timer.remove_timeout_listener(pending.key);
        }
    }

    /// Replace the pending timer. The callback holds only a weak reference.
    fn schedule(self: &Arc<Self>, core: &mut Core, kind: TimerKind, delay: Duration) {
        self.cancel_timer(core);
        core.next_generation += 1;
        let generation = core.next_generation;
        let weak = Arc::downgrade(self);
        let key = self.timer.add_timeout_listener(delay, move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_timeout(generation, kind);
            }
        });
        log::debug!("[{}] {:?} scheduled in {:?}", self.name, kind, delay);
        core.pending = Some(PendingTimer {
            key,
            generation,
            kind,
        });
    }

    fn schedule_ping(self: &Arc<Self>, core: &mut Core) {
        if let Some(interval) = core.address().ping_interval() {
            self.schedule(core, TimerKind::Ping, interval);
        }
    }

    fn notify(&self, events: &[ConnectionEvent]) {
        if events.is_empty() {
            return;
        }
        let listener = self.listener.lock().as_ref().and_then(Weak::upgrade);
        for event in events {
            log::debug!("[{}] notifying {:?}", self.name, event);
            if let Some(l) = &listener {
                event.notify(l.as_ref());
            }
        }
    }

    // ========================================================================
    // Timer driven transitions
    // ========================================================================

    fn on_timeout(self: &Arc<Self>, generation: u64, kind: TimerKind) {
        let events = {
            let mut core = self.core.lock();
            match core.pending {
                Some(p) if p.generation == generation => core.pending = None,
                _ => {
                    log::debug!("[{}] ignoring stale {:?} timer", self.name, kind);
                    return;
                }
            }
            match core.state {
                ConnectionState::Alive => self.ping_tick(&mut core),
                ConnectionState::Polling => self.reconnect_tick(&mut core),
                ConnectionState::Start | ConnectionState::Dead => Vec::new(),
            }
        };
        self.notify(&events);
    }

    fn ping_tick(self: &Arc<Self>, core: &mut Core) -> Vec<ConnectionEvent> {
        AtomicStats::bump(&self.stats.pings);
        let result = core.connection().and_then(|c| c.ping(EMPTY_QOS));
        let reason = match result {
            Ok(_) => {
                log::debug!("[{}] ping ok", self.name);
                self.schedule_ping(core);
                return Vec::new();
            }
            Err(e) => e,
        };
        AtomicStats::bump(&self.stats.failed_pings);

        let address = core.address();
        if !address.is_failsafe() {
            log::info!(
                "[{}] ping failed and delay is 0, giving up (set a positive delay for fail-safe mode): {}",
                self.name,
                reason
            );
            core.shutdown_transport();
            self.set_state(core, ConnectionState::Dead);
            return vec![ConnectionEvent::LostConnection];
        }

        log::warn!("[{}] ping failed, polling for the server: {}", self.name, reason);
        if let Ok(conn) = core.connection() {
            if let Err(e) = conn.disconnect(EMPTY_QOS) {
                log::debug!("[{}] best-effort disconnect failed: {}", self.name, e);
            }
            conn.shutdown();
        }
        self.set_state(core, ConnectionState::Polling);
        core.retry_counter = 0;
        self.schedule(core, TimerKind::Reconnect, address.delay());
        vec![ConnectionEvent::GoingToPoll]
    }

    fn reconnect_tick(self: &Arc<Self>, core: &mut Core) -> Vec<ConnectionEvent> {
        AtomicStats::bump(&self.stats.reconnect_attempts);
        let Some(qos) = core.connect_qos.clone() else {
            log::error!("[{}] polling without connect QoS", self.name);
            return Vec::new();
        };
        let result = core.connection().and_then(|c| c.connect(&qos));
        match result {
            Ok(ret) => {
                AtomicStats::bump(&self.stats.reconnects);
                let old_id = qos.session().secret_session_id.as_deref().unwrap_or("");
                if !ret.secret_session_id.is_empty() && ret.secret_session_id != old_id {
                    log::debug!(
                        "[{}] session id changed on reconnect ('{}' -> '{}')",
                        self.name,
                        old_id,
                        ret.secret_session_id
                    );
                }
                log::info!(
                    "[{}] reconnected as '{}' after {} failed attempts",
                    self.name,
                    ret.session_name,
                    core.retry_counter
                );
                core.connect_qos = Some(renew_session(&qos, &ret));
                core.connect_return = Some(ret);
                core.retry_counter = 0;
                self.set_state(core, ConnectionState::Alive);
                self.schedule_ping(core);
                vec![ConnectionEvent::ReConnected]
            }
            Err(e) => {
                core.retry_counter += 1;
                let retries = qos.address().retries();
                if retries < 0 || core.retry_counter < retries as u32 {
                    log::debug!(
                        "[{}] reconnect attempt {} failed: {}",
                        self.name,
                        core.retry_counter,
                        e
                    );
                    self.schedule(core, TimerKind::Reconnect, qos.address().delay());
                    Vec::new()
                } else {
                    log::error!(
                        "[{}] giving up after {} reconnect attempts: {}",
                        self.name,
                        core.retry_counter,
                        e
                    );
                    core.shutdown_transport();
                    self.set_state(core, ConnectionState::Dead);
                    vec![ConnectionEvent::LostConnection]
                }
            }
        }
    }
}

/// Keep the server-assigned session id for the next connect.
fn renew_session(qos: &ConnectQos, ret: &ConnectReturnQos) -> ConnectQos {
    if ret.secret_session_id.is_empty() {
        qos.clone()
    } else {
        qos.with_secret_session_id(ret.secret_session_id.clone())
    }
}

// ============================================================================
// Public handle
// ============================================================================

/// Fail-safe connection to one server. See the module docs.
///
/// Dropping the handler cancels its timer and releases the transport.
pub struct ConnectionsHandler {
    inner: Arc<Inner>,
}

impl ConnectionsHandler {
    /// Create a handler in state START. Transports are looked up in
    /// `registry` at `connect()`; pings run on `timer`.
    pub fn new(name: impl Into<String>, timer: Arc<Timeout>, registry: Arc<TransportRegistry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                timer,
                registry,
                core: Mutex::new(Core {
                    state: ConnectionState::Start,
                    connect_qos: None,
                    connect_return: None,
                    connection: None,
                    retry_counter: 0,
                    pending: None,
                    next_generation: 0,
                }),
                listener: Mutex::new(None),
                stats: AtomicStats::default(),
            }),
        }
    }

    /// Instance name used in log messages.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register the listener for fail-over events. Only a weak reference is
    /// kept; a dropped listener is silently skipped.
    pub fn init_failsafe<L>(&self, listener: &Arc<L>)
    where
        L: ConnectionProblemsListener + 'static,
    {
        let listener: Arc<dyn ConnectionProblemsListener> = listener.clone();
        self.set_listener(Arc::downgrade(&listener));
    }

    /// Register an already-downgraded listener.
    pub fn set_listener(&self, listener: Weak<dyn ConnectionProblemsListener>) {
        *self.inner.listener.lock() = Some(listener);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Log in.
    ///
    /// On success the state is ALIVE and the first ping is scheduled (unless
    /// pinging is disabled). On failure the transport's error is returned
    /// unchanged and the state stays START. Calling again while ALIVE returns
    /// the previous acknowledgement.
    pub fn connect(&self, qos: ConnectQos) -> Result<ConnectReturnQos> {
        let mut core = self.inner.core.lock();
        match core.state {
            ConnectionState::Start => {}
            ConnectionState::Alive => {
                log::warn!("[{}] connect() called while already connected, ignoring", self.inner.name);
                return core
                    .connect_return
                    .clone()
                    .ok_or_else(|| Error::internal("connected without connect return QoS"));
            }
            ConnectionState::Polling => {
                return Err(Error::NoConnectionPolling {
                    method: MethodName::Connect,
                })
            }
            ConnectionState::Dead => {
                return Err(Error::NoConnectionDead {
                    method: MethodName::Connect,
                    cause: None,
                })
            }
        }

        let address = qos.address().clone();
        if core.connection.is_none() {
            let conn = self
                .inner
                .registry
                .create_connection(address.protocol(), address.version())?;
            log::debug!(
                "[{}] using {} transport version {}",
                self.inner.name,
                conn.protocol(),
                address.version()
            );
            core.connection = Some(conn);
        }
        log::debug!(
            "[{}] connecting, retries={} delay={}ms pingInterval={}ms",
            self.inner.name,
            address.retries(),
            address.delay_ms(),
            address.ping_interval_ms()
        );

        let ret = core.connection()?.connect(&qos)?;

        core.connect_qos = Some(renew_session(&qos, &ret));
        core.connect_return = Some(ret.clone());
        core.retry_counter = 0;
        self.inner.set_state(&mut core, ConnectionState::Alive);
        self.inner.schedule_ping(&mut core);
        Ok(ret)
    }

    /// Log out and move to DEAD.
    ///
    /// Returns `Ok(false)` if already DEAD. Failed attempts are retried like
    /// any foreground call; when retries are exhausted the state is DEAD all
    /// the same and [`Error::NoConnectionDead`] is returned.
    pub fn disconnect(&self, qos: &str) -> Result<bool> {
        let method = MethodName::Disconnect;
        let mut failures: u32 = 0;
        loop {
            let (result, address) = {
                let mut core = self.inner.core.lock();
                match core.state {
                    ConnectionState::Start => return Err(Error::NoConnection { method }),
                    ConnectionState::Polling => return Err(Error::NoConnectionPolling { method }),
                    ConnectionState::Dead => {
                        log::warn!("[{}] disconnect() called on a dead connection", self.inner.name);
                        return Ok(false);
                    }
                    ConnectionState::Alive => {}
                }
                self.inner.cancel_timer(&mut core);
                let address = core.address();
                let result = core.connection().and_then(|c| c.disconnect(qos));
                if result.is_ok() || !address.allows_retry(failures + 1) {
                    core.shutdown_transport();
                    self.inner.set_state(&mut core, ConnectionState::Dead);
                }
                (result, address)
            };

            match result {
                Ok(_) => return Ok(true),
                Err(e) => {
                    failures += 1;
                    if !address.allows_retry(failures) {
                        log::error!(
                            "[{}] disconnect failed after {} attempts: {}",
                            self.inner.name,
                            failures,
                            e
                        );
                        return Err(Error::NoConnectionDead {
                            method,
                            cause: Some(Box::new(e)),
                        });
                    }
                    log::warn!(
                        "[{}] disconnect attempt {} failed, retrying in {:?}: {}",
                        self.inner.name,
                        failures,
                        address.delay(),
                        e
                    );
                    std::thread::sleep(address.delay());
                }
            }
        }
    }

    /// Cancel the timer, release the transport and move to DEAD without
    /// talking to the server. A handler that never connected stays in START.
    pub fn shutdown(&self) {
        let mut core = self.inner.core.lock();
        self.inner.cancel_timer(&mut core);
        core.shutdown_transport();
        if matches!(core.state, ConnectionState::Alive | ConnectionState::Polling) {
            self.inner.set_state(&mut core, ConnectionState::Dead);
        }
    }

    // ========================================================================
    // Foreground calls
    // ========================================================================

    /// Run `call` with the retry policy of the current connect QoS.
    fn dispatch<T>(
        &self,
        method: MethodName,
        mut call: impl FnMut(&mut dyn RemoteConnection) -> Result<T>,
    ) -> Result<T> {
        let mut failures: u32 = 0;
        loop {
            let (result, address) = {
                let mut core = self.inner.core.lock();
                core.check_operational(method)?;
                AtomicStats::bump(&self.inner.stats.calls);
                let address = core.address();
                (call(core.connection()?), address)
            };

            let error = match result {
                Ok(value) => {
                    if failures > 0 {
                        log::info!(
                            "[{}] {} succeeded after {} failed attempts",
                            self.inner.name,
                            method,
                            failures
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_communication() => return Err(e),
                Err(e) => e,
            };

            AtomicStats::bump(&self.inner.stats.failed_calls);
            failures += 1;
            if !address.allows_retry(failures) {
                let mut core = self.inner.core.lock();
                if core.state == ConnectionState::Alive {
                    log::error!(
                        "[{}] {} failed {} times, connection is dead: {}",
                        self.inner.name,
                        method,
                        failures,
                        error
                    );
                    self.inner.cancel_timer(&mut core);
                    self.inner.set_state(&mut core, ConnectionState::Dead);
                }
                return Err(Error::NoConnectionDead {
                    method,
                    cause: Some(Box::new(error)),
                });
            }

            log::warn!(
                "[{}] {} attempt {} failed, retrying in {:?}: {}",
                self.inner.name,
                method,
                failures,
                address.delay(),
                error
            );
            std::thread::sleep(address.delay());
        }
    }

    pub fn subscribe(&self, key: &str, qos: &str) -> Result<SubscribeReturnQos> {
        self.dispatch(MethodName::Subscribe, |c| c.subscribe(key, qos))
    }

    pub fn unsubscribe(&self, key: &str, qos: &str) -> Result<Vec<String>> {
        self.dispatch(MethodName::UnSubscribe, |c| c.unsubscribe(key, qos))
    }

    pub fn get(&self, key: &str, qos: &str) -> Result<Vec<MessageUnit>> {
        self.dispatch(MethodName::Get, |c| c.get(key, qos))
    }

    pub fn publish(&self, msg: &MessageUnit) -> Result<String> {
        self.dispatch(MethodName::Publish, |c| c.publish(msg))
    }

    pub fn publish_oneway(&self, msgs: &[MessageUnit]) -> Result<()> {
        self.dispatch(MethodName::PublishOneway, |c| c.publish_oneway(msgs))
    }

    pub fn publish_arr(&self, msgs: &[MessageUnit]) -> Result<Vec<String>> {
        self.dispatch(MethodName::PublishArr, |c| c.publish_arr(msgs))
    }

    pub fn erase(&self, key: &str, qos: &str) -> Result<Vec<String>> {
        self.dispatch(MethodName::Erase, |c| c.erase(key, qos))
    }

    /// Single ping attempt, no retry.
    pub fn ping(&self, qos: &str) -> Result<String> {
        let mut core = self.inner.core.lock();
        core.check_operational(MethodName::Ping)?;
        core.connection()?.ping(qos)
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn state(&self) -> ConnectionState {
        self.inner.core.lock().state
    }

    /// ALIVE or POLLING.
    pub fn is_connected(&self) -> bool {
        matches!(self.state(), ConnectionState::Alive | ConnectionState::Polling)
    }

    pub fn is_alive(&self) -> bool {
        self.state() == ConnectionState::Alive
    }

    pub fn is_polling(&self) -> bool {
        self.state() == ConnectionState::Polling
    }

    pub fn is_dead(&self) -> bool {
        self.state() == ConnectionState::Dead
    }

    /// `START`, `ALIVE`, `POLLING` or `DEAD`.
    pub fn status_string(&self) -> &'static str {
        self.state().as_str()
    }

    /// Failed reconnect attempts since entering POLLING.
    pub fn retry_counter(&self) -> u32 {
        self.inner.core.lock().retry_counter
    }

    /// True while a ping or reconnect is scheduled.
    pub fn has_pending_timer(&self) -> bool {
        self.inner.core.lock().pending.is_some()
    }

    /// Connect QoS in use, including the session id assigned by the server.
    pub fn connect_qos(&self) -> Option<ConnectQos> {
        self.inner.core.lock().connect_qos.clone()
    }

    pub fn connect_return_qos(&self) -> Option<ConnectReturnQos> {
        self.inner.core.lock().connect_return.clone()
    }

    pub fn stats(&self) -> HandlerStats {
        self.inner.stats.snapshot()
    }
}

impl Drop for ConnectionsHandler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ConnectionsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("ConnectionsHandler")
            .field("name", &self.inner.name)
            .field("state", &core.state)
            .field("retry_counter", &core.retry_counter)
            .field("pending", &core.pending.map(|p| p.kind))
            .finish()
    }
}

#[cfg(all(test, feature = "local"))]
mod tests {
    use super::*;
    use crate::dispatch::listener::ClosureProblemsListener;
    use crate::protocol::LocalBroker;
    use std::time::Instant;

    struct Fixture {
        broker: Arc<LocalBroker>,
        handler: ConnectionsHandler,
        events: Arc<Mutex<Vec<ConnectionEvent>>>,
        _listener: Arc<dyn ConnectionProblemsListener>,
    }

    fn fixture() -> Fixture {
        let broker = LocalBroker::new();
        let registry = Arc::new(TransportRegistry::new());
        registry.register_local(&broker);
        let timer = Arc::new(Timeout::new("handler-test-timer").unwrap());
        let handler = ConnectionsHandler::new("test", timer, registry);

        let events = Arc::new(Mutex::new(Vec::new()));
        let e = events.clone();
        let listener = Arc::new(ClosureProblemsListener::new(move |ev| e.lock().push(ev)));
        handler.init_failsafe(&listener);
        Fixture {
            broker,
            handler,
            events,
            _listener: listener,
        }
    }

    fn qos(retries: i32, delay_ms: i64, ping_ms: i64) -> ConnectQos {
        ConnectQos::builder("tester")
            .address(
                Address::new("LOCAL", "1.0")
                    .with_retries(retries)
                    .with_delay_ms(delay_ms)
                    .with_ping_interval_ms(ping_ms),
            )
            .build()
    }

    fn wait_for(what: &str, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    type Call = Box<dyn Fn(&ConnectionsHandler) -> Result<()>>;

    fn boxed(f: impl Fn(&ConnectionsHandler) -> Result<()> + 'static) -> Call {
        Box::new(f)
    }

    /// Every retried request, with the method name the transport counts it under.
    fn foreground_calls() -> Vec<(MethodName, Call)> {
        let msg = || MessageUnit::new("<key oid='a'/>", "x", "");
        vec![
            (MethodName::Publish, boxed(move |h| h.publish(&msg()).map(drop))),
            (MethodName::PublishOneway, boxed(move |h| h.publish_oneway(&[msg()]))),
            (MethodName::PublishArr, boxed(move |h| h.publish_arr(&[msg(), msg()]).map(drop))),
            (MethodName::Subscribe, boxed(|h| h.subscribe("a", EMPTY_QOS).map(drop))),
            (MethodName::UnSubscribe, boxed(|h| h.unsubscribe("__subId:1", EMPTY_QOS).map(drop))),
            (MethodName::Get, boxed(|h| h.get("a", EMPTY_QOS).map(drop))),
            (MethodName::Erase, boxed(|h| h.erase("a", EMPTY_QOS).map(drop))),
        ]
    }

    #[test]
    fn test_calls_before_connect_fail_fast() {
        let f = fixture();
        let err = f.handler.publish(&MessageUnit::new("a", "x", "")).unwrap_err();
        assert!(matches!(err, Error::NoConnection { method: MethodName::Publish }));
        assert!(matches!(
            f.handler.disconnect(EMPTY_QOS).unwrap_err(),
            Error::NoConnection { .. }
        ));
        assert_eq!(f.broker.calls(MethodName::Publish), 0);
        assert_eq!(f.handler.status_string(), "START");
    }

    #[test]
    fn test_connect_failure_stays_in_start() {
        let f = fixture();
        f.broker.set_reachable(false);
        let err = f.handler.connect(qos(3, 10, 20)).unwrap_err();
        assert!(matches!(err, Error::Communication(_)));
        assert_eq!(f.handler.state(), ConnectionState::Start);
        assert!(!f.handler.has_pending_timer());
        assert!(f.handler.connect_qos().is_none());
        assert!(f.handler.connect_return_qos().is_none());

        f.broker.set_reachable(true);
        f.handler.connect(qos(3, 10, 0)).unwrap();
        assert!(f.handler.is_alive());
    }

    #[test]
    fn test_unknown_transport() {
        let f = fixture();
        let qos = ConnectQos::builder("x").address(Address::new("SOCKET", "1.0")).build();
        let err = f.handler.connect(qos).unwrap_err();
        assert_eq!(err.error_code(), "resource.configuration");
        assert_eq!(f.handler.state(), ConnectionState::Start);
    }

    #[test]
    fn test_connect_schedules_ping_unless_disabled() {
        let f = fixture();
        f.handler.connect(qos(0, 10, 0)).unwrap();
        assert!(!f.handler.has_pending_timer());

        let g = fixture();
        g.handler.connect(qos(0, 10, 5_000)).unwrap();
        assert!(g.handler.has_pending_timer());
    }

    #[test]
    fn test_second_connect_returns_stored_ack() {
        let f = fixture();
        let first = f.handler.connect(qos(0, 10, 0)).unwrap();
        let second = f.handler.connect(qos(0, 10, 0)).unwrap();
        assert_eq!(first, second);
        assert_eq!(f.broker.calls(MethodName::Connect), 1);
        let stored = f.handler.connect_qos().unwrap();
        assert_eq!(
            stored.session().secret_session_id.as_deref(),
            Some(first.secret_session_id.as_str())
        );
    }

    #[test]
    fn test_retry_bound() {
        for (method, call) in foreground_calls() {
            for n in [0, 1, 3] {
                let f = fixture();
                f.handler.connect(qos(n, 1, 0)).unwrap();
                assert!(f.handler.is_alive());
                f.broker.set_reachable(false);

                let err = call(&f.handler).unwrap_err();
                assert!(
                    matches!(err, Error::NoConnectionDead { method: m, cause: Some(_) } if m == method),
                    "{}: {}",
                    method,
                    err
                );
                assert_eq!(f.broker.calls(method), n as u64 + 1, "{} with retries={}", method, n);
                assert!(f.handler.is_dead(), "{}", method);
                assert!(!f.handler.has_pending_timer());
                assert!(f.events.lock().is_empty(), "foreground exhaustion notifies nobody");
            }
        }
    }

    #[test]
    fn test_infinite_retry() {
        let f = fixture();
        f.handler.connect(qos(-1, 1, 0)).unwrap();
        f.handler.publish(&MessageUnit::new("a", "payload", "")).unwrap();
        f.broker.reset_calls();

        f.broker.fail_next(5);
        let msgs = f.handler.get("a", EMPTY_QOS).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(f.broker.calls(MethodName::Get), 6);
        assert!(f.handler.is_alive());
        assert_eq!(f.handler.retry_counter(), 0);
        assert_eq!(f.handler.stats().failed_calls, 5);
    }

    #[test]
    fn test_remote_error_not_retried() {
        let f = fixture();
        f.handler.connect(qos(5, 1, 0)).unwrap();
        f.broker.reject_next(1);
        let err = f.handler.erase("a", EMPTY_QOS).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::User);
        assert_eq!(f.broker.calls(MethodName::Erase), 1);
        assert!(f.handler.is_alive());
    }

    #[test]
    fn test_end_to_end_retry_latency() {
        let f = fixture();
        f.handler.connect(qos(3, 10, 1_000)).unwrap();
        f.broker.fail_next(2);
        let start = Instant::now();
        f.handler.publish(&MessageUnit::new("a", "x", "")).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(f.broker.calls(MethodName::Publish), 3);
        assert!(f.handler.is_alive());
    }

    #[test]
    fn test_ping_failover_and_reconnect() {
        let f = fixture();
        f.handler.connect(qos(-1, 5, 20)).unwrap();
        f.broker.set_reachable(false);

        wait_for("POLLING", || f.handler.is_polling());
        assert!(f.handler.is_connected());
        wait_for("reconnect attempts", || f.handler.retry_counter() >= 2);
        assert_eq!(*f.events.lock(), vec![ConnectionEvent::GoingToPoll]);

        f.broker.set_reachable(true);
        wait_for("ALIVE", || f.handler.is_alive());
        assert_eq!(f.handler.retry_counter(), 0);
        wait_for("reConnected", || f.events.lock().len() == 2);
        assert_eq!(
            *f.events.lock(),
            vec![ConnectionEvent::GoingToPoll, ConnectionEvent::ReConnected]
        );
        assert!(f.handler.has_pending_timer());
        assert!(f.handler.stats().reconnects >= 1);
    }

    #[test]
    fn test_reconnect_exhaustion() {
        let f = fixture();
        f.handler.connect(qos(2, 5, 20)).unwrap();
        f.broker.set_reachable(false);

        wait_for("DEAD", || f.handler.is_dead());
        // initial connect + 2 failed reconnects
        assert_eq!(f.broker.calls(MethodName::Connect), 3);
        assert_eq!(f.handler.retry_counter(), 2);
        assert!(!f.handler.has_pending_timer());
        wait_for("lostConnection", || f.events.lock().len() == 2);
        assert_eq!(
            *f.events.lock(),
            vec![ConnectionEvent::GoingToPoll, ConnectionEvent::LostConnection]
        );

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(f.broker.calls(MethodName::Connect), 3);
        assert!(f.handler.is_dead());
    }

    #[test]
    fn test_fail_fast_while_polling() {
        let f = fixture();
        f.handler.connect(qos(-1, 60_000, 10)).unwrap();
        f.broker.set_reachable(false);
        wait_for("POLLING", || f.handler.is_polling());
        f.broker.reset_calls();

        let mut calls = foreground_calls();
        calls.push((MethodName::Ping, boxed(|h| h.ping(EMPTY_QOS).map(drop))));
        calls.push((MethodName::Disconnect, boxed(|h| h.disconnect(EMPTY_QOS).map(drop))));
        for (method, call) in calls {
            let err = call(&f.handler).unwrap_err();
            assert!(
                matches!(err, Error::NoConnectionPolling { method: m } if m == method),
                "{}: {}",
                method,
                err
            );
        }
        for m in MethodName::ALL {
            assert_eq!(f.broker.calls(m), 0, "{} reached the transport", m);
        }
        assert!(f.handler.is_polling());
    }

    #[test]
    fn test_not_failsafe_goes_dead_on_ping_failure() {
        let f = fixture();
        f.handler.connect(qos(-1, 0, 10)).unwrap();
        f.broker.set_reachable(false);
        wait_for("DEAD", || f.handler.is_dead());
        wait_for("lostConnection", || !f.events.lock().is_empty());
        assert_eq!(*f.events.lock(), vec![ConnectionEvent::LostConnection]);
    }

    #[test]
    fn test_disconnect_idempotence() {
        let f = fixture();
        f.handler.connect(qos(1, 1, 5_000)).unwrap();
        assert!(f.handler.disconnect(EMPTY_QOS).unwrap());
        assert!(f.handler.is_dead());
        assert!(!f.handler.has_pending_timer());
        assert!(!f.handler.disconnect(EMPTY_QOS).unwrap());

        let err = f.handler.get("a", EMPTY_QOS).unwrap_err();
        assert!(matches!(err, Error::NoConnectionDead { cause: None, .. }));
        assert!(f.handler.connect(qos(1, 1, 0)).is_err());
        assert_eq!(f.broker.session_count(), 0);
    }

    #[test]
    fn test_disconnect_exhaustion_still_dead() {
        let f = fixture();
        f.handler.connect(qos(2, 1, 0)).unwrap();
        f.broker.set_reachable(false);
        let err = f.handler.disconnect(EMPTY_QOS).unwrap_err();
        assert!(matches!(err, Error::NoConnectionDead { method: MethodName::Disconnect, .. }));
        assert_eq!(f.broker.calls(MethodName::Disconnect), 3);
        assert!(f.handler.is_dead());
    }

    #[test]
    fn test_shutdown_cancels_timer() {
        let f = fixture();
        f.handler.connect(qos(-1, 5, 10)).unwrap();
        f.handler.shutdown();
        assert!(f.handler.is_dead());
        assert!(!f.handler.has_pending_timer());
        f.broker.reset_calls();
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(f.broker.calls(MethodName::Ping), 0);
    }

    #[test]
    fn test_shutdown_before_connect_stays_in_start() {
        let f = fixture();
        f.handler.shutdown();
        assert_eq!(f.handler.state(), ConnectionState::Start);

        f.broker.set_reachable(false);
        assert!(f.handler.connect(qos(0, 5, 0)).is_err());
        f.handler.shutdown();
        assert_eq!(f.handler.state(), ConnectionState::Start);

        f.broker.set_reachable(true);
        f.handler.connect(qos(0, 5, 0)).unwrap();
        assert!(f.handler.is_alive());
        assert!(f.events.lock().is_empty());
    }

    #[test]
    fn test_dropped_listener_is_skipped() {
        let f = fixture();
        let listener = Arc::new(ClosureProblemsListener::new(|_| panic!("must not be called")));
        f.handler.init_failsafe(&listener);
        drop(listener);
        f.handler.connect(qos(0, 5, 10)).unwrap();
        f.broker.set_reachable(false);
        wait_for("DEAD", || f.handler.is_dead());
    }
}
