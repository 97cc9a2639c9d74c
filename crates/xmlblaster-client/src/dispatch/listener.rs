// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection lifecycle notifications.

/// Lifecycle event reported to a [`ConnectionProblemsListener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    /// ALIVE -> POLLING
    GoingToPoll,
    /// POLLING -> ALIVE
    ReConnected,
    /// POLLING -> DEAD (or ALIVE -> DEAD when not fail-safe)
    LostConnection,
}

/// Receives fail-over notifications.
///
/// All methods are invoked from the ping timer thread, never while the
/// connection's lock is held, so they may call back into the client.
/// Implementations must be thread-safe and should return quickly.
pub trait ConnectionProblemsListener: Send + Sync {
    /// The connection stopped answering pings; reconnect polling starts.
    fn going_to_poll(&self) {}

    /// A reconnect attempt succeeded.
    fn re_connected(&self) {}

    /// Reconnect retries are exhausted; the connection is dead for good.
    fn lost_connection(&self) {}
}

impl ConnectionEvent {
    /// Dispatch this event to the matching listener method.
    pub fn notify(self, listener: &dyn ConnectionProblemsListener) {
        match self {
            ConnectionEvent::GoingToPoll => listener.going_to_poll(),
            ConnectionEvent::ReConnected => listener.re_connected(),
            ConnectionEvent::LostConnection => listener.lost_connection(),
        }
    }
}

/// Closure-based listener receiving every event.
///
/// ```ignore
/// let listener = Arc::new(ClosureProblemsListener::new(|event| {
///     log::info!("connection: {:?}", event);
/// }));
/// access.init_failsafe(&listener);
/// ```
pub struct ClosureProblemsListener<F: Fn(ConnectionEvent) + Send + Sync> {
    callback: F,
}

impl<F: Fn(ConnectionEvent) + Send + Sync> ClosureProblemsListener<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: Fn(ConnectionEvent) + Send + Sync> ConnectionProblemsListener for ClosureProblemsListener<F> {
    fn going_to_poll(&self) {
        (self.callback)(ConnectionEvent::GoingToPoll);
    }

    fn re_connected(&self) {
        (self.callback)(ConnectionEvent::ReConnected);
    }

    fn lost_connection(&self) {
        (self.callback)(ConnectionEvent::LostConnection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_default_methods_are_noops() {
        struct Quiet;
        impl ConnectionProblemsListener for Quiet {}
        let q = Quiet;
        q.going_to_poll();
        q.re_connected();
        q.lost_connection();
    }

    #[test]
    fn test_closure_listener_sees_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let listener = ClosureProblemsListener::new(move |e| s.lock().push(e));
        ConnectionEvent::GoingToPoll.notify(&listener);
        ConnectionEvent::ReConnected.notify(&listener);
        ConnectionEvent::LostConnection.notify(&listener);
        assert_eq!(
            *seen.lock(),
            vec![
                ConnectionEvent::GoingToPoll,
                ConnectionEvent::ReConnected,
                ConnectionEvent::LostConnection
            ]
        );
    }
}
