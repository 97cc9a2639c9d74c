// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server-to-client callbacks.
//!
//! Updates bypass the connection state machine: a [`CallbackServer`] hands
//! them straight to the registered [`UpdateHandler`]. They are never retried
//! by the client.

use crate::qos::UpdateQos;
use crate::Result;
use std::sync::Arc;

/// Receives messages the server pushes to this client.
///
/// Called from transport threads, so implementations must be thread-safe.
pub trait UpdateHandler: Send + Sync {
    /// Handle one message and return the status QoS for the server,
    /// normally [`crate::qos::STATUS_OK`].
    fn update(&self, session_id: &str, key: &str, content: &[u8], qos: &UpdateQos) -> Result<String>;
}

/// Update handler backed by a closure.
///
/// ```ignore
/// let handler = ClosureUpdateHandler::new(|_session, key, content, _qos| {
///     println!("{}: {} bytes", key, content.len());
///     Ok(STATUS_OK.to_string())
/// });
/// access.connect(qos, Some(Arc::new(handler)))?;
/// ```
pub struct ClosureUpdateHandler<F>
where
    F: Fn(&str, &str, &[u8], &UpdateQos) -> Result<String> + Send + Sync,
{
    callback: F,
}

impl<F> ClosureUpdateHandler<F>
where
    F: Fn(&str, &str, &[u8], &UpdateQos) -> Result<String> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> UpdateHandler for ClosureUpdateHandler<F>
where
    F: Fn(&str, &str, &[u8], &UpdateQos) -> Result<String> + Send + Sync,
{
    fn update(&self, session_id: &str, key: &str, content: &[u8], qos: &UpdateQos) -> Result<String> {
        (self.callback)(session_id, key, content, qos)
    }
}

/// Server side of the callback path, owned by the client facade.
pub trait CallbackServer: Send {
    /// Start accepting updates for `login_name` and route them to `handler`.
    fn initialize(&mut self, login_name: &str, handler: Arc<dyn UpdateHandler>) -> Result<()>;

    /// Transport type of the callback, e.g. `LOCAL`.
    fn protocol(&self) -> &str;

    /// Address the server should use to reach this callback.
    fn callback_address(&self) -> String;

    /// Stop accepting updates.
    fn shutdown(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::STATUS_OK;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_closure_update_handler() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let handler = ClosureUpdateHandler::new(move |session, key, content, _qos| {
            assert_eq!(session, "sess-1");
            assert_eq!(key, "<key oid='a'/>");
            c.fetch_add(content.len() as u32, Ordering::SeqCst);
            Ok(STATUS_OK.to_string())
        });
        let status = handler
            .update("sess-1", "<key oid='a'/>", b"abc", &UpdateQos::default())
            .unwrap();
        assert_eq!(status, STATUS_OK);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
