// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request and response values exchanged with the server.
//!
//! Keys and most QoS documents are opaque XML strings passed through to the
//! transport untouched. Only the fields the client itself acts on are
//! modelled: the connect policy ([`Address`]), the session identity, and the
//! subscription id used to route callbacks.

pub mod address;

pub use address::Address;

/// Return value of a successful callback.
pub const STATUS_OK: &str = "<qos><state id='OK'/></qos>";

/// Minimal QoS used for pings and plain requests.
pub const EMPTY_QOS: &str = "<qos/>";

// ============================================================================
// Session
// ============================================================================

/// Login identity of a client session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionQos {
    /// Login name, e.g. `joe` or `joe/2` for a public session id.
    pub name: String,
    /// Secret session id handed out by the server on connect.
    pub secret_session_id: Option<String>,
}

impl SessionQos {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret_session_id: None,
        }
    }

    /// Login name without the `/<publicSessionId>` suffix.
    pub fn login_name(&self) -> &str {
        self.name.split('/').next().unwrap_or(&self.name)
    }
}

// ============================================================================
// Connect
// ============================================================================

/// Connect request. Immutable once built; changes produce a new value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectQos {
    session: SessionQos,
    address: Address,
    callback_address: Option<String>,
    extra_xml: String,
}

impl ConnectQos {
    /// Connect request for `login_name` with the default address.
    pub fn new(login_name: impl Into<String>) -> Self {
        Self::builder(login_name).build()
    }

    pub fn builder(login_name: impl Into<String>) -> ConnectQosBuilder {
        ConnectQosBuilder {
            qos: ConnectQos {
                session: SessionQos::new(login_name),
                address: Address::default(),
                callback_address: None,
                extra_xml: String::new(),
            },
        }
    }

    pub fn session(&self) -> &SessionQos {
        &self.session
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Address the server should deliver callbacks to, if any.
    pub fn callback_address(&self) -> Option<&str> {
        self.callback_address.as_deref()
    }

    /// Opaque XML appended inside `<qos>`.
    pub fn extra_xml(&self) -> &str {
        &self.extra_xml
    }

    /// Copy with a new secret session id (used after reconnect).
    pub fn with_secret_session_id(&self, id: impl Into<String>) -> Self {
        let mut qos = self.clone();
        qos.session.secret_session_id = Some(id.into());
        qos
    }

    /// Copy with a callback address.
    pub fn with_callback_address(&self, address: impl Into<String>) -> Self {
        let mut qos = self.clone();
        qos.callback_address = Some(address.into());
        qos
    }

    /// Render the request.
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<qos>\n");
        xml.push_str(&format!(" <session name='{}'", self.session.name));
        if let Some(id) = &self.session.secret_session_id {
            xml.push_str(&format!(" sessionId='{}'", id));
        }
        xml.push_str("/>\n ");
        xml.push_str(&self.address.to_xml());
        xml.push('\n');
        if let Some(cb) = &self.callback_address {
            xml.push_str(&format!(" <queue relating='callback'><callback>{}</callback></queue>\n", cb));
        }
        if !self.extra_xml.is_empty() {
            xml.push(' ');
            xml.push_str(&self.extra_xml);
            xml.push('\n');
        }
        xml.push_str("</qos>");
        xml
    }
}

/// Builder for [`ConnectQos`].
#[derive(Debug)]
pub struct ConnectQosBuilder {
    qos: ConnectQos,
}

impl ConnectQosBuilder {
    pub fn address(mut self, address: Address) -> Self {
        self.qos.address = address;
        self
    }

    pub fn secret_session_id(mut self, id: impl Into<String>) -> Self {
        self.qos.session.secret_session_id = Some(id.into());
        self
    }

    pub fn extra_xml(mut self, xml: impl Into<String>) -> Self {
        self.qos.extra_xml = xml.into();
        self
    }

    pub fn build(self) -> ConnectQos {
        self.qos
    }
}

/// Server acknowledgement of a connect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectReturnQos {
    /// Absolute session name assigned by the server.
    pub session_name: String,
    /// Secret session id to present on reconnect.
    pub secret_session_id: String,
    /// Raw reply.
    pub xml: String,
}

// ============================================================================
// Messages
// ============================================================================

/// A message: key, payload and QoS.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageUnit {
    pub key: String,
    pub content: Vec<u8>,
    pub qos: String,
}

impl MessageUnit {
    pub fn new(key: impl Into<String>, content: impl Into<Vec<u8>>, qos: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            qos: qos.into(),
        }
    }

    /// Payload as UTF-8, lossy.
    pub fn content_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// Server reply to a subscribe.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscribeReturnQos {
    /// Id used to route updates and to unsubscribe.
    pub subscription_id: String,
    pub xml: String,
}

/// QoS of an incoming callback message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateQos {
    /// Subscription that caused this update, if any.
    pub subscription_id: Option<String>,
    /// Message state, e.g. `OK` or `ERASED`.
    pub state: String,
    pub xml: String,
}
