// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server address with retry and ping policy.

use crate::config::ClientProperties;
use std::fmt::Write as _;
use std::time::Duration;

/// Pings shorter than this are raised to it.
const MIN_PING_INTERVAL_MS: i64 = 10;

/// Address of the server plus the fail-safe policy used to reach it.
///
/// The setters clamp out-of-range values instead of failing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    protocol: String,
    version: String,
    retries: i32,
    delay_ms: i64,
    ping_interval_ms: i64,
}

impl Address {
    /// Default transport type.
    pub const DEFAULT_PROTOCOL: &'static str = "LOCAL";
    /// Default transport version.
    pub const DEFAULT_VERSION: &'static str = "1.0";
    /// Retry forever.
    pub const DEFAULT_RETRIES: i32 = -1;
    /// Pause between retries.
    pub const DEFAULT_DELAY_MS: i64 = 5_000;
    /// Pause between liveness pings.
    pub const DEFAULT_PING_INTERVAL_MS: i64 = 10_000;

    /// Create an address for the given transport with default policy.
    pub fn new(protocol: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Build an address from `dispatch/connection/*` properties.
    ///
    /// Short keys (`protocol`, `retries`, `delay`, `pingInterval`) are used
    /// when the long form is absent.
    pub fn from_properties(props: &ClientProperties) -> crate::Result<Self> {
        let lookup_str = |key: &str, default: &str| {
            props
                .get(&format!("dispatch/connection/{}", key))
                .or_else(|| props.get(key))
                .map(str::to_string)
                .unwrap_or_else(|| default.to_string())
        };
        let lookup_i64 = |key: &str, default: i64| -> crate::Result<i64> {
            let long = format!("dispatch/connection/{}", key);
            if props.contains(&long) {
                props.get_i64(&long, default)
            } else {
                props.get_i64(key, default)
            }
        };

        let mut addr = Address::new(
            lookup_str("protocol", Self::DEFAULT_PROTOCOL),
            lookup_str("version", Self::DEFAULT_VERSION),
        );
        let retries = lookup_i64("retries", i64::from(Self::DEFAULT_RETRIES))?;
        addr.set_retries(i32::try_from(retries).unwrap_or(i32::MAX));
        addr.set_delay_ms(lookup_i64("delay", Self::DEFAULT_DELAY_MS)?);
        addr.set_ping_interval_ms(lookup_i64("pingInterval", Self::DEFAULT_PING_INTERVAL_MS)?);
        Ok(addr)
    }

    // === Transport ===

    /// Transport type, e.g. `SOCKET` or `LOCAL`.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Transport version.
    pub fn version(&self) -> &str {
        &self.version
    }

    // === Fail-safe policy ===

    /// `-1` retries forever, `0` never retries.
    pub fn retries(&self) -> i32 {
        self.retries
    }

    /// Delay between retries in milliseconds.
    pub fn delay_ms(&self) -> i64 {
        self.delay_ms
    }

    /// Delay between retries.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms as u64)
    }

    /// Ping interval in milliseconds, `0` if pinging is disabled.
    pub fn ping_interval_ms(&self) -> i64 {
        self.ping_interval_ms
    }

    /// Ping interval, `None` if pinging is disabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_ms > 0).then(|| Duration::from_millis(self.ping_interval_ms as u64))
    }

    /// A lost connection is only polled for if there is a delay to poll with.
    pub fn is_failsafe(&self) -> bool {
        self.delay_ms > 0
    }

    /// True if another attempt is allowed after `failures` failed ones.
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.retries < 0 || failures <= self.retries as u32
    }

    pub fn set_retries(&mut self, retries: i32) {
        self.retries = retries.max(-1);
    }

    pub fn set_delay_ms(&mut self, delay_ms: i64) {
        self.delay_ms = delay_ms.max(0);
    }

    pub fn set_ping_interval_ms(&mut self, ping_interval_ms: i64) {
        self.ping_interval_ms = if ping_interval_ms <= 0 {
            0
        } else if ping_interval_ms < MIN_PING_INTERVAL_MS {
            log::warn!(
                "[address] pingInterval={} ms is too short, using {} ms",
                ping_interval_ms,
                MIN_PING_INTERVAL_MS
            );
            MIN_PING_INTERVAL_MS
        } else {
            ping_interval_ms
        };
    }

    /// Set the retry count.
    pub fn with_retries(mut self, retries: i32) -> Self {
        self.set_retries(retries);
        self
    }

    /// Set the delay between retries.
    pub fn with_delay_ms(mut self, delay_ms: i64) -> Self {
        self.set_delay_ms(delay_ms);
        self
    }

    /// Set the ping interval.
    pub fn with_ping_interval_ms(mut self, ping_interval_ms: i64) -> Self {
        self.set_ping_interval_ms(ping_interval_ms);
        self
    }

    /// Render as an `<address>` element. Only non-default attributes are written.
    pub fn to_xml(&self) -> String {
        let mut xml = format!("<address type='{}'", self.protocol);
        if self.version != Self::DEFAULT_VERSION {
            let _ = write!(xml, " version='{}'", self.version);
        }
        if self.ping_interval_ms != Self::DEFAULT_PING_INTERVAL_MS {
            let _ = write!(xml, " pingInterval='{}'", self.ping_interval_ms);
        }
        if self.retries != Self::DEFAULT_RETRIES {
            let _ = write!(xml, " retries='{}'", self.retries);
        }
        if self.delay_ms != Self::DEFAULT_DELAY_MS {
            let _ = write!(xml, " delay='{}'", self.delay_ms);
        }
        xml.push_str("/>");
        xml
    }
}

impl Default for Address {
    fn default() -> Self {
        Self {
            protocol: Self::DEFAULT_PROTOCOL.to_string(),
            version: Self::DEFAULT_VERSION.to_string(),
            retries: Self::DEFAULT_RETRIES,
            delay_ms: Self::DEFAULT_DELAY_MS,
            ping_interval_ms: Self::DEFAULT_PING_INTERVAL_MS,
        }
    }
}
