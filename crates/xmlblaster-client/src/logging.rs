// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Console logging setup.
//!
//! The library only emits through the `log` facade. Applications that do not
//! bring their own logger can call one of these once at startup.

use crate::{Error, Result};
use log::LevelFilter;

/// Log to stderr at `level`.
///
/// Fails if a logger is already installed.
pub fn init_logging(level: LevelFilter) -> Result<()> {
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| Error::config(format!("logger already initialized: {}", e)))
}

/// Log to stderr, honouring `RUST_LOG` and falling back to `default_level`.
pub fn init_logging_env(default_level: LevelFilter) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level.to_string()))
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| Error::config(format!("logger already initialized: {}", e)))
}

/// Log to stderr with an explicit filter string, e.g. `xmlblaster_client=debug,warn`.
pub fn init_logging_with_filter(filter: &str) -> Result<()> {
    env_logger::Builder::new()
        .parse_filters(filter)
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| Error::config(format!("logger already initialized: {}", e)))
}
