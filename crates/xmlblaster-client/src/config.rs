// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client properties.
//!
//! A flat `key -> value` store using xmlBlaster's slash separated keys
//! (`dispatch/connection/retries`). Sources are layered, later ones win:
//!
//! 1. defaults set in code
//! 2. a YAML file (feature `config-yaml`)
//! 3. environment variables prefixed with `XMLBLASTER_`
//! 4. command line arguments of the form `-key value`
//!
//! # Example YAML
//!
//! ```yaml
//! dispatch:
//!   connection:
//!     protocol: LOCAL
//!     retries: 3
//!     delay: 1000
//!     pingInterval: 2000
//! ```
//!
//! # Environment
//!
//! `XMLBLASTER_DISPATCH_CONNECTION_RETRIES=3` maps to
//! `dispatch/connection/retries`. Segments are lower-cased, except the known
//! connection keys which get their camel case back (`PINGINTERVAL` becomes
//! `pingInterval`).

use crate::{Error, Result};
use std::collections::BTreeMap;

/// Prefix of environment variables picked up by [`ClientProperties::load_env`].
pub const ENV_PREFIX: &str = "XMLBLASTER_";

/// Short keys understood as fallbacks for `dispatch/connection/*`.
const SHORT_KEYS: [&str; 5] = ["protocol", "version", "retries", "delay", "pingInterval"];

/// Layered string properties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientProperties {
    values: BTreeMap<String, String>,
}

impl ClientProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment then from `args`.
    pub fn load<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut props = Self::new();
        props.load_env();
        props.load_args(args);
        props
    }

    /// Properties from command line arguments only.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut props = Self::new();
        props.load_args(args);
        props
    }

    // === Sources ===

    /// Merge `-key value` pairs. A flag without a value is stored as `true`.
    /// Arguments not starting with `-` are ignored.
    pub fn load_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        let mut i = 0;
        while i < args.len() {
            let Some(key) = args[i].strip_prefix('-').map(|k| k.trim_start_matches('-')) else {
                i += 1;
                continue;
            };
            if key.is_empty() {
                i += 1;
                continue;
            }
            match args.get(i + 1) {
                Some(value) if !is_flag(value) => {
                    self.set(key, value.clone());
                    i += 2;
                }
                _ => {
                    self.set(key, "true");
                    i += 1;
                }
            }
        }
    }

    /// Merge `XMLBLASTER_*` environment variables.
    pub fn load_env(&mut self) {
        self.load_env_from(std::env::vars());
    }

    /// Merge variables from an explicit iterator (testable form of [`Self::load_env`]).
    pub fn load_env_from<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let key = rest
                .split('_')
                .map(|segment| match SHORT_KEYS.iter().find(|k| k.eq_ignore_ascii_case(segment)) {
                    Some(short) => (*short).to_string(),
                    None => segment.to_ascii_lowercase(),
                })
                .collect::<Vec<_>>()
                .join("/");
            self.set(key, value);
        }
    }

    /// Merge a YAML document. Nested maps are joined with `/`.
    #[cfg(feature = "config-yaml")]
    pub fn load_yaml_str(&mut self, yaml: &str) -> Result<()> {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| Error::config(format!("YAML parse error: {}", e)))?;
        match doc {
            serde_yaml::Value::Null => Ok(()),
            serde_yaml::Value::Mapping(map) => {
                self.merge_yaml_mapping("", &map);
                Ok(())
            }
            _ => Err(Error::config("YAML properties must be a mapping")),
        }
    }

    /// Merge a YAML file.
    #[cfg(feature = "config-yaml")]
    pub fn load_yaml_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        self.load_yaml_str(&text)
    }

    #[cfg(feature = "config-yaml")]
    fn merge_yaml_mapping(&mut self, prefix: &str, map: &serde_yaml::Mapping) {
        use serde_yaml::Value;

        for (k, v) in map {
            let name = match k {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            let key = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            match v {
                Value::Mapping(inner) => self.merge_yaml_mapping(&key, inner),
                Value::String(s) => self.set(key, s.clone()),
                Value::Number(n) => self.set(key, n.to_string()),
                Value::Bool(b) => self.set(key, b.to_string()),
                Value::Null => {}
                other => log::warn!("[properties] ignoring non-scalar value for '{}': {:?}", key, other),
            }
        }
    }

    // === Access ===

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder form of [`Self::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Integer property. Present but unparsable values are an error.
    pub fn get_i64(&self, key: &str, default: i64) -> Result<i64> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("property '{}'='{}' is not an integer", key, v))),
        }
    }

    /// Boolean property (`true/false/yes/no/1/0`).
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(Error::config(format!("property '{}'='{}' is not a boolean", key, v))),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Help text for the connection properties.
    pub fn usage() -> String {
        let mut text = String::from("\nConnection properties (-key value, XMLBLASTER_* env or YAML):\n");
        for (key, help) in [
            ("dispatch/connection/protocol", "Transport type, e.g. LOCAL or SOCKET [LOCAL]"),
            ("dispatch/connection/version", "Transport version [1.0]"),
            ("dispatch/connection/retries", "Retries on communication failure, -1 forever [-1]"),
            ("dispatch/connection/delay", "Delay between retries in ms [5000]"),
            ("dispatch/connection/pingInterval", "Ping interval in ms, 0 disables pinging [10000]"),
        ] {
            text.push_str(&format!("   -{:<34}{}\n", key, help));
        }
        text.push_str("   Short forms -protocol, -retries, -delay and -pingInterval are accepted too.\n");
        text
    }
}

/// `-5` is a value, `-retries` is a flag.
fn is_flag(arg: &str) -> bool {
    arg.starts_with('-') && arg.len() > 1 && arg[1..].parse::<f64>().is_err()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let props = ClientProperties::from_args(["prog", "-retries", "-1", "-verbose", "-delay", "100"]);
        assert_eq!(props.get("retries"), Some("-1"));
        assert_eq!(props.get("verbose"), Some("true"));
        assert_eq!(props.get_i64("delay", 0).unwrap(), 100);
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn test_env_mapping() {
        let mut props = ClientProperties::new();
        props.load_env_from(vec![
            ("XMLBLASTER_DISPATCH_CONNECTION_RETRIES".to_string(), "3".to_string()),
            ("XMLBLASTER_PINGINTERVAL".to_string(), "2000".to_string()),
            ("XMLBLASTER_DISPATCH_CONNECTION_PINGINTERVAL".to_string(), "900".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ]);
        assert_eq!(props.get("dispatch/connection/retries"), Some("3"));
        assert_eq!(props.get("pingInterval"), Some("2000"));
        assert_eq!(props.get("dispatch/connection/pingInterval"), Some("900"));
        assert!(!props.contains("HOME"));
    }

    #[test]
    fn test_args_override_env() {
        let mut props = ClientProperties::new();
        props.load_env_from(vec![("XMLBLASTER_RETRIES".to_string(), "3".to_string())]);
        props.load_args(["-retries", "7"]);
        assert_eq!(props.get_i64("retries", 0).unwrap(), 7);
    }

    #[test]
    fn test_typed_getters() {
        let props = ClientProperties::new().with("a", "yes").with("b", "x");
        assert!(props.get_bool("a", false).unwrap());
        assert!(props.get_bool("b", false).is_err());
        assert!(props.get_bool("missing", true).unwrap());
        assert!(props.get_i64("b", 0).is_err());
        assert_eq!(props.get_string("missing", "dflt"), "dflt");
    }

    #[cfg(feature = "config-yaml")]
    #[test]
    fn test_yaml_nested() {
        let mut props = ClientProperties::new();
        props
            .load_yaml_str(
                "dispatch:\n  connection:\n    retries: 3\n    pingInterval: 2000\n    protocol: LOCAL\nverbose: true\n",
            )
            .unwrap();
        assert_eq!(props.get("dispatch/connection/retries"), Some("3"));
        assert_eq!(props.get("dispatch/connection/pingInterval"), Some("2000"));
        assert_eq!(props.get("verbose"), Some("true"));
    }

    #[cfg(feature = "config-yaml")]
    #[test]
    fn test_yaml_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "delay: 250").unwrap();
        let mut props = ClientProperties::new();
        props.load_yaml_file(file.path()).unwrap();
        assert_eq!(props.get_i64("delay", 0).unwrap(), 250);

        assert!(props.load_yaml_str("- a\n- b\n").is_err());
    }

    #[test]
    fn test_usage_mentions_keys() {
        let text = ClientProperties::usage();
        assert!(text.contains("dispatch/connection/pingInterval"));
    }
}
