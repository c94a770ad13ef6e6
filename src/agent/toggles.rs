// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use log::warn;

use crate::module::ModuleDescriptor;

/// Environment variable of the master switch.
pub const MASTER_ENV: &str = "ACTOR_METRICS_ENABLED";
/// Property key of the master switch.
pub const MASTER_PROPERTY: &str = "actor.metrics.enabled";

const MODULE_ENV_PREFIX: &str = "ACTOR_METRICS_MODULE_";
const MODULE_ENV_SUFFIX: &str = "_ENABLED";
const MODULE_PROPERTY_PREFIX: &str = "actor.metrics.module.";
const MODULE_PROPERTY_SUFFIX: &str = ".enabled";

/// Enable switches read at bootstrap.
///
/// Every switch is looked up in the environment first and then in the
/// property source. An unset switch is enabled.
#[derive(Debug, Clone, Default)]
pub struct Toggles {
    env: HashMap<String, String>,
    properties: HashMap<String, String>,
}

impl Toggles {
    /// Snapshot of the switches present in the process environment.
    pub fn from_env() -> Self {
        let env = std::env::vars()
            .filter(|(key, _)| key.starts_with("ACTOR_METRICS_"))
            .collect();
        Self {
            env,
            properties: HashMap::new(),
        }
    }

    /// Sets an environment-level switch.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets a property-level switch, consulted when the environment has none.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Adds every entry of `properties` to the property source.
    pub fn with_properties<I, K, V>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.properties
            .extend(properties.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Master switch.
    pub fn master_enabled(&self) -> bool {
        self.lookup(MASTER_ENV, MASTER_PROPERTY, true)
    }

    /// Switch of one module. Defaults to the descriptor's default.
    pub fn module_enabled(&self, descriptor: &ModuleDescriptor) -> bool {
        self.lookup(
            &module_env_key(descriptor.id()),
            &module_property_key(descriptor.id()),
            descriptor.default_enabled(),
        )
    }

    fn lookup(&self, env_key: &str, property_key: &str, default: bool) -> bool {
        let (key, raw) = match self.env.get(env_key) {
            Some(value) => (env_key, value),
            None => match self.properties.get(property_key) {
                Some(value) => (property_key, value),
                None => return default,
            },
        };
        parse_flag(raw).unwrap_or_else(|| {
            warn!("Ignoring unparsable switch {key}={raw:?}, using {default}");
            default
        })
    }
}

/// Environment variable of a module switch: `ACTOR_METRICS_MODULE_<ID>_ENABLED`.
pub fn module_env_key(id: &str) -> String {
    let normalized: String = id
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("{MODULE_ENV_PREFIX}{normalized}{MODULE_ENV_SUFFIX}")
}

/// Property key of a module switch: `actor.metrics.module.<id>.enabled`.
pub fn module_property_key(id: &str) -> String {
    format!("{MODULE_PROPERTY_PREFIX}{id}{MODULE_PROPERTY_SUFFIX}")
}

/// Parses a switch value. Case-insensitive, surrounding whitespace ignored.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
