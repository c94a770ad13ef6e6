// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Pattern-based inclusion filter.
//!
//! A [`FilterEngine`] decides, per actor path and per message type, whether
//! instrumentation applies. It is built once from a [`FilterConfig`], owns the
//! compiled [`Pattern`]s and is never mutated afterwards, so it can be read
//! concurrently from any number of threads without synchronization.
//!
//! The decision rule is `included && !excluded`:
//!
//! - an empty include list includes everything,
//! - exclude is evaluated independently and always wins.
//!
//! ```rust
//! use actor_metrics::{FilterConfig, FilterEngine};
//!
//! let config = FilterConfig::default()
//!     .include_actor("orders-*")
//!     .exclude_actor("orders-debug");
//! let filter = FilterEngine::build(&config).unwrap();
//!
//! assert!(filter.matches_actor("orders-42"));
//! assert!(!filter.matches_actor("orders-debug"));
//! assert!(!filter.matches_actor("billing-1"));
//! ```

mod pattern;

pub use pattern::{Pattern, PATH_SEPARATOR};

use crate::error::ConfigError;

/// Four ordered lists of glob strings selecting what gets instrumented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FilterConfig {
    /// Actor paths to instrument. Empty means all.
    #[cfg_attr(feature = "serde", serde(alias = "actorInclude"))]
    pub actor_include: Vec<String>,
    /// Actor paths never to instrument.
    #[cfg_attr(feature = "serde", serde(alias = "actorExclude"))]
    pub actor_exclude: Vec<String>,
    /// Message type names to instrument. Empty means all.
    #[cfg_attr(feature = "serde", serde(alias = "messageInclude"))]
    pub message_include: Vec<String>,
    /// Message type names never to instrument.
    #[cfg_attr(feature = "serde", serde(alias = "messageExclude"))]
    pub message_exclude: Vec<String>,
}

impl FilterConfig {
    /// Appends an actor include pattern.
    pub fn include_actor(mut self, pattern: impl Into<String>) -> Self {
        self.actor_include.push(pattern.into());
        self
    }

    /// Appends an actor exclude pattern.
    pub fn exclude_actor(mut self, pattern: impl Into<String>) -> Self {
        self.actor_exclude.push(pattern.into());
        self
    }

    /// Appends a message-type include pattern.
    pub fn include_message(mut self, pattern: impl Into<String>) -> Self {
        self.message_include.push(pattern.into());
        self
    }

    /// Appends a message-type exclude pattern.
    pub fn exclude_message(mut self, pattern: impl Into<String>) -> Self {
        self.message_exclude.push(pattern.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
struct Rule {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl Rule {
    fn compile(include: &[String], exclude: &[String]) -> Result<Self, ConfigError> {
        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    #[inline]
    fn decide(&self, candidate: &str) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|p| p.is_match(candidate));
        let excluded = self.exclude.iter().any(|p| p.is_match(candidate));
        included && !excluded
    }
}

fn compile_all(globs: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    globs.iter().map(|g| Pattern::compile(g)).collect()
}

/// Immutable, pre-compiled filter over actor paths and message types.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    actors: Rule,
    messages: Rule,
}

impl FilterEngine {
    /// Compiles every pattern of `config`.
    ///
    /// Fails on the first pattern that cannot be compiled; a partially valid
    /// filter set is never returned.
    pub fn build(config: &FilterConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            actors: Rule::compile(&config.actor_include, &config.actor_exclude)?,
            messages: Rule::compile(&config.message_include, &config.message_exclude)?,
        })
    }

    /// Filter that instruments everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Returns true if the actor at `path` should be observed.
    #[inline]
    pub fn matches_actor(&self, path: &str) -> bool {
        self.actors.decide(path)
    }

    /// Returns true if messages of `type_name` should be observed.
    #[inline]
    pub fn matches_message(&self, type_name: &str) -> bool {
        self.messages.decide(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_includes_everything() {
        let filter = FilterEngine::build(&FilterConfig::default()).unwrap();
        for path in ["", "a", "user/orders/1", "orders-debug", "**"] {
            assert!(filter.matches_actor(path), "{path}");
            assert!(filter.matches_message(path), "{path}");
        }
    }

    #[test]
    fn test_orders_scenario() {
        let config = FilterConfig::default()
            .include_actor("orders-*")
            .exclude_actor("orders-debug");
        let filter = FilterEngine::build(&config).unwrap();

        assert!(filter.matches_actor("orders-42"));
        assert!(!filter.matches_actor("orders-debug"));
        assert!(!filter.matches_actor("billing-1"));
    }

    #[test]
    fn test_exclude_wins_over_explicit_include() {
        let config = FilterConfig::default()
            .include_actor("user/worker")
            .exclude_actor("user/worker");
        let filter = FilterEngine::build(&config).unwrap();
        assert!(!filter.matches_actor("user/worker"));
    }

    #[test]
    fn test_exclude_only() {
        let config = FilterConfig::default().exclude_actor("system/**");
        let filter = FilterEngine::build(&config).unwrap();
        assert!(filter.matches_actor("user/a"));
        assert!(!filter.matches_actor("system/log/1"));
    }

    #[test]
    fn test_non_wildcard_is_exact_only() {
        let literals = ["user/a", "orders-1", "a.b", "x+y", "(z)"];
        for literal in literals {
            let filter =
                FilterEngine::build(&FilterConfig::default().include_actor(literal)).unwrap();
            for candidate in literals {
                assert_eq!(filter.matches_actor(candidate), candidate == literal);
            }
            assert!(!filter.matches_actor(&format!("{literal}x")));
            assert!(!filter.matches_actor(&format!("x{literal}")));
        }
    }

    #[test]
    fn test_actor_and_message_rules_independent() {
        let config = FilterConfig::default()
            .include_message("app::msg::*")
            .exclude_message("app::msg::Tick");
        let filter = FilterEngine::build(&config).unwrap();

        assert!(filter.matches_actor("anything"));
        assert!(filter.matches_message("app::msg::Order"));
        assert!(!filter.matches_message("app::msg::Tick"));
        assert!(!filter.matches_message("other::Order"));
    }

    #[test]
    fn test_invalid_pattern_fails_build() {
        let config = FilterConfig::default()
            .include_actor("ok/*")
            .exclude_message("");
        assert_eq!(
            FilterEngine::build(&config).unwrap_err(),
            ConfigError::EmptyPattern
        );
    }
}
