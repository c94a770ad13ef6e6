// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use crate::event::Tags;
use crate::filter::FilterConfig;

/// How a failed message-processing attempt is counted.
///
/// A failed attempt always increments `actor.message.failed` and always
/// records `actor.message.processing.time`. This policy only controls the
/// shared `actor.message.processed` counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum FailedMessagePolicy {
    /// Every attempt increments `processed` exactly once; failures also
    /// increment `failed`.
    #[default]
    CountAsProcessed,
    /// Failures increment `failed` instead of `processed`.
    FailedOnly,
}

/// Host-supplied engine configuration. Immutable once built.
///
/// ```rust
/// use actor_metrics::{FilterConfig, MetricsConfiguration};
///
/// let config = MetricsConfiguration::builder()
///     .common_tag("service", "orders")
///     .filter(FilterConfig::default().exclude_actor("system/**"))
///     .build();
///
/// assert!(config.enabled());
/// assert_eq!(config.common_tags().get("service").map(String::as_str), Some("orders"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MetricsConfiguration {
    enabled: bool,
    #[cfg_attr(feature = "serde", serde(alias = "commonTags"))]
    common_tags: Tags,
    filter: FilterConfig,
    #[cfg_attr(feature = "serde", serde(alias = "failedMessagePolicy"))]
    failed_message_policy: FailedMessagePolicy,
}

impl Default for MetricsConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            common_tags: Tags::new(),
            filter: FilterConfig::default(),
            failed_message_policy: FailedMessagePolicy::default(),
        }
    }
}

impl MetricsConfiguration {
    /// Starts a builder with default values: enabled, no common tags,
    /// no filters.
    pub fn builder() -> MetricsConfigurationBuilder {
        MetricsConfigurationBuilder {
            config: Self::default(),
        }
    }

    /// Whether emission is enabled at all.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Tags merged into every event.
    pub fn common_tags(&self) -> &Tags {
        &self.common_tags
    }

    /// Raw filter lists. Compiled by [`MetricsRegistry::build`](crate::MetricsRegistry::build).
    pub fn filter(&self) -> &FilterConfig {
        &self.filter
    }

    /// Counting policy for failed messages.
    pub fn failed_message_policy(&self) -> FailedMessagePolicy {
        self.failed_message_policy
    }

    /// Parses a configuration from JSON.
    ///
    /// ```json
    /// {
    ///   "enabled": true,
    ///   "commonTags": { "service": "orders" },
    ///   "filter": { "actorInclude": ["user/**"], "actorExclude": ["user/debug"] }
    /// }
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_json_str(input: &str) -> Result<Self, crate::error::ConfigError> {
        serde_json::from_str(input).map_err(|e| crate::error::ConfigError::InvalidValue {
            key: "configuration".to_string(),
            value: e.to_string(),
        })
    }
}

/// Builder for [`MetricsConfiguration`].
#[derive(Debug, Clone)]
pub struct MetricsConfigurationBuilder {
    config: MetricsConfiguration,
}

impl MetricsConfigurationBuilder {
    /// Enables or disables emission.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Adds a tag merged into every event.
    pub fn common_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.common_tags.insert(key.into(), value.into());
        self
    }

    /// Replaces the filter lists.
    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.config.filter = filter;
        self
    }

    /// Sets the counting policy for failed messages.
    pub fn failed_message_policy(mut self, policy: FailedMessagePolicy) -> Self {
        self.config.failed_message_policy = policy;
        self
    }

    /// Finishes the configuration.
    pub fn build(self) -> MetricsConfiguration {
        self.config
    }
}
