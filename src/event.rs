// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Metric event model.
//!
//! A [`MetricEvent`] is the typed payload instrumentation modules hand to the
//! [`MetricsRegistry`](crate::MetricsRegistry), which merges the configured
//! common tags and forwards it to the [`Backend`](crate::Backend).

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Tag set attached to an event. Ordered so that backends see a stable layout.
pub type Tags = BTreeMap<String, String>;

/// Metric names emitted by the built-in modules.
///
/// Downstream dashboards depend on these exact strings.
pub mod names {
    /// Counter, one per observed actor construction
    pub const ACTOR_CREATED: &str = "actor.created";
    /// Counter, one per observed actor termination
    pub const ACTOR_TERMINATED: &str = "actor.terminated";
    /// Gauge, number of observed live actors
    pub const ACTOR_ACTIVE: &str = "actor.active";
    /// Counter, one per message processing attempt
    pub const MESSAGE_PROCESSED: &str = "actor.message.processed";
    /// Timer, wall time from receipt to completion or failure
    pub const MESSAGE_PROCESSING_TIME: &str = "actor.message.processing.time";
    /// Counter, one per failed processing attempt
    pub const MESSAGE_FAILED: &str = "actor.message.failed";
    /// Gauge, current mailbox depth
    pub const MAILBOX_SIZE: &str = "actor.mailbox.size";
    /// Timer, time an item waited between enqueue and dequeue
    pub const MAILBOX_TIME: &str = "actor.mailbox.time";
}

/// Tag keys set by the built-in modules.
pub mod tags {
    /// Path of the observed actor
    pub const ACTOR_PATH: &str = "actor_path";
    /// Type name of the processed message
    pub const MESSAGE_TYPE: &str = "message_type";
}

/// Kind of measurement carried by a [`MetricEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Monotonic increment by `value`
    Counter,
    /// Point-in-time sample; `value` replaces the previous one
    Gauge,
    /// Duration in seconds
    Timer,
}

impl MetricKind {
    /// Lower-case name of the kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Timer => "timer",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEvent {
    /// Kind of measurement
    pub kind: MetricKind,
    /// Metric name, see [`names`]
    pub name: &'static str,
    /// Dimensions of the measurement
    pub tags: Tags,
    /// Increment, sample or seconds depending on `kind`
    pub value: f64,
    /// Wall-clock time at which the event was produced
    pub timestamp: SystemTime,
}

impl MetricEvent {
    fn new(kind: MetricKind, name: &'static str, value: f64) -> Self {
        Self {
            kind,
            name,
            tags: Tags::new(),
            value,
            timestamp: SystemTime::now(),
        }
    }

    /// A counter incremented by `value`.
    pub fn counter(name: &'static str, value: u64) -> Self {
        Self::new(MetricKind::Counter, name, value as f64)
    }

    /// A gauge sampled at `value`.
    pub fn gauge(name: &'static str, value: f64) -> Self {
        Self::new(MetricKind::Gauge, name, value)
    }

    /// A timer recording `elapsed`.
    pub fn timer(name: &'static str, elapsed: Duration) -> Self {
        Self::new(MetricKind::Timer, name, elapsed.as_secs_f64())
    }

    /// Adds or replaces a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Tags the event with the observed actor's path.
    pub fn with_actor(self, path: &str) -> Self {
        self.with_tag(tags::ACTOR_PATH, path)
    }

    /// Tags the event with a message type name.
    pub fn with_message_type(self, type_name: &str) -> Self {
        self.with_tag(tags::MESSAGE_TYPE, type_name)
    }

    /// Returns the value of tag `key`, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Merges `common` into this event's tags. Keys already on the event win.
    pub fn merge_common_tags(&mut self, common: &Tags) {
        for (key, value) in common {
            self.tags
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let c = MetricEvent::counter(names::ACTOR_CREATED, 1);
        assert_eq!(c.kind, MetricKind::Counter);
        assert_eq!(c.value, 1.0);

        let g = MetricEvent::gauge(names::MAILBOX_SIZE, 3.0);
        assert_eq!(g.kind, MetricKind::Gauge);

        let t = MetricEvent::timer(names::MAILBOX_TIME, Duration::from_millis(1500));
        assert_eq!(t.kind, MetricKind::Timer);
        assert!((t.value - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tags() {
        let e = MetricEvent::counter(names::MESSAGE_PROCESSED, 1)
            .with_actor("user/a")
            .with_message_type("app::Ping");
        assert_eq!(e.tag(tags::ACTOR_PATH), Some("user/a"));
        assert_eq!(e.tag(tags::MESSAGE_TYPE), Some("app::Ping"));
        assert_eq!(e.tag("missing"), None);
    }

    #[test]
    fn test_merge_common_tags_keeps_event_tags() {
        let mut common = Tags::new();
        common.insert("env".into(), "prod".into());
        common.insert(tags::ACTOR_PATH.into(), "spoofed".into());

        let mut e = MetricEvent::counter(names::ACTOR_CREATED, 1).with_actor("user/a");
        e.merge_common_tags(&common);

        assert_eq!(e.tag("env"), Some("prod"));
        assert_eq!(e.tag(tags::ACTOR_PATH), Some("user/a"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MetricKind::Counter.to_string(), "counter");
        assert_eq!(MetricKind::Gauge.to_string(), "gauge");
        assert_eq!(MetricKind::Timer.to_string(), "timer");
    }
}
