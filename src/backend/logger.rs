// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Write as _;

use log::{log, log_enabled, Level};

use super::{Backend, BackendError};
use crate::event::MetricEvent;

/// Backend that writes one `log` record per event.
///
/// Tags are rendered as `key=value` pairs. Nothing is formatted when the
/// configured level is disabled for the target.
#[derive(Debug, Clone)]
pub struct LogBackend {
    level: Level,
    target: &'static str,
}

impl Default for LogBackend {
    fn default() -> Self {
        Self::new(Level::Info)
    }
}

impl LogBackend {
    /// Logs at `level` under the `actor_metrics` target.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            target: "actor_metrics",
        }
    }

    /// Overrides the log target.
    pub fn with_target(mut self, target: &'static str) -> Self {
        self.target = target;
        self
    }

    fn render(event: &MetricEvent) -> String {
        let mut line = format!("{} {} {}", event.kind, event.name, event.value);
        for (key, value) in &event.tags {
            let _ = write!(line, " {key}={value}");
        }
        line
    }
}

impl Backend for LogBackend {
    fn record(&self, event: MetricEvent) -> Result<(), BackendError> {
        if log_enabled!(target: self.target, self.level) {
            log!(target: self.target, self.level, "{}", Self::render(&event));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::names;

    #[test]
    fn test_render() {
        let event = MetricEvent::counter(names::ACTOR_CREATED, 1)
            .with_actor("user/a")
            .with_tag("env", "test");
        assert_eq!(
            LogBackend::render(&event),
            "counter actor.created 1 actor_path=user/a env=test"
        );
    }

    #[test]
    fn test_record_never_fails() {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = LogBackend::new(Level::Debug).with_target("actor_metrics::test");
        assert!(backend
            .record(MetricEvent::gauge(names::ACTOR_ACTIVE, 2.0))
            .is_ok());
    }
}
