// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;

use super::{Backend, BackendError};
use crate::event::MetricEvent;

/// Backend that keeps every event in memory.
///
/// Intended for tests and for hosts that poll metrics themselves. The
/// internal lock is private to this backend and is held only while pushing or
/// copying events.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    events: Mutex<Vec<MetricEvent>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded events in arrival order.
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Returns the recorded events named `name`.
    pub fn events_named(&self, name: &str) -> Vec<MetricEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }

    /// Number of events named `name`.
    pub fn count(&self, name: &str) -> usize {
        self.events_named(name).len()
    }

    /// Sum of the values of events named `name`.
    pub fn sum(&self, name: &str) -> f64 {
        self.events_named(name).iter().map(|e| e.value).sum()
    }

    /// Value of the most recent event named `name`.
    pub fn last_value(&self, name: &str) -> Option<f64> {
        self.events_named(name).last().map(|e| e.value)
    }

    /// Total number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards all recorded events.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Backend for MemoryBackend {
    fn record(&self, event: MetricEvent) -> Result<(), BackendError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| BackendError::Rejected("memory backend lock poisoned".to_string()))?;
        events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::names;

    #[test]
    fn test_record_and_query() {
        let backend = MemoryBackend::new();
        assert!(backend.is_empty());

        backend
            .record(MetricEvent::counter(names::ACTOR_CREATED, 1))
            .unwrap();
        backend
            .record(MetricEvent::counter(names::ACTOR_CREATED, 2))
            .unwrap();
        backend
            .record(MetricEvent::gauge(names::ACTOR_ACTIVE, 3.0))
            .unwrap();

        assert_eq!(backend.len(), 3);
        assert_eq!(backend.count(names::ACTOR_CREATED), 2);
        assert_eq!(backend.sum(names::ACTOR_CREATED), 3.0);
        assert_eq!(backend.last_value(names::ACTOR_ACTIVE), Some(3.0));
        assert_eq!(backend.last_value(names::MAILBOX_SIZE), None);

        backend.clear();
        assert!(backend.is_empty());
    }
}
