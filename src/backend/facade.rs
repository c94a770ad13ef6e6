// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use metrics::Label;

use super::{Backend, BackendError};
use crate::event::{MetricEvent, MetricKind};

/// Backend forwarding to the [`metrics`] crate facade.
///
/// Tags become labels. Counters increment, gauges are set, timers are
/// recorded into a histogram in seconds. Whatever recorder the host installed
/// (Prometheus exporter, StatsD, ...) receives the values; without a recorder
/// the calls are no-ops.
#[derive(Debug, Clone, Default)]
pub struct MetricsFacadeBackend {
    _private: (),
}

impl MetricsFacadeBackend {
    /// Creates the adapter.
    pub fn new() -> Self {
        Self::default()
    }

    fn labels(event: &MetricEvent) -> Vec<Label> {
        event
            .tags
            .iter()
            .map(|(k, v)| Label::new(k.clone(), v.clone()))
            .collect()
    }
}

impl Backend for MetricsFacadeBackend {
    fn record(&self, event: MetricEvent) -> Result<(), BackendError> {
        if !event.value.is_finite() {
            return Err(BackendError::Rejected(format!(
                "non-finite value for {}",
                event.name
            )));
        }

        let labels = Self::labels(&event);
        match event.kind {
            MetricKind::Counter => {
                metrics::counter!(event.name, labels).increment(event.value as u64)
            }
            MetricKind::Gauge => metrics::gauge!(event.name, labels).set(event.value),
            MetricKind::Timer => metrics::histogram!(event.name, labels).record(event.value),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::names;
    use metrics::{
        Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata,
        Recorder, SharedString, Unit,
    };
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Increment(u64),
        Set(f64),
        Record(f64),
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Recorded {
        name: String,
        labels: Vec<(String, String)>,
        op: Op,
    }

    type Log = Arc<Mutex<Vec<Recorded>>>;

    struct Handle {
        name: String,
        labels: Vec<(String, String)>,
        log: Log,
    }

    impl Handle {
        fn push(&self, op: Op) {
            self.log.lock().unwrap().push(Recorded {
                name: self.name.clone(),
                labels: self.labels.clone(),
                op,
            });
        }
    }

    impl CounterFn for Handle {
        fn increment(&self, value: u64) {
            self.push(Op::Increment(value));
        }

        fn absolute(&self, _value: u64) {}
    }

    impl GaugeFn for Handle {
        fn increment(&self, _value: f64) {}

        fn decrement(&self, _value: f64) {}

        fn set(&self, value: f64) {
            self.push(Op::Set(value));
        }
    }

    impl HistogramFn for Handle {
        fn record(&self, value: f64) {
            self.push(Op::Record(value));
        }
    }

    #[derive(Default)]
    struct CapturingRecorder {
        log: Log,
    }

    impl CapturingRecorder {
        fn handle(&self, key: &Key) -> Arc<Handle> {
            Arc::new(Handle {
                name: key.name().to_string(),
                labels: key
                    .labels()
                    .map(|l| (l.key().to_string(), l.value().to_string()))
                    .collect(),
                log: self.log.clone(),
            })
        }

        fn recorded(&self) -> Vec<Recorded> {
            self.log.lock().unwrap().clone()
        }
    }

    impl Recorder for CapturingRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            Counter::from_arc(self.handle(key))
        }

        fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::from_arc(self.handle(key))
        }

        fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::from_arc(self.handle(key))
        }
    }

    fn actor_labels() -> Vec<(String, String)> {
        vec![
            ("actor_path".to_string(), "user/a".to_string()),
            ("env".to_string(), "prod".to_string()),
        ]
    }

    #[test]
    fn test_labels_follow_tags() {
        let event = MetricEvent::counter(names::ACTOR_CREATED, 1)
            .with_actor("user/a")
            .with_tag("env", "prod");
        let labels = MetricsFacadeBackend::labels(&event);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].key(), "actor_path");
        assert_eq!(labels[0].value(), "user/a");
        assert_eq!(labels[1].key(), "env");
    }

    #[test]
    fn test_record_reaches_recorder() {
        let recorder = CapturingRecorder::default();
        let backend = MetricsFacadeBackend::new();

        metrics::with_local_recorder(&recorder, || {
            for event in [
                MetricEvent::counter(names::ACTOR_CREATED, 1),
                MetricEvent::gauge(names::ACTOR_ACTIVE, 3.0),
                MetricEvent::timer(names::MAILBOX_TIME, Duration::from_millis(250)),
            ] {
                backend
                    .record(event.with_actor("user/a").with_tag("env", "prod"))
                    .unwrap();
            }
        });

        assert_eq!(
            recorder.recorded(),
            vec![
                Recorded {
                    name: names::ACTOR_CREATED.to_string(),
                    labels: actor_labels(),
                    op: Op::Increment(1),
                },
                Recorded {
                    name: names::ACTOR_ACTIVE.to_string(),
                    labels: actor_labels(),
                    op: Op::Set(3.0),
                },
                Recorded {
                    name: names::MAILBOX_TIME.to_string(),
                    labels: actor_labels(),
                    op: Op::Record(0.25),
                },
            ]
        );
    }

    #[test]
    fn test_rejects_non_finite() {
        let recorder = CapturingRecorder::default();
        let backend = MetricsFacadeBackend::new();
        let err = metrics::with_local_recorder(&recorder, || {
            backend
                .record(MetricEvent::gauge(names::ACTOR_ACTIVE, f64::NAN))
                .unwrap_err()
        });
        assert!(matches!(err, BackendError::Rejected(_)));
        assert!(recorder.recorded().is_empty());
    }
}
