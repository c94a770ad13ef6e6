// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use super::{Backend, BackendError};
use crate::event::MetricEvent;

/// Backend emitting one structured `tracing` event per metric.
///
/// ```text
/// INFO actor_metrics::backend::tracer: metric metric.kind="counter"
///   metric.name="actor.created" metric.value=1.0 metric.tags=actor_path=user/a
/// ```
#[derive(Debug, Clone, Default)]
pub struct TracingBackend {
    _private: (),
}

impl TracingBackend {
    /// Creates the adapter.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for TracingBackend {
    fn record(&self, event: MetricEvent) -> Result<(), BackendError> {
        let tags = event
            .tags
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");

        tracing::info!(
            metric.kind = event.kind.as_str(),
            metric.name = event.name,
            metric.value = event.value,
            metric.tags = %tags,
            "metric"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::names;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_record_with_subscriber() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let backend = TracingBackend::new();
            backend
                .record(MetricEvent::counter(names::ACTOR_CREATED, 1).with_actor("user/a"))
                .unwrap();
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("metric.kind=\"counter\""), "{output}");
        assert!(output.contains("metric.name=\"actor.created\""), "{output}");
        assert!(output.contains("metric.value=1"), "{output}");
        assert!(output.contains("metric.tags=actor_path=user/a"), "{output}");
    }
}
