// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Backend adapters.
//!
//! A [`Backend`] receives [`MetricEvent`]s from the registry and forwards them
//! to an external sink. It is called inline on instrumented threads, so an
//! implementation must be safe for concurrent use and must never block for an
//! unbounded time. Backpressure belongs to the adapter: buffer and drop, or
//! flush asynchronously.
//!
//! The registry never starts or stops a backend. Whoever builds one owns its
//! resources.
//!
//! Provided adapters:
//!
//! - [`BufferedBackend`]: bounded channel in front of any other backend,
//!   drained by a Tokio task; drops when full.
//! - [`MetricsFacadeBackend`]: forwards to the `metrics` crate facade.
//! - [`LogBackend`]: writes one `log` record per event.
//! - [`MemoryBackend`]: keeps events in memory.
//! - `TracingBackend` (feature `tracing`): structured `tracing` events.

mod buffered;
mod facade;
mod logger;
mod memory;
#[cfg(feature = "tracing")]
mod tracer;

pub use buffered::BufferedBackend;
pub use facade::MetricsFacadeBackend;
pub use logger::LogBackend;
pub use memory::MemoryBackend;
#[cfg(feature = "tracing")]
pub use tracer::TracingBackend;

use thiserror::Error;

use crate::event::MetricEvent;

/// Failure reported by a [`Backend`].
///
/// The registry drops the event and logs; it never retries on the hot path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The sink refused the event
    #[error("sink rejected metric: {0}")]
    Rejected(String),
    /// The sink is shut down
    #[error("sink is closed")]
    Closed,
    /// The adapter's buffer is full
    #[error("sink buffer is full")]
    Full,
}

/// Consumer of metric events.
pub trait Backend: Send + Sync + 'static {
    /// Forwards one event to the sink.
    ///
    /// Called concurrently from arbitrary threads. Must not block the caller
    /// for an unbounded time.
    fn record(&self, event: MetricEvent) -> Result<(), BackendError>;
}

impl<B: Backend + ?Sized> Backend for std::sync::Arc<B> {
    fn record(&self, event: MetricEvent) -> Result<(), BackendError> {
        (**self).record(event)
    }
}
