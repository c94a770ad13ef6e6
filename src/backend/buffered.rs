// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::{Backend, BackendError};
use crate::error::{ConfigError, Result};
use crate::event::MetricEvent;

/// Buffer-and-drop adapter in front of another [`Backend`].
///
/// [`record`](Backend::record) only performs a non-blocking `try_send` into a
/// bounded channel; a Tokio task drains the channel into the wrapped backend.
/// When the buffer is full the event is dropped, counted, and
/// [`BackendError::Full`] is returned.
///
/// The forwarding task ends once every clone of the adapter is dropped and
/// the buffer is drained. The caller owns the returned [`JoinHandle`].
#[derive(Debug, Clone)]
pub struct BufferedBackend {
    sender: mpsc::Sender<MetricEvent>,
    dropped: Arc<AtomicU64>,
}

impl BufferedBackend {
    /// Default number of buffered events.
    pub const DEFAULT_CAPACITY: usize = 4096;

    /// Spawns the forwarding task on the current Tokio runtime.
    ///
    /// Fails with [`ConfigError::InvalidValue`] when `capacity` is zero or when
    /// no Tokio runtime is running on this thread.
    pub fn spawn<B: Backend>(inner: B, capacity: usize) -> Result<(Self, JoinHandle<()>)> {
        if capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "buffer capacity".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let runtime = Handle::try_current().map_err(|e| ConfigError::InvalidValue {
            key: "tokio runtime".to_string(),
            value: e.to_string(),
        })?;

        let (sender, mut receiver) = mpsc::channel::<MetricEvent>(capacity);
        let handle = runtime.spawn(async move {
            let mut failures: u64 = 0;
            while let Some(event) = receiver.recv().await {
                if let Err(e) = inner.record(event) {
                    failures += 1;
                    warn!("Buffered backend: inner sink failed ({failures} so far): {e}");
                }
            }
            debug!("Buffered backend forwarding task finished");
        });

        Ok((
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            handle,
        ))
    }

    /// Number of events dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Backend for BufferedBackend {
    fn record(&self, event: MetricEvent) -> std::result::Result<(), BackendError> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(BackendError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(BackendError::Closed),
        }
    }
}
