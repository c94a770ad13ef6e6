// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::{
    self,
    error::{SendError, TryRecvError, TrySendError},
};

use crate::agent::{installed, Interceptors};
use crate::module::ModuleKind;

struct Stamped<T> {
    value: T,
    enqueued_at: Option<Instant>,
}

struct Shared {
    path: String,
    depth: AtomicUsize,
    interceptors: Option<Arc<Interceptors>>,
}

impl Shared {
    fn stamp(&self) -> Option<Instant> {
        self.interceptors
            .as_ref()
            .filter(|i| i.is_installed(ModuleKind::Mailbox))
            .map(|_| Instant::now())
    }

    fn pushed(&self) {
        let depth = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(interceptors) = &self.interceptors {
            interceptors.mailbox_enqueued(&self.path, depth);
        }
    }

    fn popped(&self, enqueued_at: Option<Instant>) {
        let depth = self
            .depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| {
                Some(d.saturating_sub(1))
            })
            .map_or(0, |previous| previous.saturating_sub(1));
        if let Some(interceptors) = &self.interceptors {
            interceptors.mailbox_dequeued(&self.path, depth, enqueued_at.map(|t| t.elapsed()));
        }
    }
}

/// Creates a bounded Tokio mailbox for the actor at `path` that reports its
/// depth and wait times to the mailbox module.
///
/// The channel behaves like [`tokio::sync::mpsc::channel`]. When no
/// interceptors are installed it only keeps its depth counter.
///
/// # Panics
///
/// Panics if `capacity` is zero, like [`tokio::sync::mpsc::channel`].
pub fn mailbox_channel<T>(path: impl Into<String>, capacity: usize) -> (MailboxSender<T>, MailboxReceiver<T>) {
    let (sender, receiver) = mpsc::channel(capacity);
    let shared = Arc::new(Shared {
        path: path.into(),
        depth: AtomicUsize::new(0),
        interceptors: installed().cloned(),
    });
    (
        MailboxSender {
            inner: sender,
            shared: shared.clone(),
        },
        MailboxReceiver {
            inner: receiver,
            shared,
        },
    )
}

/// Sending half of [`mailbox_channel`].
pub struct MailboxSender<T> {
    inner: mpsc::Sender<Stamped<T>>,
    shared: Arc<Shared>,
}

impl<T> Clone for MailboxSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for MailboxSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxSender")
            .field("path", &self.shared.path)
            .field("depth", &self.depth())
            .finish()
    }
}

impl<T> MailboxSender<T> {
    /// Waits for capacity and enqueues `value`.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        let permit = match self.inner.reserve().await {
            Ok(permit) => permit,
            Err(_) => return Err(SendError(value)),
        };
        let enqueued_at = self.shared.stamp();
        self.shared.pushed();
        permit.send(Stamped { value, enqueued_at });
        Ok(())
    }

    /// Enqueues `value` if there is capacity.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let permit = match self.inner.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => return Err(TrySendError::Full(value)),
            Err(TrySendError::Closed(())) => return Err(TrySendError::Closed(value)),
        };
        let enqueued_at = self.shared.stamp();
        self.shared.pushed();
        permit.send(Stamped { value, enqueued_at });
        Ok(())
    }

    /// Items currently queued.
    pub fn depth(&self) -> usize {
        self.shared.depth.load(Ordering::Acquire)
    }

    /// Path of the owning actor.
    pub fn path(&self) -> &str {
        &self.shared.path
    }

    /// Returns true once the receiver is dropped or closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Receiving half of [`mailbox_channel`].
pub struct MailboxReceiver<T> {
    inner: mpsc::Receiver<Stamped<T>>,
    shared: Arc<Shared>,
}

impl<T> fmt::Debug for MailboxReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxReceiver")
            .field("path", &self.shared.path)
            .field("depth", &self.depth())
            .finish()
    }
}

impl<T> MailboxReceiver<T> {
    /// Waits for the next item. `None` once every sender is gone and the
    /// mailbox is empty.
    pub async fn recv(&mut self) -> Option<T> {
        let item = self.inner.recv().await?;
        self.shared.popped(item.enqueued_at);
        Some(item.value)
    }

    /// Takes the next item if one is queued.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        let item = self.inner.try_recv()?;
        self.shared.popped(item.enqueued_at);
        Ok(item.value)
    }

    /// Stops accepting new items. Queued items can still be received.
    pub fn close(&mut self) {
        self.inner.close();
    }

    /// Items currently queued.
    pub fn depth(&self) -> usize {
        self.shared.depth.load(Ordering::Acquire)
    }

    /// Path of the owning actor.
    pub fn path(&self) -> &str {
        &self.shared.path
    }
}
