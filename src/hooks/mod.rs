// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Interception surface called by the host runtime.
//!
//! Every function routes to the interceptors published by
//! [`Agent::bootstrap`](crate::Agent::bootstrap). Before bootstrap, when it
//! was disabled or aborted, or when the relevant module is not installed,
//! each call is a no-op.
//!
//! ```rust,no_run
//! use actor_metrics::hooks;
//!
//! # async fn handle() -> Result<(), std::io::Error> { Ok(()) }
//! # async fn run() -> Result<(), std::io::Error> {
//! let _guard = hooks::track_actor("user/orders");
//! hooks::dispatch("user/orders", "PlaceOrder", handle()).await?;
//! # Ok(())
//! # }
//! ```

mod channel;

pub use channel::{mailbox_channel, MailboxReceiver, MailboxSender};

pub use crate::agent::LifecycleGuard;

use std::future::Future;
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::time::Duration;

use futures::FutureExt;

use crate::agent::installed;
use crate::module::ProcessingTimer;

/// Reports the construction of the actor at `path`.
#[inline]
pub fn actor_created(path: &str) {
    if let Some(interceptors) = installed() {
        interceptors.actor_created(path);
    }
}

/// Reports the termination of the actor at `path`.
#[inline]
pub fn actor_terminated(path: &str) {
    if let Some(interceptors) = installed() {
        interceptors.actor_terminated(path);
    }
}

/// Reports the construction of the actor at `path` and returns a guard that
/// reports its termination when dropped.
pub fn track_actor(path: impl Into<String>) -> LifecycleGuard {
    match installed() {
        Some(interceptors) => interceptors.track_actor(path),
        None => LifecycleGuard::detached(path),
    }
}

/// Starts timing one message of type `message_type` handled by the actor at
/// `path`.
#[inline]
pub fn message_received<'a>(path: &'a str, message_type: &'a str) -> ProcessingTimer<'a> {
    match installed() {
        Some(interceptors) => interceptors.message_received(path, message_type),
        None => ProcessingTimer::inert(),
    }
}

/// Like [`message_received`], naming the message by its Rust type.
#[inline]
pub fn message_received_for<M: ?Sized>(path: &str) -> ProcessingTimer<'_> {
    message_received(path, std::any::type_name::<M>())
}

/// Times `handler` as one message dispatch.
///
/// `Ok` records a completed attempt and `Err` a failed one. A panic inside
/// the handler is recorded as failed and then resumed. Dropping the returned
/// future before it finishes also records a failure.
pub async fn dispatch<F, T, E>(path: &str, message_type: &str, handler: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let timer = message_received(path, message_type);
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(Ok(value)) => {
            timer.complete();
            Ok(value)
        }
        Ok(Err(e)) => {
            timer.fail();
            Err(e)
        }
        Err(panic) => {
            timer.fail();
            resume_unwind(panic)
        }
    }
}

/// Reports a push into the mailbox of the actor at `path`.
#[inline]
pub fn mailbox_enqueued(path: &str, depth: usize) {
    if let Some(interceptors) = installed() {
        interceptors.mailbox_enqueued(path, depth);
    }
}

/// Reports a pop from the mailbox of the actor at `path`.
#[inline]
pub fn mailbox_dequeued(path: &str, depth: usize, waited: Option<Duration>) {
    if let Some(interceptors) = installed() {
        interceptors.mailbox_dequeued(path, depth, waited);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Unit tests never bootstrap, so every hook must be inert.
    #[tokio::test]
    async fn test_hooks_inert_without_bootstrap() {
        actor_created("user/a");
        actor_terminated("user/a");
        mailbox_enqueued("user/a", 1);
        mailbox_dequeued("user/a", 0, Some(Duration::from_millis(1)));

        let guard = track_actor("user/a");
        assert_eq!(guard.path(), "user/a");

        assert!(!message_received("user/a", "Ping").is_observed());
        assert!(!message_received_for::<String>("user/a").is_observed());

        let value: Result<u32, ()> = dispatch("user/a", "Ping", async { Ok(7) }).await;
        assert_eq!(value, Ok(7));
        let failed: Result<(), &str> = dispatch("user/a", "Ping", async { Err("nope") }).await;
        assert_eq!(failed, Err("nope"));
    }
}
