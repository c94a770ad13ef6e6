// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! # actor-metrics: Instrumentation and Metrics for Actor Runtimes
//!
//! `actor-metrics` observes a running actor runtime without touching the
//! actors' own logic. It attaches interception logic to the runtime's
//! lifecycle, dispatch and mailbox extension points, decides per actor path
//! and message type whether to observe, and routes the resulting
//! measurements to a pluggable [`Backend`].
//!
//! ## Features
//!
//! - **Fail-open**: nothing the engine does can fail, block or panic the
//!   instrumented code. Broken backends and bugs drop metrics, never messages.
//! - **Pattern filters**: glob include/exclude lists on actor paths and
//!   message types, compiled once. Exclude always wins.
//! - **Independent toggles**: a master switch and one switch per module, read
//!   from the environment with a property fallback.
//! - **Atomic reconfiguration**: the active [`MetricsRegistry`] is swapped in
//!   one step; readers see the old or the new registry, never a torn one.
//! - **Backends**: in-memory, `log`, the `metrics` facade, a buffered
//!   drop-on-full adapter, and `tracing` behind the `tracing` feature.
//!
//! ## Core Concepts
//!
//! - **[`Agent`]**: bootstraps the enabled modules once per process.
//! - **[`hooks`]**: the functions a runtime calls at its extension points.
//! - **[`InstrumentationModule`]**: one observation category
//!   ([`LifecycleModule`], [`MessageModule`], [`MailboxModule`]).
//! - **[`FilterEngine`]**: decides what is observed.
//! - **[`MetricsRegistry`]**: configuration, backend and modules; [`install`]
//!   makes it active.
//!
//! ## Getting Started
//!
//! ```rust
//! use std::sync::Arc;
//! use actor_metrics::{
//!     hooks, install, Agent, FilterConfig, MemoryBackend, MetricsConfiguration,
//!     MetricsRegistry, Toggles,
//! };
//!
//! # fn main() -> actor_metrics::Result<()> {
//! // 1. Install interception logic, once, at process start.
//! let outcome = Agent::new(Toggles::default()).bootstrap();
//! assert!(outcome.is_installed());
//!
//! // 2. Build and activate a registry.
//! let backend = Arc::new(MemoryBackend::new());
//! let config = MetricsConfiguration::builder()
//!     .common_tag("service", "orders")
//!     .filter(FilterConfig::default().exclude_actor("system/**"))
//!     .build();
//! let mut registry = MetricsRegistry::build(config, backend.clone())?;
//! Agent::wire(&mut registry);
//! install(Some(Arc::new(registry)));
//!
//! // 3. The runtime reports through the hooks.
//! let guard = hooks::track_actor("user/orders");
//! hooks::message_received("user/orders", "PlaceOrder").complete();
//! drop(guard);
//!
//! assert_eq!(backend.count("actor.created"), 1);
//! assert_eq!(backend.count("actor.message.processed"), 1);
//! assert_eq!(backend.count("actor.terminated"), 1);
//!
//! // 4. Disable: hooks stay in place and become inert.
//! install(None);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `tracing`: enables [`TracingBackend`].
//! - `serde`: `Deserialize` for the configuration types and
//!   [`MetricsConfiguration::from_json_str`].

pub mod agent;
pub mod backend;
mod config;
mod error;
mod event;
pub mod filter;
pub mod health;
pub mod hooks;
pub mod module;
mod registry;

pub use agent::{installed, Agent, BootstrapOutcome, Interceptors, Preparation, SkippedModule, Toggles};
pub use backend::{
    Backend, BackendError, BufferedBackend, LogBackend, MemoryBackend, MetricsFacadeBackend,
};
#[cfg(feature = "tracing")]
pub use backend::TracingBackend;
pub use config::{FailedMessagePolicy, MetricsConfiguration, MetricsConfigurationBuilder};
pub use error::{ConfigError, Error, Result};
pub use event::{names, tags, MetricEvent, MetricKind, Tags};
pub use filter::{FilterConfig, FilterEngine, Pattern};
pub use health::{classify, HealthStatus, HealthThresholds, MembershipSnapshot};
pub use module::{
    emission_failures, ExtensionPoint, InstallPlan, InstrumentationModule, LifecycleModule,
    LifecycleState, MailboxModule, MessageModule, ModuleDescriptor, ModuleKind,
    ProcessingOutcome, ProcessingState, ProcessingTimer, RuntimeSupport,
};
pub use registry::{active, global, install, MetricsRegistry, RegistrySlot};
