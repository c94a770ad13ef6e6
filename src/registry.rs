// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Metrics registry and the process-wide active slot.
//!
//! A [`MetricsRegistry`] bundles the host's [`MetricsConfiguration`], the
//! compiled [`FilterEngine`], the [`Backend`] and the set of registered
//! instrumentation modules. At most one registry is *active* per process; it
//! lives in a [`RegistrySlot`] that instrumentation reads on every call.
//!
//! # Init and teardown order
//!
//! 1. Build the backend (the host owns it).
//! 2. [`MetricsRegistry::build`], optionally [`Agent::wire`](crate::Agent::wire) it.
//! 3. [`install`] it. Readers see either the previous registry or the new
//!    one, never a partially built value.
//! 4. To disable, [`install`] `None`. Hooks stay in place and become inert.
//! 5. Shut the backend down after the registry was replaced.
//!
//! Readers never lock: the slot is an [`ArcSwapOption`], and the guard a
//! reader holds keeps a replaced registry alive until the read finishes.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use log::warn;

use crate::backend::Backend;
use crate::config::MetricsConfiguration;
use crate::error::Result;
use crate::event::MetricEvent;
use crate::filter::FilterEngine;
use crate::module::InstrumentationModule;

/// Configuration, backend and registered modules.
pub struct MetricsRegistry {
    configuration: MetricsConfiguration,
    filter: FilterEngine,
    backend: Arc<dyn Backend>,
    modules: Vec<Arc<dyn InstrumentationModule>>,
    dropped: AtomicU64,
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("configuration", &self.configuration)
            .field("modules", &self.module_ids())
            .field("dropped", &self.dropped_events())
            .finish()
    }
}

impl MetricsRegistry {
    /// Compiles the filter of `configuration` and binds `backend`.
    ///
    /// Fails with [`Error::Configuration`](crate::Error::Configuration) if any
    /// filter pattern is invalid.
    pub fn build(configuration: MetricsConfiguration, backend: Arc<dyn Backend>) -> Result<Self> {
        let filter = FilterEngine::build(configuration.filter())?;
        Ok(Self {
            configuration,
            filter,
            backend,
            modules: Vec::new(),
            dropped: AtomicU64::new(0),
        })
    }

    /// Registers `module`, replacing any module with the same id.
    ///
    /// A replaced module keeps its original position; a new id is appended.
    pub fn register_module(&mut self, module: Arc<dyn InstrumentationModule>) {
        let id = module.id();
        match self.modules.iter_mut().find(|m| m.id() == id) {
            Some(existing) => *existing = module,
            None => self.modules.push(module),
        }
    }

    /// Registered modules in registration order.
    pub fn modules(&self) -> &[Arc<dyn InstrumentationModule>] {
        &self.modules
    }

    /// Ids of the registered modules in registration order.
    pub fn module_ids(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.id()).collect()
    }

    /// Returns the module registered under `id`.
    pub fn module(&self, id: &str) -> Option<&Arc<dyn InstrumentationModule>> {
        self.modules.iter().find(|m| m.id() == id)
    }

    /// The configuration this registry was built from.
    pub fn configuration(&self) -> &MetricsConfiguration {
        &self.configuration
    }

    /// The compiled filter.
    pub fn filter(&self) -> &FilterEngine {
        &self.filter
    }

    /// Whether this registry emits anything.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.configuration.enabled()
    }

    /// Number of events the backend failed or refused.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Merges common tags into `event` and hands it to the backend.
    ///
    /// Never fails and never panics: a backend error or panic drops the event.
    pub fn emit(&self, mut event: MetricEvent) {
        if !self.is_enabled() {
            return;
        }
        event.merge_common_tags(self.configuration.common_tags());
        let name = event.name;

        match catch_unwind(AssertUnwindSafe(|| self.backend.record(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.record_drop(name, &e.to_string()),
            Err(_) => self.record_drop(name, "backend panicked"),
        }
    }

    #[cold]
    fn record_drop(&self, name: &'static str, reason: &str) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        // The first drop and every 1000th after it are logged.
        if total == 1 || total % 1000 == 0 {
            warn!(
                "Metric dropped: metric.name={name} drop.reason=\"{reason}\" drop.total={total}"
            );
        }
    }
}

/// Atomically swappable holder of the active [`MetricsRegistry`].
///
/// The process-wide instance is reached through [`install`] and [`active`];
/// separate slots exist for embedding and tests.
#[derive(Debug)]
pub struct RegistrySlot {
    active: ArcSwapOption<MetricsRegistry>,
}

impl Default for RegistrySlot {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrySlot {
    /// An empty slot.
    pub const fn new() -> Self {
        Self {
            active: ArcSwapOption::const_empty(),
        }
    }

    /// Replaces the active registry and returns the previous one.
    pub fn install(
        &self,
        registry: Option<Arc<MetricsRegistry>>,
    ) -> Option<Arc<MetricsRegistry>> {
        self.active.swap(registry)
    }

    /// Returns the active registry.
    pub fn active(&self) -> Option<Arc<MetricsRegistry>> {
        self.active.load_full()
    }

    /// Runs `f` against the active registry, if any, without cloning the `Arc`.
    #[inline]
    pub fn with_active<R>(&self, f: impl FnOnce(&MetricsRegistry) -> R) -> Option<R> {
        let guard = self.active.load();
        guard.as_deref().map(f)
    }

    /// Returns true if a registry is installed.
    pub fn is_installed(&self) -> bool {
        self.active.load().is_some()
    }
}

static ACTIVE: RegistrySlot = RegistrySlot::new();

/// The process-wide slot read by the installed instrumentation.
pub fn global() -> &'static RegistrySlot {
    &ACTIVE
}

/// Installs `registry` as the process-wide active registry, or clears the
/// slot with `None`. Returns the previously active registry.
pub fn install(registry: Option<Arc<MetricsRegistry>>) -> Option<Arc<MetricsRegistry>> {
    let installing = registry.is_some();
    let previous = ACTIVE.install(registry);
    log::info!("{}", install_summary(installing, previous.is_some()));
    previous
}

fn install_summary(installing: bool, replaced: bool) -> String {
    format!(
        "Metrics registry {} (previous: {})",
        if installing { "installed" } else { "cleared" },
        if replaced { "replaced" } else { "none" }
    )
}

/// The process-wide active registry.
pub fn active() -> Option<Arc<MetricsRegistry>> {
    ACTIVE.active()
}
