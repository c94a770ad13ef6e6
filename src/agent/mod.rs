// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Process-start bootstrap.
//!
//! The [`Agent`] reads the enable switches, installs every enabled module
//! into its own scratch [`InstallPlan`], and publishes the merged result
//! once. The published [`Interceptors`] are reachable from every thread and
//! task through [`installed`] and the functions in [`hooks`](crate::hooks).
//!
//! Bootstrap never fails the host:
//!
//! - master switch off: nothing is installed, every hook is a no-op;
//! - a module fails to install: it is logged and skipped, the others install;
//! - anything else goes wrong: it is logged and bootstrap aborts with no
//!   instrumentation installed.
//!
//! ```rust,no_run
//! use actor_metrics::{Agent, BootstrapOutcome};
//!
//! match Agent::from_env().bootstrap() {
//!     BootstrapOutcome::Installed { modules, .. } => println!("installed {modules:?}"),
//!     other => println!("no instrumentation: {other:?}"),
//! }
//! ```

mod interceptors;
mod toggles;

pub use interceptors::{Interceptors, LifecycleGuard, SkippedModule};
pub use toggles::{
    module_env_key, module_property_key, parse_flag, Toggles, MASTER_ENV, MASTER_PROPERTY,
};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use log::{debug, error, info, warn};

use crate::error::Error;
use crate::module::{
    panic_message, InstallPlan, InstrumentationModule, LifecycleModule, MailboxModule,
    MessageModule, ModuleKind, RuntimeSupport,
};
use crate::registry::{self, MetricsRegistry, RegistrySlot};

/// Result of [`Agent::bootstrap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The master switch is off; nothing was installed
    Disabled,
    /// Interception logic was published
    Installed {
        /// Installed module ids, in table order
        modules: Vec<&'static str>,
        /// Enabled modules that failed to install
        skipped: Vec<SkippedModule>,
    },
    /// An unexpected failure stopped bootstrap; nothing was installed
    Aborted {
        /// Logged cause
        reason: String,
    },
    /// Bootstrap already ran in this process
    AlreadyBootstrapped,
}

impl BootstrapOutcome {
    /// Whether interception logic was published by this call.
    pub fn is_installed(&self) -> bool {
        matches!(self, BootstrapOutcome::Installed { .. })
    }
}

/// Result of [`Agent::prepare`].
#[derive(Debug)]
pub enum Preparation {
    /// The master switch is off
    Disabled,
    /// Interceptors ready to publish
    Ready(Interceptors),
}

/// Installs the enabled instrumentation modules once per process.
#[derive(Debug, Clone)]
pub struct Agent {
    toggles: Toggles,
    support: RuntimeSupport,
    slot: &'static RegistrySlot,
}

impl Agent {
    /// Agent reading its switches from the process environment.
    pub fn from_env() -> Self {
        Self::new(Toggles::from_env())
    }

    /// Agent reading the given switches. The runtime is assumed to expose
    /// every extension point and modules publish to the process-wide slot.
    pub fn new(toggles: Toggles) -> Self {
        Self {
            toggles,
            support: RuntimeSupport::all(),
            slot: registry::global(),
        }
    }

    /// Declares the extension points the host runtime exposes.
    pub fn with_runtime_support(mut self, support: RuntimeSupport) -> Self {
        self.support = support;
        self
    }

    /// Publishes to `slot` instead of the process-wide slot.
    pub fn with_slot(mut self, slot: &'static RegistrySlot) -> Self {
        self.slot = slot;
        self
    }

    /// Builds the interceptors without publishing them.
    ///
    /// Each enabled module installs into a scratch plan; a module that
    /// returns an error or panics is logged and skipped.
    pub fn prepare(&self) -> Preparation {
        if !self.toggles.master_enabled() {
            return Preparation::Disabled;
        }

        let mut interceptors = Interceptors::new(self.slot, self.support);
        for kind in ModuleKind::ALL {
            let descriptor = kind.descriptor();
            if !self.toggles.module_enabled(descriptor) {
                debug!("Module {kind} disabled by switch");
                continue;
            }
            match kind {
                ModuleKind::Lifecycle => {
                    let module = Arc::new(LifecycleModule::new());
                    if let Some(plan) = self.try_install(module.as_ref(), &mut interceptors) {
                        interceptors.set_lifecycle(module, plan);
                    }
                }
                ModuleKind::MessageProcessing => {
                    let module = Arc::new(MessageModule::new());
                    if let Some(plan) = self.try_install(module.as_ref(), &mut interceptors) {
                        interceptors.set_message(module, plan);
                    }
                }
                ModuleKind::Mailbox => {
                    let module = Arc::new(MailboxModule::new());
                    if let Some(plan) = self.try_install(module.as_ref(), &mut interceptors) {
                        interceptors.set_mailbox(module, plan);
                    }
                }
            }
        }
        Preparation::Ready(interceptors)
    }

    fn try_install(
        &self,
        module: &dyn InstrumentationModule,
        interceptors: &mut Interceptors,
    ) -> Option<InstallPlan> {
        let mut plan = InstallPlan::new(self.support);
        let reason = match catch_unwind(AssertUnwindSafe(|| module.install(&mut plan))) {
            Ok(Ok(())) => return Some(plan),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => Error::Installation {
                module: module.id(),
                reason: format!("panicked: {}", panic_message(panic.as_ref())),
            }
            .to_string(),
        };
        warn!("Skipping module {}: {reason}", module.id());
        interceptors.skip(module.id(), reason);
        None
    }

    /// Runs bootstrap. Only the first call in a process has any effect.
    pub fn bootstrap(self) -> BootstrapOutcome {
        publish(&BOOTSTRAPPED, &INSTALLED, || self.prepare())
    }

    /// Registers the modules installed by bootstrap into `registry`.
    ///
    /// Returns the number of modules registered.
    pub fn wire(registry: &mut MetricsRegistry) -> usize {
        match installed() {
            Some(interceptors) => {
                interceptors.wire(registry);
                interceptors.installed_modules().len()
            }
            None => 0,
        }
    }
}

static BOOTSTRAPPED: AtomicBool = AtomicBool::new(false);
static INSTALLED: OnceLock<Arc<Interceptors>> = OnceLock::new();

/// The interceptors published by bootstrap, if it installed anything.
#[inline]
pub fn installed() -> Option<&'static Arc<Interceptors>> {
    INSTALLED.get()
}

fn publish(
    started: &AtomicBool,
    cell: &OnceLock<Arc<Interceptors>>,
    prepare: impl FnOnce() -> Preparation,
) -> BootstrapOutcome {
    if started.swap(true, Ordering::AcqRel) {
        debug!("Bootstrap already ran");
        return BootstrapOutcome::AlreadyBootstrapped;
    }

    match catch_unwind(AssertUnwindSafe(prepare)) {
        Ok(Preparation::Disabled) => {
            info!("Actor metrics disabled; no instrumentation installed");
            BootstrapOutcome::Disabled
        }
        Ok(Preparation::Ready(interceptors)) => {
            let modules = interceptors.installed_modules();
            let skipped = interceptors.skipped().to_vec();
            if cell.set(Arc::new(interceptors)).is_err() {
                return BootstrapOutcome::AlreadyBootstrapped;
            }
            info!(
                "Actor metrics installed: modules={modules:?} skipped={}",
                skipped.len()
            );
            BootstrapOutcome::Installed { modules, skipped }
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!("Actor metrics bootstrap aborted, no instrumentation installed: {reason}");
            BootstrapOutcome::Aborted { reason }
        }
    }
}
