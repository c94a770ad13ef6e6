// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::module::{
    ExtensionPoint, InstallPlan, InstrumentationModule, LifecycleModule, MailboxModule,
    MessageModule, ModuleKind, ProcessingTimer, RuntimeSupport,
};
use crate::registry::{MetricsRegistry, RegistrySlot};

/// A module that was enabled but failed to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedModule {
    /// Module id
    pub id: &'static str,
    /// Logged cause of the failure
    pub reason: String,
}

/// The installed interception logic.
///
/// Holds one instance of each successfully installed module and routes the
/// runtime's extension-point calls to them. Calls for modules that are not
/// installed are no-ops.
pub struct Interceptors {
    slot: &'static RegistrySlot,
    lifecycle: Option<Arc<LifecycleModule>>,
    message: Option<Arc<MessageModule>>,
    mailbox: Option<Arc<MailboxModule>>,
    plan: InstallPlan,
    skipped: Vec<SkippedModule>,
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptors")
            .field("modules", &self.installed_modules())
            .field("rules", &self.plan.rules())
            .field("skipped", &self.skipped)
            .finish()
    }
}

impl Interceptors {
    pub(crate) fn new(slot: &'static RegistrySlot, support: RuntimeSupport) -> Self {
        Self {
            slot,
            lifecycle: None,
            message: None,
            mailbox: None,
            plan: InstallPlan::new(support),
            skipped: Vec::new(),
        }
    }

    pub(crate) fn set_lifecycle(&mut self, module: Arc<LifecycleModule>, plan: InstallPlan) {
        self.plan.merge(plan);
        self.lifecycle = Some(module);
    }

    pub(crate) fn set_message(&mut self, module: Arc<MessageModule>, plan: InstallPlan) {
        self.plan.merge(plan);
        self.message = Some(module);
    }

    pub(crate) fn set_mailbox(&mut self, module: Arc<MailboxModule>, plan: InstallPlan) {
        self.plan.merge(plan);
        self.mailbox = Some(module);
    }

    pub(crate) fn skip(&mut self, id: &'static str, reason: String) {
        self.skipped.push(SkippedModule { id, reason });
    }

    /// Extension points the host runtime exposed at bootstrap.
    pub fn runtime_support(&self) -> RuntimeSupport {
        self.plan.support()
    }

    /// The slot the modules publish to.
    pub fn slot(&self) -> &'static RegistrySlot {
        self.slot
    }

    /// Whether `kind` is installed.
    pub fn is_installed(&self, kind: ModuleKind) -> bool {
        match kind {
            ModuleKind::Lifecycle => self.lifecycle.is_some(),
            ModuleKind::MessageProcessing => self.message.is_some(),
            ModuleKind::Mailbox => self.mailbox.is_some(),
        }
    }

    /// Ids of the installed modules, in table order.
    pub fn installed_modules(&self) -> Vec<&'static str> {
        ModuleKind::ALL
            .into_iter()
            .filter(|kind| self.is_installed(*kind))
            .map(ModuleKind::id)
            .collect()
    }

    /// The installed modules as trait objects, in table order.
    pub fn modules(&self) -> Vec<Arc<dyn InstrumentationModule>> {
        let mut modules: Vec<Arc<dyn InstrumentationModule>> = Vec::new();
        if let Some(m) = &self.lifecycle {
            modules.push(m.clone());
        }
        if let Some(m) = &self.message {
            modules.push(m.clone());
        }
        if let Some(m) = &self.mailbox {
            modules.push(m.clone());
        }
        modules
    }

    /// Merged interception rules.
    pub fn rules(&self) -> &[(ExtensionPoint, &'static str)] {
        self.plan.rules()
    }

    /// Enabled modules that failed to install.
    pub fn skipped(&self) -> &[SkippedModule] {
        &self.skipped
    }

    /// Registers the installed modules into `registry`.
    pub fn wire(&self, registry: &mut MetricsRegistry) {
        for module in self.modules() {
            registry.register_module(module);
        }
    }

    /// Number of live actors seen by the lifecycle module.
    pub fn active_actors(&self) -> u64 {
        self.lifecycle.as_ref().map_or(0, |m| m.active_count())
    }

    /// Actor construction extension point.
    #[inline]
    pub fn actor_created(&self, path: &str) {
        if let Some(module) = &self.lifecycle {
            module.on_created(self.slot, path);
        }
    }

    /// Actor termination extension point.
    #[inline]
    pub fn actor_terminated(&self, path: &str) {
        if let Some(module) = &self.lifecycle {
            module.on_terminated(self.slot, path);
        }
    }

    /// Message dispatch extension point.
    #[inline]
    pub fn message_received<'a>(&'a self, path: &'a str, message_type: &'a str) -> ProcessingTimer<'a> {
        match &self.message {
            Some(module) => module.on_received(self.slot, path, message_type),
            None => ProcessingTimer::inert(),
        }
    }

    /// Mailbox push extension point.
    #[inline]
    pub fn mailbox_enqueued(&self, path: &str, depth: usize) {
        if let Some(module) = &self.mailbox {
            module.on_enqueued(self.slot, path, depth);
        }
    }

    /// Mailbox pop extension point.
    #[inline]
    pub fn mailbox_dequeued(&self, path: &str, depth: usize, waited: Option<Duration>) {
        if let Some(module) = &self.mailbox {
            module.on_dequeued(self.slot, path, depth, waited);
        }
    }

    /// Reports the actor at `path` as created and returns a guard reporting
    /// its termination on drop.
    pub fn track_actor(self: &Arc<Self>, path: impl Into<String>) -> LifecycleGuard {
        let path = path.into();
        self.actor_created(&path);
        LifecycleGuard {
            interceptors: Some(self.clone()),
            path,
        }
    }
}

/// Reports an actor's termination when dropped.
///
/// Keep it in the actor's state so that every exit path, panics included,
/// is observed.
#[derive(Debug)]
pub struct LifecycleGuard {
    interceptors: Option<Arc<Interceptors>>,
    path: String,
}

impl LifecycleGuard {
    /// A guard that reports nothing.
    pub fn detached(path: impl Into<String>) -> Self {
        Self {
            interceptors: None,
            path: path.into(),
        }
    }

    /// Path of the tracked actor.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        if let Some(interceptors) = self.interceptors.take() {
            interceptors.actor_terminated(&self.path);
        }
    }
}
