// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Instrumentation modules.
//!
//! Each module observes one category of runtime event:
//!
//! | id | module | extension points |
//! |----|--------|------------------|
//! | `lifecycle` | [`LifecycleModule`] | actor construction, actor termination |
//! | `message-processing` | [`MessageModule`] | message dispatch |
//! | `mailbox` | [`MailboxModule`] | mailbox enqueue, mailbox dequeue |
//!
//! The set of modules is fixed at compile time by [`ModuleKind`]. Adding a
//! variant forces every `match` over it, descriptor and instantiation
//! included, to be extended.
//!
//! On every intercepted call a module consults the active registry's
//! [`FilterEngine`](crate::FilterEngine), builds its events and publishes them.
//! Nothing escapes the module boundary: a panic while computing or forwarding
//! a metric is caught, logged and counted (see [`emission_failures`]).

mod lifecycle;
mod mailbox;
mod message;

pub use lifecycle::{LifecycleModule, LifecycleState};
pub use mailbox::MailboxModule;
pub use message::{MessageModule, ProcessingOutcome, ProcessingState, ProcessingTimer};

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use log::warn;

use crate::error::{Error, Result};

/// Static identity of an instrumentation module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleDescriptor {
    id: &'static str,
    default_enabled: bool,
}

impl ModuleDescriptor {
    /// Creates a descriptor. Ids must be unique among known modules.
    pub const fn new(id: &'static str, default_enabled: bool) -> Self {
        Self {
            id,
            default_enabled,
        }
    }

    /// Module id, used for toggles and registry keys.
    pub const fn id(&self) -> &'static str {
        self.id
    }

    /// Whether the module installs when its toggle is unset.
    pub const fn default_enabled(&self) -> bool {
        self.default_enabled
    }
}

/// The built-in modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// Actor creation and termination
    Lifecycle,
    /// Message dispatch timing and outcome
    MessageProcessing,
    /// Mailbox depth and wait time
    Mailbox,
}

impl ModuleKind {
    /// Every known module, in installation order.
    pub const ALL: [ModuleKind; 3] = [
        ModuleKind::Lifecycle,
        ModuleKind::MessageProcessing,
        ModuleKind::Mailbox,
    ];

    /// Descriptor of this module.
    pub fn descriptor(self) -> &'static ModuleDescriptor {
        match self {
            ModuleKind::Lifecycle => &lifecycle::DESCRIPTOR,
            ModuleKind::MessageProcessing => &message::DESCRIPTOR,
            ModuleKind::Mailbox => &mailbox::DESCRIPTOR,
        }
    }

    /// Module id.
    pub fn id(self) -> &'static str {
        self.descriptor().id()
    }

    /// Looks a module up by id.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Descriptors of every known module.
pub fn known_modules() -> impl Iterator<Item = &'static ModuleDescriptor> {
    ModuleKind::ALL.into_iter().map(ModuleKind::descriptor)
}

/// A point in the host runtime where instrumentation can be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionPoint {
    /// An actor instance was constructed
    ActorConstruction,
    /// An actor instance terminated
    ActorTermination,
    /// A message is handed to an actor's handler
    MessageDispatch,
    /// A message is pushed into a mailbox
    MailboxEnqueue,
    /// A message is popped from a mailbox
    MailboxDequeue,
}

impl ExtensionPoint {
    /// Every extension point.
    pub const ALL: [ExtensionPoint; 5] = [
        ExtensionPoint::ActorConstruction,
        ExtensionPoint::ActorTermination,
        ExtensionPoint::MessageDispatch,
        ExtensionPoint::MailboxEnqueue,
        ExtensionPoint::MailboxDequeue,
    ];

    const fn bit(self) -> u8 {
        match self {
            ExtensionPoint::ActorConstruction => 1 << 0,
            ExtensionPoint::ActorTermination => 1 << 1,
            ExtensionPoint::MessageDispatch => 1 << 2,
            ExtensionPoint::MailboxEnqueue => 1 << 3,
            ExtensionPoint::MailboxDequeue => 1 << 4,
        }
    }
}

/// Set of extension points the host runtime exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSupport {
    points: u8,
}

impl Default for RuntimeSupport {
    fn default() -> Self {
        Self::all()
    }
}

impl RuntimeSupport {
    /// Every extension point is available.
    pub const fn all() -> Self {
        let mut points = 0;
        let mut i = 0;
        while i < ExtensionPoint::ALL.len() {
            points |= ExtensionPoint::ALL[i].bit();
            i += 1;
        }
        Self { points }
    }

    /// No extension point is available.
    pub const fn none() -> Self {
        Self { points: 0 }
    }

    /// Adds `point`.
    pub const fn with(self, point: ExtensionPoint) -> Self {
        Self {
            points: self.points | point.bit(),
        }
    }

    /// Removes `point`.
    pub const fn without(self, point: ExtensionPoint) -> Self {
        Self {
            points: self.points & !point.bit(),
        }
    }

    /// Returns true if `point` is available.
    pub const fn supports(&self, point: ExtensionPoint) -> bool {
        self.points & point.bit() != 0
    }
}

/// Interception rules accumulated during bootstrap.
///
/// Modules attach to extension points here. Nothing takes effect until the
/// agent publishes the merged plan in one step.
#[derive(Debug, Clone)]
pub struct InstallPlan {
    support: RuntimeSupport,
    rules: Vec<(ExtensionPoint, &'static str)>,
}

impl InstallPlan {
    /// An empty plan against the given runtime.
    pub fn new(support: RuntimeSupport) -> Self {
        Self {
            support,
            rules: Vec::new(),
        }
    }

    /// Attaches `module` to `point`.
    ///
    /// Fails with [`Error::Installation`] if the runtime does not expose it.
    pub fn attach(&mut self, point: ExtensionPoint, module: &'static str) -> Result<()> {
        if !self.support.supports(point) {
            return Err(Error::Installation {
                module,
                reason: format!("extension point {point:?} is not exposed by the runtime"),
            });
        }
        if !self.rules.contains(&(point, module)) {
            self.rules.push((point, module));
        }
        Ok(())
    }

    /// Rules in attachment order.
    pub fn rules(&self) -> &[(ExtensionPoint, &'static str)] {
        &self.rules
    }

    /// Modules attached to `point`.
    pub fn modules_at(&self, point: ExtensionPoint) -> Vec<&'static str> {
        self.rules
            .iter()
            .filter(|(p, _)| *p == point)
            .map(|(_, m)| *m)
            .collect()
    }

    /// Appends the rules of another plan.
    pub(crate) fn merge(&mut self, other: InstallPlan) {
        for rule in other.rules {
            if !self.rules.contains(&rule) {
                self.rules.push(rule);
            }
        }
    }

    pub(crate) fn support(&self) -> RuntimeSupport {
        self.support
    }
}

/// A unit observing one category of runtime event.
pub trait InstrumentationModule: Send + Sync + 'static {
    /// Static identity of the module.
    fn descriptor(&self) -> &'static ModuleDescriptor;

    /// Module id.
    fn id(&self) -> &'static str {
        self.descriptor().id()
    }

    /// Declares the extension points this module intercepts.
    fn install(&self, plan: &mut InstallPlan) -> Result<()>;
}

static EMISSION_FAILURES: AtomicU64 = AtomicU64::new(0);

/// Number of emissions aborted by an unexpected failure inside a module.
pub fn emission_failures() -> u64 {
    EMISSION_FAILURES.load(Ordering::Relaxed)
}

/// Runs emission logic for `module`, containing any panic at the boundary.
#[inline]
pub(crate) fn contained(module: &'static str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        report_emission_failure(module, panic_message(panic.as_ref()));
    }
}

#[cold]
fn report_emission_failure(module: &'static str, details: String) {
    EMISSION_FAILURES.fetch_add(1, Ordering::Relaxed);
    let error = Error::Emission { module, details };
    warn!("{error}");
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
