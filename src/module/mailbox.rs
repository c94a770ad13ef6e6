// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use super::{contained, ExtensionPoint, InstallPlan, InstrumentationModule, ModuleDescriptor};
use crate::error::Result;
use crate::event::{names, MetricEvent};
use crate::registry::RegistrySlot;

pub(crate) static DESCRIPTOR: ModuleDescriptor = ModuleDescriptor::new("mailbox", true);

/// Samples mailbox depth on every push and pop, and the time items wait.
#[derive(Debug, Default)]
pub struct MailboxModule {
    _private: (),
}

impl MailboxModule {
    /// Creates the module.
    pub fn new() -> Self {
        Self::default()
    }

    /// An item was pushed; `depth` is the queue length after the push.
    pub fn on_enqueued(&self, slot: &RegistrySlot, path: &str, depth: usize) {
        self.sample(slot, path, depth, None);
    }

    /// An item was popped after waiting `waited`; `depth` is the queue length
    /// after the pop.
    pub fn on_dequeued(
        &self,
        slot: &RegistrySlot,
        path: &str,
        depth: usize,
        waited: Option<Duration>,
    ) {
        self.sample(slot, path, depth, waited);
    }

    fn sample(&self, slot: &RegistrySlot, path: &str, depth: usize, waited: Option<Duration>) {
        slot.with_active(|registry| {
            if !registry.is_enabled() || !registry.filter().matches_actor(path) {
                return;
            }
            contained(DESCRIPTOR.id(), || {
                registry.emit(MetricEvent::gauge(names::MAILBOX_SIZE, depth as f64).with_actor(path));
                if let Some(waited) = waited {
                    registry.emit(MetricEvent::timer(names::MAILBOX_TIME, waited).with_actor(path));
                }
            });
        });
    }
}

impl InstrumentationModule for MailboxModule {
    fn descriptor(&self) -> &'static ModuleDescriptor {
        &DESCRIPTOR
    }

    fn install(&self, plan: &mut InstallPlan) -> Result<()> {
        plan.attach(ExtensionPoint::MailboxEnqueue, DESCRIPTOR.id())?;
        plan.attach(ExtensionPoint::MailboxDequeue, DESCRIPTOR.id())
    }
}
