// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicI64, Ordering};

use log::{trace, warn};

use super::{contained, ExtensionPoint, InstallPlan, InstrumentationModule, ModuleDescriptor};
use crate::error::Result;
use crate::event::{names, MetricEvent};
use crate::registry::{MetricsRegistry, RegistrySlot};

pub(crate) static DESCRIPTOR: ModuleDescriptor = ModuleDescriptor::new("lifecycle", true);

/// Lifecycle states of an observed actor: `Created → Active → Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// The actor was constructed
    Created,
    /// The actor is processing messages
    Active,
    /// The actor stopped
    Terminated,
}

/// Re-reads of the live count after publishing `actor.active`.
const GAUGE_REFRESH_LIMIT: usize = 8;

/// Counts actor creations and terminations and keeps the `actor.active` gauge.
///
/// The net count (created minus terminated) is a signed lock-free atomic, so a
/// termination that is reported before its creation is still balanced by the
/// creation that follows. The gauge publishes the net count clamped at zero.
#[derive(Debug, Default)]
pub struct LifecycleModule {
    net: AtomicI64,
}

impl LifecycleModule {
    /// Creates the module with a zero live count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of the live-actor gauge.
    pub fn active_count(&self) -> u64 {
        self.net.load(Ordering::SeqCst).max(0) as u64
    }

    /// Handles a transition of the actor at `path`.
    pub fn on_transition(&self, slot: &RegistrySlot, path: &str, state: LifecycleState) {
        match state {
            LifecycleState::Created => self.on_created(slot, path),
            LifecycleState::Active => {}
            LifecycleState::Terminated => self.on_terminated(slot, path),
        }
    }

    /// Emits `actor.created` and raises `actor.active`.
    pub fn on_created(&self, slot: &RegistrySlot, path: &str) {
        slot.with_active(|registry| {
            if !observes(registry, path) {
                return;
            }
            contained(DESCRIPTOR.id(), || {
                self.net.fetch_add(1, Ordering::SeqCst);
                registry.emit(MetricEvent::counter(names::ACTOR_CREATED, 1).with_actor(path));
                self.publish_active(registry, path);
            });
        });
    }

    /// Emits `actor.terminated` and lowers `actor.active`, never below zero.
    pub fn on_terminated(&self, slot: &RegistrySlot, path: &str) {
        slot.with_active(|registry| {
            if !observes(registry, path) {
                return;
            }
            contained(DESCRIPTOR.id(), || {
                let net = self.net.fetch_sub(1, Ordering::SeqCst) - 1;
                if net < 0 {
                    warn!(
                        "Actor {path} terminated without a recorded creation (net {net}); active gauge clamped at zero"
                    );
                }
                registry.emit(MetricEvent::counter(names::ACTOR_TERMINATED, 1).with_actor(path));
                self.publish_active(registry, path);
            });
        });
    }

    /// Emits the current live count, then re-reads it and emits again while
    /// a concurrent transition has changed it, so the last published value
    /// matches the count once transitions stop.
    fn publish_active(&self, registry: &MetricsRegistry, path: &str) {
        let mut sent = self.active_count();
        registry.emit(MetricEvent::gauge(names::ACTOR_ACTIVE, sent as f64).with_actor(path));
        for _ in 0..GAUGE_REFRESH_LIMIT {
            let current = self.active_count();
            if current == sent {
                return;
            }
            sent = current;
            registry.emit(MetricEvent::gauge(names::ACTOR_ACTIVE, sent as f64).with_actor(path));
        }
    }
}

fn observes(registry: &MetricsRegistry, path: &str) -> bool {
    let observed = registry.is_enabled() && registry.filter().matches_actor(path);
    if !observed {
        trace!("Lifecycle event for {path} filtered out");
    }
    observed
}

impl InstrumentationModule for LifecycleModule {
    fn descriptor(&self) -> &'static ModuleDescriptor {
        &DESCRIPTOR
    }

    fn install(&self, plan: &mut InstallPlan) -> Result<()> {
        plan.attach(ExtensionPoint::ActorConstruction, DESCRIPTOR.id())?;
        plan.attach(ExtensionPoint::ActorTermination, DESCRIPTOR.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::MetricsConfiguration;
    use crate::event::tags;
    use crate::filter::FilterConfig;
    use crate::module::RuntimeSupport;
    use std::sync::Arc;

    fn install(slot: &RegistrySlot, filter: FilterConfig) -> Arc<MemoryBackend> {
        let memory = Arc::new(MemoryBackend::new());
        let config = MetricsConfiguration::builder().filter(filter).build();
        let registry = MetricsRegistry::build(config, memory.clone()).unwrap();
        slot.install(Some(Arc::new(registry)));
        memory
    }

    #[test]
    fn test_create_and_terminate() {
        let slot = RegistrySlot::new();
        let memory = install(&slot, FilterConfig::default());
        let module = LifecycleModule::new();

        module.on_created(&slot, "user/a");
        module.on_created(&slot, "user/b");
        module.on_terminated(&slot, "user/a");

        assert_eq!(module.active_count(), 1);
        assert_eq!(memory.count(names::ACTOR_CREATED), 2);
        assert_eq!(memory.count(names::ACTOR_TERMINATED), 1);
        assert_eq!(memory.last_value(names::ACTOR_ACTIVE), Some(1.0));

        let created = memory.events_named(names::ACTOR_CREATED);
        assert_eq!(created[0].tag(tags::ACTOR_PATH), Some("user/a"));
        assert_eq!(created[1].tag(tags::ACTOR_PATH), Some("user/b"));
    }

    #[test]
    fn test_unmatched_termination_is_clamped() {
        let slot = RegistrySlot::new();
        let memory = install(&slot, FilterConfig::default());
        let module = LifecycleModule::new();

        module.on_terminated(&slot, "user/ghost");

        assert_eq!(module.active_count(), 0);
        assert_eq!(memory.count(names::ACTOR_TERMINATED), 1);
        assert_eq!(memory.last_value(names::ACTOR_ACTIVE), Some(0.0));
    }

    #[test]
    fn test_filtered_actor_not_counted() {
        let slot = RegistrySlot::new();
        let memory = install(&slot, FilterConfig::default().exclude_actor("system/**"));
        let module = LifecycleModule::new();

        module.on_created(&slot, "system/logger");
        module.on_created(&slot, "user/a");

        assert_eq!(module.active_count(), 1);
        assert_eq!(memory.count(names::ACTOR_CREATED), 1);
    }

    #[test]
    fn test_no_registry_is_noop() {
        let slot = RegistrySlot::new();
        let module = LifecycleModule::new();
        module.on_created(&slot, "user/a");
        assert_eq!(module.active_count(), 0);
    }

    #[test]
    fn test_transition_dispatch() {
        let slot = RegistrySlot::new();
        let memory = install(&slot, FilterConfig::default());
        let module = LifecycleModule::new();

        module.on_transition(&slot, "user/a", LifecycleState::Created);
        module.on_transition(&slot, "user/a", LifecycleState::Active);
        module.on_transition(&slot, "user/a", LifecycleState::Terminated);

        assert_eq!(memory.count(names::ACTOR_CREATED), 1);
        assert_eq!(memory.count(names::ACTOR_TERMINATED), 1);
        assert_eq!(module.active_count(), 0);
    }

    #[test]
    fn test_concurrent_transitions_never_negative() {
        let slot = Arc::new(RegistrySlot::new());
        let _memory = install(&slot, FilterConfig::default());
        let module = Arc::new(LifecycleModule::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let slot = slot.clone();
                let module = module.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let path = format!("user/{t}-{i}");
                        module.on_created(&slot, &path);
                        module.on_terminated(&slot, &path);
                    }
                    // Unmatched terminations leave the gauge at zero.
                    module.on_terminated(&slot, "user/ghost");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(module.active_count(), 0);
    }

    #[test]
    fn test_termination_before_creation_balances() {
        let slot = RegistrySlot::new();
        let memory = install(&slot, FilterConfig::default());
        let module = LifecycleModule::new();

        module.on_terminated(&slot, "user/a");
        module.on_created(&slot, "user/a");
        assert_eq!(module.active_count(), 0);
        assert_eq!(memory.last_value(names::ACTOR_ACTIVE), Some(0.0));

        module.on_created(&slot, "user/b");
        assert_eq!(module.active_count(), 1);
        module.on_terminated(&slot, "user/b");

        assert_eq!(module.active_count(), 0);
        assert_eq!(memory.last_value(names::ACTOR_ACTIVE), Some(0.0));
        assert_eq!(memory.count(names::ACTOR_CREATED), 2);
        assert_eq!(memory.count(names::ACTOR_TERMINATED), 2);
    }

    #[test]
    fn test_last_published_gauge_matches_count() {
        for _ in 0..50 {
            let slot = Arc::new(RegistrySlot::new());
            let memory = install(&slot, FilterConfig::default());
            let module = Arc::new(LifecycleModule::new());

            let handles: Vec<_> = (0..8)
                .map(|t| {
                    let slot = slot.clone();
                    let module = module.clone();
                    std::thread::spawn(move || {
                        for i in 0..20 {
                            module.on_created(&slot, &format!("user/{t}-{i}"));
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(module.active_count(), 160);
            assert_eq!(memory.last_value(names::ACTOR_ACTIVE), Some(160.0));
        }
    }

    #[test]
    fn test_install_attaches_lifecycle_points() {
        let module = LifecycleModule::new();
        let mut plan = InstallPlan::new(RuntimeSupport::all());
        module.install(&mut plan).unwrap();
        assert_eq!(plan.rules().len(), 2);

        let mut plan =
            InstallPlan::new(RuntimeSupport::all().without(ExtensionPoint::ActorTermination));
        assert!(module.install(&mut plan).is_err());
    }
}
