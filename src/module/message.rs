// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::time::Instant;

use log::trace;

use super::{contained, ExtensionPoint, InstallPlan, InstrumentationModule, ModuleDescriptor};
use crate::config::FailedMessagePolicy;
use crate::error::Result;
use crate::event::{names, MetricEvent};
use crate::registry::{MetricsRegistry, RegistrySlot};

pub(crate) static DESCRIPTOR: ModuleDescriptor =
    ModuleDescriptor::new("message-processing", true);

/// States of one processing attempt: `Received → Processing → {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    /// The message was handed to the actor
    Received,
    /// The handler is running
    Processing,
    /// The handler finished successfully
    Completed,
    /// The handler returned an error, panicked or was cancelled
    Failed,
}

impl ProcessingState {
    /// Returns true for `Completed` and `Failed`.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Completed | ProcessingState::Failed)
    }
}

/// Terminal outcome of a processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// The handler finished successfully
    Completed,
    /// The handler failed
    Failed,
}

/// Times message handling and counts its outcomes.
///
/// Counters follow the registry's [`FailedMessagePolicy`]: by default every
/// attempt increments `actor.message.processed` and a failure additionally
/// increments `actor.message.failed`.
#[derive(Debug, Default)]
pub struct MessageModule {
    _private: (),
}

impl MessageModule {
    /// Creates the module.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts observing one message received by the actor at `path`.
    ///
    /// The returned timer is inert when no registry is installed or the
    /// actor or message type is filtered out.
    pub fn on_received<'a>(
        &self,
        slot: &'a RegistrySlot,
        path: &'a str,
        message_type: &'a str,
    ) -> ProcessingTimer<'a> {
        let observed = slot
            .with_active(|registry| observes(registry, path, message_type))
            .unwrap_or(false);
        if !observed {
            return ProcessingTimer::inert();
        }
        ProcessingTimer {
            target: Some(Target {
                slot,
                path,
                message_type,
                started: Instant::now(),
            }),
            state: ProcessingState::Received,
        }
    }
}

fn observes(registry: &MetricsRegistry, path: &str, message_type: &str) -> bool {
    let filter = registry.filter();
    let observed =
        registry.is_enabled() && filter.matches_actor(path) && filter.matches_message(message_type);
    if !observed {
        trace!("Message {message_type} for {path} filtered out");
    }
    observed
}

impl InstrumentationModule for MessageModule {
    fn descriptor(&self) -> &'static ModuleDescriptor {
        &DESCRIPTOR
    }

    fn install(&self, plan: &mut InstallPlan) -> Result<()> {
        plan.attach(ExtensionPoint::MessageDispatch, DESCRIPTOR.id())
    }
}

#[derive(Debug)]
struct Target<'a> {
    slot: &'a RegistrySlot,
    path: &'a str,
    message_type: &'a str,
    started: Instant,
}

/// RAII timer for one processing attempt.
///
/// Call [`complete`](Self::complete) or [`fail`](Self::fail) when the handler
/// finishes. A timer dropped before reaching a terminal state records
/// `Failed`, so a panicking or cancelled handler is still counted.
///
/// ```rust,ignore
/// let timer = hooks::message_received("user/orders", "PlaceOrder");
/// match handler.handle(msg).await {
///     Ok(_) => timer.complete(),
///     Err(_) => timer.fail(),
/// }
/// ```
#[derive(Debug)]
#[must_use = "dropping the timer immediately records a failed attempt"]
pub struct ProcessingTimer<'a> {
    target: Option<Target<'a>>,
    state: ProcessingState,
}

impl<'a> ProcessingTimer<'a> {
    /// A timer that records nothing.
    pub fn inert() -> Self {
        Self {
            target: None,
            state: ProcessingState::Received,
        }
    }

    /// Whether this attempt will produce metrics.
    pub fn is_observed(&self) -> bool {
        self.target.is_some()
    }

    /// Current state.
    pub fn state(&self) -> ProcessingState {
        self.state
    }

    /// Marks the handler as running.
    pub fn processing(&mut self) {
        if self.state == ProcessingState::Received {
            self.state = ProcessingState::Processing;
        }
    }

    /// Records a successful attempt.
    pub fn complete(mut self) {
        self.finish(ProcessingOutcome::Completed);
    }

    /// Records a failed attempt.
    pub fn fail(mut self) {
        self.finish(ProcessingOutcome::Failed);
    }

    /// Records `outcome`.
    pub fn finish_with(mut self, outcome: ProcessingOutcome) {
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: ProcessingOutcome) {
        if self.state.is_terminal() {
            return;
        }
        self.state = match outcome {
            ProcessingOutcome::Completed => ProcessingState::Completed,
            ProcessingOutcome::Failed => ProcessingState::Failed,
        };
        let Some(target) = self.target.take() else {
            return;
        };
        let elapsed = target.started.elapsed();

        target.slot.with_active(|registry| {
            // The registry may have been replaced since the message was received.
            if !observes(registry, target.path, target.message_type) {
                return;
            }
            contained(DESCRIPTOR.id(), || {
                let tagged = |event: MetricEvent| {
                    event
                        .with_actor(target.path)
                        .with_message_type(target.message_type)
                };
                let counts_processed = match outcome {
                    ProcessingOutcome::Completed => true,
                    ProcessingOutcome::Failed => {
                        registry.configuration().failed_message_policy()
                            == FailedMessagePolicy::CountAsProcessed
                    }
                };
                if counts_processed {
                    registry.emit(tagged(MetricEvent::counter(names::MESSAGE_PROCESSED, 1)));
                }
                if outcome == ProcessingOutcome::Failed {
                    registry.emit(tagged(MetricEvent::counter(names::MESSAGE_FAILED, 1)));
                }
                registry.emit(tagged(MetricEvent::timer(
                    names::MESSAGE_PROCESSING_TIME,
                    elapsed,
                )));
            });
        });
    }
}

impl Drop for ProcessingTimer<'_> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.finish(ProcessingOutcome::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::MetricsConfiguration;
    use crate::event::tags;
    use crate::filter::FilterConfig;
    use std::sync::Arc;

    fn install(slot: &RegistrySlot, config: MetricsConfiguration) -> Arc<MemoryBackend> {
        let memory = Arc::new(MemoryBackend::new());
        let registry = MetricsRegistry::build(config, memory.clone()).unwrap();
        slot.install(Some(Arc::new(registry)));
        memory
    }

    #[test]
    fn test_completed_attempt() {
        let slot = RegistrySlot::new();
        let memory = install(&slot, MetricsConfiguration::default());
        let module = MessageModule::new();

        let mut timer = module.on_received(&slot, "user/orders", "PlaceOrder");
        assert!(timer.is_observed());
        timer.processing();
        assert_eq!(timer.state(), ProcessingState::Processing);
        timer.complete();

        assert_eq!(memory.count(names::MESSAGE_PROCESSED), 1);
        assert_eq!(memory.count(names::MESSAGE_FAILED), 0);
        let timers = memory.events_named(names::MESSAGE_PROCESSING_TIME);
        assert_eq!(timers.len(), 1);
        assert!(timers[0].value >= 0.0);
        assert_eq!(timers[0].tag(tags::ACTOR_PATH), Some("user/orders"));
        assert_eq!(timers[0].tag(tags::MESSAGE_TYPE), Some("PlaceOrder"));
    }

    #[test]
    fn test_failed_counts_as_processed_by_default() {
        let slot = RegistrySlot::new();
        let memory = install(&slot, MetricsConfiguration::default());
        let module = MessageModule::new();

        module.on_received(&slot, "user/a", "Ping").fail();

        assert_eq!(memory.count(names::MESSAGE_PROCESSED), 1);
        assert_eq!(memory.count(names::MESSAGE_FAILED), 1);
        assert_eq!(memory.count(names::MESSAGE_PROCESSING_TIME), 1);
    }

    #[test]
    fn test_failed_only_policy() {
        let slot = RegistrySlot::new();
        let config = MetricsConfiguration::builder()
            .failed_message_policy(FailedMessagePolicy::FailedOnly)
            .build();
        let memory = install(&slot, config);
        let module = MessageModule::new();

        module.on_received(&slot, "user/a", "Ping").fail();
        module.on_received(&slot, "user/a", "Ping").complete();

        assert_eq!(memory.count(names::MESSAGE_PROCESSED), 1);
        assert_eq!(memory.count(names::MESSAGE_FAILED), 1);
    }

    #[test]
    fn test_dropped_timer_records_failure() {
        let slot = RegistrySlot::new();
        let memory = install(&slot, MetricsConfiguration::default());
        let module = MessageModule::new();

        {
            let _timer = module.on_received(&slot, "user/a", "Ping");
        }

        assert_eq!(memory.count(names::MESSAGE_FAILED), 1);
        assert_eq!(memory.count(names::MESSAGE_PROCESSED), 1);
    }

    #[test]
    fn test_filtered_message_type_is_inert() {
        let slot = RegistrySlot::new();
        let config = MetricsConfiguration::builder()
            .filter(FilterConfig::default().exclude_message("Heartbeat*"))
            .build();
        let memory = install(&slot, config);
        let module = MessageModule::new();

        let timer = module.on_received(&slot, "user/a", "HeartbeatTick");
        assert!(!timer.is_observed());
        timer.complete();

        module.on_received(&slot, "user/a", "Ping").complete();
        assert_eq!(memory.count(names::MESSAGE_PROCESSED), 1);
    }

    #[test]
    fn test_registry_cleared_mid_flight() {
        let slot = RegistrySlot::new();
        let memory = install(&slot, MetricsConfiguration::default());
        let module = MessageModule::new();

        let timer = module.on_received(&slot, "user/a", "Ping");
        slot.install(None);
        timer.complete();

        assert!(memory.is_empty());
    }

    #[test]
    fn test_no_registry_is_inert() {
        let slot = RegistrySlot::new();
        let module = MessageModule::new();
        let timer = module.on_received(&slot, "user/a", "Ping");
        assert!(!timer.is_observed());
    }

    #[test]
    fn test_finish_with_outcome() {
        let slot = RegistrySlot::new();
        let memory = install(&slot, MetricsConfiguration::default());
        let module = MessageModule::new();

        module
            .on_received(&slot, "user/a", "Ping")
            .finish_with(ProcessingOutcome::Failed);
        assert_eq!(memory.count(names::MESSAGE_FAILED), 1);
    }
}
