use lodge_core::{Descriptor, LifecycleState, Surface};

use crate::error::HostError;
use crate::machine::LifecycleMachine;
use crate::manager::EmbeddedManager;

impl EmbeddedManager {
    /// Start (or re-target) the embedded component `id` with `descriptor`.
    ///
    /// An existing live component is reused when the descriptor resolves to
    /// the same implementation and either the target is single-instance,
    /// the descriptor asks for single-top delivery, or it is the same
    /// request without clear-top. Otherwise the old instance is destroyed
    /// and a new one launched.
    ///
    /// Returns the component's surface, or `None` if it could not be
    /// materialized. Only resolution failures are errors.
    pub fn start(&mut self, id: &str, descriptor: Descriptor) -> Result<Option<Surface>, HostError> {
        if self.host_state == LifecycleState::Initializing {
            return Err(HostError::IllegalHostState {
                operation: "start",
                state: self.host_state,
            });
        }

        let existing = self.store.get(id);
        let same_descriptor = existing
            .and_then(|r| r.descriptor.as_ref())
            .is_some_and(|d| d.filter_equals(&descriptor));
        let cached = existing.and_then(|r| r.resolved_target.clone());
        let resolved = match (&cached, same_descriptor) {
            (Some(target), true) => Some(target.clone()),
            _ => self.resolver.resolve(&descriptor),
        };
        let Some(target) = resolved else {
            tracing::warn!(id, %descriptor, "Descriptor does not resolve");
            return Err(HostError::TargetNotFound {
                id: id.to_string(),
                descriptor: descriptor.to_string(),
            });
        };

        if self.single_resume
            && self.host_state == LifecycleState::Resumed
            && let Some(other) = self.store.resumed_id().filter(|r| *r != id).map(str::to_string)
            && self.state(&other) == Some(LifecycleState::Resumed)
        {
            tracing::debug!(id = %other, "Demoting previously resumed component");
            self.drive(&other, LifecycleState::Started);
        }

        let host_state = self.host_state;
        let machine = LifecycleMachine::new(self.adapter.as_ref(), self.resolver.as_ref(), self.host_finishing);

        if !self.store.contains(id) {
            let record = self.store.new_record(id, Some(descriptor.clone()));
            tracing::info!(id, %target, "Adding component");
            self.store.insert(record);
        } else if let Some(record) = self.store.get_mut(id)
            && record.is_live()
            && let Some(cached) = cached
        {
            if cached == target || cached.same_implementation(&target) {
                let reuse = if !target.launch_mode.allows_multiple() || descriptor.flags.single_top {
                    machine.deliver_new_descriptor(record, &descriptor);
                    true
                } else if same_descriptor && !descriptor.flags.clear_top {
                    tracing::debug!(id, "Same request, refreshing in place");
                    true
                } else {
                    false
                };
                if reuse {
                    record.descriptor = Some(descriptor);
                    machine.move_to_state(record, host_state);
                    let surface = record.surface.clone();
                    if self.single_resume {
                        self.store.set_resumed(Some(id.to_string()));
                    }
                    return Ok(surface);
                }
            }
            tracing::debug!(id, "Replacing live component");
            machine.destroy(record, true);
        }

        let Some(record) = self.store.get_mut(id) else {
            return Ok(None);
        };
        record.descriptor = Some(descriptor);
        record.resolved_target = Some(target);
        record.state = LifecycleState::Initializing;
        machine.move_to_state(record, host_state);
        let surface = record.surface.clone();
        if surface.is_none() {
            tracing::warn!(id, "Component has no surface after start");
        }

        if self.single_resume {
            self.store.set_resumed(Some(id.to_string()));
        }
        Ok(surface)
    }
}
