use lodge_core::{Descriptor, LifecycleState, Surface};
use lodge_runtime::{AdapterError, LaunchSpec, PendingStart, Resolver, RuntimeAdapter};

use crate::record::ComponentRecord;

/// Transition engine for a single record.
///
/// Adapter failures are absorbed here: they are logged and the record stays
/// at the last state the platform confirmed.
pub(crate) struct LifecycleMachine<'a> {
    adapter: &'a dyn RuntimeAdapter,
    resolver: &'a dyn Resolver,
    host_finishing: bool,
}

impl<'a> LifecycleMachine<'a> {
    pub(crate) fn new(
        adapter: &'a dyn RuntimeAdapter,
        resolver: &'a dyn Resolver,
        host_finishing: bool,
    ) -> Self {
        Self {
            adapter,
            resolver,
            host_finishing,
        }
    }

    /// Advance or regress `record` toward `desired`.
    ///
    /// Only `Created`, `Started` and `Resumed` are valid targets. Records
    /// that were never started, or are destroyed, are left alone.
    pub(crate) fn move_to_state(&self, record: &mut ComponentRecord, desired: LifecycleState) {
        if record.state.is_inert() {
            return;
        }
        if !desired.is_drivable_target() {
            tracing::debug!(id = record.id(), %desired, "Not a lifecycle target, ignoring");
            return;
        }
        if record.state == LifecycleState::Initializing {
            self.materialize(record, desired);
            return;
        }

        let from = record.state;
        let token = record.token();
        let step = match (from, desired) {
            (LifecycleState::Created, LifecycleState::Started) => {
                tracing::debug!(id = record.id(), "Restarting");
                self.adapter
                    .restart(token, true)
                    .map(|()| record.state = LifecycleState::Started)
            }
            (LifecycleState::Created, LifecycleState::Resumed) => {
                tracing::debug!(id = record.id(), "Restarting and resuming");
                self.adapter.restart(token, true).and_then(|()| {
                    record.state = LifecycleState::Started;
                    self.adapter.resume(token, true, "move_to_state-created")?;
                    record.state = LifecycleState::Resumed;
                    Ok(())
                })
            }
            (LifecycleState::Started, LifecycleState::Resumed) => {
                tracing::debug!(id = record.id(), "Resuming");
                self.adapter
                    .resume(token, true, "move_to_state-started")
                    .map(|()| {
                        record.saved_state = None;
                        record.state = LifecycleState::Resumed;
                    })
            }
            (LifecycleState::Started, LifecycleState::Created) => {
                tracing::debug!(id = record.id(), "Stopping");
                self.adapter
                    .stop(token, false, "move_to_state-started")
                    .map(|()| record.state = LifecycleState::Created)
            }
            (LifecycleState::Resumed, LifecycleState::Started) => {
                tracing::debug!(id = record.id(), "Pausing");
                self.pause(record, self.host_finishing)
                    .map(|()| record.state = LifecycleState::Started)
            }
            (LifecycleState::Resumed, LifecycleState::Created) => {
                tracing::debug!(id = record.id(), "Pausing and stopping");
                self.pause(record, self.host_finishing).and_then(|()| {
                    record.state = LifecycleState::Started;
                    self.adapter.stop(token, false, "move_to_state-resumed")?;
                    record.state = LifecycleState::Created;
                    Ok(())
                })
            }
            _ => Ok(()),
        };

        if let Err(e) = step {
            tracing::warn!(
                id = record.id(),
                %from,
                to = %desired,
                reached = %record.state,
                entry = e.entry(),
                error = %e,
                "Lifecycle transition failed"
            );
        }
    }

    /// One-time materialization of an `Initializing` record.
    ///
    /// Lands at `Started` at least, even when `desired` is `Created`; the
    /// host's next dispatch brings it down.
    fn materialize(&self, record: &mut ComponentRecord, desired: LifecycleState) {
        if record.resolved_target.is_none() {
            record.resolved_target = record
                .descriptor
                .as_ref()
                .and_then(|d| self.resolver.resolve(d));
        }
        let (Some(target), Some(descriptor)) =
            (record.resolved_target.clone(), record.descriptor.clone())
        else {
            tracing::warn!(id = record.id(), "Nothing to launch: descriptor does not resolve");
            return;
        };

        tracing::debug!(id = record.id(), %descriptor, %target, "Launching");
        let token = record.token();
        let spec = LaunchSpec {
            token,
            id: record.id().to_string(),
            target,
            descriptor,
            saved_state: record.saved_state.clone(),
            retained: record.retained.clone(),
        };
        let launched = match self.adapter.launch(spec) {
            Ok(Some(launched)) => launched,
            Ok(None) => {
                tracing::warn!(id = record.id(), "Target could not be materialized");
                return;
            }
            Err(e) => {
                tracing::warn!(id = record.id(), entry = e.entry(), error = %e, "Launch failed");
                return;
            }
        };

        let pending = (!launched.finished).then(|| PendingStart::restoring(record.saved_state.clone()));
        if let Err(e) = self.adapter.start(token, pending) {
            tracing::warn!(
                id = record.id(),
                entry = e.entry(),
                error = %e,
                "Start after launch failed, discarding instance"
            );
            if let Err(e) = self.adapter.destroy(token, true, 0, false, "move_to_state-start-failed") {
                tracing::warn!(id = record.id(), error = %e, "Discarding half-launched instance failed");
            }
            return;
        }

        record.surface = Some(launched.handle.surface().clone());
        record.handle = Some(launched.handle);
        record.saved_state = None;
        record.retained = None;
        record.state = LifecycleState::Started;
        tracing::info!(id = record.id(), "Component launched");

        if desired == LifecycleState::Resumed {
            tracing::debug!(id = record.id(), "Resuming");
            match self.adapter.resume(token, true, "move_to_state-initializing") {
                Ok(()) => record.state = LifecycleState::Resumed,
                Err(e) => tracing::warn!(
                    id = record.id(),
                    entry = e.entry(),
                    error = %e,
                    "Resume after launch failed"
                ),
            }
        }
    }

    /// Pause and capture freeze state, at most once per dirty interval: an
    /// earlier freeze state that was never consumed by a resume wins.
    fn pause(&self, record: &mut ComponentRecord, finishing: bool) -> Result<(), AdapterError> {
        let frozen = self.adapter.pause(record.token(), finishing, "perform_pause")?;
        if record.saved_state.is_none() {
            record.saved_state = frozen;
        } else if frozen.is_some() {
            tracing::debug!(id = record.id(), "Keeping earlier freeze state");
        }
        Ok(())
    }

    /// Hand `descriptor` to the live component without changing its state.
    pub(crate) fn deliver_new_descriptor(&self, record: &ComponentRecord, descriptor: &Descriptor) {
        tracing::debug!(id = record.id(), %descriptor, "Delivering new descriptor in place");
        if let Err(e) = self
            .adapter
            .deliver_new_descriptor(record.token(), vec![descriptor.clone()])
        {
            tracing::warn!(id = record.id(), entry = e.entry(), error = %e, "Descriptor delivery failed");
        }
    }

    /// Tear down the live component, returning the surface it owned.
    ///
    /// `finish` means the id is going away: its freeze state is discarded
    /// and no pause is attempted first.
    pub(crate) fn destroy(&self, record: &mut ComponentRecord, finish: bool) -> Option<Surface> {
        let surface = record.surface.take();
        if record.state == LifecycleState::Resumed
            && !finish
            && let Err(e) = self.pause(record, finish)
        {
            tracing::warn!(id = record.id(), error = %e, "Pause before destroy failed");
        }
        if record.handle.is_some() {
            tracing::debug!(id = record.id(), "Destroying");
            if let Err(e) = self.adapter.destroy(record.token(), finish, 0, false, "destroy") {
                tracing::warn!(id = record.id(), error = %e, "Destroy failed");
            }
        }
        record.handle = None;
        if finish {
            record.saved_state = None;
        }
        record.state = LifecycleState::Destroyed;
        tracing::info!(id = record.id(), finish, "Component destroyed");
        surface
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lodge_core::{Descriptor, LaunchMode, StateBlob, TargetInfo, TargetRef};
    use lodge_runtime::adapter::entry;
    use lodge_runtime::sim::{SimPhase, SimSnapshot};
    use lodge_runtime::{SimulatedPlatform, select_adapter};

    use super::*;
    use crate::record::RecordStore;

    struct Rig {
        platform: Arc<SimulatedPlatform>,
        adapter: Box<dyn RuntimeAdapter>,
        store: RecordStore,
    }

    impl Rig {
        fn new(version: u32) -> Self {
            let platform = Arc::new(SimulatedPlatform::with_catalogue(
                version,
                vec![TargetInfo::new("org.example", "Inbox", LaunchMode::Multiple)],
            ));
            let adapter = select_adapter(platform.clone());
            Self {
                platform,
                adapter,
                store: RecordStore::new(),
            }
        }

        fn machine(&self) -> LifecycleMachine<'_> {
            LifecycleMachine::new(self.adapter.as_ref(), self.platform.as_ref(), false)
        }

        fn initializing(&mut self, id: &str) -> ComponentRecord {
            let mut record = self
                .store
                .new_record(id, Some(Descriptor::for_target("org.example", "Inbox")));
            record.state = LifecycleState::Initializing;
            record
        }
    }

    #[test]
    fn restored_and_destroyed_records_are_inert() {
        let mut rig = Rig::new(34);
        let mut record = rig.store.new_record("a", Some(Descriptor::for_target("org.example", "Inbox")));
        rig.machine().move_to_state(&mut record, LifecycleState::Resumed);
        assert_eq!(record.state, LifecycleState::Restored);

        record.state = LifecycleState::Destroyed;
        rig.machine().move_to_state(&mut record, LifecycleState::Resumed);
        assert_eq!(record.state, LifecycleState::Destroyed);
        assert!(rig.platform.journal().is_empty());
    }

    #[test]
    fn initializing_to_created_lands_at_started() {
        let mut rig = Rig::new(34);
        let mut record = rig.initializing("a");
        rig.machine().move_to_state(&mut record, LifecycleState::Created);
        assert_eq!(record.state, LifecycleState::Started);
        assert!(record.handle.is_some());
        assert_eq!(record.surface.as_ref().map(|s| s.instance), record.handle.as_ref().map(|h| h.instance()));
    }

    #[test]
    fn initializing_to_resumed_launches_then_resumes() {
        let mut rig = Rig::new(30);
        let mut record = rig.initializing("a");
        record.saved_state = Some(StateBlob::new(b"earlier".to_vec()));
        rig.machine().move_to_state(&mut record, LifecycleState::Resumed);

        assert_eq!(record.state, LifecycleState::Resumed);
        assert!(record.saved_state.is_none());
        let instance = rig.platform.instance(record.token()).unwrap();
        assert_eq!(instance.restored_from, Some(StateBlob::new(b"earlier".to_vec())));
        assert_eq!(
            instance.started_with.and_then(|p| p.old_state),
            Some(StateBlob::new(b"earlier".to_vec()))
        );
    }

    #[test]
    fn refused_launch_leaves_record_initializing() {
        let mut rig = Rig::new(34);
        rig.platform.refuse_launch(TargetRef::new("org.example", "Inbox"));
        let mut record = rig.initializing("a");
        rig.machine().move_to_state(&mut record, LifecycleState::Resumed);
        assert_eq!(record.state, LifecycleState::Initializing);
        assert!(record.handle.is_none());
        assert!(record.surface.is_none());
    }

    #[test]
    fn component_finishing_during_launch_starts_without_pending_actions() {
        let mut rig = Rig::new(34);
        rig.platform.finish_on_launch(TargetRef::new("org.example", "Inbox"));
        let mut record = rig.initializing("a");
        rig.machine().move_to_state(&mut record, LifecycleState::Started);
        assert_eq!(record.state, LifecycleState::Started);
        assert!(rig.platform.instance(record.token()).unwrap().started_with.is_none());
    }

    #[test]
    fn failed_start_discards_the_instance() {
        let mut rig = Rig::new(34);
        rig.platform.reject_entry(entry::START);
        let mut record = rig.initializing("a");
        record.saved_state = Some(StateBlob::new(b"keep".to_vec()));
        rig.machine().move_to_state(&mut record, LifecycleState::Started);

        assert_eq!(record.state, LifecycleState::Initializing);
        assert!(record.handle.is_none());
        assert_eq!(record.saved_state, Some(StateBlob::new(b"keep".to_vec())));
        assert_eq!(rig.platform.live_instances(), 0);
    }

    #[test]
    fn walks_the_full_table() {
        let mut rig = Rig::new(34);
        let mut record = rig.initializing("a");
        let machine_steps = [
            (LifecycleState::Resumed, LifecycleState::Resumed),
            (LifecycleState::Started, LifecycleState::Started),
            (LifecycleState::Created, LifecycleState::Created),
            (LifecycleState::Started, LifecycleState::Started),
            (LifecycleState::Created, LifecycleState::Created),
            (LifecycleState::Resumed, LifecycleState::Resumed),
            (LifecycleState::Created, LifecycleState::Created),
        ];
        for (desired, expected) in machine_steps {
            rig.machine().move_to_state(&mut record, desired);
            assert_eq!(record.state, expected, "driving to {desired}");
        }
        assert_eq!(rig.platform.instance(record.token()).unwrap().phase, SimPhase::Stopped);
    }

    #[test]
    fn pause_keeps_the_first_freeze_state() {
        let mut rig = Rig::new(34);
        let mut record = rig.initializing("a");
        rig.machine().move_to_state(&mut record, LifecycleState::Resumed);
        rig.machine().move_to_state(&mut record, LifecycleState::Created);
        let first = record.saved_state.clone().expect("captured on pause");
        assert_eq!(SimSnapshot::decode(&first).unwrap().pauses, 1);

        // Restart + resume from Created does not consume the freeze state,
        // so the second pause leaves it alone.
        rig.machine().move_to_state(&mut record, LifecycleState::Resumed);
        rig.machine().move_to_state(&mut record, LifecycleState::Started);
        assert_eq!(record.saved_state, Some(first));
    }

    #[test]
    fn resume_from_started_consumes_freeze_state() {
        let mut rig = Rig::new(34);
        let mut record = rig.initializing("a");
        rig.machine().move_to_state(&mut record, LifecycleState::Resumed);
        rig.machine().move_to_state(&mut record, LifecycleState::Started);
        assert!(record.saved_state.is_some());
        rig.machine().move_to_state(&mut record, LifecycleState::Resumed);
        assert!(record.saved_state.is_none());
    }

    #[test]
    fn failed_edge_keeps_state_in_place() {
        let mut rig = Rig::new(34);
        let mut record = rig.initializing("a");
        rig.machine().move_to_state(&mut record, LifecycleState::Started);
        rig.platform.reject_entry(entry::RESUME);
        rig.machine().move_to_state(&mut record, LifecycleState::Resumed);
        assert_eq!(record.state, LifecycleState::Started);
    }

    #[test]
    fn partial_progress_is_kept() {
        let mut rig = Rig::new(34);
        let mut record = rig.initializing("a");
        rig.machine().move_to_state(&mut record, LifecycleState::Resumed);
        rig.platform.reject_entry(entry::STOP);
        rig.machine().move_to_state(&mut record, LifecycleState::Created);
        assert_eq!(record.state, LifecycleState::Started);
    }

    #[test]
    fn lifecycle_destroy_pauses_first_and_keeps_state() {
        let mut rig = Rig::new(34);
        let mut record = rig.initializing("a");
        rig.machine().move_to_state(&mut record, LifecycleState::Resumed);
        let surface = rig.machine().destroy(&mut record, false);

        assert!(surface.is_some());
        assert_eq!(record.state, LifecycleState::Destroyed);
        assert!(record.handle.is_none());
        assert!(record.saved_state.is_some());
        assert_eq!(rig.platform.calls(entry::PAUSE), 1);
    }

    #[test]
    fn finishing_destroy_discards_state_without_pausing() {
        let mut rig = Rig::new(34);
        let mut record = rig.initializing("a");
        rig.machine().move_to_state(&mut record, LifecycleState::Resumed);
        rig.machine().destroy(&mut record, true);

        assert_eq!(record.state, LifecycleState::Destroyed);
        assert!(record.saved_state.is_none());
        assert_eq!(rig.platform.calls(entry::PAUSE), 0);
        assert_eq!(rig.platform.instance(record.token()).unwrap().phase, SimPhase::Destroyed);
    }
}
