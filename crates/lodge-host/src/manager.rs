use std::collections::HashMap;
use std::sync::Arc;

use lodge_core::{ComponentHandle, LifecycleState, RetainedObject, Surface};
use lodge_runtime::{PlatformRuntime, Resolver, RuntimeAdapter, select_adapter};

use crate::config::ManagerConfig;
use crate::machine::LifecycleMachine;
use crate::persist::PersistedState;
use crate::record::{ComponentRecord, RecordStore};

/// Hosts embedded components and drives them with the host's lifecycle.
///
/// All methods are expected to be called from the host's lifecycle thread;
/// the manager does no locking of its own.
pub struct EmbeddedManager {
    pub(crate) adapter: Box<dyn RuntimeAdapter>,
    pub(crate) resolver: Arc<dyn Resolver>,
    pub(crate) store: RecordStore,
    pub(crate) host_state: LifecycleState,
    pub(crate) single_resume: bool,
    pub(crate) host_finishing: bool,
}

impl EmbeddedManager {
    pub fn new(adapter: Box<dyn RuntimeAdapter>, resolver: Arc<dyn Resolver>, single_resume: bool) -> Self {
        tracing::debug!(strategy = %adapter.strategy(), single_resume, "Embedded manager created");
        Self {
            adapter,
            resolver,
            store: RecordStore::new(),
            host_state: LifecycleState::Initializing,
            single_resume,
            host_finishing: false,
        }
    }

    /// Build a manager over a platform that also resolves descriptors.
    pub fn with_platform<P>(platform: Arc<P>, config: &ManagerConfig) -> Self
    where
        P: PlatformRuntime + Resolver + 'static,
    {
        let adapter = select_adapter(platform.clone());
        Self::new(adapter, platform, config.single_resume)
    }

    /// Tear down the component for `id`, returning the surface it owned.
    ///
    /// With `finish` the record is removed and its freeze state discarded.
    pub fn destroy(&mut self, id: &str, finish: bool) -> Option<Surface> {
        let machine = LifecycleMachine::new(self.adapter.as_ref(), self.resolver.as_ref(), self.host_finishing);
        let record = self.store.get_mut(id)?;
        let surface = machine.destroy(record, finish);
        if finish {
            self.store.remove(id);
        }
        surface
    }

    /// Handle of the resumed component in single-resume mode.
    pub fn current_handle(&self) -> Option<&ComponentHandle> {
        self.store.get(self.store.resumed_id()?)?.handle()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.store.resumed_id()
    }

    pub fn handle(&self, id: &str) -> Option<&ComponentHandle> {
        self.store.get(id)?.handle()
    }

    pub fn state(&self, id: &str) -> Option<LifecycleState> {
        self.store.get(id).map(ComponentRecord::state)
    }

    pub fn record(&self, id: &str) -> Option<&ComponentRecord> {
        self.store.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &ComponentRecord> {
        self.store.iter()
    }

    /// Tracked ids in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.store.ids()
    }

    pub fn host_state(&self) -> LifecycleState {
        self.host_state
    }

    pub fn is_single_resume(&self) -> bool {
        self.single_resume
    }

    pub fn is_host_finishing(&self) -> bool {
        self.host_finishing
    }

    /// Host created, optionally from a previous instance's saved state.
    ///
    /// Entries that fail to open are logged and skipped.
    pub fn dispatch_create(&mut self, saved: Option<&PersistedState>) {
        if let Some(saved) = saved {
            for (id, opened) in saved.iter_open() {
                let blob = match opened {
                    Ok(blob) => blob,
                    Err(e) => {
                        tracing::warn!(id, error = %e, "Skipping persisted entry");
                        continue;
                    }
                };
                match self.store.get_mut(id) {
                    Some(record) => record.saved_state = Some(blob),
                    None => {
                        let mut record = self.store.new_record(id, None);
                        record.saved_state = Some(blob);
                        self.store.insert(record);
                        tracing::debug!(id, "Restored record from saved state");
                    }
                }
            }
        }
        self.host_state = LifecycleState::Created;
        tracing::info!(records = self.store.len(), "Host created");
    }

    pub fn dispatch_resume(&mut self) {
        self.host_state = LifecycleState::Resumed;
        tracing::info!("Host resumed");
        if self.single_resume {
            if let Some(id) = self.store.resumed_id().map(str::to_string) {
                self.drive(&id, LifecycleState::Resumed);
            }
        } else {
            self.drive_all(LifecycleState::Resumed);
        }
    }

    /// Host paused. `finishing` marks the host as going away for good.
    pub fn dispatch_pause(&mut self, finishing: bool) {
        if finishing {
            self.host_finishing = true;
        }
        self.host_state = LifecycleState::Started;
        tracing::info!(finishing, "Host paused");
        let candidates: Vec<String> = if self.single_resume {
            self.store.resumed_id().map(str::to_string).into_iter().collect()
        } else {
            self.store.ids()
        };
        // Only resumed records are demoted; anything below is left where it is.
        for id in candidates {
            if self.state(&id) == Some(LifecycleState::Resumed) {
                self.drive(&id, LifecycleState::Started);
            }
        }
    }

    pub fn dispatch_stop(&mut self) {
        self.host_state = LifecycleState::Created;
        tracing::info!("Host stopped");
        self.drive_all(LifecycleState::Created);
    }

    /// Destroy every live component and forget all records.
    ///
    /// No pause is issued first, so nothing is captured on this path. The
    /// platform is told the components are not finishing whatever the host's
    /// `finishing` is.
    pub fn dispatch_destroy(&mut self, finishing: bool) {
        tracing::info!(finishing, records = self.store.len(), "Host destroyed");
        for id in self.store.ids() {
            let Some(record) = self.store.get_mut(&id) else {
                continue;
            };
            if record.handle.is_some()
                && let Err(e) = self
                    .adapter
                    .destroy(record.token(), false, 0, false, "dispatch_destroy")
            {
                tracing::warn!(id = %id, entry = e.entry(), error = %e, "Destroy failed");
            }
            record.handle = None;
            record.surface = None;
            record.state = LifecycleState::Destroyed;
        }
        self.store.clear();
    }

    /// Same as `dispatch_destroy(true)`.
    pub fn remove_all(&mut self) {
        self.dispatch_destroy(true);
    }

    /// Collect every id's freeze state for the host's saved-state container.
    ///
    /// Live components without a pending freeze state, and the resumed one,
    /// are asked for a fresh capture first. `None` if nothing has state.
    pub fn save_instance_state(&mut self) -> Option<PersistedState> {
        let mut persisted = PersistedState::new();
        for id in self.store.ids() {
            let Some(record) = self.store.get_mut(&id) else {
                continue;
            };
            if record.is_live() && (record.saved_state.is_none() || record.state == LifecycleState::Resumed) {
                match self.adapter.save_state(record.token()) {
                    Ok(Some(blob)) => record.saved_state = Some(blob),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(id = %id, entry = e.entry(), error = %e, "Capturing state failed"),
                }
            }
            if let Some(blob) = &record.saved_state {
                persisted.insert(id.as_str(), blob);
            }
        }
        tracing::debug!(entries = persisted.len(), "Instance state saved");
        (!persisted.is_empty()).then_some(persisted)
    }

    /// Objects live components want carried over to the next host instance.
    pub fn dispatch_retain_non_configuration_instance(&mut self) -> Option<HashMap<String, RetainedObject>> {
        let mut retained = HashMap::new();
        for record in self.store.iter().filter(|r| r.is_live()) {
            match self.adapter.retain_instance(record.token()) {
                Ok(Some(object)) => {
                    retained.insert(record.id().to_string(), object);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    id = record.id(),
                    entry = e.entry(),
                    error = %e,
                    "Retaining instance failed"
                ),
            }
        }
        (!retained.is_empty()).then_some(retained)
    }

    /// Accept retained objects from a previous host instance. Each one is
    /// handed to its id's next launch.
    pub fn offer_retained_instances(&mut self, retained: HashMap<String, RetainedObject>) {
        tracing::debug!(count = retained.len(), "Retained instances offered");
        self.store.offer_retained(retained);
    }

    pub(crate) fn drive(&mut self, id: &str, desired: LifecycleState) {
        let machine = LifecycleMachine::new(self.adapter.as_ref(), self.resolver.as_ref(), self.host_finishing);
        if let Some(record) = self.store.get_mut(id) {
            machine.move_to_state(record, desired);
        }
    }

    fn drive_all(&mut self, desired: LifecycleState) {
        for id in self.store.ids() {
            self.drive(&id, desired);
        }
    }
}

impl std::fmt::Debug for EmbeddedManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedManager")
            .field("strategy", &self.adapter.strategy())
            .field("host_state", &self.host_state)
            .field("single_resume", &self.single_resume)
            .field("host_finishing", &self.host_finishing)
            .field("records", &self.store.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use lodge_core::{Descriptor, LaunchMode, StateBlob, TargetInfo};
    use lodge_runtime::SimulatedPlatform;
    use lodge_runtime::adapter::entry;
    use lodge_runtime::sim::{SimPhase, SimRetained};

    use super::*;

    fn platform() -> Arc<SimulatedPlatform> {
        Arc::new(SimulatedPlatform::with_catalogue(
            34,
            vec![TargetInfo::new("org.example", "Inbox", LaunchMode::Multiple)],
        ))
    }

    fn manager(platform: &Arc<SimulatedPlatform>, single_resume: bool) -> EmbeddedManager {
        EmbeddedManager::with_platform(platform.clone(), &ManagerConfig { single_resume })
    }

    fn inbox() -> Descriptor {
        Descriptor::for_target("org.example", "Inbox")
    }

    #[test]
    fn starts_uncreated() {
        let platform = platform();
        let manager = manager(&platform, true);
        assert_eq!(manager.host_state(), LifecycleState::Initializing);
        assert!(manager.is_single_resume());
        assert!(manager.current_handle().is_none());
    }

    #[test]
    fn create_restores_records_and_skips_bad_entries() {
        let platform = platform();
        let mut manager = manager(&platform, true);
        let mut saved = PersistedState::new();
        saved.insert("a", &StateBlob::new(b"one".to_vec()));
        saved.insert_raw("b", serde_json::json!("garbage"));
        manager.dispatch_create(Some(&saved));

        assert_eq!(manager.host_state(), LifecycleState::Created);
        assert_eq!(manager.ids(), vec!["a"]);
        assert_eq!(manager.state("a"), Some(LifecycleState::Restored));
        assert_eq!(
            manager.record("a").and_then(|r| r.saved_state()),
            Some(&StateBlob::new(b"one".to_vec()))
        );
    }

    #[test]
    fn create_overwrites_tracked_state() {
        let platform = platform();
        let mut manager = manager(&platform, true);
        manager.dispatch_create(None);
        manager.start("a", inbox()).unwrap();

        let mut saved = PersistedState::new();
        saved.insert("a", &StateBlob::new(b"newer".to_vec()));
        manager.dispatch_create(Some(&saved));
        assert_eq!(
            manager.record("a").and_then(|r| r.saved_state()),
            Some(&StateBlob::new(b"newer".to_vec()))
        );
    }

    #[test]
    fn restored_records_ignore_host_dispatch() {
        let platform = platform();
        let mut manager = manager(&platform, false);
        let mut saved = PersistedState::new();
        saved.insert("a", &StateBlob::new(b"one".to_vec()));
        manager.dispatch_create(Some(&saved));
        manager.dispatch_resume();
        manager.dispatch_pause(false);
        manager.dispatch_stop();
        assert_eq!(manager.state("a"), Some(LifecycleState::Restored));
        assert!(platform.journal().is_empty());
    }

    #[test]
    fn pause_with_finishing_is_sticky() {
        let platform = platform();
        let mut manager = manager(&platform, true);
        manager.dispatch_create(None);
        manager.dispatch_pause(true);
        assert!(manager.is_host_finishing());
        manager.dispatch_resume();
        manager.dispatch_pause(false);
        assert!(manager.is_host_finishing());
    }

    #[test]
    fn multi_resume_dispatch_moves_every_record() {
        let platform = platform();
        let mut manager = manager(&platform, false);
        manager.dispatch_create(None);
        manager.dispatch_resume();
        manager.start("a", inbox()).unwrap();
        manager.start("b", inbox()).unwrap();
        assert_eq!(manager.state("a"), Some(LifecycleState::Resumed));
        assert_eq!(manager.state("b"), Some(LifecycleState::Resumed));

        manager.dispatch_pause(false);
        assert_eq!(manager.state("a"), Some(LifecycleState::Started));
        assert_eq!(manager.state("b"), Some(LifecycleState::Started));

        manager.dispatch_stop();
        manager.dispatch_resume();
        assert_eq!(manager.state("a"), Some(LifecycleState::Resumed));
        assert_eq!(manager.state("b"), Some(LifecycleState::Resumed));
    }

    #[test]
    fn host_pause_leaves_unlaunched_records_alone() {
        let platform = platform();
        let mut manager = manager(&platform, false);
        manager.dispatch_create(None);
        manager.dispatch_resume();
        platform.reject_entry(entry::START);
        manager.start("a", inbox()).unwrap();
        platform.accept_entry(entry::START);
        assert_eq!(manager.state("a"), Some(LifecycleState::Initializing));

        let launches = platform.calls(entry::LAUNCH);
        manager.dispatch_pause(false);
        assert_eq!(platform.calls(entry::LAUNCH), launches);
        assert_eq!(manager.state("a"), Some(LifecycleState::Initializing));
    }

    #[test]
    fn host_pause_does_not_restart_stopped_records() {
        let platform = platform();
        let mut manager = manager(&platform, false);
        manager.dispatch_create(None);
        manager.dispatch_resume();
        manager.start("a", inbox()).unwrap();
        manager.dispatch_pause(false);
        manager.dispatch_stop();

        // Host resumes but "a" fails to come back up and stays stopped.
        platform.reject_entry(entry::RESTART);
        manager.dispatch_resume();
        platform.accept_entry(entry::RESTART);
        assert_eq!(manager.state("a"), Some(LifecycleState::Created));

        let restarts = platform.calls(entry::RESTART);
        manager.dispatch_pause(false);
        assert_eq!(platform.calls(entry::RESTART), restarts);
        assert_eq!(manager.state("a"), Some(LifecycleState::Created));
        let token = manager.record("a").unwrap().token();
        assert_eq!(platform.instance(token).unwrap().phase, SimPhase::Stopped);
    }

    #[test]
    fn finishing_host_pause_reaches_the_platform() {
        let platform = platform();
        let mut manager = manager(&platform, true);
        manager.dispatch_create(None);
        manager.dispatch_resume();
        manager.start("a", inbox()).unwrap();
        let token = manager.record("a").unwrap().token();

        manager.dispatch_pause(true);
        assert_eq!(manager.state("a"), Some(LifecycleState::Started));
        assert_eq!(platform.instance(token).unwrap().last_pause_finishing, Some(true));

        // A plain destroy pauses with its own `finish`, not the host's flag.
        manager.dispatch_resume();
        assert_eq!(manager.state("a"), Some(LifecycleState::Resumed));
        manager.destroy("a", false);
        let instance = platform.instance(token).unwrap();
        assert_eq!(instance.last_pause_finishing, Some(false));
        assert_eq!(instance.pauses, 2);
    }

    #[test]
    fn destroy_without_finish_keeps_the_record() {
        let platform = platform();
        let mut manager = manager(&platform, true);
        manager.dispatch_create(None);
        manager.dispatch_resume();
        let surface = manager.start("a", inbox()).unwrap();

        assert_eq!(manager.destroy("a", false), surface);
        assert_eq!(manager.state("a"), Some(LifecycleState::Destroyed));
        assert!(manager.handle("a").is_none());
        assert!(manager.record("a").and_then(|r| r.saved_state()).is_some());
    }

    #[test]
    fn destroy_with_finish_removes_the_record() {
        let platform = platform();
        let mut manager = manager(&platform, true);
        manager.dispatch_create(None);
        manager.dispatch_resume();
        manager.start("a", inbox()).unwrap();

        assert!(manager.destroy("a", true).is_some());
        assert!(manager.record("a").is_none());
        assert_eq!(manager.current_id(), None);
        assert_eq!(manager.destroy("a", true), None);
    }

    #[test]
    fn dispatch_destroy_clears_without_capturing() {
        let platform = platform();
        let mut manager = manager(&platform, false);
        manager.dispatch_create(None);
        manager.dispatch_resume();
        let token = {
            manager.start("a", inbox()).unwrap();
            manager.record("a").unwrap().token()
        };
        manager.start("b", inbox()).unwrap();
        manager.dispatch_destroy(false);

        assert!(manager.ids().is_empty());
        assert_eq!(platform.calls(entry::PAUSE), 0);
        assert_eq!(platform.calls(entry::SAVE_STATE), 0);
        assert_eq!(platform.instance(token).unwrap().phase, SimPhase::Destroyed);
        assert_eq!(platform.live_instances(), 0);
    }

    #[test]
    fn dispatch_destroy_never_reports_finishing() {
        let platform = platform();
        let mut manager = manager(&platform, true);
        manager.dispatch_create(None);
        manager.dispatch_resume();
        manager.start("a", inbox()).unwrap();
        let token = manager.record("a").unwrap().token();

        manager.dispatch_pause(true);
        manager.dispatch_destroy(true);
        let instance = platform.instance(token).unwrap();
        assert_eq!(instance.phase, SimPhase::Destroyed);
        assert_eq!(instance.destroyed_finishing, Some(false));
    }

    #[test]
    fn save_instance_state_captures_live_and_resumed() {
        let platform = platform();
        let mut manager = manager(&platform, true);
        assert!(manager.save_instance_state().is_none());

        manager.dispatch_create(None);
        manager.dispatch_resume();
        manager.start("a", inbox()).unwrap();
        manager.start("b", inbox()).unwrap();

        // "a" was demoted and paused, so it already holds a freeze state;
        // "b" is resumed and gets a fresh capture.
        let saved = manager.save_instance_state().expect("state captured");
        assert_eq!(saved.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        let b = manager.record("b").unwrap().token();
        assert_eq!(platform.calls_for(entry::SAVE_STATE, b), 1);
        let a = manager.record("a").unwrap().token();
        assert_eq!(platform.calls_for(entry::SAVE_STATE, a), 0);
    }

    #[test]
    fn retained_instances_carry_over_to_the_next_launch() {
        let platform = platform();
        let mut manager = manager(&platform, true);
        manager.dispatch_create(None);
        manager.dispatch_resume();
        manager.start("a", inbox()).unwrap();
        let retained = manager
            .dispatch_retain_non_configuration_instance()
            .expect("live component retains");
        manager.dispatch_destroy(false);

        let platform2 = self::platform();
        let mut next = self::manager(&platform2, true);
        next.offer_retained_instances(retained);
        next.dispatch_create(None);
        next.dispatch_resume();
        next.start("a", inbox()).unwrap();

        let token = next.record("a").unwrap().token();
        let received = platform2.instance(token).unwrap().received_retained.expect("retained handed over");
        assert_eq!(received.downcast_ref::<SimRetained>().map(|r| r.id.as_str()), Some("a"));
    }

    #[test]
    fn remove_all_empties_the_manager() {
        let platform = platform();
        let mut manager = manager(&platform, true);
        manager.dispatch_create(None);
        manager.start("a", inbox()).unwrap();
        manager.remove_all();
        assert!(manager.ids().is_empty());
        assert!(manager.dispatch_retain_non_configuration_instance().is_none());
    }
}
