use std::collections::HashMap;

use lodge_core::{
    ComponentHandle, ComponentToken, Descriptor, LifecycleState, RetainedObject, StateBlob, Surface,
    TargetInfo,
};

/// Everything the manager knows about one embedded component id.
#[derive(Debug)]
pub struct ComponentRecord {
    id: String,
    token: ComponentToken,
    pub(crate) descriptor: Option<Descriptor>,
    pub(crate) resolved_target: Option<TargetInfo>,
    pub(crate) handle: Option<ComponentHandle>,
    pub(crate) surface: Option<Surface>,
    pub(crate) saved_state: Option<StateBlob>,
    pub(crate) retained: Option<RetainedObject>,
    pub(crate) state: LifecycleState,
}

impl ComponentRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> ComponentToken {
        self.token
    }

    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    pub fn resolved_target(&self) -> Option<&TargetInfo> {
        self.resolved_target.as_ref()
    }

    pub fn handle(&self) -> Option<&ComponentHandle> {
        self.handle.as_ref()
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn saved_state(&self) -> Option<&StateBlob> {
        self.saved_state.as_ref()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }
}

/// Records keyed by id, iterated in insertion order.
///
/// Also owns the "currently resumed" pointer used in single-resume mode and
/// retained objects offered for ids that have no record yet.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: HashMap<String, ComponentRecord>,
    order: Vec<String>,
    resumed: Option<String>,
    pending_retained: HashMap<String, RetainedObject>,
    next_token: u64,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a `Restored` record with a fresh token. Not inserted yet.
    pub fn new_record(&mut self, id: &str, descriptor: Option<Descriptor>) -> ComponentRecord {
        self.next_token += 1;
        ComponentRecord {
            id: id.to_string(),
            token: ComponentToken(self.next_token),
            descriptor,
            resolved_target: None,
            handle: None,
            surface: None,
            saved_state: None,
            retained: self.pending_retained.remove(id),
            state: LifecycleState::Restored,
        }
    }

    /// Insert a record, replacing any record with the same id in place.
    pub fn insert(&mut self, record: ComponentRecord) {
        let id = record.id.clone();
        if self.records.insert(id.clone(), record).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&ComponentRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ComponentRecord> {
        self.records.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<ComponentRecord> {
        let removed = self.records.remove(id)?;
        self.order.retain(|o| o != id);
        if self.resumed.as_deref() == Some(id) {
            self.resumed = None;
        }
        Some(removed)
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn resumed_id(&self) -> Option<&str> {
        self.resumed.as_deref()
    }

    pub fn set_resumed(&mut self, id: Option<String>) {
        self.resumed = id;
    }

    /// Hand retained objects to their records, or hold them until the id
    /// gets a record.
    pub fn offer_retained(&mut self, retained: HashMap<String, RetainedObject>) {
        for (id, object) in retained {
            match self.records.get_mut(&id) {
                Some(record) => record.retained = Some(object),
                None => {
                    self.pending_retained.insert(id, object);
                }
            }
        }
    }

    /// Drop every record, the resumed pointer and pending retained objects.
    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
        self.resumed = None;
        self.pending_retained.clear();
    }
}
