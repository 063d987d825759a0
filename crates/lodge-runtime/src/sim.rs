//! In-memory platform runtime.
//!
//! `SimulatedPlatform` models a platform release: it exposes the entry
//! point shapes of its version, keeps one instance per token, journals
//! every call, and enforces the lifecycle order a real platform would
//! (for example, resuming a stopped instance is rejected). It also
//! resolves descriptors against a target catalogue.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use lodge_core::{
    ComponentHandle, ComponentToken, Descriptor, InstanceId, RetainedObject, StateBlob, TargetInfo,
    TargetRef,
};
use serde::{Deserialize, Serialize};

use crate::adapter::entry;
use crate::platform::{
    CallingIdentity, ClientRef, EntryPoint, InvokeFault, LaunchSpec, PendingStart, PlatformRuntime,
    RuntimeVersion, Value, ValueKind,
};
use crate::resolver::Resolver;

/// Where a simulated instance is in its own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimPhase {
    Launched,
    Started,
    Resumed,
    Paused,
    Stopped,
    Destroyed,
}

/// One simulated component instance.
#[derive(Debug, Clone)]
pub struct SimInstance {
    pub id: String,
    pub instance: InstanceId,
    pub target: TargetInfo,
    pub descriptor: Descriptor,
    pub phase: SimPhase,
    pub pauses: u32,
    /// `finishing` argument of the most recent pause.
    pub last_pause_finishing: Option<bool>,
    /// `finishing` argument of the destroy call, once destroyed.
    pub destroyed_finishing: Option<bool>,
    pub delivered: Vec<Descriptor>,
    pub restored_from: Option<StateBlob>,
    pub received_retained: Option<RetainedObject>,
    pub started_with: Option<PendingStart>,
}

/// A journaled platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimCall {
    pub entry: String,
    pub token: Option<ComponentToken>,
}

/// What a simulated instance writes into its freeze state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub id: String,
    pub target: String,
    pub instance: u64,
    pub pauses: u32,
    pub data: Option<String>,
}

impl SimSnapshot {
    pub fn decode(blob: &StateBlob) -> Option<SimSnapshot> {
        serde_json::from_slice(blob.as_bytes()).ok()
    }

    fn encode(&self) -> StateBlob {
        // Serializing a struct of strings and integers cannot fail.
        StateBlob::new(serde_json::to_vec(self).unwrap_or_default())
    }
}

/// What a simulated instance hands over through `retain_instance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimRetained {
    pub id: String,
    pub instance: InstanceId,
}

#[derive(Default)]
struct SimState {
    catalogue: Vec<TargetInfo>,
    actions: HashMap<String, TargetRef>,
    removed_entries: HashSet<String>,
    rejected_entries: HashSet<String>,
    refused_targets: HashSet<TargetRef>,
    finishing_targets: HashSet<TargetRef>,
    instances: HashMap<ComponentToken, SimInstance>,
    clients: HashMap<ComponentToken, ClientRef>,
    next_instance: u64,
    next_client: u64,
    journal: Vec<SimCall>,
    lookups: HashMap<String, usize>,
    version_probes: usize,
    identity_clears: usize,
    identity_cleared: bool,
}

pub struct SimulatedPlatform {
    version: RuntimeVersion,
    state: Mutex<SimState>,
}

impl SimulatedPlatform {
    pub fn new(version: u32) -> Self {
        Self {
            version: RuntimeVersion(version),
            state: Mutex::new(SimState::default()),
        }
    }

    pub fn with_catalogue(version: u32, targets: Vec<TargetInfo>) -> Self {
        let platform = Self::new(version);
        for target in targets {
            platform.register(target);
        }
        platform
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add (or replace) a target in the catalogue.
    pub fn register(&self, target: TargetInfo) {
        let mut state = self.state();
        state.catalogue.retain(|t| !t.same_implementation(&target));
        state.catalogue.push(target);
    }

    /// Resolve descriptors without an explicit target by `action`.
    pub fn register_action(&self, action: impl Into<String>, target: TargetRef) {
        self.state().actions.insert(action.into(), target);
    }

    /// Make `name` disappear from the entry point table.
    pub fn remove_entry(&self, name: &str) {
        self.state().removed_entries.insert(name.to_string());
    }

    /// Make every invocation of `name` fail.
    pub fn reject_entry(&self, name: &str) {
        self.state().rejected_entries.insert(name.to_string());
    }

    pub fn accept_entry(&self, name: &str) {
        self.state().rejected_entries.remove(name);
    }

    /// Launches of `target` produce no instance.
    pub fn refuse_launch(&self, target: TargetRef) {
        self.state().refused_targets.insert(target);
    }

    /// Instances of `target` finish themselves during launch.
    pub fn finish_on_launch(&self, target: TargetRef) {
        self.state().finishing_targets.insert(target);
    }

    pub fn journal(&self) -> Vec<SimCall> {
        self.state().journal.clone()
    }

    /// Number of invocations of `name` so far.
    pub fn calls(&self, name: &str) -> usize {
        self.state().journal.iter().filter(|c| c.entry == name).count()
    }

    pub fn calls_for(&self, name: &str, token: ComponentToken) -> usize {
        self.state()
            .journal
            .iter()
            .filter(|c| c.entry == name && c.token == Some(token))
            .count()
    }

    /// Number of entry point lookups for `name` so far.
    pub fn lookups_of(&self, name: &str) -> usize {
        self.state().lookups.get(name).copied().unwrap_or(0)
    }

    pub fn version_probes(&self) -> usize {
        self.state().version_probes
    }

    pub fn identity_clears(&self) -> usize {
        self.state().identity_clears
    }

    /// Whether an identity scope is currently open.
    pub fn identity_cleared(&self) -> bool {
        self.state().identity_cleared
    }

    pub fn instance(&self, token: ComponentToken) -> Option<SimInstance> {
        self.state().instances.get(&token).cloned()
    }

    pub fn live_instances(&self) -> usize {
        self.state()
            .instances
            .values()
            .filter(|i| i.phase != SimPhase::Destroyed)
            .count()
    }

    fn shape(&self, name: &str) -> Option<Vec<ValueKind>> {
        use ValueKind as K;
        let addr = if self.version.is_client_addressed() {
            K::Client
        } else {
            K::Token
        };
        let shape = match name {
            entry::LAUNCH => vec![K::Launch],
            entry::IS_FINISHING | entry::CLIENT_RECORD | entry::SAVE_STATE | entry::RETAIN_INSTANCE => {
                vec![K::Token]
            }
            entry::PAUSE | entry::STOP => vec![K::Token, K::Bool, K::Text],
            entry::DESTROY => vec![K::Client, K::Bool, K::Int, K::Bool, K::Text],
            entry::START => vec![addr, K::PendingStart],
            entry::RESTART => vec![addr, K::Bool],
            entry::RESUME => vec![addr, K::Bool, K::Text],
            entry::NEW_DESCRIPTOR => vec![addr, K::Descriptors],
            _ => return None,
        };
        Some(shape)
    }
}

fn rejected(reason: impl Into<String>) -> InvokeFault {
    InvokeFault::Rejected(reason.into())
}

impl SimState {
    fn token_for_client(&self, client: ClientRef) -> Option<ComponentToken> {
        self.clients
            .iter()
            .find(|(_, c)| **c == client)
            .map(|(token, _)| *token)
    }

    fn addressed_token(&self, value: &Value) -> Result<ComponentToken, InvokeFault> {
        match value {
            Value::Token(token) => Ok(*token),
            Value::Client(client) => self
                .token_for_client(*client)
                .ok_or_else(|| rejected(format!("unknown client record {}", client.0))),
            other => Err(InvokeFault::BadArguments(format!(
                "expected component address, got {:?}",
                other.kind()
            ))),
        }
    }

    fn live(&mut self, token: ComponentToken) -> Result<&mut SimInstance, InvokeFault> {
        match self.instances.get_mut(&token) {
            Some(instance) if instance.phase != SimPhase::Destroyed => Ok(instance),
            _ => Err(rejected(format!("no live instance for {token}"))),
        }
    }

    fn launch(&mut self, spec: LaunchSpec) -> Value {
        let target_ref = spec.target.target_ref();
        if self.refused_targets.contains(&target_ref)
            || !self.catalogue.iter().any(|t| t.same_implementation(&spec.target))
        {
            return Value::Handle(None);
        }
        self.next_instance += 1;
        let instance = InstanceId(self.next_instance);
        let handle = ComponentHandle::new(instance, format!("{}:{}", spec.id, spec.target.name));
        self.instances.insert(
            spec.token,
            SimInstance {
                id: spec.id,
                instance,
                target: spec.target,
                descriptor: spec.descriptor,
                phase: SimPhase::Launched,
                pauses: 0,
                last_pause_finishing: None,
                destroyed_finishing: None,
                delivered: Vec::new(),
                restored_from: spec.saved_state,
                received_retained: spec.retained,
                started_with: None,
            },
        );
        Value::Handle(Some(handle))
    }

    fn snapshot(instance: &SimInstance) -> StateBlob {
        SimSnapshot {
            id: instance.id.clone(),
            target: instance.target.to_string(),
            instance: instance.instance.0,
            pauses: instance.pauses,
            data: instance.descriptor.data.clone(),
        }
        .encode()
    }

    fn dispatch(&mut self, name: &str, args: Vec<Value>) -> Result<Value, InvokeFault> {
        let mut args = args.into_iter();
        let first = args.next().unwrap_or(Value::Unit);

        if name == entry::LAUNCH {
            let Value::Launch(spec) = first else {
                return Err(InvokeFault::BadArguments("launch needs a launch spec".into()));
            };
            self.journal.push(SimCall {
                entry: name.to_string(),
                token: Some(spec.token),
            });
            return Ok(self.launch(*spec));
        }

        let token = self.addressed_token(&first)?;
        self.journal.push(SimCall {
            entry: name.to_string(),
            token: Some(token),
        });

        match name {
            entry::CLIENT_RECORD => {
                if !self.instances.contains_key(&token) {
                    return Err(rejected(format!("no client record for {token}")));
                }
                let next = self.next_client + 1;
                let client = *self.clients.entry(token).or_insert(ClientRef(next));
                if client.0 == next {
                    self.next_client = next;
                }
                Ok(Value::Client(client))
            }
            entry::IS_FINISHING => {
                let instance = self.live(token)?;
                let finishing = instance.target.target_ref();
                Ok(Value::Bool(self.finishing_targets.contains(&finishing)))
            }
            entry::START => {
                let pending = match args.next() {
                    Some(Value::PendingStart(pending)) => pending,
                    _ => None,
                };
                let instance = self.live(token)?;
                if instance.phase != SimPhase::Launched {
                    return Err(rejected(format!("start from {:?}", instance.phase)));
                }
                instance.started_with = pending;
                instance.phase = SimPhase::Started;
                Ok(Value::Unit)
            }
            entry::RESTART => {
                let instance = self.live(token)?;
                if instance.phase != SimPhase::Stopped {
                    return Err(rejected(format!("restart from {:?}", instance.phase)));
                }
                instance.phase = SimPhase::Started;
                Ok(Value::Unit)
            }
            entry::RESUME => {
                let instance = self.live(token)?;
                if !matches!(instance.phase, SimPhase::Started | SimPhase::Paused) {
                    return Err(rejected(format!("resume from {:?}", instance.phase)));
                }
                instance.phase = SimPhase::Resumed;
                Ok(Value::Unit)
            }
            entry::PAUSE => {
                let finishing = matches!(args.next(), Some(Value::Bool(true)));
                let instance = self.live(token)?;
                if instance.phase != SimPhase::Resumed {
                    return Err(rejected(format!("pause from {:?}", instance.phase)));
                }
                instance.phase = SimPhase::Paused;
                instance.pauses += 1;
                instance.last_pause_finishing = Some(finishing);
                Ok(Value::Blob(Some(Self::snapshot(instance))))
            }
            entry::STOP => {
                let instance = self.live(token)?;
                if !matches!(instance.phase, SimPhase::Started | SimPhase::Paused) {
                    return Err(rejected(format!("stop from {:?}", instance.phase)));
                }
                instance.phase = SimPhase::Stopped;
                Ok(Value::Unit)
            }
            entry::DESTROY => {
                let finishing = matches!(args.next(), Some(Value::Bool(true)));
                let instance = self.live(token)?;
                instance.phase = SimPhase::Destroyed;
                instance.destroyed_finishing = Some(finishing);
                Ok(Value::Unit)
            }
            entry::NEW_DESCRIPTOR => {
                let descriptors = match args.next() {
                    Some(Value::Descriptors(descriptors)) => descriptors,
                    _ => Vec::new(),
                };
                let instance = self.live(token)?;
                if let Some(latest) = descriptors.last() {
                    instance.descriptor = latest.clone();
                }
                instance.delivered.extend(descriptors);
                Ok(Value::Unit)
            }
            entry::SAVE_STATE => {
                let instance = self.live(token)?;
                Ok(Value::Blob(Some(Self::snapshot(instance))))
            }
            entry::RETAIN_INSTANCE => {
                let instance = self.live(token)?;
                Ok(Value::Retained(Some(RetainedObject::new(SimRetained {
                    id: instance.id.clone(),
                    instance: instance.instance,
                }))))
            }
            other => Err(rejected(format!("unknown entry point {other}"))),
        }
    }
}

impl PlatformRuntime for SimulatedPlatform {
    fn version(&self) -> RuntimeVersion {
        self.state().version_probes += 1;
        self.version
    }

    fn entry_point(&self, name: &str, params: &[ValueKind]) -> Option<EntryPoint> {
        let mut state = self.state();
        *state.lookups.entry(name.to_string()).or_insert(0) += 1;
        if state.removed_entries.contains(name) {
            return None;
        }
        let shape = self.shape(name)?;
        if shape != params {
            return None;
        }
        Some(EntryPoint {
            name: name.to_string(),
            params: shape,
        })
    }

    fn invoke(&self, entry: &EntryPoint, args: Vec<Value>) -> Result<Value, InvokeFault> {
        let kinds: Vec<ValueKind> = args.iter().map(Value::kind).collect();
        if kinds != entry.params {
            return Err(InvokeFault::BadArguments(format!(
                "{} takes {:?}, got {:?}",
                entry.name, entry.params, kinds
            )));
        }
        let mut state = self.state();
        if state.rejected_entries.contains(&entry.name) {
            return Err(rejected(format!("{} is refusing calls", entry.name)));
        }
        state.dispatch(&entry.name, args)
    }

    fn clear_calling_identity(&self) -> CallingIdentity {
        let mut state = self.state();
        state.identity_clears += 1;
        state.identity_cleared = true;
        CallingIdentity(state.identity_clears as u64)
    }

    fn restore_calling_identity(&self, _identity: CallingIdentity) {
        self.state().identity_cleared = false;
    }
}

impl Resolver for SimulatedPlatform {
    fn resolve(&self, descriptor: &Descriptor) -> Option<TargetInfo> {
        let state = self.state();
        let wanted = match &descriptor.target {
            Some(target) => target.clone(),
            None => state.actions.get(descriptor.action.as_deref()?)?.clone(),
        };
        state
            .catalogue
            .iter()
            .find(|t| t.owner == wanted.owner && t.name == wanted.name)
            .cloned()
    }
}
