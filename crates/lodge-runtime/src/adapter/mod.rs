//! Uniform lifecycle operations over the platform's versioned entry points.
//!
//! [`select_adapter`] probes the platform version once and returns the
//! strategy for that release range. Everything above this module is
//! version-agnostic.

mod client;
mod token;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use lodge_core::{ComponentHandle, ComponentToken, Descriptor, RetainedObject, StateBlob};

use crate::error::AdapterError;
use crate::identity::IdentityScope;
use crate::platform::{
    ClientRef, EntryPoint, LaunchSpec, PendingStart, PlatformRuntime, Value, ValueKind,
};

pub use client::ClientAddressedAdapter;
pub use token::TokenAddressedAdapter;

/// Entry point names, shared by every release.
pub mod entry {
    pub const LAUNCH: &str = "perform_launch";
    pub const IS_FINISHING: &str = "is_finishing";
    pub const CLIENT_RECORD: &str = "client_record";
    pub const START: &str = "handle_start";
    pub const RESTART: &str = "perform_restart";
    pub const RESUME: &str = "perform_resume";
    pub const PAUSE: &str = "perform_pause";
    pub const STOP: &str = "perform_stop";
    pub const DESTROY: &str = "perform_destroy";
    pub const NEW_DESCRIPTOR: &str = "handle_new_descriptor";
    pub const SAVE_STATE: &str = "perform_save_state";
    pub const RETAIN_INSTANCE: &str = "retain_instance";
}

/// Which strategy an adapter implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStrategy {
    TokenAddressed,
    ClientAddressed,
}

impl std::fmt::Display for AdapterStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterStrategy::TokenAddressed => write!(f, "token_addressed"),
            AdapterStrategy::ClientAddressed => write!(f, "client_addressed"),
        }
    }
}

/// A freshly materialized component.
#[derive(Debug, Clone)]
pub struct Launched {
    pub handle: ComponentHandle,
    /// The component finished itself while launching.
    pub finished: bool,
}

/// The uniform operation set the lifecycle state machine drives.
///
/// Every operation addresses a component by its record token. Errors are
/// [`AdapterError`]s; callers decide whether to absorb them.
pub trait RuntimeAdapter: Send + Sync {
    fn strategy(&self) -> AdapterStrategy;

    /// Materialize a component. `Ok(None)` means the platform could not
    /// produce an instance for the target.
    fn launch(&self, spec: LaunchSpec) -> Result<Option<Launched>, AdapterError>;

    /// First start after a launch. `pending` is `None` when the component
    /// finished during launch.
    fn start(&self, token: ComponentToken, pending: Option<PendingStart>) -> Result<(), AdapterError>;

    fn restart(&self, token: ComponentToken, start: bool) -> Result<(), AdapterError>;

    fn resume(&self, token: ComponentToken, final_state: bool, reason: &str) -> Result<(), AdapterError>;

    /// Pause and return the component's freeze state.
    fn pause(
        &self,
        token: ComponentToken,
        finishing: bool,
        reason: &str,
    ) -> Result<Option<StateBlob>, AdapterError>;

    fn stop(&self, token: ComponentToken, save_state: bool, reason: &str) -> Result<(), AdapterError>;

    fn destroy(
        &self,
        token: ComponentToken,
        finishing: bool,
        config_changes: i64,
        want_retained: bool,
        reason: &str,
    ) -> Result<(), AdapterError>;

    fn deliver_new_descriptor(
        &self,
        token: ComponentToken,
        descriptors: Vec<Descriptor>,
    ) -> Result<(), AdapterError>;

    /// Capture a fresh freeze state without changing lifecycle state.
    fn save_state(&self, token: ComponentToken) -> Result<Option<StateBlob>, AdapterError>;

    fn retain_instance(&self, token: ComponentToken) -> Result<Option<RetainedObject>, AdapterError>;
}

/// Probe the platform version and build the matching adapter.
///
/// The probe runs exactly once; the returned adapter never re-probes.
pub fn select_adapter(platform: Arc<dyn PlatformRuntime>) -> Box<dyn RuntimeAdapter> {
    let version = platform.version();
    let adapter: Box<dyn RuntimeAdapter> = if version.is_client_addressed() {
        Box::new(ClientAddressedAdapter::new(platform))
    } else {
        Box::new(TokenAddressedAdapter::new(platform))
    };
    tracing::debug!(%version, strategy = %adapter.strategy(), "Runtime adapter selected");
    adapter
}

/// Memoizing entry-point caller shared by every strategy.
///
/// Also carries the operations whose shape is identical in all releases.
pub(crate) struct Invoker {
    platform: Arc<dyn PlatformRuntime>,
    entries: Mutex<HashMap<&'static str, EntryPoint>>,
}

impl Invoker {
    pub(crate) fn new(platform: Arc<dyn PlatformRuntime>) -> Self {
        Self {
            platform,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, name: &'static str, params: &[ValueKind]) -> Result<EntryPoint, AdapterError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(found) = entries.get(name) {
            return Ok(found.clone());
        }
        let found = self
            .platform
            .entry_point(name, params)
            .ok_or_else(|| {
                tracing::debug!(entry = name, ?params, "Entry point lookup failed");
                AdapterError::NoSuchEntryPoint {
                    entry: name.to_string(),
                }
            })?;
        tracing::trace!(entry = name, "Entry point resolved");
        entries.insert(name, found.clone());
        Ok(found)
    }

    /// Invoke `name` with `args` inside an identity scope.
    pub(crate) fn call(&self, name: &'static str, args: Vec<Value>) -> Result<Value, AdapterError> {
        let params: Vec<ValueKind> = args.iter().map(Value::kind).collect();
        let entry = self.entry(name, &params)?;
        let _scope = IdentityScope::enter(self.platform.as_ref());
        self.platform
            .invoke(&entry, args)
            .map_err(|fault| AdapterError::from_fault(name, fault))
    }

    pub(crate) fn call_unit(&self, name: &'static str, args: Vec<Value>) -> Result<(), AdapterError> {
        match self.call(name, args)? {
            Value::Unit => Ok(()),
            other => Err(AdapterError::unexpected_return(name, ValueKind::Unit, other.kind())),
        }
    }

    pub(crate) fn client_for(&self, token: ComponentToken) -> Result<ClientRef, AdapterError> {
        match self.call(entry::CLIENT_RECORD, vec![Value::Token(token)])? {
            Value::Client(client) => Ok(client),
            other => Err(AdapterError::unexpected_return(
                entry::CLIENT_RECORD,
                ValueKind::Client,
                other.kind(),
            )),
        }
    }

    pub(crate) fn launch(&self, spec: LaunchSpec) -> Result<Option<Launched>, AdapterError> {
        let token = spec.token;
        let handle = match self.call(entry::LAUNCH, vec![Value::Launch(Box::new(spec))])? {
            Value::Handle(Some(handle)) => handle,
            Value::Handle(None) => return Ok(None),
            other => {
                return Err(AdapterError::unexpected_return(
                    entry::LAUNCH,
                    ValueKind::Handle,
                    other.kind(),
                ));
            }
        };
        let finished = match self.call(entry::IS_FINISHING, vec![Value::Token(token)]) {
            Ok(Value::Bool(finished)) => finished,
            Ok(other) => {
                tracing::warn!(
                    %token,
                    got = ?other.kind(),
                    "Unexpected finishing probe result, assuming not finished"
                );
                false
            }
            Err(e) => {
                tracing::warn!(%token, error = %e, "Finishing probe failed, assuming not finished");
                false
            }
        };
        Ok(Some(Launched { handle, finished }))
    }

    pub(crate) fn pause(
        &self,
        token: ComponentToken,
        finishing: bool,
        reason: &str,
    ) -> Result<Option<StateBlob>, AdapterError> {
        let args = vec![
            Value::Token(token),
            Value::Bool(finishing),
            Value::Text(reason.to_string()),
        ];
        match self.call(entry::PAUSE, args)? {
            Value::Blob(blob) => Ok(blob),
            other => Err(AdapterError::unexpected_return(entry::PAUSE, ValueKind::Blob, other.kind())),
        }
    }

    pub(crate) fn stop(&self, token: ComponentToken, save_state: bool, reason: &str) -> Result<(), AdapterError> {
        self.call_unit(
            entry::STOP,
            vec![
                Value::Token(token),
                Value::Bool(save_state),
                Value::Text(reason.to_string()),
            ],
        )
    }

    pub(crate) fn destroy(
        &self,
        token: ComponentToken,
        finishing: bool,
        config_changes: i64,
        want_retained: bool,
        reason: &str,
    ) -> Result<(), AdapterError> {
        let client = self.client_for(token)?;
        self.call_unit(
            entry::DESTROY,
            vec![
                Value::Client(client),
                Value::Bool(finishing),
                Value::Int(config_changes),
                Value::Bool(want_retained),
                Value::Text(reason.to_string()),
            ],
        )
    }

    pub(crate) fn save_state(&self, token: ComponentToken) -> Result<Option<StateBlob>, AdapterError> {
        match self.call(entry::SAVE_STATE, vec![Value::Token(token)])? {
            Value::Blob(blob) => Ok(blob),
            other => Err(AdapterError::unexpected_return(
                entry::SAVE_STATE,
                ValueKind::Blob,
                other.kind(),
            )),
        }
    }

    pub(crate) fn retain_instance(&self, token: ComponentToken) -> Result<Option<RetainedObject>, AdapterError> {
        match self.call(entry::RETAIN_INSTANCE, vec![Value::Token(token)])? {
            Value::Retained(retained) => Ok(retained),
            other => Err(AdapterError::unexpected_return(
                entry::RETAIN_INSTANCE,
                ValueKind::Retained,
                other.kind(),
            )),
        }
    }
}
