use std::sync::Arc;

use lodge_core::{ComponentToken, Descriptor, RetainedObject, StateBlob};

use super::{AdapterStrategy, Invoker, Launched, RuntimeAdapter, entry};
use crate::error::AdapterError;
use crate::platform::{LaunchSpec, PendingStart, PlatformRuntime, Value};

/// Adapter for releases before client records existed: every lifecycle
/// entry point takes the record token directly.
pub struct TokenAddressedAdapter {
    invoker: Invoker,
}

impl TokenAddressedAdapter {
    pub fn new(platform: Arc<dyn PlatformRuntime>) -> Self {
        Self {
            invoker: Invoker::new(platform),
        }
    }
}

impl RuntimeAdapter for TokenAddressedAdapter {
    fn strategy(&self) -> AdapterStrategy {
        AdapterStrategy::TokenAddressed
    }

    fn launch(&self, spec: LaunchSpec) -> Result<Option<Launched>, AdapterError> {
        self.invoker.launch(spec)
    }

    fn start(&self, token: ComponentToken, pending: Option<PendingStart>) -> Result<(), AdapterError> {
        self.invoker
            .call_unit(entry::START, vec![Value::Token(token), Value::PendingStart(pending)])
    }

    fn restart(&self, token: ComponentToken, start: bool) -> Result<(), AdapterError> {
        self.invoker
            .call_unit(entry::RESTART, vec![Value::Token(token), Value::Bool(start)])
    }

    fn resume(&self, token: ComponentToken, final_state: bool, reason: &str) -> Result<(), AdapterError> {
        self.invoker.call_unit(
            entry::RESUME,
            vec![
                Value::Token(token),
                Value::Bool(final_state),
                Value::Text(reason.to_string()),
            ],
        )
    }

    fn pause(
        &self,
        token: ComponentToken,
        finishing: bool,
        reason: &str,
    ) -> Result<Option<StateBlob>, AdapterError> {
        self.invoker.pause(token, finishing, reason)
    }

    fn stop(&self, token: ComponentToken, save_state: bool, reason: &str) -> Result<(), AdapterError> {
        self.invoker.stop(token, save_state, reason)
    }

    fn destroy(
        &self,
        token: ComponentToken,
        finishing: bool,
        config_changes: i64,
        want_retained: bool,
        reason: &str,
    ) -> Result<(), AdapterError> {
        self.invoker
            .destroy(token, finishing, config_changes, want_retained, reason)
    }

    fn deliver_new_descriptor(
        &self,
        token: ComponentToken,
        descriptors: Vec<Descriptor>,
    ) -> Result<(), AdapterError> {
        self.invoker.call_unit(
            entry::NEW_DESCRIPTOR,
            vec![Value::Token(token), Value::Descriptors(descriptors)],
        )
    }

    fn save_state(&self, token: ComponentToken) -> Result<Option<StateBlob>, AdapterError> {
        self.invoker.save_state(token)
    }

    fn retain_instance(&self, token: ComponentToken) -> Result<Option<RetainedObject>, AdapterError> {
        self.invoker.retain_instance(token)
    }
}
