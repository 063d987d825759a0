use std::sync::Arc;

use lodge_core::{ComponentToken, Descriptor, RetainedObject, StateBlob};

use super::{AdapterStrategy, Invoker, Launched, RuntimeAdapter, entry};
use crate::error::AdapterError;
use crate::platform::{LaunchSpec, PendingStart, PlatformRuntime, Value};

/// Adapter for releases whose start, restart, resume and new-descriptor
/// entry points take a client record looked up from the token.
pub struct ClientAddressedAdapter {
    invoker: Invoker,
}

impl ClientAddressedAdapter {
    pub fn new(platform: Arc<dyn PlatformRuntime>) -> Self {
        Self {
            invoker: Invoker::new(platform),
        }
    }
}

impl RuntimeAdapter for ClientAddressedAdapter {
    fn strategy(&self) -> AdapterStrategy {
        AdapterStrategy::ClientAddressed
    }

    fn launch(&self, spec: LaunchSpec) -> Result<Option<Launched>, AdapterError> {
        self.invoker.launch(spec)
    }

    fn start(&self, token: ComponentToken, pending: Option<PendingStart>) -> Result<(), AdapterError> {
        let client = self.invoker.client_for(token)?;
        self.invoker
            .call_unit(entry::START, vec![Value::Client(client), Value::PendingStart(pending)])
    }

    fn restart(&self, token: ComponentToken, start: bool) -> Result<(), AdapterError> {
        let client = self.invoker.client_for(token)?;
        self.invoker
            .call_unit(entry::RESTART, vec![Value::Client(client), Value::Bool(start)])
    }

    fn resume(&self, token: ComponentToken, final_state: bool, reason: &str) -> Result<(), AdapterError> {
        let client = self.invoker.client_for(token)?;
        self.invoker.call_unit(
            entry::RESUME,
            vec![
                Value::Client(client),
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
        let client = self.invoker.client_for(token)?;
        self.invoker.call_unit(
            entry::NEW_DESCRIPTOR,
            vec![Value::Client(client), Value::Descriptors(descriptors)],
        )
    }

    fn save_state(&self, token: ComponentToken) -> Result<Option<StateBlob>, AdapterError> {
        self.invoker.save_state(token)
    }

    fn retain_instance(&self, token: ComponentToken) -> Result<Option<RetainedObject>, AdapterError> {
        self.invoker.retain_instance(token)
    }
}
