use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Host-visible token naming one component record to the platform.
///
/// Assigned by the record store; stable for the lifetime of the record,
/// across relaunches of its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentToken(pub u64);

impl std::fmt::Display for ComponentToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "token#{}", self.0)
    }
}

/// Identity of one materialized component instance. A relaunch yields a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

/// Top-level visual surface owned by a live component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Surface {
    pub instance: InstanceId,
    pub title: String,
}

/// A live component instance as handed back by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentHandle {
    instance: InstanceId,
    surface: Surface,
}

impl ComponentHandle {
    pub fn new(instance: InstanceId, title: impl Into<String>) -> Self {
        Self {
            instance,
            surface: Surface {
                instance,
                title: title.into(),
            },
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }
}

/// Opaque freeze state of one component. Only the component understands it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateBlob(Vec<u8>);

impl StateBlob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for StateBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StateBlob({} bytes)", self.0.len())
    }
}

/// An in-memory object a component hands over across host recreation.
///
/// Never serialized: it only survives when the same process recreates the
/// host. Cloning shares the underlying object.
#[derive(Clone)]
pub struct RetainedObject(Arc<dyn Any + Send + Sync>);

impl RetainedObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether two retained objects are the same allocation.
    pub fn ptr_eq(&self, other: &RetainedObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for RetainedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RetainedObject(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_surface_belongs_to_instance() {
        let handle = ComponentHandle::new(InstanceId(7), "inbox");
        assert_eq!(handle.surface().instance, handle.instance());
        assert_eq!(handle.surface().title, "inbox");
    }

    #[test]
    fn retained_object_downcasts_and_shares() {
        let retained = RetainedObject::new(String::from("cursor"));
        let copy = retained.clone();
        assert!(retained.ptr_eq(&copy));
        assert_eq!(copy.downcast_ref::<String>().map(String::as_str), Some("cursor"));
        assert!(copy.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn blob_debug_hides_contents() {
        let blob = StateBlob::new(b"secret".to_vec());
        assert_eq!(format!("{blob:?}"), "StateBlob(6 bytes)");
    }
}
