//! Shared vocabulary for the lodge embedded-component manager.
//!
//! Everything the platform boundary and the host manager exchange lives
//! here: lifecycle states, descriptors and the targets they resolve to,
//! tokens, handles, surfaces and state blobs.

pub mod descriptor;
pub mod handle;
pub mod state;

pub use descriptor::{Descriptor, LaunchFlags, LaunchMode, TargetInfo, TargetRef};
pub use handle::{ComponentHandle, ComponentToken, InstanceId, RetainedObject, StateBlob, Surface};
pub use state::LifecycleState;
