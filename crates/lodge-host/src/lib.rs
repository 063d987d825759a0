//! Embedded-component lifecycle manager.
//!
//! [`EmbeddedManager`] keeps one record per caller-chosen id, drives each
//! record's component through the platform with the host's own lifecycle,
//! decides whether a new request reuses or replaces a live component, and
//! carries per-id freeze state across host recreation.
//!
//! ```rust
//! use std::sync::Arc;
//! use lodge_core::{Descriptor, LaunchMode, LifecycleState, TargetInfo};
//! use lodge_host::{EmbeddedManager, ManagerConfig};
//! use lodge_runtime::SimulatedPlatform;
//!
//! let platform = Arc::new(SimulatedPlatform::with_catalogue(
//!     34,
//!     vec![TargetInfo::new("org.example", "Inbox", LaunchMode::Multiple)],
//! ));
//! let mut manager = EmbeddedManager::with_platform(platform, &ManagerConfig::default());
//! manager.dispatch_create(None);
//! manager.dispatch_resume();
//!
//! let surface = manager.start("inbox", Descriptor::for_target("org.example", "Inbox")).unwrap();
//! assert!(surface.is_some());
//! assert_eq!(manager.state("inbox"), Some(LifecycleState::Resumed));
//! ```

pub mod config;
pub mod error;
mod machine;
pub mod manager;
pub mod persist;
pub mod record;
mod router;
pub mod storage;

pub use config::{LodgeConfig, ManagerConfig, RuntimeConfig, StorageConfig};
pub use error::HostError;
pub use manager::EmbeddedManager;
pub use persist::PersistedState;
pub use record::{ComponentRecord, RecordStore};
pub use storage::SavedStateStore;
