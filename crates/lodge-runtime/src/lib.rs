//! Runtime adapter for lodge.
//!
//! The platform that hosts embedded components exposes its lifecycle
//! entry points privately, and their shapes change between releases.
//! This crate hides that behind [`RuntimeAdapter`]: one uniform operation
//! set, with the strategy for the running release picked once by
//! [`select_adapter`].
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use lodge_core::{LaunchMode, TargetInfo};
//! use lodge_runtime::{select_adapter, AdapterStrategy, SimulatedPlatform};
//!
//! let platform = Arc::new(SimulatedPlatform::with_catalogue(
//!     34,
//!     vec![TargetInfo::new("org.example", "Inbox", LaunchMode::Multiple)],
//! ));
//! let adapter = select_adapter(platform);
//! assert_eq!(adapter.strategy(), AdapterStrategy::ClientAddressed);
//! ```

pub mod adapter;
pub mod error;
pub mod identity;
pub mod platform;
pub mod resolver;
pub mod sim;

pub use adapter::{AdapterStrategy, Launched, RuntimeAdapter, select_adapter};
pub use error::AdapterError;
pub use identity::IdentityScope;
pub use platform::{LaunchSpec, PendingStart, PlatformRuntime, RuntimeVersion};
pub use resolver::Resolver;
pub use sim::SimulatedPlatform;
