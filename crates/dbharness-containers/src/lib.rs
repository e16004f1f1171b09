//! dbharness containers - throwaway database servers for integration tests
//!
//! This crate wraps `testcontainers` with the pieces a database test harness
//! actually needs: per-engine image profiles, a log consumer that forwards
//! server output to `tracing`, a guest-OS probe, in-container package
//! management, and deduplicated connection pools tied to container lifetime.
//!
//! The entry point is [`DatabaseContainer::start`] with one of the
//! [`EngineProfile`] constructors:
//!
//! ```rust,ignore
//! let registry = Arc::new(PoolRegistry::new());
//! let container = DatabaseContainer::start(EngineProfile::postgres(), registry).await?;
//! let conn = container.connect().await?;
//! ```

mod actions;
mod container;
mod engine;
mod guest;
mod log;

pub use actions::{MigrateAction, PostConstructAction, PreDestroyAction, UpdatePackagesAction};
pub use container::{DatabaseContainer, ExecOutput, ServerExtension};
pub use engine::{EngineKind, EngineProfile, WireFamily};
pub use guest::{GuestOsDetails, Packaging};
pub use log::ContainerLogConsumer;
