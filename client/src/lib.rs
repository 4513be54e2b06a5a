//! # Crema Client
//!
//! The IO layer of the Crema price-list manager. Where `crema-engine` is
//! pure logic, this crate supplies everything around it:
//!
//! - [`LocalStore`]: durable key-value JSON persistence under a data
//!   directory, surviving restarts
//! - [`RemoteBackend`] / [`RemoteSession`]: the shared multi-client store
//!   and per-client sessions with subscribe/notify fan-out
//! - [`SyncedCatalog`]: the coordinator that applies mutations, persists
//!   them, mirrors them remotely and reconciles incoming notifications
//! - [`Config`]: environment-driven configuration
//!
//! The `crema` binary wires these together into a small daemon that keeps
//! a catalog synced until interrupted.

pub mod config;
pub mod error;
pub mod local;
pub mod remote;
pub mod sync;

// Re-export main types at crate root
pub use config::{Config, RemoteConfig};
pub use error::{Result, SyncError};
pub use local::LocalStore;
pub use remote::{RemoteBackend, RemoteEvent, RemoteSession, SubscriptionHandle};
pub use sync::{ConnectionState, SyncStatus, SyncedCatalog, STATUS_RESET};
