// Clippy allows for reasonable defaults
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::derivable_impls)] // Explicit Default impls can be clearer
#![allow(clippy::unwrap_or_default)] // unwrap_or_else(Default::default) can be clearer

// Module declarations
pub mod config;
pub mod file_storage;
pub mod models;
pub mod session;
pub mod store;
mod utils;

// Re-export models and the store boundary for the lock registry
pub use models::*;
pub use session::SessionLocks;
pub use store::{open_store, SessionStore, StoreError, StoreErrorKind, StoreResult};
