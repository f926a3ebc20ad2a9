//! Idempotency state storage.
//!
//! This module provides the persisted key-value record of created-resource
//! references that provisioners consult to decide whether a resource
//! already exists.

mod store;

pub use store::StateStore;
