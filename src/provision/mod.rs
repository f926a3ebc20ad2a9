//! The provisioner capability contract and registry.
//!
//! This module defines what a provisioner is (its argument schema, its
//! verify/up/down lifecycle, and the per-task instance state machine) and
//! the registry that maps plan slugs to registered provisioner types.

mod args;
mod contract;
mod registry;

pub use args::{Arguments, GlobalContext, RESERVED_GLOBAL_ARGS};
pub use contract::{
    ArgSet, Provisioner, ProvisionerInstance, ProvisionerSpec, TaskContext, TaskPhase,
};
pub use registry::Registry;
