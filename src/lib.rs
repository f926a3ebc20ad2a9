// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Cloudplan
//!
//! A declarative, idempotent plan runner for cloud infrastructure.
//!
//! ## Overview
//!
//! Cloudplan turns an ordered YAML plan into real infrastructure and back
//! again:
//!
//! - Describe resources as an ordered list of `{provisioner: arguments}`
//!   tasks
//! - Run the plan forwards to create everything, in order
//! - Run it backwards to tear everything down, in exact reverse order
//! - Re-run safely: recorded state references make creation idempotent
//!
//! ## Architecture
//!
//! Each task is handled by a registered **provisioner**, a small state
//! machine driven through `bind -> verify -> up` (or `down`). Provisioners
//! talk to the outside world only through injected collaborator traits, so
//! the whole engine runs against in-memory fakes in tests.
//!
//! ## Modules
//!
//! - [`plan`]: Plan parsing, validation, and ordered execution
//! - [`provision`]: The provisioner contract, argument model, and registry
//! - [`provisioners`]: Built-in provisioners (key pairs, security groups,
//!   instances, users)
//! - [`cloud`]: Collaborator traits and their AWS/SSH adapters
//! - [`state`]: The file-backed idempotency state store
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! tasks:
//!   - key_pair:
//!       region: us-west-2
//!       key_name: web
//!   - instance:
//!       region: us-west-2
//!       image_id: ami-0abc1234
//!       instance_type: t3.micro
//!       security_group: web
//!       key_name: web
//!       instance_ref: web
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod cloud;
pub mod error;
pub mod plan;
pub mod provision;
pub mod provisioners;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use cloud::{CloudClient, Ec2CloudClient, KeyPairStorage, RemoteExecutor, SshExecutor};
pub use error::{CloudplanError, Result};
pub use plan::{Plan, PlanExecutor, RunDirection, RunReport, Task, TaskOutcome, TaskReport};
pub use provision::{
    ArgSet, Arguments, GlobalContext, Provisioner, ProvisionerInstance, ProvisionerSpec, Registry,
    TaskContext, TaskPhase,
};
pub use provisioners::{builtin_registry, Collaborators};
pub use state::StateStore;
