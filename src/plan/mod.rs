//! Plan parsing, validation, and execution.
//!
//! A plan is an ordered YAML document of `{slug: arguments}` tasks. This
//! module parses and validates plans ([`model`]) and drives them through
//! registered provisioners in declared order ([`executor`]).

mod executor;
mod model;

pub use executor::{PlanExecutor, RunDirection, RunReport, TaskOutcome, TaskReport};
pub use model::{Plan, Task};
