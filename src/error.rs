//! Error types for the cloudplan provisioning engine.
//!
//! This module provides the error hierarchy for all operations in the
//! plan execution lifecycle: provisioner configuration, registry lookup,
//! plan parsing, argument binding, precondition checks, collaborator
//! failures, and state persistence.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the cloudplan engine.
#[derive(Debug, Error)]
pub enum CloudplanError {
    /// Provisioner type self-check and startup configuration errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigurationError),

    /// Registry errors.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Plan parsing and execution errors.
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Provisioner lifecycle errors.
    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    /// State store errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised when a provisioner type fails its construction-time
/// self-check, or when required runtime configuration is missing.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A provisioner type is missing a mandatory descriptor field.
    #[error("Provisioner '{slug}' has not defined '{field}'")]
    MissingField {
        /// Slug of the offending type (or its name when the slug is the
        /// missing field).
        slug: String,
        /// Name of the missing descriptor field.
        field: &'static str,
    },

    /// A required/optional argument set was declared present but empty.
    ///
    /// An empty set must be expressed with the explicit `none` sentinel.
    #[error("Provisioner '{slug}' declares an empty '{which}' set; use the 'none' sentinel instead")]
    EmptyArgSet {
        /// Slug of the offending type.
        slug: String,
        /// Which arg set was empty (`required_args` or `optional_args`).
        which: &'static str,
    },

    /// A required environment variable is not set.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A provisioner with this slug has already been registered.
    #[error("Provisioner with slug '{slug}' has already been registered")]
    DuplicateSlug {
        /// The colliding slug.
        slug: String,
    },

    /// No provisioner is registered under this slug.
    #[error("No provisioner has been registered with slug '{slug}'")]
    UnknownSlug {
        /// The unresolved slug.
        slug: String,
    },
}

/// Plan parsing, validation, and execution errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan file was not found.
    #[error("Plan file not found: {path}")]
    FileNotFound {
        /// Path to the missing plan.
        path: PathBuf,
    },

    /// The plan document could not be parsed as YAML.
    #[error("Failed to parse plan: {message}")]
    Parse {
        /// Description of the parse error.
        message: String,
        /// Source location, if known.
        location: Option<String>,
    },

    /// The top-level document has no `tasks` key.
    #[error("Plan does not have a set of 'tasks'")]
    MissingTasks,

    /// The `tasks` value is not a sequence.
    #[error("The 'tasks' entry of the plan is not a sequence (found {found})")]
    TasksNotASequence {
        /// Human description of what was found instead.
        found: String,
    },

    /// A task entry is not a single-key mapping of slug to arguments.
    #[error("Task {index} is malformed: {detail}")]
    MalformedTask {
        /// Zero-based index of the offending task.
        index: usize,
        /// What exactly is wrong, including the key where determinable.
        detail: String,
    },

    /// Execution aborted at a specific task; no subsequent task ran.
    #[error("Plan execution aborted at task '{task}' (step {step} of {total}): {source}")]
    Aborted {
        /// Display name of the failing task.
        task: String,
        /// One-based step number in execution order.
        step: usize,
        /// Total number of tasks in the plan.
        total: usize,
        /// The underlying failure.
        #[source]
        source: Box<CloudplanError>,
    },
}

/// Provisioner lifecycle errors: binding, ordering, preconditions, and
/// collaborator failures.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// `verify`/`up`/`down` was called before `bind`.
    #[error("Provisioner '{slug}' was not bound to arguments; call bind first")]
    NotBound {
        /// Slug of the unbound provisioner.
        slug: String,
    },

    /// A lifecycle operation was invoked out of order.
    #[error("Cannot call '{operation}' on provisioner '{slug}' in phase {phase}")]
    OutOfOrder {
        /// The operation that was attempted.
        operation: &'static str,
        /// Slug of the provisioner.
        slug: String,
        /// The phase the instance was in.
        phase: String,
    },

    /// A required argument was not provided.
    #[error("Required argument '{name}' is not provided for provisioner '{slug}'")]
    MissingArgument {
        /// Name of the missing argument.
        name: String,
        /// Slug of the provisioner.
        slug: String,
    },

    /// An argument outside the declared schema was provided.
    #[error("The configured argument '{name}' is not an allowed argument for provisioner '{slug}'")]
    UnknownArgument {
        /// Name of the unexpected argument.
        name: String,
        /// Slug of the provisioner.
        slug: String,
    },

    /// A semantic precondition check failed during `verify` (or while a
    /// provisioner resolved its arguments).
    #[error("Precondition failed: {message}")]
    Precondition {
        /// Description of the violated rule.
        message: String,
    },

    /// An external collaborator operation failed.
    #[error("External operation failed: {0}")]
    External(#[from] ExternalError),

    /// The state store could not record or remove a reference.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Failures reported by external collaborators (cloud client, remote
/// executor, key storage).
///
/// `NotFound` is distinct from every other cause so teardown paths can
/// tolerate "resource confirmed absent" without masking authorization or
/// network failures.
#[derive(Debug, Error)]
pub enum ExternalError {
    /// The referenced resource does not exist on the collaborator's side.
    #[error("{resource} does not exist")]
    NotFound {
        /// Description of the absent resource.
        resource: String,
    },

    /// The collaborator operation failed for any other reason.
    #[error("{operation}: {message}")]
    Operation {
        /// The operation that failed.
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// A bounded wait for a remote resource to become ready ran out of
    /// attempts.
    #[error("Timed out waiting for {resource} after {waited_secs}s")]
    Timeout {
        /// Description of the resource being waited on.
        resource: String,
        /// Total seconds spent waiting.
        waited_secs: u64,
    },
}

/// State store errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// The state file exists but could not be read or parsed.
    #[error("Failed to load state from {path}: {message}")]
    Load {
        /// Path to the state file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The state file could not be rewritten.
    #[error("Failed to persist state to {path}: {message}")]
    Persist {
        /// Path to the state file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The in-memory state could not be serialized.
    #[error("State serialization error: {message}")]
    Serialize {
        /// Description of the failure.
        message: String,
    },

    /// No home directory is available to place the default state file.
    #[error("Cannot determine a home directory for the default state path")]
    NoHomeDir,
}

/// Result type alias for cloudplan operations.
pub type Result<T> = std::result::Result<T, CloudplanError>;

impl CloudplanError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl ProvisionError {
    /// Creates a precondition error with the given message.
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }
}

impl ExternalError {
    /// Creates an operation failure for the given operation.
    #[must_use]
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a not-found error for the given resource description.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Returns true if this failure means the resource is confirmed absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
