//! The provisioner lifecycle contract.
//!
//! Every resource handler implements [`Provisioner`]: a capability
//! descriptor ([`ProvisionerSpec`]) plus asynchronous `verify`/`up`/`down`
//! operations. The plan executor never talks to a handler directly; it
//! wraps one in a [`ProvisionerInstance`], the per-task state machine that
//! enforces bind-before-verify-before-apply ordering. Instances are created
//! per task invocation and discarded afterwards, never reused.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ConfigurationError, ProvisionError};
use crate::state::StateStore;

use super::args::{Arguments, GlobalContext, RESERVED_GLOBAL_ARGS};

/// A declared argument set, with an explicit sentinel for "takes none".
///
/// An empty named set is rejected by the descriptor self-check; a provisioner
/// that takes no required (or optional) arguments must say so with
/// [`ArgSet::None`].
#[derive(Debug, Clone)]
pub enum ArgSet {
    /// The provisioner declares no arguments of this kind.
    None,
    /// The provisioner declares these argument names.
    Named(BTreeSet<String>),
}

impl ArgSet {
    /// Builds a named set from a slice of argument names.
    #[must_use]
    pub fn named(names: &[&str]) -> Self {
        Self::Named(names.iter().map(|n| (*n).to_owned()).collect())
    }

    /// Returns true if the set contains `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Self::None => false,
            Self::Named(names) => names.contains(name),
        }
    }

    /// Returns the declared names, empty for the `None` sentinel.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::None => Vec::new(),
            Self::Named(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// The registered capability descriptor for one provisioner type.
#[derive(Debug, Clone)]
pub struct ProvisionerSpec {
    name: String,
    slug: String,
    description: String,
    required_args: ArgSet,
    optional_args: ArgSet,
}

impl ProvisionerSpec {
    /// Creates a descriptor, running the construction-time self-check.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if `name`, `slug`, or `description`
    /// is empty, or if a declared argument set is empty without using the
    /// [`ArgSet::None`] sentinel.
    pub fn new(
        name: impl Into<String>,
        slug: impl Into<String>,
        description: impl Into<String>,
        required_args: ArgSet,
        optional_args: ArgSet,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let slug = slug.into();
        let description = description.into();

        let ident = if slug.is_empty() { name.clone() } else { slug.clone() };

        if name.is_empty() {
            return Err(ConfigurationError::MissingField {
                slug: ident,
                field: "name",
            });
        }
        if slug.is_empty() {
            return Err(ConfigurationError::MissingField {
                slug: ident,
                field: "slug",
            });
        }
        if description.is_empty() {
            return Err(ConfigurationError::MissingField {
                slug: ident,
                field: "description",
            });
        }

        for (set, which) in [
            (&required_args, "required_args"),
            (&optional_args, "optional_args"),
        ] {
            if let ArgSet::Named(names) = set {
                if names.is_empty() {
                    return Err(ConfigurationError::EmptyArgSet { slug: ident, which });
                }
            }
        }

        Ok(Self {
            name,
            slug,
            description,
            required_args,
            optional_args,
        })
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the unique slug.
    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the required argument set.
    #[must_use]
    pub const fn required_args(&self) -> &ArgSet {
        &self.required_args
    }

    /// Returns the optional argument set.
    #[must_use]
    pub const fn optional_args(&self) -> &ArgSet {
        &self.optional_args
    }

    /// Renders the descriptor for documentation. Pure, no side effects.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Name: {}", self.name);
        let _ = writeln!(out, "Slug: {}", self.slug);
        let _ = writeln!(out, "Description: {}", self.description);

        for (set, title) in [
            (&self.required_args, "Required arguments:"),
            (&self.optional_args, "Optional arguments:"),
        ] {
            let _ = writeln!(out, "{title}");
            let names = set.names();
            if names.is_empty() {
                let _ = writeln!(out, "  (none)");
            } else {
                for arg in names {
                    let _ = writeln!(out, "  - {arg}");
                }
            }
        }

        out
    }
}

/// Execution context handed to a provisioner's `up`/`down` operation.
pub struct TaskContext<'a> {
    /// Display name of the current task.
    pub task_name: String,
    /// The bound, validated argument mapping (globals already merged).
    pub args: Arguments,
    /// When true, no external side effect and no state mutation may occur;
    /// the operation only describes what it would do.
    pub dry_run: bool,
    /// The shared idempotency state store.
    pub state: &'a mut StateStore,
}

/// The capability every resource handler implements.
///
/// Collaborators (cloud client, remote executor, key storage) are injected
/// at construction time; the engine only sees this trait.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Returns the capability descriptor for this handler.
    fn spec(&self) -> &ProvisionerSpec;

    /// Semantic precondition checks beyond argument presence: type checks,
    /// enum membership, cross-field consistency.
    async fn verify(&self, task_name: &str, args: &Arguments) -> Result<(), ProvisionError>;

    /// Idempotent creation of the resource.
    async fn up(&self, ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError>;

    /// Idempotent deletion of the resource.
    async fn down(&self, ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError>;
}

impl std::fmt::Debug for dyn Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("slug", &self.spec().slug())
            .finish()
    }
}

/// Lifecycle phase of a [`ProvisionerInstance`], per task and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// Freshly constructed, not yet bound to arguments.
    NotStarted,
    /// Arguments bound and schema-validated.
    Bound,
    /// Preconditions verified.
    Verified,
    /// `up` completed.
    Applied,
    /// `down` completed.
    Removed,
    /// A validation, precondition, or operation failure occurred.
    Failed,
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::NotStarted => "not-started",
            Self::Bound => "bound",
            Self::Verified => "verified",
            Self::Applied => "applied",
            Self::Removed => "removed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A registered provisioner type bound to one task invocation.
pub struct ProvisionerInstance {
    provisioner: Arc<dyn Provisioner>,
    args: Option<Arguments>,
    dry_run: bool,
    phase: TaskPhase,
}

impl ProvisionerInstance {
    /// Creates a fresh, unbound instance of a registered provisioner.
    #[must_use]
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            provisioner,
            args: None,
            dry_run: false,
            phase: TaskPhase::NotStarted,
        }
    }

    /// Marks the instance as dry-run before `up`/`down` is invoked.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Returns the provisioner's capability descriptor.
    #[must_use]
    pub fn spec(&self) -> &ProvisionerSpec {
        self.provisioner.spec()
    }

    /// Returns the current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> TaskPhase {
        self.phase
    }

    /// Returns the task's display name: the reserved `name` argument when
    /// bound and present, the slug otherwise.
    #[must_use]
    pub fn task_name(&self) -> String {
        self.args
            .as_ref()
            .and_then(|args| args.get("name"))
            .and_then(serde_yaml::Value::as_str)
            .unwrap_or_else(|| self.spec().slug())
            .to_owned()
    }

    /// Merges the global context over the task arguments, validates the
    /// result against the declared schema, and stores it on the instance.
    ///
    /// # Errors
    ///
    /// Returns `MissingArgument` if a required argument is absent, or
    /// `UnknownArgument` if a provided name is outside the declared schema
    /// and not a reserved global.
    pub fn bind(
        &mut self,
        mut args: Arguments,
        globals: &GlobalContext,
    ) -> Result<(), ProvisionError> {
        args.merge_globals(globals);

        let spec = self.provisioner.spec().clone();
        let slug = spec.slug().to_owned();

        for required in spec.required_args().names() {
            if !args.contains(required) {
                self.phase = TaskPhase::Failed;
                return Err(ProvisionError::MissingArgument {
                    name: required.to_owned(),
                    slug,
                });
            }
        }

        for provided in args.names() {
            let allowed = spec.required_args().contains(provided)
                || spec.optional_args().contains(provided)
                || RESERVED_GLOBAL_ARGS.contains(&provided)
                || globals.contains(provided);
            if !allowed {
                let name = provided.to_owned();
                self.phase = TaskPhase::Failed;
                return Err(ProvisionError::UnknownArgument { name, slug });
            }
        }

        self.args = Some(args);
        self.phase = TaskPhase::Bound;
        Ok(())
    }

    /// Runs the provisioner's precondition checks.
    ///
    /// # Errors
    ///
    /// Returns `NotBound` when called before `bind`, an out-of-order error
    /// when called in a later phase, or the provisioner's own precondition
    /// failure.
    pub async fn verify(&mut self) -> Result<(), ProvisionError> {
        let args = match self.phase {
            TaskPhase::Bound => self
                .args
                .as_ref()
                .cloned()
                .ok_or_else(|| ProvisionError::NotBound {
                    slug: self.spec().slug().to_owned(),
                })?,
            TaskPhase::NotStarted => {
                return Err(ProvisionError::NotBound {
                    slug: self.spec().slug().to_owned(),
                });
            }
            phase => {
                return Err(ProvisionError::OutOfOrder {
                    operation: "verify",
                    slug: self.spec().slug().to_owned(),
                    phase: phase.to_string(),
                });
            }
        };

        let task_name = self.task_name();
        match self.provisioner.verify(&task_name, &args).await {
            Ok(()) => {
                self.phase = TaskPhase::Verified;
                Ok(())
            }
            Err(e) => {
                self.phase = TaskPhase::Failed;
                Err(e)
            }
        }
    }

    /// Performs idempotent creation for this task.
    ///
    /// # Errors
    ///
    /// Returns `NotBound`/out-of-order errors when invoked before
    /// `bind`/`verify`, or the provisioner's own failure.
    pub async fn up(&mut self, state: &mut StateStore) -> Result<(), ProvisionError> {
        self.apply("up", state).await
    }

    /// Performs idempotent deletion for this task.
    ///
    /// # Errors
    ///
    /// Returns `NotBound`/out-of-order errors when invoked before
    /// `bind`/`verify`, or the provisioner's own failure.
    pub async fn down(&mut self, state: &mut StateStore) -> Result<(), ProvisionError> {
        self.apply("down", state).await
    }

    async fn apply(
        &mut self,
        operation: &'static str,
        state: &mut StateStore,
    ) -> Result<(), ProvisionError> {
        match self.phase {
            TaskPhase::Verified => {}
            TaskPhase::NotStarted => {
                return Err(ProvisionError::NotBound {
                    slug: self.spec().slug().to_owned(),
                });
            }
            phase => {
                return Err(ProvisionError::OutOfOrder {
                    operation,
                    slug: self.spec().slug().to_owned(),
                    phase: phase.to_string(),
                });
            }
        }

        let args = self
            .args
            .as_ref()
            .cloned()
            .ok_or_else(|| ProvisionError::NotBound {
                slug: self.spec().slug().to_owned(),
            })?;

        let mut ctx = TaskContext {
            task_name: self.task_name(),
            args,
            dry_run: self.dry_run,
            state,
        };

        let outcome = if operation == "up" {
            self.provisioner.up(&mut ctx).await
        } else {
            self.provisioner.down(&mut ctx).await
        };

        match outcome {
            Ok(()) => {
                self.phase = if operation == "up" {
                    TaskPhase::Applied
                } else {
                    TaskPhase::Removed
                };
                Ok(())
            }
            Err(e) => {
                self.phase = TaskPhase::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvisioner {
        spec: ProvisionerSpec,
    }

    impl EchoProvisioner {
        fn new() -> Self {
            let spec = ProvisionerSpec::new(
                "Echo provisioner",
                "echo",
                "Logs its arguments and touches nothing.",
                ArgSet::named(&["message"]),
                ArgSet::named(&["shout"]),
            )
            .expect("spec self-check failed");
            Self { spec }
        }
    }

    #[async_trait]
    impl Provisioner for EchoProvisioner {
        fn spec(&self) -> &ProvisionerSpec {
            &self.spec
        }

        async fn verify(&self, _task_name: &str, args: &Arguments) -> Result<(), ProvisionError> {
            args.str("message")?;
            Ok(())
        }

        async fn up(&self, _ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError> {
            Ok(())
        }

        async fn down(&self, _ctx: &mut TaskContext<'_>) -> Result<(), ProvisionError> {
            Ok(())
        }
    }

    fn args_from_yaml(doc: &str) -> Arguments {
        let mapping: serde_yaml::Mapping = serde_yaml::from_str(doc).expect("invalid YAML");
        Arguments::from_mapping(&mapping).expect("invalid mapping")
    }

    #[test]
    fn test_spec_self_check_rejects_missing_fields() {
        let err = ProvisionerSpec::new("", "slug", "desc", ArgSet::None, ArgSet::None)
            .expect_err("expected error");
        assert!(matches!(err, ConfigurationError::MissingField { field: "name", .. }));

        let err = ProvisionerSpec::new("Name", "", "desc", ArgSet::None, ArgSet::None)
            .expect_err("expected error");
        assert!(matches!(err, ConfigurationError::MissingField { field: "slug", .. }));

        let err = ProvisionerSpec::new("Name", "slug", "", ArgSet::None, ArgSet::None)
            .expect_err("expected error");
        assert!(matches!(err, ConfigurationError::MissingField { field: "description", .. }));
    }

    #[test]
    fn test_spec_self_check_rejects_empty_arg_set() {
        let err = ProvisionerSpec::new(
            "Name",
            "slug",
            "desc",
            ArgSet::Named(BTreeSet::new()),
            ArgSet::None,
        )
        .expect_err("expected error");
        assert!(matches!(err, ConfigurationError::EmptyArgSet { which: "required_args", .. }));
    }

    #[test]
    fn test_describe_lists_schema() {
        let provisioner = EchoProvisioner::new();
        let doc = provisioner.spec().describe();

        assert!(doc.contains("Echo provisioner"));
        assert!(doc.contains("Slug: echo"));
        assert!(doc.contains("- message"));
        assert!(doc.contains("- shout"));
    }

    #[tokio::test]
    async fn test_bind_rejects_missing_required_argument() {
        let mut instance = ProvisionerInstance::new(Arc::new(EchoProvisioner::new()));

        let err = instance
            .bind(Arguments::new(), &GlobalContext::new())
            .expect_err("expected error");
        assert!(matches!(err, ProvisionError::MissingArgument { .. }));
        assert_eq!(instance.phase(), TaskPhase::Failed);
    }

    #[tokio::test]
    async fn test_bind_rejects_unknown_argument() {
        let mut instance = ProvisionerInstance::new(Arc::new(EchoProvisioner::new()));

        let args = args_from_yaml("message: hi\nvolume: loud\n");
        let err = instance
            .bind(args, &GlobalContext::new())
            .expect_err("expected error");
        assert!(matches!(err, ProvisionError::UnknownArgument { ref name, .. } if name == "volume"));
    }

    #[tokio::test]
    async fn test_bind_allows_reserved_and_global_names() {
        let mut instance = ProvisionerInstance::new(Arc::new(EchoProvisioner::new()));

        let mut globals = GlobalContext::new();
        globals.insert("run_tag", serde_yaml::Value::from("nightly"));

        let args = args_from_yaml("message: hi\nname: greeting\naws_access_key: ak\n");
        instance.bind(args, &globals).expect("bind failed");

        assert_eq!(instance.phase(), TaskPhase::Bound);
        assert_eq!(instance.task_name(), "greeting");
    }

    #[tokio::test]
    async fn test_verify_before_bind_is_not_bound() {
        let mut instance = ProvisionerInstance::new(Arc::new(EchoProvisioner::new()));

        let err = instance.verify().await.expect_err("expected error");
        assert!(matches!(err, ProvisionError::NotBound { .. }));
    }

    #[tokio::test]
    async fn test_up_before_verify_is_out_of_order() {
        let mut instance = ProvisionerInstance::new(Arc::new(EchoProvisioner::new()));
        let mut state = StateStore::in_memory();

        instance
            .bind(args_from_yaml("message: hi\n"), &GlobalContext::new())
            .expect("bind failed");

        let err = instance.up(&mut state).await.expect_err("expected error");
        assert!(matches!(err, ProvisionError::OutOfOrder { operation: "up", .. }));
    }

    #[tokio::test]
    async fn test_full_setup_lifecycle() {
        let mut instance = ProvisionerInstance::new(Arc::new(EchoProvisioner::new()));
        let mut state = StateStore::in_memory();

        instance
            .bind(args_from_yaml("message: hi\n"), &GlobalContext::new())
            .expect("bind failed");
        instance.verify().await.expect("verify failed");
        instance.up(&mut state).await.expect("up failed");

        assert_eq!(instance.phase(), TaskPhase::Applied);
    }

    #[tokio::test]
    async fn test_verify_failure_moves_to_failed() {
        let mut instance = ProvisionerInstance::new(Arc::new(EchoProvisioner::new()));

        // "message" bound but null fails the provisioner's own check
        instance
            .bind(args_from_yaml("message:\n"), &GlobalContext::new())
            .expect("bind failed");
        let err = instance.verify().await.expect_err("expected error");
        assert!(matches!(err, ProvisionError::Precondition { .. }));
        assert_eq!(instance.phase(), TaskPhase::Failed);
    }
}
