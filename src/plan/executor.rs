//! Ordered plan execution.
//!
//! Setup drives every task through `bind -> verify -> up` in declared
//! order; teardown drives `bind -> verify -> down` in exact reverse order.
//! Every slug is resolved against the registry before any task runs, so a
//! typo anywhere in the plan aborts with zero provisioner invocations.
//! Execution stops at the first failure and wraps it with the failing
//! task's name and position.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{CloudplanError, PlanError, Result};
use crate::provision::{GlobalContext, ProvisionerInstance, Registry};
use crate::state::StateStore;

use super::model::{Plan, Task};

/// Which way a run walks the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunDirection {
    /// Declared order, `up` on every task.
    Setup,
    /// Exact reverse of declared order, `down` on every task.
    Teardown,
}

impl std::fmt::Display for RunDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Teardown => f.write_str("teardown"),
        }
    }
}

/// How one task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    /// `up` completed.
    Applied,
    /// `down` completed.
    Removed,
    /// The task only described what it would do.
    DryRun,
}

/// Timing and outcome of one executed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    /// Zero-based position in the declared order.
    pub index: usize,
    /// The provisioner slug.
    pub slug: String,
    /// The task's display name.
    pub task: String,
    /// Wall-clock milliseconds spent on the task.
    pub elapsed_ms: u64,
    /// How the task finished.
    pub outcome: TaskOutcome,
}

/// Summary of one full plan run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Which way the plan was walked.
    pub direction: RunDirection,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Per-task reports in execution order.
    pub tasks: Vec<TaskReport>,
    /// Total wall-clock milliseconds.
    pub elapsed_ms: u64,
}

/// Drives a parsed plan through the registry, in order, against one state
/// store.
pub struct PlanExecutor<'a> {
    plan: &'a Plan,
    registry: &'a Registry,
    state: &'a mut StateStore,
    globals: GlobalContext,
}

impl<'a> PlanExecutor<'a> {
    /// Creates an executor over a plan, a registry, and a state store.
    #[must_use]
    pub fn new(
        plan: &'a Plan,
        registry: &'a Registry,
        state: &'a mut StateStore,
        globals: GlobalContext,
    ) -> Self {
        Self {
            plan,
            registry,
            state,
            globals,
        }
    }

    /// Runs `up` on every task in declared order.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::Aborted` wrapping the first task failure; no
    /// subsequent task runs.
    pub async fn setup(&mut self) -> Result<RunReport> {
        self.run(RunDirection::Setup, false).await
    }

    /// Runs `down` on every task in exact reverse declared order.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::Aborted` wrapping the first task failure; no
    /// subsequent task runs.
    pub async fn teardown(&mut self) -> Result<RunReport> {
        self.run(RunDirection::Teardown, false).await
    }

    /// Validates and describes a setup without side effects.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::Aborted` wrapping the first bind or verify
    /// failure.
    pub async fn dry_run_setup(&mut self) -> Result<RunReport> {
        self.run(RunDirection::Setup, true).await
    }

    /// Validates and describes a teardown without side effects.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::Aborted` wrapping the first bind or verify
    /// failure.
    pub async fn dry_run_teardown(&mut self) -> Result<RunReport> {
        self.run(RunDirection::Teardown, true).await
    }

    async fn run(&mut self, direction: RunDirection, dry_run: bool) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let run_started = Instant::now();
        let total = self.plan.len();

        info!(
            "Run {run_id}: {direction} of {total} tasks{}",
            if dry_run { " (dry run)" } else { "" }
        );

        // resolve every slug before anything executes
        for task in self.plan.tasks() {
            self.registry.get(&task.slug)?;
        }

        let ordered: Vec<&Task> = match direction {
            RunDirection::Setup => self.plan.tasks().iter().collect(),
            RunDirection::Teardown => self.plan.tasks().iter().rev().collect(),
        };

        let mut reports = Vec::with_capacity(total);
        for (step, task) in ordered.into_iter().enumerate() {
            let task_started = Instant::now();
            let task_name = task.display_name().to_owned();
            info!(
                "Run {run_id}: [{}/{total}] {direction} '{task_name}' ({})",
                step + 1,
                task.slug
            );

            self.execute_task(task, direction, dry_run)
                .await
                .map_err(|e| {
                    CloudplanError::Plan(PlanError::Aborted {
                        task: task_name.clone(),
                        step: step + 1,
                        total,
                        source: Box::new(e),
                    })
                })?;

            let elapsed_ms = u64::try_from(task_started.elapsed().as_millis())
                .unwrap_or(u64::MAX);
            reports.push(TaskReport {
                index: task.index,
                slug: task.slug.clone(),
                task: task_name,
                elapsed_ms,
                outcome: if dry_run {
                    TaskOutcome::DryRun
                } else {
                    match direction {
                        RunDirection::Setup => TaskOutcome::Applied,
                        RunDirection::Teardown => TaskOutcome::Removed,
                    }
                },
            });
        }

        let elapsed_ms = u64::try_from(run_started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!("Run {run_id}: {direction} finished in {elapsed_ms}ms");
        Ok(RunReport {
            run_id,
            direction,
            dry_run,
            started_at,
            tasks: reports,
            elapsed_ms,
        })
    }

    async fn execute_task(
        &mut self,
        task: &Task,
        direction: RunDirection,
        dry_run: bool,
    ) -> Result<()> {
        let provisioner = self.registry.get(&task.slug)?;
        let mut instance = ProvisionerInstance::new(provisioner).with_dry_run(dry_run);

        instance.bind(task.arguments.clone(), &self.globals)?;
        instance.verify().await?;
        match direction {
            RunDirection::Setup => instance.up(self.state).await?,
            RunDirection::Teardown => instance.down(self.state).await?,
        }
        Ok(())
    }

    /// Renders the registered provisioners' documentation.
    #[must_use]
    pub fn documentation(registry: &Registry) -> String {
        let mut out = String::new();
        for provisioner in registry.list() {
            out.push_str(&provisioner.spec().describe());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::error::{ConfigurationError, ProvisionError};
    use crate::provision::{
        ArgSet, Arguments, Provisioner, ProvisionerSpec, TaskContext,
    };

    use super::*;

    /// Records every lifecycle call as `"<op>:<task>"`.
    struct RecordingProvisioner {
        spec: ProvisionerSpec,
        events: Arc<Mutex<Vec<String>>>,
        fail_up_on: Option<String>,
    }

    impl RecordingProvisioner {
        fn new(
            slug: &str,
            events: Arc<Mutex<Vec<String>>>,
        ) -> std::result::Result<Self, ConfigurationError> {
            Ok(Self {
                spec: ProvisionerSpec::new(
                    slug.to_uppercase(),
                    slug,
                    "records lifecycle calls",
                    ArgSet::None,
                    ArgSet::None,
                )?,
                events,
                fail_up_on: None,
            })
        }

        fn failing_on(mut self, task_name: &str) -> Self {
            self.fail_up_on = Some(task_name.to_owned());
            self
        }

        fn record(&self, op: &str, task_name: &str) {
            self.events.lock().unwrap().push(format!("{op}:{task_name}"));
        }
    }

    #[async_trait]
    impl Provisioner for RecordingProvisioner {
        fn spec(&self) -> &ProvisionerSpec {
            &self.spec
        }

        async fn verify(
            &self,
            task_name: &str,
            _args: &Arguments,
        ) -> std::result::Result<(), ProvisionError> {
            self.record("verify", task_name);
            Ok(())
        }

        async fn up(&self, ctx: &mut TaskContext<'_>) -> std::result::Result<(), ProvisionError> {
            self.record("up", &ctx.task_name);
            if self.fail_up_on.as_deref() == Some(ctx.task_name.as_str()) {
                return Err(ProvisionError::precondition("injected failure"));
            }
            if !ctx.dry_run {
                ctx.state
                    .set(ctx.task_name.clone(), serde_yaml::Value::from("done"))?;
            }
            Ok(())
        }

        async fn down(&self, ctx: &mut TaskContext<'_>) -> std::result::Result<(), ProvisionError> {
            self.record("down", &ctx.task_name);
            if !ctx.dry_run {
                ctx.state.delete(&ctx.task_name)?;
            }
            Ok(())
        }
    }

    fn recording_registry(events: &Arc<Mutex<Vec<String>>>) -> Registry {
        let mut registry = Registry::default();
        registry
            .register(Arc::new(
                RecordingProvisioner::new("alpha", Arc::clone(events)).unwrap(),
            ))
            .unwrap();
        registry
            .register(Arc::new(
                RecordingProvisioner::new("beta", Arc::clone(events)).unwrap(),
            ))
            .unwrap();
        registry
    }

    fn three_task_plan() -> Plan {
        Plan::parse(
            "tasks:\n  - alpha: {name: one}\n  - beta: {name: two}\n  - alpha: {name: three}\n",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_setup_runs_tasks_in_declared_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let registry = recording_registry(&events);
        let plan = three_task_plan();
        let mut state = StateStore::in_memory();

        let report = PlanExecutor::new(&plan, &registry, &mut state, GlobalContext::new())
            .setup()
            .await
            .expect("setup failed");

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "verify:one", "up:one", "verify:two", "up:two", "verify:three", "up:three"
            ]
        );
        assert_eq!(report.direction, RunDirection::Setup);
        assert_eq!(report.tasks.len(), 3);
        assert!(report.tasks.iter().all(|t| t.outcome == TaskOutcome::Applied));
    }

    #[tokio::test]
    async fn test_teardown_runs_exact_reverse_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let registry = recording_registry(&events);
        let plan = three_task_plan();
        let mut state = StateStore::in_memory();

        PlanExecutor::new(&plan, &registry, &mut state, GlobalContext::new())
            .teardown()
            .await
            .expect("teardown failed");

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "verify:three",
                "down:three",
                "verify:two",
                "down:two",
                "verify:one",
                "down:one"
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_before_later_tasks() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::default();
        registry
            .register(Arc::new(
                RecordingProvisioner::new("alpha", Arc::clone(&events)).unwrap(),
            ))
            .unwrap();
        registry
            .register(Arc::new(
                RecordingProvisioner::new("beta", Arc::clone(&events))
                    .unwrap()
                    .failing_on("two"),
            ))
            .unwrap();
        let plan = three_task_plan();
        let mut state = StateStore::in_memory();

        let err = PlanExecutor::new(&plan, &registry, &mut state, GlobalContext::new())
            .setup()
            .await
            .expect_err("setup succeeded");

        match err {
            CloudplanError::Plan(PlanError::Aborted { task, step, total, .. }) => {
                assert_eq!(task, "two");
                assert_eq!(step, 2);
                assert_eq!(total, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        // the completed first task is kept, nothing after the failure ran
        assert!(state.contains("one"));
        assert!(!events.lock().unwrap().iter().any(|e| e.contains("three")));
    }

    #[tokio::test]
    async fn test_unknown_slug_means_zero_invocations() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let registry = recording_registry(&events);
        let plan = Plan::parse("tasks:\n  - alpha: {name: one}\n  - missing: {}\n").unwrap();
        let mut state = StateStore::in_memory();

        let result = PlanExecutor::new(&plan, &registry, &mut state, GlobalContext::new())
            .setup()
            .await;

        assert!(result.is_err());
        assert!(events.lock().unwrap().is_empty());
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_bind_failure_stops_before_verify() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let registry = recording_registry(&events);
        // 'alpha' declares no arguments, 'bogus' is unknown
        let plan = Plan::parse("tasks:\n  - alpha: {bogus: 1}\n").unwrap();
        let mut state = StateStore::in_memory();

        let err = PlanExecutor::new(&plan, &registry, &mut state, GlobalContext::new())
            .setup()
            .await
            .expect_err("setup succeeded");

        assert!(matches!(err, CloudplanError::Plan(PlanError::Aborted { .. })));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_leaves_state_untouched() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let registry = recording_registry(&events);
        let plan = three_task_plan();
        let mut state = StateStore::in_memory();
        state
            .set("pre-existing", serde_yaml::Value::from("kept"))
            .unwrap();
        let snapshot = state.snapshot();

        let report = PlanExecutor::new(&plan, &registry, &mut state, GlobalContext::new())
            .dry_run_setup()
            .await
            .expect("dry run failed");

        assert_eq!(state.snapshot(), snapshot);
        assert!(report.dry_run);
        assert!(report.tasks.iter().all(|t| t.outcome == TaskOutcome::DryRun));
    }

    #[tokio::test]
    async fn test_globals_reach_every_task() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let registry = recording_registry(&events);
        // no task declares 'name'; it arrives via the global context
        let plan = Plan::parse("tasks:\n  - alpha: {}\n").unwrap();
        let mut state = StateStore::in_memory();
        let mut globals = GlobalContext::new();
        globals.insert("name", serde_yaml::Value::from("from-globals"));

        PlanExecutor::new(&plan, &registry, &mut state, globals)
            .setup()
            .await
            .expect("setup failed");

        assert_eq!(
            *events.lock().unwrap(),
            vec!["verify:from-globals", "up:from-globals"]
        );
    }

    #[test]
    fn test_documentation_lists_every_slug() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let registry = recording_registry(&events);

        let docs = PlanExecutor::documentation(&registry);
        assert!(docs.contains("Slug: alpha"));
        assert!(docs.contains("Slug: beta"));
    }
}
