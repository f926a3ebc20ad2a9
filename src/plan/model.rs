//! Plan document model and validator.
//!
//! A plan document has one recognized top-level key, `tasks`, holding an
//! ordered sequence of single-key mappings: the key is a provisioner slug,
//! the value a mapping of argument name to value. Unrecognized top-level
//! keys are ignored. Validation is all-or-nothing ahead of execution: a
//! malformed document never executes any task.

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::{debug, info};

use crate::error::{CloudplanError, PlanError, Result};
use crate::provision::Arguments;

/// One `{slug: arguments}` entry of a plan.
#[derive(Debug, Clone)]
pub struct Task {
    /// The provisioner slug this task targets.
    pub slug: String,
    /// The plan-supplied argument mapping.
    pub arguments: Arguments,
    /// Zero-based position in the declared order.
    pub index: usize,
}

impl Task {
    /// Returns the task's display name: the `name` argument when present,
    /// the slug otherwise.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.arguments
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&self.slug)
    }
}

/// An ordered, validated sequence of tasks.
#[derive(Debug, Clone)]
pub struct Plan {
    tasks: Vec<Task>,
    source: Option<PathBuf>,
}

impl Plan {
    /// Loads and validates a plan from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, or fails any
    /// validation rule.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading plan from: {}", path.display());

        if !path.exists() {
            return Err(CloudplanError::Plan(PlanError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CloudplanError::Plan(PlanError::Parse {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let mut plan = Self::parse(&content)?;
        plan.source = Some(path.to_path_buf());
        Ok(plan)
    }

    /// Parses and validates a plan from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns a `PlanError` describing the first violated rule, with the
    /// task index and key where determinable.
    pub fn parse(content: &str) -> Result<Self> {
        debug!("Validating plan document");

        let doc: Value = serde_yaml::from_str(content).map_err(|e| {
            CloudplanError::Plan(PlanError::Parse {
                message: format!("YAML parse error: {e}"),
                location: None,
            })
        })?;

        let Some(mapping) = doc.as_mapping() else {
            return Err(CloudplanError::Plan(PlanError::MissingTasks));
        };

        let Some(tasks_value) = mapping.get("tasks") else {
            return Err(CloudplanError::Plan(PlanError::MissingTasks));
        };

        let Some(entries) = tasks_value.as_sequence() else {
            return Err(CloudplanError::Plan(PlanError::TasksNotASequence {
                found: type_name(tasks_value).to_owned(),
            }));
        };

        let mut tasks = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            tasks.push(Self::validate_task(index, entry)?);
        }

        debug!("Plan validated: {} tasks", tasks.len());
        Ok(Self {
            tasks,
            source: None,
        })
    }

    /// Validates one task entry: a mapping with exactly one string key
    /// whose value is a mapping of argument names to values.
    fn validate_task(index: usize, entry: &Value) -> Result<Task> {
        let Some(mapping) = entry.as_mapping() else {
            return Err(CloudplanError::Plan(PlanError::MalformedTask {
                index,
                detail: format!("expected a single-key mapping, found {}", type_name(entry)),
            }));
        };

        if mapping.len() != 1 {
            return Err(CloudplanError::Plan(PlanError::MalformedTask {
                index,
                detail: format!(
                    "a task must have exactly 1 top-level key, found {}",
                    mapping.len()
                ),
            }));
        }

        // len() == 1 makes this unwrap-free destructuring safe
        let Some((key, value)) = mapping.iter().next() else {
            return Err(CloudplanError::Plan(PlanError::MalformedTask {
                index,
                detail: String::from("a task must have exactly 1 top-level key, found 0"),
            }));
        };

        let Some(slug) = key.as_str() else {
            return Err(CloudplanError::Plan(PlanError::MalformedTask {
                index,
                detail: format!("task key {key:?} is not a string slug"),
            }));
        };

        let arguments = match value {
            Value::Mapping(args) => Arguments::from_mapping(args).map_err(|detail| {
                CloudplanError::Plan(PlanError::MalformedTask {
                    index,
                    detail: format!("task '{slug}': {detail}"),
                })
            })?,
            Value::Null => Arguments::new(),
            other => {
                return Err(CloudplanError::Plan(PlanError::MalformedTask {
                    index,
                    detail: format!(
                        "task '{slug}': arguments must be a mapping, found {}",
                        type_name(other)
                    ),
                }));
            }
        };

        Ok(Task {
            slug: slug.to_owned(),
            arguments,
            index,
        })
    }

    /// Returns the tasks in declared order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if the plan declares no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns the file path the plan was loaded from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

/// Human-readable YAML node kind for error messages.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
