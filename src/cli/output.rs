//! Output formatting for CLI commands.
//!
//! This module renders run reports, provisioner documentation, and state
//! contents as text or JSON.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::plan::{RunDirection, RunReport, TaskOutcome};
use crate::state::StateStore;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Executed task row for table display.
#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "#")]
    step: usize,
    #[tabled(rename = "Task")]
    task: String,
    #[tabled(rename = "Provisioner")]
    slug: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Elapsed")]
    elapsed: String,
}

/// State entry row for table display.
#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Reference")]
    reference: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a run report for display.
    #[must_use]
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    fn format_report_text(report: &RunReport) -> String {
        let mut output = String::new();

        let direction = match report.direction {
            RunDirection::Setup => "Setup",
            RunDirection::Teardown => "Teardown",
        };
        let suffix = if report.dry_run { " (dry run)" } else { "" };
        let _ = writeln!(output, "\n{direction} run {}{suffix}", report.run_id);

        let rows: Vec<TaskRow> = report
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| TaskRow {
                step: i + 1,
                task: t.task.clone(),
                slug: t.slug.clone(),
                outcome: Self::format_outcome(t.outcome),
                elapsed: format!("{}ms", t.elapsed_ms),
            })
            .collect();
        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let _ = writeln!(
            output,
            "\n{} {} tasks in {}ms",
            "✓".green(),
            report.tasks.len(),
            report.elapsed_ms
        );
        output
    }

    fn format_outcome(outcome: TaskOutcome) -> String {
        match outcome {
            TaskOutcome::Applied => "applied".green().to_string(),
            TaskOutcome::Removed => "removed".red().to_string(),
            TaskOutcome::DryRun => "dry-run".yellow().to_string(),
        }
    }

    /// Formats the provisioner documentation for display.
    #[must_use]
    pub fn format_docs(&self, docs: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&serde_json::json!({ "documentation": docs }))
                    .unwrap_or_default()
            }
            OutputFormat::Text => docs.to_owned(),
        }
    }

    /// Formats the state store contents for display.
    #[must_use]
    pub fn format_state(&self, state: &StateStore) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&state.snapshot()).unwrap_or_default()
            }
            OutputFormat::Text => {
                if state.is_empty() {
                    return format!("{} No state recorded.\n", "✓".green());
                }

                let rows: Vec<StateRow> = state
                    .entries()
                    .map(|(key, value)| StateRow {
                        reference: key.clone(),
                        value: serde_yaml::to_string(value)
                            .unwrap_or_default()
                            .trim_end()
                            .to_owned(),
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }
}
