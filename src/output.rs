// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes for run reports and status tables.

use crate::runner::RunReport;
use crate::task::{TaskOutcome, TaskReport};
use crate::workflow::ServiceStatus;
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    #[default]
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// One row of `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub id: String,
    pub role: String,
    pub host: String,
    pub container: String,
    pub status: ServiceStatus,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit_stdout(&JsonEvent {
                event: "success",
                message,
                duration_secs: self.duration(),
            }),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }

    /// One line per Task; quiet mode prints failures only.
    pub fn run_report(&self, report: &RunReport) {
        for task in report.reports() {
            match self.mode {
                OutputMode::Normal => println!("{}", task_line(task)),
                OutputMode::Quiet if !task.is_success() => println!("{}", task_line(task)),
                OutputMode::Quiet => {}
                OutputMode::Json => self.emit_stdout(&TaskEvent::from(task)),
            }
            if self.mode == OutputMode::Normal {
                for warning in task.diagnostics.warnings() {
                    println!("    warning: {warning}");
                }
            }
        }
    }

    pub fn status_table(&self, rows: &[StatusRow]) {
        match self.mode {
            OutputMode::Json => {
                for row in rows {
                    self.emit_stdout(row);
                }
            }
            OutputMode::Normal | OutputMode::Quiet => print!("{}", render_table(rows)),
        }
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    fn emit_stdout<T: Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string(value) {
            println!("{json}");
        }
    }
}

/// `[deploy] c1_mds_host1_0 @ root@host1:22 ... completed`
pub fn task_line(task: &TaskReport) -> String {
    let marker = match task.outcome {
        TaskOutcome::Failed(_) => "✗",
        TaskOutcome::Completed => "✓",
        TaskOutcome::Skipped | TaskOutcome::Broken => "-",
    };
    format!(
        "{marker} [{}] {} @ {} ... {}",
        task.name, task.subname, task.target, task.outcome
    )
}

pub fn render_table(rows: &[StatusRow]) -> String {
    const HEADERS: [&str; 5] = ["Id", "Role", "Host", "Container", "Status"];
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|r| {
            [
                r.id.clone(),
                r.role.clone(),
                r.host.clone(),
                r.container.clone(),
                r.status.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut line = |values: [&str; 5]| {
        let joined = values
            .iter()
            .zip(widths)
            .map(|(v, w)| format!("{v:<w$}"))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(out, "{}", joined.trim_end());
    };
    line(HEADERS);
    for row in &cells {
        line([
            row[0].as_str(),
            row[1].as_str(),
            row[2].as_str(),
            row[3].as_str(),
            row[4].as_str(),
        ]);
    }
    out
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct TaskEvent<'a> {
    event: &'static str,
    task: &'a str,
    subname: &'a str,
    target: &'a str,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    steps: Vec<&'a str>,
    warnings: Vec<String>,
    duration_secs: f64,
}

impl<'a> From<&'a TaskReport> for TaskEvent<'a> {
    fn from(task: &'a TaskReport) -> Self {
        Self {
            event: "task",
            task: &task.name,
            subname: &task.subname,
            target: &task.target,
            outcome: task.outcome.label(),
            code: task.outcome.error().map(|e| e.code()),
            error: task.outcome.error().map(ToString::to_string),
            steps: task.steps.iter().map(|s| s.name.as_str()).collect(),
            warnings: task
                .diagnostics
                .warnings()
                .iter()
                .map(ToString::to_string)
                .collect(),
            duration_secs: task.duration.as_secs_f64(),
        }
    }
}
