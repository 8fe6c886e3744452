//! CLI output formatting

use crate::{
    core::{
        report::{format_duration_ms, BatchReport},
        RunStatus,
    },
    execution::{LaunchEvent, LogLevel},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static CHART: Emoji<'_, '_> = Emoji("📊 ", "# ");

/// Create a batch progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(bar_style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a run status for display
pub fn format_status(status: &RunStatus) -> String {
    let text = status.to_string();
    match status {
        RunStatus::Completed => style(text).green().to_string(),
        RunStatus::Init | RunStatus::Pending | RunStatus::Running => style(text).yellow().to_string(),
        RunStatus::Unknown | RunStatus::Other(_) => style(text).dim().to_string(),
        _ => style(text).red().to_string(),
    }
}

fn status_icon(status: &RunStatus) -> Emoji<'static, 'static> {
    if status.is_success() {
        CHECK
    } else if status.is_terminal() {
        CROSS
    } else {
        SPINNER
    }
}

/// Format a launcher event; `None` for events not worth a line
pub fn format_launch_event(event: &LaunchEvent, verbose: bool) -> Option<String> {
    match event {
        LaunchEvent::BatchStarted { batch_id, env, total } => Some(format!(
            "{} Launching {} pipelines in {} ({})",
            ROCKET,
            style(total).cyan(),
            style(env).bold(),
            style(&batch_id.to_string()[..8]).dim()
        )),
        LaunchEvent::Log {
            run,
            level,
            message,
            ..
        } => {
            let icon = match level {
                LogLevel::Debug if !verbose => return None,
                LogLevel::Debug | LogLevel::Info => INFO,
                LogLevel::Warn => WARN,
                LogLevel::Error => CROSS,
            };
            Some(format!("{}[{}] {}", icon, style(run).cyan(), message))
        }
        LaunchEvent::Progress { run, status, .. } => Some(format!(
            "{}[{}] Status: {}",
            CHART,
            style(run).cyan(),
            format_status(status)
        )),
        LaunchEvent::RunFinished { result, .. } => Some(format!(
            "{}{} {}",
            status_icon(&result.status),
            style(&result.name).bold(),
            format_status(&result.status)
        )),
        LaunchEvent::BatchDone { results, .. } => {
            let passed = results.iter().filter(|r| r.status.is_success()).count();
            Some(format!(
                "{} Batch done: {}/{} completed",
                INFO,
                style(passed).green(),
                results.len()
            ))
        }
    }
}

/// Render the per-run table of a report, fitted to the terminal width
pub fn format_report_table(report: &BatchReport) -> String {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(100);

    let name_width = report
        .rows
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(4)
        .clamp(4, 32);
    let status_width = report
        .rows
        .iter()
        .map(|r| r.status.to_string().chars().count())
        .max()
        .unwrap_or(6)
        .max(6);

    let mut lines = Vec::new();
    lines.push(format!(
        "{:<name_width$}  {:<status_width$}  {:>8}  {:<12}  {}",
        "NAME", "STATUS", "DURATION", "EXECUTOR", "RUN / LINK"
    ));
    lines.push("─".repeat(width.min(160)));

    for row in &report.rows {
        let name: String = row.name.chars().take(name_width).collect();
        // Pad before styling; escape codes would throw off the widths
        let status = format!("{:<status_width$}", row.status.to_string());
        let status = if row.status.is_success() {
            style(status).green().to_string()
        } else {
            style(status).red().to_string()
        };
        lines.push(format!(
            "{:<name_width$}  {}  {:>8}  {:<12}  {} {}",
            name,
            status,
            format_duration_ms(row.duration_ms),
            row.executor,
            row.run_id,
            style(&row.detail_url).dim()
        ));
        if let Some(error) = &row.error {
            lines.push(format!("{:name_width$}  {}", "", style(error).red()));
        }
    }

    lines.join("\n")
}

/// One-line summary of a report
pub fn format_report_summary(report: &BatchReport) -> String {
    let icon = if report.all_passed() { CHECK } else { CROSS };
    format!(
        "{}{} - {} - {} - {}/{} passed ({}%)",
        icon,
        style(&report.batch_id.to_string()[..8]).dim(),
        style(&report.env).bold(),
        style(report.started_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        report.passed,
        report.total,
        style(report.pass_rate()).cyan()
    )
}
