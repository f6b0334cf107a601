// crates/cli/src/render.rs
//! Terminal formatting for snapshots, events and steps.

use indicatif::ProgressStyle;
use opwatch_types::{
    ConnectionState, LifecycleStatus, OperationEvent, OperationSnapshot, ProgressSource,
    StepRecord,
};

/// `42s`, `3m 07s`, `1h 02m 03s`.
pub fn format_elapsed(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

fn source_label(source: ProgressSource) -> &'static str {
    match source {
        ProgressSource::None => "waiting",
        ProgressSource::Live => "live",
        ProgressSource::EventLog => "from log",
        ProgressSource::StepHistory => "from history",
    }
}

/// One-line status for a running operation.
pub fn status_line(snapshot: &OperationSnapshot) -> String {
    let progress = &snapshot.progress;
    let mut parts = Vec::new();

    match (progress.step_index, progress.total_steps) {
        (Some(index), Some(total)) if !progress.current_step.is_empty() => {
            parts.push(format!("step {index}/{total} {}", progress.current_step));
        }
        (Some(index), Some(total)) => parts.push(format!("step {index}/{total}")),
        _ if !progress.current_step.is_empty() => parts.push(progress.current_step.clone()),
        _ => {}
    }
    parts.push(format_elapsed(snapshot.display_elapsed_seconds));
    parts.push(source_label(progress.source).to_string());

    match snapshot.connection {
        ConnectionState::Error => parts.push("stream lost, retrying".into()),
        ConnectionState::Connecting => parts.push("connecting".into()),
        _ => {}
    }
    if snapshot.malformed_frames > 0 {
        parts.push(format!("{} bad frames", snapshot.malformed_frames));
    }
    parts.join(" · ")
}

/// Final line for a terminal operation.
pub fn summary_line(snapshot: &OperationSnapshot) -> String {
    let elapsed = format_elapsed(snapshot.display_elapsed_seconds);
    match snapshot.lifecycle {
        LifecycleStatus::Completed => format!("completed in {elapsed}"),
        LifecycleStatus::Failed => match snapshot.progress.current_step.as_str() {
            "" => format!("failed after {elapsed}"),
            step => format!("failed at {step} after {elapsed}"),
        },
        LifecycleStatus::Cancelled => format!("cancelled after {elapsed}"),
        other => other.as_str().to_string(),
    }
}

pub fn format_event(event: &OperationEvent) -> String {
    let mut line = String::new();
    if !event.timestamp.is_empty() {
        line.push_str(&event.timestamp);
        line.push(' ');
    }
    line.push_str(&format!("{:<7}", event.severity.as_str().to_uppercase()));
    if let Some(step) = &event.step {
        line.push_str(&format!(" [{step}]"));
    }
    if !event.text.is_empty() {
        line.push(' ');
        line.push_str(&event.text);
    }
    line
}

pub fn format_step(step: &StepRecord) -> String {
    let mark = if step.success { "ok  " } else { "FAIL" };
    let mut line = format!("{mark} {} ({:.1}s)", step.step, step.duration_seconds);
    if let Some(err) = &step.error_message {
        line.push_str(&format!(": {err}"));
    }
    line
}

/// Bar styles for the three states an operation line can be in.
pub struct Styles {
    pub active: ProgressStyle,
    pub done: ProgressStyle,
    pub failed: ProgressStyle,
}

impl Styles {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            active: ProgressStyle::with_template(
                "{prefix:.bold} [{bar:30.cyan/blue}] {pos:>3}%  {msg}",
            )?
            .progress_chars("=> "),
            done: ProgressStyle::with_template("{prefix:.bold} [{bar:30.green}] {pos:>3}%  {msg:.green}")?
                .progress_chars("=> "),
            failed: ProgressStyle::with_template("{prefix:.bold} [{bar:30.red}] {pos:>3}%  {msg:.red}")?
                .progress_chars("=> "),
        })
    }

    pub fn for_terminal(&self, lifecycle: LifecycleStatus) -> ProgressStyle {
        match lifecycle {
            LifecycleStatus::Completed => self.done.clone(),
            _ => self.failed.clone(),
        }
    }
}
