//! Plain-text rendering of a session snapshot.
use crate::core::reconcile::ViewMode;
use crate::session::{HistoryEntry, ViewSnapshot};
use std::fmt::Write;
use std::time::Duration as StdDuration;

pub fn render(snapshot: &ViewSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "flow {} | {} | {} | {} | {}",
        snapshot.flow_id,
        mode_label(&snapshot.view_mode),
        snapshot.summary,
        format_elapsed(snapshot.elapsed_ms),
        snapshot.connection.state.as_str()
    );

    match &snapshot.view_mode {
        ViewMode::History | ViewMode::Waiting => {
            if snapshot.history.is_empty() {
                let _ = writeln!(out, "  (no runs)");
            }
            for entry in &snapshot.history {
                let _ = writeln!(out, "{}", history_line(entry));
            }
        }
        ViewMode::Live | ViewMode::Detail { .. } => {
            for step in &snapshot.steps {
                let _ = writeln!(
                    out,
                    "  [{:<8}] {:<4} {:<24} {}ms",
                    step.result.status.as_str(),
                    step.node_id,
                    step.name,
                    step.result.duration_ms
                );
            }
        }
    }

    if let Some(approval) = &snapshot.approval {
        let state = if approval.submitting {
            "submitting"
        } else {
            "resume | reject | dismiss"
        };
        let _ = writeln!(
            out,
            "approval {}: {} [{}]",
            approval.run_id, approval.instructions, state
        );
        if let Some(error) = &approval.last_error {
            let _ = writeln!(out, "  last attempt failed: {}", error);
        }
    } else if let Some(run_id) = &snapshot.pending_approval {
        let _ = writeln!(out, "pending approval: {} (approve {})", run_id, run_id);
    }

    if let Some(notice) = &snapshot.notice {
        let _ = writeln!(out, "! {}", notice);
    }
    out
}

/// One history row: id, engine status, projected summary and creation time.
pub fn history_line(entry: &HistoryEntry) -> String {
    format!(
        "  {:<16} {:<8} {:<8} {}",
        entry.run_id,
        entry.status.as_str(),
        entry.summary.as_str(),
        entry.created_at.format("%Y-%m-%d %H:%M:%S")
    )
}

fn mode_label(mode: &ViewMode) -> String {
    match mode {
        ViewMode::Detail { run_id } => format!("detail {}", run_id),
        other => other.label().to_string(),
    }
}

fn format_elapsed(elapsed_ms: u64) -> String {
    if elapsed_ms < 1000 {
        return format!("{}ms", elapsed_ms);
    }
    humantime::format_duration(StdDuration::from_secs(elapsed_ms / 1000)).to_string()
}
