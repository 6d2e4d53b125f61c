use super::{LiveStepUpdate, RunHistory, RunRecord};
use crate::core::projection::{StepResult, StepResults, StepStatus};
use std::collections::HashSet;

/// Identifies one history fetch; only the most recently issued ticket may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket(u64);

impl FetchTicket {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer fetch was issued after this one; the response was dropped.
    Stale,
}

/// What happened when a live update was merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveApply {
    Inserted,
    Updated,
    /// The node already holds a terminal status for this run.
    Ignored,
}

/// Historical runs plus the accumulating results of the in-flight run.
#[derive(Debug, Default)]
pub struct RunStore {
    history: RunHistory,
    history_loaded: bool,
    issued_ticket: u64,
    live: StepResults,
    live_run_id: Option<String>,
    retired_runs: HashSet<String>,
}

impl RunStore {
    pub fn new() -> Self {
        RunStore::default()
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    /// Whether at least one history fetch has been applied.
    pub fn history_loaded(&self) -> bool {
        self.history_loaded
    }

    pub fn begin_history_fetch(&mut self) -> FetchTicket {
        self.issued_ticket += 1;
        FetchTicket(self.issued_ticket)
    }

    /// Apply a completed fetch unless a newer one has been issued since.
    pub fn finish_history_fetch(
        &mut self,
        ticket: FetchTicket,
        records: Vec<RunRecord>,
    ) -> FetchOutcome {
        if ticket.0 != self.issued_ticket {
            return FetchOutcome::Stale;
        }
        self.history.replace(records);
        self.history_loaded = true;
        FetchOutcome::Applied
    }

    /// Whether a failed fetch still corresponds to the latest request.
    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        ticket.0 == self.issued_ticket
    }

    pub fn live_results(&self) -> &StepResults {
        &self.live
    }

    pub fn live_run_id(&self) -> Option<&str> {
        self.live_run_id.as_deref()
    }

    /// Discard accumulated live results and begin tracking a new run.
    ///
    /// The previous run id is retired: late events carrying it are ignored.
    pub fn reset_live(&mut self, run_id: Option<String>) {
        self.live.clear();
        if let Some(previous) = self.live_run_id.take() {
            if run_id.as_deref() != Some(previous.as_str()) {
                self.retired_runs.insert(previous);
            }
        }
        self.live_run_id = run_id;
    }

    pub fn is_retired(&self, run_id: &str) -> bool {
        self.retired_runs.contains(run_id)
    }

    /// Merge a per-step update. Terminal statuses are never overwritten.
    pub fn apply_live(&mut self, update: &LiveStepUpdate) -> LiveApply {
        if update.run_id.as_deref().is_some_and(|id| self.is_retired(id)) {
            return LiveApply::Ignored;
        }
        if let (Some(incoming), None) = (&update.run_id, &self.live_run_id) {
            self.live_run_id = Some(incoming.clone());
        }

        match self.live.get_mut(&update.node_id) {
            Some(existing) if existing.status.is_terminal() => LiveApply::Ignored,
            Some(existing) => {
                existing.status = update.status;
                if let Some(output) = &update.output {
                    existing.output = output.clone();
                }
                if let Some(duration) = update.duration_ms {
                    existing.duration_ms = duration;
                }
                LiveApply::Updated
            }
            None => {
                let mut result = StepResult::new(update.node_id.clone(), update.status);
                if let Some(output) = &update.output {
                    result.output = output.clone();
                }
                result.duration_ms = update.duration_ms.unwrap_or(0);
                self.live.insert(update.node_id.clone(), result);
                LiveApply::Inserted
            }
        }
    }

    pub fn has_active_live_step(&self) -> bool {
        self.live.values().any(|result| result.status.is_active())
    }

    /// Mark steps that are still running or waiting as skipped. Returns how many changed.
    pub fn close_active_steps(&mut self) -> usize {
        let mut closed = 0;
        for result in self.live.values_mut().filter(|r| r.status.is_active()) {
            result.status = StepStatus::Skipped;
            closed += 1;
        }
        closed
    }
}
