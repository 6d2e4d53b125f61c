//! View-mode state machine that decides which per-step projection is current.
//!
//! Every transition goes through [`ReconciliationController::apply`], which
//! mutates the controller and returns the [`Effect`]s the owning session must
//! carry out (fetches, timer control, notifications). Time is passed in so a
//! recorded event sequence replays deterministically.

pub mod timer;

use crate::core::error::Notice;
use crate::core::graph::{visual_steps, GraphModel, Node};
use crate::core::projection::{complete_with_pending, resolve_run, RunSummary, StepResults};
use crate::core::runs::{
    FetchOutcome, FetchTicket, LiveApply, LiveStepUpdate, RunHistory, RunRecord, RunStore,
};
use crate::core::types::ErrorCategory;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use timer::DurationTimer;

/// Which projection the user asked to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewMode {
    Live,
    History,
    Detail { run_id: String },
    Waiting,
}

impl ViewMode {
    pub fn label(&self) -> &str {
        match self {
            ViewMode::Live => "live",
            ViewMode::History => "history",
            ViewMode::Detail { .. } => "detail",
            ViewMode::Waiting => "waiting",
        }
    }
}

/// Inputs to the controller, from the push channel, fetch completions, the timer or the user.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    LiveStep(LiveStepUpdate),
    RunStarted {
        run_id: Option<String>,
    },
    RunFinished {
        run_id: Option<String>,
    },
    Tick,
    SetViewMode(ViewMode),
    SelectRun(String),
    RefreshRequested,
    HistoryLoaded {
        ticket: FetchTicket,
        records: Vec<RunRecord>,
    },
    HistoryFailed {
        ticket: FetchTicket,
        error: String,
    },
    RunLoaded {
        run_id: String,
        record: RunRecord,
    },
    RunFetchFailed {
        run_id: String,
        error: String,
    },
}

/// Work the session must perform on behalf of the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    RefreshHistory(FetchTicket),
    FetchRun { run_id: String },
    StartTicker,
    StopTicker,
    Notify(Notice),
}

/// How long a run may go without step activity, with no step active, before it counts as finished.
pub const DEFAULT_SETTLE_WINDOW_MS: i64 = 5_000;

/// Lifecycle of the run the live results belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LivePhase {
    /// Nothing observed since the last reset.
    Idle,
    InFlight { last_activity: DateTime<Utc> },
    /// The run finished. Its results stay on display until the next run starts.
    Settled,
}

pub struct ReconciliationController {
    graph: Arc<GraphModel>,
    store: RunStore,
    view_mode: ViewMode,
    detail: Option<RunRecord>,
    timer: DurationTimer,
    phase: LivePhase,
    settle_window: Duration,
}

impl ReconciliationController {
    pub fn new(graph: Arc<GraphModel>) -> Self {
        ReconciliationController {
            graph,
            store: RunStore::new(),
            view_mode: ViewMode::Live,
            detail: None,
            timer: DurationTimer::default(),
            phase: LivePhase::Idle,
            settle_window: Duration::milliseconds(DEFAULT_SETTLE_WINDOW_MS),
        }
    }

    pub fn with_settle_window(mut self, window: Duration) -> Self {
        self.settle_window = window;
        self
    }

    /// Apply one event and return the effects it requires.
    pub fn apply(&mut self, event: ControllerEvent, now: DateTime<Utc>) -> Vec<Effect> {
        match event {
            ControllerEvent::LiveStep(update) => self.on_live_event(update, now),
            ControllerEvent::RunStarted { run_id } => self.on_run_started(run_id, now),
            ControllerEvent::RunFinished { run_id } => self.on_run_finished(run_id, now),
            ControllerEvent::Tick => {
                self.timer.tick(now);
                self.settle_if_quiet(now)
            }
            ControllerEvent::SetViewMode(mode) => self.set_view_mode(mode),
            ControllerEvent::SelectRun(run_id) => self.select_run(run_id),
            ControllerEvent::RefreshRequested => self.request_refresh(),
            ControllerEvent::HistoryLoaded { ticket, records } => {
                let count = records.len();
                match self.store.finish_history_fetch(ticket, records) {
                    FetchOutcome::Applied => {
                        tracing::debug!(ticket = ticket.id(), runs = count, "history refreshed");
                    }
                    FetchOutcome::Stale => {
                        tracing::debug!(ticket = ticket.id(), "discarding stale history response");
                    }
                }
                Vec::new()
            }
            ControllerEvent::HistoryFailed { ticket, error } => {
                if !self.store.is_current(ticket) {
                    tracing::debug!(ticket = ticket.id(), "discarding stale history failure");
                    return Vec::new();
                }
                tracing::warn!(ticket = ticket.id(), error = %error, "history fetch failed");
                vec![Effect::Notify(Notice::new(
                    ErrorCategory::TransportFailure,
                    format!("could not refresh run history: {}", error),
                ))]
            }
            ControllerEvent::RunLoaded { run_id, record } => {
                if self.is_selected(&run_id) {
                    self.detail = Some(record);
                } else {
                    tracing::debug!(run_id = %run_id, "discarding detail for deselected run");
                }
                Vec::new()
            }
            ControllerEvent::RunFetchFailed { run_id, error } => {
                if !self.is_selected(&run_id) {
                    tracing::debug!(run_id = %run_id, "discarding stale detail failure");
                    return Vec::new();
                }
                tracing::warn!(run_id = %run_id, error = %error, "run detail fetch failed");
                vec![Effect::Notify(Notice::new(
                    ErrorCategory::TransportFailure,
                    format!("could not load run {}: {}", run_id, error),
                ))]
            }
        }
    }

    /// Merge one per-node push event into the live results.
    pub fn on_live_event(&mut self, update: LiveStepUpdate, now: DateTime<Utc>) -> Vec<Effect> {
        if !self.graph.contains(&update.node_id) {
            tracing::debug!(node_id = %update.node_id, "live event for unknown node ignored");
            return Vec::new();
        }
        let mut effects = self.settle_if_quiet(now);

        if self.starts_new_run(&update) {
            tracing::info!(
                run_id = ?update.run_id,
                previous = ?self.store.live_run_id(),
                "new live run detected"
            );
            effects.extend(self.finish_run(now));
            self.store.reset_live(update.run_id.clone());
            self.phase = LivePhase::Idle;
        } else if self.phase == LivePhase::Settled {
            tracing::debug!(node_id = %update.node_id, "ignoring late event for finished run");
            return effects;
        }

        if self.store.apply_live(&update) == LiveApply::Ignored {
            tracing::debug!(
                node_id = %update.node_id,
                status = %update.status,
                "ignoring live update for finalized step"
            );
            return effects;
        }
        effects.extend(self.mark_activity(now));
        if self.live_run_complete() {
            effects.extend(self.finish_run(now));
        }
        effects
    }

    fn on_run_started(&mut self, run_id: Option<String>, now: DateTime<Utc>) -> Vec<Effect> {
        if run_id.is_some() && run_id.as_deref() == self.store.live_run_id() {
            return Vec::new();
        }
        tracing::info!(run_id = ?run_id, "live run started");
        let mut effects = self.finish_run(now);
        self.store.reset_live(run_id);
        self.phase = LivePhase::Idle;
        effects.extend(self.mark_activity(now));
        effects
    }

    fn on_run_finished(&mut self, run_id: Option<String>, now: DateTime<Utc>) -> Vec<Effect> {
        tracing::debug!(run_id = ?run_id, "engine reported run finished");
        let other_run = match (run_id.as_deref(), self.store.live_run_id()) {
            (Some(finished), Some(current)) => finished != current,
            _ => false,
        };
        if other_run || !self.in_flight() {
            return self.request_refresh();
        }
        let closed = self.store.close_active_steps();
        if closed > 0 {
            tracing::debug!(steps = closed, "closed steps still active at run end");
        }
        self.finish_run(now)
    }

    /// Whether `update` belongs to a run other than the one the live results hold.
    fn starts_new_run(&self, update: &LiveStepUpdate) -> bool {
        match (update.run_id.as_deref(), self.store.live_run_id()) {
            (Some(incoming), _) if self.store.is_retired(incoming) => false,
            (Some(incoming), Some(current)) => incoming != current,
            (Some(_), None) => self.phase == LivePhase::Settled,
            (None, _) => {
                self.phase == LivePhase::Settled
                    && (update.status.is_active()
                        || !self.store.live_results().contains_key(&update.node_id))
            }
        }
    }

    /// Record step activity; the first activity of a run is its rising edge.
    fn mark_activity(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let rising = !self.in_flight();
        self.phase = LivePhase::InFlight { last_activity: now };
        if !rising {
            self.timer.tick(now);
            return Vec::new();
        }
        if self.view_mode != ViewMode::Live {
            tracing::info!(from = self.view_mode.label(), "following new live run");
            self.view_mode = ViewMode::Live;
            self.detail = None;
        }
        self.timer.start(now);
        vec![Effect::StartTicker]
    }

    /// Falling edge: freeze the timer at `at` and refetch history.
    fn finish_run(&mut self, at: DateTime<Utc>) -> Vec<Effect> {
        if !self.in_flight() {
            return Vec::new();
        }
        self.timer.stop(at);
        self.phase = LivePhase::Settled;
        let ticket = self.store.begin_history_fetch();
        tracing::info!(elapsed_ms = self.timer.elapsed_ms(), "live run settled");
        vec![Effect::StopTicker, Effect::RefreshHistory(ticket)]
    }

    /// Finish a run whose steps all went quiet without an explicit end.
    fn settle_if_quiet(&mut self, now: DateTime<Utc>) -> Vec<Effect> {
        let LivePhase::InFlight { last_activity } = self.phase else {
            return Vec::new();
        };
        if self.store.has_active_live_step() || now - last_activity < self.settle_window {
            return Vec::new();
        }
        tracing::debug!("no step activity within the settle window");
        self.finish_run(last_activity)
    }

    /// Every visible step has reached a terminal status.
    fn live_run_complete(&self) -> bool {
        let live = self.store.live_results();
        self.graph
            .nodes()
            .iter()
            .filter(|node| !node.is_placeholder())
            .all(|node| live.get(&node.id).is_some_and(|r| r.status.is_terminal()))
    }

    fn in_flight(&self) -> bool {
        matches!(self.phase, LivePhase::InFlight { .. })
    }

    /// Switch view. History and waiting views are fetched on entry.
    pub fn set_view_mode(&mut self, mode: ViewMode) -> Vec<Effect> {
        if let ViewMode::Detail { run_id } = mode {
            return self.select_run(run_id);
        }
        self.detail = None;
        let needs_fetch = matches!(mode, ViewMode::History | ViewMode::Waiting);
        self.view_mode = mode;
        if needs_fetch {
            self.request_refresh()
        } else {
            Vec::new()
        }
    }

    /// Show one historical run; fetched individually when history does not hold it.
    pub fn select_run(&mut self, run_id: String) -> Vec<Effect> {
        self.view_mode = ViewMode::Detail {
            run_id: run_id.clone(),
        };
        self.detail = None;
        if self.store.history().get(&run_id).is_some() {
            Vec::new()
        } else {
            vec![Effect::FetchRun { run_id }]
        }
    }

    pub fn request_refresh(&mut self) -> Vec<Effect> {
        vec![Effect::RefreshHistory(self.store.begin_history_fetch())]
    }

    /// True from a run's first live event until it finishes.
    pub fn has_active_run(&self) -> bool {
        self.in_flight()
    }

    /// The projection to display; always total over the graph's nodes.
    pub fn current_view(&self) -> StepResults {
        let live = self.store.live_results();
        if self.has_active_run() {
            return complete_with_pending(&self.graph, live);
        }
        if let ViewMode::Detail { run_id } = &self.view_mode {
            if let Some(record) = self.selected_record(run_id) {
                return resolve_run(&self.graph, record);
            }
        }
        if self.view_mode == ViewMode::Live && live.is_empty() {
            if let Some(latest) = self.store.history().latest() {
                return resolve_run(&self.graph, latest);
            }
        }
        complete_with_pending(&self.graph, live)
    }

    pub fn run_summary(&self) -> RunSummary {
        if self.has_active_run() {
            return RunSummary::Running;
        }
        RunSummary::of(&self.current_view())
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.timer.elapsed_ms()
    }

    pub fn run_started_at(&self) -> Option<DateTime<Utc>> {
        self.timer.started_at()
    }

    pub fn visual_steps(&self) -> Vec<&Node> {
        visual_steps(&self.graph)
    }

    pub fn view_mode(&self) -> &ViewMode {
        &self.view_mode
    }

    pub fn history(&self) -> &RunHistory {
        self.store.history()
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    pub fn graph(&self) -> &Arc<GraphModel> {
        &self.graph
    }

    /// The run shown in detail mode, from history first, else the individually fetched copy.
    pub fn selected_run(&self) -> Option<&RunRecord> {
        match &self.view_mode {
            ViewMode::Detail { run_id } => self.selected_record(run_id),
            _ => None,
        }
    }

    fn selected_record(&self, run_id: &str) -> Option<&RunRecord> {
        self.store
            .history()
            .get(run_id)
            .or_else(|| self.detail.as_ref().filter(|record| record.id == run_id))
    }

    fn is_selected(&self, run_id: &str) -> bool {
        matches!(&self.view_mode, ViewMode::Detail { run_id: selected } if selected == run_id)
    }
}
