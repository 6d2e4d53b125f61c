//! One actor per watched workflow: owns the controller and approval gateway, consumes a
//! single event queue and publishes a `ViewSnapshot` after every handled event.
pub mod client;
pub mod event;
pub mod message;
pub mod render;

use crate::core::approval::{ApprovalGateway, ApprovalOutcome, Approver, WaitingRun};
use crate::core::config::FlowlensConfig;
use crate::core::error::Notice;
use crate::core::graph::{GraphModel, NodeKind};
use crate::core::projection::{resolve_run, RunSummary, StepResult};
use crate::core::reconcile::{ControllerEvent, Effect, ReconciliationController, ViewMode};
use crate::core::runs::{RunRecord, RunStatus};
use crate::core::types::ErrorCategory;
use chrono::{DateTime, Utc};
use client::EngineApi;
use event::{ConnectionStatus, SessionEvent, UserCommand};
use message::LiveMessage;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Interval, MissedTickBehavior};

/// Static inputs of a session.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub flow_id: String,
    pub graph: Arc<GraphModel>,
    pub approver: Approver,
    pub tick_interval: StdDuration,
    /// `None` disables background history polling.
    pub poll_interval: Option<StdDuration>,
}

impl SessionSetup {
    pub fn from_config(flow_id: impl Into<String>, graph: Arc<GraphModel>, config: &FlowlensConfig) -> Self {
        let poll_interval = match config.session.poll_interval_secs {
            0 => None,
            secs => Some(StdDuration::from_secs(secs)),
        };
        SessionSetup {
            flow_id: flow_id.into(),
            graph,
            approver: Approver::new(&config.approval.approver, &config.approval.source),
            tick_interval: StdDuration::from_millis(config.session.tick_interval_ms),
            poll_interval,
        }
    }
}

/// A step in visual order together with its current result.
#[derive(Debug, Clone, PartialEq)]
pub struct StepView {
    pub node_id: String,
    pub name: String,
    pub kind: NodeKind,
    pub result: StepResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub run_id: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalView {
    pub run_id: String,
    pub instructions: String,
    pub submitting: bool,
    pub last_error: Option<String>,
}

/// Everything a renderer needs, copied out of the actor.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    pub flow_id: String,
    pub view_mode: ViewMode,
    pub summary: RunSummary,
    pub elapsed_ms: u64,
    pub live_run_id: Option<String>,
    pub steps: Vec<StepView>,
    pub history: Vec<HistoryEntry>,
    /// Newest run paused for approval.
    pub pending_approval: Option<String>,
    pub approval: Option<ApprovalView>,
    pub notice: Option<Notice>,
    pub connection: ConnectionStatus,
}

/// Owner-side handle of a running session.
pub struct SessionHandle {
    events: UnboundedSender<SessionEvent>,
    snapshots: watch::Receiver<ViewSnapshot>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Sender for push-channel tasks and command sources.
    pub fn sender(&self) -> UnboundedSender<SessionEvent> {
        self.events.clone()
    }

    pub fn send_command(&self, command: UserCommand) -> bool {
        self.events.send(SessionEvent::Command(command)).is_ok()
    }

    pub fn snapshots(&self) -> watch::Receiver<ViewSnapshot> {
        self.snapshots.clone()
    }

    pub fn current(&self) -> ViewSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Ask the actor to stop and wait for it.
    pub async fn shutdown(self) {
        let _ = self.events.send(SessionEvent::Command(UserCommand::Quit));
        self.join().await;
    }

    pub async fn join(self) {
        if let Err(err) = self.task.await {
            tracing::error!("session task failed: {}", err);
        }
    }
}

/// Start the session actor on the current runtime and request the initial history.
pub fn spawn_session(setup: SessionSetup, engine: Arc<dyn EngineApi>) -> SessionHandle {
    let (events_tx, events_rx) = unbounded_channel();
    let actor = SessionActor::new(setup, engine, events_tx.downgrade());
    let (snapshot_tx, snapshots) = watch::channel(actor.snapshot());
    let task = tokio::spawn(actor.run(events_rx, snapshot_tx));
    SessionHandle {
        events: events_tx,
        snapshots,
        task,
    }
}

struct SessionActor {
    setup: SessionSetup,
    engine: Arc<dyn EngineApi>,
    controller: ReconciliationController,
    gateway: ApprovalGateway,
    /// Weak so the queue closes once every external sender is gone.
    completions: WeakUnboundedSender<SessionEvent>,
    connection: ConnectionStatus,
    notice: Option<Notice>,
    ticker: Option<Interval>,
    poller: Option<Interval>,
    in_flight: JoinSet<()>,
}

impl SessionActor {
    fn new(setup: SessionSetup, engine: Arc<dyn EngineApi>, completions: WeakUnboundedSender<SessionEvent>) -> Self {
        let controller = ReconciliationController::new(setup.graph.clone());
        let gateway = ApprovalGateway::new(setup.flow_id.clone(), setup.approver.clone());
        let poller = setup.poll_interval.map(|period| {
            let mut poller = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            poller.set_missed_tick_behavior(MissedTickBehavior::Delay);
            poller
        });
        SessionActor {
            setup,
            engine,
            controller,
            gateway,
            completions,
            connection: ConnectionStatus::default(),
            notice: None,
            ticker: None,
            poller,
            in_flight: JoinSet::new(),
        }
    }

    async fn run(mut self, mut events: UnboundedReceiver<SessionEvent>, snapshots: watch::Sender<ViewSnapshot>) {
        tracing::info!(flow_id = %self.setup.flow_id, nodes = self.setup.graph.len(), "session started");
        let initial = self.controller.request_refresh();
        self.execute(initial);
        self.publish(&snapshots);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if !self.handle(event) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = next_tick(&mut self.ticker) => {
                    self.execute_controller(ControllerEvent::Tick);
                }
                _ = next_tick(&mut self.poller) => {
                    tracing::debug!(flow_id = %self.setup.flow_id, "polling run history");
                    self.execute_controller(ControllerEvent::RefreshRequested);
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(err) = joined {
                        if !err.is_cancelled() {
                            tracing::error!("engine request task failed: {}", err);
                        }
                    }
                    continue;
                }
            }
            self.publish(&snapshots);
        }

        self.in_flight.abort_all();
        tracing::info!(flow_id = %self.setup.flow_id, "session stopped");
    }

    /// Returns `false` when the session should stop.
    fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Live(message) => {
                let event = match message {
                    LiveMessage::Step(update) => ControllerEvent::LiveStep(update),
                    LiveMessage::RunStarted { run_id } => ControllerEvent::RunStarted { run_id },
                    LiveMessage::RunFinished { run_id } => ControllerEvent::RunFinished { run_id },
                };
                self.execute_controller(event);
            }
            SessionEvent::Connection(status) => {
                tracing::debug!(state = status.state.as_str(), detail = ?status.detail, "connection status");
                self.connection = status;
            }
            SessionEvent::Command(command) => return self.handle_command(command),
            SessionEvent::HistoryFetched { ticket, result } => {
                let event = match result {
                    Ok(records) => ControllerEvent::HistoryLoaded { ticket, records },
                    Err(err) => ControllerEvent::HistoryFailed {
                        ticket,
                        error: err.message,
                    },
                };
                self.execute_controller(event);
            }
            SessionEvent::RunFetched { run_id, result } => {
                let event = match result {
                    Ok(record) => ControllerEvent::RunLoaded { run_id, record },
                    Err(err) => ControllerEvent::RunFetchFailed {
                        run_id,
                        error: err.message,
                    },
                };
                self.execute_controller(event);
            }
            SessionEvent::ApprovalCompleted { token, result } => {
                match self.gateway.complete_submit(token, result) {
                    ApprovalOutcome::Resolved { run_id, decision } => {
                        tracing::info!(run_id = %run_id, %decision, "refreshing history after approval");
                        self.execute_controller(ControllerEvent::RefreshRequested);
                    }
                    ApprovalOutcome::Failed(notice) => self.notice = Some(notice),
                    ApprovalOutcome::Stale { succeeded } => {
                        if succeeded {
                            self.execute_controller(ControllerEvent::RefreshRequested);
                        }
                    }
                }
            }
        }
        true
    }

    fn handle_command(&mut self, command: UserCommand) -> bool {
        tracing::debug!(?command, "user command");
        self.notice = None;
        match command {
            UserCommand::ShowLive => self.execute_controller(ControllerEvent::SetViewMode(ViewMode::Live)),
            UserCommand::ShowHistory => {
                self.execute_controller(ControllerEvent::SetViewMode(ViewMode::History))
            }
            UserCommand::ShowWaiting => {
                self.execute_controller(ControllerEvent::SetViewMode(ViewMode::Waiting))
            }
            UserCommand::Select(run_id) => self.execute_controller(ControllerEvent::SelectRun(run_id)),
            UserCommand::Approve(run_id) => self.open_approval(&run_id),
            UserCommand::Submit(decision) => match self.gateway.begin_submit(decision) {
                Ok(action) => {
                    let engine = self.engine.clone();
                    let token = action.token;
                    self.spawn_request(async move {
                        let result = engine.submit_decision(&action).await;
                        SessionEvent::ApprovalCompleted { token, result }
                    });
                }
                Err(err) => self.notice = Some(Notice::from_error(&err)),
            },
            UserCommand::Dismiss => {
                self.gateway.dismiss();
            }
            UserCommand::Refresh => self.execute_controller(ControllerEvent::RefreshRequested),
            UserCommand::Quit => return false,
        }
        true
    }

    fn open_approval(&mut self, run_id: &str) {
        let Some(record) = self.controller.history().get(run_id).cloned() else {
            self.notice = Some(Notice::new(
                ErrorCategory::ValidationError,
                format!("run {} is not in the loaded history", run_id),
            ));
            return;
        };
        match WaitingRun::try_from(record) {
            Ok(run) => {
                self.gateway.open(run);
            }
            Err(record) => {
                self.notice = Some(Notice::new(
                    ErrorCategory::ValidationError,
                    format!("run {} is {}, not waiting for approval", record.id, record.status),
                ));
            }
        }
    }

    fn execute_controller(&mut self, event: ControllerEvent) {
        let effects = self.controller.apply(event, Utc::now());
        self.execute(effects);
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RefreshHistory(ticket) => {
                    let engine = self.engine.clone();
                    let flow_id = self.setup.flow_id.clone();
                    self.spawn_request(async move {
                        let result = engine.list_runs(&flow_id).await;
                        SessionEvent::HistoryFetched { ticket, result }
                    });
                }
                Effect::FetchRun { run_id } => {
                    let engine = self.engine.clone();
                    let flow_id = self.setup.flow_id.clone();
                    self.spawn_request(async move {
                        let result = engine.get_run(&flow_id, &run_id).await;
                        SessionEvent::RunFetched { run_id, result }
                    });
                }
                Effect::StartTicker => {
                    let mut ticker = tokio::time::interval(self.setup.tick_interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    self.ticker = Some(ticker);
                }
                Effect::StopTicker => self.ticker = None,
                Effect::Notify(notice) => {
                    tracing::warn!(category = %notice.category, "{}", notice.message);
                    self.notice = Some(notice);
                }
            }
        }
    }

    fn spawn_request<F>(&mut self, request: F)
    where
        F: std::future::Future<Output = SessionEvent> + Send + 'static,
    {
        let Some(sender) = self.completions.upgrade() else {
            tracing::debug!("session queue closed; request not started");
            return;
        };
        self.in_flight.spawn(async move {
            let event = request.await;
            let _ = sender.send(event);
        });
    }

    fn publish(&self, snapshots: &watch::Sender<ViewSnapshot>) {
        let next = self.snapshot();
        snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn snapshot(&self) -> ViewSnapshot {
        let view = self.controller.current_view();
        let steps = self
            .controller
            .visual_steps()
            .into_iter()
            .map(|node| StepView {
                node_id: node.id.clone(),
                name: node.display_name().to_string(),
                kind: node.kind,
                result: view
                    .get(&node.id)
                    .cloned()
                    .unwrap_or_else(|| StepResult::pending(node.id.clone())),
            })
            .collect();

        let graph = self.controller.graph();
        let history = self
            .controller
            .history()
            .iter()
            .filter(|record| {
                *self.controller.view_mode() != ViewMode::Waiting || record.status == RunStatus::Waiting
            })
            .map(|record| history_entry(graph, record))
            .collect();

        let approval = self.gateway.current().map(|request| ApprovalView {
            run_id: request.run.id().to_string(),
            instructions: request.instructions.clone(),
            submitting: request.submitting,
            last_error: request.last_error.as_ref().map(|n| n.message.clone()),
        });

        ViewSnapshot {
            flow_id: self.setup.flow_id.clone(),
            view_mode: self.controller.view_mode().clone(),
            summary: self.controller.run_summary(),
            elapsed_ms: self.controller.elapsed_ms(),
            live_run_id: self.controller.store().live_run_id().map(str::to_string),
            steps,
            history,
            pending_approval: self.controller.history().waiting().next().map(|r| r.id.clone()),
            approval,
            notice: self.notice.clone(),
            connection: self.connection.clone(),
        }
    }
}

pub fn history_entry(graph: &GraphModel, record: &RunRecord) -> HistoryEntry {
    HistoryEntry {
        run_id: record.id.clone(),
        status: record.status.clone(),
        created_at: record.created_at,
        summary: RunSummary::of(&resolve_run(graph, record)),
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
