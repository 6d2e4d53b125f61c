use chrono::{Duration, TimeZone, Utc};
use flowlens::core::approval::{ApprovalDecision, ApprovalGateway, ApprovalOutcome, Approver, WaitingRun};
use flowlens::core::graph::{GraphModel, Node, NodeKind, NodeMetadata};
use flowlens::core::projection::{resolve, resolve_run, RunSummary, StepStatus};
use flowlens::core::reconcile::{ControllerEvent, Effect, ReconciliationController, ViewMode};
use flowlens::core::runs::{LiveStepUpdate, RunRecord};
use serde_json::json;
use std::sync::Arc;

fn two_step_graph() -> Arc<GraphModel> {
    let graph = GraphModel::new(
        vec![
            Node::new("1", NodeKind::Trigger).at(0.0, 0.0),
            Node::new("2", NodeKind::Action)
                .with_metadata(NodeMetadata {
                    app_name: Some("stripe".to_string()),
                    action_id: Some("refund".to_string()),
                    label: Some("Refund charge".to_string()),
                })
                .at(0.0, 120.0),
        ],
        vec![],
    )
    .unwrap();
    Arc::new(graph)
}

fn record(value: serde_json::Value) -> RunRecord {
    RunRecord::from_value(value).unwrap()
}

fn load_history(controller: &mut ReconciliationController, records: Vec<RunRecord>) {
    let now = Utc::now();
    let effects = controller.apply(ControllerEvent::RefreshRequested, now);
    let Some(Effect::RefreshHistory(ticket)) = effects.into_iter().next() else {
        panic!("refresh did not issue a history fetch");
    };
    controller.apply(ControllerEvent::HistoryLoaded { ticket, records }, now);
}

fn step(node_id: &str, status: StepStatus) -> ControllerEvent {
    ControllerEvent::LiveStep(LiveStepUpdate::new(node_id, status))
}

#[test]
fn test_happy_path_summary_progression() {
    let mut controller = ReconciliationController::new(two_step_graph());
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let mut summaries = vec![controller.run_summary()];

    let events = [
        (step("1", StepStatus::Running), 0),
        (step("1", StepStatus::Success), 400),
        (step("2", StepStatus::Running), 500),
        (step("2", StepStatus::Success), 2_500),
    ];
    let mut last_effects = Vec::new();
    for (event, offset_ms) in events {
        last_effects = controller.apply(event, start + Duration::milliseconds(offset_ms));
        summaries.push(controller.run_summary());
    }

    assert_eq!(
        summaries,
        vec![
            RunSummary::Idle,
            RunSummary::Running,
            RunSummary::Running,
            RunSummary::Running,
            RunSummary::Success,
        ]
    );

    let view = controller.current_view();
    assert_eq!(view["1"].status, StepStatus::Success);
    assert_eq!(view["2"].status, StepStatus::Success);

    assert_eq!(controller.elapsed_ms(), 2_500);
    assert!(matches!(
        last_effects.as_slice(),
        [Effect::StopTicker, Effect::RefreshHistory(_)]
    ));
}

#[test]
fn test_happy_path_success_only_events() {
    let mut controller = ReconciliationController::new(two_step_graph());
    let now = Utc::now();
    controller.apply(step("1", StepStatus::Success), now);
    assert_eq!(controller.run_summary(), RunSummary::Running);
    controller.apply(step("2", StepStatus::Success), now);

    let view = controller.current_view();
    assert_eq!(view.len(), 2);
    assert!(view.values().all(|r| r.status == StepStatus::Success));
    assert_eq!(controller.run_summary(), RunSummary::Success);
}

#[test]
fn test_approval_gate_reject_triggers_refresh() {
    let run = record(json!({
        "id": "r-9",
        "status": "waiting",
        "resultPayload": {"1": {"status": "success"}, "2": {"status": "waiting"}},
        "createdAt": "2026-03-01T10:00:00Z",
        "currentContext": {"wait_info": {"step_a": {"instructions": "Confirm refund"}}}
    }));
    let mut controller = ReconciliationController::new(two_step_graph());
    load_history(&mut controller, vec![run.clone()]);

    let waiting = ApprovalGateway::waiting_runs(controller.history());
    assert_eq!(waiting.len(), 1);

    let mut gateway = ApprovalGateway::new("billing", Approver::new("ops@example.com", "flowlens"));
    let request = gateway.open(WaitingRun::try_from(run).unwrap());
    assert_eq!(request.instructions, "Confirm refund");

    let action = gateway.begin_submit(ApprovalDecision::Reject).unwrap();
    assert_eq!(action.flow_id, "billing");
    assert_eq!(action.run_id, "r-9");
    assert_eq!(action.decision.as_str(), "reject");
    assert_eq!(action.approver.id, "ops@example.com");
    assert_eq!(action.approver.source, "flowlens");

    let outcome = gateway.complete_submit(action.token, Ok(()));
    assert_eq!(
        outcome,
        ApprovalOutcome::Resolved {
            run_id: "r-9".to_string(),
            decision: ApprovalDecision::Reject,
        }
    );
    assert!(gateway.current().is_none());

    // The run stays waiting locally until the authoritative refresh lands.
    assert_eq!(controller.history().waiting().count(), 1);
    let effects = controller.apply(ControllerEvent::RefreshRequested, Utc::now());
    assert!(matches!(effects.as_slice(), [Effect::RefreshHistory(_)]));
}

#[test]
fn test_malformed_history_entry_is_all_skipped() {
    let graph = two_step_graph();
    let run = record(json!({
        "id": "r-bad",
        "status": "success",
        "resultPayload": "{not json",
        "createdAt": "2026-03-01T10:00:00Z"
    }));

    let results = resolve_run(&graph, &run);
    assert_eq!(results.len(), 2);
    assert!(results.values().all(|r| r.status == StepStatus::Skipped));

    let mut controller = ReconciliationController::new(graph);
    load_history(&mut controller, vec![run]);
    assert_eq!(controller.run_summary(), RunSummary::Idle);
}

#[test]
fn test_live_preempts_selected_history_run() {
    let mut controller = ReconciliationController::new(two_step_graph());
    load_history(
        &mut controller,
        vec![record(json!({
            "id": "old",
            "status": "failed",
            "resultPayload": {"1": {"status": "error"}},
            "createdAt": "2026-02-28T10:00:00Z"
        }))],
    );

    controller.apply(step("1", StepStatus::Running), Utc::now());
    controller.apply(ControllerEvent::SelectRun("old".to_string()), Utc::now());
    assert_eq!(
        controller.view_mode(),
        &ViewMode::Detail {
            run_id: "old".to_string()
        }
    );

    let view = controller.current_view();
    assert_eq!(view["1"].status, StepStatus::Running);
    assert_eq!(view["2"].status, StepStatus::Pending);
    assert_eq!(controller.run_summary(), RunSummary::Running);
}

#[test]
fn test_detail_view_once_live_run_settles() {
    let mut controller = ReconciliationController::new(two_step_graph());
    load_history(
        &mut controller,
        vec![record(json!({
            "id": "old",
            "status": "failed",
            "resultPayload": {"1": {"status": "error"}, "2": {"status": "running"}},
            "createdAt": "2026-02-28T10:00:00Z"
        }))],
    );
    controller.apply(ControllerEvent::SelectRun("old".to_string()), Utc::now());

    let view = controller.current_view();
    assert_eq!(view["1"].status, StepStatus::Error);
    assert_eq!(view["2"].status, StepStatus::Error);
    assert_eq!(controller.run_summary(), RunSummary::Error);
}

#[test]
fn test_forced_transition_from_history() {
    let mut controller = ReconciliationController::new(two_step_graph());
    controller.apply(ControllerEvent::SetViewMode(ViewMode::History), Utc::now());
    assert_eq!(controller.view_mode(), &ViewMode::History);

    let effects = controller.apply(step("2", StepStatus::Running), Utc::now());
    assert_eq!(controller.view_mode(), &ViewMode::Live);
    assert_eq!(effects, vec![Effect::StartTicker]);
}

#[test]
fn test_terminal_status_is_not_regressed() {
    let mut controller = ReconciliationController::new(two_step_graph());
    controller.apply(step("1", StepStatus::Success), Utc::now());
    controller.apply(step("1", StepStatus::Running), Utc::now());

    assert_eq!(controller.current_view()["1"].status, StepStatus::Success);
    assert_eq!(controller.current_view()["2"].status, StepStatus::Pending);
    // Step 2 has not reported yet, so the run is still in flight.
    assert!(controller.has_active_run());
}

#[test]
fn test_summary_error_over_success() {
    let graph = two_step_graph();
    let results = resolve(
        &graph,
        &json!({"1": {"status": "error"}, "refund": {"status": "success"}}),
    );
    assert_eq!(RunSummary::of(&results), RunSummary::Error);
}

#[test]
fn test_live_view_falls_back_to_latest_history() {
    let mut controller = ReconciliationController::new(two_step_graph());
    load_history(
        &mut controller,
        vec![
            record(json!({
                "id": "older",
                "status": "failed",
                "resultPayload": {"1": {"status": "error"}},
                "createdAt": "2026-02-27T10:00:00Z"
            })),
            record(json!({
                "id": "newest",
                "status": "success",
                "resultPayload": {"schedule": {"data": {"fired": true}}, "stripe": {}},
                "createdAt": "2026-02-28T10:00:00Z"
            })),
        ],
    );

    let view = controller.current_view();
    assert_eq!(view["1"].status, StepStatus::Success);
    assert_eq!(view["1"].output, json!({"fired": true}));
    assert_eq!(view["2"].status, StepStatus::Success);
    assert_eq!(controller.run_summary(), RunSummary::Success);
}

#[test]
fn test_stale_history_response_is_discarded() {
    let mut controller = ReconciliationController::new(two_step_graph());
    let now = Utc::now();
    let first = match controller.apply(ControllerEvent::RefreshRequested, now).pop() {
        Some(Effect::RefreshHistory(ticket)) => ticket,
        other => panic!("unexpected effect {:?}", other),
    };
    let second = match controller.apply(ControllerEvent::RefreshRequested, now).pop() {
        Some(Effect::RefreshHistory(ticket)) => ticket,
        other => panic!("unexpected effect {:?}", other),
    };

    controller.apply(
        ControllerEvent::HistoryLoaded {
            ticket: second,
            records: vec![record(json!({"id": "fresh", "status": "success", "createdAt": 200}))],
        },
        now,
    );
    controller.apply(
        ControllerEvent::HistoryLoaded {
            ticket: first,
            records: vec![record(json!({"id": "stale", "status": "success", "createdAt": 100}))],
        },
        now,
    );
    let failure = controller.apply(
        ControllerEvent::HistoryFailed {
            ticket: first,
            error: "timeout".to_string(),
        },
        now,
    );

    assert!(failure.is_empty());
    assert_eq!(controller.history().len(), 1);
    assert!(controller.history().get("fresh").is_some());
}

#[test]
fn test_history_failure_keeps_prior_history() {
    let mut controller = ReconciliationController::new(two_step_graph());
    load_history(
        &mut controller,
        vec![record(json!({"id": "kept", "status": "success", "createdAt": 100}))],
    );

    let ticket = match controller.apply(ControllerEvent::RefreshRequested, Utc::now()).pop() {
        Some(Effect::RefreshHistory(ticket)) => ticket,
        other => panic!("unexpected effect {:?}", other),
    };
    let effects = controller.apply(
        ControllerEvent::HistoryFailed {
            ticket,
            error: "503 Service Unavailable".to_string(),
        },
        Utc::now(),
    );

    assert!(matches!(effects.as_slice(), [Effect::Notify(notice)] if notice.message.contains("503")));
    assert!(controller.history().get("kept").is_some());
}

#[test]
fn test_new_run_restarts_timer_and_results() {
    let mut controller = ReconciliationController::new(two_step_graph());
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();

    controller.apply(
        ControllerEvent::LiveStep(LiveStepUpdate::new("1", StepStatus::Running).for_run("a")),
        start,
    );
    controller.apply(
        ControllerEvent::LiveStep(LiveStepUpdate::new("1", StepStatus::Success).for_run("a")),
        start + Duration::seconds(3),
    );
    assert_eq!(controller.elapsed_ms(), 3_000);

    let later = start + Duration::minutes(5);
    let effects = controller.apply(
        ControllerEvent::LiveStep(LiveStepUpdate::new("1", StepStatus::Running).for_run("b")),
        later,
    );
    // Run "a" went quiet long ago; it is closed before "b" starts.
    assert!(matches!(
        effects.as_slice(),
        [Effect::StopTicker, Effect::RefreshHistory(_), Effect::StartTicker]
    ));
    assert_eq!(controller.run_started_at(), Some(later));
    assert_eq!(controller.elapsed_ms(), 0);
    assert_eq!(controller.current_view()["1"].status, StepStatus::Running);
    assert_eq!(controller.store().live_run_id(), Some("b"));
}

#[test]
fn test_consecutive_runs_without_run_ids() {
    let mut controller = ReconciliationController::new(two_step_graph());
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    for (event, offset_ms) in [
        (step("1", StepStatus::Running), 0),
        (step("1", StepStatus::Success), 300),
        (step("2", StepStatus::Running), 400),
        (step("2", StepStatus::Success), 1_000),
    ] {
        controller.apply(event, start + Duration::milliseconds(offset_ms));
    }
    controller.apply(ControllerEvent::SetViewMode(ViewMode::History), start);

    let next = start + Duration::minutes(2);
    let effects = controller.apply(step("1", StepStatus::Running), next);
    assert_eq!(effects, vec![Effect::StartTicker]);
    assert!(controller.has_active_run());
    assert_eq!(controller.view_mode(), &ViewMode::Live);
    assert_eq!(controller.run_summary(), RunSummary::Running);

    let view = controller.current_view();
    assert_eq!(view["1"].status, StepStatus::Running);
    assert_eq!(view["2"].status, StepStatus::Pending);

    controller.apply(ControllerEvent::Tick, next + Duration::milliseconds(600));
    assert_eq!(controller.elapsed_ms(), 600);
}

#[test]
fn test_run_finished_ends_partial_run() {
    let mut controller = ReconciliationController::new(two_step_graph());
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    controller.apply(step("1", StepStatus::Success), start);
    assert!(controller.has_active_run());

    let effects = controller.apply(
        ControllerEvent::RunFinished { run_id: None },
        start + Duration::seconds(2),
    );
    assert!(matches!(
        effects.as_slice(),
        [Effect::StopTicker, Effect::RefreshHistory(_)]
    ));
    assert!(!controller.has_active_run());
    assert_eq!(controller.elapsed_ms(), 2_000);
    assert_eq!(controller.run_summary(), RunSummary::Success);
}
