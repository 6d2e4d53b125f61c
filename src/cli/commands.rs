use crate::{
    cli::args::{DecideArgs, EngineArgs, HistoryArgs, ResolveArgs, StepsArgs, WatchArgs},
    core::{
        approval::{ApprovalDecision, ApprovalGateway, ApprovalOutcome, Approver, WaitingRun},
        config::{find_workspace_root, ConfigLoader, ConfigOverrides, FlowlensConfig},
        error::AppError,
        graph::{visual_steps, GraphModel},
        projection::{resolve as resolve_payload, resolve_run},
        runs::{RunHistory, RunRecord},
    },
    session::{
        client::{websocket_loop, EngineApi, EngineClient},
        event::{SessionEvent, UserCommand},
        history_entry,
        render::{history_line, render},
        spawn_session, SessionSetup,
    },
    Result,
};
use anyhow::Context;
use serde_json::{json, Value};
use std::{env, fs, io::Write, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;

fn load_config(engine: &EngineArgs, approver: Option<String>) -> Result<FlowlensConfig> {
    let workspace_root = env::current_dir()
        .ok()
        .and_then(|cwd| find_workspace_root(&cwd));
    let overrides = ConfigOverrides {
        http_url: engine.http_url.clone(),
        ws_url: engine.ws_url.clone(),
        approver,
    };
    Ok(ConfigLoader::load(workspace_root.as_deref(), &overrides)?)
}

fn engine_client(config: &FlowlensConfig) -> Result<EngineClient> {
    Ok(EngineClient::from_config(
        &config.engine,
        config.session.history_limit,
    )?)
}

pub async fn watch(args: WatchArgs) -> Result<()> {
    let config = load_config(&args.engine, args.approver.clone())?;
    let graph = Arc::new(GraphModel::load(&args.graph)?);
    let client = engine_client(&config)?;

    let setup = SessionSetup::from_config(&args.flow_id, graph, &config);
    let session = spawn_session(setup, Arc::new(client.clone()));
    let push_task = tokio::spawn(websocket_loop(
        client,
        args.flow_id.clone(),
        session.sender(),
    ));
    let input_task = tokio::spawn(stdin_loop(session.sender()));

    let mut snapshots = session.snapshots();
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", render(&snapshots.borrow_and_update()))?;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let text = render(&snapshots.borrow_and_update());
                writeln!(stdout, "{}", text)?;
            }
            _ = tokio::signal::ctrl_c() => {
                session.send_command(UserCommand::Quit);
            }
        }
    }

    push_task.abort();
    input_task.abort();
    session.join().await;
    Ok(())
}

/// Forward stdin lines as session commands; end of input quits.
async fn stdin_loop(events: UnboundedSender<SessionEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match line.parse::<UserCommand>() {
                Ok(command) => {
                    let quit = command == UserCommand::Quit;
                    if events.send(SessionEvent::Command(command)).is_err() || quit {
                        return;
                    }
                }
                Err(message) => eprintln!("{}", message),
            },
            Ok(None) => break,
            Err(err) => {
                tracing::warn!("stdin read failed: {}", err);
                break;
            }
        }
    }
    let _ = events.send(SessionEvent::Command(UserCommand::Quit));
}

pub fn resolve(args: ResolveArgs) -> Result<()> {
    let graph = GraphModel::load(&args.graph)?;
    let content = fs::read_to_string(&args.payload)
        .with_context(|| format!("failed to read payload {}", args.payload.display()))?;

    let results = if args.run {
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("run record {} is not JSON", args.payload.display()))?;
        let record = RunRecord::from_value(value)?;
        resolve_run(&graph, &record)
    } else {
        // Unparseable files go through the resolver as raw text and resolve to skipped.
        let payload = serde_json::from_str::<Value>(&content).unwrap_or(Value::String(content));
        resolve_payload(&graph, &payload)
    };

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

pub fn steps(args: StepsArgs) -> Result<()> {
    let graph = GraphModel::load(&args.graph)?;
    for (index, node) in visual_steps(&graph).into_iter().enumerate() {
        println!(
            "{:>3}. {:<8} {:<8} {}",
            index + 1,
            node.id,
            node.kind.as_str(),
            node.display_name()
        );
    }
    Ok(())
}

pub async fn history(args: HistoryArgs) -> Result<()> {
    let config = load_config(&args.engine, None)?;
    let graph = GraphModel::load(&args.graph)?;
    let client = engine_client(&config)?;

    let history = RunHistory::new(client.list_runs(&args.flow_id).await?);
    let entries: Vec<_> = history
        .iter()
        .map(|record| history_entry(&graph, record))
        .collect();

    if args.json {
        let rows: Vec<Value> = entries
            .iter()
            .map(|entry| {
                json!({
                    "runId": entry.run_id,
                    "status": entry.status,
                    "createdAt": entry.created_at,
                    "summary": entry.summary,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if entries.is_empty() {
        println!("no runs for flow {}", args.flow_id);
    } else {
        for entry in &entries {
            println!("{}", history_line(entry));
        }
    }
    Ok(())
}

pub async fn decide(args: DecideArgs) -> Result<()> {
    let decision: ApprovalDecision = args.decision.parse()?;
    let config = load_config(&args.engine, args.approver.clone())?;
    let client = engine_client(&config)?;

    let record = client.get_run(&args.flow_id, &args.run_id).await?;
    let run = WaitingRun::try_from(record).map_err(|record| {
        let mut error = AppError::validation(format!(
            "run {} is {}, not waiting for approval",
            record.id, record.status
        ))
        .with_code("FL-APPROVAL-003");
        error.add_context("flow_id", &args.flow_id);
        error
    })?;

    let approver = Approver::new(&config.approval.approver, &config.approval.source);
    let mut gateway = ApprovalGateway::new(&args.flow_id, approver);
    println!("{}", gateway.open(run).instructions);

    let action = gateway.begin_submit(decision)?;
    let result = client.submit_decision(&action).await;
    match gateway.complete_submit(action.token, result) {
        ApprovalOutcome::Resolved { run_id, decision } => {
            println!("{} accepted for run {}", decision, run_id);
            Ok(())
        }
        ApprovalOutcome::Failed(notice) => {
            Err(AppError::transport(notice.message).with_code("FL-APPROVAL-004").into())
        }
        ApprovalOutcome::Stale { .. } => Err(AppError::new(
            crate::core::types::ErrorCategory::InternalError,
            "approval request discarded before completion",
        )
        .into()),
    }
}
