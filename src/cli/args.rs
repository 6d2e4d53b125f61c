use clap::Args;
use std::path::PathBuf;

/// Engine endpoint overrides shared by commands that talk to the engine.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Engine HTTP base URL (overrides [engine].http_url and FLOWLENS_HTTP_URL)
    #[arg(long, value_name = "URL", help_heading = "Engine")]
    pub http_url: Option<String>,

    /// Engine WebSocket base URL (overrides [engine].ws_url and FLOWLENS_WS_URL)
    #[arg(long, value_name = "URL", help_heading = "Engine")]
    pub ws_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Workflow whose runs are followed
    #[arg(long, value_name = "ID")]
    pub flow_id: String,

    /// Workflow graph file (JSON, or YAML by extension)
    #[arg(long, value_name = "FILE")]
    pub graph: PathBuf,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Identity sent with approval decisions
    #[arg(long, value_name = "ID")]
    pub approver: Option<String>,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Workflow graph file (JSON, or YAML by extension)
    #[arg(long, value_name = "FILE")]
    pub graph: PathBuf,

    /// Result payload file: a JSON object, or a JSON string holding one
    #[arg(long, value_name = "FILE")]
    pub payload: PathBuf,

    /// Treat the payload file as a full run record and finalize steps of finished runs
    #[arg(long)]
    pub run: bool,
}

#[derive(Args, Debug)]
pub struct StepsArgs {
    /// Workflow graph file (JSON, or YAML by extension)
    #[arg(long, value_name = "FILE")]
    pub graph: PathBuf,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Workflow whose runs are listed
    #[arg(long, value_name = "ID")]
    pub flow_id: String,

    /// Workflow graph file used to project each run
    #[arg(long, value_name = "FILE")]
    pub graph: PathBuf,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct DecideArgs {
    #[arg(long, value_name = "ID")]
    pub flow_id: String,

    #[arg(long, value_name = "ID")]
    pub run_id: String,

    /// resume (alias approve) or reject (alias deny)
    #[arg(long, value_name = "DECISION")]
    pub decision: String,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Identity sent with the decision
    #[arg(long, value_name = "ID")]
    pub approver: Option<String>,
}
