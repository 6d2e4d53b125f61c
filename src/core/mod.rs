pub mod approval;
pub mod config;
pub mod error;
pub mod graph;
pub mod projection;
pub mod reconcile;
pub mod runs;
pub mod types;

pub use approval::{ApprovalDecision, ApprovalGateway, ApprovalOutcome, Approver, WaitingRun};
pub use config::{ConfigLoader, FlowlensConfig};
pub use error::{AppError, ErrorReporter, Notice, TracingErrorReporter};
pub use graph::{GraphModel, Node, NodeKind};
pub use projection::{resolve, resolve_run, RunSummary, StepResult, StepResults, StepStatus};
pub use reconcile::{ControllerEvent, Effect, ReconciliationController, ViewMode};
pub use runs::{LiveStepUpdate, RunHistory, RunRecord, RunStatus};
pub use types::*;
