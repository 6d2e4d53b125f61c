pub mod args;
pub mod commands;

pub use args::{DecideArgs, EngineArgs, HistoryArgs, ResolveArgs, StepsArgs, WatchArgs};
use clap::{Parser, Subcommand};

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "flowlens")]
#[command(version = crate::VERSION)]
#[command(about = "Reconcile live and historical workflow runs into one per-step view")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: watch a workflow, browse its history, then approve or reject paused runs."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Follow a workflow's runs live",
        long_about = "Watch subscribes to the engine's event socket, keeps run history fresh and reads commands from stdin: live, history, waiting, select <run>, approve <run>, resume, reject, dismiss, refresh, quit.",
        after_help = "Example:\n    flowlens watch --flow-id billing --graph flows/billing.json"
    )]
    Watch(WatchArgs),
    #[command(
        about = "Project a result payload onto a graph",
        long_about = "Resolve prints one step result per graph node as JSON. Malformed payloads resolve to all skipped steps.",
        after_help = "Example:\n    flowlens resolve --graph flows/billing.json --payload run.json"
    )]
    Resolve(ResolveArgs),
    #[command(
        about = "Print steps in visual order",
        long_about = "Steps orders nodes top to bottom by layout position, grouping nodes within 50 units of each other into one row ordered left to right.",
        after_help = "Example:\n    flowlens steps --graph flows/billing.yaml"
    )]
    Steps(StepsArgs),
    #[command(
        about = "List recent runs with their projected summary",
        after_help = "Example:\n    flowlens history --flow-id billing --graph flows/billing.json --json"
    )]
    History(HistoryArgs),
    #[command(
        about = "Resume or reject a paused run",
        long_about = "Decide submits one approval decision for a run in waiting status. Failures are reported and not retried.",
        after_help = "Example:\n    flowlens decide --flow-id billing --run-id r-42 --decision reject"
    )]
    Decide(DecideArgs),
}

pub async fn run(args: Args) -> crate::Result<()> {
    match args.command {
        Command::Watch(watch_args) => commands::watch(watch_args).await,
        Command::Resolve(resolve_args) => commands::resolve(resolve_args),
        Command::Steps(steps_args) => commands::steps(steps_args),
        Command::History(history_args) => commands::history(history_args).await,
        Command::Decide(decide_args) => commands::decide(decide_args).await,
    }
}
