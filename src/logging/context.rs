use crate::cli::Command;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Long-running `flowlens watch` session that renders to the terminal.
    Interactive,
    /// Commands that print one result and exit.
    OneShot,
}

pub fn detect_context(command: &Command) -> ExecutionContext {
    match command {
        Command::Watch(_) => ExecutionContext::Interactive,
        Command::Resolve(_) | Command::Steps(_) | Command::History(_) | Command::Decide(_) => {
            ExecutionContext::OneShot
        }
    }
}
