use clap::Parser;
use flowlens::cli::{self, Args};
use flowlens::core::error::{AppError, ConsoleErrorReporter, ErrorReporter};
use flowlens::logging;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let reporter = ConsoleErrorReporter;

    let _logging_guard = match logging::init(&args.command) {
        Ok(guard) => Some(guard),
        Err(err) => {
            reporter.report_warning("logging disabled", Some(err.to_string()));
            None
        }
    };

    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("command failed: {:#}", err);
            let app_error = err.downcast::<AppError>().unwrap_or_else(AppError::from);
            reporter.report_error(&app_error);
            ExitCode::FAILURE
        }
    }
}
