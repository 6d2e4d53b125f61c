use crate::core::types::{ErrorCategory, ErrorSeverity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    pub context: HashMap<String, String>,
    pub recovery_suggestions: Vec<String>,
    pub occurred_at: DateTime<Utc>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        let severity = match category {
            ErrorCategory::ValidationError
            | ErrorCategory::TransportFailure
            | ErrorCategory::ConfigError
            | ErrorCategory::SerializationError
            | ErrorCategory::IoError
            | ErrorCategory::InternalError => ErrorSeverity::Error,
            ErrorCategory::MalformedPayload => ErrorSeverity::Warning,
            ErrorCategory::StaleResponse => ErrorSeverity::Debug,
            ErrorCategory::Unknown => ErrorSeverity::Info,
        };
        AppError {
            category,
            severity,
            code: format!("ERR-{}", uuid::Uuid::new_v4()),
            message: message.into(),
            context: HashMap::new(),
            recovery_suggestions: vec![],
            occurred_at: Utc::now(),
            source: None,
        }
    }

    pub fn with_source<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        let mut error = AppError::new(category, message);
        error.source = Some(anyhow::anyhow!(source));
        error
    }

    /// Shorthand for failures talking to the execution engine.
    pub fn transport<T: Into<String>>(message: T) -> Self {
        AppError::new(ErrorCategory::TransportFailure, message)
            .with_suggestion("Check that the execution engine is reachable and retry")
    }

    pub fn validation<T: Into<String>>(message: T) -> Self {
        AppError::new(ErrorCategory::ValidationError, message)
    }

    pub fn with_context<T: Into<String>>(mut self, context: T) -> Self {
        self.context.insert("context".to_string(), context.into());
        self
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_suggestion<T: Into<String>>(mut self, suggestion: T) -> Self {
        self.recovery_suggestions.push(suggestion.into());
        self
    }

    pub fn add_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    /// Whether the failure came from the engine transport rather than local state.
    pub fn is_transport(&self) -> bool {
        self.category == ErrorCategory::TransportFailure
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if !self.context.is_empty() {
            let mut pairs: Vec<_> = self.context.iter().collect();
            pairs.sort();
            let rendered: Vec<String> = pairs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            write!(f, " ({})", rendered.join(", "))?;
        }
        if let Some(ref source) = self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Wraps a foreign error under a fixed code, keeping it as the source.
    fn converted(category: ErrorCategory, code: &str, source: anyhow::Error) -> Self {
        let mut error = AppError::new(category, source.to_string()).with_code(code);
        error.source = Some(source);
        error
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::converted(ErrorCategory::InternalError, "ANYHOW_ERROR", e)
            .with_suggestion("Check the error details")
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::converted(ErrorCategory::IoError, "IO_ERROR", e.into())
            .with_suggestion("Check file permissions and paths")
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::converted(ErrorCategory::SerializationError, "JSON_ERROR", e.into())
    }
}

/// User-visible, non-blocking notification derived from a failed operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub category: ErrorCategory,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        Notice {
            category,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn from_error(error: &AppError) -> Self {
        Notice::new(error.category, error.message.clone())
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

pub trait ErrorReporter {
    fn report_error(&self, error: &AppError);
    fn report_warning(&self, message: &str, context: Option<String>);
    fn report_info(&self, message: &str);
}

/// Reports through `tracing`, so output lands wherever the logging sinks point.
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report_error(&self, error: &AppError) {
        tracing::error!(
            code = %error.code,
            category = %error.category,
            context = ?error.context,
            "{}",
            error.message
        );
        if let Some(ref source) = error.source {
            tracing::error!(code = %error.code, "caused by: {}", source);
        }
    }

    fn report_warning(&self, message: &str, context: Option<String>) {
        match context {
            Some(ctx) => tracing::warn!(context = %ctx, "{}", message),
            None => tracing::warn!("{}", message),
        }
    }

    fn report_info(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

/// Reports straight to the terminal; used for the final error of a CLI command.
pub struct ConsoleErrorReporter;

impl ErrorReporter for ConsoleErrorReporter {
    fn report_error(&self, error: &AppError) {
        eprintln!("error[{}]: {}", error.code, error.message);
        let mut context: Vec<_> = error.context.iter().collect();
        context.sort();
        for (key, value) in context {
            eprintln!("  {} = {}", key, value);
        }
        for suggestion in &error.recovery_suggestions {
            eprintln!("  hint: {}", suggestion);
        }
        if let Some(ref source) = error.source {
            eprintln!("  caused by: {}", source);
        }
    }

    fn report_warning(&self, message: &str, context: Option<String>) {
        match context {
            Some(ctx) => eprintln!("warning: {} ({})", message, ctx),
            None => eprintln!("warning: {}", message),
        }
    }

    fn report_info(&self, message: &str) {
        eprintln!("{}", message);
    }
}
