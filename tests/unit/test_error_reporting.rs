use flowlens::core::error::{
    AppError, ConsoleErrorReporter, ErrorReporter, Notice, TracingErrorReporter,
};
use flowlens::core::types::{ErrorCategory, ErrorSeverity};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_reporter_report_error() {
        let reporter = ConsoleErrorReporter;
        let mut error = AppError::transport("engine unreachable").with_code("FL-ENGINE-001");
        error.add_context("flow_id", "billing");
        // Output goes to stderr; the call must not panic.
        reporter.report_error(&error);
    }

    #[test]
    fn test_console_reporter_report_warning() {
        let reporter = ConsoleErrorReporter;
        reporter.report_warning("logging disabled", Some("no home directory".to_string()));
        reporter.report_warning("logging disabled", None);
    }

    #[test]
    fn test_tracing_reporter_without_subscriber() {
        let reporter = TracingErrorReporter;
        let error = AppError::new(ErrorCategory::MalformedPayload, "payload was not JSON");
        reporter.report_error(&error);
        reporter.report_info("history refreshed");
    }

    #[test]
    fn test_error_reporter_trait_object() {
        let reporters: Vec<Box<dyn ErrorReporter>> =
            vec![Box::new(ConsoleErrorReporter), Box::new(TracingErrorReporter)];
        let error = AppError::new(ErrorCategory::InternalError, "Trait test");
        for reporter in &reporters {
            reporter.report_error(&error);
        }
    }

    #[test]
    fn test_severity_follows_category() {
        assert_eq!(
            AppError::new(ErrorCategory::TransportFailure, "x").severity(),
            ErrorSeverity::Error
        );
        assert_eq!(
            AppError::new(ErrorCategory::MalformedPayload, "x").severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(
            AppError::new(ErrorCategory::StaleResponse, "x").severity(),
            ErrorSeverity::Debug
        );
    }

    #[test]
    fn test_notice_from_error_keeps_category_and_message() {
        let error = AppError::transport("503 Service Unavailable");
        let notice = Notice::from_error(&error);
        assert_eq!(notice.category, ErrorCategory::TransportFailure);
        assert_eq!(notice.to_string(), "TransportFailure: 503 Service Unavailable");
    }

    #[test]
    fn test_anyhow_errors_convert_to_internal() {
        let error: AppError = anyhow::anyhow!("boom").into();
        assert_eq!(error.category, ErrorCategory::InternalError);
        assert_eq!(error.code, "ANYHOW_ERROR");
        assert!(error.source.is_some());
    }

    #[test]
    fn test_app_error_round_trips_through_anyhow() {
        let original = AppError::validation("run r-1 is success, not waiting for approval")
            .with_code("FL-APPROVAL-003");
        let wrapped: anyhow::Error = original.into();
        let recovered = wrapped.downcast::<AppError>().unwrap();
        assert_eq!(recovered.code, "FL-APPROVAL-003");
        assert_eq!(recovered.category, ErrorCategory::ValidationError);
    }
}
