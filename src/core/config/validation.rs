#![allow(clippy::result_large_err)]

use super::FlowlensConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use url::Url;

pub const MAX_HISTORY_LIMIT: usize = 200;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &FlowlensConfig) -> Result<(), AppError> {
        Self::validate_url("engine.http_url", &config.engine.http_url, &["http", "https"])?;
        Self::validate_url("engine.ws_url", &config.engine.ws_url, &["ws", "wss"])?;

        if config.session.tick_interval_ms == 0 {
            return Err(config_error("session.tick_interval_ms must be greater than 0"));
        }

        if !(1..=MAX_HISTORY_LIMIT).contains(&config.session.history_limit) {
            return Err(config_error(format!(
                "session.history_limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }

        if config.approval.approver.trim().is_empty() {
            return Err(config_error("approval.approver cannot be empty"));
        }

        Ok(())
    }

    fn validate_url(field: &str, value: &str, schemes: &[&str]) -> Result<(), AppError> {
        let parsed = Url::parse(value)
            .map_err(|err| config_error(format!("invalid {}: {}", field, err)))?;
        if !schemes.contains(&parsed.scheme()) {
            return Err(config_error(format!(
                "{} must use one of the schemes {:?}, got '{}'",
                field,
                schemes,
                parsed.scheme()
            )));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ConfigError, message).with_code("FL-CONFIG-002")
}
