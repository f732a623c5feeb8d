//! Configuration validation.
//!
//! Every problem is collected before reporting so a misconfigured deployment
//! sees all missing settings at once.

use thiserror::Error;

use crate::config::{Config, ObservabilityConfig, ProviderPreset, ServerConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self
            .telegram
            .bot_token
            .as_deref()
            .map_or(true, |t| t.trim().is_empty())
        {
            errors.push(ValidationError::MissingField {
                field: "TELEGRAM_BOT_TOKEN".into(),
            });
        }

        if ProviderPreset::lookup(&self.provider.name).is_none() {
            errors.push(ValidationError::InvalidValue {
                field: "API_PROVIDER".into(),
                reason: format!(
                    "unsupported provider '{}' (expected one of: {})",
                    self.provider.name,
                    ProviderPreset::names().join(", ")
                ),
            });
        }

        if self
            .provider
            .api_key
            .as_deref()
            .map_or(true, |k| k.trim().is_empty())
        {
            errors.push(ValidationError::MissingField {
                field: "API_KEY".into(),
            });
        }

        if let Err(e) = self.server.validate() {
            errors.push(e);
        }

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if let Some(raw) = &self.invalid_port {
            return Err(ValidationError::InvalidValue {
                field: "PORT".into(),
                reason: format!("'{raw}' is not a port number"),
            });
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "server.host".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        const FORMATS: &[&str] = &["json", "pretty"];

        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", LEVELS.join(", ")),
            });
        }
        if !FORMATS.contains(&self.log_format.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", FORMATS.join(", ")),
            });
        }
        Ok(())
    }
}
