//! Application error taxonomy
//!
//! Maps every failure in the payment flow to an HTTP status, a machine-readable
//! code and a message that is safe to show to members.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "PROVIDER_CONFIG_NOT_FOUND")]
    ProviderConfigNotFound,
    #[serde(rename = "PAYMENT_REQUEST_NOT_FOUND")]
    PaymentRequestNotFound,
    #[serde(rename = "PAYMENT_ALREADY_COMPLETED")]
    PaymentAlreadyCompleted,

    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,

    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Missing preconditions and state conflicts
#[derive(Debug, Clone)]
pub enum DomainError {
    /// No `mpesa_config` row is flagged active
    ProviderConfigNotFound,
    PaymentRequestNotFound { payment_request_id: String },
    /// The request already settled; pushing again would double-charge
    PaymentAlreadyCompleted { payment_request_id: String },
}

#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

/// Upstream provider failures (token exchange, STK push)
#[derive(Debug, Clone)]
pub enum ExternalError {
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
}

/// Input validation errors; always raised before any side effect
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidAmount { amount: String, reason: String },
    InvalidPhoneNumber { phone_number: String },
    InvalidField { field: String, reason: String },
    MissingField { field: String },
    MalformedBody { reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn validation(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }

    pub fn domain(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::ProviderConfigNotFound => 404,
                DomainError::PaymentRequestNotFound { .. } => 404,
                DomainError::PaymentAlreadyCompleted { .. } => 409,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(_) => 500,
            AppErrorKind::Validation(_) => 400,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::ProviderConfigNotFound => ErrorCode::ProviderConfigNotFound,
                DomainError::PaymentRequestNotFound { .. } => ErrorCode::PaymentRequestNotFound,
                DomainError::PaymentAlreadyCompleted { .. } => ErrorCode::PaymentAlreadyCompleted,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(_) => ErrorCode::PaymentProviderError,
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::ProviderConfigNotFound => {
                    "M-Pesa payments are not configured".to_string()
                }
                DomainError::PaymentRequestNotFound { payment_request_id } => {
                    format!("Payment request '{}' not found", payment_request_id)
                }
                DomainError::PaymentAlreadyCompleted { payment_request_id } => {
                    format!("Payment request '{}' is already paid", payment_request_id)
                }
            },
            AppErrorKind::Infrastructure(_) | AppErrorKind::External(_) => {
                "Payment processing failed".to_string()
            }
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::InvalidPhoneNumber { .. } => {
                    "Invalid phone number. Use the format 2547XXXXXXXX".to_string()
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid {}: {}", field, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::MalformedBody { reason } => {
                    format!("Invalid request body: {}", reason)
                }
            },
        }
    }

    /// Underlying diagnostic text for server-side failures.
    pub fn details(&self) -> Option<String> {
        match &self.kind {
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { message, .. } => Some(message.clone()),
                InfrastructureError::Configuration { message } => Some(message.clone()),
            },
            AppErrorKind::External(ExternalError::PaymentProvider { message, .. }) => {
                Some(message.clone())
            }
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(ExternalError::PaymentProvider { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.details() {
            Some(details) => write!(f, "{}: {}", self.user_message(), details),
            None => write!(f, "{}", self.user_message()),
        }?;
        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError> and From<PaymentError> live next to those types.

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = AppError::validation(ValidationError::InvalidPhoneNumber {
            phone_number: "0712345678".to_string(),
        });
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), ErrorCode::ValidationError);
        assert!(err.details().is_none());
    }

    #[test]
    fn missing_config_is_not_found() {
        let err = AppError::domain(DomainError::ProviderConfigNotFound);
        assert_eq!(err.status_code(), 404);
        assert!(!err.is_retryable());
    }

    #[test]
    fn provider_errors_hide_details_from_message() {
        let err = AppError::new(AppErrorKind::External(ExternalError::PaymentProvider {
            provider: "mpesa".to_string(),
            message: "HTTP 401: invalid credentials".to_string(),
            is_retryable: false,
        }));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.user_message(), "Payment processing failed");
        assert_eq!(err.details().as_deref(), Some("HTTP 401: invalid credentials"));
        assert!(err.to_string().contains("invalid credentials"));
    }

    #[test]
    fn already_completed_is_conflict() {
        let err = AppError::domain(DomainError::PaymentAlreadyCompleted {
            payment_request_id: "pr_1".to_string(),
        });
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.error_code(), ErrorCode::PaymentAlreadyCompleted);
    }
}
