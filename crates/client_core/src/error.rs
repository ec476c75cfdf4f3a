use std::fmt;

use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Local field-check failures collected before any request is issued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    pub fn into_result(self) -> Result<(), ClientError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotReady,
    SubmissionInFlight,
    Unmounted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::NotReady => "both dependencies must be resolved before submitting",
            RejectReason::SubmissionInFlight => "a submission is already in flight",
            RejectReason::Unmounted => "the registration view is no longer active",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("authorization rejected (status {status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("backend error (status {status}): {message}")]
    Backend { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed backend response: {0}")]
    Decode(String),
    #[error("credential storage failure: {0:#}")]
    Storage(anyhow::Error),
    #[error("operation rejected: {0}")]
    Rejected(RejectReason),
    #[error("invalid gateway configuration: {0}")]
    Config(String),
}

impl ClientError {
    pub fn from_api_error(status: u16, error: ApiError) -> Self {
        if error.code.is_authorization() {
            ClientError::Unauthorized {
                status,
                message: error.message,
            }
        } else {
            ClientError::Backend {
                status,
                message: error.message,
            }
        }
    }

    /// True when the credential was rejected and the session must be dropped.
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Validation(_) => ErrorCode::Validation,
            ClientError::Unauthorized { status, .. } | ClientError::Backend { status, .. } => {
                ErrorCode::from_status(*status)
            }
            ClientError::Rejected(_) => ErrorCode::Validation,
            ClientError::Transport(_)
            | ClientError::Decode(_)
            | ClientError::Storage(_)
            | ClientError::Config(_) => ErrorCode::Internal,
        }
    }

    /// Text suitable for showing next to the operation that failed.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Unauthorized { message, .. } | ClientError::Backend { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}
