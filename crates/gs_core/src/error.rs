use serde::{Deserialize, Serialize};
use std::fmt;

/// Single structured error shape shared by the provisioner, the query session and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Keeps the original details while re-labelling the error for an outer boundary.
    pub fn recode(self, code: impl Into<String>, message: impl Into<String>) -> Self {
        let details = match self.details {
            Some(d) => format!("{}: {}; {}", self.code, self.message, d),
            None => format!("{}: {}", self.code, self.message),
        };
        Self {
            code: code.into(),
            message: message.into(),
            details: Some(details),
            retryable: self.retryable,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
