//! Identity provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown account or wrong password. The two are never told apart.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Identity provider error: {code}")]
    Provider { code: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

impl AuthError {
    /// Diagnostic code for logs.
    pub fn code(&self) -> &str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::Provider { code } => code,
            AuthError::Http(_) => "HTTP",
            AuthError::Endpoint(_) => "ENDPOINT",
        }
    }

    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, AuthError::InvalidCredentials)
    }
}
