//! Document store error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("Base URL cannot hold a path: {0}")]
    InvalidBaseUrl(String),

    #[error("Document store returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed document: {0}")]
    Malformed(String),
}
