//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] gopizza_storage::StorageError),

    #[error("Identity provider error: {0}")]
    Auth(#[from] gopizza_identity::AuthError),

    #[error("Document store error: {0}")]
    Document(#[from] gopizza_documents::DocumentError),

    #[error("Session error: {0}")]
    Session(#[from] gopizza_session::SessionError),

    #[error("Menu error: {0}")]
    Menu(#[from] gopizza_menu::MenuError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
