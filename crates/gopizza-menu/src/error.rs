//! Menu error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MenuError {
    #[error("Catalog query failed: {0}")]
    Query(#[from] gopizza_documents::DocumentError),
}
