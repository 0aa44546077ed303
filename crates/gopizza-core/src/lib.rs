//! GoPizza Core
//!
//! Wires storage, the identity provider, the document store, the session
//! manager and the menu into one `App`. Screens hold an `App` (or clones of
//! its handles) and never talk to remote services directly.

mod app;
mod config;
mod error;

pub use app::App;
pub use config::Config;
pub use error::CoreError;

// Re-export core components
pub use gopizza_documents::{
    DocumentError, FirestoreClient, Product, ProductCatalog, Profile, ProfileStore,
};
pub use gopizza_identity::{AuthError, FirebaseAuth, IdentityProvider, TokenSource};
pub use gopizza_menu::{Menu, MenuError, Route};
pub use gopizza_session::{
    LogNotifier, Notice, NoticeKind, Notifier, SessionError, SessionManager, SessionOrigin,
    SessionState, User,
};
pub use gopizza_storage::{Database, KeyValueStore, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
