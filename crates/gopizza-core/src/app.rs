//! Main application state container
//!
//! One `App` per process. It owns the local database and the remote clients;
//! the session manager and menu it hands out are shared handles.

use std::sync::Arc;

use gopizza_documents::FirestoreClient;
use gopizza_identity::FirebaseAuth;
use gopizza_menu::{Menu, Route};
use gopizza_session::{LogNotifier, Notifier, SessionManager, User};
use gopizza_storage::Database;

use crate::config::Config;
use crate::Result;

pub struct App {
    /// Configuration
    config: Config,
    /// Local database (session snapshot)
    db: Database,
    /// Session manager, shared with every screen
    session: SessionManager,
    /// Home screen listing
    menu: Menu,
}

impl App {
    /// Build an app that reports notices to the log.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(config: Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        config.validate()?;

        let db = Database::open(&config.database_path)?;

        let auth = match config.request_timeout() {
            Some(timeout) => FirebaseAuth::with_timeout(config.auth_url()?, &config.api_key, timeout)?,
            None => FirebaseAuth::new(config.auth_url()?, &config.api_key),
        };
        // Refresh credentials share the database with the session snapshot
        let auth = Arc::new(
            auth.with_token_base_url(config.token_url()?)
                .with_store(Arc::new(db.clone())),
        );

        let firestore = match config.request_timeout() {
            Some(timeout) => {
                FirestoreClient::with_timeout(config.firestore_url()?, &config.project_id, timeout)?
            }
            None => FirestoreClient::new(config.firestore_url()?, &config.project_id),
        };
        let firestore = Arc::new(firestore.with_token_source(auth.clone()));

        let session = SessionManager::new(
            auth,
            firestore.clone(),
            Arc::new(db.clone()),
            notifier.clone(),
        );
        let menu = Menu::new(firestore, notifier);

        Ok(Self {
            config,
            db,
            session,
            menu,
        })
    }

    /// Restore the previous session, if one was saved on this device.
    pub fn initialize(&self) -> Option<User> {
        let user = self.session.restore();

        tracing::info!(
            signed_in = user.is_some(),
            database = %self.config.database_path.display(),
            "App initialized"
        );

        user
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn menu(&self) -> &Menu {
        &self.menu
    }

    // === Home screen ===

    pub fn greeting(&self) -> String {
        gopizza_menu::greeting(self.session.current_user().as_ref())
    }

    pub fn open_product(&self, product_id: &str) -> Route {
        gopizza_menu::route_for(self.session.current_user().as_ref(), product_id)
    }

    /// Route to the new-product form, for admins only.
    pub fn add_product(&self) -> Option<Route> {
        gopizza_menu::new_product_route(self.session.current_user().as_ref())
    }
}
