//! Test doubles for the session manager's collaborators

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

use gopizza_documents::{DocumentError, Profile, ProfileStore};
use gopizza_identity::{AuthError, IdentityProvider};
use gopizza_storage::{Database, KeyValueStore, StorageError};

use crate::manager::SessionManager;
use crate::notice::{Notice, Notifier};

/// Scripted outcome of `verify`.
#[derive(Debug, Clone, Copy)]
pub enum Verify {
    Subject(&'static str),
    Invalid,
    Fail(&'static str),
}

pub struct FakeIdentity {
    verify: Verify,
    fail_invalidate: bool,
    fail_reset: bool,
    /// `verify` waits for a permit when set
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<usize>,
    invalidated: Mutex<Vec<String>>,
    reset_requests: Mutex<Vec<String>>,
}

impl FakeIdentity {
    pub fn new(verify: Verify) -> Self {
        Self {
            verify,
            fail_invalidate: false,
            fail_reset: false,
            gate: None,
            calls: Mutex::new(0),
            invalidated: Mutex::new(Vec::new()),
            reset_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_invalidate(mut self) -> Self {
        self.fail_invalidate = true;
        self
    }

    pub fn failing_reset(mut self) -> Self {
        self.fail_reset = true;
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Number of provider calls of any kind.
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }

    pub fn invalidated(&self) -> Vec<String> {
        self.invalidated.lock().clone()
    }

    pub fn reset_requests(&self) -> Vec<String> {
        self.reset_requests.lock().clone()
    }
}

fn provider_error(code: &str) -> AuthError {
    AuthError::Provider {
        code: code.to_string(),
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn verify(&self, _email: &str, _password: &str) -> gopizza_identity::Result<String> {
        *self.calls.lock() += 1;
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        match self.verify {
            Verify::Subject(id) => Ok(id.to_string()),
            Verify::Invalid => Err(AuthError::InvalidCredentials),
            Verify::Fail(code) => Err(provider_error(code)),
        }
    }

    async fn invalidate(&self, subject_id: &str) -> gopizza_identity::Result<()> {
        *self.calls.lock() += 1;
        self.invalidated.lock().push(subject_id.to_string());
        if self.fail_invalidate {
            return Err(provider_error("NETWORK_REQUEST_FAILED"));
        }
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> gopizza_identity::Result<()> {
        *self.calls.lock() += 1;
        self.reset_requests.lock().push(email.to_string());
        if self.fail_reset {
            return Err(provider_error("RESET_PASSWORD_EXCEED_LIMIT"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProfiles {
    profiles: HashMap<String, Profile>,
    fail: bool,
    calls: Mutex<usize>,
}

impl FakeProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, name: &str, is_admin: bool) -> Self {
        self.profiles.insert(
            id.to_string(),
            Profile {
                name: name.to_string(),
                is_admin,
            },
        );
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl ProfileStore for FakeProfiles {
    async fn get_profile(&self, subject_id: &str) -> gopizza_documents::Result<Option<Profile>> {
        *self.calls.lock() += 1;
        if self.fail {
            return Err(DocumentError::Status {
                status: 503,
                message: "The service is currently unavailable.".to_string(),
            });
        }
        Ok(self.profiles.get(subject_id).cloned())
    }
}

/// Store whose writes always fail.
#[derive(Clone, Copy)]
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> gopizza_storage::Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &[u8]) -> gopizza_storage::Result<()> {
        Err(StorageError::Io(std::io::Error::other("disk full")))
    }

    fn remove(&self, _key: &str) -> gopizza_storage::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices.lock().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().push(notice.clone());
    }
}

pub struct Harness<S = Database> {
    pub manager: SessionManager,
    pub identity: Arc<FakeIdentity>,
    pub profiles: Arc<FakeProfiles>,
    pub notifier: Arc<RecordingNotifier>,
    pub db: S,
}

impl Harness<Database> {
    pub fn new(identity: FakeIdentity, profiles: FakeProfiles) -> Self {
        let db = Database::open_in_memory().expect("in-memory database");
        Self::with_store(identity, profiles, db)
    }
}

impl<S: KeyValueStore + Clone + 'static> Harness<S> {
    pub fn with_store(identity: FakeIdentity, profiles: FakeProfiles, db: S) -> Self {
        let identity = Arc::new(identity);
        let profiles = Arc::new(profiles);
        let notifier = Arc::new(RecordingNotifier::default());

        let manager = SessionManager::new(
            identity.clone(),
            profiles.clone(),
            Arc::new(db.clone()),
            notifier.clone(),
        );

        Self {
            manager,
            identity,
            profiles,
            notifier,
            db,
        }
    }

    /// A new manager over the same collaborators and storage.
    pub fn fresh_manager(&self) -> SessionManager {
        SessionManager::new(
            self.identity.clone(),
            self.profiles.clone(),
            Arc::new(self.db.clone()),
            self.notifier.clone(),
        )
    }
}
