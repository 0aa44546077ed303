//! Session Manager
//!
//! Owns the current user. Sign-in verifies credentials with the identity
//! provider, then loads the profile record; only a complete user is persisted
//! and published. Restore trusts the local snapshot until a privileged action
//! asks for re-verification.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

use gopizza_documents::ProfileStore;
use gopizza_identity::IdentityProvider;
use gopizza_storage::KeyValueStore;

use crate::error::SessionError;
use crate::notice::{Notice, Notifier};
use crate::user::{SessionOrigin, SessionState, User};
use crate::Result;

/// Local storage slot of the user snapshot.
pub const SNAPSHOT_KEY: &str = "@gopizza:users";

pub struct SessionManager {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    /// Current state; every change is published to subscribers
    state: Arc<watch::Sender<SessionState>>,
    /// Subjects the provider verified that never became the current user,
    /// and whose provider session is not known to be ended
    unreleased: Arc<Mutex<Vec<String>>>,
}

/// Holds `is_authenticating` up until dropped, on every exit path. Overlapping
/// holders are counted; the flag clears when the last one drops.
struct Authenticating<'a> {
    state: &'a watch::Sender<SessionState>,
}

impl<'a> Authenticating<'a> {
    fn begin(state: &'a watch::Sender<SessionState>) -> Self {
        state.send_modify(|s| {
            s.in_flight += 1;
            s.is_authenticating = true;
        });
        Self { state }
    }
}

impl Drop for Authenticating<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| {
            s.in_flight = s.in_flight.saturating_sub(1);
            s.is_authenticating = s.in_flight > 0;
        });
    }
}

impl SessionManager {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());

        Self {
            identity,
            profiles,
            store,
            notifier,
            state: Arc::new(state),
            unreleased: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sign in with email and password.
    ///
    /// Both fields must be non-empty (the email is trimmed, the password is
    /// not); otherwise nothing is sent to the provider. On success the user
    /// is persisted before it becomes current. On any failure the current
    /// user is left as it was, and a provider session opened by this attempt
    /// is ended again.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(self.report(SessionError::MissingCredentials));
        }

        let _authenticating = Authenticating::begin(&self.state);

        let subject_id = match self.identity.verify(email, password).await {
            Ok(subject_id) => subject_id,
            Err(err) if err.is_invalid_credentials() => {
                tracing::info!("Sign-in rejected: invalid credentials");
                return Err(self.report(SessionError::InvalidCredentials));
            }
            Err(err) => {
                tracing::warn!(code = %err.code(), error = %err, "Sign-in failed");
                return Err(self.report(SessionError::SignIn(err)));
            }
        };

        // Recorded until established, so a dropped attempt is still released
        self.unreleased.lock().push(subject_id.clone());

        let profile = match self.profiles.get_profile(&subject_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::warn!(subject_id = %subject_id, "Signed in without a profile record");
                self.release(&subject_id).await;
                return Err(self.report(SessionError::ProfileNotFound(subject_id)));
            }
            Err(err) => {
                tracing::warn!(subject_id = %subject_id, error = %err, "Profile fetch failed");
                self.release(&subject_id).await;
                return Err(self.report(SessionError::ProfileFetch(err)));
            }
        };

        let user = User::from_profile(subject_id, profile);
        if let Err(err) = self.establish(user.clone(), SessionOrigin::SignedIn) {
            self.release(&user.id).await;
            return Err(err);
        }
        self.unreleased.lock().retain(|id| id != &user.id);

        tracing::info!(
            user_id = %user.id,
            is_admin = user.is_admin,
            "Signed in"
        );

        Ok(user)
    }

    /// Load the persisted snapshot, if any, as the current user.
    ///
    /// Called once at startup. The snapshot is not checked against the
    /// identity provider; see `require_admin`.
    pub fn restore(&self) -> Option<User> {
        let _authenticating = Authenticating::begin(&self.state);

        let bytes = match self.store.get(SNAPSHOT_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!("No session snapshot");
                return None;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to read session snapshot");
                return None;
            }
        };

        match serde_json::from_slice::<User>(&bytes) {
            Ok(user) => {
                self.state.send_modify(|s| {
                    s.user = Some(user.clone());
                    s.origin = Some(SessionOrigin::Restored);
                });

                tracing::info!(user_id = %user.id, "Restored session");

                Some(user)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Discarding unreadable session snapshot");
                if let Err(err) = self.store.remove(SNAPSHOT_KEY) {
                    tracing::error!(error = %err, "Failed to remove session snapshot");
                }
                None
            }
        }
    }

    /// Sign out.
    ///
    /// Every provider session this manager knows of is ended: the current
    /// user's, and those of sign-in attempts that failed to release theirs.
    /// The local session is always cleared, even when the provider call
    /// fails. An error is returned only if the snapshot could not be removed.
    pub async fn sign_out(&self) -> Result<()> {
        let mut subjects: Vec<String> = std::mem::take(&mut *self.unreleased.lock());
        if let Some(user) = self.current_user() {
            subjects.retain(|id| id != &user.id);
            subjects.insert(0, user.id);
        }

        for subject_id in &subjects {
            if let Err(err) = self.identity.invalidate(subject_id).await {
                tracing::warn!(
                    user_id = %subject_id,
                    code = %err.code(),
                    error = %err,
                    "Provider sign-out failed, clearing local session anyway"
                );
            }
        }

        let removed = self.store.remove(SNAPSHOT_KEY);
        self.clear();

        match removed {
            Ok(()) => {
                tracing::info!("Signed out");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to remove session snapshot");
                Err(self.report(err.into()))
            }
        }
    }

    /// Ask the provider to email a password reset link.
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(self.report(SessionError::MissingEmail));
        }

        match self.identity.request_password_reset(email).await {
            Ok(()) => {
                self.notifier.notify(&Notice::info(
                    "Reset password",
                    "We sent a link to your email to reset your password.",
                ));
                Ok(())
            }
            Err(err) => {
                tracing::warn!(code = %err.code(), error = %err, "Password reset request failed");
                Err(self.report(SessionError::PasswordReset(err)))
            }
        }
    }

    /// Re-read the current user's profile record.
    ///
    /// Returns the refreshed user, or `None` when the record is gone, in
    /// which case the local session is ended.
    pub async fn refresh_profile(&self) -> Result<Option<User>> {
        let current = self
            .current_user()
            .ok_or_else(|| self.report(SessionError::NotAuthenticated))?;

        let _authenticating = Authenticating::begin(&self.state);

        let profile = match self.profiles.get_profile(&current.id).await {
            Ok(profile) => profile,
            Err(err) => {
                tracing::warn!(user_id = %current.id, error = %err, "Profile refresh failed");
                return Err(self.report(SessionError::ProfileFetch(err)));
            }
        };

        // Signed out or switched account while the fetch was in flight
        if self.current_user().map(|u| u.id) != Some(current.id.clone()) {
            return Ok(None);
        }

        match profile {
            Some(profile) => {
                let user = User::from_profile(current.id, profile);
                self.establish(user.clone(), SessionOrigin::SignedIn)?;
                tracing::debug!(user_id = %user.id, "Refreshed profile");
                Ok(Some(user))
            }
            None => {
                tracing::warn!(user_id = %current.id, "Profile record removed, ending session");
                let removed = self.store.remove(SNAPSHOT_KEY);
                self.clear();
                removed.map_err(|err| self.report(err.into()))?;
                Ok(None)
            }
        }
    }

    /// Gate for administrator-only actions.
    ///
    /// A restored session is re-verified against the document store first.
    pub async fn require_admin(&self) -> Result<User> {
        let state = self.state();

        let user = match (state.user, state.origin) {
            (None, _) => return Err(self.report(SessionError::NotAuthenticated)),
            (Some(_), Some(SessionOrigin::Restored)) => match self.refresh_profile().await? {
                Some(user) => user,
                None => return Err(self.report(SessionError::NotAuthenticated)),
            },
            (Some(user), _) => user,
        };

        if user.is_admin {
            Ok(user)
        } else {
            Err(self.report(SessionError::NotAuthorized))
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn is_authenticating(&self) -> bool {
        self.state.borrow().is_authenticating
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Watch state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Persist, then publish. Nothing is published if the write fails.
    fn establish(&self, user: User, origin: SessionOrigin) -> Result<()> {
        if let Err(err) = self.persist(&user) {
            tracing::error!(user_id = %user.id, error = %err, "Failed to persist session snapshot");
            return Err(self.report(err));
        }

        self.state.send_modify(|s| {
            s.user = Some(user);
            s.origin = Some(origin);
        });

        Ok(())
    }

    fn persist(&self, user: &User) -> Result<()> {
        let bytes = serde_json::to_vec(user)?;
        self.store.set(SNAPSHOT_KEY, &bytes)?;
        Ok(())
    }

    fn clear(&self) {
        self.state.send_modify(|s| {
            s.user = None;
            s.origin = None;
        });
    }

    /// End the provider session of a subject that never became current.
    async fn release(&self, subject_id: &str) {
        match self.identity.invalidate(subject_id).await {
            Ok(()) => self.unreleased.lock().retain(|id| id != subject_id),
            // Kept in `unreleased`; sign-out tries again
            Err(err) => tracing::warn!(
                subject_id = %subject_id,
                code = %err.code(),
                error = %err,
                "Failed to end provider session of abandoned sign-in"
            ),
        }
    }

    fn report(&self, err: SessionError) -> SessionError {
        self.notifier.notify(&err.notice());
        err
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            profiles: Arc::clone(&self.profiles),
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            state: Arc::clone(&self.state),
            unreleased: Arc::clone(&self.unreleased),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::NoticeKind;
    use crate::testing::{FailingStore, FakeIdentity, FakeProfiles, Harness, Verify};
    use gopizza_storage::Database;
    use tokio::sync::{mpsc, Semaphore};

    fn ana() -> User {
        User {
            id: "u1".to_string(),
            name: "Ana".to_string(),
            is_admin: true,
        }
    }

    #[tokio::test]
    async fn test_empty_fields_never_reach_provider() {
        let h = Harness::new(FakeIdentity::new(Verify::Subject("u1")), FakeProfiles::new());

        for (email, password) in [("a@b.com", ""), ("", "secret"), ("", ""), ("   ", "secret")] {
            let err = h.manager.sign_in(email, password).await.unwrap_err();
            assert!(err.is_validation());
        }
        let err = h.manager.forgot_password("").await.unwrap_err();
        assert!(matches!(err, SessionError::MissingEmail));

        assert_eq!(h.identity.calls(), 0);
        assert_eq!(h.profiles.calls(), 0);
        assert_eq!(h.notifier.notices().len(), 5);
        assert_eq!(
            h.notifier.last().unwrap().message,
            "Enter your email."
        );
    }

    #[tokio::test]
    async fn test_empty_password_leaves_user_unchanged() {
        let h = Harness::new(FakeIdentity::new(Verify::Subject("u1")), FakeProfiles::new());

        let err = h.manager.sign_in("a@b.com", "").await.unwrap_err();

        assert!(matches!(err, SessionError::MissingCredentials));
        assert_eq!(
            h.notifier.last().unwrap().message,
            "Enter your email and password."
        );
        assert_eq!(h.manager.current_user(), None);
        assert!(!h.manager.is_authenticating());
    }

    #[tokio::test]
    async fn test_invalid_credentials() {
        let h = Harness::new(FakeIdentity::new(Verify::Invalid), FakeProfiles::new());

        let err = h.manager.sign_in("a@b.com", "wrong").await.unwrap_err();

        assert!(matches!(err, SessionError::InvalidCredentials));
        assert_eq!(
            h.notifier.last().unwrap().message,
            "Invalid email and/or password."
        );
        assert_eq!(h.manager.current_user(), None);
        assert!(!h.manager.is_authenticating());
        assert_eq!(h.profiles.calls(), 0);
    }

    #[tokio::test]
    async fn test_other_provider_failure() {
        let h = Harness::new(
            FakeIdentity::new(Verify::Fail("TOO_MANY_ATTEMPTS_TRY_LATER")),
            FakeProfiles::new(),
        );

        let err = h.manager.sign_in("a@b.com", "pw").await.unwrap_err();

        assert!(matches!(err, SessionError::SignIn(_)));
        assert_eq!(h.notifier.last().unwrap().message, "Unable to sign in.");
        assert!(!h.manager.is_authenticating());
    }

    #[tokio::test]
    async fn test_sign_in_persists_and_restores() {
        let h = Harness::new(
            FakeIdentity::new(Verify::Subject("u1")),
            FakeProfiles::new().with("u1", "Ana", true),
        );

        let user = h.manager.sign_in("ana@gopizza.com", "secret").await.unwrap();

        assert_eq!(user, ana());
        assert_eq!(h.manager.current_user(), Some(ana()));
        assert_eq!(h.manager.state().origin, Some(SessionOrigin::SignedIn));
        assert!(!h.manager.is_authenticating());
        assert_eq!(
            h.db.get(SNAPSHOT_KEY).unwrap(),
            Some(serde_json::to_vec(&ana()).unwrap())
        );

        // Fresh instance over the same storage, as after a restart
        let restarted = h.fresh_manager();
        assert_eq!(restarted.current_user(), None);
        assert_eq!(restarted.restore(), Some(ana()));
        assert_eq!(restarted.current_user(), Some(ana()));
        assert_eq!(restarted.state().origin, Some(SessionOrigin::Restored));
        assert!(!restarted.is_authenticating());
    }

    #[tokio::test]
    async fn test_restore_survives_reopening_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gopizza.db");

        {
            let h = Harness::with_store(
                FakeIdentity::new(Verify::Subject("u1")),
                FakeProfiles::new().with("u1", "Ana", true),
                Database::open(&path).unwrap(),
            );
            h.manager.sign_in("ana@gopizza.com", "secret").await.unwrap();
        }

        let h = Harness::with_store(
            FakeIdentity::new(Verify::Invalid),
            FakeProfiles::new(),
            Database::open(&path).unwrap(),
        );
        assert_eq!(h.manager.restore(), Some(ana()));
    }

    #[tokio::test]
    async fn test_missing_profile_establishes_no_user() {
        let h = Harness::new(FakeIdentity::new(Verify::Subject("u1")), FakeProfiles::new());

        for _ in 0..2 {
            let err = h.manager.sign_in("a@b.com", "pw").await.unwrap_err();
            assert!(matches!(err, SessionError::ProfileNotFound(ref id) if id == "u1"));
            assert_eq!(h.manager.current_user(), None);
            assert_eq!(h.db.get(SNAPSHOT_KEY).unwrap(), None);
            assert!(!h.manager.is_authenticating());
        }
        assert_eq!(h.profiles.calls(), 2);
        // Each attempt ended the provider session it opened
        assert_eq!(h.identity.invalidated(), vec!["u1", "u1"]);
    }

    #[tokio::test]
    async fn test_sign_out_after_missing_profile_retries_provider() {
        let h = Harness::new(
            FakeIdentity::new(Verify::Subject("u1")).failing_invalidate(),
            FakeProfiles::new(),
        );

        h.manager.sign_in("a@b.com", "pw").await.unwrap_err();
        assert_eq!(h.identity.invalidated(), vec!["u1"]);

        h.manager.sign_out().await.unwrap();
        assert_eq!(h.identity.invalidated(), vec!["u1", "u1"]);

        // Handed over once; nothing left to retry
        h.manager.sign_out().await.unwrap();
        assert_eq!(h.identity.invalidated(), vec!["u1", "u1"]);
    }

    #[tokio::test]
    async fn test_failed_sign_in_releases_new_subject_and_keeps_current_user() {
        let h = Harness::new(
            FakeIdentity::new(Verify::Subject("u2")),
            FakeProfiles::new(),
        );
        h.db.set(SNAPSHOT_KEY, &serde_json::to_vec(&ana()).unwrap())
            .unwrap();
        h.manager.restore();

        h.manager.sign_in("b@b.com", "pw").await.unwrap_err();
        assert_eq!(h.manager.current_user(), Some(ana()));
        assert_eq!(h.identity.invalidated(), vec!["u2"]);

        h.manager.sign_out().await.unwrap();
        assert_eq!(h.identity.invalidated(), vec!["u2", "u1"]);
    }

    #[tokio::test]
    async fn test_profile_fetch_failure() {
        let h = Harness::new(
            FakeIdentity::new(Verify::Subject("u1")),
            FakeProfiles::new().failing(),
        );

        let err = h.manager.sign_in("a@b.com", "pw").await.unwrap_err();

        assert!(matches!(err, SessionError::ProfileFetch(_)));
        assert_eq!(
            h.notifier.last().unwrap().message,
            "Unable to fetch the user's profile data."
        );
        assert_eq!(h.manager.current_user(), None);
        assert_eq!(h.db.get(SNAPSHOT_KEY).unwrap(), None);
        assert_eq!(h.identity.invalidated(), vec!["u1"]);
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_establishes_no_user() {
        let h = Harness::with_store(
            FakeIdentity::new(Verify::Subject("u1")),
            FakeProfiles::new().with("u1", "Ana", true),
            FailingStore,
        );

        let err = h.manager.sign_in("a@b.com", "pw").await.unwrap_err();

        assert!(matches!(err, SessionError::Storage(_)));
        assert_eq!(h.manager.current_user(), None);
        assert!(!h.manager.is_authenticating());
        assert_eq!(h.identity.invalidated(), vec!["u1"]);
    }

    #[tokio::test]
    async fn test_sign_out_clears_everything() {
        let h = Harness::new(
            FakeIdentity::new(Verify::Subject("u1")),
            FakeProfiles::new().with("u1", "Ana", true),
        );
        h.manager.sign_in("a@b.com", "pw").await.unwrap();

        h.manager.sign_out().await.unwrap();

        assert_eq!(h.manager.current_user(), None);
        assert_eq!(h.manager.state().origin, None);
        assert_eq!(h.db.get(SNAPSHOT_KEY).unwrap(), None);
        assert_eq!(h.identity.invalidated(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_sign_out_when_signed_out() {
        let h = Harness::new(FakeIdentity::new(Verify::Subject("u1")), FakeProfiles::new());

        h.manager.sign_out().await.unwrap();

        assert_eq!(h.manager.current_user(), None);
        assert!(h.identity.invalidated().is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_is_fail_open() {
        let h = Harness::new(
            FakeIdentity::new(Verify::Subject("u1")).failing_invalidate(),
            FakeProfiles::new().with("u1", "Ana", true),
        );
        h.manager.sign_in("a@b.com", "pw").await.unwrap();

        h.manager.sign_out().await.unwrap();

        assert_eq!(h.manager.current_user(), None);
        assert_eq!(h.db.get(SNAPSHOT_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_out_after_restore() {
        let h = Harness::new(FakeIdentity::new(Verify::Invalid), FakeProfiles::new());
        h.db.set(SNAPSHOT_KEY, &serde_json::to_vec(&ana()).unwrap())
            .unwrap();
        h.manager.restore();

        h.manager.sign_out().await.unwrap();

        assert_eq!(h.manager.current_user(), None);
        assert_eq!(h.db.get(SNAPSHOT_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_without_snapshot() {
        let h = Harness::new(FakeIdentity::new(Verify::Invalid), FakeProfiles::new());
        assert_eq!(h.manager.restore(), None);
        assert_eq!(h.manager.state(), SessionState::default());
    }

    #[tokio::test]
    async fn test_restore_discards_corrupt_snapshot() {
        let h = Harness::new(FakeIdentity::new(Verify::Invalid), FakeProfiles::new());
        h.db.set(SNAPSHOT_KEY, b"{not json").unwrap();

        assert_eq!(h.manager.restore(), None);
        assert_eq!(h.db.get(SNAPSHOT_KEY).unwrap(), None);
        assert!(!h.manager.is_authenticating());
    }

    #[tokio::test]
    async fn test_forgot_password() {
        let h = Harness::new(FakeIdentity::new(Verify::Invalid), FakeProfiles::new());

        h.manager.forgot_password(" ana@gopizza.com ").await.unwrap();

        assert_eq!(h.identity.reset_requests(), vec!["ana@gopizza.com".to_string()]);
        let notice = h.notifier.last().unwrap();
        assert_eq!(notice.kind, NoticeKind::Info);
        assert_eq!(notice.title, "Reset password");
        assert_eq!(h.manager.state(), SessionState::default());
    }

    #[tokio::test]
    async fn test_forgot_password_failure() {
        let h = Harness::new(
            FakeIdentity::new(Verify::Invalid).failing_reset(),
            FakeProfiles::new(),
        );

        let err = h.manager.forgot_password("ana@gopizza.com").await.unwrap_err();

        assert!(matches!(err, SessionError::PasswordReset(_)));
        assert_eq!(h.notifier.last().unwrap().kind, NoticeKind::Error);
    }

    #[tokio::test]
    async fn test_subscribers_see_authentication_progress() {
        let h = Harness::new(
            FakeIdentity::new(Verify::Subject("u1")),
            FakeProfiles::new().with("u1", "Ana", false),
        );
        let mut rx = h.manager.subscribe();
        assert!(!rx.borrow_and_update().is_signed_in());

        h.manager.sign_in("a@b.com", "pw").await.unwrap();

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.user.map(|u| u.name), Some("Ana".to_string()));
        assert!(!state.is_authenticating);
    }

    #[tokio::test]
    async fn test_authenticating_while_verification_is_pending() {
        let gate = Arc::new(Semaphore::new(0));
        let h = Harness::new(
            FakeIdentity::new(Verify::Subject("u1")).gated(gate.clone()),
            FakeProfiles::new().with("u1", "Ana", true),
        );
        let mut rx = h.manager.subscribe();

        let manager = h.manager.clone();
        let attempt = tokio::spawn(async move { manager.sign_in("a@b.com", "pw").await });

        rx.wait_for(|s| s.is_authenticating).await.unwrap();
        assert!(h.manager.is_authenticating());
        assert_eq!(h.manager.current_user(), None);

        gate.add_permits(1);
        let state = rx.wait_for(|s| !s.is_authenticating).await.unwrap().clone();
        assert_eq!(state.user, Some(ana()));

        assert_eq!(attempt.await.unwrap().unwrap(), ana());
    }

    #[tokio::test]
    async fn test_overlapping_sign_ins_stay_authenticating_until_the_last() {
        let gate = Arc::new(Semaphore::new(0));
        let h = Harness::new(
            FakeIdentity::new(Verify::Subject("u1")).gated(gate.clone()),
            FakeProfiles::new().with("u1", "Ana", true),
        );
        let mut rx = h.manager.subscribe();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        for _ in 0..2 {
            let manager = h.manager.clone();
            let done = done_tx.clone();
            tokio::spawn(async move {
                let result = manager.sign_in("a@b.com", "pw").await;
                done.send(result.is_ok()).unwrap();
            });
        }
        rx.wait_for(|s| s.in_flight == 2).await.unwrap();

        gate.add_permits(1);
        assert!(done_rx.recv().await.unwrap());
        assert!(h.manager.is_authenticating());

        gate.add_permits(1);
        assert!(done_rx.recv().await.unwrap());
        assert!(!h.manager.is_authenticating());
        assert_eq!(h.manager.state().in_flight, 0);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let h = Harness::new(
            FakeIdentity::new(Verify::Subject("u1")),
            FakeProfiles::new().with("u1", "Ana", true),
        );
        let other = h.manager.clone();

        h.manager.sign_in("a@b.com", "pw").await.unwrap();
        assert_eq!(other.current_user(), Some(ana()));
    }

    #[tokio::test]
    async fn test_require_admin_reverifies_restored_session() {
        let h = Harness::new(
            FakeIdentity::new(Verify::Invalid),
            FakeProfiles::new().with("u1", "Ana", false),
        );
        // Snapshot claims admin, the profile record no longer does
        h.db.set(SNAPSHOT_KEY, &serde_json::to_vec(&ana()).unwrap())
            .unwrap();
        h.manager.restore();

        let err = h.manager.require_admin().await.unwrap_err();

        assert!(matches!(err, SessionError::NotAuthorized));
        assert_eq!(h.profiles.calls(), 1);
        let user = h.manager.current_user().unwrap();
        assert!(!user.is_admin);
        assert_eq!(h.manager.state().origin, Some(SessionOrigin::SignedIn));
    }

    #[tokio::test]
    async fn test_require_admin_skips_refresh_after_sign_in() {
        let h = Harness::new(
            FakeIdentity::new(Verify::Subject("u1")),
            FakeProfiles::new().with("u1", "Ana", true),
        );
        h.manager.sign_in("a@b.com", "pw").await.unwrap();

        assert_eq!(h.manager.require_admin().await.unwrap(), ana());
        assert_eq!(h.profiles.calls(), 1);
    }

    #[tokio::test]
    async fn test_require_admin_signed_out() {
        let h = Harness::new(FakeIdentity::new(Verify::Invalid), FakeProfiles::new());
        let err = h.manager.require_admin().await.unwrap_err();
        assert!(matches!(err, SessionError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_refresh_ends_session_when_profile_removed() {
        let h = Harness::new(FakeIdentity::new(Verify::Invalid), FakeProfiles::new());
        h.db.set(SNAPSHOT_KEY, &serde_json::to_vec(&ana()).unwrap())
            .unwrap();
        h.manager.restore();

        assert_eq!(h.manager.refresh_profile().await.unwrap(), None);
        assert_eq!(h.manager.current_user(), None);
        assert_eq!(h.db.get(SNAPSHOT_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_session() {
        let h = Harness::new(FakeIdentity::new(Verify::Invalid), FakeProfiles::new().failing());
        h.db.set(SNAPSHOT_KEY, &serde_json::to_vec(&ana()).unwrap())
            .unwrap();
        h.manager.restore();

        let err = h.manager.refresh_profile().await.unwrap_err();

        assert!(matches!(err, SessionError::ProfileFetch(_)));
        assert_eq!(h.manager.current_user(), Some(ana()));
        assert_eq!(h.manager.state().origin, Some(SessionOrigin::Restored));
    }
}
