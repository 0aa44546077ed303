//! Session error types

use thiserror::Error;

use gopizza_documents::DocumentError;
use gopizza_identity::AuthError;
use gopizza_storage::StorageError;

use crate::notice::Notice;

const LOGIN: &str = "Login";
const RESET_PASSWORD: &str = "Reset password";
const SESSION: &str = "Session";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Email and password are required")]
    MissingCredentials,

    #[error("Email is required")]
    MissingEmail,

    #[error("Invalid email and/or password")]
    InvalidCredentials,

    #[error("Sign-in failed: {0}")]
    SignIn(#[source] AuthError),

    #[error("Profile fetch failed: {0}")]
    ProfileFetch(#[from] DocumentError),

    #[error("No profile record for subject {0}")]
    ProfileNotFound(String),

    #[error("Password reset failed: {0}")]
    PasswordReset(#[source] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Administrator access required")]
    NotAuthorized,
}

impl SessionError {
    /// Validation failures never reach a remote service.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SessionError::MissingCredentials | SessionError::MissingEmail
        )
    }

    /// The message shown to the user for this failure.
    ///
    /// Wording stays generic: provider codes and record ids only go to logs.
    pub fn notice(&self) -> Notice {
        match self {
            SessionError::MissingCredentials => {
                Notice::error(LOGIN, "Enter your email and password.")
            }
            SessionError::MissingEmail => Notice::error(RESET_PASSWORD, "Enter your email."),
            SessionError::InvalidCredentials => {
                Notice::error(LOGIN, "Invalid email and/or password.")
            }
            SessionError::SignIn(_) => Notice::error(LOGIN, "Unable to sign in."),
            SessionError::ProfileFetch(_) => {
                Notice::error(LOGIN, "Unable to fetch the user's profile data.")
            }
            SessionError::ProfileNotFound(_) => {
                Notice::error(LOGIN, "No profile was found for this account.")
            }
            SessionError::PasswordReset(_) => Notice::error(
                RESET_PASSWORD,
                "Unable to send the email to reset your password.",
            ),
            SessionError::Storage(_) | SessionError::Snapshot(_) => Notice::error(
                SESSION,
                "Unable to update the session saved on this device.",
            ),
            SessionError::NotAuthenticated => Notice::error(SESSION, "Sign in to continue."),
            SessionError::NotAuthorized => {
                Notice::error(SESSION, "This action is restricted to administrators.")
            }
        }
    }
}
