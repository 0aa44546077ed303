//! GoPizza Identity
//!
//! Credential verification, sign-out and password reset are delegated to an
//! external identity provider. `IdentityProvider` is the seam; `FirebaseAuth`
//! talks to the Firebase Auth REST API and keeps its refresh token in local
//! storage.

mod error;
mod firebase;
mod provider;

pub use error::AuthError;
pub use firebase::{FirebaseAuth, CREDENTIALS_KEY, DEFAULT_BASE_URL, DEFAULT_TOKEN_BASE_URL};
pub use provider::{IdentityProvider, TokenSource};

pub type Result<T> = std::result::Result<T, AuthError>;
