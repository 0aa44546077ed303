use async_trait::async_trait;

use crate::Result;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify an email/password pair, returning the account's subject id.
    async fn verify(&self, email: &str, password: &str) -> Result<String>;

    /// End the provider-side session of `subject_id`.
    async fn invalidate(&self, subject_id: &str) -> Result<()>;

    async fn request_password_reset(&self, email: &str) -> Result<()>;
}

/// Supplies the bearer token of the signed-in account, if any.
///
/// May renew an expired token first, hence async.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Option<String>;
}
