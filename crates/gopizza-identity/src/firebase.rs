//! Firebase Auth REST client
//!
//! Email/password accounts through the Identity Toolkit `accounts:*` methods.
//! The id token is short-lived; the refresh token is persisted so a session
//! restored after a restart can mint a new one from the Secure Token service.
//! Sign-out is client-side: both tokens are dropped.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use gopizza_storage::KeyValueStore;

use crate::error::AuthError;
use crate::provider::{IdentityProvider, TokenSource};
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "https://identitytoolkit.googleapis.com/";
pub const DEFAULT_TOKEN_BASE_URL: &str = "https://securetoken.googleapis.com/";

/// Local storage slot of the refresh credentials.
pub const CREDENTIALS_KEY: &str = "@gopizza:auth";

/// Provider codes meaning "unknown account or wrong password".
const INVALID_CREDENTIAL_CODES: &[&str] = &[
    "EMAIL_NOT_FOUND",
    "INVALID_PASSWORD",
    "INVALID_LOGIN_CREDENTIALS",
];

/// Secure Token codes after which the refresh token is useless.
const REFRESH_REJECTED_CODES: &[&str] = &[
    "TOKEN_EXPIRED",
    "USER_DISABLED",
    "USER_NOT_FOUND",
    "INVALID_REFRESH_TOKEN",
];

/// Renew id tokens this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Persisted as `{"localId", "refreshToken"}`; the id token stays in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credentials {
    local_id: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(skip)]
    id_token: String,
    #[serde(skip)]
    expires_at: Option<Instant>,
}

impl Credentials {
    fn is_fresh(&self) -> bool {
        !self.id_token.is_empty()
            && self
                .expires_at
                .map_or(true, |at| Instant::now() + EXPIRY_MARGIN < at)
    }
}

pub struct FirebaseAuth {
    http: reqwest::Client,
    base_url: Url,
    /// Secure Token endpoint; `DEFAULT_TOKEN_BASE_URL` when unset
    token_base_url: Option<Url>,
    api_key: String,
    /// Credentials of the account signed in through this client
    credentials: Arc<RwLock<Option<Credentials>>>,
    /// Where the refresh credentials survive a restart
    store: Option<Arc<dyn KeyValueStore>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    id_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

/// The Secure Token service answers in snake_case.
#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobCodeRequest<'a> {
    request_type: &'a str,
    email: &'a str,
}

#[derive(Deserialize)]
struct OobCodeResponse {}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl FirebaseAuth {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_key)
    }

    pub fn with_timeout(
        base_url: Url,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, base_url, api_key))
    }

    pub fn with_client(http: reqwest::Client, base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: with_trailing_slash(base_url),
            token_base_url: None,
            api_key: api_key.into(),
            credentials: Arc::new(RwLock::new(None)),
            store: None,
        }
    }

    /// Point token renewal at another Secure Token endpoint (emulator).
    pub fn with_token_base_url(mut self, token_base_url: Url) -> Self {
        self.token_base_url = Some(with_trailing_slash(token_base_url));
        self
    }

    /// Persist refresh credentials in `store`, and pick up any saved ones.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Subject id of the account currently holding a token, if any.
    pub fn signed_in_subject(&self) -> Option<String> {
        self.current().map(|c| c.local_id)
    }

    fn endpoint(&self, method: &str) -> Result<Url> {
        let mut url = self.base_url.join(&format!("v1/accounts:{method}"))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    fn token_endpoint(&self) -> Result<Url> {
        let base = match &self.token_base_url {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_TOKEN_BASE_URL)?,
        };
        let mut url = base.join("v1/token")?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    async fn post<B, R>(&self, method: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(method)?;
        Self::send(self.http.post(url).json(body)).await
    }

    async fn send<R: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<R> {
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<R>().await?);
        }

        let code = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => error_code(&envelope.error.message),
            Err(_) => format!("HTTP_{}", status.as_u16()),
        };

        Err(classify(code))
    }

    /// In-memory credentials, falling back to the persisted ones.
    fn current(&self) -> Option<Credentials> {
        if let Some(credentials) = self.credentials.read().clone() {
            return Some(credentials);
        }

        let loaded = self.load()?;
        let mut credentials = self.credentials.write();
        // A sign-in may have won the race for the slot
        Some(credentials.get_or_insert(loaded).clone())
    }

    fn load(&self) -> Option<Credentials> {
        let store = self.store.as_ref()?;
        match store.get(CREDENTIALS_KEY) {
            Ok(Some(bytes)) => match serde_json::from_slice::<Credentials>(&bytes) {
                Ok(credentials) => Some(credentials),
                Err(err) => {
                    tracing::warn!(error = %err, "Discarding unreadable auth credentials");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::error!(error = %err, "Failed to read auth credentials");
                None
            }
        }
    }

    fn save(&self, credentials: &Credentials) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        let result = serde_json::to_vec(credentials)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                store
                    .set(CREDENTIALS_KEY, &bytes)
                    .map_err(|e| e.to_string())
            });

        // The session still works for this run without it
        if let Err(err) = result {
            tracing::warn!(subject_id = %credentials.local_id, error = %err, "Failed to persist auth credentials");
        }
    }

    fn forget(&self) {
        *self.credentials.write() = None;

        if let Some(store) = self.store.as_ref() {
            if let Err(err) = store.remove(CREDENTIALS_KEY) {
                tracing::error!(error = %err, "Failed to remove auth credentials");
            }
        }
    }

    /// Exchange the refresh token for a new id token.
    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials> {
        let url = self.token_endpoint()?;
        let response: RefreshResponse = Self::send(self.http.post(url).form(&RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: &credentials.refresh_token,
        }))
        .await?;

        Ok(Credentials {
            local_id: credentials.local_id.clone(),
            refresh_token: response.refresh_token,
            id_token: response.id_token,
            expires_at: expiry(response.expires_in.as_deref()),
        })
    }
}

impl Clone for FirebaseAuth {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token_base_url: self.token_base_url.clone(),
            api_key: self.api_key.clone(),
            credentials: Arc::clone(&self.credentials),
            store: self.store.clone(),
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// `expires_in` arrives as a string of seconds.
fn expiry(expires_in: Option<&str>) -> Option<Instant> {
    let secs = expires_in?.parse::<u64>().ok()?;
    Some(Instant::now() + Duration::from_secs(secs))
}

/// `"TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled"` -> `"TOO_MANY_ATTEMPTS_TRY_LATER"`
fn error_code(message: &str) -> String {
    message
        .split(" : ")
        .next()
        .unwrap_or(message)
        .trim()
        .to_string()
}

fn classify(code: String) -> AuthError {
    if INVALID_CREDENTIAL_CODES.contains(&code.as_str()) {
        AuthError::InvalidCredentials
    } else {
        AuthError::Provider { code }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn verify(&self, email: &str, password: &str) -> Result<String> {
        let response: SignInResponse = self
            .post(
                "signInWithPassword",
                &SignInRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;

        let credentials = Credentials {
            local_id: response.local_id.clone(),
            refresh_token: response.refresh_token,
            id_token: response.id_token,
            expires_at: expiry(response.expires_in.as_deref()),
        };
        self.save(&credentials);
        *self.credentials.write() = Some(credentials);

        tracing::debug!(subject_id = %response.local_id, "Verified credentials");

        Ok(response.local_id)
    }

    async fn invalidate(&self, subject_id: &str) -> Result<()> {
        match self.current() {
            Some(current) if current.local_id != subject_id => {
                tracing::debug!(
                    subject_id = %subject_id,
                    signed_in = %current.local_id,
                    "Invalidate for a subject without a token"
                );
            }
            _ => self.forget(),
        }
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<()> {
        let _: OobCodeResponse = self
            .post(
                "sendOobCode",
                &OobCodeRequest {
                    request_type: "PASSWORD_RESET",
                    email,
                },
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TokenSource for FirebaseAuth {
    async fn bearer_token(&self) -> Option<String> {
        let credentials = self.current()?;
        if credentials.is_fresh() {
            return Some(credentials.id_token);
        }
        if credentials.refresh_token.is_empty() {
            return None;
        }

        match self.refresh(&credentials).await {
            Ok(refreshed) => {
                let mut slot = self.credentials.write();
                // Signed out (or in as someone else) while renewing
                if slot.as_ref().map(|c| c.local_id.as_str()) != Some(refreshed.local_id.as_str()) {
                    return None;
                }
                let token = refreshed.id_token.clone();
                *slot = Some(refreshed.clone());
                drop(slot);

                self.save(&refreshed);
                tracing::debug!(subject_id = %refreshed.local_id, "Renewed id token");
                Some(token)
            }
            Err(err) if REFRESH_REJECTED_CODES.contains(&err.code()) => {
                tracing::warn!(
                    subject_id = %credentials.local_id,
                    code = %err.code(),
                    "Refresh token rejected, dropping credentials"
                );
                self.forget();
                None
            }
            Err(err) => {
                tracing::warn!(
                    subject_id = %credentials.local_id,
                    code = %err.code(),
                    error = %err,
                    "Token renewal failed"
                );
                None
            }
        }
    }
}
