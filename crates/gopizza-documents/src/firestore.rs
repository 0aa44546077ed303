//! Firestore REST client

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use gopizza_identity::TokenSource;

use crate::error::DocumentError;
use crate::model::{Product, Profile};
use crate::store::{prefix_upper_bound, ProductCatalog, ProfileStore};
use crate::value::{Document, ErrorEnvelope, RunQueryItem};
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/";

const USERS_COLLECTION: &str = "users";
const PRODUCTS_COLLECTION: &str = "pizzas";
const PRODUCT_SEARCH_FIELD: &str = "name_insensitive";

pub struct FirestoreClient {
    http: reqwest::Client,
    base_url: Url,
    project_id: String,
    tokens: Option<Arc<dyn TokenSource>>,
}

impl FirestoreClient {
    pub fn new(base_url: Url, project_id: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, project_id)
    }

    pub fn with_timeout(
        base_url: Url,
        project_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, base_url, project_id))
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url,
            project_id: project_id.into(),
            tokens: None,
        }
    }

    /// Attach the signed-in account's id token to every request.
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// `{base}/v1/projects/{project}/databases/(default)/{tail...}`
    fn url(&self, tail: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DocumentError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v1", "projects", self.project_id.as_str(), "databases", "(default)"])
            .extend(tail);
        Ok(url)
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let Some(tokens) = self.tokens.as_ref() else {
            return request;
        };
        match tokens.bearer_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn status_error(response: reqwest::Response) -> DocumentError {
        let status = response.status().as_u16();
        let message = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope.error.message,
            Err(_) => String::from("unreadable error body"),
        };
        DocumentError::Status { status, message }
    }
}

impl Clone for FirestoreClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            project_id: self.project_id.clone(),
            tokens: self.tokens.clone(),
        }
    }
}

fn product_from(document: &Document) -> Product {
    Product {
        id: document.id().to_string(),
        name: document.string("name").unwrap_or_default(),
        description: document.string("description").unwrap_or_default(),
        photo_url: document.string("photo_url").unwrap_or_default(),
    }
}

#[async_trait]
impl ProfileStore for FirestoreClient {
    async fn get_profile(&self, subject_id: &str) -> Result<Option<Profile>> {
        if subject_id.is_empty() || subject_id.contains('/') {
            return Err(DocumentError::Malformed(format!(
                "invalid subject id {subject_id:?}"
            )));
        }

        let url = self.url(&["documents", USERS_COLLECTION, subject_id])?;
        let response = self.authorize(self.http.get(url)).await.send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(subject_id = %subject_id, "No profile record");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let document: Document = response.json().await?;
        Ok(Some(Profile {
            name: document.string("name").unwrap_or_default(),
            is_admin: document.boolean("isAdmin").unwrap_or(false),
        }))
    }
}

#[async_trait]
impl ProductCatalog for FirestoreClient {
    async fn search_products(&self, prefix: &str) -> Result<Vec<Product>> {
        let url = self.url(&["documents:runQuery"])?;
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": PRODUCTS_COLLECTION }],
                "orderBy": [{
                    "field": { "fieldPath": PRODUCT_SEARCH_FIELD },
                    "direction": "ASCENDING"
                }],
                "startAt": { "values": [{ "stringValue": prefix }], "before": true },
                "endAt": {
                    "values": [{ "stringValue": prefix_upper_bound(prefix) }],
                    "before": false
                }
            }
        });

        let response = self.authorize(self.http.post(url).json(&body))
            .await
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let items: Vec<RunQueryItem> = response.json().await?;
        let products: Vec<Product> = items
            .iter()
            .filter_map(|item| item.document.as_ref())
            .map(product_from)
            .collect();

        tracing::debug!(prefix = %prefix, count = products.len(), "Searched products");

        Ok(products)
    }
}
