//! Menu listing

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gopizza_documents::{Product, ProductCatalog};
use gopizza_session::{Notice, Notifier, User};

use crate::error::MenuError;
use crate::Result;

pub struct Menu {
    catalog: Arc<dyn ProductCatalog>,
    notifier: Arc<dyn Notifier>,
    /// Search box text, as typed
    search: Arc<RwLock<String>>,
    /// Result of the last successful query
    products: Arc<RwLock<Vec<Product>>>,
    /// Bumped by every fetch; only the latest may replace the listing
    generation: Arc<AtomicU64>,
}

impl Menu {
    pub fn new(catalog: Arc<dyn ProductCatalog>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            catalog,
            notifier,
            search: Arc::new(RwLock::new(String::new())),
            products: Arc::new(RwLock::new(Vec::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_search(&self, text: impl Into<String>) {
        *self.search.write() = text.into();
    }

    pub fn search_text(&self) -> String {
        self.search.read().clone()
    }

    /// Query with the current search text.
    pub async fn search(&self) -> Result<Vec<Product>> {
        let text = self.search_text();
        self.fetch(&text).await
    }

    /// Empty the search box and list everything.
    pub async fn clear_search(&self) -> Result<Vec<Product>> {
        self.search.write().clear();
        self.fetch("").await
    }

    /// Full listing, ignoring the search box. Run when the screen gains focus.
    pub async fn refresh(&self) -> Result<Vec<Product>> {
        self.fetch("").await
    }

    /// Products whose name starts with `value`, ignoring case.
    ///
    /// On failure the previous listing is kept and a notice is shown. When
    /// a newer fetch started meanwhile, the result is returned but neither
    /// stored nor reported.
    pub async fn fetch(&self, value: &str) -> Result<Vec<Product>> {
        let query = normalize_query(value);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        match self.catalog.search_products(&query).await {
            Ok(products) => {
                let mut listing = self.products.write();
                if self.generation.load(Ordering::SeqCst) == generation {
                    *listing = products.clone();
                    tracing::debug!(query = %query, count = products.len(), "Menu updated");
                } else {
                    tracing::debug!(query = %query, "Dropped stale menu result");
                }
                Ok(products)
            }
            Err(err) => {
                tracing::warn!(query = %query, error = %err, "Menu query failed");
                if self.generation.load(Ordering::SeqCst) == generation {
                    self.notifier
                        .notify(&Notice::error("Query", "Unable to run the query."));
                }
                Err(MenuError::Query(err))
            }
        }
    }

    pub fn products(&self) -> Vec<Product> {
        self.products.read().clone()
    }

    pub fn count_label(&self) -> String {
        count_label(self.products.read().len())
    }
}

impl Clone for Menu {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            notifier: Arc::clone(&self.notifier),
            search: Arc::clone(&self.search),
            products: Arc::clone(&self.products),
            generation: Arc::clone(&self.generation),
        }
    }
}

/// Search keys are stored lower-cased, so queries are too.
pub fn normalize_query(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn count_label(count: usize) -> String {
    if count == 1 {
        "1 pizza".to_string()
    } else {
        format!("{count} pizzas")
    }
}

pub fn greeting(user: Option<&User>) -> String {
    match user {
        Some(user) => format!("Hello, {}", user.name),
        None => "Hello".to_string(),
    }
}
