use async_trait::async_trait;

use crate::model::{Product, Profile};
use crate::Result;

/// Highest code point of the BMP private use area. Appended to a prefix it
/// sorts after every string that starts with that prefix.
const PREFIX_SENTINEL: char = '\u{f8ff}';

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` when no profile record exists for the subject.
    async fn get_profile(&self, subject_id: &str) -> Result<Option<Profile>>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Products whose search key starts with `prefix`, ordered by that key.
    /// An empty prefix lists everything.
    async fn search_products(&self, prefix: &str) -> Result<Vec<Product>>;
}

/// Inclusive upper bound of a prefix range scan.
pub fn prefix_upper_bound(prefix: &str) -> String {
    let mut end = String::with_capacity(prefix.len() + PREFIX_SENTINEL.len_utf8());
    end.push_str(prefix);
    end.push(PREFIX_SENTINEL);
    end
}
