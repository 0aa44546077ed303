//! GoPizza Documents
//!
//! Per-user profile records and the pizza catalog live in a remote document
//! database. `ProfileStore` and `ProductCatalog` are the seams; `FirestoreClient`
//! implements both over the Firestore REST API.

mod error;
mod firestore;
mod model;
mod store;
mod value;

pub use error::DocumentError;
pub use firestore::{FirestoreClient, DEFAULT_BASE_URL};
pub use model::{Product, Profile};
pub use store::{prefix_upper_bound, ProductCatalog, ProfileStore};

pub type Result<T> = std::result::Result<T, DocumentError>;
