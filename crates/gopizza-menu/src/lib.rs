//! GoPizza Menu
//!
//! Data behind the home screen:
//! - Prefix search over the pizza catalog, case-insensitive
//! - Item count label
//! - Where tapping a pizza leads: admins edit it, customers order it

mod error;
mod menu;
mod route;

pub use error::MenuError;
pub use menu::{count_label, greeting, normalize_query, Menu};
pub use route::{can_add_product, new_product_route, route_for, Route};

pub type Result<T> = std::result::Result<T, MenuError>;
