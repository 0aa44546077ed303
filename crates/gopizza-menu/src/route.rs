//! Screen a product opens on

use serde::{Deserialize, Serialize};

use gopizza_session::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "screen", rename_all = "lowercase")]
pub enum Route {
    /// Product editor. `None` registers a new pizza.
    Product { id: Option<String> },
    /// Order form for an existing pizza
    Order { id: String },
}

pub fn route_for(user: Option<&User>, product_id: &str) -> Route {
    if can_add_product(user) {
        Route::Product {
            id: Some(product_id.to_string()),
        }
    } else {
        Route::Order {
            id: product_id.to_string(),
        }
    }
}

pub fn can_add_product(user: Option<&User>) -> bool {
    user.is_some_and(|u| u.is_admin)
}

pub fn new_product_route(user: Option<&User>) -> Option<Route> {
    can_add_product(user).then_some(Route::Product { id: None })
}
