//! Session data structures

use serde::{Deserialize, Serialize};

use gopizza_documents::Profile;

/// The signed-in user as seen by this device.
///
/// Serialized as `{"id", "name", "isAdmin"}`, which is also the persisted
/// snapshot format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identity provider subject id
    pub id: String,
    pub name: String,
    pub is_admin: bool,
}

impl User {
    pub fn from_profile(id: String, profile: Profile) -> Self {
        Self {
            id,
            name: profile.name,
            is_admin: profile.is_admin,
        }
    }
}

/// Where the current user came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOrigin {
    /// Verified against the provider and document store in this process
    SignedIn,
    /// Read back from the local snapshot, not re-verified yet
    Restored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub user: Option<User>,
    pub is_authenticating: bool,
    pub origin: Option<SessionOrigin>,
    /// Operations currently holding `is_authenticating`
    #[serde(skip)]
    pub(crate) in_flight: usize,
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }
}
