//! GoPizza Session Management
//!
//! - A signed-in `User` is a projection of the identity provider's subject
//!   and the profile record in the document store
//! - The user snapshot is persisted locally and restored at startup
//! - Every failure reaches the user as a `Notice`; none are fatal

mod error;
mod manager;
mod notice;
mod user;

#[cfg(test)]
mod testing;

pub use error::SessionError;
pub use manager::{SessionManager, SNAPSHOT_KEY};
pub use notice::{LogNotifier, Notice, NoticeKind, Notifier};
pub use user::{SessionOrigin, SessionState, User};

pub type Result<T> = std::result::Result<T, SessionError>;
