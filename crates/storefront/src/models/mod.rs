//! Domain models for storefront.
//!
//! Catalog and order records live in `partyrent-core`; these are the
//! account types that only the server needs.

pub mod session;
pub mod user;

pub use session::{CurrentUser, keys as session_keys};
pub use user::User;
