//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Phone/password accounts and SMS password reset
//! - `cart` - Active cart sessions and the order lifecycle
//! - `catalog` - Cached catalog reads and validated admin writes
//! - `images` - Upload processing and image storage
//! - `sms` - Outbound SMS port

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod images;
pub mod sms;
