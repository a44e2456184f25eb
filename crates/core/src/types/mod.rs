//! Core types for Partyrent.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod catalog;
pub mod email;
pub mod id;
pub mod order;
pub mod phone;
pub mod price;
pub mod status;

pub use catalog::{CategoryGroup, CategoryItem, CategoryRef, Dimensions, Product};
pub use email::{Email, EmailError};
pub use id::*;
pub use order::{Order, OrderLine, Quantity};
pub use phone::{PhoneError, PhoneNumber};
pub use price::{Price, PriceError};
pub use status::*;
