//! Partyrent Core - Shared types library.
//!
//! This crate provides the domain types used across all Partyrent components:
//! - `storefront` - Public rental storefront API with the role-gated admin surface
//! - `cli` - Command-line tools for migrations, admin accounts and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, phone numbers, prices, statuses,
//!   plus the catalog and order records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
