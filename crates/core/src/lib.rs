//! Clayforge Core - Shared types library.
//!
//! This crate provides common types used across all Clayforge components:
//! - `cart` - Guest and authenticated cart subsystem
//! - `integration-tests` - Cross-crate test suite
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no storage access, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs and money formatting

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
