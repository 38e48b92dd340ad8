//! Clayforge Cart - guest and authenticated cart subsystem.
//!
//! One cart model with two backing stores behind a single interface:
//!
//! - Guest sessions persist a [`CartDocument`] through [`GuestCartStore`],
//!   a durable per-profile key-value store (the browser-storage analogue).
//! - Authenticated sessions mirror the remote cart service, reached only
//!   through its fixed HTTP contract (`POST /cart/update/{item_id}` etc.).
//!
//! The session mode is read once per page load and selects a
//! [`CartBackend`] implementation; it is never switched mid-session.
//! User actions flow through the [`OptimisticCoordinator`], which applies
//! client-computed results to the displayed state immediately, dispatches
//! the authoritative mutation, and reconciles or rolls back when it
//! settles. Totals are always recomputed fresh from line items with
//! decimal arithmetic - never maintained as running deltas.
//!
//! # Example
//!
//! ```rust,ignore
//! use clayforge_cart::{CartConfig, OptimisticCoordinator, SessionBackend, SessionMode};
//!
//! let config = CartConfig::from_env()?;
//! let backend = SessionBackend::select(SessionMode::Guest, &config, Vec::new())?;
//! let cart = OptimisticCoordinator::start(backend, config.update_cooldown).await?;
//!
//! let view = cart.render();
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod render;
pub mod store;
pub mod summary;

pub use backend::{
    AddOutcome, CartBackend, LocalCartBackend, MutationOutcome, RemoteCartBackend, SessionBackend,
    SessionMode,
};
pub use config::{CartConfig, ConfigError};
pub use coordinator::{ActionPhase, OptimisticCoordinator, QuantityAction};
pub use document::{CartDocument, CartLineItem, NewLineItem};
pub use error::{CartError, Result};
pub use render::{CartRowView, CartTableView, render};
pub use store::GuestCartStore;
pub use summary::{CartSummary, compute_summary};
