//! Unified error handling for cart operations.
//!
//! Out-of-range quantities are never errors - they are clamped silently at
//! the document level. A missing or malformed persisted document is also
//! not an error; the store recovers by reinitializing an empty cart. No
//! failed mutation is retried automatically: the displayed state is rolled
//! back and the user must re-trigger the action.

use clayforge_core::LineItemId;
use thiserror::Error;

/// Errors that can occur in the cart subsystem.
#[derive(Debug, Error)]
pub enum CartError {
    /// Reading or writing the guest cart store failed.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Serializing the cart document failed.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The HTTP request to the cart service failed (transport or non-2xx).
    #[error("cart service error: {0}")]
    Http(#[from] reqwest::Error),

    /// The cart service answered `success: false`.
    #[error("cart service rejected the mutation: {0}")]
    Rejected(String),

    /// A request for this line item is already outstanding (or cooling
    /// down). The superseding action is dropped, not queued.
    #[error("update already in flight for line item {0}")]
    UpdateInFlight(LineItemId),

    /// The line item id did not resolve - typically a stale reference to a
    /// line that was removed.
    #[error("unknown line item {0}")]
    UnknownItem(LineItemId),
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;
