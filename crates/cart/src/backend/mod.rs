//! Cart backends: one contract, two implementations.
//!
//! The original storefront duplicated every cart operation across a guest
//! path (persisted document) and an authenticated path (remote service).
//! Here both sit behind [`CartBackend`], selected once per session from
//! the authentication flag the page is rendered with. The subsystem does
//! not poll for mid-session authentication changes.

mod local;
mod remote;

pub use local::LocalCartBackend;
pub use remote::RemoteCartBackend;

use clayforge_core::LineItemId;
use rust_decimal::Decimal;

use crate::config::CartConfig;
use crate::document::{CartLineItem, NewLineItem};
use crate::error::Result;
use crate::summary::CartSummary;

/// Whether this session is authenticated. Read once per page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Guest,
    Authenticated,
}

impl SessionMode {
    /// Map the page's authentication flag to a session mode.
    #[must_use]
    pub const fn from_authenticated(is_authenticated: bool) -> Self {
        if is_authenticated {
            Self::Authenticated
        } else {
            Self::Guest
        }
    }
}

/// Result of an add: the line holding the variant and the new badge count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub id: LineItemId,
    pub cart_count: u32,
}

/// Authoritative numbers after an update or removal.
///
/// On the remote path these are server-calculated and may differ from the
/// client's optimistic arithmetic (discounts, price changes); the displayed
/// state must be reconciled to them.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    /// New line total; `None` after a removal.
    pub item_total: Option<Decimal>,
    pub summary: CartSummary,
    pub cart_count: u32,
}

/// The `get`/`add`/`update`/`remove`/`summary` contract both session modes
/// satisfy.
///
/// Update and removal are keyed by the line's durable id, never by its
/// position in the cart.
#[allow(async_fn_in_trait)] // backends are held concretely, no Send bound needed
pub trait CartBackend {
    /// Current line items, in insertion order.
    async fn lines(&self) -> Result<Vec<CartLineItem>>;

    /// Add a variant, merging with an existing line where possible.
    async fn add_item(&self, item: NewLineItem) -> Result<AddOutcome>;

    /// Set a line's quantity (clamping happens client-side before the
    /// call; the backend stores or transmits the requested value).
    async fn update_quantity(&self, id: &LineItemId, quantity: u32) -> Result<MutationOutcome>;

    /// Remove a line.
    async fn remove_item(&self, id: &LineItemId) -> Result<MutationOutcome>;

    /// Fresh summary for the current lines.
    async fn summary(&self) -> Result<CartSummary>;
}

/// A backend chosen once per session.
#[derive(Debug, Clone)]
pub enum SessionBackend {
    Guest(LocalCartBackend),
    Authenticated(RemoteCartBackend),
}

impl SessionBackend {
    /// Select the backend for this session.
    ///
    /// Guest sessions open the persisted store under
    /// `config.storage_dir`; authenticated sessions talk to the remote
    /// cart service, seeded with the lines the server rendered into the
    /// page (`initial_lines` is ignored for guests).
    ///
    /// # Errors
    ///
    /// Returns an error if the guest store directory cannot be created or
    /// the HTTP client cannot be built.
    pub fn select(
        mode: SessionMode,
        config: &CartConfig,
        initial_lines: Vec<CartLineItem>,
    ) -> Result<Self> {
        match mode {
            SessionMode::Guest => Ok(Self::Guest(LocalCartBackend::open(&config.storage_dir)?)),
            SessionMode::Authenticated => Ok(Self::Authenticated(RemoteCartBackend::new(
                config,
                initial_lines,
            )?)),
        }
    }
}

impl CartBackend for SessionBackend {
    async fn lines(&self) -> Result<Vec<CartLineItem>> {
        match self {
            Self::Guest(backend) => backend.lines().await,
            Self::Authenticated(backend) => backend.lines().await,
        }
    }

    async fn add_item(&self, item: NewLineItem) -> Result<AddOutcome> {
        match self {
            Self::Guest(backend) => backend.add_item(item).await,
            Self::Authenticated(backend) => backend.add_item(item).await,
        }
    }

    async fn update_quantity(&self, id: &LineItemId, quantity: u32) -> Result<MutationOutcome> {
        match self {
            Self::Guest(backend) => backend.update_quantity(id, quantity).await,
            Self::Authenticated(backend) => backend.update_quantity(id, quantity).await,
        }
    }

    async fn remove_item(&self, id: &LineItemId) -> Result<MutationOutcome> {
        match self {
            Self::Guest(backend) => backend.remove_item(id).await,
            Self::Authenticated(backend) => backend.remove_item(id).await,
        }
    }

    async fn summary(&self) -> Result<CartSummary> {
        match self {
            Self::Guest(backend) => backend.summary().await,
            Self::Authenticated(backend) => backend.summary().await,
        }
    }
}
