//! Authenticated session backend over the remote cart service.
//!
//! # Wire contract
//!
//! - `POST {base}/cart/update/{item_id}/` with body `{"quantity": n}` and
//!   the anti-forgery token in `X-CSRFToken`. Success bodies carry the
//!   server-calculated numbers (`item_total`, `subtotal`, `shipping_cost`,
//!   `tax_amount`, `total`, `free_shipping_eligible`,
//!   `amount_needed_for_free_shipping`, `cart_count`); failures are
//!   `{"success": false, "error": "..."}` or a non-2xx status.
//! - `POST {base}/cart/add/{product_id}/` returns `{success, message,
//!   cart_count}`.
//! - `POST {base}/cart/remove/{item_id}/` returns no JSON; any 2xx is
//!   success.
//!
//! The service exposes no read endpoint - the authenticated cart page is
//! rendered server-side - so this backend keeps a client-side mirror of
//! the lines it was seeded with and serves `lines`/`summary` from it,
//! updating the mirror on each confirmed mutation.
//!
//! Every request carries a timeout. The upstream service has none, and a
//! hung request would otherwise hold the caller's per-item in-flight guard
//! indefinitely.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use clayforge_core::LineItemId;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use super::{AddOutcome, CartBackend, MutationOutcome};
use crate::config::CartConfig;
use crate::document::{CartDocument, CartLineItem, NewLineItem};
use crate::error::{CartError, Result};
use crate::summary::CartSummary;

const CSRF_HEADER: &str = "X-CSRFToken";

/// [`CartBackend`] for authenticated sessions.
#[derive(Debug, Clone)]
pub struct RemoteCartBackend {
    inner: Arc<RemoteInner>,
}

#[derive(Debug)]
struct RemoteInner {
    client: reqwest::Client,
    base_url: Url,
    csrf_token: SecretString,
    mirror: Mutex<CartDocument>,
}

#[derive(Debug, Serialize)]
struct UpdateRequest {
    quantity: u32,
}

#[derive(Debug, Serialize)]
struct AddRequest {
    quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_id: Option<i32>,
}

/// Rich success body for `cart/update`.
#[derive(Debug, Deserialize)]
struct UpdateSuccess {
    success: bool,
    item_total: Decimal,
    subtotal: Decimal,
    shipping_cost: Decimal,
    tax_amount: Decimal,
    total: Decimal,
    free_shipping_eligible: bool,
    amount_needed_for_free_shipping: Decimal,
    cart_count: u32,
}

#[derive(Debug, Deserialize)]
struct ServiceFailure {
    #[allow(dead_code)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// `cart/update` responses: the rich shape parses first, anything else
/// falls through to the failure shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UpdateResponse {
    Success(UpdateSuccess),
    Failure(ServiceFailure),
}

#[derive(Debug, Deserialize)]
struct AddSuccess {
    success: bool,
    #[serde(default)]
    #[allow(dead_code)]
    message: Option<String>,
    cart_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AddResponse {
    Success(AddSuccess),
    Failure(ServiceFailure),
}

impl RemoteCartBackend {
    /// Create a backend seeded with the lines the server rendered into the
    /// page.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &CartConfig, initial_lines: Vec<CartLineItem>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(RemoteInner {
                client,
                base_url: config.service_url.clone(),
                csrf_token: config.csrf_token.clone(),
                mirror: Mutex::new(CartDocument {
                    items: initial_lines,
                    last_updated: Utc::now(),
                }),
            }),
        })
    }

    fn endpoint(&self, suffix: &str) -> String {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        format!("{base}/{suffix}")
    }

    fn mirror(&self) -> MutexGuard<'_, CartDocument> {
        self.inner
            .mirror
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn post_json<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        body: &B,
    ) -> Result<R> {
        let response = self
            .inner
            .client
            .post(&url)
            .header(CSRF_HEADER, self.inner.csrf_token.expose_secret())
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

impl CartBackend for RemoteCartBackend {
    async fn lines(&self) -> Result<Vec<CartLineItem>> {
        Ok(self.mirror().items.clone())
    }

    #[instrument(skip(self, item), fields(product_id = %item.product_id))]
    async fn add_item(&self, item: NewLineItem) -> Result<AddOutcome> {
        let url = self.endpoint(&format!("cart/add/{}/", item.product_id));
        let request = AddRequest {
            quantity: item.quantity,
            size_id: item.size_id.map(i32::from),
        };

        match self.post_json(url, &request).await? {
            AddResponse::Success(ok) if ok.success => {
                // The add response does not echo the service's line id; the
                // mirror line keeps a synthetic id until the page is
                // re-rendered from server state.
                let id = self.mirror().add_item(item);
                Ok(AddOutcome {
                    id,
                    cart_count: ok.cart_count,
                })
            }
            AddResponse::Success(_) => Err(CartError::Rejected(service_error(None))),
            AddResponse::Failure(failure) => {
                Err(CartError::Rejected(service_error(failure.error)))
            }
        }
    }

    #[instrument(skip(self))]
    async fn update_quantity(&self, id: &LineItemId, quantity: u32) -> Result<MutationOutcome> {
        if self.mirror().item(id).is_none() {
            return Err(CartError::UnknownItem(id.clone()));
        }

        let url = self.endpoint(&format!("cart/update/{id}/"));
        let response: UpdateResponse = self.post_json(url, &UpdateRequest { quantity }).await?;

        match response {
            UpdateResponse::Success(ok) if ok.success => {
                self.mirror().set_quantity(id, quantity);
                Ok(MutationOutcome {
                    item_total: Some(ok.item_total),
                    summary: CartSummary {
                        subtotal: ok.subtotal,
                        shipping: ok.shipping_cost,
                        tax: ok.tax_amount,
                        total: ok.total,
                        free_shipping_eligible: ok.free_shipping_eligible,
                        amount_needed_for_free_shipping: ok.amount_needed_for_free_shipping,
                    },
                    cart_count: ok.cart_count,
                })
            }
            UpdateResponse::Success(_) => Err(CartError::Rejected(service_error(None))),
            UpdateResponse::Failure(failure) => Err(CartError::Rejected(service_error(
                failure.error,
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn remove_item(&self, id: &LineItemId) -> Result<MutationOutcome> {
        if self.mirror().item(id).is_none() {
            return Err(CartError::UnknownItem(id.clone()));
        }

        let url = self.endpoint(&format!("cart/remove/{id}/"));
        self.inner
            .client
            .post(&url)
            .header(CSRF_HEADER, self.inner.csrf_token.expose_secret())
            .send()
            .await?
            .error_for_status()?;

        let mut mirror = self.mirror();
        mirror.remove_item(id);
        Ok(MutationOutcome {
            item_total: None,
            summary: mirror.summary(),
            cart_count: mirror.item_count(),
        })
    }

    async fn summary(&self) -> Result<CartSummary> {
        Ok(self.mirror().summary())
    }
}

fn service_error(message: Option<String>) -> String {
    message.unwrap_or_else(|| "cart service reported a failure".to_string())
}
