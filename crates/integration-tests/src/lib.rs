//! Shared harness for Clayforge integration tests.
//!
//! Provides [`MockCartService`], an in-process stand-in for the remote
//! cart service that speaks its exact HTTP contract: scripted responses
//! for `POST /store/cart/update/{item_id}/`, `add`, and `remove`, plus
//! request counters so tests can assert how many requests actually went
//! over the wire (the in-flight guard tests hinge on that).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::post;
use clayforge_cart::CartConfig;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

/// CSRF token the harness configures and the mock asserts against.
pub const TEST_CSRF_TOKEN: &str = "integration-csrf-token";

/// How the mock answers the next `cart/update` requests.
#[derive(Debug, Clone)]
pub enum UpdateBehavior {
    /// Reply 200 with the given success body.
    Success(Value),
    /// Reply 200 with `{"success": false, "error": ...}`.
    Reject(String),
    /// Reply 500 with no usable body.
    ServerError,
}

#[derive(Debug, Deserialize)]
struct UpdateBody {
    quantity: u32,
}

#[derive(Debug)]
struct ServiceState {
    update_behavior: Mutex<UpdateBehavior>,
    delay: Mutex<Duration>,
    update_hits: AtomicUsize,
    add_hits: AtomicUsize,
    remove_hits: AtomicUsize,
    last_item_id: Mutex<Option<String>>,
    last_quantity: Mutex<Option<u32>>,
    last_csrf: Mutex<Option<String>>,
}

/// An in-process mock of the remote cart service.
pub struct MockCartService {
    addr: SocketAddr,
    state: Arc<ServiceState>,
}

impl MockCartService {
    /// Bind an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound (test harness only).
    pub async fn spawn() -> Self {
        let state = Arc::new(ServiceState {
            update_behavior: Mutex::new(UpdateBehavior::Reject(
                "mock behavior not scripted".to_string(),
            )),
            delay: Mutex::new(Duration::ZERO),
            update_hits: AtomicUsize::new(0),
            add_hits: AtomicUsize::new(0),
            remove_hits: AtomicUsize::new(0),
            last_item_id: Mutex::new(None),
            last_quantity: Mutex::new(None),
            last_csrf: Mutex::new(None),
        });

        let app = Router::new()
            .route("/store/cart/update/{item_id}/", post(handle_update))
            .route("/store/cart/add/{product_id}/", post(handle_add))
            .route("/store/cart/remove/{item_id}/", post(handle_remove))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock cart service");
        let addr = listener.local_addr().expect("mock service address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    /// The base URL matching `CLAYFORGE_CART_SERVICE_URL`.
    ///
    /// # Panics
    ///
    /// Panics if the bound address does not form a valid URL.
    #[must_use]
    pub fn service_url(&self) -> Url {
        Url::parse(&format!("http://{}/store/", self.addr)).expect("mock service url")
    }

    /// A cart config pointed at this mock.
    #[must_use]
    pub fn config(&self, storage_dir: &Path, cooldown: Duration) -> CartConfig {
        CartConfig {
            service_url: self.service_url(),
            csrf_token: SecretString::from(TEST_CSRF_TOKEN),
            storage_dir: storage_dir.to_path_buf(),
            request_timeout: Duration::from_secs(2),
            update_cooldown: cooldown,
        }
    }

    pub fn script_update(&self, behavior: UpdateBehavior) {
        *lock(&self.state.update_behavior) = behavior;
    }

    /// Delay every response (for in-flight guard tests).
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.state.delay) = delay;
    }

    #[must_use]
    pub fn update_hits(&self) -> usize {
        self.state.update_hits.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn add_hits(&self) -> usize {
        self.state.add_hits.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn remove_hits(&self) -> usize {
        self.state.remove_hits.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_item_id(&self) -> Option<String> {
        lock(&self.state.last_item_id).clone()
    }

    #[must_use]
    pub fn last_quantity(&self) -> Option<u32> {
        lock(&self.state.last_quantity).clone()
    }

    #[must_use]
    pub fn last_csrf(&self) -> Option<String> {
        lock(&self.state.last_csrf).clone()
    }
}

/// Build the rich `cart/update` success body the service contract defines.
#[must_use]
pub fn update_success_body(
    item_total: &str,
    subtotal: &str,
    shipping_cost: &str,
    tax_amount: &str,
    total: &str,
    free_shipping_eligible: bool,
    amount_needed: &str,
    cart_count: u32,
) -> Value {
    json!({
        "success": true,
        "item_total": item_total,
        "subtotal": subtotal,
        "shipping_cost": shipping_cost,
        "tax_amount": tax_amount,
        "total": total,
        "free_shipping_eligible": free_shipping_eligible,
        "amount_needed_for_free_shipping": amount_needed,
        "cart_count": cart_count,
    })
}

/// Initialize test logging once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clayforge_cart=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

async fn handle_update(
    State(state): State<Arc<ServiceState>>,
    UrlPath(item_id): UrlPath<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateBody>,
) -> (StatusCode, Json<Value>) {
    state.update_hits.fetch_add(1, Ordering::SeqCst);
    record_request(&state, &headers, Some(item_id), Some(body.quantity));
    pause(&state).await;

    match lock(&state.update_behavior).clone() {
        UpdateBehavior::Success(body) => (StatusCode::OK, Json(body)),
        UpdateBehavior::Reject(error) => (
            StatusCode::OK,
            Json(json!({ "success": false, "error": error })),
        ),
        UpdateBehavior::ServerError => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "boom" })),
        ),
    }
}

async fn handle_add(
    State(state): State<Arc<ServiceState>>,
    UrlPath(product_id): UrlPath<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.add_hits.fetch_add(1, Ordering::SeqCst);
    record_request(&state, &headers, Some(product_id), None);
    pause(&state).await;

    let count = state.add_hits.load(Ordering::SeqCst);
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Product added to cart",
            "cart_count": count,
        })),
    )
}

async fn handle_remove(
    State(state): State<Arc<ServiceState>>,
    UrlPath(item_id): UrlPath<String>,
    headers: HeaderMap,
) -> StatusCode {
    state.remove_hits.fetch_add(1, Ordering::SeqCst);
    record_request(&state, &headers, Some(item_id), None);
    pause(&state).await;
    StatusCode::OK
}

fn record_request(
    state: &ServiceState,
    headers: &HeaderMap,
    item_id: Option<String>,
    quantity: Option<u32>,
) {
    *lock(&state.last_item_id) = item_id;
    if quantity.is_some() {
        *lock(&state.last_quantity) = quantity;
    }
    *lock(&state.last_csrf) = headers
        .get("X-CSRFToken")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
}

async fn pause(state: &ServiceState) {
    let delay = *lock(&state.delay);
    if delay > Duration::ZERO {
        tokio::time::sleep(delay).await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
