//! REST API server example for the vending ledger.
//!
//! Run with: `cargo run --example server`
//!
//! The caller's identity is taken from the `X-Username` header. This stands
//! in for real authentication; the ledger itself trusts whatever username it
//! is handed.
//!
//! ## Endpoints
//!
//! - `POST /users` - Register a buyer or seller
//! - `GET /account` - Balance as coins, purchases, and total spent
//! - `POST /deposit` - Deposit coins (buyers)
//! - `POST /reset` - Reset the balance to zero (buyers)
//! - `POST /buy/{product}?amount=N` - Buy `N` units, default 1 (buyers)
//! - `POST /products` - List a product (sellers)
//! - `GET /products/{name}` - Look up a product
//! - `PUT /products/{name}` - Change price and stock (owning seller)
//! - `DELETE /products/{name}` - Delist a product (owning seller)
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/users \
//!   -H "Content-Type: application/json" -d '{"username": "sam", "role": "seller"}'
//! curl -X POST http://localhost:3000/users \
//!   -H "Content-Type: application/json" -d '{"username": "mike", "role": "buyer"}'
//!
//! curl -X POST http://localhost:3000/products -H "X-Username: sam" \
//!   -H "Content-Type: application/json" -d '{"name": "cola", "price": 100, "amount": 10}'
//!
//! curl -X POST http://localhost:3000/deposit -H "X-Username: mike" \
//!   -H "Content-Type: application/json" -d '{"100": 2, "50": 1}'
//! curl -X POST "http://localhost:3000/buy/cola?amount=2" -H "X-Username: mike"
//! curl http://localhost:3000/account -H "X-Username: mike"
//! ```

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use vending_ledger::{
    AccountSummary, Context, Deposit, Engine, ErrorKind, Ledger, LedgerError, Product,
    ProductName, ProductRequest, ProductUpdate, PurchaseRecord, Role, Username,
};

/// Header carrying the authenticated username.
pub const USERNAME_HEADER: &str = "x-username";

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Username,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct NewProductRequest {
    pub name: ProductName,
    pub price: u64,
    pub amount: u32,
}

#[derive(Debug, Deserialize)]
pub struct BuyQuery {
    pub amount: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DepositResponse {
    pub credited: u64,
}

/// Response body for errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the ledger engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

pub enum AppError {
    Ledger(LedgerError),
    Unauthorized,
    Forbidden,
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Ledger(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error) = match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "unknown or missing user".to_string(),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", "forbidden".to_string()),
            AppError::Ledger(err) => {
                let (status, code) = match err.kind() {
                    ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    ErrorKind::Invalid => (StatusCode::NOT_ACCEPTABLE, "INVALID"),
                    ErrorKind::Duplicate => (StatusCode::CONFLICT, "DUPLICATE"),
                    ErrorKind::Transient => (StatusCode::INTERNAL_SERVER_ERROR, "TRANSIENT"),
                };
                (status, code, err.to_string())
            }
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Authentication ===

/// The registered account behind `X-Username`.
pub struct Caller {
    pub username: Username,
    pub role: Role,
}

impl Caller {
    fn require(self, role: Role) -> Result<Self, AppError> {
        if self.role == role {
            Ok(self)
        } else {
            Err(AppError::Forbidden)
        }
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(USERNAME_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(Username::from)
            .ok_or(AppError::Unauthorized)?;

        match state.engine.user(&Context::background(), &username) {
            Ok(user) => Ok(Caller {
                username,
                role: user.role,
            }),
            Err(LedgerError::NotFound) => Err(AppError::Unauthorized),
            Err(err) => Err(err.into()),
        }
    }
}

// === Handlers ===

/// POST /users - Register an account.
async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<StatusCode, AppError> {
    state
        .engine
        .register_user(&Context::background(), &request.username, request.role)?;
    Ok(StatusCode::CREATED)
}

/// GET /account - Summary of the caller's account.
async fn get_account(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<AccountSummary>, AppError> {
    let summary = state
        .engine
        .account_summary(&Context::background(), &caller.username)?;
    Ok(Json(summary))
}

/// POST /deposit - Credit the submitted coins.
async fn deposit(
    State(state): State<AppState>,
    caller: Caller,
    Json(coins): Json<Deposit>,
) -> Result<Json<DepositResponse>, AppError> {
    let caller = caller.require(Role::Buyer)?;
    let credited = state
        .engine
        .deposit_coins(&Context::background(), &caller.username, &coins)?;
    Ok(Json(DepositResponse { credited }))
}

/// POST /reset - Zero the caller's balance.
async fn reset(State(state): State<AppState>, caller: Caller) -> Result<StatusCode, AppError> {
    let caller = caller.require(Role::Buyer)?;
    state
        .engine
        .reset_deposit(&Context::background(), &caller.username)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /buy/{product} - Buy units of a product.
async fn buy(
    State(state): State<AppState>,
    caller: Caller,
    Path(product): Path<String>,
    Query(query): Query<BuyQuery>,
) -> Result<Json<PurchaseRecord>, AppError> {
    let caller = caller.require(Role::Buyer)?;
    let request = ProductRequest::new(product, query.amount.unwrap_or(1));
    let record = state
        .engine
        .buy_product(&Context::background(), &caller.username, &request)?;
    Ok(Json(record))
}

/// POST /products - List a new product owned by the caller.
async fn create_product(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<NewProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let caller = caller.require(Role::Seller)?;
    let product = state.engine.create_product(
        &Context::background(),
        &caller.username,
        &request.name,
        ProductUpdate {
            price: request.price,
            amount: request.amount,
        },
    )?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /products/{name}
async fn get_product(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Product>, AppError> {
    let product = state
        .engine
        .product(&Context::background(), &ProductName(name))?;
    Ok(Json(product))
}

/// PUT /products/{name} - Change price and stock.
async fn update_product(
    State(state): State<AppState>,
    caller: Caller,
    Path(name): Path<String>,
    Json(update): Json<ProductUpdate>,
) -> Result<StatusCode, AppError> {
    let caller = caller.require(Role::Seller)?;
    state.engine.update_product(
        &Context::background(),
        &caller.username,
        &ProductName(name),
        update,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /products/{name}
async fn delete_product(
    State(state): State<AppState>,
    caller: Caller,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    let caller = caller.require(Role::Seller)?;
    state
        .engine
        .delete_product(&Context::background(), &caller.username, &ProductName(name))?;
    Ok(StatusCode::NO_CONTENT)
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(register))
        .route("/account", get(get_account))
        .route("/deposit", post(deposit))
        .route("/reset", post(reset))
        .route("/buy/{product}", post(buy))
        .route("/products", post(create_product))
        .route(
            "/products/{name}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .with_state(state)
}

// === Main ===

/// Where log lines go. Stdout is left to responses piped by callers.
pub type LogWriter = fn() -> io::Stderr;

/// fmt subscriber filtered by `RUST_LOG` (default `info`), writing to stderr.
pub fn log_subscriber() -> SubscriberBuilder<DefaultFields, Format, EnvFilter, LogWriter> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr as LogWriter)
}

#[tokio::main]
async fn main() -> io::Result<()> {
    log_subscriber().init();

    let state = AppState {
        engine: Arc::new(Engine::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!(addr = %listener.local_addr()?, "vending ledger API listening");

    axum::serve(listener, app).await
}
