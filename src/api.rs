//! REST API server for coinledger
//!
//! Thin transport layer over the ledger core: it parses requests, calls the
//! model operations, and translates domain error kinds into status codes.
//! Authenticated routes carry a bearer token whose subject is the user id.

use axum::{
    extract::{Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use uuid::Uuid;

use crate::error::{ErrorKind, LedgerError};
use crate::faucet::Faucet;
use crate::persistence::Database;
use crate::signup::{admit_user, NewUser};
use crate::user::{DomainResolver, User};
use crate::wallet::Wallet;

#[derive(Clone)]
pub struct ApiConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
}

#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    faucet: Arc<Faucet>,
    resolver: Arc<dyn DomainResolver>,
    config: ApiConfig,
}

impl AppState {
    pub fn new(
        db: Arc<Database>,
        faucet: Arc<Faucet>,
        resolver: Arc<dyn DomainResolver>,
        config: ApiConfig,
    ) -> Self {
        AppState {
            db,
            faucet,
            resolver,
            config,
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Domain(LedgerError),
    Unauthorized(&'static str),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Domain(e) => match e.kind() {
                ErrorKind::Validation => (StatusCode::BAD_REQUEST, e.to_string()),
                ErrorKind::Conflict => (StatusCode::CONFLICT, e.to_string()),
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, e.to_string()),
                ErrorKind::Storage | ErrorKind::Fatal => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                ),
            },
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Domain(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub wallets: Vec<WalletResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub user_id: String,
    pub address: String,
    pub currency: String,
    pub balance: String,
}

impl WalletResponse {
    fn from_wallet(wallet: &Wallet) -> Self {
        WalletResponse {
            user_id: wallet.user_id().to_string(),
            address: wallet.address().to_string(),
            currency: wallet.currency().to_string(),
            balance: wallet.balance().to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IamResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware. Logs method, path, status and duration.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

/// Bearer-token authentication. Validates the JWT, loads the user it names,
/// and injects it into request extensions for the handler.
async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    const PREFIX: &str = "Bearer ";
    let token = match header.strip_prefix(PREFIX) {
        Some(token) => token,
        None => return Err(ApiError::Unauthorized("invalid authorization header")),
    };

    let decoded = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("invalid token"))?;

    let id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| ApiError::Unauthorized("invalid token"))?;

    let user = {
        let conn = state.db.lock()?;
        match User::find_by_id(&conn, id) {
            Ok(user) => user,
            Err(LedgerError::NotFound) => {
                return Err(ApiError::Unauthorized("invalid token"))
            }
            Err(e) => {
                tracing::error!(error = %e, "could not find user by id");
                return Err(ApiError::Domain(e));
            }
        }
    };

    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

// ============================================================================
// Handlers
// ============================================================================

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = admit_user(
        &state.db,
        &state.faucet,
        state.resolver.as_ref(),
        &mut rand::thread_rng(),
        NewUser {
            email: &req.email,
            password: &req.password,
            first_name: &req.first_name,
            last_name: &req.last_name,
        },
    )
    .map_err(|e| {
        if matches!(e.kind(), ErrorKind::Storage | ErrorKind::Fatal) {
            tracing::error!(error = %e, "could not save new user with wallets and transactions");
        }
        ApiError::Domain(e)
    })?;

    let wallets = user.wallets().iter().map(WalletResponse::from_wallet).collect();
    let res = SignupResponse {
        id: user.id().to_string(),
        email: user.email().to_string(),
        first_name: user.first_name().to_string(),
        last_name: user.last_name().to_string(),
        wallets,
    };

    Ok((StatusCode::CREATED, Json(res)))
}

async fn token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = {
        let conn = state.db.lock()?;
        match User::find_by_email(&conn, &req.email) {
            Ok(user) => user,
            Err(LedgerError::NotFound) => return Err(ApiError::Unauthorized("user not found")),
            Err(e) => {
                tracing::error!(error = %e, "could not find user by email");
                return Err(ApiError::Domain(e));
            }
        }
    };

    if !user.verify_password(&req.password) {
        return Err(ApiError::Unauthorized("invalid password"));
    }

    let expires_at = Utc::now().timestamp() + state.config.token_ttl_secs as i64;
    let claims = Claims {
        sub: user.id().to_string(),
        exp: expires_at as usize,
    };
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(error = %e, "error signing jwt token");
        ApiError::Internal
    })?;

    Ok(Json(TokenResponse { token, expires_at }))
}

async fn iam(Extension(user): Extension<User>) -> Json<IamResponse> {
    Json(IamResponse {
        id: user.id().to_string(),
        email: user.email().to_string(),
        first_name: user.first_name().to_string(),
        last_name: user.last_name().to_string(),
    })
}

async fn wallets(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
) -> Result<Json<Vec<WalletResponse>>, ApiError> {
    let conn = state.db.lock()?;

    let user_id = user.id();
    user.load_wallets(&conn).map_err(|e| {
        tracing::error!(error = %e, user_id = %user_id, "could not load user wallets");
        ApiError::Domain(e)
    })?;

    let mut res = Vec::new();
    for wallet in user.wallets_mut() {
        wallet.load_transactions(&conn).map_err(|e| {
            tracing::error!(error = %e, "could not load transactions for wallet");
            ApiError::Domain(e)
        })?;
        res.push(WalletResponse::from_wallet(wallet));
    }

    Ok(Json(res))
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints (for testing)
pub fn build_api_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_credentials(true);

    let protected = Router::new()
        .route("/iam", get(iam))
        .route("/wallets", get(wallets))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/signup", post(signup))
        .route("/token", post(token))
        .merge(protected)
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
        .layer(cors)
}

/// Run the API server on the configured port.
pub async fn run_api_server(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let port = state.config.port;
    let app = build_api_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(port = %port, "api.listen");
    axum::serve(listener, app).await?;

    Ok(())
}
