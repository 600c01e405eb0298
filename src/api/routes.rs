use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware,
    response::Response,
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::health::HealthState;
use crate::api::latency::{LatencySummary, QuoteLatency};
use crate::config::MIN_PASSWORD_LEN;
use crate::db::Ledger;
use crate::error::AppError;
use crate::hash::{hash_password, verify_password};
use crate::portfolio::holdings;
use crate::portfolio::leaderboard::{self, LeaderboardEntry};
use crate::portfolio::trade::{self, Order, Side, TradeForm, TradeReceipt};
use crate::portfolio::valuation::{self, PortfolioView};
use crate::quotes::PriceLookup;
use crate::state::SessionStore;
use crate::types::{normalize_symbol, Quote};

#[derive(Clone)]
pub struct ApiState {
    pub ledger: Ledger,
    pub quotes: Arc<dyn PriceLookup>,
    pub sessions: Arc<SessionStore>,
    pub health: Arc<HealthState>,
    pub latency: Arc<QuoteLatency>,
    pub starting_cash: f64,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/", get(portfolio))
        .route("/portfolio", get(portfolio))
        .route("/holdings", get(holdings_list))
        .route("/quote", get(quote))
        .route("/buy", post(buy))
        .route("/sell", post(sell))
        .route("/history", get(history))
        .route("/leaderboard", get(get_leaderboard))
        .route("/change_password", post(change_password))
        .route("/delete_account", post(delete_account))
        .route("/health", get(health))
        .route("/stats/latency", get(get_stats_latency))
        .layer(middleware::map_response(no_cache))
        .with_state(state)
}

/// Responses reflect live balances and prices; nothing may be cached.
async fn no_cache(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Logged-in user behind the request's bearer token.
pub struct CurrentUser {
    pub user_id: i64,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<ApiState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(login_required)?;
        let user_id = state.sessions.resolve(token).ok_or_else(login_required)?;
        Ok(Self {
            user_id,
            token: token.to_string(),
        })
    }
}

fn login_required() -> AppError {
    AppError::Unauthorized("Login required".to_string())
}

// ---------------------------------------------------------------------------
// Form and query structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub confirmation: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangePasswordForm {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub confirmation: Option<String>,
}

#[derive(Deserialize)]
pub struct QuoteQuery {
    pub symbol: Option<String>,
}

/// Present and non-blank, else a rejection carrying `reason`.
fn required(value: Option<String>, reason: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::rejected(reason))
}

fn check_new_password(password: &str, confirmation: Option<&str>) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::rejected(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    if confirmation != Some(password) {
        return Err(AppError::rejected("Passwords do not match"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct SessionResponse {
    pub user_id: i64,
    pub username: String,
    pub token: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Serialize)]
pub struct MeResponse {
    pub username: String,
    pub cash: f64,
}

#[derive(Serialize)]
pub struct HoldingResponse {
    pub symbol: String,
    pub shares: i64,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub symbol: String,
    pub shares: i64,
    pub price: f64,
    pub timestamp: i64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub users: i64,
    pub active_sessions: usize,
    pub last_quote_at_ns: Option<u64>,
    pub quote_failures: u64,
    pub quote_p99_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// Account handlers
// ---------------------------------------------------------------------------

async fn register(
    State(state): State<ApiState>,
    Form(form): Form<RegisterForm>,
) -> Result<Json<SessionResponse>, AppError> {
    let username = required(form.username, "Must provide valid username")?;
    let password = form
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::rejected("Must provide valid password"))?;
    check_new_password(&password, form.confirmation.as_deref())?;

    let hash = hash_password(&password)?;
    let user_id = state
        .ledger
        .create_user(&username, &hash, state.starting_cash)
        .await?;
    let token = state.sessions.create(user_id);

    Ok(Json(SessionResponse {
        user_id,
        username,
        token,
    }))
}

async fn login(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Json<SessionResponse>, AppError> {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.revoke(token);
    }

    let username = required(form.username, "Must provide valid username")?;
    let password = form
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::rejected("Must provide valid password"))?;

    let user = state
        .ledger
        .find_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid username/password".to_string()))?;
    verify_password(&password, &user.hash)?;

    let token = state.sessions.create(user.id);
    info!(user_id = user.id, "User logged in");
    Ok(Json(SessionResponse {
        user_id: user.id,
        username: user.username,
        token,
    }))
}

async fn logout(State(state): State<ApiState>, headers: HeaderMap) -> Json<MessageResponse> {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.revoke(token);
    }
    MessageResponse::new("Logged out")
}

async fn me(State(state): State<ApiState>, user: CurrentUser) -> Result<Json<MeResponse>, AppError> {
    let summary = state.ledger.user_summary(user.user_id).await?;
    Ok(Json(MeResponse {
        username: summary.username,
        cash: summary.cash,
    }))
}

async fn change_password(
    State(state): State<ApiState>,
    user: CurrentUser,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Json<MessageResponse>, AppError> {
    let row = state
        .ledger
        .user(user.user_id)
        .await?
        .ok_or_else(login_required)?;

    let current = form.current_password.unwrap_or_default();
    match verify_password(&current, &row.hash) {
        Ok(()) => {}
        Err(AppError::Unauthorized(_)) => return Err(AppError::rejected("Current password is incorrect")),
        Err(e) => return Err(e),
    }

    let new_password = form.new_password.unwrap_or_default();
    if form.confirmation.as_deref() != Some(new_password.as_str()) {
        return Err(AppError::rejected("New passwords do not match"));
    }
    check_new_password(&new_password, Some(&new_password))?;

    let hash = hash_password(&new_password)?;
    state.ledger.update_password(user.user_id, &hash).await?;
    info!(user_id = user.user_id, "Password changed");
    Ok(MessageResponse::new("Password successfully changed!"))
}

async fn delete_account(
    State(state): State<ApiState>,
    user: CurrentUser,
) -> Result<Json<MessageResponse>, AppError> {
    state.ledger.delete_user(user.user_id).await?;
    let revoked = state.sessions.revoke_user(user.user_id);
    info!(user_id = user.user_id, sessions = revoked, "Sessions revoked for deleted account");
    Ok(MessageResponse::new("Your account has been deleted."))
}

// ---------------------------------------------------------------------------
// Portfolio handlers
// ---------------------------------------------------------------------------

async fn portfolio(State(state): State<ApiState>, user: CurrentUser) -> Result<Json<PortfolioView>, AppError> {
    let cash = state.ledger.cash(user.user_id).await?;
    let txs = state.ledger.transactions_for_user(user.user_id).await?;
    let positions = holdings::held(&txs);
    let view = valuation::appraise(state.quotes.as_ref(), cash, &positions).await?;
    Ok(Json(view))
}

async fn holdings_list(
    State(state): State<ApiState>,
    user: CurrentUser,
) -> Result<Json<Vec<HoldingResponse>>, AppError> {
    let txs = state.ledger.transactions_for_user(user.user_id).await?;
    let rows = holdings::held(&txs)
        .into_iter()
        .map(|p| HoldingResponse {
            symbol: p.symbol,
            shares: p.shares,
        })
        .collect();
    Ok(Json(rows))
}

async fn quote(
    State(state): State<ApiState>,
    _user: CurrentUser,
    Query(params): Query<QuoteQuery>,
) -> Result<Json<Quote>, AppError> {
    let symbol = params
        .symbol
        .as_deref()
        .and_then(normalize_symbol)
        .ok_or_else(|| AppError::rejected("No symbol given"))?;
    let quote = state
        .quotes
        .lookup(&symbol)
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid symbol".to_string()))?;
    Ok(Json(quote))
}

async fn buy(
    State(state): State<ApiState>,
    user: CurrentUser,
    Form(form): Form<TradeForm>,
) -> Result<Json<TradeReceipt>, AppError> {
    let order = Order::parse(Side::Buy, &form)?;
    let receipt = trade::execute(&state.ledger, state.quotes.as_ref(), user.user_id, &order).await?;
    Ok(Json(receipt))
}

async fn sell(
    State(state): State<ApiState>,
    user: CurrentUser,
    Form(form): Form<TradeForm>,
) -> Result<Json<TradeReceipt>, AppError> {
    let order = Order::parse(Side::Sell, &form)?;
    let receipt = trade::execute(&state.ledger, state.quotes.as_ref(), user.user_id, &order).await?;
    Ok(Json(receipt))
}

async fn history(
    State(state): State<ApiState>,
    user: CurrentUser,
) -> Result<Json<Vec<HistoryResponse>>, AppError> {
    let rows = state
        .ledger
        .history(user.user_id)
        .await?
        .into_iter()
        .map(|t| HistoryResponse {
            symbol: t.symbol,
            shares: t.shares,
            price: t.price,
            timestamp: t.timestamp,
        })
        .collect();
    Ok(Json(rows))
}

async fn get_leaderboard(
    State(state): State<ApiState>,
    _user: CurrentUser,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let board = leaderboard::build(&state.ledger, state.quotes.as_ref()).await?;
    Ok(Json(board))
}

// ---------------------------------------------------------------------------
// Operational
// ---------------------------------------------------------------------------

async fn health(State(state): State<ApiState>) -> Result<Json<HealthResponse>, AppError> {
    let users = state.ledger.count_users().await?;
    let last_quote = state.health.last_quote_at_ns();

    Ok(Json(HealthResponse {
        status: "ok",
        users,
        active_sessions: state.sessions.len(),
        last_quote_at_ns: (last_quote > 0).then_some(last_quote),
        quote_failures: state.health.quote_failures(),
        quote_p99_ms: state.latency.summary().p99_ms,
    }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}
