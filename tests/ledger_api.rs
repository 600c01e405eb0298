use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use house_ledger::api::health::HealthState;
use house_ledger::api::latency::QuoteLatency;
use house_ledger::api::routes::{router, ApiState};
use house_ledger::db::{self, Ledger};
use house_ledger::error::{AppError, Result};
use house_ledger::quotes::{PriceLookup, StaticQuotes};
use house_ledger::state::SessionStore;
use house_ledger::types::Quote;

/// Fixed prices behind a switch that can take the price service down.
struct SwitchableQuotes {
    table: StaticQuotes,
    down: AtomicBool,
}

impl SwitchableQuotes {
    fn set_price(&self, symbol: &str, price: f64) {
        self.table.set_price(symbol, price);
    }

    fn take_down(&self) {
        self.down.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl PriceLookup for SwitchableQuotes {
    async fn lookup(&self, symbol: &str) -> Result<Option<Quote>> {
        if self.down.load(Ordering::Relaxed) {
            return Err(AppError::Upstream("maintenance".to_string()));
        }
        self.table.lookup(symbol).await
    }
}

struct TestApp {
    app: Router,
    quotes: Arc<SwitchableQuotes>,
    _dir: TempDir,
}

async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("finance.db");
    let pool = db::connect(path.to_str().unwrap()).await.unwrap();
    let quotes = Arc::new(SwitchableQuotes {
        table: StaticQuotes::new(&[("AAPL", 100.0), ("MSFT", 250.0), ("NFLX", 40.0)]),
        down: AtomicBool::new(false),
    });

    let state = ApiState {
        ledger: Ledger::new(pool),
        quotes: quotes.clone(),
        sessions: SessionStore::new(Duration::from_secs(3600)),
        health: Arc::new(HealthState::new()),
        latency: Arc::new(QuoteLatency::new()),
        starting_cash: 10_000.0,
    };

    TestApp {
        app: router(state),
        quotes,
        _dir: dir,
    }
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, token: Option<&str>, form: Option<&str>) -> (StatusCode, Value) {
        let (status, _, body) = self.call_raw(method, uri, token, form).await;
        (status, body)
    }

    async fn call_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        form: Option<&str>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match form {
            Some(f) => {
                req = req.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(f.to_string())
            }
            None => Body::empty(),
        };

        let resp = self.app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }

    async fn register(&self, username: &str) -> String {
        let form = format!("username={username}&password=alohomora&confirmation=alohomora");
        let (status, body) = self.call(Method::POST, "/register", None, Some(&form)).await;
        assert_eq!(status, StatusCode::OK, "register {username}: {body}");
        body["token"].as_str().unwrap().to_string()
    }
}

fn message(body: &Value) -> &str {
    body["message"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let t = spawn_app().await;
    for uri in ["/", "/portfolio", "/history", "/leaderboard", "/me", "/holdings"] {
        let (status, body) = t.call(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(message(&body), "Login required");
    }
    let (status, _) = t.call(Method::GET, "/me", Some("made-up"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_validates_in_order() {
    let t = spawn_app().await;
    let cases = [
        ("password=alohomora&confirmation=alohomora", "Must provide valid username"),
        ("username=ron&confirmation=x", "Must provide valid password"),
        ("username=ron&password=short&confirmation=short", "Password must be at least 8 characters long"),
        ("username=ron&password=alohomora&confirmation=alohomorA", "Passwords do not match"),
    ];
    for (form, expected) in cases {
        let (status, body) = t.call(Method::POST, "/register", None, Some(form)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{form}");
        assert_eq!(message(&body), expected);
    }

    t.register("ron").await;
    let (status, body) = t
        .call(Method::POST, "/register", None, Some("username=ron&password=alohomora&confirmation=alohomora"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(message(&body), "Username already exists");
}

#[tokio::test]
async fn login_logout_cycle() {
    let t = spawn_app().await;
    t.register("hermione").await;

    let (status, body) = t
        .call(Method::POST, "/login", None, Some("username=hermione&password=wrongpass"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(message(&body), "Invalid username/password");

    let (status, _) = t
        .call(Method::POST, "/login", None, Some("username=nobody&password=alohomora"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t
        .call(Method::POST, "/login", None, Some("username=hermione&password=alohomora"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = t.call(Method::GET, "/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "hermione");
    assert_eq!(body["cash"], 10_000.0);

    let (status, _) = t.call(Method::POST, "/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t.call(Method::GET, "/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn buy_sell_and_portfolio() {
    let t = spawn_app().await;
    let token = t.register("harry").await;

    let (status, body) = t
        .call(Method::POST, "/buy", Some(&token), Some("symbol=aapl&shares=10"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(message(&body), "You bought 10 shares of AAPL");
    assert_eq!(body["cash"], 9_000.0);

    t.quotes.set_price("AAPL", 150.0);
    let (status, body) = t
        .call(Method::POST, "/sell", Some(&token), Some("symbol=AAPL&shares=4"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(message(&body), "You sold 4 shares of AAPL");
    assert_eq!(body["cash"], 9_600.0);

    let (status, body) = t.call(Method::GET, "/portfolio", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["symbol"], "AAPL");
    assert_eq!(rows[0]["shares"], 6);
    assert_eq!(rows[0]["cost_basis"], 600.0);
    assert_eq!(rows[0]["price"], 150.0);
    assert_eq!(rows[0]["total"], 900.0);
    assert_eq!(body["cash"], 9_600.0);
    assert_eq!(body["total_stocks"], 900.0);
    assert_eq!(body["total"], 10_500.0);

    let (_, root) = t.call(Method::GET, "/", Some(&token), None).await;
    assert_eq!(root, body);

    let (_, history) = t.call(Method::GET, "/history", Some(&token), None).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["shares"], -4);
    assert_eq!(history[1]["shares"], 10);

    let (_, held) = t.call(Method::GET, "/holdings", Some(&token), None).await;
    assert_eq!(held, serde_json::json!([{ "symbol": "AAPL", "shares": 6 }]));
}

#[tokio::test]
async fn rejected_trades_change_nothing() {
    let t = spawn_app().await;
    let token = t.register("ginny").await;

    let cases = [
        ("/buy", "shares=1", "Must provide valid symbol"),
        ("/buy", "symbol=AAPL&shares=0", "Shares must be a positive integer"),
        ("/buy", "symbol=AAPL&shares=2.5", "Shares must be a positive integer"),
        ("/buy", "symbol=ZZZZ&shares=1", "Must provide valid symbol"),
        ("/buy", "symbol=MSFT&shares=41", "Cannot afford"),
        ("/sell", "shares=1", "Must select a stock"),
        ("/sell", "symbol=AAPL&shares=1", "You do not own enough shares"),
    ];
    for (uri, form, expected) in cases {
        let (status, body) = t.call(Method::POST, uri, Some(&token), Some(form)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {form}");
        assert_eq!(message(&body), expected, "{uri} {form}");
    }

    let (_, me) = t.call(Method::GET, "/me", Some(&token), None).await;
    assert_eq!(me["cash"], 10_000.0);
    let (_, history) = t.call(Method::GET, "/history", Some(&token), None).await;
    assert_eq!(history, serde_json::json!([]));
}

#[tokio::test]
async fn quote_lookup() {
    let t = spawn_app().await;
    let token = t.register("luna").await;

    let (status, body) = t.call(Method::GET, "/quote?symbol=msft", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["symbol"], "MSFT");
    assert_eq!(body["price"], 250.0);

    let (status, body) = t.call(Method::GET, "/quote", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(message(&body), "No symbol given");

    let (status, body) = t.call(Method::GET, "/quote?symbol=NOPE", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(message(&body), "Invalid symbol");

    t.quotes.take_down();
    let (status, _) = t.call(Method::GET, "/quote?symbol=MSFT", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn leaderboard_ranks_all_users() {
    let t = spawn_app().await;
    let draco = t.register("draco").await;
    let harry = t.register("harry").await;
    t.register("neville").await;

    t.call(Method::POST, "/buy", Some(&draco), Some("symbol=NFLX&shares=100")).await;
    t.call(Method::POST, "/buy", Some(&harry), Some("symbol=AAPL&shares=10")).await;
    t.quotes.set_price("AAPL", 200.0);
    t.quotes.set_price("NFLX", 10.0);

    let (status, board) = t.call(Method::GET, "/leaderboard", Some(&harry), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = board
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["harry", "neville", "draco"]);
    assert_eq!(board[0]["total_value"], 11_000.0);
    assert_eq!(board[1]["total_value"], 10_000.0);
    assert_eq!(board[2]["total_value"], 7_000.0);
}

#[tokio::test]
async fn change_password_rules() {
    let t = spawn_app().await;
    let token = t.register("percy").await;

    let cases = [
        ("current_password=nope&new_password=prefect1&confirmation=prefect1", "Current password is incorrect"),
        ("current_password=alohomora&new_password=prefect1&confirmation=prefect2", "New passwords do not match"),
        ("current_password=alohomora&new_password=short&confirmation=short", "Password must be at least 8 characters long"),
    ];
    for (form, expected) in cases {
        let (status, body) = t.call(Method::POST, "/change_password", Some(&token), Some(form)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{form}");
        assert_eq!(message(&body), expected);
    }

    let (status, body) = t
        .call(
            Method::POST,
            "/change_password",
            Some(&token),
            Some("current_password=alohomora&new_password=prefect1&confirmation=prefect1"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&body), "Password successfully changed!");

    let (status, _) = t
        .call(Method::POST, "/login", None, Some("username=percy&password=prefect1"))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn delete_account_purges_everything() {
    let t = spawn_app().await;
    let token = t.register("cedric").await;
    let other = t.register("cho").await;
    t.call(Method::POST, "/buy", Some(&token), Some("symbol=AAPL&shares=1")).await;

    let (status, body) = t.call(Method::POST, "/delete_account", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&body), "Your account has been deleted.");

    let (status, _) = t.call(Method::GET, "/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t
        .call(Method::POST, "/login", None, Some("username=cedric&password=alohomora"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, board) = t.call(Method::GET, "/leaderboard", Some(&other), None).await;
    assert_eq!(board.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn responses_are_never_cached() {
    let t = spawn_app().await;
    for (method, uri) in [(Method::GET, "/health"), (Method::GET, "/me")] {
        let (_, headers, _) = t.call_raw(method, uri, None, None).await;
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-store, must-revalidate");
        assert_eq!(headers[header::EXPIRES], "0");
        assert_eq!(headers[header::PRAGMA], "no-cache");
    }
}

#[tokio::test]
async fn health_and_latency_endpoints() {
    let t = spawn_app().await;
    t.register("fred").await;

    let (status, body) = t.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["users"], 1);
    assert_eq!(body["active_sessions"], 1);
    assert!(body["last_quote_at_ns"].is_null());

    let (status, body) = t.call(Method::GET, "/stats/latency", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sample_count"], 0);
    assert!(body["p99_ms"].is_null());
}
