use serde::{de::DeserializeOwned, Deserialize};

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SessionResponse {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioRow {
    pub symbol: String,
    pub shares: i64,
    pub cost_basis: f64,
    pub price: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PortfolioResponse {
    pub rows: Vec<PortfolioRow>,
    pub cash: f64,
    pub total_stocks: f64,
    pub total: f64,
    #[serde(default)]
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub total_value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub symbol: String,
    pub shares: i64,
    pub price: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HealthResponse {
    pub users: Option<i64>,
    pub active_sessions: Option<i64>,
    pub quote_failures: Option<u64>,
    pub quote_p99_ms: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub portfolio: PortfolioResponse,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub history: Vec<HistoryEntry>,
    pub health: HealthResponse,
    pub base_url: String,
    pub username: String,
    password: String,
    token: Option<String>,
}

impl AppState {
    pub fn new(base_url: String, username: String, password: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            portfolio: PortfolioResponse::default(),
            leaderboard: Vec::new(),
            history: Vec::new(),
            health: HealthResponse::default(),
            base_url,
            username,
            password,
            token: None,
        }
    }

    async fn login(&mut self, client: &reqwest::Client) -> Result<String, String> {
        let url = format!("{}/login", self.base_url);
        let resp = client
            .post(&url)
            .form(&[("username", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let session: SessionResponse = read_json(resp).await?;
        self.token = Some(session.token.clone());
        Ok(session.token)
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let token = match self.token.clone() {
            Some(t) => t,
            None => match self.login(client).await {
                Ok(t) => t,
                Err(e) => {
                    self.status = ConnectionStatus::Error(format!("login: {e}"));
                    return;
                }
            },
        };

        let portfolio_url = format!("{}/portfolio", self.base_url);
        let leaderboard_url = format!("{}/leaderboard", self.base_url);
        let history_url = format!("{}/history", self.base_url);
        let health_url = format!("{}/health", self.base_url);

        let (portfolio_res, leaderboard_res, history_res, health_res) = tokio::join!(
            client.get(&portfolio_url).bearer_auth(&token).send(),
            client.get(&leaderboard_url).bearer_auth(&token).send(),
            client.get(&history_url).bearer_auth(&token).send(),
            client.get(&health_url).send(),
        );

        let (portfolio_res, leaderboard_res, history_res) = match (portfolio_res, leaderboard_res, history_res) {
            (Ok(p), Ok(l), Ok(h)) => (p, l, h),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };

        if portfolio_res.status() == reqwest::StatusCode::UNAUTHORIZED {
            // Session expired or the server restarted; log in again next tick.
            self.token = None;
            self.status = ConnectionStatus::Connecting;
            return;
        }

        let (portfolio, leaderboard, history) = tokio::join!(
            read_json::<PortfolioResponse>(portfolio_res),
            read_json::<Vec<LeaderboardEntry>>(leaderboard_res),
            read_json::<Vec<HistoryEntry>>(history_res),
        );

        match (portfolio, leaderboard, history) {
            (Ok(p), Ok(l), Ok(h)) => {
                self.portfolio = p;
                self.leaderboard = l;
                self.history = h;
                self.status = ConnectionStatus::Connected;

                if let Ok(h) = health_res {
                    if let Ok(health) = h.json::<HealthResponse>().await {
                        self.health = health;
                    }
                }
            }
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                self.status = ConnectionStatus::Error(e);
            }
        }
    }

    /// Position of the logged-in user on the leaderboard.
    pub fn own_rank(&self) -> Option<usize> {
        self.leaderboard.iter().position(|e| e.username == self.username)
    }
}

/// Decode a success body, or surface the server's `{status, message}` error.
async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, String> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(|e| format!("parse error: {e}"));
    }
    match resp.json::<ErrorBody>().await {
        Ok(body) => Err(body.message),
        Err(_) => Err(format!("HTTP {status}")),
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn usd(v: f64) -> String {
    let sign = if v < 0.0 { "-" } else { "" };
    let cents = (v.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}${grouped}.{:02}", cents % 100)
}

/// Convert nanosecond epoch timestamp to HH:MM:SS string.
pub fn format_time_ns(ns: i64) -> String {
    let secs = (ns / 1_000_000_000).max(0) as u64;
    let h = (secs / 3600) % 24;
    let m = (secs / 60) % 60;
    let s = secs % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}
