mod app;

use std::io;
use std::time::Duration;

use app::{format_time_ns, truncate, usd, AppState, ConnectionStatus};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let username = std::env::var("TUI_USERNAME").unwrap_or_default();
    let password = std::env::var("TUI_PASSWORD").unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        eprintln!("TUI_USERNAME and TUI_PASSWORD must be set");
        std::process::exit(1);
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url, username, password);

    // Initial fetch before rendering
    app.refresh(&client).await;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut board_state = TableState::default();
    board_state.select(None);

    let result = run_loop(&mut terminal, &mut app, &client, &mut board_state).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
    board_state: &mut TableState,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(2);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app, board_state))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            let max = app.leaderboard.len().saturating_sub(1);
                            let next = board_state.selected().map_or(0, |i| (i + 1).min(max));
                            board_state.select(Some(next));
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            let prev = board_state
                                .selected()
                                .map_or(0, |i| i.saturating_sub(1));
                            board_state.select(Some(prev));
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, board_state: &mut TableState) {
    let area = f.area();

    // Outer vertical split: header | body | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_body(f, app, board_state, chunks[1]);
    render_footer(f, app, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let mut spans = vec![
        Span::styled(
            format!(" {}  ", app.username),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  cash "),
        Span::styled(usd(app.portfolio.cash), Style::default().fg(Color::White)),
        Span::raw("  │  stocks "),
        Span::styled(usd(app.portfolio.total_stocks), Style::default().fg(Color::White)),
        Span::raw("  │  total "),
        Span::styled(
            usd(app.portfolio.total),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
    ];
    if !app.portfolio.skipped.is_empty() {
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(
            format!("unpriced: {}", app.portfolio.skipped.join(",")),
            Style::default().fg(Color::Red),
        ));
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).border_style(
            Style::default().fg(Color::DarkGray),
        ));

    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &AppState, board_state: &mut TableState, area: Rect) {
    // Left: holdings over history. Right: leaderboard.
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(halves[0]);

    render_holdings_table(f, app, left[0]);
    render_history_table(f, app, left[1]);
    render_leaderboard_table(f, app, board_state, halves[1]);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    Row::new(cells).height(1)
}

fn titled_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
}

fn render_holdings_table(f: &mut Frame, app: &AppState, area: Rect) {
    let rows: Vec<Row> = app
        .portfolio
        .rows
        .iter()
        .map(|r| {
            let gain = r.total - r.cost_basis;
            let gain_color = if gain > 0.0 {
                Color::Green
            } else if gain < 0.0 {
                Color::Red
            } else {
                Color::White
            };
            Row::new(vec![
                Cell::from(r.symbol.clone()).style(Style::default().fg(Color::Cyan)),
                Cell::from(r.shares.to_string()),
                Cell::from(usd(r.price)),
                Cell::from(usd(r.cost_basis)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(usd(r.total)).style(Style::default().fg(gain_color)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(7),
            Constraint::Length(12),
            Constraint::Length(14),
            Constraint::Min(12),
        ],
    )
    .header(header_row(&["Symbol", "Shares", "Price", "Cost basis", "Value"]))
    .block(titled_block(" HOLDINGS "));

    f.render_widget(table, area);
}

fn render_history_table(f: &mut Frame, app: &AppState, area: Rect) {
    let rows: Vec<Row> = app
        .history
        .iter()
        .map(|t| {
            let (side, color) = if t.shares > 0 {
                ("BUY", Color::Green)
            } else {
                ("SELL", Color::Red)
            };
            Row::new(vec![
                Cell::from(format_time_ns(t.timestamp)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(side).style(Style::default().fg(color)),
                Cell::from(t.symbol.clone()),
                Cell::from(t.shares.abs().to_string()),
                Cell::from(usd(t.price)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(5),
            Constraint::Length(8),
            Constraint::Length(7),
            Constraint::Min(10),
        ],
    )
    .header(header_row(&["Time", "Side", "Symbol", "Shares", "Price"]))
    .block(titled_block(" HISTORY "));

    f.render_widget(table, area);
}

fn render_leaderboard_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let own = app.own_rank();
    let rows: Vec<Row> = app
        .leaderboard
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let style = if Some(i) == own {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(format!("{}", i + 1)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(truncate(&e.username, 20)),
                Cell::from(usd(e.total_value)),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [Constraint::Length(4), Constraint::Min(10), Constraint::Length(14)],
    )
    .header(header_row(&["#", "User", "Total"]))
    .block(titled_block(" LEADERBOARD "))
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    f.render_stateful_widget(table, area, state);
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let health = &app.health;
    let p99 = health
        .quote_p99_ms
        .map_or("—".to_string(), |v| format!("{v:.0}ms"));
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("scroll leaderboard  "),
        Span::styled(
            format!(
                "users: {}  sessions: {}  quote p99: {p99}  quote failures: {}  auto-refresh: 2s",
                health.users.unwrap_or(0),
                health.active_sessions.unwrap_or(0),
                health.quote_failures.unwrap_or(0),
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    let paragraph = Paragraph::new(line).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}
