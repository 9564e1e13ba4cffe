/// Ratatui-based shell for deskpilot.
///
/// Architecture:
///   main loop:   crossterm keyboard events + UiEvent drain + connectivity watch
///   turn task:   tokio::spawn, runs one backend call, sends the outcome back
///   monitor:     MonitorHandle, polls /api/system-info, publishes on a watch
///
/// The shell never mutates the log directly; it dispatches intents to
/// `Conversation` and renders whatever the log holds.
///
/// Layout:
///   ┌────────────────────────────────────────────────┐
///   │  header (1 line)                               │
///   ├────────────────────────────────────────────────┤
///   │  conversation history (scrollable, Min(0))     │
///   ├────────────────────────────────────────────────┤
///   │  status bar (1 line)                           │
///   ├────────────────────────────────────────────────┤
///   │  input box (3 lines, fixed)                    │
///   └────────────────────────────────────────────────┘
pub mod chat;
pub mod render;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

use crate::client::{Client, TransportError};
use crate::config::ResolvedConfig;
use crate::conversation::{Conversation, TurnRequest, run_turn};
use crate::monitor::MonitorHandle;
use crate::protocol::{Mode, RawTaskResponse};
use crate::ui::pretty_json;

// ── UiEvent: results from spawned tasks → main loop ─────────────────────────

#[derive(Debug)]
pub enum UiEvent {
    /// A submit or confirm call finished
    TurnDone {
        req: TurnRequest,
        outcome: Result<RawTaskResponse, TransportError>,
    },
    /// An auxiliary query finished
    QueryDone {
        query: Query,
        outcome: Result<Value, TransportError>,
    },
}

// ── Auxiliary queries ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    History,
    SystemInfo,
    Processes,
    Suggestions,
    Rollback,
}

impl Query {
    fn label(self) -> &'static str {
        match self {
            Query::History => "history",
            Query::SystemInfo => "system info",
            Query::Processes => "active processes",
            Query::Suggestions => "suggestions",
            Query::Rollback => "rollback",
        }
    }

    async fn run(self, client: &Client) -> Result<Value, TransportError> {
        match self {
            Query::History => client.get_history().await,
            Query::SystemInfo => client.get_system_info().await,
            Query::Processes => client.get_active_processes().await,
            Query::Suggestions => client.get_suggestions().await,
            Query::Rollback => client.rollback_last_action().await,
        }
    }
}

// ── Slash commands ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Command {
    SetMode(Mode),
    Confirm,
    Cancel,
    Query(Query),
    Timestamps,
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(input: &str) -> Option<Command> {
    let cmd = input.trim().strip_prefix('/')?;
    let cmd = cmd.split_whitespace().next().unwrap_or("");
    Some(match cmd {
        "agent" => Command::SetMode(Mode::Agent),
        "chatbot" | "chat" => Command::SetMode(Mode::Chatbot),
        "yes" | "y" | "execute" => Command::Confirm,
        "no" | "n" | "cancel" => Command::Cancel,
        "history" => Command::Query(Query::History),
        "sysinfo" | "system-info" => Command::Query(Query::SystemInfo),
        "processes" | "ps" => Command::Query(Query::Processes),
        "suggestions" => Command::Query(Query::Suggestions),
        "rollback" => Command::Query(Query::Rollback),
        "ts" => Command::Timestamps,
        "help" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    })
}

const HELP: &str = "\
Enter submit · Tab switch mode · Ctrl+Y execute · Ctrl+N cancel · PgUp/PgDn scroll · Esc quit
/agent  /chatbot  /yes  /no  /history  /sysinfo  /processes  /suggestions  /rollback  /ts  /quit";

pub fn empty_hint(mode: Mode) -> &'static str {
    match mode {
        Mode::Agent => "Type a task to execute and I'll help you accomplish it safely.",
        Mode::Chatbot => "Ask me anything! I'm here to chat and provide information.",
    }
}

pub fn placeholder(state: &AppState) -> &'static str {
    if !state.convo.is_connected() {
        "Waiting for backend connection..."
    } else {
        match state.convo.mode() {
            Mode::Agent => "Type your task...",
            Mode::Chatbot => "Ask me anything...",
        }
    }
}

// ── AppState ──────────────────────────────────────────────────────────────────

pub struct AppState {
    pub convo: Conversation,
    pub input: String,
    pub cursor: usize, // byte offset in input
    pub scroll: usize, // lines scrolled up in history
    pub spinner_tick: u32,
    pub show_timestamps: bool,
    pub profile: String,
    pub base_url: String,
    /// Auxiliary queries still running
    pub queries_in_flight: usize,
}

impl AppState {
    pub fn new(resolved: &ResolvedConfig, show_timestamps: bool) -> Self {
        Self {
            convo: Conversation::new(resolved.mode),
            input: String::new(),
            cursor: 0,
            scroll: 0,
            spinner_tick: 0,
            show_timestamps,
            profile: resolved.profile_name.clone(),
            base_url: resolved.base_url.clone(),
            queries_in_flight: 0,
        }
    }

    fn apply_event(&mut self, ev: UiEvent) {
        match ev {
            UiEvent::TurnDone { req, outcome } => {
                self.convo.finish_turn(req, outcome);
            }
            UiEvent::QueryDone { query, outcome } => {
                self.queries_in_flight = self.queries_in_flight.saturating_sub(1);
                match outcome {
                    Ok(value) => self
                        .convo
                        .record_system(format!("{}:\n{}", query.label(), pretty_json(&value))),
                    Err(e) => self.convo.record_error(format!("{} failed: {e}", query.label())),
                }
            }
        }
        self.scroll = 0; // auto-scroll to bottom on new content
    }

    fn take_input(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.input)
    }
}

// ── Terminal setup / teardown ─────────────────────────────────────────────────

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) {
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
}

// ── Main TUI run loop ─────────────────────────────────────────────────────────

pub async fn run(resolved: ResolvedConfig, show_timestamps: bool) -> Result<()> {
    let mut terminal = setup_terminal()?;

    // Panic hook: restore terminal before printing panic
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        orig_hook(info);
    }));

    let result = event_loop(&mut terminal, resolved, show_timestamps).await;

    restore_terminal(&mut terminal);
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    resolved: ResolvedConfig,
    show_timestamps: bool,
) -> Result<()> {
    let client = Arc::new(Client::new(
        resolved.base_url.clone(),
        resolved.request_timeout,
        resolved.health_timeout,
    ));
    let monitor = MonitorHandle::spawn(client.clone(), resolved.health_interval);
    let mut conn_rx = monitor.subscribe();

    let mut state = AppState::new(&resolved, show_timestamps);
    info!(base_url = %resolved.base_url, mode = %resolved.mode, "session started");

    // Channel: spawned turns/queries → main loop
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();

    let mut crossterm_events = EventStream::new();
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_millis(120));

    terminal.draw(|f| render::draw(f, &state))?;

    loop {
        tokio::select! {
            // ── Animation tick ────────────────────────────────────────────────
            _ = ticker.tick() => {
                if state.convo.is_busy() || state.queries_in_flight > 0 {
                    state.spinner_tick = state.spinner_tick.wrapping_add(1);
                    terminal.draw(|f| render::draw(f, &state))?;
                }
            }

            // ── Connectivity ──────────────────────────────────────────────────
            Ok(()) = conn_rx.changed() => {
                let connected = *conn_rx.borrow_and_update();
                state.convo.set_connected(connected);
                terminal.draw(|f| render::draw(f, &state))?;
            }

            // ── Drain results from spawned tasks ──────────────────────────────
            Some(ev) = ui_rx.recv() => {
                state.apply_event(ev);
                terminal.draw(|f| render::draw(f, &state))?;
            }

            // ── Keyboard/resize events ────────────────────────────────────────
            Some(Ok(ev)) = crossterm_events.next() => {
                if let Event::Key(key) = ev {
                    if key.kind == KeyEventKind::Press
                        && !handle_key(key, &mut state, &client, &ui_tx)
                    {
                        break;
                    }
                }
                terminal.draw(|f| render::draw(f, &state))?;
            }
        }
    }

    monitor.stop();
    Ok(())
}

// ── Intent dispatch ───────────────────────────────────────────────────────────

fn spawn_turn(req: TurnRequest, client: &Arc<Client>, tx: &mpsc::UnboundedSender<UiEvent>) {
    let client = client.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let outcome = run_turn(client.as_ref(), &req).await;
        let _ = tx.send(UiEvent::TurnDone { req, outcome });
    });
}

fn spawn_query(query: Query, state: &mut AppState, client: &Arc<Client>, tx: &mpsc::UnboundedSender<UiEvent>) {
    state.queries_in_flight += 1;
    let client = client.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let outcome = query.run(client.as_ref()).await;
        let _ = tx.send(UiEvent::QueryDone { query, outcome });
    });
}

fn confirm(state: &mut AppState, client: &Arc<Client>, tx: &mpsc::UnboundedSender<UiEvent>) {
    if let Some(req) = state.convo.begin_confirm() {
        spawn_turn(req, client, tx);
    }
}

fn switch_mode(state: &mut AppState, mode: Mode) {
    if state.convo.mode() != mode && state.convo.set_mode(mode) {
        state.convo.record_system(format!("switched to {mode} mode"));
    }
}

/// Returns false when the shell should exit.
fn run_command(
    cmd: Command,
    state: &mut AppState,
    client: &Arc<Client>,
    tx: &mpsc::UnboundedSender<UiEvent>,
) -> bool {
    match cmd {
        Command::SetMode(mode) => switch_mode(state, mode),
        Command::Confirm => confirm(state, client, tx),
        Command::Cancel => {
            state.convo.cancel();
        }
        Command::Query(q) => spawn_query(q, state, client, tx),
        Command::Timestamps => state.show_timestamps = !state.show_timestamps,
        Command::Help => state.convo.record_system(HELP),
        Command::Quit => return false,
        Command::Unknown(name) => state
            .convo
            .record_error(format!("unknown command /{name}, /help lists commands")),
    }
    true
}

fn handle_key(
    key: KeyEvent,
    state: &mut AppState,
    client: &Arc<Client>,
    tx: &mpsc::UnboundedSender<UiEvent>,
) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => return false,
        KeyCode::Char('c') if ctrl => return false,
        KeyCode::Char('y') if ctrl => confirm(state, client, tx),
        KeyCode::Char('n') if ctrl => {
            state.convo.cancel();
        }
        KeyCode::Tab => {
            let next = state.convo.mode().toggled();
            switch_mode(state, next);
        }
        KeyCode::Enter => {
            if let Some(cmd) = parse_command(&state.input) {
                state.take_input();
                return run_command(cmd, state, client, tx);
            }
            // Input is kept when the submission is rejected.
            let input = state.input.clone();
            if let Some(req) = state.convo.begin_submit(&input) {
                state.take_input();
                state.scroll = 0;
                spawn_turn(req, client, tx);
            }
        }
        KeyCode::Backspace => {
            if let Some((idx, _)) = state.input[..state.cursor].char_indices().next_back() {
                state.input.remove(idx);
                state.cursor = idx;
            }
        }
        KeyCode::Delete => {
            if state.cursor < state.input.len() {
                state.input.remove(state.cursor);
            }
        }
        KeyCode::Left => {
            if let Some((idx, _)) = state.input[..state.cursor].char_indices().next_back() {
                state.cursor = idx;
            }
        }
        KeyCode::Right => {
            if let Some(c) = state.input[state.cursor..].chars().next() {
                state.cursor += c.len_utf8();
            }
        }
        KeyCode::Home => state.cursor = 0,
        KeyCode::End => state.cursor = state.input.len(),
        KeyCode::PageUp => state.scroll = state.scroll.saturating_add(10),
        KeyCode::PageDown => state.scroll = state.scroll.saturating_sub(10),
        KeyCode::Char(c) if !ctrl => {
            state.input.insert(state.cursor, c);
            state.cursor += c.len_utf8();
        }
        _ => {}
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("clean my desktop"), None);
        assert_eq!(parse_command("/chatbot"), Some(Command::SetMode(Mode::Chatbot)));
        assert_eq!(parse_command("  /yes "), Some(Command::Confirm));
        assert_eq!(parse_command("/rollback now"), Some(Command::Query(Query::Rollback)));
        assert_eq!(parse_command("/wat"), Some(Command::Unknown("wat".into())));
    }

    #[test]
    fn test_query_results_land_in_log() {
        let resolved = ResolvedConfig::resolve(&crate::config::ConfigFile::default(), None, None, None);
        let mut state = AppState::new(&resolved, false);
        state.queries_in_flight = 2;
        state.apply_event(UiEvent::QueryDone {
            query: Query::Rollback,
            outcome: Ok(serde_json::json!({"success": true})),
        });
        state.apply_event(UiEvent::QueryDone {
            query: Query::History,
            outcome: Err(TransportError::Status { status: 500, body: String::new() }),
        });
        let msgs = state.convo.messages();
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].content.as_text().unwrap().starts_with("rollback:"));
        assert_eq!(
            msgs[1].content.as_text(),
            Some("history failed: HTTP error! status: 500")
        );
        assert_eq!(state.queries_in_flight, 0);
    }

    #[tokio::test]
    async fn test_unknown_command_reports_error() {
        let resolved = ResolvedConfig::resolve(&crate::config::ConfigFile::default(), None, None, None);
        let mut state = AppState::new(&resolved, false);
        let client = Arc::new(Client::new(
            resolved.base_url.clone(),
            resolved.request_timeout,
            resolved.health_timeout,
        ));
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(run_command(Command::Unknown("wat".into()), &mut state, &client, &tx));
        assert_eq!(
            state.convo.messages()[0].content.as_text(),
            Some("unknown command /wat, /help lists commands")
        );
        assert!(!run_command(Command::Quit, &mut state, &client, &tx));
    }

    #[test]
    fn test_placeholder_tracks_connectivity_and_mode() {
        let resolved = ResolvedConfig::resolve(&crate::config::ConfigFile::default(), None, None, None);
        let mut state = AppState::new(&resolved, false);
        assert_eq!(placeholder(&state), "Waiting for backend connection...");
        state.convo.set_connected(true);
        assert_eq!(placeholder(&state), "Type your task...");
        state.convo.set_mode(Mode::Chatbot);
        assert_eq!(placeholder(&state), "Ask me anything...");
    }
}
