/// Ratatui draw entry-point for deskpilot.
/// Thin dispatcher; history rendering lives in chat.rs.
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

use super::chat::spinner_glyph;
use super::{AppState, placeholder};
use crate::conversation::Phase;
use crate::protocol::Mode;

pub fn draw(f: &mut Frame, state: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Min(0),    // history
            Constraint::Length(1), // status bar
            Constraint::Length(3), // input box
        ])
        .split(f.area());

    draw_header(f, state, chunks[0]);
    super::chat::draw_history(f, state, chunks[1]);
    draw_status_bar(f, state, chunks[2]);
    draw_input(f, state, chunks[3]);
}

// ── Header ────────────────────────────────────────────────────────────────────

fn mode_color(mode: Mode) -> Color {
    match mode {
        Mode::Agent => Color::Rgb(255, 180, 80),
        Mode::Chatbot => Color::Rgb(100, 180, 220),
    }
}

fn draw_header(f: &mut Frame, state: &AppState, area: Rect) {
    let connected = state.convo.is_connected();
    let (dot, conn_label, conn_color) = if connected {
        ("●", "connected", Color::Green)
    } else {
        ("○", "offline", Color::Red)
    };
    let mode = state.convo.mode();

    let line = Line::from(vec![
        Span::raw(" "),
        Span::styled("▲ deskpilot", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(state.profile.clone(), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled("  ·  ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{mode} mode"),
            Style::default().fg(mode_color(mode)).add_modifier(Modifier::BOLD),
        ),
        Span::styled("  ·  ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{dot} {conn_label}"), Style::default().fg(conn_color)),
        Span::styled(format!("  {}", state.base_url), Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("  v{} · {}", env!("CARGO_PKG_VERSION"), std::env::consts::OS),
            Style::default().fg(Color::Rgb(60, 55, 90)),
        ),
    ]);

    f.render_widget(
        Paragraph::new(line).style(Style::default().bg(Color::Rgb(6, 6, 12))),
        area,
    );
}

// ── Status bar ────────────────────────────────────────────────────────────────

fn draw_status_bar(f: &mut Frame, state: &AppState, area: Rect) {
    let convo = &state.convo;
    let mut spans = vec![Span::raw(" ")];

    match convo.phase() {
        Phase::Submitting => {
            spans.push(Span::styled(
                format!("{} waiting for backend…", spinner_glyph(state.spinner_tick)),
                Style::default().fg(Color::Cyan),
            ));
        }
        Phase::AwaitingConfirmation if convo.can_confirm() => {
            spans.push(Span::styled(
                "◇ awaiting confirmation",
                Style::default().fg(Color::Rgb(220, 160, 0)).add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(
                "  Ctrl+Y execute · Ctrl+N cancel",
                Style::default().fg(Color::Rgb(100, 80, 30)),
            ));
        }
        _ => {
            spans.push(Span::styled(
                "Tab switch mode · /help commands · PgUp/PgDn scroll · Esc quit",
                Style::default().fg(Color::Rgb(55, 50, 90)),
            ));
        }
    }

    if state.queries_in_flight > 0 {
        spans.push(Span::styled(
            format!("  {} {} quer{}", spinner_glyph(state.spinner_tick), state.queries_in_flight,
                if state.queries_in_flight == 1 { "y" } else { "ies" }),
            Style::default().fg(Color::DarkGray),
        ));
    }
    if state.scroll > 0 {
        spans.push(Span::styled(
            format!("  ↑{}", state.scroll),
            Style::default().fg(Color::DarkGray),
        ));
    }

    f.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(10, 10, 18))),
        area,
    );
}

// ── Input box ─────────────────────────────────────────────────────────────────

fn draw_input(f: &mut Frame, state: &AppState, area: Rect) {
    let convo = &state.convo;
    let editable = convo.is_connected() && !convo.is_busy();
    let (border_color, prompt_color, prompt_char) = if convo.is_busy() {
        (Color::Rgb(40, 40, 60), Color::DarkGray, "·")
    } else if !convo.is_connected() {
        (Color::Rgb(120, 40, 40), Color::Red, "○")
    } else if convo.can_confirm() {
        (Color::Rgb(200, 140, 0), Color::Rgb(220, 160, 0), "◇")
    } else {
        (Color::Rgb(60, 60, 80), mode_color(convo.mode()), "❯")
    };

    let prompt_span = Span::styled(
        format!("  {prompt_char} "),
        Style::default().fg(prompt_color).add_modifier(Modifier::BOLD),
    );

    let content_span = if state.input.is_empty() {
        Span::styled(placeholder(state), Style::default().fg(Color::Rgb(70, 70, 90)))
    } else {
        Span::styled(state.input.clone(), Style::default().fg(Color::White))
    };

    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(border_color))
        .style(Style::default().bg(Color::Rgb(8, 8, 14)));

    f.render_widget(
        Paragraph::new(Line::from(vec![prompt_span, content_span]))
            .block(block)
            .wrap(Wrap { trim: false }),
        area,
    );

    if editable {
        // prompt is "  ❯ ", 4 visible columns
        let prompt_width: u16 = 4;
        let before = &state.input[..state.cursor.min(state.input.len())];
        let cursor_x = area.x + prompt_width + before.width() as u16;
        let cursor_y = area.y + 1; // +1 for top border
        if cursor_x < area.x + area.width {
            f.set_cursor_position((cursor_x, cursor_y));
        }
    }
}
