/// Chat history pane rendering: build_items, draw_history, spinner, wrapping.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, List, ListItem},
};
use unicode_width::UnicodeWidthStr;

use super::AppState;
use crate::conversation::{Message, MessageKind};
use crate::ui::{kind_glyph, kind_label, message_lines};

// ── Spinner ────────────────────────────────────────────────────────────────────

pub const SPINNER_GLYPHS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub fn spinner_glyph(tick: u32) -> &'static str {
    SPINNER_GLYPHS[(tick as usize) % SPINNER_GLYPHS.len()]
}

// ── Colours ────────────────────────────────────────────────────────────────────

fn kind_color(kind: MessageKind) -> Color {
    match kind {
        MessageKind::User      => Color::Rgb(160, 140, 255),
        MessageKind::Assistant => Color::Rgb(0, 210, 210),
        MessageKind::Plan      => Color::Yellow,
        MessageKind::Result    => Color::Green,
        MessageKind::Error     => Color::Red,
        MessageKind::System    => Color::DarkGray,
    }
}

fn body_color(msg: &Message, line: &str) -> Color {
    match msg.kind {
        MessageKind::Error => Color::Rgb(255, 120, 120),
        MessageKind::System => Color::DarkGray,
        MessageKind::Result if line.starts_with('✗') => Color::Red,
        MessageKind::Result if line.starts_with('✓') => Color::Green,
        MessageKind::Plan if line.contains("[risky") => Color::Rgb(255, 180, 80),
        _ => Color::Rgb(210, 230, 255),
    }
}

// ── History items builder ──────────────────────────────────────────────────────

pub fn build_items(state: &AppState, term_width: u16) -> Vec<ListItem<'static>> {
    let mut items: Vec<ListItem<'static>> = Vec::new();
    let messages = state.convo.messages();

    if messages.is_empty() {
        items.push(ListItem::new(Line::raw("")));
        items.push(ListItem::new(Line::styled(
            "  Ready to assist you!",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )));
        items.push(ListItem::new(Line::styled(
            format!("  {}", super::empty_hint(state.convo.mode())),
            Style::default().fg(Color::DarkGray),
        )));
        return items;
    }

    // "  ◆ assistant  " label column
    let label_w = 14usize;
    let wrap_width = (term_width as usize).saturating_sub(label_w + 2).max(20);
    let confirm_live = state.convo.can_confirm();
    let last_prompt_id = messages
        .iter()
        .rev()
        .find(|m| m.confirmation.is_some())
        .map(|m| m.id);

    for msg in messages {
        let color = kind_color(msg.kind);
        let label = format!("{} {}", kind_glyph(msg.kind), kind_label(msg.kind));
        let mut first = true;

        for src in message_lines(msg) {
            for w in wrap_text(&src, wrap_width) {
                let fg = body_color(msg, &w);
                let lead = if first {
                    first = false;
                    Span::styled(
                        format!("  {label:<width$}", width = label_w - 2),
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                    )
                } else {
                    Span::raw(" ".repeat(label_w))
                };
                items.push(ListItem::new(Line::from(vec![lead, Span::styled(w, Style::default().fg(fg))])));
            }
        }
        if first {
            // Empty body still gets its label row.
            items.push(ListItem::new(Line::styled(
                format!("  {label}"),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )));
        }

        if let Some(meta) = &msg.confirmation {
            if let Some(summary) = meta.task_summary.as_deref().filter(|s| !s.is_empty()) {
                items.push(ListItem::new(Line::from(vec![
                    Span::raw(" ".repeat(label_w)),
                    Span::styled(format!("summary: {summary}"), Style::default().fg(Color::DarkGray)),
                ])));
            }
            // Controls only on the prompt that is actually armed.
            if meta.can_execute && confirm_live && last_prompt_id == Some(msg.id) {
                items.push(ListItem::new(Line::from(vec![
                    Span::raw(" ".repeat(label_w)),
                    Span::styled(" Ctrl+Y  yes, do it ", Style::default().fg(Color::Black).bg(Color::Green)),
                    Span::raw("  "),
                    Span::styled(" Ctrl+N  not now ", Style::default().fg(Color::White).bg(Color::DarkGray)),
                ])));
            }
        }

        if state.show_timestamps {
            items.push(ListItem::new(Line::from(vec![
                Span::raw(" ".repeat(label_w)),
                Span::styled(msg.timestamp.clone(), Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM)),
            ])));
        }
        items.push(ListItem::new(Line::raw("")));
    }

    if state.convo.is_busy() {
        items.push(ListItem::new(Line::from(vec![
            Span::raw("  "),
            Span::styled(
                format!("{} processing…", spinner_glyph(state.spinner_tick)),
                Style::default().fg(Color::Cyan),
            ),
        ])));
    }

    items
}

pub fn draw_history(f: &mut Frame, state: &AppState, area: Rect) {
    let all_items = build_items(state, area.width);
    let total = all_items.len();
    let visible = area.height as usize;

    let skip = if total > visible {
        (total - visible).saturating_sub(state.scroll)
    } else {
        0
    };

    let sliced: Vec<ListItem<'static>> = all_items.into_iter().skip(skip).collect();
    let list = List::new(sliced)
        .block(Block::default().style(Style::default().bg(Color::Rgb(8, 8, 14))));
    f.render_widget(list, area);
}

// ── Wrapping ───────────────────────────────────────────────────────────────────

/// Greedy word wrap by display width. Leading indentation is kept on the
/// first line; blank input yields one blank line.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![String::new()];
    }
    let indent_len = text.len() - text.trim_start().len();
    let indent = &text[..indent_len];

    let mut lines = Vec::new();
    let mut current = indent.to_string();
    let mut current_width = indent.width();

    for word in text.split_whitespace() {
        let word_width = word.width();
        if current_width == indent.width() && current.trim().is_empty() {
            current.push_str(word);
            current_width += word_width;
        } else if current_width + 1 + word_width <= max_width {
            current.push(' ');
            current.push_str(word);
            current_width += 1 + word_width;
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
            current_width = word_width;
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
