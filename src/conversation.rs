/// Conversation state machine.
///
/// Owns the message log, the input mode and the single pending confirmation.
/// State transitions are synchronous; the only suspension point is the
/// backend call between `begin_*` and `finish_turn`. Hosts that must stay
/// responsive (the TUI) run that call on a task and feed the outcome back;
/// callers that can await inline use `handle_submit` / `handle_confirm`.
///
/// Per turn:
///   Idle ──submit──▶ Submitting ──confirmation──▶ AwaitingConfirmation
///                        │                          │ confirm │ cancel
///                        ▼                          ▼         ▼
///                      Idle ◀──────── Submitting ◀──┘       Idle
use tracing::{debug, warn};

use crate::client::{Backend, TransportError};
use crate::protocol::{Confirmation, ExecutionResult, Mode, PlanSummary, RawTaskResponse, TaskResponse};

pub const CHATBOT_FALLBACK: &str = "I understand your request. In chatbot mode, I can only provide \
information and suggestions without executing tasks.";
pub const NO_RESPONSE: &str = "No response received";
pub const CANCELLED: &str = "Execution cancelled by user";

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    User,
    Assistant,
    Plan,
    Result,
    Error,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Plan(PlanSummary),
    Result(ExecutionResult),
}

impl MessageContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Attached to the assistant message that asks for confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationMeta {
    pub can_execute: bool,
    pub task_summary: Option<String>,
    pub internal_plan_id: Option<String>,
}

/// One immutable log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: u64,
    pub kind: MessageKind,
    pub content: MessageContent,
    /// Local wall-clock time, display only.
    pub timestamp: String,
    pub confirmation: Option<ConfirmationMeta>,
}

/// The armed confirmation: what the user typed and what the backend proposed.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingExecution {
    pub input: String,
    pub response: Confirmation,
}

// ── Turns ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Submit,
    Confirm,
}

/// A backend call the state machine has committed to. Produced by
/// `begin_submit` / `begin_confirm`, consumed by `finish_turn`.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub kind: TurnKind,
    pub input: String,
    pub auto_execute: bool,
    pub mode: Mode,
}

/// Issue the backend call for a committed turn.
pub async fn run_turn<B: Backend>(
    backend: &B,
    req: &TurnRequest,
) -> Result<RawTaskResponse, TransportError> {
    backend.execute_task(&req.input, req.auto_execute, req.mode).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting,
    AwaitingConfirmation,
}

// ── Conversation ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    mode: Mode,
    pending: Option<PendingExecution>,
    busy: bool,
    connected: bool,
    next_id: u64,
}

impl Conversation {
    pub fn new(mode: Mode) -> Self {
        Self {
            messages: Vec::new(),
            mode,
            pending: None,
            busy: false,
            connected: false,
            next_id: 1,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pending(&self) -> Option<&PendingExecution> {
        self.pending.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn phase(&self) -> Phase {
        if self.busy {
            Phase::Submitting
        } else if self.pending.is_some() {
            Phase::AwaitingConfirmation
        } else {
            Phase::Idle
        }
    }

    /// Mirror of the monitor's flag. Only the monitor's published values
    /// should be fed in here.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn can_submit(&self, input: &str) -> bool {
        !input.trim().is_empty() && !self.busy && self.connected
    }

    /// Execute/cancel controls are live only for an executable confirmation
    /// in agent mode with no turn in flight.
    pub fn can_confirm(&self) -> bool {
        !self.busy
            && self.mode == Mode::Agent
            && self.pending.as_ref().is_some_and(|p| p.response.can_execute)
    }

    /// Mode switches are refused while a turn is in flight. Prior messages and
    /// any pending confirmation are left untouched.
    pub fn set_mode(&mut self, mode: Mode) -> bool {
        if self.busy {
            return false;
        }
        self.mode = mode;
        true
    }

    fn push(&mut self, kind: MessageKind, content: MessageContent, confirmation: Option<ConfirmationMeta>) {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message {
            id,
            kind,
            content,
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            confirmation,
        });
    }

    fn push_text(&mut self, kind: MessageKind, text: impl Into<String>) {
        self.push(kind, MessageContent::Text(text.into()), None);
    }

    /// Append an informational line, e.g. the output of an auxiliary query.
    pub fn record_system(&mut self, text: impl Into<String>) {
        self.push_text(MessageKind::System, text);
    }

    pub fn record_error(&mut self, text: impl Into<String>) {
        self.push_text(MessageKind::Error, text);
    }

    // ── Submit ────────────────────────────────────────────────────────────────

    /// Guard, log the user's text and enter Submitting. Returns `None` (and
    /// changes nothing) for blank input, a turn in flight, or no connectivity.
    pub fn begin_submit(&mut self, input: &str) -> Option<TurnRequest> {
        if !self.can_submit(input) {
            debug!(busy = self.busy, connected = self.connected, "submission rejected");
            return None;
        }
        self.push_text(MessageKind::User, input);
        self.busy = true;
        Some(TurnRequest {
            kind: TurnKind::Submit,
            input: input.to_string(),
            auto_execute: false,
            mode: self.mode,
        })
    }

    // ── Confirm / cancel ──────────────────────────────────────────────────────

    /// Commit to executing the pending plan. No-op unless `can_confirm`.
    pub fn begin_confirm(&mut self) -> Option<TurnRequest> {
        if !self.can_confirm() {
            return None;
        }
        let pending = self.pending.as_ref()?;
        let req = TurnRequest {
            kind: TurnKind::Confirm,
            input: pending.input.clone(),
            auto_execute: true,
            mode: self.mode,
        };
        self.busy = true;
        Some(req)
    }

    /// Drop the pending plan without calling the backend. Like confirm, only
    /// live in agent mode.
    pub fn cancel(&mut self) -> bool {
        if self.busy || self.mode != Mode::Agent || self.pending.is_none() {
            return false;
        }
        self.pending = None;
        self.push_text(MessageKind::System, CANCELLED);
        true
    }

    // ── Completion ────────────────────────────────────────────────────────────

    /// Apply the outcome of a committed turn. Always returns to Idle (or to
    /// AwaitingConfirmation when a new confirmation was armed).
    pub fn finish_turn(&mut self, req: TurnRequest, outcome: Result<RawTaskResponse, TransportError>) {
        match req.kind {
            TurnKind::Submit => self.finish_submit(req, outcome),
            TurnKind::Confirm => self.finish_confirm(outcome),
        }
        self.busy = false;
    }

    fn finish_submit(&mut self, req: TurnRequest, outcome: Result<RawTaskResponse, TransportError>) {
        let raw = match outcome {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "task request failed");
                self.push_text(MessageKind::Error, format!("Error: {e}"));
                return;
            }
        };

        if req.mode == Mode::Chatbot {
            let text = raw.chat_text().unwrap_or(CHATBOT_FALLBACK).to_string();
            self.push_text(MessageKind::Assistant, text);
            return;
        }

        match TaskResponse::classify(raw) {
            TaskResponse::Confirmation(confirmation) => {
                let meta = ConfirmationMeta {
                    can_execute: confirmation.can_execute,
                    task_summary: confirmation.task_summary.clone(),
                    internal_plan_id: confirmation.internal_plan_id.clone(),
                };
                self.push(
                    MessageKind::Assistant,
                    MessageContent::Text(confirmation.message.clone()),
                    Some(meta),
                );
                if let Some(plan) = &confirmation.plan {
                    self.push(MessageKind::Plan, MessageContent::Plan(plan.clone()), None);
                }
                self.pending = Some(PendingExecution {
                    input: req.input,
                    response: confirmation,
                });
            }
            TaskResponse::Completed(result) => {
                self.push(MessageKind::Result, MessageContent::Result(result), None);
            }
            TaskResponse::Text(text) => {
                self.push_text(MessageKind::Assistant, text);
            }
            TaskResponse::Unrecognized => {
                warn!("backend response matched no known shape");
                self.push_text(MessageKind::Assistant, NO_RESPONSE);
            }
        }
    }

    fn finish_confirm(&mut self, outcome: Result<RawTaskResponse, TransportError>) {
        self.pending = None;
        match outcome {
            Ok(raw) => match raw.execution_result {
                Some(result) => self.push(MessageKind::Result, MessageContent::Result(result), None),
                None => warn!("confirmed execution returned no execution_result"),
            },
            Err(e) => {
                warn!(error = %e, "confirmed execution failed");
                self.push_text(MessageKind::Error, format!("Execution failed: {e}"));
            }
        }
    }

    // ── Inline compositions ───────────────────────────────────────────────────

    /// Full submit turn. Returns `false` if the submission was rejected.
    pub async fn handle_submit<B: Backend>(&mut self, backend: &B, input: &str) -> bool {
        let Some(req) = self.begin_submit(input) else { return false };
        let outcome = run_turn(backend, &req).await;
        self.finish_turn(req, outcome);
        true
    }

    /// Full confirm turn. Returns `false` if there was nothing to confirm.
    pub async fn handle_confirm<B: Backend>(&mut self, backend: &B) -> bool {
        let Some(req) = self.begin_confirm() else { return false };
        let outcome = run_turn(backend, &req).await;
        self.finish_turn(req, outcome);
        true
    }
}
