/// Wire types for the task-automation backend.
///
/// `/api/execute` answers with a loosely shaped JSON object whose meaning is
/// decided by field presence. `RawTaskResponse` accepts anything the backend
/// sends; `TaskResponse::classify` reduces it to a closed set of shapes so the
/// rest of the crate never probes fields ad hoc.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

// ── Lenient field decoding ────────────────────────────────────────────────────

/// A field of the wrong JSON type reads as absent instead of failing the
/// whole body.
fn lenient<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_or_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(de)?.unwrap_or_default())
}

// ── Mode ──────────────────────────────────────────────────────────────────────

/// Operating mode sent with every execute request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The backend may propose actions and, once confirmed, execute them.
    #[default]
    Agent,
    /// Conversation only. Execution is never requested.
    Chatbot,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Agent => "agent",
            Mode::Chatbot => "chatbot",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Mode::Agent => Mode::Chatbot,
            Mode::Chatbot => Mode::Agent,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "agent" => Ok(Mode::Agent),
            "chatbot" | "chat" => Ok(Mode::Chatbot),
            other => Err(format!("unknown mode '{other}' (expected agent or chatbot)")),
        }
    }
}

// ── Requests ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteRequest {
    pub input: String,
    pub auto_execute: bool,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceRequest {
    pub audio_data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    pub image_data: String,
}

// ── Execution result ──────────────────────────────────────────────────────────

/// Payload of a finished execution. Fields not consumed for display are kept
/// in `extra` so nothing the backend sent is lost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Conversational summary; when present it replaces the success/output view.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Seconds.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Plan ──────────────────────────────────────────────────────────────────────

/// Tasks at or below this confidence are flagged as risky.
pub const SAFE_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum PlanStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl From<u8> for PlanStatus {
    fn from(v: u8) -> Self {
        match v {
            1 => PlanStatus::InProgress,
            2 => PlanStatus::Completed,
            3 => PlanStatus::Failed,
            4 => PlanStatus::Cancelled,
            _ => PlanStatus::Pending,
        }
    }
}

impl From<PlanStatus> for u8 {
    fn from(s: PlanStatus) -> Self {
        match s {
            PlanStatus::Pending => 0,
            PlanStatus::InProgress => 1,
            PlanStatus::Completed => 2,
            PlanStatus::Failed => 3,
            PlanStatus::Cancelled => 4,
        }
    }
}

impl PlanStatus {
    pub fn label(self) -> &'static str {
        match self {
            PlanStatus::Pending => "Pending",
            PlanStatus::InProgress => "In Progress",
            PlanStatus::Completed => "Completed",
            PlanStatus::Failed => "Failed",
            PlanStatus::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanTask {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub commands: Vec<String>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub confidence_score: f64,
}

impl PlanTask {
    pub fn is_safe(&self) -> bool {
        self.confidence_score > SAFE_CONFIDENCE
    }
}

/// A backend-proposed set of commands, shown before anything runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub plan_id: String,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub objective: String,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub overall_confidence: f64,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub overall_status: PlanStatus,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub tasks: Vec<PlanTask>,
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// Everything `/api/execute` may send, all optional. Fields of an unexpected
/// type are dropped rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTaskResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub response_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub can_execute: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub task_summary: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub internal_plan_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub execution_result: Option<ExecutionResult>,
    #[serde(default, deserialize_with = "lenient")]
    pub plan: Option<PlanSummary>,
}

impl RawTaskResponse {
    /// Build from any decoded body. A body that is not an object carries no
    /// known field and reads as empty.
    pub fn from_value(value: Value) -> Self {
        if !value.is_object() {
            warn!("response body is not an object");
            return Self::default();
        }
        serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(error = %e, "response body could not be read");
            Self::default()
        })
    }

    /// Non-empty `content`.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|s| !s.is_empty())
    }

    /// Conversational text, `content` before `message`; empty strings count
    /// as absent. Chatbot mode reads only this and never looks at execution
    /// fields.
    pub fn chat_text(&self) -> Option<&str> {
        self.text()
            .or_else(|| self.message.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Confirmation request: the backend wants an explicit go-ahead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Confirmation {
    pub message: String,
    pub can_execute: bool,
    pub task_summary: Option<String>,
    pub internal_plan_id: Option<String>,
    pub plan: Option<PlanSummary>,
}

/// The closed set of response shapes the orchestration layer acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResponse {
    Confirmation(Confirmation),
    Completed(ExecutionResult),
    Text(String),
    /// Matches none of the known shapes.
    Unrecognized,
}

impl TaskResponse {
    /// Agent-mode classification. Order matters: an explicit
    /// `response_type` wins over field presence.
    pub fn classify(raw: RawTaskResponse) -> Self {
        match raw.response_type.as_deref() {
            Some("confirmation") => {
                return TaskResponse::Confirmation(Confirmation {
                    message: raw.message.unwrap_or_default(),
                    can_execute: raw.can_execute.unwrap_or(false),
                    task_summary: raw.task_summary,
                    internal_plan_id: raw.internal_plan_id,
                    plan: raw.plan,
                });
            }
            Some("completed") => {
                return TaskResponse::Completed(raw.execution_result.unwrap_or_default());
            }
            _ => {}
        }
        if let Some(result) = raw.execution_result {
            return TaskResponse::Completed(result);
        }
        // Agent mode only reads `content` for plain answers; a bare `message`
        // without a response_type is not a recognised shape.
        match raw.text() {
            Some(text) => TaskResponse::Text(text.to_string()),
            None => TaskResponse::Unrecognized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> TaskResponse {
        TaskResponse::classify(RawTaskResponse::from_value(v))
    }

    #[test]
    fn test_confirmation_shape() {
        let resp = parse(json!({
            "response_type": "confirmation",
            "message": "I'll delete 12 files, okay?",
            "can_execute": true,
            "task_summary": "delete temp files",
            "internal_plan_id": "p1"
        }));
        let TaskResponse::Confirmation(c) = resp else { panic!("expected confirmation") };
        assert_eq!(c.message, "I'll delete 12 files, okay?");
        assert!(c.can_execute);
        assert_eq!(c.task_summary.as_deref(), Some("delete temp files"));
        assert_eq!(c.internal_plan_id.as_deref(), Some("p1"));
        assert!(c.plan.is_none());
    }

    #[test]
    fn test_completed_without_result_is_empty_result() {
        let resp = parse(json!({"response_type": "completed"}));
        assert_eq!(resp, TaskResponse::Completed(ExecutionResult::default()));
    }

    #[test]
    fn test_execution_result_presence_wins_over_content() {
        let resp = parse(json!({
            "content": "ignored",
            "execution_result": {"success": true, "output": "12 files deleted", "execution_time": 1.4}
        }));
        let TaskResponse::Completed(r) = resp else { panic!("expected completed") };
        assert!(r.success);
        assert_eq!(r.output.as_deref(), Some("12 files deleted"));
        assert_eq!(r.execution_time, Some(1.4));
    }

    #[test]
    fn test_agent_text_reads_content_only() {
        assert_eq!(
            parse(json!({"content": "4", "message": "four"})),
            TaskResponse::Text("4".into())
        );
        assert_eq!(parse(json!({"message": "four"})), TaskResponse::Unrecognized);
    }

    #[test]
    fn test_chat_text_ignores_execution_fields() {
        let raw: RawTaskResponse = serde_json::from_value(json!({
            "response_type": "confirmation",
            "message": "shall I?",
            "execution_result": {"success": true}
        }))
        .unwrap();
        assert_eq!(raw.chat_text(), Some("shall I?"));
        assert_eq!(RawTaskResponse::default().chat_text(), None);
    }

    #[test]
    fn test_empty_strings_count_as_absent() {
        let raw = RawTaskResponse::from_value(json!({"content": "", "message": "hello"}));
        assert_eq!(raw.chat_text(), Some("hello"));
        assert_eq!(RawTaskResponse::from_value(json!({"content": "", "message": ""})).chat_text(), None);
        assert_eq!(parse(json!({"content": ""})), TaskResponse::Unrecognized);
    }

    #[test]
    fn test_mistyped_fields_read_as_absent() {
        let raw = RawTaskResponse::from_value(json!({"content": "4", "execution_result": "n/a"}));
        assert_eq!(raw.chat_text(), Some("4"));
        assert!(raw.execution_result.is_none());
        assert_eq!(TaskResponse::classify(raw), TaskResponse::Text("4".into()));

        let raw = RawTaskResponse::from_value(json!({"content": {"text": "hi"}, "message": "fallback"}));
        assert!(raw.content.is_none());
        assert_eq!(raw.chat_text(), Some("fallback"));

        assert_eq!(RawTaskResponse::from_value(json!(["not", "an", "object"])), RawTaskResponse::default());
        assert_eq!(parse(json!("plain string")), TaskResponse::Unrecognized);
    }

    #[test]
    fn test_off_shape_plan_keeps_confirmation() {
        let resp = parse(json!({
            "response_type": "confirmation",
            "message": "go?",
            "can_execute": true,
            "plan": {"objective": "tidy", "overall_status": "pending", "tasks": [{"confidence_score": "high"}]}
        }));
        let TaskResponse::Confirmation(c) = resp else { panic!("expected confirmation") };
        assert!(c.can_execute);
        let plan = c.plan.expect("plan survives");
        assert_eq!(plan.objective, "tidy");
        assert_eq!(plan.overall_status, PlanStatus::Pending);
        assert_eq!(plan.tasks[0].confidence_score, 0.0);
    }

    #[test]
    fn test_mistyped_execution_result_field_keeps_result() {
        let resp = parse(json!({"execution_result": {"success": true, "output": ["a", "b"], "execution_time": "1s"}}));
        let TaskResponse::Completed(r) = resp else { panic!("expected completed") };
        assert!(r.success);
        assert!(r.output.is_none());
        assert!(r.execution_time.is_none());
    }

    #[test]
    fn test_unknown_shape_is_unrecognized() {
        assert_eq!(parse(json!({"response_type": "text"})), TaskResponse::Unrecognized);
        assert_eq!(parse(json!({})), TaskResponse::Unrecognized);
    }

    #[test]
    fn test_execution_result_keeps_unconsumed_fields() {
        let r: ExecutionResult =
            serde_json::from_value(json!({"success": false, "steps_executed": 3})).unwrap();
        assert!(!r.success);
        assert_eq!(r.extra.get("steps_executed"), Some(&json!(3)));
    }

    #[test]
    fn test_plan_status_and_task_safety() {
        let plan: PlanSummary = serde_json::from_value(json!({
            "plan_id": "p1",
            "objective": "tidy desktop",
            "overall_confidence": 0.9,
            "overall_status": 1,
            "tasks": [
                {"description": "list", "commands": ["dir"], "confidence_score": 0.95},
                {"description": "delete", "commands": ["del *.tmp"], "confidence_score": 0.8}
            ]
        }))
        .unwrap();
        assert_eq!(plan.overall_status, PlanStatus::InProgress);
        assert_eq!(plan.overall_status.label(), "In Progress");
        assert!(plan.tasks[0].is_safe());
        assert!(!plan.tasks[1].is_safe());
    }

    #[test]
    fn test_mode_wire_and_parse() {
        assert_eq!(serde_json::to_value(Mode::Chatbot).unwrap(), json!("chatbot"));
        assert_eq!("Agent".parse::<Mode>(), Ok(Mode::Agent));
        assert!("robot".parse::<Mode>().is_err());
        assert_eq!(Mode::Agent.toggled(), Mode::Chatbot);
    }

    #[test]
    fn test_execute_request_body() {
        let body = serde_json::to_value(ExecuteRequest {
            input: "clean my desktop".into(),
            auto_execute: true,
            mode: Mode::Agent,
        })
        .unwrap();
        assert_eq!(body, json!({"input": "clean my desktop", "auto_execute": true, "mode": "agent"}));
    }
}
