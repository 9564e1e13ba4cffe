/// UI helpers shared between the TUI and plain-stdout modes.
use crate::conversation::{Message, MessageContent, MessageKind};
use crate::protocol::{ExecutionResult, PlanSummary};

// ── Message glyphs ────────────────────────────────────────────────────────────

pub fn kind_glyph(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::User      => "❯",
        MessageKind::Assistant => "◆",
        MessageKind::Plan      => "≡",
        MessageKind::Result    => "■",
        MessageKind::Error     => "✗",
        MessageKind::System    => "·",
    }
}

pub fn kind_label(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::User      => "you",
        MessageKind::Assistant => "assistant",
        MessageKind::Plan      => "plan",
        MessageKind::Result    => "result",
        MessageKind::Error     => "error",
        MessageKind::System    => "system",
    }
}

// ── Body text ─────────────────────────────────────────────────────────────────

/// Message body as plain lines, without glyph or timestamp.
pub fn message_lines(msg: &Message) -> Vec<String> {
    match &msg.content {
        MessageContent::Text(t) => t.lines().map(str::to_string).collect(),
        MessageContent::Plan(plan) => plan_lines(plan),
        MessageContent::Result(result) => result_lines(result),
    }
}

pub fn result_lines(r: &ExecutionResult) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(message) = &r.message {
        out.extend(message.lines().map(str::to_string));
        if let Some(details) = r.details.as_deref().filter(|d| !d.is_empty()) {
            out.push("technical details:".to_string());
            out.extend(details.lines().map(|l| format!("  {l}")));
        }
    } else {
        out.push(if r.success { "✓ Execution Successful" } else { "✗ Execution Failed" }.to_string());
        if let Some(output) = r.output.as_deref().filter(|o| !o.is_empty()) {
            out.push("output:".to_string());
            out.extend(output.lines().map(|l| format!("  {l}")));
        }
        if let Some(err) = r.error_message.as_deref().filter(|e| !e.is_empty()) {
            out.push("error:".to_string());
            out.extend(err.lines().map(|l| format!("  {l}")));
        }
    }
    if let Some(secs) = r.execution_time {
        out.push(format!("⏱ {secs}s"));
    }
    out
}

pub fn plan_lines(p: &PlanSummary) -> Vec<String> {
    let mut out = vec![
        format!("objective   {}", p.objective),
        format!("plan id     {}", p.plan_id),
        format!("confidence  {:.1}%", p.overall_confidence * 100.0),
        format!("status      {}", p.overall_status.label()),
    ];
    for (i, task) in p.tasks.iter().enumerate() {
        let risk = if task.is_safe() { "safe" } else { "risky" };
        out.push(format!(
            "{}. {}  [{risk} · {:.1}%]",
            i + 1,
            task.description,
            task.confidence_score * 100.0
        ));
        for cmd in &task.commands {
            out.push(format!("     $ {cmd}"));
        }
    }
    out
}

/// Pretty JSON for auxiliary query output.
pub fn pretty_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PlanStatus, PlanTask};

    #[test]
    fn test_result_lines_prefers_conversational_message() {
        let r = ExecutionResult {
            message: Some("All tidy.".into()),
            details: Some("rm a\nrm b".into()),
            success: true,
            output: Some("ignored".into()),
            execution_time: Some(1.4),
            ..Default::default()
        };
        assert_eq!(
            result_lines(&r),
            vec!["All tidy.", "technical details:", "  rm a", "  rm b", "⏱ 1.4s"]
        );
    }

    #[test]
    fn test_result_lines_success_and_failure() {
        let ok = ExecutionResult {
            success: true,
            output: Some("12 files deleted".into()),
            execution_time: Some(1.4),
            ..Default::default()
        };
        assert_eq!(
            result_lines(&ok),
            vec!["✓ Execution Successful", "output:", "  12 files deleted", "⏱ 1.4s"]
        );

        let failed = ExecutionResult {
            error_message: Some("access denied".into()),
            ..Default::default()
        };
        assert_eq!(
            result_lines(&failed),
            vec!["✗ Execution Failed", "error:", "  access denied"]
        );
    }

    #[test]
    fn test_plan_lines() {
        let plan = PlanSummary {
            plan_id: "p1".into(),
            objective: "clean desktop".into(),
            overall_confidence: 0.75,
            overall_status: PlanStatus::Pending,
            tasks: vec![PlanTask {
                description: "delete temp files".into(),
                commands: vec!["del *.tmp".into()],
                confidence_score: 0.5,
            }],
        };
        let lines = plan_lines(&plan);
        assert_eq!(lines[2], "confidence  75.0%");
        assert_eq!(lines[3], "status      Pending");
        assert_eq!(lines[4], "1. delete temp files  [risky · 50.0%]");
        assert_eq!(lines[5], "     $ del *.tmp");
    }
}
