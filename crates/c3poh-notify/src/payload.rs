use serde_json::{Map, Value};

/// Turn an inbound notification body into chat text.
///
/// Shapes are tried in order: a heartbeat object (sibling `result` and
/// `source` keys), a bare JSON string, then a `message` or `text` field.
/// Returns `None` when nothing usable is found.
pub fn normalize(payload: &Value) -> Option<String> {
    let text = match payload {
        Value::Object(obj) if obj.contains_key("result") && obj.contains_key("source") => {
            Some(render_heartbeat(obj))
        }
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => field(obj, "message").or_else(|| field(obj, "text")),
        _ => None,
    };
    text.filter(|t| !t.is_empty())
}

fn field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn render_heartbeat(obj: &Map<String, Value>) -> String {
    let empty = Map::new();
    let result = obj
        .get("result")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let status = result
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let ts = result.get("timestamp").and_then(Value::as_str).unwrap_or("");

    let mut lines = vec![format!(
        "[{}] {} Heartbeat — {}",
        source_label(obj.get("source")),
        status_icon(status),
        ts
    )];
    if let Some(output) = field(result, "output") {
        lines.push(output);
    }
    if let Some(error) = field(result, "error") {
        lines.push(format!("Error: {error}"));
    }
    lines.join("\n")
}

fn status_icon(status: &str) -> &'static str {
    match status {
        "ok" => "✓",
        "alert" => "⚠️",
        "error" => "❌",
        _ => "?",
    }
}

fn source_label(source: Option<&Value>) -> String {
    match source.and_then(Value::as_str).map(str::trim) {
        Some(s) if s.eq_ignore_ascii_case("tinman") => "TinMan".to_string(),
        Some(s) if !s.is_empty() => s.to_string(),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn alert_heartbeat_renders_icon_timestamp_and_output() {
        let text = normalize(&json!({
            "source": "tinman",
            "result": {"status": "alert", "timestamp": "T", "output": "disk low", "error": ""}
        }))
        .unwrap();
        assert_eq!(text, "[TinMan] ⚠️ Heartbeat — T\ndisk low");
    }

    #[test]
    fn heartbeat_error_line_and_unknown_status() {
        let text = normalize(&json!({
            "source": "cron",
            "result": {"status": "weird", "timestamp": "2026-01-01T00:00:00Z", "error": "exit 2"}
        }))
        .unwrap();
        assert_eq!(text, "[cron] ? Heartbeat — 2026-01-01T00:00:00Z\nError: exit 2");
    }

    #[test]
    fn heartbeat_ok_and_error_icons() {
        let ok = normalize(&json!({
            "source": "tinman",
            "result": {"status": "ok", "output": "HEARTBEAT_OK"}
        }))
        .unwrap();
        assert!(ok.starts_with("[TinMan] ✓ Heartbeat"));
        assert!(ok.contains("HEARTBEAT_OK"));

        let err =
            normalize(&json!({"source": "tinman", "result": {"status": "error"}})).unwrap();
        assert!(err.contains("❌"));
    }

    #[test]
    fn heartbeat_wins_over_message_field() {
        let text = normalize(&json!({
            "source": "tinman",
            "result": {"status": "ok"},
            "message": "ignored"
        }))
        .unwrap();
        assert!(text.contains("Heartbeat"));
        assert!(!text.contains("ignored"));
    }

    #[test]
    fn bare_string_is_used_verbatim() {
        assert_eq!(normalize(&json!("hi")).as_deref(), Some("hi"));
        assert_eq!(normalize(&json!("")), None);
    }

    #[test]
    fn message_then_text_field() {
        assert_eq!(
            normalize(&json!({"message": "m", "text": "t"})).as_deref(),
            Some("m")
        );
        assert_eq!(
            normalize(&json!({"message": "", "text": "t"})).as_deref(),
            Some("t")
        );
        assert_eq!(normalize(&json!({"text": "t"})).as_deref(), Some("t"));
    }

    #[test]
    fn nothing_usable_is_none() {
        assert_eq!(normalize(&json!({})), None);
        assert_eq!(normalize(&json!({"message": 42})), None);
        assert_eq!(normalize(&json!([1, 2])), None);
        assert_eq!(normalize(&json!(null)), None);
    }
}
