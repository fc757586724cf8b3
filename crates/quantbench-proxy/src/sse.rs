use serde_json::{json, Value};

/// Terminal line of a backend event stream. Never parsed as JSON.
pub const DONE_SENTINEL: &str = "data: [DONE]";

const DATA_PREFIX: &str = "data: ";

/// Parse one Server-Sent Event line into its JSON payload. Blank
/// lines, the `[DONE]` sentinel, non-data lines, and malformed
/// payloads all yield `None`.
pub fn parse_sse_line(line: &str) -> Option<Value> {
    let line = line.trim();
    if line.is_empty() || line == DONE_SENTINEL {
        return None;
    }
    let payload = line.strip_prefix(DATA_PREFIX)?;
    serde_json::from_str(payload).ok()
}

/// The two completion endpoints the proxy fronts. They differ only in
/// where incremental text lives and in the response object shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Chat,
    Completion,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Chat => "/v1/chat/completions",
            Endpoint::Completion => "/v1/completions",
        }
    }

    fn object_name(&self) -> &'static str {
        match self {
            Endpoint::Chat => "chat.completion",
            Endpoint::Completion => "text_completion",
        }
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            Endpoint::Chat => "chatcmpl-",
            Endpoint::Completion => "cmpl-",
        }
    }
}

/// Accumulates one backend event stream into the pieces needed to
/// synthesize a single non-streaming response. Local to one request.
#[derive(Debug)]
pub struct StreamCollector {
    endpoint: Endpoint,
    content: String,
    finish_reason: Option<String>,
}

impl StreamCollector {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            content: String::new(),
            finish_reason: None,
        }
    }

    /// Fold one stream line into the collector: text fragments append
    /// in order, the last non-null finish reason wins.
    pub fn push_line(&mut self, line: &str) {
        let Some(data) = parse_sse_line(line) else {
            return;
        };
        let Some(choices) = data.get("choices").and_then(Value::as_array) else {
            return;
        };
        for choice in choices {
            let fragment = match self.endpoint {
                Endpoint::Chat => choice.pointer("/delta/content"),
                Endpoint::Completion => choice.get("text"),
            };
            if let Some(text) = fragment.and_then(Value::as_str) {
                self.content.push_str(text);
            }
            if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                self.finish_reason = Some(reason.to_string());
            }
        }
    }

    /// Synthesize the complete non-streaming response. Token counts
    /// cannot be recovered from the stream, so usage is reported as
    /// the -1 sentinel rather than omitted.
    pub fn into_response_body(self, model: &str) -> Value {
        let created = chrono::Utc::now().timestamp();
        let id = format!("{}{}", self.endpoint.id_prefix(), created);
        let finish_reason = self.finish_reason.unwrap_or_else(|| "stop".to_string());
        let choice = match self.endpoint {
            Endpoint::Chat => json!({
                "index": 0,
                "message": {"role": "assistant", "content": self.content},
                "finish_reason": finish_reason,
            }),
            Endpoint::Completion => json!({
                "index": 0,
                "text": self.content,
                "finish_reason": finish_reason,
            }),
        };
        json!({
            "id": id,
            "object": self.endpoint.object_name(),
            "created": created,
            "model": model,
            "choices": [choice],
            "usage": {
                "prompt_tokens": -1,
                "completion_tokens": -1,
                "total_tokens": -1,
            },
        })
    }
}
