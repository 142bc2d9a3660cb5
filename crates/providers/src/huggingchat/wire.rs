//! JSON shapes exchanged with the conversation endpoints.

use chat_core::{llm::ChatError, GenerationParameters};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::RequestOptions;

#[derive(Debug, Serialize)]
pub struct NewConversation<'a> {
    pub model: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SendBody<'a> {
    pub inputs: String,
    pub parameters: GenerationParameters,
    pub stream: bool,
    pub options: SendOptions<'a>,
}

#[derive(Debug, Serialize)]
pub struct SendOptions<'a> {
    pub id: &'a str,
    pub response_id: &'a str,
    pub is_retry: bool,
    pub use_cache: bool,
    pub web_search_id: &'a str,
}

impl<'a> From<&'a RequestOptions> for SendOptions<'a> {
    fn from(o: &'a RequestOptions) -> Self {
        Self {
            id: &o.id,
            response_id: &o.response_id,
            is_retry: false,
            use_cache: false,
            web_search_id: &o.web_search_id,
        }
    }
}

/// One generated unit from the event stream.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct TokenChunk {
    pub text: String,
    #[serde(default)]
    pub special: bool,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    token: Option<TokenChunk>,
}

/// Reports an application-level `error` field, if the body carries one.
pub fn upstream_error(v: &Value) -> Option<ChatError> {
    let e = v.as_object()?.get("error")?;
    let msg = match e.as_str() {
        Some(s) => s.to_string(),
        None => e.to_string(),
    };
    Some(ChatError::Upstream(msg))
}

pub fn conversation_id(v: &Value) -> Result<String, ChatError> {
    if let Some(e) = upstream_error(v) {
        return Err(e);
    }
    v.get("conversationId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ChatError::Protocol(format!("no conversationId in response: {}", v)))
}

/// Extracts the text of a non-streamed generation.
pub fn generated_text(v: &Value) -> Result<String, ChatError> {
    if let Some(e) = upstream_error(v) {
        return Err(e);
    }
    match v {
        Value::Array(items) => items
            .first()
            .and_then(|first| first.get("generated_text"))
            .and_then(Value::as_str)
            .map(|t| t.trim().to_string())
            .ok_or_else(|| ChatError::Protocol(format!("Response: {}", v))),
        _ => Err(ChatError::Protocol(format!("Response: {}", v))),
    }
}

/// Decodes one line of the event stream. Lines without the `data:` prefix
/// yield `None`.
pub fn decode_line(line: &str) -> Result<Option<TokenChunk>, ChatError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let event: StreamEvent = serde_json::from_str(data)
        .map_err(|e| ChatError::Protocol(format!("{}: {}", e, line)))?;
    match event.token {
        Some(t) => Ok(Some(t)),
        None => Err(ChatError::Protocol(format!("Response: {}", line))),
    }
}
