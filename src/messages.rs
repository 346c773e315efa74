//! Helpers for pulling message content out of chat bodies

use serde_json::Value;
use std::fmt;

/// Author role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the last message in `messages` authored by `role`.
pub fn get_last_message_by_role(messages: &[Value], role: Role) -> Option<&Value> {
    messages
        .iter()
        .rev()
        .find(|message| message.get("role").and_then(Value::as_str) == Some(role.as_str()))
}

/// Text content of a single message.
///
/// Plain string content is returned as is. For multi-part content the text
/// of the first `"text"` part wins; image and other parts are ignored.
pub fn message_content(message: &Value) -> Option<&str> {
    match message.get("content")? {
        Value::String(text) => Some(text),
        Value::Array(parts) => parts
            .iter()
            .find(|part| part.get("type").and_then(Value::as_str) == Some("text"))
            .and_then(|part| part.get("text"))
            .and_then(Value::as_str),
        _ => None,
    }
}

/// Content of the last user message, if any.
pub fn get_last_user_message(messages: &[Value]) -> Option<&str> {
    get_last_message_by_role(messages, Role::User).and_then(message_content)
}

/// Content of the last assistant message, if any.
pub fn get_last_assistant_message(messages: &[Value]) -> Option<&str> {
    get_last_message_by_role(messages, Role::Assistant).and_then(message_content)
}
