//! LangSmith run payloads
//!
//! A run is reported in two halves: a [`RunCreate`] posted when the user
//! message comes in and a [`RunUpdate`] patched onto it once the assistant
//! has answered. The run id is the only thing joining the two.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Kind of run as understood by LangSmith
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    Llm,
    Chain,
    Tool,
    Retriever,
    Embedding,
    Prompt,
    Parser,
}

/// Renders a run id the way both `POST /runs` and `PATCH /runs/{id}` expect it.
pub fn run_id_hex(run_id: &Uuid) -> String {
    run_id.simple().to_string()
}

/// Current UTC time as ISO-8601, e.g. `2024-12-12T10:00:00.123456+00:00`.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Body of `POST /runs`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunCreate {
    pub id: String,
    pub name: String,
    pub run_type: RunType,
    pub inputs: Value,
    pub start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,
    /// LangSmith project the run is filed under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
}

impl RunCreate {
    pub fn new(run_id: Uuid, name: impl Into<String>, run_type: RunType, inputs: Value) -> Self {
        Self {
            id: run_id_hex(&run_id),
            name: name.into(),
            run_type,
            inputs,
            start_time: now_iso8601(),
            parent_run_id: None,
            session_name: None,
        }
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_run_id = Some(run_id_hex(&parent_id));
        self
    }

    pub fn with_session_name(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = Some(session_name.into());
        self
    }
}

/// Body of `PATCH /runs/{id}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunUpdate {
    pub outputs: Value,
    pub end_time: String,
}

impl RunUpdate {
    pub fn new(outputs: Value) -> Self {
        Self {
            outputs,
            end_time: now_iso8601(),
        }
    }
}

/// Who asked and where, attached to the run inputs.
///
/// Missing values are sent as `null` rather than dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetadata {
    pub user_name: Option<Value>,
    pub user_id: Option<Value>,
    pub user_email: Option<Value>,
    pub chat_id: Option<Value>,
    pub model: Option<Value>,
}

impl RunMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks `id`, `name` and `email` off the pipeline user object.
    pub fn with_user(mut self, user: Option<&Value>) -> Self {
        if let Some(user) = user {
            self.user_id = user.get("id").cloned();
            self.user_name = user.get("name").cloned();
            self.user_email = user.get("email").cloned();
        }
        self
    }

    pub fn with_chat_id(mut self, chat_id: Option<&Value>) -> Self {
        self.chat_id = chat_id.cloned();
        self
    }

    pub fn with_model(mut self, model: Option<&Value>) -> Self {
        self.model = model.cloned();
        self
    }
}

/// `inputs` of an llm run started by the filter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunInputs<'a> {
    pub input: &'a str,
    pub metadata: RunMetadata,
}

/// `outputs` of an llm run completed by the filter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutputs<'a> {
    pub output: &'a str,
    pub model: Option<Value>,
}
