//! # langsmith-pipeline-filter
//!
//! A chat-pipeline filter that reports every chat turn to LangSmith as a run.
//!
//! The filter sits in front of and behind the model call:
//! - `inlet` picks up the last user message and posts a new `llm` run
//! - `outlet` picks up the last assistant message and patches that run with it
//!
//! Tracing is strictly best-effort. Both hooks return the body they were given,
//! untouched, no matter what happens to the backend calls.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use langsmith_pipeline_filter::{FilterConfig, TraceFilter};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FilterConfig::default()
//!     .with_api_url("https://api.smith.langchain.com")
//!     .with_api_key("lsv2_pt_...");
//! let filter = TraceFilter::new(config)?;
//!
//! let user = json!({"id": "u1", "name": "Ada", "email": "ada@example.com"});
//! let request = json!({
//!     "messages": [{"role": "user", "content": "hi"}],
//!     "chat_id": "c1",
//!     "model": "llama3",
//! });
//! let request = filter.inlet(request, Some(&user)).await;
//!
//! // ... call the model ...
//!
//! let response = json!({
//!     "messages": [{"role": "assistant", "content": "hello back"}],
//!     "chat_id": "c1",
//!     "model": "llama3",
//! });
//! let response = filter.outlet(response, Some(&user)).await;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod filter;
mod middleware;
mod pending;
mod run;

pub mod messages;

// Re-export main types
pub use client::{LangSmithClient, RunTransport};
pub use config::{
    build_runs_endpoint, Dispatch, FilterConfig, API_KEY_ENV, API_URL_ENV, PROJECT_ENV,
    PLACEHOLDER_API_KEY, PLACEHOLDER_API_URL,
};
pub use error::{FilterError, Result};
pub use filter::TraceFilter;
pub use messages::{get_last_assistant_message, get_last_user_message, Role};
pub use middleware::{LangSmithMiddleware, API_KEY_HEADER};
pub use run::{
    now_iso8601, run_id_hex, RunCreate, RunInputs, RunMetadata, RunOutputs, RunType, RunUpdate,
};
