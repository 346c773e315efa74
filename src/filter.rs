//! The pipeline filter itself

use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::{LangSmithClient, RunTransport};
use crate::config::{Dispatch, FilterConfig};
use crate::error::{FilterError, Result};
use crate::messages::{get_last_assistant_message, get_last_user_message, Role};
use crate::pending::{PendingRun, PendingRuns};
use crate::run::{run_id_hex, RunCreate, RunInputs, RunMetadata, RunOutputs, RunType, RunUpdate};

/// Traces chat turns to LangSmith.
///
/// The host calls [`TraceFilter::inlet`] before invoking the model and
/// [`TraceFilter::outlet`] afterwards. Both hooks hand the body back
/// untouched whatever happens to the trace.
pub struct TraceFilter {
    config: FilterConfig,
    transport: Arc<dyn RunTransport>,
    pending: PendingRuns,
}

impl TraceFilter {
    /// Validates `config` and connects to the LangSmith backend it names.
    pub fn new(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        let client = LangSmithClient::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(client)))
    }

    /// Same as [`TraceFilter::new`] with [`FilterConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(FilterConfig::from_env())
    }

    /// Uses the given transport instead of an HTTP client. The backend
    /// URL and key in `config` are not checked.
    pub fn with_transport(config: FilterConfig, transport: Arc<dyn RunTransport>) -> Self {
        let pending = PendingRuns::new(config.pending_run_ttl);
        Self {
            config,
            transport,
            pending,
        }
    }

    pub fn filter_type(&self) -> &'static str {
        "filter"
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn priority(&self) -> i32 {
        self.config.priority
    }

    pub fn pipelines(&self) -> &[String] {
        &self.config.pipelines
    }

    pub fn applies_to(&self, pipeline_id: &str) -> bool {
        self.config.applies_to(pipeline_id)
    }

    /// Number of runs started but not completed yet.
    pub fn pending_runs(&self) -> usize {
        self.pending.len()
    }

    /// Opens a run for the last user message in `body`.
    pub async fn inlet(&self, body: Value, user: Option<&Value>) -> Value {
        debug!(filter = %self.config.name, has_user = user.is_some(), "inlet");
        match self.start_run(&body, user).await {
            Ok(run_id) => debug!(run_id = %run_id_hex(&run_id), "run started"),
            Err(e) => report("inlet", &e),
        }
        body
    }

    /// Completes the open run with the last assistant message in `body`.
    pub async fn outlet(&self, body: Value, user: Option<&Value>) -> Value {
        debug!(filter = %self.config.name, has_user = user.is_some(), "outlet");
        match self.complete_run(&body).await {
            Ok(Some(run_id)) => debug!(run_id = %run_id_hex(&run_id), "run completed"),
            Ok(None) => debug!("no open run for this turn, nothing to complete"),
            Err(e) => report("outlet", &e),
        }
        body
    }

    async fn start_run(&self, body: &Value, user: Option<&Value>) -> Result<Uuid> {
        let messages = messages(body)?;
        let input = get_last_user_message(messages).ok_or(FilterError::MissingMessage(Role::User))?;

        let inputs = RunInputs {
            input,
            metadata: RunMetadata::new()
                .with_user(user)
                .with_chat_id(body.get("chat_id"))
                .with_model(body.get("model")),
        };

        let run_id = Uuid::new_v4();
        let mut run = RunCreate::new(
            run_id,
            format!("filter:{}", self.config.name),
            RunType::Llm,
            serde_json::to_value(&inputs)?,
        );
        if let Some(project) = &self.config.project {
            run = run.with_session_name(project.as_str());
        }

        let chat_id = turn_key(body);
        let pending = PendingRun::new(run_id);

        match self.config.dispatch {
            Dispatch::Inline => {
                self.open(chat_id, pending);
                post_run(self.transport.as_ref(), &run).await?;
            }
            Dispatch::Background => {
                let transport = Arc::clone(&self.transport);
                let start = runtime("inlet")?.spawn(async move {
                    if let Err(e) = post_run(transport.as_ref(), &run).await {
                        report("inlet", &e);
                    }
                });
                self.open(chat_id, pending.with_start(start));
            }
        }

        Ok(run_id)
    }

    async fn complete_run(&self, body: &Value) -> Result<Option<Uuid>> {
        let messages = messages(body)?;
        let output =
            get_last_assistant_message(messages).ok_or(FilterError::MissingMessage(Role::Assistant))?;

        let outputs = RunOutputs {
            output,
            model: body.get("model").cloned(),
        };
        let update = RunUpdate::new(serde_json::to_value(&outputs)?);

        let Some(mut pending) = self.pending.take(turn_key(body).as_deref()) else {
            return Ok(None);
        };
        let run_id = pending.run_id;

        match self.config.dispatch {
            Dispatch::Inline => {
                patch_run(self.transport.as_ref(), &run_id_hex(&run_id), &update).await?;
            }
            Dispatch::Background => {
                let handle = runtime("outlet")?;
                let transport = Arc::clone(&self.transport);
                let start = pending.take_start();
                handle.spawn(async move {
                    // The backend must see the run before its completion
                    if let Some(start) = start {
                        let _ = start.await;
                    }
                    if let Err(e) = patch_run(transport.as_ref(), &run_id_hex(&run_id), &update).await {
                        report("outlet", &e);
                    }
                });
            }
        }

        Ok(Some(run_id))
    }

    fn open(&self, chat_id: Option<String>, run: PendingRun) {
        if let Some(replaced) = self.pending.insert(chat_id.as_deref(), run) {
            info!(
                chat_id = chat_id.as_deref().unwrap_or_default(),
                run_id = %run_id_hex(&replaced.run_id),
                "new turn started before the previous run was completed"
            );
        }
    }
}

/// Runtime to spawn background calls on. Hooks polled outside of tokio
/// skip the call instead of panicking.
fn runtime(hook: &'static str) -> Result<Handle> {
    Handle::try_current().map_err(|_| FilterError::NoRuntime(hook))
}

async fn post_run(transport: &dyn RunTransport, run: &RunCreate) -> Result<()> {
    transport.create_run(run).await?;
    debug!(run_id = %run.id, "run posted");
    Ok(())
}

async fn patch_run(transport: &dyn RunTransport, run_id: &str, update: &RunUpdate) -> Result<()> {
    transport.update_run(run_id, update).await?;
    debug!(run_id, "run patched");
    Ok(())
}

fn messages(body: &Value) -> Result<&[Value]> {
    let body = body
        .as_object()
        .ok_or(FilterError::InvalidBody("expected a JSON object"))?;
    body.get("messages")
        .ok_or(FilterError::InvalidBody("missing messages"))?
        .as_array()
        .map(Vec::as_slice)
        .ok_or(FilterError::InvalidBody("messages is not an array"))
}

/// Identifies the conversation a body belongs to.
fn turn_key(body: &Value) -> Option<String> {
    body.get("chat_id")
        .and_then(Value::as_str)
        .or_else(|| body.pointer("/metadata/chat_id").and_then(Value::as_str))
        .map(str::to_owned)
}

fn report(hook: &'static str, err: &FilterError) {
    if err.is_skip() {
        debug!(hook, reason = %err, "nothing to trace");
    } else if err.is_transport() {
        warn!(hook, error = %err, "failed to report run to langsmith");
    } else {
        error!(hook, error = %err, "tracing failed");
    }
}
