//! Filter configuration
//!
//! Mirrors the settings a pipeline filter exposes to its host: which
//! pipelines it applies to, its priority, and where the LangSmith backend
//! lives.

use crate::error::{FilterError, Result};
use reqwest::Url;
use std::env;
use std::fmt;
use std::time::Duration;

pub const API_KEY_ENV: &str = "LANGSMITH_API_KEY";
pub const API_URL_ENV: &str = "LANGSMITH_URL";
pub const PROJECT_ENV: &str = "LANGSMITH_PROJECT";

/// Stand-ins used when the environment does not provide a key or URL.
/// [`FilterConfig::validate`] rejects both.
pub const PLACEHOLDER_API_KEY: &str = "KEY_HERE";
pub const PLACEHOLDER_API_URL: &str = "URL_HERE";

pub const DEFAULT_NAME: &str = "Langsmith Filter";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PENDING_RUN_TTL: Duration = Duration::from_secs(600);

/// How backend calls are issued relative to the hook that triggers them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// The hook awaits the call, bounded by the request timeout.
    Inline,
    /// The call runs on a spawned task and the hook returns immediately.
    #[default]
    Background,
}

#[derive(Clone)]
pub struct FilterConfig {
    /// Shown in LangSmith as `filter:<name>`
    pub name: String,
    /// Pipeline id patterns; `*` matches everything
    pub pipelines: Vec<String>,
    pub priority: i32,
    pub api_url: String,
    pub api_key: String,
    pub project: Option<String>,
    /// Upper bound for a single backend request
    pub timeout: Duration,
    /// Runs left open longer than this are forgotten
    pub pending_run_ttl: Duration,
    pub dispatch: Dispatch,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            pipelines: vec!["*".to_string()],
            priority: 0,
            api_url: PLACEHOLDER_API_URL.to_string(),
            api_key: PLACEHOLDER_API_KEY.to_string(),
            project: None,
            timeout: DEFAULT_TIMEOUT,
            pending_run_ttl: DEFAULT_PENDING_RUN_TTL,
            dispatch: Dispatch::default(),
        }
    }
}

// Keep the API key out of logs
impl fmt::Debug for FilterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterConfig")
            .field("name", &self.name)
            .field("pipelines", &self.pipelines)
            .field("priority", &self.priority)
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("project", &self.project)
            .field("timeout", &self.timeout)
            .field("pending_run_ttl", &self.pending_run_ttl)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

impl FilterConfig {
    /// Builds a configuration from `LANGSMITH_API_KEY`, `LANGSMITH_URL` and
    /// `LANGSMITH_PROJECT`.
    ///
    /// Missing key or URL fall back to placeholders, so the result still has
    /// to go through [`FilterConfig::validate`] before it is usable.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use langsmith_pipeline_filter::FilterConfig;
    ///
    /// let config = FilterConfig::from_env().with_priority(5);
    /// config.validate().expect("LANGSMITH_URL and LANGSMITH_API_KEY must be set");
    /// ```
    pub fn from_env() -> Self {
        Self {
            api_key: env::var(API_KEY_ENV).unwrap_or_else(|_| PLACEHOLDER_API_KEY.to_string()),
            api_url: env::var(API_URL_ENV).unwrap_or_else(|_| PLACEHOLDER_API_URL.to_string()),
            project: env::var(PROJECT_ENV).ok().filter(|p| !p.is_empty()),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_pipelines(mut self, pipelines: Vec<String>) -> Self {
        self.pipelines = pipelines;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pending_run_ttl(mut self, ttl: Duration) -> Self {
        self.pending_run_ttl = ttl;
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Rejects configurations that could only ever produce failed backend
    /// calls: placeholder or empty key and URL, non-http(s) URLs and a zero
    /// timeout.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() || self.api_key == PLACEHOLDER_API_KEY {
            return Err(FilterError::Config(format!("{API_KEY_ENV} is not set")));
        }
        if self.api_url.trim().is_empty() || self.api_url == PLACEHOLDER_API_URL {
            return Err(FilterError::Config(format!("{API_URL_ENV} is not set")));
        }

        let url = Url::parse(&self.api_url)
            .map_err(|e| FilterError::Config(format!("invalid api url {:?}: {e}", self.api_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FilterError::Config(format!(
                "api url must be http or https, got {:?}",
                url.scheme()
            )));
        }

        if self.timeout.is_zero() {
            return Err(FilterError::Config("timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Whether the filter should run for the given pipeline id.
    pub fn applies_to(&self, pipeline_id: &str) -> bool {
        self.pipelines.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => pipeline_id.starts_with(prefix),
            None => pattern == pipeline_id,
        })
    }

    /// `{api_url}/runs`, tolerating a trailing slash on the base URL.
    pub fn runs_endpoint(&self) -> String {
        build_runs_endpoint(&self.api_url)
    }
}

/// Builds the runs endpoint for a LangSmith base URL.
///
/// ```rust
/// use langsmith_pipeline_filter::build_runs_endpoint;
///
/// assert_eq!(
///     build_runs_endpoint("https://api.smith.langchain.com/"),
///     "https://api.smith.langchain.com/runs"
/// );
/// ```
pub fn build_runs_endpoint(base_url: &str) -> String {
    let url = base_url.trim_end_matches('/');
    format!("{}/runs", url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> FilterConfig {
        FilterConfig::default()
            .with_api_url("https://api.smith.langchain.com")
            .with_api_key("lsv2_pt_test")
    }

    #[test]
    fn test_defaults() {
        let config = FilterConfig::default();
        assert_eq!(config.name, "Langsmith Filter");
        assert_eq!(config.pipelines, vec!["*"]);
        assert_eq!(config.priority, 0);
        assert_eq!(config.dispatch, Dispatch::Background);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_from_env() {
        env::set_var(API_KEY_ENV, "lsv2_env_key");
        env::set_var(API_URL_ENV, "https://eu.api.smith.langchain.com");
        env::set_var(PROJECT_ENV, "chat-ui");

        let config = FilterConfig::from_env();
        assert_eq!(config.api_key, "lsv2_env_key");
        assert_eq!(config.api_url, "https://eu.api.smith.langchain.com");
        assert_eq!(config.project.as_deref(), Some("chat-ui"));
        assert!(config.validate().is_ok());

        // Unset variables fall back to placeholders which fail validation
        env::remove_var(API_KEY_ENV);
        env::remove_var(API_URL_ENV);
        env::remove_var(PROJECT_ENV);

        let config = FilterConfig::from_env();
        assert_eq!(config.api_key, PLACEHOLDER_API_KEY);
        assert_eq!(config.api_url, PLACEHOLDER_API_URL);
        assert_eq!(config.project, None);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains(API_KEY_ENV));
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let err = valid().with_api_url(PLACEHOLDER_API_URL).validate().unwrap_err();
        assert!(err.to_string().contains(API_URL_ENV));

        assert!(valid().with_api_key("").validate().is_err());
        assert!(valid().with_api_url("ftp://example.com").validate().is_err());
        assert!(valid().with_api_url("not a url").validate().is_err());
        assert!(valid().with_timeout(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_applies_to() {
        let config = FilterConfig::default();
        assert!(config.applies_to("anything"));

        let config = config.with_pipelines(vec!["llama3".to_string(), "gpt-*".to_string()]);
        assert!(config.applies_to("llama3"));
        assert!(config.applies_to("gpt-4o"));
        assert!(!config.applies_to("llama3.1"));
        assert!(!config.applies_to("mistral"));

        let config = config.with_pipelines(Vec::new());
        assert!(!config.applies_to("llama3"));
    }

    #[test]
    fn test_runs_endpoint() {
        assert_eq!(
            valid().runs_endpoint(),
            "https://api.smith.langchain.com/runs"
        );
        assert_eq!(
            build_runs_endpoint("http://localhost:1984/api/"),
            "http://localhost:1984/api/runs"
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("lsv2_pt_test"));
        assert!(rendered.contains("<redacted>"));
    }
}
