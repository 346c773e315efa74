use http::header::HeaderValue;
use http::Extensions;
use opentelemetry::trace::{Span, SpanKind, Status, Tracer};
use opentelemetry::{global, KeyValue};
use opentelemetry_semantic_conventions::attribute::{
    ERROR_TYPE, HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, URL_FULL,
};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};
use std::time::Instant;

use crate::error::FilterError;

/// Header LangSmith reads the API key from
pub const API_KEY_HEADER: &str = "x-api-key";

const TRACER_NAME: &str = "langsmith-filter";

/// Middleware for calls to the LangSmith backend.
///
/// Adds the `x-api-key` header to every request and records each call as an
/// OpenTelemetry client span, so a slow or failing tracing backend shows up
/// in the host's own telemetry.
#[derive(Clone)]
pub struct LangSmithMiddleware {
    api_key: HeaderValue,
}

impl LangSmithMiddleware {
    pub fn new(api_key: &str) -> std::result::Result<Self, FilterError> {
        let mut api_key = HeaderValue::from_str(api_key)
            .map_err(|e| FilterError::Config(format!("api key is not a valid header value: {e}")))?;
        api_key.set_sensitive(true);
        Ok(Self { api_key })
    }

    fn operation_name(method: &str, path: &str) -> String {
        // Collapse /runs/{id} so span names stay low-cardinality
        let route = match path.rfind("/runs/") {
            Some(idx) => format!("{}/runs/{{id}}", &path[..idx]),
            None => path.to_string(),
        };
        format!("LangSmith {} {}", method, route)
    }
}

#[async_trait::async_trait]
impl Middleware for LangSmithMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let tracer = global::tracer(TRACER_NAME);
        let start_time = Instant::now();

        req.headers_mut()
            .insert(API_KEY_HEADER, self.api_key.clone());

        let method = req.method().to_string();
        let path = req.url().path().to_string();

        let mut span = tracer
            .span_builder(Self::operation_name(&method, &path))
            .with_kind(SpanKind::Client)
            .with_attributes(vec![
                KeyValue::new(HTTP_REQUEST_METHOD, method.clone()),
                KeyValue::new(URL_FULL, req.url().to_string()),
            ])
            .start(&tracer);

        let response = next.run(req, extensions).await;

        match &response {
            Ok(res) => {
                let status = res.status();
                span.set_attribute(KeyValue::new(
                    HTTP_RESPONSE_STATUS_CODE,
                    status.as_u16() as i64,
                ));
                if status.is_success() {
                    span.set_status(Status::Ok);
                } else {
                    span.set_status(Status::error(format!("HTTP {}", status)));
                    span.set_attribute(KeyValue::new(ERROR_TYPE, status.as_u16().to_string()));
                }
                tracing::debug!(%method, %path, status = status.as_u16(), "langsmith call finished");
            }
            Err(e) => {
                span.set_status(Status::error(format!("Request failed: {}", e)));
                span.set_attribute(KeyValue::new(ERROR_TYPE, e.to_string()));
                tracing::debug!(%method, %path, error = %e, "langsmith call failed");
            }
        }

        let duration_ms = start_time.elapsed().as_millis() as i64;
        span.set_attribute(KeyValue::new("duration_ms", duration_ms));
        span.end();

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_name() {
        assert_eq!(
            LangSmithMiddleware::operation_name("POST", "/runs"),
            "LangSmith POST /runs"
        );
        assert_eq!(
            LangSmithMiddleware::operation_name(
                "PATCH",
                "/api/v1/runs/67e5504410b1426f9247bb680e5fe0c8"
            ),
            "LangSmith PATCH /api/v1/runs/{id}"
        );
    }

    #[test]
    fn test_rejects_invalid_api_key() {
        assert!(LangSmithMiddleware::new("lsv2_pt_ok").is_ok());
        assert!(matches!(
            LangSmithMiddleware::new("bad\nkey"),
            Err(FilterError::Config(_))
        ));
    }

    #[test]
    fn test_api_key_is_sensitive() {
        let middleware = LangSmithMiddleware::new("lsv2_pt_ok").unwrap();
        assert!(middleware.api_key.is_sensitive());
    }
}
