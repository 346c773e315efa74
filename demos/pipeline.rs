//! Runs one chat turn through the filter against a real LangSmith backend.
//!
//! Expects LANGSMITH_URL and LANGSMITH_API_KEY (optionally LANGSMITH_PROJECT),
//! e.g. from a `.env` file. If OTEL_EXPORTER_OTLP_ENDPOINT is set, the spans
//! recorded around the backend calls are exported there as well.

use dotenv::dotenv;
use langsmith_pipeline_filter::{Dispatch, FilterConfig, TraceFilter};
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use serde_json::json;
use std::error::Error;
use tracing::info;

fn setup_otlp(endpoint: String) -> Result<(), Box<dyn Error>> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(opentelemetry_sdk::Resource::new(vec![
            opentelemetry::KeyValue::new("service.name", "langsmith-pipeline-demo"),
        ]))
        .build();

    global::set_tracer_provider(tracer_provider);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("langsmith_pipeline_filter=debug".parse()?),
        )
        .init();

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        setup_otlp(endpoint)?;
    }

    // Inline so the process does not exit before the calls are made
    let config = FilterConfig::from_env().with_dispatch(Dispatch::Inline);
    info!(?config, "starting filter");
    let filter = TraceFilter::new(config)?;

    let user = json!({"id": "demo-user", "name": "Demo", "email": "demo@example.com"});
    let request = json!({
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "What is the capital of France?"},
        ],
        "chat_id": "demo-chat",
        "model": "llama3",
    });
    let request = filter.inlet(request, Some(&user)).await;
    info!(body = %request, "inlet returned");

    // Stand-in for the model call
    let mut messages = request["messages"].as_array().cloned().unwrap_or_default();
    messages.push(json!({"role": "assistant", "content": "Paris."}));
    let response = json!({
        "messages": messages,
        "chat_id": "demo-chat",
        "model": "llama3",
    });

    let response = filter.outlet(response, Some(&user)).await;
    info!(body = %response, "outlet returned");

    global::shutdown_tracer_provider();
    Ok(())
}
