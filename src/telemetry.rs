//! Telemetry: global subscriber setup and the per-request correlation ID.

use std::future::Future;
use std::sync::OnceLock;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use log::LevelFilter;
use thiserror::Error;
use tokio::task_local;
use tracing::{Instrument, Subscriber, subscriber::SetGlobalDefaultError};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, registry::LookupSpan};
use uuid::Uuid;

use crate::config::AppConfig;

/// Header carrying the request correlation ID in both directions.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlation data for the request being served.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// Errors that can occur while initializing global telemetry.
#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Anything but `pretty` logs JSON.
    pub fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("pretty") {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

static SUBSCRIBER_INSTALLED: OnceLock<()> = OnceLock::new();

/// Installs the `log` bridge and the global subscriber. Later calls are no-ops.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }

    LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()?;

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(format_layer(LogFormat::from_config(&config.log_format)));
    tracing::subscriber::set_global_default(subscriber)?;

    let _ = SUBSCRIBER_INSTALLED.set(());
    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn env_filter(configured_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured_level))
}

fn format_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    }
}

/// Runs `future` with `context` as the current request context.
pub async fn scope_request<Fut, R>(context: RequestContext, future: Fut) -> R
where
    Fut: Future<Output = R>,
{
    REQUEST_CONTEXT.scope(context, future).await
}

/// Correlation ID of the request served by the current task.
pub fn current_request_id() -> Option<String> {
    REQUEST_CONTEXT
        .try_with(|context| context.request_id.clone())
        .ok()
}

/// Middleware assigning each request a correlation ID.
///
/// A well-formed incoming `x-request-id` is reused, otherwise a UUID is
/// generated. The ID is scoped for the handler and echoed on the response.
pub async fn trace_context_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| is_valid_request_id(value))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", request_id = %request_id);
    let context = RequestContext {
        request_id: request_id.clone(),
    };
    let mut response = scope_request(context, next.run(request))
        .instrument(span)
        .await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn is_valid_request_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_context_scoping() {
        assert_eq!(current_request_id(), None);

        let seen = scope_request(
            RequestContext {
                request_id: "abc-123".to_string(),
            },
            async { current_request_id() },
        )
        .await;

        assert_eq!(seen.as_deref(), Some("abc-123"));
        assert_eq!(current_request_id(), None);
    }

    #[tokio::test]
    async fn test_middleware_scopes_request_id_for_handlers() {
        use axum::{Router, body::Body, middleware, routing::get};
        use tower::ServiceExt;

        let app = Router::new()
            .route(
                "/",
                get(|| async { current_request_id().unwrap_or_default() }),
            )
            .layer(middleware::from_fn(trace_context_middleware));

        let response = app
            .oneshot(
                axum::http::Request::get("/")
                    .header("x-request-id", "req-7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get(&REQUEST_ID_HEADER).unwrap(), "req-7");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"req-7");
    }

    #[test]
    fn test_request_id_validation() {
        assert!(is_valid_request_id("3f2a-01_b.c"));
        assert!(!is_valid_request_id(""));
        assert!(!is_valid_request_id("has space"));
        assert!(!is_valid_request_id(&"a".repeat(129)));
    }

    #[test]
    fn test_log_format_from_config() {
        assert_eq!(LogFormat::from_config("Pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_config("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_config("xml"), LogFormat::Json);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let config = AppConfig::default();
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }
}
