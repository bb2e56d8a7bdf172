use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// HTTP header name for trace ID
pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Tags every request with a trace ID and runs it inside a span carrying it.
///
/// A well-formed UUID sent by the client in `X-Trace-Id` is reused so a
/// viewer can correlate its own logs; anything else gets a fresh v4 id. The
/// id is stored in request extensions as [`TraceId`] and echoed back in the
/// response header.
pub async fn trace_id_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = incoming_trace_id(request.headers()).unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %request.method(),
        uri = %request.uri(),
    );

    // health probes and the hub upgrade are too chatty for info
    let quiet = matches!(request.uri().path(), "/health" | "/hub");

    request.extensions_mut().insert(TraceId(trace_id.clone()));

    let mut response = async move {
        if quiet {
            tracing::debug!("Request started");
        } else {
            tracing::info!("Request started");
        }
        let response = next.run(request).await;
        if quiet {
            tracing::debug!(status = %response.status(), "Request completed");
        } else {
            tracing::info!(status = %response.status(), "Request completed");
        }
        response
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

fn incoming_trace_id(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(TRACE_ID_HEADER)?.to_str().ok()?;
    Uuid::parse_str(raw.trim()).ok().map(|id| id.to_string())
}

/// Extension type for storing trace ID in request extensions
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
