//! Correlation-id propagation and request logging
//!
//! Note: no tracing span is created here since `TraceLayer` from tower-http
//! already handles span creation.

use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::info;
use uuid::Uuid;

/// Header carrying the caller-supplied correlation id
pub const CORRELATION_ID_HEADER: &str = "Correlation-Id";

/// Correlation id available to handlers via request extensions
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reads the correlation id from the request (generating one when absent),
/// stashes it in extensions, logs the request, and echoes the id on the
/// response.
pub async fn correlation_middleware(mut request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = extract_path(&request);
    let correlation_id = extract_correlation_id(&request);

    request
        .extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    info!(
        method = %method,
        path = %path,
        correlation_id = %correlation_id,
        "Incoming request"
    );

    let mut response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        correlation_id = %correlation_id,
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

fn extract_path(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

fn extract_correlation_id(request: &Request<Body>) -> String {
    request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::HeaderName;

    #[test]
    fn test_extract_correlation_id_from_header() {
        let request = Request::builder()
            .header(
                HeaderName::from_static("correlation-id"),
                "test-correlation",
            )
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_correlation_id(&request), "test-correlation");
    }

    #[test]
    fn test_generates_correlation_id_when_absent() {
        let request = Request::builder().body(Body::empty()).unwrap();

        let generated = extract_correlation_id(&request);
        assert!(!generated.is_empty());
        assert!(Uuid::parse_str(&generated).is_ok());
    }

    #[test]
    fn test_empty_header_is_replaced() {
        let request = Request::builder()
            .header(HeaderName::from_static("correlation-id"), "")
            .body(Body::empty())
            .unwrap();

        assert!(!extract_correlation_id(&request).is_empty());
    }
}
