//! Axum middleware applying [`RequestThrottle`] to inbound requests.

use super::{RequestThrottle, ThrottleDecision};
use crate::api::types::GenerateResponse;
use crate::classify::{classify, ErrorInfo};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Client identity used when nothing better is available.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Throttle requests per client, annotating every response with quota headers.
pub async fn throttle_middleware(
    State(throttle): State<Arc<RequestThrottle>>,
    request: Request,
    next: Next,
) -> Response {
    let client_id = resolve_client_id(&request, throttle.trusts_forwarded_headers());

    let decision = throttle.check(&client_id);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        metrics::counter!(crate::metrics::THROTTLED).increment(1);
        tracing::warn!(
            client_id = %client_id,
            retry_after_secs = decision.retry_after.as_secs(),
            "Rate limit exceeded"
        );
        rejection(&decision)
    };

    inject_quota_headers(&decision, response.headers_mut());
    response
}

/// Client identity for throttling: the peer IP, or the forwarding headers
/// when the deployment sits behind a proxy that sets them.
pub fn resolve_client_id(request: &Request, trust_forwarded: bool) -> String {
    let forwarded = if trust_forwarded {
        client_id_from_headers(request.headers())
    } else {
        None
    };
    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}

/// First hop of `X-Forwarded-For`, falling back to `X-Real-IP`.
pub fn client_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn rejection(decision: &ThrottleDecision) -> Response {
    let retry_secs = ceil_secs(decision);
    let base = classify("", Some(StatusCode::TOO_MANY_REQUESTS.as_u16()));
    let info = ErrorInfo {
        message: format!(
            "Too many requests. Try again in {} seconds.",
            retry_secs
        ),
        retry_after: Some(std::time::Duration::from_secs(retry_secs)),
        ..base
    };

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(GenerateResponse::error(&info)),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&retry_secs.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

fn inject_quota_headers(decision: &ThrottleDecision, headers: &mut HeaderMap) {
    let reset_unix = chrono::Utc::now().timestamp() + ceil_secs(decision) as i64;
    let pairs = [
        (RATE_LIMIT_LIMIT_HEADER, decision.limit.to_string()),
        (RATE_LIMIT_REMAINING_HEADER, decision.remaining.to_string()),
        (RATE_LIMIT_RESET_HEADER, reset_unix.to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

fn ceil_secs(decision: &ThrottleDecision) -> u64 {
    let d = decision.retry_after;
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(max: u32) -> Router {
        router(Arc::new(RequestThrottle::new(max, Duration::from_secs(60))))
    }

    fn router(throttle: Arc<RequestThrottle>) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(throttle, throttle_middleware))
    }

    fn request(ip: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri("/")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    fn from_peer(peer: &str, forwarded: &str) -> axum::http::Request<Body> {
        let mut request = request(forwarded);
        let addr: SocketAddr = peer.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[tokio::test]
    async fn test_rotating_forwarded_header_is_ignored_by_default() {
        let throttle = Arc::new(RequestThrottle::new(3, Duration::from_secs(60)));
        let app = router(Arc::clone(&throttle));

        let mut allowed = 0;
        for i in 0..20 {
            let forwarded = format!("203.0.113.{}", i);
            let response = app
                .clone()
                .oneshot(from_peer("198.51.100.9:40000", &forwarded))
                .await
                .unwrap();
            if response.status() == StatusCode::OK {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 3);
        assert_eq!(throttle.tracked_clients(), 1);
    }

    #[tokio::test]
    async fn test_peers_are_throttled_independently() {
        let app = app(1);
        let first = app.clone().oneshot(from_peer("10.0.0.1:1000", "x")).await.unwrap();
        let second = app.clone().oneshot(from_peer("10.0.0.2:1000", "x")).await.unwrap();
        let again = app.oneshot(from_peer("10.0.0.1:2000", "y")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_trusted_proxy_keys_on_forwarded_header() {
        let throttle = Arc::new(
            RequestThrottle::new(1, Duration::from_secs(60)).trusting_forwarded_headers(true),
        );
        let app = router(throttle);
        let a = app.clone().oneshot(from_peer("10.0.0.1:1000", "203.0.113.1")).await.unwrap();
        let b = app.clone().oneshot(from_peer("10.0.0.1:1000", "203.0.113.2")).await.unwrap();
        let a_again = app.oneshot(from_peer("10.0.0.1:1000", "203.0.113.1")).await.unwrap();
        assert_eq!(a.status(), StatusCode::OK);
        assert_eq!(b.status(), StatusCode::OK);
        assert_eq!(a_again.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_resolve_client_id_without_peer_is_anonymous() {
        let request = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.5")
            .body(Body::empty())
            .unwrap();
        assert_eq!(resolve_client_id(&request, false), ANONYMOUS_CLIENT);
        assert_eq!(resolve_client_id(&request, true), "203.0.113.5");
    }

    #[test]
    fn test_client_id_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.9.9.9"));
        assert_eq!(client_id_from_headers(&headers).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_client_id_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.9.9.9"));
        assert_eq!(client_id_from_headers(&headers).as_deref(), Some("10.9.9.9"));
        assert!(client_id_from_headers(&HeaderMap::new()).is_none());
    }

    #[tokio::test]
    async fn test_allowed_response_carries_quota_headers() {
        let response = app(2).oneshot(request("1.1.1.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[RATE_LIMIT_LIMIT_HEADER], "2");
        assert_eq!(response.headers()[RATE_LIMIT_REMAINING_HEADER], "1");
        assert!(response.headers().contains_key(RATE_LIMIT_RESET_HEADER));
    }

    #[tokio::test]
    async fn test_denied_response_is_429_with_retry_after() {
        let app = app(1);
        let first = app.clone().oneshot(request("2.2.2.2")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request("2.2.2.2")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()[RATE_LIMIT_REMAINING_HEADER], "0");
        let retry_after: u64 = second.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after > 0 && retry_after <= 60);

        let body = axum::body::to_bytes(second.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "rate_limited");
    }
}
