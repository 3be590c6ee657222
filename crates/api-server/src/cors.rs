//! Allow-list CORS built on `tower_http::cors`.
//!
//! Browser preflights are answered by [`CorsLayer`]. A bare `OPTIONS` without
//! `Access-Control-Request-Method` still gets an empty 200 from
//! [`options_ok`], so every route answers `OPTIONS`.

use axum::body::Body;
use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use practice_core::config::CorsConfig;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, warn};

const MAX_AGE: Duration = Duration::from_secs(86_400);

/// Echo allow-listed origins; anything else gets no allow-origin header.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let allow = config.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
            let allowed = origin.to_str().is_ok_and(|o| allow.is_allowed(o));
            if !allowed {
                debug!(origin = ?origin, "Origin not in CORS allow-list");
            }
            allowed
        }))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(MAX_AGE)
}

/// With `fallback_to_primary`, responses the allow-list left without an
/// allow-origin header get the primary origin instead.
pub fn primary_origin_fallback(config: &CorsConfig) -> Option<SetResponseHeaderLayer<HeaderValue>> {
    if !config.fallback_to_primary {
        return None;
    }
    match HeaderValue::from_str(&config.primary_origin) {
        Ok(value) => Some(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            value,
        )),
        Err(_) => {
            warn!(origin = %config.primary_origin, "Primary origin is not a valid header value");
            None
        }
    }
}

/// Answer any `OPTIONS` that reaches the router with an empty 200.
pub async fn options_ok(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::OK;
        return response;
    }
    next.run(req).await
}
