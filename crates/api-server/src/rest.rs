//! REST handlers for the metrics endpoint and operational probes.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use practice_analytics::snapshot::{self, MonthMetrics};
use practice_analytics::RecordStore;
use practice_auth::{bearer_token, AuthError, TokenSecret, TokenVerifier};
use practice_core::config::AppConfig;
use practice_core::types::{MonthKey, PracticeSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub settings: Arc<PracticeSettings>,
    /// `None` when no token secret is configured.
    pub verifier: Option<TokenVerifier>,
    pub include_debug: bool,
    pub node_id: String,
    pub start_time: Instant,
}

impl AppState {
    /// Fails when the token age or the practice settings are out of range.
    pub fn new(config: &AppConfig, store: RecordStore, settings: PracticeSettings) -> anyhow::Result<Self> {
        settings.validate()?;
        let verifier = config
            .auth
            .token_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|secret| {
                TokenVerifier::with_max_age_hours(TokenSecret::new(secret), config.auth.max_token_age_hours)
            })
            .transpose()?;
        if verifier.is_none() {
            warn!("No token secret configured; /api/metrics will answer 500");
        }
        Ok(Self {
            store: Arc::new(store),
            settings: Arc::new(settings),
            verifier,
            include_debug: config.auth.include_debug,
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of `/api/metrics`, each carrying a diagnostic string that is
/// only returned when `include_debug` is set.
#[derive(Debug)]
pub enum ApiError {
    InvalidMonth(String),
    Unauthorized(String),
    InvalidToken(String),
    Configuration(String),
    Internal(String),
}

impl ApiError {
    fn from_auth(err: AuthError) -> Self {
        if err.is_missing() {
            ApiError::Unauthorized(err.to_string())
        } else {
            ApiError::InvalidToken(err.to_string())
        }
    }

    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            ApiError::InvalidMonth(d) => (StatusCode::BAD_REQUEST, "Invalid month parameter", d),
            ApiError::Unauthorized(d) => (StatusCode::UNAUTHORIZED, "Unauthorized", d),
            ApiError::InvalidToken(d) => (StatusCode::UNAUTHORIZED, "Invalid or expired token", d),
            ApiError::Configuration(d) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error", d)
            }
            ApiError::Internal(d) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", d),
        }
    }

    fn into_response_with(self, include_debug: bool) -> Response {
        let (status, error, debug) = self.parts();
        let body = ErrorResponse {
            error: error.to_string(),
            debug: include_debug.then(|| debug.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub month: Option<String>,
}

/// Either every month keyed by `YYYY-MM`, or the one month asked for.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum MetricsPayload {
    Month(MonthMetrics),
    All(BTreeMap<String, MonthMetrics>),
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub metrics: MetricsPayload,
    pub settings: PracticeSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_months: Option<Vec<String>>,
}

/// GET /api/metrics: practice metrics for one month or all months.
#[utoipa::path(
    get,
    path = "/api/metrics",
    tag = "Metrics",
    params(
        ("month" = Option<String>, Query, description = "Month as YYYY-MM; all months when omitted"),
    ),
    responses(
        (status = 200, description = "Metrics computed", body = MetricsResponse),
        (status = 400, description = "Malformed month parameter", body = ErrorResponse),
        (status = 401, description = "Missing, invalid or expired bearer token", body = ErrorResponse),
        (status = 500, description = "Token secret not configured", body = ErrorResponse),
    )
)]
pub async fn handle_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MetricsQuery>,
) -> Response {
    metrics::counter!("api.metrics.requests").increment(1);
    let include_debug = state.include_debug;
    match metrics_response(state, &headers, query).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => {
            match &err {
                ApiError::Unauthorized(reason) | ApiError::InvalidToken(reason) => {
                    warn!(reason = %reason, "Metrics request rejected");
                    metrics::counter!("api.auth.failures").increment(1);
                }
                ApiError::InvalidMonth(reason) => {
                    debug!(reason = %reason, "Invalid month parameter");
                    metrics::counter!("api.validation_errors").increment(1);
                }
                ApiError::Configuration(reason) | ApiError::Internal(reason) => {
                    error!(reason = %reason, "Metrics request failed");
                    metrics::counter!("api.errors").increment(1);
                }
            }
            err.into_response_with(include_debug)
        }
    }
}

async fn metrics_response(
    state: AppState,
    headers: &HeaderMap,
    query: MetricsQuery,
) -> Result<MetricsResponse, ApiError> {
    let verifier = state
        .verifier
        .as_ref()
        .ok_or_else(|| ApiError::Configuration("token secret is not set".to_string()))?;

    let header = headers
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().unwrap_or_default());
    let token = bearer_token(header).map_err(ApiError::from_auth)?;
    let claims = verifier
        .verify(token, Utc::now())
        .map_err(ApiError::from_auth)?;
    debug!(username = %claims.username, month = ?query.month, "Serving metrics");

    let month = query
        .month
        .as_deref()
        .map(|raw| {
            raw.parse::<MonthKey>()
                .map_err(|e| ApiError::InvalidMonth(e.to_string()))
        })
        .transpose()?;

    // Aggregation is a full scan; keep it off the async workers.
    let store = Arc::clone(&state.store);
    let settings = Arc::clone(&state.settings);
    let (metrics, available_months) = tokio::task::spawn_blocking(move || match month {
        Some(key) => (
            MetricsPayload::Month(snapshot::month_metrics(store.records(), &settings, key)),
            None,
        ),
        None => {
            let months = store
                .engine()
                .available_months()
                .iter()
                .map(MonthKey::to_string)
                .collect();
            (
                MetricsPayload::All(snapshot::all_month_metrics(store.records(), &settings)),
                Some(months),
            )
        }
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(MetricsResponse {
        metrics,
        settings: state.settings.as_ref().clone(),
        available_months,
    })
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// GET /health: Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        records: state.store.len(),
    })
}

/// GET /ready: 200 once records are loaded and a token secret is configured.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses(
        (status = 200, description = "Ready to serve metrics"),
        (status = 503, description = "No records or no token secret"),
    )
)]
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.verifier.is_some() && !state.store.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live: Liveness probe.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub records: usize,
}
