//! OpenAPI document, served as JSON at `/api/openapi.json`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Practice Dashboard API",
        version = "0.1.0",
        description = "Revenue, session, client and churn metrics for a behavioral-health practice.\n\nRequests to `/api/metrics` need an HMAC-signed bearer token.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Metrics", description = "Monthly practice metrics"),
        (name = "Operations", description = "Health, readiness, and liveness probes"),
    ),
    paths(
        crate::rest::handle_metrics,
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        practice_analytics::snapshot::MonthMetrics,
        practice_analytics::snapshot::ClinicianMetrics,
        practice_core::types::PracticeSettings,
        crate::rest::MetricsPayload,
        crate::rest::MetricsResponse,
        crate::rest::ErrorResponse,
        crate::rest::HealthResponse,
    ))
)]
pub struct ApiDoc;
