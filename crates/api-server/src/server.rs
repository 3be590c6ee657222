//! API server: HTTP router plus the Prometheus exporter.

use crate::cors::{cors_layer, options_ok, primary_origin_fallback};
use crate::rest::{self, AppState};
use crate::swagger::ApiDoc;
use axum::routing::get;
use axum::{middleware, Json, Router};
use practice_core::config::{AppConfig, CorsConfig};
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;

/// Build the application router.
pub fn router(state: AppState, cors: &CorsConfig) -> Router {
    let mut app = Router::new()
        .route("/api/metrics", get(rest::handle_metrics))
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(options_ok))
        .layer(cors_layer(cors));
    if let Some(fallback) = primary_origin_fallback(cors) {
        app = app.layer(fallback);
    }
    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serves the metrics dashboard API.
pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone(), &self.config.cors);

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, records = self.state.store.len(), "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        if !self.config.metrics.enabled {
            info!("Metrics exporter disabled");
            return Ok(());
        }

        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use practice_analytics::snapshot;
    use practice_analytics::source::MetricsOrigin;
    use practice_analytics::{MetricsSource, MetricsState, RecordStore, RemoteMetricsClient};
    use practice_auth::{issue_token, TokenSecret};
    use practice_core::types::{MonthKey, PaymentRecord, PracticeSettings};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "router-test-secret";

    fn record(client: &str, date: &str, amount: f64) -> PaymentRecord {
        PaymentRecord {
            clinician_id: "clin-01".to_string(),
            clinician: "Dr. Maya Chen".to_string(),
            date_paid: practice_core::types::parse_record_date(date).unwrap(),
            appointment_date: None,
            cpt_code: "90837".to_string(),
            client_id: client.to_string(),
            amount,
        }
    }

    fn test_config(secret: Option<&str>) -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.token_secret = secret.map(str::to_string);
        config.cors.primary_origin = "https://dashboard.example.com".to_string();
        config
    }

    fn test_app(config: &AppConfig) -> Router {
        let store = RecordStore::new(vec![
            record("a", "1/5/24", 100.0),
            record("a", "2/10/24", 150.0),
            record("b", "2/12/24", 120.0),
        ])
        .unwrap();
        let state = AppState::new(config, store, PracticeSettings::default()).unwrap();
        router(state, &config.cors)
    }

    fn make_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn valid_token() -> String {
        issue_token("admin", &TokenSecret::new(SECRET), Utc::now()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn metrics_requires_auth() {
        let app = test_app(&test_config(Some(SECRET)));
        let response = app
            .oneshot(make_request("GET", "/api/metrics", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Unauthorized");
        assert!(body["debug"].is_string());
    }

    #[tokio::test]
    async fn invalid_token_returns_401() {
        let app = test_app(&test_config(Some(SECRET)));
        let response = app
            .oneshot(make_request("GET", "/api/metrics", Some("not-a-token")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn missing_secret_returns_500() {
        let app = test_app(&test_config(None));
        let response = app
            .oneshot(make_request("GET", "/api/metrics", Some(&valid_token())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "Server configuration error");
    }

    #[tokio::test]
    async fn all_months_with_valid_token() {
        let app = test_app(&test_config(Some(SECRET)));
        let response = app
            .oneshot(make_request("GET", "/api/metrics", Some(&valid_token())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["availableMonths"], serde_json::json!(["2024-01", "2024-02"]));
        assert_eq!(body["metrics"]["2024-02"]["revenue"], 270.0);
        assert_eq!(body["metrics"]["2024-02"]["activeClients"], 2);
        assert_eq!(body["settings"]["churnWindowDays"], 60);
    }

    #[tokio::test]
    async fn single_month_with_valid_token() {
        let app = test_app(&test_config(Some(SECRET)));
        let response = app
            .oneshot(make_request("GET", "/api/metrics?month=2024-01", Some(&valid_token())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["metrics"]["month"], "2024-01");
        assert_eq!(body["metrics"]["newClients"], 1);
        assert!(body.get("availableMonths").is_none());
    }

    #[tokio::test]
    async fn malformed_month_returns_400() {
        let app = test_app(&test_config(Some(SECRET)));
        let response = app
            .oneshot(make_request("GET", "/api/metrics?month=2024-13", Some(&valid_token())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid month parameter");
    }

    #[tokio::test]
    async fn debug_strings_can_be_disabled() {
        let mut config = test_config(Some(SECRET));
        config.auth.include_debug = false;
        let app = test_app(&config);
        let response = app
            .oneshot(make_request("GET", "/api/metrics", Some("bad")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(json_body(response).await.get("debug").is_none());
    }

    #[tokio::test]
    async fn preflight_has_cors_headers_and_no_body() {
        let app = test_app(&test_config(Some(SECRET)));
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/metrics")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn unknown_origin_gets_no_allow_origin() {
        let app = test_app(&test_config(Some(SECRET)));
        let request = Request::builder()
            .method("GET")
            .uri("/live")
            .header(header::ORIGIN, "https://elsewhere.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn operational_endpoints() {
        let config = test_config(Some(SECRET));
        let app = test_app(&config);

        let response = app.clone().oneshot(make_request("GET", "/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["records"], 3);

        let response = app.clone().oneshot(make_request("GET", "/ready", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(make_request("GET", "/api/openapi.json", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doc = json_body(response).await;
        assert!(doc["paths"]["/api/metrics"].is_object());
    }

    #[test]
    fn out_of_range_token_age_is_a_config_error() {
        let mut config = test_config(Some(SECRET));
        config.auth.max_token_age_hours = i64::MAX;
        let store = RecordStore::new(vec![record("a", "1/5/24", 100.0)]).unwrap();
        assert!(AppState::new(&config, store, PracticeSettings::default()).is_err());
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn remote_source_matches_local_computation() {
        let config = test_config(Some(SECRET));
        let base_url = serve(test_app(&config)).await;
        let client = RemoteMetricsClient::new(base_url, valid_token(), Duration::from_secs(5)).unwrap();

        let local_store = RecordStore::new(vec![
            record("a", "1/5/24", 100.0),
            record("a", "2/10/24", 150.0),
            record("b", "2/12/24", 120.0),
        ])
        .unwrap();
        let settings = PracticeSettings::default();
        let key = MonthKey::new(1, 2024);
        let expected = snapshot::month_metrics(local_store.records(), &settings, key);

        // An empty local store proves the numbers came over the wire.
        let empty = RecordStore::default();
        let state = MetricsSource::local(&empty, &settings)
            .with_remote(client)
            .load_month(key)
            .await;
        let metrics = match state {
            MetricsState::Ready {
                metrics,
                origin: MetricsOrigin::Remote,
            } => metrics,
            other => panic!("expected remote metrics, got {other:?}"),
        };
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert_eq!(metrics.month, expected.month);
        assert_eq!(metrics.label, expected.label);
        assert!(close(metrics.revenue, expected.revenue));
        assert_eq!(metrics.sessions, expected.sessions);
        assert_eq!(metrics.active_clients, expected.active_clients);
        assert_eq!(metrics.new_clients, expected.new_clients);
        assert_eq!(metrics.churned_clients, expected.churned_clients);
        assert_eq!(metrics.retention_rate.is_some(), expected.retention_rate.is_some());
        assert!(close(metrics.capacity_utilization, expected.capacity_utilization));
        assert_eq!(metrics.clinicians.len(), expected.clinicians.len());
        assert_eq!(metrics.clinicians[0].id, expected.clinicians[0].id);
        assert!(close(metrics.clinicians[0].revenue, expected.clinicians[0].revenue));
    }

    #[tokio::test]
    async fn remote_error_body_is_reported_then_falls_back() {
        let config = test_config(Some(SECRET));
        let base_url = serve(test_app(&config)).await;
        let client = RemoteMetricsClient::new(base_url, "bad", Duration::from_secs(5)).unwrap();
        let key = MonthKey::new(0, 2024);

        let err = client.fetch_month(key).await.unwrap_err().to_string();
        assert!(err.contains("401"), "{err}");
        assert!(err.contains("Invalid or expired token"), "{err}");

        let store = RecordStore::new(vec![record("a", "1/5/24", 100.0)]).unwrap();
        let settings = PracticeSettings::default();
        let state = MetricsSource::local(&store, &settings)
            .with_remote(client)
            .load_month(key)
            .await;
        assert!(matches!(
            state,
            MetricsState::Ready {
                origin: MetricsOrigin::Local,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn not_ready_without_secret() {
        let app = test_app(&test_config(None));
        let response = app.oneshot(make_request("GET", "/ready", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
