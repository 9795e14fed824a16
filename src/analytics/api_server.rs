//! REST API server for the admin analytics endpoints

use anyhow::Result;
use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use super::{
    events::AnalyticsEvent,
    models::AggregateState,
    reporter::{BusinessInsights, Dashboard, SystemHealth, Timeframe, UserActivity},
    service::AnalyticsService,
};

/// API server for the analytics reporting surface
pub struct AnalyticsApiServer {
    service: AnalyticsService,
    address: String,
}

impl AnalyticsApiServer {
    pub fn new(service: AnalyticsService, address: impl Into<String>) -> Self {
        Self {
            service,
            address: address.into(),
        }
    }

    /// Serve until `shutdown` resolves, then flush the aggregate once more.
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = build_router(self.service.clone());

        info!("Starting analytics API server on {}", self.address);

        let listener = tokio::net::TcpListener::bind(&self.address).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("Analytics API server stopped, flushing snapshot");
        self.service.flush().await;
        Ok(())
    }
}

/// Build the API router with request tracking on every `/api` path.
pub fn build_router(service: AnalyticsService) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/admin/analytics", get(get_dashboard))
        .route("/api/admin/analytics/raw", get(get_raw_analytics))
        .route("/api/admin/system/health", get(get_system_health))
        .route("/api/admin/users/activity", get(get_user_activity))
        .route("/api/admin/insights/business", get(get_business_insights))
        .route("/api/admin/track", post(track_event))
        .layer(middleware::from_fn_with_state(
            service.clone(),
            track_requests,
        ))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    timeframe: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackRequest {
    event_type: Option<String>,
    #[serde(default)]
    details: Value,
}

// API Handlers

async fn health_check() -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::success(HealthStatus {
        status: "OK".to_string(),
        message: "NoteMate analytics API is running".to_string(),
    }))
}

async fn get_dashboard(State(service): State<AnalyticsService>) -> Json<ApiResponse<Dashboard>> {
    Json(ApiResponse::success(service.dashboard().await))
}

async fn get_raw_analytics(
    State(service): State<AnalyticsService>,
) -> Json<ApiResponse<AggregateState>> {
    Json(ApiResponse::success(service.raw_state().await))
}

async fn get_system_health(
    State(service): State<AnalyticsService>,
) -> Json<ApiResponse<SystemHealth>> {
    Json(ApiResponse::success(service.system_health().await))
}

async fn get_user_activity(
    State(service): State<AnalyticsService>,
    Query(params): Query<ActivityQuery>,
) -> Json<ApiResponse<UserActivity>> {
    let timeframe = Timeframe::parse(params.timeframe.as_deref().unwrap_or("7d"));
    Json(ApiResponse::success(service.user_activity(timeframe).await))
}

async fn get_business_insights(
    State(service): State<AnalyticsService>,
) -> Json<ApiResponse<BusinessInsights>> {
    Json(ApiResponse::success(service.business_insights().await))
}

async fn track_event(
    State(service): State<AnalyticsService>,
    Json(request): Json<TrackRequest>,
) -> (StatusCode, Json<ApiResponse<String>>) {
    let Some(event_type) = request.event_type.filter(|t| !t.is_empty()) else {
        warn!("Rejected track request without an event type");
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Event type is required")),
        );
    };

    let event = AnalyticsEvent::from_parts(&event_type, request.details);
    debug!("Tracking {} event", event.kind());
    service.record_event(event).await;

    (
        StatusCode::OK,
        Json(ApiResponse::success("Event tracked successfully".to_string())),
    )
}

/// Record a start event for each `/api` request, then its outcome once the
/// response is ready.
async fn track_requests(
    State(service): State<AnalyticsService>,
    request: Request,
    next: Next,
) -> Response {
    if !is_api_path(request.uri().path()) {
        return next.run(request).await;
    }

    let started = Instant::now();
    let endpoint = request.uri().path().to_string();
    let content_type = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(mut params)| params.remove("type"))
        .filter(|kind| !kind.is_empty());

    service
        .record_event(AnalyticsEvent::RequestStart {
            endpoint: Some(endpoint.clone()),
            method: Some(request.method().to_string()),
            user_agent: header_text(request.headers(), header::USER_AGENT.as_str()),
            ip: client_ip(&request),
        })
        .await;

    let response = next.run(request).await;
    let response_time = Some(started.elapsed().as_secs_f64() * 1000.0);
    let status = response.status();

    let outcome = if status.as_u16() < 400 {
        AnalyticsEvent::RequestSuccess {
            endpoint: Some(endpoint),
            response_time,
            content_type,
        }
    } else {
        AnalyticsEvent::RequestError {
            endpoint: Some(endpoint),
            error_type: Some(format!("HTTP_{}", status.as_u16())),
            response_time,
        }
    };
    service.record_event(outcome).await;

    response
}

fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// First hop of `X-Forwarded-For`, else the socket peer address.
fn client_ip(request: &Request) -> Option<String> {
    header_text(request.headers(), "x-forwarded-for")
        .and_then(|forwarded| {
            forwarded
                .split(',')
                .next()
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(str::to_string)
        })
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::persistence::MemorySnapshotStore;
    use crate::config::AnalyticsConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_service() -> AnalyticsService {
        AnalyticsService::load(
            Arc::new(MemorySnapshotStore::new()),
            &AnalyticsConfig::default(),
        )
        .await
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_service().await);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["status"], "OK");
    }

    #[tokio::test]
    async fn test_middleware_tracks_requests() {
        let service = test_service().await;
        let app = build_router(service.clone());

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/health?type=audio")
                    .header("user-agent", "integration-test/1.0")
                    .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let state = service.raw_state().await;
        assert_eq!(state.total_requests, 2);
        assert_eq!(state.successful_requests, 1);
        assert_eq!(state.requests_by_endpoint["/api/health"], 1);
        assert_eq!(state.requests_by_method["GET"], 1);
        assert_eq!(state.user_agents["integration-test/1.0"], 1);
        assert_eq!(state.ip_addresses["203.0.113.9"], 1);
        assert_eq!(state.requests_by_type["audio"], 1);
        assert_eq!(state.response_time_stats.count, 1);
    }

    #[tokio::test]
    async fn test_unknown_route_counts_as_error() {
        let service = test_service().await;
        let app = build_router(service.clone());

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let state = service.raw_state().await;
        assert_eq!(state.failed_requests, 1);
        assert_eq!(state.errors_by_type["HTTP_404"], 1);
    }

    #[tokio::test]
    async fn test_paths_outside_api_are_not_tracked() {
        let service = test_service().await;

        for uri in ["/favicon.ico", "/apiary", "/"] {
            let response = build_router(service.clone())
                .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }

        let state = service.raw_state().await;
        assert_eq!(state.total_requests, 0);
        assert!(state.errors_by_type.is_empty());
    }

    #[tokio::test]
    async fn test_track_requires_event_type() {
        let app = build_router(test_service().await);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/api/admin/track")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"details": {"type": "ppt"}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Event type is required");
    }

    #[tokio::test]
    async fn test_track_records_print() {
        let service = test_service().await;
        let app = build_router(service.clone());

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/api/admin/track")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"eventType": "print", "details": {"type": "ppt"}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let state = service.raw_state().await;
        assert_eq!(state.prints_total, 1);
        assert_eq!(state.prints_by_type["ppt"], 1);
    }

    #[tokio::test]
    async fn test_report_endpoints() {
        let app = build_router(test_service().await);

        for uri in [
            "/api/admin/analytics",
            "/api/admin/analytics/raw",
            "/api/admin/system/health",
            "/api/admin/users/activity?timeframe=24h",
            "/api/admin/insights/business",
        ] {
            let response = app
                .clone()
                .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);

            let json = body_json(response).await;
            assert_eq!(json["success"], true, "{}", uri);
            assert!(json["data"].is_object(), "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_activity_timeframe_selects_series() {
        let app = build_router(test_service().await);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/admin/users/activity?timeframe=24h")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["data"]["activity"].as_array().unwrap().len(), 24);
        // oneshot requests carry no peer address.
        assert_eq!(json["data"]["overview"]["uniqueUsers"], 0);
    }
}
