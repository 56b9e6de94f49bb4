use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::AppState;

/// Builds the thin, read-mostly HTTP surface operator tooling consumes —
/// the control plane's actual mutation paths go through the command
/// plane or direct repository calls, not this router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/status", get(handlers::status))
        .route("/devices", get(handlers::list_devices))
        .route("/devices/:id", get(handlers::get_device))
        .route("/alerts", get(handlers::list_alerts))
        .route("/alerts/:id", get(handlers::get_alert))
        .route("/audit", get(handlers::list_audit))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use fleet_config::DatabaseConfig;
    use fleet_repositories::DeviceRepository;
    use fleet_store::ConnectionManager;
    use tower::util::ServiceExt;

    const TEST_TOKEN: &str = "test-token";

    async fn test_app() -> Router {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            pool_size: 1,
            max_overflow: 0,
            ..DatabaseConfig::default()
        };
        let manager = ConnectionManager::new(config);
        manager.initialize().await.unwrap();
        DeviceRepository::ensure_schema(&manager).await.unwrap();
        fleet_repositories::AlertRepository::ensure_schema(&manager).await.unwrap();
        fleet_repositories::AuditLogRepository::ensure_schema(&manager).await.unwrap();

        let state = AppState::new(manager, TEST_TOKEN);
        build_app(state)
    }

    fn authed(req: axum::http::request::Builder) -> axum::http::request::Builder {
        req.header("Authorization", format!("Bearer {TEST_TOKEN}"))
    }

    #[tokio::test]
    async fn unauthenticated_request_returns_401() {
        let app = test_app().await;
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_token_returns_401() {
        let app = test_app().await;
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("Authorization", "Bearer wrong-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_returns_200() {
        let app = test_app().await;
        let resp = app
            .oneshot(authed(Request::builder().uri("/health")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_returns_200_with_live_connection() {
        let app = test_app().await;
        let resp = app
            .oneshot(authed(Request::builder().uri("/ready")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn devices_empty_list_returns_200() {
        let app = test_app().await;
        let resp = app
            .oneshot(authed(Request::builder().uri("/devices")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn device_not_found_returns_404() {
        let app = test_app().await;
        let missing = uuid::Uuid::new_v4();
        let resp = app
            .oneshot(
                authed(Request::builder().uri(format!("/devices/{missing}")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_returns_200() {
        let app = test_app().await;
        let resp = app
            .oneshot(authed(Request::builder().uri("/status")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
