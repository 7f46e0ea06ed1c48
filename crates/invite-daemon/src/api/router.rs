//! API Router configuration

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::require_api_token;
use super::handlers;
use super::state::AppState;

/// Create the main API router. Everything under `/api/v1` requires the API
/// bearer token; the root `/health` check does not.
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // Transport webhook
        .route("/events", post(handlers::ingest_event))
        // Role mappings
        .route("/mappings", get(handlers::list_mappings))
        .route(
            "/mappings/:code",
            put(handlers::set_mapping).delete(handlers::delete_mapping),
        )
        // Communities
        .route("/communities", get(handlers::list_communities))
        .route("/communities/:id/snapshot", get(handlers::get_snapshot))
        .route("/communities/:id/resync", post(handlers::resync_community))
        .route(
            "/communities/:id/diagnostics",
            get(handlers::diagnose_community),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_token,
        ));

    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::{HealthCheckResponse, MappingEntry, SetMappingResponse};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use invite_tracker::{
        FetchError, InMemoryRoleMapping, InviteDiagnostics, InviteTracker, RecordingSink,
        RoleMapping, StaticInviteSource, TrackerConfig,
    };
    use invite_types::{AttributionResult, CommunityId, InviteCode, RoleId, Snapshot};
    use std::sync::Arc;
    use tower::ServiceExt;

    const API_TOKEN: &str = "test-token";

    struct TestApp {
        source: Arc<StaticInviteSource>,
        sink: Arc<RecordingSink>,
        tracker: Arc<InviteTracker>,
        router: Router,
    }

    fn test_app() -> TestApp {
        let source = Arc::new(StaticInviteSource::new());
        let sink = Arc::new(RecordingSink::new());
        let tracker = Arc::new(
            InviteTracker::new(
                TrackerConfig::default(),
                source.clone(),
                Arc::new(InMemoryRoleMapping::new()),
                sink.clone(),
            )
            .unwrap(),
        );
        let router = create_router(AppState::new(tracker.clone(), API_TOKEN), false);
        TestApp {
            source,
            sink,
            tracker,
            router,
        }
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", API_TOKEN))
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", API_TOKEN))
            .body(Body::empty())
            .unwrap()
    }

    fn anonymous_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn read_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_returns_200() {
        let app = test_app();
        let resp = app
            .router
            .oneshot(empty_request("GET", "/health"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let health: HealthCheckResponse = read_json(resp).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.communities, 0);
    }

    #[tokio::test]
    async fn root_health_needs_no_token() {
        let app = test_app();
        let resp = app
            .router
            .oneshot(anonymous_request("GET", "/health"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_requires_bearer_token() {
        let app = test_app();

        for (method, uri) in [
            ("GET", "/api/v1/health"),
            ("GET", "/api/v1/mappings"),
            ("PUT", "/api/v1/mappings/TW8zH8rSp3"),
            ("POST", "/api/v1/events"),
            ("POST", "/api/v1/communities/c1/resync"),
        ] {
            let resp = app
                .router
                .clone()
                .oneshot(anonymous_request(method, uri))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }

        let resp = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/v1/mappings/TW8zH8rSp3")
                    .header("authorization", "Bearer wrong")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"role":"1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = read_json(resp).await;
        assert_eq!(body["code"], "UNAUTHORIZED");

        assert!(app.tracker.mapping().entries().is_empty());
        assert_eq!(app.source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn cors_is_off_unless_enabled() {
        let app = test_app();
        let preflight = || {
            Request::builder()
                .method("OPTIONS")
                .uri("/api/v1/mappings")
                .header("origin", "https://example.com")
                .header("access-control-request-method", "PUT")
                .body(Body::empty())
                .unwrap()
        };

        let resp = app.router.oneshot(preflight()).await.unwrap();
        assert!(resp.headers().get("access-control-allow-origin").is_none());

        let router = create_router(AppState::new(app.tracker.clone(), API_TOKEN), true);
        let resp = router.oneshot(preflight()).await.unwrap();
        assert!(resp.headers().get("access-control-allow-origin").is_some());
    }

    #[tokio::test]
    async fn mapping_lifecycle() {
        let app = test_app();

        let resp = app
            .router
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/v1/mappings/TW8zH8rSp3",
                serde_json::json!({ "role": "1394618100879589396" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let set: SetMappingResponse = read_json(resp).await;
        assert_eq!(set.code, InviteCode::new("TW8zH8rSp3"));
        assert_eq!(set.previous, None);

        let resp = app
            .router
            .clone()
            .oneshot(empty_request("GET", "/api/v1/mappings"))
            .await
            .unwrap();
        let entries: Vec<MappingEntry> = read_json(resp).await;
        assert_eq!(
            entries,
            vec![MappingEntry {
                code: InviteCode::new("TW8zH8rSp3"),
                role: RoleId::new("1394618100879589396"),
            }]
        );

        let resp = app
            .router
            .clone()
            .oneshot(empty_request("DELETE", "/api/v1/mappings/TW8zH8rSp3"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .router
            .oneshot(empty_request("DELETE", "/api/v1/mappings/TW8zH8rSp3"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_mapping_code_is_rejected() {
        let app = test_app();
        let resp = app
            .router
            .oneshot(json_request(
                "PUT",
                "/api/v1/mappings/bad!code",
                serde_json::json!({ "role": "1" }),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = read_json(resp).await;
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn resync_and_snapshot() {
        let app = test_app();
        let community = CommunityId::new("c1");
        app.source.set_uses(&community, "A", 3);

        let resp = app
            .router
            .clone()
            .oneshot(empty_request("GET", "/api/v1/communities/c1/snapshot"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .router
            .clone()
            .oneshot(empty_request("POST", "/api/v1/communities/c1/resync"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let snapshot: Snapshot = read_json(resp).await;
        assert_eq!(snapshot.uses_of(&InviteCode::new("A")), 3);

        let resp = app
            .router
            .oneshot(empty_request("GET", "/api/v1/communities/c1/snapshot"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cached: Snapshot = read_json(resp).await;
        assert_eq!(cached, snapshot);
    }

    #[tokio::test]
    async fn resync_fetch_failure_is_bad_gateway() {
        let app = test_app();
        let community = CommunityId::new("c1");
        app.source
            .fail_with(&community, FetchError::PermissionDenied("no scope".into()));

        let resp = app
            .router
            .oneshot(empty_request("POST", "/api/v1/communities/c1/resync"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert!(app.tracker.current_snapshot(&community).is_none());
    }

    #[tokio::test]
    async fn diagnostics_report_live_usage() {
        let app = test_app();
        let community = CommunityId::new("c1");
        app.source.set_uses(&community, "A", 1);
        app.tracker.observe_community(&community).await.unwrap();
        app.source.record_join(&community, "A");

        let resp = app
            .router
            .oneshot(empty_request("GET", "/api/v1/communities/c1/diagnostics"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let report: InviteDiagnostics = read_json(resp).await;
        assert_eq!(report.invites[0].cached_uses, Some(1));
        assert_eq!(report.invites[0].live_uses, 2);
        assert_eq!(
            app.tracker
                .current_snapshot(&community)
                .unwrap()
                .uses_of(&InviteCode::new("A")),
            1
        );
    }

    #[tokio::test]
    async fn webhook_events_are_processed() {
        let app = test_app();
        let community = CommunityId::new("c1");
        app.source.set_uses(&community, "A", 0);

        let events = [
            serde_json::json!({ "community": "c1", "event": { "type": "community_joined" } }),
            serde_json::json!({
                "community": "c1",
                "event": { "type": "member_joined", "member_id": "m1" }
            }),
        ];

        for (i, event) in events.into_iter().enumerate() {
            if i == 1 {
                // Let the observation land before the join is reflected upstream.
                for _ in 0..100 {
                    if app.tracker.current_snapshot(&community).is_some() {
                        break;
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                }
                app.source.record_join(&community, "A");
            }
            let resp = app
                .router
                .clone()
                .oneshot(json_request("POST", "/api/v1/events", event))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::ACCEPTED);
        }

        app.tracker.shutdown().await;
        assert_eq!(
            app.sink.results_for(&community),
            vec![AttributionResult::attributed(InviteCode::new("A"), 0, 1)]
        );
    }

    #[tokio::test]
    async fn malformed_event_is_rejected() {
        let app = test_app();
        let resp = app
            .router
            .oneshot(json_request(
                "POST",
                "/api/v1/events",
                serde_json::json!({ "community": "c1", "event": { "type": "unknown" } }),
            ))
            .await
            .unwrap();

        assert!(resp.status().is_client_error());
    }
}
