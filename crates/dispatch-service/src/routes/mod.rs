//! HTTP routes for the Dispatch Service.
//!
//! Defines the Axum router and application state for the signaling
//! listener. Health and metrics are served separately.

use crate::actors::{ActorMetrics, DispatcherActorHandle};
use crate::config::Config;
use crate::handlers;
use crate::repositories::UserStore;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the dispatcher singleton.
    pub dispatcher: DispatcherActorHandle,

    /// Account storage.
    pub user_store: Arc<dyn UserStore>,

    /// Service configuration.
    pub config: Config,

    /// Shared actor metrics, handed to each connection actor.
    pub metrics: Arc<ActorMetrics>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/ws` - WebSocket signaling
/// - `/api/users/register` - Account creation
/// - `/api/users/login` - Account lookup
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/api/users/register", post(handlers::register_user))
        .route("/api/users/login", post(handlers::login_user))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryUserStore;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tower::util::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let config = Config::from_vars(&HashMap::from([(
            "DISPATCH_INSTANCE_ID".to_string(),
            "ds-test".to_string(),
        )]))
        .expect("config");
        let metrics = ActorMetrics::new();
        let dispatcher = DispatcherActorHandle::new(
            config.instance_id.clone(),
            config.max_connections,
            Arc::clone(&metrics),
        );

        Arc::new(AppState {
            dispatcher,
            user_store: Arc::new(InMemoryUserStore::new()),
            config,
            metrics,
        })
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("Failed to build request")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let state = test_state();
        let app = build_routes(Arc::clone(&state));

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/users/register",
                &json!({
                    "name": "Asha",
                    "phone": "9000000001",
                    "role": "operator",
                    "vehiclePlate": "KA-01-1234"
                }),
            ))
            .await
            .expect("Request failed");
        assert_eq!(response.status(), StatusCode::CREATED);
        let registered = body_json(response).await;
        let id = registered.get("id").cloned().expect("id in response");

        let response = app
            .oneshot(post_json(
                "/api/users/login",
                &json!({"name": "Asha", "phone": "9000000001"}),
            ))
            .await
            .expect("Request failed");
        assert_eq!(response.status(), StatusCode::OK);

        let profile = body_json(response).await;
        assert_eq!(profile.get("id"), Some(&id));
        assert_eq!(
            profile.get("vehiclePlate").and_then(Value::as_str),
            Some("KA-01-1234")
        );
        assert_eq!(profile.get("role").and_then(Value::as_str), Some("operator"));

        state.dispatcher.cancel();
    }

    #[tokio::test]
    async fn test_login_unknown_user_is_404() {
        let state = test_state();
        let app = build_routes(Arc::clone(&state));

        let response = app
            .oneshot(post_json(
                "/api/users/login",
                &json!({"name": "nobody", "phone": "0"}),
            ))
            .await
            .expect("Request failed");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(
            body.pointer("/error/code").and_then(Value::as_str),
            Some("NOT_FOUND")
        );

        state.dispatcher.cancel();
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_409() {
        let state = test_state();
        let app = build_routes(Arc::clone(&state));
        let body = json!({"name": "Ravi", "phone": "9000000002", "role": "officer"});

        let response = app
            .clone()
            .oneshot(post_json("/api/users/register", &body))
            .await
            .expect("Request failed");
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(post_json("/api/users/register", &body))
            .await
            .expect("Request failed");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        state.dispatcher.cancel();
    }

    #[tokio::test]
    async fn test_operator_without_plate_is_400() {
        let state = test_state();
        let app = build_routes(Arc::clone(&state));

        let response = app
            .oneshot(post_json(
                "/api/users/register",
                &json!({"name": "Asha", "phone": "1", "role": "operator"}),
            ))
            .await
            .expect("Request failed");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        state.dispatcher.cancel();
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let state = test_state();
        let app = build_routes(Arc::clone(&state));

        let request = Request::builder()
            .uri("/ws")
            .body(Body::empty())
            .expect("Failed to build request");
        let response = app.oneshot(request).await.expect("Request failed");

        assert!(response.status().is_client_error());

        state.dispatcher.cancel();
    }
}
