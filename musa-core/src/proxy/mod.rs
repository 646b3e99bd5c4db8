//! Authenticated proxy server
//!
//! Serves the task, planting and signed-in analysis routes under `/api/...`
//! and forwards them to the farm backend with the caller's `Authorization` header. Page paths go
//! through the cookie gate in [`gate`].

mod gate;
mod routes;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::error::{Error, Result};

/// Largest image upload accepted on the analysis routes
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// State shared by the proxy handlers
#[derive(Debug, Clone)]
pub struct ProxyState {
    client: reqwest::Client,
    upstream: Option<String>,
}

impl ProxyState {
    /// `upstream` is the backend base URL; without one every route answers 500.
    pub fn new(upstream: Option<&str>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("musa-proxy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        let upstream = upstream
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        Ok(Self { client, upstream })
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        Self::new(config.upstream_url.as_deref(), config.timeout_secs)
    }

    pub fn upstream(&self) -> Option<&str> {
        self.upstream.as_deref()
    }
}

/// Create the proxy router
pub fn create_router(state: ProxyState) -> Router {
    Router::new()
        .route(
            "/api/tasks/:task_id/complete",
            post(routes::complete_task),
        )
        .route(
            "/api/plantings",
            get(routes::list_plantings).post(routes::create_planting),
        )
        .route("/api/plantings/active", get(routes::active_plantings))
        .route("/api/plantings/:id", get(routes::get_planting))
        .route(
            "/api/diagnoses/create",
            post(routes::create_diagnosis).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/varieties/create",
            post(routes::create_variety).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/diagnoses/user/:user_id", get(routes::diagnosis_history))
        .route("/api/varieties/user/:user_id", get(routes::variety_history))
        .fallback(routes::not_found)
        .layer(middleware::from_fn(gate::gate_pages))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: &ProxyConfig, listen: Option<&str>) -> Result<()> {
    let state = ProxyState::from_config(config)?;
    match state.upstream() {
        Some(upstream) => tracing::info!(upstream, "Forwarding to backend"),
        None => tracing::warn!("No upstream configured, every route will answer 500"),
    }

    let addr = listen.unwrap_or(&config.listen);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "Proxy listening");

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{any, body_json, body_string, header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn body_json_of(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn router_for(upstream: Option<&str>) -> Router {
        create_router(ProxyState::new(upstream, 5).unwrap())
    }

    #[tokio::test]
    async fn test_missing_authorization_never_reaches_upstream() {
        crate::logging::init_test();
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let app = router_for(Some(&server.uri()));
        for (verb, uri) in [
            ("POST", "/api/tasks/5/complete"),
            ("GET", "/api/plantings/1"),
            ("GET", "/api/plantings"),
            ("POST", "/api/plantings"),
            ("GET", "/api/plantings/active"),
            ("POST", "/api/diagnoses/create"),
            ("POST", "/api/varieties/create"),
            ("GET", "/api/diagnoses/user/42"),
            ("GET", "/api/varieties/user/42"),
        ] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(verb)
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{verb} {uri}");
            assert_eq!(
                body_json_of(response).await,
                json!({ "error": "Authorization header missing" })
            );
        }
    }

    #[tokio::test]
    async fn test_missing_upstream_is_500() {
        let response = router_for(None)
            .oneshot(
                Request::builder()
                    .uri("/api/plantings")
                    .header(header::AUTHORIZATION, "Bearer t")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json_of(response).await,
            json!({ "error": "Backend URL not configured" })
        );
    }

    #[tokio::test]
    async fn test_forwards_authorization_and_relays_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/plantings/7"))
            .and(header_is("authorization", "Bearer abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": 7, "currentStage": "PLANTING" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let response = router_for(Some(&server.uri()))
            .oneshot(
                Request::builder()
                    .uri("/api/plantings/7")
                    .header(header::AUTHORIZATION, "Bearer abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json_of(response).await,
            json!({ "id": 7, "currentStage": "PLANTING" })
        );
    }

    #[tokio::test]
    async fn test_active_route_is_not_an_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/plantings/active"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let response = router_for(Some(&server.uri()))
            .oneshot(
                Request::builder()
                    .uri("/api/plantings/active")
                    .header(header::AUTHORIZATION, "Bearer abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json_of(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_create_forwards_body_and_answers_201() {
        let server = MockServer::start().await;
        let new_planting = json!({
            "plotIdentifier": "North-2",
            "plantingDate": "2025-03-01",
            "numberOfPlants": 120,
            "bananaVariety": "Cavendish"
        });
        Mock::given(method("POST"))
            .and(path("/api/plantings"))
            .and(body_json(&new_planting))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 9 })))
            .expect(1)
            .mount(&server)
            .await;

        let response = router_for(Some(&server.uri()))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/plantings")
                    .header(header::AUTHORIZATION, "Bearer abc")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(new_planting.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json_of(response).await, json!({ "id": 9 }));
    }

    #[tokio::test]
    async fn test_analysis_create_forwards_multipart_verbatim() {
        let server = MockServer::start().await;
        let content_type = "multipart/form-data; boundary=leafboundary";
        let form = "--leafboundary\r\n\
                    Content-Disposition: form-data; name=\"userId\"\r\n\r\n\
                    42\r\n\
                    --leafboundary--\r\n";
        Mock::given(method("POST"))
            .and(path("/api/diagnoses/create"))
            .and(header_is("authorization", "Bearer abc"))
            .and(header_is("content-type", content_type))
            .and(body_string(form))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 11 })))
            .expect(1)
            .mount(&server)
            .await;

        let response = router_for(Some(&server.uri()))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/diagnoses/create")
                    .header(header::AUTHORIZATION, "Bearer abc")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(form))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json_of(response).await, json!({ "id": 11 }));
    }

    #[tokio::test]
    async fn test_variety_create_with_empty_answer_is_201() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/varieties/create"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let response = router_for(Some(&server.uri()))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/varieties/create")
                    .header(header::AUTHORIZATION, "Bearer abc")
                    .header(header::CONTENT_TYPE, "multipart/form-data; boundary=x")
                    .body(Body::from("--x--\r\n"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json_of(response).await, json!({}));
    }

    #[tokio::test]
    async fn test_analysis_history_is_relayed_per_category() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/diagnoses/user/42"))
            .and(header_is("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/varieties/user/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 2 }])))
            .expect(1)
            .mount(&server)
            .await;

        let app = router_for(Some(&server.uri()));
        for (uri, expected) in [
            ("/api/diagnoses/user/42", json!([{ "id": 1 }])),
            ("/api/varieties/user/42", json!([{ "id": 2 }])),
        ] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(uri)
                        .header(header::AUTHORIZATION, "Bearer abc")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            assert_eq!(body_json_of(response).await, expected);
        }
    }

    #[tokio::test]
    async fn test_upstream_error_status_and_text_are_relayed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tasks/3/complete"))
            .respond_with(ResponseTemplate::new(403).set_body_string("not your task"))
            .mount(&server)
            .await;

        let response = router_for(Some(&server.uri()))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tasks/3/complete")
                    .header(header::AUTHORIZATION, "Bearer abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json_of(response).await,
            json!({ "error": "not your task" })
        );
    }

    #[tokio::test]
    async fn test_empty_success_body_relays_as_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tasks/3/complete"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let response = router_for(Some(&server.uri()))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tasks/3/complete")
                    .header(header::AUTHORIZATION, "Bearer abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json_of(response).await, json!({}));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_502() {
        let response = router_for(Some("http://127.0.0.1:9"))
            .oneshot(
                Request::builder()
                    .uri("/api/plantings")
                    .header(header::AUTHORIZATION, "Bearer abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_json_of(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let response = router_for(None)
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json_of(response).await, json!({ "error": "Not found" }));
    }
}
