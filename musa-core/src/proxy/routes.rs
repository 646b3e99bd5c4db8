//! Proxy route handlers

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};

use super::ProxyState;
use crate::logging::fingerprint;
use crate::types::AnalysisCategory;

/// POST /api/tasks/:task_id/complete
pub async fn complete_task(
    State(state): State<ProxyState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let path = format!("/api/tasks/{}/complete", urlencoding::encode(&task_id));
    forward(&state, Method::POST, &path, &headers, None, StatusCode::OK).await
}

/// GET /api/plantings/:id
pub async fn get_planting(
    State(state): State<ProxyState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let path = format!("/api/plantings/{}", urlencoding::encode(&id));
    forward(&state, Method::GET, &path, &headers, None, StatusCode::OK).await
}

/// GET /api/plantings
pub async fn list_plantings(State(state): State<ProxyState>, headers: HeaderMap) -> Response {
    forward(
        &state,
        Method::GET,
        "/api/plantings",
        &headers,
        None,
        StatusCode::OK,
    )
    .await
}

/// POST /api/plantings
pub async fn create_planting(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward(
        &state,
        Method::POST,
        "/api/plantings",
        &headers,
        Some(body),
        StatusCode::CREATED,
    )
    .await
}

/// GET /api/plantings/active
pub async fn active_plantings(State(state): State<ProxyState>, headers: HeaderMap) -> Response {
    forward(
        &state,
        Method::GET,
        "/api/plantings/active",
        &headers,
        None,
        StatusCode::OK,
    )
    .await
}

/// POST /api/diagnoses/create
pub async fn create_diagnosis(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    create_analysis(&state, AnalysisCategory::Disease, &headers, body).await
}

/// POST /api/varieties/create
pub async fn create_variety(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    create_analysis(&state, AnalysisCategory::Variety, &headers, body).await
}

/// GET /api/diagnoses/user/:user_id
pub async fn diagnosis_history(
    State(state): State<ProxyState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    analysis_history(&state, AnalysisCategory::Disease, &user_id, &headers).await
}

/// GET /api/varieties/user/:user_id
pub async fn variety_history(
    State(state): State<ProxyState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    analysis_history(&state, AnalysisCategory::Variety, &user_id, &headers).await
}

/// The multipart body and its `Content-Type` (with the boundary) go upstream untouched.
async fn create_analysis(
    state: &ProxyState,
    category: AnalysisCategory,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/api/{}/create", category.resource());
    forward(
        state,
        Method::POST,
        &path,
        headers,
        Some(body),
        StatusCode::CREATED,
    )
    .await
}

async fn analysis_history(
    state: &ProxyState,
    category: AnalysisCategory,
    user_id: &str,
    headers: &HeaderMap,
) -> Response {
    let path = format!(
        "/api/{}/user/{}",
        category.resource(),
        urlencoding::encode(user_id)
    );
    forward(state, Method::GET, &path, headers, None, StatusCode::OK).await
}

pub async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

pub(super) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Forward one request upstream and translate the answer.
///
/// Nothing is retried or cached.
async fn forward(
    state: &ProxyState,
    method: Method,
    path: &str,
    headers: &HeaderMap,
    body: Option<Bytes>,
    success: StatusCode,
) -> Response {
    let Some(authorization) = headers.get(header::AUTHORIZATION) else {
        return error_response(StatusCode::UNAUTHORIZED, "Authorization header missing");
    };
    let Some(upstream) = state.upstream() else {
        tracing::error!(path, "Backend URL not configured");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Backend URL not configured");
    };

    let url = format!("{}{}", upstream, path);
    tracing::debug!(
        %method,
        %url,
        token = %fingerprint(authorization.to_str().unwrap_or_default()),
        "Forwarding request"
    );

    let mut request = state
        .client
        .request(method.clone(), &url)
        .header(header::AUTHORIZATION, authorization.clone());
    if let Some(body) = body {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));
        request = request.header(header::CONTENT_TYPE, content_type).body(body);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(%method, %url, error = %e, "Backend unreachable");
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("Failed to reach backend: {}", e),
            );
        }
    };

    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(%method, %url, error = %e, "Failed to read backend response");
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("Failed to read backend response: {}", e),
            );
        }
    };

    if !status.is_success() {
        tracing::info!(%method, %url, status = status.as_u16(), "Backend returned an error");
        return error_response(status, text);
    }

    if text.trim().is_empty() {
        return (success, Json(json!({}))).into_response();
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(value) => (success, Json(value)).into_response(),
        Err(e) => {
            tracing::warn!(%method, %url, error = %e, "Backend returned invalid JSON");
            error_response(
                StatusCode::BAD_GATEWAY,
                format!("Invalid JSON from backend: {}", e),
            )
        }
    }
}
