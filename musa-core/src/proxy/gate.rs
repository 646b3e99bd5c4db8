//! Cookie gate for page paths
//!
//! API routes check the `Authorization` header themselves. Page paths are
//! gated on the `authToken` and `userRole` cookies.

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::access::{gate, Access, SIGN_IN_PATH};
use crate::session::Role;

const TOKEN_COOKIE: &str = "authToken";
const ROLE_COOKIE: &str = "userRole";

pub async fn gate_pages(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if path.starts_with("/api/") {
        return next.run(request).await;
    }

    let headers = request.headers();
    let has_token = cookie(headers, TOKEN_COOKIE).is_some_and(|t| !t.is_empty());
    let role = cookie(headers, ROLE_COOKIE).map(role_from_cookie);

    match gate(path, has_token, role.as_ref()) {
        Access::Allow => next.run(request).await,
        Access::RedirectToSignIn => {
            tracing::debug!(path, has_token, "Redirecting to sign-in");
            Redirect::temporary(SIGN_IN_PATH).into_response()
        }
    }
}

/// The role cookie is matched exactly; `admin` is not `ADMIN`.
fn role_from_cookie(value: &str) -> Role {
    match value {
        "ADMIN" => Role::Admin,
        "FARMER" => Role::Farmer,
        other => Role::Other(other.to_string()),
    }
}

/// Value of the first cookie called `name`
fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request as HttpRequest, StatusCode};
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/admin/users", get(|| async { "admin" }))
            .route("/dashboard", get(|| async { "dashboard" }))
            .route("/", get(|| async { "home" }))
            .layer(middleware::from_fn(gate_pages))
    }

    async fn status_of(uri: &str, cookies: Option<&str>) -> (StatusCode, Option<String>) {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(cookies) = cookies {
            builder = builder.header(header::COOKIE, cookies);
        }
        let response = app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        (response.status(), location)
    }

    #[tokio::test]
    async fn test_admin_needs_admin_cookie() {
        let (status, location) = status_of("/admin/users", Some("authToken=t; userRole=FARMER")).await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location.as_deref(), Some("/sign-in"));

        let (status, _) = status_of("/admin/users", Some("authToken=t; userRole=ADMIN")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_cookie_is_case_sensitive() {
        for role in ["admin", "Admin"] {
            let cookies = format!("authToken=t; userRole={role}");
            let (status, location) = status_of("/admin/users", Some(&cookies)).await;
            assert_eq!(status, StatusCode::TEMPORARY_REDIRECT, "userRole={role}");
            assert_eq!(location.as_deref(), Some("/sign-in"));
        }
        assert_eq!(role_from_cookie("admin"), Role::Other("admin".to_string()));
        assert_eq!(role_from_cookie("ADMIN"), Role::Admin);
    }

    #[tokio::test]
    async fn test_dashboard_needs_token_cookie() {
        let (status, _) = status_of("/dashboard", None).await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);

        let (status, _) = status_of("/dashboard", Some("authToken=abc")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = status_of("/", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; authToken=xyz"));
        headers.append(header::COOKIE, HeaderValue::from_static("userRole=ADMIN"));

        assert_eq!(cookie(&headers, "authToken"), Some("xyz"));
        assert_eq!(cookie(&headers, "userRole"), Some("ADMIN"));
        assert_eq!(cookie(&headers, "missing"), None);
    }
}
