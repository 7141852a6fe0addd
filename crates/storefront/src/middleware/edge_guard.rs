//! Pre-render route filter.
//!
//! Runs before any protected page is rendered, on the server that serves the
//! pages. It only checks whether the session cookie is *present*: with no
//! cookie the request is treated as a guest and the route policy decides;
//! with a cookie the request passes and the backend authorizes it. Role checks
//! happen later, client-side, in [`crate::guard::RouteGuard`].

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use fads_core::ActorKind;

use crate::guard::{Decision, RoutePolicy};

/// State of [`presence_guard`].
#[derive(Debug, Clone)]
pub struct EdgeGuard {
    policy: Arc<RoutePolicy>,
    cookie: Arc<str>,
}

impl EdgeGuard {
    pub fn new(policy: Arc<RoutePolicy>, cookie: impl Into<Arc<str>>) -> Self {
        Self {
            policy,
            cookie: cookie.into(),
        }
    }

    /// Decide for a request path and its headers.
    #[must_use]
    pub fn decide(&self, path: &str, headers: &HeaderMap) -> Decision {
        if has_cookie(headers, &self.cookie) {
            Decision::Allow
        } else {
            self.policy.decide_for(path, ActorKind::Guest)
        }
    }
}

/// Whether a non-empty cookie called `name` was sent.
fn has_cookie(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(key, value)| key == name && !value.is_empty())
}

/// Middleware redirecting cookie-less requests for protected paths to the
/// sign-in page (`303 See Other`).
///
/// # Example
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/dashboard", get(dashboard))
///     .layer(axum::middleware::from_fn_with_state(edge_guard, presence_guard));
/// ```
pub async fn presence_guard(
    State(guard): State<EdgeGuard>,
    request: Request,
    next: Next,
) -> Response {
    match guard.decide(request.uri().path(), request.headers()) {
        Decision::Allow => next.run(request).await,
        Decision::Redirect { target, reason } => {
            tracing::debug!(
                path = %request.uri().path(),
                reason = %reason,
                "Edge filter redirect"
            );
            Redirect::to(&target).into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Router, body::Body, http::StatusCode, routing::get};
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        let guard = EdgeGuard::new(Arc::new(RoutePolicy::default()), "token");
        Router::new()
            .route("/", get(|| async { "home" }))
            .route("/dashboard", get(|| async { "dashboard" }))
            .route("/admin/products", get(|| async { "products" }))
            .route("/admin/login", get(|| async { "login" }))
            .layer(axum::middleware::from_fn_with_state(guard, presence_guard))
    }

    async fn get_path(path: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        app()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_cookie_redirects_protected_paths() {
        let response = get_path("/dashboard", None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/account/signin?reason=not-logged-in"
        );

        let response = get_path("/admin/products", Some("theme=dark")).await;
        assert_eq!(
            response.headers()[header::LOCATION],
            "/admin/login?reason=not-logged-in"
        );
    }

    #[tokio::test]
    async fn test_cookie_presence_is_enough() {
        // Any token passes: verification belongs to the backend.
        let response = get_path("/admin/products", Some("theme=dark; token=anything")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_empty_cookie_does_not_count() {
        let response = get_path("/dashboard", Some("token=")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_public_and_exempt_paths_pass() {
        assert_eq!(get_path("/", None).await.status(), StatusCode::OK);
        assert_eq!(get_path("/admin/login", None).await.status(), StatusCode::OK);
    }

    #[test]
    fn test_cookie_name_must_match_exactly() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "xtoken=1; token_old=2".parse().unwrap());
        assert!(!has_cookie(&headers, "token"));
        headers.append(header::COOKIE, "token=abc".parse().unwrap());
        assert!(has_cookie(&headers, "token"));
    }
}
