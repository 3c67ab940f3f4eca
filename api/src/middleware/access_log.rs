use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service, ServiceExt};

/// Tower Layer for per-request access logging.
///
/// Emits one `http_access` event per request with the resource family and id
/// parsed from the path, the response status, and latency.
#[derive(Clone, Default)]
pub struct AccessLogLayer;

impl AccessLogLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

#[derive(Clone)]
pub struct AccessLogService<S> {
    inner: S,
}

impl<S> Service<Request> for AccessLogService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);

        Box::pin(async move {
            let path = req.uri().path().to_owned();
            if path == "/health" {
                return Ok(ready.oneshot(req).await.into_response());
            }

            let start = Instant::now();
            let method = req.method().to_string();
            let response = ready.oneshot(req).await.into_response();

            let status = response.status().as_u16();
            let latency_ms = start.elapsed().as_millis().min(u64::MAX as u128) as u64;
            let (resource, id) = parse_resource_path(&path);

            if response.status().is_server_error() {
                tracing::warn!(
                    event = "http_access",
                    method = %method,
                    path = %path,
                    resource = resource.as_deref(),
                    id = id.as_deref(),
                    status,
                    latency_ms,
                    "request completed with server error"
                );
            } else {
                tracing::info!(
                    event = "http_access",
                    method = %method,
                    path = %path,
                    resource = resource.as_deref(),
                    id = id.as_deref(),
                    status,
                    latency_ms,
                    "request completed"
                );
            }

            Ok(response)
        })
    }
}

/// Parse resource family and id from `/{resource}/{id}[/...]`.
fn parse_resource_path(path: &str) -> (Option<String>, Option<String>) {
    let rest = path.trim_start_matches('/');
    let parts: Vec<&str> = rest.splitn(3, '/').collect();
    match parts.as_slice() {
        [resource, id, ..] if !resource.is_empty() && !id.is_empty() => {
            (Some((*resource).to_string()), Some((*id).to_string()))
        }
        [resource, ..] if !resource.is_empty() => (Some((*resource).to_string()), None),
        _ => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    #[test]
    fn parse_resource_with_id() {
        assert_eq!(
            parse_resource_path("/deals/42"),
            (Some("deals".into()), Some("42".into()))
        );
    }

    #[test]
    fn parse_resource_collection() {
        assert_eq!(
            parse_resource_path("/organizations"),
            (Some("organizations".into()), None)
        );
    }

    #[test]
    fn parse_relation_path_keeps_owner_id() {
        assert_eq!(
            parse_resource_path("/pipelines/3/stages"),
            (Some("pipelines".into()), Some("3".into()))
        );
    }

    #[test]
    fn parse_current_user() {
        assert_eq!(
            parse_resource_path("/users/me"),
            (Some("users".into()), Some("me".into()))
        );
    }

    #[test]
    fn parse_root_path() {
        assert_eq!(parse_resource_path("/"), (None, None));
    }

    #[tokio::test]
    async fn passes_responses_through_unchanged() {
        let app = Router::new()
            .route("/deals", get(|| async { (StatusCode::CREATED, "ok") }))
            .layer(AccessLogLayer::new());

        let response = app
            .oneshot(Request::builder().uri("/deals").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
