use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/tools", get(list_tools))
}

/// Capability document: every agent-facing operation and its parameters
pub async fn list_tools() -> Json<Value> {
    Json(crm_gateway_core::catalog::capability_document())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use crm_gateway_core::testing::{FakeTransport, gateway_with};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn lists_tool_methods() {
        let app = router().with_state(AppState::new(gateway_with(Arc::new(FakeTransport::new()))));
        let response = app
            .oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let names: Vec<&str> = body["tools"][0]["methods"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|m| m["name"].as_str())
            .collect();
        assert!(names.contains(&"get_deals"));
        assert!(names.contains(&"update_deal"));
    }
}
