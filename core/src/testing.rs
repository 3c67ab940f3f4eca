//! In-memory upstream for tests: canned responses keyed by method and path,
//! with every request recorded.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};

use crate::client::{CrmClient, UpstreamRequest, UpstreamResponse, UpstreamTransport};
use crate::error::GatewayError;
use crate::gateway::Gateway;

enum Reply {
    Response(UpstreamResponse),
    Unreachable(String),
}

#[derive(Default)]
pub struct FakeTransport {
    routes: Vec<(Method, String, Reply)>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method path` (e.g. `GET deals/42`) with `status` and `body`.
    pub fn on(mut self, method: Method, path: &str, status: u16, body: Value) -> Self {
        self.routes.push((
            method,
            path.to_string(),
            Reply::Response(UpstreamResponse { status, body }),
        ));
        self
    }

    /// Fail `method path` as if the upstream could not be reached.
    pub fn unreachable(mut self, method: Method, path: &str, message: &str) -> Self {
        self.routes
            .push((method, path.to_string(), Reply::Unreachable(message.to_string())));
        self
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_request(&self) -> Option<UpstreamRequest> {
        self.requests().pop()
    }
}

#[async_trait]
impl UpstreamTransport for FakeTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, GatewayError> {
        let path = request.path();
        let method = request.method.clone();
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        match self
            .routes
            .iter()
            .find(|(m, p, _)| *m == method && *p == path)
            .map(|(_, _, reply)| reply)
        {
            Some(Reply::Response(response)) => Ok(response.clone()),
            Some(Reply::Unreachable(message)) => Err(GatewayError::transport(message.clone())),
            None => Ok(UpstreamResponse {
                status: 404,
                body: json!({"success": false, "error": format!("no route for {method} {path}")}),
            }),
        }
    }
}

/// Gateway wired to `fake`; keep the `Arc` to inspect recorded requests.
pub fn gateway_with(fake: Arc<FakeTransport>) -> Arc<Gateway> {
    Arc::new(Gateway::new(CrmClient::with_transport(fake)))
}
