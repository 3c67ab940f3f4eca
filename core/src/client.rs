//! Upstream CRM client: a transport seam plus typed per-resource handles.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::error::GatewayError;
use crate::options::ListOptions;
use crate::resources::ResourceKind;

pub const DEFAULT_API_URL: &str = "https://api.pipedrive.com/v1";
const API_TOKEN_HEADER: &str = "x-api-token";
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Connection settings for the upstream CRM.
#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub api_token: Option<String>,
    pub api_url: String,
}

/// One upstream HTTP call, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path segments below the base URL; each is percent-encoded on send.
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl UpstreamRequest {
    pub fn new(method: Method, segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, options: &ListOptions) -> Self {
        self.query = options.query_pairs();
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// `deals/42` style rendering for logs.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the upstream. Returns `Err` only when no HTTP response
/// was obtained; status handling belongs to `CrmClient`.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, GatewayError>;
}

/// reqwest-backed transport authenticating with the static API token.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    api_token: String,
}

impl HttpTransport {
    pub fn new(base_url: Url, api_token: String) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("crm-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            api_token,
        })
    }

    fn url_for(&self, request: &UpstreamRequest) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                GatewayError::Configuration(format!(
                    "CRM API URL '{}' cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(&request.segments);
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

#[async_trait]
impl UpstreamTransport for HttpTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, GatewayError> {
        let url = self.url_for(&request)?;
        let operation = request.method.to_string();

        let mut builder = self
            .http
            .request(request.method, url.clone())
            .header(API_TOKEN_HEADER, &self.api_token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::transport(format_reqwest_error(&e, &url, &operation)))?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            GatewayError::transport(format!(
                "Failed to read response body from {}: {e}",
                redact(&url)
            ))
        })?;

        Ok(UpstreamResponse {
            status,
            body: parse_response_body(&bytes),
        })
    }
}

fn format_reqwest_error(e: &reqwest::Error, url: &Url, operation: &str) -> String {
    let url = redact(url);
    if e.is_timeout() {
        format!("{operation} {url} failed: timeout waiting for the CRM API")
    } else if e.is_connect() {
        format!("{operation} {url} failed: connection error, check network and DNS. Error: {e}")
    } else if e.is_request() {
        format!("{operation} {url} failed: malformed request. Error: {e}")
    } else {
        format!("{operation} {url} failed: {e}")
    }
}

/// URL without the query string, for log and error text.
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

fn parse_response_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}

/// Authenticated upstream session. Constructed once at startup and shared.
#[derive(Clone)]
pub struct CrmClient {
    transport: Arc<dyn UpstreamTransport>,
}

impl CrmClient {
    /// Builds the HTTP-backed client. Fails when the token is missing or the
    /// base URL does not parse.
    pub fn initialize(config: &CrmConfig) -> Result<Self, GatewayError> {
        let token = config
            .api_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                GatewayError::Configuration(
                    "CRM API token is not set. Provide --api-token or CRM_API_TOKEN".to_string(),
                )
            })?;
        let base_url = Url::parse(config.api_url.trim()).map_err(|e| {
            GatewayError::Configuration(format!("Invalid CRM API URL '{}': {e}", config.api_url))
        })?;

        let transport = HttpTransport::new(base_url.clone(), token.to_string())?;
        tracing::info!(
            event = "crm_client_initialized",
            api_url = %base_url,
            "CRM client initialized"
        );
        Ok(Self::with_transport(Arc::new(transport)))
    }

    pub fn with_transport(transport: Arc<dyn UpstreamTransport>) -> Self {
        Self { transport }
    }

    pub fn handle(&self, kind: ResourceKind) -> ResourceHandle<'_> {
        ResourceHandle { client: self, kind }
    }

    /// Handle for a resource family named by string (`deals`, `person`, ...).
    pub fn handle_by_name(&self, name: &str) -> Result<ResourceHandle<'_>, GatewayError> {
        Ok(self.handle(ResourceKind::parse(name)?))
    }

    async fn call(&self, request: UpstreamRequest) -> Result<UpstreamResponse, GatewayError> {
        let method = request.method.clone();
        let path = request.path();
        let response = self.transport.send(request).await?;
        tracing::debug!(
            event = "crm_upstream_call",
            method = %method,
            path = %path,
            status = response.status,
            "CRM API call completed"
        );
        Ok(response)
    }
}

/// Typed operations on one resource family.
#[derive(Clone, Copy)]
pub struct ResourceHandle<'a> {
    client: &'a CrmClient,
    kind: ResourceKind,
}

impl ResourceHandle<'_> {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn request(&self, method: Method, id: Option<&str>) -> UpstreamRequest {
        let mut segments = vec![self.kind.descriptor().upstream_path.to_string()];
        segments.extend(id.map(str::to_string));
        UpstreamRequest::new(method, segments)
    }

    /// Raw list response; pass it through `normalize`.
    pub async fn list(&self, options: &ListOptions) -> Result<Value, GatewayError> {
        let response = self
            .client
            .call(self.request(Method::GET, None).with_query(options))
            .await?;
        expect_success(response)
    }

    /// Single item, or `None` when the upstream reports nothing.
    pub async fn get(&self, id: &str) -> Result<Option<Value>, GatewayError> {
        let response = self.client.call(self.request(Method::GET, Some(id))).await?;
        optional_data(response)
    }

    pub async fn create(&self, body: Value) -> Result<Value, GatewayError> {
        let response = self
            .client
            .call(self.request(Method::POST, None).with_body(body))
            .await?;
        Ok(data_of(expect_success(response)?))
    }

    pub async fn update(&self, id: &str, body: Value) -> Result<Option<Value>, GatewayError> {
        let response = self
            .client
            .call(self.request(Method::PUT, Some(id)).with_body(body))
            .await?;
        optional_data(response)
    }

    /// `true` when the upstream confirms the deletion.
    pub async fn delete(&self, id: &str) -> Result<bool, GatewayError> {
        let response = self
            .client
            .call(self.request(Method::DELETE, Some(id)))
            .await?;
        if response.status == 404 {
            return Ok(false);
        }
        let body = expect_success(response)?;
        Ok(match body.get("data") {
            None | Some(Value::Null) => false,
            Some(data) => match data.get("success") {
                Some(flag) => flag.as_bool().unwrap_or(false),
                None => body.get("success").and_then(Value::as_bool).unwrap_or(true),
            },
        })
    }

    /// Raw response of `GET /{family}/{id}/{segment}`; `None` when the
    /// upstream answers 404 for the owning record.
    pub async fn nested(&self, id: &str, segment: &str) -> Result<Option<Value>, GatewayError> {
        let mut request = self.request(Method::GET, Some(id));
        request.segments.push(segment.to_string());
        let response = self.client.call(request).await?;
        if response.status == 404 {
            return Ok(None);
        }
        expect_success(response).map(Some)
    }

    /// `GET /{family}/me`; only meaningful for users.
    pub async fn current(&self) -> Result<Option<Value>, GatewayError> {
        let response = self.client.call(self.request(Method::GET, Some("me"))).await?;
        optional_data(response)
    }
}

fn expect_success(response: UpstreamResponse) -> Result<Value, GatewayError> {
    if response.is_success() {
        return Ok(response.body);
    }
    Err(GatewayError::Upstream {
        status: Some(response.status),
        message: format!(
            "CRM API responded with HTTP {}: {}",
            response.status,
            error_detail(&response.body)
        ),
    })
}

fn optional_data(response: UpstreamResponse) -> Result<Option<Value>, GatewayError> {
    if response.status == 404 {
        return Ok(None);
    }
    match data_of(expect_success(response)?) {
        Value::Null => Ok(None),
        data => Ok(Some(data)),
    }
}

fn data_of(mut body: Value) -> Value {
    body.get_mut("data").map(Value::take).unwrap_or(Value::Null)
}

fn error_detail(body: &Value) -> String {
    let detail = body
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| body.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| match body {
            Value::String(s) => s.clone(),
            Value::Null => "empty response body".to_string(),
            other => other.to_string(),
        });
    if detail.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = detail.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{truncated}... (truncated)")
    } else {
        detail
    }
}
