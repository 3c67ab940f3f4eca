//! Model Context Protocol server for the CRM gateway.
//!
//! Speaks JSON-RPC 2.0 over stdio (newline-delimited or `Content-Length`
//! framed) and, through [`handle_http_jsonrpc`], over the REST server's
//! `POST /mcp` endpoint. Tools and resources both dispatch into the shared
//! [`Gateway`].

use std::sync::Arc;

use clap::Subcommand;
use crm_gateway_core::{CrmClient, CrmConfig, Gateway};
use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufRead, AsyncWrite, BufReader};

mod resources;
mod tools;
mod util;

pub use tools::tools_list_payload;
pub use util::to_pretty_json;

use util::{read_frame, write_frame};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "crm-gateway-mcp";

#[derive(Subcommand, Debug, Clone)]
pub enum McpCommands {
    /// Serve MCP over stdio
    Serve,
    /// Print the tool catalog as JSON and exit
    Tools,
}

pub async fn run(config: CrmConfig, command: McpCommands) -> i32 {
    match command {
        McpCommands::Tools => {
            println!("{}", to_pretty_json(&tools_list_payload()));
            0
        }
        McpCommands::Serve => {
            let client = match CrmClient::initialize(&config) {
                Ok(client) => client,
                Err(err) => {
                    tracing::error!(
                        event = "startup_failed",
                        error = %err,
                        "Failed to initialize CRM client"
                    );
                    return 1;
                }
            };
            let server = McpServer::new(Arc::new(Gateway::new(client)));
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    tracing::error!(
                        event = "mcp_server_error",
                        error = %err,
                        "MCP server stopped"
                    );
                    1
                }
            }
        }
    }
}

/// Handles one JSON-RPC message (or batch) received over HTTP. Returns the
/// responses to send; empty when every message was a notification.
pub async fn handle_http_jsonrpc(gateway: Arc<Gateway>, incoming: Value) -> Vec<Value> {
    McpServer::new(gateway).handle_incoming_message(incoming).await
}

pub struct McpServer {
    gateway: Arc<Gateway>,
}

impl McpServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub async fn serve_stdio(&self) -> Result<(), String> {
        tracing::info!(
            event = "mcp_server_started",
            server = MCP_SERVER_NAME,
            version = env!("CARGO_PKG_VERSION"),
            "MCP server listening on stdio"
        );
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Message loop over any reader/writer pair. Runs until EOF.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        while let Some(frame) = read_frame(&mut reader).await? {
            let responses = match frame.payload {
                Ok(incoming) => self.handle_incoming_message(incoming).await,
                Err(detail) => {
                    tracing::warn!(
                        event = "mcp_parse_error",
                        error = %detail,
                        "Unparseable MCP message"
                    );
                    vec![error_response(Value::Null, RpcError::parse_error(detail))]
                }
            };
            for response in responses {
                write_frame(&mut writer, &response, frame.framing).await?;
            }
        }
        tracing::info!(event = "mcp_server_stopped", "MCP input closed");
        Ok(())
    }

    async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A response to something we never sent; nothing to answer.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            tracing::debug!(event = "mcp_request", method, "MCP request");
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => {
                    tracing::warn!(
                        event = "mcp_request_failed",
                        method,
                        code = err.code,
                        error = %err.message,
                        "MCP request failed"
                    );
                    error_response(id, err)
                }
            })
        } else {
            self.handle_notification(method);
            None
        }
    }

    fn handle_notification(&self, method: &str) {
        tracing::debug!(event = "mcp_notification", method, "MCP notification");
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(resources::resources_list_payload()),
            "resources/templates/list" => Ok(resources::resource_templates_payload()),
            "resources/read" => resources::read(&self.gateway, &params_object(&params)?).await,
            "resources/get" => resources::get(&self.gateway, &params_object(&params)?).await,
            "resources/list_children" => {
                resources::list_children(&self.gateway, &params_object(&params)?).await
            }
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params_object(&params)?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires a string 'name'"))?;
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(arguments)) => arguments.clone(),
            Some(_) => return Err(RpcError::invalid_params("'arguments' must be an object")),
        };
        tools::call_tool(&self.gateway, name, &arguments).await
    }
}

fn initialize_payload() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "listChanged": false },
            "prompts": { "listChanged": false }
        },
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": INSTRUCTIONS
    })
}

const INSTRUCTIONS: &str = concat!(
    "Use the get_* tools to read deals, persons, organizations, activities, pipelines, ",
    "notes and users; create_deal and update_deal write deals. Browse crm:// resources ",
    "for summaries, starting at crm:// itself."
);

fn params_object(params: &Value) -> Result<Map<String, Value>, RpcError> {
    match params {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        _ => Err(RpcError::invalid_params("params must be an object")),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    fn parse_error(detail: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: "Parse error".to_string(),
            data: Some(json!({ "detail": detail.into() })),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    pub(crate) fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
            data: None,
        }
    }

    pub(crate) fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    let mut payload = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    });
    if let Some(data) = error.data {
        payload["error"]["data"] = data;
    }
    payload
}

#[cfg(test)]
mod tests {
    use crm_gateway_core::testing::{FakeTransport, gateway_with};
    use reqwest::Method;

    use super::*;

    fn server() -> McpServer {
        let fake = FakeTransport::new().on(
            Method::GET,
            "pipelines",
            200,
            json!({"success": true, "data": [{"id": 1, "name": "Sales"}]}),
        );
        McpServer::new(gateway_with(Arc::new(fake)))
    }

    async fn request(server: &McpServer, message: Value) -> Value {
        let mut responses = server.handle_incoming_message(message).await;
        assert_eq!(responses.len(), 1);
        responses.remove(0)
    }

    #[tokio::test]
    async fn initialize_advertises_protocol_and_capabilities() {
        let response = request(
            &server(),
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        )
        .await;
        assert_eq!(response["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], MCP_SERVER_NAME);
        assert!(response["result"]["capabilities"]["resources"].is_object());
    }

    #[tokio::test]
    async fn unknown_methods_are_method_not_found() {
        let response = request(
            &server(),
            json!({"jsonrpc": "2.0", "id": "a", "method": "sampling/createMessage"}),
        )
        .await;
        assert_eq!(response["id"], "a");
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn wrong_jsonrpc_version_is_invalid_request() {
        let message = json!({"jsonrpc": "1.0", "id": 3, "method": "ping"});
        let response = request(&server(), message).await;
        assert_eq!(response["error"]["code"], -32600);
        assert_eq!(response["id"], 3);
    }

    #[tokio::test]
    async fn empty_batches_are_rejected() {
        let response = request(&server(), json!([])).await;
        assert_eq!(response["error"]["message"], "Batch request must not be empty");
    }

    #[tokio::test]
    async fn notifications_and_client_responses_get_no_reply() {
        let server = server();
        let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        assert!(server.handle_incoming_message(notification).await.is_empty());
        assert!(
            server
                .handle_incoming_message(json!({"jsonrpc": "2.0", "id": 4, "result": {}}))
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn tools_call_dispatches_into_the_gateway() {
        let response = request(
            &server(),
            json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "tools/call",
                "params": {"name": "get_pipelines"}
            }),
        )
        .await;
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let pipelines: Value = serde_json::from_str(text).unwrap();
        assert_eq!(pipelines[0]["name"], "Sales");
    }

    #[tokio::test]
    async fn tools_call_rejects_non_object_arguments() {
        let response = request(
            &server(),
            json!({
                "jsonrpc": "2.0",
                "id": 6,
                "method": "tools/call",
                "params": {"name": "get_deals", "arguments": [1, 2]}
            }),
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn stdio_loop_survives_a_bad_content_length() {
        let input = concat!(
            "Content-Length: abc\r\n\r\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n",
        );
        let mut output = Vec::new();
        server()
            .serve(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();
        let output = String::from_utf8(output).unwrap();

        let (headers, bodies) = output.rsplit_once("\r\n\r\n").unwrap();
        assert!(headers.starts_with("Content-Length: "));
        let mut values = serde_json::Deserializer::from_str(bodies).into_iter::<Value>();
        let error = values.next().unwrap().unwrap();
        assert_eq!(error["error"]["code"], -32700);
        let pong = values.next().unwrap().unwrap();
        assert_eq!(pong, json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
    }

    #[tokio::test]
    async fn stdio_loop_mirrors_framing_and_reports_parse_errors() {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let input = format!(
            "{{broken\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let mut output = Vec::new();
        server()
            .serve(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();
        let output = String::from_utf8(output).unwrap();

        let (first, rest) = output.split_once('\n').unwrap();
        let parse_error: Value = serde_json::from_str(first).unwrap();
        assert_eq!(parse_error["error"]["code"], -32700);
        assert_eq!(parse_error["id"], Value::Null);

        assert!(rest.starts_with("Content-Length: "));
        let (_, framed) = rest.split_once("\r\n\r\n").unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(framed).unwrap(),
            json!({"jsonrpc": "2.0", "id": 1, "result": {}})
        );
    }
}
