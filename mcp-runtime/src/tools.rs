use crm_gateway_core::catalog::{self, ParamSpec, ParamType, ToolOp, ToolSpec};
use crm_gateway_core::error::codes;
use crm_gateway_core::options::ListParams;
use crm_gateway_core::{Gateway, GatewayError, Operation, Outcome, ResourceKind};
use serde_json::{Map, Number, Value, json};

use crate::RpcError;
use crate::util::to_pretty_json;

#[derive(Debug, Clone)]
pub(crate) struct ToolError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
}

impl ToolError {
    fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
        }
    }

    fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::new(codes::VALIDATION_FAILED, message).with_field(field)
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.code,
            "message": self.message,
        });
        if let Some(field) = &self.field {
            payload["field"] = json!(field);
        }
        payload
    }
}

impl From<&GatewayError> for ToolError {
    fn from(err: &GatewayError) -> Self {
        let mut tool_error = ToolError::new(err.code(), err.to_string());
        if let GatewayError::InvalidInput { field: Some(field), .. } = err {
            tool_error.field = Some(field.clone());
        }
        tool_error
    }
}

pub fn tools_list_payload() -> Value {
    let tools: Vec<Value> = catalog::TOOLS
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema(),
            })
        })
        .collect();
    json!({ "tools": tools })
}

/// Runs a catalog tool. Operation failures come back as `isError` text
/// content; only an unknown tool name is a protocol error.
pub(crate) async fn call_tool(
    gateway: &Gateway,
    name: &str,
    args: &Map<String, Value>,
) -> Result<Value, RpcError> {
    let tool = catalog::find(name)
        .ok_or_else(|| RpcError::invalid_params(format!("Unknown tool: {name}")))?;

    let operation = match build_operation(tool, args) {
        Ok(operation) => operation,
        Err(err) => return Ok(error_result(tool, &err)),
    };
    let kind = operation.kind();
    match gateway.execute(operation).await {
        Ok(outcome) => Ok(outcome_result(kind, outcome)),
        Err(err) => Ok(error_result(tool, &ToolError::from(&err))),
    }
}

fn build_operation(tool: &ToolSpec, args: &Map<String, Value>) -> Result<Operation, ToolError> {
    let mut values = validated_args(tool.params, args)?;
    let operation = match tool.op {
        ToolOp::List(kind) => {
            let params: ListParams = serde_json::from_value(Value::Object(values))
                .map_err(|e| ToolError::new(codes::VALIDATION_FAILED, e.to_string()))?;
            Operation::List { kind, params }
        }
        ToolOp::Get(kind, id_param) => Operation::Get {
            kind,
            id: take_id(&mut values, id_param)?,
        },
        ToolOp::Create(kind) => Operation::Create {
            kind,
            body: Value::Object(values),
        },
        ToolOp::Update(kind, id_param) => {
            let id = take_id(&mut values, id_param)?;
            Operation::Update {
                kind,
                id,
                body: Value::Object(values),
            }
        }
    };
    Ok(operation)
}

/// Type-checks declared arguments and drops everything else.
fn validated_args(
    params: &[ParamSpec],
    args: &Map<String, Value>,
) -> Result<Map<String, Value>, ToolError> {
    let mut values = Map::new();
    for param in params {
        let value = match param.kind {
            ParamType::Integer => arg_optional_i64(args, param.name)?.map(Value::from),
            ParamType::Number => arg_optional_number(args, param.name)?.map(Value::Number),
            ParamType::String => arg_optional_string(args, param.name)?.map(Value::String),
            ParamType::Enum(allowed) => {
                arg_optional_enum(args, param.name, allowed)?.map(Value::String)
            }
        };
        match value {
            Some(value) => {
                values.insert(param.name.to_string(), value);
            }
            None if param.required => {
                return Err(ToolError::validation(
                    param.name,
                    format!("Missing required field '{}'", param.name),
                ));
            }
            None => {}
        }
    }
    Ok(values)
}

fn take_id(values: &mut Map<String, Value>, key: &str) -> Result<String, ToolError> {
    match values.remove(key) {
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ToolError::validation(key, format!("Missing required field '{key}'"))),
    }
}

fn arg_optional_i64(args: &Map<String, Value>, key: &str) -> Result<Option<i64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| ToolError::validation(key, format!("'{key}' must be an integer"))),
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be an integer"))),
    }
}

fn arg_optional_number(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Number>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.clone())),
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be a number"))),
    }
}

fn arg_optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be a string"))),
    }
}

fn arg_optional_enum(
    args: &Map<String, Value>,
    key: &str,
    allowed: &[&str],
) -> Result<Option<String>, ToolError> {
    let Some(value) = arg_optional_string(args, key)? else {
        return Ok(None);
    };
    if allowed.contains(&value.as_str()) {
        Ok(Some(value))
    } else {
        Err(ToolError::validation(
            key,
            format!("'{key}' must be one of: {}", allowed.join(", ")),
        ))
    }
}

fn outcome_result(kind: ResourceKind, outcome: Outcome) -> Value {
    let text = match outcome {
        Outcome::Listed(items) => to_pretty_json(&Value::Array(items)),
        Outcome::Found(item) => to_pretty_json(&item),
        Outcome::Created(item) => {
            format!("{} created successfully: {}", kind.label(), to_pretty_json(&item))
        }
        Outcome::Updated(item) => {
            format!("{} updated successfully: {}", kind.label(), to_pretty_json(&item))
        }
        Outcome::Deleted => format!("{} deleted successfully", kind.label()),
        Outcome::NotFound { message } => message,
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": false,
    })
}

fn error_result(tool: &ToolSpec, err: &ToolError) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": format!("Error {}: {}", tool.action, err.message),
        }],
        "isError": true,
        "structuredContent": err.to_value(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crm_gateway_core::options::LooseInt;
    use crm_gateway_core::testing::{FakeTransport, gateway_with};
    use reqwest::Method;

    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn text(result: &Value) -> &str {
        result["content"][0]["text"].as_str().unwrap()
    }

    #[test]
    fn tools_list_exposes_every_catalog_entry() {
        let payload = tools_list_payload();
        let tools = payload["tools"].as_array().unwrap();
        assert_eq!(tools.len(), catalog::TOOLS.len());
        let get_deal = tools.iter().find(|t| t["name"] == "get_deal").unwrap();
        assert_eq!(get_deal["inputSchema"]["required"], json!(["deal_id"]));
    }

    #[test]
    fn list_tools_map_arguments_to_list_params() {
        let tool = catalog::find("get_deals").unwrap();
        let operation = build_operation(
            tool,
            &args(json!({"status": "won", "limit": 5, "ignored": true})),
        )
        .unwrap();
        let Operation::List { kind, params } = operation else {
            panic!("expected list operation");
        };
        assert_eq!(kind, ResourceKind::Deal);
        assert_eq!(params.status.as_deref(), Some("won"));
        assert_eq!(params.limit, Some(LooseInt::Int(5)));
    }

    #[test]
    fn update_splits_id_from_body() {
        let tool = catalog::find("update_deal").unwrap();
        let operation =
            build_operation(tool, &args(json!({"deal_id": 7, "value": 1500.5}))).unwrap();
        let Operation::Update { id, body, .. } = operation else {
            panic!("expected update operation");
        };
        assert_eq!(id, "7");
        assert_eq!(body, json!({"value": 1500.5}));

        let operation =
            build_operation(tool, &args(json!({"deal_id": 7, "value": 1200}))).unwrap();
        let Operation::Update { body, .. } = operation else {
            panic!("expected update operation");
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"value":1200}"#);
    }

    #[test]
    fn wrong_types_and_enum_values_are_rejected() {
        let tool = catalog::find("get_deal").unwrap();
        let err = build_operation(tool, &args(json!({"deal_id": "seven"}))).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("deal_id"));

        let tool = catalog::find("get_deals").unwrap();
        let err = build_operation(tool, &args(json!({"status": "archived"}))).unwrap_err();
        assert!(err.message.contains("open, won, lost"));
    }

    #[tokio::test]
    async fn get_deal_renders_pretty_json() {
        let fake = Arc::new(FakeTransport::new().on(
            Method::GET,
            "deals/42",
            200,
            json!({"success": true, "data": {"id": 42, "title": "Big"}}),
        ));
        let gateway = gateway_with(fake);
        let result = call_tool(&gateway, "get_deal", &args(json!({"deal_id": 42})))
            .await
            .unwrap();
        assert_eq!(result["isError"], false);
        let parsed: Value = serde_json::from_str(text(&result)).unwrap();
        assert_eq!(parsed["title"], "Big");
    }

    #[tokio::test]
    async fn get_deals_sends_paging_and_filters_upstream() {
        let fake = Arc::new(FakeTransport::new().on(
            Method::GET,
            "deals",
            200,
            json!({"success": true, "data": []}),
        ));
        let gateway = gateway_with(fake.clone());
        let pairs = |list: &[(&str, &str)]| -> Vec<(String, String)> {
            list.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };

        call_tool(&gateway, "get_deals", &Map::new()).await.unwrap();
        assert_eq!(
            fake.last_request().unwrap().query,
            pairs(&[("limit", "100"), ("start", "0")])
        );

        call_tool(&gateway, "get_deals", &args(json!({"limit": 5, "filter_id": 7})))
            .await
            .unwrap();
        assert_eq!(
            fake.last_request().unwrap().query,
            pairs(&[("limit", "5"), ("start", "0"), ("filter_id", "7")])
        );
    }

    #[tokio::test]
    async fn missing_deal_is_plain_text() {
        let gateway = gateway_with(Arc::new(FakeTransport::new()));
        let result = call_tool(&gateway, "get_deal", &args(json!({"deal_id": 404})))
            .await
            .unwrap();
        assert_eq!(text(&result), "Deal not found");
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn create_deal_confirms_with_payload() {
        let fake = Arc::new(FakeTransport::new().on(
            Method::POST,
            "deals",
            201,
            json!({"success": true, "data": {"id": 9, "title": "New"}}),
        ));
        let gateway = gateway_with(fake.clone());
        let result = call_tool(&gateway, "create_deal", &args(json!({"title": "New"})))
            .await
            .unwrap();
        assert!(text(&result).starts_with("Deal created successfully: {"));
        assert_eq!(fake.last_request().unwrap().body, Some(json!({"title": "New"})));
    }

    #[tokio::test]
    async fn upstream_failures_are_tool_errors() {
        let fake = Arc::new(FakeTransport::new().unreachable(
            Method::GET,
            "deals",
            "connection refused",
        ));
        let gateway = gateway_with(fake);
        let result = call_tool(&gateway, "get_deals", &Map::new()).await.unwrap();
        assert_eq!(result["isError"], true);
        assert!(text(&result).starts_with("Error getting deals: "));
        assert_eq!(result["structuredContent"]["error"], "upstream_unavailable");
    }

    #[tokio::test]
    async fn missing_required_argument_is_a_tool_error() {
        let gateway = gateway_with(Arc::new(FakeTransport::new()));
        let result = call_tool(&gateway, "create_deal", &Map::new()).await.unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(
            text(&result),
            "Error creating deal: Missing required field 'title'"
        );
    }

    #[tokio::test]
    async fn unknown_tools_are_protocol_errors() {
        let gateway = gateway_with(Arc::new(FakeTransport::new()));
        let err = call_tool(&gateway, "drop_tables", &Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, -32602);
    }
}
