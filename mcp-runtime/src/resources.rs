use crm_gateway_core::uri::{self, ResourceUri};
use crm_gateway_core::{Gateway, GatewayError, ResourceKind, Resolved};
use serde_json::{Map, Value, json};

use crate::RpcError;
use crate::util::to_pretty_json;

const JSON_MIME: &str = "application/json";

pub(crate) fn resources_list_payload() -> Value {
    let mut resources = vec![json!({
        "uri": uri::ROOT,
        "name": "CRM Resources",
        "description": "Registry of every CRM resource collection",
        "mimeType": JSON_MIME,
    })];
    resources.extend(ResourceKind::ALL.iter().map(|kind| {
        let descriptor = kind.descriptor();
        json!({
            "uri": ResourceUri::collection(*kind).to_string(),
            "name": descriptor.collection_title,
            "description": descriptor.collection_description,
            "mimeType": JSON_MIME,
        })
    }));
    json!({ "resources": resources })
}

pub(crate) fn resource_templates_payload() -> Value {
    let templates: Vec<Value> = ResourceKind::ALL
        .iter()
        .map(|kind| {
            json!({
                "uriTemplate": format!("{}://{}/{{id}}", uri::SCHEME, kind.plural()),
                "name": kind.label(),
                "description": format!("A single {} by ID", kind.name()),
                "mimeType": JSON_MIME,
            })
        })
        .collect();
    json!({ "resourceTemplates": templates })
}

/// `resources/read`: registry, collection summaries, or a single item.
pub(crate) async fn read(
    gateway: &Gateway,
    params: &Map<String, Value>,
) -> Result<Value, RpcError> {
    let target = parse_uri(params)?;
    let resolved = match gateway.resolve(&target).await {
        Ok(resolved) => resolved,
        Err(err) => return failure_contents(&target, err),
    };
    let contents = match resolved {
        Resolved::Registry(document) => vec![json_content(&target, &document)],
        Resolved::Collection(entries) => {
            vec![json_content(&target, &json!({ "resources": entries }))]
        }
        Resolved::Item(Some(item)) => vec![json_content(&target, &item)],
        Resolved::Item(None) => Vec::new(),
    };
    Ok(json!({ "contents": contents }))
}

/// `resources/get`: like `read`, restricted to item URIs.
pub(crate) async fn get(
    gateway: &Gateway,
    params: &Map<String, Value>,
) -> Result<Value, RpcError> {
    let target = parse_uri(params)?;
    let kind = target.kind().map_err(rpc_error)?;
    let id = target.require_id().map_err(rpc_error)?;
    match gateway.resolve_one(kind, id).await {
        Ok(Some(item)) => Ok(json!({ "contents": [json_content(&target, &item)] })),
        Ok(None) => Ok(json!({ "contents": [] })),
        Err(err) => failure_contents(&target, err),
    }
}

/// `resources/list_children`: entries one level below a URI.
pub(crate) async fn list_children(
    gateway: &Gateway,
    params: &Map<String, Value>,
) -> Result<Value, RpcError> {
    let target = parse_uri(params)?;
    if target.is_root() {
        let document = crm_gateway_core::resources::registry_document();
        return Ok(json!({ "resources": document["resources"] }));
    }
    if target.id.is_some() {
        return Err(RpcError::invalid_params(format!(
            "'{target}' is an item URI; list_children expects a collection"
        )));
    }
    let kind = target.kind().map_err(rpc_error)?;
    let entries = gateway.resolve_many(kind).await.map_err(rpc_error)?;
    Ok(json!({ "resources": entries }))
}

fn parse_uri(params: &Map<String, Value>) -> Result<ResourceUri, RpcError> {
    let raw = match params.get("uri") {
        Some(Value::String(raw)) => raw,
        Some(_) => return Err(RpcError::invalid_params("'uri' must be a string")),
        None => return Err(RpcError::invalid_params("Missing required field 'uri'")),
    };
    ResourceUri::parse(raw).map_err(rpc_error)
}

fn json_content(target: &ResourceUri, value: &Value) -> Value {
    json!({
        "uri": target.to_string(),
        "mimeType": JSON_MIME,
        "text": to_pretty_json(value),
    })
}

/// Input faults stay protocol errors; upstream faults are reported in-band.
fn failure_contents(target: &ResourceUri, err: GatewayError) -> Result<Value, RpcError> {
    if err.is_client_error() {
        return Err(rpc_error(err));
    }
    tracing::warn!(
        event = "mcp_resource_failed",
        uri = %target,
        error = %err,
        "Resource read failed"
    );
    Ok(json!({
        "contents": [{
            "uri": target.to_string(),
            "mimeType": "text/plain",
            "text": format!("Error: {err}"),
        }]
    }))
}

fn rpc_error(err: GatewayError) -> RpcError {
    if err.is_client_error() {
        RpcError::invalid_params(err.to_string()).with_data(json!({ "error": err.code() }))
    } else {
        RpcError::internal(err.to_string()).with_data(json!({ "error": err.code() }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crm_gateway_core::testing::{FakeTransport, gateway_with};
    use reqwest::Method;

    use super::*;

    fn params(uri: &str) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("uri".to_string(), json!(uri));
        params
    }

    fn deals_fake() -> Arc<FakeTransport> {
        Arc::new(
            FakeTransport::new()
                .on(
                    Method::GET,
                    "deals",
                    200,
                    json!({"success": true, "data": [
                        {"id": 1, "title": "Alpha", "value": 10, "currency": "EUR"},
                        {"title": "No id"}
                    ]}),
                )
                .on(
                    Method::GET,
                    "deals/1",
                    200,
                    json!({"success": true, "data": {"id": 1, "title": "Alpha"}}),
                ),
        )
    }

    #[test]
    fn list_starts_with_the_registry_root() {
        let payload = resources_list_payload();
        let resources = payload["resources"].as_array().unwrap();
        assert_eq!(resources[0]["uri"], "crm://");
        assert_eq!(resources.len(), ResourceKind::ALL.len() + 1);
        assert!(resources.iter().any(|r| r["uri"] == "crm://deals"));
    }

    #[test]
    fn templates_cover_every_kind() {
        let payload = resource_templates_payload();
        let templates = payload["resourceTemplates"].as_array().unwrap();
        assert!(templates.iter().any(|t| t["uriTemplate"] == "crm://deals/{id}"));
        assert_eq!(templates.len(), ResourceKind::ALL.len());
    }

    #[tokio::test]
    async fn reading_a_collection_returns_summaries() {
        let gateway = gateway_with(deals_fake());
        let result = read(&gateway, &params("crm://deals")).await.unwrap();
        let text = result["contents"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        let entries = body["resources"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["uri"], "crm://deals/1");
    }

    #[tokio::test]
    async fn reading_a_missing_item_returns_no_contents() {
        let gateway = gateway_with(deals_fake());
        let result = read(&gateway, &params("crm://deals/77")).await.unwrap();
        assert_eq!(result, json!({"contents": []}));
    }

    #[tokio::test]
    async fn bad_uris_are_invalid_params() {
        let gateway = gateway_with(deals_fake());
        let err = read(&gateway, &params("http://deals/1")).await.unwrap_err();
        assert_eq!(err.code, -32602);
        let err = read(&gateway, &params("crm://leads")).await.unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[tokio::test]
    async fn get_requires_an_item_uri() {
        let gateway = gateway_with(deals_fake());
        let err = get(&gateway, &params("crm://deals")).await.unwrap_err();
        assert_eq!(err.message, "Resource ID is required");

        let result = get(&gateway, &params("crm://deals/1")).await.unwrap();
        assert_eq!(result["contents"][0]["uri"], "crm://deals/1");
    }

    #[tokio::test]
    async fn upstream_failures_are_reported_in_band() {
        let fake = Arc::new(FakeTransport::new().unreachable(Method::GET, "deals/1", "timed out"));
        let gateway = gateway_with(fake);
        let result = read(&gateway, &params("crm://deals/1")).await.unwrap();
        assert_eq!(result["contents"][0]["text"], "Error: timed out");
    }

    #[tokio::test]
    async fn list_children_of_root_and_collection() {
        let gateway = gateway_with(deals_fake());
        let root = list_children(&gateway, &params("crm://")).await.unwrap();
        assert_eq!(
            root["resources"].as_array().unwrap().len(),
            ResourceKind::ALL.len()
        );

        let deals = list_children(&gateway, &params("crm://deals")).await.unwrap();
        assert_eq!(deals["resources"][0]["name"], "Alpha");

        let err = list_children(&gateway, &params("crm://deals/1"))
            .await
            .unwrap_err();
        assert_eq!(err.code, -32602);
    }
}
