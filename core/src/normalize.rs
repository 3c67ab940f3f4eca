//! Uniform view over the upstream's inconsistent list response shapes.

use serde::Serialize;
use serde_json::Value;

/// Which shape the item list was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{data: {data: [...]}}`
    Nested,
    /// `{data: [...]}`
    Bare,
    /// Anything else: null, missing, or a non-sequence `data`.
    Missing,
}

/// Paging hint from `additional_data.pagination`, when the upstream sends one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Pagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    pub more_items_in_collection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_start: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCollection {
    pub items: Vec<Value>,
    /// Set when no item sequence was recognized at all.
    pub empty: bool,
    pub shape: ResponseShape,
    pub pagination: Option<Pagination>,
}

/// Extracts the item sequence. Never fails on a shape mismatch.
pub fn normalize(mut raw: Value) -> NormalizedCollection {
    let pagination = pagination(&raw);
    let data = raw.get_mut("data").map(Value::take);

    let (items, shape) = match data {
        Some(Value::Object(mut inner)) => match inner.remove("data") {
            Some(Value::Array(items)) => (items, ResponseShape::Nested),
            _ => (Vec::new(), ResponseShape::Missing),
        },
        Some(Value::Array(items)) => (items, ResponseShape::Bare),
        _ => (Vec::new(), ResponseShape::Missing),
    };

    if shape == ResponseShape::Missing {
        tracing::debug!(
            event = "normalize_empty_response",
            "Upstream response carried no item list; treating as empty"
        );
    }

    NormalizedCollection {
        items,
        empty: shape == ResponseShape::Missing,
        shape,
        pagination,
    }
}

fn pagination(raw: &Value) -> Option<Pagination> {
    let page = raw
        .pointer("/additional_data/pagination")
        .or_else(|| raw.pointer("/data/additional_data/pagination"))?;
    Some(Pagination {
        start: page.get("start").and_then(Value::as_u64),
        limit: page.get("limit").and_then(Value::as_u64),
        more_items_in_collection: page
            .get("more_items_in_collection")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        next_start: page.get("next_start").and_then(Value::as_u64),
    })
}
