//! Translation of loosely typed external list parameters into the sparse
//! option set the upstream accepts.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::resources::ResourceKind;

pub const DEFAULT_LIMIT: u32 = 100;
pub const DEFAULT_START: u32 = 0;

/// Integer parameter as received from a query string or tool arguments.
///
/// Query strings carry everything as text, so a value that does not parse is
/// kept as `Invalid` and dropped (with a warning) when options are mapped,
/// instead of failing the whole request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LooseInt {
    Int(i64),
    Invalid(String),
}

impl<'de> Deserialize<'de> for LooseInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LooseIntVisitor;

        impl<'de> Visitor<'de> for LooseIntVisitor {
            type Value = LooseInt;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer or a numeric string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<LooseInt, E> {
                Ok(LooseInt::Int(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<LooseInt, E> {
                Ok(i64::try_from(v)
                    .map(LooseInt::Int)
                    .unwrap_or_else(|_| LooseInt::Invalid(v.to_string())))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<LooseInt, E> {
                if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                    Ok(LooseInt::Int(v as i64))
                } else {
                    Ok(LooseInt::Invalid(v.to_string()))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<LooseInt, E> {
                Ok(v.trim()
                    .parse::<i64>()
                    .map(LooseInt::Int)
                    .unwrap_or_else(|_| LooseInt::Invalid(v.to_string())))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<LooseInt, E> {
                Ok(LooseInt::Invalid(v.to_string()))
            }
        }

        deserializer.deserialize_any(LooseIntVisitor)
    }
}

impl From<i64> for LooseInt {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// List parameters accepted from either front end, in external snake_case.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub filter_id: Option<LooseInt>,
    #[serde(default)]
    pub user_id: Option<LooseInt>,
    #[serde(default)]
    pub stage_id: Option<LooseInt>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub deal_id: Option<LooseInt>,
    #[serde(default)]
    pub person_id: Option<LooseInt>,
    #[serde(default)]
    pub org_id: Option<LooseInt>,
    #[serde(default)]
    pub limit: Option<LooseInt>,
}

/// Filters a resource family's list operation understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    FilterId,
    UserId,
    StageId,
    Status,
    DealId,
    PersonId,
    OrgId,
}

impl ListFilter {
    pub fn param_name(self) -> &'static str {
        match self {
            Self::FilterId => "filter_id",
            Self::UserId => "user_id",
            Self::StageId => "stage_id",
            Self::Status => "status",
            Self::DealId => "deal_id",
            Self::PersonId => "person_id",
            Self::OrgId => "org_id",
        }
    }
}

/// Sparse upstream option set. Only present keys are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<i64>,
}

impl ListOptions {
    /// First page with the default window.
    pub fn first_page() -> Self {
        Self {
            limit: Some(DEFAULT_LIMIT),
            start: Some(DEFAULT_START),
            ..Self::default()
        }
    }

    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Query pairs in the upstream's wire naming (snake_case).
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((key.to_string(), value));
            }
        };
        push("limit", self.limit.map(|v| v.to_string()));
        push("start", self.start.map(|v| v.to_string()));
        push("filter_id", self.filter_id.map(|v| v.to_string()));
        push("user_id", self.user_id.map(|v| v.to_string()));
        push("stage_id", self.stage_id.map(|v| v.to_string()));
        push("status", self.status.clone());
        push("deal_id", self.deal_id.map(|v| v.to_string()));
        push("person_id", self.person_id.map(|v| v.to_string()));
        push("org_id", self.org_id.map(|v| v.to_string()));
        push("pipeline_id", self.pipeline_id.map(|v| v.to_string()));
        pairs
    }
}

/// Maps external list parameters onto upstream options for `kind`.
///
/// Filters the resource family does not understand are ignored. Numeric
/// filters are forwarded only when present and non-zero. Paginated families
/// always get `limit` (default 100) and `start = 0`.
pub fn map_options(kind: ResourceKind, params: &ListParams) -> ListOptions {
    let descriptor = kind.descriptor();
    if !descriptor.paginated {
        return ListOptions::default();
    }

    let mut options = ListOptions::first_page();
    if let Some(limit) = numeric(kind, "limit", params.limit.as_ref()) {
        match u32::try_from(limit) {
            Ok(limit) if limit > 0 => options.limit = Some(limit),
            _ => tracing::warn!(
                event = "list_option_ignored",
                resource = kind.plural(),
                param = "limit",
                value = limit,
                "Ignoring out-of-range limit"
            ),
        }
    }

    for filter in descriptor.list_filters {
        let param = filter.param_name();
        match filter {
            ListFilter::FilterId => {
                options.filter_id = numeric(kind, param, params.filter_id.as_ref())
            }
            ListFilter::UserId => options.user_id = numeric(kind, param, params.user_id.as_ref()),
            ListFilter::StageId => {
                options.stage_id = numeric(kind, param, params.stage_id.as_ref())
            }
            ListFilter::DealId => options.deal_id = numeric(kind, param, params.deal_id.as_ref()),
            ListFilter::PersonId => {
                options.person_id = numeric(kind, param, params.person_id.as_ref())
            }
            ListFilter::OrgId => options.org_id = numeric(kind, param, params.org_id.as_ref()),
            ListFilter::Status => {
                options.status = params
                    .status
                    .as_deref()
                    .map(str::trim)
                    .filter(|status| !status.is_empty())
                    .map(str::to_string)
            }
        }
    }

    options
}

fn numeric(kind: ResourceKind, param: &'static str, value: Option<&LooseInt>) -> Option<i64> {
    match value? {
        LooseInt::Int(0) => None,
        LooseInt::Int(value) => Some(*value),
        LooseInt::Invalid(raw) if raw.trim().is_empty() => None,
        LooseInt::Invalid(raw) => {
            tracing::warn!(
                event = "list_option_ignored",
                resource = kind.plural(),
                param,
                value = %raw,
                "Ignoring non-numeric list parameter"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> ListParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn forwards_only_present_filters_in_camel_case() {
        let options = map_options(
            ResourceKind::Deal,
            &params(json!({"filter_id": 7, "status": "won"})),
        );
        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            json!({"limit": 100, "start": 0, "filterId": 7, "status": "won"})
        );
    }

    #[test]
    fn zero_numeric_filters_are_dropped() {
        let options = map_options(
            ResourceKind::Deal,
            &params(json!({"user_id": 0, "stage_id": 4})),
        );
        assert_eq!(options.user_id, None);
        assert_eq!(options.stage_id, Some(4));
    }

    #[test]
    fn numeric_strings_parse_and_garbage_is_dropped() {
        let options = map_options(
            ResourceKind::Deal,
            &params(json!({"filter_id": "12", "user_id": "abc", "limit": "5"})),
        );
        assert_eq!(options.filter_id, Some(12));
        assert_eq!(options.user_id, None);
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.start, Some(0));
    }

    #[test]
    fn unusable_limit_falls_back_to_default() {
        for raw in [json!("0"), json!("lots"), json!(-3)] {
            let options = map_options(ResourceKind::Person, &params(json!({"limit": raw})));
            assert_eq!(options.limit, Some(DEFAULT_LIMIT));
        }
    }

    #[test]
    fn filters_outside_the_resource_family_are_ignored() {
        let options = map_options(
            ResourceKind::Person,
            &params(json!({"filter_id": 3, "user_id": 9, "status": "won"})),
        );
        assert_eq!(options.filter_id, Some(3));
        assert_eq!(options.user_id, None);
        assert_eq!(options.status, None);
    }

    #[test]
    fn unpaginated_families_send_no_options() {
        let options = map_options(ResourceKind::Pipeline, &params(json!({"limit": 5})));
        assert_eq!(options, ListOptions::default());
        assert!(options.query_pairs().is_empty());
    }

    #[test]
    fn query_pairs_use_wire_names() {
        let options = ListOptions {
            pipeline_id: Some(3),
            ..ListOptions::first_page()
        };
        assert_eq!(
            options.query_pairs(),
            vec![
                ("limit".to_string(), "100".to_string()),
                ("start".to_string(), "0".to_string()),
                ("pipeline_id".to_string(), "3".to_string()),
            ]
        );
    }
}
