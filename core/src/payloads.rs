//! Typed write bodies for the writable resource families.
//!
//! Known fields are named; anything else the CRM accepts (custom fields keyed
//! by hash, visibility flags, ...) rides along in `extra` untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::GatewayError;
use crate::resources::ResourceKind;

/// A write body for one resource family, validated before it leaves the gateway.
pub trait ResourcePayload: Serialize {
    const KIND: ResourceKind;

    fn validate_create(&self) -> Result<(), GatewayError>;

    fn into_body(self) -> Result<Value, GatewayError>
    where
        Self: Sized,
    {
        serde_json::to_value(self).map_err(|e| GatewayError::InvalidInput {
            message: format!("Request body could not be encoded: {e}"),
            field: None,
        })
    }
}

/// Validates a body for `kind`, in create or update mode, and returns the
/// JSON to forward upstream.
pub fn prepare_body(kind: ResourceKind, body: Value, create: bool) -> Result<Value, GatewayError> {
    fn typed<P>(body: Value, create: bool) -> Result<Value, GatewayError>
    where
        P: ResourcePayload + for<'de> Deserialize<'de>,
    {
        if !body.is_object() {
            return Err(GatewayError::InvalidInput {
                message: "Request body must be a JSON object".to_string(),
                field: None,
            });
        }
        let payload: P = serde_json::from_value(body).map_err(|e| GatewayError::InvalidInput {
            message: format!("Invalid {} body: {e}", P::KIND.name()),
            field: None,
        })?;
        if create {
            payload.validate_create()?;
        }
        let encoded = payload.into_body()?;
        if !create && encoded.as_object().is_none_or(Map::is_empty) {
            return Err(GatewayError::InvalidInput {
                message: "Update body must contain at least one field".to_string(),
                field: None,
            });
        }
        Ok(encoded)
    }

    match kind {
        ResourceKind::Deal => typed::<DealInput>(body, create),
        ResourceKind::Person => typed::<PersonInput>(body, create),
        ResourceKind::Organization => typed::<OrganizationInput>(body, create),
        ResourceKind::Activity => typed::<ActivityInput>(body, create),
        ResourceKind::Note => typed::<NoteInput>(body, create),
        ResourceKind::Pipeline | ResourceKind::User | ResourceKind::Stage => {
            Err(GatewayError::Unsupported {
                operation: if create { "create" } else { "update" },
                resource: kind.plural(),
            })
        }
    }
}

fn require_text(field: &'static str, value: &Option<String>) -> Result<(), GatewayError> {
    match value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(()),
        _ => Err(GatewayError::invalid_input(field, format!("{field} is required"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    Open,
    Won,
    Lost,
}

impl DealStatus {
    pub const VALUES: [&'static str; 3] = ["open", "won", "lost"];
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DealInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DealStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_close_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourcePayload for DealInput {
    const KIND: ResourceKind = ResourceKind::Deal;

    fn validate_create(&self) -> Result<(), GatewayError> {
        require_text("title", &self.title)
    }
}

/// Email or phone: either a bare string or the CRM's labelled list form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContactField {
    Single(String),
    Many(Vec<ContactEntry>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactEntry {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<ContactField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<ContactField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourcePayload for PersonInput {
    const KIND: ResourceKind = ResourceKind::Person;

    fn validate_create(&self) -> Result<(), GatewayError> {
        require_text("name", &self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizationInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourcePayload for OrganizationInput {
    const KIND: ResourceKind = ResourceKind::Organization;

    fn validate_create(&self) -> Result<(), GatewayError> {
        require_text("name", &self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourcePayload for ActivityInput {
    const KIND: ResourceKind = ResourceKind::Activity;

    fn validate_create(&self) -> Result<(), GatewayError> {
        require_text("subject", &self.subject)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourcePayload for NoteInput {
    const KIND: ResourceKind = ResourceKind::Note;

    fn validate_create(&self) -> Result<(), GatewayError> {
        require_text("content", &self.content)?;
        if self.deal_id.is_none() && self.person_id.is_none() && self.org_id.is_none() {
            return Err(GatewayError::invalid_input(
                "deal_id",
                "A note must be attached to a deal, person or organization \
                 (deal_id, person_id or org_id)",
            ));
        }
        Ok(())
    }
}
