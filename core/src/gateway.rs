//! The single operation core shared by the REST routes and the MCP tools.

use serde_json::Value;

use crate::client::CrmClient;
use crate::error::GatewayError;
use crate::normalize::normalize;
use crate::options::{ListOptions, ListParams, map_options};
use crate::payloads::prepare_body;
use crate::resources::{Relation, RelationLookup, ResourceKind, SummaryEntry};
use crate::uri::ResourceUri;

/// Window used when listing a collection as resource summaries.
pub const SUMMARY_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub enum Operation {
    List { kind: ResourceKind, params: ListParams },
    Get { kind: ResourceKind, id: String },
    Create { kind: ResourceKind, body: Value },
    Update { kind: ResourceKind, id: String, body: Value },
    Delete { kind: ResourceKind, id: String },
    Related { relation: Relation, id: String },
    CurrentUser,
}

impl Operation {
    /// Resource family the operation acts on.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::List { kind, .. }
            | Self::Get { kind, .. }
            | Self::Create { kind, .. }
            | Self::Update { kind, .. }
            | Self::Delete { kind, .. } => *kind,
            Self::Related { relation, .. } => relation.owner(),
            Self::CurrentUser => ResourceKind::User,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Get { id, .. }
            | Self::Update { id, .. }
            | Self::Delete { id, .. }
            | Self::Related { id, .. } => Some(id),
            Self::List { .. } | Self::Create { .. } | Self::CurrentUser => None,
        }
    }

    /// Gerund phrase for messages, e.g. `getting deals`, `updating deal`.
    pub fn action(&self) -> String {
        let kind = self.kind();
        match self {
            Self::List { .. } => format!("getting {}", kind.plural()),
            Self::Get { .. } => format!("getting {}", kind.name()),
            Self::Create { .. } => format!("creating {}", kind.name()),
            Self::Update { .. } => format!("updating {}", kind.name()),
            Self::Delete { .. } => format!("deleting {}", kind.name()),
            Self::Related { relation, .. } => {
                format!("getting {} {}", kind.name(), relation.segment())
            }
            Self::CurrentUser => "getting current user".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Listed(Vec<Value>),
    Found(Value),
    Created(Value),
    Updated(Value),
    Deleted,
    /// The upstream reported no such item (or refused the delete).
    NotFound { message: String },
}

/// Result of resolving a `crm://` URI.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Registry(Value),
    Collection(Vec<SummaryEntry>),
    Item(Option<Value>),
}

pub struct Gateway {
    client: CrmClient,
}

impl Gateway {
    pub fn new(client: CrmClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &CrmClient {
        &self.client
    }

    /// Runs one operation against the upstream. Failures are logged here with
    /// the operation context before being returned.
    pub async fn execute(&self, operation: Operation) -> Result<Outcome, GatewayError> {
        let result = self.dispatch(&operation).await;
        if let Err(err) = &result {
            let action = operation.action();
            if err.is_client_error() {
                tracing::warn!(
                    event = "crm_operation_rejected",
                    operation = %action,
                    resource = operation.kind().plural(),
                    id = operation.id(),
                    error = %err,
                    "Rejected {action}"
                );
            } else {
                tracing::error!(
                    event = "crm_operation_failed",
                    operation = %action,
                    resource = operation.kind().plural(),
                    id = operation.id(),
                    error = %err,
                    "Error {action}"
                );
            }
        }
        result
    }

    async fn dispatch(&self, operation: &Operation) -> Result<Outcome, GatewayError> {
        match operation {
            Operation::List { kind, params } => {
                let options = map_options(*kind, params);
                let raw = self.client.handle(*kind).list(&options).await?;
                Ok(Outcome::Listed(normalize(raw).items))
            }
            Operation::Get { kind, id } => {
                let id = require_id(id)?;
                Ok(match self.client.handle(*kind).get(id).await? {
                    Some(item) => Outcome::Found(item),
                    None => not_found(*kind),
                })
            }
            Operation::Create { kind, body } => {
                let body = prepare_body(*kind, body.clone(), true)?;
                let created = self.client.handle(*kind).create(body).await?;
                Ok(Outcome::Created(created))
            }
            Operation::Update { kind, id, body } => {
                let id = require_id(id)?;
                let body = prepare_body(*kind, body.clone(), false)?;
                Ok(match self.client.handle(*kind).update(id, body).await? {
                    Some(item) => Outcome::Updated(item),
                    None => not_found(*kind),
                })
            }
            Operation::Delete { kind, id } => {
                let id = require_id(id)?;
                if !kind.descriptor().writable {
                    return Err(GatewayError::Unsupported {
                        operation: "delete",
                        resource: kind.plural(),
                    });
                }
                Ok(if self.client.handle(*kind).delete(id).await? {
                    Outcome::Deleted
                } else {
                    Outcome::NotFound {
                        message: format!("{} not found or could not be deleted", kind.label()),
                    }
                })
            }
            Operation::Related { relation, id } => self.related(*relation, id).await,
            Operation::CurrentUser => {
                Ok(match self.client.handle(ResourceKind::User).current().await? {
                    Some(user) => Outcome::Found(user),
                    None => not_found(ResourceKind::User),
                })
            }
        }
    }

    async fn related(&self, relation: Relation, id: &str) -> Result<Outcome, GatewayError> {
        let id = require_id(id)?;
        let raw = match relation.lookup() {
            RelationLookup::Nested => {
                let nested = self
                    .client
                    .handle(relation.owner())
                    .nested(id, relation.segment())
                    .await?;
                match nested {
                    Some(raw) => raw,
                    None => return Ok(not_found(relation.owner())),
                }
            }
            RelationLookup::Filtered(apply) => {
                let owner_id: i64 = id.parse().map_err(|_| {
                    GatewayError::invalid_input(
                        "id",
                        format!("{} id must be numeric, got '{id}'", relation.owner().label()),
                    )
                })?;
                let target = relation.target();
                let mut options = if target.descriptor().paginated {
                    ListOptions::first_page()
                } else {
                    ListOptions::default()
                };
                apply(&mut options, owner_id);
                self.client.handle(target).list(&options).await?
            }
        };
        Ok(Outcome::Listed(normalize(raw).items))
    }

    /// Single item by kind and id; `None` when the upstream has nothing.
    pub async fn resolve_one(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<Value>, GatewayError> {
        self.client.handle(kind).get(require_id(id)?).await
    }

    /// First page of a collection rendered as summaries with `crm://` URIs.
    pub async fn resolve_many(
        &self,
        kind: ResourceKind,
    ) -> Result<Vec<SummaryEntry>, GatewayError> {
        let raw = self
            .client
            .handle(kind)
            .list(&ListOptions::with_limit(SUMMARY_LIMIT))
            .await?;
        let descriptor = kind.descriptor();
        let normalized = normalize(raw);
        let entries: Vec<SummaryEntry> = normalized
            .items
            .iter()
            .filter_map(|item| descriptor.summary_entry(item))
            .collect();
        if entries.len() < normalized.items.len() {
            tracing::debug!(
                event = "resource_summary_skipped",
                resource = kind.plural(),
                skipped = normalized.items.len() - entries.len(),
                "Skipped items without an id"
            );
        }
        Ok(entries)
    }

    /// Resolves any `crm://` URI: the registry root, a collection, or an item.
    pub async fn resolve(&self, uri: &ResourceUri) -> Result<Resolved, GatewayError> {
        if uri.is_root() {
            return Ok(Resolved::Registry(crate::resources::registry_document()));
        }
        let kind = uri.kind()?;
        match &uri.id {
            Some(id) => Ok(Resolved::Item(self.resolve_one(kind, id).await?)),
            None => Ok(Resolved::Collection(self.resolve_many(kind).await?)),
        }
    }
}

fn require_id(id: &str) -> Result<&str, GatewayError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(GatewayError::invalid_input("id", "id is required"));
    }
    Ok(id)
}

fn not_found(kind: ResourceKind) -> Outcome {
    Outcome::NotFound {
        message: format!("{} not found", kind.label()),
    }
}
