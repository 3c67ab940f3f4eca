//! Static registry of CRM resource families and their relationships.

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::GatewayError;
use crate::options::{ListFilter, ListOptions};
use crate::uri::{self, ResourceUri};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Deal,
    Person,
    Organization,
    Activity,
    Pipeline,
    Note,
    User,
    Stage,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        Self::Deal,
        Self::Person,
        Self::Organization,
        Self::Activity,
        Self::Pipeline,
        Self::Note,
        Self::User,
        Self::Stage,
    ];

    pub fn descriptor(self) -> &'static ResourceDescriptor {
        &DESCRIPTORS[self as usize]
    }

    /// Singular lowercase name (`deal`).
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Collection name used in paths and URIs (`deals`).
    pub fn plural(self) -> &'static str {
        self.descriptor().plural
    }

    /// Capitalized singular used in user-facing messages (`Deal`).
    pub fn label(self) -> &'static str {
        self.descriptor().label
    }

    /// Accepts singular or plural names, case-insensitively.
    pub fn parse(name: &str) -> Result<Self, GatewayError> {
        let wanted = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted || kind.plural() == wanted)
            .ok_or_else(|| GatewayError::UnknownResource(name.to_string()))
    }
}

/// Per-family summary used in resource listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSummary {
    pub name: String,
    pub description: String,
}

/// Summary plus the `crm://` address of the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryEntry {
    pub name: String,
    pub description: String,
    pub uri: String,
}

pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub name: &'static str,
    pub plural: &'static str,
    pub label: &'static str,
    pub collection_title: &'static str,
    pub collection_description: &'static str,
    /// Upstream path segment for the collection.
    pub upstream_path: &'static str,
    /// Supports create, update and delete.
    pub writable: bool,
    /// List requests carry `limit`/`start`.
    pub paginated: bool,
    pub list_filters: &'static [ListFilter],
    pub summarize: fn(&Value) -> ResourceSummary,
}

impl ResourceDescriptor {
    pub fn summary_entry(&self, item: &Value) -> Option<SummaryEntry> {
        let id = item_id(item)?;
        let summary = (self.summarize)(item);
        Some(SummaryEntry {
            name: summary.name,
            description: summary.description,
            uri: ResourceUri::item(self.kind, &id).to_string(),
        })
    }
}

static DESCRIPTORS: [ResourceDescriptor; 8] = [
    ResourceDescriptor {
        kind: ResourceKind::Deal,
        name: "deal",
        plural: "deals",
        label: "Deal",
        collection_title: "Deals",
        collection_description: "Sales deals in the CRM",
        upstream_path: "deals",
        writable: true,
        paginated: true,
        list_filters: &[
            ListFilter::FilterId,
            ListFilter::UserId,
            ListFilter::StageId,
            ListFilter::Status,
        ],
        summarize: summarize_deal,
    },
    ResourceDescriptor {
        kind: ResourceKind::Person,
        name: "person",
        plural: "persons",
        label: "Person",
        collection_title: "Persons",
        collection_description: "Contact persons in the CRM",
        upstream_path: "persons",
        writable: true,
        paginated: true,
        list_filters: &[ListFilter::FilterId],
        summarize: summarize_person,
    },
    ResourceDescriptor {
        kind: ResourceKind::Organization,
        name: "organization",
        plural: "organizations",
        label: "Organization",
        collection_title: "Organizations",
        collection_description: "Organizations (companies) in the CRM",
        upstream_path: "organizations",
        writable: true,
        paginated: true,
        list_filters: &[ListFilter::FilterId],
        summarize: summarize_organization,
    },
    ResourceDescriptor {
        kind: ResourceKind::Activity,
        name: "activity",
        plural: "activities",
        label: "Activity",
        collection_title: "Activities",
        collection_description: "Calls, meetings and tasks in the CRM",
        upstream_path: "activities",
        writable: true,
        paginated: true,
        list_filters: &[ListFilter::UserId],
        summarize: summarize_activity,
    },
    ResourceDescriptor {
        kind: ResourceKind::Pipeline,
        name: "pipeline",
        plural: "pipelines",
        label: "Pipeline",
        collection_title: "Pipelines",
        collection_description: "Sales pipelines in the CRM",
        upstream_path: "pipelines",
        writable: false,
        paginated: false,
        list_filters: &[],
        summarize: summarize_pipeline,
    },
    ResourceDescriptor {
        kind: ResourceKind::Note,
        name: "note",
        plural: "notes",
        label: "Note",
        collection_title: "Notes",
        collection_description: "Notes attached to deals, persons and organizations",
        upstream_path: "notes",
        writable: true,
        paginated: true,
        list_filters: &[ListFilter::DealId, ListFilter::PersonId, ListFilter::OrgId],
        summarize: summarize_note,
    },
    ResourceDescriptor {
        kind: ResourceKind::User,
        name: "user",
        plural: "users",
        label: "User",
        collection_title: "Users",
        collection_description: "CRM user accounts",
        upstream_path: "users",
        writable: false,
        paginated: false,
        list_filters: &[],
        summarize: summarize_user,
    },
    ResourceDescriptor {
        kind: ResourceKind::Stage,
        name: "stage",
        plural: "stages",
        label: "Stage",
        collection_title: "Stages",
        collection_description: "Pipeline stages in the CRM",
        upstream_path: "stages",
        writable: false,
        paginated: false,
        list_filters: &[],
        summarize: summarize_stage,
    },
];

/// Collections exposed at the top of the resource registry.
pub fn registry_document() -> Value {
    let resources: Vec<Value> = ResourceKind::ALL
        .iter()
        .map(|kind| {
            let descriptor = kind.descriptor();
            json!({
                "name": descriptor.collection_title,
                "uri": ResourceUri::collection(*kind).to_string(),
                "description": descriptor.collection_description,
            })
        })
        .collect();
    json!({
        "name": "CRM Resources",
        "uri": uri::ROOT,
        "description": "Browse CRM records by collection",
        "resources": resources,
    })
}

// ── Relationships ──────────────────────────────────────────

/// Sub-listing reachable from a single record, e.g. `/deals/{id}/activities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    DealActivities,
    DealNotes,
    OrganizationDeals,
    OrganizationPersons,
    PersonDeals,
    PersonActivities,
    PipelineDeals,
    PipelineStages,
    UserDeals,
    UserActivities,
}

/// How the upstream answers a relation.
#[derive(Debug, Clone, Copy)]
pub enum RelationLookup {
    /// `GET /{owner}/{id}/{segment}`.
    Nested,
    /// `GET /{target}` with the numeric owner id set as a list filter.
    Filtered(fn(&mut ListOptions, i64)),
}

impl Relation {
    pub const ALL: [Relation; 10] = [
        Self::DealActivities,
        Self::DealNotes,
        Self::OrganizationDeals,
        Self::OrganizationPersons,
        Self::PersonDeals,
        Self::PersonActivities,
        Self::PipelineDeals,
        Self::PipelineStages,
        Self::UserDeals,
        Self::UserActivities,
    ];

    pub fn owner(self) -> ResourceKind {
        match self {
            Self::DealActivities | Self::DealNotes => ResourceKind::Deal,
            Self::OrganizationDeals | Self::OrganizationPersons => ResourceKind::Organization,
            Self::PersonDeals | Self::PersonActivities => ResourceKind::Person,
            Self::PipelineDeals | Self::PipelineStages => ResourceKind::Pipeline,
            Self::UserDeals | Self::UserActivities => ResourceKind::User,
        }
    }

    pub fn target(self) -> ResourceKind {
        match self {
            Self::DealActivities | Self::PersonActivities | Self::UserActivities => {
                ResourceKind::Activity
            }
            Self::DealNotes => ResourceKind::Note,
            Self::OrganizationDeals
            | Self::PersonDeals
            | Self::PipelineDeals
            | Self::UserDeals => ResourceKind::Deal,
            Self::OrganizationPersons => ResourceKind::Person,
            Self::PipelineStages => ResourceKind::Stage,
        }
    }

    /// Path segment after the owner id.
    pub fn segment(self) -> &'static str {
        self.target().plural()
    }

    pub fn parse(owner: ResourceKind, segment: &str) -> Result<Self, GatewayError> {
        Self::ALL
            .into_iter()
            .find(|relation| relation.owner() == owner && relation.segment() == segment)
            .ok_or_else(|| {
                GatewayError::UnknownResource(format!("{}/{}", owner.plural(), segment))
            })
    }

    pub fn lookup(self) -> RelationLookup {
        match self {
            Self::DealNotes => RelationLookup::Filtered(|o, id| o.deal_id = Some(id)),
            Self::PipelineDeals | Self::PipelineStages => {
                RelationLookup::Filtered(|o, id| o.pipeline_id = Some(id))
            }
            Self::UserDeals | Self::UserActivities => {
                RelationLookup::Filtered(|o, id| o.user_id = Some(id))
            }
            Self::DealActivities
            | Self::OrganizationDeals
            | Self::OrganizationPersons
            | Self::PersonDeals
            | Self::PersonActivities => RelationLookup::Nested,
        }
    }
}

// ── Summaries ──────────────────────────────────────────

/// Item id as a string, whether the upstream sent a number or a string.
pub fn item_id(item: &Value) -> Option<String> {
    text(item, "id")
}

/// Non-empty string or number field rendered as text.
fn text(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reference field that may be a bare id or an embedded object with `value`/`name`.
fn reference(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        embedded @ Value::Object(_) => text(embedded, "name").or_else(|| text(embedded, "value")),
        _ => text(item, key),
    }
}

fn name_or_untitled(item: &Value, key: &str, singular: &str) -> String {
    text(item, key).unwrap_or_else(|| format!("Untitled {singular}"))
}

fn first_email(item: &Value) -> Option<String> {
    let from_list = match item.get("email") {
        Some(Value::Array(entries)) => entries.first().and_then(|entry| match entry {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            other => text(other, "value"),
        }),
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    };
    from_list.or_else(|| text(item, "primary_email"))
}

fn summarize_deal(item: &Value) -> ResourceSummary {
    let status = text(item, "status").unwrap_or_else(|| "unknown".to_string());
    let value = text(item, "formatted_value").unwrap_or_else(|| "unknown value".to_string());
    ResourceSummary {
        name: name_or_untitled(item, "title", "deal"),
        description: format!("{status} deal worth {value}"),
    }
}

fn summarize_person(item: &Value) -> ResourceSummary {
    ResourceSummary {
        name: name_or_untitled(item, "name", "person"),
        description: first_email(item)
            .map(|email| format!("Email: {email}"))
            .unwrap_or_else(|| "No email provided".to_string()),
    }
}

fn summarize_organization(item: &Value) -> ResourceSummary {
    let open_deals = text(item, "open_deals_count").unwrap_or_else(|| "0".to_string());
    ResourceSummary {
        name: name_or_untitled(item, "name", "organization"),
        description: format!("{open_deals} open deals"),
    }
}

fn summarize_activity(item: &Value) -> ResourceSummary {
    let kind = text(item, "type").unwrap_or_else(|| "task".to_string());
    let due = text(item, "due_date").unwrap_or_else(|| "unscheduled".to_string());
    ResourceSummary {
        name: name_or_untitled(item, "subject", "activity"),
        description: format!("{kind} due {due}"),
    }
}

fn summarize_pipeline(item: &Value) -> ResourceSummary {
    let active = item.get("active").and_then(Value::as_bool).unwrap_or(true);
    ResourceSummary {
        name: name_or_untitled(item, "name", "pipeline"),
        description: if active {
            "Active pipeline".to_string()
        } else {
            "Inactive pipeline".to_string()
        },
    }
}

fn summarize_note(item: &Value) -> ResourceSummary {
    let name = text(item, "content")
        .map(|content| content.chars().take(60).collect::<String>())
        .or_else(|| item_id(item).map(|id| format!("Note {id}")))
        .unwrap_or_else(|| "Untitled note".to_string());
    let linked = [("deal", "deal_id"), ("person", "person_id"), ("organization", "org_id")]
        .into_iter()
        .find_map(|(label, key)| reference(item, key).map(|value| format!("{label} {value}")))
        .unwrap_or_else(|| "no linked record".to_string());
    ResourceSummary {
        name,
        description: format!("Note on {linked}"),
    }
}

fn summarize_user(item: &Value) -> ResourceSummary {
    ResourceSummary {
        name: name_or_untitled(item, "name", "user"),
        description: text(item, "email").unwrap_or_else(|| "No email provided".to_string()),
    }
}

fn summarize_stage(item: &Value) -> ResourceSummary {
    let pipeline = text(item, "pipeline_id").unwrap_or_else(|| "unknown".to_string());
    ResourceSummary {
        name: name_or_untitled(item, "name", "stage"),
        description: format!("Stage in pipeline {pipeline}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summarize(kind: ResourceKind, item: Value) -> ResourceSummary {
        (kind.descriptor().summarize)(&item)
    }

    #[test]
    fn descriptor_table_is_indexed_by_kind() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.descriptor().kind, kind);
        }
    }

    #[test]
    fn parse_accepts_singular_and_plural() {
        assert_eq!(ResourceKind::parse("deals").unwrap(), ResourceKind::Deal);
        assert_eq!(ResourceKind::parse("Person").unwrap(), ResourceKind::Person);
        assert!(matches!(
            ResourceKind::parse("leads"),
            Err(GatewayError::UnknownResource(name)) if name == "leads"
        ));
    }

    #[test]
    fn deal_without_formatted_value() {
        let summary = summarize(
            ResourceKind::Deal,
            json!({"id": 1, "title": "Big one", "status": "open"}),
        );
        assert_eq!(summary.name, "Big one");
        assert_eq!(summary.description, "open deal worth unknown value");
    }

    #[test]
    fn person_email_variants() {
        let listed = summarize(
            ResourceKind::Person,
            json!({"name": "Ada", "email": [{"value": "ada@example.com", "primary": true}]}),
        );
        assert_eq!(listed.description, "Email: ada@example.com");

        let primary = summarize(
            ResourceKind::Person,
            json!({"name": "Ada", "primary_email": "a@x.io"}),
        );
        assert_eq!(primary.description, "Email: a@x.io");

        let none = summarize(ResourceKind::Person, json!({"name": "Ada", "email": []}));
        assert_eq!(none.description, "No email provided");
    }

    #[test]
    fn organization_without_count() {
        let summary = summarize(ResourceKind::Organization, json!({"name": "Acme"}));
        assert_eq!(summary.description, "0 open deals");
    }

    #[test]
    fn missing_names_fall_back_to_untitled() {
        assert_eq!(summarize(ResourceKind::Deal, json!({})).name, "Untitled deal");
        let activity = summarize(ResourceKind::Activity, json!({"subject": null}));
        assert_eq!(activity.name, "Untitled activity");
        assert_eq!(
            summarize(ResourceKind::Activity, json!({})).description,
            "task due unscheduled"
        );
    }

    #[test]
    fn note_summary_truncates_and_links() {
        let content = "x".repeat(80);
        let summary = summarize(
            ResourceKind::Note,
            json!({"id": 5, "content": content, "deal_id": 12}),
        );
        assert_eq!(summary.name.len(), 60);
        assert_eq!(summary.description, "Note on deal 12");

        let bare = summarize(ResourceKind::Note, json!({"id": 5}));
        assert_eq!(bare.name, "Note 5");
        assert_eq!(bare.description, "Note on no linked record");
    }

    #[test]
    fn pipeline_activity_flag() {
        assert_eq!(
            summarize(ResourceKind::Pipeline, json!({"name": "Sales"})).description,
            "Active pipeline"
        );
        assert_eq!(
            summarize(ResourceKind::Pipeline, json!({"name": "Old", "active": false})).description,
            "Inactive pipeline"
        );
    }

    #[test]
    fn user_without_email() {
        let user = summarize(ResourceKind::User, json!({"id": 3, "name": "Grace"}));
        assert_eq!(user.name, "Grace");
        assert_eq!(user.description, "No email provided");

        let with_email = summarize(ResourceKind::User, json!({"email": "g@x.io"}));
        assert_eq!(with_email.name, "Untitled user");
        assert_eq!(with_email.description, "g@x.io");
    }

    #[test]
    fn stage_pipeline_reference() {
        let orphan = summarize(ResourceKind::Stage, json!({"name": "Qualified"}));
        assert_eq!(orphan.description, "Stage in pipeline unknown");

        let linked = summarize(ResourceKind::Stage, json!({"pipeline_id": 2}));
        assert_eq!(linked.name, "Untitled stage");
        assert_eq!(linked.description, "Stage in pipeline 2");
    }

    #[test]
    fn summary_entry_needs_an_id() {
        let descriptor = ResourceKind::Deal.descriptor();
        let entry = descriptor.summary_entry(&json!({"id": 42, "title": "T"})).unwrap();
        assert_eq!(entry.uri, "crm://deals/42");
        assert!(descriptor.summary_entry(&json!({"title": "T"})).is_none());
    }

    #[test]
    fn relations_resolve_by_owner_and_segment() {
        assert_eq!(
            Relation::parse(ResourceKind::Pipeline, "stages").unwrap(),
            Relation::PipelineStages
        );
        assert!(Relation::parse(ResourceKind::Pipeline, "persons").is_err());
        assert!(matches!(Relation::DealActivities.lookup(), RelationLookup::Nested));
        match Relation::UserDeals.lookup() {
            RelationLookup::Filtered(apply) => {
                let mut options = ListOptions::default();
                apply(&mut options, 9);
                assert_eq!(options.user_id, Some(9));
            }
            other => panic!("expected filtered lookup, got {other:?}"),
        }
    }

    #[test]
    fn registry_lists_every_collection() {
        let doc = registry_document();
        let uris: Vec<&str> = doc["resources"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|r| r["uri"].as_str())
            .collect();
        assert!(uris.contains(&"crm://deals"));
        assert!(uris.contains(&"crm://stages"));
        assert_eq!(uris.len(), ResourceKind::ALL.len());
    }
}
