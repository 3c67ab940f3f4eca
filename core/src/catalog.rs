//! Declarative catalog of agent-facing operations and their parameters.
//!
//! The MCP runtime renders these as JSON Schemas for `tools/list`; the REST
//! API renders them as the `GET /tools` capability document.

use serde_json::{Map, Value, json};

use crate::options::DEFAULT_LIMIT;
use crate::payloads::DealStatus;
use crate::resources::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    Number,
    String,
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamType,
    pub required: bool,
    pub description: &'static str,
    pub default: Option<u32>,
}

/// Operation a tool maps onto. Id-carrying variants name the argument that
/// holds the record id; every other argument becomes list params or body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOp {
    List(ResourceKind),
    Get(ResourceKind, &'static str),
    Create(ResourceKind),
    Update(ResourceKind, &'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Gerund phrase for error text, e.g. `Error getting deals: ...`.
    pub action: &'static str,
    pub op: ToolOp,
    pub params: &'static [ParamSpec],
}

impl ToolSpec {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|param| param.name == name)
    }

    /// JSON Schema for the tool's arguments object.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in self.params {
            properties.insert(param.name.to_string(), param.schema());
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

impl ParamSpec {
    fn schema(&self) -> Value {
        let mut schema = match self.kind {
            ParamType::Integer => json!({"type": "integer"}),
            ParamType::Number => json!({"type": "number"}),
            ParamType::String => json!({"type": "string"}),
            ParamType::Enum(values) => json!({"type": "string", "enum": values}),
        };
        schema["description"] = json!(self.description);
        if let Some(default) = self.default {
            schema["default"] = json!(default);
        }
        schema
    }
}

const fn optional(name: &'static str, kind: ParamType, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: false,
        description,
        default: None,
    }
}

const fn required(name: &'static str, kind: ParamType, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: true,
        description,
        default: None,
    }
}

const LIMIT: ParamSpec = ParamSpec {
    name: "limit",
    kind: ParamType::Integer,
    required: false,
    description: "Maximum number of records to return",
    default: Some(DEFAULT_LIMIT),
};
const FILTER_ID: ParamSpec = optional(
    "filter_id",
    ParamType::Integer,
    "ID of a saved CRM filter to apply",
);
const CRM_TOOL_DESCRIPTION: &str =
    "Read and write CRM deals, persons, organizations, activities, pipelines, notes and users";
const DEAL_STATUS: ParamType = ParamType::Enum(&DealStatus::VALUES);

const DEAL_FIELDS: [ParamSpec; 6] = [
    optional("value", ParamType::Number, "Monetary value of the deal"),
    optional("currency", ParamType::String, "Currency code of the value (e.g. USD)"),
    optional("person_id", ParamType::Integer, "ID of the person linked to the deal"),
    optional("org_id", ParamType::Integer, "ID of the organization linked to the deal"),
    optional("stage_id", ParamType::Integer, "ID of the pipeline stage"),
    optional("status", DEAL_STATUS, "Deal status"),
];

pub static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_deals",
        description: "List deals, optionally filtered by saved filter, owner, stage or status",
        action: "getting deals",
        op: ToolOp::List(ResourceKind::Deal),
        params: &[
            FILTER_ID,
            optional("user_id", ParamType::Integer, "Only deals owned by this user"),
            optional("stage_id", ParamType::Integer, "Only deals in this stage"),
            optional("status", DEAL_STATUS, "Only deals with this status"),
            LIMIT,
        ],
    },
    ToolSpec {
        name: "get_deal",
        description: "Get a single deal by ID",
        action: "getting deal",
        op: ToolOp::Get(ResourceKind::Deal, "deal_id"),
        params: &[required("deal_id", ParamType::Integer, "ID of the deal")],
    },
    ToolSpec {
        name: "create_deal",
        description: "Create a new deal",
        action: "creating deal",
        op: ToolOp::Create(ResourceKind::Deal),
        params: &[
            required("title", ParamType::String, "Title of the deal"),
            DEAL_FIELDS[0],
            DEAL_FIELDS[1],
            DEAL_FIELDS[2],
            DEAL_FIELDS[3],
            DEAL_FIELDS[4],
            DEAL_FIELDS[5],
        ],
    },
    ToolSpec {
        name: "update_deal",
        description: "Update fields of an existing deal",
        action: "updating deal",
        op: ToolOp::Update(ResourceKind::Deal, "deal_id"),
        params: &[
            required("deal_id", ParamType::Integer, "ID of the deal to update"),
            optional("title", ParamType::String, "New title of the deal"),
            DEAL_FIELDS[0],
            DEAL_FIELDS[1],
            DEAL_FIELDS[2],
            DEAL_FIELDS[3],
            DEAL_FIELDS[4],
            DEAL_FIELDS[5],
        ],
    },
    ToolSpec {
        name: "get_persons",
        description: "List contact persons",
        action: "getting persons",
        op: ToolOp::List(ResourceKind::Person),
        params: &[FILTER_ID, LIMIT],
    },
    ToolSpec {
        name: "get_organizations",
        description: "List organizations",
        action: "getting organizations",
        op: ToolOp::List(ResourceKind::Organization),
        params: &[FILTER_ID, LIMIT],
    },
    ToolSpec {
        name: "get_activities",
        description: "List activities such as calls, meetings and tasks",
        action: "getting activities",
        op: ToolOp::List(ResourceKind::Activity),
        params: &[
            optional("user_id", ParamType::Integer, "Only activities assigned to this user"),
            LIMIT,
        ],
    },
    ToolSpec {
        name: "get_pipelines",
        description: "List all sales pipelines",
        action: "getting pipelines",
        op: ToolOp::List(ResourceKind::Pipeline),
        params: &[],
    },
    ToolSpec {
        name: "get_notes",
        description: "List notes, optionally only those attached to a deal, person or organization",
        action: "getting notes",
        op: ToolOp::List(ResourceKind::Note),
        params: &[
            optional("deal_id", ParamType::Integer, "Only notes attached to this deal"),
            optional("person_id", ParamType::Integer, "Only notes attached to this person"),
            optional("org_id", ParamType::Integer, "Only notes attached to this organization"),
            LIMIT,
        ],
    },
    ToolSpec {
        name: "get_users",
        description: "List CRM users",
        action: "getting users",
        op: ToolOp::List(ResourceKind::User),
        params: &[],
    },
];

pub fn find(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|tool| tool.name == name)
}

/// Capability document served at `GET /tools`.
pub fn capability_document() -> Value {
    let methods: Vec<Value> = TOOLS
        .iter()
        .map(|tool| {
            let parameters: Map<String, Value> = tool
                .params
                .iter()
                .map(|param| {
                    let description = if param.required {
                        format!("{} (required)", param.description)
                    } else {
                        param.description.to_string()
                    };
                    (param.name.to_string(), Value::String(description))
                })
                .collect();
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": parameters,
            })
        })
        .collect();
    json!({
        "tools": [{
            "name": "crm",
            "description": CRM_TOOL_DESCRIPTION,
            "methods": methods,
        }]
    })
}
