//! `crm://<type>[/<id>]` resource addresses.

use std::fmt;

use crate::error::GatewayError;
use crate::resources::ResourceKind;

pub const SCHEME: &str = "crm";
/// Address of the registry document listing every collection.
pub const ROOT: &str = "crm://";
const SEPARATOR: &str = "://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUri {
    /// Collection name as written in the URI; empty for the registry root.
    pub resource_type: String,
    pub id: Option<String>,
}

impl ResourceUri {
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let parts: Vec<&str> = raw.trim().split(SEPARATOR).collect();
        let [scheme, rest] = parts.as_slice() else {
            return Err(invalid_format());
        };
        if *scheme != SCHEME {
            return Err(GatewayError::InvalidUri(format!(
                "Unsupported URI scheme '{scheme}'. Expected {SCHEME}://{{resource}}/{{id}}"
            )));
        }

        let rest = rest.trim_end_matches('/');
        let mut segments = rest.split('/');
        let resource_type = segments.next().unwrap_or_default().to_string();
        let id = segments
            .next()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        if segments.next().is_some() || (resource_type.is_empty() && id.is_some()) {
            return Err(invalid_format());
        }

        Ok(Self { resource_type, id })
    }

    pub fn collection(kind: ResourceKind) -> Self {
        Self {
            resource_type: kind.plural().to_string(),
            id: None,
        }
    }

    pub fn item(kind: ResourceKind, id: &str) -> Self {
        Self {
            resource_type: kind.plural().to_string(),
            id: Some(id.to_string()),
        }
    }

    pub fn is_root(&self) -> bool {
        self.resource_type.is_empty()
    }

    /// Registered resource family named by the URI.
    pub fn kind(&self) -> Result<ResourceKind, GatewayError> {
        ResourceKind::parse(&self.resource_type).map_err(|_| {
            GatewayError::InvalidUri(format!(
                "Unknown resource type '{}' in URI",
                self.resource_type
            ))
        })
    }

    /// Identifier for item-level resolution.
    pub fn require_id(&self) -> Result<&str, GatewayError> {
        self.id
            .as_deref()
            .ok_or_else(|| GatewayError::InvalidUri("Resource ID is required".to_string()))
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{SEPARATOR}{}", self.resource_type)?;
        if let Some(id) = &self.id {
            write!(f, "/{id}")?;
        }
        Ok(())
    }
}

fn invalid_format() -> GatewayError {
    GatewayError::InvalidUri(format!(
        "Invalid URI format. Expected {SCHEME}://{{resource}}/{{id}}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_item_uri() {
        let uri = ResourceUri::parse("crm://deals/42").unwrap();
        assert_eq!(uri.resource_type, "deals");
        assert_eq!(uri.id.as_deref(), Some("42"));
        assert_eq!(uri.kind().unwrap(), ResourceKind::Deal);
        assert_eq!(uri.to_string(), "crm://deals/42");
    }

    #[test]
    fn parses_collection_uri_without_id() {
        let uri = ResourceUri::parse("crm://deals").unwrap();
        assert_eq!(uri.resource_type, "deals");
        assert_eq!(uri.id, None);
        assert!(matches!(
            uri.require_id(),
            Err(GatewayError::InvalidUri(msg)) if msg == "Resource ID is required"
        ));
    }

    #[test]
    fn trailing_slash_means_no_id() {
        let uri = ResourceUri::parse("crm://persons/").unwrap();
        assert_eq!(uri.id, None);
    }

    #[test]
    fn root_uri_addresses_the_registry() {
        let uri = ResourceUri::parse(ROOT).unwrap();
        assert!(uri.is_root());
        assert_eq!(uri.to_string(), ROOT);
    }

    #[test]
    fn rejects_foreign_scheme() {
        assert!(matches!(
            ResourceUri::parse("bogus://deals/1"),
            Err(GatewayError::InvalidUri(_))
        ));
    }

    #[test]
    fn rejects_malformed_uris() {
        for raw in ["deals/1", "crm://a://b", "crm://deals/1/notes", "crm:///1"] {
            assert!(
                matches!(ResourceUri::parse(raw), Err(GatewayError::InvalidUri(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn unknown_type_surfaces_as_invalid_uri() {
        let uri = ResourceUri::parse("crm://leads/1").unwrap();
        assert!(matches!(uri.kind(), Err(GatewayError::InvalidUri(_))));
    }
}
