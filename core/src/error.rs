use thiserror::Error;

/// Failure raised anywhere between an inbound request and the upstream CRM.
///
/// "Not found" is deliberately absent: an upstream that reports no item is an
/// ordinary outcome (see `gateway::Outcome::NotFound`), not an error value.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing API token or unusable upstream URL. Fatal at startup.
    #[error("{0}")]
    Configuration(String),

    /// Resource family name that has no descriptor.
    #[error("Unknown resource type '{0}'")]
    UnknownResource(String),

    /// `crm://` URI that does not parse, or lacks a required identifier.
    #[error("{0}")]
    InvalidUri(String),

    /// Request body or parameter rejected before reaching the upstream.
    #[error("{message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    /// Operation the resource family does not offer (e.g. deleting a pipeline).
    #[error("{operation} is not supported for {resource}")]
    Unsupported {
        operation: &'static str,
        resource: &'static str,
    },

    /// Upstream answered with a failure status (`status` set) or could not be
    /// reached at all (`status` is `None`).
    #[error("{message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },
}

impl GatewayError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
        }
    }

    /// Machine-readable code carried in REST error envelopes and tool errors.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => codes::CONFIGURATION_ERROR,
            Self::UnknownResource(_) => codes::UNKNOWN_RESOURCE,
            Self::InvalidUri(_) => codes::INVALID_URI,
            Self::InvalidInput { .. } => codes::VALIDATION_FAILED,
            Self::Unsupported { .. } => codes::UNSUPPORTED_OPERATION,
            Self::Upstream { status: None, .. } => codes::UPSTREAM_UNAVAILABLE,
            Self::Upstream { .. } => codes::UPSTREAM_ERROR,
        }
    }

    /// True when the caller sent something unusable, as opposed to a gateway
    /// or upstream fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownResource(_)
                | Self::InvalidUri(_)
                | Self::InvalidInput { .. }
                | Self::Unsupported { .. }
        )
    }
}

/// Error codes used across the REST and protocol surfaces
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_URI: &str = "invalid_uri";
    pub const UNKNOWN_RESOURCE: &str = "unknown_resource";
    pub const UNSUPPORTED_OPERATION: &str = "unsupported_operation";
    pub const CONFIGURATION_ERROR: &str = "configuration_error";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const UPSTREAM_UNAVAILABLE: &str = "upstream_unavailable";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_have_no_status() {
        let err = GatewayError::transport("connection refused");
        assert_eq!(err.code(), codes::UPSTREAM_UNAVAILABLE);
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn input_errors_are_client_errors() {
        let err = GatewayError::invalid_input("title", "title is required");
        assert!(err.is_client_error());
        assert_eq!(err.code(), codes::VALIDATION_FAILED);
    }
}
