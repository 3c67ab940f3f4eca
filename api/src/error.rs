use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use crm_gateway_core::GatewayError;
use crm_gateway_core::envelope::Envelope;
use crm_gateway_core::error::codes;

/// Upstream statuses passed through to the REST caller unchanged.
const PASSTHROUGH_STATUSES: [u16; 7] = [400, 401, 403, 404, 409, 422, 429];

/// Internal error type that converts to `{success: false, error, code}` envelopes
#[derive(Debug)]
pub enum AppError {
    /// Request rejected before reaching the operation core (400)
    Validation {
        message: String,
        field: Option<String>,
    },
    /// Failure from the operation core or the upstream
    Gateway(GatewayError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Gateway(err) => match err {
                GatewayError::UnknownResource(_)
                | GatewayError::InvalidUri(_)
                | GatewayError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
                GatewayError::Unsupported { .. } => StatusCode::METHOD_NOT_ALLOWED,
                GatewayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
                GatewayError::Upstream { status: None, .. } => StatusCode::BAD_GATEWAY,
                GatewayError::Upstream {
                    status: Some(status),
                    ..
                } => PASSTHROUGH_STATUSES
                    .contains(status)
                    .then(|| StatusCode::from_u16(*status).ok())
                    .flatten()
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let envelope = match self {
            AppError::Validation { message, field } => Envelope::failure(message)
                .with_code(codes::VALIDATION_FAILED)
                .with_field(field),
            AppError::Gateway(err) => {
                if status.is_server_error() {
                    tracing::error!(status = status.as_u16(), error = %err, "Request failed");
                } else {
                    tracing::warn!(status = status.as_u16(), error = %err, "Request rejected");
                }
                let field = match &err {
                    GatewayError::InvalidInput { field, .. } => field.clone(),
                    _ => None,
                };
                Envelope::failure(err.to_string())
                    .with_code(err.code())
                    .with_field(field)
            }
        };

        (status, Json(envelope)).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::Gateway(err)
    }
}
