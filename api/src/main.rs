use std::any::Any;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use clap::Parser;
use crm_gateway_core::client::DEFAULT_API_URL;
use crm_gateway_core::envelope::Envelope;
use crm_gateway_core::error::codes;
use crm_gateway_core::telemetry::{self, LogConfig, LogOutput};
use crm_gateway_core::{CrmClient, CrmConfig, Gateway};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

mod error;
mod extract;
mod middleware;
mod routes;
mod state;

#[derive(Parser, Debug)]
#[command(name = "crm-gateway-api", about = "REST gateway for the CRM", version)]
struct Cli {
    /// Upstream CRM API token
    #[arg(long, env = "CRM_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Upstream CRM API base URL
    #[arg(long, env = "CRM_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Log level outside development
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Environment mode; `development` logs at debug
    #[arg(long, env = "APP_ENV", default_value = "development")]
    app_env: String,

    /// Directory for all.log and error.log
    #[arg(long, env = "CRM_LOG_DIR", default_value = telemetry::DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    /// Disable log files
    #[arg(long, env = "CRM_NO_LOG_FILES", default_value_t = false)]
    no_log_files: bool,
}

/// Request ids are time-sortable UUIDv7.
#[derive(Clone, Copy, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        uuid::Uuid::now_v7()
            .to_string()
            .parse()
            .ok()
            .map(RequestId::new)
    }
}

fn build_app(state: state::AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::tools::router())
        .merge(routes::resources::router())
        .merge(routes::mcp_http::router())
        .fallback(route_not_found)
        .layer(middleware::access_log::AccessLogLayer::new())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(state)
}

async fn route_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(Envelope::failure("Route not found").with_code(codes::NOT_FOUND)),
    )
        .into_response()
}

/// Handler panics become a 500 envelope; the process keeps serving.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    tracing::error!(event = "handler_panic", detail, "Request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Envelope::failure("An internal error occurred").with_code(codes::INTERNAL_ERROR)),
    )
        .into_response()
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Structured JSON logging
    let log_guards = telemetry::init(
        LogConfig::new(&["crm_gateway_api", "crm_gateway_core", "crm_gateway_mcp_runtime"])
            .app_env(&cli.app_env)
            .log_level(&cli.log_level)
            .output(LogOutput::Stdout)
            .log_dir((!cli.no_log_files).then(|| cli.log_dir.clone())),
    );
    telemetry::install_panic_hook();

    let client = match CrmClient::initialize(&CrmConfig {
        api_token: cli.api_token.clone(),
        api_url: cli.api_url.clone(),
    }) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(
                event = "startup_failed",
                error = %err,
                "Failed to initialize CRM client"
            );
            drop(log_guards);
            std::process::exit(1);
        }
    };

    let app = build_app(state::AppState::new(Arc::new(Gateway::new(client))));

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(
                event = "startup_failed",
                %addr,
                error = %err,
                "Failed to bind listener"
            );
            drop(log_guards);
            std::process::exit(1);
        }
    };
    tracing::info!("CRM gateway API listening on {}", addr);

    if let Err(err) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!(event = "server_failed", error = %err, "Server terminated");
        drop(log_guards);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use crm_gateway_core::testing::{FakeTransport, gateway_with};
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        build_app(state::AppState::new(gateway_with(Arc::new(FakeTransport::new()))))
    }

    #[tokio::test]
    async fn unknown_routes_get_a_404_envelope() {
        let response = app()
            .oneshot(Request::builder().uri("/leads").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn health_is_served_through_the_full_stack() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn panic_payloads_render_as_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
