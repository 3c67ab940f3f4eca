use std::path::PathBuf;

use clap::Parser;
use crm_gateway_core::CrmConfig;
use crm_gateway_core::client::DEFAULT_API_URL;
use crm_gateway_core::telemetry::{self, LogConfig, LogOutput};
use crm_gateway_mcp_runtime::{McpCommands, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "crm-gateway-mcp",
    version,
    about = "CRM gateway MCP server over stdio"
)]
struct Cli {
    /// Upstream CRM API token
    #[arg(long, env = "CRM_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Upstream CRM API base URL
    #[arg(long, env = "CRM_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

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

    /// Defaults to `serve`
    #[command(subcommand)]
    command: Option<McpCommands>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // stdout carries JSON-RPC; logs go to stderr
    let log_guards = telemetry::init(
        LogConfig::new(&["crm_gateway_mcp_runtime", "crm_gateway_core"])
            .app_env(&cli.app_env)
            .log_level(&cli.log_level)
            .output(LogOutput::Stderr)
            .log_dir((!cli.no_log_files).then(|| cli.log_dir.clone())),
    );
    telemetry::install_panic_hook();

    let config = CrmConfig {
        api_token: cli.api_token,
        api_url: cli.api_url,
    };
    let code = run_mcp(config, cli.command.unwrap_or(McpCommands::Serve)).await;
    // Flush file sinks; process::exit skips destructors.
    drop(log_guards);
    std::process::exit(code);
}
