//! Logging setup shared by the REST server and the MCP server.
//!
//! Console output goes to stdout (REST, JSON lines) or stderr (MCP stdio,
//! where stdout carries the protocol). Optional file sinks write everything to
//! `all.log` and errors only to `error.log`.

use std::path::{Path, PathBuf};

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

pub const DEFAULT_LOG_DIR: &str = "logs";
const FALLBACK_LOG_DIR: &str = "crm-gateway-logs";
const DEVELOPMENT: &str = "development";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogOutput {
    /// JSON lines on stdout.
    #[default]
    Stdout,
    /// Human-readable lines on stderr; stdout stays free for JSON-RPC.
    Stderr,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub app_env: String,
    /// Level used outside development when `RUST_LOG` is unset.
    pub log_level: String,
    /// Crate targets the default directive applies to.
    pub targets: Vec<&'static str>,
    pub output: LogOutput,
    /// `None` disables file sinks.
    pub log_dir: Option<PathBuf>,
}

impl LogConfig {
    pub fn new(targets: &[&'static str]) -> Self {
        Self {
            app_env: DEVELOPMENT.to_string(),
            log_level: "info".to_string(),
            targets: targets.to_vec(),
            output: LogOutput::Stdout,
            log_dir: Some(PathBuf::from(DEFAULT_LOG_DIR)),
        }
    }

    pub fn app_env(mut self, app_env: impl Into<String>) -> Self {
        self.app_env = app_env.into();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.log_dir = dir;
        self
    }

    /// `debug` in development, otherwise the configured level.
    pub fn level(&self) -> &str {
        if self.app_env.eq_ignore_ascii_case(DEVELOPMENT) {
            "debug"
        } else {
            &self.log_level
        }
    }

    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub fn default_directive(&self) -> String {
        let level = self.level();
        let mut directives: Vec<String> = self
            .targets
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect();
        directives.push(format!("tower_http={level}"));
        directives.push("warn".to_string());
        directives.join(",")
    }

    fn build_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))
    }
}

/// Keeps the non-blocking file writers alive; hold until exit.
#[must_use = "dropping the guards stops file logging"]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
    pub log_dir: Option<PathBuf>,
}

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Installs the global subscriber. Call once, before any other work.
pub fn init(config: LogConfig) -> LogGuards {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let console = match config.output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
    };
    layers.push(match config.output {
        LogOutput::Stdout => fmt::layer().json().with_writer(console).boxed(),
        LogOutput::Stderr => fmt::layer().with_ansi(false).with_writer(console).boxed(),
    });

    let mut guards = Vec::new();
    let mut file_error = None;
    let log_dir = match config.log_dir.as_deref() {
        Some(preferred) => match open_file_sinks(preferred) {
            Ok((dir, all, errors)) => {
                let (all_writer, all_guard) = tracing_appender::non_blocking(all);
                let (error_writer, error_guard) = tracing_appender::non_blocking(errors);
                layers.push(fmt::layer().with_ansi(false).with_writer(all_writer).boxed());
                layers.push(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(error_writer)
                        .with_filter(LevelFilter::ERROR)
                        .boxed(),
                );
                guards.push(all_guard);
                guards.push(error_guard);
                Some(dir)
            }
            Err(message) => {
                file_error = Some(message);
                None
            }
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(config.build_filter())
        .with(layers)
        .init();

    if let Some(message) = file_error {
        tracing::warn!(event = "log_files_disabled", error = %message, "File logging disabled");
    }
    tracing::debug!(
        event = "logging_initialized",
        level = config.level(),
        app_env = %config.app_env,
        log_dir = ?log_dir,
        "Logging initialized"
    );

    LogGuards {
        _guards: guards,
        log_dir,
    }
}

/// Opens `all.log` and `error.log` in `preferred`, falling back to
/// `$HOME/crm-gateway-logs` when the preferred directory is unusable.
fn open_file_sinks(
    preferred: &Path,
) -> Result<(PathBuf, RollingFileAppender, RollingFileAppender), String> {
    let mut candidates = vec![preferred.to_path_buf()];
    if let Some(home) = std::env::var_os("HOME") {
        candidates.push(PathBuf::from(home).join(FALLBACK_LOG_DIR));
    }

    let mut last_error = String::from("no log directory candidates");
    for dir in candidates {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            last_error = format!("{}: {e}", dir.display());
            continue;
        }
        match (appender(&dir, "all"), appender(&dir, "error")) {
            (Ok(all), Ok(errors)) => return Ok((dir, all, errors)),
            (Err(e), _) | (_, Err(e)) => last_error = format!("{}: {e}", dir.display()),
        }
    }
    Err(last_error)
}

fn appender(dir: &Path, name: &str) -> Result<RollingFileAppender, String> {
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .filename_suffix("log")
        .build(dir)
        .map_err(|e| e.to_string())
}

/// Logs panics through tracing before the default hook runs. A panic on the
/// main task still terminates the process.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::error!(
            event = "panic",
            location = %location,
            panic = %info,
            "Uncaught panic"
        );
        default_hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_logs_at_debug() {
        let config = LogConfig::new(&["crm_gateway_api"]).log_level("warn");
        assert_eq!(config.level(), "debug");
        assert_eq!(
            config.default_directive(),
            "crm_gateway_api=debug,tower_http=debug,warn"
        );
    }

    #[test]
    fn production_uses_configured_level() {
        let config = LogConfig::new(&["crm_gateway_mcp", "crm_gateway_core"])
            .app_env("production")
            .log_level("error");
        assert_eq!(config.level(), "error");
        assert_eq!(
            config.default_directive(),
            "crm_gateway_mcp=error,crm_gateway_core=error,tower_http=error,warn"
        );
    }

    #[test]
    fn file_sinks_open_in_a_writable_directory() {
        let dir = std::env::temp_dir().join(format!("crm-gateway-log-test-{}", std::process::id()));
        let (chosen, _all, _errors) = open_file_sinks(&dir).unwrap();
        assert_eq!(chosen, dir);
        assert!(dir.join("all.log").exists());
        assert!(dir.join("error.log").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
