//! # weft
//!
//! Server binary: loads settings, sets up logging and metrics, registers
//! the built-in demo methods, and serves until Ctrl-C.

#![deny(unsafe_code)]

mod demo;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use weft_logging::LogFormat;
use weft_server::metrics::install_recorder;
use weft_server::{MethodRegistry, ServerConfig, WeftServer};
use weft_settings::{LogLevel, WeftSettings};

/// JSON-RPC and topic publish/subscribe over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "weft", about = "JSON-RPC and topic publish/subscribe over WebSocket")]
struct Cli {
    /// Settings file (default `~/.weft/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    /// Log format: compact or json.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Command-line flags win over file and environment.
    fn apply(&self, settings: &mut WeftSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::parse(s).ok_or_else(|| format!("unknown log level '{s}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(weft_settings::settings_path);
    let mut settings = weft_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    cli.apply(&mut settings);

    weft_logging::init_subscriber(
        settings.logging.level.as_filter_str(),
        settings.logging.format,
    );
    let metrics_handle = install_recorder().context("failed to install metrics recorder")?;

    let mut methods = MethodRegistry::new();
    demo::register_demo_methods(&mut methods).context("failed to register methods")?;
    let method_count = methods.methods().len();

    let server = WeftServer::new(
        ServerConfig::from(&settings.server),
        methods,
        metrics_handle,
    );
    let (addr, serve) = server.listen().await.context("failed to bind server")?;
    tracing::info!("weft listening on http://{addr} ({method_count} RPC methods registered)");

    let mut tasks = vec![serve];
    if settings.server.tick_interval_secs > 0 {
        tasks.push(demo::spawn_ticker(
            server.publisher().clone(),
            Duration::from_secs(settings.server.tick_interval_secs),
            server.shutdown().token(),
        ));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    let report = server.shutdown().graceful_shutdown(tasks, None).await;
    tracing::info!(?report, "shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["weft"]);
        let mut settings = WeftSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.logging.level, LogLevel::Info);
        assert_eq!(settings.logging.format, LogFormat::Compact);
    }

    #[test]
    fn cli_overrides_server_address() {
        let cli = Cli::parse_from(["weft", "--host", "0.0.0.0", "--port", "9000"]);
        let mut settings = WeftSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 9000);
    }

    #[test]
    fn cli_overrides_logging() {
        let cli = Cli::parse_from(["weft", "--log-level", "DEBUG", "--log-format", "json"]);
        let mut settings = WeftSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.logging.level, LogLevel::Debug);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["weft", "--config", "/tmp/weft.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/weft.json")));
    }

    #[test]
    fn cli_rejects_unknown_log_level() {
        assert!(Cli::try_parse_from(["weft", "--log-level", "loud"]).is_err());
        assert!(Cli::try_parse_from(["weft", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn cli_rejects_out_of_range_port() {
        assert!(Cli::try_parse_from(["weft", "--port", "70000"]).is_err());
    }
}
