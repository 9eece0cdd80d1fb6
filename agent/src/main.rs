// ─────────────────────────────────────────────
// Interactive Support Agent - Main Entry Point
// ─────────────────────────────────────────────
mod agent;
mod input;
mod modules;
mod network;
mod platform;
mod protocol;
mod takeover;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::agent::{AgentConfig, AgentCore};
use crate::protocol::AgentMode;

#[derive(Parser, Debug)]
#[command(name = "interactive-agent", version, about = "Interactive Support Agent")]
struct Cli {
    /// Server WebSocket URL (e.g., wss://support.example.com/ws/agent)
    #[arg(long, env = "INTERACTIVE_AGENT_SERVER", global = true)]
    server: Option<String>,

    /// Log filter (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(long, env = "INTERACTIVE_AGENT_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Run the agent loop in the foreground (default)
    Run,
    /// Run inside the user's desktop and apply remote input
    Interactive {
        /// Remote control request that launched this process
        #[arg(long)]
        request_id: String,
    },
    /// Print sessions, target session and input desktop as JSON
    Diagnose,
    /// Entry point for the Windows service control manager
    Service,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AgentConfig::load()?;
    cli.apply_overrides(&mut config);

    match cli.command.clone().unwrap_or(Command::Run) {
        Command::Run => {
            init_logging(&config.agent.log_level, None)?;
            run_agent(config, AgentMode::Service, None, None)
        }
        Command::Interactive { request_id } => {
            // No console in the user's session: log to a file
            init_logging(&config.agent.log_level, Some(&agent::interactive_log_path()))?;
            info!(request_id = %request_id, pid = std::process::id(), "Interactive mode starting");
            run_agent(config, AgentMode::Interactive, Some(request_id), None)
        }
        Command::Diagnose => {
            init_logging(&config.agent.log_level, None)?;
            let report = takeover::with_native_os(|os| Ok(takeover::diagnose(os)))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Service => {
            #[cfg(windows)]
            {
                init_logging(
                    &config.agent.log_level,
                    Some(&platform::get_log_dir().join("service.log")),
                )?;
                platform::run_windows_service(config)
            }
            #[cfg(not(windows))]
            {
                anyhow::bail!("the service command is only available on Windows")
            }
        }
    }
}

impl Cli {
    /// Command-line and environment values win over config.toml.
    fn apply_overrides(&self, config: &mut AgentConfig) {
        if let Some(server) = &self.server {
            config.server.ws_url = server.clone();
        }
        if let Some(level) = &self.log_level {
            config.agent.log_level = level.clone();
        }
    }
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level {level:?}"))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match log_file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).json().init();
        }
        None => builder.with_ansi(true).json().init(),
    }
    Ok(())
}

fn run_agent(
    config: AgentConfig,
    mode: AgentMode,
    request_id: Option<String>,
    shutdown: Option<tokio::sync::broadcast::Sender<()>>,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async move {
        let mut core = match shutdown {
            Some(tx) => AgentCore::with_shutdown(config, mode, tx)?,
            None => AgentCore::new(config, mode)?,
        }
        .with_request_id(request_id);
        core.run().await
    })
}

/// Agent loop under the service control manager; returns once `shutdown` fires.
#[cfg(windows)]
pub fn run_agent_service(config: AgentConfig, shutdown: tokio::sync::broadcast::Sender<()>) -> Result<()> {
    platform::ensure_dirs()?;
    run_agent(config, AgentMode::Service, None, Some(shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::try_parse_from(["interactive-agent"]).unwrap();
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_interactive_command_line_parses() {
        let cli = Cli::try_parse_from([
            "interactive-agent",
            "interactive",
            "--server",
            "wss://support.example.com/ws/agent",
            "--request-id",
            "r-9",
        ])
        .unwrap();
        assert_eq!(cli.server.as_deref(), Some("wss://support.example.com/ws/agent"));
        assert_eq!(
            cli.command,
            Some(Command::Interactive {
                request_id: "r-9".into()
            })
        );
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::try_parse_from([
            "interactive-agent",
            "service",
            "--server",
            "wss://support.example.com/ws/agent",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let mut config = AgentConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.server.ws_url, "wss://support.example.com/ws/agent");
        assert_eq!(config.agent.log_level, "debug");

        let cli = Cli::try_parse_from(["interactive-agent", "service"]).unwrap();
        let mut config = AgentConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.server.ws_url, "ws://127.0.0.1:8443/ws/agent");
    }

    #[test]
    fn test_interactive_requires_request_id() {
        assert!(Cli::try_parse_from(["interactive-agent", "interactive"]).is_err());
    }
}
