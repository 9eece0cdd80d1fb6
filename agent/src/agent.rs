// ─────────────────────────────────────────────────────────────
// agent.rs – Agent Core
//   • Config loading (TOML, defaults when absent)
//   • Main event loop (orchestrator)
//   • Server message dispatch
//   • Health reporting
//   • Graceful shutdown
// ─────────────────────────────────────────────────────────────
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::modules::remote_control::{self, RemoteControlManager};
use crate::network::WsClient;
use crate::protocol::*;
use crate::takeover::{self, current_input_desktop_name, resolve_target_session};

// ═══════════════════════════════════════════════════════════════
//  Configuration structs (mapped from config.toml)
// ═══════════════════════════════════════════════════════════════
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub remote_control: RemoteControlConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            health_interval_secs: default_health_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub machine_id: String,
    #[serde(default)]
    pub agent_id: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            machine_id: String::new(),
            agent_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteControlConfig {
    /// Image name whose token is borrowed in the target session.
    #[serde(default = "default_trusted_process")]
    pub trusted_process: String,
    #[serde(default = "default_true")]
    pub hidden_window: bool,
    /// Fixed desktop name; unset reads the current input desktop per launch.
    #[serde(default)]
    pub desktop: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Appended to the interactive-mode command line.
    #[serde(default)]
    pub interactive_args: Vec<String>,
}

impl Default for RemoteControlConfig {
    fn default() -> Self {
        Self {
            trusted_process: default_trusted_process(),
            hidden_window: default_true(),
            desktop: None,
            max_attempts: default_max_attempts(),
            interactive_args: Vec::new(),
        }
    }
}

fn default_ws_url() -> String { "ws://127.0.0.1:8443/ws/agent".into() }
fn default_health_interval() -> u64 { 30 }
fn default_log_level() -> String { "info".into() }
fn default_trusted_process() -> String { takeover::token::TRUSTED_PROCESS.into() }
fn default_true() -> bool { true }
fn default_max_attempts() -> u32 { 2 }

impl AgentConfig {
    pub fn load() -> Result<Self> {
        let config_path = crate::platform::get_config_path();
        // Fallback: local config.toml (dev / first run), then built-in defaults
        let local = crate::platform::get_current_exe_dir().join("config.toml");
        let path = [config_path, local].into_iter().find(|p| p.exists());

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                warn!("No config.toml found, using defaults");
                AgentConfig::default()
            }
        };

        // Auto-fill identity if empty
        if config.agent.machine_id.is_empty() {
            config.agent.machine_id = crate::platform::get_machine_id();
        }
        if config.agent.agent_id.is_empty() {
            config.agent.agent_id = config.agent.machine_id.clone();
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        url::Url::parse(&config.server.ws_url)
            .with_context(|| format!("invalid server.ws_url {:?}", config.server.ws_url))?;
        Ok(config)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Agent Core (the orchestrator)
// ═══════════════════════════════════════════════════════════════
pub struct AgentCore {
    config: AgentConfig,
    mode: AgentMode,
    request_id: Option<String>,
    remote: RemoteControlManager,
    shutdown_tx: broadcast::Sender<()>,
}

impl AgentCore {
    pub fn new(config: AgentConfig, mode: AgentMode) -> Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self::with_shutdown(config, mode, shutdown_tx)
    }

    /// Core driven by an external stop signal (the service control handler).
    pub fn with_shutdown(config: AgentConfig, mode: AgentMode, shutdown_tx: broadcast::Sender<()>) -> Result<Self> {
        let exe = std::env::current_exe().context("locating agent executable")?;
        let remote = RemoteControlManager::new(&config, exe);
        Ok(Self {
            config,
            mode,
            request_id: None,
            remote,
            shutdown_tx,
        })
    }

    /// Ties an interactive process to the request that launched it; reported
    /// in every `hello`.
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub async fn run(&mut self) -> Result<()> {
        info!(
            machine_id = %self.config.agent.machine_id,
            mode = ?self.mode,
            "Agent Core starting"
        );

        // ── Spawn WebSocket client ───────────────────────────
        let (ws_incoming_tx, mut ws_incoming_rx) = mpsc::channel::<ServerMessage>(256);
        let (ws_outgoing_tx, ws_outgoing_rx) = mpsc::channel::<AgentMessage>(256);

        let ws = WsClient::new(
            self.config.clone(),
            self.hello(),
            ws_incoming_tx,
            ws_outgoing_rx,
            self.shutdown_tx.subscribe(),
        );
        tokio::spawn(async move { ws.run().await });

        // ── Spawn input consumer (interactive mode only) ─────
        let input_tx = match self.mode {
            AgentMode::Interactive => {
                let (tx, rx) = mpsc::channel::<RemoteInput>(1024);
                remote_control::spawn_input_consumer(rx);
                Some(tx)
            }
            AgentMode::Service => None,
        };

        // ── Spawn health reporter ────────────────────────────
        let health_tx = ws_outgoing_tx.clone();
        let health_every = Duration::from_secs(self.config.server.health_interval_secs.max(1));
        let mut health_shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(health_every) => {}
                    _ = health_shutdown.recv() => return,
                }
                match tokio::task::spawn_blocking(collect_health).await {
                    Ok(Some(health)) => {
                        if health_tx.send(AgentMessage::Health(health)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Health probe panicked"),
                }
            }
        });

        // ── Main event loop: process WS messages ─────────────
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                Some(msg) = ws_incoming_rx.recv() => {
                    self.handle_server_message(msg, &ws_outgoing_tx, input_tx.as_ref()).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down gracefully");
                    self.shutdown_tx.send(()).ok();
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!("Agent Core stopped");
        Ok(())
    }

    fn hello(&self) -> HelloPayload {
        HelloPayload {
            agent_id: self.config.agent.agent_id.clone(),
            machine_id: self.config.agent.machine_id.clone(),
            hostname: crate::platform::get_hostname(),
            os_info: crate::platform::get_os_info(),
            mode: self.mode,
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            request_id: self.request_id.clone(),
        }
    }

    // ── Server message handler ───────────────────────────────
    async fn handle_server_message(
        &self,
        msg: ServerMessage,
        ws_tx: &mpsc::Sender<AgentMessage>,
        input_tx: Option<&mpsc::Sender<RemoteInput>>,
    ) {
        match msg {
            ServerMessage::StartRemoteControl { request_id } if self.mode == AgentMode::Interactive => {
                // Only the service launches; this process already is the launch
                debug!(request_id = %request_id, "Remote control request in interactive mode, ignored");
            }
            ServerMessage::StartRemoteControl { request_id } => {
                info!(request_id = %request_id, "Remote control requested");
                let remote = self.remote.clone();
                let ws_tx = ws_tx.clone();
                tokio::spawn(async move {
                    let status = remote.begin(request_id).await;
                    ws_tx.send(AgentMessage::RemoteControlStatus(status)).await.ok();
                });
            }
            ServerMessage::RdInput { event } => match input_tx {
                Some(tx) => {
                    if tx.send(event).await.is_err() {
                        warn!("Input consumer gone, dropping event");
                    }
                }
                None => debug!(event = ?event, "Input received outside interactive mode, ignored"),
            },
            ServerMessage::Ping { id } => {
                ws_tx.send(AgentMessage::Pong { id }).await.ok();
            }
        }
    }
}

/// Target session and input desktop as seen right now. `None` off Windows.
fn collect_health() -> Option<HealthPayload> {
    takeover::with_native_os(|os| {
        Ok(HealthPayload {
            desktop: current_input_desktop_name(os),
            target_session: resolve_target_session(os).session_id,
            timestamp: chrono::Utc::now(),
        })
    })
    .map_err(|e| debug!(error = %e, "Health probe unavailable"))
    .ok()
}

/// Where the interactive-mode process writes its log file.
pub fn interactive_log_path() -> PathBuf {
    crate::platform::get_log_dir().join("interactive.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = AgentConfig::parse("").unwrap();
        assert_eq!(cfg.server.ws_url, "ws://127.0.0.1:8443/ws/agent");
        assert_eq!(cfg.agent.log_level, "info");
        assert_eq!(cfg.remote_control.trusted_process, "winlogon.exe");
        assert!(cfg.remote_control.hidden_window);
        assert_eq!(cfg.remote_control.desktop, None);
        assert_eq!(cfg.remote_control.max_attempts, 2);
        assert!(cfg.remote_control.interactive_args.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let cfg = AgentConfig::parse(
            r#"
            [server]
            ws_url = "wss://support.example.com/ws/agent"
            health_interval_secs = 10

            [agent]
            log_level = "debug"
            machine_id = "m-1"

            [remote_control]
            trusted_process = "explorer.exe"
            hidden_window = false
            desktop = "Default"
            max_attempts = 5
            interactive_args = ["--verbose"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.ws_url, "wss://support.example.com/ws/agent");
        assert_eq!(cfg.server.health_interval_secs, 10);
        assert_eq!(cfg.agent.machine_id, "m-1");
        assert_eq!(cfg.remote_control.trusted_process, "explorer.exe");
        assert!(!cfg.remote_control.hidden_window);
        assert_eq!(cfg.remote_control.desktop.as_deref(), Some("Default"));
        assert_eq!(cfg.remote_control.max_attempts, 5);
        assert_eq!(cfg.remote_control.interactive_args, vec!["--verbose".to_string()]);
    }

    #[test]
    fn test_bad_ws_url_is_rejected() {
        let err = AgentConfig::parse("[server]\nws_url = \"not a url\"").unwrap_err();
        assert!(format!("{err:#}").contains("ws_url"));
    }

    fn core(mode: AgentMode) -> AgentCore {
        AgentCore::new(AgentConfig::default(), mode).unwrap()
    }

    #[tokio::test]
    async fn test_interactive_mode_ignores_start_remote_control() {
        let core = core(AgentMode::Interactive);
        let (ws_tx, mut ws_rx) = mpsc::channel(8);
        let (input_tx, _input_rx) = mpsc::channel(8);

        core.handle_server_message(
            ServerMessage::StartRemoteControl {
                request_id: "nested".into(),
            },
            &ws_tx,
            Some(&input_tx),
        )
        .await;
        core.handle_server_message(ServerMessage::Ping { id: "p-1".into() }, &ws_tx, Some(&input_tx))
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ws_rx.try_recv().unwrap(), AgentMessage::Pong { id: "p-1".into() });
        assert!(ws_rx.try_recv().is_err());
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn test_service_mode_answers_start_remote_control() {
        let core = core(AgentMode::Service);
        let (ws_tx, mut ws_rx) = mpsc::channel(8);

        core.handle_server_message(
            ServerMessage::StartRemoteControl {
                request_id: "r-1".into(),
            },
            &ws_tx,
            None,
        )
        .await;

        let reply = tokio::time::timeout(Duration::from_secs(10), ws_rx.recv()).await.unwrap();
        match reply {
            Some(AgentMessage::RemoteControlStatus(status)) => assert_eq!(status.request_id, "r-1"),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_hello_carries_request_id() {
        let hello = core(AgentMode::Interactive).with_request_id(Some("r-9".into())).hello();
        assert_eq!(hello.mode, AgentMode::Interactive);
        assert_eq!(hello.request_id.as_deref(), Some("r-9"));
        assert_eq!(core(AgentMode::Service).hello().request_id, None);
    }

    #[test]
    fn test_interactive_log_file_name() {
        assert!(interactive_log_path().ends_with("interactive.log"));
    }
}
