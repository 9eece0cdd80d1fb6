// ─────────────────────────────────────────────────────────────
// protocol.rs – All message schemas (agent ↔ server)
// serde-tagged JSON over the WebSocket channel.
// ─────────────────────────────────────────────────────────────
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════
//  Server → Agent  messages
// ═══════════════════════════════════════════════════════════════
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "start_remote_control")]
    StartRemoteControl { request_id: String },
    #[serde(rename = "ping")]
    Ping { id: String },

    // Remote input (low-latency mouse/keyboard injection)
    #[serde(rename = "rd_input")]
    RdInput { event: RemoteInput },
}

// ═══════════════════════════════════════════════════════════════
//  Agent → Server  messages
// ═══════════════════════════════════════════════════════════════
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AgentMessage {
    #[serde(rename = "hello")]
    Hello(HelloPayload),
    #[serde(rename = "remote_control_status")]
    RemoteControlStatus(RemoteControlStatus),
    #[serde(rename = "health")]
    Health(HealthPayload),
    #[serde(rename = "pong")]
    Pong { id: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Long-running agent (usually the Windows service).
    Service,
    /// The process launched into the user's desktop.
    Interactive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HelloPayload {
    pub agent_id: String,
    pub machine_id: String,
    pub hostname: String,
    pub os_info: String,
    pub mode: AgentMode,
    pub agent_version: String,
    /// The `start_remote_control` request an interactive process serves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteControlStatus {
    pub request_id: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthPayload {
    pub desktop: String,
    pub target_session: u32,
    pub timestamp: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════
//  Remote input events
// ═══════════════════════════════════════════════════════════════
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
}

/// One console input event. Mouse-move coordinates are normalized to
/// [0, 1]; button coordinates are raw pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteInput {
    MouseMove { x: f64, y: f64 },
    MouseDown { button: MouseButton, x: i32, y: i32 },
    MouseUp { button: MouseButton, x: i32, y: i32 },
    MouseWheel { delta_y: f64 },
    KeyDown { vk: u16 },
    KeyUp { vk: u16 },
}
