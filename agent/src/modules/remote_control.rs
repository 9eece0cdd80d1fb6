// ─────────────────────────────────────────────────────────────
// modules/remote_control.rs – Remote control sessions
//   • "Begin remote session": launch the interactive-mode agent
//     into the user's desktop (blocking pipeline, own thread)
//   • Input sink: decoded rd_input events → InputInjector, in order
// ─────────────────────────────────────────────────────────────
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::agent::AgentConfig;
use crate::input::{InputBackend, InputInjector, NormalizedPoint};
use crate::protocol::{MouseButton, RemoteControlStatus, RemoteInput};
use crate::takeover::{self, begin_remote_session, LaunchOutcome, TakeoverError, TakeoverRequest, Visibility};

pub const STARTED_MESSAGE: &str = "remote control started";
const ABORTED_MESSAGE: &str = "remote control failed to start";

#[derive(Debug, Clone)]
pub struct RemoteControlManager {
    exe: PathBuf,
    server_url: String,
    trusted_process: String,
    visibility: Visibility,
    desktop: Option<String>,
    max_attempts: u32,
    extra_args: Vec<String>,
}

impl RemoteControlManager {
    pub fn new(config: &AgentConfig, exe: PathBuf) -> Self {
        let rc = &config.remote_control;
        Self {
            exe,
            server_url: config.server.ws_url.clone(),
            trusted_process: rc.trusted_process.clone(),
            visibility: if rc.hidden_window { Visibility::Hidden } else { Visibility::Visible },
            desktop: rc.desktop.clone(),
            max_attempts: rc.max_attempts,
            extra_args: rc.interactive_args.clone(),
        }
    }

    /// `"<exe>" interactive --server <url> --request-id <id> [extra...]`,
    /// each argument quoted for the Windows command-line parser.
    pub fn command_line(&self, request_id: &str) -> String {
        let mut args: Vec<&str> = vec!["interactive", "--server", &self.server_url, "--request-id", request_id];
        args.extend(self.extra_args.iter().map(String::as_str));

        // The program name is always quoted so paths with spaces resolve
        let mut line = format!("\"{}\"", self.exe.display());
        for arg in args {
            line.push(' ');
            line.push_str(&quote_arg(arg));
        }
        line
    }

    pub fn takeover_request(&self, request_id: &str) -> TakeoverRequest {
        TakeoverRequest {
            command_line: self.command_line(request_id),
            desktop: self.desktop.clone(),
            visibility: self.visibility,
            trusted_process: self.trusted_process.clone(),
            max_attempts: self.max_attempts,
        }
    }

    /// Runs the takeover pipeline on a blocking thread and reports the outcome.
    pub async fn begin(&self, request_id: String) -> RemoteControlStatus {
        let request = self.takeover_request(&request_id);
        let joined = tokio::task::spawn_blocking(move || {
            takeover::with_native_os(|os| begin_remote_session(os, &request))
        })
        .await;

        match joined {
            Ok(result) => status_for(request_id, &result),
            Err(e) => {
                error!(request_id = %request_id, error = %e, "Remote control task aborted");
                RemoteControlStatus {
                    request_id,
                    success: false,
                    message: ABORTED_MESSAGE.to_string(),
                    session_id: None,
                    process_id: None,
                }
            }
        }
    }
}

/// Maps a pipeline result to the operator-facing status. OS detail stays in
/// the log.
pub fn status_for(request_id: String, result: &Result<LaunchOutcome, TakeoverError>) -> RemoteControlStatus {
    match result {
        Ok(outcome) => {
            info!(
                request_id = %request_id,
                session_id = outcome.session_id,
                pid = outcome.process_id,
                desktop = %outcome.desktop_path,
                "Remote control started"
            );
            RemoteControlStatus {
                request_id,
                success: true,
                message: STARTED_MESSAGE.to_string(),
                session_id: Some(outcome.session_id),
                process_id: Some(outcome.process_id),
            }
        }
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Remote control failed");
            RemoteControlStatus {
                request_id,
                success: false,
                message: e.operator_message().to_string(),
                session_id: None,
                process_id: None,
            }
        }
    }
}

/// Quotes one argument so CommandLineToArgvW yields it back unchanged.
pub fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '"']) {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat('\\').take(backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    // Trailing backslashes would escape the closing quote
    quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
    quoted.push('"');
    quoted
}

// ── Input sink ───────────────────────────────────────────────

/// Applies one decoded console event. Returns the count the OS accepted.
pub fn apply_remote_input<B: InputBackend>(injector: &InputInjector<B>, event: RemoteInput) -> u32 {
    match event {
        RemoteInput::MouseMove { x, y } => injector.send_mouse_move(NormalizedPoint::new(x, y)),
        RemoteInput::MouseDown { button: MouseButton::Left, x, y } => injector.send_left_mouse_down(x, y),
        RemoteInput::MouseDown { button: MouseButton::Right, x, y } => injector.send_right_mouse_down(x, y),
        RemoteInput::MouseUp { button: MouseButton::Left, x, y } => injector.send_left_mouse_up(x, y),
        RemoteInput::MouseUp { button: MouseButton::Right, x, y } => injector.send_right_mouse_up(x, y),
        RemoteInput::MouseWheel { delta_y } => injector.send_mouse_wheel(delta_y),
        RemoteInput::KeyDown { vk } => injector.send_key_down(vk),
        RemoteInput::KeyUp { vk } => injector.send_key_up(vk),
    }
}

/// Blocks applying events until every sender is dropped. Returns how many
/// events were applied.
pub fn drain_input<B: InputBackend>(injector: &InputInjector<B>, rx: &mut mpsc::Receiver<RemoteInput>) -> usize {
    let mut applied = 0;
    while let Some(event) = rx.blocking_recv() {
        apply_remote_input(injector, event);
        applied += 1;
    }
    applied
}

/// Single consumer for the input stream, on its own blocking thread so events
/// are injected strictly in arrival order.
pub fn spawn_input_consumer(mut rx: mpsc::Receiver<RemoteInput>) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        #[cfg(windows)]
        {
            let injector = InputInjector::new(crate::input::SendInputBackend);
            let applied = drain_input(&injector, &mut rx);
            info!(applied, "Input stream closed");
        }
        #[cfg(not(windows))]
        {
            warn!("No input backend on this platform, discarding remote input");
            while rx.blocking_recv().is_some() {}
        }
    })
}
