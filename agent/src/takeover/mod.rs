// ─────────────────────────────────────────────────────────────
// takeover/ – Interactive session takeover pipeline
//   • resolver  : which session is the target right now
//   • token     : trusted process lookup + primary token duplication
//   • launcher  : CreateProcessAsUser on winsta0\<desktop>
//   • desktop   : current input desktop name
//   • win32     : real SessionOs (Windows only)
// ─────────────────────────────────────────────────────────────
pub mod desktop;
pub mod error;
mod handle;
pub mod launcher;
pub mod os;
pub mod resolver;
pub mod token;
#[cfg(windows)]
pub mod win32;

#[cfg(test)]
pub(crate) mod mock;

use serde::Serialize;
use tracing::{info, warn};

pub use desktop::current_input_desktop_name;
pub use error::TakeoverError;
pub use launcher::{LaunchSpec, Visibility};
pub use os::{SecurityAttributes, SessionId, SessionOs};
pub use resolver::{resolve_target_session, TargetSession};

use launcher::launch_interactive;
use token::{duplicate_primary_token, find_trusted_process};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchOutcome {
    pub session_id: SessionId,
    pub process_id: u32,
    pub thread_id: u32,
    pub desktop_path: String,
}

/// One pass of resolve → locate → duplicate → launch.
///
/// The session id read here is the one used for both duplication and
/// launch. All handles are closed before returning, on success or failure.
pub fn open_interactive_process(
    os: &dyn SessionOs,
    spec: &LaunchSpec,
    trusted_process: &str,
) -> Result<LaunchOutcome, TakeoverError> {
    let target = resolve_target_session(os);
    info!(session_id = target.session_id, source = ?target.source, "Target session resolved");

    let process = find_trusted_process(os, target.session_id, trusted_process)?;
    let security = SecurityAttributes::new();
    let token = duplicate_primary_token(os, &process, &security)?;
    let launched = launch_interactive(os, &token, spec, &security)?;

    Ok(LaunchOutcome {
        session_id: target.session_id,
        process_id: launched.process_id,
        thread_id: launched.thread_id,
        desktop_path: spec.desktop_path().to_string(),
    })
}

/// Everything needed to start the interactive-mode process.
#[derive(Debug, Clone)]
pub struct TakeoverRequest {
    pub command_line: String,
    /// Fixed desktop name; `None` reads the current input desktop.
    pub desktop: Option<String>,
    pub visibility: Visibility,
    pub trusted_process: String,
    pub max_attempts: u32,
}

/// "Begin remote session": runs the pipeline, retrying from a fresh
/// resolution only after token failures.
pub fn begin_remote_session(os: &dyn SessionOs, req: &TakeoverRequest) -> Result<LaunchOutcome, TakeoverError> {
    let max_attempts = req.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let desktop = match &req.desktop {
            Some(name) => name.clone(),
            None => current_input_desktop_name(os),
        };
        let spec = LaunchSpec::new(req.command_line.as_str(), &desktop, req.visibility);

        match open_interactive_process(os, &spec, &req.trusted_process) {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(error = %e, attempt, max_attempts, "Token stage failed, retrying from session resolution");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Snapshot of what a takeover would see right now.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub console_session: SessionId,
    pub sessions: Vec<os::SessionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_error: Option<String>,
    pub target: TargetSession,
    pub input_desktop: String,
}

pub fn diagnose(os: &dyn SessionOs) -> Diagnosis {
    let (sessions, session_error) = match os.enumerate_sessions() {
        Ok(sessions) => (sessions, None),
        Err(e) => (Vec::new(), Some(e.to_string())),
    };
    Diagnosis {
        console_session: os.active_console_session(),
        sessions,
        session_error,
        target: resolve_target_session(os),
        input_desktop: current_input_desktop_name(os),
    }
}

/// Runs `f` against the host's SessionOs.
pub fn with_native_os<T>(
    f: impl FnOnce(&dyn SessionOs) -> Result<T, TakeoverError>,
) -> Result<T, TakeoverError> {
    #[cfg(windows)]
    {
        f(&win32::Win32Os)
    }
    #[cfg(not(windows))]
    {
        let _ = f;
        Err(TakeoverError::Unsupported)
    }
}
