// ─────────────────────────────────────────────────────────────
// takeover/resolver.rs – Target session resolution
// ─────────────────────────────────────────────────────────────
use serde::Serialize;
use tracing::{debug, warn};

use super::os::{SessionId, SessionInfo, SessionOs, SessionState, NO_CONSOLE_SESSION};

/// Where the chosen session id came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionSource {
    Console,
    Rdp { station: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSession {
    pub session_id: SessionId,
    pub source: SessionSource,
}

/// Picks the session to take over: an active RDP session if one exists,
/// otherwise the console session.
///
/// Re-queried on every call; session ids change whenever a user logs off or
/// an RDP client connects.
pub fn resolve_target_session(os: &dyn SessionOs) -> TargetSession {
    let console = match os.active_console_session() {
        NO_CONSOLE_SESSION => 0,
        id => id,
    };

    let sessions = match os.enumerate_sessions() {
        Ok(sessions) => sessions,
        Err(e) => {
            warn!(error = %e, console, "Session enumeration failed, using console session");
            return TargetSession {
                session_id: console,
                source: SessionSource::Console,
            };
        }
    };

    match active_rdp_session(&sessions) {
        Some(rdp) => {
            debug!(session_id = rdp.session_id, station = %rdp.station_name, console, "Active RDP session overrides console");
            TargetSession {
                session_id: rdp.session_id,
                source: SessionSource::Rdp {
                    station: rdp.station_name.clone(),
                },
            }
        }
        None => TargetSession {
            session_id: console,
            source: SessionSource::Console,
        },
    }
}

/// First active session whose station name mentions "rdp".
pub fn active_rdp_session(sessions: &[SessionInfo]) -> Option<&SessionInfo> {
    sessions
        .iter()
        .find(|s| s.state == SessionState::Active && s.station_name.to_lowercase().contains("rdp"))
}
