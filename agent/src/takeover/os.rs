// ─────────────────────────────────────────────────────────────
// takeover/os.rs – OS boundary for session / token / launch calls
//   • Value types mirroring the Win32 shapes we need
//   • SessionOs trait (real impl in win32.rs, mock in tests)
// ─────────────────────────────────────────────────────────────
use std::fmt;
use std::ops::BitOr;

use serde::Serialize;

/// OS-assigned logon session id.
pub type SessionId = u32;

/// Returned by the console-session query when nobody is attached.
pub const NO_CONSOLE_SESSION: SessionId = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Connected,
    ConnectQuery,
    Shadow,
    Disconnected,
    Idle,
    Listen,
    Reset,
    Down,
    Init,
}

impl SessionState {
    /// Maps a raw `WTS_CONNECTSTATE_CLASS` value.
    pub fn from_raw(raw: i32) -> Option<Self> {
        let state = match raw {
            0 => Self::Active,
            1 => Self::Connected,
            2 => Self::ConnectQuery,
            3 => Self::Shadow,
            4 => Self::Disconnected,
            5 => Self::Idle,
            6 => Self::Listen,
            7 => Self::Reset,
            8 => Self::Down,
            9 => Self::Init,
            _ => return None,
        };
        Some(state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub station_name: String,
    pub state: SessionState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub session_id: SessionId,
    pub name: String,
}

/// Opaque OS handle value. Only `OwnedHandle` and OS implementations see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub(crate) isize);

/// What a handle refers to; decides which close call releases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Process,
    Thread,
    Token,
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpersonationLevel {
    Anonymous,
    Identification,
    Impersonation,
    Delegation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Primary,
    Impersonation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccess(pub u32);

impl TokenAccess {
    pub const DUPLICATE: Self = Self(0x0002);
    pub const MAXIMUM_ALLOWED: Self = Self(0x0200_0000);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreationFlags(pub u32);

impl CreationFlags {
    pub const DETACHED_PROCESS: Self = Self(0x0000_0008);
    pub const CREATE_NEW_CONSOLE: Self = Self(0x0000_0010);
    pub const NORMAL_PRIORITY_CLASS: Self = Self(0x0000_0020);
    pub const CREATE_NO_WINDOW: Self = Self(0x0800_0000);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for CreationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// Layout mirror of SECURITY_ATTRIBUTES, used only to size the length prefix.
#[repr(C)]
struct SecurityAttributesLayout {
    n_length: u32,
    lp_security_descriptor: *mut std::ffi::c_void,
    b_inherit_handle: i32,
}

/// Security attributes shared by token duplication and process creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityAttributes {
    pub length: u32,
    pub inherit_handle: bool,
}

impl SecurityAttributes {
    pub fn new() -> Self {
        Self {
            length: std::mem::size_of::<SecurityAttributesLayout>() as u32,
            inherit_handle: false,
        }
    }
}

impl Default for SecurityAttributes {
    fn default() -> Self {
        Self::new()
    }
}

/// Startup descriptor for process creation. Only the desktop is customised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupDescriptor {
    pub desktop: String,
}

#[derive(Debug)]
pub struct CreatedProcess {
    pub process: RawHandle,
    pub thread: RawHandle,
    pub process_id: u32,
    pub thread_id: u32,
}

/// Failed OS call, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{call} failed (os error {code:#x})")]
pub struct OsError {
    pub call: &'static str,
    pub code: u32,
}

impl OsError {
    pub fn new(call: &'static str, code: u32) -> Self {
        Self { call, code }
    }
}

/// Session, process, token, launch and desktop calls of the host OS.
///
/// Every method is a thin blocking syscall. Handles returned here are raw;
/// callers wrap them in `OwnedHandle` right away.
pub trait SessionOs {
    fn active_console_session(&self) -> SessionId;

    fn enumerate_sessions(&self) -> Result<Vec<SessionInfo>, OsError>;

    fn enumerate_processes(&self) -> Result<Vec<ProcessEntry>, OsError>;

    fn open_process(&self, pid: u32) -> Result<RawHandle, OsError>;

    fn open_process_token(&self, process: RawHandle, access: TokenAccess) -> Result<RawHandle, OsError>;

    fn duplicate_token(
        &self,
        token: RawHandle,
        access: TokenAccess,
        security: &SecurityAttributes,
        level: ImpersonationLevel,
        token_type: TokenType,
    ) -> Result<RawHandle, OsError>;

    fn create_process_as_user(
        &self,
        token: RawHandle,
        command_line: &str,
        security: &SecurityAttributes,
        startup: &StartupDescriptor,
        flags: CreationFlags,
    ) -> Result<CreatedProcess, OsError>;

    fn open_input_desktop(&self) -> Result<RawHandle, OsError>;

    /// Writes the desktop name into `buf` and returns the byte length the OS
    /// reported as needed.
    fn desktop_name(&self, desktop: RawHandle, buf: &mut [u8]) -> Result<usize, OsError>;

    fn close(&self, handle: RawHandle, kind: HandleKind);
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_from_raw() {
        assert_eq!(SessionState::from_raw(0), Some(SessionState::Active));
        assert_eq!(SessionState::from_raw(4), Some(SessionState::Disconnected));
        assert_eq!(SessionState::from_raw(9), Some(SessionState::Init));
        assert_eq!(SessionState::from_raw(10), None);
        assert_eq!(SessionState::from_raw(-1), None);
    }

    #[test]
    fn test_security_attributes_size_matches_layout() {
        let sa = SecurityAttributes::new();
        let expected = if cfg!(target_pointer_width = "64") { 24 } else { 12 };
        assert_eq!(sa.length, expected);
        assert!(!sa.inherit_handle);
    }

    #[test]
    fn test_creation_flags_bit_ops() {
        let flags = CreationFlags::NORMAL_PRIORITY_CLASS | CreationFlags::CREATE_NEW_CONSOLE;
        assert!(flags.contains(CreationFlags::CREATE_NEW_CONSOLE));
        assert!(!flags.intersects(CreationFlags::CREATE_NO_WINDOW | CreationFlags::DETACHED_PROCESS));
        assert_eq!(flags.0, 0x30);
    }
}
