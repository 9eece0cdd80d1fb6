// ─────────────────────────────────────────────────────────────
// takeover/mock.rs – Instrumented SessionOs for unit tests
//   • Records every call and every handle opened/closed
//   • Can be told to fail at one stage
// ─────────────────────────────────────────────────────────────
use std::cell::{Cell, RefCell};

use super::os::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    EnumerateSessions,
    EnumerateProcesses,
    OpenProcess,
    OpenToken,
    DuplicateToken,
    CreateProcess,
    OpenDesktop,
    DesktopName,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    OpenProcess(u32),
    OpenToken(TokenAccess),
    DuplicateToken {
        access: TokenAccess,
        security: SecurityAttributes,
        level: ImpersonationLevel,
        token_type: TokenType,
    },
    CreateProcess {
        command_line: String,
        desktop: String,
        flags: CreationFlags,
        security: SecurityAttributes,
    },
}

pub struct MockOs {
    pub console: SessionId,
    pub sessions: Vec<SessionInfo>,
    pub processes: Vec<ProcessEntry>,
    pub desktop: String,
    pub fail_at: Option<FailAt>,
    pub(crate) next: Cell<isize>,
    pub(crate) opened: RefCell<Vec<(RawHandle, HandleKind)>>,
    pub(crate) closed: RefCell<Vec<(RawHandle, HandleKind)>>,
    pub(crate) calls: RefCell<Vec<Call>>,
}

pub fn session(id: SessionId, station: &str, state: SessionState) -> SessionInfo {
    SessionInfo {
        session_id: id,
        station_name: station.to_string(),
        state,
    }
}

pub fn process(pid: u32, session_id: SessionId, name: &str) -> ProcessEntry {
    ProcessEntry {
        pid,
        session_id,
        name: name.to_string(),
    }
}

impl Default for MockOs {
    fn default() -> Self {
        Self {
            console: 1,
            sessions: vec![
                session(0, "Services", SessionState::Disconnected),
                session(1, "Console", SessionState::Active),
            ],
            processes: vec![
                process(4, 0, "System"),
                process(612, 0, "services.exe"),
                process(700, 1, "winlogon.exe"),
                process(2210, 1, "explorer.exe"),
            ],
            desktop: "Default".to_string(),
            fail_at: None,
            next: Cell::new(0x100),
            opened: RefCell::new(Vec::new()),
            closed: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl MockOs {
    pub fn failing_at(stage: FailAt) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::default()
        }
    }

    pub fn opened(&self) -> Vec<(RawHandle, HandleKind)> {
        self.opened.borrow().clone()
    }

    pub fn closed(&self) -> Vec<(RawHandle, HandleKind)> {
        self.closed.borrow().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Every opened handle closed exactly once, and nothing else closed.
    pub fn assert_balanced(&self) {
        let opened = self.opened.borrow();
        let closed = self.closed.borrow();
        assert_eq!(opened.len(), closed.len(), "opened {:?} closed {:?}", opened, closed);
        for h in opened.iter() {
            let n = closed.iter().filter(|c| *c == h).count();
            assert_eq!(n, 1, "handle {:?} closed {} times", h, n);
        }
    }

    fn fail(&self, stage: FailAt, call: &'static str) -> Result<(), OsError> {
        if self.fail_at == Some(stage) {
            // ERROR_ACCESS_DENIED
            return Err(OsError::new(call, 5));
        }
        Ok(())
    }

    fn issue(&self, kind: HandleKind) -> RawHandle {
        let raw = RawHandle(self.next.get());
        self.next.set(self.next.get() + 4);
        self.opened.borrow_mut().push((raw, kind));
        raw
    }
}

impl SessionOs for MockOs {
    fn active_console_session(&self) -> SessionId {
        self.console
    }

    fn enumerate_sessions(&self) -> Result<Vec<SessionInfo>, OsError> {
        self.fail(FailAt::EnumerateSessions, "WTSEnumerateSessionsW")?;
        Ok(self.sessions.clone())
    }

    fn enumerate_processes(&self) -> Result<Vec<ProcessEntry>, OsError> {
        self.fail(FailAt::EnumerateProcesses, "CreateToolhelp32Snapshot")?;
        Ok(self.processes.clone())
    }

    fn open_process(&self, pid: u32) -> Result<RawHandle, OsError> {
        self.calls.borrow_mut().push(Call::OpenProcess(pid));
        self.fail(FailAt::OpenProcess, "OpenProcess")?;
        Ok(self.issue(HandleKind::Process))
    }

    fn open_process_token(&self, _process: RawHandle, access: TokenAccess) -> Result<RawHandle, OsError> {
        self.calls.borrow_mut().push(Call::OpenToken(access));
        self.fail(FailAt::OpenToken, "OpenProcessToken")?;
        Ok(self.issue(HandleKind::Token))
    }

    fn duplicate_token(
        &self,
        _token: RawHandle,
        access: TokenAccess,
        security: &SecurityAttributes,
        level: ImpersonationLevel,
        token_type: TokenType,
    ) -> Result<RawHandle, OsError> {
        self.calls.borrow_mut().push(Call::DuplicateToken {
            access,
            security: *security,
            level,
            token_type,
        });
        self.fail(FailAt::DuplicateToken, "DuplicateTokenEx")?;
        Ok(self.issue(HandleKind::Token))
    }

    fn create_process_as_user(
        &self,
        _token: RawHandle,
        command_line: &str,
        security: &SecurityAttributes,
        startup: &StartupDescriptor,
        flags: CreationFlags,
    ) -> Result<CreatedProcess, OsError> {
        self.calls.borrow_mut().push(Call::CreateProcess {
            command_line: command_line.to_string(),
            desktop: startup.desktop.clone(),
            flags,
            security: *security,
        });
        self.fail(FailAt::CreateProcess, "CreateProcessAsUserW")?;
        Ok(CreatedProcess {
            process: self.issue(HandleKind::Process),
            thread: self.issue(HandleKind::Thread),
            process_id: 4242,
            thread_id: 4243,
        })
    }

    fn open_input_desktop(&self) -> Result<RawHandle, OsError> {
        self.fail(FailAt::OpenDesktop, "OpenInputDesktop")?;
        Ok(self.issue(HandleKind::Desktop))
    }

    fn desktop_name(&self, _desktop: RawHandle, buf: &mut [u8]) -> Result<usize, OsError> {
        self.fail(FailAt::DesktopName, "GetUserObjectInformationW")?;
        let bytes: Vec<u8> = self
            .desktop
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(|u| u.to_le_bytes())
            .collect();
        if bytes.len() > buf.len() {
            // ERROR_INSUFFICIENT_BUFFER, nothing written
            return Err(OsError::new("GetUserObjectInformationW", 122));
        }
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn close(&self, handle: RawHandle, kind: HandleKind) {
        self.closed.borrow_mut().push((handle, kind));
    }
}
