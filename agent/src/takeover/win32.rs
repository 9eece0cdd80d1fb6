// ─────────────────────────────────────────────────────────────
// takeover/win32.rs – SessionOs backed by the Win32 API
// ─────────────────────────────────────────────────────────────
use std::ffi::c_void;

use tracing::warn;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, BOOL, ERROR_NO_MORE_FILES, FALSE, HANDLE};
use windows::Win32::Security::{
    DuplicateTokenEx, SecurityAnonymous, SecurityDelegation, SecurityIdentification, SecurityImpersonation,
    TokenImpersonation, TokenPrimary, SECURITY_ATTRIBUTES, SECURITY_IMPERSONATION_LEVEL, TOKEN_ACCESS_MASK,
    TOKEN_TYPE,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::RemoteDesktop::{
    ProcessIdToSessionId, WTSEnumerateSessionsW, WTSFreeMemory, WTSGetActiveConsoleSessionId,
    WTS_CURRENT_SERVER_HANDLE, WTS_SESSION_INFOW,
};
use windows::Win32::System::StationsAndDesktops::{
    CloseDesktop, GetUserObjectInformationW, OpenInputDesktop, DESKTOP_ACCESS_FLAGS, DESKTOP_CONTROL_FLAGS, HDESK,
    UOI_NAME,
};
use windows::Win32::System::Threading::{
    CreateProcessAsUserW, OpenProcess, OpenProcessToken, PROCESS_ACCESS_RIGHTS, PROCESS_CREATION_FLAGS,
    PROCESS_INFORMATION, STARTUPINFOW,
};

use super::os::*;

const MAXIMUM_ALLOWED: u32 = 0x0200_0000;
const GENERIC_ALL: u32 = 0x1000_0000;

/// The live OS. Stateless: every call goes straight to Win32.
pub struct Win32Os;

fn os_error(call: &'static str, e: windows::core::Error) -> OsError {
    OsError::new(call, e.code().0 as u32)
}

fn handle(raw: RawHandle) -> HANDLE {
    HANDLE(raw.0 as *mut c_void)
}

fn raw(h: HANDLE) -> RawHandle {
    RawHandle(h.0 as isize)
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn security_attributes(sa: &SecurityAttributes) -> SECURITY_ATTRIBUTES {
    debug_assert_eq!(sa.length as usize, std::mem::size_of::<SECURITY_ATTRIBUTES>());
    SECURITY_ATTRIBUTES {
        nLength: sa.length,
        lpSecurityDescriptor: std::ptr::null_mut(),
        bInheritHandle: BOOL::from(sa.inherit_handle),
    }
}

fn impersonation_level(level: ImpersonationLevel) -> SECURITY_IMPERSONATION_LEVEL {
    match level {
        ImpersonationLevel::Anonymous => SecurityAnonymous,
        ImpersonationLevel::Identification => SecurityIdentification,
        ImpersonationLevel::Impersonation => SecurityImpersonation,
        ImpersonationLevel::Delegation => SecurityDelegation,
    }
}

fn token_type(ty: TokenType) -> TOKEN_TYPE {
    match ty {
        TokenType::Primary => TokenPrimary,
        TokenType::Impersonation => TokenImpersonation,
    }
}

fn exe_name(entry: &PROCESSENTRY32W) -> String {
    let len = entry.szExeFile.iter().position(|&c| c == 0).unwrap_or(entry.szExeFile.len());
    String::from_utf16_lossy(&entry.szExeFile[..len])
}

impl SessionOs for Win32Os {
    fn active_console_session(&self) -> SessionId {
        // SAFETY: no arguments, no side effects.
        unsafe { WTSGetActiveConsoleSessionId() }
    }

    fn enumerate_sessions(&self) -> Result<Vec<SessionInfo>, OsError> {
        let mut sessions_ptr: *mut WTS_SESSION_INFOW = std::ptr::null_mut();
        let mut count = 0u32;

        // SAFETY: WTSEnumerateSessionsW writes a pointer/count pair on success.
        unsafe { WTSEnumerateSessionsW(WTS_CURRENT_SERVER_HANDLE, 0, 1, &mut sessions_ptr, &mut count) }
            .map_err(|e| os_error("WTSEnumerateSessionsW", e))?;

        if sessions_ptr.is_null() {
            return Ok(Vec::new());
        }

        // SAFETY: `sessions_ptr` references `count` entries until WTSFreeMemory.
        let entries = unsafe { std::slice::from_raw_parts(sessions_ptr, count as usize) };
        let sessions = entries
            .iter()
            .filter_map(|entry| {
                let state = SessionState::from_raw(entry.State.0)?;
                // SAFETY: station name points into the same WTS allocation.
                let station_name = unsafe { entry.pWinStationName.to_string() }.unwrap_or_default();
                Some(SessionInfo {
                    session_id: entry.SessionId,
                    station_name,
                    state,
                })
            })
            .collect();

        // SAFETY: allocated by WTSEnumerateSessionsW, not used afterwards.
        unsafe { WTSFreeMemory(sessions_ptr.cast()) };

        Ok(sessions)
    }

    fn enumerate_processes(&self) -> Result<Vec<ProcessEntry>, OsError> {
        // SAFETY: always safe to call; returns an owned snapshot handle.
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map_err(|e| os_error("CreateToolhelp32Snapshot", e))?;

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };
        let mut processes = Vec::new();

        // SAFETY: snapshot is valid until closed below, entry is sized.
        let mut next = unsafe { Process32FirstW(snapshot, &mut entry) };
        loop {
            match next {
                Ok(()) => {
                    let pid = entry.th32ProcessID;
                    let mut session_id = 0u32;
                    // Processes that exit mid-walk have no session; skip them.
                    // SAFETY: out-pointer to a local.
                    if unsafe { ProcessIdToSessionId(pid, &mut session_id) }.is_ok() {
                        processes.push(ProcessEntry {
                            pid,
                            session_id,
                            name: exe_name(&entry),
                        });
                    }
                }
                Err(e) if e.code() == ERROR_NO_MORE_FILES.to_hresult() => break,
                Err(e) => {
                    // SAFETY: snapshot came from CreateToolhelp32Snapshot.
                    let _ = unsafe { CloseHandle(snapshot) };
                    return Err(os_error("Process32NextW", e));
                }
            }
            // SAFETY: same snapshot and entry as above.
            next = unsafe { Process32NextW(snapshot, &mut entry) };
        }

        // SAFETY: snapshot came from CreateToolhelp32Snapshot.
        let _ = unsafe { CloseHandle(snapshot) };
        Ok(processes)
    }

    fn open_process(&self, pid: u32) -> Result<RawHandle, OsError> {
        // SAFETY: plain handle-returning call.
        unsafe { OpenProcess(PROCESS_ACCESS_RIGHTS(MAXIMUM_ALLOWED), FALSE, pid) }
            .map(raw)
            .map_err(|e| os_error("OpenProcess", e))
    }

    fn open_process_token(&self, process: RawHandle, access: TokenAccess) -> Result<RawHandle, OsError> {
        let mut token = HANDLE::default();
        // SAFETY: process handle is owned by the caller and still open.
        unsafe { OpenProcessToken(handle(process), TOKEN_ACCESS_MASK(access.0), &mut token) }
            .map_err(|e| os_error("OpenProcessToken", e))?;
        Ok(raw(token))
    }

    fn duplicate_token(
        &self,
        token: RawHandle,
        access: TokenAccess,
        security: &SecurityAttributes,
        level: ImpersonationLevel,
        ty: TokenType,
    ) -> Result<RawHandle, OsError> {
        let sa = security_attributes(security);
        let mut duplicated = HANDLE::default();
        // SAFETY: source token open with TOKEN_DUPLICATE; `sa` outlives the call.
        unsafe {
            DuplicateTokenEx(
                handle(token),
                TOKEN_ACCESS_MASK(access.0),
                Some(&sa as *const _),
                impersonation_level(level),
                token_type(ty),
                &mut duplicated,
            )
        }
        .map_err(|e| os_error("DuplicateTokenEx", e))?;
        Ok(raw(duplicated))
    }

    fn create_process_as_user(
        &self,
        token: RawHandle,
        command_line: &str,
        security: &SecurityAttributes,
        startup: &StartupDescriptor,
        flags: CreationFlags,
    ) -> Result<CreatedProcess, OsError> {
        let sa = security_attributes(security);
        let mut command_line = to_wide(command_line);
        let mut desktop = to_wide(&startup.desktop);

        let si = STARTUPINFOW {
            cb: std::mem::size_of::<STARTUPINFOW>() as u32,
            lpDesktop: PWSTR(desktop.as_mut_ptr()),
            ..Default::default()
        };
        let mut pi = PROCESS_INFORMATION::default();

        // SAFETY: all buffers outlive the call; token is a primary token.
        unsafe {
            CreateProcessAsUserW(
                handle(token),
                PCWSTR::null(),
                PWSTR(command_line.as_mut_ptr()),
                Some(&sa as *const _),
                Some(&sa as *const _),
                FALSE,
                PROCESS_CREATION_FLAGS(flags.0),
                None,
                PCWSTR::null(),
                &si,
                &mut pi,
            )
        }
        .map_err(|e| os_error("CreateProcessAsUserW", e))?;

        Ok(CreatedProcess {
            process: raw(pi.hProcess),
            thread: raw(pi.hThread),
            process_id: pi.dwProcessId,
            thread_id: pi.dwThreadId,
        })
    }

    fn open_input_desktop(&self) -> Result<RawHandle, OsError> {
        // SAFETY: plain handle-returning call.
        unsafe { OpenInputDesktop(DESKTOP_CONTROL_FLAGS(0), FALSE, DESKTOP_ACCESS_FLAGS(GENERIC_ALL)) }
            .map(|desk| RawHandle(desk.0 as isize))
            .map_err(|e| os_error("OpenInputDesktop", e))
    }

    fn desktop_name(&self, desktop: RawHandle, buf: &mut [u8]) -> Result<usize, OsError> {
        let mut needed = 0u32;
        // SAFETY: buffer and its length match; desktop handle is open.
        unsafe {
            GetUserObjectInformationW(
                handle(desktop),
                UOI_NAME,
                Some(buf.as_mut_ptr() as *mut c_void),
                buf.len() as u32,
                Some(&mut needed as *mut u32),
            )
        }
        .map_err(|e| os_error("GetUserObjectInformationW", e))?;
        Ok(needed as usize)
    }

    fn close(&self, h: RawHandle, kind: HandleKind) {
        // SAFETY: only called once per handle, from OwnedHandle::drop.
        let res = unsafe {
            match kind {
                HandleKind::Desktop => CloseDesktop(HDESK(h.0 as *mut c_void)),
                _ => CloseHandle(handle(h)),
            }
        };
        if let Err(e) = res {
            warn!(error = %e, ?kind, "Failed to close handle");
        }
    }
}
