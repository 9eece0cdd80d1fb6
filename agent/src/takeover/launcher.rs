// ─────────────────────────────────────────────────────────────
// takeover/launcher.rs – CreateProcessAsUser into winsta0\<desktop>
// ─────────────────────────────────────────────────────────────
use tracing::info;

use super::error::TakeoverError;
use super::handle::OwnedHandle;
use super::os::{CreationFlags, HandleKind, SecurityAttributes, SessionOs, StartupDescriptor};
use super::token::PrimaryToken;

/// The only window station that has a visible, input-receiving desktop.
pub const INTERACTIVE_WINDOW_STATION: &str = "winsta0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// What to start and where. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    command_line: String,
    desktop_path: String,
    visibility: Visibility,
}

impl LaunchSpec {
    pub fn new(command_line: impl Into<String>, desktop_name: &str, visibility: Visibility) -> Self {
        Self {
            command_line: command_line.into(),
            desktop_path: format!("{}\\{}", INTERACTIVE_WINDOW_STATION, desktop_name),
            visibility,
        }
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn desktop_path(&self) -> &str {
        &self.desktop_path
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn creation_flags(&self) -> CreationFlags {
        match self.visibility {
            Visibility::Hidden => {
                CreationFlags::NORMAL_PRIORITY_CLASS
                    | CreationFlags::CREATE_NO_WINDOW
                    | CreationFlags::DETACHED_PROCESS
            }
            Visibility::Visible => CreationFlags::NORMAL_PRIORITY_CLASS | CreationFlags::CREATE_NEW_CONSOLE,
        }
    }
}

/// Process and thread of a freshly launched process. Both handles close when
/// this is dropped.
#[derive(Debug)]
pub struct LaunchedProcess<'os> {
    pub process_id: u32,
    pub thread_id: u32,
    _process: OwnedHandle<'os>,
    _thread: OwnedHandle<'os>,
}

/// Starts `spec` with `token` on the interactive desktop named in `spec`.
///
/// Without an explicit `winsta0\<desktop>` a token-created process lands on a
/// non-interactive window station and never sees user input.
pub fn launch_interactive<'os>(
    os: &'os dyn SessionOs,
    token: &PrimaryToken<'os>,
    spec: &LaunchSpec,
    security: &SecurityAttributes,
) -> Result<LaunchedProcess<'os>, TakeoverError> {
    let startup = StartupDescriptor {
        desktop: spec.desktop_path().to_string(),
    };

    let created = os
        .create_process_as_user(
            token.handle().raw(),
            spec.command_line(),
            security,
            &startup,
            spec.creation_flags(),
        )
        .map_err(TakeoverError::Launch)?;

    info!(
        pid = created.process_id,
        desktop = %spec.desktop_path(),
        visibility = ?spec.visibility(),
        "Interactive process launched"
    );

    Ok(LaunchedProcess {
        process_id: created.process_id,
        thread_id: created.thread_id,
        _process: OwnedHandle::new(os, created.process, HandleKind::Process),
        _thread: OwnedHandle::new(os, created.thread, HandleKind::Thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::takeover::mock::{Call, MockOs};
    use crate::takeover::token::{duplicate_primary_token, find_trusted_process, TRUSTED_PROCESS};

    const HIDDEN_ONLY: CreationFlags = CreationFlags(0x0800_0008);

    #[test]
    fn test_hidden_flags() {
        let flags = LaunchSpec::new("agent.exe", "Default", Visibility::Hidden).creation_flags();
        assert!(flags.contains(CreationFlags::NORMAL_PRIORITY_CLASS));
        assert!(flags.contains(CreationFlags::CREATE_NO_WINDOW));
        assert!(flags.contains(CreationFlags::DETACHED_PROCESS));
        assert!(!flags.intersects(CreationFlags::CREATE_NEW_CONSOLE));
    }

    #[test]
    fn test_visible_flags() {
        let flags = LaunchSpec::new("agent.exe", "Default", Visibility::Visible).creation_flags();
        assert!(flags.contains(CreationFlags::NORMAL_PRIORITY_CLASS));
        assert!(flags.contains(CreationFlags::CREATE_NEW_CONSOLE));
        assert!(!flags.intersects(HIDDEN_ONLY));
    }

    #[test]
    fn test_desktop_path_is_verbatim() {
        for name in ["Default", "Winlogon", "screen-saver", "my desk", ""] {
            let spec = LaunchSpec::new("x", name, Visibility::Visible);
            assert_eq!(spec.desktop_path(), format!("winsta0\\{}", name));
        }
    }

    #[test]
    fn test_launch_passes_desktop_flags_and_shared_security() {
        let os = MockOs::default();
        let sa = SecurityAttributes::new();
        let spec = LaunchSpec::new(r#""C:\agent.exe" interactive"#, "Winlogon", Visibility::Hidden);

        let process = find_trusted_process(&os, 1, TRUSTED_PROCESS).unwrap();
        let token = duplicate_primary_token(&os, &process, &sa).unwrap();
        let launched = launch_interactive(&os, &token, &spec, &sa).unwrap();
        assert_eq!(launched.process_id, 4242);

        match os.calls().last() {
            Some(Call::CreateProcess {
                command_line,
                desktop,
                flags,
                security,
            }) => {
                assert_eq!(command_line, r#""C:\agent.exe" interactive"#);
                assert_eq!(desktop, "winsta0\\Winlogon");
                assert_eq!(*flags, spec.creation_flags());
                assert_eq!(*security, sa);
            }
            other => panic!("unexpected last call {:?}", other),
        }

        drop(launched);
        drop(token);
        drop(process);
        os.assert_balanced();
    }
}
