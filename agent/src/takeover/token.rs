// ─────────────────────────────────────────────────────────────
// takeover/token.rs – Trusted process lookup + token duplication
// ─────────────────────────────────────────────────────────────
use tracing::debug;

use super::error::TakeoverError;
use super::handle::OwnedHandle;
use super::os::{
    HandleKind, ImpersonationLevel, SecurityAttributes, SessionId, SessionOs, TokenAccess, TokenType,
};

/// Logon process present in every interactive session.
pub const TRUSTED_PROCESS: &str = "winlogon.exe";

/// Opens the trusted process running in `session_id`.
///
/// No other session is tried when nothing matches: it means nobody is logged
/// on interactively there.
pub fn find_trusted_process<'os>(
    os: &'os dyn SessionOs,
    session_id: SessionId,
    name: &str,
) -> Result<OwnedHandle<'os>, TakeoverError> {
    let processes = os.enumerate_processes().map_err(TakeoverError::ProcessEnumeration)?;

    let entry = processes
        .iter()
        .find(|p| p.session_id == session_id && p.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| TakeoverError::NoTrustedProcess {
            session_id,
            process: name.to_string(),
        })?;

    debug!(pid = entry.pid, session_id, process = %entry.name, "Trusted process found");

    let raw = os.open_process(entry.pid).map_err(TakeoverError::Token)?;
    Ok(OwnedHandle::new(os, raw, HandleKind::Process))
}

/// Source token and the primary token duplicated from it. Both stay open
/// until the launch that consumes them has returned.
#[derive(Debug)]
pub struct PrimaryToken<'os> {
    primary: OwnedHandle<'os>,
    _source: OwnedHandle<'os>,
}

impl<'os> PrimaryToken<'os> {
    pub(super) fn handle(&self) -> &OwnedHandle<'os> {
        &self.primary
    }
}

/// Duplicates the process token into a primary token at identification level.
///
/// The source token is opened with duplicate rights only.
pub fn duplicate_primary_token<'os>(
    os: &'os dyn SessionOs,
    process: &OwnedHandle<'os>,
    security: &SecurityAttributes,
) -> Result<PrimaryToken<'os>, TakeoverError> {
    let raw = os
        .open_process_token(process.raw(), TokenAccess::DUPLICATE)
        .map_err(TakeoverError::Token)?;
    let source = OwnedHandle::new(os, raw, HandleKind::Token);

    let raw = os
        .duplicate_token(
            source.raw(),
            TokenAccess::MAXIMUM_ALLOWED,
            security,
            ImpersonationLevel::Identification,
            TokenType::Primary,
        )
        .map_err(TakeoverError::Token)?;
    let primary = OwnedHandle::new(os, raw, HandleKind::Token);

    Ok(PrimaryToken {
        primary,
        _source: source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::takeover::mock::{process, Call, FailAt, MockOs};

    #[test]
    fn test_finds_process_in_matching_session() {
        let os = MockOs {
            processes: vec![
                process(500, 2, "winlogon.exe"),
                process(700, 1, "WinLogon.EXE"),
            ],
            ..MockOs::default()
        };
        let h = find_trusted_process(&os, 1, TRUSTED_PROCESS).unwrap();
        assert_eq!(h.kind(), HandleKind::Process);
        assert_eq!(os.calls(), vec![Call::OpenProcess(700)]);
        drop(h);
        os.assert_balanced();
    }

    #[test]
    fn test_not_found_opens_nothing() {
        let os = MockOs::default();
        let err = find_trusted_process(&os, 9, TRUSTED_PROCESS).unwrap_err();
        assert_eq!(
            err,
            TakeoverError::NoTrustedProcess {
                session_id: 9,
                process: TRUSTED_PROCESS.into()
            }
        );
        assert!(os.calls().is_empty());
        assert!(os.opened().is_empty());
    }

    #[test]
    fn test_duplicate_uses_duplicate_rights_and_identification_primary() {
        let os = MockOs::default();
        let sa = SecurityAttributes::new();
        let p = find_trusted_process(&os, 1, TRUSTED_PROCESS).unwrap();
        let token = duplicate_primary_token(&os, &p, &sa).unwrap();
        assert_eq!(token.handle().kind(), HandleKind::Token);

        let calls = os.calls();
        assert_eq!(calls[1], Call::OpenToken(TokenAccess::DUPLICATE));
        assert_eq!(
            calls[2],
            Call::DuplicateToken {
                access: TokenAccess::MAXIMUM_ALLOWED,
                security: sa,
                level: ImpersonationLevel::Identification,
                token_type: TokenType::Primary,
            }
        );

        // process + source token + primary token, none closed yet
        assert_eq!(os.opened().len(), 3);
        assert!(os.closed().is_empty());
        drop(token);
        drop(p);
        os.assert_balanced();
    }

    #[test]
    fn test_duplicate_failure_releases_source_token() {
        let os = MockOs::failing_at(FailAt::DuplicateToken);
        let p = find_trusted_process(&os, 1, TRUSTED_PROCESS).unwrap();
        let err = duplicate_primary_token(&os, &p, &SecurityAttributes::new()).unwrap_err();
        assert!(matches!(err, TakeoverError::Token(ref e) if e.call == "DuplicateTokenEx"));
        // only the process handle is still open
        assert_eq!(os.opened().len(), 2);
        assert_eq!(os.closed().len(), 1);
        assert_eq!(os.closed()[0].1, HandleKind::Token);
        drop(p);
        os.assert_balanced();
    }
}
