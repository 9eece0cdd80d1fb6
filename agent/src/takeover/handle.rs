// ─────────────────────────────────────────────────────────────
// takeover/handle.rs – RAII owner for OS handles
// ─────────────────────────────────────────────────────────────
use super::os::{HandleKind, RawHandle, SessionOs};

/// A handle that is closed exactly once, when it goes out of scope.
pub struct OwnedHandle<'os> {
    os: &'os dyn SessionOs,
    raw: RawHandle,
    kind: HandleKind,
}

impl<'os> OwnedHandle<'os> {
    pub(super) fn new(os: &'os dyn SessionOs, raw: RawHandle, kind: HandleKind) -> Self {
        Self { os, raw, kind }
    }

    pub(super) fn raw(&self) -> RawHandle {
        self.raw
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }
}

impl Drop for OwnedHandle<'_> {
    fn drop(&mut self) {
        self.os.close(self.raw, self.kind);
    }
}

impl std::fmt::Debug for OwnedHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedHandle").field("kind", &self.kind).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::takeover::mock::MockOs;

    #[test]
    fn test_drop_closes_once() {
        let os = MockOs::default();
        let raw = os.open_process(4).unwrap();
        {
            let _h = OwnedHandle::new(&os, raw, HandleKind::Process);
            assert_eq!(os.closed().len(), 0);
        }
        assert_eq!(os.closed(), vec![(raw, HandleKind::Process)]);
        os.assert_balanced();
    }
}
