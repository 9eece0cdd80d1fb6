// ─────────────────────────────────────────────────────────────
// takeover/desktop.rs – Current input desktop name
// ─────────────────────────────────────────────────────────────
use tracing::debug;

use super::handle::OwnedHandle;
use super::os::{HandleKind, SessionOs};

pub const DEFAULT_DESKTOP: &str = "default";

const NAME_BUFFER_LEN: usize = 256;

/// Name of the desktop currently receiving input ("Default", "Winlogon",
/// "Screen-saver"...). Falls back to `"default"` when it can't be read.
pub fn current_input_desktop_name(os: &dyn SessionOs) -> String {
    let desktop = match os.open_input_desktop() {
        Ok(raw) => OwnedHandle::new(os, raw, HandleKind::Desktop),
        Err(e) => {
            debug!(error = %e, "Cannot open input desktop");
            return DEFAULT_DESKTOP.to_string();
        }
    };

    let mut buf = [0u8; NAME_BUFFER_LEN];
    match os.desktop_name(desktop.raw(), &mut buf) {
        Ok(needed) => decode_desktop_name(&buf[..needed.min(NAME_BUFFER_LEN)]),
        Err(e) => {
            debug!(error = %e, "Cannot read input desktop name");
            DEFAULT_DESKTOP.to_string()
        }
    }
}

/// UTF-16LE bytes to a string, embedded NULs dropped.
pub fn decode_desktop_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units).replace('\0', "")
}
