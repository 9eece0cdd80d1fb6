// ─────────────────────────────────────────────────────────────
// modules/mod.rs – Module declarations
// ─────────────────────────────────────────────────────────────
pub mod remote_control;
