// ─────────────────────────────────────────────────────────────
// platform.rs – OS-specific abstractions
//   • Path helpers (data / log / config)
//   • Machine id + host description
//   • Windows service (windows-service crate)
// ─────────────────────────────────────────────────────────────
use anyhow::{Context, Result};
use std::path::PathBuf;

// ── platform paths ───────────────────────────────────────────
pub fn get_data_dir() -> PathBuf {
    #[cfg(windows)]
    {
        let root = std::env::var_os("ProgramData").unwrap_or_else(|| r"C:\ProgramData".into());
        PathBuf::from(root).join("InteractiveAgent")
    }
    #[cfg(not(windows))]
    {
        PathBuf::from("/var/lib/interactive-agent")
    }
}

pub fn get_log_dir() -> PathBuf {
    #[cfg(windows)]
    {
        get_data_dir().join("logs")
    }
    #[cfg(not(windows))]
    {
        PathBuf::from("/var/log/interactive-agent")
    }
}

pub fn get_config_path() -> PathBuf {
    #[cfg(windows)]
    {
        get_data_dir().join("config.toml")
    }
    #[cfg(not(windows))]
    {
        PathBuf::from("/etc/interactive-agent/config.toml")
    }
}

pub fn get_current_exe_dir() -> PathBuf {
    std::env::current_exe()
        .unwrap_or_default()
        .parent()
        .unwrap_or(std::path::Path::new("."))
        .to_path_buf()
}

pub fn ensure_dirs() -> Result<()> {
    for d in [get_data_dir(), get_log_dir()] {
        std::fs::create_dir_all(&d).with_context(|| format!("creating {}", d.display()))?;
    }
    Ok(())
}

// ── machine-id ───────────────────────────────────────────────
pub fn get_machine_id() -> String {
    // Try OS-level machine id first, fall back to generated one
    #[cfg(windows)]
    {
        if let Ok(id) = windows_machine_id() {
            return id;
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
            return id.trim().to_string();
        }
    }
    // Fallback: generate + persist
    let path = get_data_dir().join(".machine-id");
    if let Ok(id) = std::fs::read_to_string(&path) {
        return id.trim().to_string();
    }
    let id = uuid::Uuid::new_v4().to_string();
    std::fs::create_dir_all(get_data_dir()).ok();
    std::fs::write(&path, &id).ok();
    id
}

#[cfg(windows)]
fn windows_machine_id() -> Result<String> {
    use winreg::enums::HKEY_LOCAL_MACHINE;
    use winreg::RegKey;
    let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
    let subkey = hklm.open_subkey(r"SOFTWARE\Microsoft\Cryptography")?;
    let id: String = subkey.get_value("MachineGuid")?;
    Ok(id)
}

pub fn get_hostname() -> String {
    sysinfo::System::host_name().unwrap_or_default()
}

pub fn get_os_info() -> String {
    format!(
        "{} {} ({})",
        sysinfo::System::name().unwrap_or_default(),
        sysinfo::System::os_version().unwrap_or_default(),
        std::env::consts::ARCH,
    )
}

// ── Windows Service ──────────────────────────────────────────
#[cfg(windows)]
pub const SERVICE_NAME: &str = "InteractiveAgent";

#[cfg(windows)]
static SERVICE_CONFIG: std::sync::OnceLock<crate::agent::AgentConfig> = std::sync::OnceLock::new();

/// Hands `config` (overrides already applied) to the service main, which the
/// dispatcher calls without arguments of ours.
#[cfg(windows)]
pub fn run_windows_service(config: crate::agent::AgentConfig) -> Result<()> {
    use std::time::Duration;
    use windows_service::{
        define_windows_service,
        service::{ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus, ServiceType},
        service_control_handler::{self, ServiceControlHandlerResult},
        service_dispatcher,
    };

    const SERVICE_TYPE: ServiceType = ServiceType::OWN_PROCESS;

    define_windows_service!(ffi_service_main, agent_service_main);

    fn agent_service_main(_arguments: Vec<std::ffi::OsString>) {
        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

        let stop_tx = shutdown_tx.clone();
        let event_handler = move |control_event| -> ServiceControlHandlerResult {
            match control_event {
                ServiceControl::Stop | ServiceControl::Shutdown => {
                    stop_tx.send(()).ok();
                    ServiceControlHandlerResult::NoError
                }
                ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
                _ => ServiceControlHandlerResult::NotImplemented,
            }
        };

        let status_handle = match service_control_handler::register(SERVICE_NAME, event_handler) {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(error = %e, "Service control handler registration failed");
                return;
            }
        };

        let report = |state: ServiceState, controls: ServiceControlAccept| {
            status_handle
                .set_service_status(ServiceStatus {
                    service_type: SERVICE_TYPE,
                    current_state: state,
                    controls_accepted: controls,
                    exit_code: ServiceExitCode::Win32(0),
                    checkpoint: 0,
                    wait_hint: Duration::default(),
                    process_id: None,
                })
                .ok();
        };

        report(
            ServiceState::Running,
            ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
        );

        // Run agent in a background thread; it exits once shutdown fires
        let config = SERVICE_CONFIG.get().cloned().unwrap_or_default();
        let agent_handle = std::thread::spawn(move || {
            if let Err(e) = crate::run_agent_service(config, shutdown_tx) {
                tracing::error!(error = %e, "Agent service error");
            }
        });
        agent_handle.join().ok();

        report(ServiceState::Stopped, ServiceControlAccept::empty());
    }

    SERVICE_CONFIG.set(config).ok();
    service_dispatcher::start(SERVICE_NAME, ffi_service_main).context("Failed to start service dispatcher")?;
    Ok(())
}
