//! Systemd integration
//!
//! Two halves: the sd-notify protocol (readiness, stop, status messages sent
//! over the `NOTIFY_SOCKET` datagram socket when running under systemd with
//! `Type=notify`), and unit-file installation so the daemon can be set up
//! with a single command.

use anyhow::{Context, Result, anyhow};
use common::{run_command, run_command_checked};
use std::env;
use std::fs;
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const SERVICE_NAME: &str = "usb-remote-server.service";

/// Notify systemd that the service is ready
///
/// Call once initialization is complete and the listener is accepting.
/// A no-op when not running under systemd.
pub fn notify_ready() -> Result<()> {
    sd_notify(b"READY=1", "service ready")
}

/// Notify systemd that the service is stopping
pub fn notify_stopping() -> Result<()> {
    sd_notify(b"STOPPING=1", "service stopping")
}

/// Send a custom status message to systemd
///
/// The status is visible in `systemctl status` output.
pub fn notify_status(status: &str) -> Result<()> {
    let message = format!("STATUS={}", status);
    sd_notify(message.as_bytes(), status)
}

/// Check if running under systemd
pub fn is_systemd() -> bool {
    env::var("NOTIFY_SOCKET").is_ok()
}

fn sd_notify(payload: &[u8], what: &str) -> Result<()> {
    if let Ok(socket_path) = env::var("NOTIFY_SOCKET") {
        let socket = UnixDatagram::unbound().context("Failed to create Unix socket")?;
        socket
            .send_to(payload, &socket_path)
            .context("Failed to send notification to systemd")?;
        debug!("Notified systemd: {}", what);
    } else {
        debug!("NOTIFY_SOCKET not set, skipping systemd notification");
    }
    Ok(())
}

/// Generate the unit file content for this executable
fn unit_file_content(system_wide: bool) -> Result<String> {
    let executable = env::current_exe().context("Failed to resolve current executable path")?;

    let mut unit = String::from(
        "[Unit]\n\
         Description=usb-remote - USB device sharing server\n\
         After=network.target\n\
         \n\
         [Service]\n\
         Type=notify\n",
    );
    unit.push_str(&format!("ExecStart={}\n", executable.display()));
    unit.push_str(
        "Restart=on-failure\n\
         RestartSec=5s\n\
         NoNewPrivileges=true\n\
         PrivateTmp=true\n\
         \n\
         [Install]\n",
    );
    if system_wide {
        unit.push_str("WantedBy=multi-user.target\n");
    } else {
        unit.push_str("WantedBy=default.target\n");
    }
    Ok(unit)
}

fn unit_file_path(system_wide: bool) -> Result<PathBuf> {
    if system_wide {
        Ok(PathBuf::from("/etc/systemd/system").join(SERVICE_NAME))
    } else {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home
            .join(".config")
            .join("systemd")
            .join("user")
            .join(SERVICE_NAME))
    }
}

/// Install the server as a systemd service
///
/// User scope by default; `system_wide` writes under `/etc/systemd/system`
/// and requires root.
pub fn install_service(system_wide: bool) -> Result<()> {
    if run_command("systemctl", &["--version"]).is_err() {
        return Err(anyhow!("systemd not found, cannot install a unit file"));
    }

    let path = unit_file_path(system_wide)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "Failed to create unit directory {} (system scope requires root)",
                parent.display()
            )
        })?;
    }

    fs::write(&path, unit_file_content(system_wide)?).with_context(|| {
        format!(
            "Failed to write unit file {} (system scope requires root)",
            path.display()
        )
    })?;
    info!("Unit file written to {}", path.display());

    daemon_reload(system_wide)?;

    let scope_flag = if system_wide { "" } else { "--user " };
    info!("Service installed successfully");
    info!("Enable with: systemctl {}enable {}", scope_flag, SERVICE_NAME);
    info!("Start with:  systemctl {}start {}", scope_flag, SERVICE_NAME);
    Ok(())
}

/// Remove the installed unit file
pub fn uninstall_service(system_wide: bool) -> Result<()> {
    let path = unit_file_path(system_wide)?;
    if !path.exists() {
        warn!("Unit file not found: {}", path.display());
        return Ok(());
    }

    // Stop and disable first; both may fail if the unit never ran
    for action in ["stop", "disable"] {
        let result = if system_wide {
            run_command("systemctl", &[action, SERVICE_NAME])
        } else {
            run_command("systemctl", &["--user", action, SERVICE_NAME])
        };
        if let Err(e) = result {
            warn!("systemctl {} failed: {}", action, e);
        }
    }

    fs::remove_file(&path)
        .with_context(|| format!("Failed to remove unit file {}", path.display()))?;
    info!("Removed unit file {}", path.display());

    daemon_reload(system_wide)?;
    info!("Service uninstalled successfully");
    Ok(())
}

fn daemon_reload(system_wide: bool) -> Result<()> {
    let result = if system_wide {
        run_command_checked("systemctl", &["daemon-reload"])
    } else {
        run_command_checked("systemctl", &["--user", "daemon-reload"])
    };
    result.map(|_| ()).context("Failed to reload systemd")
}
