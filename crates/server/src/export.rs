//! Device export control through usbip
//!
//! Before a client can attach one of this host's devices, the device must be
//! bound to the usbip-host driver. usbip reports a bind of an already-bound
//! device (and an unbind of an unbound one) as an error; callers decide how
//! tolerant to be, so both operations surface the tool's stderr verbatim.

use anyhow::{Result, anyhow};
use common::run_command;
use tracing::info;

/// Export a device for remote attachment (`usbip bind -b <busid>`)
pub fn bind_device(busid: &str) -> Result<()> {
    let output = run_command("usbip", &["bind", "-b", busid])?;
    if !output.success() {
        return Err(anyhow!(
            "usbip bind -b {} failed: {}",
            busid,
            output.stderr.trim()
        ));
    }
    info!("Bound device {} for export", busid);
    Ok(())
}

/// Withdraw an exported device (`usbip unbind -b <busid>`)
pub fn unbind_device(busid: &str) -> Result<()> {
    let output = run_command("usbip", &["unbind", "-b", busid])?;
    if !output.success() {
        return Err(anyhow!(
            "usbip unbind -b {} failed: {}",
            busid,
            output.stderr.trim()
        ));
    }
    info!("Unbound device {}", busid);
    Ok(())
}
