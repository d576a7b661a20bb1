//! Service-manager integration
//!
//! sd-notify integration for running under systemd: readiness, stop, and
//! status notifications plus watchdog keepalives. Every function is a no-op
//! when `NOTIFY_SOCKET` is unset, so foreground runs need no special
//! casing.

use anyhow::{Context, Result};
use std::env;
use std::os::unix::net::UnixDatagram;
use tracing::{debug, error, info};

fn notify(message: &[u8]) -> Result<()> {
    let Ok(socket_path) = env::var("NOTIFY_SOCKET") else {
        debug!("NOTIFY_SOCKET not set, skipping service notification");
        return Ok(());
    };

    let socket = UnixDatagram::unbound().context("Failed to create notify socket")?;
    socket
        .send_to(message, &socket_path)
        .context("Failed to send service notification")?;
    Ok(())
}

/// Notify the service manager that initialization is complete and the
/// endpoint is accepting connections.
pub fn notify_ready() -> Result<()> {
    notify(b"READY=1")?;
    info!("notified service manager: ready");
    Ok(())
}

/// Notify the service manager that shutdown has begun.
pub fn notify_stopping() -> Result<()> {
    notify(b"STOPPING=1")?;
    info!("notified service manager: stopping");
    Ok(())
}

/// Publish a status line visible in `systemctl status`.
pub fn notify_status(status: &str) -> Result<()> {
    notify(format!("STATUS={status}").as_bytes())?;
    debug!(status, "notified service manager: status");
    Ok(())
}

/// Send one watchdog keepalive.
pub fn notify_watchdog() -> Result<()> {
    notify(b"WATCHDOG=1")
}

/// Watchdog timeout configured by the service manager, in microseconds.
/// `None` when the watchdog is not enabled.
pub fn get_watchdog_timeout() -> Option<u64> {
    env::var("WATCHDOG_USEC").ok().and_then(|s| s.parse().ok())
}

/// Whether the process is running under a notify-capable service manager.
pub fn is_systemd() -> bool {
    env::var("NOTIFY_SOCKET").is_ok()
}

/// Spawn a background task sending watchdog keepalives at half the
/// configured interval. Returns a completed no-op task when the watchdog is
/// not enabled.
pub fn spawn_watchdog_task() -> tokio::task::JoinHandle<()> {
    let Some(timeout_usec) = get_watchdog_timeout() else {
        debug!("service watchdog not enabled");
        return tokio::spawn(async {});
    };

    let interval_secs = (timeout_usec / 1_000_000) / 2;
    let interval = std::time::Duration::from_secs(interval_secs.max(1));
    info!(
        "service watchdog enabled, keepalive interval: {}s",
        interval.as_secs()
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = notify_watchdog() {
                // Keep trying; a transient send failure is not fatal.
                error!("failed to send watchdog keepalive: {e:#}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_functions_are_noops_without_socket() {
        unsafe {
            env::remove_var("NOTIFY_SOCKET");
        }

        assert!(!is_systemd());
        assert!(notify_ready().is_ok());
        assert!(notify_stopping().is_ok());
        assert!(notify_watchdog().is_ok());
        assert!(notify_status("test").is_ok());
    }

    #[test]
    fn watchdog_timeout_parses_from_env() {
        unsafe {
            env::remove_var("WATCHDOG_USEC");
        }
        assert!(get_watchdog_timeout().is_none());

        unsafe {
            env::set_var("WATCHDOG_USEC", "30000000");
        }
        assert_eq!(get_watchdog_timeout(), Some(30_000_000));

        unsafe {
            env::set_var("WATCHDOG_USEC", "bogus");
        }
        assert!(get_watchdog_timeout().is_none());

        unsafe {
            env::remove_var("WATCHDOG_USEC");
        }
    }
}
