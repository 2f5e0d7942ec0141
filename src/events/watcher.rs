//! Platform network-change watcher feeding the wake bus

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::bus::{WakeReason, WeakWakeBus};

/// Running watcher task
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) struct WatcherHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub(crate) fn stop(self) {
        self.cancel.cancel();
    }
}

/// Spawn the native watcher, `None` where the platform has none
#[cfg(target_os = "linux")]
pub(crate) fn spawn(bus: WeakWakeBus) -> Option<WatcherHandle> {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(nmcli::run(bus, cancel.clone()));
    Some(WatcherHandle { cancel, task })
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn spawn(_bus: WeakWakeBus) -> Option<WatcherHandle> {
    tracing::info!("No native network watcher on this platform, relying on polling");
    None
}

/// Map one line of `nmcli monitor` output to a bus event
///
/// Only device state lines such as `wlan0: connected` are relevant.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_monitor_line(line: &str) -> Option<WakeReason> {
    let (device, state) = line.trim().split_once(": ")?;
    if device.is_empty() || device.contains(' ') {
        return None;
    }

    match state {
        "connected" => Some(WakeReason::Connected),
        "disconnected" | "unavailable" => Some(WakeReason::Disconnected),
        _ => None,
    }
}

#[cfg(target_os = "linux")]
mod nmcli {
    use std::process::Stdio;

    use tokio::{
        io::{AsyncBufReadExt, BufReader},
        process::Command,
    };
    use tokio_util::sync::CancellationToken;
    use tracing::{debug, info, warn};

    use super::parse_monitor_line;
    use crate::events::bus::WeakWakeBus;

    pub(super) async fn run(bus: WeakWakeBus, cancel: CancellationToken) {
        let mut child = match Command::new("nmcli")
            .arg("monitor")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("Network watcher unavailable (nmcli monitor: {}), relying on polling", e);
                return;
            }
        };

        let Some(stdout) = child.stdout.take() else {
            warn!("nmcli monitor has no stdout, relying on polling");
            return;
        };
        let mut lines = BufReader::new(stdout).lines();
        info!("Network watcher started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let Some(reason) = parse_monitor_line(&line) else {
                            continue;
                        };
                        debug!("nmcli: {}", line);
                        match bus.upgrade() {
                            Some(bus) => bus.publish(reason),
                            None => break,
                        }
                    }
                    Ok(None) => {
                        warn!("nmcli monitor exited, relying on polling");
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read nmcli monitor output: {}", e);
                        break;
                    }
                }
            }
        }

        if let Err(e) = child.kill().await {
            debug!("Failed to stop nmcli monitor: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_state_lines() {
        assert_eq!(parse_monitor_line("wlan0: connected"), Some(WakeReason::Connected));
        assert_eq!(
            parse_monitor_line("wlp2s0: disconnected"),
            Some(WakeReason::Disconnected)
        );
        assert_eq!(
            parse_monitor_line("wlp2s0: unavailable\n"),
            Some(WakeReason::Disconnected)
        );
    }

    #[test]
    fn test_parse_ignores_other_lines() {
        assert_eq!(
            parse_monitor_line("wlan0: connecting (getting IP configuration)"),
            None
        );
        assert_eq!(parse_monitor_line("'MDI' is now the primary connection"), None);
        assert_eq!(
            parse_monitor_line("Connectivity is now 'full': connected"),
            None
        );
        assert_eq!(parse_monitor_line(""), None);
    }
}
