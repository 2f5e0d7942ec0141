//! Platform network facts gathered from command-line tools
//!
//! Every parser tolerates missing or malformed tool output and returns an
//! empty result instead of failing.

use std::{collections::BTreeSet, sync::LazyLock};

use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::core::error::BackendError;

const AIRPORT: &str =
    "/System/Library/PrivateFrameworks/Apple80211.framework/Versions/Current/Resources/airport";

static NETSH_BLOCK_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n\s*Name\s*:\s*").expect("valid regex"));
static NETSH_CONNECTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*State\s*:\s*connected\b").expect("valid regex"));
static NETSH_SSID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*SSID\s*:\s*(.+)$").expect("valid regex"));
static AIRPORT_SSID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*SSID:\s*(.+)$").expect("valid regex"));
static IPCONFIG_GATEWAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Default Gateway[^\r\n]*:\s*([\d.]+)").expect("valid regex")
});

/// Run a command and return its stdout, or an empty string on any failure
pub async fn run_command(program: &str, args: &[&str]) -> String {
    match try_run_command(program, args).await {
        Ok(stdout) => stdout,
        Err(e) => {
            debug!("{}", e);
            String::new()
        }
    }
}

async fn try_run_command(program: &str, args: &[&str]) -> Result<String, BackendError> {
    let command_error = |reason: String| BackendError::Command {
        command: format!("{} {}", program, args.join(" ")),
        reason,
    };

    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| command_error(e.to_string()))?;

    if !output.status.success() {
        return Err(command_error(format!("exit status {}", output.status)));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Wi-Fi networks the host is associated with
pub async fn current_network_names() -> BTreeSet<String> {
    if cfg!(target_os = "windows") {
        parse_netsh_interfaces(&run_command("netsh", &["wlan", "show", "interfaces"]).await)
    } else if cfg!(target_os = "macos") {
        parse_airport_info(&run_command(AIRPORT, &["-I"]).await)
    } else {
        parse_nmcli_wifi(&run_command("nmcli", &["-t", "-f", "active,ssid", "dev", "wifi"]).await)
    }
}

/// Default gateway addresses of the host
pub async fn current_gateways() -> Vec<String> {
    if cfg!(target_os = "windows") {
        parse_ipconfig(&run_command("ipconfig", &[]).await)
    } else if cfg!(target_os = "macos") {
        parse_netstat_routes(&run_command("netstat", &["-rn"]).await)
    } else {
        parse_ip_route(&run_command("ip", &["route"]).await)
    }
}

/// Parse `nmcli -t -f active,ssid dev wifi`
///
/// Terse mode escapes `:` inside values as `\:`.
pub fn parse_nmcli_wifi(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(active, _)| *active == "yes")
        .map(|(_, ssid)| ssid.replace("\\:", ":"))
        .filter(|ssid| !ssid.is_empty())
        .collect()
}

/// Parse `netsh wlan show interfaces`, one block per interface
pub fn parse_netsh_interfaces(output: &str) -> BTreeSet<String> {
    NETSH_BLOCK_SPLIT
        .split(output)
        .filter(|block| !block.trim().is_empty())
        .filter(|block| NETSH_CONNECTED.is_match(block))
        .filter_map(|block| NETSH_SSID.captures(block))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|ssid| !ssid.is_empty() && !ssid.eq_ignore_ascii_case("not connected"))
        .collect()
}

/// Parse `airport -I`
pub fn parse_airport_info(output: &str) -> BTreeSet<String> {
    AIRPORT_SSID
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|ssid| !ssid.is_empty())
        .into_iter()
        .collect()
}

/// Parse `ip route`, e.g. `default via 172.16.0.1 dev wlan0`
pub fn parse_ip_route(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with("default"))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            parts.find(|part| *part == "via")?;
            parts.next().map(str::to_string)
        })
        .collect()
}

/// Parse the `Default Gateway` lines of `ipconfig`
pub fn parse_ipconfig(output: &str) -> Vec<String> {
    IPCONFIG_GATEWAY
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Parse `netstat -rn`, e.g. `default  172.16.0.1  UGScg  en0`
pub fn parse_netstat_routes(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts.as_slice() {
                ["default", gateway, ..] => Some(gateway.to_string()),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nmcli_active_only() {
        let output = "no:HomeNet\nyes:MDI-Students\nno:\n";
        let names = parse_nmcli_wifi(output);

        assert_eq!(names.len(), 1);
        assert!(names.contains("MDI-Students"));
    }

    #[test]
    fn test_parse_nmcli_escaped_colon() {
        let names = parse_nmcli_wifi("yes:Lab\\:5G\n");
        assert!(names.contains("Lab:5G"));
    }

    #[test]
    fn test_parse_nmcli_empty_and_garbage() {
        assert!(parse_nmcli_wifi("").is_empty());
        assert!(parse_nmcli_wifi("Error: NetworkManager is not running.").is_empty());
        assert!(parse_nmcli_wifi("yes:\n").is_empty());
    }

    #[test]
    fn test_parse_netsh_multiple_interfaces() {
        let output = "\r\nThere are 2 interfaces on the system: \r\n\r\n    \
                      Name                   : Wi-Fi\r\n    \
                      Description            : Intel(R) Wi-Fi 6 AX201\r\n    \
                      State                  : connected\r\n    \
                      SSID                   : MDI\r\n    \
                      BSSID                  : aa:bb:cc:dd:ee:ff\r\n\r\n    \
                      Name                   : Wi-Fi 2\r\n    \
                      State                  : disconnected\r\n    \
                      SSID                   : OtherNet\r\n";
        let names = parse_netsh_interfaces(output);

        assert_eq!(names.len(), 1);
        assert!(names.contains("MDI"));
    }

    #[test]
    fn test_parse_netsh_ignores_bssid_and_not_connected() {
        let output = "\n    Name                   : Wi-Fi\n    \
                      State                  : connected\n    \
                      SSID                   : not connected\n";
        assert!(parse_netsh_interfaces(output).is_empty());
        assert!(parse_netsh_interfaces("").is_empty());
    }

    #[test]
    fn test_parse_airport() {
        let output = "     agrCtlRSSI: -55\n     BSSID: aa:bb:cc:dd:ee:ff\n           SSID: MDI Hostel\n";
        let names = parse_airport_info(output);

        assert_eq!(names.len(), 1);
        assert!(names.contains("MDI Hostel"));
        assert!(parse_airport_info("AirPort: Off").is_empty());
    }

    #[test]
    fn test_parse_ip_route() {
        let output = "default via 172.16.0.1 dev wlan0 proto dhcp metric 600\n\
                      172.16.0.0/16 dev wlan0 proto kernel scope link src 172.16.4.20\n\
                      default dev tun0 scope link\n";

        assert_eq!(parse_ip_route(output), vec!["172.16.0.1".to_string()]);
        assert!(parse_ip_route("").is_empty());
    }

    #[test]
    fn test_parse_ipconfig() {
        let output = "Wireless LAN adapter Wi-Fi:\r\n\r\n   \
                      IPv4 Address. . . . . . . . . . . : 172.16.4.20\r\n   \
                      Default Gateway . . . . . . . . . : 172.16.0.1\r\n\r\n\
                      Ethernet adapter Ethernet:\r\n   \
                      Default Gateway . . . . . . . . . : \r\n";

        assert_eq!(parse_ipconfig(output), vec!["172.16.0.1".to_string()]);
    }

    #[test]
    fn test_parse_netstat_routes() {
        let output = "Routing tables\n\nInternet:\n\
                      Destination        Gateway            Flags        Netif Expire\n\
                      default            172.16.0.1         UGScg          en0\n\
                      127                127.0.0.1          UCS            lo0\n";

        assert_eq!(parse_netstat_routes(output), vec!["172.16.0.1".to_string()]);
    }

    #[tokio::test]
    async fn test_run_missing_command_is_empty() {
        let output = run_command("definitely-not-a-real-binary-xyz", &["--help"]).await;
        assert!(output.is_empty());
    }
}
