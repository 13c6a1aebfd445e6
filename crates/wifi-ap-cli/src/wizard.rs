//! Interactive setup wizard.
//!
//! Walks through the handful of settings a new access point needs and
//! returns them as one configuration update. Prompts read from any
//! [`BufRead`] and write to any [`Write`] so the flow can be driven from
//! tests.

use std::io::{self, BufRead, Write};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use wifi_ap_config::{ConfigMap, ConfigValue};

/// Where the kernel lists network interfaces.
pub const SYS_CLASS_NET: &str = "/sys/class/net";

const SSID_MAX_LEN: usize = 31;
const PASSPHRASE_LEN: std::ops::RangeInclusive<usize> = 8..=63;

const AUTO_SSID: &str = "Ubuntu";
const AUTO_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 0, 60, 1);
const AUTO_POOL_SIZE: u8 = 20;

/// Errors that end the wizard.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    /// A rejected answer the user chose not to retry.
    #[error("{0}")]
    Invalid(String),

    #[error("input closed before the wizard finished")]
    Eof,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn invalid(message: impl Into<String>) -> WizardError {
    WizardError::Invalid(message.into())
}

/// Network interfaces found on the system, split by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interfaces {
    pub wireless: Vec<String>,
    pub wired: Vec<String>,
}

impl Interfaces {
    /// List interfaces below a `/sys/class/net`-shaped directory.
    ///
    /// `lo` is skipped. An interface is wireless when it has a `wireless`
    /// subdirectory. An unreadable directory yields no interfaces.
    pub fn discover(sys_net: &Path) -> Self {
        let mut found = Self::default();
        let Ok(entries) = std::fs::read_dir(sys_net) else {
            return found;
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "lo")
            .collect();
        names.sort();

        for name in names {
            if sys_net.join(&name).join("wireless").exists() {
                found.wireless.push(name);
            } else {
                found.wired.push(name);
            }
        }
        found
    }
}

/// Values every wizard run sets without asking.
fn preset() -> ConfigMap {
    let mut config = ConfigMap::new();
    config.insert("disabled".to_string(), ConfigValue::Bool(false));
    config.insert("wifi.channel".to_string(), "6".into());
    config.insert("wifi.operation-mode".to_string(), "g".into());
    config.insert("dhcp.lease-time".to_string(), "12h".into());
    config
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    WirelessInterface,
    Ssid,
    Security,
    Passphrase,
    Address,
    DhcpPool,
    SharedInterface,
}

impl Step {
    const ALL: [Step; 7] = [
        Step::WirelessInterface,
        Step::Ssid,
        Step::Security,
        Step::Passphrase,
        Step::Address,
        Step::DhcpPool,
        Step::SharedInterface,
    ];
}

/// Prompt-driven wizard over arbitrary input and output streams.
pub struct Wizard<R, W> {
    input: R,
    output: W,
    interfaces: Interfaces,
}

impl<R: BufRead, W: Write> Wizard<R, W> {
    pub fn new(input: R, output: W, interfaces: Interfaces) -> Self {
        Self {
            input,
            output,
            interfaces,
        }
    }

    /// Ask every question, offering a retry after each rejected answer.
    pub fn run(&mut self) -> Result<ConfigMap, WizardError> {
        let mut config = preset();
        for step in Step::ALL {
            loop {
                match self.ask(step, &mut config) {
                    Ok(()) => break,
                    Err(WizardError::Invalid(message)) => {
                        writeln!(self.output, "Error: {message}")?;
                        write!(self.output, "Do you want to try again? (y/n) ")?;
                        if !self.read_answer()?.eq_ignore_ascii_case("y") {
                            return Err(WizardError::Invalid(message));
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(config)
    }

    fn read_answer(&mut self) -> Result<String, WizardError> {
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(WizardError::Eof);
        }
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }

    fn prompt(&mut self, question: &str) -> Result<String, WizardError> {
        write!(self.output, "{question}")?;
        self.read_answer()
    }

    fn ask(&mut self, step: Step, config: &mut ConfigMap) -> Result<(), WizardError> {
        match step {
            Step::WirelessInterface => {
                let wireless = self.interfaces.wireless.clone();
                match wireless.as_slice() {
                    [] => {
                        return Err(invalid(
                            "There are no valid wireless network interfaces available",
                        ));
                    }
                    [only] => {
                        writeln!(
                            self.output,
                            "Automatically selected only available wireless network interface {only}"
                        )?;
                        config.insert("wifi.interface".to_string(), only.as_str().into());
                    }
                    many => {
                        let answer = self.prompt(&format!(
                            "Which wireless interface do you want to use? Available are {}: ",
                            many.join(", ")
                        ))?;
                        config.insert("wifi.interface".to_string(), interface_name(&answer)?.into());
                    }
                }
            }
            Step::Ssid => {
                let ssid = self.prompt("Insert the SSID of your access point: ")?;
                config.insert("wifi.ssid".to_string(), validate_ssid(&ssid)?.into());
            }
            Step::Security => {
                let answer = self.prompt(
                    "Do you want to protect your network with a WPA2 password instead of staying open for everyone? (y/n) ",
                )?;
                let security = match answer.to_ascii_lowercase().as_str() {
                    "y" => "wpa2",
                    "n" => "open",
                    _ => return Err(invalid(format!("Invalid answer: {answer}"))),
                };
                config.insert("wifi.security".to_string(), security.into());
            }
            Step::Passphrase => {
                if config.get("wifi.security").and_then(ConfigValue::as_str) != Some("wpa2") {
                    return Ok(());
                }
                let passphrase = self.prompt("Insert your WPA2 passphrase: ")?;
                config.insert(
                    "wifi.security-passphrase".to_string(),
                    validate_passphrase(&passphrase)?.into(),
                );
            }
            Step::Address => {
                let answer = self.prompt("Insert the Access Point IP address: ")?;
                let address = parse_address(&answer)?;
                insert_address(config, address);
            }
            Step::DhcpPool => {
                let address = current_address(config)?;
                let max = max_pool_size(address);
                let answer = self.prompt(&format!(
                    "How many hosts do you want your DHCP pool to hold? (1-{max}) "
                ))?;
                let hosts: u8 = answer
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("Invalid answer: {answer}")))?;
                insert_pool(config, address, hosts)?;
            }
            Step::SharedInterface => {
                let wired = self.interfaces.wired.clone();
                if wired.is_empty() {
                    writeln!(
                        self.output,
                        "No network interface available whose connection can be shared. Disabling connection sharing."
                    )?;
                    config.insert("share.disabled".to_string(), ConfigValue::Bool(true));
                    return Ok(());
                }
                writeln!(
                    self.output,
                    "Which network interface do you want to use for connection sharing?"
                )?;
                let answer = self.prompt(&format!("Available are {}: ", wired.join(", ")))?;
                config.insert(
                    "share.network-interface".to_string(),
                    interface_name(&answer)?.into(),
                );
                config.insert("share.disabled".to_string(), ConfigValue::Bool(false));
            }
        }
        Ok(())
    }
}

/// Answer every question from detected interfaces and defaults.
pub fn auto_configuration(interfaces: &Interfaces) -> Result<ConfigMap, WizardError> {
    let mut config = preset();

    let wireless = interfaces
        .wireless
        .first()
        .ok_or_else(|| invalid("There are no valid wireless network interfaces available"))?;
    config.insert("wifi.interface".to_string(), wireless.as_str().into());
    config.insert("wifi.ssid".to_string(), AUTO_SSID.into());
    config.insert("wifi.security".to_string(), "open".into());

    insert_address(&mut config, AUTO_ADDRESS);
    insert_pool(&mut config, AUTO_ADDRESS, AUTO_POOL_SIZE)?;

    match interfaces.wired.first() {
        Some(wired) => {
            config.insert("share.network-interface".to_string(), wired.as_str().into());
            config.insert("share.disabled".to_string(), ConfigValue::Bool(false));
        }
        None => {
            config.insert("share.disabled".to_string(), ConfigValue::Bool(true));
        }
    }
    Ok(config)
}

fn interface_name(answer: &str) -> Result<&str, WizardError> {
    if answer.is_empty() || !answer.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid(format!("Invalid interface name '{answer}' given")));
    }
    Ok(answer)
}

fn validate_ssid(ssid: &str) -> Result<&str, WizardError> {
    if ssid.is_empty() || ssid.len() > SSID_MAX_LEN {
        return Err(invalid(format!(
            "SSID length must be between 1 and {SSID_MAX_LEN} characters"
        )));
    }
    Ok(ssid)
}

fn validate_passphrase(passphrase: &str) -> Result<&str, WizardError> {
    if !PASSPHRASE_LEN.contains(&passphrase.len()) {
        return Err(invalid(format!(
            "WPA2 passphrase must be between {} and {} characters",
            PASSPHRASE_LEN.start(),
            PASSPHRASE_LEN.end()
        )));
    }
    Ok(passphrase)
}

fn parse_address(answer: &str) -> Result<Ipv4Addr, WizardError> {
    let address: IpAddr = answer
        .trim()
        .parse()
        .map_err(|_| invalid(format!("Invalid IP address: {answer}")))?;
    let IpAddr::V4(v4) = address else {
        return Err(invalid(format!("{answer} is not an IPv4 address")));
    };
    if v4.is_unspecified()
        || v4.is_loopback()
        || v4.is_multicast()
        || v4.is_link_local()
        || v4.is_broadcast()
    {
        return Err(invalid(format!("{answer} is a reserved IPv4 address")));
    }
    Ok(v4)
}

/// Classful default netmask of `address`.
fn default_netmask(address: Ipv4Addr) -> Ipv4Addr {
    match address.octets()[0] {
        0..=127 => Ipv4Addr::new(255, 0, 0, 0),
        128..=191 => Ipv4Addr::new(255, 255, 0, 0),
        _ => Ipv4Addr::new(255, 255, 255, 0),
    }
}

fn insert_address(config: &mut ConfigMap, address: Ipv4Addr) {
    config.insert("wifi.address".to_string(), address.to_string().into());
    config.insert(
        "wifi.netmask".to_string(),
        default_netmask(address).to_string().into(),
    );
}

fn current_address(config: &ConfigMap) -> Result<Ipv4Addr, WizardError> {
    config
        .get("wifi.address")
        .and_then(ConfigValue::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid("No access point address configured"))
}

/// Largest pool that fits on the roomier side of the address's last octet.
fn max_pool_size(address: Ipv4Addr) -> u8 {
    let last = address.octets()[3];
    if last <= 128 { 254 - last } else { last - 1 }
}

/// Place a pool of `hosts` addresses next to `address`, on the side with
/// more room.
fn insert_pool(config: &mut ConfigMap, address: Ipv4Addr, hosts: u8) -> Result<(), WizardError> {
    let max = max_pool_size(address);
    if hosts == 0 || hosts > max {
        return Err(invalid(format!("Pool size must be between 1 and {max}, got {hosts}")));
    }

    let [a, b, c, last] = address.octets();
    let (start, stop) = if last <= 128 {
        (last + 1, last + hosts)
    } else {
        (last - hosts, last - 1)
    };
    config.insert(
        "dhcp.range-start".to_string(),
        Ipv4Addr::new(a, b, c, start).to_string().into(),
    );
    config.insert(
        "dhcp.range-stop".to_string(),
        Ipv4Addr::new(a, b, c, stop).to_string().into(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn interfaces(wireless: &[&str], wired: &[&str]) -> Interfaces {
        Interfaces {
            wireless: wireless.iter().map(|s| s.to_string()).collect(),
            wired: wired.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn run(input: &str, found: Interfaces) -> (Result<ConfigMap, WizardError>, String) {
        let mut output = Vec::new();
        let result = Wizard::new(input.as_bytes(), &mut output, found).run();
        (result, String::from_utf8(output).unwrap())
    }

    fn text(config: &ConfigMap, key: &str) -> String {
        config[key].to_string()
    }

    #[test]
    fn test_open_network_run() {
        let (result, output) = run(
            "wlan1\nMyAP\nn\n10.0.60.1\n10\neth0\n",
            interfaces(&["wlan0", "wlan1"], &["eth0", "eth1"]),
        );
        let config = result.unwrap();

        assert_eq!(text(&config, "wifi.interface"), "wlan1");
        assert_eq!(text(&config, "wifi.ssid"), "MyAP");
        assert_eq!(text(&config, "wifi.security"), "open");
        assert!(!config.contains_key("wifi.security-passphrase"));
        assert_eq!(text(&config, "wifi.address"), "10.0.60.1");
        assert_eq!(text(&config, "wifi.netmask"), "255.0.0.0");
        assert_eq!(text(&config, "dhcp.range-start"), "10.0.60.2");
        assert_eq!(text(&config, "dhcp.range-stop"), "10.0.60.11");
        assert_eq!(text(&config, "share.network-interface"), "eth0");
        assert_eq!(config["share.disabled"], ConfigValue::Bool(false));
        assert_eq!(text(&config, "wifi.channel"), "6");
        assert!(output.contains("Available are wlan0, wlan1"));
    }

    #[test]
    fn test_wpa2_run_with_single_interfaces() {
        let (result, output) = run(
            "Home\ny\nsupersecret\n192.168.1.200\n50\neth0\n",
            interfaces(&["wlan0"], &["eth0"]),
        );
        let config = result.unwrap();

        assert!(output.contains("Automatically selected only available wireless network interface wlan0"));
        assert_eq!(text(&config, "wifi.interface"), "wlan0");
        assert_eq!(text(&config, "wifi.security"), "wpa2");
        assert_eq!(text(&config, "wifi.security-passphrase"), "supersecret");
        assert_eq!(text(&config, "wifi.netmask"), "255.255.255.0");
        assert_eq!(text(&config, "dhcp.range-start"), "192.168.1.150");
        assert_eq!(text(&config, "dhcp.range-stop"), "192.168.1.199");
    }

    #[test]
    fn test_retry_after_invalid_answer() {
        let long_ssid = "x".repeat(32);
        let input = format!("{long_ssid}\ny\nShort\nn\n10.0.0.1\n5\n");
        let (result, output) = run(&input, interfaces(&["wlan0"], &[]));
        let config = result.unwrap();

        assert!(output.contains("Error: SSID length must be between 1 and 31 characters"));
        assert_eq!(text(&config, "wifi.ssid"), "Short");
        assert_eq!(config["share.disabled"], ConfigValue::Bool(true));
    }

    #[test]
    fn test_declined_retry_aborts() {
        let (result, _) = run("MyAP\nmaybe\nn\n", interfaces(&["wlan0"], &[]));
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Invalid answer: maybe");
    }

    #[test]
    fn test_no_wireless_interface() {
        let (result, _) = run("n\n", interfaces(&[], &["eth0"]));
        assert_eq!(
            result.unwrap_err().to_string(),
            "There are no valid wireless network interfaces available"
        );
    }

    #[test]
    fn test_eof_ends_wizard() {
        let (result, _) = run("MyAP\n", interfaces(&["wlan0"], &[]));
        assert!(matches!(result, Err(WizardError::Eof)));
    }

    #[test]
    fn test_address_validation() {
        assert!(parse_address("10.0.60.1").is_ok());
        assert_eq!(
            parse_address("nope").unwrap_err().to_string(),
            "Invalid IP address: nope"
        );
        assert_eq!(
            parse_address("::1").unwrap_err().to_string(),
            "::1 is not an IPv4 address"
        );
        for reserved in ["0.0.0.0", "127.0.0.1", "224.0.0.1", "169.254.1.1", "255.255.255.255"] {
            assert!(parse_address(reserved).is_err(), "{reserved}");
        }
    }

    #[test]
    fn test_pool_bounds() {
        let low = Ipv4Addr::new(10, 0, 0, 1);
        assert_eq!(max_pool_size(low), 253);
        let high = Ipv4Addr::new(10, 0, 0, 200);
        assert_eq!(max_pool_size(high), 199);

        let mut config = ConfigMap::new();
        assert!(insert_pool(&mut config, low, 0).is_err());
        assert!(insert_pool(&mut config, low, 254).is_err());
        insert_pool(&mut config, low, 253).unwrap();
        assert_eq!(text(&config, "dhcp.range-stop"), "10.0.0.254");
    }

    #[test]
    fn test_passphrase_length() {
        assert!(validate_passphrase("1234567").is_err());
        assert!(validate_passphrase("12345678").is_ok());
        assert!(validate_passphrase(&"p".repeat(63)).is_ok());
        assert!(validate_passphrase(&"p".repeat(64)).is_err());
    }

    #[test]
    fn test_interface_name_rejects_punctuation() {
        assert!(interface_name("wlan0").is_ok());
        assert!(interface_name("wlan0; reboot").is_err());
        assert!(interface_name("").is_err());
    }

    #[test]
    fn test_auto_configuration() {
        let config = auto_configuration(&interfaces(&["wlp2s0"], &["enp1s0"])).unwrap();
        assert_eq!(text(&config, "wifi.interface"), "wlp2s0");
        assert_eq!(text(&config, "wifi.ssid"), "Ubuntu");
        assert_eq!(text(&config, "wifi.netmask"), "255.0.0.0");
        assert_eq!(text(&config, "dhcp.range-start"), "10.0.60.2");
        assert_eq!(text(&config, "dhcp.range-stop"), "10.0.60.21");
        assert_eq!(text(&config, "share.network-interface"), "enp1s0");

        assert!(auto_configuration(&interfaces(&[], &["eth0"])).is_err());
    }

    #[test]
    fn test_discover_interfaces() {
        let tmp = TempDir::new().unwrap();
        for name in ["lo", "eth0", "wlan0"] {
            std::fs::create_dir(tmp.path().join(name)).unwrap();
        }
        std::fs::create_dir(tmp.path().join("wlan0").join("wireless")).unwrap();

        let found = Interfaces::discover(tmp.path());
        assert_eq!(found, interfaces(&["wlan0"], &["eth0"]));
        assert_eq!(Interfaces::discover(&tmp.path().join("missing")), Interfaces::default());
    }
}
