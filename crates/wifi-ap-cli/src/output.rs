//! Argument parsing and output formatting for the client commands.

use std::fmt::Write;

use wifi_ap_config::{ConfigMap, ConfigValue};
use wifi_ap_core::ipc::StatusResult;

/// Parse `key=value` arguments into one update.
///
/// Values are read like file values, so `true`/`false` travel as booleans.
pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> anyhow::Result<ConfigMap> {
    let mut items = ConfigMap::new();
    for pair in pairs {
        let pair = pair.as_ref();
        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                items.insert(key.to_string(), ConfigValue::from_text(value));
            }
            _ => anyhow::bail!("Invalid configuration item '{pair}', expected key=value"),
        }
    }
    Ok(items)
}

/// One `key: value` line per entry, sorted by key.
pub fn format_config(config: &ConfigMap) -> String {
    let mut out = String::new();
    for (key, value) in config {
        let _ = writeln!(out, "{key}: {value}");
    }
    out
}

/// The value of a single key.
pub fn lookup<'a>(config: &'a ConfigMap, key: &str) -> anyhow::Result<&'a ConfigValue> {
    config
        .get(key)
        .ok_or_else(|| anyhow::anyhow!("Config item '{key}' does not exist"))
}

pub fn format_status(status: &StatusResult) -> String {
    format!("ap.active: {}\n", status.ap_active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_pairs() {
        let items = parse_pairs(&["wifi.ssid=My AP", "share.disabled=true", "x.y=a=b"]).unwrap();
        assert_eq!(items["wifi.ssid"], ConfigValue::from("My AP"));
        assert_eq!(items["share.disabled"], ConfigValue::Bool(true));
        assert_eq!(items["x.y"], ConfigValue::from("a=b"));
    }

    #[test]
    fn test_parse_pairs_rejects_missing_separator() {
        let err = parse_pairs(&["wifi.ssid"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration item 'wifi.ssid', expected key=value"
        );
        assert!(parse_pairs(&["=value"]).is_err());
    }

    #[test]
    fn test_format_config_is_sorted() {
        let mut config = ConfigMap::new();
        config.insert("wifi.ssid".to_string(), "Ubuntu".into());
        config.insert("disabled".to_string(), false.into());
        assert_eq!(format_config(&config), "disabled: false\nwifi.ssid: Ubuntu\n");
    }

    #[test]
    fn test_lookup_missing_key() {
        let config = ConfigMap::new();
        let err = lookup(&config, "wifi.ssid").unwrap_err();
        assert_eq!(err.to_string(), "Config item 'wifi.ssid' does not exist");
    }

    #[test]
    fn test_format_status() {
        assert_eq!(
            format_status(&StatusResult { ap_active: true }),
            "ap.active: true\n"
        );
    }
}
