//! Directory layouts for tests.
//!
//! A [`TestLayout`] is a temp directory shaped like an installed package:
//!
//! ```text
//! <root>/snap/conf/default-config   default layer (whitelist source)
//! <root>/snap/bin/ap.sh             fake access point
//! <root>/data/config                data layer
//! <root>/user/config                user layer
//! <root>/ap.pids                    one line per access point start
//! ```
//!
//! The fake access point appends its pid to `ap.pids` and sleeps until it
//! is signalled, so tests can count starts and check liveness.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use wifi_ap_config::{AppConfig, ConfigLayers};

/// Default layer used unless a test supplies its own.
pub const DEFAULT_CONFIG: &str = "\
# Default access point configuration
DISABLED=false
WIFI_INTERFACE=wlan0
WIFI_INTERFACE_MODE=direct
WIFI_ADDRESS=10.0.60.1
WIFI_NETMASK=255.255.255.0
WIFI_SSID=Ubuntu
WIFI_SECURITY=open
WIFI_SECURITY_PASSPHRASE=
WIFI_CHANNEL=6
WIFI_OPERATION_MODE=g
SHARE_DISABLED=false
SHARE_NETWORK_INTERFACE=eth0
DHCP_RANGE_START=10.0.60.3
DHCP_RANGE_STOP=10.0.60.20
DHCP_LEASE_TIME=12h
";

/// Fluent builder for [`TestLayout`].
///
/// # Example
///
/// ```ignore
/// let layout = TestLayoutBuilder::new()
///     .data_config("WIFI_SSID=Office\n")
///     .build();
/// ```
pub struct TestLayoutBuilder {
    default_config: Option<String>,
    data_config: Option<String>,
    user_config: Option<String>,
    ap_body: String,
}

impl TestLayoutBuilder {
    pub fn new() -> Self {
        Self {
            default_config: Some(DEFAULT_CONFIG.to_string()),
            data_config: None,
            user_config: None,
            ap_body: "exec sleep 1000".to_string(),
        }
    }

    pub fn default_config(mut self, content: &str) -> Self {
        self.default_config = Some(content.to_string());
        self
    }

    /// Leave the default layer out entirely.
    pub fn without_default_config(mut self) -> Self {
        self.default_config = None;
        self
    }

    pub fn data_config(mut self, content: &str) -> Self {
        self.data_config = Some(content.to_string());
        self
    }

    pub fn user_config(mut self, content: &str) -> Self {
        self.user_config = Some(content.to_string());
        self
    }

    /// Shell run by the fake access point after it records its pid.
    pub fn ap_body(mut self, body: &str) -> Self {
        self.ap_body = body.to_string();
        self
    }

    pub fn build(self) -> TestLayout {
        let root = TempDir::new().expect("failed to create temp dir");
        let install_dir = root.path().join("snap");
        let data_dir = root.path().join("data");
        let user_dir = root.path().join("user");
        let layers = ConfigLayers::from_roots(&install_dir, &data_dir, &user_dir);

        for dir in [
            install_dir.join("conf"),
            install_dir.join("bin"),
            data_dir.clone(),
            user_dir.clone(),
        ] {
            std::fs::create_dir_all(dir).expect("failed to create layout dir");
        }
        for (path, content) in [
            (layers.default_layer(), &self.default_config),
            (layers.data_layer(), &self.data_config),
            (layers.user_layer(), &self.user_config),
        ] {
            if let Some(content) = content {
                std::fs::write(path, content).expect("failed to write config layer");
            }
        }

        let pid_file = root.path().join("ap.pids");
        let ap_script = install_dir.join("bin").join("ap.sh");
        std::fs::write(
            &ap_script,
            format!("echo $$ >> '{}'\n{}\n", pid_file.display(), self.ap_body),
        )
        .expect("failed to write fake access point");

        let mut config = AppConfig::default();
        config.paths.install_dir = install_dir.display().to_string();
        config.paths.data_dir = data_dir.display().to_string();
        config.paths.user_data_dir = user_dir.display().to_string();
        // Run through `sh` so the script never needs an exec bit.
        config.daemon.ap_program = Some("sh".to_string());
        config.daemon.ap_args = vec![ap_script.display().to_string()];

        TestLayout {
            config,
            layers,
            pid_file,
            _root: root,
        }
    }
}

impl Default for TestLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A test-scoped package layout, deleted on drop.
pub struct TestLayout {
    config: AppConfig,
    layers: ConfigLayers,
    pid_file: PathBuf,
    _root: TempDir,
}

impl TestLayout {
    /// Layout with the stock default layer and nothing else.
    pub fn new() -> Self {
        TestLayoutBuilder::new().build()
    }

    pub fn app_config(&self) -> AppConfig {
        self.config.clone()
    }

    pub fn layers(&self) -> &ConfigLayers {
        &self.layers
    }

    pub fn socket_path(&self) -> PathBuf {
        self.config.socket_path()
    }

    /// Raw text of the data layer, `None` if it does not exist.
    pub fn data_config(&self) -> Option<String> {
        read_optional(self.layers.data_layer())
    }

    /// Pids recorded by every fake access point started so far.
    pub fn ap_pids(&self) -> Vec<u32> {
        read_optional(&self.pid_file)
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect()
    }

    /// Wait until `count` access point starts have been recorded.
    pub async fn wait_for_ap_starts(&self, count: usize) -> Vec<u32> {
        for _ in 0..250 {
            let pids = self.ap_pids();
            if pids.len() >= count {
                return pids;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        self.ap_pids()
    }
}

impl Default for TestLayout {
    fn default() -> Self {
        Self::new()
    }
}

fn read_optional(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}
