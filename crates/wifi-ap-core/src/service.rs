//! Control service: the operations behind the HTTP API.
//!
//! Handlers in [`crate::ipc::server`] only translate between HTTP and these
//! calls. Request bodies arrive as raw bytes and are decoded here, so every
//! failure maps onto one [`ServiceError`] and reaches the client in the
//! standard error envelope.

use std::sync::Arc;

use tracing::{info, warn};

use wifi_ap_config::{ConfigError, ConfigMap, ConfigStore, ValidationError, Whitelist};

use crate::ipc::types::{ACTION_RESTART_AP, StatusAction, StatusResult};
use crate::supervisor::{Supervisor, SupervisorError};

/// Failures reported to API clients. The display text is the client-facing
/// message.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to read configuration data")]
    ReadConfiguration(#[source] ConfigError),

    #[error("Failed to read existing configuration file")]
    ReadBaseline(#[source] ConfigError),

    #[error("No default configuration file available")]
    MissingWhitelist,

    #[error("Malformed request")]
    MalformedRequest(#[source] serde_json::Error),

    #[error("Invalid key \"{0}\"")]
    InvalidKey(String),

    #[error("Can't write configuration file")]
    WriteConfiguration(#[source] ConfigError),

    #[error("Failed to restart AP process")]
    Restart(#[source] SupervisorError),

    #[error("Invalid action \"{0}\"")]
    InvalidAction(String),

    #[error("Invalid method called")]
    InvalidMethod,
}

/// Shared state of the control API.
pub struct ControlService {
    store: ConfigStore,
    whitelist: Whitelist,
    supervisor: Arc<Supervisor>,
}

impl ControlService {
    pub fn new(store: ConfigStore, whitelist: Whitelist, supervisor: Arc<Supervisor>) -> Self {
        Self {
            store,
            whitelist,
            supervisor,
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// The merged configuration of all layers.
    pub async fn configuration(&self) -> Result<ConfigMap, ServiceError> {
        self.store
            .read_merged()
            .await
            .map_err(ServiceError::ReadConfiguration)
    }

    /// Apply a JSON object of key/value pairs to the data layer and restart
    /// the access point.
    ///
    /// Nothing is written unless every key is whitelisted. A failed restart
    /// leaves the new file in place.
    pub async fn update_configuration(&self, body: &[u8]) -> Result<(), ServiceError> {
        let data = self.store.lock_data().await;
        let mut config = data.read().await.map_err(ServiceError::ReadBaseline)?;

        if self.whitelist.is_empty() {
            return Err(ServiceError::MissingWhitelist);
        }

        let items: ConfigMap =
            serde_json::from_slice(body).map_err(ServiceError::MalformedRequest)?;
        self.whitelist.validate(&items).map_err(|e| match e {
            ValidationError::MissingWhitelist => ServiceError::MissingWhitelist,
            ValidationError::InvalidKey(key) => ServiceError::InvalidKey(key),
        })?;

        info!(keys = ?items.keys().collect::<Vec<_>>(), "Updating access point configuration");
        config.extend(items);
        data.write(&config)
            .await
            .map_err(ServiceError::WriteConfiguration)?;
        drop(data);

        self.restart_ap().await
    }

    /// Current status of the access point.
    pub fn status(&self) -> StatusResult {
        StatusResult {
            ap_active: self.supervisor.running(),
        }
    }

    /// Run an action posted to the status resource.
    pub async fn apply_action(&self, body: &[u8]) -> Result<(), ServiceError> {
        let request: StatusAction =
            serde_json::from_slice(body).map_err(ServiceError::MalformedRequest)?;
        if request.action != ACTION_RESTART_AP {
            return Err(ServiceError::InvalidAction(request.action));
        }
        self.restart_ap().await
    }

    async fn restart_ap(&self) -> Result<(), ServiceError> {
        self.supervisor.restart().await.map_err(|e| {
            warn!(error = %e, "Access point restart failed");
            ServiceError::Restart(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::ProcessSpec;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use wifi_ap_config::{ConfigLayers, ConfigValue};

    fn service_in(tmp: &TempDir, whitelist: Whitelist, program: &str) -> ControlService {
        let layers = ConfigLayers::from_roots(
            &tmp.path().join("snap"),
            &tmp.path().join("data"),
            &tmp.path().join("user"),
        );
        let supervisor = Supervisor::new(ProcessSpec::new(program).with_args(["1000"]));
        ControlService::new(ConfigStore::new(layers), whitelist, Arc::new(supervisor))
    }

    #[tokio::test]
    async fn test_empty_whitelist_wins_over_malformed_body() {
        let tmp = TempDir::new().unwrap();
        let service = service_in(&tmp, Whitelist::empty(), "sleep");

        let bodies: [&[u8]; 3] = [b"garbage", br#"{"wifi.ssid":"x"}"#, b""];
        for body in bodies {
            let err = service.update_configuration(body).await.unwrap_err();
            assert_eq!(err.to_string(), "No default configuration file available");
        }
    }

    #[tokio::test]
    async fn test_invalid_key_is_named_and_nothing_is_written() {
        let tmp = TempDir::new().unwrap();
        let service = service_in(&tmp, Whitelist::from_iter(["wifi.ssid"]), "sleep");

        let err = service
            .update_configuration(br#"{"wifi.ssid":"UbuntuAP","wifi.bogus":"x"}"#)
            .await
            .unwrap_err();
        assert!(matches!(&err, ServiceError::InvalidKey(key) if key == "wifi.bogus"));
        assert_eq!(err.to_string(), "Invalid key \"wifi.bogus\"");
        assert!(service.store().read_data().await.unwrap().is_empty());
        assert!(!service.status().ap_active);
    }

    #[tokio::test]
    async fn test_failed_restart_keeps_written_file() {
        let tmp = TempDir::new().unwrap();
        let service = service_in(
            &tmp,
            Whitelist::from_iter(["wifi.ssid"]),
            "/nonexistent/wifi-ap/ap.sh",
        );

        let err = service
            .update_configuration(br#"{"wifi.ssid":"UbuntuAP"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Restart(SupervisorError::Spawn { .. })));
        assert_eq!(err.to_string(), "Failed to restart AP process");

        let data = service.store().read_data().await.unwrap();
        assert_eq!(data["wifi.ssid"], ConfigValue::from("UbuntuAP"));
    }

    #[tokio::test]
    async fn test_update_merges_into_existing_data() {
        let tmp = TempDir::new().unwrap();
        let whitelist = Whitelist::from_iter(["wifi.ssid", "wifi.channel"]);
        let service = service_in(&tmp, whitelist, "sleep");

        service
            .update_configuration(br#"{"wifi.ssid":"First"}"#)
            .await
            .unwrap();
        service
            .update_configuration(br#"{"wifi.channel":"11"}"#)
            .await
            .unwrap();

        let data = service.store().read_data().await.unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data["wifi.ssid"], ConfigValue::from("First"));
        assert!(service.status().ap_active);
        service.supervisor().stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_action_does_not_restart() {
        let tmp = TempDir::new().unwrap();
        let service = service_in(&tmp, Whitelist::empty(), "sleep");

        let err = service
            .apply_action(br#"{"action":"reboot"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid action \"reboot\"");
        assert!(!service.status().ap_active);
    }
}
