//! Layered configuration store.
//!
//! The effective configuration is the merge of three files read in order,
//! later files overriding earlier ones:
//!
//! 1. `default` — read-only, ships with the package
//! 2. `data` — writable, the only layer the daemon ever rewrites
//! 3. `user` — writable per-user overlay, read-only to the daemon
//!
//! A missing file contributes nothing. Any other read failure aborts the
//! whole read.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::ConfigError;
use crate::codec;
use crate::value::ConfigMap;

/// File name of the writable layers inside their data directories.
pub const CONFIG_FILE_NAME: &str = "config";

/// The fixed, ordered list of configuration file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayers {
    default: PathBuf,
    data: PathBuf,
    user: PathBuf,
}

impl ConfigLayers {
    /// Build the layer list from explicit file paths.
    pub fn new(
        default: impl Into<PathBuf>,
        data: impl Into<PathBuf>,
        user: impl Into<PathBuf>,
    ) -> Self {
        Self {
            default: default.into(),
            data: data.into(),
            user: user.into(),
        }
    }

    /// Derive the layer files from the install, data, and user-data roots.
    pub fn from_roots(install_dir: &Path, data_dir: &Path, user_data_dir: &Path) -> Self {
        Self::new(
            install_dir.join("conf").join("default-config"),
            data_dir.join(CONFIG_FILE_NAME),
            user_data_dir.join(CONFIG_FILE_NAME),
        )
    }

    /// The read-only default layer; also the whitelist source.
    pub fn default_layer(&self) -> &Path {
        &self.default
    }

    /// The writable primary layer.
    pub fn data_layer(&self) -> &Path {
        &self.data
    }

    /// The per-user overlay.
    pub fn user_layer(&self) -> &Path {
        &self.user
    }

    /// All layers in merge order.
    pub fn paths(&self) -> [&Path; 3] {
        [&self.default, &self.data, &self.user]
    }
}

/// Decode `path` and apply its entries over `config`.
///
/// A file that does not exist leaves `config` untouched.
pub async fn read_file(path: &Path, config: &mut ConfigMap) -> Result<(), ConfigError> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Configuration layer absent");
            return Ok(());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let content = String::from_utf8_lossy(&content);
    config.extend(codec::logical_lines(&content).filter_map(|line| codec::decode_line(&line)));
    Ok(())
}

/// Read and merge `paths` in order. Fails fast on the first unreadable file.
pub async fn read_layers(paths: &[&Path]) -> Result<ConfigMap, ConfigError> {
    let mut config = ConfigMap::new();
    for path in paths {
        read_file(path, &mut config).await?;
    }
    Ok(config)
}

/// Replace `path` with one line per entry of `config`.
///
/// The content goes to a sibling temp file which is synced and renamed over
/// the target, so a failed write never leaves a truncated configuration.
pub async fn write_file(path: &Path, config: &ConfigMap) -> Result<(), ConfigError> {
    let write_err = |source: std::io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    let content: String = config
        .iter()
        .map(|(key, value)| codec::encode_line(key, value))
        .collect();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = temp_path_for(path);
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(write_err)?;
    file.write_all(content.as_bytes()).await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;
    drop(file);

    if let Err(source) = tokio::fs::rename(&tmp_path, path).await {
        tokio::fs::remove_file(&tmp_path).await.ok();
        return Err(write_err(source));
    }

    debug!(path = %path.display(), entries = config.len(), "Configuration layer written");
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| CONFIG_FILE_NAME.to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Read access to the merged view plus serialized updates of the data layer.
#[derive(Debug)]
pub struct ConfigStore {
    layers: ConfigLayers,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(layers: ConfigLayers) -> Self {
        Self {
            layers,
            write_lock: Mutex::new(()),
        }
    }

    pub fn layers(&self) -> &ConfigLayers {
        &self.layers
    }

    /// Merge all layers into one view.
    pub async fn read_merged(&self) -> Result<ConfigMap, ConfigError> {
        read_layers(&self.layers.paths()).await
    }

    /// Read the writable data layer alone.
    pub async fn read_data(&self) -> Result<ConfigMap, ConfigError> {
        read_layers(&[self.layers.data_layer()]).await
    }

    /// Take exclusive ownership of the data layer for a read-modify-write.
    ///
    /// Concurrent updates queue on this lock, so each one reads the
    /// baseline the previous one wrote.
    pub async fn lock_data(&self) -> DataLayerGuard<'_> {
        DataLayerGuard {
            _guard: self.write_lock.lock().await,
            path: self.layers.data_layer(),
        }
    }
}

/// Exclusive access to the data layer, released on drop.
pub struct DataLayerGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    path: &'a Path,
}

impl DataLayerGuard<'_> {
    pub fn path(&self) -> &Path {
        self.path
    }

    /// Read the current data layer.
    pub async fn read(&self) -> Result<ConfigMap, ConfigError> {
        read_layers(&[self.path]).await
    }

    /// Replace the data layer with `config`.
    pub async fn write(&self, config: &ConfigMap) -> Result<(), ConfigError> {
        write_file(self.path, config).await
    }
}
