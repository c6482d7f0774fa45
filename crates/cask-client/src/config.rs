use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// On-disk client configuration.
///
/// ```toml
/// root = "/var/lib/cask"
///
/// [log]
/// level = "info"
///
/// [remote]
/// registry = "/srv/registry"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Directory holding the content store and the image index.
    pub root: PathBuf,
    pub log: LogConfig,
    pub remote: RemoteConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".cask"),
            log: LogConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `tracing` filter, overridden by `RUST_LOG`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Directory of a store-backed registry used as the default remote.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<PathBuf>,
}

impl ClientConfig {
    /// Load a configuration file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|e| match e {
            ClientError::Config(msg) => ClientError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> ClientResult<Self> {
        toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> ClientResult<String> {
        toml::to_string_pretty(self).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Directory of the local content store.
    pub fn content_dir(&self) -> PathBuf {
        self.root.join("content")
    }

    /// Path of the image index document.
    pub fn images_path(&self) -> PathBuf {
        self.root.join("images.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ClientConfig::default();
        assert_eq!(c.root, PathBuf::from(".cask"));
        assert_eq!(c.log.level, "info");
        assert!(c.remote.registry.is_none());
        assert_eq!(c.content_dir(), PathBuf::from(".cask/content"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let c = ClientConfig::from_toml("root = \"/data\"\n[remote]\nregistry = \"/srv/reg\"\n").unwrap();
        assert_eq!(c.root, PathBuf::from("/data"));
        assert_eq!(c.remote.registry, Some(PathBuf::from("/srv/reg")));
        assert_eq!(c.log.level, "info");
    }

    #[test]
    fn load_from_file_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cask.toml");
        let mut c = ClientConfig::default();
        c.log.level = "debug".into();
        c.remote.registry = Some(dir.path().join("registry"));
        std::fs::write(&path, c.to_toml().unwrap()).unwrap();
        assert_eq!(ClientConfig::load(&path).unwrap(), c);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cask.toml");
        std::fs::write(&path, "root = [").unwrap();
        match ClientConfig::load(&path).unwrap_err() {
            ClientError::Config(msg) => assert!(msg.contains("cask.toml")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            ClientConfig::load(dir.path().join("absent.toml")).unwrap_err(),
            ClientError::Io(_)
        ));
    }
}
