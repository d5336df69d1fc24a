//! Layered configuration.
//!
//! Values are merged, later layers winning, from:
//! 1. built-in defaults,
//! 2. a configuration file (TOML, YAML or JSON, chosen by extension),
//! 3. environment variables prefixed with [`ENV_PREFIX`], using `__` to
//!    separate nested keys (`DUET_SYNC__MODE=download`).

pub mod error;

use crate::error::{ErrorKind, Result};
use duet_storage::backend::LocalBackend;
use duet_storage::{Entry, Features};
use duet_sync::{DEFAULT_PROBE_CONCURRENCY, Mode, Reconciler};
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "DUET_";
#[cfg(feature = "s3")]
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Directory holding the local replica.
    pub root: PathBuf,
    #[serde(default = "LocalConfig::default_name")]
    pub name: String,
}

impl LocalConfig {
    fn default_name() -> String {
        "local".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteConfig {
    /// S3-compatible object store.
    S3 {
        name: String,
        /// Default container; used as home.
        #[serde(default)]
        bucket: Option<String>,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
        key_id: String,
        key_secret: String,
    },
    /// Another directory tree, with one subdirectory per container.
    Local {
        name: String,
        root: PathBuf,
        #[serde(default)]
        bucket: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "SyncConfig::default_probe_concurrency")]
    pub probe_concurrency: usize,
}

impl SyncConfig {
    fn default_probe_concurrency() -> usize {
        DEFAULT_PROBE_CONCURRENCY
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            probe_concurrency: Self::default_probe_concurrency(),
        }
    }
}

/// Both sides of a configured replica pair.
#[derive(Debug, Clone)]
pub struct Session {
    pub local: Features,
    pub remote: Features,
    /// Remote container the local root corresponds to.
    pub home: Entry,
}

/// `<config dir>/duet/config.toml` for the current platform.
pub fn default_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "duet").ok_or_raise(|| ErrorKind::Load)?;
    Ok(dirs.config_dir().join("config.toml"))
}

/// Load and validate the configuration from `path`, or from
/// [`default_path()`]. A missing file is not an error on its own.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_path()?,
    };
    tracing::debug!(path = %path.display(), "Loading configuration");
    let figment = Figment::new().merge(Serialized::default("sync", SyncConfig::default()));
    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => figment.merge(Yaml::file(&path)),
        Some("json") => figment.merge(Json::file(&path)),
        _ => figment.merge(Toml::file(&path)),
    };
    let config: Config = figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Load)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.local.root.is_absolute() {
            exn::bail!(ErrorKind::Invalid("local.root must be an absolute path".to_string()));
        }
        if self.sync.probe_concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("sync.probe_concurrency must be greater than zero".to_string()));
        }
        match &self.remote {
            RemoteConfig::S3 { key_id, key_secret, .. } if key_id.is_empty() || key_secret.is_empty() => {
                exn::bail!(ErrorKind::Invalid("remote credentials must not be empty".to_string()));
            },
            RemoteConfig::Local { root, .. } if !root.is_absolute() => {
                exn::bail!(ErrorKind::Invalid("remote.root must be an absolute path".to_string()));
            },
            _ => Ok(()),
        }
    }

    /// A reconciler in the configured mode.
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.sync.mode)
    }

    /// Set up both sides: the remote first, then the local replica anchored
    /// at the remote home.
    pub async fn connect(&self) -> Result<Session> {
        let remote = self.remote.connect().await?;
        let home = remote.home.home(self.remote.bucket()).await.or_raise(|| ErrorKind::Connect)?;
        let local = self.local.connect(&home)?;
        tracing::info!(local = local.name(), remote = remote.name(), home = %home.path().display(), "Connected");
        Ok(Session { local, remote, home })
    }
}

impl LocalConfig {
    /// Features of the local replica, with `home` mapped onto the root.
    pub fn connect(&self, home: &Entry) -> Result<Features> {
        let backend = LocalBackend::new(&self.name, &self.root)
            .and_then(|backend| backend.with_anchor(home.path()))
            .or_raise(|| ErrorKind::Connect)?;
        Ok(Features::local(backend))
    }
}

impl RemoteConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::S3 { name, .. } | Self::Local { name, .. } => name,
        }
    }

    /// Container configured explicitly, if any.
    pub fn bucket(&self) -> Option<&str> {
        match self {
            Self::S3 { bucket, .. } | Self::Local { bucket, .. } => bucket.as_deref(),
        }
    }

    pub async fn connect(&self) -> Result<Features> {
        match self {
            #[cfg(feature = "s3")]
            Self::S3 {
                name,
                bucket,
                region,
                endpoint,
                key_id,
                key_secret,
            } => {
                let store = duet_storage::backend::S3Store::new(
                    name,
                    bucket.clone(),
                    region.as_deref().unwrap_or(DEFAULT_REGION),
                    endpoint.as_deref(),
                    key_id,
                    key_secret,
                )
                .await
                .or_raise(|| ErrorKind::Connect)?;
                Ok(Features::object_store(std::sync::Arc::new(store)))
            },
            #[cfg(not(feature = "s3"))]
            Self::S3 { .. } => exn::bail!(ErrorKind::Invalid("built without S3 support".to_string())),
            Self::Local { name, root, .. } => {
                let backend = LocalBackend::new(name, root).or_raise(|| ErrorKind::Connect)?;
                Ok(Features::local(backend))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    const TOML: &str = r#"
        [local]
        root = "/srv/duet"

        [remote]
        type = "s3"
        name = "b2"
        bucket = "photos"
        region = "us-west-004"
        endpoint = "https://s3.us-west-004.backblazeb2.com"
        key_id = "id"
        key_secret = "secret"
    "#;

    #[test]
    fn test_load_toml_with_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("duet.toml", TOML)?;
            let config = load(Some(Path::new("duet.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.local.root, PathBuf::from("/srv/duet"));
            assert_eq!(config.local.name, "local");
            assert_eq!(config.remote.name(), "b2");
            assert_eq!(config.remote.bucket(), Some("photos"));
            assert_eq!(config.sync, SyncConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("duet.toml", TOML)?;
            jail.set_env("DUET_SYNC__MODE", "download");
            jail.set_env("DUET_SYNC__PROBE_CONCURRENCY", "4");
            jail.set_env("DUET_REMOTE__BUCKET", "archive");
            let config = load(Some(Path::new("duet.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.sync.mode, Mode::Download);
            assert_eq!(config.sync.probe_concurrency, 4);
            assert_eq!(config.remote.bucket(), Some("archive"));
            Ok(())
        });
    }

    #[test]
    fn test_load_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "duet.yaml",
                "local:\n  root: /srv/duet\nremote:\n  type: local\n  name: nas\n  root: /mnt/nas\nsync:\n  mode: upload\n",
            )?;
            let config = load(Some(Path::new("duet.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.sync.mode, Mode::Upload);
            assert!(matches!(config.remote, RemoteConfig::Local { .. }));
            Ok(())
        });
    }

    #[rstest]
    #[case("DUET_LOCAL__ROOT", "relative/path")]
    #[case("DUET_SYNC__PROBE_CONCURRENCY", "0")]
    #[case("DUET_REMOTE__TYPE", "local")]
    fn test_invalid(#[case] key: &str, #[case] value: &str) {
        Jail::expect_with(|jail| {
            jail.create_file("duet.toml", TOML)?;
            jail.set_env(key, value);
            jail.set_env("DUET_REMOTE__ROOT", "mnt/nas");
            let err = load(Some(Path::new("duet.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn test_empty_credentials() {
        Jail::expect_with(|jail| {
            jail.create_file("duet.toml", &TOML.replace(r#"key_secret = "secret""#, r#"key_secret = """#))?;
            let err = load(Some(Path::new("duet.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(reason) if reason.contains("credentials")));
            Ok(())
        });
    }

    #[test]
    fn test_missing_required_field() {
        Jail::expect_with(|jail| {
            jail.create_file("duet.toml", "[local]\nroot = \"/srv/duet\"\n")?;
            let err = load(Some(Path::new("duet.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load));
            Ok(())
        });
    }

    fn local_pair(local: &tempfile::TempDir, remote: &tempfile::TempDir, bucket: Option<&str>) -> Config {
        Config {
            local: LocalConfig {
                root: local.path().to_path_buf(),
                name: "laptop".to_string(),
            },
            remote: RemoteConfig::Local {
                name: "nas".to_string(),
                root: remote.path().to_path_buf(),
                bucket: bucket.map(str::to_string),
            },
            sync: SyncConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_connect_local_pair() {
        let (local, remote) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        std::fs::create_dir(remote.path().join("photos")).unwrap();
        std::fs::write(remote.path().join("photos/beach.jpg"), b"jpeg").unwrap();
        let config = local_pair(&local, &remote, Some("photos"));
        config.validate().unwrap();
        let session = config.connect().await.unwrap();
        assert_eq!(session.home, Entry::volume("photos").unwrap());
        assert_eq!(session.local.name(), "laptop");

        let reconciler = config.reconciler();
        let prompted = duet_sync::reconcile(
            &reconciler,
            &session.local,
            &session.remote,
            &session.home,
            config.sync.probe_concurrency,
        )
        .await
        .unwrap();
        assert_eq!(prompted, 1);
        assert_eq!(reconciler.work_list().await[0].path(), Path::new("photos/beach.jpg"));
    }

    #[tokio::test]
    async fn test_connect_without_home() {
        let (local, remote) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        let err = local_pair(&local, &remote, None).connect().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Connect));
    }
}
