use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use strata_core::{StoreError, StoreResult};

const DEFAULT_CONFIG_NAME: &str = "strata.json";
const DEFAULT_DB_NAME: &str = "strata.sqlite";
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 1_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
}

impl DatabaseConfig {
    /// Picks the dialect from the connection string prefix.
    pub fn from_url(url: &str) -> StoreResult<Self> {
        let lowered = url.to_ascii_lowercase();
        if lowered.starts_with("postgres://") || lowered.starts_with("postgresql://") {
            return Ok(DatabaseConfig::Postgres {
                url: url.to_string(),
            });
        }
        if let Some(rest) = url.strip_prefix("sqlite:") {
            let path = rest.trim_start_matches("//");
            let path = path.split('?').next().unwrap_or_default();
            return Ok(DatabaseConfig::Sqlite {
                path: (!path.is_empty()).then(|| path.to_string()),
            });
        }
        Err(StoreError::invalid(format!(
            "cannot detect database backend from '{url}'"
        )))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    pub size: Option<usize>,
    pub retries: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
    pub client_encoding: Option<String>,
}

impl StoreConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
            client_encoding: None,
        }
    }

    pub fn from_url(url: &str) -> StoreResult<Self> {
        Ok(Self {
            database: DatabaseConfig::from_url(url)?,
            pool: None,
            client_encoding: None,
        })
    }

    /// Config for a datastore directory. A URL override wins and leaves
    /// `strata.json` untouched; otherwise the file is read, or created with a
    /// sqlite database inside the directory.
    pub fn for_datastore(base_dir: &Path, url: Option<&str>) -> StoreResult<Self> {
        match url {
            Some(url) => {
                fs::create_dir_all(base_dir)
                    .map_err(|err| StoreError::storage(format!("create datastore dir: {err}")))?;
                Self::from_url(url)
            }
            None => Self::load_or_init(base_dir, &base_dir.join(DEFAULT_DB_NAME)),
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> StoreResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| StoreError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| StoreError::storage(format!("read config: {err}")))?;
            let config: StoreConfig =
                serde_json::from_str(&raw).map_err(|err| StoreError::invalid(err.to_string()))?;
            return Ok(config);
        }
        let default = StoreConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| StoreError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| StoreError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> StoreResult<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(StoreError::invalid("config is not sqlite backend")),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.database {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
        }
    }

    pub fn connection_url(&self, base_dir: &Path) -> StoreResult<String> {
        match &self.database {
            DatabaseConfig::Sqlite { .. } => {
                let path = self.sqlite_path(base_dir)?;
                Ok(format!("sqlite://{}?mode=rwc", path.display()))
            }
            DatabaseConfig::Postgres { url } => Ok(url.clone()),
        }
    }

    pub fn pool_size(&self) -> usize {
        let default = match self.database {
            DatabaseConfig::Sqlite { .. } => 1,
            DatabaseConfig::Postgres { .. } => 5,
        };
        self.pool
            .as_ref()
            .and_then(|pool| pool.size)
            .filter(|size| *size > 0)
            .unwrap_or(default)
    }

    pub fn retries(&self) -> u32 {
        self.pool
            .as_ref()
            .and_then(|pool| pool.retries)
            .unwrap_or(DEFAULT_RETRIES)
    }

    pub fn backoff(&self) -> Duration {
        let millis = self
            .pool
            .as_ref()
            .and_then(|pool| pool.backoff_ms)
            .unwrap_or(DEFAULT_BACKOFF_MS);
        Duration::from_millis(millis)
    }

    /// The encoding, checked so it can be spliced into `SET CLIENT_ENCODING`.
    pub fn validated_client_encoding(&self) -> StoreResult<Option<&str>> {
        let Some(encoding) = self.client_encoding.as_deref() else {
            return Ok(None);
        };
        let valid = !encoding.is_empty()
            && encoding
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if valid {
            Ok(Some(encoding))
        } else {
            Err(StoreError::invalid(format!(
                "invalid client encoding '{encoding}'"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_CONFIG_NAME, DEFAULT_DB_NAME, DatabaseConfig, StoreConfig};
    use std::path::Path;

    #[test]
    fn detects_backend_from_url() {
        let pg = DatabaseConfig::from_url("postgres://127.0.0.1:5433/strata").expect("pg");
        assert!(matches!(pg, DatabaseConfig::Postgres { .. }));
        let pg = DatabaseConfig::from_url("postgresql://localhost/db").expect("pg");
        assert!(matches!(pg, DatabaseConfig::Postgres { .. }));
        let sqlite = DatabaseConfig::from_url("sqlite:///tmp/data.sqlite?mode=rwc").expect("lite");
        match sqlite {
            DatabaseConfig::Sqlite { path } => assert_eq!(path.as_deref(), Some("/tmp/data.sqlite")),
            _ => panic!("expected sqlite"),
        }
        assert!(DatabaseConfig::from_url("mysql://localhost/db").is_err());
    }

    #[test]
    fn pool_defaults_follow_backend() {
        let sqlite = StoreConfig::default_sqlite("data.sqlite");
        assert_eq!(sqlite.pool_size(), 1);
        assert_eq!(sqlite.retries(), 3);
        let pg = StoreConfig::from_url("postgres://localhost/db").expect("pg");
        assert_eq!(pg.pool_size(), 5);
        assert_eq!(pg.backoff().as_millis(), 1_000);
    }

    #[test]
    fn sqlite_url_is_relative_to_base() {
        let config = StoreConfig::default_sqlite("data.sqlite");
        let url = config.connection_url(Path::new("/srv/strata")).expect("url");
        assert_eq!(url, "sqlite:///srv/strata/data.sqlite?mode=rwc");
    }

    #[test]
    fn url_override_skips_the_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("store");
        let config = StoreConfig::for_datastore(&base, Some("postgres://localhost/strata"))
            .expect("override");
        assert_eq!(config.backend_name(), "postgres");
        assert!(base.is_dir());
        assert!(!base.join(DEFAULT_CONFIG_NAME).exists());

        let config = StoreConfig::for_datastore(&base, None).expect("file");
        assert_eq!(config.backend_name(), "sqlite");
        assert!(base.join(DEFAULT_CONFIG_NAME).exists());
        assert_eq!(
            config.sqlite_path(&base).expect("path"),
            base.join(DEFAULT_DB_NAME)
        );
    }

    #[test]
    fn client_encoding_is_validated() {
        let mut config = StoreConfig::from_url("postgres://localhost/db").expect("pg");
        config.client_encoding = Some("UTF8".to_string());
        assert_eq!(config.validated_client_encoding().expect("utf8"), Some("UTF8"));
        config.client_encoding = Some("UTF8'; DROP TABLE object; --".to_string());
        assert!(config.validated_client_encoding().is_err());
    }
}
