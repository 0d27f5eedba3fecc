use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SHELL: &str = "/bin/sh";
const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Settings shared by the store, the coordinator and the readers.
///
/// Built once and handed to [`JobStore::new`](crate::JobStore::new) or
/// [`JobCoordinator::spawn`](crate::JobCoordinator::spawn); nothing in the crate
/// reads ambient global state.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `jobs/` and `reports/`.
    pub root: PathBuf,
    /// Shell used as `<shell> -c <command>`.
    pub shell: PathBuf,
    /// How often log followers and foreign-job waiters re-check the store.
    pub poll_interval_ms: u64,
    /// Capacity of the coordinator's inbox.
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let root = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("jobctl");
        Self {
            root,
            shell: PathBuf::from(DEFAULT_SHELL),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    /// Defaults rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load a TOML config file. Keys left out keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("{}: {}", path.display(), err)))?;
        Self::parse(&text).map_err(|err| match err {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|err| Error::Config(err.to_string()))?;
        if config.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".into()));
        }
        if config.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be positive".into()));
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::parse("root = \"/srv/jobs\"\npoll_interval_ms = 50\n").unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/jobs"));
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.shell, PathBuf::from(DEFAULT_SHELL));
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn rejects_zero_interval() {
        let err = Config::parse("poll_interval_ms = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = Config::load(Path::new("/nonexistent/jobctl.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
