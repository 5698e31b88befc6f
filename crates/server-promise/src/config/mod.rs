use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::cache::Cache;
use crate::error::ServerPromiseError;

/// Which side of the render a provider is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Trigger producing operations and suspend until they settle.
    Server,
    /// Replay cached values, warning when one is missing.
    Client,
    /// Both flags set: warn on a miss and still trigger the operation.
    Hybrid,
    /// Neither flag: return whatever is cached, silently.
    #[default]
    CacheOnly,
}

impl Mode {
    pub fn from_flags(server: bool, client: bool) -> Self {
        match (server, client) {
            (true, true) => Mode::Hybrid,
            (true, false) => Mode::Server,
            (false, true) => Mode::Client,
            (false, false) => Mode::CacheOnly,
        }
    }

    pub fn server(self) -> bool {
        matches!(self, Mode::Server | Mode::Hybrid)
    }

    pub fn client(self) -> bool {
        matches!(self, Mode::Client | Mode::Hybrid)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Server => write!(f, "server"),
            Mode::Client => write!(f, "client"),
            Mode::Hybrid => write!(f, "hybrid"),
            Mode::CacheOnly => write!(f, "cache-only"),
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "server" | "ssr" => Ok(Mode::Server),
            "client" | "hydrate" => Ok(Mode::Client),
            "hybrid" => Ok(Mode::Hybrid),
            "cache" | "cache-only" | "passthrough" => Ok(Mode::CacheOnly),
            _ => Err(ConfigError::InvalidMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mode: Mode,
    pub snapshot_path: Option<PathBuf>,
    #[serde(default = "default_warn_on_miss")]
    pub warn_on_miss: bool,
}

fn default_warn_on_miss() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self { mode: Mode::default(), snapshot_path: None, warn_on_miss: true }
    }
}

impl Config {
    pub fn new(mode: Mode) -> Self {
        Self { mode, ..Self::default() }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mode_str) = lookup("SERVER_PROMISE_MODE") {
            config.mode = mode_str.parse()?;
        }

        if let Some(path) = lookup("SERVER_PROMISE_SNAPSHOT")
            && !path.is_empty()
        {
            config.snapshot_path = Some(PathBuf::from(path));
        }

        if let Some(warn_str) = lookup("SERVER_PROMISE_WARN_ON_MISS") {
            config.warn_on_miss = parse_bool("SERVER_PROMISE_WARN_ON_MISS", &warn_str)?;
        }

        Ok(config)
    }

    /// Load the configured snapshot, or an empty cache when none is set.
    pub fn load_snapshot(&self) -> Result<Cache, ServerPromiseError> {
        match &self.snapshot_path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                Cache::parse(&contents)
            }
            None => Ok(Cache::new()),
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(name.to_string(), value.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;
    use serde_json::json;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: FxHashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.mode, Mode::CacheOnly);
        assert!(config.snapshot_path.is_none());
        assert!(config.warn_on_miss);
    }

    #[test]
    fn test_mode_from_env() {
        let config = Config::from_lookup(lookup_from(&[("SERVER_PROMISE_MODE", "SSR")])).unwrap();
        assert_eq!(config.mode, Mode::Server);

        let config =
            Config::from_lookup(lookup_from(&[("SERVER_PROMISE_MODE", "hydrate")])).unwrap();
        assert_eq!(config.mode, Mode::Client);
    }

    #[test]
    fn test_invalid_mode() {
        let err = Config::from_lookup(lookup_from(&[("SERVER_PROMISE_MODE", "browser")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidMode("browser".to_string()));
    }

    #[test]
    fn test_warn_on_miss_flag() {
        let config =
            Config::from_lookup(lookup_from(&[("SERVER_PROMISE_WARN_ON_MISS", "no")])).unwrap();
        assert!(!config.warn_on_miss);

        let err = Config::from_lookup(lookup_from(&[("SERVER_PROMISE_WARN_ON_MISS", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_, _)));
    }

    #[test]
    fn test_mode_flags() {
        assert_eq!(Mode::from_flags(true, false), Mode::Server);
        assert_eq!(Mode::from_flags(false, true), Mode::Client);
        assert_eq!(Mode::from_flags(true, true), Mode::Hybrid);
        assert_eq!(Mode::from_flags(false, false), Mode::CacheOnly);
        assert!(Mode::Hybrid.server() && Mode::Hybrid.client());
        assert!(!Mode::CacheOnly.server() && !Mode::CacheOnly.client());
    }

    #[test]
    fn test_mode_display_parses_back() {
        for mode in [Mode::Server, Mode::Client, Mode::Hybrid, Mode::CacheOnly] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_mode_serializes_like_display() {
        for mode in [Mode::Server, Mode::Client, Mode::Hybrid, Mode::CacheOnly] {
            assert_eq!(serde_json::to_value(mode).unwrap(), json!(mode.to_string()));
        }
    }

    #[test]
    fn test_config_from_json_defaults_warning() {
        let config: Config =
            serde_json::from_value(json!({"mode": "cache-only", "snapshot_path": "cache.json"}))
                .unwrap();

        assert_eq!(config.mode, Mode::CacheOnly);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("cache.json")));
        assert!(config.warn_on_miss);

        assert!(serde_json::from_value::<Config>(json!({"mode": "CacheOnly"})).is_err());
    }

    #[test]
    fn test_load_snapshot_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[["a",1],["b","two"]]"#).unwrap();

        let config = Config {
            snapshot_path: Some(file.path().to_path_buf()),
            ..Config::new(Mode::Client)
        };
        let cache = config.load_snapshot().unwrap();

        assert_eq!(cache.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_load_snapshot_missing_file() {
        let config = Config {
            snapshot_path: Some(PathBuf::from("/nonexistent/server-promise/snapshot.json")),
            ..Config::default()
        };

        assert!(matches!(config.load_snapshot(), Err(ServerPromiseError::Io(_))));
    }

    #[test]
    fn test_load_snapshot_without_path_is_empty() {
        assert!(Config::default().load_snapshot().unwrap().is_empty());
    }
}
