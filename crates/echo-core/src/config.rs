//! Engine configuration, loaded from `<home>/config.toml`.
//!
//! ```toml
//! cache_debounce_ms = 200
//! sync_interval_ms = 5000
//! latest_message_sentinel = "latest"
//! store_dir = "/path/to/variables"
//! cache_path = "/path/to/chats.db"
//!
//! [macros]
//! user = "Ann"
//! char = "Echo"
//! ```

use crate::macros::TemplateMacros;
use crate::store::DEFAULT_LATEST_SENTINEL;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::Deserialize;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.toml";
pub const HOME_ENV: &str = "ECHO_HOME";
pub const DEBOUNCE_ENV: &str = "ECHO_CACHE_DEBOUNCE_MS";

/// Resolve the engine home directory.
///
/// Precedence:
/// 1. `home_override`
/// 2. `ECHO_HOME` environment variable
/// 3. `~/.echo-chamber`
pub fn resolve_home(home_override: Option<PathBuf>) -> io::Result<PathBuf> {
    if let Some(path) = home_override {
        return Ok(path);
    }
    if let Ok(home) = std::env::var(HOME_ENV)
        && !home.trim().is_empty()
    {
        return Ok(PathBuf::from(home));
    }
    let home = dirs_next::home_dir()
        .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "Home directory not found"))?;
    Ok(home.join(".echo-chamber"))
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    /// Quiet period before a conversation edit is written to the cache.
    pub cache_debounce_ms: u64,
    /// Period for background resyncs; host events alone when unset.
    pub sync_interval_ms: Option<u64>,
    /// Message scope used when no message id resolves.
    pub latest_message_sentinel: String,
    pub macros: IndexMap<String, String>,
    pub store_dir: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            cache_debounce_ms: 200,
            sync_interval_ms: None,
            latest_message_sentinel: DEFAULT_LATEST_SENTINEL.to_string(),
            macros: IndexMap::new(),
            store_dir: None,
            cache_path: None,
        }
    }
}

impl EchoConfig {
    /// Load `<home>/config.toml`. A missing file yields defaults; so does a
    /// malformed one, after logging why.
    pub fn load(home: &Path) -> Self {
        let path = home.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                warn!("config parse error in {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                debug!("no config at {} ({}), using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Apply `ECHO_CACHE_DEBOUNCE_MS`, ignoring values that do not parse.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var(DEBOUNCE_ENV) {
            match raw.trim().parse() {
                Ok(ms) => self.cache_debounce_ms = ms,
                Err(e) => warn!("ignoring {}={:?}: {}", DEBOUNCE_ENV, raw, e),
            }
        }
    }

    pub fn cache_debounce(&self) -> Duration {
        Duration::from_millis(self.cache_debounce_ms)
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        self.sync_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn store_dir(&self, home: &Path) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(|| home.join("variables"))
    }

    pub fn cache_path(&self, home: &Path) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| home.join("chats.db"))
    }

    /// The configured macro table, or None when it is empty.
    pub fn macros(&self) -> Option<TemplateMacros> {
        let macros = TemplateMacros::new(self.macros.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        (!macros.is_empty()).then_some(macros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn missing_file_returns_defaults() {
        let cfg = EchoConfig::load(Path::new("/nonexistent/path"));
        assert_eq!(cfg, EchoConfig::default());
        assert_eq!(cfg.cache_debounce(), Duration::from_millis(200));
        assert_eq!(cfg.sync_interval(), None);
        assert!(cfg.macros().is_none());
    }

    #[test]
    fn parse_full_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
cache_debounce_ms = 50
sync_interval_ms = 1000
latest_message_sentinel = "newest"
cache_path = "/tmp/chats.db"

[macros]
User = "Ann"
"#,
        )
        .unwrap();
        let cfg = EchoConfig::load(dir.path());
        assert_eq!(cfg.cache_debounce_ms, 50);
        assert_eq!(cfg.sync_interval(), Some(Duration::from_secs(1)));
        assert_eq!(cfg.latest_message_sentinel, "newest");
        assert_eq!(cfg.cache_path(dir.path()), PathBuf::from("/tmp/chats.db"));
        assert_eq!(cfg.store_dir(dir.path()), dir.path().join("variables"));
        assert_eq!(cfg.macros().unwrap().expand("hi {{user}}"), "hi Ann");
    }

    #[test]
    fn malformed_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "cache_debounce_ms = [").unwrap();
        assert_eq!(EchoConfig::load(dir.path()), EchoConfig::default());
    }

    #[test]
    #[serial]
    fn env_overrides_debounce() {
        let mut cfg = EchoConfig::default();
        // SAFETY: serialized with the other env tests.
        unsafe { std::env::set_var(DEBOUNCE_ENV, "75") };
        cfg.apply_env_overrides();
        assert_eq!(cfg.cache_debounce_ms, 75);

        unsafe { std::env::set_var(DEBOUNCE_ENV, "soon") };
        cfg.apply_env_overrides();
        assert_eq!(cfg.cache_debounce_ms, 75);
        unsafe { std::env::remove_var(DEBOUNCE_ENV) };
    }

    #[test]
    #[serial]
    fn home_precedence() {
        let explicit = PathBuf::from("/explicit");
        assert_eq!(resolve_home(Some(explicit.clone())).unwrap(), explicit);

        unsafe { std::env::set_var(HOME_ENV, "/from/env") };
        assert_eq!(resolve_home(None).unwrap(), PathBuf::from("/from/env"));
        unsafe { std::env::remove_var(HOME_ENV) };

        if let Some(home) = dirs_next::home_dir() {
            assert_eq!(resolve_home(None).unwrap(), home.join(".echo-chamber"));
        }
    }
}
