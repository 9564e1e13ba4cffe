use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::DEFAULT_BASE_URL;
use crate::protocol::Mode;

// ── Profile ───────────────────────────────────────────────────────────────────

/// One backend target and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Backend base URL, e.g. "http://localhost:8080"
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Mode the session starts in
    #[serde(default)]
    pub mode: Mode,
    /// Seconds between health checks
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,
    /// Health checks slower than this count as unreachable
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
    /// Upper bound on a single task request before it is reported as failed
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_health_interval() -> u64 {
    5
}

fn default_health_timeout() -> u64 {
    3
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            mode: Mode::Agent,
            health_interval_secs: default_health_interval(),
            health_timeout_secs: default_health_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ── Config file ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Which profile to use when none is specified
    #[serde(default = "default_profile_name")]
    pub default_profile: String,

    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

fn default_profile_name() -> String {
    "local".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            default_profile: default_profile_name(),
            profiles: HashMap::new(),
        }
    }
}

impl ConfigFile {
    /// Load from disk, or return a default config if the file doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    /// Write a starter config file to disk (only if it doesn't exist).
    pub fn write_default_if_missing() -> Result<PathBuf> {
        let path = config_path();
        write_default_to(&path)?;
        Ok(path)
    }

    pub fn resolve_profile(&self, name: Option<&str>) -> Option<&Profile> {
        let key = name.unwrap_or(&self.default_profile);
        self.profiles.get(key)
    }
}

fn write_default_to(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("Failed to write {}", path.display()))
}

// ── Resolved runtime config (after merging file + CLI overrides) ──────────────

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub mode: Mode,
    pub health_interval: Duration,
    pub health_timeout: Duration,
    pub request_timeout: Duration,
    /// Profile name that was resolved (for display)
    pub profile_name: String,
}

impl ResolvedConfig {
    /// Priority: CLI args > env vars (handled by clap) > config file profile > built-in defaults
    pub fn resolve(
        file: &ConfigFile,
        profile_override: Option<&str>,
        base_url_override: Option<&str>,
        mode_override: Option<Mode>,
    ) -> Self {
        let profile_name = profile_override
            .unwrap_or(&file.default_profile)
            .to_string();

        let base = file
            .resolve_profile(profile_override)
            .cloned()
            .unwrap_or_default();

        Self {
            base_url: base_url_override
                .map(str::to_string)
                .unwrap_or(base.base_url),
            mode: mode_override.unwrap_or(base.mode),
            // A zero interval would make tokio's interval panic.
            health_interval: Duration::from_secs(base.health_interval_secs.max(1)),
            health_timeout: Duration::from_secs(base.health_timeout_secs.max(1)),
            request_timeout: Duration::from_secs(base.request_timeout_secs.max(1)),
            profile_name,
        }
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn config_path() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
        .join("deskpilot")
        .join("config.toml")
}

/// Directory for the log file.
pub fn state_dir() -> PathBuf {
    xdg_dir("XDG_STATE_HOME", ".local/state").join("deskpilot")
}

fn xdg_dir(var: &str, home_fallback: &str) -> PathBuf {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(home_fallback))
        })
        .unwrap_or_else(|| PathBuf::from("."))
}

// ── Default config template written on first run ──────────────────────────────

const DEFAULT_CONFIG_TOML: &str = r#"# deskpilot configuration
# Run `deskpilot --init` to regenerate this file.

default_profile = "local"

# ── Local backend (default) ───────────────────────────────────────────────────
[profiles.local]
base_url             = "http://localhost:8080"
mode                 = "agent"      # or "chatbot" (no execution at all)
health_interval_secs = 5
health_timeout_secs  = 3
request_timeout_secs = 120

# ── Backend on another machine ───────────────────────────────────────────────
# [profiles.lab]
# base_url = "http://192.168.1.20:8080"
# mode     = "chatbot"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_parses() {
        let file: ConfigFile = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(file.default_profile, "local");
        let local = file.resolve_profile(None).unwrap();
        assert_eq!(local.base_url, "http://localhost:8080");
        assert_eq!(local.mode, Mode::Agent);
        assert_eq!(local.health_interval_secs, 5);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::load_from(&dir.path().join("nope.toml")).unwrap();
        let resolved = ResolvedConfig::resolve(&file, None, None, None);
        assert_eq!(resolved.base_url, DEFAULT_BASE_URL);
        assert_eq!(resolved.mode, Mode::Agent);
        assert_eq!(resolved.request_timeout, Duration::from_secs(120));
        assert_eq!(resolved.profile_name, "local");
    }

    #[test]
    fn test_write_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deskpilot").join("config.toml");
        write_default_to(&path).unwrap();
        let file = ConfigFile::load_from(&path).unwrap();
        assert!(file.profiles.contains_key("local"));

        // Existing files are never overwritten.
        fs::write(&path, "default_profile = \"mine\"\n").unwrap();
        write_default_to(&path).unwrap();
        let file = ConfigFile::load_from(&path).unwrap();
        assert_eq!(file.default_profile, "mine");
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "profiles = 3").unwrap();
        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_overrides_win_over_profile() {
        let file: ConfigFile = toml::from_str(
            r#"
            default_profile = "lab"
            [profiles.lab]
            base_url = "http://lab:9000"
            mode = "chatbot"
            health_interval_secs = 0
            "#,
        )
        .unwrap();

        let resolved = ResolvedConfig::resolve(&file, None, None, None);
        assert_eq!(resolved.base_url, "http://lab:9000");
        assert_eq!(resolved.mode, Mode::Chatbot);
        assert_eq!(resolved.health_interval, Duration::from_secs(1));

        let resolved =
            ResolvedConfig::resolve(&file, None, Some("http://other:1"), Some(Mode::Agent));
        assert_eq!(resolved.base_url, "http://other:1");
        assert_eq!(resolved.mode, Mode::Agent);
    }

    #[test]
    fn test_unknown_profile_falls_back_to_defaults() {
        let file = ConfigFile::default();
        let resolved = ResolvedConfig::resolve(&file, Some("ghost"), None, None);
        assert_eq!(resolved.profile_name, "ghost");
        assert_eq!(resolved.base_url, DEFAULT_BASE_URL);
    }
}
