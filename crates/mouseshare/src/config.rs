//! TOML configuration.
//!
//! Read from the platform config directory:
//! - Windows:  `%APPDATA%\MouseShare\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/mouseshare/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/MouseShare/config.toml`
//!
//! A missing file yields defaults; CLI flags override config values. Nothing
//! is written back.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mouseshare_core::{ScreenEdge, DEFAULT_DISCOVERY_PORT, DEFAULT_PORT};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema ─────────────────────────────────────────────────────────────

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
}

/// General behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Name advertised in discovery announces; defaults to the hostname.
    #[serde(default)]
    pub name: Option<String>,
    /// `tracing` log level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Network port settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// TCP port sessions are served on / connected to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// UDP port for discovery broadcasts.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
}

/// Controller-role settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerConfig {
    /// The edge targets sit behind: `left`, `right`, `top`, or `bottom`.
    #[serde(default = "default_edge")]
    pub edge: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
fn default_edge() -> String {
    "right".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: None,
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            discovery_port: default_discovery_port(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            edge: default_edge(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when no base directory can
/// be derived from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the configuration, returning defaults when no file exists.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found" and [`ConfigError::Parse`] for malformed TOML.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = match config_file_path() {
        Ok(p) => p,
        Err(_) => return Ok(AppConfig::default()),
    };
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MouseShare"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|p| PathBuf::from(p).join("Library/Application Support/MouseShare"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|p| PathBuf::from(p).join(".config")))
            .map(|base| base.join("mouseshare"))
    }
}

// ── Helpers shared with the CLI ───────────────────────────────────────────────

/// Parses an edge name as used in the config file and on the command line.
pub fn parse_edge(name: &str) -> Option<ScreenEdge> {
    match name.to_ascii_lowercase().as_str() {
        "left" => Some(ScreenEdge::Left),
        "right" => Some(ScreenEdge::Right),
        "top" => Some(ScreenEdge::Top),
        "bottom" => Some(ScreenEdge::Bottom),
        _ => None,
    }
}

/// The machine's hostname, used as the default advertised name.
///
/// Tries `COMPUTERNAME` (Windows) then `HOSTNAME` (Unix), falling back to a
/// fixed literal so discovery still has a key.
pub fn hostname() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "mouseshare-host".to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
