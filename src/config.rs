//! Configuration for steward paths and defaults.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (STEWARD_HOME)
//! 2. Config file (.steward/config.yaml)
//! 3. Defaults (~/.steward)
//!
//! Config file discovery:
//! - Searches current directory and parents for .steward/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub defaults: Option<DefaultsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to config file)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    pub max_retries: Option<u32>,
    pub stage_timeout_seconds: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to steward home (engine state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Plan-level defaults
    pub defaults: DefaultSettings,
}

#[derive(Debug, Clone)]
pub struct DefaultSettings {
    pub max_retries: u32,
    pub stage_timeout_seconds: u64,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            stage_timeout_seconds: 300,
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".steward").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".steward");

    let config_file = find_config_file();

    let (home, defaults) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        let home = if let Ok(env_home) = std::env::var("STEWARD_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            // home is relative to the .steward/ directory
            let steward_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(steward_dir, home_path)
        } else {
            default_home.clone()
        };

        let defaults = DefaultSettings {
            max_retries: config
                .defaults
                .as_ref()
                .and_then(|d| d.max_retries)
                .unwrap_or(2),
            stage_timeout_seconds: config
                .defaults
                .as_ref()
                .and_then(|d| d.stage_timeout_seconds)
                .unwrap_or(300),
        };

        (home, defaults)
    } else {
        let home = std::env::var("STEWARD_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home.clone());

        (home, DefaultSettings::default())
    };

    Ok(ResolvedConfig {
        home,
        config_file,
        defaults,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the steward home directory (engine state)
pub fn steward_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the runs directory ($STEWARD_HOME/runs)
pub fn runs_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("runs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let steward_dir = temp.path().join(".steward");
        std::fs::create_dir_all(&steward_dir).unwrap();

        let config_path = steward_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./
defaults:
  max_retries: 3
  stage_timeout_seconds: 60
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.home, Some("./".to_string()));

        let defaults = config.defaults.unwrap();
        assert_eq!(defaults.max_retries, Some(3));
        assert_eq!(defaults.stage_timeout_seconds, Some(60));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }

    #[test]
    fn test_default_settings() {
        let defaults = DefaultSettings::default();
        assert_eq!(defaults.max_retries, 2);
        assert_eq!(defaults.stage_timeout_seconds, 300);
    }
}
