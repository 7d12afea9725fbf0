use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub bugzilla: BugzillaConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Write logs to this file instead of stderr
  pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BugzillaConfig {
  pub url: Option<String>,
  pub user: Option<String>,
  /// Bugs requested per page
  pub max_bugs: Option<i64>,
  /// Origin reported in items (defaults to the URL)
  pub origin: Option<String>,
  /// HTTP request timeout in seconds
  pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Base directory for cache files
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./bzharvest.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/bzharvest/config.yaml
  ///
  /// Running without any config file is fine: every setting has a flag.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("bzharvest.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("bzharvest").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file parses as null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Get the Bugzilla API token from environment variables.
  ///
  /// Checks BZHARVEST_API_TOKEN first, then BUGZILLA_API_TOKEN as fallback.
  pub fn get_api_token() -> Option<String> {
    std::env::var("BZHARVEST_API_TOKEN")
      .or_else(|_| std::env::var("BUGZILLA_API_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }

  /// Get the Bugzilla password from environment variables.
  ///
  /// Checks BZHARVEST_PASSWORD.
  pub fn get_password() -> Option<String> {
    std::env::var("BZHARVEST_PASSWORD").ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_full_config() {
    let config = Config::from_yaml(
      r#"
bugzilla:
  url: https://bugzilla.example.org
  user: dev@example.org
  max_bugs: 200
  origin: example
  timeout_secs: 30
cache:
  path: /var/cache/bzharvest
log_file: /var/log/bzharvest.log
"#,
    )
    .unwrap();

    assert_eq!(
      config.bugzilla.url.as_deref(),
      Some("https://bugzilla.example.org")
    );
    assert_eq!(config.bugzilla.user.as_deref(), Some("dev@example.org"));
    assert_eq!(config.bugzilla.max_bugs, Some(200));
    assert_eq!(config.bugzilla.origin.as_deref(), Some("example"));
    assert_eq!(config.bugzilla.timeout_secs, Some(30));
    assert_eq!(
      config.cache.path,
      Some(PathBuf::from("/var/cache/bzharvest"))
    );
    assert_eq!(config.log_file, Some(PathBuf::from("/var/log/bzharvest.log")));
  }

  #[test]
  fn test_partial_and_empty_config() {
    let config = Config::from_yaml("bugzilla:\n  max_bugs: 5\n").unwrap();
    assert_eq!(config.bugzilla.max_bugs, Some(5));
    assert!(config.bugzilla.url.is_none());
    assert!(config.cache.path.is_none());

    let config = Config::from_yaml("").unwrap();
    assert!(config.bugzilla.url.is_none());
  }

  #[test]
  fn test_invalid_config() {
    assert!(Config::from_yaml("bugzilla: [1, 2]").is_err());
  }

  #[test]
  fn test_load_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bzharvest.yaml");
    std::fs::write(&path, "bugzilla:\n  url: https://bugs.example.com\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(
      config.bugzilla.url.as_deref(),
      Some("https://bugs.example.com")
    );
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(&dir.path().join("nope.yaml"))).is_err());
  }
}
