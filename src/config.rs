use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub cache: CacheConfig,
  /// Base origin the manifest's relative URLs resolve against.
  pub origin: String,
  /// Custom location for the on-disk store (defaults under the user data dir).
  pub store_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Versioned store name, e.g. "game-shell-v5". A new deployment ships a
  /// new name; activation purges every other store.
  pub version: String,
  /// Relative URLs precached at install time, in order.
  pub manifest: Vec<String>,
  /// Fallback document served when neither cache nor network can answer.
  /// Must be one of the manifest entries.
  pub offline_shell: String,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offshell.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offshell/config.yaml
  /// 4. ~/.config/offshell/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/offshell/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offshell.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offshell").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    config.validate()?;
    Ok(config)
  }

  /// Check the invariants the controller relies on.
  pub fn validate(&self) -> Result<()> {
    if self.cache.version.trim().is_empty() {
      return Err(eyre!("cache.version must not be empty"));
    }
    if self.cache.manifest.is_empty() {
      return Err(eyre!("cache.manifest must list at least one asset"));
    }
    if !self.cache.manifest.contains(&self.cache.offline_shell) {
      return Err(eyre!(
        "cache.offline_shell {} must be one of the manifest entries",
        self.cache.offline_shell
      ));
    }
    self.origin_url()?;
    Ok(())
  }

  /// Parsed base origin.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))
  }
}
