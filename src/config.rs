use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE: &str = "(default)";
pub const DEFAULT_API_BASE: &str = "https://firestore.googleapis.com/v1/";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub firestore: FirestoreConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirestoreConfig {
  pub project_id: String,
  #[serde(default = "default_database")]
  pub database: String,
  /// REST endpoint root, overridable for the local emulator
  #[serde(default = "default_api_base")]
  pub api_base: String,
}

fn default_database() -> String {
  DEFAULT_DATABASE.to_string()
}

fn default_api_base() -> String {
  DEFAULT_API_BASE.to_string()
}

impl FirestoreConfig {
  /// Resource path `projects/{project}/databases/{database}`.
  pub fn database_path(&self) -> String {
    format!("projects/{}/databases/{}", self.project_id, self.database)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Persist the snapshot between runs
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// SQLite file (defaults to $XDG_DATA_HOME/flashsync/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Filter directive, overridden by RUST_LOG
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Log to this file instead of stderr
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./flashsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/flashsync/config.yaml
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
        "No configuration file found. Create one at ~/.config/flashsync/config.yaml\n\
                 with at least `firestore: {{ project_id: <your project> }}`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("flashsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("flashsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    if config.firestore.project_id.trim().is_empty() {
      return Err(eyre!("firestore.project_id must not be empty"));
    }
    Ok(config)
  }

  /// Get the signed-in user's ID token from environment variables.
  ///
  /// Checks FLASHSYNC_ID_TOKEN first, then FIREBASE_ID_TOKEN as fallback.
  /// Reads work without one if the database rules allow it.
  pub fn get_id_token() -> Option<String> {
    std::env::var("FLASHSYNC_ID_TOKEN")
      .or_else(|_| std::env::var("FIREBASE_ID_TOKEN"))
      .ok()
      .filter(|t| !t.trim().is_empty())
  }

  /// The ID token, required for anything that writes.
  pub fn require_admin_token() -> Result<String> {
    Self::get_id_token().ok_or_else(|| {
      eyre!(
        "Not signed in as an admin. Set FLASHSYNC_ID_TOKEN or FIREBASE_ID_TOKEN environment variable."
      )
    })
  }
}
