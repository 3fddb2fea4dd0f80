use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Worker configuration.
///
/// Everything the worker needs is carried here explicitly (version tag,
/// precache manifest, API patterns) so multiple isolated workers can exist
/// side by side in tests.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
  /// Deployment version tag embedded in every store name.
  pub version: String,
  /// Store name prefix, e.g. "helpdesk" yields "helpdesk-v4.0.0".
  #[serde(default = "default_cache_prefix")]
  pub cache_prefix: String,
  /// Application entry point; notification clicks focus or open this URL.
  pub app_url: Url,
  /// Precached fallback page served for failed navigations.
  pub offline_url: Url,
  /// First-party assets cached eagerly at install.
  pub precache_manifest: Vec<Url>,
  /// Substring patterns identifying ticket-API traffic (matched against the
  /// full request URL).
  pub api_patterns: Vec<String>,
  #[serde(default)]
  pub notifications: NotificationDefaults,
  /// Background-sync tag that triggers a shell refresh.
  #[serde(default = "default_sync_tag")]
  pub sync_tag: String,
}

fn default_cache_prefix() -> String {
  "helpdesk".to_string()
}

fn default_sync_tag() -> String {
  "sync-tickets".to_string()
}

/// Hard-coded notification identity, merged under whatever an inbound push
/// payload provides.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationDefaults {
  #[serde(default = "default_notification_title")]
  pub title: String,
  #[serde(default = "default_notification_body")]
  pub body: String,
  #[serde(default = "default_notification_icon")]
  pub icon: String,
  #[serde(default = "default_notification_badge")]
  pub badge: String,
  #[serde(default = "default_notification_tag")]
  pub tag: String,
}

impl Default for NotificationDefaults {
  fn default() -> Self {
    Self {
      title: default_notification_title(),
      body: default_notification_body(),
      icon: default_notification_icon(),
      badge: default_notification_badge(),
      tag: default_notification_tag(),
    }
  }
}

fn default_notification_title() -> String {
  "IT Support".to_string()
}

fn default_notification_body() -> String {
  "You have a new notification".to_string()
}

fn default_notification_icon() -> String {
  "/assets/icons/icon-192x192.png".to_string()
}

fn default_notification_badge() -> String {
  "/assets/icons/icon-72x72.png".to_string()
}

fn default_notification_tag() -> String {
  "helpdesk-notification".to_string()
}

impl WorkerConfig {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./helpdesk-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/helpdesk-sw/config.yaml
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
        "No configuration file found. Create one at ~/.config/helpdesk-sw/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("helpdesk-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("helpdesk-sw").join("config.yaml");
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

  /// Parse configuration from a YAML document.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: WorkerConfig =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Invalid configuration: {}", e))?;

    Ok(config)
  }
}
