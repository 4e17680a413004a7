use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// User settings persisted as `prefs.toml` in the platform config dir.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
  pub theme: String,
  pub font_size: u16,
  /// Panel size in terminal cells. The panel is clamped to the terminal.
  pub panel_width: u16,
  pub panel_height: u16,
  /// Fetch the transcript as soon as a video is opened.
  pub auto_fetch: bool,
  pub api_key: Option<String>,
  /// Models to try, most capable first. Defaults to the built-in list.
  pub models: Option<Vec<String>>,
  /// API base such as `https://api.openai.com/v1`.
  pub api_base: Option<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      theme: "dark".to_string(),
      font_size: 14,
      panel_width: 100,
      panel_height: 40,
      auto_fetch: true,
      api_key: None,
      models: None,
      api_base: None,
    }
  }
}

impl Settings {
  pub fn path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ytx").map(|dirs| dirs.config_dir().join("prefs.toml"))
  }

  /// Load from the default location; missing or unreadable files give defaults.
  pub fn load() -> Self {
    Self::path().map(|p| Self::load_from(&p)).unwrap_or_default()
  }

  pub fn load_from(path: &Path) -> Self {
    let Ok(content) = std::fs::read_to_string(path) else {
      return Self::default();
    };
    match toml::from_str(&content) {
      Ok(settings) => settings,
      Err(e) => {
        warn!(path = %path.display(), err = %e, "config: ignoring malformed settings file");
        Self::default()
      }
    }
  }

  pub fn save_to(&self, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
      std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let content = toml::to_string(self).context("Failed to serialize settings")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
  }

  /// API key, treating an empty string as unset.
  pub fn api_key(&self) -> Option<&str> {
    self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
  }

  pub fn ai_enabled(&self) -> bool {
    self.api_key().is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(Settings::load_from(&dir.path().join("nope.toml")), Settings::default());
  }

  #[test]
  fn save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("prefs.toml");
    let settings = Settings {
      theme: "light".to_string(),
      api_key: Some("sk-abc".to_string()),
      models: Some(vec!["gpt-3.5-turbo".to_string()]),
      ..Settings::default()
    };
    settings.save_to(&path).unwrap();
    assert_eq!(Settings::load_from(&path), settings);
  }

  #[test]
  fn partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.toml");
    std::fs::write(&path, "theme = \"light\"\nauto_fetch = false\n").unwrap();
    let settings = Settings::load_from(&path);
    assert_eq!(settings.theme, "light");
    assert!(!settings.auto_fetch);
    assert_eq!(settings.font_size, 14);
  }

  #[test]
  fn malformed_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.toml");
    std::fs::write(&path, "theme = [").unwrap();
    assert_eq!(Settings::load_from(&path), Settings::default());
  }

  #[test]
  fn blank_api_key_disables_ai() {
    let settings = Settings { api_key: Some("   ".to_string()), ..Settings::default() };
    assert!(!settings.ai_enabled());
    assert_eq!(settings.api_key(), None);
  }
}
