use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::Author;
use crate::dates::DateWindow;
use crate::messages::{MessageTemplate, default_messages};
use crate::mutate::Mode;
use crate::scan::ScanSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Author>,
    #[serde(default)]
    pub window: DateWindow,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub generate: GenerateSettings,
    #[serde(default)]
    pub messages: Vec<MessageTemplate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateSettings {
    pub commits: usize,
    pub max_per_file: u32,
    pub mode: Mode,
    pub comments: Vec<String>,
}

impl Default for GenerateSettings {
    fn default() -> Self {
        Self {
            commits: 100,
            max_per_file: 5,
            mode: Mode::Simple,
            comments: default_comments(),
        }
    }
}

pub fn default_comments() -> Vec<String> {
    [
        "Guard against unexpected input before processing",
        "Keep this path cheap, it runs on every call",
        "Order matters here, see caller",
        "Reuse the existing buffer where possible",
        "Errors are surfaced to the caller unchanged",
        "Keep in sync with the defaults above",
        "Edge case: empty collections are valid",
        "Log enough context to debug failures",
        "Split out for readability",
        "Values are validated once at load time",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: None,
            window: DateWindow::default(),
            scan: ScanSettings::default(),
            generate: GenerateSettings::default(),
            messages: default_messages(),
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("git-backfill");

        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Loads `path`, writing a default config there first if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let default_config = Self::default();
            default_config.save_to(path)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            return Ok(default_config);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[identity]
name = "Dana"
email = "dana@example.com"

[window]
start = "2024-01-01"
end = "2024-02-01"

[generate]
mode = "rich"

[[messages]]
text = "Tune {stem}"
paths = ["core/"]
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.identity.unwrap().name, "Dana");
        assert_eq!(config.window.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(config.window.max_per_day, 5);
        assert_eq!(config.generate.mode, Mode::Rich);
        assert_eq!(config.generate.commits, 100);
        assert_eq!(config.scan, ScanSettings::default());
        assert_eq!(config.messages.len(), 1);
        assert_eq!(config.messages[0].paths, vec!["core/".to_string()]);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "window = 3").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }
}
