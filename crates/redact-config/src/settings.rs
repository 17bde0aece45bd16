use std::path::{Path, PathBuf};

use redact_core::{RedactError, Result, DEFAULT_MMAP_THRESHOLD};
use serde::{Deserialize, Serialize};

/// What to do when a run leaves bytes it was asked to redact untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnderRedactionPolicy {
    /// Log the dropped intervals and skipped runs, report them in the audit.
    #[default]
    Warn,
    /// Fail the run once the walk is over.
    Fail,
}

/// User settings for redact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_mmap_threshold")]
    pub mmap_threshold: u64,

    #[serde(default)]
    pub under_redaction: UnderRedactionPolicy,

    /// Hash the finished output image into the audit.
    #[serde(default)]
    pub verify_output_digest: bool,

    #[serde(default)]
    pub ignore: IgnoreSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IgnoreSettings {
    /// Appended to the IGNORE lines of every rule file.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mmap_threshold: default_mmap_threshold(),
            under_redaction: UnderRedactionPolicy::default(),
            verify_output_digest: false,
            ignore: IgnoreSettings::default(),
        }
    }
}

fn default_mmap_threshold() -> u64 {
    DEFAULT_MMAP_THRESHOLD
}

impl Settings {
    /// Load settings from default location or create default if not found
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            // Create default settings file
            let settings = Settings::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(&settings)?;
            std::fs::write(&path, content)?;
            Ok(settings)
        }
    }

    /// Load settings from an explicit file. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RedactError::config(format!("cannot read settings {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            RedactError::config(format!("invalid settings {}: {}", path.display(), e))
        })
    }

    /// Get settings file path
    pub fn config_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("org", "redact", "redact") {
            dirs.config_dir().join("settings.toml")
        } else {
            PathBuf::from("~/.redact/settings.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.mmap_threshold, 128 * 1024 * 1024);
        assert_eq!(settings.under_redaction, UnderRedactionPolicy::Warn);
        assert!(!settings.verify_output_digest);
        assert!(settings.ignore.patterns.is_empty());
    }

    #[test]
    fn test_settings_serialization() {
        let settings = Settings {
            under_redaction: UnderRedactionPolicy::Fail,
            ..Settings::default()
        };
        let toml_str = toml::to_string(&settings).unwrap();
        assert!(toml_str.contains("under_redaction = \"fail\""));
        let parsed: Settings = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.under_redaction, UnderRedactionPolicy::Fail);
        assert_eq!(parsed.mmap_threshold, settings.mmap_threshold);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Settings = toml::from_str("[ignore]\npatterns = [\"*.tmp\"]\n").unwrap();
        assert_eq!(parsed.ignore.patterns, vec!["*.tmp".to_string()]);
        assert_eq!(parsed.mmap_threshold, DEFAULT_MMAP_THRESHOLD);
    }

    #[test]
    fn test_load_from_rejects_bad_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "under_redaction = \"ignore\"\n").unwrap();
        let err = Settings::load_from(&path).unwrap_err();
        assert_eq!(err.kind(), redact_core::ErrorKind::Configuration);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = Settings::load_from(Path::new("/nonexistent/settings.toml")).unwrap_err();
        assert_eq!(err.kind(), redact_core::ErrorKind::Configuration);
    }
}
