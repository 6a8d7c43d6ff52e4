//! Configuration loading for webwx
//!
//! Provides utilities for loading configuration files from the shared
//! webwx config directory (~/.config/webwx/).

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Get the webwx config directory (~/.config/webwx/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("webwx"))
}

/// Get the path to a config file within the webwx config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Load and parse a JSON config file from the webwx config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a config file exists in the webwx config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir() {
        let dir = config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with("webwx"));
    }

    #[test]
    fn test_config_path() {
        let path = config_path("test.json");
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.ends_with("webwx/test.json"));
    }

    #[test]
    fn test_load_json_file() {
        #[derive(serde::Deserialize)]
        struct Sample {
            name: String,
            count: u32,
        }

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sample.json");
        std::fs::write(&path, r#"{"name": "a", "count": 3}"#).unwrap();

        let sample: Sample = load_json_file(&path).unwrap();
        assert_eq!(sample.name, "a");
        assert_eq!(sample.count, 3);

        let missing: Result<Sample> = load_json_file(&dir.path().join("absent.json"));
        assert!(missing.is_err());
    }
}
