use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::Config;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl Config {
    /// Returns the path to the configuration file.
    ///
    /// Uses `~/.config/toolmux/config.toml` on Unix/macOS, or the platform
    /// equivalent via `dirs::config_dir()`. Falls back to the current
    /// directory if config_dir is unavailable.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("toolmux").join("config.toml")
    }

    /// Loads configuration from the default config file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from `path`.
    ///
    /// - If the file doesn't exist, returns `Config::default()`.
    /// - If the file exists, parses it as TOML and validates.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config = Self::parse(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - At least one tool is configured, and tool ids are unique
    /// - Every ready pattern and strip pattern compiles
    /// - The buffer capacity is non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tools.is_empty() {
            return Err(validation("At least one tool must be configured"));
        }
        if self.defaults.buffer_capacity == 0 {
            return Err(validation("buffer_capacity must be greater than zero"));
        }

        let mut seen = HashSet::new();
        for tool in &self.tools {
            if tool.id.trim().is_empty() {
                return Err(validation("Tool id must not be empty"));
            }
            if !seen.insert(tool.id.as_str()) {
                return Err(validation(&format!("Duplicate tool id '{}'", tool.id)));
            }
            if tool.command.trim().is_empty() {
                return Err(validation(&format!("Tool '{}' has no command", tool.id)));
            }
            // Compiled the same way the adapter matches it: over raw bytes.
            if let Some(pattern) = &tool.ready_pattern {
                BytesRegex::new(pattern).map_err(|e| {
                    validation(&format!("Tool '{}' has an invalid ready_pattern: {e}", tool.id))
                })?;
            }
            for pattern in &tool.strip_lines {
                Regex::new(pattern).map_err(|e| {
                    validation(&format!("Tool '{}' has an invalid strip_lines entry: {e}", tool.id))
                })?;
            }
        }

        Ok(())
    }
}

fn validation(message: &str) -> ConfigError {
    ConfigError::ValidationError {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_file_yields_builtin_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.tool("claude").is_some());
        assert_eq!(config.defaults.double_escape_window_ms, 500);
    }

    #[test]
    fn parses_tools_and_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[defaults]
buffer_capacity = 4096

[[tools]]
id = "shell"
display_name = "Shell"
command = "/bin/sh"
args = ["-i"]
ready_pattern = '\$ $'

[tools.env]
PS1 = "$ "
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.defaults.buffer_capacity, 4096);
        assert_eq!(config.defaults.typing_delay_ms, 8);
        assert_eq!(config.tools.len(), 1);
        let shell = config.tool("shell").unwrap();
        assert_eq!(shell.args, vec!["-i"]);
        assert_eq!(shell.idle_timeout_ms, 2000);
        assert_eq!(shell.env.get("PS1").map(String::as_str), Some("$ "));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut config = Config::default();
        let first = config.tools[0].clone();
        config.tools.push(first);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn rejects_invalid_ready_pattern() {
        let mut config = Config::default();
        config.tools[0].ready_pattern = Some("(unclosed".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ready_pattern"));
    }

    #[test]
    fn byte_level_ready_pattern_is_accepted() {
        let mut config = Config::default();
        config.tools[0].ready_pattern = Some(r"(?-u:\xFF)> ".to_string());
        assert!(config.validate().is_ok());
        assert!(crate::adapter::ConfiguredTool::from_config(config.tools[0].clone()).is_ok());
    }

    #[test]
    fn rejects_zero_buffer_capacity() {
        let mut config = Config::default();
        config.defaults.buffer_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[[tools]\nid = ").unwrap();
        assert!(matches!(
            Config::load_from(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
