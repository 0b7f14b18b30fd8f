//! Per-tool knowledge the session core consumes but never interprets.
//!
//! An adapter says how to launch a tool, what its prompt looks like, how
//! long it may stay quiet while still "processing", and how to turn its raw
//! terminal output into plain response text.

mod clean;

pub use clean::clean_terminal_text;

use crate::config::{Config, ConfigError, ToolConfig};
use crate::pty::SpawnSpec;
use crate::session::SessionOptions;
use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Contract every tool adapter supplies to the session core.
pub trait ToolAdapter: Send + Sync {
    fn id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn color(&self) -> &str;
    fn spawn_command(&self) -> &str;
    fn spawn_args(&self) -> &[String];

    fn spawn_env(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn ready_pattern(&self) -> Option<&BytesRegex>;
    fn idle_timeout(&self) -> Duration;

    /// Strip tool-specific chrome from captured output.
    fn clean_response(&self, raw: &[u8]) -> String {
        clean_terminal_text(raw, &[])
    }

    fn spawn_spec(&self) -> SpawnSpec {
        SpawnSpec::new(self.spawn_command(), self.spawn_args().to_vec())
            .with_env(self.spawn_env())
    }

    fn session_options(&self, buffer_capacity: usize) -> SessionOptions {
        SessionOptions {
            ready_pattern: self.ready_pattern().cloned(),
            idle_timeout: self.idle_timeout(),
            buffer_capacity,
        }
    }
}

/// Adapter built from a `[[tools]]` config entry.
#[derive(Debug, Clone)]
pub struct ConfiguredTool {
    config: ToolConfig,
    ready_pattern: Option<BytesRegex>,
    strip_lines: Vec<Regex>,
}

impl ConfiguredTool {
    pub fn from_config(config: ToolConfig) -> Result<Self, ConfigError> {
        let invalid = |what: &str, err: regex::Error| ConfigError::ValidationError {
            message: format!("Tool '{}' has an invalid {what}: {err}", config.id),
        };

        let ready_pattern = config
            .ready_pattern
            .as_deref()
            .map(BytesRegex::new)
            .transpose()
            .map_err(|err| invalid("ready_pattern", err))?;

        let strip_lines = config
            .strip_lines
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| invalid("strip_lines entry", err))?;

        Ok(Self {
            config,
            ready_pattern,
            strip_lines,
        })
    }
}

impl ToolAdapter for ConfiguredTool {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn display_name(&self) -> &str {
        &self.config.display_name
    }

    fn color(&self) -> &str {
        &self.config.color
    }

    fn spawn_command(&self) -> &str {
        &self.config.command
    }

    fn spawn_args(&self) -> &[String] {
        &self.config.args
    }

    fn spawn_env(&self) -> Vec<(String, String)> {
        self.config
            .env
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn ready_pattern(&self) -> Option<&BytesRegex> {
        self.ready_pattern.as_ref()
    }

    fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.config.idle_timeout_ms)
    }

    fn clean_response(&self, raw: &[u8]) -> String {
        clean_terminal_text(raw, &self.strip_lines)
    }
}

/// Every tool the host knows how to spawn, keyed by id.
#[derive(Clone, Default)]
pub struct ToolCatalog {
    tools: HashMap<String, Arc<dyn ToolAdapter>>,
    order: Vec<String>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut catalog = Self::new();
        for tool in &config.tools {
            catalog.insert(Arc::new(ConfiguredTool::from_config(tool.clone())?));
        }
        Ok(catalog)
    }

    /// Register an adapter, replacing any previous one with the same id.
    pub fn insert(&mut self, adapter: Arc<dyn ToolAdapter>) {
        let id = adapter.id().to_string();
        if self.tools.insert(id.clone(), adapter).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.tools.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    /// Ids in registration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(id: &str) -> ToolConfig {
        ToolConfig {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            color: String::new(),
            command: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), "cat".to_string()],
            ready_pattern: Some(r"> $".to_string()),
            idle_timeout_ms: 750,
            env: [("A".to_string(), "1".to_string())].into_iter().collect(),
            strip_lines: vec![r"^\s*>".to_string()],
        }
    }

    #[test]
    fn configured_tool_exposes_contract() {
        let adapter = ConfiguredTool::from_config(tool("shell")).unwrap();
        assert_eq!(adapter.id(), "shell");
        assert_eq!(adapter.display_name(), "SHELL");
        assert_eq!(adapter.spawn_args(), ["-c", "cat"]);
        assert_eq!(adapter.idle_timeout(), Duration::from_millis(750));
        assert!(adapter.ready_pattern().unwrap().is_match(b"x> "));

        let spec = adapter.spawn_spec();
        assert_eq!(spec.command, "/bin/sh");
        assert_eq!(spec.env, vec![("A".to_string(), "1".to_string())]);

        let options = adapter.session_options(123);
        assert_eq!(options.buffer_capacity, 123);
        assert!(options.ready_pattern.is_some());
    }

    #[test]
    fn clean_response_applies_strip_lines() {
        let adapter = ConfiguredTool::from_config(tool("shell")).unwrap();
        let cleaned = adapter.clean_response(b"\x1b[32manswer\x1b[0m\r\n> next\r\n");
        assert_eq!(cleaned, "answer");
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let mut config = tool("bad");
        config.ready_pattern = Some("(".to_string());
        assert!(ConfiguredTool::from_config(config).is_err());
    }

    #[test]
    fn catalog_keeps_registration_order() {
        let mut config = Config::default();
        config.tools = vec![tool("b"), tool("a")];
        let catalog = ToolCatalog::from_config(&config).unwrap();
        assert_eq!(catalog.ids(), ["b", "a"]);
        assert!(catalog.contains("a"));
        assert!(catalog.get("missing").is_none());
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn insert_replaces_same_id() {
        let mut catalog = ToolCatalog::new();
        catalog.insert(Arc::new(ConfiguredTool::from_config(tool("a")).unwrap()));
        catalog.insert(Arc::new(ConfiguredTool::from_config(tool("a")).unwrap()));
        assert_eq!(catalog.len(), 1);
    }
}
