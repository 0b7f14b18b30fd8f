use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
    /// Tools that can be spawned. Replaces the built-in list when present.
    #[serde(default = "builtin_tools")]
    pub tools: Vec<ToolConfig>,
}

/// Host-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Defaults {
    /// Cap of each session's output buffer in bytes (default: 1 MiB).
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Window for the "press Escape twice" detach gesture (default: 500).
    #[serde(default = "default_double_escape_window_ms")]
    pub double_escape_window_ms: u64,
    /// How long the command loop waits for a tool's prompt (default: 30).
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    /// Delay between injected characters when typing into a session (default: 8).
    #[serde(default = "default_typing_delay_ms")]
    pub typing_delay_ms: u64,
    /// Write logs here instead of stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// One external CLI tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolConfig {
    /// Identifier used in commands (e.g., "claude").
    pub id: String,
    /// Display name in messages (e.g., "Claude Code").
    pub display_name: String,
    /// Presentation colour, opaque to the session core.
    #[serde(default)]
    pub color: String,
    /// Executable to launch.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Regex recognised as "interactive prompt reached". Absent means the
    /// tool is considered ready as soon as it is spawned.
    #[serde(default)]
    pub ready_pattern: Option<String>,
    /// Quiet period after which the tool is reported idle (default: 2000).
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Extra environment for the subprocess.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Regexes; matching lines are removed from captured responses.
    #[serde(default)]
    pub strip_lines: Vec<String>,
}

fn default_buffer_capacity() -> usize {
    1024 * 1024
}

fn default_double_escape_window_ms() -> u64 {
    500
}

fn default_ready_timeout_secs() -> u64 {
    30
}

fn default_typing_delay_ms() -> u64 {
    8
}

fn default_idle_timeout_ms() -> u64 {
    2000
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            double_escape_window_ms: default_double_escape_window_ms(),
            ready_timeout_secs: default_ready_timeout_secs(),
            typing_delay_ms: default_typing_delay_ms(),
            log_file: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: Defaults::default(),
            tools: builtin_tools(),
        }
    }
}

impl Config {
    pub fn tool(&self, id: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|tool| tool.id == id)
    }
}

/// Tools known without a config file.
pub fn builtin_tools() -> Vec<ToolConfig> {
    vec![
        ToolConfig {
            id: "claude".to_string(),
            display_name: "Claude Code".to_string(),
            color: "#d97757".to_string(),
            command: "claude".to_string(),
            args: Vec::new(),
            ready_pattern: Some(r"\? for shortcuts|>\s*$".to_string()),
            idle_timeout_ms: 2000,
            env: BTreeMap::new(),
            strip_lines: vec![r"^\s*[╭╰│─]".to_string(), r"\? for shortcuts".to_string()],
        },
        ToolConfig {
            id: "codex".to_string(),
            display_name: "Codex".to_string(),
            color: "#10a37f".to_string(),
            command: "codex".to_string(),
            args: Vec::new(),
            ready_pattern: Some(r"(?m)^\s*[›>]\s".to_string()),
            idle_timeout_ms: 3000,
            env: BTreeMap::new(),
            strip_lines: vec![r"^\s*⏎ send".to_string()],
        },
        ToolConfig {
            id: "gemini".to_string(),
            display_name: "Gemini CLI".to_string(),
            color: "#4285f4".to_string(),
            command: "gemini".to_string(),
            args: Vec::new(),
            ready_pattern: Some(r"Type your message".to_string()),
            idle_timeout_ms: 2500,
            env: BTreeMap::new(),
            strip_lines: vec![r"Type your message".to_string()],
        },
    ]
}
