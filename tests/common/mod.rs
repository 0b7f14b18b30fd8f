//! Shared test utilities: `/bin/sh`-backed tools and a recording terminal.

#![allow(dead_code, unused_imports)]

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use toolmux::adapter::{ConfiguredTool, ToolCatalog};
use toolmux::attach::{AttachController, AttachIo, AttachOutcome, TerminalPort};
use toolmux::config::ToolConfig;
use toolmux::registry::SessionRegistry;
use toolmux::session::SessionError;

pub const WAIT: Duration = Duration::from_secs(5);

/// A tool that runs `script` under `/bin/sh -c`.
pub fn sh_tool(id: &str, script: &str, ready_pattern: Option<&str>) -> ToolConfig {
    ToolConfig {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        color: String::new(),
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        ready_pattern: ready_pattern.map(str::to_string),
        idle_timeout_ms: 100,
        env: BTreeMap::new(),
        strip_lines: Vec::new(),
    }
}

pub fn catalog(tools: Vec<ToolConfig>) -> ToolCatalog {
    let mut catalog = ToolCatalog::new();
    for tool in tools {
        catalog.insert(Arc::new(
            ConfiguredTool::from_config(tool).expect("valid test tool"),
        ));
    }
    catalog
}

pub fn registry(tools: Vec<ToolConfig>) -> Arc<SessionRegistry> {
    registry_with_capacity(tools, 64 * 1024)
}

pub fn registry_with_capacity(tools: Vec<ToolConfig>, capacity: usize) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(catalog(tools), capacity))
}

/// Poll `check` every 10ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Terminal double that records everything written to it.
#[derive(Clone)]
pub struct RecordingTerminal {
    pub raw: Arc<Mutex<bool>>,
    pub output: Arc<Mutex<Vec<u8>>>,
    pub size: (u16, u16),
    /// Time each write takes, to model a terminal slower than the tool.
    pub write_delay: Duration,
}

impl RecordingTerminal {
    pub fn new() -> Self {
        Self {
            raw: Arc::new(Mutex::new(false)),
            output: Arc::new(Mutex::new(Vec::new())),
            size: (90, 30),
            write_delay: Duration::ZERO,
        }
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub fn output(&self) -> Vec<u8> {
        self.output.lock().clone()
    }

    pub fn is_raw(&self) -> bool {
        *self.raw.lock()
    }

    pub fn shows(&self, needle: &[u8]) -> bool {
        contains(&self.output.lock(), needle)
    }
}

impl TerminalPort for RecordingTerminal {
    fn is_raw_mode(&self) -> io::Result<bool> {
        Ok(*self.raw.lock())
    }

    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
        *self.raw.lock() = enabled;
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
        self.output.lock().extend_from_slice(bytes);
        Ok(())
    }

    fn size(&self) -> (u16, u16) {
        self.size
    }
}

/// A running attachment driven from channels.
pub struct Attachment {
    pub input: mpsc::UnboundedSender<Vec<u8>>,
    pub resize: mpsc::UnboundedSender<(u16, u16)>,
    pub terminal: RecordingTerminal,
    pub task: JoinHandle<Result<AttachOutcome, SessionError>>,
}

impl Attachment {
    pub fn send(&self, bytes: &[u8]) {
        self.input.send(bytes.to_vec()).expect("attach loop alive");
    }

    pub async fn finish(self) -> Result<AttachOutcome, SessionError> {
        let Attachment { input, task, .. } = self;
        let outcome = tokio::time::timeout(WAIT, task)
            .await
            .expect("attach loop finished in time")
            .expect("attach task did not panic");
        drop(input);
        outcome
    }
}

pub fn start_attach(
    registry: &Arc<SessionRegistry>,
    tool_id: &str,
    escape_window: Duration,
) -> Attachment {
    start_attach_on(registry, tool_id, escape_window, RecordingTerminal::new())
}

pub fn start_attach_on(
    registry: &Arc<SessionRegistry>,
    tool_id: &str,
    escape_window: Duration,
    terminal: RecordingTerminal,
) -> Attachment {
    let (input, input_rx) = mpsc::unbounded_channel();
    let (resize, resize_rx) = mpsc::unbounded_channel();
    let controller =
        AttachController::new(Arc::clone(registry)).with_escape_window(escape_window);
    let io = AttachIo {
        terminal: terminal.clone(),
        input: input_rx,
        resize: resize_rx,
        pump: None,
        watcher: None,
    };
    let tool_id = tool_id.to_string();
    let task = tokio::spawn(async move { controller.attach_with(&tool_id, io).await });
    Attachment {
        input,
        resize,
        terminal,
        task,
    }
}
