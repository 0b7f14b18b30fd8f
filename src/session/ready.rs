//! Prompt detection for freshly spawned sessions.
//!
//! Prompts arrive wrapped in colour codes and split across reads, so the
//! detector keeps a raw tail window of the stream, strips ANSI escapes from
//! the whole window on every chunk, and searches the result.

use regex::bytes::Regex;

/// How many raw bytes of trailing output are kept for matching.
pub const DEFAULT_SEARCH_DEPTH: usize = 4096;

/// One-shot matcher: fires on the first match and never re-arms.
#[derive(Debug, Clone)]
pub struct ReadyDetector {
    pattern: Option<Regex>,
    window: Vec<u8>,
    search_depth: usize,
    fired: bool,
}

impl ReadyDetector {
    pub fn new(pattern: Option<Regex>) -> Self {
        Self::with_search_depth(pattern, DEFAULT_SEARCH_DEPTH)
    }

    pub fn with_search_depth(pattern: Option<Regex>, search_depth: usize) -> Self {
        Self {
            pattern,
            window: Vec::new(),
            search_depth: search_depth.max(1),
            fired: false,
        }
    }

    /// `true` when there is nothing to wait for.
    pub fn is_immediate(&self) -> bool {
        self.pattern.is_none()
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Feed a chunk of output. Returns `true` exactly once, on the chunk that
    /// completes the first match.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if self.fired {
            return false;
        }
        let Some(pattern) = &self.pattern else {
            return false;
        };

        self.window.extend_from_slice(chunk);
        if self.window.len() > self.search_depth {
            let excess = self.window.len() - self.search_depth;
            self.window.drain(..excess);
        }

        let visible = strip_ansi_escapes::strip(&self.window);
        if pattern.is_match(&visible) || pattern.is_match(&self.window) {
            self.fired = true;
            self.window = Vec::new();
            return true;
        }
        false
    }
}
