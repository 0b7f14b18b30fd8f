//! Bridging the controlling terminal to one session.
//!
//! While attached, the controller owns the terminal: raw stdin chunks are
//! filtered and classified, subprocess output goes straight to stdout, and
//! window resizes reach the PTY. Any detach trigger, subprocess exit, or
//! loss of input ends the attachment, and the terminal is restored before
//! control returns to the caller.

mod filter;
mod stdin;
mod terminal;
mod triggers;

pub use filter::{incomplete_tail, match_noise, strip_focus_reports, strip_terminal_noise, Noise};
pub use stdin::StdinPump;
pub use terminal::{
    clear_screen_sequence, enter_sequence, restore_sequence, HostTerminal, TerminalModeGuard,
    TerminalPort,
};
pub use triggers::{
    DetachTrigger, InputAction, InputClassifier, TriggerPattern, DETACH_TRIGGERS,
    DOUBLE_ESCAPE_WINDOW, SPLIT_SEQUENCE_WINDOW,
};

use crate::pty::ResizeWatcher;
use crate::registry::SessionRegistry;
use crate::session::{AttachStart, Session, SessionError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Why an attachment ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachReason {
    /// The user pressed a detach chord; holds its name.
    Trigger(&'static str),
    /// The subprocess exited while attached.
    Exited { exit_code: Option<u32> },
    /// The input stream closed.
    InputClosed,
}

#[derive(Debug, Clone)]
pub struct AttachOutcome {
    pub tool_id: String,
    pub reason: DetachReason,
    /// Buffer contents at the moment of detaching.
    pub snapshot: Vec<u8>,
}

/// Input, resize events and the terminal for one attachment.
///
/// The pump and watcher are optional so tests can drive the loop from
/// plain channels.
pub struct AttachIo<T: TerminalPort> {
    pub terminal: T,
    pub input: mpsc::UnboundedReceiver<Vec<u8>>,
    pub resize: mpsc::UnboundedReceiver<(u16, u16)>,
    pub pump: Option<StdinPump>,
    pub watcher: Option<ResizeWatcher>,
}

fn stop_sources(pump: Option<StdinPump>, watcher: Option<ResizeWatcher>) {
    if let Some(pump) = pump {
        pump.stop();
    }
    if let Some(watcher) = watcher {
        watcher.stop();
    }
}

pub struct AttachController {
    registry: Arc<SessionRegistry>,
    escape_window: Duration,
}

impl AttachController {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            escape_window: DOUBLE_ESCAPE_WINDOW,
        }
    }

    pub fn with_escape_window(mut self, window: Duration) -> Self {
        self.escape_window = window;
        self
    }

    /// Attach the real terminal to the live session for `tool_id`.
    ///
    /// The session must already exist (see
    /// [`SessionRegistry::get_or_create`]).
    pub async fn attach(&self, tool_id: &str) -> Result<AttachOutcome, SessionError> {
        if let Some(attached) = self.registry.attached_tool() {
            return Err(SessionError::AlreadyAttached {
                attached,
                requested: tool_id.to_string(),
            });
        }

        let (input_tx, input) = mpsc::unbounded_channel();
        let (resize_tx, resize) = mpsc::unbounded_channel();
        let watcher = ResizeWatcher::start(resize_tx)?;
        let pump = StdinPump::start(input_tx)?;

        self.attach_with(
            tool_id,
            AttachIo {
                terminal: HostTerminal::new(),
                input,
                resize,
                pump: Some(pump),
                watcher,
            },
        )
        .await
    }

    /// Run an attachment over the given input, resize stream and terminal.
    pub async fn attach_with<T: TerminalPort>(
        &self,
        tool_id: &str,
        io: AttachIo<T>,
    ) -> Result<AttachOutcome, SessionError> {
        let AttachIo {
            terminal,
            mut input,
            mut resize,
            pump,
            watcher,
        } = io;

        let ticket = self.registry.claim_attach(tool_id)?;
        let session = Arc::clone(ticket.session());
        let start = session.begin_attach()?;
        tracing::info!(tool = tool_id, previous = %start.previous, replay = start.replay.len(), "attached");

        let mut guard = TerminalModeGuard::acquire(terminal)?;
        let result = self
            .run_attached(&session, start, &mut guard, &mut input, &mut resize)
            .await;

        // No input may be consumed once the attachment is over.
        input.close();
        stop_sources(pump, watcher);
        let (reason, trailing) = match result {
            Ok(done) => done,
            Err(err) => {
                drop(ticket);
                drop(guard);
                return Err(err);
            }
        };

        if !trailing.is_empty() {
            let _ = guard.write_bytes(&trailing);
        }
        let snapshot = if session.is_attached() {
            session.detach()
        } else {
            session.snapshot()
        };
        drop(ticket);
        guard.restore()?;

        tracing::info!(tool = tool_id, ?reason, "detached");
        Ok(AttachOutcome {
            tool_id: tool_id.to_string(),
            reason,
            snapshot,
        })
    }

    /// The event loop. Returns the reason for leaving and any output that
    /// was still queued when the subprocess exited.
    async fn run_attached<T: TerminalPort>(
        &self,
        session: &Session,
        start: AttachStart,
        terminal: &mut TerminalModeGuard<T>,
        input: &mut mpsc::UnboundedReceiver<Vec<u8>>,
        resize: &mut mpsc::UnboundedReceiver<(u16, u16)>,
    ) -> Result<(DetachReason, Vec<u8>), SessionError> {
        let AttachStart {
            replay, mut output, ..
        } = start;

        if !replay.is_empty() {
            let mut frame = clear_screen_sequence()?;
            frame.extend_from_slice(&strip_focus_reports(&replay));
            terminal.write_bytes(&frame)?;
        }

        let (cols, rows) = terminal.size();
        if session.pty_size() != Some((cols, rows)) {
            session.resize(cols, rows)?;
        }

        let mut classifier = InputClassifier::new(self.escape_window);
        let mut state = session.watch_state();

        loop {
            let deadline = classifier.deadline();
            // Input first: a subprocess that floods its terminal must never
            // starve the detach keys. Output is bounded by the live queue.
            tokio::select! {
                biased;

                chunk = input.recv() => {
                    let Some(chunk) = chunk else {
                        return Ok((DetachReason::InputClosed, Vec::new()));
                    };
                    match classifier.classify(&chunk, Instant::now()) {
                        InputAction::Forward(bytes) => session.write(&bytes)?,
                        InputAction::Detach(trigger) => {
                            tracing::debug!(tool = %session.tool_id(), trigger = trigger.name, "detach trigger");
                            return Ok((DetachReason::Trigger(trigger.name), Vec::new()));
                        }
                        InputAction::Hold => {}
                    }
                }

                Some((cols, rows)) = resize.recv() => {
                    session.resize(cols, rows)?;
                }

                _ = tokio::time::sleep_until(to_tokio(deadline)), if deadline.is_some() => {
                    if let Some(bytes) = classifier.poll_expired(Instant::now()) {
                        session.write(&bytes)?;
                    }
                }

                Some(chunk) = output.recv() => {
                    terminal.write_bytes(&chunk)?;
                }

                _ = state.wait_for(|state| state.is_dead()) => {
                    let mut trailing = Vec::new();
                    while let Ok(chunk) = output.try_recv() {
                        trailing.extend_from_slice(&chunk);
                    }
                    let reason = DetachReason::Exited { exit_code: session.exit_code() };
                    return Ok((reason, trailing));
                }
            }
        }
    }
}

fn to_tokio(deadline: Option<Instant>) -> tokio::time::Instant {
    deadline
        .map(tokio::time::Instant::from_std)
        .unwrap_or_else(tokio::time::Instant::now)
}
