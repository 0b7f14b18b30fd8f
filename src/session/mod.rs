//! One live subprocess per tool.
//!
//! A [`Session`] owns the PTY of a spawned tool, a bounded record of
//! everything the tool printed, and the lifecycle state machine. Output is
//! read on a dedicated thread (PTY reads block) and lands in the shared
//! session core; while a caller is attached the same bytes are also pushed
//! to its live channel.

mod buffer;
mod error;
mod events;
mod ready;
mod state;

pub use buffer::{OutputBuffer, DEFAULT_BUFFER_CAPACITY};
pub use error::SessionError;
pub use events::SessionEvent;
pub use ready::{ReadyDetector, DEFAULT_SEARCH_DEPTH};
pub use state::{SessionIntent, SessionReducer, SessionState, SessionStatus};

use crate::pty::{PtyHandle, SpawnSpec};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, ChildKiller, PtySize};
use regex::bytes::Regex;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};

const READ_CHUNK: usize = 8192;
/// Chunks queued for the attached terminal before the reader waits on it.
const LIVE_CAPACITY: usize = 64;
/// How long the waiter lets the reader drain output after the child exits.
/// A grandchild holding the PTY open keeps the reader alive indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Per-spawn knobs supplied by the tool adapter and the host config.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub ready_pattern: Option<Regex>,
    pub idle_timeout: Duration,
    pub buffer_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ready_pattern: None,
            idle_timeout: Duration::from_secs(2),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// Handed to the attach loop when a session becomes attached.
pub struct AttachStart {
    /// State the session was in before attaching.
    pub previous: SessionState,
    /// Buffer contents at the instant of attaching.
    pub replay: Vec<u8>,
    /// Output produced after `replay` was taken.
    pub output: mpsc::Receiver<Vec<u8>>,
}

/// Mutable per-session state, guarded by one lock.
struct SessionCore {
    state: SessionState,
    buffer: OutputBuffer,
    ready: ReadyDetector,
    last_output_at: Option<Instant>,
    live: Option<mpsc::Sender<Vec<u8>>>,
    exit_code: Option<u32>,
}

/// State shared between the session object and its I/O threads.
struct Shared {
    tool_id: String,
    idle_timeout: Duration,
    core: Mutex<SessionCore>,
    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    silence_exit: AtomicBool,
}

impl Shared {
    fn new(
        tool_id: String,
        options: SessionOptions,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Spawning);
        Self {
            tool_id,
            idle_timeout: options.idle_timeout,
            core: Mutex::new(SessionCore {
                state: SessionState::Spawning,
                buffer: OutputBuffer::new(options.buffer_capacity),
                ready: ReadyDetector::new(options.ready_pattern),
                last_output_at: None,
                live: None,
                exit_code: None,
            }),
            state_tx,
            events,
            silence_exit: AtomicBool::new(false),
        }
    }

    fn dispatch(&self, intent: SessionIntent) -> bool {
        let mut core = self.core.lock();
        self.dispatch_locked(&mut core, intent)
    }

    /// Apply an intent while already holding the core lock.
    /// Returns `true` if the state changed.
    fn dispatch_locked(&self, core: &mut SessionCore, intent: SessionIntent) -> bool {
        let from = core.state;
        let to = SessionReducer::reduce(from, intent);
        if from == to {
            return false;
        }
        core.state = to;
        tracing::debug!(tool = %self.tool_id, %from, %to, "session transition");
        self.state_tx.send_replace(to);
        let _ = self.events.send(SessionEvent::StateChanged {
            tool_id: self.tool_id.clone(),
            from,
            to,
        });

        if to.is_dead() {
            core.live = None;
            if !self.silence_exit.load(Ordering::SeqCst) {
                let _ = self.events.send(SessionEvent::Exited {
                    tool_id: self.tool_id.clone(),
                    exit_code: core.exit_code,
                });
            }
        }
        true
    }

    /// Record a chunk of output and hand it to the attached terminal.
    ///
    /// A full live queue blocks the caller (the reader thread) outside the
    /// core lock, so a slow terminal throttles the subprocess instead of
    /// queueing without bound.
    fn ingest(&self, chunk: &[u8], now: Instant) {
        let live = {
            let mut core = self.core.lock();
            core.buffer.append(chunk);
            core.last_output_at = Some(now);

            if core.ready.feed(chunk) {
                tracing::debug!(tool = %self.tool_id, "ready pattern matched");
                self.dispatch_locked(&mut core, SessionIntent::ReadyMatched);
            }
            core.live.clone()
        };

        let Some(live) = live else {
            return;
        };
        let delivered = match live.try_send(chunk.to_vec()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(chunk)) => live.blocking_send(chunk).is_ok(),
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        };
        if !delivered {
            let mut core = self.core.lock();
            if core.live.as_ref().is_some_and(|current| current.same_channel(&live)) {
                core.live = None;
            }
        }
    }

    fn mark_exited(&self, exit_code: Option<u32>) {
        let mut core = self.core.lock();
        if core.state.is_dead() {
            return;
        }
        core.exit_code = exit_code;
        self.dispatch_locked(&mut core, SessionIntent::Exited);
    }

    fn begin_attach(&self) -> Result<AttachStart, SessionError> {
        let mut core = self.core.lock();
        if core.state.is_dead() {
            return Err(SessionError::NoSession {
                tool_id: self.tool_id.clone(),
            });
        }
        let previous = core.state;
        let replay = core.buffer.snapshot();
        let (tx, rx) = mpsc::channel(LIVE_CAPACITY);
        core.live = Some(tx);
        self.dispatch_locked(&mut core, SessionIntent::Attach);
        Ok(AttachStart {
            previous,
            replay,
            output: rx,
        })
    }

    fn end_attach(&self) -> Vec<u8> {
        let mut core = self.core.lock();
        core.live = None;
        self.dispatch_locked(&mut core, SessionIntent::Detach);
        core.buffer.snapshot()
    }
}

/// A spawned tool and its terminal stream.
pub struct Session {
    shared: Arc<Shared>,
    pty: PtyHandle,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    pid: Option<u32>,
}

impl Session {
    /// Launch `spec` inside a new PTY and start its I/O threads.
    ///
    /// The session starts in `Spawning`; without a ready pattern it moves to
    /// `Ready` before this returns.
    pub fn spawn(
        tool_id: &str,
        spec: &SpawnSpec,
        options: SessionOptions,
        events: broadcast::Sender<SessionEvent>,
    ) -> Result<Self, SessionError> {
        let spawn_error = |reason: String| SessionError::SpawnFailed {
            tool_id: tool_id.to_string(),
            command: spec.display(),
            reason,
        };

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: spec.rows,
                cols: spec.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| spawn_error(format!("failed to open PTY: {err}")))?;

        let mut child = pair
            .slave
            .spawn_command(spec.command_builder())
            .map_err(|err| spawn_error(err.to_string()))?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| spawn_error(format!("failed to clone PTY reader: {err}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|err| spawn_error(format!("failed to take PTY writer: {err}")))?;

        let killer = child.clone_killer();
        let pid = child.process_id();
        let pty = PtyHandle::new(writer, pair.master);
        let immediate = options.ready_pattern.is_none();
        let shared = Arc::new(Shared::new(tool_id.to_string(), options, events));

        let reader_shared = Arc::clone(&shared);
        let (drained_tx, drained_rx) = std_mpsc::channel::<()>();
        thread::Builder::new()
            .name(format!("pty-reader-{tool_id}"))
            .spawn(move || {
                read_loop(reader, reader_shared);
                let _ = drained_tx.send(());
            })
            .map_err(|err| spawn_error(format!("failed to start reader thread: {err}")))?;

        let waiter_shared = Arc::clone(&shared);
        let waiter_pty = pty.clone();
        thread::Builder::new()
            .name(format!("pty-waiter-{tool_id}"))
            .spawn(move || {
                let exit_code = match child.wait() {
                    Ok(status) => Some(status.exit_code()),
                    Err(err) => {
                        tracing::warn!(tool = %waiter_shared.tool_id, "wait failed: {err}");
                        None
                    }
                };
                let _ = drained_rx.recv_timeout(DRAIN_TIMEOUT);
                waiter_pty.close_writer();
                waiter_shared.mark_exited(exit_code);
            })
            .map_err(|err| spawn_error(format!("failed to start waiter thread: {err}")))?;

        if immediate {
            shared.dispatch(SessionIntent::ReadyMatched);
        }

        tracing::info!(tool = tool_id, command = %spec.display(), ?pid, "session spawned");

        Ok(Self {
            shared,
            pty,
            killer: Mutex::new(killer),
            pid,
        })
    }

    pub fn tool_id(&self) -> &str {
        &self.shared.tool_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> SessionState {
        self.shared.core.lock().state
    }

    pub fn is_alive(&self) -> bool {
        !self.state().is_dead()
    }

    pub fn is_attached(&self) -> bool {
        self.state().is_attached()
    }

    pub fn exit_code(&self) -> Option<u32> {
        self.shared.core.lock().exit_code
    }

    pub fn last_output_at(&self) -> Option<Instant> {
        self.shared.core.lock().last_output_at
    }

    /// Hard state with the advisory `Processing` overlay applied.
    pub fn status(&self, now: Instant) -> SessionStatus {
        let core = self.shared.core.lock();
        SessionStatus::classify(core.state, core.last_output_at, self.shared.idle_timeout, now)
    }

    /// Watch channel following every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Suspend until the session leaves `Spawning`.
    pub async fn wait_ready(&self) -> Result<(), SessionError> {
        let mut rx = self.watch_state();
        let state = rx
            .wait_for(|state| *state != SessionState::Spawning)
            .await
            .map(|state| *state)
            .unwrap_or(SessionState::Dead);

        if state.is_dead() {
            return Err(SessionError::ExitedBeforeReady {
                tool_id: self.tool_id().to_string(),
                exit_code: self.exit_code(),
            });
        }
        Ok(())
    }

    /// Copy of the buffered output.
    pub fn snapshot(&self) -> Vec<u8> {
        self.shared.core.lock().buffer.snapshot()
    }

    pub fn buffer_len(&self) -> usize {
        self.shared.core.lock().buffer.len()
    }

    /// Bytes lost to the buffer's overflow policy so far.
    pub fn buffer_dropped(&self) -> u64 {
        self.shared.core.lock().buffer.dropped()
    }

    /// Send bytes to the subprocess. A no-op once the session is dead.
    pub fn write(&self, bytes: &[u8]) -> Result<(), SessionError> {
        if !self.is_alive() {
            tracing::debug!(tool = %self.tool_id(), len = bytes.len(), "write to dead session dropped");
            return Ok(());
        }
        match self.pty.send_input(bytes) {
            Ok(()) => Ok(()),
            // The child can die between the liveness check and the write.
            Err(_) if !self.is_alive() => Ok(()),
            Err(err) => Err(SessionError::Io(err)),
        }
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), SessionError> {
        if !self.is_alive() {
            return Ok(());
        }
        self.pty.resize(cols, rows)?;
        Ok(())
    }

    pub fn pty_size(&self) -> Option<(u16, u16)> {
        self.pty.size()
    }

    /// Terminate the subprocess. With `silent` no `Exited` event is published.
    pub fn kill(&self, silent: bool) {
        if silent {
            self.shared.silence_exit.store(true, Ordering::SeqCst);
        }
        let was_alive = self.is_alive();
        // Dead first, so the waiter thread's exit status is ignored.
        self.shared.mark_exited(None);
        if was_alive {
            if let Err(err) = self.killer.lock().kill() {
                tracing::debug!(tool = %self.tool_id(), "kill failed: {err}");
            }
        }
        self.pty.close_writer();
        tracing::info!(tool = %self.tool_id(), silent, "session killed");
    }

    pub(crate) fn begin_attach(&self) -> Result<AttachStart, SessionError> {
        self.shared.begin_attach()
    }

    /// Leave `Attached` and return the buffer at the moment of detaching.
    pub fn detach(&self) -> Vec<u8> {
        self.shared.end_attach()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_alive() {
            self.kill(true);
        }
    }
}

fn read_loop(mut reader: Box<dyn Read + Send>, shared: Arc<Shared>) {
    let mut buffer = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(count) => shared.ingest(&buffer[..count], Instant::now()),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the child side closes.
            Err(_) => break,
        }
    }
    tracing::debug!(tool = %shared.tool_id, "pty reader finished");
}
