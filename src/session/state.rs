//! Session lifecycle state machine.
//!
//! ```text
//! Spawning ──ReadyMatched──→ Ready ──Attach──→ Attached ──Detach──→ Detached
//!                                                 ↑                    │
//!                                                 └──────Attach────────┘
//! any ──Exited──→ Dead (terminal)
//! ```
//!
//! `Processing` is not a state. It is a reporting overlay derived from how
//! recently the subprocess produced output, see [`SessionStatus::classify`].

use std::fmt;
use std::time::{Duration, Instant};

/// Hard lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Spawning,
    Ready,
    Attached,
    Detached,
    Dead,
}

impl SessionState {
    pub fn is_dead(self) -> bool {
        matches!(self, SessionState::Dead)
    }

    pub fn is_attached(self) -> bool {
        matches!(self, SessionState::Attached)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Spawning => "spawning",
            SessionState::Ready => "ready",
            SessionState::Attached => "attached",
            SessionState::Detached => "detached",
            SessionState::Dead => "dead",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Events that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionIntent {
    /// Ready pattern matched, or no confirmation was required.
    ReadyMatched,
    Attach,
    Detach,
    /// Subprocess terminated.
    Exited,
}

/// Pure transition function. Intents that do not apply to the current state
/// leave it unchanged; callers compare before/after to detect a transition.
pub struct SessionReducer;

impl SessionReducer {
    pub fn reduce(state: SessionState, intent: SessionIntent) -> SessionState {
        use SessionIntent as I;
        use SessionState as S;

        match (state, intent) {
            (S::Dead, _) => S::Dead,
            (_, I::Exited) => S::Dead,

            (S::Spawning, I::ReadyMatched) => S::Ready,
            (other, I::ReadyMatched) => other,

            // Attaching while still spawning is allowed: the user sees the
            // startup output live instead of waiting on the prompt.
            (S::Spawning | S::Ready | S::Detached, I::Attach) => S::Attached,
            (S::Attached, I::Attach) => S::Attached,

            (S::Attached, I::Detach) => S::Detached,
            (other, I::Detach) => other,
        }
    }
}

/// What `/status` shows: the hard state, with `Processing` overlaid while the
/// subprocess is actively producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Spawning,
    Ready,
    Attached,
    Detached,
    Processing,
    Dead,
}

impl SessionStatus {
    /// Advisory only. Never consulted by attach/detach/spawn decisions.
    pub fn classify(
        state: SessionState,
        last_output_at: Option<Instant>,
        idle_timeout: Duration,
        now: Instant,
    ) -> Self {
        let busy = last_output_at
            .map(|at| now.saturating_duration_since(at) < idle_timeout)
            .unwrap_or(false);

        match state {
            SessionState::Spawning => SessionStatus::Spawning,
            SessionState::Dead => SessionStatus::Dead,
            SessionState::Ready | SessionState::Attached | SessionState::Detached if busy => {
                SessionStatus::Processing
            }
            SessionState::Ready => SessionStatus::Ready,
            SessionState::Attached => SessionStatus::Attached,
            SessionState::Detached => SessionStatus::Detached,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Spawning => "spawning",
            SessionStatus::Ready => "ready",
            SessionStatus::Attached => "attached",
            SessionStatus::Detached => "idle (detached)",
            SessionStatus::Processing => "processing",
            SessionStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
