//! Paced character injection.
//!
//! Some tools drop keystrokes that arrive as one burst while they are still
//! drawing their first screen. A [`TypingPlan`] is a list of
//! `(character, delay)` steps consumed by one timer-driven task that stops
//! early when cancelled or when the session dies.

use crate::session::{Session, SessionError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Carriage return: what Enter sends in raw mode.
pub const SUBMIT: char = '\r';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingPlan {
    steps: Vec<(char, Duration)>,
}

impl TypingPlan {
    /// One step per character, each preceded by `delay`.
    pub fn new(text: &str, delay: Duration) -> Self {
        Self {
            steps: text.chars().map(|c| (c, delay)).collect(),
        }
    }

    /// Finish with Enter after `delay`.
    pub fn submit(mut self, delay: Duration) -> Self {
        self.steps.push((SUBMIT, delay));
        self
    }

    pub fn steps(&self) -> &[(char, Duration)] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Where typed characters go.
pub trait TypingTarget: Send + Sync {
    fn is_alive(&self) -> bool;
    fn type_bytes(&self, bytes: &[u8]) -> Result<(), SessionError>;
}

impl TypingTarget for Session {
    fn is_alive(&self) -> bool {
        Session::is_alive(self)
    }

    fn type_bytes(&self, bytes: &[u8]) -> Result<(), SessionError> {
        self.write(bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingOutcome {
    Completed { typed: usize },
    Cancelled { typed: usize },
    /// The target died, or a write failed, before the plan finished.
    SessionDied { typed: usize },
}

impl TypingOutcome {
    pub fn typed(&self) -> usize {
        match *self {
            TypingOutcome::Completed { typed }
            | TypingOutcome::Cancelled { typed }
            | TypingOutcome::SessionDied { typed } => typed,
        }
    }
}

/// A running plan. Dropping the handle lets it run to completion.
pub struct TypingHandle {
    cancel: Arc<Notify>,
    task: JoinHandle<TypingOutcome>,
}

impl TypingHandle {
    /// Stop before the next character.
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> TypingOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!("typing task failed: {err}");
                TypingOutcome::Cancelled { typed: 0 }
            }
        }
    }
}

/// Start typing `plan` into `target` on the current runtime.
pub fn spawn_typing<T>(target: Arc<T>, plan: TypingPlan) -> TypingHandle
where
    T: TypingTarget + ?Sized + 'static,
{
    let cancel = Arc::new(Notify::new());
    let task = tokio::spawn(run_plan(target, plan, Arc::clone(&cancel)));
    TypingHandle { cancel, task }
}

async fn run_plan<T>(target: Arc<T>, plan: TypingPlan, cancel: Arc<Notify>) -> TypingOutcome
where
    T: TypingTarget + ?Sized,
{
    let mut typed = 0;
    let mut utf8 = [0u8; 4];
    for (ch, delay) in plan.steps {
        tokio::select! {
            _ = cancel.notified() => return TypingOutcome::Cancelled { typed },
            _ = tokio::time::sleep(delay) => {}
        }
        if !target.is_alive() {
            return TypingOutcome::SessionDied { typed };
        }
        if let Err(err) = target.type_bytes(ch.encode_utf8(&mut utf8).as_bytes()) {
            tracing::debug!("typing stopped: {err}");
            return TypingOutcome::SessionDied { typed };
        }
        typed += 1;
    }
    TypingOutcome::Completed { typed }
}
