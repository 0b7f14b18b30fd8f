//! Tool id → live session map.
//!
//! The registry is the only place sessions are created or discarded. It
//! holds at most one session per tool id, replaces a session once it is
//! dead, and tracks which single session (if any) is attached.

use crate::adapter::{ToolAdapter, ToolCatalog};
use crate::config::{Config, ConfigError};
use crate::session::{Session, SessionError, SessionEvent, SessionStatus, DEFAULT_BUFFER_CAPACITY};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// One row of `/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub tool_id: String,
    pub display_name: String,
    pub status: SessionStatus,
    pub pid: Option<u32>,
    pub buffered: usize,
    /// Oldest output discarded once the buffer filled up.
    pub dropped: u64,
}

pub struct SessionRegistry {
    catalog: ToolCatalog,
    buffer_capacity: usize,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    attached: Arc<Mutex<Option<String>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionRegistry {
    pub fn new(catalog: ToolCatalog, buffer_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            catalog,
            buffer_capacity: buffer_capacity.max(1),
            sessions: Mutex::new(HashMap::new()),
            attached: Arc::new(Mutex::new(None)),
            events,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let catalog = ToolCatalog::from_config(config)?;
        Ok(Self::new(catalog, config.defaults.buffer_capacity))
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Every state change and exit of every session.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Return the live session for `tool_id`, spawning one if needed.
    ///
    /// With `wait_for_ready` the call suspends until the tool's prompt shows
    /// up. Without it a fresh session comes back still `Spawning`. The caller
    /// imposes any deadline (e.g. with `tokio::time::timeout`).
    pub async fn get_or_create(
        &self,
        tool_id: &str,
        wait_for_ready: bool,
    ) -> Result<Arc<Session>, SessionError> {
        let session = self.get_or_spawn(tool_id)?;
        if wait_for_ready {
            session.wait_ready().await?;
        }
        Ok(session)
    }

    fn get_or_spawn(&self, tool_id: &str) -> Result<Arc<Session>, SessionError> {
        let adapter = self.adapter(tool_id)?;
        let mut sessions = self.sessions.lock();

        if let Some(existing) = sessions.get(tool_id) {
            if existing.is_alive() {
                return Ok(Arc::clone(existing));
            }
        }
        if let Some(dead) = sessions.remove(tool_id) {
            tracing::debug!(tool = tool_id, exit_code = ?dead.exit_code(), "discarding dead session");
        }

        let session = Session::spawn(
            tool_id,
            &adapter.spawn_spec(),
            adapter.session_options(self.buffer_capacity),
            self.events.clone(),
        )?;
        let session = Arc::new(session);
        sessions.insert(tool_id.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// The session registered for `tool_id`, live or dead.
    pub fn get(&self, tool_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(tool_id).cloned()
    }

    /// Terminate and forget the session for `tool_id`.
    ///
    /// Returns `false` when there was no session. With `silent` no exit event
    /// is published.
    pub fn kill(&self, tool_id: &str, silent: bool) -> Result<bool, SessionError> {
        if !self.catalog.contains(tool_id) {
            return Err(SessionError::UnknownTool {
                tool_id: tool_id.to_string(),
            });
        }
        let removed = self.sessions.lock().remove(tool_id);
        match removed {
            Some(session) => {
                session.kill(silent);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Silently kill every session. Used on shutdown.
    pub fn kill_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().drain().collect();
        for (tool_id, session) in sessions {
            tracing::debug!(tool = %tool_id, "killing on shutdown");
            session.kill(true);
        }
    }

    /// Registered sessions in catalog order.
    pub fn statuses(&self, now: Instant) -> Vec<SessionSummary> {
        let sessions = self.sessions.lock();
        self.catalog
            .ids()
            .iter()
            .filter_map(|id| {
                let session = sessions.get(id)?;
                let display_name = self
                    .catalog
                    .get(id)
                    .map(|adapter| adapter.display_name().to_string())
                    .unwrap_or_else(|| id.clone());
                Some(SessionSummary {
                    tool_id: id.clone(),
                    display_name,
                    status: session.status(now),
                    pid: session.pid(),
                    buffered: session.buffer_len(),
                    dropped: session.buffer_dropped(),
                })
            })
            .collect()
    }

    /// The session's buffered output, cleaned by its adapter.
    pub fn capture_response(&self, tool_id: &str) -> Result<String, SessionError> {
        let adapter = self.adapter(tool_id)?;
        let session = self.get(tool_id).ok_or_else(|| SessionError::NoSession {
            tool_id: tool_id.to_string(),
        })?;
        Ok(adapter.clean_response(&session.snapshot()))
    }

    /// Tool id of the attached session, if any.
    pub fn attached_tool(&self) -> Option<String> {
        self.attached.lock().clone()
    }

    /// Reserve the single attachment slot for `tool_id`.
    pub(crate) fn claim_attach(&self, tool_id: &str) -> Result<AttachTicket, SessionError> {
        self.adapter(tool_id)?;
        let session = self
            .get(tool_id)
            .filter(|session| session.is_alive())
            .ok_or_else(|| SessionError::NoSession {
                tool_id: tool_id.to_string(),
            })?;

        let mut slot = self.attached.lock();
        if let Some(attached) = slot.as_ref() {
            return Err(SessionError::AlreadyAttached {
                attached: attached.clone(),
                requested: tool_id.to_string(),
            });
        }
        *slot = Some(tool_id.to_string());
        Ok(AttachTicket {
            session,
            slot: Arc::clone(&self.attached),
        })
    }

    fn adapter(&self, tool_id: &str) -> Result<Arc<dyn ToolAdapter>, SessionError> {
        self.catalog
            .get(tool_id)
            .ok_or_else(|| SessionError::UnknownTool {
                tool_id: tool_id.to_string(),
            })
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(ToolCatalog::new(), DEFAULT_BUFFER_CAPACITY)
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.kill_all();
    }
}

/// Holds the attachment slot. Dropping it leaves `Attached` (if the session
/// still is) and frees the slot, whatever path the attach loop took.
pub(crate) struct AttachTicket {
    session: Arc<Session>,
    slot: Arc<Mutex<Option<String>>>,
}

impl AttachTicket {
    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for AttachTicket {
    fn drop(&mut self) {
        if self.session.is_attached() {
            self.session.detach();
        }
        let mut slot = self.slot.lock();
        if slot.as_deref() == Some(self.session.tool_id()) {
            *slot = None;
        }
    }
}
