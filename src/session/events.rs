use crate::session::state::SessionState;

/// Notification published by sessions on every transition.
///
/// Presentation layers subscribe through
/// [`SessionRegistry::subscribe`](crate::registry::SessionRegistry::subscribe)
/// instead of the state machine calling into them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged {
        tool_id: String,
        from: SessionState,
        to: SessionState,
    },
    /// Fired once per session when its subprocess terminates, unless the
    /// session was killed silently.
    Exited {
        tool_id: String,
        exit_code: Option<u32>,
    },
}

impl SessionEvent {
    pub fn tool_id(&self) -> &str {
        match self {
            SessionEvent::StateChanged { tool_id, .. } | SessionEvent::Exited { tool_id, .. } => {
                tool_id
            }
        }
    }
}
