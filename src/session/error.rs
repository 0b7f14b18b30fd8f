use thiserror::Error;

/// Errors surfaced by the session core.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start '{tool_id}' ({command}): {reason}")]
    SpawnFailed {
        tool_id: String,
        command: String,
        reason: String,
    },

    #[error("unknown tool '{tool_id}'")]
    UnknownTool { tool_id: String },

    #[error("'{attached}' is already attached; detach it before attaching '{requested}'")]
    AlreadyAttached { attached: String, requested: String },

    #[error("'{tool_id}' exited before its prompt appeared (exit code {})", display_code(.exit_code))]
    ExitedBeforeReady {
        tool_id: String,
        exit_code: Option<u32>,
    },

    #[error("no live session for '{tool_id}'")]
    NoSession { tool_id: String },

    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Single-line message for the command loop.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::SpawnFailed { tool_id, reason, .. } => {
                format!("Could not start {tool_id}: {reason}")
            }
            SessionError::UnknownTool { tool_id } => format!("Unknown tool: {tool_id}"),
            other => other.to_string(),
        }
    }
}

fn display_code(code: &Option<u32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failure_message_is_single_line() {
        let err = SessionError::SpawnFailed {
            tool_id: "claude".into(),
            command: "claude --verbose".into(),
            reason: "No such file or directory (os error 2)".into(),
        };
        let message = err.user_message();
        assert!(!message.contains('\n'));
        assert!(message.contains("claude"));
        assert!(message.contains("os error 2"));
    }

    #[test]
    fn exited_before_ready_formats_unknown_code() {
        let err = SessionError::ExitedBeforeReady {
            tool_id: "codex".into(),
            exit_code: None,
        };
        assert_eq!(
            err.to_string(),
            "'codex' exited before its prompt appeared (exit code unknown)"
        );
    }
}
