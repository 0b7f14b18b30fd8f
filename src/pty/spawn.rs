use portable_pty::CommandBuilder;

/// Fallback size when the controlling terminal cannot be queried
/// (e.g. stdout redirected, or running under a test harness).
pub const DEFAULT_SIZE: (u16, u16) = (80, 24);

/// Everything needed to launch one tool inside a fresh PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
}

impl SpawnSpec {
    /// Spec sized to the current controlling terminal.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        let (cols, rows) = terminal_size();
        Self {
            command: command.into(),
            args,
            env: Vec::new(),
            cols,
            rows,
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols.max(1);
        self.rows = rows.max(1);
        self
    }

    /// Human readable command line, used in error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            return self.command.clone();
        }
        format!("{} {}", self.command, self.args.join(" "))
    }

    pub(crate) fn command_builder(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.command);
        cmd.args(&self.args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }
        cmd.env("TERM", "xterm-256color");
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Current terminal size as `(cols, rows)`, falling back to [`DEFAULT_SIZE`].
pub fn terminal_size() -> (u16, u16) {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => (cols, rows),
        _ => DEFAULT_SIZE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_args() {
        let spec = SpawnSpec::new("claude", vec!["--model".into(), "opus".into()]);
        assert_eq!(spec.display(), "claude --model opus");
    }

    #[test]
    fn display_without_args_is_command() {
        let spec = SpawnSpec::new("codex", Vec::new());
        assert_eq!(spec.display(), "codex");
    }

    #[test]
    fn with_size_never_zero() {
        let spec = SpawnSpec::new("sh", Vec::new()).with_size(0, 0);
        assert_eq!((spec.cols, spec.rows), (1, 1));
    }

    #[test]
    fn builder_carries_args_and_term() {
        let spec = SpawnSpec::new("sh", vec!["-c".into(), "true".into()])
            .with_env(vec![("FOO".into(), "bar".into())]);
        let cmd = spec.command_builder();
        let argv: Vec<String> = cmd
            .get_argv()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(argv, vec!["sh", "-c", "true"]);
        assert_eq!(
            cmd.get_env("TERM").map(|v| v.to_string_lossy().into_owned()),
            Some("xterm-256color".to_string())
        );
        assert_eq!(
            cmd.get_env("FOO").map(|v| v.to_string_lossy().into_owned()),
            Some("bar".to_string())
        );
    }
}
