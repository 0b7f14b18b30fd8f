use clap::Parser;
use std::path::PathBuf;

/// Keep interactive CLI tools running in the background and switch between them.
#[derive(Debug, Clone, Parser)]
#[command(name = "toolmux", version)]
pub struct Args {
    /// Config file to load instead of ~/.config/toolmux/config.toml.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Append logs to this file instead of stderr.
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Tool to attach to on startup.
    #[arg(value_name = "TOOL")]
    pub tool: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_tool() {
        let args = Args::parse_from([
            "toolmux",
            "--config",
            "/tmp/c.toml",
            "--log-file",
            "/tmp/t.log",
            "codex",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
        assert_eq!(args.log_file, Some(PathBuf::from("/tmp/t.log")));
        assert_eq!(args.tool.as_deref(), Some("codex"));
    }

    #[test]
    fn everything_is_optional() {
        let args = Args::parse_from(["toolmux"]);
        assert!(args.config.is_none());
        assert!(args.tool.is_none());
    }
}
