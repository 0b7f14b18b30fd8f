use thiserror::Error;

/// One line typed at the `toolmux>` prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Attach { tool: String },
    Status,
    Kill { tool: String },
    Forward { from: String, to: String },
    Type { tool: String, text: String },
    Tools,
    Help,
    Quit,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '/{0}' (try /help)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
Commands:
  <tool>                  attach to a tool (spawning it if needed)
  <tool> <text>           type text into a tool and press Enter
  /attach <tool>          same as <tool>
  /type <tool> <text>     same as <tool> <text>
  /forward <from> <to>    type <from>'s captured output into <to>
  /status                 list sessions
  /kill <tool>            stop a tool's session
  /tools                  list configured tools
  /help                   this text
  /quit                   stop every session and exit

While attached: Ctrl+] (or Ctrl+\\, Ctrl+^, Ctrl+_, Esc Esc) detaches.";

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Command::Empty);
        }

        let Some(body) = line.strip_prefix('/') else {
            return Ok(match split_word(line) {
                (tool, "") => Command::Attach {
                    tool: tool.to_string(),
                },
                (tool, text) => Command::Type {
                    tool: tool.to_string(),
                    text: text.to_string(),
                },
            });
        };

        let (name, rest) = split_word(body);
        match name {
            "attach" | "a" => match split_word(rest) {
                (tool, "") if !tool.is_empty() => Ok(Command::Attach {
                    tool: tool.to_string(),
                }),
                _ => Err(CommandError::Usage("/attach <tool>")),
            },
            "status" | "s" => Ok(Command::Status),
            "kill" | "k" => match split_word(rest) {
                (tool, "") if !tool.is_empty() => Ok(Command::Kill {
                    tool: tool.to_string(),
                }),
                _ => Err(CommandError::Usage("/kill <tool>")),
            },
            "forward" | "fwd" => {
                let (from, rest) = split_word(rest);
                match split_word(rest) {
                    (to, "") if !from.is_empty() && !to.is_empty() => Ok(Command::Forward {
                        from: from.to_string(),
                        to: to.to_string(),
                    }),
                    _ => Err(CommandError::Usage("/forward <from> <to>")),
                }
            }
            "type" | "t" => match split_word(rest) {
                (tool, text) if !tool.is_empty() && !text.is_empty() => Ok(Command::Type {
                    tool: tool.to_string(),
                    text: text.to_string(),
                }),
                _ => Err(CommandError::Usage("/type <tool> <text>")),
            },
            "tools" => Ok(Command::Tools),
            "help" | "h" | "?" => Ok(Command::Help),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// First whitespace-delimited word and the trimmed remainder.
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attach(tool: &str) -> Command {
        Command::Attach {
            tool: tool.to_string(),
        }
    }

    #[test]
    fn bare_tool_attaches() {
        assert_eq!(Command::parse("claude"), Ok(attach("claude")));
        assert_eq!(Command::parse("  /attach   codex "), Ok(attach("codex")));
    }

    #[test]
    fn tool_with_text_types() {
        assert_eq!(
            Command::parse("codex fix the tests please"),
            Ok(Command::Type {
                tool: "codex".to_string(),
                text: "fix the tests please".to_string(),
            })
        );
        assert_eq!(
            Command::parse("/type gemini  hi  there"),
            Ok(Command::Type {
                tool: "gemini".to_string(),
                text: "hi  there".to_string(),
            })
        );
    }

    #[test]
    fn forward_takes_two_tools() {
        assert_eq!(
            Command::parse("/forward claude codex"),
            Ok(Command::Forward {
                from: "claude".to_string(),
                to: "codex".to_string(),
            })
        );
        assert_eq!(
            Command::parse("/forward claude"),
            Err(CommandError::Usage("/forward <from> <to>"))
        );
    }

    #[test]
    fn simple_commands() {
        assert_eq!(Command::parse(""), Ok(Command::Empty));
        assert_eq!(Command::parse("/status"), Ok(Command::Status));
        assert_eq!(Command::parse("/tools"), Ok(Command::Tools));
        assert_eq!(Command::parse("/?"), Ok(Command::Help));
        assert_eq!(Command::parse("/exit"), Ok(Command::Quit));
        assert_eq!(
            Command::parse("/kill codex"),
            Ok(Command::Kill {
                tool: "codex".to_string()
            })
        );
    }

    #[test]
    fn errors() {
        assert_eq!(
            Command::parse("/frobnicate"),
            Err(CommandError::Unknown("frobnicate".to_string()))
        );
        assert_eq!(Command::parse("/kill"), Err(CommandError::Usage("/kill <tool>")));
        assert_eq!(Command::parse("/attach a b"), Err(CommandError::Usage("/attach <tool>")));
    }
}
