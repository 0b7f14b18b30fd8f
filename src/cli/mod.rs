//! Command-line surface: arguments, the prompt's command language, and the
//! line loop that drives the session core between attachments.

mod args;
mod command;
mod repl;

pub use args::Args;
pub use command::{Command, CommandError, HELP};
pub use repl::{detach_notice, Flow, Repl};
