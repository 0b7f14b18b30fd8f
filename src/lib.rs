//! toolmux: persistent PTY sessions for terminal-oriented CLI tools.
//!
//! A host process keeps one long-running subprocess per tool, lets the user
//! attach to its live terminal, detach back to a line-based command loop,
//! reattach later, and forward captured output from one tool to another.
//!
//! # Architecture
//!
//! - [`session::Session`]: one subprocess with its PTY and bounded output buffer.
//! - [`registry::SessionRegistry`]: maps tool ids to live sessions; at most one is attached.
//! - [`attach::AttachController`]: bridges raw stdin to the attached session until a detach trigger.
//! - [`typing`]: paced character injection into a freshly spawned session.
//! - [`adapter`]: per-tool launch and prompt knowledge.

pub mod adapter;
pub mod attach;
pub mod cli;
pub mod config;
pub mod logging;
pub mod pty;
pub mod registry;
pub mod session;
pub mod typing;
