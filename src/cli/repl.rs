use crate::attach::{AttachController, AttachOutcome, DetachReason};
use crate::cli::command::{Command, HELP};
use crate::config::Defaults;
use crate::registry::SessionRegistry;
use crate::session::{SessionError, SessionEvent};
use crate::typing::{spawn_typing, TypingOutcome, TypingPlan};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const PROMPT: &str = "toolmux> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The line-based loop between attachments.
pub struct Repl {
    registry: Arc<SessionRegistry>,
    controller: AttachController,
    defaults: Defaults,
    events: broadcast::Receiver<SessionEvent>,
}

impl Repl {
    pub fn new(registry: Arc<SessionRegistry>, defaults: Defaults) -> Self {
        let controller = AttachController::new(Arc::clone(&registry))
            .with_escape_window(Duration::from_millis(defaults.double_escape_window_ms));
        let events = registry.subscribe();
        Self {
            registry,
            controller,
            defaults,
            events,
        }
    }

    /// Run until `/quit`, end of input or Ctrl+C. Every session is killed on
    /// the way out.
    pub async fn run(&mut self, initial_tool: Option<String>) -> anyhow::Result<()> {
        if let Some(tool) = initial_tool {
            self.execute(Command::Attach { tool }).await;
        }

        let mut pending: Option<JoinHandle<io::Result<Option<String>>>> = None;
        loop {
            let reader = match pending.as_mut() {
                Some(reader) => reader,
                None => {
                    print!("{PROMPT}");
                    io::stdout().flush()?;
                    pending.insert(tokio::task::spawn_blocking(read_line))
                }
            };

            tokio::select! {
                line = reader => {
                    pending = None;
                    let Some(line) = line?? else {
                        break;
                    };
                    match Command::parse(&line) {
                        Ok(command) => {
                            if self.execute(command).await == Flow::Quit {
                                break;
                            }
                        }
                        Err(err) => eprintln!("{err}"),
                    }
                }
                event = self.events.recv() => {
                    if let Ok(event) = event {
                        if let Some(notice) = exit_notice(&event) {
                            println!("\r\n{notice}");
                            print!("{PROMPT}");
                            io::stdout().flush()?;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
            }
        }

        self.registry.kill_all();
        Ok(())
    }

    /// Run one command, reporting errors on stderr.
    pub async fn execute(&mut self, command: Command) -> Flow {
        match self.dispatch(command).await {
            Ok(flow) => flow,
            Err(err) => {
                eprintln!("{}", err.user_message());
                Flow::Continue
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<Flow, SessionError> {
        match command {
            Command::Empty => {}
            Command::Attach { tool } => self.attach(&tool).await?,
            Command::Status => self.print_status(),
            Command::Kill { tool } => {
                if self.registry.kill(&tool, true)? {
                    println!("Stopped {tool}.");
                } else {
                    println!("{tool} is not running.");
                }
            }
            Command::Forward { from, to } => {
                let text = flatten(&self.registry.capture_response(&from)?);
                if text.is_empty() {
                    println!("Nothing to forward from {from}.");
                } else {
                    self.type_into(&to, &text).await?;
                }
            }
            Command::Type { tool, text } => self.type_into(&tool, &text).await?,
            Command::Tools => {
                for id in self.registry.catalog().ids() {
                    if let Some(adapter) = self.registry.catalog().get(id) {
                        println!("  {id:<10} {}", adapter.display_name());
                    }
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    async fn attach(&mut self, tool: &str) -> Result<(), SessionError> {
        self.registry.get_or_create(tool, false).await?;
        println!("Attaching to {tool}. Ctrl+] or Esc Esc detaches.");
        let outcome = self.controller.attach(tool).await?;
        self.skip_exit_events(&outcome.tool_id);
        println!("{}", detach_notice(&outcome));
        Ok(())
    }

    /// Drop exit events for the tool whose exit was already reported.
    fn skip_exit_events(&mut self, tool_id: &str) {
        while let Ok(event) = self.events.try_recv() {
            if event.tool_id() == tool_id {
                continue;
            }
            if let Some(notice) = exit_notice(&event) {
                println!("{notice}");
            }
        }
    }

    async fn type_into(&mut self, tool: &str, text: &str) -> Result<(), SessionError> {
        let deadline = Duration::from_secs(self.defaults.ready_timeout_secs);
        let session = match tokio::time::timeout(deadline, self.registry.get_or_create(tool, true))
            .await
        {
            Ok(session) => session?,
            Err(_) => {
                println!(
                    "{tool} did not show its prompt within {}s; typing anyway.",
                    deadline.as_secs()
                );
                self.registry
                    .get(tool)
                    .ok_or_else(|| SessionError::NoSession {
                        tool_id: tool.to_string(),
                    })?
            }
        };

        let delay = Duration::from_millis(self.defaults.typing_delay_ms);
        let plan = TypingPlan::new(text, delay).submit(delay);
        match spawn_typing(session, plan).join().await {
            TypingOutcome::Completed { typed } => {
                println!("Sent {typed} characters to {tool}. Attach with: {tool}");
            }
            TypingOutcome::Cancelled { typed } => {
                println!("Typing into {tool} stopped after {typed} characters.");
            }
            TypingOutcome::SessionDied { typed } => {
                println!("{tool} exited after {typed} characters were typed.");
            }
        }
        Ok(())
    }

    fn print_status(&self) {
        let statuses = self.registry.statuses(Instant::now());
        if statuses.is_empty() {
            println!("No sessions.");
            return;
        }
        for summary in statuses {
            let pid = summary
                .pid
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "-".to_string());
            let dropped = match summary.dropped {
                0 => String::new(),
                n => format!(" ({n} older bytes dropped)"),
            };
            println!(
                "  {:<10} {:<12} pid {:<8} {} bytes buffered{dropped}",
                summary.display_name, summary.status, pid, summary.buffered
            );
        }
    }
}

fn read_line() -> io::Result<Option<String>> {
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    Ok((read > 0).then_some(line))
}

fn exit_notice(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Exited { tool_id, exit_code } => Some(format!(
            "[{tool_id} exited{}]",
            exit_code
                .map(|code| format!(" with code {code}"))
                .unwrap_or_default()
        )),
        SessionEvent::StateChanged { .. } => None,
    }
}

pub fn detach_notice(outcome: &AttachOutcome) -> String {
    match &outcome.reason {
        DetachReason::Trigger(chord) => {
            format!("Detached from {} ({chord}). It keeps running.", outcome.tool_id)
        }
        DetachReason::Exited { exit_code } => match exit_code {
            Some(code) => format!("{} exited with code {code}.", outcome.tool_id),
            None => format!("{} exited.", outcome.tool_id),
        },
        DetachReason::InputClosed => format!("Input closed; detached from {}.", outcome.tool_id),
    }
}

/// Join non-empty lines with spaces so typing does not press Enter early.
fn flatten(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
