use crossterm::cursor::{MoveTo, Show};
use crossterm::event::{
    DisableBracketedPaste, DisableFocusChange, EnableBracketedPaste, EnableFocusChange,
    PopKeyboardEnhancementFlags,
};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::QueueableCommand;
use std::io::{self, Stdout, Write};
use std::ops::{Deref, DerefMut};

use crate::pty::terminal_size;

/// The host terminal as seen by an attachment.
pub trait TerminalPort: Send {
    fn is_raw_mode(&self) -> io::Result<bool>;
    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()>;
    /// Write and flush.
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn size(&self) -> (u16, u16);
}

/// The real terminal on stdout.
pub struct HostTerminal {
    stdout: Stdout,
}

impl HostTerminal {
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
        }
    }
}

impl Default for HostTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalPort for HostTerminal {
    fn is_raw_mode(&self) -> io::Result<bool> {
        terminal::is_raw_mode_enabled()
    }

    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
        if enabled {
            terminal::enable_raw_mode()
        } else {
            terminal::disable_raw_mode()
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stdout.write_all(bytes)?;
        self.stdout.flush()
    }

    fn size(&self) -> (u16, u16) {
        terminal_size()
    }
}

/// Sequences written on entry: focus reporting and bracketed paste on.
pub fn enter_sequence() -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.queue(EnableFocusChange)?;
    buf.queue(EnableBracketedPaste)?;
    Ok(buf)
}

/// Sequences written on exit, in order: clear the current line, focus
/// reporting off, bracketed paste off, keyboard enhancement reset, cursor on.
pub fn restore_sequence() -> io::Result<Vec<u8>> {
    let mut buf = b"\r".to_vec();
    buf.queue(Clear(ClearType::CurrentLine))?;
    buf.queue(DisableFocusChange)?;
    buf.queue(DisableBracketedPaste)?;
    buf.queue(PopKeyboardEnhancementFlags)?;
    buf.queue(Show)?;
    Ok(buf)
}

/// Clear the screen and home the cursor before a replay.
pub fn clear_screen_sequence() -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.queue(Clear(ClearType::All))?;
    buf.queue(MoveTo(0, 0))?;
    Ok(buf)
}

/// Puts the terminal into attach mode and undoes it on every exit path.
///
/// Raw mode goes back to whatever it was before the attach rather than
/// unconditionally off, so a host that was already raw stays raw.
pub struct TerminalModeGuard<T: TerminalPort> {
    terminal: T,
    was_raw: bool,
    restored: bool,
}

impl<T: TerminalPort> TerminalModeGuard<T> {
    pub fn acquire(mut terminal: T) -> io::Result<Self> {
        let was_raw = terminal.is_raw_mode().unwrap_or(false);
        terminal.set_raw_mode(true)?;
        let mut guard = Self {
            terminal,
            was_raw,
            restored: false,
        };
        let enter = enter_sequence()?;
        guard.terminal.write_bytes(&enter)?;
        Ok(guard)
    }

    pub fn was_raw(&self) -> bool {
        self.was_raw
    }

    /// Restore the terminal now. Later calls, including the one from `Drop`,
    /// do nothing.
    pub fn restore(&mut self) -> io::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        let sequence = restore_sequence()?;
        let written = self.terminal.write_bytes(&sequence);
        let raw = self.terminal.set_raw_mode(self.was_raw);
        written.and(raw)
    }
}

impl<T: TerminalPort> Deref for TerminalModeGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.terminal
    }
}

impl<T: TerminalPort> DerefMut for TerminalModeGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.terminal
    }
}

impl<T: TerminalPort> Drop for TerminalModeGuard<T> {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct Recorder {
        raw: Arc<Mutex<bool>>,
        output: Arc<Mutex<Vec<u8>>>,
        raw_calls: Arc<Mutex<Vec<bool>>>,
    }

    impl TerminalPort for Recorder {
        fn is_raw_mode(&self) -> io::Result<bool> {
            Ok(*self.raw.lock())
        }

        fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
            *self.raw.lock() = enabled;
            self.raw_calls.lock().push(enabled);
            Ok(())
        }

        fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.output.lock().extend_from_slice(bytes);
            Ok(())
        }

        fn size(&self) -> (u16, u16) {
            (100, 30)
        }
    }

    fn position(haystack: &[u8], needle: &[u8]) -> usize {
        haystack
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap_or_else(|| panic!("missing {:?}", String::from_utf8_lossy(needle)))
    }

    #[test]
    fn restore_runs_in_order() {
        let sequence = restore_sequence().unwrap();
        let clear = position(&sequence, b"\x1b[2K");
        let focus = position(&sequence, b"\x1b[?1004l");
        let paste = position(&sequence, b"\x1b[?2004l");
        let keyboard = position(&sequence, b"\x1b[<1u");
        let cursor = position(&sequence, b"\x1b[?25h");
        assert!(clear < focus && focus < paste && paste < keyboard && keyboard < cursor);
    }

    #[test]
    fn guard_enables_then_restores_on_drop() {
        let recorder = Recorder::default();
        {
            let guard = TerminalModeGuard::acquire(recorder.clone()).unwrap();
            assert!(!guard.was_raw());
            assert!(*recorder.raw.lock());
        }
        assert!(!*recorder.raw.lock());
        let output = recorder.output.lock().clone();
        assert!(position(&output, b"\x1b[?1004h") < position(&output, b"\x1b[?1004l"));
        assert!(position(&output, b"\x1b[?2004h") < position(&output, b"\x1b[?2004l"));
    }

    #[test]
    fn restores_previous_raw_mode() {
        let recorder = Recorder::default();
        *recorder.raw.lock() = true;
        let mut guard = TerminalModeGuard::acquire(recorder.clone()).unwrap();
        guard.restore().unwrap();
        drop(guard);
        assert!(*recorder.raw.lock());
        assert_eq!(*recorder.raw_calls.lock(), vec![true, true]);
    }

    #[test]
    fn restore_is_idempotent() {
        let recorder = Recorder::default();
        let mut guard = TerminalModeGuard::acquire(recorder.clone()).unwrap();
        guard.restore().unwrap();
        let after_first = recorder.output.lock().len();
        guard.restore().unwrap();
        drop(guard);
        assert_eq!(recorder.output.lock().len(), after_first);
    }
}
